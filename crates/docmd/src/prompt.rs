//! Interactive prompts on the controlling terminal.

use std::io::{self, BufRead, Write};

use async_trait::async_trait;
use docmd_core::Prompt;
use tokio::sync::{Mutex, oneshot};

/// Reads answers from stdin.
///
/// One question at a time: concurrent watch callbacks wait for each other so
/// their prompts do not interleave. The read happens on its own thread, so a
/// question left unanswered never holds a runtime worker or delays shutdown.
#[derive(Default)]
pub struct StdinPrompt {
    turn: Mutex<()>,
}

impl StdinPrompt {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Prompt for StdinPrompt {
    async fn ask(&self, message: &str) -> io::Result<String> {
        let _turn = self.turn.lock().await;

        {
            let mut stdout = io::stdout().lock();
            writeln!(stdout)?;
            write!(stdout, "{message}")?;
            stdout.flush()?;
        }

        let (tx, rx) = oneshot::channel();
        std::thread::Builder::new()
            .name("docmd-prompt".into())
            .spawn(move || {
                let _ = tx.send(read_answer());
            })?;
        rx.await
            .map_err(|_| io::Error::other("prompt reader exited without an answer"))?
    }
}

fn read_answer() -> io::Result<String> {
    let mut answer = String::new();
    if io::stdin().lock().read_line(&mut answer)? == 0 {
        return Err(io::Error::new(io::ErrorKind::UnexpectedEof, "stdin closed"));
    }
    Ok(answer)
}
