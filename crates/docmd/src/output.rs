//! User-facing status lines.

use chrono::Local;

pub fn success(msg: &str) {
    println!("OK: {msg}");
}

pub fn warning(msg: &str) {
    println!("WARN: {msg}");
}

pub fn error(msg: &str) {
    eprintln!("ERROR: {msg}");
}

/// Wall-clock prefix for watch mode lines.
pub fn timestamp() -> String {
    Local::now().format("%H:%M:%S").to_string()
}
