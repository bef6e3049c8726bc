use std::path::{Path, PathBuf};

/// Directory name under the home directory when `DOCMD_HOME` is unset.
const CONFIG_DIR_NAME: &str = ".docmd";
const LINKS_FILE_NAME: &str = "config.json";
const TOKEN_FILE_NAME: &str = "token.json";

/// Locations of docmd's persisted state.
#[derive(Debug, Clone)]
pub struct Config {
    /// Directory holding the link table and the stored token
    pub home: PathBuf,
}

impl Config {
    /// Resolve the config directory from the environment.
    ///
    /// Uses `DOCMD_HOME` when set (supports ~ for home directory), otherwise
    /// `~/.docmd`.
    pub fn from_env() -> Result<Self, ConfigError> {
        let home = match std::env::var("DOCMD_HOME") {
            Ok(value) if !value.trim().is_empty() => expand_tilde(value.trim())?,
            _ => dirs::home_dir()
                .ok_or(ConfigError::NoHomeDir)?
                .join(CONFIG_DIR_NAME),
        };
        Ok(Self { home })
    }

    pub fn at(home: impl Into<PathBuf>) -> Self {
        Self { home: home.into() }
    }

    /// Persisted link table.
    pub fn links_path(&self) -> PathBuf {
        self.home.join(LINKS_FILE_NAME)
    }

    /// Stored OAuth token and client credentials.
    pub fn token_path(&self) -> PathBuf {
        self.home.join(TOKEN_FILE_NAME)
    }

    pub fn home(&self) -> &Path {
        &self.home
    }
}

/// Expand ~ or ~/ prefix to the user's home directory.
fn expand_tilde(path: &str) -> Result<PathBuf, ConfigError> {
    if path == "~" {
        dirs::home_dir().ok_or(ConfigError::NoHomeDir)
    } else if let Some(rest) = path.strip_prefix("~/") {
        Ok(dirs::home_dir().ok_or(ConfigError::NoHomeDir)?.join(rest))
    } else {
        Ok(PathBuf::from(path))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("could not determine the home directory; set DOCMD_HOME")]
    NoHomeDir,
}
