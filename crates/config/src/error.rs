use std::fmt;

#[derive(Debug)]
pub enum ConfigError {
    /// Config file could not be read.
    Io(String),
    /// TOML parse / deserialization error.
    Parse(String),
    /// Parsed config is inconsistent (bad delimiter, empty target, etc.).
    Validation(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(msg) => write!(f, "cannot read config: {msg}"),
            Self::Parse(msg) => write!(f, "config parse error: {msg}"),
            Self::Validation(msg) => write!(f, "config validation error: {msg}"),
        }
    }
}

impl std::error::Error for ConfigError {}
