use std::fmt;

#[derive(Debug)]
pub enum ConfigError {
    UnsupportedBackend(String),
    BadTimezone(String),
    BadIpFormatting(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::UnsupportedBackend(e) => {
                write!(f, "Unsupported database connection type: {}", e)
            }
            ConfigError::BadTimezone(e) => write!(f, "Unknown timezone: {}", e),
            ConfigError::BadIpFormatting(e) => write!(f, "IP formatting error: {}", e),
        }
    }
}

impl std::error::Error for ConfigError {}

#[derive(Debug, PartialEq, Eq)]
pub enum StorageError {
    ConnectionFailed,
    WriteFailed,
    ReadFailed,
    DuplicatePath,
}

impl fmt::Display for StorageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StorageError::ConnectionFailed => write!(f, "Storage connection failed"),
            StorageError::WriteFailed => write!(f, "Storage write failed"),
            StorageError::ReadFailed => write!(f, "Storage read failed"),
            StorageError::DuplicatePath => write!(f, "Route path already exists"),
        }
    }
}

impl std::error::Error for StorageError {}

#[derive(Debug)]
pub enum WebError {
    BindFailed(String),
}

impl fmt::Display for WebError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WebError::BindFailed(e) => write!(f, "Web server bind failed: {}", e),
        }
    }
}

impl std::error::Error for WebError {}
