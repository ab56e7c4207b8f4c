use crate::config_manager::ConfigError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AuditError {
    /// Missing or empty source text. The message is surfaced verbatim to the caller.
    #[error("{0}")]
    InvalidInput(String),

    #[error("Scratch file setup failed: {0}")]
    ScratchSetup(#[source] std::io::Error),

    #[error("Invalid prompt template: {0}")]
    Template(String),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl AuditError {
    pub fn no_source() -> Self {
        AuditError::InvalidInput(crate::types::NO_SOURCE_MESSAGE.to_string())
    }
}

pub type Result<T> = std::result::Result<T, AuditError>;
