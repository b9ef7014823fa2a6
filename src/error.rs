//! Error types for PetalStream

use thiserror::Error;

#[derive(Error, Debug)]
pub enum PetalStreamError {
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("Unsupported or corrupt source: {0}")]
    UnsupportedOrCorruptSource(String),

    #[error("Invalid slot transition: {0}")]
    InvalidTransition(String),

    #[error("No source loaded")]
    SourceNotLoaded,

    #[error("Decode error: {0}")]
    Decode(String),

    #[error("Audio device error: {0}")]
    AudioDevice(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, PetalStreamError>;
