use std::io;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Invalid MIDI format: {0}")]
    InvalidFormat(String),

    #[error("Unsupported MIDI feature: {0}")]
    UnsupportedFeature(String),

    #[error("Key mapping error: {0}")]
    KeyMapping(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
