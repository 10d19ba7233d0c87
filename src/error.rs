//! Error types for the VoxChat client core

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Media access error: {0}")]
    MediaAccess(String),

    #[error("Signaling error: {0}")]
    Signaling(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("WebSocket error: {0}")]
    WebSocket(String),

    #[error("Request error: {0}")]
    Request(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Not connected")]
    NotConnected,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        Error::Request(e.to_string())
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for Error {
    fn from(e: tokio_tungstenite::tungstenite::Error) -> Self {
        Error::WebSocket(e.to_string())
    }
}
