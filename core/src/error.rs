use reqwest::StatusCode;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, TransportError>;

/// Failures talking to the chat backend.
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The backend answered with a non-success status.
    #[error("unexpected status {status}: {body}")]
    Status { status: StatusCode, body: String },

    /// The body stream broke after the response started.
    #[error("stream read failed: {0}")]
    Read(String),
}

/// Why a send was refused before anything went on the wire.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendRejected {
    #[error("message is empty")]
    Empty,

    #[error("a reply is still streaming")]
    Busy,
}

/// Raised by a surface that could not lay out markdown. The pipeline
/// recovers by showing the same text unformatted.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("markdown render failed: {0}")]
pub struct RenderError(pub String);
