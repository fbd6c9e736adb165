use std::path::PathBuf;

/// Errors that can occur in evaluator operations.
#[derive(Debug, thiserror::Error)]
pub enum EvaluatorError {
    /// The Pkl process could not be started or probed.
    #[error("transport error: {0}")]
    Transport(#[from] pklwire_transport::TransportError),

    /// The message stream was unreadable or unwritable.
    #[error("frame error: {0}")]
    Frame(#[from] pklwire_frame::FrameError),

    /// A result payload could not be decoded.
    #[error("decode error: {0}")]
    Decode(#[from] pklwire_value::DecodeError),

    /// Pkl reported an evaluation error; the text is Pkl's own message.
    #[error("{0}")]
    Evaluation(String),

    /// The evaluator was closed.
    #[error("evaluator is closed")]
    Closed,

    /// The connection to the Pkl process went away.
    #[error("connection closed: {0}")]
    ConnectionClosed(String),

    /// Pkl refused to create an evaluator.
    #[error("failed to create evaluator: {0}")]
    CreateFailed(String),

    /// A correlation id was already in flight.
    #[error("request id {0} is already pending")]
    DuplicateRequestId(i64),

    /// The evaluated value did not have the requested shape.
    #[error("unexpected result: expected {expected}, got {found}")]
    UnexpectedResult {
        expected: &'static str,
        found: String,
    },

    /// A module URI could not be parsed.
    #[error("invalid module uri: {0}")]
    InvalidUri(#[from] url::ParseError),

    /// A path could not be turned into a `file:` URI.
    #[error("invalid module path: {}", .0.display())]
    InvalidPath(PathBuf),

    /// A PklProject did not evaluate to a usable project.
    #[error("invalid project: {0}")]
    Project(String),

    /// Local I/O failure (e.g. resolving the working directory).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, EvaluatorError>;
