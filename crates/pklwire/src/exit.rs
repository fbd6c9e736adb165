use std::fmt;
use std::io;

use pklwire_evaluator::EvaluatorError;
use pklwire_frame::FrameError;
use pklwire_transport::TransportError;

// Exit codes. Evaluation errors are ordinary failures.
pub const SUCCESS: i32 = 0;
pub const FAILURE: i32 = 1;
pub const TRANSPORT_ERROR: i32 = 3;
pub const DATA_INVALID: i32 = 60;
pub const USAGE: i32 = 64;
pub const INTERNAL: i32 = 125;

pub type CliResult<T> = Result<T, CliError>;

#[derive(Debug)]
pub struct CliError {
    pub code: i32,
    pub message: String,
}

impl CliError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for CliError {}

pub fn io_error(context: &str, err: io::Error) -> CliError {
    let code = match err.kind() {
        io::ErrorKind::NotFound | io::ErrorKind::InvalidInput => USAGE,
        io::ErrorKind::BrokenPipe | io::ErrorKind::UnexpectedEof => FAILURE,
        _ => INTERNAL,
    };
    CliError::new(code, format!("{context}: {err}"))
}

pub fn transport_error(context: &str, err: TransportError) -> CliError {
    CliError::new(TRANSPORT_ERROR, format!("{context}: {err}"))
}

pub fn frame_error(context: &str, err: FrameError) -> CliError {
    match err {
        FrameError::Io(source) => CliError::new(TRANSPORT_ERROR, format!("{context}: {source}")),
        FrameError::ConnectionClosed => CliError::new(FAILURE, format!("{context}: {err}")),
        FrameError::MessageTooLarge { .. } | FrameError::Msgpack(_) => {
            CliError::new(DATA_INVALID, format!("{context}: {err}"))
        }
        other => CliError::new(INTERNAL, format!("{context}: {other}")),
    }
}

pub fn evaluator_error(context: &str, err: EvaluatorError) -> CliError {
    match err {
        EvaluatorError::Transport(err) => transport_error(context, err),
        EvaluatorError::Frame(err) => frame_error(context, err),
        EvaluatorError::Io(err) => io_error(context, err),
        // Pkl's own message is already a complete report.
        EvaluatorError::Evaluation(message) => CliError::new(FAILURE, message),
        EvaluatorError::Closed
        | EvaluatorError::ConnectionClosed(_)
        | EvaluatorError::CreateFailed(_) => CliError::new(FAILURE, format!("{context}: {err}")),
        EvaluatorError::Decode(_)
        | EvaluatorError::UnexpectedResult { .. }
        | EvaluatorError::Project(_) => CliError::new(DATA_INVALID, format!("{context}: {err}")),
        EvaluatorError::InvalidUri(_) | EvaluatorError::InvalidPath(_) => {
            CliError::new(USAGE, format!("{context}: {err}"))
        }
        other => CliError::new(INTERNAL, format!("{context}: {other}")),
    }
}
