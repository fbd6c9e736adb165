/// Errors that can occur during message encoding/decoding.
///
/// `Io`, `MessageTooLarge`, `ConnectionClosed` and `Msgpack` are fatal to the
/// stream. The rest describe a single bad record; the stream stays usable.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// An I/O error occurred while reading or writing messages.
    #[error("frame I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A buffered message exceeds the configured maximum size.
    #[error("message too large ({size} bytes, max {max})")]
    MessageTooLarge { size: usize, max: usize },

    /// The stream ended in the middle of a message.
    #[error("connection closed (incomplete message)")]
    ConnectionClosed,

    /// The stream does not contain valid MessagePack.
    #[error("invalid msgpack: {0}")]
    Msgpack(String),

    /// A record carried a message kind this codec does not know.
    #[error("unknown message kind: {0:#x}")]
    UnknownCode(u64),

    /// A required field was absent.
    #[error("{kind}: missing field {field:?}")]
    MissingField {
        kind: &'static str,
        field: &'static str,
    },

    /// A field was present with the wrong type.
    #[error("{kind}: invalid field {field:?}: expected {expected}")]
    InvalidField {
        kind: &'static str,
        field: &'static str,
        expected: &'static str,
    },

    /// A decoded value was not a `[kind, {fields}]` record.
    #[error("not a message record: {0}")]
    NotARecord(String),
}

impl FrameError {
    /// True if the stream cannot be read past this error.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            FrameError::Io(_)
                | FrameError::MessageTooLarge { .. }
                | FrameError::ConnectionClosed
                | FrameError::Msgpack(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, FrameError>;
