/// Errors that can occur while decoding an evaluated value.
///
/// Every variant signals a protocol or version mismatch between this crate and
/// the evaluator; none of them are recoverable by retrying.
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    /// The payload is not valid MessagePack.
    #[error("invalid msgpack payload: {0}")]
    Msgpack(#[from] rmpv::decode::Error),

    /// The payload held more than one value.
    #[error("{0} trailing bytes after value")]
    TrailingBytes(usize),

    /// A value array started with a tag this decoder does not know.
    #[error("encountered unknown object code: {0:#x}")]
    UnknownCode(u64),

    /// An object member tag appeared where it is not allowed.
    #[error("unexpected object member {code:#x} in non-Dynamic object {class}")]
    UnexpectedMember { code: u64, class: String },

    /// An object member array started with an unknown tag.
    #[error("unknown object member code: {0:#x}")]
    UnknownMemberCode(u64),

    /// The payload shape did not match what its tag requires.
    #[error("malformed {what}: {detail}")]
    Malformed { what: &'static str, detail: String },

    /// A duration or data size carried a unit outside the known set.
    #[error("unknown {kind} unit: {unit:?}")]
    UnknownUnit { kind: &'static str, unit: String },

    /// An integer did not fit Pkl's 64-bit `Int`.
    #[error("integer out of range: {0}")]
    IntegerOutOfRange(u64),

    /// Dynamic object elements must arrive densely in index order.
    #[error("element index {index} out of order (next expected {expected})")]
    ElementIndex { index: u64, expected: usize },
}

impl DecodeError {
    pub(crate) fn malformed(what: &'static str, detail: impl Into<String>) -> Self {
        Self::Malformed {
            what,
            detail: detail.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, DecodeError>;
