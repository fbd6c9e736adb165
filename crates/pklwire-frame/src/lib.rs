//! Message framing for the Pkl server protocol.
//!
//! The server speaks MessagePack over its stdio. Every message is a record:
//! - a message kind (`0x20`-`0x2d`)
//! - a map of camelCase fields
//!
//! MessagePack values are self-delimiting, so there is no length prefix; the
//! decoder buffers until one complete value is available.

pub mod code;
pub mod codec;
pub mod error;
pub mod message;

#[cfg(feature = "async")]
pub use codec::MessageCodec;
pub use codec::{decode_value, encode_message, encode_raw, FrameConfig, DEFAULT_MAX_MESSAGE_SIZE};
pub use error::{FrameError, Result};
pub use message::{
    Checksums, CreateEvaluator, DependencyKind, Evaluate, IncomingMessage, ModuleReaderSpec,
    OutgoingMessage, PathElement, ProjectOrDependency, ReadRequest, ReaderSpec,
};
pub use rmpv;
