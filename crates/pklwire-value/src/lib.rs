//! Pkl value model and decoder for evaluator result payloads.
//!
//! The evaluator returns results as MessagePack. Primitives are sent as-is;
//! structured values are arrays led by a type tag:
//! - `[0x1, className, moduleUri, [members]]` for objects
//! - `[0x2 | 0x3, map]` for maps and mappings
//! - `[0x4 | 0x5 | 0x6, array]` for lists, listings and sets
//! - `[0x7 | 0x8, value, unit]` for durations and data sizes
//!
//! plus pairs, int sequences, regexes and class/type alias placeholders.

pub mod code;
pub mod decoder;
pub mod encoder;
pub mod error;
#[cfg(feature = "serde")]
mod serialize;
pub mod value;

pub use decoder::{decode, decode_value};
pub use encoder::{encode, to_msgpack};
pub use error::{DecodeError, Result};
pub use value::{
    DataSize, DataSizeUnit, Duration, DurationUnit, Dynamic, IntSeq, Pair, Properties, Regex,
    TypedObject, Value, ValueMap,
};
