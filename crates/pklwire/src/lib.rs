//! Drive Pkl evaluators from Rust.
//!
//! pklwire speaks the `pkl server` protocol: MessagePack records over the
//! server's stdio, many evaluator sessions multiplexed on one process, and
//! callbacks into host readers for custom URI schemes.
//!
//! # Crate Structure
//!
//! - [`value`]: the value model and result decoder
//! - [`frame`]: protocol messages and the stream codec
//! - [`transport`]: locating, spawning and probing the `pkl` binary
//! - [`evaluator`]: managers, evaluator sessions and readers (behind `evaluator`)

/// Re-export value types.
pub mod value {
    pub use pklwire_value::*;
}

/// Re-export frame types.
pub mod frame {
    pub use pklwire_frame::*;
}

/// Re-export transport types.
pub mod transport {
    pub use pklwire_transport::*;
}

/// Re-export evaluator types (requires `evaluator` feature).
#[cfg(feature = "evaluator")]
pub mod evaluator {
    pub use pklwire_evaluator::*;
}

pub use pklwire_value::Value;

#[cfg(feature = "evaluator")]
pub use pklwire_evaluator::{
    new_evaluator, Evaluator, EvaluatorError, EvaluatorManager, EvaluatorOptions, ModuleSource,
};
