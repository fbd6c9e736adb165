//! Process boundary for the Pkl binary.
//!
//! Resolves which command runs Pkl, spawns it in `server` mode with piped
//! stdio, and probes its version. This is the lowest layer of pklwire;
//! the evaluator crate speaks the protocol over the handles produced here.

pub mod command;
pub mod error;
pub mod process;
pub mod version;

pub use command::{PklCommand, DEFAULT_PROGRAM, PKL_EXEC_ENV};
pub use error::{Result, TransportError};
pub use process::{PklProcess, SERVER_SUBCOMMAND};
pub use version::{parse_version, probe_version};
