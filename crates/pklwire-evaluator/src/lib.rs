//! Pkl evaluators over a `pkl server` process.
//!
//! An [`EvaluatorManager`] owns one server process and multiplexes any
//! number of [`Evaluator`] sessions over its stdio. Each evaluator
//! correlates its requests by id, so evaluations may be issued concurrently
//! and complete in any order. Custom URI schemes are served by host-side
//! [`ResourceReader`]s and [`ModuleReader`]s, called back by the server.
//!
//! ```no_run
//! # async fn run() -> pklwire_evaluator::Result<()> {
//! use pklwire_evaluator::{new_evaluator, EvaluatorOptions, ModuleSource};
//!
//! let evaluator = new_evaluator(EvaluatorOptions::preconfigured()).await?;
//! let value = evaluator
//!     .evaluate_module(&ModuleSource::text("name = \"pkl\""))
//!     .await?;
//! println!("{:?}", value.property("name"));
//! evaluator.close().await;
//! # Ok(())
//! # }
//! ```

mod connection;
pub mod error;
pub mod evaluator;
pub mod exec;
pub mod manager;
pub mod options;
mod pending;
pub mod project;
pub mod reader;
mod request_id;
pub mod source;

pub use error::{EvaluatorError, Result};
pub use evaluator::{Evaluator, OUTPUT_FILES_EXPR};
pub use exec::{new_evaluator, new_evaluator_with_command, new_project_evaluator};
pub use manager::EvaluatorManager;
pub use options::{
    EvaluatorOptions, OutputFormat, DEFAULT_ALLOWED_MODULES, DEFAULT_ALLOWED_RESOURCES,
};
pub use project::{
    Project, ProjectDependencies, ProjectEvaluatorSettings, ProjectLocalDependency,
    ProjectPackage, ProjectRemoteDependency,
};
pub use reader::{
    find_reader, ModuleReader, ModuleReaderSpec, PathElement, Reader, ReaderError, ReaderResult,
    ReaderSpec, ResourceReader,
};
pub use source::{ModuleSource, REPL_TEXT_URI};

pub use pklwire_frame::FrameConfig;
pub use pklwire_transport::PklCommand;
pub use pklwire_value::Value;
