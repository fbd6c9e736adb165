//! One-call evaluator construction.

use std::path::Path;

use pklwire_transport::PklCommand;

use crate::error::Result;
use crate::evaluator::Evaluator;
use crate::manager::EvaluatorManager;
use crate::options::EvaluatorOptions;

/// Start a dedicated Pkl server and create one evaluator on it.
///
/// The evaluator owns the server: closing it also kills the process.
pub async fn new_evaluator(options: EvaluatorOptions) -> Result<Evaluator> {
    new_evaluator_with_command(PklCommand::resolve(None), options).await
}

/// Like [`new_evaluator`], running the given Pkl command.
pub async fn new_evaluator_with_command(
    command: PklCommand,
    options: EvaluatorOptions,
) -> Result<Evaluator> {
    let manager = EvaluatorManager::with_command(command);
    match manager.new_evaluator(options).await {
        Ok(evaluator) => Ok(evaluator.with_owned_manager(manager)),
        Err(e) => {
            manager.close();
            Err(e)
        }
    }
}

/// Start a dedicated Pkl server and create a project evaluator on it.
pub async fn new_project_evaluator(
    project_dir: impl AsRef<Path>,
    options: EvaluatorOptions,
) -> Result<Evaluator> {
    let manager = EvaluatorManager::new();
    match manager.new_project_evaluator(project_dir, options).await {
        Ok(evaluator) => Ok(evaluator.with_owned_manager(manager)),
        Err(e) => {
            manager.close();
            Err(e)
        }
    }
}
