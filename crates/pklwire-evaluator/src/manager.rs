//! Evaluator manager: owns the Pkl server process and creates evaluators on it.

use std::fmt;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};

use pklwire_frame::FrameConfig;
use pklwire_transport::{probe_version, PklCommand, PklProcess};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::OnceCell;

use crate::connection::Connection;
use crate::error::{EvaluatorError, Result};
use crate::evaluator::{Evaluator, Session};
use crate::options::EvaluatorOptions;
use crate::project::Project;
use crate::source::ModuleSource;

/// Handle to one Pkl server process.
///
/// The process is started on the first [`new_evaluator`](Self::new_evaluator)
/// and shared by every evaluator created through this manager. Clones share
/// the same process.
#[derive(Clone)]
pub struct EvaluatorManager {
    inner: Arc<ManagerInner>,
}

struct ManagerInner {
    command: PklCommand,
    config: FrameConfig,
    connection: OnceCell<Arc<Connection>>,
    version: OnceLock<String>,
    closed: AtomicBool,
}

impl EvaluatorManager {
    /// Manager for the `pkl` found via `PKL_EXEC` or `PATH`.
    pub fn new() -> Self {
        Self::with_command(PklCommand::resolve(None))
    }

    pub fn with_command(command: PklCommand) -> Self {
        Self::with_config(command, FrameConfig::default())
    }

    pub fn with_config(command: PklCommand, config: FrameConfig) -> Self {
        Self {
            inner: Arc::new(ManagerInner {
                command,
                config,
                connection: OnceCell::new(),
                version: OnceLock::new(),
                closed: AtomicBool::new(false),
            }),
        }
    }

    /// Speak the protocol over an existing stream pair instead of spawning
    /// a process. Must be called inside a tokio runtime.
    pub fn from_streams<R, W>(reader: R, writer: W) -> Self
    where
        R: AsyncRead + Send + Unpin + 'static,
        W: AsyncWrite + Send + Unpin + 'static,
    {
        let config = FrameConfig::default();
        let connection = Connection::start(reader, writer, None, config.clone());
        Self {
            inner: Arc::new(ManagerInner {
                command: PklCommand::resolve(None),
                config,
                connection: OnceCell::from(connection),
                version: OnceLock::new(),
                closed: AtomicBool::new(false),
            }),
        }
    }

    pub fn command(&self) -> &PklCommand {
        &self.inner.command
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::SeqCst)
    }

    async fn connection(&self) -> Result<Arc<Connection>> {
        if self.is_closed() {
            return Err(manager_closed());
        }
        let inner = &self.inner;
        let connection = inner
            .connection
            .get_or_try_init(|| async move {
                let process = PklProcess::spawn(&inner.command)?;
                tracing::info!(command = %inner.command, pid = process.id(), "started pkl server");
                let (child, stdin, stdout) = process.into_parts();
                Ok::<_, EvaluatorError>(Connection::start(
                    stdout,
                    stdin,
                    Some(child),
                    inner.config.clone(),
                ))
            })
            .await?;

        // close() may have raced with the spawn.
        if self.is_closed() {
            connection.shutdown("evaluator manager closed");
            return Err(manager_closed());
        }
        Ok(Arc::clone(connection))
    }

    /// Create an evaluator with the given options.
    pub async fn new_evaluator(&self, options: EvaluatorOptions) -> Result<Evaluator> {
        let connection = self.connection().await?;
        let request_id = connection.next_request_id();
        let message = options.to_create_message(request_id)?;
        let evaluator_id = connection.create_evaluator(message).await?;

        let session = Arc::new(Session::new(
            evaluator_id,
            options.resource_readers,
            options.module_readers,
        ));
        connection.insert_session(Arc::clone(&session))?;
        tracing::debug!(evaluator_id, "created evaluator");
        Ok(Evaluator::new(connection, session))
    }

    /// Create an evaluator configured by the `PklProject` in `project_dir`.
    ///
    /// The project file is evaluated with preconfigured options on a
    /// short-lived evaluator. Fields set in `options` override the project's
    /// evaluator settings.
    pub async fn new_project_evaluator(
        &self,
        project_dir: impl AsRef<Path>,
        options: EvaluatorOptions,
    ) -> Result<Evaluator> {
        let project = self.load_project(project_dir.as_ref()).await?;
        let project_options = EvaluatorOptions::from_project(&project)?;
        self.new_evaluator(project_options.merge(options)).await
    }

    /// Evaluate `<project_dir>/PklProject` into a [`Project`].
    pub async fn load_project(&self, project_dir: &Path) -> Result<Project> {
        let source = ModuleSource::file(project_dir.join("PklProject"))?;
        let loader = self
            .new_evaluator(EvaluatorOptions::preconfigured())
            .await?;
        let value = loader.evaluate_output_value(&source).await;
        loader.close().await;
        Project::from_value(&value?)
    }

    /// Version reported by `<pkl> --version`, probed once and cached.
    ///
    /// Blocks while the probe runs.
    pub fn version(&self) -> Result<String> {
        if let Some(version) = self.inner.version.get() {
            return Ok(version.clone());
        }
        let version = probe_version(&self.inner.command)?;
        Ok(self.inner.version.get_or_init(|| version).clone())
    }

    /// Close the manager: every evaluator on it fails its pending requests
    /// and the server process is killed. Idempotent.
    pub fn close(&self) {
        if self.inner.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Some(connection) = self.inner.connection.get() {
            connection.shutdown("evaluator manager closed");
        }
    }
}

impl Default for EvaluatorManager {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for EvaluatorManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EvaluatorManager")
            .field("command", &self.inner.command)
            .field("started", &self.inner.connection.initialized())
            .field("closed", &self.is_closed())
            .finish()
    }
}

fn manager_closed() -> EvaluatorError {
    EvaluatorError::ConnectionClosed("evaluator manager is closed".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_closed_manager_refuses_evaluators() {
        let (_client, server) = tokio::io::duplex(1024);
        let (reader, writer) = tokio::io::split(server);
        let manager = EvaluatorManager::from_streams(reader, writer);
        manager.close();
        manager.close();
        assert!(manager.is_closed());
        assert!(matches!(
            manager.new_evaluator(EvaluatorOptions::default()).await,
            Err(EvaluatorError::ConnectionClosed(_))
        ));
    }

    #[tokio::test]
    async fn test_spawn_failure_is_transport_error() {
        let manager =
            EvaluatorManager::with_command(PklCommand::new("/nonexistent/pklwire-test-pkl"));
        assert!(matches!(
            manager.new_evaluator(EvaluatorOptions::default()).await,
            Err(EvaluatorError::Transport(_))
        ));
    }

    #[test]
    fn test_version_probe_failure() {
        let manager =
            EvaluatorManager::with_command(PklCommand::new("/nonexistent/pklwire-test-pkl"));
        assert!(matches!(manager.version(), Err(EvaluatorError::Transport(_))));
    }
}
