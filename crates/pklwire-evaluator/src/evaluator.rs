//! Evaluator sessions.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, Mutex};

use pklwire_frame::{Evaluate, OutgoingMessage, ReadRequest};
use pklwire_value::Value;
use url::Url;

use crate::connection::Connection;
use crate::error::{EvaluatorError, Result};
use crate::manager::EvaluatorManager;
use crate::pending::{PendingRequests, Refused};
use crate::reader::{find_reader, ModuleReader, ReaderResult, ResourceReader};
use crate::request_id::RequestIdGenerator;
use crate::source::ModuleSource;

/// Expression producing `output.files` as a filename → text mapping.
pub const OUTPUT_FILES_EXPR: &str = "output.files.toMap().mapValues((_, it) -> it.text)";

/// Per-evaluator state on the connection: pending evaluations, the
/// correlation id generator and the registered readers.
pub(crate) struct Session {
    id: i64,
    pending: PendingRequests<Vec<u8>>,
    ids: Mutex<RequestIdGenerator>,
    resource_readers: Vec<Arc<dyn ResourceReader>>,
    module_readers: Vec<Arc<dyn ModuleReader>>,
}

impl Session {
    pub(crate) fn new(
        id: i64,
        resource_readers: Vec<Arc<dyn ResourceReader>>,
        module_readers: Vec<Arc<dyn ModuleReader>>,
    ) -> Self {
        Self {
            id,
            pending: PendingRequests::new(),
            ids: Mutex::new(RequestIdGenerator::new(id)),
            resource_readers,
            module_readers,
        }
    }

    pub(crate) fn id(&self) -> i64 {
        self.id
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.pending.is_closed()
    }

    fn next_request_id(&self) -> i64 {
        self.ids
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .next_id()
    }

    /// Close the session, failing whatever is still pending.
    pub(crate) fn fail_pending(&self, error: impl Fn() -> EvaluatorError) -> usize {
        self.pending.close(error)
    }

    pub(crate) fn handle_evaluate_response(
        &self,
        request_id: i64,
        result: Option<Vec<u8>>,
        error: Option<String>,
    ) {
        let outcome = match (result, error) {
            (_, Some(error)) => Err(EvaluatorError::Evaluation(error)),
            (Some(bytes), None) => Ok(bytes),
            (None, None) => Err(EvaluatorError::UnexpectedResult {
                expected: "result bytes",
                found: "empty evaluate response".to_string(),
            }),
        };
        if !self.pending.resolve(request_id, outcome) {
            tracing::warn!(
                evaluator_id = self.id,
                request_id,
                "evaluate response for unknown request id"
            );
        }
    }

    pub(crate) fn handle_log(&self, level: i64, message: &str, frame_uri: &str) {
        match level {
            0 => tracing::trace!(evaluator_id = self.id, frame_uri, "{message}"),
            1 => tracing::warn!(evaluator_id = self.id, frame_uri, "{message}"),
            other => tracing::warn!(evaluator_id = self.id, level = other, frame_uri, "{message}"),
        }
    }

    pub(crate) async fn handle_read_resource(&self, req: ReadRequest) -> OutgoingMessage {
        let result = match self.resolve(&req.uri, &self.resource_readers, "resource") {
            Ok((reader, url)) => run_reader(move || reader.read(&url)).await,
            Err(error) => Err(error),
        };
        OutgoingMessage::ReadResourceResponse {
            request_id: req.request_id,
            evaluator_id: self.id,
            result,
        }
    }

    pub(crate) async fn handle_read_module(&self, req: ReadRequest) -> OutgoingMessage {
        let result = match self.resolve(&req.uri, &self.module_readers, "module") {
            Ok((reader, url)) => run_reader(move || reader.read(&url)).await,
            Err(error) => Err(error),
        };
        OutgoingMessage::ReadModuleResponse {
            request_id: req.request_id,
            evaluator_id: self.id,
            result,
        }
    }

    pub(crate) async fn handle_list_resources(&self, req: ReadRequest) -> OutgoingMessage {
        let result = match self.resolve(&req.uri, &self.resource_readers, "resource") {
            Ok((reader, url)) => run_reader(move || reader.list_elements(&url)).await,
            Err(error) => Err(error),
        };
        OutgoingMessage::ListResourcesResponse {
            request_id: req.request_id,
            evaluator_id: self.id,
            result,
        }
    }

    pub(crate) async fn handle_list_modules(&self, req: ReadRequest) -> OutgoingMessage {
        let result = match self.resolve(&req.uri, &self.module_readers, "module") {
            Ok((reader, url)) => run_reader(move || reader.list_elements(&url)).await,
            Err(error) => Err(error),
        };
        OutgoingMessage::ListModulesResponse {
            request_id: req.request_id,
            evaluator_id: self.id,
            result,
        }
    }

    /// Parse the callback URI and pick the reader for its scheme.
    fn resolve<R: ?Sized + crate::reader::Reader>(
        &self,
        uri: &str,
        readers: &[Arc<R>],
        kind: &str,
    ) -> std::result::Result<(Arc<R>, Url), String> {
        let url = Url::parse(uri)
            .map_err(|e| format!("internal error: failed to parse resource url: {e}"))?;
        match find_reader(readers, &url) {
            Some(reader) => Ok((Arc::clone(reader), url)),
            None => Err(format!(
                "No {kind} reader found for scheme {}:",
                url.scheme()
            )),
        }
    }
}

/// Run a reader on the blocking pool, flattening its error to text.
async fn run_reader<T, F>(f: F) -> std::result::Result<T, String>
where
    F: FnOnce() -> ReaderResult<T> + Send + 'static,
    T: Send + 'static,
{
    match tokio::task::spawn_blocking(f).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(e)) => Err(e.to_string()),
        Err(e) => Err(format!("reader failed: {e}")),
    }
}

/// A Pkl evaluator living inside a server process.
///
/// Evaluators share their manager's connection and may be used
/// concurrently; responses are matched to requests by correlation id.
///
/// Prefer [`close`](Self::close). Dropping an open evaluator unregisters it
/// and, inside a tokio runtime, sends the close request from a spawned task.
pub struct Evaluator {
    connection: Arc<Connection>,
    session: Arc<Session>,
    /// Set when the evaluator was created by [`crate::new_evaluator`] and
    /// owns its manager outright.
    owned_manager: Option<EvaluatorManager>,
}

impl Evaluator {
    pub(crate) fn new(connection: Arc<Connection>, session: Arc<Session>) -> Self {
        Self {
            connection,
            session,
            owned_manager: None,
        }
    }

    pub(crate) fn with_owned_manager(mut self, manager: EvaluatorManager) -> Self {
        self.owned_manager = Some(manager);
        self
    }

    /// The id Pkl assigned to this evaluator.
    pub fn id(&self) -> i64 {
        self.session.id()
    }

    pub fn is_closed(&self) -> bool {
        self.session.is_closed()
    }

    /// Evaluate `expr` against the module and return the undecoded result.
    ///
    /// An empty expression evaluates the module itself.
    pub async fn evaluate_expression_raw(&self, source: &ModuleSource, expr: &str) -> Result<Vec<u8>> {
        if self.session.is_closed() {
            return Err(EvaluatorError::Closed);
        }

        let request_id = self.session.next_request_id();
        let rx = match self.session.pending.register(request_id) {
            Ok(rx) => rx,
            Err(Refused::Closed) => return Err(EvaluatorError::Closed),
            Err(Refused::Duplicate) => return Err(EvaluatorError::DuplicateRequestId(request_id)),
        };

        let message = OutgoingMessage::Evaluate(Evaluate {
            request_id,
            evaluator_id: self.id(),
            module_uri: source.module_uri().to_string(),
            module_text: source
                .contents()
                .filter(|text| !text.is_empty())
                .map(str::to_string),
            expr: (!expr.is_empty()).then(|| expr.to_string()),
        });
        tracing::debug!(
            evaluator_id = self.id(),
            request_id,
            module_uri = source.module_uri(),
            expr,
            "evaluating"
        );

        if let Err(e) = self.connection.send(message).await {
            self.session.pending.remove(request_id);
            return Err(e);
        }

        rx.await
            .map_err(|_| EvaluatorError::ConnectionClosed("evaluate request was dropped".to_string()))?
    }

    /// Evaluate `expr` against the module and decode the result.
    pub async fn evaluate_expression(&self, source: &ModuleSource, expr: &str) -> Result<Value> {
        let bytes = self.evaluate_expression_raw(source, expr).await?;
        Ok(pklwire_value::decode(&bytes)?)
    }

    /// Evaluate the module itself.
    pub async fn evaluate_module(&self, source: &ModuleSource) -> Result<Value> {
        self.evaluate_expression(source, "").await
    }

    /// The module's rendered `output.text`.
    pub async fn evaluate_output_text(&self, source: &ModuleSource) -> Result<String> {
        match self.evaluate_expression(source, "output.text").await? {
            Value::String(text) => Ok(text),
            other => Err(EvaluatorError::UnexpectedResult {
                expected: "string",
                found: other.kind().to_string(),
            }),
        }
    }

    /// The module's `output.value`.
    pub async fn evaluate_output_value(&self, source: &ModuleSource) -> Result<Value> {
        self.evaluate_expression(source, "output.value").await
    }

    /// The module's `output.files`, as filename → rendered text.
    pub async fn evaluate_output_files(
        &self,
        source: &ModuleSource,
    ) -> Result<BTreeMap<String, String>> {
        let value = self.evaluate_expression(source, OUTPUT_FILES_EXPR).await?;
        let Value::Map(map) = value else {
            return Err(EvaluatorError::UnexpectedResult {
                expected: "map",
                found: value.kind().to_string(),
            });
        };
        map.into_iter()
            .map(|(name, text)| match (name, text) {
                (Value::String(name), Value::String(text)) => Ok((name, text)),
                (name, text) => Err(EvaluatorError::UnexpectedResult {
                    expected: "string to string entries",
                    found: format!("{} to {}", name.kind(), text.kind()),
                }),
            })
            .collect()
    }

    /// Close the evaluator.
    ///
    /// Pending evaluations fail with [`EvaluatorError::Closed`] and later
    /// calls fail immediately. The close request to Pkl is best effort.
    /// If this evaluator owns its manager, the manager is closed too.
    pub async fn close(&self) {
        if self.session.fail_pending(|| EvaluatorError::Closed) > 0 {
            tracing::debug!(evaluator_id = self.id(), "closed evaluator with requests in flight");
        }
        if self.connection.remove_session(self.id()).is_some() {
            let message = OutgoingMessage::CloseEvaluator {
                evaluator_id: self.id(),
            };
            if let Err(e) = self.connection.send(message).await {
                tracing::debug!(evaluator_id = self.id(), error = %e, "close request not sent");
            }
        }
        if let Some(manager) = &self.owned_manager {
            manager.close();
        }
    }
}

impl Drop for Evaluator {
    fn drop(&mut self) {
        let evaluator_id = self.id();
        self.session.fail_pending(|| EvaluatorError::Closed);
        if self.owned_manager.is_none() && self.connection.remove_session(evaluator_id).is_some() {
            match tokio::runtime::Handle::try_current() {
                Ok(handle) => {
                    let connection = Arc::clone(&self.connection);
                    handle.spawn(async move {
                        let message = OutgoingMessage::CloseEvaluator { evaluator_id };
                        if let Err(e) = connection.send(message).await {
                            tracing::debug!(evaluator_id, error = %e, "close request not sent");
                        }
                    });
                }
                Err(_) => {
                    tracing::debug!(evaluator_id, "evaluator dropped outside a runtime, close not sent");
                }
            }
        }
        if let Some(manager) = &self.owned_manager {
            manager.close();
        }
    }
}

impl fmt::Debug for Evaluator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Evaluator")
            .field("id", &self.id())
            .field("closed", &self.is_closed())
            .field("owns_manager", &self.owned_manager.is_some())
            .finish()
    }
}
