//! One duplex message stream to a Pkl server, shared by every evaluator.
//!
//! # Architecture
//!
//! - A single read-loop task decodes incoming messages and routes them:
//!   create responses to the connection's pending map, everything else to
//!   the session named by its evaluator id.
//! - Writes go through a `tokio::sync::Mutex` around a `FramedWrite`, so
//!   exactly one message is in flight and each send completes after flush.
//! - Read/list callbacks run as spawned tasks and reply through the same
//!   writer; a slow reader never stalls the read loop.
//! - The read loop holds only a `Weak` reference. Dropping the last handle
//!   drops the child process (killed on drop) and ends the loop.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, Weak};

use futures_util::{SinkExt, StreamExt};
use pklwire_frame::{code, FrameConfig, IncomingMessage, MessageCodec, OutgoingMessage};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::process::Child;
use tokio::sync::oneshot;
use tokio_util::codec::{FramedRead, FramedWrite};

use crate::error::{EvaluatorError, Result};
use crate::evaluator::Session;
use crate::pending::{PendingRequests, Refused};
use crate::request_id::RequestIdGenerator;

type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

pub(crate) struct Connection {
    writer: tokio::sync::Mutex<FramedWrite<BoxedWriter, MessageCodec>>,
    creates: PendingRequests<i64>,
    sessions: Mutex<HashMap<i64, Arc<Session>>>,
    ids: Mutex<RequestIdGenerator>,
    closed: AtomicBool,
    child: Mutex<Option<Child>>,
    /// Dropped on shutdown (or with the connection) to stop the read loop.
    stop: Mutex<Option<oneshot::Sender<()>>>,
}

impl Connection {
    /// Start the protocol over a stream pair and spawn the read loop.
    ///
    /// Must be called inside a tokio runtime.
    pub(crate) fn start<R, W>(
        reader: R,
        writer: W,
        child: Option<Child>,
        config: FrameConfig,
    ) -> Arc<Self>
    where
        R: AsyncRead + Send + Unpin + 'static,
        W: AsyncWrite + Send + Unpin + 'static,
    {
        let (stop_tx, stop_rx) = oneshot::channel();
        let writer: BoxedWriter = Box::new(writer);
        let connection = Arc::new(Self {
            writer: tokio::sync::Mutex::new(FramedWrite::new(
                writer,
                MessageCodec::new(config.clone()),
            )),
            creates: PendingRequests::new(),
            sessions: Mutex::new(HashMap::new()),
            ids: Mutex::new(RequestIdGenerator::new(0)),
            closed: AtomicBool::new(false),
            child: Mutex::new(child),
            stop: Mutex::new(Some(stop_tx)),
        });

        let frames = FramedRead::new(reader, MessageCodec::new(config));
        tokio::spawn(read_loop(Arc::downgrade(&connection), frames, stop_rx));
        connection
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Write one message and flush it.
    ///
    /// A write failure is fatal to the connection.
    pub(crate) async fn send(&self, message: OutgoingMessage) -> Result<()> {
        if self.is_closed() {
            return Err(EvaluatorError::ConnectionClosed(
                "connection is shut down".to_string(),
            ));
        }
        let code = message.code();
        let result = {
            let mut writer = self.writer.lock().await;
            writer.send(message).await
        };
        match result {
            Ok(()) => {
                tracing::trace!(code = code::code_name(code), "sent message");
                Ok(())
            }
            Err(e) => {
                let reason = format!("write failed: {e}");
                self.shutdown(&reason);
                Err(EvaluatorError::Frame(e))
            }
        }
    }

    /// Send `CreateEvaluator` and wait for the evaluator id.
    pub(crate) async fn create_evaluator(
        &self,
        message: pklwire_frame::CreateEvaluator,
    ) -> Result<i64> {
        let request_id = message.request_id;
        let rx = match self.creates.register(request_id) {
            Ok(rx) => rx,
            Err(Refused::Closed) => {
                return Err(EvaluatorError::ConnectionClosed(
                    "connection is shut down".to_string(),
                ))
            }
            Err(Refused::Duplicate) => return Err(EvaluatorError::DuplicateRequestId(request_id)),
        };

        if let Err(e) = self.send(OutgoingMessage::CreateEvaluator(message)).await {
            self.creates.remove(request_id);
            return Err(e);
        }

        rx.await.map_err(|_| {
            EvaluatorError::ConnectionClosed("create request was dropped".to_string())
        })?
    }

    pub(crate) fn next_request_id(&self) -> i64 {
        self.ids
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .next_id()
    }

    /// Register a session so its messages can be routed.
    pub(crate) fn insert_session(&self, session: Arc<Session>) -> Result<()> {
        let mut sessions = self.sessions.lock().unwrap_or_else(|e| e.into_inner());
        // Checked under the lock so shutdown cannot miss this session.
        if self.is_closed() {
            return Err(EvaluatorError::ConnectionClosed(
                "connection is shut down".to_string(),
            ));
        }
        sessions.insert(session.id(), session);
        Ok(())
    }

    pub(crate) fn remove_session(&self, evaluator_id: i64) -> Option<Arc<Session>> {
        self.sessions
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&evaluator_id)
    }

    fn session(&self, evaluator_id: i64) -> Option<Arc<Session>> {
        self.sessions
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(&evaluator_id)
            .cloned()
    }

    /// Route one decoded message.
    fn dispatch(self: &Arc<Self>, message: IncomingMessage) {
        let code = message.code();
        tracing::trace!(code = code::code_name(code), "received message");

        if let IncomingMessage::CreateEvaluatorResponse {
            request_id,
            evaluator_id,
            error,
        } = message
        {
            let outcome = match (evaluator_id, error) {
                (_, Some(error)) => Err(EvaluatorError::CreateFailed(error)),
                (Some(id), None) => Ok(id),
                (None, None) => Err(EvaluatorError::CreateFailed(
                    "response carried neither an evaluator id nor an error".to_string(),
                )),
            };
            if !self.creates.resolve(request_id, outcome) {
                tracing::warn!(request_id, "create evaluator response for unknown request id");
            }
            return;
        }

        let Some(evaluator_id) = message.evaluator_id() else {
            return;
        };
        let Some(session) = self.session(evaluator_id) else {
            tracing::warn!(
                evaluator_id,
                code = code::code_name(code),
                "message for unknown evaluator; dropping"
            );
            return;
        };

        match message {
            IncomingMessage::EvaluateResponse {
                request_id,
                result,
                error,
                ..
            } => session.handle_evaluate_response(request_id, result, error),
            IncomingMessage::Log {
                level,
                message,
                frame_uri,
                ..
            } => session.handle_log(level, &message, &frame_uri),
            callback => {
                let connection = Arc::clone(self);
                tokio::spawn(async move {
                    let reply = match callback {
                        IncomingMessage::ReadResource(req) => session.handle_read_resource(req).await,
                        IncomingMessage::ReadModule(req) => session.handle_read_module(req).await,
                        IncomingMessage::ListResources(req) => {
                            session.handle_list_resources(req).await
                        }
                        IncomingMessage::ListModules(req) => session.handle_list_modules(req).await,
                        _ => return,
                    };
                    if let Err(e) = connection.send(reply).await {
                        tracing::warn!(evaluator_id, error = %e, "failed to send reader reply");
                    }
                });
            }
        }
    }

    /// Tear the connection down: fail every pending create and session
    /// request, close every session, stop the read loop and kill the child.
    ///
    /// Idempotent.
    pub(crate) fn shutdown(&self, reason: &str) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }

        let failed_creates = self
            .creates
            .close(|| EvaluatorError::ConnectionClosed(reason.to_string()));

        let sessions: Vec<Arc<Session>> = {
            let mut sessions = self.sessions.lock().unwrap_or_else(|e| e.into_inner());
            sessions.drain().map(|(_, s)| s).collect()
        };
        let mut failed_requests = 0;
        for session in &sessions {
            failed_requests +=
                session.fail_pending(|| EvaluatorError::ConnectionClosed(reason.to_string()));
        }

        tracing::debug!(
            reason,
            sessions = sessions.len(),
            failed_creates,
            failed_requests,
            "pkl connection closed"
        );

        drop(self.stop.lock().unwrap_or_else(|e| e.into_inner()).take());

        if let Some(mut child) = self.child.lock().unwrap_or_else(|e| e.into_inner()).take() {
            if let Err(e) = child.start_kill() {
                tracing::debug!(error = %e, "pkl server already exited");
            }
        }
    }

    /// Exit status of the child if it has already exited.
    fn exit_status(&self) -> Option<std::process::ExitStatus> {
        let mut child = self.child.lock().unwrap_or_else(|e| e.into_inner());
        child.as_mut().and_then(|c| c.try_wait().ok().flatten())
    }
}

async fn read_loop<R>(
    connection: Weak<Connection>,
    mut frames: FramedRead<R, MessageCodec>,
    mut stop: oneshot::Receiver<()>,
) where
    R: AsyncRead + Send + Unpin,
{
    let reason = loop {
        let next = tokio::select! {
            next = frames.next() => next,
            _ = &mut stop => return,
        };
        let Some(conn) = connection.upgrade() else {
            return;
        };
        match next {
            Some(Ok(Ok(message))) => conn.dispatch(message),
            Some(Ok(Err(e))) => {
                tracing::warn!(error = %e, "dropping malformed message");
            }
            Some(Err(e)) => break format!("read failed: {e}"),
            None => {
                break match conn.exit_status() {
                    Some(status) => format!("pkl server exited ({status})"),
                    None => "pkl server closed its output".to_string(),
                }
            }
        }
    };

    if let Some(conn) = connection.upgrade() {
        tracing::warn!(%reason, "pkl connection lost");
        conn.shutdown(&reason);
    }
}
