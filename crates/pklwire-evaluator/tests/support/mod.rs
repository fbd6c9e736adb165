//! In-memory stand-in for `pkl server`.

#![allow(dead_code)]

use bytes::BytesMut;
use pklwire_evaluator::EvaluatorManager;
use pklwire_frame::{
    decode_value, encode_raw, CreateEvaluator, Evaluate, IncomingMessage, OutgoingMessage,
    DEFAULT_MAX_MESSAGE_SIZE,
};
use pklwire_value::Value;
use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream, ReadHalf, WriteHalf};

/// The server end of a manager built with [`connect`].
pub struct FakeServer {
    reader: ReadHalf<DuplexStream>,
    writer: WriteHalf<DuplexStream>,
    buf: BytesMut,
}

/// A manager talking to a fresh fake server.
pub fn connect() -> (EvaluatorManager, FakeServer) {
    let (client, server) = tokio::io::duplex(64 * 1024);
    let (client_reader, client_writer) = tokio::io::split(client);
    let (reader, writer) = tokio::io::split(server);
    let manager = EvaluatorManager::from_streams(client_reader, client_writer);
    (
        manager,
        FakeServer {
            reader,
            writer,
            buf: BytesMut::new(),
        },
    )
}

impl FakeServer {
    /// Next message from the client, or `None` once it hangs up.
    pub async fn recv(&mut self) -> Option<OutgoingMessage> {
        loop {
            if let Some(raw) =
                decode_value(&mut self.buf, DEFAULT_MAX_MESSAGE_SIZE).expect("client frame should decode")
            {
                return Some(OutgoingMessage::from_value(raw).expect("client message should parse"));
            }
            let n = self
                .reader
                .read_buf(&mut self.buf)
                .await
                .expect("read should succeed");
            if n == 0 {
                return None;
            }
        }
    }

    pub async fn expect_message(&mut self) -> OutgoingMessage {
        self.recv().await.expect("client should send a message")
    }

    pub async fn expect_create(&mut self) -> CreateEvaluator {
        match self.expect_message().await {
            OutgoingMessage::CreateEvaluator(create) => create,
            other => panic!("expected CreateEvaluator, got {other:?}"),
        }
    }

    pub async fn expect_evaluate(&mut self) -> Evaluate {
        match self.expect_message().await {
            OutgoingMessage::Evaluate(evaluate) => evaluate,
            other => panic!("expected Evaluate, got {other:?}"),
        }
    }

    pub async fn send(&mut self, message: IncomingMessage) {
        self.send_raw(message.to_value()).await;
    }

    pub async fn send_raw(&mut self, raw: pklwire_frame::rmpv::Value) {
        let mut out = BytesMut::new();
        encode_raw(&raw, &mut out).expect("server frame should encode");
        self.writer
            .write_all(&out)
            .await
            .expect("write should succeed");
    }

    /// Answer the next create request with `evaluator_id`.
    pub async fn accept_evaluator(&mut self, evaluator_id: i64) -> CreateEvaluator {
        let create = self.expect_create().await;
        self.send(IncomingMessage::CreateEvaluatorResponse {
            request_id: create.request_id,
            evaluator_id: Some(evaluator_id),
            error: None,
        })
        .await;
        create
    }

    /// Answer an evaluate request with an encoded value.
    pub async fn reply_value(&mut self, evaluate: &Evaluate, value: &Value) {
        self.send(IncomingMessage::EvaluateResponse {
            request_id: evaluate.request_id,
            evaluator_id: evaluate.evaluator_id,
            result: Some(pklwire_value::encode(value)),
            error: None,
        })
        .await;
    }

    pub async fn reply_error(&mut self, evaluate: &Evaluate, error: &str) {
        self.send(IncomingMessage::EvaluateResponse {
            request_id: evaluate.request_id,
            evaluator_id: evaluate.evaluator_id,
            result: None,
            error: Some(error.to_string()),
        })
        .await;
    }

    /// Hang up both directions.
    pub fn hang_up(self) {
        drop(self);
    }
}
