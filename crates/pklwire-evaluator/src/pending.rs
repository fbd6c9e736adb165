//! Pending-request tracking.
//!
//! Before a request is written, it is registered here to obtain a oneshot
//! receiver. The read loop resolves entries as responses arrive; closing the
//! owning scope fails whatever is left. Every entry is consumed exactly once.

use std::collections::HashMap;
use std::sync::Mutex;

use tokio::sync::oneshot;

use crate::error::{EvaluatorError, Result};

/// Why a registration was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Refused {
    Closed,
    Duplicate,
}

pub(crate) struct PendingRequests<T> {
    state: Mutex<PendingState<T>>,
}

struct PendingState<T> {
    pending: HashMap<i64, oneshot::Sender<Result<T>>>,
    closed: bool,
}

impl<T> PendingRequests<T> {
    pub(crate) fn new() -> Self {
        Self {
            state: Mutex::new(PendingState {
                pending: HashMap::new(),
                closed: false,
            }),
        }
    }

    /// Register a request id and return the receiver for its outcome.
    pub(crate) fn register(
        &self,
        id: i64,
    ) -> std::result::Result<oneshot::Receiver<Result<T>>, Refused> {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        if state.closed {
            return Err(Refused::Closed);
        }
        if state.pending.contains_key(&id) {
            return Err(Refused::Duplicate);
        }
        let (tx, rx) = oneshot::channel();
        state.pending.insert(id, tx);
        Ok(rx)
    }

    /// Deliver an outcome. Returns `false` if no request with this id is pending.
    pub(crate) fn resolve(&self, id: i64, outcome: Result<T>) -> bool {
        let tx = {
            let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
            state.pending.remove(&id)
        };
        match tx {
            // A dropped receiver means the caller gave up; the entry is still consumed.
            Some(sender) => {
                let _ = sender.send(outcome);
                true
            }
            None => false,
        }
    }

    /// Drop a request without delivering anything (e.g. the write failed).
    pub(crate) fn remove(&self, id: i64) -> bool {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.pending.remove(&id).is_some()
    }

    /// Fail every pending request and refuse new ones.
    ///
    /// Returns the number of requests failed. Idempotent.
    pub(crate) fn close(&self, error: impl Fn() -> EvaluatorError) -> usize {
        let drained: Vec<_> = {
            let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
            state.closed = true;
            state.pending.drain().collect()
        };
        let count = drained.len();
        for (_, sender) in drained {
            let _ = sender.send(Err(error()));
        }
        count
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.state.lock().unwrap_or_else(|e| e.into_inner()).closed
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.state
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .pending
            .len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_resolve_delivers_to_receiver() {
        let pending = PendingRequests::<u32>::new();
        let rx = pending.register(1).unwrap();
        assert!(pending.resolve(1, Ok(7)));
        assert_eq!(rx.await.unwrap().unwrap(), 7);
        assert_eq!(pending.len(), 0);
    }

    #[test]
    fn test_duplicate_registration_refused() {
        let pending = PendingRequests::<u32>::new();
        let _rx = pending.register(5).unwrap();
        assert_eq!(pending.register(5).unwrap_err(), Refused::Duplicate);
    }

    #[test]
    fn test_resolve_unknown_id() {
        let pending = PendingRequests::<u32>::new();
        assert!(!pending.resolve(99, Ok(1)));
    }

    #[test]
    fn test_resolve_consumes_once() {
        let pending = PendingRequests::<u32>::new();
        let _rx = pending.register(3).unwrap();
        assert!(pending.resolve(3, Ok(1)));
        assert!(!pending.resolve(3, Ok(2)));
    }

    #[tokio::test]
    async fn test_close_fails_all_and_refuses_new() {
        let pending = PendingRequests::<u32>::new();
        let rx1 = pending.register(1).unwrap();
        let rx2 = pending.register(2).unwrap();

        assert_eq!(pending.close(|| EvaluatorError::Closed), 2);
        assert!(matches!(rx1.await.unwrap(), Err(EvaluatorError::Closed)));
        assert!(matches!(rx2.await.unwrap(), Err(EvaluatorError::Closed)));

        assert!(pending.is_closed());
        assert_eq!(pending.register(3).unwrap_err(), Refused::Closed);
        assert_eq!(pending.close(|| EvaluatorError::Closed), 0);
    }

    #[test]
    fn test_remove() {
        let pending = PendingRequests::<u32>::new();
        let _rx = pending.register(4).unwrap();
        assert!(pending.remove(4));
        assert!(!pending.remove(4));
    }
}
