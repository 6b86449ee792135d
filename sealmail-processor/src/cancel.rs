//! Cooperative cancellation for long-running crypto operations.
//!
//! A [`CancelHandle`] is held by whoever may abort (typically the UI); the
//! processor receives [`CancelToken`]s. Once cancelled, an operation resolves
//! to its `Cancelled` outcome and produces no partial result.

use crate::error::{ProcessorError, ProcessorResult};
use std::future;
use tokio::sync::watch;

#[derive(Debug)]
pub struct CancelHandle {
    tx: watch::Sender<bool>,
}

impl CancelHandle {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx }
    }

    pub fn token(&self) -> CancelToken {
        CancelToken {
            rx: Some(self.tx.subscribe()),
        }
    }

    /// Requests cancellation. Idempotent.
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.tx.borrow()
    }
}

impl Default for CancelHandle {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Clone, Debug, Default)]
pub struct CancelToken {
    rx: Option<watch::Receiver<bool>>,
}

impl CancelToken {
    /// A token that is never cancelled.
    pub fn none() -> Self {
        Self { rx: None }
    }

    pub fn is_cancelled(&self) -> bool {
        self.rx.as_ref().is_some_and(|rx| *rx.borrow())
    }

    /// Resolves once cancellation is requested. Pends forever for
    /// [`CancelToken::none`] or when the handle is dropped uncancelled.
    pub async fn cancelled(&self) {
        let Some(rx) = &self.rx else {
            return future::pending().await;
        };
        let mut rx = rx.clone();
        loop {
            if *rx.borrow_and_update() {
                return;
            }
            if rx.changed().await.is_err() {
                return future::pending().await;
            }
        }
    }
}

/// Runs blocking crypto work on the blocking pool, racing it against
/// cancellation. `None` means the operation was cancelled; the worker is
/// left to finish and its result is discarded.
pub(crate) async fn run_blocking<T, F>(cancel: &CancelToken, work: F) -> ProcessorResult<Option<T>>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    if cancel.is_cancelled() {
        return Ok(None);
    }
    let task = tokio::task::spawn_blocking(work);
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Ok(None),
        joined = task => match joined {
            Ok(value) => Ok(Some(value)),
            Err(err) if err.is_panic() => std::panic::resume_unwind(err.into_panic()),
            Err(err) => Err(ProcessorError::Task(err.to_string())),
        },
    }
}
