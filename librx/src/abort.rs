//! Cooperative cancellation tokens
//!
//! An [`AbortController`] owns the abort decision; any number of
//! [`AbortSignal`]s observe it. Aborting never interrupts running code: work
//! that wants to stop early awaits [`AbortSignal::aborted`] or wraps its
//! future with [`AbortSignal::guard`].

use std::future::{pending, Future};
use std::sync::Arc;
use tokio::sync::watch;

use crate::error::{Result, RxError};

pub const DEFAULT_ABORT_REASON: &str = "aborted";

#[derive(Debug, Clone)]
pub struct AbortController {
    reason: Arc<watch::Sender<Option<String>>>,
}

impl AbortController {
    pub fn new() -> Self {
        let (reason, _) = watch::channel(None);
        Self {
            reason: Arc::new(reason),
        }
    }

    pub fn signal(&self) -> AbortSignal {
        AbortSignal {
            reason: self.reason.subscribe(),
        }
    }

    /// Abort with `reason`; only the first abort is recorded.
    pub fn abort(&self, reason: impl Into<String>) {
        let reason = reason.into();
        self.reason.send_if_modified(|current| {
            if current.is_some() {
                return false;
            }
            *current = Some(reason);
            true
        });
    }

    pub fn is_aborted(&self) -> bool {
        self.reason.borrow().is_some()
    }

    /// Whether both handles control the same token
    pub fn same(&self, other: &AbortController) -> bool {
        Arc::ptr_eq(&self.reason, &other.reason)
    }
}

impl Default for AbortController {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone)]
pub struct AbortSignal {
    reason: watch::Receiver<Option<String>>,
}

impl AbortSignal {
    pub fn is_aborted(&self) -> bool {
        self.reason.borrow().is_some()
    }

    pub fn reason(&self) -> Option<String> {
        self.reason.borrow().clone()
    }

    /// Resolves with the abort reason; pends forever if every controller is
    /// dropped without aborting.
    pub async fn aborted(&mut self) -> String {
        let reason = match self.reason.wait_for(Option::is_some).await {
            Ok(reason) => reason.clone(),
            Err(_) => None,
        };
        match reason {
            Some(reason) => reason,
            None => pending().await,
        }
    }

    /// Run `fut` unless the signal fires first.
    pub async fn guard<F: Future>(&mut self, fut: F) -> Result<F::Output> {
        tokio::select! {
            output = fut => Ok(output),
            reason = self.aborted() => Err(RxError::Aborted(reason)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_first_abort_reason_wins() {
        let ctrl = AbortController::new();
        let signal = ctrl.signal();
        assert!(!signal.is_aborted());

        ctrl.abort("superseded");
        ctrl.abort("destroyed");

        assert!(ctrl.is_aborted());
        assert_eq!(signal.reason().as_deref(), Some("superseded"));
    }

    #[test]
    fn test_same_identifies_clones() {
        let ctrl = AbortController::new();
        assert!(ctrl.same(&ctrl.clone()));
        assert!(!ctrl.same(&AbortController::new()));
    }

    #[tokio::test]
    async fn test_guard_returns_output_when_not_aborted() {
        let ctrl = AbortController::new();
        let mut signal = ctrl.signal();
        let output = signal.guard(async { 42 }).await.unwrap();
        assert_eq!(output, 42);
    }

    #[tokio::test]
    async fn test_guard_stops_on_abort() {
        let ctrl = AbortController::new();
        let mut signal = ctrl.signal();

        let aborter = ctrl.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(5)).await;
            aborter.abort("cancelled by test");
        });

        let result = signal
            .guard(tokio::time::sleep(Duration::from_secs(10)))
            .await;
        match result {
            Err(RxError::Aborted(reason)) => assert_eq!(reason, "cancelled by test"),
            other => panic!("Expected Aborted, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_signal_created_after_abort_sees_it() {
        let ctrl = AbortController::new();
        ctrl.abort(DEFAULT_ABORT_REASON);
        let mut signal = ctrl.signal();
        assert_eq!(signal.aborted().await, DEFAULT_ABORT_REASON);
    }
}
