//! Deferred resolution bookkeeping.
//!
//! A component may return [`Hook::Deferred`](crate::runtime::control::Hook)
//! from `before_mount` or `before_update`: the render proceeds immediately
//! and the resolved value arrives later over a oneshot channel. The runtime
//! polls pending deferreds without blocking; a resolution for a control that
//! has since unmounted, or that re-issued its deferred, is dropped silently.

use tokio::sync::oneshot;
use tokio::sync::oneshot::error::TryRecvError;

use crate::runtime::control::ControlId;
use crate::scope::Value;

/// One outstanding deferred resolution.
pub(crate) struct PendingDeferred {
    pub(crate) control: ControlId,
    /// Epoch of the control when the deferred was issued. The value only
    /// applies while the control's epoch still matches.
    pub(crate) epoch: u64,
    pub(crate) rx: oneshot::Receiver<Value>,
}

/// Non-blocking poll result.
pub(crate) enum PollOutcome {
    Ready(Value),
    Pending,
    Closed,
}

impl PendingDeferred {
    pub(crate) fn poll(&mut self) -> PollOutcome {
        match self.rx.try_recv() {
            Ok(value) => PollOutcome::Ready(value),
            Err(TryRecvError::Empty) => PollOutcome::Pending,
            Err(TryRecvError::Closed) => PollOutcome::Closed,
        }
    }
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn pending_with_channel() -> (oneshot::Sender<Value>, PendingDeferred) {
        let (tx, rx) = oneshot::channel();
        let pending = PendingDeferred {
            control: ControlId::default(),
            epoch: 0,
            rx,
        };
        (tx, pending)
    }

    #[test]
    fn test_poll_pending_until_sent() {
        let (tx, mut pending) = pending_with_channel();
        assert!(matches!(pending.poll(), PollOutcome::Pending));
        tx.send(Value::Number(3.0)).unwrap();
        match pending.poll() {
            PollOutcome::Ready(value) => assert_eq!(value, Value::Number(3.0)),
            _ => panic!("expected ready"),
        }
    }

    #[test]
    fn test_dropped_sender_closes() {
        let (tx, mut pending) = pending_with_channel();
        drop(tx);
        assert!(matches!(pending.poll(), PollOutcome::Closed));
    }
}
