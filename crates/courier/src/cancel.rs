//! Per-request cancellation.

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::oneshot;

/// The value a request rejects with when its [`Canceller`] fires.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Cancelled {
    message: Option<String>,
}

impl Cancelled {
    /// A cancellation without a reason.
    pub fn new() -> Self {
        Self { message: None }
    }

    /// A cancellation carrying a reason.
    pub fn with_message(message: impl Into<String>) -> Self {
        Self {
            message: Some(message.into()),
        }
    }

    /// The reason given when cancelling, if any.
    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }
}

impl fmt::Display for Cancelled {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.message {
            Some(msg) => write!(f, "Request was cancelled: {msg}"),
            None => write!(f, "Request was cancelled"),
        }
    }
}

impl std::error::Error for Cancelled {}

/// A handle that aborts exactly one in-flight request.
///
/// Returned alongside every [`PendingRequest`](crate::PendingRequest). Clones
/// share the same underlying signal, so the first `cancel` from any clone
/// wins. Once the request has settled, cancelling does nothing.
#[derive(Clone)]
pub struct Canceller {
    cancel_tx: Arc<Mutex<Option<oneshot::Sender<Cancelled>>>>,
}

impl Canceller {
    /// Create a canceller and the receiving end the request task listens on.
    pub(crate) fn pair() -> (Self, oneshot::Receiver<Cancelled>) {
        let (cancel_tx, cancel_rx) = oneshot::channel();
        let canceller = Self {
            cancel_tx: Arc::new(Mutex::new(Some(cancel_tx))),
        };
        (canceller, cancel_rx)
    }

    /// Cancel the request.
    ///
    /// Returns `true` if the signal reached a request that was still pending,
    /// `false` if it had already settled or was already cancelled.
    pub fn cancel(&self) -> bool {
        self.cancel_with(Cancelled::new())
    }

    /// Cancel the request with a reason carried by the rejection.
    pub fn cancel_with_message(&self, message: impl Into<String>) -> bool {
        self.cancel_with(Cancelled::with_message(message))
    }

    fn cancel_with(&self, reason: Cancelled) -> bool {
        if let Some(tx) = self.cancel_tx.lock().take() {
            tx.send(reason).is_ok()
        } else {
            false
        }
    }

    /// Check if the request is still pending.
    pub fn is_pending(&self) -> bool {
        self.cancel_tx.lock().is_some()
    }

    /// Disarm the handle once the request has settled.
    pub(crate) fn settle(&self) {
        self.cancel_tx.lock().take();
    }
}

impl fmt::Debug for Canceller {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Canceller")
            .field("pending", &self.is_pending())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cancel_delivers_reason_once() {
        let (canceller, mut rx) = Canceller::pair();
        assert!(canceller.is_pending());
        assert!(canceller.cancel_with_message("navigated away"));
        assert!(!canceller.is_pending());
        assert!(!canceller.cancel());

        let reason = rx.try_recv().expect("reason delivered");
        assert_eq!(reason.message(), Some("navigated away"));
    }

    #[test]
    fn cancel_after_settle_is_noop() {
        let (canceller, mut rx) = Canceller::pair();
        canceller.settle();
        assert!(!canceller.cancel());
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn clones_share_the_signal() {
        let (canceller, _rx) = Canceller::pair();
        let other = canceller.clone();
        assert!(other.cancel());
        assert!(!canceller.is_pending());
    }

    #[test]
    fn display() {
        assert_eq!(Cancelled::new().to_string(), "Request was cancelled");
        assert_eq!(
            Cancelled::with_message("timeout by user").to_string(),
            "Request was cancelled: timeout by user"
        );
    }
}
