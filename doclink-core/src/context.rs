//! Deadlines and cancellation for client operations.
//!
//! A [`CallContext`] travels with a call and bounds how long it may run. Operations
//! that take a context race their backend future against the deadline and the
//! cancellation signal; whichever finishes first wins.
//!
//! ```ignore
//! use std::time::Duration;
//! use doclink::context::{CallContext, CancelHandle};
//!
//! let cancel = CancelHandle::new();
//! let ctx = CallContext::background()
//!     .with_timeout(Duration::from_secs(5))
//!     .with_cancellation(cancel.signal());
//!
//! let id = client.insert_one_with(document, &ctx).await?;
//! ```

use std::{future::Future, sync::Arc, time::Duration};

use futures::future::pending;
use tokio::{sync::watch, time::Instant};

use crate::error::Interrupted;

/// Fires a cancellation visible to every [`CancelSignal`] derived from it.
///
/// Dropping the handle without calling [`CancelHandle::cancel`] does not cancel.
#[derive(Debug, Clone)]
pub struct CancelHandle {
    sender: Arc<watch::Sender<bool>>,
}

impl CancelHandle {
    pub fn new() -> Self {
        let (sender, _) = watch::channel(false);
        Self {
            sender: Arc::new(sender),
        }
    }

    /// Cancels every operation observing a signal from this handle.
    pub fn cancel(&self) {
        self.sender.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.sender.borrow()
    }

    pub fn signal(&self) -> CancelSignal {
        CancelSignal {
            receiver: self.sender.subscribe(),
        }
    }
}

impl Default for CancelHandle {
    fn default() -> Self {
        Self::new()
    }
}

/// Observes a [`CancelHandle`].
#[derive(Debug, Clone)]
pub struct CancelSignal {
    receiver: watch::Receiver<bool>,
}

impl CancelSignal {
    pub fn is_cancelled(&self) -> bool {
        *self.receiver.borrow()
    }

    /// Resolves once the handle cancels. Never resolves if the handle is dropped first.
    pub async fn cancelled(&self) {
        let mut receiver = self.receiver.clone();
        let outcome = receiver.wait_for(|cancelled| *cancelled).await.map(|_| ());

        if outcome.is_err() {
            pending::<()>().await;
        }
    }
}

/// Deadline and cancellation carried by a single call.
#[derive(Debug, Clone, Default)]
pub struct CallContext {
    deadline: Option<Instant>,
    cancel: Option<CancelSignal>,
}

impl CallContext {
    /// A context that never interrupts.
    pub fn background() -> Self {
        Self::default()
    }

    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Sets the deadline to `timeout` from now.
    ///
    /// A timeout too large to represent as an instant leaves the context
    /// without a deadline.
    pub fn with_timeout(self, timeout: Duration) -> Self {
        match Instant::now().checked_add(timeout) {
            Some(deadline) => self.with_deadline(deadline),
            None => self,
        }
    }

    pub fn with_cancellation(mut self, signal: CancelSignal) -> Self {
        self.cancel = Some(signal);
        self
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Returns the reason this context would interrupt a call started now, if any.
    pub fn check(&self) -> Result<(), Interrupted> {
        if self.cancel.as_ref().is_some_and(CancelSignal::is_cancelled) {
            return Err(Interrupted::Cancelled);
        }
        if self.deadline.is_some_and(|deadline| deadline <= Instant::now()) {
            return Err(Interrupted::DeadlineExceeded);
        }

        Ok(())
    }

    /// Drives `future` to completion unless the context interrupts it first.
    ///
    /// A context that is already cancelled or expired never polls `future`.
    pub async fn run<F: Future>(&self, future: F) -> Result<F::Output, Interrupted> {
        self.check()?;

        tokio::select! {
            biased;
            _ = self.cancelled() => Err(Interrupted::Cancelled),
            _ = self.expired() => Err(Interrupted::DeadlineExceeded),
            output = future => Ok(output),
        }
    }

    async fn cancelled(&self) {
        match &self.cancel {
            Some(signal) => signal.cancelled().await,
            None => pending().await,
        }
    }

    async fn expired(&self) {
        match self.deadline {
            Some(deadline) => tokio::time::sleep_until(deadline).await,
            None => pending().await,
        }
    }
}
