//! Deadline-aware, cancellable call context.

use std::future::Future;
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::status::Status;

/// Why a context is done.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextError {
    /// `cancel` was called on this context or an ancestor.
    Canceled,
    /// The effective deadline elapsed.
    DeadlineExceeded,
}

impl From<ContextError> for Status {
    fn from(err: ContextError) -> Self {
        match err {
            ContextError::Canceled => Status::canceled("context canceled"),
            ContextError::DeadlineExceeded => Status::deadline_exceeded("context deadline exceeded"),
        }
    }
}

/// Propagation unit carrying a call's effective deadline and cancel signal.
///
/// Cloning is cheap and yields a handle to the same context. Derived
/// contexts are created with [`with_timeout`](Self::with_timeout),
/// [`with_deadline`](Self::with_deadline) or [`with_cancel`](Self::with_cancel).
#[derive(Clone)]
pub struct CallContext {
    inner: Arc<Inner>,
}

struct Inner {
    /// Effective deadline: min of our own and every ancestor's.
    deadline: Option<Instant>,
    token: CancellationToken,
    /// Latched on first observation of done-ness.
    reason: OnceLock<ContextError>,
    /// When `fire` cancelled this node's token.
    fired_at: OnceLock<Instant>,
    parent: Option<CallContext>,
}

impl CallContext {
    /// A root context with no deadline. Done only once cancelled.
    pub fn background() -> Self {
        Self {
            inner: Arc::new(Inner {
                deadline: None,
                token: CancellationToken::new(),
                reason: OnceLock::new(),
                fired_at: OnceLock::new(),
                parent: None,
            }),
        }
    }

    /// Derive a child whose deadline is `timeout` from now, or the parent's
    /// if that is sooner.
    pub fn with_timeout(&self, timeout: Duration) -> (CallContext, CancelGuard) {
        self.derive(Instant::now().checked_add(timeout))
    }

    /// Derive a child with an absolute deadline, clamped to the parent's.
    pub fn with_deadline(&self, deadline: Instant) -> (CallContext, CancelGuard) {
        self.derive(Some(deadline))
    }

    /// Derive a child that inherits the parent's deadline unchanged.
    pub fn with_cancel(&self) -> (CallContext, CancelGuard) {
        self.derive(None)
    }

    /// Derive a child from an optional relative budget, measured from now.
    ///
    /// `None` means the child adds no deadline of its own.
    pub fn child_with_budget(&self, budget: Option<Duration>) -> (CallContext, CancelGuard) {
        match budget {
            Some(budget) => self.with_timeout(budget),
            None => self.with_cancel(),
        }
    }

    fn derive(&self, own: Option<Instant>) -> (CallContext, CancelGuard) {
        let deadline = match (self.inner.deadline, own) {
            (Some(parent), Some(own)) => Some(parent.min(own)),
            (parent, own) => parent.or(own),
        };

        let child = CallContext {
            inner: Arc::new(Inner {
                deadline,
                token: self.inner.token.child_token(),
                reason: OnceLock::new(),
                fired_at: OnceLock::new(),
                parent: Some(self.clone()),
            }),
        };

        let guard = CancelGuard {
            ctx: Some(child.clone()),
        };
        (child, guard)
    }

    /// Effective absolute deadline, if any.
    pub fn deadline(&self) -> Option<Instant> {
        self.inner.deadline
    }

    /// Budget left before the effective deadline. Zero once it has passed.
    pub fn remaining(&self) -> Option<Duration> {
        self.inner
            .deadline
            .map(|deadline| deadline.saturating_duration_since(Instant::now()))
    }

    /// Whether the context is cancelled or past its deadline.
    ///
    /// Once this returns `true` it returns `true` forever.
    pub fn is_done(&self) -> bool {
        if self.inner.token.is_cancelled() {
            return true;
        }
        if self.deadline_passed() {
            self.fire(ContextError::DeadlineExceeded);
            return true;
        }
        false
    }

    /// Cancel this context and everything derived from it. Idempotent.
    pub fn cancel(&self) {
        let reason = if self.deadline_passed() {
            ContextError::DeadlineExceeded
        } else {
            ContextError::Canceled
        };
        self.fire(reason);
    }

    /// Reason the context is done, or `None` while it is still live.
    pub fn err(&self) -> Option<ContextError> {
        if !self.is_done() {
            return None;
        }
        Some(self.reason())
    }

    /// [`err`](Self::err) converted to a [`Status`].
    pub fn status(&self) -> Option<Status> {
        self.err().map(Status::from)
    }

    /// Resolves once the context is done.
    pub async fn done(&self) {
        match self.inner.deadline {
            Some(deadline) => {
                tokio::select! {
                    _ = self.inner.token.cancelled() => {}
                    _ = tokio::time::sleep_until(deadline) => {
                        self.fire(ContextError::DeadlineExceeded);
                    }
                }
            }
            None => self.inner.token.cancelled().await,
        }
    }

    /// Race `operation` against this context.
    ///
    /// Returns the context's status if it is done before, or at the same
    /// time as, the operation completes.
    pub async fn run<F>(&self, operation: F) -> Result<F::Output, Status>
    where
        F: Future,
    {
        if let Some(err) = self.err() {
            return Err(err.into());
        }

        let output = tokio::select! {
            biased;
            _ = self.done() => None,
            output = operation => Some(output),
        };

        match (output, self.err()) {
            (Some(output), None) => Ok(output),
            (_, Some(err)) => Err(err.into()),
            (None, None) => Err(Status::canceled("context canceled")),
        }
    }

    fn deadline_passed(&self) -> bool {
        self.inner
            .deadline
            .is_some_and(|deadline| Instant::now() >= deadline)
    }

    fn fire(&self, reason: ContextError) {
        // The reason is latched before the token fires so that anyone who
        // sees the token cancelled also sees the reason.
        let _ = self.inner.reason.set(reason);
        let _ = self.inner.fired_at.set(Instant::now());
        self.inner.token.cancel();
    }

    /// Earliest instant this node or an ancestor was fired.
    fn fired_at(&self) -> Option<Instant> {
        let own = self.inner.fired_at.get().copied();
        let inherited = self.inner.parent.as_ref().and_then(CallContext::fired_at);
        match (own, inherited) {
            (Some(own), Some(inherited)) => Some(own.min(inherited)),
            (own, inherited) => own.or(inherited),
        }
    }

    fn reason(&self) -> ContextError {
        if let Some(reason) = self.inner.reason.get() {
            return *reason;
        }
        // Token fired through an ancestor. Our own deadline wins if it had
        // already passed when the cancel arrived, even if nobody looked.
        let expired_first = match (self.inner.deadline, self.fired_at()) {
            (Some(deadline), Some(fired_at)) => deadline <= fired_at,
            (_, None) => self.deadline_passed(),
            (None, Some(_)) => false,
        };
        let inherited = if expired_first {
            ContextError::DeadlineExceeded
        } else {
            self.inner
                .parent
                .as_ref()
                .and_then(|parent| parent.err())
                .unwrap_or(ContextError::Canceled)
        };
        *self.inner.reason.get_or_init(|| inherited)
    }
}

impl Default for CallContext {
    fn default() -> Self {
        Self::background()
    }
}

impl std::fmt::Debug for CallContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallContext")
            .field("remaining", &self.remaining())
            .field("done", &self.inner.token.is_cancelled())
            .field("has_parent", &self.inner.parent.is_some())
            .finish()
    }
}

/// Cancels the derived context it was returned with when dropped.
#[must_use = "dropping the guard cancels the context immediately"]
#[derive(Debug)]
pub struct CancelGuard {
    ctx: Option<CallContext>,
}

impl CancelGuard {
    /// Release the context now.
    pub fn cancel(mut self) {
        if let Some(ctx) = self.ctx.take() {
            ctx.cancel();
        }
    }

    /// Give up the guard without cancelling.
    ///
    /// The context then lives until its deadline or an ancestor's cancel.
    pub fn disarm(mut self) -> CallContext {
        self.ctx
            .take()
            .unwrap_or_else(CallContext::background)
    }
}

impl Drop for CancelGuard {
    fn drop(&mut self) {
        if let Some(ctx) = self.ctx.take() {
            ctx.cancel();
        }
    }
}
