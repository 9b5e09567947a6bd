use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::error::{Error, ErrorKind};

/// A handle that can abort a running render.
///
/// The handle is passed to
/// [`render_cancelable`](crate::Template::render_cancelable) and can be
/// signalled from another thread.  The evaluator checks it once per
/// statement and expression evaluation and aborts with an error when it
/// has been signalled.
///
/// ```
/// # use stencil::CancelHandle;
/// let handle = CancelHandle::new();
/// # let cloned = handle.clone();
/// // from another thread:
/// cloned.cancel();
/// ```
#[derive(Debug, Default)]
pub struct CancelHandle {
    cancelled: AtomicBool,
}

impl CancelHandle {
    /// Creates a new cancellation handle.
    ///
    /// The handle is always wrapped in an `Arc` so that it can be shared
    /// with the thread that performs the render.
    pub fn new() -> Arc<CancelHandle> {
        Arc::new(CancelHandle::default())
    }

    /// Signals the handle.
    ///
    /// The running render aborts at the next evaluation step.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Relaxed);
    }

    /// Returns `true` if the handle was signalled.
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Relaxed)
    }

    /// Returns the error the render aborts with.
    pub(crate) fn abort_error(&self) -> Error {
        Error::new(ErrorKind::InvalidOperation, "render was cancelled")
    }
}
