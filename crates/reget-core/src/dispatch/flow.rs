//! Consumer-driven backpressure for response bodies.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use tokio::sync::Notify;

use super::{AbortHandle, ResponseHandler};

/// Resume side of body backpressure, handed to `on_headers`.
///
/// A handler pauses delivery by returning `false` from `on_data`. The
/// dispatcher then holds the next chunk until [`FlowHandle::resume`] is called
/// or the request is aborted. Clones share state: every attempt of one
/// logical request, resumed ones included, observes the same pause.
#[derive(Debug, Clone, Default)]
pub struct FlowHandle {
    inner: Arc<FlowState>,
}

#[derive(Debug, Default)]
struct FlowState {
    resumes: AtomicU64,
    notify: Notify,
}

impl FlowHandle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Let a paused dispatcher continue.
    pub fn resume(&self) {
        self.inner.resumes.fetch_add(1, Ordering::AcqRel);
        self.inner.notify.notify_waiters();
    }

    fn mark(&self) -> u64 {
        self.inner.resumes.load(Ordering::Acquire)
    }

    /// Wait for a `resume` after `mark`, or for `abort` to fire.
    async fn wait_resume(&self, mark: u64, abort: &AbortHandle) {
        loop {
            let notified = self.inner.notify.notified();
            if self.mark() != mark {
                return;
            }
            tokio::select! {
                _ = notified => {}
                _ = abort.aborted() => return,
            }
        }
    }

    /// Deliver `chunk` and, if the handler asks for a pause, wait until it is
    /// resumed or `abort` fires.
    pub async fn deliver(
        &self,
        handler: &mut dyn ResponseHandler,
        chunk: Bytes,
        abort: &AbortHandle,
    ) {
        let mark = self.mark();
        if !handler.on_data(chunk) {
            tracing::trace!("body delivery paused");
            self.wait_resume(mark, abort).await;
        }
    }
}
