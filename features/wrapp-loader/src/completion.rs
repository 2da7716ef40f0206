use std::{
    future::Future,
    pin::Pin,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    task::{Context, Poll},
};

use futures::{
    future::BoxFuture,
    task::{waker, ArcWake},
    FutureExt,
};

use crate::errors::LoadError;

/// Polls spent on work that keeps waking itself before handing it back as pending
const SYNC_POLL_LIMIT: usize = 1024;

/// Result of a loader operation
///
/// `Ready` if the operation finished without suspending, otherwise a future which
/// has to be awaited. Awaiting works in both cases.
pub enum Completion<T> {
    Ready(Option<Result<T, LoadError>>),
    Pending(BoxFuture<'static, Result<T, LoadError>>),
}
// Never pinned structurally - the pending future is boxed
impl<T> Unpin for Completion<T> {}

impl<T> Completion<T> {
    /// Drives `future` for as long as it makes progress without waiting on anything external
    ///
    /// Gives up after [SYNC_POLL_LIMIT] polls, so a hook which keeps yielding ends up
    /// pending instead of spinning the caller.
    pub(crate) fn new(future: impl Future<Output = Result<T, LoadError>> + Send + 'static) -> Self {
        let mut future = future.boxed();

        let woken = Arc::new(WokenFlag(AtomicBool::new(false)));
        let waker = waker(woken.clone());
        let mut cx = Context::from_waker(&waker);

        for _ in 0..SYNC_POLL_LIMIT {
            woken.0.store(false, Ordering::SeqCst);
            match future.poll_unpin(&mut cx) {
                Poll::Ready(result) => return Completion::Ready(Some(result)),
                // Something inside woke us during the poll - there's more to do right away
                Poll::Pending if woken.0.load(Ordering::SeqCst) => continue,
                Poll::Pending => return Completion::Pending(future),
            }
        }

        Completion::Pending(future)
    }

    pub fn is_pending(&self) -> bool {
        matches!(self, Completion::Pending(_))
    }

    /// The result, if the operation finished without suspending
    pub fn into_ready(self) -> Option<Result<T, LoadError>> {
        match self {
            Completion::Ready(result) => result,
            Completion::Pending(_) => None,
        }
    }
}

impl<T> Future for Completion<T> {
    type Output = Result<T, LoadError>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match self.get_mut() {
            Completion::Ready(result) => {
                Poll::Ready(result.take().expect("Completion polled after it finished"))
            }
            Completion::Pending(future) => future.poll_unpin(cx),
        }
    }
}

struct WokenFlag(AtomicBool);
impl ArcWake for WokenFlag {
    fn wake_by_ref(arc_self: &Arc<Self>) {
        arc_self.0.store(true, Ordering::SeqCst);
    }
}
