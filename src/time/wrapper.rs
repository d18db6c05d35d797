//! Elapsed-time measurement for awaited work.

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::{Duration, Instant};

/// Wraps a future and measures the time from construction until it
/// completes.
///
/// When awaited, resolves to `(output, elapsed)`.
///
/// # Example
/// ```ignore
/// let handle = create_scheduled_task(work());
/// let (result, elapsed) = Timed::new(handle).await;
/// ```
pub struct Timed<F> {
    start: Instant,
    inner: F,
}

impl<F> Timed<F> {
    pub fn new(inner: F) -> Self {
        Timed {
            start: Instant::now(),
            inner,
        }
    }
}

impl<F: Future + Unpin> Future for Timed<F> {
    type Output = (F::Output, Duration);

    fn poll(self: Pin<&mut Self>, context: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();

        match Pin::new(&mut this.inner).poll(context) {
            Poll::Ready(output) => Poll::Ready((output, this.start.elapsed())),
            Poll::Pending => Poll::Pending,
        }
    }
}
