//! Response body relayed from a backend.
//!
//! The backend stays "in flight" until the last byte of its response body has
//! been handed to the caller. Latency covers the full exchange.

use hyper::body::{Body, Frame, SizeHint};
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Instant;

use crate::load_balancer::InFlightGuard;
use crate::observability::metrics;

/// Wraps a backend response body and holds its in-flight slot.
///
/// - End of stream: the completion is recorded and the slot released.
/// - Stream error or early drop (caller went away): the slot is released and
///   nothing is recorded.
#[derive(Debug)]
pub struct TrackedBody<B> {
    inner: B,
    guard: Option<InFlightGuard>,
    started: Instant,
}

impl<B: Body> TrackedBody<B> {
    pub fn new(inner: B, guard: InFlightGuard, started: Instant) -> Self {
        let mut body = Self {
            inner,
            guard: Some(guard),
            started,
        };
        // Empty bodies may never be polled
        if body.inner.is_end_stream() {
            body.release(true);
        }
        body
    }
}

impl<B> TrackedBody<B> {
    fn release(&mut self, completed: bool) {
        let Some(guard) = self.guard.take() else {
            return;
        };
        let backend = guard.backend().clone();
        if completed {
            backend.record_completion(self.started.elapsed());
        }
        drop(guard);
        metrics::record_in_flight(backend.name(), backend.in_flight());
    }
}

impl<B> Body for TrackedBody<B>
where
    B: Body + Unpin,
{
    type Data = B::Data;
    type Error = B::Error;

    fn poll_frame(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        let this = &mut *self;
        let poll = Pin::new(&mut this.inner).poll_frame(cx);
        match &poll {
            Poll::Ready(None) => this.release(true),
            Poll::Ready(Some(Ok(_))) if this.inner.is_end_stream() => this.release(true),
            Poll::Ready(Some(Err(_))) => this.release(false),
            _ => {}
        }
        poll
    }

    fn is_end_stream(&self) -> bool {
        self.inner.is_end_stream()
    }

    fn size_hint(&self) -> SizeHint {
        self.inner.size_hint()
    }
}

impl<B> Drop for TrackedBody<B> {
    fn drop(&mut self) {
        self.release(false);
    }
}
