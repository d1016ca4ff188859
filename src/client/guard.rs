//! Deferred close for a shared outbound client.
//!
//! # State Transitions
//! ```text
//! Open → Closed:     close requested while no cycle is pending
//! Open → Draining:   close requested while cycles are pending
//! Draining → Closed: last pending cycle ends
//! Draining → Closed: safety-net timer fires (forced)
//! ```
//!
//! A cycle starts when a request is issued through the guard and ends when
//! the [`CycleToken`] is dropped. For guarded requests the token travels inside
//! the response body, so the cycle stays open until the body has been consumed
//! or discarded, on every exit path.

use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, Response};
use bytes::Bytes;
use futures_util::future::{BoxFuture, FutureExt};
use http_body::{Frame, SizeHint};
use parking_lot::Mutex;
use serde::Serialize;
use tokio::task::AbortHandle;

use crate::client::outbound::{ClientError, OutboundClient};
use crate::observability::metrics;

/// Lifecycle state of a guarded client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GuardState {
    /// Accepting requests, no close requested.
    Open,
    /// Close requested; waiting for pending cycles to end.
    Draining,
    /// Delegate has been closed.
    Closed,
}

/// What `request_close` did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseDisposition {
    /// No cycle was pending; the delegate is closed.
    Immediate,
    /// Cycles are pending; the delegate closes when they end.
    Deferred,
    /// The delegate was already closed.
    AlreadyClosed,
}

#[derive(Debug)]
struct Ledger {
    pending: usize,
    state: GuardState,
    safety_net: Option<AbortHandle>,
}

struct Shared<C> {
    delegate: C,
    ledger: Mutex<Ledger>,
    close_anyway_after: Duration,
}

impl<C: OutboundClient> Shared<C> {
    fn end_cycle(&self) {
        let close_now = {
            let mut ledger = self.ledger.lock();
            if ledger.pending == 0 {
                tracing::error!(state = ?ledger.state, "Request/response cycle ended more often than it was started");
                return;
            }
            ledger.pending -= 1;
            metrics::cycle_ended();
            tracing::debug!(pending = ledger.pending, "Request/response cycle ended");

            if ledger.pending == 0 && ledger.state == GuardState::Draining {
                ledger.state = GuardState::Closed;
                if let Some(timer) = ledger.safety_net.take() {
                    timer.abort();
                }
                true
            } else {
                false
            }
        };

        if close_now {
            tracing::debug!("No pending cycle left and a close was requested earlier. Closing now.");
            self.delegate.close();
        }
    }

    fn force_close(&self) {
        let pending = {
            let mut ledger = self.ledger.lock();
            if ledger.state != GuardState::Draining {
                return;
            }
            ledger.state = GuardState::Closed;
            ledger.safety_net = None;
            ledger.pending
        };

        tracing::warn!(
            pending,
            after_secs = self.close_anyway_after.as_secs(),
            "Request/response cycles still running after close deadline. Closing now to prevent resource leaks."
        );
        metrics::record_forced_close();
        self.delegate.close();
    }
}

/// Decorates an [`OutboundClient`] so that closing it only takes effect once
/// no request/response cycle is in progress.
pub struct DeferCloseClient<C> {
    shared: Arc<Shared<C>>,
}

impl<C> Clone for DeferCloseClient<C> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<C: OutboundClient> DeferCloseClient<C> {
    /// Wrap `delegate`. A requested close is forced after `close_anyway_after`
    /// even if cycles are still pending.
    pub fn new(delegate: C, close_anyway_after: Duration) -> Self {
        Self {
            shared: Arc::new(Shared {
                delegate,
                ledger: Mutex::new(Ledger {
                    pending: 0,
                    state: GuardState::Open,
                    safety_net: None,
                }),
                close_anyway_after,
            }),
        }
    }

    /// Start a request/response cycle. The cycle ends when the token drops.
    pub fn begin_cycle(&self) -> CycleToken<C> {
        let mut ledger = self.shared.ledger.lock();
        ledger.pending += 1;
        metrics::cycle_started();
        tracing::debug!(pending = ledger.pending, state = ?ledger.state, "Request/response cycle started");
        CycleToken {
            shared: Arc::clone(&self.shared),
        }
    }

    /// Close the delegate now if idle, otherwise once the last cycle ends.
    /// Never blocks.
    pub fn request_close(&self) -> CloseDisposition {
        let mut ledger = self.shared.ledger.lock();
        let state = ledger.state;
        match state {
            GuardState::Closed => {
                tracing::warn!("Close requested on an already closed client");
                CloseDisposition::AlreadyClosed
            }
            GuardState::Draining => {
                tracing::debug!(pending = ledger.pending, "Close already pending");
                CloseDisposition::Deferred
            }
            GuardState::Open if ledger.pending == 0 => {
                ledger.state = GuardState::Closed;
                drop(ledger);
                tracing::debug!("Client idle. Closing right now.");
                self.shared.delegate.close();
                CloseDisposition::Immediate
            }
            GuardState::Open => {
                tracing::debug!(
                    pending = ledger.pending,
                    "Not closing yet. Will close as soon as no request is pending."
                );
                ledger.state = GuardState::Draining;
                ledger.safety_net = self.arm_safety_net();
                CloseDisposition::Deferred
            }
        }
    }

    fn arm_safety_net(&self) -> Option<AbortHandle> {
        let runtime = match tokio::runtime::Handle::try_current() {
            Ok(runtime) => runtime,
            Err(_) => {
                tracing::warn!("No async runtime available; close deadline not armed");
                return None;
            }
        };

        let shared = Arc::clone(&self.shared);
        let deadline = self.shared.close_anyway_after;
        let task = runtime.spawn(async move {
            tokio::time::sleep(deadline).await;
            shared.force_close();
        });
        Some(task.abort_handle())
    }

    /// Number of cycles currently open.
    pub fn pending_cycles(&self) -> usize {
        self.shared.ledger.lock().pending
    }

    pub fn state(&self) -> GuardState {
        self.shared.ledger.lock().state
    }

    /// The wrapped client, for operations that need no lifecycle tracking.
    pub fn delegate(&self) -> &C {
        &self.shared.delegate
    }
}

impl<C: OutboundClient> OutboundClient for DeferCloseClient<C> {
    fn request(&self, req: Request<Body>) -> BoxFuture<'static, Result<Response<Body>, ClientError>> {
        let cycle = self.begin_cycle();
        let response = self.shared.delegate.request(req);

        async move {
            let response = response.await?;
            Ok(response.map(|inner| Body::new(CycleBody { inner, _cycle: cycle })))
        }
        .boxed()
    }

    fn close(&self) {
        self.request_close();
    }

    fn is_closed(&self) -> bool {
        self.state() == GuardState::Closed
    }
}

/// An open request/response cycle. Dropping it ends the cycle.
pub struct CycleToken<C: OutboundClient> {
    shared: Arc<Shared<C>>,
}

impl<C: OutboundClient> Drop for CycleToken<C> {
    fn drop(&mut self) {
        self.shared.end_cycle();
    }
}

/// Response body that keeps its cycle open until it is dropped.
struct CycleBody<C: OutboundClient> {
    inner: Body,
    _cycle: CycleToken<C>,
}

impl<C: OutboundClient> http_body::Body for CycleBody<C> {
    type Data = Bytes;
    type Error = axum::Error;

    fn poll_frame(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        Pin::new(&mut self.get_mut().inner).poll_frame(cx)
    }

    fn is_end_stream(&self) -> bool {
        self.inner.is_end_stream()
    }

    fn size_hint(&self) -> SizeHint {
        self.inner.size_hint()
    }
}
