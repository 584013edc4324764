// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Caller-initiated cancellation.
//!
//! Every blocking operation accepts an optional [`CancelToken`]; firing it
//! resolves the operation with [`Error::Cancelled`](crate::Error::Cancelled)
//! immediately and releases its transport bookkeeping. Timeouts compose with
//! the token: a deadline is an automatically-firing cancellation raced
//! against the caller-supplied signal.

use std::pin::pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;

/// Clone-shareable cancellation signal.
///
/// Fires at most once; clones observe the same state. Cancelling an
/// already-cancelled token is a no-op.
#[derive(Clone, Debug, Default)]
pub struct CancelToken {
    inner: Arc<Inner>,
}

#[derive(Debug, Default)]
struct Inner {
    fired: AtomicBool,
    notify: Notify,
}

impl CancelToken {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Fire the signal, waking every pending `cancelled()` waiter.
    pub fn cancel(&self) {
        if !self.inner.fired.swap(true, Ordering::SeqCst) {
            self.inner.notify.notify_waiters();
        }
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.inner.fired.load(Ordering::SeqCst)
    }

    /// Resolve once the token fires. Resolves immediately if it already has.
    pub async fn cancelled(&self) {
        loop {
            if self.is_cancelled() {
                return;
            }
            let mut notified = pin!(self.inner.notify.notified());
            // Register before the re-check so a cancel() between the check
            // and the await cannot be missed.
            notified.as_mut().enable();
            if self.is_cancelled() {
                return;
            }
            notified.await;
        }
    }
}

/// Wait on the token if one was supplied, otherwise never resolve.
pub(crate) async fn cancelled_or_never(token: Option<&CancelToken>) {
    match token {
        Some(token) => token.cancelled().await,
        None => std::future::pending::<()>().await,
    }
}
