// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Bounded retry with exponential backoff for unicast exchanges.

use crate::cancel::{cancelled_or_never, CancelToken};
use crate::config;
use crate::error::{Error, Result};
use crate::protocol::Envelope;
use crate::transport::UdpLink;
use std::net::SocketAddr;
use std::time::Duration;

/// Configuration for retry backoff.
#[derive(Debug, Clone, Copy)]
pub struct RetryConfig {
    /// Extra attempts after the first failure.
    pub attempts: u32,
    /// Delay before the first retry.
    pub base_delay: Duration,
    /// Delay cap regardless of attempt count.
    pub max_delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            attempts: config::DEFAULT_RETRY_ATTEMPTS,
            base_delay: config::RETRY_BASE_DELAY,
            max_delay: config::RETRY_MAX_DELAY,
        }
    }
}

impl RetryConfig {
    /// No retries: exactly one attempt.
    #[must_use]
    pub fn none() -> Self {
        Self {
            attempts: 0,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_attempts(mut self, attempts: u32) -> Self {
        self.attempts = attempts;
        self
    }

    #[must_use]
    pub fn with_delays(mut self, base: Duration, max: Duration) -> Self {
        self.base_delay = base;
        self.max_delay = max;
        self
    }

    /// Delay before retry number `attempt` (1-based).
    ///
    /// Exponential: `base * 2^(attempt - 1)`, capped at `max_delay`.
    #[must_use]
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1);
        let factor = 2u32.saturating_pow(exponent);
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }
}

/// Unicast exchange with bounded retries.
///
/// Transient failures (socket errors, timeouts, unusable replies) retry up
/// to `retry.attempts` extra times with increasing backoff; the last
/// transient error is surfaced on exhaustion. Cancellation short-circuits
/// immediately, including during a backoff sleep, and is never retried.
pub async fn send_with_retry(
    link: &UdpLink,
    command: &Envelope,
    target: SocketAddr,
    timeout: Duration,
    cancel: Option<&CancelToken>,
    retry: &RetryConfig,
) -> Result<Envelope> {
    let mut attempt = 0u32;
    loop {
        match link.request(command, target, timeout, cancel).await {
            Ok(reply) => return Ok(reply),
            Err(err) if err.is_transient() && attempt < retry.attempts => {
                attempt += 1;
                let delay = retry.backoff_delay(attempt);
                log::warn!(
                    "[RETRY] attempt {}/{} to {} failed ({}), backing off {:?}",
                    attempt,
                    retry.attempts,
                    target,
                    err,
                    delay
                );
                tokio::select! {
                    () = tokio::time::sleep(delay) => {}
                    () = cancelled_or_never(cancel) => return Err(Error::Cancelled),
                }
            }
            Err(err) => {
                if err.is_transient() {
                    log::warn!(
                        "[RETRY] giving up on {} after {} attempt(s): {}",
                        target,
                        attempt + 1,
                        err
                    );
                }
                return Err(err);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_doubles_per_attempt() {
        let cfg = RetryConfig::default().with_delays(
            Duration::from_millis(100),
            Duration::from_millis(10_000),
        );

        assert_eq!(cfg.backoff_delay(1), Duration::from_millis(100));
        assert_eq!(cfg.backoff_delay(2), Duration::from_millis(200));
        assert_eq!(cfg.backoff_delay(3), Duration::from_millis(400));
        assert_eq!(cfg.backoff_delay(4), Duration::from_millis(800));
    }

    #[test]
    fn backoff_respects_cap() {
        let cfg = RetryConfig::default()
            .with_delays(Duration::from_millis(100), Duration::from_millis(500));

        for attempt in 1..12 {
            assert!(cfg.backoff_delay(attempt) <= Duration::from_millis(500));
        }
        assert_eq!(cfg.backoff_delay(10), Duration::from_millis(500));
    }

    #[test]
    fn none_means_single_attempt() {
        assert_eq!(RetryConfig::none().attempts, 0);
    }
}
