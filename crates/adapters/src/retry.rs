// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! One retry discipline for every external call.
//!
//! Callers wrap an operation in [`with_retry`] and classify each result as
//! done, transient, or fatal; transient outcomes sleep on an exponential
//! backoff (`min(2^n, 32)` seconds) until the attempt budget runs out.
//! A budget of 0 retries forever.

use std::future::Future;
use std::time::Duration;

use tracing::warn;

/// Classification of one attempt.
pub enum Outcome<T, E> {
    Done(T),
    /// Worth retrying after a backoff delay.
    Transient(E),
    /// Retrying cannot help; surface immediately.
    Fatal(E),
}

/// Exponential backoff: 1, 2, 4, 8, 16, 32, 32, ... seconds.
#[derive(Debug, Clone)]
pub struct Backoff {
    attempt: u32,
    max_attempts: u32,
}

const BACKOFF_CAP_SECS: u64 = 32;

impl Backoff {
    /// `max_attempts` of 0 means unlimited.
    pub fn new(max_attempts: u32) -> Self {
        Self { attempt: 0, max_attempts }
    }

    /// Delay before the next attempt, or `None` when the budget is spent.
    pub fn next_delay(&mut self) -> Option<Duration> {
        if self.max_attempts != 0 && self.attempt >= self.max_attempts {
            return None;
        }
        let exp = self.attempt.min(5);
        self.attempt += 1;
        Some(Duration::from_secs((1u64 << exp).min(BACKOFF_CAP_SECS)))
    }

    pub fn attempts(&self) -> u32 {
        self.attempt
    }

    pub fn reset(&mut self) {
        self.attempt = 0;
    }
}

/// Run `op` until it reports done or fatal, sleeping on the backoff between
/// transient failures. Returns the last transient error once the attempt
/// budget is exhausted.
pub async fn with_retry<T, E, F, Fut>(
    what: &str,
    max_attempts: u32,
    mut op: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Outcome<T, E>>,
    E: std::fmt::Display,
{
    let mut backoff = Backoff::new(max_attempts);
    loop {
        match op().await {
            Outcome::Done(value) => return Ok(value),
            Outcome::Fatal(e) => return Err(e),
            Outcome::Transient(e) => match backoff.next_delay() {
                Some(delay) => {
                    warn!(
                        what,
                        error = %e,
                        attempt = backoff.attempts(),
                        delay_secs = delay.as_secs(),
                        "transient failure, backing off"
                    );
                    tokio::time::sleep(delay).await;
                }
                None => return Err(e),
            },
        }
    }
}

#[cfg(test)]
#[path = "retry_tests.rs"]
mod tests;
