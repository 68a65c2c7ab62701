// Copyright (C) 2022-2024 Webb Technologies Inc.
//
// Tangle is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// Tangle is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should receive a copy of the GNU General Public License
// If not, see <http://www.gnu.org/licenses/>.

//! Retry logic for async calls

use std::future::Future;
use std::time::Duration;

use backoff::backoff::Backoff;

/// Constant with Max Retry Count is a backoff policy which always returns
/// a constant duration, until it exceeds the maximum retry count.
#[derive(Debug, Clone)]
pub struct ConstantWithMaxRetryCount {
    interval: Duration,
    max_retry_count: usize,
    count: usize,
}

impl ConstantWithMaxRetryCount {
    /// Creates a new Constant backoff with `interval` and `max_retry_count`.
    /// `interval` is the duration to wait between retries, and `max_retry_count` is the maximum
    /// number of retries, after which we return `None` to indicate that we should stop retrying.
    pub fn new(interval: Duration, max_retry_count: usize) -> Self {
        Self {
            interval,
            max_retry_count,
            count: 0,
        }
    }

    /// Number of retries performed so far.
    pub fn retries(&self) -> usize {
        self.count
    }
}

impl Backoff for ConstantWithMaxRetryCount {
    fn next_backoff(&mut self) -> Option<Duration> {
        (self.count < self.max_retry_count).then(|| {
            self.count += 1;
            self.interval
        })
    }

    fn reset(&mut self) {
        self.count = 0;
    }
}

/// Runs `op` until it succeeds or the `backoff` policy gives up, treating
/// every error as transient. Each retry is reported as a
/// [`Kind::Retry`](crate::probe::Kind::Retry) probe tagged with `what`.
pub async fn retry_transient<B, F, Fut, T>(
    what: &'static str,
    backoff: B,
    mut op: F,
) -> crate::Result<T>
where
    B: Backoff,
    F: FnMut() -> Fut,
    Fut: Future<Output = crate::Result<T>>,
{
    let task = || {
        let fut = op();
        async move { fut.await.map_err(backoff::Error::transient) }
    };
    let notify = |e: crate::Error, after: Duration| {
        tracing::event!(
            target: crate::probe::TARGET,
            tracing::Level::DEBUG,
            kind = %crate::probe::Kind::Retry,
            what,
            error = %e,
            after_ms = after.as_millis() as u64,
        );
    };
    backoff::future::retry_notify(backoff, task, notify).await
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    #[test]
    fn constant_backoff_stops_after_max_retries() {
        let mut backoff =
            ConstantWithMaxRetryCount::new(Duration::from_millis(10), 2);
        assert_eq!(backoff.next_backoff(), Some(Duration::from_millis(10)));
        assert_eq!(backoff.next_backoff(), Some(Duration::from_millis(10)));
        assert_eq!(backoff.next_backoff(), None);
        backoff.reset();
        assert_eq!(backoff.retries(), 0);
    }

    #[tokio::test]
    async fn retry_transient_gives_up_with_last_error() {
        let calls = AtomicUsize::new(0);
        let backoff = ConstantWithMaxRetryCount::new(Duration::from_millis(1), 2);
        let result: crate::Result<()> =
            retry_transient("test", backoff, || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(crate::Error::Rpc("down".into())) }
            })
            .await;
        assert!(matches!(result, Err(crate::Error::Rpc(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 3, "1 call + 2 retries");
    }

    #[tokio::test]
    async fn retry_transient_returns_first_success() {
        let calls = AtomicUsize::new(0);
        let backoff = ConstantWithMaxRetryCount::new(Duration::from_millis(1), 5);
        let result = retry_transient("test", backoff, || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 1 {
                    Err(crate::Error::Rpc("flaky".into()))
                } else {
                    Ok(n)
                }
            }
        })
        .await;
        assert_eq!(result.unwrap(), 1);
    }
}
