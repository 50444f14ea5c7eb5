//! Worker pool and retry tuning.
//!
//! `worker_count` bounds how many workers pull from the durable queue at
//! once; `retry_base_delay`/`retry_max_delay` set the exponential backoff
//! applied on a requeue (open question decision #5 in DESIGN.md);
//! `max_retries` caps how many times a frame is requeued before it's
//! marked `failed` instead.

use std::time::Duration;

#[derive(Debug, Clone)]
pub struct OcrQueueConfig {
    /// Number of concurrent workers pulling from the queue.
    pub worker_count: usize,

    /// Retries before a frame is marked `failed` rather than requeued
    /// again. Exactly `max_retries` exhausted retries ⇒ the next failure
    /// is terminal, not another requeue.
    pub max_retries: i64,

    /// Exponential backoff base for the delay recorded on a requeue. The
    /// delay itself isn't enforced by the queue (rows are always
    /// immediately dequeueable); it's informational / used by callers
    /// that want to rate-limit how fast they hand a frame back.
    pub retry_base_delay: Duration,
    pub retry_max_delay: Duration,

    /// How long an idle worker sleeps between empty dequeue attempts.
    pub poll_interval: Duration,

    /// Backpressure bound: `enqueue` rejects once `depth() >= this`,
    /// forcing the caller (`FrameIngestor`) to drop rather than buffer.
    pub queue_max_depth: i64,

    /// Grace period workers are given to finish an in-flight extraction
    /// after `shutdown()` is called before the pool stops waiting on them.
    pub shutdown_grace: Duration,
}

impl Default for OcrQueueConfig {
    fn default() -> Self {
        Self {
            worker_count: 2,
            max_retries: 3,
            retry_base_delay: Duration::from_millis(500),
            retry_max_delay: Duration::from_secs(30),
            poll_interval: Duration::from_millis(100),
            queue_max_depth: 500,
            shutdown_grace: Duration::from_secs(10),
        }
    }
}

impl OcrQueueConfig {
    /// Backoff delay for the given retry count, doubling from
    /// `retry_base_delay` up to `retry_max_delay`.
    pub fn backoff_for(&self, retry_count: i64) -> Duration {
        let shift = retry_count.max(0).min(16) as u32;
        self.retry_base_delay
            .saturating_mul(1u32.checked_shl(shift).unwrap_or(u32::MAX))
            .min(self.retry_max_delay)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_doubles_until_the_cap() {
        let config = OcrQueueConfig {
            retry_base_delay: Duration::from_millis(100),
            retry_max_delay: Duration::from_secs(1),
            ..Default::default()
        };
        assert_eq!(config.backoff_for(0), Duration::from_millis(100));
        assert_eq!(config.backoff_for(1), Duration::from_millis(200));
        assert_eq!(config.backoff_for(2), Duration::from_millis(400));
        assert_eq!(config.backoff_for(10), Duration::from_secs(1));
    }
}
