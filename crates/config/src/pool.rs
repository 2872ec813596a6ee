#![forbid(unsafe_code)]

use serde::{Deserialize, Serialize};
use serde_with::serde_as;
use std::time::Duration;

#[serde_as]
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct WorkerPool {
    /// Workers brought up at once when a whole list of names arrives.
    pub min_workers: usize,

    /// Hard cap on resolver threads.
    pub max_workers: usize,

    /// How long shutdown waits for workers to exit, in milliseconds.
    #[serde_as(as = "serde_with::DurationMilliSeconds")]
    pub shutdown_timeout: Duration,

    /// Queueing delay (milliseconds) after which the whole queue is abandoned.
    #[serde_as(as = "serde_with::DurationMilliSeconds")]
    pub max_queue_delay: Duration,
}

impl Default for WorkerPool {
    fn default() -> Self {
        Self {
            min_workers: 4,
            max_workers: 8,
            shutdown_timeout: Duration::from_secs(1),
            max_queue_delay: Duration::from_millis(500),
        }
    }
}

impl WorkerPool {
    /// Keep `1 <= min_workers <= max_workers`.
    pub fn clamp(self) -> Self {
        let max_workers = self.max_workers.max(1);
        Self {
            min_workers: self.min_workers.clamp(1, max_workers),
            max_workers,
            ..self
        }
    }
}
