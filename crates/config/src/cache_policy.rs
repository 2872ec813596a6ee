#![forbid(unsafe_code)]

use serde::{Deserialize, Serialize};
use serde_with::serde_as;
use std::time::Duration;

/// Heuristics used to guess whether a resolved name still lives in the OS
/// resolver cache.
#[serde_as]
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct CachePolicy {
    /// How long a resolution is assumed to stay cached, in seconds.
    #[serde_as(as = "serde_with::DurationSeconds")]
    pub expiration: Duration,

    /// Lookups faster than this (milliseconds) never touched the network.
    #[serde_as(as = "serde_with::DurationMilliSeconds")]
    pub non_network_threshold: Duration,

    /// Number of resolutions the OS cache is trusted to hold before it starts
    /// evicting older entries.
    pub max_guaranteed_cache_size: u64,
}

impl Default for CachePolicy {
    fn default() -> Self {
        Self {
            expiration: Duration::from_secs(5 * 60),
            non_network_threshold: Duration::from_millis(15),
            max_guaranteed_cache_size: 50,
        }
    }
}
