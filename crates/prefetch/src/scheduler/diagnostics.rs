#![forbid(unsafe_code)]

use crate::domain::HostInfo;
use crate::persistence::ReferrerRecord;
use std::cmp::Ordering;
use std::time::Duration;

/// Point-in-time copy of the scheduler state, for reporting.
#[derive(Debug, Clone)]
pub struct Diagnostics {
    /// Every known host, ordered by [`right_to_left`].
    pub records: Vec<HostInfo>,
    /// Navigations that a prefetch sped up.
    pub cache_hits: Vec<HostInfo>,
    /// Navigations that found the prefetched answer already evicted.
    pub cache_evictions: Vec<HostInfo>,
    pub referrals: Vec<ReferrerRecord>,
    pub queued: Vec<String>,
    pub peak_queue_depth: usize,
    pub workers_spawned: usize,
    pub workers_running: usize,
    pub in_flight: usize,
    pub shutting_down: bool,
    pub(crate) non_network_threshold: Duration,
}

/// Records split the way a diagnostic page lists them.
#[derive(Debug, Clone, Default)]
pub struct HostReport {
    pub cache_hits: Vec<HostInfo>,
    pub cache_evictions: Vec<HostInfo>,
    /// Resolved over the network; no navigation has used the result yet.
    pub network_hits: Vec<HostInfo>,
    /// Resolved so fast the answer must already have been cached.
    pub already_cached: Vec<HostInfo>,
    pub name_not_found: Vec<HostInfo>,
}

impl Diagnostics {
    pub fn host_report(&self) -> HostReport {
        let mut report = HostReport {
            cache_hits: self.cache_hits.clone(),
            cache_evictions: self.cache_evictions.clone(),
            ..Default::default()
        };

        for info in &self.records {
            if info.was_nonexistent() {
                report.name_not_found.push(info.clone());
            } else if !info.was_found() {
                // still in flight, or never looked up
            } else if info
                .resolve_duration()
                .is_some_and(|d| d < self.non_network_threshold)
            {
                report.already_cached.push(info.clone());
            } else if !info.benefits_remaining().is_zero() {
                report.network_hits.push(info.clone());
            }
        }
        report
    }
}

/// Orders hostnames by their labels read from the top-level domain down, so
/// `mail.example.com` sorts next to `www.example.com`.
pub fn right_to_left(a: &str, b: &str) -> Ordering {
    a.rsplit('.').cmp(b.rsplit('.'))
}
