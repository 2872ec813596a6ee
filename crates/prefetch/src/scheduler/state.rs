#![forbid(unsafe_code)]

use crate::domain::{HostInfo, Motivation};
use crate::queue::HostNameQueue;
use crate::referral::ReferralTable;
use config::CachePolicy;
use std::collections::HashMap;
use std::thread::JoinHandle;
use std::time::Instant;
use tracing::{trace, warn};

/// Everything guarded by the scheduler lock.
#[derive(Debug, Default)]
pub(crate) struct SchedulerState {
    pub(crate) queue: HostNameQueue,
    pub(crate) records: HashMap<String, HostInfo>,
    pub(crate) referrals: ReferralTable,
    pub(crate) workers: Vec<JoinHandle<()>>,
    pub(crate) spawned_workers: usize,
    pub(crate) running_workers: usize,
    pub(crate) in_flight: usize,
    pub(crate) shutting_down: bool,
    pub(crate) sequence_counter: u64,
    pub(crate) cache_hits: Vec<HostInfo>,
    pub(crate) cache_evictions: Vec<HostInfo>,
    pub(crate) peak_queue_depth: usize,
}

impl SchedulerState {
    /// Queue `hostname` unless its record says a lookup is in flight or the
    /// last answer is probably still cached. Returns whether it was queued.
    pub(crate) fn enqueue(
        &mut self,
        hostname: &str,
        motivation: Motivation,
        now: Instant,
        policy: &CachePolicy,
    ) -> bool {
        if self.shutting_down {
            return false;
        }
        let info = self
            .records
            .entry(hostname.to_owned())
            .or_insert_with(|| HostInfo::new(hostname, now));
        if !info.needs_update(hostname, now, self.sequence_counter, policy) {
            trace!(hostname, state = ?info.state(), "prefetch not needed");
            return false;
        }
        info.set_queued_state(motivation, now);
        self.queue.push(hostname, motivation);
        self.peak_queue_depth = self.peak_queue_depth.max(self.queue.len());
        trace!(hostname, %motivation, depth = self.queue.len(), "queued");
        true
    }

    pub(crate) fn next_sequence(&mut self) -> u64 {
        let sequence = self.sequence_counter;
        self.sequence_counter += 1;
        sequence
    }

    /// Settle a lookup a worker has finished. Records marked for deletion
    /// while the lookup ran are dropped instead.
    pub(crate) fn finish_lookup(&mut self, hostname: &str, found: bool, now: Instant) {
        self.in_flight = self.in_flight.saturating_sub(1);

        let marked = self
            .records
            .get(hostname)
            .map(HostInfo::is_marked_to_delete);
        match marked {
            Some(true) => {
                self.records.remove(hostname);
                trace!(hostname, "discarded record released");
            }
            Some(false) => {
                let sequence = self.next_sequence();
                if let Some(info) = self.records.get_mut(hostname) {
                    if found {
                        info.set_found_state(now, sequence);
                    } else {
                        info.set_no_such_name_state(now, sequence);
                    }
                }
            }
            None => warn!(hostname, "lookup finished for unknown host"),
        }
    }

    /// Empty the queue, settling every waiting name as if it had not been
    /// found. Returns how many names were drained.
    pub(crate) fn drain_queue_as_not_found(&mut self, now: Instant) -> usize {
        let mut drained = 0;
        while let Some(hostname) = self.queue.pop() {
            let sequence = self.next_sequence();
            if let Some(info) = self.records.get_mut(&hostname) {
                info.set_assigned_state(now);
                info.set_no_such_name_state(now, sequence);
                drained += 1;
            }
        }
        drained
    }

    /// Back out `assigned` and everything still queued without resolving
    /// them. Returns how many names were abandoned.
    pub(crate) fn abandon_queue(&mut self, assigned: &str, now: Instant) -> usize {
        let mut abandoned = 0;
        if let Some(info) = self.records.get_mut(assigned) {
            info.remove_from_queue();
            abandoned += 1;
        }
        while let Some(hostname) = self.queue.pop() {
            if let Some(info) = self.records.get_mut(&hostname) {
                info.set_assigned_state(now);
                info.remove_from_queue();
                abandoned += 1;
            }
        }
        abandoned
    }

    pub(crate) fn is_idle(&self) -> bool {
        self.queue.is_empty() && self.in_flight == 0
    }
}
