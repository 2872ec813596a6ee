#![forbid(unsafe_code)]

mod diagnostics;
mod state;
mod worker;

pub use diagnostics::{Diagnostics, HostReport, right_to_left};

use crate::clock::Clock;
use crate::domain::{HostInfo, Motivation, PrefetchBenefit};
use crate::persistence::ReferrerRecord;
use crate::resolver::HostResolver;
use config::{CachePolicy, Config, WorkerPool};
use parking_lot::{Condvar, Mutex};
use state::SchedulerState;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, info, trace, warn};
use url::Url;

/// State shared between the public handle and the worker threads.
pub(crate) struct Shared {
    state: Mutex<SchedulerState>,
    /// Signalled when names are queued or shutdown begins.
    has_work: Condvar,
    /// Signalled when the last running worker exits.
    workers_exited: Condvar,
    /// Signalled when the queue is empty and no lookup is in flight.
    idle: Condvar,
    resolver: Arc<dyn HostResolver>,
    clock: Arc<dyn Clock>,
    cache: CachePolicy,
    pool: WorkerPool,
}

impl Shared {
    /// Start another resolver thread if the pool has room.
    fn spawn_worker(self: &Arc<Self>, state: &mut SchedulerState) -> bool {
        if state.shutting_down || state.spawned_workers >= self.pool.max_workers {
            return false;
        }
        let id = state.spawned_workers;
        let shared = Arc::clone(self);
        let spawned = thread::Builder::new()
            .name(format!("dns-prefetch-{id}"))
            .spawn(move || worker::run(shared, id));
        match spawned {
            Ok(handle) => {
                state.workers.push(handle);
                state.spawned_workers += 1;
                state.running_workers += 1;
                debug!(id, "resolver worker spawned");
                true
            }
            Err(err) => {
                warn!(%err, "failed to spawn resolver worker");
                false
            }
        }
    }

    /// Block until a name needs resolving. `None` tells the worker to exit.
    pub(crate) fn next_assignment(&self) -> Option<String> {
        let mut state = self.state.lock();
        loop {
            while state.queue.is_empty() && !state.shutting_down {
                self.has_work.wait(&mut state);
            }
            if state.shutting_down {
                return None;
            }
            let Some(hostname) = state.queue.pop() else {
                continue;
            };

            let now = self.clock.now();
            let Some(info) = state.records.get_mut(&hostname) else {
                warn!(%hostname, "queued host has no record");
                continue;
            };
            info.set_assigned_state(now);
            let waited = info.queue_duration().unwrap_or_default();

            if !self.pool.max_queue_delay.is_zero() && waited >= self.pool.max_queue_delay {
                // Names are going stale faster than we resolve them. Drop the
                // backlog so fresh, urgent requests are served quickly.
                let abandoned = state.abandon_queue(&hostname, now);
                warn!(
                    waited_ms = u64::try_from(waited.as_millis()).unwrap_or(u64::MAX),
                    abandoned,
                    "resolver queue congested"
                );
                if state.is_idle() {
                    self.idle.notify_all();
                }
                continue;
            }

            state.in_flight += 1;
            let more_work = !state.queue.is_empty();
            drop(state);
            if more_work {
                self.has_work.notify_one();
            }
            return Some(hostname);
        }
    }

    pub(crate) fn report_found(&self, hostname: &str) {
        self.finish_lookup(hostname, true);
    }

    pub(crate) fn report_not_found(&self, hostname: &str) {
        self.finish_lookup(hostname, false);
    }

    fn finish_lookup(&self, hostname: &str, found: bool) {
        let now = self.clock.now();
        let mut state = self.state.lock();
        state.finish_lookup(hostname, found, now);
        if state.is_idle() {
            self.idle.notify_all();
        }
    }

    pub(crate) fn worker_terminated(&self, id: usize) {
        let mut state = self.state.lock();
        state.running_workers = state.running_workers.saturating_sub(1);
        debug!(id, running = state.running_workers, "resolver worker exited");
        if state.running_workers == 0 {
            self.workers_exited.notify_all();
        }
    }
}

/// Speculative DNS resolution scheduler.
///
/// Hostnames are resolved ahead of need on a lazily grown pool of worker
/// threads. Every name has a [`HostInfo`] record that decides whether another
/// lookup is worthwhile; real navigations are later matched against those
/// records to measure what prefetching saved, and the referral table learns
/// which hosts to prefetch when a page is visited again.
pub struct Scheduler {
    shared: Arc<Shared>,
}

impl Scheduler {
    pub fn new(config: &Config, resolver: Arc<dyn HostResolver>, clock: Arc<dyn Clock>) -> Self {
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(SchedulerState::default()),
                has_work: Condvar::new(),
                workers_exited: Condvar::new(),
                idle: Condvar::new(),
                resolver,
                clock,
                cache: config.cache,
                pool: config.pool.clamp(),
            }),
        }
    }

    /// Prefetch a single hostname.
    pub fn resolve(&self, hostname: &str, motivation: Motivation) {
        let hostname = hostname.trim();
        if hostname.is_empty() {
            return;
        }
        let now = self.shared.clock.now();
        let queued = {
            let mut state = self.shared.state.lock();
            self.shared.spawn_worker(&mut state);
            state.enqueue(hostname, motivation, now, &self.shared.cache)
        };
        if queued {
            self.shared.has_work.notify_one();
        }
    }

    /// Prefetch a batch of hostnames, growing the pool towards its minimum
    /// size to match.
    pub fn resolve_list<I, S>(&self, hostnames: I, motivation: Motivation)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let hostnames: Vec<S> = hostnames
            .into_iter()
            .filter(|h| !h.as_ref().trim().is_empty())
            .collect();
        if hostnames.is_empty() {
            return;
        }

        let now = self.shared.clock.now();
        let mut queued = false;
        {
            let mut state = self.shared.state.lock();
            if state.spawned_workers < self.shared.pool.min_workers {
                let target = hostnames.len().min(self.shared.pool.min_workers);
                while state.spawned_workers < target {
                    if !self.shared.spawn_worker(&mut state) {
                        break;
                    }
                }
            } else {
                self.shared.spawn_worker(&mut state);
            }

            for hostname in &hostnames {
                queued |= state.enqueue(
                    hostname.as_ref().trim(),
                    motivation,
                    now,
                    &self.shared.cache,
                );
            }
        }
        if queued {
            self.shared.has_work.notify_one();
        }
    }

    /// A navigation to `hostname` is starting: prefetch the subresource hosts
    /// its pages were seen to use.
    pub fn navigating_to(&self, hostname: &str) {
        let now = self.shared.clock.now();
        let mut queued = false;
        {
            let mut state = self.shared.state.lock();
            for subresource in state.referrals.subresources(hostname) {
                self.shared.spawn_worker(&mut state);
                if state.enqueue(
                    &subresource,
                    Motivation::LearnedReferral,
                    now,
                    &self.shared.cache,
                ) {
                    if let Some(info) = state.records.get_mut(&subresource) {
                        info.set_referring_hostname(hostname);
                    }
                    queued = true;
                }
            }
        }
        if queued {
            self.shared.has_work.notify_one();
        }
    }

    /// Match a finished navigation against the prefetch for the same host.
    ///
    /// Returns true when the prefetch saved the navigation a lookup. A
    /// navigation to a host that was never prefetched teaches the referral
    /// table that `referrer_url`'s host leads to it.
    pub fn accrue_prefetch_benefits(&self, referrer_url: &str, navigation: &mut HostInfo) -> bool {
        let now = self.shared.clock.now();
        let hostname = navigation.hostname().to_owned();
        let mut state = self.shared.state.lock();

        if !state.records.contains_key(&hostname) {
            if let Some(referrer) = referring_host(referrer_url) {
                state.referrals.suggest_host(&referrer, &hostname, now);
            }
            debug!(%hostname, referrer_url, "navigation was not predicted");
            return false;
        }
        let Some(prefetched) = state.records.get_mut(&hostname) else {
            return false;
        };

        let benefit = prefetched.accrue_prefetch_benefit(navigation, &self.shared.cache);
        trace!(%hostname, ?benefit, "navigation accounted");
        match benefit {
            PrefetchBenefit::NameFound | PrefetchBenefit::NameNonexistent => {
                state.cache_hits.push(navigation.clone());
                if let Some(referrer) = navigation.referring_hostname()
                    && let Err(err) = state.referrals.accrue_value(
                        referrer,
                        &hostname,
                        navigation.benefits_remaining(),
                    )
                {
                    debug!(%err, "referral dropped before benefit arrived");
                }
                true
            }
            PrefetchBenefit::CacheEviction => {
                state.cache_evictions.push(navigation.clone());
                false
            }
            PrefetchBenefit::NoBenefit => false,
        }
    }

    /// Stop the workers. Queued names are settled as not found; lookups in
    /// progress are allowed to finish until the shutdown timeout.
    ///
    /// Returns false if some worker was still running when the timeout
    /// elapsed; such workers are abandoned.
    pub fn shutdown(&self) -> bool {
        let span = tracing::info_span!("scheduler_shutdown");
        let _enter = span.enter();

        let deadline = Instant::now() + self.shared.pool.shutdown_timeout;
        let now = self.shared.clock.now();
        let mut state = self.shared.state.lock();
        if !state.shutting_down {
            state.shutting_down = true;
            let drained = state.drain_queue_as_not_found(now);
            debug!(drained, "queue drained");
        }
        self.shared.has_work.notify_all();
        if state.is_idle() {
            self.shared.idle.notify_all();
        }

        while state.running_workers > 0 {
            if self
                .shared
                .workers_exited
                .wait_until(&mut state, deadline)
                .timed_out()
            {
                break;
            }
        }
        if state.running_workers > 0 {
            warn!(running = state.running_workers, "resolver workers did not stop in time");
            return false;
        }

        let handles = std::mem::take(&mut state.workers);
        drop(state);
        for handle in handles {
            if handle.join().is_err() {
                warn!("resolver worker panicked");
            }
        }
        info!("resolver workers stopped");
        true
    }

    /// Forget everything learned or resolved so far.
    ///
    /// Names still queued are settled as not found; records with a lookup in
    /// flight are kept, marked for deletion, until their worker reports.
    pub fn discard_all_results(&self) {
        let now = self.shared.clock.now();
        let mut state = self.shared.state.lock();
        state.referrals.clear();
        state.cache_hits.clear();
        state.cache_evictions.clear();

        let drained = state.drain_queue_as_not_found(now);
        state.records.retain(|_, info| {
            if info.is_assigned() {
                info.set_pending_delete_state();
                true
            } else {
                false
            }
        });
        info!(drained, in_flight = state.records.len(), "prefetch results discarded");
        if state.is_idle() {
            self.shared.idle.notify_all();
        }
    }

    /// Wait until nothing is queued or being resolved. Returns false if that
    /// did not happen within `timeout`.
    pub fn wait_until_idle(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut state = self.shared.state.lock();
        while !state.is_idle() {
            if self.shared.idle.wait_until(&mut state, deadline).timed_out() {
                return state.is_idle();
            }
        }
        true
    }

    pub fn was_found(&self, hostname: &str) -> bool {
        self.shared
            .state
            .lock()
            .records
            .get(hostname)
            .is_some_and(HostInfo::was_found)
    }

    /// A copy of the record for `hostname`.
    pub fn record(&self, hostname: &str) -> Option<HostInfo> {
        self.shared.state.lock().records.get(hostname).cloned()
    }

    pub fn referrals_for(&self, referrer: &str) -> Vec<String> {
        self.shared.state.lock().referrals.subresources(referrer)
    }

    pub fn serialize_referrals(&self) -> Vec<ReferrerRecord> {
        self.shared.state.lock().referrals.serialize()
    }

    /// Merge saved referrals into the live table.
    pub fn deserialize_referrals(&self, records: &[ReferrerRecord]) {
        let now = self.shared.clock.now();
        let mut state = self.shared.state.lock();
        state.referrals.deserialize(records, now);
        debug!(referrers = state.referrals.len(), "referrals merged");
    }

    pub fn diagnostics(&self) -> Diagnostics {
        let state = self.shared.state.lock();
        let mut records: Vec<HostInfo> = state.records.values().cloned().collect();
        records.sort_by(|a, b| right_to_left(a.hostname(), b.hostname()));

        Diagnostics {
            records,
            cache_hits: state.cache_hits.clone(),
            cache_evictions: state.cache_evictions.clone(),
            referrals: state.referrals.serialize(),
            queued: state.queue.iter().map(str::to_owned).collect(),
            peak_queue_depth: state.peak_queue_depth,
            workers_spawned: state.spawned_workers,
            workers_running: state.running_workers,
            in_flight: state.in_flight,
            shutting_down: state.shutting_down,
            non_network_threshold: self.shared.cache.non_network_threshold,
        }
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        let mut state = self.shared.state.lock();
        if !state.shutting_down {
            state.shutting_down = true;
            drop(state);
            self.shared.has_work.notify_all();
        }
    }
}

fn referring_host(referrer_url: &str) -> Option<String> {
    let url = Url::parse(referrer_url).ok()?;
    url.host_str()
        .filter(|host| !host.is_empty())
        .map(str::to_owned)
}
