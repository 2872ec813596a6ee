#![forbid(unsafe_code)]

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

/// Upper bound on subresources remembered per referring host.
pub const MAX_SUGGESTIONS: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReferralStats {
    latency: Duration,
    birth_time: Instant,
}

impl ReferralStats {
    fn new(birth_time: Instant) -> Self {
        Self {
            latency: Duration::ZERO,
            birth_time,
        }
    }

    /// Total lookup latency this subresource has saved so far.
    pub fn latency(&self) -> Duration {
        self.latency
    }

    /// Whether `self` has earned its slot less than `other` has.
    ///
    /// Entries that never saved anything rank lowest, the oldest of them
    /// first. The rest are ranked by latency saved per unit of lifetime.
    fn less_useful_than(&self, other: &Self, now: Instant) -> bool {
        let latency = self.latency.as_millis();
        let lifetime = now.saturating_duration_since(self.birth_time).as_millis();
        let other_latency = other.latency.as_millis();
        let other_lifetime = now.saturating_duration_since(other.birth_time).as_millis();

        match (latency == 0, other_latency == 0) {
            (true, true) => lifetime > other_lifetime,
            (true, false) => true,
            (false, true) => false,
            // cross-multiplied latency/lifetime ratios
            (false, false) => latency * other_lifetime < other_latency * lifetime,
        }
    }
}

/// The subresource hosts one referring host is known to pull in.
#[derive(Debug, Clone, Default)]
pub struct Referrer {
    subresources: BTreeMap<String, ReferralStats>,
}

impl Referrer {
    /// Remember `host` as a subresource, making room if the set is full.
    /// Returns the host evicted to make room, if any.
    pub fn suggest_host(&mut self, host: &str, now: Instant) -> Option<String> {
        if host.is_empty() || self.subresources.contains_key(host) {
            return None;
        }
        let evicted = if self.subresources.len() >= MAX_SUGGESTIONS {
            self.delete_least_useful(now)
        } else {
            None
        };
        self.subresources
            .insert(host.to_owned(), ReferralStats::new(now));
        evicted
    }

    /// Credit `host` with `delta` of saved latency. Returns false if `host`
    /// is not (or no longer) in the set.
    pub fn accrue_value(&mut self, host: &str, delta: Duration) -> bool {
        match self.subresources.get_mut(host) {
            Some(stats) => {
                stats.latency = stats.latency.saturating_add(delta);
                true
            }
            None => false,
        }
    }

    pub fn get(&self, host: &str) -> Option<&ReferralStats> {
        self.subresources.get(host)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ReferralStats)> {
        self.subresources.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn hosts(&self) -> impl Iterator<Item = &str> {
        self.subresources.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.subresources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.subresources.is_empty()
    }

    fn delete_least_useful(&mut self, now: Instant) -> Option<String> {
        let mut least: Option<(&String, &ReferralStats)> = None;
        for (host, stats) in &self.subresources {
            match least {
                Some((_, current)) if !stats.less_useful_than(current, now) => {}
                _ => least = Some((host, stats)),
            }
        }
        let host = least.map(|(host, _)| host.clone())?;
        self.subresources.remove(&host);
        Some(host)
    }
}
