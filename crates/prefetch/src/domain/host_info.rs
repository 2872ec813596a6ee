#![forbid(unsafe_code)]

use super::Motivation;
use config::CachePolicy;
use std::time::{Duration, Instant};
use tracing::trace;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolutionState {
    Pending,
    Queued,
    Assigned,
    AssignedMarkedForDelete,
    Found,
    NotFound,
    Started,
    Finished,
    FinishedUnresolved,
}

/// Outcome of matching a prefetch against the navigation that needed it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrefetchBenefit {
    NoBenefit,
    CacheEviction,
    NameNonexistent,
    NameFound,
}

impl PrefetchBenefit {
    pub fn saved_latency(self) -> bool {
        matches!(
            self,
            PrefetchBenefit::NameFound | PrefetchBenefit::NameNonexistent
        )
    }
}

/// Resolution lifecycle and timing of one hostname.
///
/// The same type describes both a speculative lookup owned by the scheduler
/// and the lookup a real navigation performed, so the two can be compared in
/// [`HostInfo::accrue_prefetch_benefit`].
#[derive(Debug, Clone)]
pub struct HostInfo {
    hostname: String,
    state: ResolutionState,
    prequeue_state: ResolutionState,
    prequeue_transition: Instant,
    last_transition: Instant,
    queue_duration: Option<Duration>,
    resolve_duration: Option<Duration>,
    benefits_remaining: Duration,
    sequence_number: Option<u64>,
    motivation: Motivation,
    referring_hostname: Option<String>,
}

impl HostInfo {
    pub fn new(hostname: impl Into<String>, now: Instant) -> Self {
        Self {
            hostname: hostname.into(),
            state: ResolutionState::Pending,
            prequeue_state: ResolutionState::Pending,
            prequeue_transition: now,
            last_transition: now,
            queue_duration: None,
            resolve_duration: None,
            benefits_remaining: Duration::ZERO,
            sequence_number: None,
            motivation: Motivation::NoPrefetch,
            referring_hostname: None,
        }
    }

    pub fn hostname(&self) -> &str {
        &self.hostname
    }

    pub fn state(&self) -> ResolutionState {
        self.state
    }

    pub fn motivation(&self) -> Motivation {
        self.motivation
    }

    pub fn referring_hostname(&self) -> Option<&str> {
        self.referring_hostname.as_deref()
    }

    pub fn queue_duration(&self) -> Option<Duration> {
        self.queue_duration
    }

    pub fn resolve_duration(&self) -> Option<Duration> {
        self.resolve_duration
    }

    pub fn benefits_remaining(&self) -> Duration {
        self.benefits_remaining
    }

    pub fn sequence_number(&self) -> Option<u64> {
        self.sequence_number
    }

    pub fn was_found(&self) -> bool {
        self.state == ResolutionState::Found
    }

    pub fn was_nonexistent(&self) -> bool {
        self.state == ResolutionState::NotFound
    }

    pub fn is_assigned(&self) -> bool {
        matches!(
            self.state,
            ResolutionState::Assigned | ResolutionState::AssignedMarkedForDelete
        )
    }

    pub fn is_marked_to_delete(&self) -> bool {
        self.state == ResolutionState::AssignedMarkedForDelete
    }

    pub fn set_referring_hostname(&mut self, referrer: impl Into<String>) {
        self.referring_hostname = Some(referrer.into());
    }

    /// Whether a fresh lookup would tell us anything new.
    ///
    /// # Panics
    ///
    /// If `hostname` is not the name this record was created for.
    pub fn needs_update(
        &self,
        hostname: &str,
        now: Instant,
        sequence_counter: u64,
        policy: &CachePolicy,
    ) -> bool {
        assert_eq!(hostname, self.hostname, "record consulted for another host");
        match self.state {
            ResolutionState::Pending => true,
            ResolutionState::Queued
            | ResolutionState::Assigned
            | ResolutionState::AssignedMarkedForDelete => false,
            ResolutionState::Found | ResolutionState::NotFound => {
                !self.is_still_cached(now, sequence_counter, policy)
            }
            ResolutionState::Started
            | ResolutionState::Finished
            | ResolutionState::FinishedUnresolved => {
                self.expect_state(&[], "be scheduled");
                false
            }
        }
    }

    /// Guess whether the OS resolver still holds our last answer.
    pub fn is_still_cached(&self, now: Instant, sequence_counter: u64, policy: &CachePolicy) -> bool {
        self.expect_state(
            &[ResolutionState::Found, ResolutionState::NotFound],
            "check cache freshness",
        );

        // Enough newer lookups have gone through the OS cache to push ours out.
        if let Some(sequence_number) = self.sequence_number
            && sequence_counter.saturating_sub(sequence_number) > policy.max_guaranteed_cache_size
        {
            return false;
        }

        let mut elapsed = now.saturating_duration_since(self.last_transition);
        // A lookup that never reached the network was answered from an entry
        // somebody else put there earlier, so it is older than it looks.
        if self.state == ResolutionState::Found
            && self
                .resolve_duration
                .is_some_and(|d| d < policy.non_network_threshold)
        {
            elapsed = elapsed.saturating_mul(2);
        }
        elapsed < policy.expiration
    }

    pub fn set_queued_state(&mut self, motivation: Motivation, now: Instant) {
        self.expect_state(
            &[
                ResolutionState::Pending,
                ResolutionState::Found,
                ResolutionState::NotFound,
            ],
            "enqueue",
        );
        self.prequeue_state = self.state;
        self.prequeue_transition = self.last_transition;
        self.state = ResolutionState::Queued;
        self.queue_duration = None;
        self.resolve_duration = None;
        self.motivation = motivation;
        if !motivation.is_referral() {
            self.referring_hostname = None;
        }
        self.last_transition = now;
    }

    pub fn set_assigned_state(&mut self, now: Instant) {
        self.expect_state(&[ResolutionState::Queued], "assign");
        self.state = ResolutionState::Assigned;
        self.queue_duration = Some(self.lap(now));
    }

    pub fn set_pending_delete_state(&mut self) {
        self.expect_state(
            &[
                ResolutionState::Assigned,
                ResolutionState::AssignedMarkedForDelete,
            ],
            "mark for delete",
        );
        self.state = ResolutionState::AssignedMarkedForDelete;
    }

    pub fn set_found_state(&mut self, now: Instant, sequence_number: u64) {
        self.expect_state(&[ResolutionState::Assigned], "mark found");
        self.state = ResolutionState::Found;
        self.settle(now, sequence_number);
    }

    pub fn set_no_such_name_state(&mut self, now: Instant, sequence_number: u64) {
        self.expect_state(&[ResolutionState::Assigned], "mark not found");
        self.state = ResolutionState::NotFound;
        self.settle(now, sequence_number);
    }

    pub fn set_started_state(&mut self, now: Instant) {
        self.expect_state(&[ResolutionState::Pending], "start navigation");
        self.state = ResolutionState::Started;
        self.queue_duration = None;
        self.resolve_duration = None;
        self.last_transition = now;
    }

    pub fn set_finished_state(&mut self, was_resolved: bool, now: Instant) {
        self.expect_state(&[ResolutionState::Started], "finish navigation");
        self.state = if was_resolved {
            ResolutionState::Finished
        } else {
            ResolutionState::FinishedUnresolved
        };
        self.resolve_duration = Some(self.lap(now));
    }

    /// Undo an enqueue that never produced a lookup. The record goes back to
    /// the state it had before, as if it had never been queued.
    pub fn remove_from_queue(&mut self) {
        self.expect_state(
            &[ResolutionState::Queued, ResolutionState::Assigned],
            "remove from queue",
        );
        self.state = self.prequeue_state;
        self.last_transition = self.prequeue_transition;
        self.queue_duration = None;
        self.resolve_duration = None;
    }

    /// Spend this prefetch against `navigation`, the lookup a real navigation
    /// to the same host went through.
    ///
    /// Benefits can only be spent once: any later call reports
    /// [`PrefetchBenefit::NoBenefit`].
    pub fn accrue_prefetch_benefit(
        &mut self,
        navigation: &mut HostInfo,
        policy: &CachePolicy,
    ) -> PrefetchBenefit {
        debug_assert!(
            matches!(
                navigation.state,
                ResolutionState::Finished | ResolutionState::FinishedUnresolved
            ),
            "navigation record for {} is {:?}",
            navigation.hostname,
            navigation.state
        );
        assert_eq!(navigation.hostname, self.hostname, "navigation to another host");

        if self.benefits_remaining.is_zero()
            || !matches!(
                self.state,
                ResolutionState::Found | ResolutionState::NotFound
            )
        {
            return PrefetchBenefit::NoBenefit;
        }

        let navigation_lookup = navigation.resolve_duration.unwrap_or_default();
        if navigation_lookup > policy.non_network_threshold {
            // The navigation went to the network anyway.
            self.benefits_remaining = Duration::ZERO;
            return PrefetchBenefit::CacheEviction;
        }

        let benefit_ms = millis(self.benefits_remaining) - millis(navigation_lookup);
        trace!(
            hostname = %self.hostname,
            benefit_ms,
            motivation = %self.motivation,
            "prefetch benefit"
        );

        navigation.benefits_remaining = std::mem::take(&mut self.benefits_remaining);
        navigation.motivation = self.motivation;
        if self.motivation.is_referral() {
            navigation.referring_hostname = self.referring_hostname.clone();
        }

        if self.state == ResolutionState::NotFound {
            PrefetchBenefit::NameNonexistent
        } else {
            PrefetchBenefit::NameFound
        }
    }

    fn settle(&mut self, now: Instant, sequence_number: u64) {
        let resolve_duration = self.lap(now);
        self.resolve_duration = Some(resolve_duration);
        self.benefits_remaining = resolve_duration;
        // stamped by the first answer only
        if self.sequence_number.is_none() {
            self.sequence_number = Some(sequence_number);
        }
    }

    /// Time spent in the state being left; restarts the transition clock.
    fn lap(&mut self, now: Instant) -> Duration {
        let elapsed = now.saturating_duration_since(self.last_transition);
        self.last_transition = now;
        elapsed
    }

    fn expect_state(&self, allowed: &[ResolutionState], action: &str) {
        debug_assert!(
            allowed.contains(&self.state),
            "{}: cannot {action} from {:?}",
            self.hostname,
            self.state
        );
    }
}

fn millis(duration: Duration) -> i64 {
    i64::try_from(duration.as_millis()).unwrap_or(i64::MAX)
}
