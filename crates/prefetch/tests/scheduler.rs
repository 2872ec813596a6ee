#![forbid(unsafe_code)]

use config::Config;
use parking_lot::{Condvar, Mutex};
use prefetch::persistence::{ReferrerRecord, SubresourceRecord};
use prefetch::{
    Clock, HostInfo, HostResolver, ManualClock, Motivation, ResolutionState, ResolveError,
    Scheduler, SystemClock,
};
use pretty_assertions::assert_eq;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

const IDLE_TIMEOUT: Duration = Duration::from_secs(5);

fn config(min_workers: usize, max_workers: usize) -> Config {
    let mut config = Config::default();
    config.pool.min_workers = min_workers;
    config.pool.max_workers = max_workers;
    config.pool.max_queue_delay = Duration::ZERO;
    config
}

/// Holds resolver threads until the test opens it.
#[derive(Default)]
struct Gate {
    state: Mutex<GateState>,
    changed: Condvar,
}

#[derive(Default)]
struct GateState {
    open: bool,
    entered: Vec<String>,
}

impl Gate {
    fn pass(&self, hostname: &str) {
        let mut state = self.state.lock();
        state.entered.push(hostname.to_owned());
        self.changed.notify_all();
        while !state.open {
            self.changed.wait(&mut state);
        }
    }

    fn wait_entered(&self, count: usize) {
        let mut state = self.state.lock();
        while state.entered.len() < count {
            assert!(
                !self
                    .changed
                    .wait_for(&mut state, IDLE_TIMEOUT)
                    .timed_out(),
                "resolver never reached the gate"
            );
        }
    }

    fn open(&self) {
        self.state.lock().open = true;
        self.changed.notify_all();
    }
}

fn gated_resolver(gate: &Arc<Gate>) -> Arc<dyn HostResolver> {
    let gate = Arc::clone(gate);
    Arc::new(move |hostname: &str| -> Result<(), ResolveError> {
        gate.pass(hostname);
        Ok(())
    })
}

fn always_found() -> Arc<dyn HostResolver> {
    Arc::new(|_: &str| -> Result<(), ResolveError> { Ok(()) })
}

fn manual_clock() -> (Arc<ManualClock>, Arc<dyn Clock>) {
    let clock = Arc::new(ManualClock::new());
    let dyn_clock: Arc<dyn Clock> = clock.clone();
    (clock, dyn_clock)
}

fn navigation(hostname: &str, clock: &ManualClock, lookup: Duration) -> HostInfo {
    let mut info = HostInfo::new(hostname, clock.now());
    info.set_started_state(clock.now());
    clock.advance(lookup);
    info.set_finished_state(true, clock.now());
    info
}

#[test]
fn list_resolves_on_a_full_pool() {
    let resolver: Arc<dyn HostResolver> = Arc::new(|hostname: &str| {
        if hostname.starts_with('a') || hostname.starts_with('c') {
            thread::sleep(Duration::from_millis(20));
            Ok(())
        } else {
            thread::sleep(Duration::from_millis(100));
            Err(ResolveError::NotFound)
        }
    });
    let scheduler = Scheduler::new(&config(4, 8), resolver, Arc::new(SystemClock));

    scheduler.resolve_list(
        ["a.com", "b.com", "c.com", "d.com"],
        Motivation::PageScan,
    );
    assert!(scheduler.wait_until_idle(IDLE_TIMEOUT));

    assert!(scheduler.was_found("a.com"));
    assert!(scheduler.was_found("c.com"));
    assert!(!scheduler.was_found("b.com"));
    assert!(!scheduler.was_found("d.com"));
    assert_eq!(
        scheduler.record("b.com").map(|info| info.state()),
        Some(ResolutionState::NotFound)
    );
    assert_eq!(
        scheduler.record("d.com").map(|info| info.state()),
        Some(ResolutionState::NotFound)
    );

    let diagnostics = scheduler.diagnostics();
    assert_eq!(diagnostics.workers_spawned, 4);
    assert_eq!(diagnostics.records.len(), 4);
    assert!(scheduler.shutdown());
}

#[test]
fn blank_names_are_ignored() {
    let scheduler = Scheduler::new(
        &config(1, 1),
        always_found(),
        Arc::new(SystemClock),
    );
    scheduler.resolve("   ", Motivation::PageScan);
    scheduler.resolve_list(["", " "], Motivation::PageScan);

    let diagnostics = scheduler.diagnostics();
    assert!(diagnostics.records.is_empty());
    assert_eq!(diagnostics.workers_spawned, 0);
}

#[test]
fn repeated_requests_do_not_duplicate_work() {
    let gate = Arc::new(Gate::default());
    let scheduler = Scheduler::new(&config(1, 1), gated_resolver(&gate), Arc::new(SystemClock));

    scheduler.resolve("busy.example", Motivation::PageScan);
    gate.wait_entered(1);

    scheduler.resolve("next.example", Motivation::PageScan);
    scheduler.resolve("next.example", Motivation::MouseOver);
    // already being resolved
    scheduler.resolve("busy.example", Motivation::MouseOver);

    let diagnostics = scheduler.diagnostics();
    assert_eq!(diagnostics.queued, ["next.example"]);
    assert_eq!(diagnostics.in_flight, 1);
    assert_eq!(
        scheduler.record("busy.example").map(|info| info.state()),
        Some(ResolutionState::Assigned)
    );
    assert_eq!(
        scheduler.record("next.example").map(|info| info.motivation()),
        Some(Motivation::PageScan)
    );

    gate.open();
    assert!(scheduler.wait_until_idle(IDLE_TIMEOUT));
    assert!(scheduler.was_found("busy.example"));
    assert!(scheduler.was_found("next.example"));
}

#[test]
fn shutdown_settles_queue_and_gives_up_on_stuck_workers() {
    let gate = Arc::new(Gate::default());
    let mut config = config(1, 1);
    config.pool.shutdown_timeout = Duration::from_millis(200);
    let scheduler = Scheduler::new(&config, gated_resolver(&gate), Arc::new(SystemClock));

    scheduler.resolve("stuck.example", Motivation::PageScan);
    gate.wait_entered(1);
    scheduler.resolve("waiting.example", Motivation::PageScan);

    assert!(!scheduler.shutdown());
    assert_eq!(
        scheduler.record("waiting.example").map(|info| info.state()),
        Some(ResolutionState::NotFound)
    );
    assert!(scheduler.diagnostics().shutting_down);

    gate.open();
    assert!(scheduler.wait_until_idle(IDLE_TIMEOUT));
    assert!(scheduler.shutdown());
    assert_eq!(scheduler.diagnostics().workers_running, 0);
}

#[test]
fn requests_after_shutdown_are_dropped() {
    let scheduler = Scheduler::new(
        &config(1, 2),
        always_found(),
        Arc::new(SystemClock),
    );
    assert!(scheduler.shutdown());

    scheduler.resolve("late.example", Motivation::MouseOver);
    scheduler.resolve_list(["later.example"], Motivation::PageScan);
    assert!(scheduler.record("late.example").is_none());
    assert!(scheduler.record("later.example").is_none());
    assert_eq!(scheduler.diagnostics().workers_spawned, 0);
}

#[test]
fn navigation_primes_learned_subresources() {
    let scheduler = Scheduler::new(
        &config(2, 4),
        always_found(),
        Arc::new(SystemClock),
    );
    scheduler.deserialize_referrals(&[ReferrerRecord {
        referrer: "news.example".into(),
        subresources: vec![
            SubresourceRecord {
                host: "cdn.example".into(),
                latency_ms: 10,
            },
            SubresourceRecord {
                host: "img.example".into(),
                latency_ms: 0,
            },
        ],
    }]);
    assert_eq!(
        scheduler.referrals_for("news.example"),
        ["cdn.example", "img.example"]
    );

    scheduler.navigating_to("news.example");
    assert!(scheduler.wait_until_idle(IDLE_TIMEOUT));

    for host in ["cdn.example", "img.example"] {
        let info = scheduler.record(host).unwrap();
        assert!(info.was_found());
        assert_eq!(info.motivation(), Motivation::LearnedReferral);
        assert_eq!(info.referring_hostname(), Some("news.example"));
    }
    assert!(scheduler.record("news.example").is_none());
}

#[test]
fn benefit_is_credited_once_and_feeds_referrals() {
    let (clock, dyn_clock) = manual_clock();
    let resolver_clock = Arc::clone(&clock);
    let resolver: Arc<dyn HostResolver> = Arc::new(move |_: &str| -> Result<(), ResolveError> {
        resolver_clock.advance(Duration::from_millis(200));
        Ok(())
    });
    let scheduler = Scheduler::new(&config(1, 1), resolver, dyn_clock);
    scheduler.deserialize_referrals(&[ReferrerRecord {
        referrer: "news.example".into(),
        subresources: vec![SubresourceRecord {
            host: "cdn.example".into(),
            latency_ms: 0,
        }],
    }]);

    scheduler.navigating_to("news.example");
    assert!(scheduler.wait_until_idle(IDLE_TIMEOUT));
    assert_eq!(
        scheduler.record("cdn.example").and_then(|i| i.resolve_duration()),
        Some(Duration::from_millis(200))
    );

    let mut nav = navigation("cdn.example", &clock, Duration::from_millis(1));
    assert!(scheduler.accrue_prefetch_benefits("https://news.example/today", &mut nav));
    assert_eq!(nav.benefits_remaining(), Duration::from_millis(200));
    assert_eq!(nav.motivation(), Motivation::LearnedReferral);
    assert_eq!(nav.referring_hostname(), Some("news.example"));

    let referrals = scheduler.serialize_referrals();
    assert_eq!(referrals.len(), 1);
    assert_eq!(referrals[0].subresources[0].latency_ms, 200);

    let mut again = navigation("cdn.example", &clock, Duration::from_millis(1));
    assert!(!scheduler.accrue_prefetch_benefits("https://news.example/today", &mut again));
    assert_eq!(again.benefits_remaining(), Duration::ZERO);

    let diagnostics = scheduler.diagnostics();
    assert_eq!(diagnostics.cache_hits.len(), 1);
    assert_eq!(diagnostics.host_report().cache_hits.len(), 1);
}

#[test]
fn unpredicted_navigation_teaches_a_referral() {
    let (clock, dyn_clock) = manual_clock();
    let scheduler = Scheduler::new(&config(1, 1), always_found(), dyn_clock);

    let mut nav = navigation("widgets.example", &clock, Duration::from_millis(80));
    assert!(!scheduler.accrue_prefetch_benefits("https://portal.example/home", &mut nav));
    assert_eq!(scheduler.referrals_for("portal.example"), ["widgets.example"]);

    // a page does not refer to itself
    let mut own = navigation("portal.example", &clock, Duration::from_millis(80));
    assert!(!scheduler.accrue_prefetch_benefits("https://portal.example/", &mut own));
    assert_eq!(scheduler.referrals_for("portal.example").len(), 1);

    // no usable referrer
    let mut typed = navigation("typed.example", &clock, Duration::from_millis(80));
    assert!(!scheduler.accrue_prefetch_benefits("", &mut typed));
    assert_eq!(scheduler.serialize_referrals().len(), 1);
}

#[test]
fn evicted_prefetch_is_archived() {
    let (clock, dyn_clock) = manual_clock();
    let resolver_clock = Arc::clone(&clock);
    let resolver: Arc<dyn HostResolver> = Arc::new(move |_: &str| -> Result<(), ResolveError> {
        resolver_clock.advance(Duration::from_millis(120));
        Ok(())
    });
    let scheduler = Scheduler::new(&config(1, 1), resolver, dyn_clock);
    scheduler.resolve("cold.example", Motivation::PageScan);
    assert!(scheduler.wait_until_idle(IDLE_TIMEOUT));

    // the navigation had to go to the network anyway
    let mut nav = navigation("cold.example", &clock, Duration::from_millis(90));
    assert!(!scheduler.accrue_prefetch_benefits("", &mut nav));

    let diagnostics = scheduler.diagnostics();
    assert_eq!(diagnostics.cache_evictions.len(), 1);
    assert!(diagnostics.cache_hits.is_empty());
    assert_eq!(
        scheduler.record("cold.example").map(|i| i.benefits_remaining()),
        Some(Duration::ZERO)
    );
}

#[test]
fn discard_forgets_results_but_waits_for_in_flight_lookups() {
    let gate = Arc::new(Gate::default());
    let scheduler = Scheduler::new(&config(1, 1), gated_resolver(&gate), Arc::new(SystemClock));

    scheduler.resolve("slow.example", Motivation::PageScan);
    gate.wait_entered(1);
    scheduler.resolve("queued.example", Motivation::PageScan);
    scheduler.deserialize_referrals(&[ReferrerRecord {
        referrer: "a.example".into(),
        subresources: vec![SubresourceRecord {
            host: "b.example".into(),
            latency_ms: 5,
        }],
    }]);

    scheduler.discard_all_results();
    assert!(scheduler.record("queued.example").is_none());
    assert_eq!(
        scheduler.record("slow.example").map(|i| i.state()),
        Some(ResolutionState::AssignedMarkedForDelete)
    );
    assert!(scheduler.serialize_referrals().is_empty());

    gate.open();
    assert!(scheduler.wait_until_idle(IDLE_TIMEOUT));
    assert!(scheduler.record("slow.example").is_none());
    assert!(scheduler.diagnostics().records.is_empty());
}

#[test]
fn congested_queue_is_abandoned() {
    let gate = Arc::new(Gate::default());
    let (clock, dyn_clock) = manual_clock();
    let mut config = config(1, 1);
    config.pool.max_queue_delay = Duration::from_millis(500);
    let scheduler = Scheduler::new(&config, gated_resolver(&gate), dyn_clock);

    scheduler.resolve("first.example", Motivation::PageScan);
    gate.wait_entered(1);
    scheduler.resolve("stale-1.example", Motivation::PageScan);
    scheduler.resolve("stale-2.example", Motivation::MouseOver);
    clock.advance(Duration::from_secs(1));

    gate.open();
    assert!(scheduler.wait_until_idle(IDLE_TIMEOUT));

    assert!(scheduler.was_found("first.example"));
    for host in ["stale-1.example", "stale-2.example"] {
        let info = scheduler.record(host).unwrap();
        assert_eq!(info.state(), ResolutionState::Pending);
        assert_eq!(info.queue_duration(), None);
    }
    assert!(scheduler.diagnostics().queued.is_empty());

    // abandoned names can be asked for again
    scheduler.resolve("stale-1.example", Motivation::MouseOver);
    assert!(scheduler.wait_until_idle(IDLE_TIMEOUT));
    assert!(scheduler.was_found("stale-1.example"));
}

#[test]
fn expired_answer_is_looked_up_again() {
    let (clock, dyn_clock) = manual_clock();
    let lookups = Arc::new(Mutex::new(Vec::new()));
    let log = Arc::clone(&lookups);
    let resolver: Arc<dyn HostResolver> =
        Arc::new(move |hostname: &str| -> Result<(), ResolveError> {
            log.lock().push(hostname.to_owned());
            Ok(())
        });
    let scheduler = Scheduler::new(&config(1, 1), resolver, dyn_clock);

    scheduler.resolve("a.example", Motivation::PageScan);
    assert!(scheduler.wait_until_idle(IDLE_TIMEOUT));
    assert_eq!(
        scheduler.record("a.example").and_then(|i| i.sequence_number()),
        Some(0)
    );

    // still cached
    scheduler.resolve("a.example", Motivation::PageScan);
    assert!(scheduler.wait_until_idle(IDLE_TIMEOUT));
    scheduler.resolve("b.example", Motivation::PageScan);
    assert!(scheduler.wait_until_idle(IDLE_TIMEOUT));
    assert_eq!(*lookups.lock(), ["a.example", "b.example"]);

    // instant answers age twice as fast
    clock.advance(Duration::from_secs(151));
    scheduler.resolve("a.example", Motivation::PageScan);
    assert!(scheduler.wait_until_idle(IDLE_TIMEOUT));
    assert_eq!(*lookups.lock(), ["a.example", "b.example", "a.example"]);

    // the stamp from the first answer survives the second lookup
    let info = scheduler.record("a.example").unwrap();
    assert!(info.was_found());
    assert_eq!(info.sequence_number(), Some(0));
    assert_eq!(
        scheduler.record("b.example").and_then(|i| i.sequence_number()),
        Some(1)
    );
}

#[test]
fn confirmed_missing_name_counts_as_a_hit() {
    let (clock, dyn_clock) = manual_clock();
    let resolver_clock = Arc::clone(&clock);
    let resolver: Arc<dyn HostResolver> = Arc::new(move |_: &str| {
        resolver_clock.advance(Duration::from_millis(70));
        Err(ResolveError::NotFound)
    });
    let scheduler = Scheduler::new(&config(1, 1), resolver, dyn_clock);
    scheduler.resolve("typo.example", Motivation::Omnibox);
    assert!(scheduler.wait_until_idle(IDLE_TIMEOUT));
    assert!(!scheduler.was_found("typo.example"));

    let mut nav = HostInfo::new("typo.example", clock.now());
    nav.set_started_state(clock.now());
    clock.advance(Duration::from_millis(2));
    nav.set_finished_state(false, clock.now());

    assert!(scheduler.accrue_prefetch_benefits("", &mut nav));
    assert_eq!(nav.benefits_remaining(), Duration::from_millis(70));
    assert_eq!(nav.motivation(), Motivation::Omnibox);

    let diagnostics = scheduler.diagnostics();
    assert_eq!(diagnostics.cache_hits.len(), 1);
    assert_eq!(diagnostics.cache_hits[0].hostname(), "typo.example");
    assert_eq!(
        diagnostics.cache_hits[0].state(),
        ResolutionState::FinishedUnresolved
    );
    assert!(diagnostics.cache_evictions.is_empty());
}

#[test]
fn host_report_partitions_records() {
    let (clock, dyn_clock) = manual_clock();
    let resolver_clock = Arc::clone(&clock);
    let resolver: Arc<dyn HostResolver> = Arc::new(move |hostname: &str| match hostname {
        "gone.example" => Err(ResolveError::NotFound),
        "slow.example" => {
            resolver_clock.advance(Duration::from_millis(100));
            Ok(())
        }
        _ => Ok(()),
    });
    let scheduler = Scheduler::new(&config(1, 1), resolver, dyn_clock);

    scheduler.resolve_list(
        ["slow.example", "fast.example", "gone.example"],
        Motivation::StartupList,
    );
    assert!(scheduler.wait_until_idle(IDLE_TIMEOUT));

    let report = scheduler.diagnostics().host_report();
    let names = |infos: &[HostInfo]| -> Vec<String> {
        infos.iter().map(|i| i.hostname().to_owned()).collect()
    };
    assert_eq!(names(&report.network_hits), ["slow.example"]);
    assert_eq!(names(&report.already_cached), ["fast.example"]);
    assert_eq!(names(&report.name_not_found), ["gone.example"]);
    assert!(report.cache_hits.is_empty());
    assert!(report.cache_evictions.is_empty());
}
