use crate::error::Error;
use prefetch::{Diagnostics, HostInfo, ReferralRepository, ReferralSnapshot, Scheduler};
use tracing::info;

pub fn log_diagnostics(diagnostics: &Diagnostics) {
    info!(
        hosts = diagnostics.records.len(),
        queued = diagnostics.queued.len(),
        peak_queue_depth = diagnostics.peak_queue_depth,
        in_flight = diagnostics.in_flight,
        workers_spawned = diagnostics.workers_spawned,
        workers_running = diagnostics.workers_running,
        referrers = diagnostics.referrals.len(),
        shutting_down = diagnostics.shutting_down,
        "scheduler diagnostics"
    );
    for record in &diagnostics.records {
        info!(
            hostname = record.hostname(),
            state = ?record.state(),
            motivation = %record.motivation(),
            queue = ?record.queue_duration(),
            resolve = ?record.resolve_duration(),
            "host"
        );
    }
    for referrer in &diagnostics.referrals {
        for sub in &referrer.subresources {
            info!(
                referrer = %referrer.referrer,
                host = %sub.host,
                latency_ms = sub.latency_ms,
                "referral"
            );
        }
    }
}

/// Log the host report, one line per host grouped by outcome.
pub fn log_host_report(diagnostics: &Diagnostics) {
    let report = diagnostics.host_report();
    let groups: [(&str, &[HostInfo]); 5] = [
        ("cache hit", report.cache_hits.as_slice()),
        ("cache eviction", report.cache_evictions.as_slice()),
        ("network hit", report.network_hits.as_slice()),
        ("already cached", report.already_cached.as_slice()),
        ("name not found", report.name_not_found.as_slice()),
    ];
    for (outcome, hosts) in groups {
        for host in hosts {
            info!(
                outcome,
                hostname = host.hostname(),
                motivation = %host.motivation(),
                resolve = ?host.resolve_duration(),
                saved = ?host.benefits_remaining(),
                "prefetch"
            );
        }
    }
}

/// Persist the scheduler's learned referrals. Returns how many referrers
/// were written.
pub async fn save_referrals(
    repo: &dyn ReferralRepository,
    scheduler: &Scheduler,
) -> Result<usize, Error> {
    let mut snapshot = ReferralSnapshot::new(scheduler.serialize_referrals());
    snapshot.meta.app_version = Some(env!("CARGO_PKG_VERSION").to_owned());
    let referrers = snapshot.referrers.len();
    repo.save(&snapshot).await?;
    info!(referrers, "referrals saved");
    Ok(referrers)
}
