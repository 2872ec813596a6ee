use prefetch::{Clock, HostInfo, HostResolver, ResolveError, Scheduler};
use tracing::{debug, warn};

/// Look each host up the way a real navigation would and credit the
/// scheduler's prefetches with the time they saved. Returns how many
/// navigations benefited.
pub fn measure_navigations(
    scheduler: &Scheduler,
    resolver: &dyn HostResolver,
    clock: &dyn Clock,
    hosts: &[String],
    referrer_url: &str,
) -> usize {
    let mut benefited = 0;
    for hostname in hosts.iter().map(|h| h.trim()).filter(|h| !h.is_empty()) {
        let mut navigation = HostInfo::new(hostname, clock.now());
        navigation.set_started_state(clock.now());
        let resolved = match resolver.resolve(hostname) {
            Ok(()) => true,
            Err(ResolveError::NotFound) => false,
            Err(err) => {
                warn!(%hostname, %err, "navigation lookup failed");
                false
            }
        };
        navigation.set_finished_state(resolved, clock.now());

        if scheduler.accrue_prefetch_benefits(referrer_url, &mut navigation) {
            benefited += 1;
        }
        debug!(
            %hostname,
            lookup = ?navigation.resolve_duration(),
            saved = ?navigation.benefits_remaining(),
            "navigation measured"
        );
    }
    benefited
}
