#![forbid(unsafe_code)]

use super::Shared;
use crate::resolver::ResolveError;
use std::sync::Arc;
use tracing::{debug, trace, warn};

/// Body of one resolver thread: take names until the scheduler shuts down.
pub(super) fn run(shared: Arc<Shared>, id: usize) {
    let span = tracing::debug_span!("resolver_worker", id);
    let _enter = span.enter();
    debug!("worker started");

    while let Some(hostname) = shared.next_assignment() {
        match shared.resolver.resolve(&hostname) {
            Ok(()) => {
                trace!(%hostname, "found");
                shared.report_found(&hostname);
            }
            Err(ResolveError::NotFound) => {
                trace!(%hostname, "no such name");
                shared.report_not_found(&hostname);
            }
            Err(err) => {
                warn!(%hostname, %err, "unexpected resolver failure");
                shared.report_not_found(&hostname);
            }
        }
    }

    shared.worker_terminated(id);
}
