use clap::Parser;
use config::Config;
use dns_prefetch::{
    cli::Cli,
    navigation::measure_navigations,
    report::{log_diagnostics, log_host_report, save_referrals},
    signals::{SignalEvent, wait_for_signal},
};
use flume::bounded;
use prefetch::{
    Clock, HostResolver, Motivation, NoopRepository, ReferralRepository, Scheduler,
    SqliteRepository, SystemClock, SystemResolver,
};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

#[cfg(feature = "jemalloc")]
#[global_allocator]
static GLOBAL: tikv_jemallocator::Jemalloc = tikv_jemallocator::Jemalloc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    tracing_subscriber::fmt()
        .with_max_level(cli.verbosity.tracing_level_filter())
        .with_level(true)
        .with_file(true)
        .with_line_number(true)
        .init();

    debug!(config = ?cli);

    let config = match &cli.conffile {
        Some(path) => Config::load(path)?,
        _ => Config::new(),
    };

    let repo: Box<dyn ReferralRepository> =
        match cli.state_path(config.persistence.state_path.as_deref()) {
            Some(path) => Box::new(SqliteRepository::new(path).await?),
            None => Box::new(NoopRepository),
        };

    let resolver: Arc<dyn HostResolver> = Arc::new(SystemResolver::default());
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let scheduler = Arc::new(Scheduler::new(
        &config,
        Arc::clone(&resolver),
        Arc::clone(&clock),
    ));

    let snapshot = repo.load().await?;
    scheduler.deserialize_referrals(&snapshot.referrers);
    info!(referrers = snapshot.referrers.len(), "referrals loaded");

    if let Some(referrer) = &cli.referrer {
        scheduler.navigating_to(referrer);
    }
    scheduler.resolve_list(&cli.hosts, Motivation::StartupList);

    let (events_tx, events_rx) = bounded(8);
    let signals = wait_for_signal(&events_tx);
    tokio::pin!(signals);

    let idle = {
        let scheduler = Arc::clone(&scheduler);
        let wait = Duration::from_secs(cli.wait);
        tokio::task::spawn_blocking(move || scheduler.wait_until_idle(wait))
    };
    tokio::pin!(idle);

    let interrupted = loop {
        tokio::select! {
            res = &mut idle => {
                if !res? {
                    warn!(wait_secs = cli.wait, "prefetches still outstanding");
                }
                break false;
            }
            _ = tokio::signal::ctrl_c() => {
                info!("interrupted");
                break true;
            }
            res = &mut signals => {
                tracing::error!(error = ?res, "Error while waiting for signal");
                res?;
                break false;
            }
            res = events_rx.recv_async() => {
                let event = res?;
                debug!(?event, "Received signal event");
                match event {
                    SignalEvent::DumpDiagnostics => log_diagnostics(&scheduler.diagnostics()),
                    SignalEvent::SaveReferrals => {
                        save_referrals(repo.as_ref(), &scheduler).await?;
                    }
                }
            }
        }
    };

    if cli.navigate && !interrupted {
        let scheduler = Arc::clone(&scheduler);
        let hosts = cli.hosts.clone();
        let referrer_url = cli.referrer_url();
        let benefited = tokio::task::spawn_blocking(move || {
            measure_navigations(
                &scheduler,
                resolver.as_ref(),
                clock.as_ref(),
                &hosts,
                &referrer_url,
            )
        })
        .await?;
        info!(benefited, "navigations measured");
    }

    log_host_report(&scheduler.diagnostics());

    if config.persistence.save_on_shutdown {
        save_referrals(repo.as_ref(), &scheduler).await?;
    }

    let stopped = {
        let scheduler = Arc::clone(&scheduler);
        tokio::task::spawn_blocking(move || scheduler.shutdown()).await?
    };
    if !stopped {
        warn!("exiting with resolver workers still running");
    }
    Ok(())
}
