//! Filter, probe and rank in one pass.

use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use super::catalog::{load_catalog, EndpointDescriptor};
use super::filter::{filter_eligible, CountryFilter};
use super::probe::{measure, Prober};
use super::rank::{by_latency, rank, MeasuredEndpoint};
use crate::config::RunConfig;
use crate::error::RelayError;

/// Outcome of a run: the ranked relays plus counters for the summary log.
#[derive(Debug, Clone, Default)]
pub struct RankReport {
    pub ranked: Vec<MeasuredEndpoint>,
    /// Relays that passed the filter and were probed
    pub eligible: usize,
    /// Probes that failed (socket error, timeout, bad address)
    pub unreachable: usize,
    /// Probes that replied with a zero round trip
    pub invalid: usize,
    /// Probe tasks that panicked or were cancelled
    pub panicked: usize,
}

/// Filter `relays`, probe every eligible one with at most
/// `config.concurrency` probes in flight, then rank.
///
/// A failed probe only drops that relay; the run itself never fails here.
pub async fn run<P>(config: &RunConfig, relays: &[EndpointDescriptor], prober: Arc<P>) -> RankReport
where
    P: Prober + 'static,
{
    let filter = CountryFilter::new(config.country.clone(), config.excluded_countries.clone());
    let eligible = filter_eligible(relays, &filter);
    let workers = config.concurrency.max(1);

    log::info!(
        "Probing {} of {} relays ({} concurrent, {:?} timeout)",
        eligible.len(),
        relays.len(),
        workers,
        config.probe_timeout
    );

    let mut report = RankReport {
        eligible: eligible.len(),
        ..RankReport::default()
    };

    let semaphore = Arc::new(Semaphore::new(workers));
    let mut tasks = JoinSet::new();

    for (index, relay) in eligible.into_iter().enumerate() {
        let prober = Arc::clone(&prober);
        let semaphore = Arc::clone(&semaphore);
        tasks.spawn(async move {
            let _permit = semaphore.acquire_owned().await.ok();
            let hostname = relay.hostname.clone();
            (index, hostname, measure(prober.as_ref(), relay).await)
        });
    }

    let mut measured = Vec::new();
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok((index, _, Ok(endpoint))) => measured.push((index, endpoint)),
            Ok((_, hostname, Err(e))) => {
                if e.is_invalid_ping() {
                    report.invalid += 1;
                } else {
                    report.unreachable += 1;
                }
                log::warn!("Skipping {}: {}", hostname, e);
            }
            Err(e) => {
                report.panicked += 1;
                if e.is_panic() {
                    log::error!("Probe task panicked: {}", e);
                } else {
                    log::error!("Probe task cancelled: {}", e);
                }
            }
        }
    }

    // Completion order is arbitrary; restore catalog order so ties stay stable.
    measured.sort_by_key(|(index, _)| *index);
    let measured: Vec<_> = measured.into_iter().map(|(_, endpoint)| endpoint).collect();

    log::info!(
        "Measured {} relays, {} unreachable, {} invalid, {} panicked",
        measured.len(),
        report.unreachable,
        report.invalid,
        report.panicked
    );

    report.ranked = rank(measured, config.top_n, by_latency);
    for endpoint in &report.ranked {
        log::debug!("Best latency server found: {:?}", endpoint);
    }
    report
}

/// Load the catalog then [`run`]. A catalog that cannot be loaded aborts.
pub async fn load_and_run<P>(config: &RunConfig, prober: Arc<P>) -> Result<RankReport, RelayError>
where
    P: Prober + 'static,
{
    let (relays, source) = load_catalog(config).await?;
    log::info!("Using {} relays from {}", relays.len(), source);
    Ok(run(config, &relays, prober).await)
}
