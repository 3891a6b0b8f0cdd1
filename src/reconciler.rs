//! Membership reconciliation.
//!
//! Each pass recomputes the desired host records from the current list of
//! running instances (level-triggered), so a missed tick or a restart is
//! repaired by the next successful pass. Passes never overlap.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use log::{debug, error, info, warn};
use tokio::sync::Mutex;
use tokio::time::{self, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::cluster::InstanceSource;
use crate::error::{PeerdError, Result};
use crate::hosts::HostRecordStore;
use crate::peers::PeerControl;
use crate::types::{HostRecord, LabelSelector, Update};

#[derive(Debug, Clone)]
pub struct ReconcilerOptions {
    /// Remove managed entries for instances that are no longer running.
    pub prune_stale: bool,
    /// Upper bound for a single control-plane query.
    pub query_timeout: Duration,
    /// Our own hostname, never probed as a peer.
    pub local_hostname: Option<String>,
}

impl Default for ReconcilerOptions {
    fn default() -> Self {
        Self {
            prune_stale: false,
            query_timeout: Duration::from_secs(10),
            local_hostname: None,
        }
    }
}

/// An error confined to one instance within a pass.
#[derive(Debug)]
pub struct InstanceFailure {
    pub name: String,
    pub error: PeerdError,
}

/// Outcome of one reconciliation pass that got as far as loading the hosts file.
#[derive(Debug, Default)]
pub struct PassReport {
    /// Running instances returned by the query
    pub observed: usize,
    pub updates: Vec<Update>,
    pub failures: Vec<InstanceFailure>,
    /// Whether the hosts file was rewritten
    pub saved: bool,
    pub save_error: Option<PeerdError>,
    /// Instances handed to the storage daemon's peer probe
    pub probed: Vec<String>,
}

impl PassReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty() && self.save_error.is_none()
    }
}

pub struct Reconciler {
    source: Arc<dyn InstanceSource>,
    store: HostRecordStore,
    namespace: String,
    selector: LabelSelector,
    options: ReconcilerOptions,
    peers: Option<Arc<dyn PeerControl>>,
    pass_lock: Mutex<()>,
}

impl Reconciler {
    pub fn new(
        source: Arc<dyn InstanceSource>,
        store: HostRecordStore,
        namespace: impl Into<String>,
        selector: LabelSelector,
        options: ReconcilerOptions,
    ) -> Self {
        Self {
            source,
            store,
            namespace: namespace.into(),
            selector,
            options,
            peers: None,
            pass_lock: Mutex::new(()),
        }
    }

    /// Probe newly observed instances into the storage daemon's trusted pool
    /// after each pass.
    pub fn with_peer_control(mut self, peers: Arc<dyn PeerControl>) -> Self {
        self.peers = Some(peers);
        self
    }

    /// Run one query, load, update, save pass.
    ///
    /// A query or load failure returns `Err` and leaves the hosts file
    /// untouched. Everything after the load is best effort and lands in the
    /// report.
    pub async fn reconcile_once(&self) -> Result<PassReport> {
        let _pass = self.pass_lock.lock().await;

        let timeout = self.options.query_timeout;
        let instances = time::timeout(
            timeout,
            self.source.list_running(&self.namespace, &self.selector),
        )
        .await
        .map_err(|_| {
            PeerdError::connectivity(format!("instance query timed out after {:?}", timeout))
        })??;

        let mut hosts = self.store.load().await?;

        let mut report = PassReport {
            observed: instances.len(),
            ..Default::default()
        };
        let mut recorded: Vec<HostRecord> = Vec::with_capacity(instances.len());

        for instance in &instances {
            let record = match instance.to_host_record() {
                Ok(record) => record,
                Err(e) => {
                    warn!("Skipping instance {}: {}", instance.name, e);
                    report.failures.push(InstanceFailure {
                        name: instance.name.clone(),
                        error: e,
                    });
                    continue;
                }
            };
            if hosts.set(&record) {
                info!("Host record {} -> {}", record.name, record.address);
                report.updates.push(Update::Set {
                    name: record.name.clone(),
                    ip: record.address,
                });
            }
            recorded.push(record);
        }

        if self.options.prune_stale {
            // failed instances are still running; keep whatever they had
            let keep: HashSet<String> = instances.iter().map(|i| i.name.clone()).collect();
            for name in hosts.prune_managed(&keep) {
                info!("Pruned stale host record {}", name);
                report.updates.push(Update::Remove { name });
            }
        }

        if report.updates.is_empty() {
            debug!("Host records unchanged ({} instances)", report.observed);
        } else {
            match self.store.save(&hosts).await {
                Ok(()) => report.saved = true,
                Err(e) => {
                    error!("Failed to save {}: {}", self.store.destination().display(), e);
                    report.save_error = Some(e);
                }
            }
        }

        if report.save_error.is_none() {
            if let Some(peers) = &self.peers {
                self.probe_peers(peers.as_ref(), &recorded, &mut report).await;
            }
        }

        Ok(report)
    }

    async fn probe_peers(
        &self,
        peers: &dyn PeerControl,
        recorded: &[HostRecord],
        report: &mut PassReport,
    ) {
        let known: HashSet<String> = match peers.peer_status().await {
            Ok(list) => list.into_iter().map(|p| p.hostname).collect(),
            Err(e) => {
                warn!("Cannot read peer status, skipping probes: {}", e);
                return;
            }
        };

        for record in recorded {
            if self.options.local_hostname.as_deref() == Some(record.name.as_str())
                || known.contains(&record.name)
                || known.contains(&record.address.to_string())
            {
                continue;
            }
            match peers.probe(&record.name).await {
                Ok(()) => {
                    info!("Probed peer {}", record.name);
                    report.probed.push(record.name.clone());
                }
                Err(e) => {
                    warn!("Failed to probe peer {}: {}", record.name, e);
                    report.failures.push(InstanceFailure {
                        name: record.name.clone(),
                        error: e,
                    });
                }
            }
        }
    }

    /// Tick every `interval` until `shutdown` is cancelled.
    ///
    /// The first pass runs immediately. A pass that overruns the interval
    /// causes the missed ticks to be skipped, never queued.
    pub async fn run(&self, interval: Duration, shutdown: CancellationToken) {
        info!(
            "Reconciling {:?} in namespace {} every {:?}",
            self.selector.to_string(),
            self.namespace,
            interval
        );
        let mut ticker = time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {}
            }

            match self.reconcile_once().await {
                Ok(report) if report.is_clean() => debug!(
                    "Pass complete: {} instances, {} updates",
                    report.observed,
                    report.updates.len()
                ),
                Ok(report) => warn!(
                    "Pass completed with {} instance failures{}",
                    report.failures.len(),
                    if report.save_error.is_some() { " and a failed save" } else { "" }
                ),
                Err(e) if e.is_transient() => warn!("Reconciliation pass aborted: {}", e),
                Err(e) => error!("Reconciliation pass aborted: {}", e),
            }
        }
        info!("Reconciler stopped");
    }
}
