// src/core/enumeration.rs

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::{Semaphore, mpsc};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::core::config::EnumConfig;
use crate::core::error::EnumError;
use crate::core::filter::FqdnFilter;
use crate::core::graph::MemoryGraph;
use crate::core::models::{DnsRequest, PipelineData, Tag};
use crate::core::ports::{DataSource, GraphStore, PipelineEntry, ROOT_STAGE};
use crate::core::sanitize::{DefaultSanitizer, DomainScope};
use crate::core::subdomain::SubdomainTask;

/// Source recorded for names read from the enumeration input.
pub const INPUT_SOURCE: &str = "input";

#[derive(Debug, Default)]
struct EnumStats {
    submitted: AtomicUsize,
    accepted: AtomicUsize,
    dropped: AtomicUsize,
    resubmitted: AtomicUsize,
    dispatched: AtomicUsize,
}

/// Counters describing a finished run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RunStats {
    pub submitted: usize,
    pub accepted: usize,
    pub dropped: usize,
    pub resubmitted: usize,
    pub dispatched: usize,
    pub graph_nodes: usize,
}

/// The pipeline entry: only the root stage accepts data.
struct RootEntry {
    tx: mpsc::Sender<PipelineData>,
    stats: Arc<EnumStats>,
}

#[async_trait]
impl PipelineEntry for RootEntry {
    async fn send_data(&self, stage: &str, data: PipelineData) -> Result<(), EnumError> {
        if stage != ROOT_STAGE {
            return Err(EnumError::UnknownStage(stage.to_string()));
        }
        self.tx
            .send(data)
            .await
            .map_err(|_| EnumError::PipelineClosed {
                stage: stage.to_string(),
            })?;
        self.stats.resubmitted.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}

/// Everything a pipeline worker needs to carry one item through both stages.
#[derive(Clone)]
struct Worker {
    filter: Arc<FqdnFilter>,
    subdomains: Arc<SubdomainTask>,
    graph: Arc<MemoryGraph>,
    stats: Arc<EnumStats>,
    run_id: Arc<str>,
}

impl Worker {
    async fn handle(&self, data: PipelineData) {
        // Resubmitted subdomains are evaluated again as names.
        let data = match data {
            PipelineData::Subdomain(sub) => PipelineData::Dns(DnsRequest::from(sub)),
            other => other,
        };

        let Some(data) = self.filter.process(data) else {
            self.stats.dropped.fetch_add(1, Ordering::Relaxed);
            return;
        };
        if let PipelineData::Dns(req) = &data {
            self.stats.accepted.fetch_add(1, Ordering::Relaxed);
            self.record(req).await;
        }
        self.subdomains.process(data).await;
    }

    async fn record(&self, req: &DnsRequest) {
        if let Err(e) = self
            .graph
            .insert_fqdn(&req.name, &req.source, req.tag, &self.run_id)
            .await
        {
            warn!(name = %req.name, error = %e, "Failed to store name in the graph.");
        }
        for answer in req.records.iter().filter(|a| a.is_cname()) {
            self.graph.mark_cname(&answer.name);
        }
    }
}

/// One enumeration run: the duplicate filter and the subdomain stage wired to
/// an entry channel, a pool of workers, and a periodic output drain.
pub struct Enumeration {
    config: EnumConfig,
    scope: Arc<DomainScope>,
    graph: Arc<MemoryGraph>,
    filter: Arc<FqdnFilter>,
    subdomains: Arc<SubdomainTask>,
    entry_tx: mpsc::Sender<PipelineData>,
    entry_rx: Mutex<Option<mpsc::Receiver<PipelineData>>>,
    cancel: CancellationToken,
    stats: Arc<EnumStats>,
}

impl std::fmt::Debug for Enumeration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Enumeration")
            .field("run_id", &self.config.run_id)
            .field("domains", &self.scope.domains())
            .finish()
    }
}

impl Enumeration {
    /// Builds the pipeline. Must be called from within a tokio runtime.
    pub fn new(config: EnumConfig) -> Result<Self, EnumError> {
        config.validate()?;
        let scope = Arc::new(DomainScope::new(&config.domains));
        if scope.domains().is_empty() {
            return Err(EnumError::Config("no domains in scope".to_string()));
        }

        let graph = Arc::new(MemoryGraph::new());
        let stats = Arc::new(EnumStats::default());
        let cancel = CancellationToken::new();
        let (entry_tx, entry_rx) = mpsc::channel(config.entry_channel_capacity);

        let filter = Arc::new(FqdnFilter::new(
            &config,
            Arc::new(DefaultSanitizer),
            graph.clone(),
        ));
        let subdomains = Arc::new(SubdomainTask::new(
            &config,
            scope.clone(),
            graph.clone(),
            Arc::new(RootEntry {
                tx: entry_tx.clone(),
                stats: stats.clone(),
            }),
            cancel.child_token(),
        ));

        Ok(Self {
            config,
            scope,
            graph,
            filter,
            subdomains,
            entry_tx,
            entry_rx: Mutex::new(Some(entry_rx)),
            cancel,
            stats,
        })
    }

    pub fn scope(&self) -> &DomainScope {
        &self.scope
    }

    pub fn graph(&self) -> &Arc<MemoryGraph> {
        &self.graph
    }

    pub fn register_source(&self, source: Arc<dyn DataSource>) {
        self.subdomains.register_source(source);
    }

    /// Cancelling this token ends the run early.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Feeds `names` into the pipeline and runs until it has been idle for the
    /// configured timeout, then drains the output queue and shuts the stages down.
    pub async fn run(&self, names: Vec<DnsRequest>) -> Result<RunStats, EnumError> {
        let mut rx = self
            .entry_rx
            .lock()
            .take()
            .ok_or(EnumError::AlreadyStarted)?;

        info!(
            run_id = %self.config.run_id,
            domains = ?self.scope.domains(),
            names = names.len(),
            "Starting enumeration."
        );

        let feeder = {
            let tx = self.entry_tx.clone();
            let stats = self.stats.clone();
            tokio::spawn(async move {
                for req in names {
                    if tx.send(req.into()).await.is_err() {
                        break;
                    }
                    stats.submitted.fetch_add(1, Ordering::Relaxed);
                }
            })
        };

        let output_stop = self.cancel.child_token();
        let output = tokio::spawn(output_loop(
            self.subdomains.clone(),
            self.stats.clone(),
            self.config.output_batch,
            self.config.output_interval(),
            output_stop.clone(),
        ));

        let worker = Worker {
            filter: self.filter.clone(),
            subdomains: self.subdomains.clone(),
            graph: self.graph.clone(),
            stats: self.stats.clone(),
            run_id: Arc::from(self.config.run_id.as_str()),
        };
        let permits = Arc::new(Semaphore::new(self.config.workers));
        let mut inflight = JoinSet::new();
        let idle = self.config.idle_timeout();

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => {
                    info!("Enumeration cancelled.");
                    break;
                }
                Some(data) = rx.recv() => {
                    let Ok(permit) = permits.clone().acquire_owned().await else { break };
                    let worker = worker.clone();
                    inflight.spawn(async move {
                        worker.handle(data).await;
                        drop(permit);
                    });
                }
                Some(res) = inflight.join_next(), if !inflight.is_empty() => {
                    if let Err(e) = res {
                        warn!(error = %e, "Pipeline worker failed.");
                    }
                }
                _ = tokio::time::sleep(idle) => {
                    if inflight.is_empty() && feeder.is_finished() && rx.is_empty() {
                        debug!("Pipeline is idle.");
                        break;
                    }
                }
            }
        }
        inflight.shutdown().await;
        feeder.abort();

        output_stop.cancel();
        if let Err(e) = output.await {
            warn!(error = %e, "Output loop failed.");
        }
        while self.subdomains.queued() > 0 {
            let sent = self.subdomains.output_requests(self.config.output_batch.max(1));
            self.stats.dispatched.fetch_add(sent, Ordering::Relaxed);
            if sent == 0 {
                break;
            }
        }

        self.cancel.cancel();
        self.filter.stop().await;
        self.subdomains.stop();

        let stats = self.snapshot();
        info!(?stats, "Enumeration finished.");
        Ok(stats)
    }

    fn snapshot(&self) -> RunStats {
        RunStats {
            submitted: self.stats.submitted.load(Ordering::Relaxed),
            accepted: self.stats.accepted.load(Ordering::Relaxed),
            dropped: self.stats.dropped.load(Ordering::Relaxed),
            resubmitted: self.stats.resubmitted.load(Ordering::Relaxed),
            dispatched: self.stats.dispatched.load(Ordering::Relaxed),
            graph_nodes: self.graph.node_count(),
        }
    }
}

async fn output_loop(
    subdomains: Arc<SubdomainTask>,
    stats: Arc<EnumStats>,
    batch: usize,
    period: Duration,
    stop: CancellationToken,
) {
    let mut ticker = tokio::time::interval(period);
    loop {
        tokio::select! {
            _ = stop.cancelled() => break,
            _ = ticker.tick() => {
                let sent = subdomains.output_requests(batch);
                if sent > 0 {
                    trace!(sent, "Dispatched queued records.");
                    stats.dispatched.fetch_add(sent, Ordering::Relaxed);
                }
            }
        }
    }
}

/// Parses one input line of the form `name[,tag[,source]]`.
///
/// Blank lines and `#` comments yield `None`, as do names outside every
/// in-scope domain and unknown tags. Names without a tag are tagged `ext`.
pub fn parse_input_line(line: &str, scope: &DomainScope) -> Option<DnsRequest> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return None;
    }

    let mut fields = line.split(',').map(str::trim);
    let name = fields.next().filter(|n| !n.is_empty())?;
    let tag = match fields.next().filter(|t| !t.is_empty()) {
        Some(raw) => match raw.parse::<Tag>() {
            Ok(tag) => tag,
            Err(_) => {
                warn!(name, tag = raw, "Unknown tag, skipping line.");
                return None;
            }
        },
        None => Tag::Ext,
    };
    let source = fields
        .next()
        .filter(|s| !s.is_empty())
        .unwrap_or(INPUT_SOURCE);

    let Some(domain) = scope.which_domain(name) else {
        debug!(name, "Name is out of scope, skipping line.");
        return None;
    };
    Some(DnsRequest::new(name, domain, tag, source))
}
