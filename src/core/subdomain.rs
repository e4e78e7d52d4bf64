// src/core/subdomain.rs

use parking_lot::RwLock;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::core::config::EnumConfig;
use crate::core::counter::CounterManager;
use crate::core::models::{DnsRequest, PipelineData, ResolvedRequest, SubdomainRequest};
use crate::core::ports::{DataSource, GraphStore, PipelineEntry, ROOT_STAGE, ScopeChecker};
use crate::core::queue::Queue;

/// Labels that mark DNS service names rather than hosts.
const SERVICE_LABELS: &[&str] = &["_tcp", "_udp", "_tls"];

/// Returns the proper subdomain of `name`: the name without its leftmost label.
///
/// Returns `None` when the name has fewer than two labels or when dropping a
/// label would leave fewer labels than the root `domain` has.
pub fn proper_subdomain(name: &str, domain: &str) -> Option<String> {
    let labels: Vec<&str> = name.split('.').collect();
    let num = labels.len();

    if num < 2 {
        return None;
    }
    if num - 1 < domain.split('.').count() {
        return None;
    }
    Some(labels[1..].join(".").trim().to_string())
}

pub fn is_service_name(name: &str) -> bool {
    name.split('.').any(|label| SERVICE_LABELS.contains(&label))
}

/// The pipeline stage that handles newly discovered proper subdomains.
///
/// Every accepted name is queued for the data sources as a resolved record.
/// Its parent name is counted, queued as a subdomain record, and fed back to
/// the pipeline entry the first time it is seen so deeper levels get explored.
pub struct SubdomainTask {
    scope: Arc<dyn ScopeChecker>,
    graph: Arc<dyn GraphStore>,
    entry: Arc<dyn PipelineEntry>,
    counter: CounterManager,
    queue: Queue<PipelineData>,
    sources: RwLock<Vec<Arc<dyn DataSource>>>,
    cancel: CancellationToken,
}

impl std::fmt::Debug for SubdomainTask {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubdomainTask")
            .field("queued", &self.queue.len())
            .field("sources", &self.sources.read().len())
            .finish()
    }
}

impl SubdomainTask {
    /// Creates the stage and spawns its occurrence counter.
    ///
    /// Cancelling `cancel` drops resubmissions that are still in flight.
    pub fn new(
        config: &EnumConfig,
        scope: Arc<dyn ScopeChecker>,
        graph: Arc<dyn GraphStore>,
        entry: Arc<dyn PipelineEntry>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            scope,
            graph,
            entry,
            counter: CounterManager::new(config.counter_channel_capacity),
            queue: Queue::new(),
            sources: RwLock::new(Vec::new()),
            cancel,
        }
    }

    pub fn register_source(&self, source: Arc<dyn DataSource>) {
        debug!(source = source.name(), "Registered data source.");
        self.sources.write().push(source);
    }

    /// Number of records waiting for [`SubdomainTask::output_requests`].
    pub fn queued(&self) -> usize {
        self.queue.len()
    }

    pub async fn process(&self, data: PipelineData) -> Option<PipelineData> {
        let req = match data {
            PipelineData::Dns(req) => req,
            other => return Some(other),
        };

        if !self.scope.is_domain_in_scope(&req.name) {
            return None;
        }
        // Do not further evaluate service subdomains
        if is_service_name(&req.name) {
            debug!(name = %req.name, "Skipping DNS service name.");
            return None;
        }

        self.queue.append(PipelineData::Resolved(ResolvedRequest::from(&req)));
        self.check_for_subdomains(&req).await;
        Some(req.into())
    }

    async fn check_for_subdomains(&self, req: &DnsRequest) {
        let Some(sub) = proper_subdomain(&req.name, &req.domain) else {
            return;
        };
        // CNAMEs are not a proper subdomain
        if self.graph.is_cname_node(&sub).await {
            debug!(sub = %sub, "Skipping alias.");
            return;
        }

        let times = match self.counter.times_for(&sub).await {
            Ok(times) => times,
            Err(e) => {
                warn!(sub = %sub, error = %e, "Could not count subdomain.");
                return;
            }
        };

        let subreq = SubdomainRequest {
            name: sub,
            domain: req.domain.clone(),
            tag: req.tag,
            source: req.source.clone(),
            times,
        };
        self.queue.append(subreq.clone().into());

        // First time this proper subdomain has been seen?
        if subreq.name != req.domain && times == 1 {
            self.resubmit(subreq);
        }
    }

    fn resubmit(&self, subreq: SubdomainRequest) {
        let entry = Arc::clone(&self.entry);
        let cancel = self.cancel.clone();

        debug!(sub = %subreq.name, "Resubmitting new subdomain.");
        tokio::spawn(async move {
            let name = subreq.name.clone();
            tokio::select! {
                _ = cancel.cancelled() => {
                    debug!(sub = %name, "Run cancelled, dropping resubmission.");
                }
                res = entry.send_data(ROOT_STAGE, subreq.into()) => {
                    if let Err(e) = res {
                        warn!(sub = %name, error = %e, "Resubmission failed.");
                    }
                }
            }
        });
    }

    /// Sends queued records to every registered data source.
    ///
    /// Returns the number of deliveries made, one per (record, source) pair.
    /// Stops once the queue is empty or `num` deliveries have been made, and
    /// gives up on the whole pass when it meets a record that does not belong
    /// in the output queue.
    pub fn output_requests(&self, num: usize) -> usize {
        if num == 0 {
            return 0;
        }

        let sources = self.sources.read().clone();
        let mut count = 0;
        while let Some(element) = self.queue.next() {
            if !matches!(
                element,
                PipelineData::Resolved(_) | PipelineData::Subdomain(_)
            ) {
                warn!(kind = element.kind(), "Unexpected record in output queue, aborting drain.");
                break;
            }

            for src in &sources {
                src.request(element.clone());
                count += 1;
            }
            if count >= num {
                break;
            }
        }
        count
    }

    /// Stops the occurrence counter and discards undelivered records.
    pub fn stop(&self) {
        self.counter.stop();
        let dropped = self.queue.len();
        self.queue.clear();
        debug!(dropped, "Subdomain task stopped.");
    }

    #[cfg(test)]
    fn push_output(&self, data: PipelineData) {
        self.queue.append(data);
    }
}
