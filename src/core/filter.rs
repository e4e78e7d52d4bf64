// src/core/filter.rs

use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::core::config::EnumConfig;
use crate::core::models::{DnsRequest, PipelineData, Tag};
use crate::core::ports::{GraphStore, NodeKind, Sanitizer};
use crate::core::queue::Queue;
use crate::core::stringfilter::BloomFilter;

struct FilterState {
    filter: BloomFilter,
    count: usize,
}

/// The pipeline stage that admits each new name once per trust tier.
///
/// Names are keyed in a bloom filter as `name + trusted`. A name may be
/// accepted first from an untrusted source and then once more from a trusted
/// one, never the other way round. Every rejected duplicate is handed to a
/// background task that later attributes the alternate source in the graph.
pub struct FqdnFilter {
    state: Mutex<FilterState>,
    max_size: usize,
    sanitizer: Arc<dyn Sanitizer>,
    queue: Arc<Queue<DnsRequest>>,
    done: CancellationToken,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl std::fmt::Debug for FqdnFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FqdnFilter")
            .field("max_size", &self.max_size)
            .field("pending", &self.queue.len())
            .finish()
    }
}

impl FqdnFilter {
    /// Creates the filter and spawns its reconciliation task.
    pub fn new(
        config: &EnumConfig,
        sanitizer: Arc<dyn Sanitizer>,
        graph: Arc<dyn GraphStore>,
    ) -> Self {
        let queue = Arc::new(Queue::new());
        let done = CancellationToken::new();

        let worker = tokio::spawn(process_dup_names(
            Arc::clone(&queue),
            graph,
            config.run_id.clone(),
            Schedule {
                interval: config.reconcile_interval(),
                grace: config.grace_period(),
            },
            done.clone(),
        ));

        Self {
            state: Mutex::new(FilterState {
                filter: BloomFilter::with_capacity(config.filter_max_size),
                count: 0,
            }),
            max_size: config.filter_max_size,
            sanitizer,
            queue,
            done,
            worker: Mutex::new(Some(worker)),
        }
    }

    /// Passes non-name data through; returns accepted names and drops the rest.
    pub fn process(&self, data: PipelineData) -> Option<PipelineData> {
        match data {
            PipelineData::Dns(mut req) => {
                self.sanitizer.sanitize(&mut req);
                self.check_filter(req).map(PipelineData::Dns)
            }
            other => Some(other),
        }
    }

    fn check_filter(&self, req: DnsRequest) -> Option<DnsRequest> {
        let mut state = self.state.lock();

        if !self.sanitizer.valid(&req) {
            debug!(name = %req.name, domain = %req.domain, "Dropping invalid name.");
            return None;
        }

        // Start over once the filter has seen its share of names.
        if state.count >= self.max_size {
            info!(accepted = state.count, "Resetting the name filter.");
            state.count = 0;
            state.filter = BloomFilter::with_capacity(self.max_size);
        }

        let trusted = req.is_trusted();
        // Names already confirmed by a trusted source are not taken again
        // from an untrusted one.
        if !trusted && state.filter.has(&filter_key(&req.name, true)) {
            debug!(
                name = %req.name,
                source = %req.source,
                "Name already seen from a trusted source."
            );
            self.queue.append(req);
            return None;
        }
        if state.filter.duplicate(&filter_key(&req.name, trusted)) {
            debug!(name = %req.name, source = %req.source, trusted, "Duplicate name.");
            self.queue.append(req);
            return None;
        }

        state.count += 1;
        Some(req)
    }

    /// Number of rejected duplicates not yet picked up by the reconciliation task.
    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    /// Stops the reconciliation task after it has flushed every buffered
    /// duplicate, regardless of age.
    pub async fn stop(&self) {
        self.done.cancel();
        let worker = self.worker.lock().take();
        if let Some(worker) = worker {
            if let Err(e) = worker.await {
                warn!(error = %e, "Duplicate reconciliation task failed.");
            }
        }
    }
}

impl Drop for FqdnFilter {
    fn drop(&mut self) {
        self.done.cancel();
    }
}

fn filter_key(name: &str, trusted: bool) -> String {
    format!("{name}{trusted}")
}

/// A rejected duplicate waiting to be attributed in the graph.
#[derive(Debug, Clone)]
struct AltSource {
    name: String,
    source: String,
    tag: Tag,
    observed_at: Instant,
}

impl AltSource {
    fn new(req: DnsRequest, observed_at: Instant) -> Self {
        Self {
            name: req.name,
            source: req.source,
            tag: req.tag,
            observed_at,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Schedule {
    interval: Duration,
    grace: Duration,
}

/// Makes sure duplicate names from other sources still show up in the graph.
///
/// Duplicates are held for the grace period so the first, accepted
/// observation has time to be stored. Entries whose name never made it into
/// the graph are dropped.
async fn process_dup_names(
    queue: Arc<Queue<DnsRequest>>,
    graph: Arc<dyn GraphStore>,
    run_id: String,
    schedule: Schedule,
    done: CancellationToken,
) {
    let mut pending: VecDeque<AltSource> = VecDeque::new();
    let mut ticker =
        tokio::time::interval_at(Instant::now() + schedule.interval, schedule.interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = done.cancelled() => break,
            _ = queue.signal() => {
                let now = Instant::now();
                queue.process(|req| pending.push_back(AltSource::new(req, now)));
            }
            now = ticker.tick() => {
                let mut count = 0;
                while pending
                    .front()
                    .is_some_and(|alt| now >= alt.observed_at + schedule.grace)
                {
                    if let Some(alt) = pending.pop_front() {
                        reconcile(graph.as_ref(), &alt, &run_id).await;
                        count += 1;
                    }
                }
                if count > 0 {
                    debug!(count, remaining = pending.len(), "Reconciled duplicate names.");
                }
            }
        }
    }

    let now = Instant::now();
    queue.process(|req| pending.push_back(AltSource::new(req, now)));
    let flushed = pending.len();
    for alt in pending.drain(..) {
        reconcile(graph.as_ref(), &alt, &run_id).await;
    }
    info!(flushed, "Duplicate reconciliation stopped.");
}

async fn reconcile(graph: &dyn GraphStore, alt: &AltSource, run_id: &str) {
    if graph.read_node(&alt.name, NodeKind::Fqdn).await.is_err() {
        debug!(name = %alt.name, "Duplicate never reached the graph, discarding.");
        return;
    }
    if let Err(e) = graph.insert_fqdn(&alt.name, &alt.source, alt.tag, run_id).await {
        warn!(name = %alt.name, source = %alt.source, error = %e, "Failed to attribute duplicate.");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::graph::MemoryGraph;
    use crate::core::models::AddrRequest;
    use crate::core::sanitize::DefaultSanitizer;

    fn name(name: &str, tag: Tag, source: &str) -> PipelineData {
        PipelineData::Dns(DnsRequest::new(name, "example.com", tag, source))
    }

    fn filter_with(config: EnumConfig, graph: Arc<MemoryGraph>) -> FqdnFilter {
        FqdnFilter::new(&config, Arc::new(DefaultSanitizer), graph)
    }

    fn filter() -> FqdnFilter {
        filter_with(EnumConfig::default(), Arc::new(MemoryGraph::new()))
    }

    #[tokio::test]
    async fn non_name_data_passes_through() {
        let filter = filter();
        let data = PipelineData::Subdomain(crate::core::models::SubdomainRequest {
            name: "b.example.com".into(),
            domain: "example.com".into(),
            tag: Tag::Dns,
            source: "dns".into(),
            times: 1,
        });

        assert_eq!(filter.process(data.clone()), Some(data));
        filter.stop().await;
    }

    #[tokio::test]
    async fn address_records_pass_through() {
        let filter = filter();
        let data: PipelineData = AddrRequest {
            address: "192.0.2.10".parse().unwrap(),
            domain: "example.com".into(),
            tag: Tag::Dns,
            source: "dns".into(),
        }
        .into();

        assert_eq!(filter.process(data.clone()), Some(data));
        assert_eq!(filter.pending(), 0);
        filter.stop().await;
    }

    #[tokio::test]
    async fn accepted_names_come_back_sanitized() {
        let filter = filter();

        let out = filter.process(name("WWW.Example.com.", Tag::Dns, "dns"));
        match out {
            Some(PipelineData::Dns(req)) => assert_eq!(req.name, "www.example.com"),
            other => panic!("unexpected output: {other:?}"),
        }
        filter.stop().await;
    }

    #[tokio::test]
    async fn invalid_names_are_dropped_without_queueing() {
        let filter = filter();

        assert!(filter.process(name("www.example.org", Tag::Dns, "dns")).is_none());
        assert!(filter.process(name("", Tag::Dns, "dns")).is_none());
        assert_eq!(filter.pending(), 0);
        filter.stop().await;
    }

    #[tokio::test]
    async fn each_tier_is_admitted_once() {
        let filter = filter();

        assert!(filter.process(name("a.example.com", Tag::Brute, "brute")).is_some());
        assert!(filter.process(name("a.example.com", Tag::Scrape, "bing")).is_none());
        // Upgrading from untrusted to trusted is allowed once.
        assert!(filter.process(name("a.example.com", Tag::Cert, "crtsh")).is_some());
        assert!(filter.process(name("a.example.com", Tag::Dns, "dns")).is_none());
        filter.stop().await;
    }

    #[tokio::test]
    async fn trusted_names_are_never_readmitted_from_untrusted_sources() {
        let filter = filter();

        assert!(filter.process(name("b.example.com", Tag::Cert, "crtsh")).is_some());
        for source in ["bing", "google", "brute"] {
            assert!(filter.process(name("b.example.com", Tag::Scrape, source)).is_none());
        }
        filter.stop().await;
    }

    #[tokio::test]
    async fn reset_forgets_previous_names_once() {
        let config = EnumConfig {
            filter_max_size: 2,
            ..EnumConfig::default()
        };
        let filter = filter_with(config, Arc::new(MemoryGraph::new()));

        assert!(filter.process(name("a.example.com", Tag::Dns, "dns")).is_some());
        assert!(filter.process(name("b.example.com", Tag::Dns, "dns")).is_some());
        // Counter is at capacity: the next check starts from an empty filter.
        assert!(filter.process(name("a.example.com", Tag::Dns, "dns")).is_some());
        assert!(filter.process(name("a.example.com", Tag::Dns, "dns")).is_none());
        filter.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn duplicates_wait_out_the_grace_period() {
        let graph = Arc::new(MemoryGraph::new());
        graph.insert_fqdn("www.example.com", "crtsh", Tag::Cert, "run").await.unwrap();
        let filter = filter_with(EnumConfig::default(), Arc::clone(&graph));

        assert!(filter.process(name("www.example.com", Tag::Cert, "crtsh")).is_some());
        assert!(filter.process(name("www.example.com", Tag::Cert, "censys")).is_none());

        tokio::time::sleep(Duration::from_secs(9 * 60)).await;
        assert_eq!(graph.attributions("www.example.com").len(), 1);

        tokio::time::sleep(Duration::from_secs(65)).await;
        let attributions = graph.attributions("www.example.com");
        assert_eq!(attributions.len(), 2);
        assert_eq!(attributions[1].source, "censys");

        filter.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn grace_scan_stops_at_the_first_young_duplicate() {
        let graph = Arc::new(MemoryGraph::new());
        graph.insert_fqdn("api.example.com", "crtsh", Tag::Cert, "run").await.unwrap();
        let filter = filter_with(EnumConfig::default(), Arc::clone(&graph));

        assert!(filter.process(name("api.example.com", Tag::Cert, "crtsh")).is_some());
        assert!(filter.process(name("api.example.com", Tag::Cert, "censys")).is_none());

        tokio::time::sleep(Duration::from_secs(6 * 60)).await;
        assert!(filter.process(name("api.example.com", Tag::Dns, "dns")).is_none());

        // 10m05s: only the older duplicate is past its grace period.
        tokio::time::sleep(Duration::from_secs(4 * 60 + 5)).await;
        let sources: Vec<String> = graph
            .attributions("api.example.com")
            .into_iter()
            .map(|a| a.source)
            .collect();
        assert_eq!(sources, vec!["crtsh", "censys"]);

        // 16m05s
        tokio::time::sleep(Duration::from_secs(6 * 60)).await;
        let sources: Vec<String> = graph
            .attributions("api.example.com")
            .into_iter()
            .map(|a| a.source)
            .collect();
        assert_eq!(sources, vec!["crtsh", "censys", "dns"]);

        filter.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn dropping_the_filter_stops_reconciliation() {
        let graph = Arc::new(MemoryGraph::new());
        let filter = filter_with(EnumConfig::default(), Arc::clone(&graph));
        assert_eq!(Arc::strong_count(&graph), 2);

        drop(filter);
        tokio::time::sleep(Duration::from_millis(10)).await;

        // The task released its handle to the graph on the way out.
        assert_eq!(Arc::strong_count(&graph), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_observations_are_admitted_once_per_tier() {
        const OBSERVATIONS: usize = 64;

        let graph = Arc::new(MemoryGraph::new());
        graph.insert_fqdn("x.example.com", "seed", Tag::Dns, "seed").await.unwrap();
        let filter = Arc::new(filter_with(EnumConfig::default(), Arc::clone(&graph)));

        let mut handles = Vec::new();
        for i in 0..OBSERVATIONS {
            let filter = Arc::clone(&filter);
            handles.push(tokio::spawn(async move {
                let tag = if i % 2 == 0 { Tag::Brute } else { Tag::Cert };
                let out = filter.process(name("x.example.com", tag, &format!("source-{i}")));
                (tag.is_trusted(), out.is_some())
            }));
        }

        let mut trusted = 0;
        let mut untrusted = 0;
        for handle in handles {
            match handle.await.unwrap() {
                (true, true) => trusted += 1,
                (false, true) => untrusted += 1,
                _ => {}
            }
        }
        assert_eq!(trusted, 1);
        assert!(untrusted <= 1);

        // Every rejected observation was buffered and gets attributed on stop.
        filter.stop().await;
        let rejected = OBSERVATIONS - trusted - untrusted;
        assert_eq!(graph.attributions("x.example.com").len(), 1 + rejected);
    }

    #[tokio::test(start_paused = true)]
    async fn duplicates_missing_from_the_graph_are_discarded() {
        let graph = Arc::new(MemoryGraph::new());
        let filter = filter_with(EnumConfig::default(), Arc::clone(&graph));

        filter.process(name("ghost.example.com", Tag::Dns, "dns"));
        filter.process(name("ghost.example.com", Tag::Dns, "other"));

        tokio::time::sleep(Duration::from_secs(11 * 60)).await;
        assert!(graph.attributions("ghost.example.com").is_empty());
        assert_eq!(graph.node_count(), 0);

        filter.stop().await;
    }

    #[tokio::test]
    async fn stop_flushes_pending_duplicates_immediately() {
        let graph = Arc::new(MemoryGraph::new());
        graph.insert_fqdn("mail.example.com", "dns", Tag::Dns, "run").await.unwrap();
        let filter = filter_with(EnumConfig::default(), Arc::clone(&graph));

        filter.process(name("mail.example.com", Tag::Dns, "dns"));
        filter.process(name("mail.example.com", Tag::Brute, "brute"));
        filter.process(name("mail.example.com", Tag::Scrape, "bing"));

        filter.stop().await;

        let sources: Vec<String> = graph
            .attributions("mail.example.com")
            .into_iter()
            .map(|a| a.source)
            .collect();
        assert_eq!(sources, vec!["dns", "brute", "bing"]);
    }
}
