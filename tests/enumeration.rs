// tests/enumeration.rs

use parking_lot::Mutex;
use std::collections::BTreeSet;
use std::sync::Arc;
use vanguard_rs_enum::{
    DataSource, DnsRequest, EnumConfig, EnumError, Enumeration, PipelineData, Tag,
};

struct CollectingSource {
    name: String,
    records: Mutex<Vec<PipelineData>>,
}

impl CollectingSource {
    fn new(name: &str) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            records: Mutex::new(Vec::new()),
        })
    }

    fn resolved(&self) -> BTreeSet<String> {
        self.records
            .lock()
            .iter()
            .filter_map(|r| match r {
                PipelineData::Resolved(r) => Some(r.name.clone()),
                _ => None,
            })
            .collect()
    }

    fn subdomains(&self) -> BTreeSet<(String, u64)> {
        self.records
            .lock()
            .iter()
            .filter_map(|r| match r {
                PipelineData::Subdomain(s) => Some((s.name.clone(), s.times)),
                _ => None,
            })
            .collect()
    }
}

impl DataSource for CollectingSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn request(&self, data: PipelineData) {
        self.records.lock().push(data);
    }
}

fn config() -> EnumConfig {
    EnumConfig {
        workers: 1,
        idle_timeout_ms: 200,
        output_interval_ms: 20,
        ..EnumConfig::default()
    }
    .with_domains(["example.com"])
}

fn name(name: &str, tag: Tag, source: &str) -> DnsRequest {
    DnsRequest::new(name, "example.com", tag, source)
}

#[tokio::test]
async fn enumeration_expands_and_deduplicates_names() {
    let enumeration = Enumeration::new(config()).unwrap();
    let sources = [CollectingSource::new("one"), CollectingSource::new("two")];
    for src in &sources {
        enumeration.register_source(src.clone());
    }

    let stats = enumeration
        .run(vec![
            name("a.b.example.com", Tag::Cert, "crtsh"),
            name("www.example.com", Tag::Dns, "dns"),
            name("a.b.example.com", Tag::Brute, "brute"),
            name("_sip._tcp.example.com", Tag::Dns, "dns"),
        ])
        .await
        .unwrap();

    assert_eq!(stats.submitted, 4);
    // a.b, www, _sip._tcp and the re-fed b.example.com
    assert_eq!(stats.accepted, 4);
    assert_eq!(stats.dropped, 1);
    assert_eq!(stats.resubmitted, 1);

    for src in &sources {
        assert_eq!(
            src.resolved(),
            BTreeSet::from([
                "a.b.example.com".to_string(),
                "b.example.com".to_string(),
                "www.example.com".to_string(),
            ])
        );
        assert_eq!(
            src.subdomains(),
            BTreeSet::from([
                ("b.example.com".to_string(), 1),
                ("example.com".to_string(), 1),
                ("example.com".to_string(), 2),
            ])
        );
    }
    // 3 resolved + 3 subdomain records, delivered to two sources each
    assert_eq!(stats.dispatched, 12);
}

#[tokio::test]
async fn rejected_duplicates_are_attributed_on_shutdown() {
    let enumeration = Enumeration::new(config()).unwrap();

    enumeration
        .run(vec![
            name("mail.example.com", Tag::Dns, "dns"),
            name("mail.example.com", Tag::Scrape, "bing"),
            name("ghost.example.com", Tag::Brute, "brute"),
        ])
        .await
        .unwrap();

    let sources: Vec<String> = enumeration
        .graph()
        .attributions("mail.example.com")
        .into_iter()
        .map(|a| a.source)
        .collect();
    assert_eq!(sources, vec!["dns", "bing"]);
    assert_eq!(enumeration.graph().attributions("ghost.example.com").len(), 1);
}

#[tokio::test]
async fn cname_answers_suppress_alias_subdomains() {
    let enumeration = Enumeration::new(config()).unwrap();
    let sink = CollectingSource::new("sink");
    enumeration.register_source(sink.clone());

    let alias = name("cdn.example.com", Tag::Dns, "dns").with_records(vec![
        vanguard_rs_enum::DnsAnswer {
            name: "cdn.example.com".into(),
            record_type: 5,
            data: "edge.provider.net".into(),
        },
    ]);
    enumeration
        .run(vec![alias, name("img.cdn.example.com", Tag::Dns, "dns")])
        .await
        .unwrap();

    assert!(!sink.subdomains().iter().any(|(n, _)| n == "cdn.example.com"));
    assert!(sink.resolved().contains("img.cdn.example.com"));
}

#[tokio::test]
async fn run_can_only_start_once() {
    let enumeration = Enumeration::new(config()).unwrap();
    enumeration.run(Vec::new()).await.unwrap();

    assert!(matches!(
        enumeration.run(Vec::new()).await,
        Err(EnumError::AlreadyStarted)
    ));
}
