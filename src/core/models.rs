// src/core/models.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use strum::{Display, EnumString};

// --- Discovery Tags ---

/// The technique that produced a discovered name.
///
/// Tags decide the trust tier of a record: names reported by sources that
/// observe real infrastructure (certificates, zone transfers, DNS itself)
/// outrank names that were guessed, scraped or brute forced.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum Tag {
    Alt,
    Api,
    Archive,
    Axfr,
    Brute,
    Cert,
    Crawl,
    Dns,
    Ext,
    Guess,
    Rdns,
    Scrape,
}

impl Tag {
    /// Returns true when names carrying this tag are trusted even when the
    /// target zone uses wildcards.
    pub fn is_trusted(self) -> bool {
        matches!(
            self,
            Tag::Archive | Tag::Axfr | Tag::Cert | Tag::Dns | Tag::Ext
        )
    }
}

// --- DNS Answers ---

/// DNS record type number for CNAME answers.
pub const CNAME_TYPE: u16 = 5;

// A single answer returned while resolving a name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DnsAnswer {
    pub name: String,
    #[serde(rename = "type")]
    pub record_type: u16,
    pub data: String,
}

impl DnsAnswer {
    pub fn is_cname(&self) -> bool {
        self.record_type == CNAME_TYPE
    }
}

// --- Pipeline Records ---

/// A freshly discovered name travelling through the enumeration pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DnsRequest {
    pub name: String,
    pub domain: String,
    #[serde(default)]
    pub records: Vec<DnsAnswer>,
    pub tag: Tag,
    pub source: String,
    pub discovered_at: DateTime<Utc>,
}

impl DnsRequest {
    pub fn new(name: &str, domain: &str, tag: Tag, source: &str) -> Self {
        Self {
            name: name.to_string(),
            domain: domain.to_string(),
            records: Vec::new(),
            tag,
            source: source.to_string(),
            discovered_at: Utc::now(),
        }
    }

    pub fn with_records(mut self, records: Vec<DnsAnswer>) -> Self {
        self.records = records;
        self
    }

    pub fn is_trusted(&self) -> bool {
        self.tag.is_trusted()
    }
}

// A subdomain sent back to the pipeline entry is evaluated again as a name.
impl From<SubdomainRequest> for DnsRequest {
    fn from(sub: SubdomainRequest) -> Self {
        DnsRequest::new(&sub.name, &sub.domain, sub.tag, &sub.source)
    }
}

/// A name that made it past deduplication, with a private copy of its answers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolvedRequest {
    pub name: String,
    pub domain: String,
    pub records: Vec<DnsAnswer>,
    pub tag: Tag,
    pub source: String,
}

impl From<&DnsRequest> for ResolvedRequest {
    fn from(req: &DnsRequest) -> Self {
        Self {
            name: req.name.clone(),
            domain: req.domain.clone(),
            records: req.records.clone(),
            tag: req.tag,
            source: req.source.clone(),
        }
    }
}

/// A proper subdomain derived from an accepted name, with the number of
/// times it has been derived during this enumeration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubdomainRequest {
    pub name: String,
    pub domain: String,
    pub tag: Tag,
    pub source: String,
    pub times: u64,
}

/// An address observed for a name. Both stages pass it through untouched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddrRequest {
    pub address: IpAddr,
    pub domain: String,
    pub tag: Tag,
    pub source: String,
}

/// Everything that flows between pipeline stages and out to data sources.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum PipelineData {
    Dns(DnsRequest),
    Resolved(ResolvedRequest),
    Subdomain(SubdomainRequest),
    Addr(AddrRequest),
}

impl PipelineData {
    pub fn kind(&self) -> &'static str {
        match self {
            PipelineData::Dns(_) => "dns",
            PipelineData::Resolved(_) => "resolved",
            PipelineData::Subdomain(_) => "subdomain",
            PipelineData::Addr(_) => "addr",
        }
    }
}

impl From<DnsRequest> for PipelineData {
    fn from(req: DnsRequest) -> Self {
        PipelineData::Dns(req)
    }
}

impl From<SubdomainRequest> for PipelineData {
    fn from(req: SubdomainRequest) -> Self {
        PipelineData::Subdomain(req)
    }
}

impl From<AddrRequest> for PipelineData {
    fn from(req: AddrRequest) -> Self {
        PipelineData::Addr(req)
    }
}
