// src/core/sanitize.rs

use once_cell::sync::Lazy;
use regex::Regex;

use crate::core::models::DnsRequest;
use crate::core::ports::{Sanitizer, ScopeChecker};

// Labels may carry underscores so service names such as `_sip._tcp` still
// validate; the subdomain stage is the one that rejects them.
static SUBDOMAIN_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^(?:[a-z0-9_](?:[a-z0-9_-]{0,61}[a-z0-9_])?\.)*[a-z0-9_](?:[a-z0-9_-]{0,61}[a-z0-9_])?$",
    )
    .expect("subdomain pattern is valid")
});

/// Maximum length of a fully qualified name, without the trailing dot.
const MAX_NAME_LEN: usize = 253;

/// Drops everything up to and including the last wildcard label.
pub fn remove_asterisk_label(name: &str) -> &str {
    match name.rfind("*.") {
        Some(idx) => &name[idx + 2..],
        None => name,
    }
}

fn clean(name: &str) -> String {
    name.trim().trim_matches('.').to_lowercase()
}

/// Lower-cases names, strips wildcard labels and surrounding dots.
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultSanitizer;

impl Sanitizer for DefaultSanitizer {
    fn sanitize(&self, req: &mut DnsRequest) {
        req.name = clean(remove_asterisk_label(req.name.trim()));
        req.domain = clean(&req.domain);
    }

    fn valid(&self, req: &DnsRequest) -> bool {
        if req.name.is_empty() || req.domain.is_empty() || req.name.len() > MAX_NAME_LEN {
            return false;
        }
        if !SUBDOMAIN_RE.is_match(&req.name) {
            return false;
        }
        is_name_within(&req.name, &req.domain)
    }
}

/// True when `name` is `domain` itself or ends with `.domain`.
pub fn is_name_within(name: &str, domain: &str) -> bool {
    name == domain
        || name
            .strip_suffix(domain)
            .is_some_and(|prefix| prefix.ends_with('.'))
}

/// The set of root domains an enumeration is allowed to explore.
#[derive(Debug, Clone, Default)]
pub struct DomainScope {
    domains: Vec<String>,
}

impl DomainScope {
    pub fn new<I, S>(domains: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut domains: Vec<String> = domains
            .into_iter()
            .map(|d| clean(d.as_ref()))
            .filter(|d| !d.is_empty())
            .collect();
        domains.sort();
        domains.dedup();
        Self { domains }
    }

    pub fn domains(&self) -> &[String] {
        &self.domains
    }

    /// Returns the in-scope root domain that `name` belongs to.
    ///
    /// When several configured domains match, the longest one wins.
    pub fn which_domain(&self, name: &str) -> Option<&str> {
        let name = clean(name);
        self.domains
            .iter()
            .filter(|d| is_name_within(&name, d))
            .max_by_key(|d| d.len())
            .map(String::as_str)
    }
}

impl ScopeChecker for DomainScope {
    fn is_domain_in_scope(&self, name: &str) -> bool {
        self.which_domain(name).is_some()
    }
}
