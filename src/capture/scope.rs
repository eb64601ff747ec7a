//! Capture scope: which hosts are never recorded.

use crate::config::DomainRule;
use log::debug;

/// Extracts the host of `url` without a leading `www.`.
///
/// Returns an empty string if the URL cannot be parsed or has no host.
pub fn extract_domain(url: &str) -> String {
    match url::Url::parse(url) {
        Ok(parsed) => {
            let host = parsed.host_str().unwrap_or_default().to_ascii_lowercase();
            match host.strip_prefix("www.") {
                Some(stripped) => stripped.to_string(),
                None => host,
            }
        }
        Err(e) => {
            debug!("Cannot extract domain from URL {}: {}", url, e);
            String::new()
        }
    }
}

/// Set of domains excluded from capture.
#[derive(Debug, Clone, Default)]
pub struct ScopeFilter {
    rules: Vec<DomainRule>,
}

impl ScopeFilter {
    pub fn new(rules: Vec<DomainRule>) -> Self {
        let rules = rules
            .into_iter()
            .map(|rule| DomainRule {
                domain: normalize_rule_domain(&rule.domain),
                include_subdomains: rule.include_subdomains,
            })
            .collect();
        Self { rules }
    }

    pub fn rules(&self) -> &[DomainRule] {
        &self.rules
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Returns the rule that excludes `domain`, if any.
    pub fn matching_rule(&self, domain: &str) -> Option<&DomainRule> {
        if domain.is_empty() {
            return None;
        }
        self.rules.iter().find(|rule| {
            domain == rule.domain
                || (rule.include_subdomains && domain.ends_with(&format!(".{}", rule.domain)))
        })
    }

    /// Returns `true` if traffic to `url` must not be captured.
    pub fn excludes_url(&self, url: &str) -> bool {
        if self.rules.is_empty() {
            return false;
        }
        let domain = extract_domain(url);
        match self.matching_rule(&domain) {
            Some(rule) => {
                debug!("Skipping out-of-scope domain {} (rule: {})", domain, rule);
                true
            }
            None => false,
        }
    }
}

fn normalize_rule_domain(domain: &str) -> String {
    let domain = domain.trim().to_ascii_lowercase();
    match domain.strip_prefix("www.") {
        Some(stripped) => stripped.to_string(),
        None => domain,
    }
}
