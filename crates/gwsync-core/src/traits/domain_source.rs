// # Domain Source Trait
//
// Defines the interface for producing the candidate set of domains to block.
//
// ## Implementations
//
// - HTTP/file blocklists: `gwsync-source-http` crate
// - Static sets: `StaticDomainSource` (below), for tests and embedding
//
// ## Usage
//
// ```rust,ignore
// use gwsync_core::DomainSource;
//
// #[tokio::main]
// async fn main() -> anyhow::Result<()> {
//     let source = /* DomainSource implementation */;
//     let domains = source.fetch().await?;
//     println!("{} domains to block", domains.len());
//     Ok(())
// }
// ```

use async_trait::async_trait;
use std::collections::BTreeSet;

/// A deduplicated, sorted set of lowercase domain names
///
/// Sorted iteration is what makes chunk indices stable across runs.
pub type DomainSet = BTreeSet<String>;

/// Normalize a raw domain token
///
/// Lowercases, trims whitespace and trailing dots. Returns `None` for
/// tokens that cannot be a fully-qualified name (empty, no dot, wildcard,
/// embedded whitespace or characters outside `[a-z0-9._-]`).
pub fn normalize_domain(raw: &str) -> Option<String> {
    let domain = raw.trim().trim_end_matches('.').to_ascii_lowercase();

    if domain.is_empty() || domain.len() > 253 || !domain.contains('.') {
        return None;
    }

    if domain.starts_with('.') || domain.contains("..") {
        return None;
    }

    if !domain
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_'))
    {
        return None;
    }

    Some(domain)
}

/// Trait for domain source implementations
///
/// A source is a pure input to the engine: it is asked once per run for
/// the full candidate set and has no other contact with the engine.
///
/// A source that cannot produce its complete set must fail. Returning a
/// partial set would make the engine delete remote entries that are still
/// wanted.
#[async_trait]
pub trait DomainSource: Send + Sync {
    /// Fetch the full candidate set for this run
    async fn fetch(&self) -> Result<DomainSet, crate::Error>;

    /// Get the source name (for logging/debugging)
    fn source_name(&self) -> &'static str;
}

/// Helper trait for constructing domain sources from configuration
pub trait DomainSourceFactory: Send + Sync {
    /// Create a DomainSource instance from configuration
    fn create(
        &self,
        config: &crate::config::SourceConfig,
    ) -> Result<Box<dyn DomainSource>, crate::Error>;
}

/// A domain source backed by a fixed set
#[derive(Debug, Clone, Default)]
pub struct StaticDomainSource {
    domains: DomainSet,
}

impl StaticDomainSource {
    /// Create a source that always yields the normalized form of `domains`
    pub fn new<I, S>(domains: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            domains: domains
                .into_iter()
                .filter_map(|d| normalize_domain(d.as_ref()))
                .collect(),
        }
    }
}

#[async_trait]
impl DomainSource for StaticDomainSource {
    async fn fetch(&self) -> Result<DomainSet, crate::Error> {
        Ok(self.domains.clone())
    }

    fn source_name(&self) -> &'static str {
        "static"
    }
}
