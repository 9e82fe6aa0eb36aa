// # HTTP Domain Source
//
// This crate provides a blocklist-backed domain source for gwsync.
//
// ## Purpose
//
// Builds the candidate set from public blocklists:
// - `http://` and `https://` locations are fetched
// - anything else is read as a local file
// - the union of all allowlists is subtracted from the union of all
//   blocklists
//
// ## Accepted Formats
//
// Lines are parsed leniently, one entry per line:
// - hosts files (`0.0.0.0 ads.example.com`, `127.0.0.1 ...`, `:: ...`)
// - adblock network filters (`||ads.example.com^`)
// - plain domains (`ads.example.com`)
//
// Comments (`#`, `!`), exceptions (`@@`), regexes, wildcards and names
// without a dot are skipped.
//
// ## Failure
//
// A location that cannot be read fails the whole fetch. A partial set
// would make the engine delete entries that are still wanted.

use async_trait::async_trait;
use gwsync_core::config::SourceConfig;
use gwsync_core::traits::{normalize_domain, DomainSet, DomainSource, DomainSourceFactory};
use gwsync_core::{Error, Registry, Result};
use std::net::IpAddr;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Default HTTP timeout for blocklist downloads (30 seconds)
const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Host names that hosts files map to themselves
const HOSTS_BOILERPLATE: &[&str] = &[
    "localhost",
    "localhost.localdomain",
    "local",
    "broadcasthost",
    "ip6-localhost",
    "ip6-loopback",
    "ip6-localnet",
    "ip6-mcastprefix",
    "ip6-allnodes",
    "ip6-allrouters",
    "ip6-allhosts",
    "0.0.0.0",
];

/// Parse one blocklist line into a normalized domain
pub fn parse_list_line(line: &str) -> Option<String> {
    let line = line.trim();

    if line.is_empty() || line.starts_with('#') || line.starts_with('!') {
        return None;
    }

    // Exceptions and regexes cannot be expressed as list entries
    if line.starts_with("@@") || (line.starts_with('/') && line.ends_with('/')) {
        return None;
    }

    if let Some(inner) = line.strip_prefix("||") {
        let domain = match inner.find('^') {
            Some(pos) => &inner[..pos],
            None => inner,
        };
        return accept(domain);
    }

    let mut parts = line.split_whitespace();
    let first = parts.next()?;

    match parts.next() {
        Some(host) if is_sink_address(first) => {
            if HOSTS_BOILERPLATE.contains(&host.to_ascii_lowercase().as_str()) {
                return None;
            }
            accept(host)
        }
        Some(trailing) if trailing.starts_with('#') => accept(first),
        Some(_) => None,
        None => accept(first),
    }
}

/// Parse a whole blocklist
pub fn parse_list_text(text: &str) -> DomainSet {
    text.lines().filter_map(parse_list_line).collect()
}

fn is_sink_address(token: &str) -> bool {
    matches!(token, "0.0.0.0" | "127.0.0.1" | "::" | "::1")
}

fn accept(token: &str) -> Option<String> {
    if token.starts_with("*.") || token.parse::<IpAddr>().is_ok() {
        return None;
    }
    if HOSTS_BOILERPLATE.contains(&token.to_ascii_lowercase().as_str()) {
        return None;
    }
    normalize_domain(token)
}

fn is_url(location: &str) -> bool {
    location.starts_with("http://") || location.starts_with("https://")
}

/// Blocklist domain source
pub struct HttpDomainSource {
    /// Blocklist locations
    block_urls: Vec<String>,

    /// Allowlist locations
    allow_urls: Vec<String>,

    /// HTTP client
    client: reqwest::Client,
}

impl HttpDomainSource {
    /// Create a new blocklist source
    ///
    /// # Parameters
    ///
    /// - `block_urls`: Blocklist URLs or file paths
    /// - `allow_urls`: Allowlist URLs or file paths subtracted from the result
    pub fn new(block_urls: Vec<String>, allow_urls: Vec<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(DEFAULT_HTTP_TIMEOUT)
            .build()
            .map_err(|e| Error::http(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            block_urls: Self::clean(block_urls),
            allow_urls: Self::clean(allow_urls),
            client,
        })
    }

    fn clean(locations: Vec<String>) -> Vec<String> {
        locations
            .into_iter()
            .map(|l| l.trim().to_string())
            .filter(|l| !l.is_empty())
            .collect()
    }

    /// Read one location as text
    async fn read(&self, location: &str) -> Result<String> {
        if !is_url(location) {
            return tokio::fs::read_to_string(location)
                .await
                .map_err(|e| Error::source(format!("Failed to read {}: {}", location, e)));
        }

        let response = self
            .client
            .get(location)
            .send()
            .await
            .map_err(|e| Error::source(format!("Failed to fetch {}: {}", location, e)))?;

        if !response.status().is_success() {
            return Err(Error::source(format!(
                "Failed to fetch {}: HTTP {}",
                location,
                response.status()
            )));
        }

        response
            .text()
            .await
            .map_err(|e| Error::source(format!("Failed to read body of {}: {}", location, e)))
    }

    /// Union of every entry in `locations`
    async fn collect(&self, locations: &[String]) -> Result<DomainSet> {
        let mut domains = DomainSet::new();

        for location in locations {
            let text = self.read(location).await?;
            let parsed = parse_list_text(&text);

            if parsed.is_empty() {
                warn!("No usable entries in {}", location);
            } else {
                debug!("Parsed {} domains from {}", parsed.len(), location);
            }
            domains.extend(parsed);
        }

        Ok(domains)
    }
}

#[async_trait]
impl DomainSource for HttpDomainSource {
    async fn fetch(&self) -> Result<DomainSet> {
        let blocked = self.collect(&self.block_urls).await?;
        let allowed = self.collect(&self.allow_urls).await?;

        let domains: DomainSet = blocked.difference(&allowed).cloned().collect();

        info!(
            "Blocklists yielded {} domains ({} removed by allowlists)",
            domains.len(),
            blocked.len() - domains.len()
        );
        Ok(domains)
    }

    fn source_name(&self) -> &'static str {
        "http"
    }
}

/// Factory for creating blocklist sources
pub struct HttpSourceFactory;

impl DomainSourceFactory for HttpSourceFactory {
    fn create(&self, config: &SourceConfig) -> Result<Box<dyn DomainSource>> {
        match config {
            SourceConfig::Http {
                block_urls,
                allow_urls,
            } => {
                config.validate()?;
                Ok(Box::new(HttpDomainSource::new(
                    block_urls.clone(),
                    allow_urls.clone(),
                )?))
            }
            _ => Err(Error::config("Invalid config for HTTP source")),
        }
    }
}

/// Register the HTTP source with a registry
pub fn register(registry: &Registry) {
    registry.register_source("http", Box::new(HttpSourceFactory));
}
