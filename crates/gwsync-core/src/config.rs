//! Configuration types for gwsync
//!
//! This module defines all configuration structures used throughout the crate.

use serde::{Deserialize, Serialize};

/// Hard limit on the number of domains a gateway account can hold
pub const DEFAULT_MAX_TOTAL_DOMAINS: usize = 300_000;

/// Hard limit on the number of items in a single gateway list
pub const DEFAULT_MAX_LIST_SIZE: usize = 1000;

/// Main gwsync configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Naming scope for managed lists and the rule
    pub scope: ScopeConfig,

    /// Gateway configuration
    pub gateway: GatewayConfig,

    /// Domain source configuration
    pub sources: SourceConfig,

    /// Optional engine settings
    #[serde(default)]
    pub engine: EngineConfig,
}

impl SyncConfig {
    /// Validate the configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        self.scope.to_scope()?;
        self.gateway.validate()?;
        self.sources.validate()?;
        self.engine.validate()?;
        Ok(())
    }
}

/// Naming scope configuration
///
/// By default the list prefix is `"[{name}]"` and the rule name is
/// `"[{name}] Block Ads"`. Either can be overridden.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScopeConfig {
    /// Scope name
    pub name: String,

    /// Explicit list name prefix
    #[serde(default)]
    pub list_prefix: Option<String>,

    /// Explicit rule name
    #[serde(default)]
    pub rule_name: Option<String>,
}

impl ScopeConfig {
    /// Create a scope configuration with the conventional names
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            list_prefix: None,
            rule_name: None,
        }
    }

    /// Build the immutable [`Scope`] this configuration describes
    pub fn to_scope(&self) -> Result<Scope, crate::Error> {
        let name = self.name.trim();
        if name.is_empty() && (self.list_prefix.is_none() || self.rule_name.is_none()) {
            return Err(crate::Error::config("Scope name cannot be empty"));
        }

        let list_prefix = self
            .list_prefix
            .clone()
            .unwrap_or_else(|| format!("[{}]", name));
        let rule_name = self
            .rule_name
            .clone()
            .unwrap_or_else(|| format!("[{}] Block Ads", name));

        Scope::new(list_prefix, rule_name)
    }
}

/// The naming scope a reconciliation run manages
///
/// Every list whose name starts with `list_prefix` belongs to this scope
/// and is deleted when the engine no longer needs it. The rule is matched
/// by exact name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Scope {
    list_prefix: String,
    rule_name: String,
}

impl Scope {
    /// Create a scope from an explicit prefix and rule name
    pub fn new(
        list_prefix: impl Into<String>,
        rule_name: impl Into<String>,
    ) -> Result<Self, crate::Error> {
        let list_prefix = list_prefix.into();
        let rule_name = rule_name.into();

        if list_prefix.trim().is_empty() {
            return Err(crate::Error::config("List prefix cannot be empty"));
        }
        if rule_name.trim().is_empty() {
            return Err(crate::Error::config("Rule name cannot be empty"));
        }

        Ok(Self {
            list_prefix,
            rule_name,
        })
    }

    /// Create a scope with the conventional names derived from `name`
    pub fn from_name(name: impl Into<String>) -> Result<Self, crate::Error> {
        ScopeConfig::new(name).to_scope()
    }

    /// The list name prefix
    pub fn list_prefix(&self) -> &str {
        &self.list_prefix
    }

    /// The rule name
    pub fn rule_name(&self) -> &str {
        &self.rule_name
    }

    /// Name of the list holding chunk `index` (1-based)
    pub fn list_name(&self, index: usize) -> String {
        format!("{} - {:03}", self.list_prefix, index)
    }

    /// Chunk index encoded in a managed list name, if any
    pub fn list_index(&self, list_name: &str) -> Option<usize> {
        list_name
            .strip_prefix(self.list_prefix.as_str())?
            .strip_prefix(" - ")?
            .parse()
            .ok()
    }
}

/// Gateway configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum GatewayConfig {
    /// Cloudflare Zero Trust Gateway
    Cloudflare {
        /// Cloudflare API token
        api_token: String,
        /// Account ID owning the gateway lists and rules
        account_id: String,
    },

    /// Custom gateway
    Custom {
        /// Factory name to use
        factory: String,
        /// Custom configuration data
        config: serde_json::Value,
    },
}

impl GatewayConfig {
    /// Validate the gateway configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        match self {
            GatewayConfig::Cloudflare {
                api_token,
                account_id,
            } => {
                if api_token.is_empty() {
                    return Err(crate::Error::config("Cloudflare API token cannot be empty"));
                }
                if account_id.is_empty() {
                    return Err(crate::Error::config("Cloudflare account ID cannot be empty"));
                }
                Ok(())
            }
            GatewayConfig::Custom { factory, .. } => {
                if factory.is_empty() {
                    return Err(crate::Error::config("Custom gateway factory cannot be empty"));
                }
                Ok(())
            }
        }
    }

    /// Get the gateway type name
    pub fn type_name(&self) -> &str {
        match self {
            GatewayConfig::Cloudflare { .. } => "cloudflare",
            GatewayConfig::Custom { factory, .. } => factory,
        }
    }
}

/// Domain source configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SourceConfig {
    /// Blocklists fetched over HTTP(S) or read from local files
    Http {
        /// Blocklist locations (URLs or paths)
        block_urls: Vec<String>,
        /// Allowlist locations subtracted from the blocklists
        #[serde(default)]
        allow_urls: Vec<String>,
    },

    /// Custom source
    Custom {
        /// Factory name to use
        factory: String,
        /// Custom configuration data
        config: serde_json::Value,
    },
}

impl SourceConfig {
    /// Validate the source configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        match self {
            SourceConfig::Http { block_urls, .. } => {
                if block_urls.iter().all(|u| u.trim().is_empty()) {
                    return Err(crate::Error::config(
                        "At least one blocklist URL is required",
                    ));
                }
                Ok(())
            }
            SourceConfig::Custom { factory, .. } => {
                if factory.is_empty() {
                    return Err(crate::Error::config("Custom source factory cannot be empty"));
                }
                Ok(())
            }
        }
    }

    /// Get the source type name
    pub fn type_name(&self) -> &str {
        match self {
            SourceConfig::Http { .. } => "http",
            SourceConfig::Custom { factory, .. } => factory,
        }
    }
}

/// Engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Maximum number of domains per remote list
    #[serde(default = "default_max_list_size")]
    pub max_list_size: usize,

    /// Maximum number of domains across all lists
    ///
    /// A candidate set above this size aborts the run before any remote
    /// call is made.
    #[serde(default = "default_max_total_domains")]
    pub max_total_domains: usize,

    /// Capacity of the engine event channel
    ///
    /// When full, new events are dropped (with a warning log).
    #[serde(default = "default_event_channel_capacity")]
    pub event_channel_capacity: usize,
}

impl EngineConfig {
    /// Validate the engine configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        if self.max_list_size == 0 {
            return Err(crate::Error::config("Maximum list size must be > 0"));
        }
        if self.max_total_domains == 0 {
            return Err(crate::Error::config("Maximum total domains must be > 0"));
        }
        if self.event_channel_capacity == 0 {
            return Err(crate::Error::config("Event channel capacity must be > 0"));
        }
        Ok(())
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_list_size: default_max_list_size(),
            max_total_domains: default_max_total_domains(),
            event_channel_capacity: default_event_channel_capacity(),
        }
    }
}

fn default_max_list_size() -> usize {
    DEFAULT_MAX_LIST_SIZE
}

fn default_max_total_domains() -> usize {
    DEFAULT_MAX_TOTAL_DOMAINS
}

fn default_event_channel_capacity() -> usize {
    1000
}
