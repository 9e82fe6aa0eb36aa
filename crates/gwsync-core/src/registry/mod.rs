//! Plugin-based gateway and source registry
//!
//! The registry allows gateway clients and domain sources to be registered
//! dynamically at runtime, avoiding hardcoded if-else chains.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use gwsync_core::registry::Registry;
//! use gwsync_core::config::GatewayConfig;
//!
//! let registry = Registry::new();
//! registry.register_gateway("cloudflare", Box::new(cloudflare_factory));
//!
//! let config = GatewayConfig::Cloudflare { ... };
//! let gateway = registry.create_gateway(&config)?;
//! ```
//!
//! ## Registration
//!
//! Implementations register themselves during initialization:
//!
//! ```rust,ignore
//! // In gwsync-gateway-cloudflare
//! pub fn register(registry: &Registry) {
//!     registry.register_gateway("cloudflare", Box::new(CloudflareFactory));
//! }
//! ```

use crate::config::{GatewayConfig, SourceConfig};
use crate::error::{Error, Result};
use crate::traits::{DomainSource, DomainSourceFactory, GatewayClient, GatewayFactory};
use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Registry for plugin-based gateway and source creation
///
/// Maps type names to factory objects, so the binary can build whatever the
/// configuration names without knowing the concrete types.
///
/// ## Thread Safety
///
/// Interior mutability with RwLock: concurrent reads, exclusive writes.
#[derive(Default)]
pub struct Registry {
    /// Registered gateway factories
    gateways: RwLock<HashMap<String, Box<dyn GatewayFactory>>>,

    /// Registered domain source factories
    sources: RwLock<HashMap<String, Box<dyn DomainSourceFactory>>>,
}

// A panicking factory poisons the lock but leaves the map itself intact
fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl Registry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a gateway factory
    ///
    /// # Parameters
    ///
    /// - `name`: Gateway type name (e.g., "cloudflare")
    /// - `factory`: Factory object for creating gateway clients
    ///
    /// Registering the same name twice replaces the earlier factory.
    pub fn register_gateway(&self, name: impl Into<String>, factory: Box<dyn GatewayFactory>) {
        write(&self.gateways).insert(name.into(), factory);
    }

    /// Register a domain source factory
    ///
    /// # Parameters
    ///
    /// - `name`: Source type name (e.g., "http")
    /// - `factory`: Factory object for creating domain sources
    pub fn register_source(&self, name: impl Into<String>, factory: Box<dyn DomainSourceFactory>) {
        write(&self.sources).insert(name.into(), factory);
    }

    /// Create a gateway client from configuration
    ///
    /// # Returns
    ///
    /// - `Ok(Box<dyn GatewayClient>)`: Created client
    /// - `Err(Error)`: If the gateway type is not registered or creation fails
    pub fn create_gateway(&self, config: &GatewayConfig) -> Result<Box<dyn GatewayClient>> {
        let gateway_type = config.type_name();
        let gateways = read(&self.gateways);

        let factory = gateways
            .get(gateway_type)
            .ok_or_else(|| Error::config(format!("Unknown gateway type: {}", gateway_type)))?;

        factory.create(config)
    }

    /// Create a domain source from configuration
    ///
    /// # Returns
    ///
    /// - `Ok(Box<dyn DomainSource>)`: Created source
    /// - `Err(Error)`: If the source type is not registered or creation fails
    pub fn create_source(&self, config: &SourceConfig) -> Result<Box<dyn DomainSource>> {
        let source_type = config.type_name();
        let sources = read(&self.sources);

        let factory = sources
            .get(source_type)
            .ok_or_else(|| Error::config(format!("Unknown source type: {}", source_type)))?;

        factory.create(config)
    }

    /// List all registered gateway types
    pub fn list_gateways(&self) -> Vec<String> {
        read(&self.gateways).keys().cloned().collect()
    }

    /// List all registered source types
    pub fn list_sources(&self) -> Vec<String> {
        read(&self.sources).keys().cloned().collect()
    }

    /// Check if a gateway type is registered
    pub fn has_gateway(&self, name: &str) -> bool {
        read(&self.gateways).contains_key(name)
    }

    /// Check if a source type is registered
    pub fn has_source(&self, name: &str) -> bool {
        read(&self.sources).contains_key(name)
    }
}
