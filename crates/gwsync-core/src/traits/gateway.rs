// # Gateway Client Trait
//
// Defines the interface to the remote policy-enforcement service: bounded
// domain lists plus one aggregating block rule that references them.
//
// ## Implementations
//
// - Cloudflare Zero Trust Gateway: `gwsync-gateway-cloudflare` crate
// - In-memory: `gwsync_core::gateway::MemoryGateway`
//
// ## Usage
//
// ```rust,ignore
// use gwsync_core::GatewayClient;
//
// #[tokio::main]
// async fn main() -> anyhow::Result<()> {
//     let gateway = /* GatewayClient implementation */;
//
//     for list in gateway.list_lists("[AdBlock]").await? {
//         let members = gateway.list_members(&list.id).await?;
//         println!("{} holds {} domains", list.name, members.len());
//     }
//
//     Ok(())
// }
// ```

use async_trait::async_trait;
use std::collections::BTreeSet;

use crate::traits::DomainSet;

/// A remote list as reported by the gateway
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RemoteList {
    /// Opaque list id
    pub id: String,
    /// Human-readable name, `"{prefix} - {index:03}"` for managed lists
    pub name: String,
}

impl RemoteList {
    /// Create a list record
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }
}

/// A remote rule as reported by the gateway
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteRule {
    /// Opaque rule id
    pub id: String,
    /// Rule name
    pub name: String,
    /// Ids of the lists the rule references
    pub list_ids: BTreeSet<String>,
}

impl RemoteRule {
    /// Create a rule record
    pub fn new<I, S>(id: impl Into<String>, name: impl Into<String>, list_ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            id: id.into(),
            name: name.into(),
            list_ids: list_ids.into_iter().map(Into::into).collect(),
        }
    }
}

/// Trait for gateway client implementations
///
/// Each method maps to a single logical remote operation. The engine owns
/// every decision about *whether* an operation is needed; clients only
/// execute it.
///
/// # Trust Level: Untrusted
///
/// Clients:
/// - Perform API calls to their service only
/// - Return success or failure, never retry or back off
/// - Never cache remote state between calls
/// - Never decide whether a write is needed
///
/// A failed call is fatal for the run: the engine stops at the first error
/// and does not roll back the writes that already succeeded.
#[async_trait]
pub trait GatewayClient: Send + Sync {
    /// All lists whose name starts with `name_prefix`
    async fn list_lists(&self, name_prefix: &str) -> Result<Vec<RemoteList>, crate::Error>;

    /// All rules whose name equals `rule_name`
    async fn list_rules(&self, rule_name: &str) -> Result<Vec<RemoteRule>, crate::Error>;

    /// The current members of a list
    async fn list_members(&self, list_id: &str) -> Result<DomainSet, crate::Error>;

    /// Create a list pre-populated with `members`, returning its id
    async fn create_list(&self, name: &str, members: &DomainSet) -> Result<String, crate::Error>;

    /// Remove `to_remove` from and append `to_add` to a list in one call
    async fn update_list(
        &self,
        list_id: &str,
        to_remove: &DomainSet,
        to_add: &DomainSet,
    ) -> Result<(), crate::Error>;

    /// Delete a list
    async fn delete_list(&self, list_id: &str) -> Result<(), crate::Error>;

    /// Create a block rule referencing `list_ids`, returning its id
    async fn create_rule(
        &self,
        name: &str,
        list_ids: &BTreeSet<String>,
    ) -> Result<String, crate::Error>;

    /// Repoint an existing rule at `list_ids`
    async fn update_rule(
        &self,
        name: &str,
        rule_id: &str,
        list_ids: &BTreeSet<String>,
    ) -> Result<(), crate::Error>;

    /// Delete a rule
    async fn delete_rule(&self, rule_id: &str) -> Result<(), crate::Error>;

    /// Get the client name (for logging/debugging)
    fn client_name(&self) -> &'static str;
}

/// Helper trait for constructing gateway clients from configuration
pub trait GatewayFactory: Send + Sync {
    /// Create a GatewayClient instance from configuration
    fn create(
        &self,
        config: &crate::config::GatewayConfig,
    ) -> Result<Box<dyn GatewayClient>, crate::Error>;
}
