// # Memory Gateway
//
// In-memory implementation of GatewayClient.
//
// ## Purpose
//
// Holds lists and rules in a process-local map. Useful for tests, demos and
// for embedding the engine where the "remote" side is another component of
// the same program.
//
// ## Behavior
//
// - Ids are assigned sequentially (`list-1`, `list-2`, ..., `rule-1`, ...)
// - Unknown ids are reported as `Error::NotFound`, like a real gateway
// - Deleting a list that a rule still references is refused, like a real
//   gateway
// - All state is lost when the last clone is dropped

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tokio::sync::RwLock;
use async_trait::async_trait;

use crate::traits::{DomainSet, GatewayClient, RemoteList, RemoteRule};
use crate::Error;

#[derive(Debug, Default)]
struct Inner {
    next_id: u64,
    lists: BTreeMap<String, (String, DomainSet)>,
    rules: BTreeMap<String, (String, BTreeSet<String>)>,
}

impl Inner {
    fn allocate(&mut self, kind: &str) -> String {
        self.next_id += 1;
        format!("{}-{}", kind, self.next_id)
    }
}

/// In-memory gateway implementation
///
/// Cloning yields a handle onto the same state, so a test can keep one
/// clone for inspection while the engine owns another.
///
/// # Example
///
/// ```rust,no_run
/// use gwsync_core::gateway::MemoryGateway;
/// use gwsync_core::traits::{DomainSet, GatewayClient};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let gateway = MemoryGateway::new();
///
///     let members: DomainSet = ["ads.example.com".to_string()].into();
///     let id = gateway.create_list("[AdBlock] - 001", &members).await?;
///
///     assert_eq!(gateway.list_members(&id).await?, members);
///     Ok(())
/// }
/// ```
#[derive(Debug, Clone, Default)]
pub struct MemoryGateway {
    inner: Arc<RwLock<Inner>>,
}

impl MemoryGateway {
    /// Create a new empty gateway
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of lists held
    pub async fn list_count(&self) -> usize {
        self.inner.read().await.lists.len()
    }

    /// Number of rules held
    pub async fn rule_count(&self) -> usize {
        self.inner.read().await.rules.len()
    }

    /// Total number of domains across all lists
    pub async fn domain_count(&self) -> usize {
        self.inner
            .read()
            .await
            .lists
            .values()
            .map(|(_, members)| members.len())
            .sum()
    }

    /// Whether the gateway holds no lists and no rules
    pub async fn is_empty(&self) -> bool {
        let guard = self.inner.read().await;
        guard.lists.is_empty() && guard.rules.is_empty()
    }
}

#[async_trait]
impl GatewayClient for MemoryGateway {
    async fn list_lists(&self, name_prefix: &str) -> Result<Vec<RemoteList>, Error> {
        let guard = self.inner.read().await;
        Ok(guard
            .lists
            .iter()
            .filter(|(_, (name, _))| name.starts_with(name_prefix))
            .map(|(id, (name, _))| RemoteList::new(id.clone(), name.clone()))
            .collect())
    }

    async fn list_rules(&self, rule_name: &str) -> Result<Vec<RemoteRule>, Error> {
        let guard = self.inner.read().await;
        Ok(guard
            .rules
            .iter()
            .filter(|(_, (name, _))| name == rule_name)
            .map(|(id, (name, list_ids))| RemoteRule {
                id: id.clone(),
                name: name.clone(),
                list_ids: list_ids.clone(),
            })
            .collect())
    }

    async fn list_members(&self, list_id: &str) -> Result<DomainSet, Error> {
        let guard = self.inner.read().await;
        guard
            .lists
            .get(list_id)
            .map(|(_, members)| members.clone())
            .ok_or_else(|| Error::not_found(format!("List {}", list_id)))
    }

    async fn create_list(&self, name: &str, members: &DomainSet) -> Result<String, Error> {
        let mut guard = self.inner.write().await;
        let id = guard.allocate("list");
        guard
            .lists
            .insert(id.clone(), (name.to_string(), members.clone()));
        Ok(id)
    }

    async fn update_list(
        &self,
        list_id: &str,
        to_remove: &DomainSet,
        to_add: &DomainSet,
    ) -> Result<(), Error> {
        let mut guard = self.inner.write().await;
        let (_, members) = guard
            .lists
            .get_mut(list_id)
            .ok_or_else(|| Error::not_found(format!("List {}", list_id)))?;

        for domain in to_remove {
            members.remove(domain);
        }
        members.extend(to_add.iter().cloned());
        Ok(())
    }

    async fn delete_list(&self, list_id: &str) -> Result<(), Error> {
        let mut guard = self.inner.write().await;

        if let Some((name, _)) = guard.rules.values().find(|(_, ids)| ids.contains(list_id)) {
            return Err(Error::gateway(format!(
                "List {} is still referenced by rule {}",
                list_id, name
            )));
        }

        guard
            .lists
            .remove(list_id)
            .map(|_| ())
            .ok_or_else(|| Error::not_found(format!("List {}", list_id)))
    }

    async fn create_rule(&self, name: &str, list_ids: &BTreeSet<String>) -> Result<String, Error> {
        let mut guard = self.inner.write().await;
        if let Some(missing) = list_ids.iter().find(|id| !guard.lists.contains_key(*id)) {
            return Err(Error::not_found(format!("List {}", missing)));
        }

        let id = guard.allocate("rule");
        guard
            .rules
            .insert(id.clone(), (name.to_string(), list_ids.clone()));
        Ok(id)
    }

    async fn update_rule(
        &self,
        name: &str,
        rule_id: &str,
        list_ids: &BTreeSet<String>,
    ) -> Result<(), Error> {
        let mut guard = self.inner.write().await;
        if let Some(missing) = list_ids.iter().find(|id| !guard.lists.contains_key(*id)) {
            return Err(Error::not_found(format!("List {}", missing)));
        }

        let rule = guard
            .rules
            .get_mut(rule_id)
            .ok_or_else(|| Error::not_found(format!("Rule {}", rule_id)))?;
        *rule = (name.to_string(), list_ids.clone());
        Ok(())
    }

    async fn delete_rule(&self, rule_id: &str) -> Result<(), Error> {
        let mut guard = self.inner.write().await;
        guard
            .rules
            .remove(rule_id)
            .map(|_| ())
            .ok_or_else(|| Error::not_found(format!("Rule {}", rule_id)))
    }

    fn client_name(&self) -> &'static str {
        "memory"
    }
}
