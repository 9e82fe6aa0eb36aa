//! Test doubles and common utilities for reconciliation contract tests
//!
//! The recording gateway wraps the in-memory gateway, logs every call in
//! order and can be told to fail a specific call.

#![allow(dead_code)]

use async_trait::async_trait;
use gwsync_core::config::{EngineConfig, Scope};
use gwsync_core::error::{Error, Result};
use gwsync_core::traits::{DomainSet, GatewayClient, RemoteList, RemoteRule};
use gwsync_core::{MemoryGateway, SyncEngine};
use std::collections::BTreeSet;
use std::sync::{Arc, Mutex};

/// One observed gateway call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    ListLists,
    ListRules,
    ListMembers { list: String },
    CreateList { name: String, size: usize },
    UpdateList {
        list: String,
        added: usize,
        removed: usize,
    },
    DeleteList { list: String },
    CreateRule { name: String, list_count: usize },
    UpdateRule { name: String, list_count: usize },
    DeleteRule { rule_id: String },
}

impl Call {
    /// Short name used for failure injection
    pub fn kind(&self) -> &'static str {
        match self {
            Call::ListLists => "list_lists",
            Call::ListRules => "list_rules",
            Call::ListMembers { .. } => "list_members",
            Call::CreateList { .. } => "create_list",
            Call::UpdateList { .. } => "update_list",
            Call::DeleteList { .. } => "delete_list",
            Call::CreateRule { .. } => "create_rule",
            Call::UpdateRule { .. } => "update_rule",
            Call::DeleteRule { .. } => "delete_rule",
        }
    }

    /// Whether the call writes to the gateway
    pub fn is_write(&self) -> bool {
        !matches!(
            self,
            Call::ListLists | Call::ListRules | Call::ListMembers { .. }
        )
    }

    /// Whether the call touches the rule
    pub fn is_rule_write(&self) -> bool {
        matches!(
            self,
            Call::CreateRule { .. } | Call::UpdateRule { .. } | Call::DeleteRule { .. }
        )
    }
}

#[derive(Debug, Default)]
struct Failure {
    kind: &'static str,
    remaining: usize,
}

/// A gateway that records calls and can inject failures
///
/// Clones share the call log, the failure plan and the underlying state.
#[derive(Debug, Clone, Default)]
pub struct RecordingGateway {
    /// Backing state
    pub memory: MemoryGateway,
    calls: Arc<Mutex<Vec<Call>>>,
    failure: Arc<Mutex<Option<Failure>>>,
}

impl RecordingGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every call observed so far, in order
    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    /// Only the calls that write
    pub fn writes(&self) -> Vec<Call> {
        self.calls().into_iter().filter(Call::is_write).collect()
    }

    /// Number of calls of the given kind
    pub fn count(&self, kind: &str) -> usize {
        self.calls().iter().filter(|c| c.kind() == kind).count()
    }

    /// Forget every call observed so far
    pub fn reset_calls(&self) {
        self.calls.lock().unwrap().clear();
    }

    /// Fail the `nth` (1-based) call of `kind` from now on
    pub fn fail_on(&self, kind: &'static str, nth: usize) {
        *self.failure.lock().unwrap() = Some(Failure {
            kind,
            remaining: nth,
        });
    }

    /// Stop injecting failures
    pub fn heal(&self) {
        *self.failure.lock().unwrap() = None;
    }

    async fn list_name(&self, list_id: &str) -> String {
        self.memory
            .list_lists("")
            .await
            .unwrap_or_default()
            .into_iter()
            .find(|l| l.id == list_id)
            .map(|l| l.name)
            .unwrap_or_else(|| list_id.to_string())
    }

    fn record(&self, call: Call) -> Result<()> {
        let kind = call.kind();
        self.calls.lock().unwrap().push(call);

        let mut failure = self.failure.lock().unwrap();
        let hit = match failure.as_mut() {
            Some(plan) if plan.kind == kind => {
                plan.remaining = plan.remaining.saturating_sub(1);
                plan.remaining == 0
            }
            _ => false,
        };

        if hit {
            *failure = None;
            return Err(Error::gateway(format!("injected failure on {}", kind)));
        }
        Ok(())
    }
}

#[async_trait]
impl GatewayClient for RecordingGateway {
    async fn list_lists(&self, name_prefix: &str) -> Result<Vec<RemoteList>> {
        self.record(Call::ListLists)?;
        self.memory.list_lists(name_prefix).await
    }

    async fn list_rules(&self, rule_name: &str) -> Result<Vec<RemoteRule>> {
        self.record(Call::ListRules)?;
        self.memory.list_rules(rule_name).await
    }

    async fn list_members(&self, list_id: &str) -> Result<DomainSet> {
        let list = self.list_name(list_id).await;
        self.record(Call::ListMembers { list })?;
        self.memory.list_members(list_id).await
    }

    async fn create_list(&self, name: &str, members: &DomainSet) -> Result<String> {
        self.record(Call::CreateList {
            name: name.to_string(),
            size: members.len(),
        })?;
        self.memory.create_list(name, members).await
    }

    async fn update_list(
        &self,
        list_id: &str,
        to_remove: &DomainSet,
        to_add: &DomainSet,
    ) -> Result<()> {
        let list = self.list_name(list_id).await;
        self.record(Call::UpdateList {
            list,
            added: to_add.len(),
            removed: to_remove.len(),
        })?;
        self.memory.update_list(list_id, to_remove, to_add).await
    }

    async fn delete_list(&self, list_id: &str) -> Result<()> {
        let list = self.list_name(list_id).await;
        self.record(Call::DeleteList { list })?;
        self.memory.delete_list(list_id).await
    }

    async fn create_rule(&self, name: &str, list_ids: &BTreeSet<String>) -> Result<String> {
        self.record(Call::CreateRule {
            name: name.to_string(),
            list_count: list_ids.len(),
        })?;
        self.memory.create_rule(name, list_ids).await
    }

    async fn update_rule(
        &self,
        name: &str,
        rule_id: &str,
        list_ids: &BTreeSet<String>,
    ) -> Result<()> {
        self.record(Call::UpdateRule {
            name: name.to_string(),
            list_count: list_ids.len(),
        })?;
        self.memory.update_rule(name, rule_id, list_ids).await
    }

    async fn delete_rule(&self, rule_id: &str) -> Result<()> {
        self.record(Call::DeleteRule {
            rule_id: rule_id.to_string(),
        })?;
        self.memory.delete_rule(rule_id).await
    }

    fn client_name(&self) -> &'static str {
        "recording"
    }
}

/// Scope used by every contract test
pub fn scope() -> Scope {
    Scope::from_name("Test").expect("valid scope")
}

/// `"[Test] - {index:03}"`
pub fn list_name(index: usize) -> String {
    scope().list_name(index)
}

/// `"[Test] Block Ads"`
pub fn rule_name() -> String {
    scope().rule_name().to_string()
}

/// Domains `d{start:06}.example.com` through `d{end-1:06}.example.com`
///
/// Zero padding keeps numeric and lexicographic order the same.
pub fn domains(range: std::ops::Range<usize>) -> DomainSet {
    range.map(domain).collect()
}

/// The `i`th generated domain
pub fn domain(i: usize) -> String {
    format!("d{:06}.example.com", i)
}

/// Expected `create_list` call for chunk `index`
pub fn create_list(index: usize, size: usize) -> Call {
    Call::CreateList {
        name: list_name(index),
        size,
    }
}

/// Expected `update_list` call on chunk `index`
pub fn update_list(index: usize, added: usize, removed: usize) -> Call {
    Call::UpdateList {
        list: list_name(index),
        added,
        removed,
    }
}

/// Expected `delete_list` call on chunk `index`
pub fn delete_list(index: usize) -> Call {
    delete_named_list(&list_name(index))
}

/// Expected `delete_list` call on a list by name
pub fn delete_named_list(name: &str) -> Call {
    Call::DeleteList {
        list: name.to_string(),
    }
}

/// Expected `create_rule` call
pub fn create_rule(list_count: usize) -> Call {
    Call::CreateRule {
        name: rule_name(),
        list_count,
    }
}

/// Expected `update_rule` call
pub fn update_rule(list_count: usize) -> Call {
    Call::UpdateRule {
        name: rule_name(),
        list_count,
    }
}

/// Engine with production limits
pub fn engine(gateway: &RecordingGateway) -> SyncEngine {
    engine_with(gateway, EngineConfig::default())
}

/// Engine with custom limits
pub fn engine_with(gateway: &RecordingGateway, config: EngineConfig) -> SyncEngine {
    let (engine, _event_rx) = SyncEngine::new(Box::new(gateway.clone()), scope(), config)
        .expect("engine construction succeeds");
    engine
}

/// Engine with small lists, for tests that care about list boundaries
pub fn small_engine(gateway: &RecordingGateway, max_list_size: usize) -> SyncEngine {
    engine_with(
        gateway,
        EngineConfig {
            max_list_size,
            ..EngineConfig::default()
        },
    )
}

/// Names of the lists currently held, sorted
pub async fn list_names(gateway: &RecordingGateway) -> Vec<String> {
    let mut names: Vec<String> = gateway
        .memory
        .list_lists("")
        .await
        .expect("memory gateway never fails")
        .into_iter()
        .map(|l| l.name)
        .collect();
    names.sort();
    names
}
