//! Reconciliation engine
//!
//! The SyncEngine is responsible for:
//! - Enforcing the domain quota before touching the gateway
//! - Chunking the candidate set into list-sized pieces
//! - Diffing each chunk against the deployed list of the same name
//! - Pointing the rule at exactly the lists the chunks map to
//! - Deleting managed lists no chunk needs anymore
//! - Tearing the whole scope down on request
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐
//! │ DomainSource │─── DomainSet ───┐
//! └──────────────┘                 │
//!                                  ▼
//!                          ┌──────────────┐
//!                          │  SyncEngine  │── chunk ── plan
//!                          └──────────────┘
//!                                  │
//!                 ┌────────────────┴────────────────┐
//!                 ▼                                 ▼
//!         ┌───────────────┐                 ┌─────────────┐
//!         │ GatewayClient │                 │   Events    │
//!         │ (read/write)  │                 │  (notify)   │
//!         └───────────────┘                 └─────────────┘
//! ```
//!
//! ## Run Order
//!
//! 1. Quota check (no remote call before it passes)
//! 2. Read managed lists, the rule, and members of every list a chunk maps to
//! 3. Create/update lists, collecting the target id set
//! 4. Create/update the rule if its id set differs
//! 5. Delete excess lists (they are unreferenced by now)
//!
//! Every call is awaited before the next one is issued. The first failing
//! call ends the run; earlier writes are not rolled back.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::chunk::chunk_domains;
use crate::config::{EngineConfig, Scope};
use crate::error::{Error, Result};
use crate::plan::{self, ListAction, Operation, ResourceKind, RuleAction};
use crate::traits::{DomainSet, DomainSource, GatewayClient};

/// Which top-level operation a run performed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    /// Bring the gateway in line with the candidate set
    Reconcile,
    /// Delete every managed list and rule
    Teardown,
}

impl std::fmt::Display for RunMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunMode::Reconcile => write!(f, "reconcile"),
            RunMode::Teardown => write!(f, "teardown"),
        }
    }
}

/// Events emitted by the SyncEngine
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineEvent {
    /// Run started
    Started {
        mode: RunMode,
    },

    /// A list was created
    ListCreated {
        name: String,
        list_id: String,
        size: usize,
    },

    /// A list was patched
    ListUpdated {
        name: String,
        list_id: String,
        added: usize,
        removed: usize,
    },

    /// A list already matched its chunk
    ListUnchanged {
        name: String,
        list_id: String,
    },

    /// A list was deleted
    ListDeleted {
        name: String,
        list_id: String,
    },

    /// The rule was created
    RuleCreated {
        name: String,
        rule_id: String,
        list_count: usize,
    },

    /// The rule was repointed
    RuleUpdated {
        name: String,
        rule_id: String,
        list_count: usize,
    },

    /// The rule already referenced the target lists
    RuleUnchanged {
        name: String,
    },

    /// A rule was deleted
    RuleDeleted {
        name: String,
        rule_id: String,
    },

    /// Run finished successfully
    Finished {
        mode: RunMode,
        mutations: usize,
    },

    /// Run halted on an error
    Failed {
        mode: RunMode,
        error: String,
        applied: usize,
    },
}

/// Outcome of a successful run
#[derive(Debug, Clone)]
pub struct RunReport {
    /// Which operation ran
    pub mode: RunMode,
    /// When the run started
    pub started_at: DateTime<Utc>,
    /// When the run finished
    pub finished_at: DateTime<Utc>,
    /// Size of the candidate set (0 for teardown)
    pub domain_count: usize,
    /// Executed plan, in execution order, including no-ops
    pub operations: Vec<Operation>,
}

impl RunReport {
    /// Number of operations that wrote to the gateway
    pub fn mutation_count(&self) -> usize {
        self.operations.iter().filter(|op| op.is_mutation()).count()
    }

    /// Whether the run left the gateway untouched
    pub fn is_noop(&self) -> bool {
        self.mutation_count() == 0
    }

    /// Number of lists created
    pub fn lists_created(&self) -> usize {
        self.count(|op| matches!(op, Operation::CreateList { .. }))
    }

    /// Number of lists updated
    pub fn lists_updated(&self) -> usize {
        self.count(|op| matches!(op, Operation::UpdateList { .. }))
    }

    /// Number of lists left untouched because they already matched
    pub fn lists_unchanged(&self) -> usize {
        self.count(|op| {
            matches!(
                op,
                Operation::NoOp {
                    kind: ResourceKind::List,
                    ..
                }
            )
        })
    }

    /// Number of lists deleted
    pub fn lists_deleted(&self) -> usize {
        self.count(|op| matches!(op, Operation::DeleteList { .. }))
    }

    /// Number of rule creates and updates
    pub fn rule_mutations(&self) -> usize {
        self.count(|op| {
            matches!(
                op,
                Operation::CreateRule { .. } | Operation::UpdateRule { .. }
            )
        })
    }

    /// Number of rules deleted
    pub fn rules_deleted(&self) -> usize {
        self.count(|op| matches!(op, Operation::DeleteRule { .. }))
    }

    /// What happened to the rule, for logging
    pub fn rule_action(&self) -> &'static str {
        self.operations
            .iter()
            .find_map(|op| match op {
                Operation::CreateRule { .. } => Some("created"),
                Operation::UpdateRule { .. } => Some("updated"),
                Operation::DeleteRule { .. } => Some("deleted"),
                Operation::NoOp {
                    kind: ResourceKind::Rule,
                    ..
                } => Some("unchanged"),
                _ => None,
            })
            .unwrap_or("none")
    }

    fn count(&self, pred: impl Fn(&Operation) -> bool) -> usize {
        self.operations.iter().filter(|op| pred(op)).count()
    }
}

/// Core reconciliation engine
///
/// The engine holds no state between runs: every run re-reads the gateway
/// and recomputes its plan. Two runs must not overlap against the same
/// scope; nothing here locks against that.
///
/// ## Lifecycle
///
/// 1. Create with [`SyncEngine::new()`]
/// 2. Call [`SyncEngine::run()`], [`SyncEngine::reconcile()`] or
///    [`SyncEngine::teardown()`] as often as needed
pub struct SyncEngine {
    /// Gateway holding the lists and the rule
    gateway: Box<dyn GatewayClient>,

    /// Names of managed lists and the rule
    scope: Scope,

    /// Maximum domains per list
    max_list_size: usize,

    /// Maximum domains overall
    max_total_domains: usize,

    /// Event sender for external monitoring
    event_tx: mpsc::Sender<EngineEvent>,
}

impl SyncEngine {
    /// Create a new engine
    ///
    /// # Returns
    ///
    /// A tuple of (engine, event_receiver) where event_receiver yields engine events
    pub fn new(
        gateway: Box<dyn GatewayClient>,
        scope: Scope,
        config: EngineConfig,
    ) -> Result<(Self, mpsc::Receiver<EngineEvent>)> {
        config.validate()?;

        let (tx, rx) = mpsc::channel(config.event_channel_capacity);

        let engine = Self {
            gateway,
            scope,
            max_list_size: config.max_list_size,
            max_total_domains: config.max_total_domains,
            event_tx: tx,
        };

        Ok((engine, rx))
    }

    /// The scope this engine manages
    pub fn scope(&self) -> &Scope {
        &self.scope
    }

    /// Fetch the candidate set from `source` and reconcile against it
    pub async fn run(&self, source: &dyn DomainSource) -> Result<RunReport> {
        info!("Fetching candidate domains from {} source", source.source_name());
        let domains = source.fetch().await?;
        info!("Fetched {} unique domains", domains.len());
        self.reconcile(&domains).await
    }

    /// Reconcile the gateway against `domains`
    pub async fn reconcile(&self, domains: &DomainSet) -> Result<RunReport> {
        let started_at = Utc::now();
        self.emit_event(EngineEvent::Started {
            mode: RunMode::Reconcile,
        });

        let mut operations = Vec::new();
        let result = self.reconcile_into(domains, &mut operations).await;

        self.finish(RunMode::Reconcile, started_at, domains.len(), operations, result)
    }

    /// Delete every rule and list in this engine's scope
    pub async fn teardown(&self) -> Result<RunReport> {
        let started_at = Utc::now();
        self.emit_event(EngineEvent::Started {
            mode: RunMode::Teardown,
        });

        let mut operations = Vec::new();
        let result = self.teardown_into(&mut operations).await;

        self.finish(RunMode::Teardown, started_at, 0, operations, result)
    }

    /// Fail before any remote call when the candidate set is too large
    fn check_quota(&self, domains: &DomainSet) -> Result<()> {
        if domains.len() > self.max_total_domains {
            error!(
                "The domain list has {} entries, exceeding the gateway limit of {}",
                domains.len(),
                self.max_total_domains
            );
            return Err(Error::quota_exceeded(domains.len(), self.max_total_domains));
        }
        Ok(())
    }

    async fn reconcile_into(
        &self,
        domains: &DomainSet,
        operations: &mut Vec<Operation>,
    ) -> Result<()> {
        self.check_quota(domains)?;

        let chunks = chunk_domains(domains, self.max_list_size)?;
        debug!(
            "Split {} domains into {} chunk(s) of at most {}",
            domains.len(),
            chunks.len(),
            self.max_list_size
        );

        let current_lists = self.gateway.list_lists(self.scope.list_prefix()).await?;
        let current_rules = self.gateway.list_rules(self.scope.rule_name()).await?;
        debug!(
            "Found {} managed list(s) and {} rule(s) on {}",
            current_lists.len(),
            current_rules.len(),
            self.gateway.client_name()
        );

        // Reads first, so a failing read never leaves a half-applied plan
        let mut actions = Vec::with_capacity(chunks.len());
        for chunk in &chunks {
            let action = match plan::find_list(&self.scope, chunk, &current_lists) {
                Some(list) => {
                    let members = self.gateway.list_members(&list.id).await?;
                    plan::plan_list(&self.scope, chunk, Some((list, &members)))
                }
                None => plan::plan_list(&self.scope, chunk, None),
            };
            actions.push(action);
        }

        let mut target_ids = BTreeSet::new();
        for action in actions {
            let list_id = self.apply_list_action(action, operations).await?;
            target_ids.insert(list_id);
        }

        let existing_rule = current_rules
            .iter()
            .find(|rule| rule.name == self.scope.rule_name());
        let rule_action = plan::plan_rule(&target_ids, existing_rule);
        self.apply_rule_action(rule_action, operations).await?;

        for list in plan::excess_lists(&self.scope, &current_lists, &target_ids) {
            self.gateway.delete_list(&list.id).await?;
            info!("Deleted excess list: {}", list.name);
            self.emit_event(EngineEvent::ListDeleted {
                name: list.name.clone(),
                list_id: list.id.clone(),
            });
            operations.push(Operation::DeleteList {
                list_id: list.id,
                name: list.name,
            });
        }

        Ok(())
    }

    /// Execute one list action, returning the id of the list it leaves behind
    async fn apply_list_action(
        &self,
        action: ListAction,
        operations: &mut Vec<Operation>,
    ) -> Result<String> {
        match action {
            ListAction::Create { name, members } => {
                let list_id = self.gateway.create_list(&name, &members).await?;
                info!("Created list: {} ({} domains)", name, members.len());
                self.emit_event(EngineEvent::ListCreated {
                    name: name.clone(),
                    list_id: list_id.clone(),
                    size: members.len(),
                });
                operations.push(Operation::CreateList { name, members });
                Ok(list_id)
            }
            ListAction::Update { list, diff } => {
                self.gateway
                    .update_list(&list.id, &diff.to_remove, &diff.to_add)
                    .await?;
                info!(
                    "Updated list: {} (+{} -{})",
                    list.name,
                    diff.to_add.len(),
                    diff.to_remove.len()
                );
                self.emit_event(EngineEvent::ListUpdated {
                    name: list.name.clone(),
                    list_id: list.id.clone(),
                    added: diff.to_add.len(),
                    removed: diff.to_remove.len(),
                });
                operations.push(Operation::UpdateList {
                    list_id: list.id.clone(),
                    name: list.name,
                    to_add: diff.to_add,
                    to_remove: diff.to_remove,
                });
                Ok(list.id)
            }
            ListAction::Unchanged { list } => {
                info!("Skipping list update, contents unchanged: {}", list.name);
                self.emit_event(EngineEvent::ListUnchanged {
                    name: list.name.clone(),
                    list_id: list.id.clone(),
                });
                operations.push(Operation::NoOp {
                    kind: ResourceKind::List,
                    name: list.name,
                });
                Ok(list.id)
            }
        }
    }

    async fn apply_rule_action(
        &self,
        action: RuleAction,
        operations: &mut Vec<Operation>,
    ) -> Result<()> {
        let name = self.scope.rule_name().to_string();

        match action {
            RuleAction::Create { list_ids } => {
                info!("Rule '{}' does not exist. Creating...", name);
                let rule_id = self.gateway.create_rule(&name, &list_ids).await?;
                info!("Created rule: {} ({} lists)", name, list_ids.len());
                self.emit_event(EngineEvent::RuleCreated {
                    name: name.clone(),
                    rule_id,
                    list_count: list_ids.len(),
                });
                operations.push(Operation::CreateRule { name, list_ids });
            }
            RuleAction::Update { rule_id, list_ids } => {
                info!("Rule '{}' already exists. Updating...", name);
                self.gateway.update_rule(&name, &rule_id, &list_ids).await?;
                info!("Updated rule: {} ({} lists)", name, list_ids.len());
                self.emit_event(EngineEvent::RuleUpdated {
                    name: name.clone(),
                    rule_id: rule_id.clone(),
                    list_count: list_ids.len(),
                });
                operations.push(Operation::UpdateRule {
                    rule_id,
                    name,
                    list_ids,
                });
            }
            RuleAction::Unchanged => {
                info!("Skipping rule update, list ids unchanged: {}", name);
                self.emit_event(EngineEvent::RuleUnchanged { name: name.clone() });
                operations.push(Operation::NoOp {
                    kind: ResourceKind::Rule,
                    name,
                });
            }
        }

        Ok(())
    }

    async fn teardown_into(&self, operations: &mut Vec<Operation>) -> Result<()> {
        let rules = self.gateway.list_rules(self.scope.rule_name()).await?;
        let mut lists = self.gateway.list_lists(self.scope.list_prefix()).await?;
        plan::sort_by_index(&self.scope, &mut lists);

        if rules.is_empty() && lists.is_empty() {
            info!(
                "Nothing to delete: no rule '{}' and no lists under '{}'",
                self.scope.rule_name(),
                self.scope.list_prefix()
            );
            return Ok(());
        }

        info!(
            "Deleting rule '{}' and associated lists",
            self.scope.rule_name()
        );

        // Rules go first so no list is deleted while still referenced
        for rule in rules {
            self.gateway.delete_rule(&rule.id).await?;
            info!("Deleted rule: {}", rule.name);
            self.emit_event(EngineEvent::RuleDeleted {
                name: rule.name.clone(),
                rule_id: rule.id.clone(),
            });
            operations.push(Operation::DeleteRule {
                rule_id: rule.id,
                name: rule.name,
            });
        }

        for list in lists {
            self.gateway.delete_list(&list.id).await?;
            info!("Deleted list: {}", list.name);
            self.emit_event(EngineEvent::ListDeleted {
                name: list.name.clone(),
                list_id: list.id.clone(),
            });
            operations.push(Operation::DeleteList {
                list_id: list.id,
                name: list.name,
            });
        }

        Ok(())
    }

    fn finish(
        &self,
        mode: RunMode,
        started_at: DateTime<Utc>,
        domain_count: usize,
        operations: Vec<Operation>,
        result: Result<()>,
    ) -> Result<RunReport> {
        let report = RunReport {
            mode,
            started_at,
            finished_at: Utc::now(),
            domain_count,
            operations,
        };

        match result {
            Ok(()) => {
                info!(
                    "Finished {}: {} change(s) applied",
                    mode,
                    report.mutation_count()
                );
                self.emit_event(EngineEvent::Finished {
                    mode,
                    mutations: report.mutation_count(),
                });
                Ok(report)
            }
            Err(e) => {
                let applied = report.mutation_count();
                if applied > 0 {
                    error!(
                        "{} halted after applying {} change(s); gateway is partially updated: {}",
                        mode, applied, e
                    );
                } else if !e.is_precondition() {
                    error!("{} failed before any change was applied: {}", mode, e);
                }
                self.emit_event(EngineEvent::Failed {
                    mode,
                    error: e.to_string(),
                    applied,
                });
                Err(e)
            }
        }
    }

    /// Emit an engine event
    fn emit_event(&self, event: EngineEvent) {
        match self.event_tx.try_send(event) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!(
                    "Event channel full, dropping event. Consider increasing event_channel_capacity."
                );
            }
            // Receiver dropped: nobody is listening
            Err(mpsc::error::TrySendError::Closed(_)) => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::MemoryGateway;
    use crate::traits::StaticDomainSource;

    fn engine(
        gateway: &MemoryGateway,
        max_list_size: usize,
    ) -> (SyncEngine, mpsc::Receiver<EngineEvent>) {
        SyncEngine::new(
            Box::new(gateway.clone()),
            Scope::from_name("Test").unwrap(),
            EngineConfig {
                max_list_size,
                max_total_domains: 100,
                event_channel_capacity: 64,
            },
        )
        .expect("engine construction succeeds")
    }

    #[test]
    fn test_invalid_engine_config_is_rejected() {
        let result = SyncEngine::new(
            Box::new(MemoryGateway::new()),
            Scope::from_name("Test").unwrap(),
            EngineConfig {
                max_list_size: 0,
                ..EngineConfig::default()
            },
        );
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_run_pulls_from_source() {
        let gateway = MemoryGateway::new();
        let (engine, _rx) = engine(&gateway, 2);
        let source = StaticDomainSource::new(["a.com", "b.com", "c.com"]);

        let report = engine.run(&source).await.unwrap();

        assert_eq!(report.domain_count, 3);
        assert_eq!(report.lists_created(), 2);
        assert_eq!(report.rule_mutations(), 1);
        assert_eq!(gateway.domain_count().await, 3);
    }

    #[tokio::test]
    async fn test_events_follow_execution_order() {
        let gateway = MemoryGateway::new();
        let (engine, mut rx) = engine(&gateway, 10);
        let domains: DomainSet = ["a.com".to_string()].into();

        engine.reconcile(&domains).await.unwrap();

        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }

        assert!(matches!(events[0], EngineEvent::Started { mode: RunMode::Reconcile }));
        assert!(matches!(events[1], EngineEvent::ListCreated { size: 1, .. }));
        assert!(matches!(events[2], EngineEvent::RuleCreated { list_count: 1, .. }));
        assert!(matches!(
            events[3],
            EngineEvent::Finished {
                mode: RunMode::Reconcile,
                mutations: 2
            }
        ));
    }

    #[tokio::test]
    async fn test_quota_failure_emits_failed_event() {
        let gateway = MemoryGateway::new();
        let (engine, mut rx) = engine(&gateway, 10);
        let domains: DomainSet = (0..101).map(|i| format!("d{}.com", i)).collect();

        let err = engine.reconcile(&domains).await.unwrap_err();
        assert!(matches!(err, Error::QuotaExceeded { count: 101, limit: 100 }));

        let _started = rx.try_recv().unwrap();
        assert!(matches!(
            rx.try_recv().unwrap(),
            EngineEvent::Failed { applied: 0, .. }
        ));
    }

    #[tokio::test]
    async fn test_full_event_channel_does_not_fail_run() {
        let gateway = MemoryGateway::new();
        let (engine, _rx) = SyncEngine::new(
            Box::new(gateway.clone()),
            Scope::from_name("Test").unwrap(),
            EngineConfig {
                max_list_size: 1,
                max_total_domains: 100,
                event_channel_capacity: 1,
            },
        )
        .unwrap();
        let domains: DomainSet = ["a.com".to_string(), "b.com".to_string()].into();

        let report = engine.reconcile(&domains).await.unwrap();
        assert_eq!(report.lists_created(), 2);
    }
}
