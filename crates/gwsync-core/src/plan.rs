//! Reconciliation planning
//!
//! Pure functions that decide, from already-fetched remote state, which
//! list and rule operations a run needs. Nothing here talks to a gateway;
//! the engine reads state, asks these functions what to do, and executes
//! the answer in order.

use std::collections::BTreeSet;

use crate::chunk::Chunk;
use crate::config::Scope;
use crate::diff::{diff, SetDiff};
use crate::traits::{DomainSet, RemoteList, RemoteRule};

/// A single step of a reconciliation plan
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operation {
    /// Create a list pre-populated with `members`
    CreateList {
        /// List name
        name: String,
        /// Initial members
        members: DomainSet,
    },

    /// Patch an existing list
    UpdateList {
        /// List id
        list_id: String,
        /// List name
        name: String,
        /// Domains appended
        to_add: DomainSet,
        /// Domains removed
        to_remove: DomainSet,
    },

    /// Delete a list
    DeleteList {
        /// List id
        list_id: String,
        /// List name
        name: String,
    },

    /// Create the rule
    CreateRule {
        /// Rule name
        name: String,
        /// Referenced list ids
        list_ids: BTreeSet<String>,
    },

    /// Repoint the existing rule
    UpdateRule {
        /// Rule id
        rule_id: String,
        /// Rule name
        name: String,
        /// Referenced list ids
        list_ids: BTreeSet<String>,
    },

    /// Delete a rule
    DeleteRule {
        /// Rule id
        rule_id: String,
        /// Rule name
        name: String,
    },

    /// A resource that is already in the desired state
    NoOp {
        /// Whether a list or the rule was left alone
        kind: ResourceKind,
        /// Its name
        name: String,
    },
}

/// The two kinds of remote resource
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceKind {
    /// A domain list
    List,
    /// The block rule
    Rule,
}

impl Operation {
    /// Whether executing this operation writes to the gateway
    pub fn is_mutation(&self) -> bool {
        !matches!(self, Operation::NoOp { .. })
    }
}

/// What to do with the list backing one chunk
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListAction {
    /// No list with this name exists yet
    Create {
        /// List name
        name: String,
        /// Full chunk membership
        members: DomainSet,
    },

    /// The list exists but its members differ
    Update {
        /// The existing list
        list: RemoteList,
        /// Required changes
        diff: SetDiff<String>,
    },

    /// The list already holds exactly the chunk
    Unchanged {
        /// The existing list
        list: RemoteList,
    },
}

/// What to do with the rule
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuleAction {
    /// No rule with the configured name exists
    Create {
        /// Target list ids
        list_ids: BTreeSet<String>,
    },

    /// The rule exists but references a different set of lists
    Update {
        /// Existing rule id
        rule_id: String,
        /// Target list ids
        list_ids: BTreeSet<String>,
    },

    /// The rule already references exactly the target lists
    Unchanged,
}

/// Find the existing list backing `chunk`, if any
pub fn find_list<'a>(
    scope: &Scope,
    chunk: &Chunk,
    lists: &'a [RemoteList],
) -> Option<&'a RemoteList> {
    let name = scope.list_name(chunk.index);
    lists.iter().find(|list| list.name == name)
}

/// Decide what to do with the list backing `chunk`
///
/// `existing` is the list of the same name together with its current
/// members, when there is one.
pub fn plan_list(
    scope: &Scope,
    chunk: &Chunk,
    existing: Option<(&RemoteList, &DomainSet)>,
) -> ListAction {
    match existing {
        None => ListAction::Create {
            name: scope.list_name(chunk.index),
            members: chunk.domains.clone(),
        },
        Some((list, current)) => {
            let changes = diff(&chunk.domains, current);
            if changes.is_empty() {
                ListAction::Unchanged { list: list.clone() }
            } else {
                ListAction::Update {
                    list: list.clone(),
                    diff: changes,
                }
            }
        }
    }
}

/// Managed lists that no chunk claimed, in ascending index order
pub fn excess_lists(
    scope: &Scope,
    existing: &[RemoteList],
    kept_ids: &BTreeSet<String>,
) -> Vec<RemoteList> {
    let mut excess: Vec<RemoteList> = existing
        .iter()
        .filter(|list| !kept_ids.contains(&list.id))
        .cloned()
        .collect();
    sort_by_index(scope, &mut excess);
    excess
}

/// Decide what to do with the rule
///
/// `existing` is the first remote rule carrying the configured name.
pub fn plan_rule(target_ids: &BTreeSet<String>, existing: Option<&RemoteRule>) -> RuleAction {
    let current = existing.map(|rule| &rule.list_ids);
    let empty = BTreeSet::new();

    if target_ids == current.unwrap_or(&empty) {
        return RuleAction::Unchanged;
    }

    match existing {
        Some(rule) => RuleAction::Update {
            rule_id: rule.id.clone(),
            list_ids: target_ids.clone(),
        },
        None => RuleAction::Create {
            list_ids: target_ids.clone(),
        },
    }
}

/// Sort lists by the chunk index in their name
///
/// Names without a parsable index go last, ordered by name.
pub fn sort_by_index(scope: &Scope, lists: &mut [RemoteList]) {
    lists.sort_by(|a, b| {
        let key = |list: &RemoteList| {
            (
                scope.list_index(&list.name).unwrap_or(usize::MAX),
                list.name.clone(),
            )
        };
        key(a).cmp(&key(b))
    });
}
