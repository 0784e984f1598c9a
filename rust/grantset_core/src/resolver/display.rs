//! Presentation state for permission editors.
//!
//! Not needed for the correctness of grants; renderers use it to show which
//! entries the user picked, which ones are only implied and by what.

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;

use crate::types::*;

use super::codec::to_extended;
use super::graph::PermissionGraphs;
use super::is_active;

/// Status of one catalog entry (or unknown stored token).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EntryState {
    /// Stored exactly in the set.
    pub active: bool,
    /// Granted directly, through a wildcard, through an implication, or as
    /// a composite field whose components are all granted.
    pub virtually_active: bool,
    /// Transitive implying tokens that are themselves virtually active; for
    /// a composite field, its components.
    pub implied_by: BTreeSet<XPerm>,
    /// Virtually active and implied by nothing: picked by the user.
    pub is_root: bool,
    /// Stored but not in the catalog.
    pub is_unknown: bool,
    pub unmet_requirements: BTreeSet<XPerm>,
}

/// Per-token presentation state.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct DisplayState {
    entries: BTreeMap<XPerm, EntryState>,
}

impl DisplayState {
    pub fn get(&self, token: &XPerm) -> Option<&EntryState> {
        self.entries.get(token)
    }

    pub fn permission(&self, id: &str) -> Option<&EntryState> {
        self.get(&XPerm::perm(id))
    }

    pub fn field(&self, field: &str, flag: FieldFlag) -> Option<&EntryState> {
        self.get(&XPerm::field(field, flag))
    }

    pub fn iter(&self) -> impl Iterator<Item = (&XPerm, &EntryState)> {
        self.entries.iter()
    }

    /// Tokens the user picked explicitly.
    pub fn roots(&self) -> impl Iterator<Item = &XPerm> {
        self.entries
            .iter()
            .filter(|(_, state)| state.is_root)
            .map(|(token, _)| token)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Compute the state of every catalog permission, every catalog field/flag
/// pair, the all-fields grant and every unknown token stored in `set`.
pub fn compute_display_state(graphs: &PermissionGraphs, set: &PermissionSet) -> DisplayState {
    let xset = to_extended(set);
    let universe: Vec<XPerm> = graphs
        .known_permissions()
        .map(|id| XPerm::perm(id.as_str()))
        .chain(graphs.field_tokens())
        .chain(std::iter::once(XPerm::FieldWildcard))
        .collect();

    let mut entries: BTreeMap<XPerm, EntryState> = universe
        .iter()
        .map(|token| {
            let state = EntryState {
                active: xset.contains(token),
                virtually_active: is_active(&xset, token),
                implied_by: stored_ancestors(&xset, token),
                ..Default::default()
            };
            (token.clone(), state)
        })
        .collect();

    // Fixed point over the reverse implication graph. Bounded: implied_by
    // only grows and the graph is acyclic.
    let field_wildcard = XPerm::FieldWildcard;
    let mut rounds = 0usize;
    let mut changed = true;
    while changed {
        changed = false;
        rounds += 1;
        for token in &universe {
            let through_wildcard = matches!(token, XPerm::Field(..)).then_some(&field_wildcard);
            let mut discovered: BTreeSet<XPerm> = BTreeSet::new();
            for implier in graphs.impliers(token).chain(through_wildcard) {
                if let Some(state) = entries.get(implier) {
                    if state.virtually_active {
                        discovered.insert(implier.clone());
                        discovered.extend(state.implied_by.iter().cloned());
                    }
                }
            }
            discovered.extend(composite_components(graphs, &entries, token));

            let Some(entry) = entries.get_mut(token) else {
                continue;
            };
            let before = entry.implied_by.len();
            entry.implied_by.extend(discovered);
            let now_active = entry.virtually_active || !entry.implied_by.is_empty();
            if entry.implied_by.len() != before || now_active != entry.virtually_active {
                changed = true;
            }
            entry.virtually_active = now_active;
        }
    }

    for (token, entry) in entries.iter_mut() {
        entry.is_root = entry.virtually_active && entry.implied_by.is_empty();
        entry.unmet_requirements = graphs
            .requirements(token)
            .filter(|required| !is_active(&xset, required))
            .cloned()
            .collect();
    }

    for token in xset.iter().filter(|token| !graphs.is_token_known(token)) {
        entries.insert(
            token.clone(),
            EntryState {
                active: true,
                virtually_active: true,
                is_root: true,
                is_unknown: true,
                ..Default::default()
            },
        );
    }

    tracing::trace!(rounds, entries = entries.len(), "computed display state");
    DisplayState { entries }
}

/// Stored wildcards covering `token`. Catalog wildcards are also reached
/// through their synthetic edges; unknown ones only through this.
fn stored_ancestors(xset: &XSet, token: &XPerm) -> BTreeSet<XPerm> {
    let XPerm::Perm(id) = token else {
        return BTreeSet::new();
    };
    ancestor_wildcards(id)
        .into_iter()
        .map(XPerm::Perm)
        .filter(|wildcard| xset.contains(wildcard))
        .collect()
}

/// Components of a composite field, when every one of them is virtually
/// active for the same flag.
fn composite_components(
    graphs: &PermissionGraphs,
    entries: &BTreeMap<XPerm, EntryState>,
    token: &XPerm,
) -> Vec<XPerm> {
    let XPerm::Field(field, flag) = token else {
        return Vec::new();
    };
    let components: Vec<XPerm> = graphs
        .components(field)
        .iter()
        .map(|component| XPerm::field(component.as_str(), *flag))
        .collect();
    let all_active = components.iter().all(|component| {
        entries
            .get(component)
            .is_some_and(|state| state.virtually_active)
    });
    if all_active {
        components
    } else {
        Vec::new()
    }
}
