//! Permission and member-field implication resolver.
//!
//! Maintains minimal, consistent grant sets over a static catalog. Adding a
//! token propagates its implications; removing one first revokes everything
//! that would keep it implicitly active, explodes covering wildcards into
//! explicit siblings, then cascades through broken requirements.
//!
//! All operations are pure: they take a token set by reference and return a
//! new one. [`PermissionGraphs`] is built once and shared read-only.

pub mod catalog;
pub mod codec;
pub mod display;
pub mod graph;
pub mod ops;

use ahash::AHashSet;

use crate::types::*;

pub use catalog::Catalog;
pub use display::{compute_display_state, DisplayState, EntryState};
pub use graph::PermissionGraphs;
pub use ops::*;

/// Whether `token` is granted by `xset`, directly or through a wildcard.
pub fn is_active(xset: &XSet, token: &XPerm) -> bool {
    if xset.contains(token) {
        return true;
    }
    match token {
        XPerm::Perm(id) => ancestor_wildcards(id)
            .into_iter()
            .any(|wildcard| xset.contains(&XPerm::Perm(wildcard))),
        XPerm::Field(..) => xset.contains(&XPerm::FieldWildcard),
        XPerm::FieldWildcard => false,
    }
}

/// Grant `token` and everything it implies.
///
/// A wildcard replaces the stored permissions it covers, so the result never
/// holds a permission both explicitly and through a wildcard.
pub fn add(graphs: &PermissionGraphs, xset: &XSet, token: &XPerm) -> XSet {
    let mut out = xset.clone();
    let mut visited: AHashSet<XPerm> = AHashSet::new();
    let mut worklist = vec![token.clone()];

    while let Some(current) = worklist.pop() {
        if !visited.insert(current.clone()) {
            continue;
        }

        match &current {
            XPerm::Perm(id) if is_wildcard(id) => {
                out.retain(|stored| !matches!(stored, XPerm::Perm(other) if covers(id, other)));
                worklist.extend(graphs.covered_by(id).map(|c| XPerm::perm(c.as_str())));
            }
            XPerm::FieldWildcard => out.retain(|stored| !matches!(stored, XPerm::Field(..))),
            XPerm::Field(field, FieldFlag::Write) => {
                worklist.push(XPerm::field(field.as_str(), FieldFlag::Read));
            }
            _ => {}
        }

        if !is_active(&out, &current) {
            out.insert(current.clone());
        }
        worklist.extend(graphs.implied(&current).cloned());
    }
    out
}

/// Revoke `token`, cascading as needed so it is not implicitly active.
pub fn remove(graphs: &PermissionGraphs, xset: &XSet, token: &XPerm) -> XSet {
    let mut cascade = Cascade::new(graphs, xset);
    cascade.stack.push(Step::Remove(token.clone()));
    cascade.run()
}

/// Revoke `token` if it is active and any of its requirements is not.
pub fn check_requirements(graphs: &PermissionGraphs, xset: &XSet, token: &XPerm) -> XSet {
    let mut cascade = Cascade::new(graphs, xset);
    cascade.pending.push(token.clone());
    cascade.run()
}

/// Declared requirements of `token` that `xset` does not grant.
pub fn missing_requirements(graphs: &PermissionGraphs, xset: &XSet, token: &XPerm) -> Vec<XPerm> {
    graphs
        .requirements(token)
        .filter(|required| !is_active(xset, required))
        .cloned()
        .collect()
}

// ============================================================================
// Removal cascade
// ============================================================================

enum Step {
    /// Entry point for revoking one token.
    Remove(XPerm),
    RemoveImpliers(XPerm),
    Explode(XPerm),
    /// Re-insert what an exploded wildcard covered, minus `except`.
    Reinsert { wildcard: XPerm, except: XPerm },
    Delete(XPerm),
    /// Queue dependents for a requirement check.
    Recheck(XPerm),
}

/// Explicit step stack replacing the remove/check_requirements recursion.
///
/// Requirement checks are deferred until the structural removal has settled
/// so that a wildcard being exploded never looks like a broken requirement
/// of the siblings it is about to re-insert.
///
/// Deleting a stored wildcard drops coverage of everything below it. Covered
/// tokens that a still-active token implies through a declared edge are
/// granted again explicitly, so the result stays closed under implication.
struct Cascade<'g> {
    graphs: &'g PermissionGraphs,
    set: XSet,
    /// Tokens whose removal has started in this operation.
    removed: AHashSet<XPerm>,
    stack: Vec<Step>,
    pending: Vec<XPerm>,
    /// Stored wildcards deleted in this operation.
    uncovered: Vec<XPerm>,
}

impl<'g> Cascade<'g> {
    fn new(graphs: &'g PermissionGraphs, xset: &XSet) -> Self {
        Cascade {
            graphs,
            set: xset.clone(),
            removed: AHashSet::new(),
            stack: Vec::new(),
            pending: Vec::new(),
            uncovered: Vec::new(),
        }
    }

    fn run(mut self) -> XSet {
        loop {
            while let Some(step) = self.stack.pop() {
                self.apply(step);
            }
            self.restore_implied();
            if !self.stack.is_empty() {
                continue;
            }
            if self.pending.is_empty() {
                break;
            }
            let pending = std::mem::take(&mut self.pending);
            for token in pending.into_iter().rev() {
                if self.removed.contains(&token) || !is_active(&self.set, &token) {
                    continue;
                }
                let missing = missing_requirements(self.graphs, &self.set, &token);
                if !missing.is_empty() {
                    tracing::trace!(
                        token = %token,
                        missing = ?missing.iter().map(ToString::to_string).collect::<Vec<_>>(),
                        "requirement no longer met"
                    );
                    self.stack.push(Step::Remove(token));
                }
            }
        }
        self.set
    }

    fn apply(&mut self, step: Step) {
        match step {
            Step::Remove(token) => {
                if !self.removed.insert(token.clone()) {
                    return;
                }
                // Pushed in reverse execution order.
                self.stack.push(Step::Recheck(token.clone()));
                if let XPerm::Field(field, FieldFlag::Read) = &token {
                    self.stack
                        .push(Step::Remove(XPerm::field(field.as_str(), FieldFlag::Write)));
                }
                self.stack.push(Step::Delete(token.clone()));
                self.stack.push(Step::Explode(token.clone()));
                self.stack.push(Step::RemoveImpliers(token));
            }
            Step::RemoveImpliers(token) => {
                let impliers: Vec<XPerm> = self
                    .graphs
                    .manual_impliers(&token)
                    .filter(|implier| is_active(&self.set, implier))
                    .cloned()
                    .collect();
                for implier in impliers.into_iter().rev() {
                    self.stack.push(Step::Remove(implier));
                }
            }
            Step::Explode(token) => {
                if let Some(wildcard) = self.covering_wildcard(&token) {
                    tracing::trace!(wildcard = %wildcard, except = %token, "exploding wildcard");
                    self.stack.push(Step::Reinsert {
                        wildcard: wildcard.clone(),
                        except: token,
                    });
                    self.stack.push(Step::Remove(wildcard));
                }
            }
            Step::Reinsert { wildcard, except } => {
                let siblings: Vec<XPerm> = match &wildcard {
                    XPerm::Perm(id) => self
                        .graphs
                        .direct_children(id)
                        .map(|child| XPerm::perm(child.as_str()))
                        .collect(),
                    XPerm::FieldWildcard => self.graphs.field_tokens().collect(),
                    XPerm::Field(..) => Vec::new(),
                };
                for sibling in siblings {
                    if sibling != except && !self.removed.contains(&sibling) {
                        self.set.insert(sibling);
                    }
                }
            }
            Step::Delete(token) => {
                if self.set.remove(&token) && token.is_wildcard() {
                    self.uncovered.push(token);
                }
            }
            Step::Recheck(token) => {
                let graphs = self.graphs;
                self.pending.extend(graphs.dependents(&token).cloned());
                match &token {
                    XPerm::Perm(id) if is_wildcard(id) => {
                        for covered in graphs.covered_by(id) {
                            let covered = XPerm::perm(covered.as_str());
                            self.pending.extend(graphs.dependents(&covered).cloned());
                        }
                    }
                    XPerm::FieldWildcard => {
                        for field in graphs.field_tokens() {
                            self.pending.extend(graphs.dependents(&field).cloned());
                        }
                    }
                    _ => {}
                }
            }
        }
    }

    /// Re-grant tokens that lost wildcard coverage while an active token
    /// still implies them.
    fn restore_implied(&mut self) {
        let graphs = self.graphs;
        let mut candidates: Vec<XPerm> = Vec::new();
        for wildcard in &self.uncovered {
            match wildcard {
                XPerm::Perm(id) => {
                    candidates.extend(graphs.covered_by(id).map(|c| XPerm::perm(c.as_str())))
                }
                XPerm::FieldWildcard => candidates.extend(graphs.field_tokens()),
                XPerm::Field(..) => {}
            }
        }

        for token in candidates {
            if self.removed.contains(&token) || is_active(&self.set, &token) {
                continue;
            }
            let impliers: Vec<XPerm> = graphs
                .manual_impliers(&token)
                .filter(|implier| is_active(&self.set, implier))
                .cloned()
                .collect();
            if impliers.is_empty() {
                continue;
            }
            if self.implies_removed(&token) {
                // Granting it would bring back something revoked; its
                // impliers go instead.
                for implier in impliers {
                    self.stack.push(Step::Remove(implier));
                }
            } else {
                tracing::trace!(token = %token, "restoring implied token");
                self.grant(token);
            }
        }
    }

    /// Whether anything `token` transitively implies was revoked in this
    /// operation.
    fn implies_removed(&self, token: &XPerm) -> bool {
        let mut visited: AHashSet<&XPerm> = AHashSet::new();
        let mut worklist: Vec<&XPerm> = self.graphs.implied(token).collect();
        while let Some(current) = worklist.pop() {
            if self.removed.contains(current) {
                return true;
            }
            if visited.insert(current) {
                worklist.extend(self.graphs.implied(current));
            }
        }
        false
    }

    /// Insert `token` and its implications the way `add` does, skipping
    /// anything revoked in this operation.
    fn grant(&mut self, token: XPerm) {
        let graphs = self.graphs;
        let mut visited: AHashSet<XPerm> = AHashSet::new();
        let mut worklist = vec![token];
        while let Some(current) = worklist.pop() {
            if self.removed.contains(&current) || !visited.insert(current.clone()) {
                continue;
            }
            match &current {
                XPerm::Perm(id) if is_wildcard(id) => {
                    self.set
                        .retain(|stored| !matches!(stored, XPerm::Perm(other) if covers(id, other)));
                    worklist.extend(graphs.covered_by(id).map(|c| XPerm::perm(c.as_str())));
                }
                XPerm::FieldWildcard => self.set.retain(|stored| !matches!(stored, XPerm::Field(..))),
                _ => {}
            }
            if !is_active(&self.set, &current) {
                self.set.insert(current.clone());
            }
            worklist.extend(graphs.implied(&current).cloned());
        }
    }

    /// Most specific active wildcard granting `token`.
    fn covering_wildcard(&self, token: &XPerm) -> Option<XPerm> {
        match token {
            XPerm::Perm(id) => ancestor_wildcards(id)
                .into_iter()
                .map(XPerm::Perm)
                .find(|wildcard| is_active(&self.set, wildcard)),
            XPerm::Field(..) => self
                .set
                .contains(&XPerm::FieldWildcard)
                .then_some(XPerm::FieldWildcard),
            XPerm::FieldWildcard => None,
        }
    }
}
