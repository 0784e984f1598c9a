//! Permission graphs, built once from a catalog and immutable afterwards.

use std::collections::{BTreeMap, BTreeSet};
use std::ops::Bound;

use ahash::AHashMap;

use crate::error::{CatalogError, Result};
use crate::types::*;

use super::catalog::Catalog;

/// Token -> neighbours. Neighbour sets are ordered so traversals are
/// deterministic.
pub type EdgeMap = AHashMap<XPerm, BTreeSet<XPerm>>;

/// Implication and requirement graphs over the catalog's tokens.
#[derive(Debug, Clone, Default)]
pub struct PermissionGraphs {
    perms: BTreeSet<PermissionId>,
    fields: BTreeSet<FieldId>,
    composed_of: BTreeMap<FieldId, Vec<FieldId>>,
    /// Declared plus synthetic wildcard edges.
    implies: EdgeMap,
    implied_by: EdgeMap,
    /// Reverse of declared edges only.
    manually_implied_by: EdgeMap,
    requires: EdgeMap,
    required_by: EdgeMap,
}

impl PermissionGraphs {
    /// Walk the catalog once and build every lookup structure.
    ///
    /// Dangling references, duplicate or malformed ids and implication
    /// cycles are catalog authoring bugs and fail the build.
    pub fn build(catalog: &Catalog) -> Result<Self> {
        let decls = catalog.declarations();
        let mut graphs = PermissionGraphs::default();

        for decl in &decls {
            if !is_valid_id(&decl.id) {
                return Err(CatalogError::InvalidId(decl.id.clone()));
            }
            if !graphs.perms.insert(decl.id.clone()) {
                return Err(CatalogError::DuplicateId(decl.id.clone()));
            }
        }
        graphs.fields = catalog.fields.keys().cloned().collect();

        for (field, spec) in &catalog.fields {
            for other in spec.implies_fields.iter().chain(&spec.composed_of_fields) {
                graphs.check_field(field, other)?;
            }
            if !spec.composed_of_fields.is_empty() {
                graphs
                    .composed_of
                    .insert(field.clone(), spec.composed_of_fields.clone());
            }
        }

        for decl in &decls {
            let from = XPerm::perm(decl.id.as_str());
            for target in &decl.implies {
                if !graphs.perms.contains(target) {
                    return Err(CatalogError::DanglingImplication {
                        from: decl.id.clone(),
                        to: target.clone(),
                    });
                }
                graphs.add_implication(&from, XPerm::perm(target.as_str()), true);
            }
            for (field, flags) in &decl.implies_fields {
                graphs.check_field(&decl.id, field)?;
                for flag in flags.flags() {
                    graphs.add_implication(&from, XPerm::field(field.as_str(), flag), true);
                }
            }
            for target in &decl.requires {
                if !graphs.perms.contains(target) {
                    return Err(CatalogError::DanglingRequirement {
                        from: decl.id.clone(),
                        to: target.clone(),
                    });
                }
                graphs.add_requirement(&from, XPerm::perm(target.as_str()));
            }
        }

        for (field, spec) in &catalog.fields {
            let write = XPerm::field(field.as_str(), FieldFlag::Write);
            graphs.add_implication(&write, XPerm::field(field.as_str(), FieldFlag::Read), true);
            for other in &spec.implies_fields {
                for flag in FieldFlag::ALL {
                    let from = XPerm::field(field.as_str(), flag);
                    graphs.add_implication(&from, XPerm::field(other.as_str(), flag), true);
                }
            }
        }

        let wildcards: Vec<PermissionId> =
            graphs.perms.iter().filter(|id| is_wildcard(id)).cloned().collect();
        for wildcard in &wildcards {
            let from = XPerm::perm(wildcard.as_str());
            let covered: Vec<PermissionId> = graphs.covered_by(wildcard).cloned().collect();
            for id in covered {
                graphs.add_implication(&from, XPerm::Perm(id), false);
            }
        }

        graphs.check_acyclic()?;

        tracing::debug!(
            permissions = graphs.perms.len(),
            wildcards = wildcards.len(),
            fields = graphs.fields.len(),
            implications = graphs.implies.values().map(BTreeSet::len).sum::<usize>(),
            requirements = graphs.requires.values().map(BTreeSet::len).sum::<usize>(),
            "built permission graphs"
        );
        Ok(graphs)
    }

    fn check_field(&self, from: &str, field: &str) -> Result<()> {
        if self.fields.contains(field) {
            Ok(())
        } else {
            Err(CatalogError::UnknownField {
                from: from.to_string(),
                field: field.to_string(),
            })
        }
    }

    fn add_implication(&mut self, from: &XPerm, to: XPerm, manual: bool) {
        if manual {
            self.manually_implied_by
                .entry(to.clone())
                .or_default()
                .insert(from.clone());
        }
        self.implied_by
            .entry(to.clone())
            .or_default()
            .insert(from.clone());
        self.implies.entry(from.clone()).or_default().insert(to);
    }

    fn add_requirement(&mut self, from: &XPerm, to: XPerm) {
        self.required_by
            .entry(to.clone())
            .or_default()
            .insert(from.clone());
        self.requires.entry(from.clone()).or_default().insert(to);
    }

    /// Iterative three-colour DFS over the implication graph.
    fn check_acyclic(&self) -> Result<()> {
        #[derive(Clone, Copy, PartialEq)]
        enum Mark {
            Visiting,
            Done,
        }

        let mut marks: AHashMap<&XPerm, Mark> = AHashMap::new();
        let mut roots: Vec<&XPerm> = self.implies.keys().collect();
        roots.sort();

        for root in roots {
            if marks.contains_key(root) {
                continue;
            }
            marks.insert(root, Mark::Visiting);
            let mut stack = vec![(root, neighbours(&self.implies, root))];

            loop {
                let Some((node, children)) = stack.last_mut() else {
                    break;
                };
                let node = *node;
                match children.next() {
                    Some(child) => match marks.get(child) {
                        Some(Mark::Visiting) => {
                            let start = stack
                                .iter()
                                .position(|(n, _)| *n == child)
                                .unwrap_or(0);
                            let mut cycle: Vec<String> =
                                stack[start..].iter().map(|(n, _)| n.to_string()).collect();
                            cycle.push(child.to_string());
                            return Err(CatalogError::ImplicationCycle { cycle });
                        }
                        Some(Mark::Done) => {}
                        None => {
                            marks.insert(child, Mark::Visiting);
                            stack.push((child, neighbours(&self.implies, child)));
                        }
                    },
                    None => {
                        marks.insert(node, Mark::Done);
                        stack.pop();
                    }
                }
            }
        }
        Ok(())
    }

    // ========================================================================
    // Lookups
    // ========================================================================

    /// Tokens `token` implies (declared and wildcard edges).
    pub fn implied(&self, token: &XPerm) -> impl Iterator<Item = &XPerm> {
        neighbours(&self.implies, token)
    }

    /// Tokens that imply `token` (declared and wildcard edges).
    pub fn impliers(&self, token: &XPerm) -> impl Iterator<Item = &XPerm> {
        neighbours(&self.implied_by, token)
    }

    /// Tokens that imply `token` through a declared edge.
    pub fn manual_impliers(&self, token: &XPerm) -> impl Iterator<Item = &XPerm> {
        neighbours(&self.manually_implied_by, token)
    }

    /// Tokens `token` requires.
    pub fn requirements(&self, token: &XPerm) -> impl Iterator<Item = &XPerm> {
        neighbours(&self.requires, token)
    }

    /// Tokens whose requirements include `token`.
    pub fn dependents(&self, token: &XPerm) -> impl Iterator<Item = &XPerm> {
        neighbours(&self.required_by, token)
    }

    pub fn known_permissions(&self) -> impl Iterator<Item = &PermissionId> {
        self.perms.iter()
    }

    pub fn known_fields(&self) -> impl Iterator<Item = &FieldId> {
        self.fields.iter()
    }

    /// Every catalog field/flag pair as a token.
    pub fn field_tokens(&self) -> impl Iterator<Item = XPerm> + '_ {
        self.fields
            .iter()
            .flat_map(|field| FieldFlag::ALL.map(|flag| XPerm::field(field.as_str(), flag)))
    }

    pub fn is_permission_known(&self, id: &str) -> bool {
        self.perms.contains(id)
    }

    pub fn is_field_known(&self, field: &str) -> bool {
        self.fields.contains(field)
    }

    /// Whether the catalog declares this token.
    pub fn is_token_known(&self, token: &XPerm) -> bool {
        match token {
            XPerm::Perm(id) => self.is_permission_known(id),
            XPerm::Field(field, _) => self.is_field_known(field),
            XPerm::FieldWildcard => true,
        }
    }

    /// Components of a composite field.
    pub fn components(&self, field: &str) -> &[FieldId] {
        self.composed_of
            .get(field)
            .map(|v| v.as_slice())
            .unwrap_or(&[])
    }

    /// Known permission ids covered by `wildcard`, in order.
    pub fn covered_by<'a>(&'a self, wildcard: &'a str) -> impl Iterator<Item = &'a PermissionId> {
        let prefix = wildcard_prefix(wildcard);
        let start = prefix.unwrap_or(wildcard);
        self.perms
            .range::<str, _>((Bound::Included(start), Bound::Unbounded))
            .take_while(move |id| prefix.is_some_and(|p| id.starts_with(p)))
            .filter(move |id| id.as_str() != wildcard)
    }

    /// Known ids covered by `wildcard` and not by any nested known wildcard:
    /// what an explosion of `wildcard` re-inserts.
    pub fn direct_children<'a>(
        &'a self,
        wildcard: &'a str,
    ) -> impl Iterator<Item = &'a PermissionId> {
        self.covered_by(wildcard).filter(move |id| {
            !self
                .covered_by(wildcard)
                .any(|nested| is_wildcard(nested) && covers(nested, id))
        })
    }
}

fn neighbours<'a>(edges: &'a EdgeMap, token: &XPerm) -> impl Iterator<Item = &'a XPerm> {
    edges.get(token).into_iter().flatten()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn build(json: &str) -> Result<PermissionGraphs> {
        PermissionGraphs::build(&Catalog::from_json_str(json).unwrap())
    }

    #[test]
    fn declared_and_wildcard_edges() {
        let graphs = build(
            r#"{"spec":[{"type":"perm","id":"a.*"},{"type":"perm","id":"a.x","implies":["b"]},
                {"type":"perm","id":"a.y"},{"type":"perm","id":"b"}]}"#,
        )
        .unwrap();

        let implied: Vec<&XPerm> = graphs.implied(&XPerm::perm("a.*")).collect();
        assert_eq!(implied, vec![&XPerm::perm("a.x"), &XPerm::perm("a.y")]);

        let impliers: Vec<&XPerm> = graphs.impliers(&XPerm::perm("a.x")).collect();
        assert_eq!(impliers, vec![&XPerm::perm("a.*")]);
        // wildcard edges are not declared edges
        assert_eq!(graphs.manual_impliers(&XPerm::perm("a.x")).count(), 0);
        assert_eq!(
            graphs.manual_impliers(&XPerm::perm("b")).collect::<Vec<_>>(),
            vec![&XPerm::perm("a.x")]
        );
    }

    #[test]
    fn field_edges() {
        let graphs = build(
            r#"{"fields":{"address":{"impliesFields":["country"]},"country":{}},
                "spec":[{"type":"perm","id":"p","impliesFields":{"address":"w"}}]}"#,
        )
        .unwrap();

        let write = XPerm::field("address", FieldFlag::Write);
        let implied: BTreeSet<&XPerm> = graphs.implied(&write).collect();
        assert!(implied.contains(&XPerm::field("address", FieldFlag::Read)));
        assert!(implied.contains(&XPerm::field("country", FieldFlag::Write)));
        assert!(graphs
            .implied(&XPerm::perm("p"))
            .any(|t| *t == write));
        assert_eq!(graphs.field_tokens().count(), 4);
    }

    #[test]
    fn requirement_edges_both_ways() {
        let graphs = build(
            r#"{"spec":[{"type":"perm","id":"a"},{"type":"perm","id":"b","requires":["a"]}]}"#,
        )
        .unwrap();
        assert_eq!(
            graphs.requirements(&XPerm::perm("b")).collect::<Vec<_>>(),
            vec![&XPerm::perm("a")]
        );
        assert_eq!(
            graphs.dependents(&XPerm::perm("a")).collect::<Vec<_>>(),
            vec![&XPerm::perm("b")]
        );
    }

    #[test]
    fn covered_and_direct_children() {
        let graphs = build(
            r#"{"spec":[{"type":"perm","id":"*"},{"type":"perm","id":"a.*"},
                {"type":"perm","id":"a.x"},{"type":"perm","id":"a.b.*"},
                {"type":"perm","id":"a.b.c"},{"type":"perm","id":"ab"}]}"#,
        )
        .unwrap();

        let covered: Vec<&str> = graphs.covered_by("a.*").map(String::as_str).collect();
        assert_eq!(covered, vec!["a.b.*", "a.b.c", "a.x"]);

        let direct: Vec<&str> = graphs.direct_children("a.*").map(String::as_str).collect();
        assert_eq!(direct, vec!["a.b.*", "a.x"]);

        let top: Vec<&str> = graphs.direct_children("*").map(String::as_str).collect();
        assert_eq!(top, vec!["a.*", "ab"]);

        assert_eq!(graphs.covered_by("a.x").count(), 0);
    }

    #[test]
    fn dangling_implication_fails() {
        let err = build(r#"{"spec":[{"type":"perm","id":"a","implies":["ghost"]}]}"#).unwrap_err();
        assert!(matches!(err, CatalogError::DanglingImplication { ref to, .. } if to == "ghost"));
    }

    #[test]
    fn dangling_requirement_fails() {
        let err = build(r#"{"spec":[{"type":"perm","id":"a","requires":["ghost"]}]}"#).unwrap_err();
        assert!(matches!(err, CatalogError::DanglingRequirement { .. }));
    }

    #[test]
    fn unknown_field_fails() {
        let err = build(r#"{"spec":[{"type":"perm","id":"a","impliesFields":{"ghost":"r"}}]}"#)
            .unwrap_err();
        assert!(matches!(err, CatalogError::UnknownField { ref field, .. } if field == "ghost"));

        let err = build(r#"{"fields":{"name":{"composedOfFields":["first"]}}}"#).unwrap_err();
        assert!(matches!(err, CatalogError::UnknownField { .. }));
    }

    #[test]
    fn duplicate_and_malformed_ids_fail() {
        let err = build(r#"{"spec":[{"type":"perm","id":"a"},{"type":"perm","id":"a"}]}"#)
            .unwrap_err();
        assert!(matches!(err, CatalogError::DuplicateId(_)));

        let err = build(r#"{"spec":[{"type":"perm","id":"a.*.b"}]}"#).unwrap_err();
        assert!(matches!(err, CatalogError::InvalidId(_)));
    }

    #[test]
    fn declared_cycle_fails() {
        let err = build(
            r#"{"spec":[{"type":"perm","id":"a","implies":["b"]},
                {"type":"perm","id":"b","implies":["a"]}]}"#,
        )
        .unwrap_err();
        match err {
            CatalogError::ImplicationCycle { cycle } => {
                assert_eq!(cycle.first(), cycle.last());
                assert_eq!(cycle.len(), 3);
            }
            other => panic!("expected cycle, got {:?}", other),
        }
    }

    #[test]
    fn cycle_through_wildcard_edge_fails() {
        let err = build(
            r#"{"spec":[{"type":"perm","id":"a.*"},{"type":"perm","id":"a.x","implies":["a.*"]}]}"#,
        )
        .unwrap_err();
        assert!(matches!(err, CatalogError::ImplicationCycle { .. }));
    }

    #[test]
    fn field_cycle_fails() {
        let err = build(
            r#"{"fields":{"a":{"impliesFields":["b"]},"b":{"impliesFields":["a"]}}}"#,
        )
        .unwrap_err();
        assert!(matches!(err, CatalogError::ImplicationCycle { .. }));
    }
}
