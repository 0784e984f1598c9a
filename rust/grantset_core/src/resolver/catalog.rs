//! Catalog deserialization helpers.
//!
//! The catalog is the static tree of grantable permissions (categories,
//! groups, switches, permissions, per-country permissions) together with the
//! member-field catalog. It is loaded once at startup and flattened into
//! [`PermDecl`]s for the graph builder.

use std::collections::BTreeMap;
use std::path::Path;

use serde::Deserialize;

use crate::error::{CatalogError, Result};
use crate::types::{FieldFlags, FieldId, PermissionId};

/// Root of a catalog document.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Catalog {
    /// Country codes expanded by `perm_country` nodes.
    #[serde(default)]
    pub countries: Vec<String>,
    #[serde(default)]
    pub fields: BTreeMap<FieldId, FieldSpec>,
    #[serde(default)]
    pub spec: Vec<SpecNode>,
}

/// One node of the permission tree.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SpecNode {
    Category(GroupNode),
    Group(GroupNode),
    Switch(SwitchNode),
    Perm(PermNode),
    /// Expands to `<id>.*` plus `<id>.<country>` for every catalog country.
    PermCountry(PermNode),
}

/// Category or group. `requires` is inherited by every permission below.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupNode {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub requires: Vec<PermissionId>,
    #[serde(default)]
    pub children: Vec<SpecNode>,
}

/// Mutually exclusive options; each option is a permission node.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SwitchNode {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub requires: Vec<PermissionId>,
    #[serde(default)]
    pub options: Vec<PermNode>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PermNode {
    pub id: PermissionId,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub implies: Vec<PermissionId>,
    #[serde(default)]
    pub implies_fields: BTreeMap<FieldId, FieldFlags>,
    #[serde(default)]
    pub requires: Vec<PermissionId>,
}

/// Member-field catalog entry.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldSpec {
    #[serde(default)]
    pub composed_of_fields: Vec<FieldId>,
    #[serde(default)]
    pub implies_fields: Vec<FieldId>,
}

/// A single permission with all of its edges, requirements of enclosing
/// groups and switches already merged in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PermDecl {
    pub id: PermissionId,
    pub implies: Vec<PermissionId>,
    pub implies_fields: BTreeMap<FieldId, FieldFlags>,
    pub requires: Vec<PermissionId>,
}

/// Parse a catalog from a JSON string.
pub fn parse_catalog(json: &str) -> Result<Catalog> {
    Ok(serde_json::from_str(json)?)
}

impl Catalog {
    pub fn from_json_str(json: &str) -> Result<Self> {
        parse_catalog(json)
    }

    /// Read and parse a catalog file.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| CatalogError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        parse_catalog(&text)
    }

    /// Flatten the tree into permission declarations, in document order.
    pub fn declarations(&self) -> Vec<PermDecl> {
        let mut out = Vec::new();
        collect(&self.spec, &[], &self.countries, &mut out);
        out
    }
}

fn collect(
    nodes: &[SpecNode],
    inherited: &[PermissionId],
    countries: &[String],
    out: &mut Vec<PermDecl>,
) {
    for node in nodes {
        match node {
            SpecNode::Category(group) | SpecNode::Group(group) => {
                let requires = merged(inherited, &group.requires);
                collect(&group.children, &requires, countries, out);
            }
            SpecNode::Switch(switch) => {
                let requires = merged(inherited, &switch.requires);
                for option in &switch.options {
                    out.push(declare(option.id.clone(), option, &requires));
                }
            }
            SpecNode::Perm(perm) => out.push(declare(perm.id.clone(), perm, inherited)),
            SpecNode::PermCountry(perm) => {
                out.push(declare(format!("{}.*", perm.id), perm, inherited));
                for country in countries {
                    out.push(declare(format!("{}.{}", perm.id, country), perm, inherited));
                }
            }
        }
    }
}

fn declare(id: PermissionId, node: &PermNode, inherited: &[PermissionId]) -> PermDecl {
    PermDecl {
        id,
        implies: node.implies.clone(),
        implies_fields: node.implies_fields.clone(),
        requires: merged(inherited, &node.requires),
    }
}

fn merged(inherited: &[PermissionId], own: &[PermissionId]) -> Vec<PermissionId> {
    let mut requires = inherited.to_vec();
    for id in own {
        if !requires.contains(id) {
            requires.push(id.clone());
        }
    }
    requires
}
