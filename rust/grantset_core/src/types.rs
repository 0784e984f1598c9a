//! Domain types shared across grantset_core modules.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

use ahash::AHashSet;
use bitflags::bitflags;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::CodecError;

/// Dot-segmented permission path. A final `*` segment is a wildcard.
pub type PermissionId = String;

/// Key into the member-field catalog.
pub type FieldId = String;

/// Root wildcard: covers every permission id.
pub const ROOT_WILDCARD: &str = "*";

/// A single member-field grant.
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq, Ord, PartialOrd)]
pub enum FieldFlag {
    Read,
    Write,
}

impl FieldFlag {
    pub const ALL: [FieldFlag; 2] = [FieldFlag::Read, FieldFlag::Write];

    pub fn as_char(self) -> char {
        match self {
            FieldFlag::Read => 'r',
            FieldFlag::Write => 'w',
        }
    }
}

bitflags! {
    /// Set of [`FieldFlag`]s granted on one member field.
    ///
    /// Textual form is `"r"`, `"w"` or `"rw"`, which is also how the flags
    /// are serialized.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
    pub struct FieldFlags: u8 {
        const READ  = 0b01;
        const WRITE = 0b10;
    }
}

impl FieldFlags {
    /// Iterate the individual flags, read first.
    pub fn flags(self) -> impl Iterator<Item = FieldFlag> {
        FieldFlag::ALL
            .into_iter()
            .filter(move |flag| self.contains(FieldFlags::from(*flag)))
    }
}

impl From<FieldFlag> for FieldFlags {
    fn from(flag: FieldFlag) -> Self {
        match flag {
            FieldFlag::Read => FieldFlags::READ,
            FieldFlag::Write => FieldFlags::WRITE,
        }
    }
}

impl fmt::Display for FieldFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for flag in self.flags() {
            write!(f, "{}", flag.as_char())?;
        }
        Ok(())
    }
}

impl FromStr for FieldFlags {
    type Err = CodecError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            return Err(CodecError::InvalidFlags(s.to_string()));
        }
        s.chars().try_fold(FieldFlags::empty(), |acc, c| match c {
            'r' => Ok(acc | FieldFlags::READ),
            'w' => Ok(acc | FieldFlags::WRITE),
            _ => Err(CodecError::InvalidFlags(s.to_string())),
        })
    }
}

impl Serialize for FieldFlags {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for FieldFlags {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        text.parse().map_err(serde::de::Error::custom)
    }
}

/// Extended permission token: ordinary permissions and field grants in one
/// type so the solver can do uniform set algebra over them.
#[derive(Debug, Clone, Hash, Eq, PartialEq, Ord, PartialOrd)]
pub enum XPerm {
    Perm(PermissionId),
    Field(FieldId, FieldFlag),
    /// Every field, every flag.
    FieldWildcard,
}

impl XPerm {
    pub fn perm(id: impl Into<PermissionId>) -> Self {
        XPerm::Perm(id.into())
    }

    pub fn field(field: impl Into<FieldId>, flag: FieldFlag) -> Self {
        XPerm::Field(field.into(), flag)
    }

    /// True for wildcard permissions and for `FieldWildcard`.
    pub fn is_wildcard(&self) -> bool {
        match self {
            XPerm::Perm(id) => is_wildcard(id),
            XPerm::Field(..) => false,
            XPerm::FieldWildcard => true,
        }
    }
}

impl fmt::Display for XPerm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            XPerm::Perm(id) => f.write_str(id),
            XPerm::Field(field, flag) => write!(f, "field:{}:{}", field, flag.as_char()),
            XPerm::FieldWildcard => f.write_str("field:*"),
        }
    }
}

impl Serialize for XPerm {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Internal token set operated on by the solver.
pub type XSet = AHashSet<XPerm>;

/// Public permission set as held by an editing session.
///
/// `member_fields == None` grants every field with every flag. When
/// deserializing, a missing `memberFields` key means no fields at all; only
/// an explicit `null` grants all of them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PermissionSet {
    #[serde(default)]
    pub permissions: BTreeSet<PermissionId>,
    #[serde(default = "no_member_fields")]
    pub member_fields: Option<BTreeMap<FieldId, FieldFlags>>,
}

fn no_member_fields() -> Option<BTreeMap<FieldId, FieldFlags>> {
    Some(BTreeMap::new())
}

impl Default for PermissionSet {
    fn default() -> Self {
        Self {
            permissions: BTreeSet::new(),
            member_fields: no_member_fields(),
        }
    }
}

impl PermissionSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether this set grants every member field.
    pub fn has_all_member_fields(&self) -> bool {
        self.member_fields.is_none()
    }
}

// ============================================================================
// Permission id helpers
// ============================================================================

/// `a.b.*` or `*`.
pub fn is_wildcard(id: &str) -> bool {
    id == ROOT_WILDCARD || id.ends_with(".*")
}

/// The prefix a wildcard covers: `a.b.*` -> `a.b.`, `*` -> ``.
pub fn wildcard_prefix(id: &str) -> Option<&str> {
    if id == ROOT_WILDCARD {
        return Some("");
    }
    id.strip_suffix('*').filter(|prefix| prefix.ends_with('.'))
}

/// Whether `wildcard` covers `id`. A wildcard does not cover itself.
pub fn covers(wildcard: &str, id: &str) -> bool {
    match wildcard_prefix(wildcard) {
        Some(prefix) => id != wildcard && id.starts_with(prefix),
        None => false,
    }
}

/// Every wildcard enclosing `id`, most specific first, ending at `*`.
///
/// `a.b.c` -> `[a.b.*, a.*, *]`; `a.b.*` -> `[a.*, *]`; `*` -> `[]`.
pub fn ancestor_wildcards(id: &str) -> Vec<PermissionId> {
    let base = match wildcard_prefix(id) {
        Some(prefix) => prefix.strip_suffix('.').unwrap_or(prefix),
        None => id,
    };
    if base.is_empty() {
        return Vec::new();
    }
    let segments: Vec<&str> = base.split('.').collect();
    (0..segments.len())
        .rev()
        .map(|depth| {
            if depth == 0 {
                ROOT_WILDCARD.to_string()
            } else {
                format!("{}.*", segments[..depth].join("."))
            }
        })
        .collect()
}

/// Non-empty segments; `*` only as the whole final segment.
pub fn is_valid_id(id: &str) -> bool {
    let segments: Vec<&str> = id.split('.').collect();
    let last = segments.len() - 1;
    segments.iter().enumerate().all(|(i, segment)| {
        !segment.is_empty() && (!segment.contains('*') || (*segment == "*" && i == last))
    })
}
