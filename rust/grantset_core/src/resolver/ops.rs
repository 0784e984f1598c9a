//! Public operations over [`PermissionSet`] values.
//!
//! Each mutating operation expands the set into tokens, runs the solver and
//! collapses the result. The codec can only fail on an internal consistency
//! bug, which is surfaced as [`CodecError`] rather than repaired.

use crate::error::CodecError;
use crate::types::*;

use super::codec::{from_extended, to_extended};
use super::graph::PermissionGraphs;

/// Grant a permission and everything it implies.
pub fn add_permission(
    graphs: &PermissionGraphs,
    set: &PermissionSet,
    id: &str,
) -> Result<PermissionSet, CodecError> {
    from_extended(&super::add(graphs, &to_extended(set), &XPerm::perm(id)))
}

/// Revoke a permission, exploding wildcards and cascading as needed.
pub fn remove_permission(
    graphs: &PermissionGraphs,
    set: &PermissionSet,
    id: &str,
) -> Result<PermissionSet, CodecError> {
    from_extended(&super::remove(graphs, &to_extended(set), &XPerm::perm(id)))
}

pub fn has_permission(set: &PermissionSet, id: &str) -> bool {
    super::is_active(&to_extended(set), &XPerm::perm(id))
}

/// Grant `flags` on `field`. Write always brings read along.
pub fn add_member_field(
    graphs: &PermissionGraphs,
    set: &PermissionSet,
    field: &str,
    flags: FieldFlags,
) -> Result<PermissionSet, CodecError> {
    let xset = flags.flags().fold(to_extended(set), |xset, flag| {
        super::add(graphs, &xset, &XPerm::field(field, flag))
    });
    from_extended(&xset)
}

/// Revoke `flags` on `field`. Revoking read also revokes write.
pub fn remove_member_field(
    graphs: &PermissionGraphs,
    set: &PermissionSet,
    field: &str,
    flags: FieldFlags,
) -> Result<PermissionSet, CodecError> {
    let xset = flags.flags().fold(to_extended(set), |xset, flag| {
        super::remove(graphs, &xset, &XPerm::field(field, flag))
    });
    from_extended(&xset)
}

/// Whether every flag in `flags` is granted on `field`. Asking for no flags
/// is never granted.
pub fn has_member_field(set: &PermissionSet, field: &str, flags: FieldFlags) -> bool {
    if flags.is_empty() {
        return false;
    }
    let xset = to_extended(set);
    flags
        .flags()
        .all(|flag| super::is_active(&xset, &XPerm::field(field, flag)))
}

/// Grant every field with every flag.
pub fn add_all_member_fields(
    graphs: &PermissionGraphs,
    set: &PermissionSet,
) -> Result<PermissionSet, CodecError> {
    from_extended(&super::add(graphs, &to_extended(set), &XPerm::FieldWildcard))
}

/// Revoke the all-fields grant. A set holding explicit field grants comes
/// back unchanged.
pub fn remove_all_member_fields(
    graphs: &PermissionGraphs,
    set: &PermissionSet,
) -> Result<PermissionSet, CodecError> {
    from_extended(&super::remove(graphs, &to_extended(set), &XPerm::FieldWildcard))
}

/// Whether `id` is absent from the catalog (legacy or external grants).
pub fn is_permission_unknown(graphs: &PermissionGraphs, id: &str) -> bool {
    !graphs.is_permission_known(id)
}

/// Requirements of `id` that `set` does not currently grant.
pub fn unmet_requirements(graphs: &PermissionGraphs, set: &PermissionSet, id: &str) -> Vec<XPerm> {
    super::missing_requirements(graphs, &to_extended(set), &XPerm::perm(id))
}
