//! Conversion between the public [`PermissionSet`] and the solver's token set.

use std::collections::BTreeMap;

use crate::error::CodecError;
use crate::types::*;

/// Expand a permission set into xperm tokens.
pub fn to_extended(set: &PermissionSet) -> XSet {
    let mut xset: XSet = set.permissions.iter().cloned().map(XPerm::Perm).collect();
    match &set.member_fields {
        None => {
            xset.insert(XPerm::FieldWildcard);
        }
        Some(fields) => {
            for (field, flags) in fields {
                xset.extend(flags.flags().map(|flag| XPerm::field(field.as_str(), flag)));
            }
        }
    }
    xset
}

/// Collapse xperm tokens back into a permission set.
///
/// `FieldWildcard` alongside loose field tokens is never produced by the
/// solver, so it is reported instead of being normalized away.
pub fn from_extended(xset: &XSet) -> Result<PermissionSet, CodecError> {
    let mut set = PermissionSet::new();
    let mut fields: BTreeMap<FieldId, FieldFlags> = BTreeMap::new();
    let mut all_fields = false;

    for token in xset {
        match token {
            XPerm::Perm(id) => {
                set.permissions.insert(id.clone());
            }
            XPerm::Field(field, flag) => {
                let flags = fields.entry(field.clone()).or_insert(FieldFlags::empty());
                *flags |= FieldFlags::from(*flag);
            }
            XPerm::FieldWildcard => all_fields = true,
        }
    }

    if all_fields {
        if !fields.is_empty() {
            let fields = fields
                .iter()
                .flat_map(|(field, flags)| {
                    flags
                        .flags()
                        .map(move |flag| XPerm::field(field.as_str(), flag).to_string())
                })
                .collect();
            return Err(CodecError::WildcardWithExplicitFields { fields });
        }
        set.member_fields = None;
    } else {
        set.member_fields = Some(fields);
    }
    Ok(set)
}
