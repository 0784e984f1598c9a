//! Command-line edits applied to a permission set.

use std::fmt;
use std::str::FromStr;

use anyhow::{anyhow, bail};
use grantset_core::resolver::{self, PermissionGraphs};
use grantset_core::{CodecError, FieldFlags, PermissionSet};

/// One edit, in the form `add:ID`, `remove:ID`, `add-field:FIELD=FLAGS`,
/// `remove-field:FIELD=FLAGS`, `add-all-fields` or `remove-all-fields`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Edit {
    AddPermission(String),
    RemovePermission(String),
    AddField(String, FieldFlags),
    RemoveField(String, FieldFlags),
    AddAllFields,
    RemoveAllFields,
}

impl Edit {
    pub fn apply(
        &self,
        graphs: &PermissionGraphs,
        set: &PermissionSet,
    ) -> Result<PermissionSet, CodecError> {
        match self {
            Edit::AddPermission(id) => resolver::add_permission(graphs, set, id),
            Edit::RemovePermission(id) => resolver::remove_permission(graphs, set, id),
            Edit::AddField(field, flags) => resolver::add_member_field(graphs, set, field, *flags),
            Edit::RemoveField(field, flags) => {
                resolver::remove_member_field(graphs, set, field, *flags)
            }
            Edit::AddAllFields => resolver::add_all_member_fields(graphs, set),
            Edit::RemoveAllFields => resolver::remove_all_member_fields(graphs, set),
        }
    }
}

fn field_and_flags(arg: &str) -> anyhow::Result<(String, FieldFlags)> {
    let (field, flags) = arg
        .split_once('=')
        .ok_or_else(|| anyhow!("expected FIELD=FLAGS, got `{arg}`"))?;
    if field.is_empty() {
        bail!("empty field name in `{arg}`");
    }
    let flags: FieldFlags = flags.parse()?;
    if flags.is_empty() {
        bail!("no flags given for `{field}`");
    }
    Ok((field.to_string(), flags))
}

impl FromStr for Edit {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "add-all-fields" => return Ok(Edit::AddAllFields),
            "remove-all-fields" => return Ok(Edit::RemoveAllFields),
            _ => {}
        }
        let (verb, arg) = s
            .split_once(':')
            .ok_or_else(|| anyhow!("unrecognized edit `{s}`"))?;
        match verb {
            "add" | "remove" if arg.is_empty() => bail!("missing permission id in `{s}`"),
            "add" => Ok(Edit::AddPermission(arg.to_string())),
            "remove" => Ok(Edit::RemovePermission(arg.to_string())),
            "add-field" => field_and_flags(arg).map(|(f, flags)| Edit::AddField(f, flags)),
            "remove-field" => field_and_flags(arg).map(|(f, flags)| Edit::RemoveField(f, flags)),
            _ => bail!("unknown edit kind `{verb}`"),
        }
    }
}

impl fmt::Display for Edit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Edit::AddPermission(id) => write!(f, "add:{id}"),
            Edit::RemovePermission(id) => write!(f, "remove:{id}"),
            Edit::AddField(field, flags) => write!(f, "add-field:{field}={flags}"),
            Edit::RemoveField(field, flags) => write!(f, "remove-field:{field}={flags}"),
            Edit::AddAllFields => f.write_str("add-all-fields"),
            Edit::RemoveAllFields => f.write_str("remove-all-fields"),
        }
    }
}
