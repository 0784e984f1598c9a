//! End-to-end scenarios over the fixture catalog in `tests/fixtures`.

use std::collections::BTreeMap;
use std::path::PathBuf;

use grantset_core::resolver::*;
use grantset_core::{CatalogError, FieldFlag, FieldFlags, PermissionSet, XPerm};

fn fixture_path() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("../../tests/fixtures/catalog.json")
}

fn graphs() -> PermissionGraphs {
    let catalog = Catalog::from_path(fixture_path()).unwrap();
    PermissionGraphs::build(&catalog).unwrap()
}

fn perms(set: &PermissionSet) -> Vec<&str> {
    set.permissions.iter().map(String::as_str).collect()
}

fn fields(set: &PermissionSet) -> BTreeMap<&str, FieldFlags> {
    set.member_fields
        .as_ref()
        .unwrap()
        .iter()
        .map(|(field, flags)| (field.as_str(), *flags))
        .collect()
}

#[test]
fn fixture_catalog_builds() {
    let g = graphs();
    assert_eq!(g.known_permissions().count(), 32);
    assert_eq!(g.known_fields().count(), 11);
    assert!(g.is_permission_known("congress_instances.read.us"));
    assert!(g.is_permission_known("congress_instances.participants.read.*"));
    assert!(!g.is_permission_known("congress_instances.read"));
    assert_eq!(g.components("name"), ["firstName", "lastName", "honorific"]);
}

#[test]
fn missing_catalog_file_is_an_io_error() {
    let err = Catalog::from_path("/nonexistent/catalog.json").unwrap_err();
    assert!(matches!(err, CatalogError::Io { .. }));
    assert!(err.to_string().contains("/nonexistent/catalog.json"));
}

#[test]
fn update_grants_read_and_name_fields() {
    let g = graphs();
    let set = add_permission(&g, &PermissionSet::new(), "codeholders.update").unwrap();
    assert_eq!(perms(&set), vec!["codeholders.read", "codeholders.update"]);
    assert_eq!(fields(&set), BTreeMap::from([("name", FieldFlags::all())]));

    // Both permissions imply a flag on `name`.
    let set = remove_member_field(&g, &set, "name", FieldFlags::READ).unwrap();
    assert!(set.permissions.is_empty());
    assert!(fields(&set).is_empty());
}

#[test]
fn per_country_requirements_cascade() {
    let g = graphs();
    let set = add_permission(
        &g,
        &PermissionSet::new(),
        "congress_instances.participants.read.nl",
    )
    .unwrap();
    assert_eq!(fields(&set), BTreeMap::from([("email", FieldFlags::READ)]));
    assert_eq!(
        unmet_requirements(&g, &set, "congress_instances.participants.read.nl"),
        vec![XPerm::perm("codeholders.read")]
    );

    let set = add_permission(&g, &set, "codeholders.read").unwrap();
    assert!(unmet_requirements(&g, &set, "congress_instances.participants.read.nl").is_empty());

    let set = remove_permission(&g, &set, "codeholders.read").unwrap();
    assert!(set.permissions.is_empty());
    // Implied fields outlive the permissions that implied them.
    assert_eq!(
        fields(&set),
        BTreeMap::from([("email", FieldFlags::READ), ("name", FieldFlags::READ)])
    );
}

#[test]
fn country_wildcard_explodes_into_remaining_countries() {
    let g = graphs();
    let set = add_permission(&g, &PermissionSet::new(), "congress_instances.read.*").unwrap();
    let set = remove_permission(&g, &set, "congress_instances.read.fr").unwrap();
    assert_eq!(
        perms(&set),
        vec![
            "congress_instances.read.de",
            "congress_instances.read.nl",
            "congress_instances.read.us",
        ]
    );
}

#[test]
fn superadmin_loses_one_field() {
    let g = graphs();
    let set = add_permission(&g, &PermissionSet::new(), "*").unwrap();
    assert_eq!(perms(&set), vec!["*"]);
    assert_eq!(
        fields(&set),
        BTreeMap::from([
            ("email", FieldFlags::all()),
            ("membership", FieldFlags::all()),
            ("name", FieldFlags::all()),
            ("notes", FieldFlags::all()),
        ])
    );

    let set = remove_member_field(&g, &set, "email", FieldFlags::READ).unwrap();
    assert_eq!(
        perms(&set),
        vec![
            "admin.logs.read",
            "codeholders.*",
            "congress_instances.read.*",
            "congress_instances.update.*",
            "magazines.read",
            "magazines.subscriptions.read",
            "magazines.subscriptions.update",
            "magazines.update",
        ]
    );
    assert_eq!(
        fields(&set),
        BTreeMap::from([("name", FieldFlags::all()), ("notes", FieldFlags::all())])
    );
    assert!(has_permission(&set, "codeholders.hist.delete"));
    assert!(!has_permission(&set, "congress_instances.participants.read.nl"));
    assert!(!has_permission(&set, "admin.roles.update"));
}

#[test]
fn display_state_over_fixture() {
    let g = graphs();
    let set = add_permission(&g, &PermissionSet::new(), "codeholders.update").unwrap();
    let state = compute_display_state(&g, &set);

    assert_eq!(state.len(), 32 + 22 + 1);
    let roots: Vec<String> = state.roots().map(ToString::to_string).collect();
    assert_eq!(roots, vec!["codeholders.update"]);

    let name_write = state.field("name", FieldFlag::Write).unwrap();
    assert!(name_write.active);
    assert!(name_write
        .implied_by
        .contains(&XPerm::perm("codeholders.update")));

    let json = serde_json::to_value(&state).unwrap();
    assert_eq!(json["codeholders.read"]["impliedBy"][0], "codeholders.update");
    assert_eq!(json["field:name:r"]["virtuallyActive"], true);
}

#[test]
fn permission_set_json() {
    let all: PermissionSet =
        serde_json::from_str(r#"{"permissions":["a.b"],"memberFields":null}"#).unwrap();
    assert!(all.has_all_member_fields());

    let none: PermissionSet = serde_json::from_str(r#"{"permissions":[]}"#).unwrap();
    assert_eq!(none.member_fields, Some(BTreeMap::new()));

    let g = graphs();
    let set = add_member_field(&g, &none, "address", FieldFlags::READ).unwrap();
    let json = serde_json::to_value(&set).unwrap();
    assert_eq!(
        json,
        serde_json::json!({
            "permissions": [],
            "memberFields": { "address": "r", "addressCity": "r", "addressCountry": "r" }
        })
    );
}
