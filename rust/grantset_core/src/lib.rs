//! `grantset_core`: permission and member-field implication resolver.
//!
//! Given a static catalog of permissions and member fields with declared
//! implication and requirement edges, keeps grant sets minimal and
//! consistent while permissions are added and removed.
//!
//! Modules:
//! - `types`:    tokens, field flags, the public permission set
//! - `resolver`: catalog, graph builder, codec, solver, display state
//! - `error`:    catalog and codec errors

pub mod error;
pub mod resolver;
pub mod types;

pub use error::{CatalogError, CodecError};
pub use resolver::{Catalog, DisplayState, EntryState, PermissionGraphs};
pub use types::{FieldFlag, FieldFlags, PermissionSet, XPerm, XSet};
