//! Error types for catalog loading and the xperm codec.

use std::path::PathBuf;

use thiserror::Error;

/// Catalog authoring errors. All of them are detected once, while the
/// permission graphs are built, and are not recoverable at runtime.
#[derive(Debug, Error)]
pub enum CatalogError {
    /// Catalog text is not valid catalog JSON.
    #[error("catalog parse error: {0}")]
    Parse(#[from] serde_json::Error),

    /// Catalog file could not be read.
    #[error("failed to read catalog {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The same permission id is declared more than once.
    #[error("permission '{0}' is declared more than once")]
    DuplicateId(String),

    /// Empty segment, or `*` used anywhere but as the final segment.
    #[error("malformed permission id '{0}'")]
    InvalidId(String),

    /// `implies` names a permission the catalog does not declare.
    #[error("'{from}' implies unknown permission '{to}'")]
    DanglingImplication { from: String, to: String },

    /// `requires` names a permission the catalog does not declare.
    #[error("'{from}' requires unknown permission '{to}'")]
    DanglingRequirement { from: String, to: String },

    /// A field reference that is not in the field catalog.
    #[error("'{from}' references unknown member field '{field}'")]
    UnknownField { from: String, field: String },

    /// The implication graph (declared plus wildcard edges) has a cycle.
    #[error("implication cycle: {}", cycle.join(" -> "))]
    ImplicationCycle { cycle: Vec<String> },
}

/// Errors at the boundary between the public permission set and the
/// internal token set.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CodecError {
    /// "All fields" and explicit field grants in the same token set.
    #[error("all-fields grant coexists with explicit field grants: {}", fields.join(", "))]
    WildcardWithExplicitFields { fields: Vec<String> },

    /// Field flag text other than `r`, `w` or `rw`.
    #[error("invalid field flags '{0}', expected r, w or rw")]
    InvalidFlags(String),
}

/// Result type for catalog operations.
pub type Result<T> = std::result::Result<T, CatalogError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cycle_message_lists_path() {
        let err = CatalogError::ImplicationCycle {
            cycle: vec!["a".into(), "b".into(), "a".into()],
        };
        assert_eq!(err.to_string(), "implication cycle: a -> b -> a");
    }

    #[test]
    fn codec_message_lists_fields() {
        let err = CodecError::WildcardWithExplicitFields {
            fields: vec!["field:name:r".into()],
        };
        assert!(err.to_string().contains("field:name:r"));
    }
}
