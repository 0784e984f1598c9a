//! grantset - validate permission catalogs and edit permission sets
//!
//! Reads a catalog JSON file, builds the implication graphs once and applies
//! edits or computes display state for a permission set read from a file or
//! stdin. Results go to stdout as JSON; logs go to stderr.

mod edit;

use std::io::Read;
use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use grantset_core::resolver::{self, Catalog, PermissionGraphs};
use grantset_core::types::is_wildcard;
use grantset_core::{PermissionSet, XPerm};
use serde::Serialize;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

use edit::Edit;

#[derive(Parser)]
#[command(name = "grantset")]
#[command(about = "Resolve permission and member-field grants against a catalog")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct CatalogArgs {
    /// Catalog JSON file
    #[arg(long, env = "GRANTSET_CATALOG")]
    catalog: PathBuf,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate a catalog and print a summary
    Check {
        #[command(flatten)]
        catalog: CatalogArgs,
    },
    /// Apply edits to a permission set and print the result
    Apply {
        #[command(flatten)]
        catalog: CatalogArgs,

        /// Permission set JSON file, `-` for stdin (default: empty set)
        #[arg(long)]
        set: Option<PathBuf>,

        /// Edits applied in order: add:ID, remove:ID, add-field:FIELD=FLAGS,
        /// remove-field:FIELD=FLAGS, add-all-fields, remove-all-fields
        #[arg(value_name = "EDIT", required = true)]
        edits: Vec<Edit>,
    },
    /// Print the display state of a permission set
    Display {
        #[command(flatten)]
        catalog: CatalogArgs,

        /// Permission set JSON file, `-` for stdin (default: empty set)
        #[arg(long)]
        set: Option<PathBuf>,
    },
    /// Check version
    Version,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CatalogSummary {
    permissions: usize,
    wildcards: usize,
    fields: usize,
    composite_fields: Vec<String>,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("grantset=info,grantset_core=info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Check { catalog } => {
            let graphs = load_graphs(&catalog.catalog)?;
            let summary = CatalogSummary {
                permissions: graphs.known_permissions().count(),
                wildcards: graphs
                    .known_permissions()
                    .filter(|id| is_wildcard(id))
                    .count(),
                fields: graphs.known_fields().count(),
                composite_fields: graphs
                    .known_fields()
                    .filter(|field| !graphs.components(field).is_empty())
                    .cloned()
                    .collect(),
            };
            print_json(&summary)?;
        }
        Commands::Apply {
            catalog,
            set,
            edits,
        } => {
            let graphs = load_graphs(&catalog.catalog)?;
            let mut current = load_set(set.as_deref())?;
            for edit in &edits {
                current = edit
                    .apply(&graphs, &current)
                    .with_context(|| format!("applying {edit}"))?;
                debug!(%edit, permissions = current.permissions.len(), "applied edit");
            }
            report_unmet(&graphs, &current);
            print_json(&current)?;
        }
        Commands::Display { catalog, set } => {
            let graphs = load_graphs(&catalog.catalog)?;
            let current = load_set(set.as_deref())?;
            print_json(&resolver::compute_display_state(&graphs, &current))?;
        }
        Commands::Version => {
            println!("grantset {}", env!("CARGO_PKG_VERSION"));
        }
    }

    Ok(())
}

fn load_graphs(path: &Path) -> anyhow::Result<PermissionGraphs> {
    let catalog = Catalog::from_path(path)?;
    let graphs = PermissionGraphs::build(&catalog)
        .with_context(|| format!("invalid catalog {}", path.display()))?;
    info!(
        catalog = %path.display(),
        permissions = graphs.known_permissions().count(),
        "catalog loaded"
    );
    Ok(graphs)
}

fn load_set(path: Option<&Path>) -> anyhow::Result<PermissionSet> {
    let text = match path {
        None => return Ok(PermissionSet::new()),
        Some(p) if p == Path::new("-") => {
            let mut text = String::new();
            std::io::stdin()
                .read_to_string(&mut text)
                .context("reading permission set from stdin")?;
            text
        }
        Some(p) => std::fs::read_to_string(p)
            .with_context(|| format!("reading permission set {}", p.display()))?,
    };
    serde_json::from_str(&text).context("parsing permission set")
}

/// Requirements are not enforced on add; surface what is missing instead.
fn report_unmet(graphs: &PermissionGraphs, set: &PermissionSet) {
    for id in &set.permissions {
        let missing = resolver::unmet_requirements(graphs, set, id);
        if !missing.is_empty() {
            warn!(
                permission = %id,
                missing = %missing.iter().map(XPerm::to_string).collect::<Vec<_>>().join(", "),
                "unmet requirements"
            );
        }
        if resolver::is_permission_unknown(graphs, id) {
            warn!(permission = %id, "permission not in catalog");
        }
    }
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
