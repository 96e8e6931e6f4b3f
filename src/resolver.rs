//! Dependency selection against a catalog.
//!
//! Given (id, constraint, stack) the resolver filters compatible records,
//! ranks them by semantic version, and applies the wildcard-stack
//! tie-break: at equal versions a record that names the stack outright
//! outranks one that only reaches it through `"*"`, and two wildcard
//! records left tied at the top is an error rather than a coin toss.

use semver::Version;
use thiserror::Error;
use tracing::debug;

use crate::catalog::{Catalog, Dependency};
use crate::constraint::{Constraint, ConstraintError};

/// Stack id that makes a record compatible with every stack.
pub const WILDCARD_STACK: &str = "*";

/// Constraint values that defer to the catalog's `default-versions` table.
const DEFAULT_CONSTRAINT: &str = "default";

#[derive(Error, Debug)]
pub enum ResolveError {
    #[error(transparent)]
    Constraint(#[from] ConstraintError),

    #[error("invalid semantic version {version:?} for dependency {id:?}: {source}")]
    InvalidVersion {
        id: String,
        version: String,
        source: semver::Error,
    },

    #[error("invalid default version constraint {constraint:?} for dependency {id:?}")]
    InvalidDefault { id: String, constraint: String },

    #[error(
        "failed to satisfy {id:?} dependency version constraint {constraint:?}: \
         no compatible versions on {stack:?} stack. Supported versions are: [{}]",
        format_versions(.available)
    )]
    NoCompatibleVersion {
        id: String,
        constraint: String,
        stack: String,
        /// Every version present on the requested stack, deduped, ascending.
        available: Vec<Version>,
    },

    #[error("multiple dependencies support wildcard stack for version: {version:?}")]
    AmbiguousWildcard { version: String },
}

fn format_versions(versions: &[Version]) -> String {
    versions
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Select the single catalog record that best satisfies `constraint` on
/// `stack`.
///
/// A `constraint` of `""` or `"default"` defers to the catalog's
/// `default-versions` table, falling back to `"*"` when the table has no
/// entry for `id`.
///
/// # Errors
///
/// See [`ResolveError`]; notably [`ResolveError::NoCompatibleVersion`]
/// carries every version available on the stack for diagnostics.
pub fn resolve(
    catalog: &Catalog,
    id: &str,
    constraint: &str,
    stack: &str,
) -> Result<Dependency, ResolveError> {
    let effective = effective_constraint(catalog, id, constraint)?;
    let parsed = Constraint::parse(&effective)?;
    debug!(id, constraint = %effective, stack, "resolving dependency");

    let mut matching: Vec<(Version, &Dependency)> = Vec::new();
    let mut available: Vec<Version> = Vec::new();

    for dependency in &catalog.dependencies {
        if dependency.id != id || !supports_stack(dependency, stack) {
            continue;
        }

        let version =
            Version::parse(&dependency.version).map_err(|source| ResolveError::InvalidVersion {
                id: id.to_string(),
                version: dependency.version.clone(),
                source,
            })?;

        if parsed.matches(&version) {
            matching.push((version.clone(), dependency));
        }
        available.push(version);
    }

    if matching.is_empty() {
        available.sort();
        available.dedup();
        return Err(ResolveError::NoCompatibleVersion {
            id: id.to_string(),
            constraint: effective,
            stack: stack.to_string(),
            available,
        });
    }

    // Highest version first; the sort is stable, so among fully tied
    // records the one listed first in the catalog wins.
    matching.sort_by(|(left_version, left), (right_version, right)| {
        right_version
            .cmp(left_version)
            .then_with(|| has_wildcard(left).cmp(&has_wildcard(right)))
    });

    if let [(first_version, first), (second_version, second), ..] = matching.as_slice() {
        if first_version == second_version && has_wildcard(first) && has_wildcard(second) {
            return Err(ResolveError::AmbiguousWildcard {
                version: first_version.to_string(),
            });
        }
    }

    Ok(matching[0].1.clone())
}

fn effective_constraint(
    catalog: &Catalog,
    id: &str,
    constraint: &str,
) -> Result<String, ResolveError> {
    if !constraint.is_empty() && constraint != DEFAULT_CONSTRAINT {
        return Ok(constraint.to_string());
    }

    match catalog.default_versions.get(id) {
        Some(default) if default.is_empty() || default == DEFAULT_CONSTRAINT => {
            Err(ResolveError::InvalidDefault {
                id: id.to_string(),
                constraint: default.clone(),
            })
        }
        Some(default) => Ok(default.clone()),
        None => Ok("*".to_string()),
    }
}

fn supports_stack(dependency: &Dependency, stack: &str) -> bool {
    dependency
        .stacks
        .iter()
        .any(|candidate| candidate == stack || candidate == WILDCARD_STACK)
}

fn has_wildcard(dependency: &Dependency) -> bool {
    dependency
        .stacks
        .iter()
        .any(|candidate| candidate == WILDCARD_STACK)
}
