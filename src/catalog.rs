//! Buildpack metadata catalog.
//!
//! The catalog is the `[metadata]` table of a buildpack descriptor: an
//! ordered list of dependency records plus a table of default version
//! constraints keyed by dependency id. Records are value types; semantic
//! version validation is deferred to the resolver.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;

use crate::checksum::Checksum;

#[derive(Error, Debug)]
pub enum CatalogError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse buildpack metadata: {0}")]
    Parse(#[from] toml::de::Error),
}

/// A single catalog record describing one downloadable dependency build.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Dependency {
    #[serde(default)]
    pub id: String,
    /// Human-readable display name.
    #[serde(default)]
    pub name: String,
    /// Must parse as a semantic version; checked at resolution time.
    #[serde(default)]
    pub version: String,
    /// Stack ids this build supports. The literal `"*"` matches any stack.
    #[serde(default)]
    pub stacks: Vec<String>,
    #[serde(default)]
    pub uri: String,
    /// Checksum in `algo:hex` form. Preferred over the legacy `sha256`.
    #[serde(default)]
    pub checksum: String,
    /// Legacy bare-hex sha256 digest.
    #[serde(default)]
    pub sha256: String,
    /// Upstream source archive location.
    #[serde(default)]
    pub source: String,
    #[serde(default, alias = "source-checksum")]
    pub source_checksum: String,
    /// Legacy bare-hex sha256 digest of the source archive.
    #[serde(default)]
    pub source_sha256: String,
    #[serde(default)]
    pub cpe: String,
    #[serde(default)]
    pub cpes: Vec<String>,
    #[serde(default)]
    pub purl: String,
    #[serde(default)]
    pub licenses: Vec<String>,
    #[serde(
        default,
        deserialize_with = "deserialize_toml_datetime",
        skip_serializing_if = "Option::is_none"
    )]
    pub deprecation_date: Option<DateTime<Utc>>,
    /// Leading path segments to drop from every archive entry at delivery.
    #[serde(default, rename = "strip-components", alias = "strip_components")]
    pub strip_components: u32,
}

impl Dependency {
    /// The verification checksum: `checksum` wins over the legacy `sha256`.
    pub fn effective_checksum(&self) -> Option<Checksum> {
        effective(&self.checksum, &self.sha256)
    }

    /// The source provenance checksum, with the same precedence rule.
    pub fn effective_source_checksum(&self) -> Option<Checksum> {
        effective(&self.source_checksum, &self.source_sha256)
    }
}

fn effective(checksum: &str, sha256: &str) -> Option<Checksum> {
    if !checksum.is_empty() {
        Some(Checksum::parse(checksum))
    } else if !sha256.is_empty() {
        Some(Checksum::Sha256(sha256.to_string()))
    } else {
        None
    }
}

/// A parsed catalog: dependency records in document order plus the
/// `default-versions` table.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    pub dependencies: Vec<Dependency>,
    pub default_versions: BTreeMap<String, String>,
}

impl Catalog {
    /// Load and parse the metadata document at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError`] when the file cannot be read or is not
    /// valid TOML.
    pub fn load(path: &Path) -> Result<Self, CatalogError> {
        fs::read_to_string(path)?.parse()
    }
}

impl FromStr for Catalog {
    type Err = CatalogError;

    fn from_str(document: &str) -> Result<Self, Self::Err> {
        let parsed: Document = toml::from_str(document)?;
        Ok(Self {
            dependencies: parsed.metadata.dependencies,
            default_versions: parsed.metadata.default_versions,
        })
    }
}

#[derive(Deserialize, Default)]
struct Document {
    #[serde(default)]
    metadata: Metadata,
}

#[derive(Deserialize, Default)]
struct Metadata {
    #[serde(default, rename = "default-versions")]
    default_versions: BTreeMap<String, String>,
    #[serde(default)]
    dependencies: Vec<Dependency>,
}

/// TOML datetimes arrive as [`toml::value::Datetime`]; bridge them to
/// [`chrono::DateTime`] at the deserialization boundary.
fn deserialize_toml_datetime<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<toml::value::Datetime>::deserialize(deserializer)?;
    value
        .map(|datetime| {
            DateTime::parse_from_rfc3339(&datetime.to_string())
                .map(|parsed| parsed.with_timezone(&Utc))
                .map_err(serde::de::Error::custom)
        })
        .transpose()
}
