//! Bill-of-materials projection.
//!
//! A pure transform from catalog records to the BOM entries a buildpack
//! reports for everything it delivered. Unknown or missing checksums are
//! never an error here; they project as [`BomAlgorithm::Unknown`] with an
//! empty hash.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::catalog::Dependency;
use crate::checksum::Checksum;

/// Checksum algorithms a BOM entry can report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum BomAlgorithm {
    Sha256,
    Sha512,
    Unknown,
}

impl BomAlgorithm {
    pub fn as_str(&self) -> &'static str {
        match self {
            BomAlgorithm::Sha256 => "SHA256",
            BomAlgorithm::Sha512 => "SHA512",
            BomAlgorithm::Unknown => "UNKNOWN",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BomChecksum {
    pub algorithm: BomAlgorithm,
    #[serde(default)]
    pub hash: String,
}

impl BomChecksum {
    fn unknown() -> Self {
        Self {
            algorithm: BomAlgorithm::Unknown,
            hash: String::new(),
        }
    }
}

impl From<Option<Checksum>> for BomChecksum {
    fn from(checksum: Option<Checksum>) -> Self {
        match checksum {
            Some(Checksum::Sha256(hex)) => Self {
                algorithm: BomAlgorithm::Sha256,
                hash: hex,
            },
            Some(Checksum::Sha512(hex)) => Self {
                algorithm: BomAlgorithm::Sha512,
                hash: hex,
            },
            Some(Checksum::Unknown { .. }) | None => Self::unknown(),
        }
    }
}

/// Provenance of the upstream source archive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BomSource {
    #[serde(default)]
    pub uri: String,
    pub checksum: BomChecksum,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BomMetadata {
    pub checksum: BomChecksum,
    pub source: BomSource,
    pub uri: String,
    pub version: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub cpe: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub purl: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub licenses: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deprecation_date: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BomEntry {
    pub name: String,
    pub metadata: BomMetadata,
}

/// Project dependency records into BOM entries, preserving input order.
pub fn generate_bill_of_materials(dependencies: &[Dependency]) -> Vec<BomEntry> {
    dependencies.iter().map(project).collect()
}

fn project(dependency: &Dependency) -> BomEntry {
    BomEntry {
        name: dependency.name.clone(),
        metadata: BomMetadata {
            checksum: dependency.effective_checksum().into(),
            source: BomSource {
                uri: dependency.source.clone(),
                checksum: dependency.effective_source_checksum().into(),
            },
            uri: dependency.uri.clone(),
            version: dependency.version.clone(),
            // `cpe` wins outright; the `cpes` list is not part of the BOM
            // shape and is ignored even when `cpe` is unset.
            cpe: dependency.cpe.clone(),
            purl: dependency.purl.clone(),
            licenses: dependency.licenses.clone(),
            deprecation_date: dependency.deprecation_date,
        },
    }
}
