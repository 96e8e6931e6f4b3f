//! courier - dependency delivery for cloud-native buildpacks
//!
//! Resolves dependency records out of a buildpack metadata catalog and
//! streams their archives into build layers with checksum verification,
//! format detection, and safe extraction. Platform-provided dependency
//! mappings and mirrors can redirect where the bytes come from.
//!
//! ```no_run
//! use courier::{FileTransport, Service};
//!
//! # fn main() -> Result<(), courier::Error> {
//! let service = Service::new(FileTransport);
//!
//! let dependency = service.resolve(
//!     "buildpack.toml",
//!     "node",
//!     "~> 18.2",
//!     "io.buildpacks.stacks.jammy",
//! )?;
//!
//! service.deliver(&dependency, "/cnb/buildpacks/node", "/layers/node", "/platform")?;
//!
//! let bom = service.generate_bill_of_materials(std::slice::from_ref(&dependency));
//! # let _ = bom;
//! # Ok(())
//! # }
//! ```

pub mod archive;
pub mod bom;
pub mod catalog;
pub mod checksum;
pub mod constraint;
pub mod resolver;
pub mod service;
pub mod transport;

pub use bom::{BomAlgorithm, BomChecksum, BomEntry, BomMetadata, BomSource};
pub use catalog::{Catalog, CatalogError, Dependency};
pub use checksum::{Checksum, ChecksumError};
pub use constraint::Constraint;
pub use resolver::ResolveError;
pub use service::{Error, Service};
pub use transport::{
    BoxError, FileTransport, MappingResolver, MirrorResolver, NullMappingResolver,
    NullMirrorResolver, Transport,
};
