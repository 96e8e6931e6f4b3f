//! The delivery service: the crate's public orchestration layer.
//!
//! `resolve` loads a catalog and selects one record; `deliver` turns a
//! record into files on disk by chaining the transport reader through the
//! validating reader, the format sniffer, and the extractor. The reader is
//! owned end to end, so every exit path releases it.

use std::io::{self, Read};
use std::path::Path;

use thiserror::Error;
use tracing::debug;

use crate::archive::{self, ArchiveKind, ExtractError, Sniffer};
use crate::bom::{self, BomEntry};
use crate::catalog::{Catalog, CatalogError, Dependency};
use crate::checksum::{Checksum, ChecksumError, ValidatingReader};
use crate::resolver::{self, ResolveError};
use crate::transport::{
    BoxError, MappingResolver, MirrorResolver, NullMappingResolver, NullMirrorResolver, Transport,
};

#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Catalog(#[from] CatalogError),

    #[error(transparent)]
    Resolve(#[from] ResolveError),

    #[error("failed to resolve dependency redirect: {0}")]
    Redirect(#[source] BoxError),

    #[error("failed to fetch dependency: {0}")]
    Fetch(#[source] BoxError),

    /// A digest mismatch on a stream the consumer read to the end.
    #[error("validation error: {0}")]
    Validation(#[source] ChecksumError),

    /// A checksum problem caught by the deferred check: an unverifiable
    /// algorithm, or a mismatch only visible once trailing bytes the
    /// consumer never read were drained.
    #[error("failed to validate dependency: {0}")]
    Checksum(#[from] ChecksumError),

    #[error(transparent)]
    Extract(#[from] ExtractError),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

/// Resolves and delivers buildpack dependencies.
///
/// Construction is builder-style: attach mapping and mirror resolvers to
/// let platform bindings override download locations. Both default to
/// no-ops.
pub struct Service {
    transport: Box<dyn Transport>,
    mappings: Box<dyn MappingResolver>,
    mirrors: Box<dyn MirrorResolver>,
}

impl Service {
    pub fn new(transport: impl Transport + 'static) -> Self {
        Self {
            transport: Box::new(transport),
            mappings: Box::new(NullMappingResolver),
            mirrors: Box::new(NullMirrorResolver),
        }
    }

    #[must_use]
    pub fn with_dependency_mapping_resolver(
        mut self,
        resolver: impl MappingResolver + 'static,
    ) -> Self {
        self.mappings = Box::new(resolver);
        self
    }

    #[must_use]
    pub fn with_dependency_mirror_resolver(
        mut self,
        resolver: impl MirrorResolver + 'static,
    ) -> Self {
        self.mirrors = Box::new(resolver);
        self
    }

    /// Select the catalog record that best satisfies `constraint` on
    /// `stack`.
    ///
    /// # Errors
    ///
    /// Fails when the catalog cannot be loaded or no record satisfies the
    /// request; see [`ResolveError`] for the taxonomy.
    pub fn resolve(
        &self,
        catalog_path: impl AsRef<Path>,
        id: &str,
        constraint: &str,
        stack: &str,
    ) -> Result<Dependency, Error> {
        let catalog = Catalog::load(catalog_path.as_ref())?;
        Ok(resolver::resolve(&catalog, id, constraint, stack)?)
    }

    /// Fetch, verify, and materialize `dependency` into `layer_path`.
    ///
    /// Archives are unpacked into the layer with the record's
    /// `strip_components`; anything that is not an archive is copied to
    /// `layer_path/<basename of the record's URI>` with mode `0755`. When
    /// the record carries a checksum, every byte the transport produces is
    /// hashed and the digest is compared after extraction.
    ///
    /// # Errors
    ///
    /// Fails on redirect, fetch, checksum, or extraction problems; the
    /// layer directory is left as-is for the caller to clean up.
    pub fn deliver(
        &self,
        dependency: &Dependency,
        cnb_path: &str,
        layer_path: impl AsRef<Path>,
        platform_dir: impl AsRef<Path>,
    ) -> Result<(), Error> {
        let layer_path = layer_path.as_ref();
        let checksum = dependency.effective_checksum();

        let uri = self.redirect(dependency, checksum.as_ref(), platform_dir.as_ref())?;
        debug!(id = %dependency.id, %uri, "fetching dependency");

        let stream = self.transport.open(cnb_path, &uri).map_err(Error::Fetch)?;
        let body = match &checksum {
            Some(checksum) => Body::Verified(ValidatingReader::new(stream, checksum)?),
            None => Body::Raw(stream),
        };

        let mut source = Sniffer::new(body)?;
        let kind = source.kind()?;
        debug!(?kind, layer = %layer_path.display(), "materializing dependency");

        match kind {
            ArchiveKind::File => {
                let target = layer_path.join(basename(&dependency.uri));
                archive::write_plain_file(&mut source, &target)?;
            }
            _ => archive::extract(kind, &mut source, layer_path, dependency.strip_components)?,
        }

        source.into_inner().finish().map_err(|error| match error {
            ChecksumError::Mismatch { trailing: 0 } => Error::Validation(error),
            other => Error::Checksum(other),
        })?;
        Ok(())
    }

    /// Project records into BOM entries; see [`bom::generate_bill_of_materials`].
    pub fn generate_bill_of_materials(&self, dependencies: &[Dependency]) -> Vec<BomEntry> {
        bom::generate_bill_of_materials(dependencies)
    }

    /// Apply platform redirection: a dependency mapping keyed by the
    /// record's checksum is authoritative; otherwise a mirror keyed by the
    /// original URI may substitute.
    fn redirect(
        &self,
        dependency: &Dependency,
        checksum: Option<&Checksum>,
        platform_dir: &Path,
    ) -> Result<String, Error> {
        if let Some(checksum) = checksum {
            if let Some(mapped) = self
                .mappings
                .find_dependency_mapping(&checksum.to_string(), platform_dir)
                .map_err(Error::Redirect)?
            {
                debug!(id = %dependency.id, %mapped, "dependency mapping overrides uri");
                return Ok(mapped);
            }
        }

        if let Some(mirror) = self
            .mirrors
            .find_dependency_mirror(&dependency.uri, platform_dir)
            .map_err(Error::Redirect)?
        {
            debug!(id = %dependency.id, %mirror, "dependency mirror overrides uri");
            return Ok(mirror);
        }

        Ok(dependency.uri.clone())
    }
}

/// The delivery stream, verified or not. Verification is decided once per
/// delivery, before the first byte moves.
enum Body {
    Verified(ValidatingReader<Box<dyn Read>>),
    Raw(Box<dyn Read>),
}

impl Body {
    /// Run the deferred checksum comparison, draining the stream first so
    /// unconsumed trailing bytes count.
    fn finish(self) -> Result<(), ChecksumError> {
        match self {
            Body::Verified(reader) => reader.finalize(),
            Body::Raw(_) => Ok(()),
        }
    }
}

impl Read for Body {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            Body::Verified(reader) => reader.read(buf),
            Body::Raw(reader) => reader.read(buf),
        }
    }
}

/// The final path segment of a URI, used to name plain-file deliveries.
fn basename(uri: &str) -> &str {
    uri.rsplit('/').next().unwrap_or(uri)
}
