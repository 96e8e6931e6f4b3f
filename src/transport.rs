//! Capability seams for fetching bytes and redirecting download locations.
//!
//! The delivery service talks to the outside world through these traits so
//! platform integrations can plug in their own transports and binding
//! resolvers. The null resolvers are the builder defaults; [`FileTransport`]
//! covers local and `file://` URIs, which is as far as this crate goes —
//! network transports live with the caller.

use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

/// Boxed error for implementations brought by the caller.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

pub trait Transport: Send + Sync {
    /// Open a byte stream for `uri`, resolving relative locations against
    /// `root`.
    ///
    /// # Errors
    ///
    /// Any failure to produce the stream; surfaced by the service as a
    /// fetch error.
    fn open(&self, root: &str, uri: &str) -> Result<Box<dyn Read>, BoxError>;
}

pub trait MappingResolver: Send + Sync {
    /// Look up a platform-provided replacement URI for the dependency with
    /// this `algo:hex` checksum. `None` means no binding exists.
    ///
    /// # Errors
    ///
    /// Any failure consulting the platform bindings.
    fn find_dependency_mapping(
        &self,
        checksum: &str,
        platform_dir: &Path,
    ) -> Result<Option<String>, BoxError>;
}

pub trait MirrorResolver: Send + Sync {
    /// Look up a mirror for `uri`. `None` means no mirror is configured.
    ///
    /// # Errors
    ///
    /// Any failure consulting the mirror configuration.
    fn find_dependency_mirror(
        &self,
        uri: &str,
        platform_dir: &Path,
    ) -> Result<Option<String>, BoxError>;
}

/// Resolver used when no dependency mappings are attached.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullMappingResolver;

impl MappingResolver for NullMappingResolver {
    fn find_dependency_mapping(&self, _: &str, _: &Path) -> Result<Option<String>, BoxError> {
        Ok(None)
    }
}

/// Resolver used when no dependency mirror is attached.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullMirrorResolver;

impl MirrorResolver for NullMirrorResolver {
    fn find_dependency_mirror(&self, _: &str, _: &Path) -> Result<Option<String>, BoxError> {
        Ok(None)
    }
}

/// Transport for `file://` and bare filesystem URIs. Relative paths resolve
/// against the buildpack root.
#[derive(Debug, Clone, Copy, Default)]
pub struct FileTransport;

impl Transport for FileTransport {
    fn open(&self, root: &str, uri: &str) -> Result<Box<dyn Read>, BoxError> {
        let raw = uri.strip_prefix("file://").unwrap_or(uri);

        let mut path = PathBuf::from(raw);
        if path.is_relative() {
            path = Path::new(root).join(path);
        }

        Ok(Box::new(File::open(path)?))
    }
}
