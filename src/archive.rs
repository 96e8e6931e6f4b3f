//! Archive format detection and streaming extraction.
//!
//! The dependency stream is sniffed by magic bytes, decompressed on the
//! fly, and unpacked entry by entry so bytes only ever flow forward:
//! transport reader -> validating reader -> decoder -> disk. Nothing
//! buffers the whole archive.

use std::fs::{self, File};
use std::io::{self, Read};
use std::path::{Component, Path, PathBuf};

use bzip2::read::BzDecoder;
use flate2::read::GzDecoder;
use tar::EntryType;
use thiserror::Error;
use tracing::debug;
use xz2::read::XzDecoder;
use zstd::stream::Decoder as ZstdDecoder;

#[derive(Error, Debug)]
pub enum ExtractError {
    #[error("unsupported archive type")]
    UnsupportedArchive,

    #[error("failed to create archived directory {path:?}: {source}")]
    DirCreate { path: PathBuf, source: io::Error },

    #[error("failed to create archived file {path:?}: {source}")]
    FileCreate { path: PathBuf, source: io::Error },

    #[error("failed to extract symlink {path:?}: {source}")]
    Symlink { path: PathBuf, source: io::Error },

    #[error("unsupported archive entry type {kind:?} for {path:?}")]
    UnsupportedEntry { kind: EntryType, path: PathBuf },

    #[error("archive entry {path:?} escapes the destination directory")]
    PathEscape { path: PathBuf },

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

/// Archive flavor detected from a stream's leading bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveKind {
    TarGzip,
    TarXz,
    TarBzip2,
    TarZstd,
    Tar,
    /// No archive magic and printable content: deliver as a single file.
    File,
}

/// How many leading bytes [`Sniffer`] buffers; covers one full tar header
/// block, which is enough for every supported magic.
const SNIFF_LEN: usize = 512;

/// Position of the `ustar` marker inside a POSIX tar header.
const TAR_MAGIC_OFFSET: usize = 257;

/// Buffers the first bytes of a stream so its type can be inspected before
/// any consumer reads it. Peeked bytes are replayed on the next read, so
/// wrapping hashers upstream see every byte exactly once.
pub struct Sniffer<R> {
    header: Vec<u8>,
    position: usize,
    inner: R,
}

impl<R: Read> Sniffer<R> {
    pub fn new(mut inner: R) -> io::Result<Self> {
        let mut header = vec![0u8; SNIFF_LEN];
        let mut filled = 0;
        while filled < header.len() {
            let n = inner.read(&mut header[filled..])?;
            if n == 0 {
                break;
            }
            filled += n;
        }
        header.truncate(filled);

        Ok(Self {
            header,
            position: 0,
            inner,
        })
    }

    /// Classify the stream from its buffered prefix.
    ///
    /// # Errors
    ///
    /// Returns [`ExtractError::UnsupportedArchive`] for binary content that
    /// matches no known magic.
    pub fn kind(&self) -> Result<ArchiveKind, ExtractError> {
        detect(&self.header)
    }

    pub fn into_inner(self) -> R {
        self.inner
    }
}

impl<R: Read> Read for Sniffer<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.position < self.header.len() {
            let remaining = &self.header[self.position..];
            let n = remaining.len().min(buf.len());
            buf[..n].copy_from_slice(&remaining[..n]);
            self.position += n;
            return Ok(n);
        }
        self.inner.read(buf)
    }
}

fn detect(header: &[u8]) -> Result<ArchiveKind, ExtractError> {
    if header.starts_with(&[0x1f, 0x8b]) {
        return Ok(ArchiveKind::TarGzip);
    }
    if header.starts_with(&[0xfd, 0x37, 0x7a, 0x58, 0x5a, 0x00]) {
        return Ok(ArchiveKind::TarXz);
    }
    if header.starts_with(b"BZh") {
        return Ok(ArchiveKind::TarBzip2);
    }
    if header.starts_with(&[0x28, 0xb5, 0x2f, 0xfd]) {
        return Ok(ArchiveKind::TarZstd);
    }
    if header.len() >= TAR_MAGIC_OFFSET + 5 && &header[TAR_MAGIC_OFFSET..TAR_MAGIC_OFFSET + 5] == b"ustar" {
        return Ok(ArchiveKind::Tar);
    }
    if is_printable_text(header) {
        return Ok(ArchiveKind::File);
    }
    Err(ExtractError::UnsupportedArchive)
}

/// Printable content with no archive magic is delivered as a plain file;
/// anything else is an archive type this crate does not speak.
fn is_printable_text(header: &[u8]) -> bool {
    let text = match std::str::from_utf8(header) {
        Ok(text) => text,
        // A multi-byte character cut off by the sniff window is fine; bad
        // bytes anywhere else are not text.
        Err(error) if error.error_len().is_none() => {
            std::str::from_utf8(&header[..error.valid_up_to()]).unwrap_or("")
        }
        Err(_) => return false,
    };

    text.chars()
        .all(|c| !c.is_control() || c.is_ascii_whitespace())
}

/// Unpack a sniffed archive stream into `destination`, dropping
/// `strip_components` leading path segments from every entry.
///
/// Entries whose paths are exhausted by the strip are skipped. The call
/// returns once the tar terminator is reached; trailing bytes are left on
/// `reader` for the caller to account for.
pub fn extract<R: Read>(
    kind: ArchiveKind,
    reader: R,
    destination: &Path,
    strip_components: u32,
) -> Result<(), ExtractError> {
    debug!(?kind, destination = %destination.display(), "unpacking archive");

    match kind {
        ArchiveKind::TarGzip => unpack_tar(GzDecoder::new(reader), destination, strip_components),
        ArchiveKind::TarXz => unpack_tar(XzDecoder::new(reader), destination, strip_components),
        ArchiveKind::TarBzip2 => unpack_tar(BzDecoder::new(reader), destination, strip_components),
        ArchiveKind::TarZstd => {
            unpack_tar(ZstdDecoder::new(reader)?, destination, strip_components)
        }
        ArchiveKind::Tar => unpack_tar(reader, destination, strip_components),
        ArchiveKind::File => Err(ExtractError::UnsupportedArchive),
    }
}

/// Copy a non-archive stream verbatim to `target` with the executable mode
/// dependencies are delivered with.
pub fn write_plain_file<R: Read>(reader: &mut R, target: &Path) -> Result<(), ExtractError> {
    let mut file = File::create(target).map_err(|source| ExtractError::FileCreate {
        path: target.to_path_buf(),
        source,
    })?;
    io::copy(reader, &mut file).map_err(|source| ExtractError::FileCreate {
        path: target.to_path_buf(),
        source,
    })?;
    set_mode(target, 0o755).map_err(|source| ExtractError::FileCreate {
        path: target.to_path_buf(),
        source,
    })?;
    Ok(())
}

fn unpack_tar<R: Read>(
    reader: R,
    destination: &Path,
    strip_components: u32,
) -> Result<(), ExtractError> {
    let mut archive = tar::Archive::new(reader);

    for entry in archive.entries()? {
        let mut entry = entry?;
        let entry_path = entry.path()?.into_owned();

        let Some(relative) = strip_path(&entry_path, strip_components)? else {
            continue;
        };
        let target = destination.join(&relative);
        let mode = entry.header().mode()?;

        match entry.header().entry_type() {
            EntryType::Directory => create_dir(&target, mode)?,
            EntryType::Regular => write_file(&mut entry, &target, mode)?,
            EntryType::Symlink => {
                let link = entry.link_name()?.ok_or_else(|| ExtractError::Symlink {
                    path: target.clone(),
                    source: io::Error::new(io::ErrorKind::InvalidData, "missing link target"),
                })?;
                make_symlink(&link, &target)?;
            }
            kind => {
                return Err(ExtractError::UnsupportedEntry {
                    kind,
                    path: relative,
                })
            }
        }
    }

    Ok(())
}

/// Drop the leading `strip` segments from a tar entry path. Returns `None`
/// when no segments remain. `..`, absolute paths, and path prefixes are
/// rejected outright so no entry can land outside the destination.
fn strip_path(path: &Path, strip: u32) -> Result<Option<PathBuf>, ExtractError> {
    let mut segments = Vec::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::Normal(segment) => segments.push(segment),
            Component::RootDir | Component::Prefix(_) | Component::ParentDir => {
                return Err(ExtractError::PathEscape {
                    path: path.to_path_buf(),
                });
            }
        }
    }

    if segments.len() <= strip as usize {
        return Ok(None);
    }

    Ok(Some(segments[strip as usize..].iter().collect()))
}

fn create_dir(target: &Path, mode: u32) -> Result<(), ExtractError> {
    // mkdir -p semantics: a directory that already exists keeps its mode.
    if target.is_dir() {
        return Ok(());
    }

    let dir_create = |source| ExtractError::DirCreate {
        path: target.to_path_buf(),
        source,
    };
    fs::create_dir_all(target).map_err(dir_create)?;
    set_mode(target, mode).map_err(dir_create)
}

fn write_file<R: Read>(entry: &mut R, target: &Path, mode: u32) -> Result<(), ExtractError> {
    if let Some(parent) = target.parent() {
        fs::create_dir_all(parent).map_err(|source| ExtractError::DirCreate {
            path: parent.to_path_buf(),
            source,
        })?;
    }

    let file_create = |source| ExtractError::FileCreate {
        path: target.to_path_buf(),
        source,
    };
    let mut file = File::create(target).map_err(file_create)?;
    io::copy(entry, &mut file).map_err(file_create)?;
    set_mode(target, mode).map_err(file_create)
}

#[cfg(unix)]
fn make_symlink(link: &Path, target: &Path) -> Result<(), ExtractError> {
    std::os::unix::fs::symlink(link, target).map_err(|source| ExtractError::Symlink {
        path: target.to_path_buf(),
        source,
    })
}

#[cfg(not(unix))]
fn make_symlink(_link: &Path, target: &Path) -> Result<(), ExtractError> {
    Err(ExtractError::Symlink {
        path: target.to_path_buf(),
        source: io::Error::new(
            io::ErrorKind::Unsupported,
            "symlinks are not supported on this platform",
        ),
    })
}

#[cfg(unix)]
fn set_mode(path: &Path, mode: u32) -> io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(mode))
}

#[cfg(not(unix))]
fn set_mode(_path: &Path, _mode: u32) -> io::Result<()> {
    Ok(())
}
