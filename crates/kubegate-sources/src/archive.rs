//! Archive identification and extraction
//!
//! Identification works on a prefix of the content so a download can be
//! classified without buffering it. A stream counts as an archive when it is
//! a zip, or a tar optionally wrapped in gzip, zstd, xz or bzip2; a
//! compressed single file is not an archive.

use bzip2::read::BzDecoder;
use flate2::read::GzDecoder;
use std::io::{self, Cursor, Read};
use std::path::{Path, PathBuf};
use xz2::read::XzDecoder;

/// Offset of the `ustar` magic in a tar header
const TAR_MAGIC_OFFSET: usize = 257;
const TAR_MAGIC: &[u8] = b"ustar";
const TAR_HEADER_PROBE: usize = TAR_MAGIC_OFFSET + 5;

const GZIP_MAGIC: &[u8] = &[0x1f, 0x8b];
const ZSTD_MAGIC: &[u8] = &[0x28, 0xb5, 0x2f, 0xfd];
const ZIP_MAGIC: &[u8] = b"PK\x03\x04";
const BZIP2_MAGIC: &[u8] = b"BZh";
const XZ_MAGIC: &[u8] = &[0xfd, b'7', b'z', b'X', b'Z', 0x00];
const SEVEN_ZIP_MAGIC: &[u8] = &[b'7', b'z', 0xbc, 0xaf, 0x27, 0x1c];
const RAR_MAGIC: &[u8] = b"Rar!\x1a\x07";

/// Archive formats that can be unpacked
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveFormat {
    Tar,
    TarGz,
    TarZstd,
    TarXz,
    TarBz2,
    Zip,
}

impl std::fmt::Display for ArchiveFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Tar => write!(f, "tar"),
            Self::TarGz => write!(f, "tar.gz"),
            Self::TarZstd => write!(f, "tar.zst"),
            Self::TarXz => write!(f, "tar.xz"),
            Self::TarBz2 => write!(f, "tar.bz2"),
            Self::Zip => write!(f, "zip"),
        }
    }
}

/// Outcome of identifying a content prefix
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Identification {
    /// An archive we can unpack
    Archive(ArchiveFormat),
    /// A recognised archive container we cannot unpack
    Unsupported(&'static str),
    /// No archive signature matched
    NoMatch,
}

/// Identify the archive format of a content prefix.
///
/// `complete` tells whether `prefix` is the whole content. Errors are only
/// returned when a compression signature matched but the data behind it
/// could not be decoded.
pub fn identify(prefix: &[u8], complete: bool) -> io::Result<Identification> {
    if prefix.starts_with(GZIP_MAGIC) {
        let header = decoded_prefix(GzDecoder::new(prefix), complete)?;
        return Ok(compressed_tar(&header, complete, ArchiveFormat::TarGz));
    }
    if prefix.starts_with(ZSTD_MAGIC) {
        let header = decoded_prefix(zstd::stream::read::Decoder::new(prefix)?, complete)?;
        return Ok(compressed_tar(&header, complete, ArchiveFormat::TarZstd));
    }
    if prefix.starts_with(XZ_MAGIC) {
        let header = decoded_prefix(XzDecoder::new(prefix), complete)?;
        return Ok(compressed_tar(&header, complete, ArchiveFormat::TarXz));
    }
    if prefix.starts_with(BZIP2_MAGIC) && prefix.len() > 3 && prefix[3].is_ascii_digit() {
        let header = decoded_prefix(BzDecoder::new(prefix), complete)?;
        return Ok(compressed_tar(&header, complete, ArchiveFormat::TarBz2));
    }
    if prefix.starts_with(ZIP_MAGIC) {
        return Ok(Identification::Archive(ArchiveFormat::Zip));
    }
    if prefix.starts_with(SEVEN_ZIP_MAGIC) {
        return Ok(Identification::Unsupported("7z"));
    }
    if prefix.starts_with(RAR_MAGIC) {
        return Ok(Identification::Unsupported("rar"));
    }
    Ok(tar_or_nothing(prefix, ArchiveFormat::Tar))
}

/// A compressed prefix that decoded to less than a tar header cannot be
/// told apart from a tar yet. bzip2 emits nothing before a whole block
/// (up to 900 KB) has been read, so this is the normal case for it.
fn compressed_tar(header: &[u8], complete: bool, format: ArchiveFormat) -> Identification {
    if header.len() < TAR_HEADER_PROBE && !complete {
        return Identification::Archive(format);
    }
    tar_or_nothing(header, format)
}

fn tar_or_nothing(header: &[u8], format: ArchiveFormat) -> Identification {
    if header.len() >= TAR_HEADER_PROBE && &header[TAR_MAGIC_OFFSET..TAR_HEADER_PROBE] == TAR_MAGIC {
        Identification::Archive(format)
    } else {
        Identification::NoMatch
    }
}

/// Decode just enough of a compressed prefix to look at a tar header.
///
/// A truncated stream is expected when the prefix is not the whole content
/// and is not an error.
fn decoded_prefix<R: Read>(mut decoder: R, complete: bool) -> io::Result<Vec<u8>> {
    let mut out = vec![0u8; TAR_HEADER_PROBE];
    let mut filled = 0;
    while filled < out.len() {
        match decoder.read(&mut out[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof && !complete => break,
            Err(e) => return Err(e),
        }
    }
    out.truncate(filled);
    Ok(out)
}

/// Unpack archive bytes into `dest`.
///
/// Entries that would land outside `dest` are skipped. Returns the regular
/// files written.
pub fn unpack(data: &[u8], format: ArchiveFormat, dest: &Path) -> io::Result<Vec<PathBuf>> {
    std::fs::create_dir_all(dest)?;
    match format {
        ArchiveFormat::Tar => unpack_tar(data, dest),
        ArchiveFormat::TarGz => unpack_tar(GzDecoder::new(data), dest),
        ArchiveFormat::TarZstd => unpack_tar(zstd::stream::read::Decoder::new(data)?, dest),
        ArchiveFormat::TarXz => unpack_tar(XzDecoder::new(data), dest),
        ArchiveFormat::TarBz2 => unpack_tar(BzDecoder::new(data), dest),
        ArchiveFormat::Zip => unpack_zip(data, dest),
    }
}

fn unpack_zip(data: &[u8], dest: &Path) -> io::Result<Vec<PathBuf>> {
    let mut archive = zip::ZipArchive::new(Cursor::new(data)).map_err(io::Error::other)?;
    let mut written = Vec::new();

    for index in 0..archive.len() {
        let mut entry = archive.by_index(index).map_err(io::Error::other)?;
        let Some(rel) = entry.enclosed_name() else {
            tracing::warn!(entry = entry.name(), "skipping zip entry outside the archive root");
            continue;
        };
        let path = dest.join(rel);

        if entry.is_dir() {
            std::fs::create_dir_all(&path)?;
            continue;
        }
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut file = std::fs::File::create(&path)?;
        io::copy(&mut entry, &mut file)?;
        written.push(path);
    }

    Ok(written)
}

fn unpack_tar<R: Read>(reader: R, dest: &Path) -> io::Result<Vec<PathBuf>> {
    let mut archive = tar::Archive::new(reader);
    let mut written = Vec::new();

    for entry in archive.entries()? {
        let mut entry = entry?;
        let is_file = entry.header().entry_type().is_file();
        let rel = entry.path()?.into_owned();
        if entry.unpack_in(dest)? && is_file {
            written.push(dest.join(rel));
        }
    }

    Ok(written)
}

/// Read a single named file out of a tar stream
pub fn read_entry<R: Read>(reader: R, file_name: &str) -> io::Result<Option<Vec<u8>>> {
    let mut archive = tar::Archive::new(reader);
    for entry in archive.entries()? {
        let mut entry = entry?;
        if !entry.header().entry_type().is_file() {
            continue;
        }
        let matches = entry
            .path()?
            .file_name()
            .is_some_and(|name| name == file_name);
        if matches {
            let mut content = Vec::new();
            entry.read_to_end(&mut content)?;
            return Ok(Some(content));
        }
    }
    Ok(None)
}
