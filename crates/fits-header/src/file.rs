//! Exposure files on disk.

use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::error::Result;
use crate::header::FitsHeader;

/// An exposure file with its primary header and content digest.
#[derive(Debug, Clone)]
pub struct FitsFile {
    pub path: PathBuf,
    pub header: FitsHeader,
    /// File size in bytes.
    pub size: u64,
    /// SHA-256 of the whole file, lowercase hex.
    pub checksum: String,
}

impl FitsFile {
    /// Read the header and digest the file content.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let header = read_primary_header(path)?;
        let (size, checksum) = digest(path)?;
        debug!(path = %path.display(), cards = header.len(), size, "Read FITS header");
        Ok(Self {
            path: path.to_path_buf(),
            header,
            size,
            checksum,
        })
    }

    /// File name without directories.
    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    /// File name without the `.fits` extension.
    pub fn product_id(&self) -> String {
        self.path
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}

/// Read only the primary header of a file.
pub fn read_primary_header(path: impl AsRef<Path>) -> Result<FitsHeader> {
    let mut reader = BufReader::new(File::open(path.as_ref())?);
    FitsHeader::read_from(&mut reader)
}

fn digest(path: &Path) -> Result<(u64, String)> {
    let mut reader = BufReader::new(File::open(path)?);
    let mut hasher = Sha256::new();
    let mut buffer = [0u8; 64 * 1024];
    let mut size = 0u64;
    loop {
        let n = reader.read(&mut buffer)?;
        if n == 0 {
            break;
        }
        hasher.update(&buffer[..n]);
        size += n as u64;
    }
    Ok((size, hex::encode(hasher.finalize())))
}
