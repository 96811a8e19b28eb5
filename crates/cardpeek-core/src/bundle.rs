//! The embedded archive of default environment files.
//!
//! The archive is generated at build time from `assets/dot_cardpeek/` and its
//! entries are rooted at `.cardpeek/`, so extracting it into the home
//! directory populates the state directory.

use crate::{CardpeekError, Result};
use flate2::read::GzDecoder;
use std::borrow::Cow;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use tracing::debug;

static EMBEDDED: &[u8] = include_bytes!(concat!(env!("OUT_DIR"), "/dot_cardpeek.tar.gz"));

/// Read-only gzip'd tar archive addressed by a fixed logical name.
#[derive(Debug, Clone)]
pub struct AssetBundle {
    name: Cow<'static, str>,
    bytes: Cow<'static, [u8]>,
}

impl AssetBundle {
    pub const NAME: &'static str = "dot_cardpeek.tar.gz";

    /// The bundle compiled into this program.
    pub fn embedded() -> Self {
        Self {
            name: Cow::Borrowed(Self::NAME),
            bytes: Cow::Borrowed(EMBEDDED),
        }
    }

    /// A bundle built at runtime, mostly useful for tests.
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self {
            name: Cow::Borrowed(Self::NAME),
            bytes: Cow::Owned(bytes),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Archive content. An empty blob means the bundle was not built in.
    pub fn bytes(&self) -> Result<&[u8]> {
        if self.bytes.is_empty() {
            return Err(CardpeekError::AssetMissing {
                name: self.name.to_string(),
            });
        }
        Ok(&self.bytes)
    }
}

/// Unpacks an archive file into a directory.
pub trait Extractor {
    /// Returns the number of regular files written.
    fn extract(&self, archive: &Path, dest: &Path) -> Result<usize>;
}

/// Extractor for `.tar.gz` archives.
#[derive(Debug, Default, Clone, Copy)]
pub struct TarGzExtractor;

impl Extractor for TarGzExtractor {
    fn extract(&self, archive_path: &Path, dest: &Path) -> Result<usize> {
        let file = File::open(archive_path)
            .map_err(|e| CardpeekError::io_with_path(e, archive_path))?;

        let decoder = GzDecoder::new(BufReader::new(file));
        let mut archive = tar::Archive::new(decoder);
        let extraction_error = |e: std::io::Error| CardpeekError::Extraction {
            archive: archive_path.to_path_buf(),
            message: e.to_string(),
        };

        let mut files = 0;
        for entry in archive.entries().map_err(extraction_error)? {
            let mut entry = entry.map_err(extraction_error)?;
            let is_file = entry.header().entry_type().is_file();
            let path = entry.path().map_err(extraction_error)?.into_owned();

            // unpack_in refuses entries that would escape `dest`.
            let unpacked = entry.unpack_in(dest).map_err(extraction_error)?;
            if !unpacked {
                return Err(CardpeekError::Extraction {
                    archive: archive_path.to_path_buf(),
                    message: format!("entry escapes destination: {}", path.display()),
                });
            }

            if is_file {
                debug!("Extracted {}", path.display());
                files += 1;
            }
        }

        Ok(files)
    }
}
