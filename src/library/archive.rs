//! Serving the parts library from a ZIP archive (`complete.zip`).
//!
//! The official distribution wraps everything in a top-level `ldraw/`
//! directory; entries are indexed relative to it, lower-cased, so that
//! `ldraw/parts/3001.dat` answers `{base}parts/3001.dat`.

use super::fetch::{not_found, Fetcher};
use crate::error::{ResourceError, Result};
use futures::future::{self, BoxFuture, FutureExt};
use std::collections::HashMap;
use std::io::Read;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};
use url::Url;

/// File extensions worth keeping from the archive.
const LIBRARY_EXTENSIONS: &[&str] = &[".dat", ".ldr", ".mpd"];

/// An in-memory index of a zipped parts library, mounted at a base URL.
pub struct ArchiveFetcher {
    base: Url,
    entries: HashMap<String, Arc<Vec<u8>>>,
}

impl ArchiveFetcher {
    /// Read an archive from disk.
    pub fn open<P: AsRef<Path>>(path: P, base: Url) -> Result<Self> {
        let data = std::fs::read(path)?;
        Self::from_bytes(&data, base)
    }

    /// Index archive bytes.
    pub fn from_bytes(data: &[u8], base: Url) -> Result<Self> {
        let cursor = std::io::Cursor::new(data);
        let mut archive = zip::ZipArchive::new(cursor)?;
        let mut entries = HashMap::new();

        for i in 0..archive.len() {
            let mut file = archive.by_index(i)?;
            if file.is_dir() {
                continue;
            }

            let name = file.name().replace('\\', "/").to_ascii_lowercase();
            if !LIBRARY_EXTENSIONS.iter().any(|ext| name.ends_with(ext)) {
                continue;
            }
            let relative = name.strip_prefix("ldraw/").unwrap_or(&name).to_string();

            let mut contents = Vec::new();
            file.read_to_end(&mut contents)?;
            entries.insert(relative, Arc::new(contents));
        }

        info!("indexed {} library files from archive", entries.len());
        Ok(Self { base, entries })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Archive path of a URL under the mount point.
    fn entry_name(&self, url: &Url) -> Option<String> {
        url.as_str()
            .strip_prefix(self.base.as_str())
            .map(|rest| rest.to_ascii_lowercase())
    }
}

impl Fetcher for ArchiveFetcher {
    fn fetch(&self, url: &Url) -> BoxFuture<'static, std::result::Result<Vec<u8>, ResourceError>> {
        let result = match self.entry_name(url) {
            Some(name) => match self.entries.get(&name) {
                Some(bytes) => Ok(bytes.as_ref().clone()),
                None => {
                    debug!("{} not in archive", name);
                    Err(not_found(url))
                }
            },
            None => Err(not_found(url)),
        };
        future::ready(result).boxed()
    }
}
