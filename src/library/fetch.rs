//! Byte sources for library and model files.
//!
//! The loader never talks to the network itself; it asks a [`Fetcher`] for
//! the bytes behind a URL. Fetchers are shared between concurrent loads and
//! return `'static` futures so requests can be deduplicated and awaited from
//! several places.

use crate::error::ResourceError;
use futures::future::{self, BoxFuture, FutureExt};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::debug;
use url::Url;

/// A source of resource bytes.
pub trait Fetcher: Send + Sync {
    fn fetch(&self, url: &Url) -> BoxFuture<'static, Result<Vec<u8>, ResourceError>>;
}

pub(crate) fn not_found(url: &Url) -> ResourceError {
    ResourceError::Fetch {
        url: url.to_string(),
        reason: "not found".to_string(),
    }
}

/// Serves resources from an in-memory map. Counts every request.
#[derive(Default)]
pub struct MemoryFetcher {
    files: Mutex<HashMap<String, Arc<Vec<u8>>>>,
    requests: AtomicUsize,
}

impl MemoryFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert of a text resource.
    pub fn with(self, url: &str, text: &str) -> Self {
        self.insert(url, text.as_bytes().to_vec());
        self
    }

    pub fn insert(&self, url: &str, bytes: Vec<u8>) {
        self.files.lock().insert(url.to_string(), Arc::new(bytes));
    }

    /// Number of fetches issued so far, including failed ones.
    pub fn request_count(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }
}

impl Fetcher for MemoryFetcher {
    fn fetch(&self, url: &Url) -> BoxFuture<'static, Result<Vec<u8>, ResourceError>> {
        self.requests.fetch_add(1, Ordering::SeqCst);
        let result = self
            .files
            .lock()
            .get(url.as_str())
            .map(|bytes| bytes.as_ref().clone())
            .ok_or_else(|| not_found(url));
        future::ready(result).boxed()
    }
}

/// Reads `file://` URLs from the local filesystem.
#[derive(Debug, Default, Clone, Copy)]
pub struct FileFetcher;

impl Fetcher for FileFetcher {
    fn fetch(&self, url: &Url) -> BoxFuture<'static, Result<Vec<u8>, ResourceError>> {
        let url = url.clone();
        async move {
            let path = url.to_file_path().map_err(|_| ResourceError::Fetch {
                url: url.to_string(),
                reason: "not a local file URL".to_string(),
            })?;
            debug!("reading {}", path.display());
            tokio::fs::read(&path)
                .await
                .map_err(|e| ResourceError::Fetch {
                    url: url.to_string(),
                    reason: e.to_string(),
                })
        }
        .boxed()
    }
}

/// Tries each fetcher in order and returns the first success.
///
/// When all fail, the error of the last one is reported.
pub struct LayeredFetcher {
    layers: Vec<Arc<dyn Fetcher>>,
}

impl LayeredFetcher {
    pub fn new(layers: Vec<Arc<dyn Fetcher>>) -> Self {
        Self { layers }
    }
}

impl Fetcher for LayeredFetcher {
    fn fetch(&self, url: &Url) -> BoxFuture<'static, Result<Vec<u8>, ResourceError>> {
        let layers = self.layers.clone();
        let url = url.clone();
        async move {
            let mut last = not_found(&url);
            for layer in layers {
                match layer.fetch(&url).await {
                    Ok(bytes) => return Ok(bytes),
                    Err(e) => last = e,
                }
            }
            Err(last)
        }
        .boxed()
    }
}
