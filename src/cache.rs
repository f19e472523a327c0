//! Shared resource cache.
//!
//! One [`ResourceCache`] is shared by every viewer and thumbnail renderer of
//! an application. It deduplicates fetches (two loads asking for the same
//! primitive at the same time wait on one request), memoizes parsed
//! documents, and reference-counts the things scenes hold on to: parsed
//! documents, flattened part geometry with its GPU upload, and palettes.
//!
//! Locks are never held across an `.await`.

use crate::device::{GeometryHandle, RenderDevice};
use crate::error::{ResourceError, Result};
use crate::format::{Document, Palette};
use crate::library::{Fetcher, PartsBundle, ResolveContext};
use crate::scene::PartGeometry;
use futures::future::{self, BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};
use url::Url;

type DocumentFuture = Shared<BoxFuture<'static, std::result::Result<Arc<Document>, ResourceError>>>;

/// A counted reference to cached part geometry.
#[derive(Debug, Clone)]
pub struct SharedGeometry {
    pub key: String,
    pub geometry: Arc<PartGeometry>,
    pub handle: GeometryHandle,
}

struct DocumentEntry {
    /// Distinguishes this entry from later ones under the same key.
    id: u64,
    pending: DocumentFuture,
    refs: usize,
    /// Seeded text that outlives its references.
    pinned: bool,
}

struct GeometryEntry {
    geometry: Arc<PartGeometry>,
    handle: GeometryHandle,
    refs: usize,
}

struct PaletteEntry {
    palette: Arc<Palette>,
    refs: usize,
}

/// A document reference taken before its request finished. Given back if
/// the acquiring future is dropped mid-flight.
struct Claim<'a> {
    cache: &'a ResourceCache,
    key: &'a str,
    id: u64,
    settled: bool,
}

impl Drop for Claim<'_> {
    fn drop(&mut self) {
        if !self.settled {
            self.cache.abandon(self.key, self.id, None);
        }
    }
}

/// Counters for diagnostics and tests.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Requests actually sent to the fetcher.
    pub fetches: usize,
    pub documents: usize,
    pub geometries: usize,
    pub palettes: usize,
}

struct CacheInner {
    fetcher: Arc<dyn Fetcher>,
    device: Arc<dyn RenderDevice>,
    documents: Mutex<HashMap<String, DocumentEntry>>,
    geometries: Mutex<HashMap<String, GeometryEntry>>,
    palettes: Mutex<HashMap<String, PaletteEntry>>,
    /// Bundle URLs already tried.
    bundles: Mutex<HashSet<String>>,
    next_document: AtomicU64,
    fetches: AtomicUsize,
}

/// Cheaply clonable handle to the shared cache.
#[derive(Clone)]
pub struct ResourceCache {
    inner: Arc<CacheInner>,
}

impl ResourceCache {
    pub fn new(fetcher: Arc<dyn Fetcher>, device: Arc<dyn RenderDevice>) -> Self {
        Self {
            inner: Arc::new(CacheInner {
                fetcher,
                device,
                documents: Mutex::new(HashMap::new()),
                geometries: Mutex::new(HashMap::new()),
                palettes: Mutex::new(HashMap::new()),
                bundles: Mutex::new(HashSet::new()),
                next_document: AtomicU64::new(0),
                fetches: AtomicUsize::new(0),
            }),
        }
    }

    pub fn device(&self) -> &Arc<dyn RenderDevice> {
        &self.inner.device
    }

    /// Take a counted reference to a document, fetching and parsing it on
    /// first use.
    ///
    /// Concurrent callers for the same URL share one request. Failures are
    /// not memoized, so a later load retries. Every successful call must be
    /// paired with a [`release_document`](Self::release_document).
    pub async fn acquire_document(&self, url: &Url) -> std::result::Result<Arc<Document>, ResourceError> {
        let key = url.as_str().to_string();
        let (id, pending) = {
            let mut documents = self.inner.documents.lock();
            let entry = documents.entry(key.clone()).or_insert_with(|| {
                debug!("fetching {}", key);
                self.inner.fetches.fetch_add(1, Ordering::SeqCst);
                let request = self.inner.fetcher.fetch(url);
                let source = key.clone();
                let pending = async move {
                    let bytes = request.await?;
                    let text = String::from_utf8_lossy(&bytes);
                    Document::parse(&source, &text).map(Arc::new)
                }
                .boxed()
                .shared();
                DocumentEntry {
                    id: self.inner.next_document.fetch_add(1, Ordering::SeqCst),
                    pending,
                    refs: 0,
                    pinned: false,
                }
            });
            entry.refs += 1;
            (entry.id, entry.pending.clone())
        };

        let mut claim = Claim {
            cache: self,
            key: &key,
            id,
            settled: false,
        };
        let result = pending.clone().await;
        claim.settled = true;
        if result.is_err() {
            self.abandon(&key, id, Some(&pending));
        }
        result
    }

    /// Undo the reference taken by an acquire that did not succeed.
    ///
    /// Only touches the entry the acquire joined; a retry may already sit
    /// under the same key. A failed request is evicted outright.
    fn abandon(&self, key: &str, id: u64, failed: Option<&DocumentFuture>) {
        let mut documents = self.inner.documents.lock();
        let Some(entry) = documents.get_mut(key).filter(|entry| entry.id == id) else {
            return;
        };
        let evict = if failed.is_some_and(|f| entry.pending.ptr_eq(f)) {
            true
        } else {
            entry.refs = entry.refs.saturating_sub(1);
            entry.refs == 0 && !entry.pinned
        };
        if evict {
            documents.remove(key);
        }
    }

    /// Drop one reference to a document. Unreferenced documents are
    /// evicted unless they were seeded with [`insert_text`](Self::insert_text).
    pub fn release_document(&self, key: &str) {
        let mut documents = self.inner.documents.lock();
        let Some(entry) = documents.get_mut(key) else {
            return;
        };
        entry.refs = entry.refs.saturating_sub(1);
        if entry.refs == 0 && !entry.pinned {
            debug!("evicting document {}", key);
            documents.remove(key);
        }
    }

    /// Current reference count of a document (0 when absent).
    pub fn document_refs(&self, key: &str) -> usize {
        self.inner
            .documents
            .lock()
            .get(key)
            .map_or(0, |entry| entry.refs)
    }

    /// Whether a document for the URL is memoized or in flight.
    pub fn contains(&self, url: &Url) -> bool {
        self.inner.documents.lock().contains_key(url.as_str())
    }

    /// Seed the cache with document text, as if it had been fetched. The
    /// document stays cached while unreferenced.
    pub fn insert_text(&self, url: &Url, text: &str) -> std::result::Result<(), ResourceError> {
        self.seed(url, text, true)
    }

    /// Seed document text that lives only as long as its references.
    pub(crate) fn stage_text(&self, url: &Url, text: &str) -> std::result::Result<(), ResourceError> {
        self.seed(url, text, false)
    }

    fn seed(&self, url: &Url, text: &str, pinned: bool) -> std::result::Result<(), ResourceError> {
        let document = Arc::new(Document::parse(url.as_str(), text)?);
        let ready: BoxFuture<'static, _> = future::ready(Ok(document)).boxed();
        let ready = ready.shared();
        let mut documents = self.inner.documents.lock();
        let entry = documents
            .entry(url.as_str().to_string())
            .or_insert_with(|| DocumentEntry {
                id: self.inner.next_document.fetch_add(1, Ordering::SeqCst),
                pending: ready.clone(),
                refs: 0,
                pinned,
            });
        // replacing keeps the references of scenes built from the old text
        entry.pending = ready;
        entry.pinned |= pinned;
        Ok(())
    }

    /// Seed the cache from a parts bundle. Returns the number of files added.
    ///
    /// Files that fail to parse are skipped with a warning; the loader will
    /// try to fetch them normally.
    pub fn preload_bundle(&self, bundle: &PartsBundle, ctx: &ResolveContext) -> usize {
        let mut added = 0;
        for (url, text) in bundle.entries(ctx) {
            match self.insert_text(&url, text) {
                Ok(()) => added += 1,
                Err(e) => warn!("skipping bundled file: {}", e),
            }
        }
        info!("preloaded {} bundled files (bundle version {})", added, bundle.version);
        added
    }

    /// Fetch the parts bundle at `url` and seed the cache from it.
    ///
    /// Each bundle URL is tried once per cache; a missing or unreadable
    /// bundle is not an error, the library is then fetched file by file.
    pub async fn load_bundle(&self, url: &Url, ctx: &ResolveContext) -> usize {
        if !self.inner.bundles.lock().insert(url.as_str().to_string()) {
            return 0;
        }
        self.inner.fetches.fetch_add(1, Ordering::SeqCst);
        let bytes = match self.inner.fetcher.fetch(url).await {
            Ok(bytes) => bytes,
            Err(e) => {
                debug!("no parts bundle: {}", e);
                return 0;
            }
        };
        match PartsBundle::from_json(&String::from_utf8_lossy(&bytes)) {
            Ok(bundle) => self.preload_bundle(&bundle, ctx),
            Err(e) => {
                warn!("ignoring unreadable parts bundle {}: {}", url, e);
                0
            }
        }
    }

    /// Take a counted reference to a palette, loading it on first use.
    ///
    /// A palette that cannot be loaded degrades to an empty one (every
    /// colour falls back to grey) rather than failing the model.
    pub async fn acquire_palette(&self, url: &Url) -> Arc<Palette> {
        let key = url.as_str();
        if let Some(entry) = self.inner.palettes.lock().get_mut(key) {
            entry.refs += 1;
            return entry.palette.clone();
        }

        let palette = match self.acquire_document(url).await {
            Ok(document) => {
                let palette = Palette::from_document(&document);
                self.release_document(key);
                palette
            }
            Err(e) => {
                warn!("palette unavailable, colours will fall back to grey: {}", e);
                Palette::new()
            }
        };

        let mut palettes = self.inner.palettes.lock();
        let entry = palettes.entry(key.to_string()).or_insert_with(|| PaletteEntry {
            palette: Arc::new(palette),
            refs: 0,
        });
        entry.refs += 1;
        entry.palette.clone()
    }

    pub fn release_palette(&self, url: &str) {
        let mut palettes = self.inner.palettes.lock();
        if let Some(entry) = palettes.get_mut(url) {
            entry.refs = entry.refs.saturating_sub(1);
            if entry.refs == 0 {
                palettes.remove(url);
            }
        }
    }

    /// Take a counted reference to part geometry, building and uploading it
    /// on first use.
    pub fn acquire_geometry<F>(&self, key: &str, build: F) -> Result<SharedGeometry>
    where
        F: FnOnce() -> Result<PartGeometry>,
    {
        if let Some(entry) = self.inner.geometries.lock().get_mut(key) {
            entry.refs += 1;
            return Ok(SharedGeometry {
                key: key.to_string(),
                geometry: entry.geometry.clone(),
                handle: entry.handle,
            });
        }

        let geometry = Arc::new(build()?);

        let mut geometries = self.inner.geometries.lock();
        let entry = geometries.entry(key.to_string()).or_insert_with(|| GeometryEntry {
            handle: self.inner.device.create_geometry(&geometry),
            geometry,
            refs: 0,
        });
        entry.refs += 1;
        Ok(SharedGeometry {
            key: key.to_string(),
            geometry: entry.geometry.clone(),
            handle: entry.handle,
        })
    }

    /// Drop one reference; the GPU upload is destroyed with the last one.
    pub fn release_geometry(&self, key: &str) {
        let mut geometries = self.inner.geometries.lock();
        let Some(entry) = geometries.get_mut(key) else {
            warn!("released unknown geometry {}", key);
            return;
        };
        entry.refs = entry.refs.saturating_sub(1);
        if entry.refs == 0 {
            if let Some(entry) = geometries.remove(key) {
                debug!("destroying geometry {}", key);
                self.inner.device.destroy_geometry(entry.handle);
            }
        }
    }

    /// Current reference count of cached geometry (0 when absent).
    pub fn geometry_refs(&self, key: &str) -> usize {
        self.inner
            .geometries
            .lock()
            .get(key)
            .map_or(0, |entry| entry.refs)
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            fetches: self.inner.fetches.load(Ordering::SeqCst),
            documents: self.inner.documents.lock().len(),
            geometries: self.inner.geometries.lock().len(),
            palettes: self.inner.palettes.lock().len(),
        }
    }
}

impl std::fmt::Debug for ResourceCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourceCache")
            .field("stats", &self.stats())
            .finish()
    }
}
