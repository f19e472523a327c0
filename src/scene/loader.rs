//! Loading models into scenes.
//!
//! Loading runs in two phases. First every document the model needs is
//! fetched: the root, then the transitive closure of its references, with
//! all requests of a wave in flight at once and each one deduplicated
//! through the cache. Then the scene is built synchronously from the
//! fetched documents.
//!
//! A load belongs to a [`LoadTicket`]. Once a newer ticket is issued from
//! the same [`TicketIssuer`], the old load stops at its next checkpoint with
//! [`StepperError::Superseded`].

use super::builder::{locate, Builder, Target};
use super::Scene;
use crate::cache::ResourceCache;
use crate::config::StepperConfig;
use crate::error::{ReferenceChain, ResourceError, Result, StepperError};
use crate::format::Document;
use crate::library::bundle::bundle_url_for;
use crate::library::{resolver::proxied, ResolveContext};
use futures::future::{BoxFuture, FutureExt};
use futures::stream::{FuturesUnordered, StreamExt};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info};
use url::Url;

/// Load progress, reported after each resource arrives.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoadProgress {
    pub resources_loaded: usize,
    pub resources_requested: usize,
    pub bytes_loaded: usize,
}

impl LoadProgress {
    /// Completed fraction, 0.0 to 1.0.
    pub fn fraction(&self) -> f32 {
        if self.resources_requested == 0 {
            0.0
        } else {
            self.resources_loaded as f32 / self.resources_requested as f32
        }
    }
}

type ProgressCallback = Arc<dyn Fn(LoadProgress) + Send + Sync>;

/// Identifies one load within a viewer slot.
#[derive(Debug, Clone)]
pub struct LoadTicket {
    generation: u64,
    latest: Arc<AtomicU64>,
}

impl LoadTicket {
    /// A ticket no other load can supersede.
    pub fn standalone() -> Self {
        TicketIssuer::new().issue()
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Whether no newer ticket has been issued.
    pub fn is_current(&self) -> bool {
        self.latest.load(Ordering::SeqCst) == self.generation
    }

    pub fn check(&self) -> Result<()> {
        if self.is_current() {
            Ok(())
        } else {
            Err(StepperError::Superseded {
                generation: self.generation,
            })
        }
    }
}

/// Issues strictly increasing tickets for one viewer slot.
#[derive(Debug, Clone, Default)]
pub struct TicketIssuer {
    latest: Arc<AtomicU64>,
}

impl TicketIssuer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Issue the next ticket, superseding every earlier one.
    pub fn issue(&self) -> LoadTicket {
        let generation = self.latest.fetch_add(1, Ordering::SeqCst) + 1;
        LoadTicket {
            generation,
            latest: self.latest.clone(),
        }
    }

    /// Supersede every issued ticket without starting a new load.
    pub fn invalidate(&self) {
        self.latest.fetch_add(1, Ordering::SeqCst);
    }

    pub fn latest(&self) -> u64 {
        self.latest.load(Ordering::SeqCst)
    }
}

type Arrival = (Url, ReferenceChain, std::result::Result<Arc<Document>, ResourceError>);

/// Where the root document of a load comes from.
enum RootSource<'a> {
    /// Fetched from the root URL.
    Fetch,
    /// Already in memory.
    Text(&'a str),
    /// In memory, served for references to `url`.
    Override { url: &'a Url, text: &'a str },
}

/// Builds scenes from model URLs or text.
#[derive(Clone)]
pub struct SceneLoader {
    cache: ResourceCache,
    config: StepperConfig,
    progress: Option<ProgressCallback>,
}

impl SceneLoader {
    pub fn new(cache: ResourceCache, config: StepperConfig) -> Self {
        Self {
            cache,
            config,
            progress: None,
        }
    }

    /// Receive a [`LoadProgress`] after every fetched resource.
    pub fn with_progress<F>(mut self, callback: F) -> Self
    where
        F: Fn(LoadProgress) + Send + Sync + 'static,
    {
        self.progress = Some(Arc::new(callback));
        self
    }

    pub fn cache(&self) -> &ResourceCache {
        &self.cache
    }

    pub fn config(&self) -> &StepperConfig {
        &self.config
    }

    /// Fetch a model and everything it references, and build its scene.
    ///
    /// A parts bundle lying next to the model is loaded into the cache
    /// first, when there is one.
    pub async fn load(&self, root_url: &Url, ticket: &LoadTicket) -> Result<Scene> {
        self.load_root(root_url, RootSource::Fetch, ticket).await
    }

    /// Build a scene from model text that is already in memory.
    ///
    /// `root_url` is used to resolve relative model references.
    pub async fn load_text(&self, root_url: &Url, text: &str, ticket: &LoadTicket) -> Result<Scene> {
        self.load_root(root_url, RootSource::Text(text), ticket).await
    }

    /// Like [`load_text`](Self::load_text), but references to the model's
    /// own URL are served from `text` instead of being fetched. The text is
    /// cached under `override_url` for as long as the scene lives.
    pub async fn load_override(
        &self,
        main_url: &Url,
        override_url: &Url,
        text: &str,
        ticket: &LoadTicket,
    ) -> Result<Scene> {
        let source = RootSource::Override {
            url: override_url,
            text,
        };
        self.load_root(main_url, source, ticket).await
    }

    async fn load_root(&self, root_url: &Url, source: RootSource<'_>, ticket: &LoadTicket) -> Result<Scene> {
        ticket.check()?;
        let mut ctx = self.config.resolve_context()?.with_main_model(root_url.clone());
        if let RootSource::Override { url, .. } = &source {
            ctx = ctx.with_override((*url).clone());
        }
        if !matches!(source, RootSource::Text(_)) {
            self.preload_bundle(root_url, &ctx).await;
        }

        let palette_url = self.palette_url(&ctx)?;
        let palette = self.cache.acquire_palette(&palette_url).await;
        // from here on the scene owns the palette and document references,
        // and releases them if the load fails
        let mut scene = Scene::new(
            ticket.generation(),
            self.cache.clone(),
            palette,
            palette_url.to_string(),
        );

        let root_chain = ReferenceChain::new(display_name(root_url));
        let root = match source {
            RootSource::Fetch => self.acquire(&mut scene, root_url, &root_chain).await?,
            RootSource::Text(text) => Arc::new(
                Document::parse(root_url.as_str(), text)
                    .map_err(|e| StepperError::from_resource(e, root_chain.clone()))?,
            ),
            RootSource::Override { url, text } => {
                self.cache
                    .stage_text(url, text)
                    .map_err(|e| StepperError::from_resource(e, root_chain.clone()))?;
                self.acquire(&mut scene, url, &root_chain).await?
            }
        };

        let documents = self.fetch_closure(&mut scene, &root, &ctx, ticket).await?;
        ticket.check()?;

        Builder::new(
            &mut scene,
            &self.cache,
            &root,
            &documents,
            &ctx,
            self.config.max_reference_depth,
        )
        .build()?;

        info!(
            "loaded {} ({} nodes, {} triangles, generation {})",
            root_url,
            scene.len(),
            scene.triangle_count(),
            scene.generation()
        );
        Ok(scene)
    }

    /// Fetch a document into the scene's keeping.
    async fn acquire(&self, scene: &mut Scene, url: &Url, chain: &ReferenceChain) -> Result<Arc<Document>> {
        let document = self
            .cache
            .acquire_document(url)
            .await
            .map_err(|e| StepperError::from_resource(e, chain.clone()))?;
        scene.hold_document(url.to_string());
        Ok(document)
    }

    async fn preload_bundle(&self, root_url: &Url, ctx: &ResolveContext) {
        let Some(bundle_url) = bundle_url_for(root_url) else {
            return;
        };
        let seeded = self.cache.load_bundle(&bundle_url, ctx).await;
        if seeded > 0 {
            debug!("seeded {} files from {}", seeded, bundle_url);
        }
    }

    fn palette_url(&self, ctx: &ResolveContext) -> Result<Url> {
        let url = self.config.palette_url()?;
        Ok(match &ctx.proxy_endpoint {
            Some(endpoint) => proxied(endpoint, &url),
            None => url,
        })
    }

    /// Fetch every external document reachable from the root.
    async fn fetch_closure(
        &self,
        scene: &mut Scene,
        root: &Arc<Document>,
        ctx: &ResolveContext,
        ticket: &LoadTicket,
    ) -> Result<HashMap<String, Arc<Document>>> {
        let mut documents = HashMap::new();
        let mut requested = HashSet::new();
        let mut pending: FuturesUnordered<BoxFuture<'static, Arrival>> = FuturesUnordered::new();
        let mut progress = LoadProgress {
            resources_loaded: 1,
            resources_requested: 1,
            bytes_loaded: root.size,
        };

        let root_chain = ReferenceChain::new(root.main().name.clone());
        self.enqueue_references(root, root, &root_chain, ctx, &mut requested, &mut pending)?;
        progress.resources_requested += pending.len();
        self.report(progress);

        while let Some((url, chain, result)) = pending.next().await {
            let document = result.map_err(|e| StepperError::from_resource(e, chain.clone()))?;
            scene.hold_document(url.to_string());
            ticket.check()?;

            let before = pending.len();
            self.enqueue_references(&document, root, &chain, ctx, &mut requested, &mut pending)?;
            progress.resources_requested += pending.len() - before;
            progress.resources_loaded += 1;
            progress.bytes_loaded += document.size;
            self.report(progress);

            documents.insert(url.to_string(), document);
        }

        debug!("fetched {} referenced documents", documents.len());
        Ok(documents)
    }

    /// Queue fetches for the not yet requested external references of a
    /// document. Embedded files are scanned in place.
    fn enqueue_references(
        &self,
        document: &Arc<Document>,
        root: &Arc<Document>,
        chain: &ReferenceChain,
        ctx: &ResolveContext,
        requested: &mut HashSet<String>,
        pending: &mut FuturesUnordered<BoxFuture<'static, Arrival>>,
    ) -> Result<()> {
        for file in &document.files {
            for reference in file.references() {
                let link = chain.with(reference.name.replace('\\', "/"));
                if link.len() > self.config.max_reference_depth {
                    return Err(StepperError::ReferenceTooDeep { chain: link });
                }
                let Target::External(url) = locate(&reference.name, document, root, ctx) else {
                    continue;
                };
                if !requested.insert(url.to_string()) {
                    continue;
                }
                let cache = self.cache.clone();
                pending.push(
                    async move {
                        let result = cache.acquire_document(&url).await;
                        (url, link, result)
                    }
                    .boxed(),
                );
            }
        }
        Ok(())
    }

    fn report(&self, progress: LoadProgress) {
        if let Some(callback) = &self.progress {
            callback(progress);
        }
    }
}

/// Last path segment of a URL, for error chains.
fn display_name(url: &Url) -> String {
    url.path_segments()
        .and_then(|mut segments| segments.next_back().map(str::to_string))
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| url.to_string())
}
