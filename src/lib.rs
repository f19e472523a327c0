//! # Brick Stepper
//!
//! Load LDraw brick models and present them one build step at a time.
//!
//! ## Overview
//!
//! A model (`.ldr`, `.mpd`) references parts from the shared LDraw library.
//! This crate resolves and fetches those references, parses them into a
//! scene graph, groups the scene into build steps and drives the per-part
//! presentation: the current step solid, earlier steps as translucent
//! ghosts, later steps hidden. Colour themes, camera framing and offscreen
//! thumbnails work on the same scenes.
//!
//! ## Quick Start
//!
//! ```ignore
//! use brick_stepper::{HeadlessDevice, FileFetcher, ResourceCache, SceneLoader, StepperConfig, Viewer};
//! use std::sync::Arc;
//!
//! let config = StepperConfig::default().with_library_base("file:///opt/ldraw/");
//! let cache = ResourceCache::new(Arc::new(FileFetcher), Arc::new(HeadlessDevice::new()));
//! let mut viewer = Viewer::new(SceneLoader::new(cache, config));
//!
//! viewer.load(&url::Url::parse("file:///models/house.ldr")?).await;
//! viewer.set_step_mode(true);
//! viewer.next_step();
//! ```
//!
//! ## Concurrent loads
//!
//! A [`Viewer`] hands out a [`LoadTicket`] per load. Only the newest ticket's
//! result is shown; older results are discarded and their scenes disposed:
//!
//! ```ignore
//! let ticket = viewer.begin_load();
//! let result = viewer.loader().clone().load(&url, &ticket).await;
//! viewer.complete_load(&ticket, result);
//! ```

pub mod cache;
pub mod camera;
pub mod config;
pub mod device;
pub mod error;
pub mod format;
pub mod library;
pub mod scene;
pub mod steps;
pub mod thumbnail;
pub mod types;
pub mod viewer;

// Re-export main types for convenience
pub use cache::{CacheStats, ResourceCache};
pub use camera::{compute_bounds, fit, CameraConfig, CameraTransform, FitOptions};
pub use config::StepperConfig;
pub use device::{HeadlessDevice, RenderDevice};
pub use error::{ReferenceChain, Result, StepperError};
pub use format::{Directive, Document, Palette};
pub use library::{
    resolve, ArchiveFetcher, FileFetcher, Fetcher, LayeredFetcher, MemoryFetcher, PartReference,
    PartsBundle, ResolveContext,
};
pub use scene::{LoadProgress, LoadTicket, NodeId, Scene, SceneLoader, TicketIssuer};
pub use steps::{
    apply_highlight, apply_theme, clear_highlight, group_steps, layer_steps, revert_theme,
    BrickHighlight, ColorTheme, GhostStyle, LayeredSteps, NodeState, StepPlan, ThemeCatalog,
};
pub use thumbnail::{RenderOptions, Thumbnail, ThumbnailRenderer, ViewAngle};
pub use types::{BoundingBox, Color};
pub use viewer::{LoadOutcome, Viewer, ViewerStatus};
