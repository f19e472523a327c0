//! One viewer slot: the current scene, its step plan and the camera.
//!
//! Loads are split into [`Viewer::begin_load`], which hands out a ticket,
//! and [`Viewer::complete_load`], which accepts the finished scene only if
//! its ticket is still the newest. The fetch in between runs on a cloned
//! [`SceneLoader`], so several loads may be in flight; whichever was started
//! last wins and everything older is dropped (and so disposed) on arrival.

use crate::camera::{fit, visible_bounds, CameraTransform, FitOptions};
use crate::config::StepperConfig;
use crate::error::Result;
use crate::scene::{LoadTicket, Scene, SceneLoader, TicketIssuer};
use crate::steps::{self, group_steps, BrickHighlight, ColorTheme, MaterialPlan, StepPlan};
use crate::types::BoundingBox;
use tracing::{debug, info, warn};
use url::Url;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ViewerStatus {
    Idle,
    Loading { generation: u64 },
    Ready,
    Failed { message: String },
}

/// What happened to a finished load.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadOutcome {
    Applied,
    /// A newer load was started meanwhile.
    Discarded,
}

pub struct Viewer {
    loader: SceneLoader,
    tickets: TicketIssuer,
    scene: Option<Scene>,
    steps: Option<StepPlan>,
    step_index: usize,
    step_mode: bool,
    theme: Option<ColorTheme>,
    highlight: Option<BrickHighlight>,
    fit_options: FitOptions,
    aspect: f32,
    camera: CameraTransform,
    status: ViewerStatus,
}

impl Viewer {
    pub fn new(loader: SceneLoader) -> Self {
        let camera = fit(
            &BoundingBox::degenerate(),
            loader.config().fit_margin,
            &loader.config().camera,
            1.0,
        );
        Self {
            loader,
            tickets: TicketIssuer::new(),
            scene: None,
            steps: None,
            step_index: 0,
            step_mode: false,
            theme: None,
            highlight: None,
            fit_options: FitOptions::default(),
            aspect: 1.0,
            camera,
            status: ViewerStatus::Idle,
        }
    }

    pub fn with_aspect(mut self, aspect: f32) -> Self {
        self.aspect = aspect;
        self
    }

    pub fn loader(&self) -> &SceneLoader {
        &self.loader
    }

    fn config(&self) -> &StepperConfig {
        self.loader.config()
    }

    /// Start a load; every earlier ticket becomes stale.
    pub fn begin_load(&mut self) -> LoadTicket {
        let ticket = self.tickets.issue();
        self.status = ViewerStatus::Loading {
            generation: ticket.generation(),
        };
        ticket
    }

    /// Accept the result of a load started with `ticket`.
    pub fn complete_load(&mut self, ticket: &LoadTicket, result: Result<Scene>) -> LoadOutcome {
        if !ticket.is_current() {
            debug!(
                "discarding load {} (latest is {})",
                ticket.generation(),
                self.tickets.latest()
            );
            return LoadOutcome::Discarded;
        }

        match result {
            Ok(scene) => {
                info!(
                    "showing scene {} ({} nodes, {} triangles)",
                    scene.generation(),
                    scene.len(),
                    scene.triangle_count()
                );
                self.replace_scene(Some(scene));
                self.status = ViewerStatus::Ready;
                LoadOutcome::Applied
            }
            Err(e) if e.is_superseded() => LoadOutcome::Discarded,
            Err(e) => {
                warn!("load {} failed: {}", ticket.generation(), e);
                self.replace_scene(None);
                self.status = ViewerStatus::Failed {
                    message: e.to_string(),
                };
                LoadOutcome::Applied
            }
        }
    }

    /// Load a model and show it, in one go.
    pub async fn load(&mut self, url: &Url) -> LoadOutcome {
        let ticket = self.begin_load();
        let result = self.loader.clone().load(url, &ticket).await;
        self.complete_load(&ticket, result)
    }

    fn replace_scene(&mut self, scene: Option<Scene>) {
        if let Some(mut old) = self.scene.take() {
            old.dispose();
        }
        self.scene = scene;
        self.steps = self.scene.as_ref().map(group_steps);
        self.step_index = 0;
        if let (Some(scene), Some(theme)) = (self.scene.as_mut(), self.theme.clone()) {
            steps::apply_theme(scene, theme);
        }
        if let (Some(scene), Some(highlight)) = (self.scene.as_mut(), self.highlight.clone()) {
            steps::apply_highlight(scene, highlight);
        }
        self.present();
    }

    pub fn scene(&self) -> Option<&Scene> {
        self.scene.as_ref()
    }

    pub fn status(&self) -> &ViewerStatus {
        &self.status
    }

    pub fn camera(&self) -> &CameraTransform {
        &self.camera
    }

    pub fn step_count(&self) -> usize {
        self.steps.as_ref().map_or(0, StepPlan::step_count)
    }

    pub fn step_index(&self) -> usize {
        self.step_index
    }

    pub fn step_mode(&self) -> bool {
        self.step_mode
    }

    pub fn can_next(&self) -> bool {
        self.step_mode && self.step_index + 1 < self.step_count()
    }

    pub fn can_prev(&self) -> bool {
        self.step_mode && self.step_index > 0
    }

    /// Show step `index` (clamped to the plan).
    pub fn set_step_index(&mut self, index: usize) {
        self.step_index = self
            .steps
            .as_ref()
            .map_or(0, |plan| plan.clamp(index));
        self.present();
    }

    pub fn next_step(&mut self) {
        if self.can_next() {
            self.set_step_index(self.step_index + 1);
        }
    }

    pub fn prev_step(&mut self) {
        if self.can_prev() {
            self.set_step_index(self.step_index - 1);
        }
    }

    pub fn set_step_mode(&mut self, enabled: bool) {
        self.step_mode = enabled;
        self.present();
    }

    /// Theme the current scene and every scene loaded after it.
    pub fn apply_theme(&mut self, theme: ColorTheme) {
        self.theme = Some(theme.clone());
        if let Some(scene) = self.scene.as_mut() {
            steps::apply_theme(scene, theme);
        }
    }

    pub fn revert_theme(&mut self) {
        self.theme = None;
        if let Some(scene) = self.scene.as_mut() {
            steps::revert_theme(scene);
        }
    }

    /// Highlight bricks of the current scene and every scene loaded after
    /// it; `None` clears the highlight.
    pub fn set_highlight(&mut self, highlight: Option<BrickHighlight>) {
        self.highlight = highlight.clone();
        if let Some(scene) = self.scene.as_mut() {
            match highlight {
                Some(highlight) => steps::apply_highlight(scene, highlight),
                None => steps::clear_highlight(scene),
            }
        }
    }

    pub fn fit_options(&self) -> &FitOptions {
        &self.fit_options
    }

    pub fn set_fit_options(&mut self, options: FitOptions) {
        self.fit_options = options;
        self.request_refit();
    }

    pub fn set_aspect(&mut self, aspect: f32) {
        self.aspect = aspect;
        self.request_refit();
    }

    /// Frame the visible primitives (and any custom bounds) again. With
    /// fitting turned off only the aspect ratio follows.
    pub fn request_refit(&mut self) -> &CameraTransform {
        if self.fit_options.no_fit {
            self.camera.aspect = self.aspect;
            return &self.camera;
        }
        let visible = self
            .scene
            .as_ref()
            .map_or_else(BoundingBox::degenerate, visible_bounds);
        let bounds = self.fit_options.framed(&visible);
        let config = self.loader.config();
        self.camera = fit(&bounds, config.fit_margin, &config.camera, self.aspect);
        &self.camera
    }

    /// Plan for the current step and mode; empty without a scene.
    pub fn material_plan(&self) -> MaterialPlan {
        match (self.scene.as_ref(), self.steps.as_ref()) {
            (Some(scene), Some(plan)) => {
                let step = self.step_mode.then_some(self.step_index);
                steps::plan(scene, plan, step)
            }
            _ => MaterialPlan::default(),
        }
    }

    fn present(&mut self) {
        let plan = self.material_plan();
        let style = self.config().ghost_style();
        if let Some(scene) = self.scene.as_mut() {
            steps::apply(scene, &plan, &style);
        }
        self.request_refit();
    }

    /// Drop the scene and invalidate any load in flight.
    pub fn teardown(&mut self) {
        self.tickets.invalidate();
        self.theme = None;
        self.highlight = None;
        self.replace_scene(None);
        self.status = ViewerStatus::Idle;
    }
}

impl Drop for Viewer {
    fn drop(&mut self) {
        self.tickets.invalidate();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StepperError;
    use crate::scene::testing::{fixture, model_url, THREE_STEPS};
    use crate::steps::NodeState;
    use crate::types::Color;

    #[tokio::test]
    async fn test_newer_load_wins() {
        let fx = fixture();
        let mut viewer = Viewer::new(fx.loader.clone());

        let first = viewer.begin_load();
        let second = viewer.begin_load();
        assert!(first.generation() < second.generation());

        let newer = fx
            .loader
            .load_text(&model_url(), THREE_STEPS, &second)
            .await
            .unwrap();
        assert_eq!(viewer.complete_load(&second, Ok(newer)), LoadOutcome::Applied);

        // the older one resolves late; it must not replace the newer scene
        let older = fx
            .loader
            .load_text(&model_url(), "1 4 0 0 0 1 0 0 0 1 0 0 0 1 3003.dat\n", &LoadTicket::standalone())
            .await
            .unwrap();
        assert_eq!(viewer.complete_load(&first, Ok(older)), LoadOutcome::Discarded);

        let scene = viewer.scene().unwrap();
        assert_eq!(scene.generation(), second.generation());
        assert_eq!(viewer.step_count(), 3);
        assert_eq!(viewer.status(), &ViewerStatus::Ready);
    }

    #[tokio::test]
    async fn test_stale_ticket_load_is_superseded() {
        let fx = fixture();
        let mut viewer = Viewer::new(fx.loader.clone());
        let stale = viewer.begin_load();
        let _current = viewer.begin_load();

        let result = fx.loader.load_text(&model_url(), THREE_STEPS, &stale).await;
        assert!(matches!(result, Err(StepperError::Superseded { .. })));
        assert_eq!(viewer.complete_load(&stale, result), LoadOutcome::Discarded);
        assert!(viewer.scene().is_none());
        assert_eq!(fx.device.live_geometries(), 0);
    }

    #[tokio::test]
    async fn test_replacing_scene_disposes_old_one() {
        let fx = fixture();
        let mut viewer = Viewer::new(fx.loader.clone());
        assert_eq!(viewer.load(&model_url()).await, LoadOutcome::Applied);
        assert!(matches!(viewer.status(), ViewerStatus::Failed { .. }));

        let ticket = viewer.begin_load();
        let scene = fx.loader.load_text(&model_url(), THREE_STEPS, &ticket).await;
        viewer.complete_load(&ticket, scene);
        assert!(fx.device.live_geometries() > 0);

        let ticket = viewer.begin_load();
        let scene = fx
            .loader
            .load_text(&model_url(), "1 4 0 0 0 1 0 0 0 1 0 0 0 1 3003.dat\n", &ticket)
            .await;
        viewer.complete_load(&ticket, scene);
        assert_eq!(fx.cache.geometry_refs("memory:/lib/parts/3001.dat"), 0);
        assert_eq!(fx.device.live_geometries(), 1);

        viewer.teardown();
        assert!(viewer.scene().is_none());
        assert_eq!(fx.device.live_geometries(), 0);
        assert_eq!(fx.device.live_materials(), 0);
    }

    #[tokio::test]
    async fn test_stepping_through_the_model() {
        let fx = fixture();
        let mut viewer = Viewer::new(fx.loader.clone());
        let ticket = viewer.begin_load();
        let scene = fx.loader.load_text(&model_url(), THREE_STEPS, &ticket).await;
        viewer.complete_load(&ticket, scene);

        let full = viewer.camera().target;
        viewer.set_step_mode(true);
        assert!(viewer.can_next());
        assert!(!viewer.can_prev());

        let scene = viewer.scene().unwrap();
        let children = scene.children(scene.root()).to_vec();
        assert_eq!(scene.state(children[0]), NodeState::Solid);
        assert!(!scene.is_visible(children[2]));
        // only the bottom brick is framed
        assert!(viewer.camera().target.y < full.y);

        viewer.next_step();
        viewer.next_step();
        viewer.next_step();
        assert_eq!(viewer.step_index(), 2);
        let scene = viewer.scene().unwrap();
        assert_eq!(scene.state(children[0]), NodeState::Ghost);
        assert_eq!(scene.state(children[2]), NodeState::Solid);

        viewer.set_step_index(50);
        assert_eq!(viewer.step_index(), 2);

        viewer.set_step_mode(false);
        let scene = viewer.scene().unwrap();
        assert!(scene.primitives().all(|id| scene.state(id) == NodeState::Solid));
        assert_eq!(scene.bindings().count(), 0);
    }

    #[tokio::test]
    async fn test_theme_survives_reload() {
        let fx = fixture();
        let mut viewer = Viewer::new(fx.loader.clone());
        let red = Color::from_hex("#FF0000").unwrap();
        viewer.apply_theme(ColorTheme::new("fire").with_color(7, red));

        let ticket = viewer.begin_load();
        let scene = fx.loader.load_text(&model_url(), THREE_STEPS, &ticket).await;
        viewer.complete_load(&ticket, scene);

        let scene = viewer.scene().unwrap();
        let grey = scene.children(scene.root())[2];
        assert_eq!(scene.material(grey).unwrap().color, red);

        viewer.revert_theme();
        let scene = viewer.scene().unwrap();
        assert_eq!(scene.bindings().count(), 0);
    }

    #[tokio::test]
    async fn test_custom_bounds_keep_the_whole_model_framed() {
        let fx = fixture();
        let mut viewer = Viewer::new(fx.loader.clone());
        let ticket = viewer.begin_load();
        let scene = fx.loader.load_text(&model_url(), THREE_STEPS, &ticket).await;
        viewer.complete_load(&ticket, scene);
        let whole = visible_bounds(viewer.scene().unwrap());
        let full = *viewer.camera();

        viewer.set_step_mode(true);
        assert!(viewer.camera().target.y < full.target.y);

        viewer.set_fit_options(FitOptions::default().with_custom_bounds(whole));
        assert!((viewer.camera().target - full.target).length() < 1e-4);
        assert!((viewer.camera().position - full.position).length() < 1e-3);
    }

    #[tokio::test]
    async fn test_no_fit_keeps_the_camera() {
        let fx = fixture();
        let mut viewer = Viewer::new(fx.loader.clone());
        let ticket = viewer.begin_load();
        let scene = fx.loader.load_text(&model_url(), THREE_STEPS, &ticket).await;
        viewer.complete_load(&ticket, scene);
        let full = *viewer.camera();

        viewer.set_fit_options(FitOptions::default().without_fit());
        viewer.set_step_mode(true);
        viewer.set_aspect(2.0);
        assert_eq!(viewer.camera().target, full.target);
        assert_eq!(viewer.camera().position, full.position);
        assert_eq!(viewer.camera().aspect, 2.0);
    }

    #[tokio::test]
    async fn test_highlight_survives_reload() {
        let fx = fixture();
        let mut viewer = Viewer::new(fx.loader.clone());
        let yellow = Color::from_hex("#FFCC00").unwrap();
        viewer.set_highlight(Some(BrickHighlight::new().with_flag(0, yellow).with_focus(0)));

        let ticket = viewer.begin_load();
        let scene = fx.loader.load_text(&model_url(), THREE_STEPS, &ticket).await;
        viewer.complete_load(&ticket, scene);

        let scene = viewer.scene().unwrap();
        let children = scene.children(scene.root()).to_vec();
        assert_eq!(scene.material(children[0]).unwrap().color, yellow);
        assert!(scene.material(children[1]).unwrap().transparent);

        viewer.set_highlight(None);
        let scene = viewer.scene().unwrap();
        assert!(scene.highlight().is_none());
        assert_eq!(scene.bindings().count(), 0);
    }
}
