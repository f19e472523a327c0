//! Runtime configuration.
//!
//! Every field has a default, so a TOML file only needs the values it
//! changes:
//!
//! ```toml
//! library_base = "file:///opt/ldraw/"
//! ghost_opacity = 0.2
//!
//! [camera]
//! fov_degrees = 35.0
//! ```

use crate::camera::CameraConfig;
use crate::error::{Result, StepperError};
use crate::library::{ResolveContext, PALETTE_FILE};
use crate::steps::GhostStyle;
use serde::{Deserialize, Serialize};
use std::path::Path;
use url::Url;

/// Public mirror of the official parts library.
pub const DEFAULT_LIBRARY_BASE: &str =
    "https://raw.githubusercontent.com/gkjohnson/ldraw-parts-library/master/complete/ldraw/";

/// Configuration for loading and presenting models.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StepperConfig {
    /// Root URL of the parts library. Must end with `/`.
    pub library_base: String,
    /// Palette location, relative to the library root.
    pub palette_file: String,
    /// Route library requests through this endpoint (`{endpoint}?url=...`).
    pub proxy_endpoint: Option<String>,
    /// Maximum nesting of references before a load is rejected.
    pub max_reference_depth: usize,
    /// Opacity of parts from earlier steps.
    pub ghost_opacity: f32,
    /// Extra room around the model when framing, as a multiple of its size.
    pub fit_margin: f32,
    pub camera: CameraConfig,
    /// Edge length of thumbnails in pixels.
    pub thumbnail_size: u32,
    /// Draw the outline (type 2) lines of parts when rendering images.
    pub draw_edges: bool,
}

impl Default for StepperConfig {
    fn default() -> Self {
        Self {
            library_base: DEFAULT_LIBRARY_BASE.to_string(),
            palette_file: PALETTE_FILE.to_string(),
            proxy_endpoint: None,
            max_reference_depth: 32,
            ghost_opacity: 0.15,
            fit_margin: 1.5,
            camera: CameraConfig::default(),
            thumbnail_size: 256,
            draw_edges: false,
        }
    }
}

impl StepperConfig {
    /// Parse and validate a TOML document.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: StepperConfig = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a TOML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    pub fn with_library_base(mut self, base: impl Into<String>) -> Self {
        self.library_base = base.into();
        self
    }

    pub fn with_proxy(mut self, endpoint: impl Into<String>) -> Self {
        self.proxy_endpoint = Some(endpoint.into());
        self
    }

    pub fn with_ghost_opacity(mut self, opacity: f32) -> Self {
        self.ghost_opacity = opacity;
        self
    }

    pub fn with_fit_margin(mut self, margin: f32) -> Self {
        self.fit_margin = margin;
        self
    }

    pub fn with_edges(mut self, draw_edges: bool) -> Self {
        self.draw_edges = draw_edges;
        self
    }

    pub fn with_max_reference_depth(mut self, depth: usize) -> Self {
        self.max_reference_depth = depth;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.ghost_opacity) {
            return Err(StepperError::Config(format!(
                "ghost_opacity must be within 0..=1, got {}",
                self.ghost_opacity
            )));
        }
        if self.fit_margin <= 0.0 {
            return Err(StepperError::Config(format!(
                "fit_margin must be positive, got {}",
                self.fit_margin
            )));
        }
        if self.max_reference_depth == 0 {
            return Err(StepperError::Config(
                "max_reference_depth must be at least 1".to_string(),
            ));
        }
        if self.thumbnail_size == 0 {
            return Err(StepperError::Config(
                "thumbnail_size must be at least 1".to_string(),
            ));
        }
        if !self.library_base.ends_with('/') {
            return Err(StepperError::Config(format!(
                "library_base must end with '/': {}",
                self.library_base
            )));
        }
        self.camera.validate()?;
        self.resolve_context()?;
        Ok(())
    }

    /// Resolution context without a main model.
    pub fn resolve_context(&self) -> Result<ResolveContext> {
        let mut ctx = ResolveContext::new(Url::parse(&self.library_base)?);
        if let Some(endpoint) = &self.proxy_endpoint {
            ctx = ctx.with_proxy(Url::parse(endpoint)?);
        }
        Ok(ctx)
    }

    pub fn palette_url(&self) -> Result<Url> {
        Ok(Url::parse(&self.library_base)?.join(&self.palette_file)?)
    }

    pub fn ghost_style(&self) -> GhostStyle {
        GhostStyle {
            opacity: self.ghost_opacity,
            ..GhostStyle::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = StepperConfig::default();
        config.validate().unwrap();
        assert_eq!(config.ghost_opacity, 0.15);
        assert_eq!(config.fit_margin, 1.5);
        assert!(!config.draw_edges);
        assert_eq!(
            config.palette_url().unwrap().as_str(),
            format!("{}LDConfig.ldr", DEFAULT_LIBRARY_BASE)
        );
    }

    #[test]
    fn test_partial_toml() {
        let config = StepperConfig::from_toml_str(
            "library_base = \"file:///opt/ldraw/\"\nghost_opacity = 0.25\n\n[camera]\nfov_degrees = 35.0\n",
        )
        .unwrap();
        assert_eq!(config.library_base, "file:///opt/ldraw/");
        assert_eq!(config.ghost_opacity, 0.25);
        assert_eq!(config.camera.fov_degrees, 35.0);
        assert_eq!(config.max_reference_depth, 32);

        let config = StepperConfig::from_toml_str("draw_edges = true\n").unwrap();
        assert!(config.draw_edges);
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        assert!(matches!(
            StepperConfig::from_toml_str("ghost_opacity = 1.5"),
            Err(StepperError::Config(_))
        ));
        assert!(matches!(
            StepperConfig::from_toml_str("library_base = \"file:///opt/ldraw\""),
            Err(StepperError::Config(_))
        ));
        assert!(matches!(
            StepperConfig::from_toml_str("fit_margin = \"wide\""),
            Err(StepperError::Toml(_))
        ));
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stepper.toml");
        std::fs::write(&path, "fit_margin = 1.2\n").unwrap();
        let config = StepperConfig::load(&path).unwrap();
        assert_eq!(config.fit_margin, 1.2);
        assert_eq!(config.ghost_style().opacity, 0.15);
    }
}
