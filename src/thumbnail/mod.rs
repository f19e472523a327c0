//! Offscreen thumbnails of single parts.
//!
//! Each request builds a short-lived scene through the shared cache, so the
//! part's files and geometry are reused by later requests and by viewers.
//! The scene is disposed as soon as the image is captured. Failures never
//! propagate: the caller gets a placeholder image instead.

pub mod raster;

pub use raster::{render, Framebuffer, RenderOptions};

use crate::camera::{fit, visible_bounds, CameraConfig};
use crate::config::StepperConfig;
use crate::error::Result;
use crate::library::PartReference;
use crate::scene::{LoadTicket, Scene, SceneLoader};
use crate::types::Color;
use glam::Vec3;
use image::{Rgba, RgbaImage};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use url::Url;

const PLACEHOLDER_LIGHT: [u8; 4] = [224, 224, 224, 255];
const PLACEHOLDER_DARK: [u8; 4] = [192, 192, 192, 255];
const PLACEHOLDER_CELLS: u32 = 8;

/// A camera direction for a thumbnail.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ViewAngle {
    pub name: String,
    /// From the target towards the camera.
    pub direction: [f32; 3],
}

impl ViewAngle {
    pub fn new(name: impl Into<String>, direction: Vec3) -> Self {
        Self {
            name: name.into(),
            direction: direction.to_array(),
        }
    }

    pub fn iso() -> Self {
        Self::new("iso", Vec3::ONE)
    }

    pub fn front() -> Self {
        Self::new("front", Vec3::Z)
    }

    pub fn side() -> Self {
        Self::new("side", Vec3::X)
    }

    pub fn top() -> Self {
        Self::new("top", Vec3::Y)
    }

    pub fn standard() -> Vec<Self> {
        vec![Self::iso(), Self::front(), Self::side(), Self::top()]
    }
}

/// A rendered image, or the placeholder shown when rendering failed.
#[derive(Debug, Clone)]
pub struct Thumbnail {
    pub image: RgbaImage,
    placeholder: bool,
}

impl Thumbnail {
    /// Checkerboard of the given size.
    pub fn placeholder(size: u32) -> Self {
        let cell = (size / PLACEHOLDER_CELLS).max(1);
        let image = RgbaImage::from_fn(size, size, |x, y| {
            if (x / cell + y / cell) % 2 == 0 {
                Rgba(PLACEHOLDER_LIGHT)
            } else {
                Rgba(PLACEHOLDER_DARK)
            }
        });
        Self {
            image,
            placeholder: true,
        }
    }

    pub fn is_placeholder(&self) -> bool {
        self.placeholder
    }

    /// Encode as PNG bytes.
    pub fn to_png(&self) -> Result<Vec<u8>> {
        let mut bytes = Vec::new();
        self.image.write_to(
            &mut std::io::Cursor::new(&mut bytes),
            image::ImageFormat::Png,
        )?;
        Ok(bytes)
    }
}

/// Renders parts to images through a shared loader.
#[derive(Clone)]
pub struct ThumbnailRenderer {
    loader: SceneLoader,
    size: u32,
    background: Color,
}

impl ThumbnailRenderer {
    pub fn new(loader: SceneLoader) -> Self {
        let size = loader.config().thumbnail_size;
        Self {
            loader,
            size,
            background: Color::rgba(0.0, 0.0, 0.0, 0.0),
        }
    }

    pub fn with_size(mut self, size: u32) -> Self {
        self.size = size.max(1);
        self
    }

    pub fn with_background(mut self, background: Color) -> Self {
        self.background = background;
        self
    }

    fn config(&self) -> &StepperConfig {
        self.loader.config()
    }

    /// Render one part in one colour from the default camera direction.
    pub async fn render_thumbnail(&self, part: &PartReference, colour: u32) -> Thumbnail {
        let angle = ViewAngle {
            name: "default".to_string(),
            direction: self.config().camera.view_direction,
        };
        self.render_views(part, colour, &[angle])
            .await
            .pop()
            .unwrap_or_else(|| Thumbnail::placeholder(self.size))
    }

    /// Render one part from several directions; one image per angle.
    pub async fn render_views(&self, part: &PartReference, colour: u32, angles: &[ViewAngle]) -> Vec<Thumbnail> {
        match self.load_part(part, colour).await {
            Ok(scene) if scene.triangle_count() == 0 => {
                debug!("{} has no faces to draw", part);
                self.placeholders(angles.len())
            }
            Ok(mut scene) => {
                let images = angles
                    .iter()
                    .map(|angle| self.capture(&scene, angle))
                    .collect();
                scene.dispose();
                debug!("rendered {} view(s) of {}", angles.len(), part);
                images
            }
            Err(e) => {
                warn!("thumbnail for {} failed: {}", part, e);
                self.placeholders(angles.len())
            }
        }
    }

    fn placeholders(&self, count: usize) -> Vec<Thumbnail> {
        (0..count).map(|_| Thumbnail::placeholder(self.size)).collect()
    }

    async fn load_part(&self, part: &PartReference, colour: u32) -> Result<Scene> {
        let text = format!(
            "0 Thumbnail\n1 {} 0 0 0 1 0 0 0 1 0 0 0 1 {}\n",
            colour,
            part.as_str()
        );
        let root = self.synthetic_root(part)?;
        self.loader
            .load_text(&root, &text, &LoadTicket::standalone())
            .await
    }

    fn synthetic_root(&self, part: &PartReference) -> Result<Url> {
        let base = Url::parse(&self.config().library_base)?;
        Ok(base.join(&format!("thumbnails/{}.ldr", part.file_name()))?)
    }

    fn capture(&self, scene: &Scene, angle: &ViewAngle) -> Thumbnail {
        let camera_config = CameraConfig {
            view_direction: angle.direction,
            ..self.config().camera
        };
        let camera = fit(
            &visible_bounds(scene),
            self.config().fit_margin,
            &camera_config,
            1.0,
        );
        let options = RenderOptions::new(self.size, self.size)
            .with_background(self.background)
            .with_edges(self.config().draw_edges);
        Thumbnail {
            image: render(scene, &camera, &options),
            placeholder: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::testing::fixture;

    #[tokio::test]
    async fn test_render_thumbnail_draws_part() {
        let fx = fixture();
        let renderer = ThumbnailRenderer::new(fx.loader.clone()).with_size(48);
        let thumb = renderer
            .render_thumbnail(&PartReference::new("3001.dat"), 4)
            .await;
        assert!(!thumb.is_placeholder());
        assert_eq!(thumb.image.dimensions(), (48, 48));
        assert!(thumb.image.pixels().any(|p| p.0[3] == 255));
    }

    #[tokio::test]
    async fn test_scene_is_disposed_after_capture() {
        let fx = fixture();
        let renderer = ThumbnailRenderer::new(fx.loader.clone()).with_size(16);
        renderer
            .render_views(&PartReference::new("3003.dat"), 1, &ViewAngle::standard())
            .await;
        assert_eq!(fx.device.live_geometries(), 0);
        assert_eq!(fx.device.live_materials(), 0);
        assert_eq!(fx.cache.geometry_refs("memory:/lib/parts/3003.dat"), 0);
    }

    #[tokio::test]
    async fn test_missing_part_gives_placeholder() {
        let fx = fixture();
        let renderer = ThumbnailRenderer::new(fx.loader.clone()).with_size(16);
        let thumbs = renderer
            .render_views(
                &PartReference::new("99999.dat"),
                4,
                &[ViewAngle::iso(), ViewAngle::top()],
            )
            .await;
        assert_eq!(thumbs.len(), 2);
        assert!(thumbs.iter().all(Thumbnail::is_placeholder));
    }

    #[tokio::test]
    async fn test_part_without_faces_gives_placeholder() {
        let fx = fixture();
        let renderer = ThumbnailRenderer::new(fx.loader.clone()).with_size(16);
        let thumb = renderer
            .render_thumbnail(&PartReference::new("3068.dat"), 0)
            .await;
        assert!(thumb.is_placeholder());
    }

    #[test]
    fn test_placeholder_encodes_as_png() {
        let png = Thumbnail::placeholder(16).to_png().unwrap();
        assert_eq!(&png[..4], &[0x89, b'P', b'N', b'G']);
    }
}
