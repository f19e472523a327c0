//! Bounds and camera framing.
//!
//! Framing only considers what is visible: while stepping, hidden parts must
//! not pull the camera away from what the user is looking at.

use crate::error::{Result, StepperError};
use crate::scene::Scene;
use crate::types::BoundingBox;
use glam::{Mat4, Vec3};
use serde::{Deserialize, Serialize};

/// Framing of anything smaller than this is treated as this size.
const MIN_FIT_SIZE: f32 = 1.0;

/// Perspective camera settings.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraConfig {
    /// Vertical field of view.
    pub fov_degrees: f32,
    /// Direction from the target towards the camera.
    pub view_direction: [f32; 3],
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            fov_degrees: 45.0,
            view_direction: [1.0, 1.0, 1.0],
        }
    }
}

impl CameraConfig {
    pub fn validate(&self) -> Result<()> {
        if !(self.fov_degrees > 0.0 && self.fov_degrees < 180.0) {
            return Err(StepperError::Config(format!(
                "camera.fov_degrees must be within (0, 180), got {}",
                self.fov_degrees
            )));
        }
        if Vec3::from(self.view_direction).length_squared() == 0.0 {
            return Err(StepperError::Config(
                "camera.view_direction must not be zero".to_string(),
            ));
        }
        Ok(())
    }

    pub fn with_view_direction(mut self, direction: Vec3) -> Self {
        self.view_direction = direction.to_array();
        self
    }

    fn direction(&self) -> Vec3 {
        Vec3::from(self.view_direction).try_normalize().unwrap_or(Vec3::ONE.normalize())
    }
}

/// A placed perspective camera.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CameraTransform {
    pub position: Vec3,
    pub target: Vec3,
    pub up: Vec3,
    /// Vertical field of view in radians.
    pub fov_y: f32,
    pub aspect: f32,
    pub near: f32,
    pub far: f32,
}

impl CameraTransform {
    pub fn distance(&self) -> f32 {
        self.position.distance(self.target)
    }

    pub fn view_matrix(&self) -> Mat4 {
        Mat4::look_at_rh(self.position, self.target, self.up)
    }

    pub fn projection_matrix(&self) -> Mat4 {
        Mat4::perspective_rh(self.fov_y, self.aspect, self.near, self.far)
    }

    pub fn view_projection(&self) -> Mat4 {
        self.projection_matrix() * self.view_matrix()
    }
}

/// Union of world-space boxes; no boxes gives a zero volume at the origin.
pub fn compute_bounds(boxes: impl IntoIterator<Item = BoundingBox>) -> BoundingBox {
    boxes
        .into_iter()
        .reduce(|acc, b| acc.union(&b))
        .unwrap_or_else(BoundingBox::degenerate)
}

/// Bounds of the currently visible primitives of a scene.
pub fn visible_bounds(scene: &Scene) -> BoundingBox {
    compute_bounds(
        scene
            .primitives()
            .filter(|&id| scene.is_visible(id))
            .filter_map(|id| scene.world_bounds(id)),
    )
}

/// Extra framing controls for a viewer.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct FitOptions {
    /// Always keep this volume in frame as well, e.g. the finished model
    /// while only the first steps are shown.
    pub custom_bounds: Option<BoundingBox>,
    /// Leave the camera where it is.
    pub no_fit: bool,
}

impl FitOptions {
    pub fn with_custom_bounds(mut self, bounds: BoundingBox) -> Self {
        self.custom_bounds = Some(bounds);
        self
    }

    pub fn without_fit(mut self) -> Self {
        self.no_fit = true;
        self
    }

    /// The volume to frame: the visible bounds joined with the custom ones.
    pub fn framed(&self, visible: &BoundingBox) -> BoundingBox {
        match &self.custom_bounds {
            Some(custom) => visible.union(custom),
            None => *visible,
        }
    }
}

/// Place the camera so the whole volume fits the narrower field of view.
///
/// The volume is framed by its bounding sphere, so it stays in view from
/// any direction; `margin` scales the sphere.
pub fn fit(bounds: &BoundingBox, margin: f32, config: &CameraConfig, aspect: f32) -> CameraTransform {
    let aspect = if aspect > 0.0 { aspect } else { 1.0 };
    let fov_y = config.fov_degrees.to_radians();
    let half_v = fov_y / 2.0;
    let half_h = (half_v.tan() * aspect).atan();
    let half = half_v.min(half_h);

    let radius = (bounds.dimensions().length() / 2.0).max(MIN_FIT_SIZE / 2.0);
    let distance = radius * margin / half.sin();

    let target = bounds.center();
    let direction = config.direction();
    let up = if direction.cross(Vec3::Y).length_squared() < 1e-6 {
        Vec3::Z
    } else {
        Vec3::Y
    };

    CameraTransform {
        position: target + direction * distance,
        target,
        up,
        fov_y,
        aspect,
        near: distance / 100.0,
        far: distance * 100.0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_bounds_are_degenerate() {
        let b = compute_bounds(std::iter::empty());
        assert_eq!(b.min, Vec3::ZERO);
        assert_eq!(b.max, Vec3::ZERO);
    }

    #[test]
    fn test_single_box_bounds() {
        let single = BoundingBox::new(Vec3::new(-20.0, 0.0, -10.0), Vec3::new(20.0, 24.0, 10.0));
        assert_eq!(compute_bounds([single]), single);

        let other = BoundingBox::new(Vec3::new(0.0, -8.0, 0.0), Vec3::new(40.0, 0.0, 5.0));
        let both = compute_bounds([single, other]);
        assert_eq!(both.min, Vec3::new(-20.0, -8.0, -10.0));
        assert_eq!(both.max, Vec3::new(40.0, 24.0, 10.0));
    }

    /// Largest |x| or |y| of the box corners in normalized device coordinates.
    fn max_ndc(camera: &CameraTransform, bounds: &BoundingBox) -> f32 {
        let view_projection = camera.view_projection();
        bounds
            .corners()
            .iter()
            .map(|&corner| view_projection.project_point3(corner))
            .map(|ndc| ndc.x.abs().max(ndc.y.abs()))
            .fold(0.0, f32::max)
    }

    #[test]
    fn test_fit_distance_uses_margin() {
        let bounds = BoundingBox::new(Vec3::splat(-50.0), Vec3::splat(50.0));
        let config = CameraConfig::default();
        let camera = fit(&bounds, 1.5, &config, 1.0);

        let radius = 3f32.sqrt() * 50.0;
        let expected = radius * 1.5 / (45f32.to_radians() / 2.0).sin();
        assert!((camera.distance() - expected).abs() < 1e-2);
        assert_eq!(camera.target, Vec3::ZERO);
        assert!(camera.near < camera.distance() && camera.far > camera.distance());
    }

    #[test]
    fn test_fitted_box_stays_in_frame() {
        let cube = BoundingBox::new(Vec3::splat(-50.0), Vec3::splat(50.0));
        let slab = BoundingBox::new(Vec3::new(-80.0, 0.0, -40.0), Vec3::new(80.0, 24.0, 40.0));
        for bounds in [cube, slab] {
            for direction in [Vec3::ONE, Vec3::Z, Vec3::new(-1.0, 2.0, 0.5)] {
                let config = CameraConfig::default().with_view_direction(direction);
                for aspect in [0.5, 1.0, 2.0] {
                    let camera = fit(&bounds, 1.0, &config, aspect);
                    assert!(max_ndc(&camera, &bounds) <= 1.0);
                }
            }
        }
        let camera = fit(&cube, 1.5, &CameraConfig::default(), 1.0);
        assert!(max_ndc(&camera, &cube) <= 1.0 / 1.5 + 1e-3);
    }

    #[test]
    fn test_custom_bounds_join_the_framed_volume() {
        let visible = BoundingBox::new(Vec3::ZERO, Vec3::splat(10.0));
        let whole = BoundingBox::new(Vec3::new(-40.0, 0.0, -40.0), Vec3::new(40.0, 80.0, 40.0));

        assert_eq!(FitOptions::default().framed(&visible), visible);
        let options = FitOptions::default().with_custom_bounds(whole);
        assert_eq!(options.framed(&visible), visible.union(&whole));
        assert!(!options.no_fit);
        assert!(options.without_fit().no_fit);
    }

    #[test]
    fn test_narrow_viewport_moves_camera_back() {
        let bounds = BoundingBox::new(Vec3::splat(-10.0), Vec3::splat(10.0));
        let config = CameraConfig::default();
        let wide = fit(&bounds, 1.0, &config, 2.0);
        let tall = fit(&bounds, 1.0, &config, 0.5);
        assert!(tall.distance() > wide.distance());
    }

    #[test]
    fn test_fit_degenerate_volume_is_finite() {
        let camera = fit(&BoundingBox::degenerate(), 1.5, &CameraConfig::default(), 1.0);
        assert!(camera.distance().is_finite() && camera.distance() > 0.0);
    }

    #[test]
    fn test_invalid_camera_config() {
        let config = CameraConfig {
            fov_degrees: 0.0,
            ..CameraConfig::default()
        };
        assert!(config.validate().is_err());
        let config = CameraConfig::default().with_view_direction(Vec3::ZERO);
        assert!(config.validate().is_err());
    }
}
