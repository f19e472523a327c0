//! A small software rasterizer for scenes.
//!
//! Opaque primitives are drawn first with depth writes; transparent and
//! ghosted ones follow, depth-tested against the opaque pass and blended.
//! Ghosts that disable depth writes never hide each other.

use crate::camera::CameraTransform;
use crate::scene::{ColourSlot, Material, NodeId, Scene};
use crate::types::Color;
use glam::{Mat4, Vec3, Vec4};
use image::{Rgba, RgbaImage};

const AMBIENT: f32 = 0.45;
const DIFFUSE: f32 = 0.55;

/// Colour and depth targets of one frame.
pub struct Framebuffer {
    width: u32,
    height: u32,
    color: Vec<[f32; 4]>,
    depth: Vec<f32>,
    draw_edges: bool,
}

#[derive(Clone, Copy)]
struct Fragment {
    color: Color,
    depth_write: bool,
}

impl Framebuffer {
    pub fn new(width: u32, height: u32, background: Color) -> Self {
        let len = (width as usize) * (height as usize);
        Self {
            width,
            height,
            color: vec![[background.r, background.g, background.b, background.a]; len],
            depth: vec![f32::INFINITY; len],
            draw_edges: false,
        }
    }

    /// Also draw the outline lines of opaque parts.
    pub fn with_edges(mut self, draw_edges: bool) -> Self {
        self.draw_edges = draw_edges;
        self
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Draw every visible primitive of the scene.
    pub fn draw_scene(&mut self, scene: &Scene, camera: &CameraTransform) {
        let view_projection = camera.view_projection();
        let light = (camera.position - camera.target).normalize_or_zero();

        let (opaque, blended): (Vec<NodeId>, Vec<NodeId>) = scene
            .primitives()
            .filter(|&id| scene.is_visible(id))
            .partition(|&id| scene.material(id).is_some_and(|m| !m.transparent));

        for id in opaque.into_iter().chain(blended) {
            self.draw_primitive(scene, id, &view_projection, light);
        }
    }

    fn draw_primitive(&mut self, scene: &Scene, id: NodeId, view_projection: &Mat4, light: Vec3) {
        let (Some(node), Some(material)) = (scene.get(id), scene.material(id)) else {
            return;
        };
        let Some(primitive) = node.primitive() else {
            return;
        };
        let world = scene.world_transform(id);

        for triangle in &primitive.geometry.triangles {
            let vertices = triangle.vertices.map(|v| world.transform_point3(v));
            let normal = (vertices[1] - vertices[0])
                .cross(vertices[2] - vertices[0])
                .normalize_or_zero();
            let shade = AMBIENT + DIFFUSE * normal.dot(light).abs();
            let base = slot_color(scene, material, triangle.colour);
            let lit = Color::rgba(
                (base.r * shade + material.emissive.r).min(1.0),
                (base.g * shade + material.emissive.g).min(1.0),
                (base.b * shade + material.emissive.b).min(1.0),
                base.a,
            );
            let fragment = Fragment {
                color: lit,
                depth_write: material.depth_write,
            };
            let [a, b, c] = vertices.map(|v| self.project(view_projection, v));
            if let (Some(a), Some(b), Some(c)) = (a, b, c) {
                self.fill_triangle([a, b, c], fragment);
            }
        }

        if !self.draw_edges || material.transparent {
            return;
        }
        for edge in primitive.geometry.edges.iter().filter(|e| !e.conditional) {
            let color = match edge.colour {
                ColourSlot::Main | ColourSlot::Edge => material.edge_color,
                ColourSlot::Code(code) => scene.palette().resolve(code).value,
            };
            let [a, b] = edge.points.map(|p| world.transform_point3(p));
            if let (Some(a), Some(b)) = (self.project(view_projection, a), self.project(view_projection, b)) {
                self.draw_line(a, b, color);
            }
        }
    }

    /// Screen position with depth in 0..1; `None` behind the camera.
    fn project(&self, view_projection: &Mat4, point: Vec3) -> Option<Vec3> {
        let clip: Vec4 = *view_projection * point.extend(1.0);
        if clip.w <= f32::EPSILON {
            return None;
        }
        let ndc = clip.truncate() / clip.w;
        Some(Vec3::new(
            (ndc.x + 1.0) * 0.5 * self.width as f32,
            (1.0 - ndc.y) * 0.5 * self.height as f32,
            ndc.z,
        ))
    }

    fn fill_triangle(&mut self, [a, b, c]: [Vec3; 3], fragment: Fragment) {
        let area = edge(a, b, c);
        if area.abs() < f32::EPSILON {
            return;
        }
        let min_x = a.x.min(b.x).min(c.x).floor().max(0.0) as u32;
        let min_y = a.y.min(b.y).min(c.y).floor().max(0.0) as u32;
        let max_x = (a.x.max(b.x).max(c.x).ceil() as u32).min(self.width);
        let max_y = (a.y.max(b.y).max(c.y).ceil() as u32).min(self.height);

        for y in min_y..max_y {
            for x in min_x..max_x {
                let p = Vec3::new(x as f32 + 0.5, y as f32 + 0.5, 0.0);
                let w0 = edge(b, c, p) / area;
                let w1 = edge(c, a, p) / area;
                let w2 = edge(a, b, p) / area;
                if w0 < 0.0 || w1 < 0.0 || w2 < 0.0 {
                    continue;
                }
                let depth = w0 * a.z + w1 * b.z + w2 * c.z;
                self.write(x, y, depth, fragment);
            }
        }
    }

    fn draw_line(&mut self, a: Vec3, b: Vec3, color: Color) {
        let steps = (b.x - a.x).abs().max((b.y - a.y).abs()).ceil().max(1.0) as u32;
        let fragment = Fragment {
            color,
            depth_write: true,
        };
        for i in 0..=steps {
            let p = a.lerp(b, i as f32 / steps as f32);
            if p.x < 0.0 || p.y < 0.0 {
                continue;
            }
            let (x, y) = (p.x as u32, p.y as u32);
            if x < self.width && y < self.height {
                // nudge towards the camera so edges win over their own faces
                self.write(x, y, p.z - 1e-4, fragment);
            }
        }
    }

    fn write(&mut self, x: u32, y: u32, depth: f32, fragment: Fragment) {
        let index = pixel_index(self.width, x, y);
        if !(0.0..=1.0).contains(&depth) || depth >= self.depth[index] {
            return;
        }
        let src = fragment.color;
        let dst = &mut self.color[index];
        let alpha = src.a.clamp(0.0, 1.0);
        dst[0] = src.r * alpha + dst[0] * (1.0 - alpha);
        dst[1] = src.g * alpha + dst[1] * (1.0 - alpha);
        dst[2] = src.b * alpha + dst[2] * (1.0 - alpha);
        dst[3] = alpha + dst[3] * (1.0 - alpha);
        if fragment.depth_write {
            self.depth[index] = depth;
        }
    }

    pub fn into_image(self) -> RgbaImage {
        let mut image = RgbaImage::new(self.width, self.height);
        for (pixel, color) in image.pixels_mut().zip(&self.color) {
            *pixel = Rgba(Color::rgba(color[0], color[1], color[2], color[3]).to_rgba8());
        }
        image
    }
}

/// Row-major offset of a pixel.
fn pixel_index(width: u32, x: u32, y: u32) -> usize {
    y as usize * width as usize + x as usize
}

/// Twice the signed area of (a, b, p) in screen space.
fn edge(a: Vec3, b: Vec3, p: Vec3) -> f32 {
    (p.x - a.x) * (b.y - a.y) - (p.y - a.y) * (b.x - a.x)
}

/// Resolve a triangle's colour slot. Fixed colour codes keep their palette
/// colour; a ghosted primitive fades them along with its own colour.
fn slot_color(scene: &Scene, material: &Material, slot: ColourSlot) -> Color {
    match slot {
        ColourSlot::Main => material.color.with_alpha(material.opacity),
        ColourSlot::Edge => material.edge_color.with_alpha(material.opacity),
        ColourSlot::Code(code) => {
            let definition = scene.palette().resolve(code);
            let alpha = f32::from(definition.alpha) / 255.0;
            let alpha = if material.transparent {
                alpha.min(material.opacity)
            } else {
                alpha
            };
            definition.value.with_alpha(alpha)
        }
    }
}

/// How [`render`] draws a frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RenderOptions {
    pub width: u32,
    pub height: u32,
    pub background: Color,
    pub draw_edges: bool,
}

impl RenderOptions {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            background: Color::rgba(0.0, 0.0, 0.0, 0.0),
            draw_edges: false,
        }
    }

    pub fn with_background(mut self, background: Color) -> Self {
        self.background = background;
        self
    }

    pub fn with_edges(mut self, draw_edges: bool) -> Self {
        self.draw_edges = draw_edges;
        self
    }
}

/// Render a scene into a fresh image.
pub fn render(scene: &Scene, camera: &CameraTransform, options: &RenderOptions) -> RgbaImage {
    let mut framebuffer =
        Framebuffer::new(options.width, options.height, options.background).with_edges(options.draw_edges);
    framebuffer.draw_scene(scene, camera);
    framebuffer.into_image()
}
