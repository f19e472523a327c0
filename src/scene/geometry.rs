//! Flattened part geometry.
//!
//! A library part is a tree of files (part → subparts → primitives). For
//! rendering it is flattened once into a triangle soup in the part's own
//! coordinate space; every placement of the part then shares that soup.

use crate::format::{Directive, EDGE_COLOUR, MAIN_COLOUR};
use crate::types::BoundingBox;
use glam::{Mat4, Vec3};

/// Colour of a flattened element, relative to the placing reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColourSlot {
    /// The colour of whoever places the part (code 16).
    Main,
    /// The edge colour of the placing colour (code 24).
    Edge,
    /// A fixed colour code baked into the part.
    Code(u32),
}

impl ColourSlot {
    /// Slot for a colour code seen inside a file placed with `inherited`.
    pub fn from_code(code: u32, inherited: ColourSlot) -> Self {
        match code {
            MAIN_COLOUR => inherited,
            EDGE_COLOUR => ColourSlot::Edge,
            code => ColourSlot::Code(code),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Triangle {
    pub vertices: [Vec3; 3],
    pub colour: ColourSlot,
}

impl Triangle {
    /// Unnormalized face normal (counter-clockwise winding).
    pub fn normal(&self) -> Vec3 {
        let [a, b, c] = self.vertices;
        (b - a).cross(c - a)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EdgeLine {
    pub points: [Vec3; 2],
    pub colour: ColourSlot,
    /// Type-5 lines, only drawn when they sit on a silhouette.
    pub conditional: bool,
}

/// Triangles and edge lines of one part (or one run of inline polygons).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PartGeometry {
    pub triangles: Vec<Triangle>,
    pub edges: Vec<EdgeLine>,
}

impl PartGeometry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn triangle_count(&self) -> usize {
        self.triangles.len()
    }

    /// Nothing to draw.
    pub fn is_empty(&self) -> bool {
        self.triangles.is_empty()
    }

    /// Bounds of the triangles in local space.
    pub fn bounds(&self) -> Option<BoundingBox> {
        BoundingBox::from_points(self.triangles.iter().flat_map(|t| t.vertices))
    }

    /// Add a drawing directive transformed by `matrix`.
    ///
    /// `invert` flips the winding, for mirrored placements and
    /// `BFC INVERTNEXT`. Non-drawing directives are ignored.
    pub fn push(&mut self, directive: &Directive, matrix: &Mat4, inherited: ColourSlot, invert: bool) {
        let at = |p: Vec3| matrix.transform_point3(p);
        match directive {
            Directive::Triangle { colour, points } => {
                let colour = ColourSlot::from_code(*colour, inherited);
                let [a, b, c] = points.map(at);
                self.add_triangle([a, b, c], colour, invert);
            }
            Directive::Quad { colour, points } => {
                let colour = ColourSlot::from_code(*colour, inherited);
                let [a, b, c, d] = points.map(at);
                self.add_triangle([a, b, c], colour, invert);
                self.add_triangle([a, c, d], colour, invert);
            }
            Directive::Line { colour, points } => self.edges.push(EdgeLine {
                points: points.map(at),
                colour: ColourSlot::from_code(*colour, inherited),
                conditional: false,
            }),
            Directive::OptionalLine { colour, points, .. } => self.edges.push(EdgeLine {
                points: points.map(at),
                colour: ColourSlot::from_code(*colour, inherited),
                conditional: true,
            }),
            Directive::Meta(_) | Directive::SubFile(_) => {}
        }
    }

    fn add_triangle(&mut self, [a, b, c]: [Vec3; 3], colour: ColourSlot, invert: bool) {
        let vertices = if invert { [a, c, b] } else { [a, b, c] };
        self.triangles.push(Triangle { vertices, colour });
    }
}
