//! Per-brick highlighting for reviewing a model.
//!
//! A brick is a top-level child of the scene that draws something; bricks
//! are numbered from 0 in source order. Flagged bricks glow in their flag
//! colour, the others keep a dim neutral glow. With a focus set, every
//! brick except the focused one fades out. Highlighting composes with
//! themes (applied before it) and ghosting (applied after it).

use super::presentation::refresh_material;
use crate::scene::{Material, NodeId, Scene};
use crate::types::Color;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::debug;

/// Emissive strength of flagged bricks, relative to the flag colour.
pub const FLAGGED_EMISSIVE: f32 = 0.4;
/// Emissive strength of unflagged bricks.
pub const NEUTRAL_EMISSIVE: f32 = 0.15;
/// Opacity of bricks outside the focus.
pub const FADED_OPACITY: f32 = 0.12;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BrickHighlight {
    /// Brick number to flag colour.
    pub colors: HashMap<usize, Color>,
    /// The one brick to keep opaque.
    pub focus: Option<usize>,
    /// Colour of unflagged bricks; `None` keeps their own colour.
    pub neutral: Option<Color>,
}

impl BrickHighlight {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_flag(mut self, brick: usize, color: Color) -> Self {
        self.colors.insert(brick, color);
        self
    }

    pub fn with_focus(mut self, brick: usize) -> Self {
        self.focus = Some(brick);
        self
    }

    pub fn with_neutral(mut self, color: Color) -> Self {
        self.neutral = Some(color);
        self
    }

    /// Restyle the material of a primitive belonging to `brick`.
    pub fn apply(&self, material: &Material, brick: Option<usize>) -> Material {
        let mut material = material.clone();
        match brick.and_then(|b| self.colors.get(&b)) {
            Some(&flag) => {
                material.color = flag;
                material.emissive = flag.scaled(FLAGGED_EMISSIVE);
            }
            None => {
                let neutral = self.neutral.unwrap_or(material.color);
                material.color = neutral;
                material.emissive = neutral.scaled(NEUTRAL_EMISSIVE);
            }
        }
        if let Some(focus) = self.focus {
            if brick == Some(focus) {
                material.transparent = false;
                material.opacity = 1.0;
            } else {
                material.transparent = true;
                material.opacity = FADED_OPACITY;
            }
        }
        material
    }
}

/// A highlight bound to the bricks of one scene.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Highlighting {
    pub style: BrickHighlight,
    /// Primitive to brick number.
    pub bricks: HashMap<NodeId, usize>,
}

impl Highlighting {
    pub fn brick_of(&self, node: NodeId) -> Option<usize> {
        self.bricks.get(&node).copied()
    }
}

/// Number the bricks of a scene: `(brick, top-level node)` in order.
pub fn bricks(scene: &Scene) -> Vec<(usize, NodeId)> {
    scene
        .children(scene.root())
        .iter()
        .copied()
        .filter(|&child| !scene.primitives_under(child).is_empty())
        .enumerate()
        .collect()
}

/// Highlight bricks, replacing any previous highlight.
pub fn apply_highlight(scene: &mut Scene, style: BrickHighlight) {
    let mut map = HashMap::new();
    for (brick, node) in bricks(scene) {
        for primitive in scene.primitives_under(node) {
            map.insert(primitive, brick);
        }
    }
    debug!(
        "highlighting {} of {} bricks",
        style.colors.len(),
        map.values().max().map_or(0, |max| max + 1)
    );
    scene.highlight = Some(Highlighting { style, bricks: map });
    refresh_all(scene);
}

/// Remove the highlight; bricks go back to their themed or original look.
pub fn clear_highlight(scene: &mut Scene) {
    if scene.highlight.take().is_some() {
        refresh_all(scene);
    }
}

fn refresh_all(scene: &mut Scene) {
    let primitives: Vec<_> = scene.primitives().collect();
    for id in primitives {
        refresh_material(scene, id);
    }
}
