//! Visibility and material state per primitive.
//!
//! Presenting a step is split in two: [`plan`] decides, without touching
//! the scene, which state every primitive should be in; [`apply`] makes it
//! so. Materials are always derived from the primitive's original, so
//! applying the same plan twice leaves the scene exactly as after the first
//! time.

use super::theme::recolor;
use super::StepPlan;
use crate::scene::{Material, NodeId, Scene};
use serde::{Deserialize, Serialize};

/// How a primitive is shown.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum NodeState {
    /// Not yet built: invisible.
    Hidden,
    /// Already built: faded out.
    Ghost,
    /// Being built now, or step mode is off.
    #[default]
    Solid,
}

/// Look of ghosted primitives.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GhostStyle {
    pub opacity: f32,
    pub depth_write: bool,
}

impl Default for GhostStyle {
    fn default() -> Self {
        Self {
            opacity: 0.15,
            depth_write: false,
        }
    }
}

impl GhostStyle {
    /// The ghosted variant of a material.
    pub fn apply(&self, material: &Material) -> Material {
        Material {
            transparent: true,
            opacity: self.opacity,
            depth_write: self.depth_write,
            ..material.clone()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlannedPrimitive {
    pub node: NodeId,
    pub state: NodeState,
}

/// Target state of every primitive for one presentation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MaterialPlan {
    /// Clamped step shown, or `None` with step mode off.
    pub step: Option<usize>,
    pub primitives: Vec<PlannedPrimitive>,
}

impl MaterialPlan {
    pub fn state_of(&self, node: NodeId) -> Option<NodeState> {
        self.primitives
            .iter()
            .find(|p| p.node == node)
            .map(|p| p.state)
    }

    pub fn count(&self, state: NodeState) -> usize {
        self.primitives.iter().filter(|p| p.state == state).count()
    }
}

/// Decide the state of every primitive.
///
/// With `step` set, primitives take the state of their top-level ancestor's
/// bucket; with `None` (step mode off) everything is solid.
pub fn plan(scene: &Scene, steps: &StepPlan, step: Option<usize>) -> MaterialPlan {
    let Some(step) = step else {
        return MaterialPlan {
            step: None,
            primitives: scene
                .primitives()
                .map(|node| PlannedPrimitive {
                    node,
                    state: NodeState::Solid,
                })
                .collect(),
        };
    };

    let partition = steps.partition(step);
    let mut primitives = Vec::new();
    for (roots, state) in [
        (&partition.built, NodeState::Ghost),
        (&partition.current, NodeState::Solid),
        (&partition.not_yet_built, NodeState::Hidden),
    ] {
        for &root in roots {
            primitives.extend(
                scene
                    .primitives_under(root)
                    .into_iter()
                    .map(|node| PlannedPrimitive { node, state }),
            );
        }
    }

    MaterialPlan {
        step: Some(partition.index),
        primitives,
    }
}

/// Bring the scene into the planned state.
pub fn apply(scene: &mut Scene, plan: &MaterialPlan, style: &GhostStyle) {
    scene.ghost_style = *style;
    for planned in &plan.primitives {
        scene.states.insert(planned.node, planned.state);
        scene.set_visible(planned.node, planned.state != NodeState::Hidden);
        refresh_material(scene, planned.node);
    }
}

/// The material a primitive should show in its current state: theme
/// colour first, then brick highlighting, ghosting on top.
pub(crate) fn derive_material(scene: &Scene, node: NodeId) -> Option<Material> {
    let mut material = scene.original_material(node)?.clone();
    let color_id = scene.get(node)?.color_id;
    if let Some(color) = scene.theme().and_then(|t| t.color_for(color_id)) {
        recolor(&mut material, color);
    }
    if let Some(highlight) = &scene.highlight {
        material = highlight.style.apply(&material, highlight.brick_of(node));
    }
    if scene.state(node) == NodeState::Ghost {
        material = scene.ghost_style.apply(&material);
    }
    Some(material)
}

/// Re-derive a primitive's material. Hidden primitives just drop back to
/// their original.
pub(crate) fn refresh_material(scene: &mut Scene, node: NodeId) {
    if scene.state(node) == NodeState::Hidden {
        scene.bindings.remove(&node);
        return;
    }
    if let Some(material) = derive_material(scene, node) {
        scene.set_material(node, material);
    }
}
