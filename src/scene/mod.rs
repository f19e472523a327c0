//! The scene graph produced by loading a model.
//!
//! Nodes live in a per-scene arena and refer to each other by [`NodeId`].
//! Part geometry is shared with the [`ResourceCache`] through counted
//! handles; inline polygons and materials belong to the scene alone. A scene
//! gives everything back when it is disposed, explicitly or on drop.

mod builder;
pub mod geometry;
pub mod loader;
pub mod material;
#[cfg(test)]
pub(crate) mod testing;

pub use geometry::{ColourSlot, EdgeLine, PartGeometry, Triangle};
pub use loader::{LoadProgress, LoadTicket, SceneLoader, TicketIssuer};
pub use material::{Material, MaterialId, MaterialTable};

use crate::cache::ResourceCache;
use crate::device::GeometryHandle;
use crate::format::Palette;
use crate::steps::highlight::Highlighting;
use crate::steps::{BrickHighlight, ColorTheme, GhostStyle, NodeState};
use crate::types::BoundingBox;
use glam::Mat4;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::debug;

/// Index of a node in its scene.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub usize);

/// Where a primitive's geometry comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GeometrySource {
    /// Library part held through the cache under this key.
    Shared { key: String },
    /// Inline polygons owned by this scene.
    Owned,
}

/// Renderable geometry with its canonical material.
#[derive(Debug, Clone)]
pub struct Primitive {
    pub geometry: Arc<PartGeometry>,
    pub handle: GeometryHandle,
    pub source: GeometrySource,
    pub original_material: MaterialId,
}

#[derive(Debug, Clone)]
pub enum NodeKind {
    Group { children: Vec<NodeId> },
    Primitive(Primitive),
}

#[derive(Debug, Clone)]
pub struct SceneNode {
    pub name: String,
    pub kind: NodeKind,
    /// Transform relative to the parent.
    pub transform: Mat4,
    /// This node starts a new build step among its siblings.
    pub step_marker: bool,
    /// Effective colour code, with 16 already resolved against the parent.
    pub color_id: u32,
    pub parent: Option<NodeId>,
    pub visible: bool,
}

impl SceneNode {
    pub fn is_primitive(&self) -> bool {
        matches!(self.kind, NodeKind::Primitive(_))
    }

    pub fn primitive(&self) -> Option<&Primitive> {
        match &self.kind {
            NodeKind::Primitive(p) => Some(p),
            NodeKind::Group { .. } => None,
        }
    }
}

/// A primitive currently showing something other than its original material.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MaterialBinding {
    pub node: NodeId,
    pub original: MaterialId,
    pub current: MaterialId,
}

/// A loaded model.
#[derive(Debug)]
pub struct Scene {
    pub(crate) root: NodeId,
    pub(crate) generation: u64,
    pub(crate) nodes: Vec<SceneNode>,
    pub(crate) materials: MaterialTable,
    pub(crate) bindings: BTreeMap<NodeId, MaterialBinding>,
    pub(crate) states: HashMap<NodeId, NodeState>,
    pub(crate) theme: Option<ColorTheme>,
    pub(crate) highlight: Option<Highlighting>,
    pub(crate) ghost_style: GhostStyle,
    palette: Arc<Palette>,
    palette_key: String,
    /// Cache keys of the documents this scene was built from.
    documents: Vec<String>,
    cache: ResourceCache,
    disposed: bool,
}

impl Scene {
    /// An empty scene holding one palette reference.
    pub(crate) fn new(
        generation: u64,
        cache: ResourceCache,
        palette: Arc<Palette>,
        palette_key: String,
    ) -> Self {
        Self {
            root: NodeId(0),
            generation,
            nodes: Vec::new(),
            materials: MaterialTable::new(),
            bindings: BTreeMap::new(),
            states: HashMap::new(),
            theme: None,
            highlight: None,
            ghost_style: GhostStyle::default(),
            palette,
            palette_key,
            documents: Vec::new(),
            cache,
            disposed: false,
        }
    }

    /// Take over one counted document reference from the loader.
    pub(crate) fn hold_document(&mut self, key: String) {
        self.documents.push(key);
    }

    /// Keys of the cached documents this scene holds.
    pub fn documents(&self) -> &[String] {
        &self.documents
    }

    pub(crate) fn push_node(&mut self, node: SceneNode) -> NodeId {
        self.nodes.push(node);
        NodeId(self.nodes.len() - 1)
    }

    /// The shared original material for a colour code.
    pub(crate) fn original_material_for(&mut self, code: u32) -> MaterialId {
        let material = Material::from_colour(&self.palette.resolve(code));
        let device = self.cache.device().clone();
        self.materials.intern(material, device.as_ref())
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn get(&self, id: NodeId) -> Option<&SceneNode> {
        self.nodes.get(id.0)
    }

    /// Panics if the id does not belong to this scene.
    pub fn node(&self, id: NodeId) -> &SceneNode {
        &self.nodes[id.0]
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        match self.get(id).map(|n| &n.kind) {
            Some(NodeKind::Group { children }) => children,
            _ => &[],
        }
    }

    /// Every primitive, in arena order.
    pub fn primitives(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.nodes
            .iter()
            .enumerate()
            .filter(|(_, n)| n.is_primitive())
            .map(|(i, _)| NodeId(i))
    }

    /// Primitives in the subtree rooted at `id` (including `id` itself).
    pub fn primitives_under(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            match self.get(current).map(|n| &n.kind) {
                Some(NodeKind::Primitive(_)) => out.push(current),
                Some(NodeKind::Group { children }) => stack.extend(children.iter().rev()),
                None => {}
            }
        }
        out
    }

    pub fn world_transform(&self, id: NodeId) -> Mat4 {
        let mut matrix = Mat4::IDENTITY;
        let mut current = self.get(id);
        while let Some(node) = current {
            matrix = node.transform * matrix;
            current = node.parent.and_then(|p| self.get(p));
        }
        matrix
    }

    /// World-space bounds of a primitive's geometry.
    pub fn world_bounds(&self, id: NodeId) -> Option<BoundingBox> {
        let primitive = self.get(id)?.primitive()?;
        let local = primitive.geometry.bounds()?;
        Some(local.transformed(&self.world_transform(id)))
    }

    /// Visible itself and through all its ancestors.
    pub fn is_visible(&self, id: NodeId) -> bool {
        let mut current = self.get(id);
        while let Some(node) = current {
            if !node.visible {
                return false;
            }
            current = node.parent.and_then(|p| self.get(p));
        }
        true
    }

    pub(crate) fn set_visible(&mut self, id: NodeId, visible: bool) {
        if let Some(node) = self.nodes.get_mut(id.0) {
            node.visible = visible;
        }
    }

    pub fn palette(&self) -> &Palette {
        &self.palette
    }

    pub fn materials(&self) -> &MaterialTable {
        &self.materials
    }

    /// The material a primitive currently displays.
    pub fn current_material_id(&self, id: NodeId) -> Option<MaterialId> {
        let primitive = self.get(id)?.primitive()?;
        Some(
            self.bindings
                .get(&id)
                .map_or(primitive.original_material, |b| b.current),
        )
    }

    pub fn material(&self, id: NodeId) -> Option<&Material> {
        self.materials.get(self.current_material_id(id)?)
    }

    pub fn original_material(&self, id: NodeId) -> Option<&Material> {
        self.materials.get(self.get(id)?.primitive()?.original_material)
    }

    pub fn binding(&self, id: NodeId) -> Option<&MaterialBinding> {
        self.bindings.get(&id)
    }

    pub fn bindings(&self) -> impl Iterator<Item = &MaterialBinding> {
        self.bindings.values()
    }

    /// Presentation state of a primitive; solid until a step is applied.
    pub fn state(&self, id: NodeId) -> NodeState {
        self.states.get(&id).copied().unwrap_or(NodeState::Solid)
    }

    pub fn theme(&self) -> Option<&ColorTheme> {
        self.theme.as_ref()
    }

    pub fn highlight(&self) -> Option<&BrickHighlight> {
        self.highlight.as_ref().map(|h| &h.style)
    }

    /// Show `material` on a primitive.
    ///
    /// A material equal to the original removes the binding; anything else
    /// is interned (reusing an identical existing material) and bound.
    pub(crate) fn set_material(&mut self, id: NodeId, material: Material) {
        let Some(original) = self
            .get(id)
            .and_then(|n| n.primitive())
            .map(|p| p.original_material)
        else {
            return;
        };

        if self.materials.get(original) == Some(&material) {
            self.bindings.remove(&id);
            return;
        }

        let device = self.cache.device().clone();
        let current = self.materials.intern(material, device.as_ref());
        self.bindings.insert(
            id,
            MaterialBinding {
                node: id,
                original,
                current,
            },
        );
    }

    pub fn triangle_count(&self) -> usize {
        self.nodes
            .iter()
            .filter_map(|n| n.primitive())
            .map(|p| p.geometry.triangle_count())
            .sum()
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed
    }

    /// Release owned geometry, every material, and the shared references
    /// to geometry, documents and the palette.
    ///
    /// Safe to call more than once.
    pub fn dispose(&mut self) {
        if self.disposed {
            return;
        }
        let device = self.cache.device().clone();

        for node in &self.nodes {
            if let NodeKind::Primitive(primitive) = &node.kind {
                match &primitive.source {
                    GeometrySource::Shared { key } => self.cache.release_geometry(key),
                    GeometrySource::Owned => device.destroy_geometry(primitive.handle),
                }
            }
        }
        self.materials.release(device.as_ref());
        self.bindings.clear();
        self.states.clear();
        for key in self.documents.drain(..) {
            self.cache.release_document(&key);
        }
        self.cache.release_palette(&self.palette_key);
        self.disposed = true;
        debug!("disposed scene of generation {}", self.generation);
    }
}

impl Drop for Scene {
    fn drop(&mut self) {
        self.dispose();
    }
}
