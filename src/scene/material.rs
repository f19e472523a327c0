//! Materials and the per-scene material table.

use crate::device::{MaterialHandle, RenderDevice};
use crate::format::{ColourDefinition, Finish};
use crate::types::Color;
use std::collections::HashMap;

/// Surface appearance of a primitive.
#[derive(Debug, Clone, PartialEq)]
pub struct Material {
    pub color: Color,
    pub emissive: Color,
    pub edge_color: Color,
    /// 0.0 (invisible) to 1.0 (opaque).
    pub opacity: f32,
    pub transparent: bool,
    pub depth_write: bool,
    pub metallic: bool,
}

impl Material {
    /// The canonical material of a palette colour.
    pub fn from_colour(def: &ColourDefinition) -> Self {
        let opacity = f32::from(def.alpha) / 255.0;
        let emissive = if def.luminance > 0 {
            def.value.scaled(f32::from(def.luminance) / 255.0)
        } else {
            Color::BLACK
        };
        Self {
            color: def.value,
            emissive,
            edge_color: def.edge,
            opacity,
            transparent: def.is_transparent(),
            depth_write: !def.is_transparent(),
            metallic: matches!(
                def.finish,
                Finish::Chrome | Finish::Metal | Finish::MatteMetallic | Finish::Pearlescent
            ),
        }
    }
}

/// Hashable identity of a material, floats compared by bit pattern.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct MaterialKey {
    colors: [[u32; 4]; 3],
    opacity: u32,
    flags: [bool; 3],
}

impl MaterialKey {
    fn of(material: &Material) -> Self {
        let bits = |c: &Color| [c.r.to_bits(), c.g.to_bits(), c.b.to_bits(), c.a.to_bits()];
        Self {
            colors: [
                bits(&material.color),
                bits(&material.emissive),
                bits(&material.edge_color),
            ],
            opacity: material.opacity.to_bits(),
            flags: [material.transparent, material.depth_write, material.metallic],
        }
    }
}

/// Index into a scene's [`MaterialTable`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MaterialId(pub usize);

#[derive(Debug)]
struct MaterialSlot {
    material: Material,
    handle: MaterialHandle,
}

/// Every material a scene has created, originals and derived alike.
///
/// Identical materials are stored once, so re-deriving the same look
/// returns the existing entry.
#[derive(Debug, Default)]
pub struct MaterialTable {
    slots: Vec<MaterialSlot>,
    index: HashMap<MaterialKey, MaterialId>,
}

impl MaterialTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the id of an identical material, creating it if needed.
    pub fn intern(&mut self, material: Material, device: &dyn RenderDevice) -> MaterialId {
        let key = MaterialKey::of(&material);
        if let Some(&id) = self.index.get(&key) {
            return id;
        }
        let handle = device.create_material(&material);
        let id = MaterialId(self.slots.len());
        self.slots.push(MaterialSlot { material, handle });
        self.index.insert(key, id);
        id
    }

    pub fn find(&self, material: &Material) -> Option<MaterialId> {
        self.index.get(&MaterialKey::of(material)).copied()
    }

    pub fn get(&self, id: MaterialId) -> Option<&Material> {
        self.slots.get(id.0).map(|slot| &slot.material)
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Destroy every material on the device. The table is empty afterwards.
    pub fn release(&mut self, device: &dyn RenderDevice) {
        for slot in self.slots.drain(..) {
            device.destroy_material(slot.handle);
        }
        self.index.clear();
    }
}
