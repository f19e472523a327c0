//! GPU resource boundary.
//!
//! The loader and presentation layers create and destroy GPU objects only
//! through [`RenderDevice`]. [`HeadlessDevice`] hands out opaque handles and
//! tracks which are still alive, which is what leak checks and the
//! thumbnail renderer need.

use crate::scene::{Material, PartGeometry};
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};

/// Handle to uploaded geometry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GeometryHandle(pub u64);

/// Handle to an uploaded material.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MaterialHandle(pub u64);

/// Creates and destroys GPU-backed resources.
pub trait RenderDevice: Send + Sync {
    fn create_geometry(&self, geometry: &PartGeometry) -> GeometryHandle;
    fn destroy_geometry(&self, handle: GeometryHandle);
    fn create_material(&self, material: &Material) -> MaterialHandle;
    fn destroy_material(&self, handle: MaterialHandle);
}

/// A device without a GPU that only does bookkeeping.
#[derive(Debug, Default)]
pub struct HeadlessDevice {
    next: AtomicU64,
    geometries: Mutex<HashSet<u64>>,
    materials: Mutex<HashSet<u64>>,
    geometries_created: AtomicU64,
}

impl HeadlessDevice {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn live_geometries(&self) -> usize {
        self.geometries.lock().len()
    }

    pub fn live_materials(&self) -> usize {
        self.materials.lock().len()
    }

    /// Total geometry uploads since creation.
    pub fn geometries_created(&self) -> u64 {
        self.geometries_created.load(Ordering::SeqCst)
    }

    fn next_id(&self) -> u64 {
        self.next.fetch_add(1, Ordering::SeqCst)
    }
}

impl RenderDevice for HeadlessDevice {
    fn create_geometry(&self, _geometry: &PartGeometry) -> GeometryHandle {
        let id = self.next_id();
        self.geometries.lock().insert(id);
        self.geometries_created.fetch_add(1, Ordering::SeqCst);
        GeometryHandle(id)
    }

    fn destroy_geometry(&self, handle: GeometryHandle) {
        if !self.geometries.lock().remove(&handle.0) {
            tracing::warn!("geometry {} destroyed twice", handle.0);
        }
    }

    fn create_material(&self, _material: &Material) -> MaterialHandle {
        let id = self.next_id();
        self.materials.lock().insert(id);
        MaterialHandle(id)
    }

    fn destroy_material(&self, handle: MaterialHandle) {
        if !self.materials.lock().remove(&handle.0) {
            tracing::warn!("material {} destroyed twice", handle.0);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_headless_device_tracks_live_handles() {
        let device = HeadlessDevice::new();
        let g = device.create_geometry(&PartGeometry::new());
        let h = device.create_geometry(&PartGeometry::new());
        assert_ne!(g, h);
        assert_eq!(device.live_geometries(), 2);

        device.destroy_geometry(g);
        assert_eq!(device.live_geometries(), 1);
        assert_eq!(device.geometries_created(), 2);

        // double free is reported, not counted
        device.destroy_geometry(g);
        assert_eq!(device.live_geometries(), 1);
    }
}
