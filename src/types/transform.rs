//! Transform helpers for LDraw placement matrices.

use glam::{Mat4, Vec3, Vec4};

/// Build a placement matrix from the twelve numbers of a type-1 line.
///
/// LDraw writes `x y z a b c d e f g h i`, where the rotation rows are
/// `[a b c] [d e f] [g h i]` and a point maps to `R * p + (x, y, z)`.
pub fn ldraw_matrix(values: &[f32; 12]) -> Mat4 {
    let [x, y, z, a, b, c, d, e, f, g, h, i] = *values;
    Mat4::from_cols(
        Vec4::new(a, d, g, 0.0),
        Vec4::new(b, e, h, 0.0),
        Vec4::new(c, f, i, 0.0),
        Vec4::new(x, y, z, 1.0),
    )
}

/// One-time root transform from LDraw's Y-down convention to Y-up.
pub fn orientation_fix() -> Mat4 {
    Mat4::from_rotation_x(std::f32::consts::PI)
}

/// Whether the matrix mirrors geometry (negative determinant).
pub fn is_mirroring(matrix: &Mat4) -> bool {
    matrix.determinant() < 0.0
}

/// Convenience for tests and synthetic documents: a pure translation.
pub fn translation(x: f32, y: f32, z: f32) -> Mat4 {
    Mat4::from_translation(Vec3::new(x, y, z))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_placement() {
        let m = ldraw_matrix(&[10.0, -24.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0]);
        assert_eq!(m, translation(10.0, -24.0, 0.0));
        assert!(!is_mirroring(&m));
    }

    #[test]
    fn test_rotation_rows() {
        // 90 degrees about Y as written by LDraw exporters: 0 0 -1 / 0 1 0 / 1 0 0
        let m = ldraw_matrix(&[0.0, 0.0, 0.0, 0.0, 0.0, -1.0, 0.0, 1.0, 0.0, 1.0, 0.0, 0.0]);
        let p = m.transform_point3(Vec3::new(1.0, 0.0, 0.0));
        assert!((p - Vec3::new(0.0, 0.0, 1.0)).length() < 1e-6);
    }

    #[test]
    fn test_mirror_detection() {
        let m = ldraw_matrix(&[0.0, 0.0, 0.0, -1.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0]);
        assert!(is_mirroring(&m));
    }
}
