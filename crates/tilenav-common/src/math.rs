//! Scalar and `[f32; 3]` vector helpers
//!
//! Positions flow through the engine as `[f32; 3]` arrays so that tile
//! payloads can be sliced without conversion; [`crate::Vec3`] is available
//! for callers that prefer glam types.

use crate::Vec3;

/// Clamps a value to the given range.
#[inline]
pub fn clamp<T: PartialOrd>(v: T, mn: T, mx: T) -> T {
    if v < mn {
        mn
    } else if v > mx {
        mx
    } else {
        v
    }
}

/// Squares a value.
#[inline]
pub fn sqr<T: std::ops::Mul<Output = T> + Copy>(a: T) -> T {
    a * a
}

/// Cross product of two vectors.
#[inline]
pub fn vcross(v1: &[f32; 3], v2: &[f32; 3]) -> [f32; 3] {
    [
        v1[1] * v2[2] - v1[2] * v2[1],
        v1[2] * v2[0] - v1[0] * v2[2],
        v1[0] * v2[1] - v1[1] * v2[0],
    ]
}

/// Dot product of two vectors.
#[inline]
pub fn vdot(v1: &[f32; 3], v2: &[f32; 3]) -> f32 {
    v1[0] * v2[0] + v1[1] * v2[1] + v1[2] * v2[2]
}

/// Returns `v1 + v2 * s`.
#[inline]
pub fn vmad(v1: &[f32; 3], v2: &[f32; 3], s: f32) -> [f32; 3] {
    [v1[0] + v2[0] * s, v1[1] + v2[1] * s, v1[2] + v2[2] * s]
}

/// Linear interpolation between two points.
#[inline]
pub fn vlerp(v1: &[f32; 3], v2: &[f32; 3], t: f32) -> [f32; 3] {
    [
        v1[0] + (v2[0] - v1[0]) * t,
        v1[1] + (v2[1] - v1[1]) * t,
        v1[2] + (v2[2] - v1[2]) * t,
    ]
}

/// Component-wise sum.
#[inline]
pub fn vadd(v1: &[f32; 3], v2: &[f32; 3]) -> [f32; 3] {
    [v1[0] + v2[0], v1[1] + v2[1], v1[2] + v2[2]]
}

/// Component-wise difference.
#[inline]
pub fn vsub(v1: &[f32; 3], v2: &[f32; 3]) -> [f32; 3] {
    [v1[0] - v2[0], v1[1] - v2[1], v1[2] - v2[2]]
}

/// Scales a vector.
#[inline]
pub fn vscale(v: &[f32; 3], t: f32) -> [f32; 3] {
    [v[0] * t, v[1] * t, v[2] * t]
}

/// Component-wise minimum, updated in place.
#[inline]
pub fn vmin(mn: &mut [f32; 3], v: &[f32; 3]) {
    mn[0] = mn[0].min(v[0]);
    mn[1] = mn[1].min(v[1]);
    mn[2] = mn[2].min(v[2]);
}

/// Component-wise maximum, updated in place.
#[inline]
pub fn vmax(mx: &mut [f32; 3], v: &[f32; 3]) {
    mx[0] = mx[0].max(v[0]);
    mx[1] = mx[1].max(v[1]);
    mx[2] = mx[2].max(v[2]);
}

/// Vector length.
#[inline]
pub fn vlen(v: &[f32; 3]) -> f32 {
    vdot(v, v).sqrt()
}

/// Distance between two points.
#[inline]
pub fn vdist(v1: &[f32; 3], v2: &[f32; 3]) -> f32 {
    vdist_sqr(v1, v2).sqrt()
}

/// Squared distance between two points.
#[inline]
pub fn vdist_sqr(v1: &[f32; 3], v2: &[f32; 3]) -> f32 {
    let dx = v2[0] - v1[0];
    let dy = v2[1] - v1[1];
    let dz = v2[2] - v1[2];
    dx * dx + dy * dy + dz * dz
}

/// Distance between two points on the XZ plane.
#[inline]
pub fn vdist_2d(v1: &[f32; 3], v2: &[f32; 3]) -> f32 {
    vdist_2d_sqr(v1, v2).sqrt()
}

/// Squared distance between two points on the XZ plane.
#[inline]
pub fn vdist_2d_sqr(v1: &[f32; 3], v2: &[f32; 3]) -> f32 {
    let dx = v2[0] - v1[0];
    let dz = v2[2] - v1[2];
    dx * dx + dz * dz
}

/// Normalizes a vector in place. Leaves near-zero vectors untouched.
#[inline]
pub fn vnormalize(v: &mut [f32; 3]) {
    let d = vlen(v);
    if d > 1e-6 {
        let inv = 1.0 / d;
        v[0] *= inv;
        v[1] *= inv;
        v[2] *= inv;
    }
}

/// Approximate equality of two points.
#[inline]
pub fn vequal(p0: &[f32; 3], p1: &[f32; 3]) -> bool {
    const THR: f32 = (1.0 / 16384.0) * (1.0 / 16384.0);
    vdist_sqr(p0, p1) < THR
}

/// Checks that all components are finite.
#[inline]
pub fn visfinite(v: &[f32; 3]) -> bool {
    v[0].is_finite() && v[1].is_finite() && v[2].is_finite()
}

/// XZ-plane dot product.
#[inline]
pub fn vdot_2d(u: &[f32; 3], v: &[f32; 3]) -> f32 {
    u[0] * v[0] + u[2] * v[2]
}

/// XZ-plane perp-dot product (z-component of the cross product).
#[inline]
pub fn vperp_2d(u: &[f32; 3], v: &[f32; 3]) -> f32 {
    u[0] * v[2] - u[2] * v[0]
}

/// Converts to a glam vector.
#[inline]
pub fn to_vec3(v: &[f32; 3]) -> Vec3 {
    Vec3::new(v[0], v[1], v[2])
}

/// Next power of two greater than or equal to `v`.
#[inline]
pub fn next_pow2(mut v: u32) -> u32 {
    v = v.wrapping_sub(1);
    v |= v >> 1;
    v |= v >> 2;
    v |= v >> 4;
    v |= v >> 8;
    v |= v >> 16;
    v.wrapping_add(1)
}

/// Integer base-2 logarithm.
#[inline]
pub fn ilog2(mut v: u32) -> u32 {
    let mut r;
    let mut shift;
    r = ((v > 0xffff) as u32) << 4;
    v >>= r;
    shift = ((v > 0xff) as u32) << 3;
    v >>= shift;
    r |= shift;
    shift = ((v > 0xf) as u32) << 2;
    v >>= shift;
    r |= shift;
    shift = ((v > 0x3) as u32) << 1;
    v >>= shift;
    r |= shift;
    r | (v >> 1)
}

/// Index of the tile side opposite to `side` (sides are numbered 0..8
/// counter-clockwise, two per compass direction).
#[inline]
pub fn opposite_tile_side(side: u8) -> u8 {
    (side + 4) & 0x7
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn next_pow2_rounds_up() {
        assert_eq!(next_pow2(1), 1);
        assert_eq!(next_pow2(3), 4);
        assert_eq!(next_pow2(16), 16);
        assert_eq!(next_pow2(17), 32);
    }

    #[test]
    fn ilog2_matches_pow2() {
        assert_eq!(ilog2(1), 0);
        assert_eq!(ilog2(2), 1);
        assert_eq!(ilog2(255), 7);
        assert_eq!(ilog2(256), 8);
        assert_eq!(ilog2(1 << 20), 20);
    }

    #[test]
    fn opposite_sides_pair_up() {
        assert_eq!(opposite_tile_side(0), 4);
        assert_eq!(opposite_tile_side(2), 6);
        assert_eq!(opposite_tile_side(6), 2);
        assert_eq!(opposite_tile_side(7), 3);
    }

    #[test]
    fn perp_sign_convention() {
        // +X against +Z is positive, the mirror is negative.
        let x = [1.0, 0.0, 0.0];
        let z = [0.0, 0.0, 1.0];
        assert_eq!(vperp_2d(&x, &z), 1.0);
        assert_eq!(vperp_2d(&z, &x), -1.0);
    }

    #[test]
    fn lerp_endpoints() {
        let a = [0.0, 1.0, 2.0];
        let b = [4.0, 5.0, 6.0];
        assert_eq!(vlerp(&a, &b, 0.0), a);
        assert_eq!(vlerp(&a, &b, 1.0), b);
        assert_eq!(vlerp(&a, &b, 0.5), [2.0, 3.0, 4.0]);
    }
}
