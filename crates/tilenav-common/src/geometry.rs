//! 2D geometry for navigation queries
//!
//! All "2D" operations project onto the XZ plane (Y-up world). Degenerate
//! inputs (zero-length edges, collinear triangles) degrade to "no
//! intersection" rather than returning errors.

use crate::math::{vdot_2d, vperp_2d, vsub};

/// Twice the signed area of a triangle on the XZ plane.
///
/// The sign encodes winding: positive when `c` is to the left of `a -> b`
/// looking down the Y axis.
#[inline]
pub fn tri_area_2d(a: &[f32; 3], b: &[f32; 3], c: &[f32; 3]) -> f32 {
    let abx = b[0] - a[0];
    let abz = b[2] - a[2];
    let acx = c[0] - a[0];
    let acz = c[2] - a[2];
    acx * abz - abx * acz
}

/// Checks if two axis-aligned bounds overlap.
#[inline]
pub fn overlap_bounds(amin: &[f32; 3], amax: &[f32; 3], bmin: &[f32; 3], bmax: &[f32; 3]) -> bool {
    amin[0] <= bmax[0]
        && amax[0] >= bmin[0]
        && amin[1] <= bmax[1]
        && amax[1] >= bmin[1]
        && amin[2] <= bmax[2]
        && amax[2] >= bmin[2]
}

/// Checks if two quantized axis-aligned bounds overlap.
#[inline]
pub fn overlap_quant_bounds(
    amin: &[u16; 3],
    amax: &[u16; 3],
    bmin: &[u16; 3],
    bmax: &[u16; 3],
) -> bool {
    amin[0] <= bmax[0]
        && amax[0] >= bmin[0]
        && amin[1] <= bmax[1]
        && amax[1] >= bmin[1]
        && amin[2] <= bmax[2]
        && amax[2] >= bmin[2]
}

/// Overlap test of two scalar ranges with an epsilon shrink.
#[inline]
pub fn overlap_range(amin: f32, amax: f32, bmin: f32, bmax: f32, eps: f32) -> bool {
    (amin + eps) <= bmax && (amax - eps) >= bmin
}

/// Height of a point over a triangle, if the point projects inside it.
///
/// Returns `None` when the projection falls outside the triangle or the
/// triangle is degenerate.
pub fn closest_height_point_triangle(
    p: &[f32; 3],
    a: &[f32; 3],
    b: &[f32; 3],
    c: &[f32; 3],
) -> Option<f32> {
    let v0 = vsub(c, a);
    let v1 = vsub(b, a);
    let v2 = vsub(p, a);

    let dot00 = vdot_2d(&v0, &v0);
    let dot01 = vdot_2d(&v0, &v1);
    let dot02 = vdot_2d(&v0, &v2);
    let dot11 = vdot_2d(&v1, &v1);
    let dot12 = vdot_2d(&v1, &v2);

    let denom = dot00 * dot11 - dot01 * dot01;
    if denom.abs() < 1e-9 {
        return None;
    }
    let inv_denom = 1.0 / denom;
    let u = (dot11 * dot02 - dot01 * dot12) * inv_denom;
    let v = (dot00 * dot12 - dot01 * dot02) * inv_denom;

    const EPS: f32 = 1e-4;
    if u >= -EPS && v >= -EPS && (u + v) <= 1.0 + EPS {
        Some(a[1] + v0[1] * u + v1[1] * v)
    } else {
        None
    }
}

/// Clips a 2D segment against a convex polygon.
///
/// On success returns `(tmin, tmax, seg_min, seg_max)`: the entry/exit
/// parameters along `p0 -> p1` and the polygon edge indices crossed at each
/// (`-1` when the corresponding endpoint lies inside the polygon).
pub fn intersect_segment_poly_2d(
    p0: &[f32; 3],
    p1: &[f32; 3],
    verts: &[f32],
    nverts: usize,
) -> Option<(f32, f32, i32, i32)> {
    const EPS: f32 = 0.00000001;

    let mut tmin = 0.0f32;
    let mut tmax = 1.0f32;
    let mut seg_min: i32 = -1;
    let mut seg_max: i32 = -1;

    let dir = vsub(p1, p0);

    let mut j = nverts - 1;
    for i in 0..nverts {
        let vj = [verts[j * 3], verts[j * 3 + 1], verts[j * 3 + 2]];
        let vi = [verts[i * 3], verts[i * 3 + 1], verts[i * 3 + 2]];
        let edge = vsub(&vi, &vj);
        let diff = vsub(p0, &vj);
        let n = vperp_2d(&edge, &diff);
        let d = vperp_2d(&dir, &edge);
        if d.abs() < EPS {
            // Segment is nearly parallel to this edge.
            if n < 0.0 {
                return None;
            }
            j = i;
            continue;
        }
        let t = n / d;
        if d < 0.0 {
            // Crossing into the polygon.
            if t > tmin {
                tmin = t;
                seg_min = j as i32;
                if tmin > tmax {
                    return None;
                }
            }
        } else {
            // Crossing out of the polygon.
            if t < tmax {
                tmax = t;
                seg_max = j as i32;
                if tmax < tmin {
                    return None;
                }
            }
        }
        j = i;
    }

    Some((tmin, tmax, seg_min, seg_max))
}

/// Intersection parameters of two 2D segments, or `None` when parallel.
pub fn intersect_seg_seg_2d(
    ap: &[f32; 3],
    aq: &[f32; 3],
    bp: &[f32; 3],
    bq: &[f32; 3],
) -> Option<(f32, f32)> {
    let u = vsub(aq, ap);
    let v = vsub(bq, bp);
    let w = vsub(ap, bp);
    let d = vperp_2d(&u, &v);
    if d.abs() < 1e-6 {
        return None;
    }
    let s = vperp_2d(&v, &w) / d;
    let t = vperp_2d(&u, &w) / d;
    Some((s, t))
}

/// Even-odd point-in-polygon test on the XZ plane.
///
/// Points on the edge are conservatively reported as inside.
pub fn point_in_polygon(pt: &[f32; 3], verts: &[f32], nverts: usize) -> bool {
    let mut c = false;
    let mut j = nverts - 1;
    for i in 0..nverts {
        let vi = [verts[i * 3], verts[i * 3 + 1], verts[i * 3 + 2]];
        let vj = [verts[j * 3], verts[j * 3 + 1], verts[j * 3 + 2]];
        if ((vi[2] > pt[2]) != (vj[2] > pt[2]))
            && (pt[0] < (vj[0] - vi[0]) * (pt[2] - vi[2]) / (vj[2] - vi[2]) + vi[0])
        {
            c = !c;
        }
        j = i;
    }
    c
}

/// Squared distance from a point to each polygon edge, plus the edge
/// parameters of the closest points. Returns `true` when the point lies
/// inside the polygon.
pub fn distance_pt_poly_edges_sqr(
    pt: &[f32; 3],
    verts: &[f32],
    nverts: usize,
    ed: &mut [f32],
    et: &mut [f32],
) -> bool {
    let mut c = false;
    let mut j = nverts - 1;
    for i in 0..nverts {
        let vi = [verts[i * 3], verts[i * 3 + 1], verts[i * 3 + 2]];
        let vj = [verts[j * 3], verts[j * 3 + 1], verts[j * 3 + 2]];
        if ((vi[2] > pt[2]) != (vj[2] > pt[2]))
            && (pt[0] < (vj[0] - vi[0]) * (pt[2] - vi[2]) / (vj[2] - vi[2]) + vi[0])
        {
            c = !c;
        }
        let (d, t) = dist_pt_seg_sqr_2d(pt, &vj, &vi);
        ed[j] = d;
        et[j] = t;
        j = i;
    }
    c
}

/// Squared XZ distance from a point to a segment, plus the segment
/// parameter of the closest point.
pub fn dist_pt_seg_sqr_2d(pt: &[f32; 3], p: &[f32; 3], q: &[f32; 3]) -> (f32, f32) {
    let pqx = q[0] - p[0];
    let pqz = q[2] - p[2];
    let dx = pt[0] - p[0];
    let dz = pt[2] - p[2];
    let d = pqx * pqx + pqz * pqz;
    let mut t = pqx * dx + pqz * dz;
    if d > 0.0 {
        t /= d;
    }
    t = t.clamp(0.0, 1.0);
    let dx = p[0] + t * pqx - pt[0];
    let dz = p[2] + t * pqz - pt[2];
    (dx * dx + dz * dz, t)
}

/// Centroid of a polygon given its vertex indices into a flat vertex array.
pub fn calc_poly_center(idx: &[u16], verts: &[f32]) -> [f32; 3] {
    let mut tc = [0.0f32; 3];
    for &vi in idx {
        let v = &verts[vi as usize * 3..vi as usize * 3 + 3];
        tc[0] += v[0];
        tc[1] += v[1];
        tc[2] += v[2];
    }
    if !idx.is_empty() {
        let s = 1.0 / idx.len() as f32;
        tc[0] *= s;
        tc[1] *= s;
        tc[2] *= s;
    }
    tc
}

fn project_poly_2d(axis: &[f32; 3], verts: &[f32], nverts: usize) -> (f32, f32) {
    let v0 = [verts[0], verts[1], verts[2]];
    let mut rmin = vdot_2d(axis, &v0);
    let mut rmax = rmin;
    for i in 1..nverts {
        let v = [verts[i * 3], verts[i * 3 + 1], verts[i * 3 + 2]];
        let d = vdot_2d(axis, &v);
        rmin = rmin.min(d);
        rmax = rmax.max(d);
    }
    (rmin, rmax)
}

/// Separating-axis overlap test of two convex polygons on the XZ plane.
///
/// Polygons sharing only an edge or vertex are reported as non-overlapping.
pub fn overlap_poly_poly_2d(polya: &[f32], npolya: usize, polyb: &[f32], npolyb: usize) -> bool {
    const EPS: f32 = 1e-4;

    for (verts, n) in [(polya, npolya), (polyb, npolyb)] {
        let mut j = n - 1;
        for i in 0..n {
            let va = [verts[j * 3], verts[j * 3 + 1], verts[j * 3 + 2]];
            let vb = [verts[i * 3], verts[i * 3 + 1], verts[i * 3 + 2]];
            let axis = [vb[2] - va[2], 0.0, -(vb[0] - va[0])];
            let (amin, amax) = project_poly_2d(&axis, polya, npolya);
            let (bmin, bmax) = project_poly_2d(&axis, polyb, npolyb);
            if !overlap_range(amin, amax, bmin, bmax, EPS) {
                return false;
            }
            j = i;
        }
    }
    true
}

/// Uniform random point in a convex polygon from two unit random samples.
pub fn random_point_in_convex_poly(pts: &[f32], npts: usize, s: f32, t: f32) -> [f32; 3] {
    // Triangulate as a fan and pick a triangle weighted by area.
    let mut areas = [0.0f32; 16];
    let mut area_sum = 0.0f32;
    for i in 2..npts {
        let a = [pts[0], pts[1], pts[2]];
        let b = [pts[(i - 1) * 3], pts[(i - 1) * 3 + 1], pts[(i - 1) * 3 + 2]];
        let c = [pts[i * 3], pts[i * 3 + 1], pts[i * 3 + 2]];
        areas[i] = tri_area_2d(&a, &b, &c).abs();
        area_sum += areas[i].max(0.001);
    }

    let thr = s * area_sum;
    let mut acc = 0.0f32;
    let mut u = 1.0f32;
    let mut tri = npts - 1;
    for i in 2..npts {
        let dacc = areas[i].max(0.001);
        if thr >= acc && thr < acc + dacc {
            u = (thr - acc) / dacc;
            tri = i;
            break;
        }
        acc += dacc;
    }

    let v = t.sqrt();

    let a = 1.0 - v;
    let b = (1.0 - u) * v;
    let c = u * v;
    let pa = [pts[0], pts[1], pts[2]];
    let pb = [
        pts[(tri - 1) * 3],
        pts[(tri - 1) * 3 + 1],
        pts[(tri - 1) * 3 + 2],
    ];
    let pc = [pts[tri * 3], pts[tri * 3 + 1], pts[tri * 3 + 2]];

    [
        a * pa[0] + b * pb[0] + c * pc[0],
        a * pa[1] + b * pb[1] + c * pc[1],
        a * pa[2] + b * pb[2] + c * pc[2],
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    const SQUARE: [f32; 12] = [
        0.0, 0.0, 0.0, //
        10.0, 0.0, 0.0, //
        10.0, 0.0, 10.0, //
        0.0, 0.0, 10.0,
    ];

    #[test]
    fn point_in_square() {
        assert!(point_in_polygon(&[5.0, 0.0, 5.0], &SQUARE, 4));
        assert!(!point_in_polygon(&[15.0, 0.0, 5.0], &SQUARE, 4));
        assert!(!point_in_polygon(&[-0.1, 0.0, 5.0], &SQUARE, 4));
    }

    #[test]
    fn segment_fully_inside_square() {
        let res = intersect_segment_poly_2d(&[2.0, 0.0, 2.0], &[8.0, 0.0, 8.0], &SQUARE, 4);
        let (tmin, tmax, smin, smax) = res.unwrap();
        assert_eq!(tmin, 0.0);
        assert_eq!(tmax, 1.0);
        assert_eq!(smin, -1);
        assert_eq!(smax, -1);
    }

    #[test]
    fn segment_exits_square() {
        let res = intersect_segment_poly_2d(&[5.0, 0.0, 5.0], &[15.0, 0.0, 5.0], &SQUARE, 4);
        let (_, tmax, _, seg_max) = res.unwrap();
        assert!((tmax - 0.5).abs() < 1e-5);
        assert!(seg_max >= 0);
    }

    #[test]
    fn segment_misses_square() {
        assert!(
            intersect_segment_poly_2d(&[20.0, 0.0, 20.0], &[30.0, 0.0, 20.0], &SQUARE, 4).is_none()
        );
    }

    #[test]
    fn seg_seg_crossing() {
        let (s, t) = intersect_seg_seg_2d(
            &[0.0, 0.0, 0.0],
            &[10.0, 0.0, 0.0],
            &[5.0, 0.0, -5.0],
            &[5.0, 0.0, 5.0],
        )
        .unwrap();
        assert!((s - 0.5).abs() < 1e-6);
        assert!((t - 0.5).abs() < 1e-6);
    }

    #[test]
    fn height_on_flat_triangle() {
        let h = closest_height_point_triangle(
            &[2.0, 50.0, 2.0],
            &[0.0, 1.0, 0.0],
            &[10.0, 1.0, 0.0],
            &[0.0, 1.0, 10.0],
        );
        assert!((h.unwrap() - 1.0).abs() < 1e-5);
    }

    #[test]
    fn dist_to_segment() {
        let (d, t) = dist_pt_seg_sqr_2d(&[5.0, 0.0, 3.0], &[0.0, 0.0, 0.0], &[10.0, 0.0, 0.0]);
        assert!((d - 9.0).abs() < 1e-5);
        assert!((t - 0.5).abs() < 1e-5);
    }

    #[test]
    fn disjoint_polys_do_not_overlap() {
        let other: [f32; 12] = [
            20.0, 0.0, 0.0, //
            30.0, 0.0, 0.0, //
            30.0, 0.0, 10.0, //
            20.0, 0.0, 10.0,
        ];
        assert!(!overlap_poly_poly_2d(&SQUARE, 4, &other, 4));
        assert!(overlap_poly_poly_2d(&SQUARE, 4, &SQUARE, 4));
    }

    #[test]
    fn random_point_stays_inside() {
        for (s, t) in [(0.0, 0.0), (0.25, 0.75), (0.5, 0.5), (0.99, 0.99)] {
            let pt = random_point_in_convex_poly(&SQUARE, 4, s, t);
            assert!(pt[0] >= -1e-4 && pt[0] <= 10.0 + 1e-4);
            assert!(pt[2] >= -1e-4 && pt[2] <= 10.0 + 1e-4);
        }
    }
}
