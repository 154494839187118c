//! Polygon link construction
//!
//! Internal links come straight from the build-time neighbour table.
//! Boundary links are discovered at tile insertion by matching edge
//! "slabs": each border edge is projected onto the shared tile side and
//! compared as a 2D interval (coordinate along the side, height), with
//! the walkable climb as the vertical tolerance. Matching edges get a
//! link with the overlap quantized to 0..=255 sub-edge bounds.

use crate::cluster::CLUSTER_LINK_BCK_AND_FWD;
use crate::nav_mesh::{
    ClusterRef, NavMesh, PolyRef, PolyType, EXT_LINK, INTERNAL_LINK_SIDE, NULL_LINK,
};
use tilenav_common::math::{clamp, opposite_tile_side};

fn slab_coord(v: &[f32; 3], side: u8) -> f32 {
    if side == 0 || side == 4 {
        v[0]
    } else {
        v[2]
    }
}

/// Projects an edge onto its tile side as ((coord, y) min, (coord, y) max)
fn slab_end_points(va: &[f32; 3], vb: &[f32; 3], side: u8) -> ([f32; 2], [f32; 2]) {
    let axis = if side == 0 || side == 4 { 2 } else { 0 };
    if va[axis] < vb[axis] {
        ([va[axis], va[1]], [vb[axis], vb[1]])
    } else {
        ([vb[axis], vb[1]], [va[axis], va[1]])
    }
}

/// True when two boundary slabs overlap horizontally and their heights
/// agree within `py` over the shared interval
fn overlap_slabs(amin: &[f32; 2], amax: &[f32; 2], bmin: &[f32; 2], bmax: &[f32; 2], px: f32, py: f32) -> bool {
    let minx = (amin[0] + px).max(bmin[0] + px);
    let maxx = (amax[0] - px).min(bmax[0] - px);
    if minx > maxx {
        return false;
    }

    // Height deltas at both ends of the shared interval.
    let ad = (amax[1] - amin[1]) / (amax[0] - amin[0]);
    let ak = amin[1] - ad * amin[0];
    let bd = (bmax[1] - bmin[1]) / (bmax[0] - bmin[0]);
    let bk = bmin[1] - bd * bmin[0];
    let aminy = ad * minx + ak;
    let amaxy = ad * maxx + ak;
    let bminy = bd * minx + bk;
    let bmaxy = bd * maxx + bk;
    let dmin = bminy - aminy;
    let dmax = bmaxy - amaxy;

    // Crossing segments always overlap.
    if dmin * dmax < 0.0 {
        return true;
    }

    let thr = (py * 2.0) * (py * 2.0);
    dmin * dmin <= thr || dmax * dmax <= thr
}

struct PendingLink {
    poly: usize,
    edge: u8,
    side: u8,
    target: PolyRef,
    bmin: u8,
    bmax: u8,
}

impl NavMesh {
    /// Threads the build-time neighbour table into link chains
    pub(crate) fn connect_int_links(&mut self, tile_idx: usize) {
        let base = self.poly_ref_base(tile_idx);
        let cluster_base = self.cluster_ref_base(tile_idx);

        let mut cluster_pairs: Vec<(u16, u16)> = Vec::new();
        {
            let tile = self.tile_mut(tile_idx);
            let poly_count = tile.polys.len();
            for i in 0..poly_count {
                tile.polys[i].first_link = NULL_LINK;
                if tile.polys[i].poly_type != PolyType::Ground {
                    continue;
                }
                for j in 0..tile.polys[i].vert_count as usize {
                    let nei = tile.polys[i].neis[j];
                    if nei == 0 || (nei & EXT_LINK) != 0 {
                        continue;
                    }
                    let target_idx = (nei - 1) as usize;
                    let next = tile.polys[i].first_link;
                    let idx = tile.alloc_link();
                    {
                        let link = tile.link_mut(idx);
                        link.target = PolyRef(base.0 | target_idx as u64);
                        link.edge = j as u8;
                        link.side = INTERNAL_LINK_SIDE;
                        link.bmin = 0;
                        link.bmax = 0;
                        link.next = next;
                    }
                    tile.polys[i].first_link = idx;

                    let ca = tile.poly_clusters.get(i).copied();
                    let cb = tile.poly_clusters.get(target_idx).copied();
                    if let (Some(ca), Some(cb)) = (ca, cb) {
                        if ca != cb {
                            cluster_pairs.push((ca, cb));
                        }
                    }
                }
            }
        }

        for (ca, cb) in cluster_pairs {
            let target = ClusterRef(cluster_base.0 | cb as u64);
            self.connect_cluster_link(tile_idx, ca, target, CLUSTER_LINK_BCK_AND_FWD);
        }
    }

    /// Boundary polygons of `target_idx` whose edge on `side` overlaps the
    /// slab of the edge (va, vb). Returns (ref, overlap min, overlap max).
    pub(crate) fn find_connecting_polys(
        &self,
        va: &[f32; 3],
        vb: &[f32; 3],
        target_idx: usize,
        side: u8,
    ) -> Vec<(PolyRef, f32, f32)> {
        let tile = self.tile_unchecked(target_idx);
        let header = match &tile.header {
            Some(h) => h,
            None => return Vec::new(),
        };

        let (amin, amax) = slab_end_points(va, vb, side);
        let apos = slab_coord(va, side);
        let m = EXT_LINK | side as u16;
        let base = self.poly_ref_base(target_idx);

        let mut out = Vec::new();
        for (i, poly) in tile.polys.iter().enumerate() {
            if poly.poly_type != PolyType::Ground {
                continue;
            }
            let nv = poly.vert_count as usize;
            for j in 0..nv {
                if poly.neis[j] != m {
                    continue;
                }
                let vc = tile.vert(poly.verts[j]);
                let vd = tile.vert(poly.verts[(j + 1) % nv]);
                let bpos = slab_coord(&vc, side);
                // Edges must lie on the same boundary coordinate.
                if (apos - bpos).abs() > 0.01 {
                    continue;
                }
                let (bmin, bmax) = slab_end_points(&vc, &vd, side);
                if !overlap_slabs(&amin, &amax, &bmin, &bmax, 0.01, header.walkable_climb) {
                    continue;
                }
                out.push((
                    PolyRef(base.0 | i as u64),
                    amin[0].max(bmin[0]),
                    amax[0].min(bmax[0]),
                ));
                break;
            }
        }
        out
    }

    /// Links boundary edges of `tile_idx` facing `side` to matching edges
    /// of `target_idx`. `side == -1` links layered tiles in the same cell.
    pub(crate) fn connect_ext_links(&mut self, tile_idx: usize, target_idx: usize, side: i32) {
        if self.tiles_same_or_dead(tile_idx, target_idx) {
            return;
        }

        let mut pending: Vec<PendingLink> = Vec::new();
        let mut cluster_pairs: Vec<(u16, ClusterRef)> = Vec::new();
        {
            let tile = self.tile_unchecked(tile_idx);
            let target_cluster_base = self.cluster_ref_base(target_idx);
            let target_tile = self.tile_unchecked(target_idx);

            for (i, poly) in tile.polys.iter().enumerate() {
                if poly.poly_type != PolyType::Ground {
                    continue;
                }
                let nv = poly.vert_count as usize;
                for j in 0..nv {
                    let nei = poly.neis[j];
                    if (nei & EXT_LINK) == 0 {
                        continue;
                    }
                    let dir = (nei & 0xff) as u8;
                    if side != -1 && dir as i32 != side {
                        continue;
                    }

                    let va = tile.vert(poly.verts[j]);
                    let vb = tile.vert(poly.verts[(j + 1) % nv]);
                    let opp = opposite_tile_side(dir);
                    for (target, omin, omax) in
                        self.find_connecting_polys(&va, &vb, target_idx, opp)
                    {
                        // Quantize the overlap onto the source edge.
                        let (bmin, bmax) = if dir == 0 || dir == 4 {
                            let mut tmin = (omin - va[2]) / (vb[2] - va[2]);
                            let mut tmax = (omax - va[2]) / (vb[2] - va[2]);
                            if tmin > tmax {
                                std::mem::swap(&mut tmin, &mut tmax);
                            }
                            (
                                (clamp(tmin, 0.0, 1.0) * 255.0) as u8,
                                (clamp(tmax, 0.0, 1.0) * 255.0) as u8,
                            )
                        } else {
                            let mut tmin = (omin - va[0]) / (vb[0] - va[0]);
                            let mut tmax = (omax - va[0]) / (vb[0] - va[0]);
                            if tmin > tmax {
                                std::mem::swap(&mut tmin, &mut tmax);
                            }
                            (
                                (clamp(tmin, 0.0, 1.0) * 255.0) as u8,
                                (clamp(tmax, 0.0, 1.0) * 255.0) as u8,
                            )
                        };

                        pending.push(PendingLink {
                            poly: i,
                            edge: j as u8,
                            side: dir,
                            target,
                            bmin,
                            bmax,
                        });

                        let ca = tile.poly_clusters.get(i).copied();
                        let tp = self.decode_poly_id_poly(target) as usize;
                        let cb = target_tile.poly_clusters.get(tp).copied();
                        if let (Some(ca), Some(cb)) = (ca, cb) {
                            cluster_pairs
                                .push((ca, ClusterRef(target_cluster_base.0 | cb as u64)));
                        }
                    }
                }
            }
        }

        {
            let tile = self.tile_mut(tile_idx);
            for p in pending {
                let next = tile.polys[p.poly].first_link;
                let idx = tile.alloc_link();
                {
                    let link = tile.link_mut(idx);
                    link.target = p.target;
                    link.edge = p.edge;
                    link.side = p.side;
                    link.bmin = p.bmin;
                    link.bmax = p.bmax;
                    link.next = next;
                }
                tile.polys[p.poly].first_link = idx;
            }
        }

        for (ca, target) in cluster_pairs {
            self.connect_cluster_link(tile_idx, ca, target, CLUSTER_LINK_BCK_AND_FWD);
        }
    }

    /// Removes every link in `tile_idx` that points into the tile slot
    /// `target_idx`, including dynamic off-mesh links and cluster links
    pub(crate) fn unconnect_ext_links(&mut self, tile_idx: usize, target_idx: usize) {
        if self.tiles_same_or_dead(tile_idx, target_idx) {
            return;
        }
        let target_tile = target_idx as u32;
        let (tile_bits, poly_bits) = self.ref_bits();

        let tile = self.tile_mut(tile_idx);
        for i in 0..tile.polys.len() {
            let mut j = tile.polys[i].first_link;
            let mut prev = NULL_LINK;
            while j != NULL_LINK {
                let (next, target) = {
                    let link = tile.link(j);
                    (link.next, link.target)
                };
                let link_tile = ((target.0 >> poly_bits) & ((1u64 << tile_bits) - 1)) as u32;
                if link_tile == target_tile {
                    if prev == NULL_LINK {
                        tile.polys[i].first_link = next;
                    } else {
                        tile.link_mut(prev).next = next;
                    }
                    tile.free_link(j);
                } else {
                    prev = j;
                }
                j = next;
            }
        }

        self.unconnect_cluster_links(tile_idx, target_idx);

        // Segment parts whose links all pointed into the removed tile can
        // be re-linked later; mark their connections unattached when every
        // part lost its links.
        let tile = self.tile_mut(tile_idx);
        let mut reset = Vec::new();
        for (ci, con) in tile.off_mesh_seg_cons.iter().enumerate() {
            if con.npolys == 0 {
                continue;
            }
            let all_unlinked = (0..con.npolys as usize).all(|k| {
                let ip = con.first_poly as usize + k;
                tile.polys
                    .get(ip)
                    .map(|p| p.first_link == NULL_LINK)
                    .unwrap_or(true)
            });
            if all_unlinked {
                reset.push(ci);
            }
        }
        for ci in reset {
            tile.off_mesh_seg_cons[ci].npolys = 0;
        }
    }

    fn tiles_same_or_dead(&self, a: usize, b: usize) -> bool {
        a == b
            || self.tile_unchecked(a).header.is_none()
            || self.tile_unchecked(b).header.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slab_overlap_same_height() {
        let amin = [0.0, 0.0];
        let amax = [1.0, 0.0];
        let bmin = [0.5, 0.0];
        let bmax = [1.5, 0.0];
        assert!(overlap_slabs(&amin, &amax, &bmin, &bmax, 0.01, 0.5));
    }

    #[test]
    fn slab_no_horizontal_overlap() {
        let amin = [0.0, 0.0];
        let amax = [1.0, 0.0];
        let bmin = [2.0, 0.0];
        let bmax = [3.0, 0.0];
        assert!(!overlap_slabs(&amin, &amax, &bmin, &bmax, 0.01, 0.5));
    }

    #[test]
    fn slab_rejects_height_gap() {
        let amin = [0.0, 0.0];
        let amax = [1.0, 0.0];
        let bmin = [0.0, 5.0];
        let bmax = [1.0, 5.0];
        assert!(!overlap_slabs(&amin, &amax, &bmin, &bmax, 0.01, 0.5));
    }

    #[test]
    fn slab_crossing_heights_overlap() {
        // Segments cross in height over the shared interval.
        let amin = [0.0, 0.0];
        let amax = [1.0, 2.0];
        let bmin = [0.0, 2.0];
        let bmax = [1.0, 0.0];
        assert!(overlap_slabs(&amin, &amax, &bmin, &bmax, 0.01, 0.1));
    }

    #[test]
    fn slab_end_points_ordering() {
        let va = [3.0, 1.0, 9.0];
        let vb = [3.0, 2.0, 4.0];
        // Side 0 slabs order by z.
        let (mn, mx) = slab_end_points(&va, &vb, 0);
        assert_eq!(mn, [4.0, 2.0]);
        assert_eq!(mx, [9.0, 1.0]);
        // Side 2 slabs order by x.
        let (mn, mx) = slab_end_points(&[1.0, 0.0, 5.0], &[7.0, 3.0, 5.0], 2);
        assert_eq!(mn, [1.0, 0.0]);
        assert_eq!(mx, [7.0, 3.0]);
    }
}
