//! Off-mesh connections
//!
//! Point connections are two-vertex polygons whose endpoints are snapped
//! onto the walkable surface when tiles meet. Segment connections carve
//! up to [`MAX_OFFMESH_SEGMENT_PARTS`] quad polygons out of preallocated
//! slots where both of their rails overlap walkable polygons, so an agent
//! can cross anywhere along the shared interval.

use crate::cluster::{CLUSTER_LINK_VALID_BCK, CLUSTER_LINK_VALID_FWD};
use crate::filter::QueryFilter;
use crate::nav_mesh::{
    ClusterRef, MeshTile, NavMesh, Poly, PolyFlags, PolyRef, PolyType, CONNECTION_INTERNAL,
    LINK_FLAG_OFFMESH_CON, LINK_FLAG_OFFMESH_CON_BACKTRACKER, LINK_FLAG_OFFMESH_CON_BIDIR,
    LINK_FLAG_OFFMESH_CON_ENABLED, NULL_LINK,
};
use crate::status::{Result, Status};
use crate::{nav_ensure, nav_unwrap};
use log::debug;
use tilenav_common::geometry::intersect_segment_poly_2d;
use tilenav_common::math::{opposite_tile_side, vadd, vdist_2d_sqr, vlerp, vmax, vmin, vsub};

/// Maximum quad parts a segment connection may produce
pub const MAX_OFFMESH_SEGMENT_PARTS: usize = 4;

/// Minimum parametric length of a usable segment part
const MIN_SEGMENT_PART_LEN: f32 = 0.05;

/// Connection is a point-to-point jump
pub const OFFMESH_CON_POINT: u8 = 0x01;
/// Connection is a segment-to-segment crossing
pub const OFFMESH_CON_SEGMENT: u8 = 0x02;
/// Connection can be traversed both ways
pub const OFFMESH_CON_BIDIR: u8 = 0x04;
/// Endpoints snap to the cheapest nearby area instead of the nearest
pub const OFFMESH_CON_CHEAPAREA: u8 = 0x08;

/// Point off-mesh connection
#[derive(Debug, Clone)]
#[cfg_attr(
    feature = "serialization",
    derive(serde::Serialize, serde::Deserialize)
)]
pub struct OffMeshPointConnection {
    /// Both endpoints, start xyz then end xyz
    pub pos: [f32; 6],
    /// Snap radius around each endpoint
    pub radius: f32,
    /// Vertical snap tolerance; falls back to the tile walkable climb
    /// when not positive
    pub snap_height: f32,
    /// Polygon slot of the connection inside its tile
    pub poly: u16,
    /// `OFFMESH_CON_*` bits
    pub flags: u8,
    /// Boundary side the far endpoint leaves through, `0xff` if internal
    pub side: u8,
    /// Opaque id assigned by the tile builder's caller
    pub user_id: u32,
}

/// Segment off-mesh connection
#[derive(Debug, Clone)]
#[cfg_attr(
    feature = "serialization",
    derive(serde::Serialize, serde::Deserialize)
)]
pub struct OffMeshSegmentConnection {
    /// Rail A start
    pub start_a: [f32; 3],
    /// Rail A end
    pub end_a: [f32; 3],
    /// Rail B start
    pub start_b: [f32; 3],
    /// Rail B end
    pub end_b: [f32; 3],
    /// Snap radius around the rails
    pub radius: f32,
    /// First polygon slot used by the connection's parts
    pub first_poly: u16,
    /// Number of parts currently linked; zero means unattached
    pub npolys: u8,
    /// `OFFMESH_CON_*` bits
    pub flags: u8,
    /// Opaque id assigned by the tile builder's caller
    pub user_id: u32,
}

/// Filter used while snapping endpoints; accepts everything
struct AcceptAllFilter;

impl QueryFilter for AcceptAllFilter {
    fn pass_filter(&self, _r: PolyRef, _tile: &MeshTile, _poly: &Poly) -> bool {
        true
    }
    fn get_cost(
        &self,
        _pa: &[f32; 3],
        _pb: &[f32; 3],
        _cur: &Poly,
        _next: Option<&Poly>,
    ) -> f32 {
        0.0
    }
}

/// Side flags for links traversing the connection in its authored
/// direction and against it. One-way connections mark the reverse
/// direction with the backtracker bit so only backtracking filters
/// may use it.
fn off_mesh_link_sides(internal: bool, con_flags: u8) -> (u8, u8) {
    let mut fwd = LINK_FLAG_OFFMESH_CON | LINK_FLAG_OFFMESH_CON_ENABLED;
    if con_flags & OFFMESH_CON_BIDIR != 0 {
        fwd |= LINK_FLAG_OFFMESH_CON_BIDIR;
    }
    if internal {
        fwd |= CONNECTION_INTERNAL;
    }
    (fwd, fwd | LINK_FLAG_OFFMESH_CON_BACKTRACKER)
}

struct PendingOffMeshLink {
    /// Tile holding the new link
    tile: usize,
    /// Polygon the link hangs off
    poly: usize,
    edge: u8,
    side: u8,
    target: PolyRef,
}

impl NavMesh {
    fn push_off_mesh_link(&mut self, p: PendingOffMeshLink) {
        let tile = self.tile_mut(p.tile);
        let next = tile.polys[p.poly].first_link;
        let idx = tile.alloc_link();
        {
            let link = tile.link_mut(idx);
            link.target = p.target;
            link.edge = p.edge;
            link.side = p.side;
            link.bmin = 0;
            link.bmax = 0;
            link.next = next;
        }
        tile.polys[p.poly].first_link = idx;
    }

    /// Mirrors a connection between two ground landings into the cluster
    /// graph. Tiles without cluster data are skipped.
    fn connect_off_mesh_cluster_links(
        &mut self,
        start_tile: usize,
        start_poly: usize,
        end_tile: usize,
        end_poly: usize,
        con_flags: u8,
    ) {
        let ca = self
            .tile_unchecked(start_tile)
            .poly_clusters
            .get(start_poly)
            .copied();
        let cb = self
            .tile_unchecked(end_tile)
            .poly_clusters
            .get(end_poly)
            .copied();
        let (ca, cb) = match (ca, cb) {
            (Some(ca), Some(cb)) => (ca, cb),
            _ => return,
        };
        let start_cluster = ClusterRef(self.cluster_ref_base(start_tile).0 | ca as u64);
        let end_cluster = ClusterRef(self.cluster_ref_base(end_tile).0 | cb as u64);
        if start_cluster == end_cluster {
            return;
        }
        let bidir = con_flags & OFFMESH_CON_BIDIR != 0;
        let fwd = CLUSTER_LINK_VALID_FWD | if bidir { CLUSTER_LINK_VALID_BCK } else { 0 };
        let bck = CLUSTER_LINK_VALID_BCK | if bidir { CLUSTER_LINK_VALID_FWD } else { 0 };
        self.connect_cluster_link(start_tile, ca, end_cluster, fwd);
        self.connect_cluster_link(end_tile, cb, start_cluster, bck);
    }

    /// Snaps the start endpoints of the tile's point connections onto its
    /// own surface and links them back and forth
    pub(crate) fn base_off_mesh_links(&mut self, tile_idx: usize) {
        let base = self.poly_ref_base(tile_idx);

        struct Based {
            con: usize,
            poly: usize,
            land_poly: usize,
            nearest: [f32; 3],
        }
        let mut based: Vec<Based> = Vec::new();
        {
            let tile = self.tile_unchecked(tile_idx);
            let header = match &tile.header {
                Some(h) => h,
                None => return,
            };
            for (ci, con) in tile.off_mesh_cons.iter().enumerate() {
                let start = [con.pos[0], con.pos[1], con.pos[2]];
                let climb = if con.snap_height > 0.0 {
                    con.snap_height
                } else {
                    header.walkable_climb
                };
                let half_extents = [con.radius, climb, con.radius];
                let (land, nearest) = if con.flags & OFFMESH_CON_CHEAPAREA != 0 {
                    self.find_cheapest_near_poly_in_tile(
                        tile_idx,
                        &start,
                        &half_extents,
                        &AcceptAllFilter,
                    )
                } else {
                    self.find_nearest_poly_in_tile(tile_idx, &start, &half_extents, &AcceptAllFilter)
                };
                if land.is_null() {
                    debug!(
                        "off-mesh connection {} has no landing for its start point",
                        con.user_id
                    );
                    continue;
                }
                // The landing must be inside the snap radius on the plane.
                if vdist_2d_sqr(&nearest, &start) > con.radius * con.radius {
                    debug!(
                        "off-mesh connection {} start point is outside its radius",
                        con.user_id
                    );
                    continue;
                }
                based.push(Based {
                    con: ci,
                    poly: con.poly as usize,
                    land_poly: self.decode_poly_id_poly(land) as usize,
                    nearest,
                });
            }
        }

        for b in based {
            let con_flags = {
                let tile = self.tile_mut(tile_idx);
                let flags = tile.off_mesh_cons[b.con].flags;
                let v0 = tile.polys[b.poly].verts[0];
                tile.set_vert(v0, &b.nearest);
                flags
            };
            let (side_fwd, side_bck) = off_mesh_link_sides(true, con_flags);
            // Exiting onto the start landing moves against the
            // connection; entering from it moves with it.
            self.push_off_mesh_link(PendingOffMeshLink {
                tile: tile_idx,
                poly: b.poly,
                edge: 0,
                side: side_bck,
                target: PolyRef(base.0 | b.land_poly as u64),
            });
            self.push_off_mesh_link(PendingOffMeshLink {
                tile: tile_idx,
                poly: b.land_poly,
                edge: 0xff,
                side: side_fwd,
                target: PolyRef(base.0 | b.poly as u64),
            });
        }
    }

    /// Connects the far endpoints of `target_idx`'s point connections to
    /// landings in `tile_idx`. `side == -1` handles connections whose far
    /// endpoint stays inside the tile, including `tile_idx == target_idx`.
    pub(crate) fn connect_ext_off_mesh_links(
        &mut self,
        tile_idx: usize,
        target_idx: usize,
        side: i32,
    ) {
        if self.tile_unchecked(tile_idx).header.is_none()
            || self.tile_unchecked(target_idx).header.is_none()
        {
            return;
        }
        let opposite_side: u8 = if side == -1 {
            0xff
        } else {
            opposite_tile_side(side as u8)
        };
        let base = self.poly_ref_base(tile_idx);
        let target_base = self.poly_ref_base(target_idx);
        let internal = tile_idx == target_idx;

        struct Landed {
            con: usize,
            con_poly: usize,
            land_poly: usize,
            nearest: [f32; 3],
        }
        let mut landed: Vec<Landed> = Vec::new();
        {
            let target = self.tile_unchecked(target_idx);
            let header = match &target.header {
                Some(h) => h,
                None => return,
            };
            for (ci, con) in target.off_mesh_cons.iter().enumerate() {
                if con.side != opposite_side {
                    continue;
                }
                // Skip connections whose start point never landed.
                if target.polys[con.poly as usize].first_link == NULL_LINK {
                    continue;
                }
                let end = [con.pos[3], con.pos[4], con.pos[5]];
                let climb = if con.snap_height > 0.0 {
                    con.snap_height
                } else {
                    header.walkable_climb
                };
                let half_extents = [con.radius, climb, con.radius];
                let (land, nearest) = if con.flags & OFFMESH_CON_CHEAPAREA != 0 {
                    self.find_cheapest_near_poly_in_tile(
                        tile_idx,
                        &end,
                        &half_extents,
                        &AcceptAllFilter,
                    )
                } else {
                    self.find_nearest_poly_in_tile(tile_idx, &end, &half_extents, &AcceptAllFilter)
                };
                if land.is_null() {
                    debug!(
                        "off-mesh connection {} has no landing for its end point",
                        con.user_id
                    );
                    continue;
                }
                if vdist_2d_sqr(&nearest, &end) > con.radius * con.radius {
                    debug!(
                        "off-mesh connection {} end point is outside its radius",
                        con.user_id
                    );
                    continue;
                }
                landed.push(Landed {
                    con: ci,
                    con_poly: con.poly as usize,
                    land_poly: self.decode_poly_id_poly(land) as usize,
                    nearest,
                });
            }
        }

        for l in landed {
            let con_flags = {
                let target = self.tile_mut(target_idx);
                let flags = target.off_mesh_cons[l.con].flags;
                let v1 = target.polys[l.con_poly].verts[1];
                target.set_vert(v1, &l.nearest);
                flags
            };
            let (side_fwd, side_bck) = off_mesh_link_sides(internal, con_flags);
            // Forward exit onto the landing tile; entering from this end
            // moves against the connection.
            self.push_off_mesh_link(PendingOffMeshLink {
                tile: target_idx,
                poly: l.con_poly,
                edge: 1,
                side: side_fwd,
                target: PolyRef(base.0 | l.land_poly as u64),
            });
            self.push_off_mesh_link(PendingOffMeshLink {
                tile: tile_idx,
                poly: l.land_poly,
                edge: 0xff,
                side: side_bck,
                target: PolyRef(target_base.0 | l.con_poly as u64),
            });

            // The connection now spans two landings; mirror it into the
            // cluster graph. The start landing is the edge-0 link target.
            let start_land = {
                let target = self.tile_unchecked(target_idx);
                let mut found = None;
                let mut i = target.polys[l.con_poly].first_link;
                while i != NULL_LINK {
                    let link = target.link(i);
                    if link.edge == 0 {
                        found = Some(link.target);
                        break;
                    }
                    i = link.next;
                }
                found
            };
            if let Some(start_ref) = start_land {
                let (_, st, sp) = self.decode_poly_id(start_ref);
                self.connect_off_mesh_cluster_links(
                    st as usize,
                    sp as usize,
                    tile_idx,
                    l.land_poly,
                    con_flags,
                );
            }
        }
    }

    /// Builds quad parts and links for the tile's segment connections.
    /// Connections with `npolys != 0` are already attached and skipped.
    pub(crate) fn create_off_mesh_segment_links(&mut self, tile_idx: usize) {
        let header = match self.tile_unchecked(tile_idx).header.clone() {
            Some(h) => h,
            None => return,
        };
        if header.off_mesh_seg_con_count == 0 {
            return;
        }
        let (x, y) = (header.x, header.y);

        // Candidate landing tiles: this cell's layers plus the 8 around.
        let mut candidates = self.tile_indices_at(x, y);
        for side in 0..8u8 {
            candidates.extend(self.neighbour_tile_indices(x, y, side));
        }

        let con_count = self.tile_unchecked(tile_idx).off_mesh_seg_cons.len();
        for ci in 0..con_count {
            let con = self.tile_unchecked(tile_idx).off_mesh_seg_cons[ci].clone();
            if con.npolys != 0 {
                continue;
            }

            let rails = [(con.start_a, con.end_a), (con.start_b, con.end_b)];
            let mut spans: [Vec<(PolyRef, f32, f32)>; 2] = [Vec::new(), Vec::new()];
            for (rail, (start, end)) in rails.iter().enumerate() {
                spans[rail] =
                    self.gather_segment_spans(start, end, con.radius, header.walkable_climb, &candidates);
            }

            // Overlap rail A spans with rail B spans in segment parameter
            // space; each overlap long enough becomes a part.
            let mut parts: Vec<(f32, f32, PolyRef, PolyRef)> = Vec::new();
            for &(pa, a0, a1) in &spans[0] {
                for &(pb, b0, b1) in &spans[1] {
                    let t0 = a0.max(b0);
                    let t1 = a1.min(b1);
                    if t1 - t0 >= MIN_SEGMENT_PART_LEN {
                        parts.push((t0, t1, pa, pb));
                    }
                }
            }
            // Longest parts win the part slots; survivors go back into
            // parameter order.
            parts.sort_by(|a, b| {
                (b.1 - b.0)
                    .partial_cmp(&(a.1 - a.0))
                    .unwrap_or(std::cmp::Ordering::Equal)
            });
            parts.truncate(MAX_OFFMESH_SEGMENT_PARTS);
            parts.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(std::cmp::Ordering::Equal));
            if parts.is_empty() {
                debug!(
                    "off-mesh segment connection {} found no overlapping spans",
                    con.user_id
                );
                continue;
            }

            let first_poly = header.off_mesh_seg_poly_base as usize + ci * MAX_OFFMESH_SEGMENT_PARTS;
            let first_vert = header.off_mesh_seg_vert_base as usize
                + ci * MAX_OFFMESH_SEGMENT_PARTS * 4;
            let npolys = parts.len() as u8;
            let (side_fwd, side_bck) = off_mesh_link_sides(false, con.flags);
            let base = self.poly_ref_base(tile_idx);

            for (k, &(t0, t1, poly_a, poly_b)) in parts.iter().enumerate() {
                let ip = first_poly + k;
                let part_ref = PolyRef(base.0 | ip as u64);
                {
                    let tile = self.tile_mut(tile_idx);
                    let iv = (first_vert + k * 4) as u16;
                    tile.set_vert(iv, &vlerp(&con.start_a, &con.end_a, t0));
                    tile.set_vert(iv + 1, &vlerp(&con.start_a, &con.end_a, t1));
                    tile.set_vert(iv + 2, &vlerp(&con.start_b, &con.end_b, t0));
                    tile.set_vert(iv + 3, &vlerp(&con.start_b, &con.end_b, t1));
                    let poly = &mut tile.polys[ip];
                    poly.verts[0] = iv;
                    poly.verts[1] = iv + 1;
                    poly.verts[2] = iv + 2;
                    poly.verts[3] = iv + 3;
                    poly.vert_count = 4;
                    poly.first_link = NULL_LINK;
                }

                let (_, ta, pa_idx) = self.decode_poly_id(poly_a);
                let (_, tb, pb_idx) = self.decode_poly_id(poly_b);

                // Rail A ground enters the part and the part exits onto
                // rail B ground; the mirror pair runs against the
                // connection.
                self.push_off_mesh_link(PendingOffMeshLink {
                    tile: ta as usize,
                    poly: pa_idx as usize,
                    edge: 0xff,
                    side: side_fwd,
                    target: part_ref,
                });
                self.push_off_mesh_link(PendingOffMeshLink {
                    tile: tile_idx,
                    poly: ip,
                    edge: 2,
                    side: side_fwd,
                    target: poly_b,
                });
                self.push_off_mesh_link(PendingOffMeshLink {
                    tile: tb as usize,
                    poly: pb_idx as usize,
                    edge: 0xff,
                    side: side_bck,
                    target: part_ref,
                });
                self.push_off_mesh_link(PendingOffMeshLink {
                    tile: tile_idx,
                    poly: ip,
                    edge: 0,
                    side: side_bck,
                    target: poly_a,
                });

                self.connect_off_mesh_cluster_links(
                    ta as usize,
                    pa_idx as usize,
                    tb as usize,
                    pb_idx as usize,
                    con.flags,
                );
            }

            let tile = self.tile_mut(tile_idx);
            let con = &mut tile.off_mesh_seg_cons[ci];
            con.first_poly = first_poly as u16;
            con.npolys = npolys;
        }
    }

    /// Ground polygons a rail passes over, as (ref, tmin, tmax) in the
    /// rail's parameter space
    fn gather_segment_spans(
        &self,
        start: &[f32; 3],
        end: &[f32; 3],
        radius: f32,
        climb: f32,
        candidates: &[usize],
    ) -> Vec<(PolyRef, f32, f32)> {
        let pad = [radius, climb, radius];
        let mut bmin = *start;
        let mut bmax = *start;
        vmin(&mut bmin, end);
        vmax(&mut bmax, end);
        let bmin = vsub(&bmin, &pad);
        let bmax = vadd(&bmax, &pad);

        let mut spans = Vec::new();
        for &tidx in candidates {
            let mut polys = Vec::new();
            self.query_polygons_in_tile(tidx, &bmin, &bmax, &AcceptAllFilter, &mut polys, 64);
            let tile = self.tile_unchecked(tidx);
            for r in polys {
                let ip = self.decode_poly_id_poly(r) as usize;
                let poly = &tile.polys[ip];
                let nv = poly.vert_count as usize;
                let mut verts = [0.0f32; crate::nav_mesh::MAX_VERTS_PER_POLYGON * 3];
                for i in 0..nv {
                    let v = tile.vert(poly.verts[i]);
                    verts[i * 3..i * 3 + 3].copy_from_slice(&v);
                }
                if let Some((tmin, tmax, _, _)) =
                    intersect_segment_poly_2d(start, end, &verts[..nv * 3], nv)
                {
                    if tmax > tmin {
                        spans.push((r, tmin.max(0.0), tmax.min(1.0)));
                    }
                }
            }
        }
        spans
    }

    /// Start and end positions for traversing an off-mesh point polygon,
    /// oriented by the polygon the agent comes from
    pub fn get_off_mesh_connection_poly_end_points(
        &self,
        prev_ref: PolyRef,
        poly_ref: PolyRef,
    ) -> Result<([f32; 3], [f32; 3])> {
        let (tile, poly) = nav_unwrap!(self.tile_and_poly_by_ref(poly_ref));
        nav_ensure!(
            poly.poly_type == PolyType::OffMeshPoint,
            Status::invalid_param()
        );

        // The edge-0 link points at the start landing; if the agent came
        // from elsewhere the vertices hand out reversed.
        let mut idx0 = 0usize;
        let mut idx1 = 1usize;
        let mut i = poly.first_link;
        while i != NULL_LINK {
            let link = tile.link(i);
            if link.edge == 0 {
                if link.target != prev_ref {
                    idx0 = 1;
                    idx1 = 0;
                }
                break;
            }
            i = link.next;
        }

        Ok((tile.vert(poly.verts[idx0]), tile.vert(poly.verts[idx1])))
    }

    /// Point connection owning a polygon, if the polygon is one
    pub fn get_off_mesh_connection_by_ref(&self, r: PolyRef) -> Option<&OffMeshPointConnection> {
        let (tile, poly) = self.tile_and_poly_by_ref(r)?;
        if poly.poly_type != PolyType::OffMeshPoint {
            return None;
        }
        let header = tile.header.as_ref()?;
        let ip = self.decode_poly_id_poly(r) as i32;
        let ci = ip - header.off_mesh_base;
        if ci < 0 {
            return None;
        }
        tile.off_mesh_cons.get(ci as usize)
    }

    /// Connection user id owning a polygon, for both point and segment
    /// polygons
    pub(crate) fn off_mesh_user_id(&self, tile: &MeshTile, poly_idx: usize) -> Option<u32> {
        let header = tile.header.as_ref()?;
        let ip = poly_idx as i32;
        match tile.polys[poly_idx].poly_type {
            PolyType::OffMeshPoint => {
                let ci = ip - header.off_mesh_base;
                tile.off_mesh_cons.get(usize::try_from(ci).ok()?).map(|c| c.user_id)
            }
            PolyType::OffMeshSegment => {
                let slot = ip - header.off_mesh_seg_poly_base;
                let ci = usize::try_from(slot).ok()? / MAX_OFFMESH_SEGMENT_PARTS;
                tile.off_mesh_seg_cons.get(ci).map(|c| c.user_id)
            }
            PolyType::Ground => None,
        }
    }

    /// Updates the polygon flags and area of every connection carrying
    /// `user_id`, across all live tiles. Returns true when any matched.
    pub fn update_off_mesh_connection_by_user_id(
        &mut self,
        user_id: u32,
        new_flags: PolyFlags,
        new_area: u8,
    ) -> bool {
        let mut found = false;
        for tidx in 0..self.max_tiles() {
            let tile = self.tile_mut(tidx);
            if tile.header.is_none() {
                continue;
            }
            let mut touched: Vec<usize> = Vec::new();
            for con in &tile.off_mesh_cons {
                if con.user_id == user_id {
                    touched.push(con.poly as usize);
                }
            }
            for con in &tile.off_mesh_seg_cons {
                if con.user_id == user_id {
                    for k in 0..con.npolys as usize {
                        touched.push(con.first_poly as usize + k);
                    }
                }
            }
            for ip in touched {
                if let Some(poly) = tile.polys.get_mut(ip) {
                    poly.flags = new_flags;
                    poly.area = new_area;
                    found = true;
                }
            }
        }
        found
    }
}
