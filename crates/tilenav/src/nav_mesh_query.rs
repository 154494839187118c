//! Navigation queries over a [`NavMesh`]
//!
//! A [`NavMeshQuery`] borrows the mesh immutably and owns its own node
//! pools and open list, so one query context per worker thread shares a
//! mesh without locking. All graph walks carry an iteration bound derived
//! from the pool capacity; tripping it reports `INVALID_CYCLE_PATH`
//! instead of spinning on a malformed link loop.

use crate::filter::QueryFilter;
use crate::nav_mesh::{
    MeshTile, NavMesh, Poly, PolyRef, PolyType, EXT_LINK, INTERNAL_LINK_SIDE,
    LINK_FLAG_OFFMESH_CON, MAX_VERTS_PER_POLYGON, NULL_LINK,
};
use crate::node_pool::{NodePool, NodeQueue, NODE_CLOSED, NODE_OPEN};
use crate::sliced_pathfinding::SlicedQueryState;
use crate::status::{Result, Status};
use crate::{nav_ensure, nav_unwrap};
use tilenav_common::geometry::{
    closest_height_point_triangle, dist_pt_seg_sqr_2d, intersect_segment_poly_2d,
    overlap_poly_poly_2d, point_in_polygon, random_point_in_convex_poly, tri_area_2d,
};
use tilenav_common::math::{
    vadd, vdist, vdist_2d_sqr, vdist_sqr, vlerp, vnormalize, vsub, visfinite,
};

/// Iteration bound multiplier for graph walks; the walk may touch each
/// node a few times before the guard considers the graph malformed
pub const CYCLE_LIMIT_FACTOR: usize = 4;

/// Tiny pool capacity backing breadth-first local queries
const TINY_NODE_POOL_SIZE: usize = 64;

/// Depth-first stack bound for local queries
const MAX_LOCAL_STACK: usize = 48;

/// Candidate window for nearest-polygon scans
const NEAREST_QUERY_CAP: usize = 128;

/// Polygon corridor plus the status detail bits the search accumulated
#[derive(Debug, Clone)]
pub struct PathResult {
    /// Corridor from start to end polygon, start first
    pub path: Vec<PolyRef>,
    /// Success status, possibly carrying `PARTIAL_RESULT`, `OUT_OF_NODES`
    /// or `BUFFER_TOO_SMALL`
    pub status: Status,
}

/// Result of a wall or portal scan along polygon edges
#[derive(Debug, Clone, Copy)]
pub struct WallSegment {
    /// Segment start
    pub start: [f32; 3],
    /// Segment end
    pub end: [f32; 3],
    /// Polygon on the far side, null for solid walls
    pub neighbor: PolyRef,
}

/// Raycast outcome
#[derive(Debug, Clone)]
pub struct RaycastHit {
    /// Parameter of the hit along the ray, `f32::MAX` when the end point
    /// was reached without hitting anything
    pub t: f32,
    /// Normal of the blocking edge, zero when nothing was hit
    pub normal: [f32; 3],
    /// Polygons visited along the ray
    pub path: Vec<PolyRef>,
}

impl RaycastHit {
    /// True when the ray reached its end point
    pub fn reached_end(&self) -> bool {
        self.t == f32::MAX
    }
}

/// Dijkstra expansion results: polygon, its parent in the search tree and
/// the accumulated cost at which it was reached
#[derive(Debug, Clone)]
pub struct PolyExpansion {
    /// Reached polygons
    pub refs: Vec<PolyRef>,
    /// Parent of each reached polygon, null for the start
    pub parents: Vec<PolyRef>,
    /// Cost each polygon was reached at
    pub costs: Vec<f32>,
}

/// Simple LCG used by the random-point queries; deterministic per seed
#[derive(Debug)]
pub(crate) struct Lcg(u32);

impl Lcg {
    fn new(seed: u32) -> Self {
        Self(seed)
    }

    pub(crate) fn next_f32(&mut self) -> f32 {
        self.0 = self.0.wrapping_mul(1103515245).wrapping_add(12345);
        ((self.0 >> 16) & 0x7fff) as f32 / 32768.0
    }
}

/// Query context over a shared navigation mesh
pub struct NavMeshQuery<'m> {
    nav: &'m NavMesh,
    pub(crate) node_pool: NodePool,
    tiny_node_pool: NodePool,
    pub(crate) open_list: NodeQueue,
    pub(crate) sliced: SlicedQueryState,
    rand: Lcg,
}

impl<'m> NavMeshQuery<'m> {
    /// Creates a query context with the given search node capacity
    pub fn new(nav: &'m NavMesh, max_nodes: usize) -> Result<Self> {
        nav_ensure!(max_nodes > 0, Status::invalid_param());
        Ok(Self {
            nav,
            node_pool: NodePool::new(max_nodes),
            tiny_node_pool: NodePool::new(TINY_NODE_POOL_SIZE),
            open_list: NodeQueue::new(max_nodes / 4),
            sliced: SlicedQueryState::default(),
            rand: Lcg::new(0x2eb1_5f53),
        })
    }

    /// The mesh this context queries
    pub fn nav_mesh(&self) -> &'m NavMesh {
        self.nav
    }

    /// Reseeds the random source used by the random-point queries
    pub fn seed_random(&mut self, seed: u32) {
        self.rand = Lcg::new(seed);
    }

    pub(crate) fn iteration_limit(&self) -> usize {
        (self.node_pool.max_nodes() + 1) * CYCLE_LIMIT_FACTOR
    }

    /// Validity check that also consults the filter
    pub fn is_valid_poly_ref<F>(&self, r: PolyRef, filter: &F) -> bool
    where
        F: QueryFilter + ?Sized,
    {
        match self.nav.tile_and_poly_by_ref(r) {
            Some((tile, poly)) => filter.pass_filter(r, tile, poly),
            None => false,
        }
    }

    // ==================================================================
    // Point queries

    /// Polygons overlapping an axis-aligned box, across all touched tiles
    pub fn query_polygons<F>(
        &self,
        center: &[f32; 3],
        half_extents: &[f32; 3],
        filter: &F,
        max_polys: usize,
    ) -> Result<Vec<PolyRef>>
    where
        F: QueryFilter + ?Sized,
    {
        nav_ensure!(
            visfinite(center) && visfinite(half_extents),
            Status::invalid_param()
        );
        let bmin = vsub(center, half_extents);
        let bmax = vadd(center, half_extents);
        let (minx, miny) = self.nav.calc_tile_loc(&bmin);
        let (maxx, maxy) = self.nav.calc_tile_loc(&bmax);

        let mut out = Vec::new();
        for y in miny..=maxy {
            for x in minx..=maxx {
                for tidx in self.nav.tile_indices_at(x, y) {
                    self.nav
                        .query_polygons_in_tile(tidx, &bmin, &bmax, filter, &mut out, max_polys);
                }
            }
        }
        Ok(out)
    }

    /// Nearest polygon to a point within a search box. Returns a null
    /// reference when nothing is inside the box.
    pub fn find_nearest_poly<F>(
        &self,
        center: &[f32; 3],
        half_extents: &[f32; 3],
        filter: &F,
    ) -> Result<(PolyRef, [f32; 3])>
    where
        F: QueryFilter + ?Sized,
    {
        let polys = self.query_polygons(center, half_extents, filter, NEAREST_QUERY_CAP)?;

        let mut nearest = PolyRef::NULL;
        let mut nearest_pt = *center;
        let mut nearest_dist = f32::MAX;
        for r in polys {
            let (tile, _) = nav_unwrap!(self.nav.tile_and_poly_by_ref(r));
            let ip = self.nav.decode_poly_id_poly(r) as usize;
            let pt = self.nav.closest_point_on_poly_in_tile(tile, ip, center);
            let d = vdist_sqr(center, &pt);
            if d < nearest_dist {
                nearest_dist = d;
                nearest_pt = pt;
                nearest = r;
            }
        }
        Ok((nearest, nearest_pt))
    }

    /// Nearest polygon judged on the XZ plane. Candidates further than
    /// `height_tolerance` above or below the point are skipped, ties in
    /// plan distance break toward the smaller height difference.
    pub fn find_nearest_poly_2d<F>(
        &self,
        center: &[f32; 3],
        half_extents: &[f32; 3],
        filter: &F,
        height_tolerance: f32,
    ) -> Result<(PolyRef, [f32; 3])>
    where
        F: QueryFilter + ?Sized,
    {
        let polys = self.query_polygons(center, half_extents, filter, NEAREST_QUERY_CAP)?;

        let mut nearest = PolyRef::NULL;
        let mut nearest_pt = *center;
        let mut best_score = f32::MAX;
        for r in polys {
            let (tile, _) = nav_unwrap!(self.nav.tile_and_poly_by_ref(r));
            let ip = self.nav.decode_poly_id_poly(r) as usize;
            let pt = self.nav.closest_point_on_poly_in_tile(tile, ip, center);
            let dh = (pt[1] - center[1]).abs();
            if height_tolerance >= 0.0 && dh > height_tolerance {
                continue;
            }
            let score = vdist_2d_sqr(center, &pt).sqrt() + dh * 0.01;
            if score < best_score {
                best_score = score;
                nearest_pt = pt;
                nearest = r;
            }
        }
        Ok((nearest, nearest_pt))
    }

    /// Polygon containing a point on the XZ plane, closest in height
    pub fn find_nearest_containing_poly<F>(
        &self,
        center: &[f32; 3],
        half_extents: &[f32; 3],
        filter: &F,
    ) -> Result<PolyRef>
    where
        F: QueryFilter + ?Sized,
    {
        let polys = self.query_polygons(center, half_extents, filter, NEAREST_QUERY_CAP)?;

        let mut best = PolyRef::NULL;
        let mut best_dh = f32::MAX;
        for r in polys {
            if !self.is_point_inside_poly(r, center)? {
                continue;
            }
            let (tile, _) = nav_unwrap!(self.nav.tile_and_poly_by_ref(r));
            let ip = self.nav.decode_poly_id_poly(r) as usize;
            let pt = self.nav.closest_point_on_poly_in_tile(tile, ip, center);
            let dh = (pt[1] - center[1]).abs();
            if dh < best_dh {
                best_dh = dh;
                best = r;
            }
        }
        Ok(best)
    }

    /// Closest point on a polygon, using detail height data
    pub fn closest_point_on_poly(&self, r: PolyRef, pos: &[f32; 3]) -> Result<[f32; 3]> {
        nav_ensure!(visfinite(pos), Status::invalid_param());
        let (tile, _) = nav_unwrap!(self.nav.tile_and_poly_by_ref(r));
        let ip = self.nav.decode_poly_id_poly(r) as usize;
        Ok(self.nav.closest_point_on_poly_in_tile(tile, ip, pos))
    }

    /// Closest point on the polygon's boundary, without detail height.
    /// Points inside the polygon come back unchanged.
    pub fn closest_point_on_poly_boundary(&self, r: PolyRef, pos: &[f32; 3]) -> Result<[f32; 3]> {
        let (tile, poly) = nav_unwrap!(self.nav.tile_and_poly_by_ref(r));
        nav_ensure!(visfinite(pos), Status::invalid_param());

        if poly.poly_type == PolyType::OffMeshPoint {
            let v0 = tile.vert(poly.verts[0]);
            let v1 = tile.vert(poly.verts[1]);
            let d0 = vdist(pos, &v0);
            let d1 = vdist(pos, &v1);
            return Ok(vlerp(&v0, &v1, d0 / (d0 + d1).max(1e-6)));
        }

        let nv = poly.vert_count as usize;
        let mut verts = [0.0f32; MAX_VERTS_PER_POLYGON * 3];
        for i in 0..nv {
            let v = tile.vert(poly.verts[i]);
            verts[i * 3..i * 3 + 3].copy_from_slice(&v);
        }

        let mut edged = [0.0f32; MAX_VERTS_PER_POLYGON];
        let mut edget = [0.0f32; MAX_VERTS_PER_POLYGON];
        if tilenav_common::geometry::distance_pt_poly_edges_sqr(
            pos,
            &verts[..nv * 3],
            nv,
            &mut edged,
            &mut edget,
        ) {
            return Ok(*pos);
        }
        let mut dmin = f32::MAX;
        let mut imin = 0usize;
        for i in 0..nv {
            if edged[i] < dmin {
                dmin = edged[i];
                imin = i;
            }
        }
        let va = [verts[imin * 3], verts[imin * 3 + 1], verts[imin * 3 + 2]];
        let j = (imin + 1) % nv;
        let vb = [verts[j * 3], verts[j * 3 + 1], verts[j * 3 + 2]];
        Ok(vlerp(&va, &vb, edget[imin]))
    }

    /// True when the point lies inside the polygon on the XZ plane
    pub fn is_point_inside_poly(&self, r: PolyRef, pos: &[f32; 3]) -> Result<bool> {
        let (tile, poly) = nav_unwrap!(self.nav.tile_and_poly_by_ref(r));
        nav_ensure!(
            poly.poly_type != PolyType::OffMeshPoint,
            Status::invalid_param()
        );
        let nv = poly.vert_count as usize;
        let mut verts = [0.0f32; MAX_VERTS_PER_POLYGON * 3];
        for i in 0..nv {
            let v = tile.vert(poly.verts[i]);
            verts[i * 3..i * 3 + 3].copy_from_slice(&v);
        }
        Ok(point_in_polygon(pos, &verts[..nv * 3], nv))
    }

    /// Projects a point onto a polygon it is over, with corrected height
    pub fn project_point_on_poly(&self, r: PolyRef, pos: &[f32; 3]) -> Result<Option<[f32; 3]>> {
        if !self.is_point_inside_poly(r, pos)? {
            return Ok(None);
        }
        let mut out = *pos;
        if let Ok(h) = self.get_poly_height(r, pos) {
            out[1] = h;
        }
        Ok(Some(out))
    }

    /// Surface height of a polygon at an XZ position
    pub fn get_poly_height(&self, r: PolyRef, pos: &[f32; 3]) -> Result<f32> {
        let (tile, poly) = nav_unwrap!(self.nav.tile_and_poly_by_ref(r));
        let ip = self.nav.decode_poly_id_poly(r) as usize;
        match poly.poly_type {
            PolyType::OffMeshPoint => Err(Status::invalid_param()),
            PolyType::Ground => match self.nav.poly_height_in_tile(tile, ip, pos) {
                Some(h) => Ok(h),
                None => Err(Status::failure()),
            },
            PolyType::OffMeshSegment => {
                let v = |i: usize| tile.vert(poly.verts[i]);
                if let Some(h) = closest_height_point_triangle(pos, &v(0), &v(2), &v(1)) {
                    return Ok(h);
                }
                if let Some(h) = closest_height_point_triangle(pos, &v(1), &v(2), &v(3)) {
                    return Ok(h);
                }
                Err(Status::failure())
            }
        }
    }

    // ==================================================================
    // Portals

    /// Portal between two adjacent polygons as a (left, right) segment.
    /// Off-mesh polygons collapse to their endpoint.
    pub fn get_portal_points(&self, from: PolyRef, to: PolyRef) -> Result<([f32; 3], [f32; 3])> {
        let (from_tile, from_poly) = nav_unwrap!(self.nav.tile_and_poly_by_ref(from));
        let (to_tile, to_poly) = nav_unwrap!(self.nav.tile_and_poly_by_ref(to));

        // Off-mesh source: the portal is the vertex its link leaves from.
        if from_poly.poly_type != PolyType::Ground {
            let mut i = from_poly.first_link;
            while i != NULL_LINK {
                let link = from_tile.link(i);
                if link.target == to {
                    let v = if from_poly.poly_type == PolyType::OffMeshSegment {
                        // Rail edge as a real portal.
                        let e = link.edge as usize;
                        return Ok((
                            from_tile.vert(from_poly.verts[e]),
                            from_tile.vert(from_poly.verts[e + 1]),
                        ));
                    } else {
                        from_tile.vert(from_poly.verts[link.edge as usize])
                    };
                    return Ok((v, v));
                }
                i = link.next;
            }
            return Err(Status::invalid_param());
        }

        // Off-mesh target: the vertex its back-link enters at.
        if to_poly.poly_type != PolyType::Ground {
            let mut i = to_poly.first_link;
            while i != NULL_LINK {
                let link = to_tile.link(i);
                if link.target == from {
                    let v = if to_poly.poly_type == PolyType::OffMeshSegment {
                        let e = link.edge as usize;
                        return Ok((
                            to_tile.vert(to_poly.verts[e]),
                            to_tile.vert(to_poly.verts[e + 1]),
                        ));
                    } else {
                        to_tile.vert(to_poly.verts[link.edge as usize])
                    };
                    return Ok((v, v));
                }
                i = link.next;
            }
            return Err(Status::invalid_param());
        }

        // Ground to ground: the shared edge, clamped to the linked
        // sub-range on boundary links.
        let mut i = from_poly.first_link;
        while i != NULL_LINK {
            let link = from_tile.link(i);
            if link.target == to {
                let edge = link.edge as usize;
                let nv = from_poly.vert_count as usize;
                let v0 = from_tile.vert(from_poly.verts[edge]);
                let v1 = from_tile.vert(from_poly.verts[(edge + 1) % nv]);
                if link.side != INTERNAL_LINK_SIDE
                    && (link.side & LINK_FLAG_OFFMESH_CON) == 0
                    && (link.bmin != 0 || link.bmax != 255)
                {
                    let s = 1.0 / 255.0;
                    let tmin = link.bmin as f32 * s;
                    let tmax = link.bmax as f32 * s;
                    return Ok((vlerp(&v0, &v1, tmin), vlerp(&v0, &v1, tmax)));
                }
                return Ok((v0, v1));
            }
            i = link.next;
        }
        Err(Status::invalid_param())
    }

    /// Midpoint of the portal between two adjacent polygons
    pub fn get_edge_mid_point(&self, from: PolyRef, to: PolyRef) -> Result<[f32; 3]> {
        let (left, right) = self.get_portal_points(from, to)?;
        Ok(vlerp(&left, &right, 0.5))
    }

    // ==================================================================
    // Full A*

    /// Finds a polygon corridor from `start` to `end`.
    ///
    /// When the search exhausts its node budget or the regions are
    /// disconnected, the corridor to the closest reachable polygon comes
    /// back with `PARTIAL_RESULT` set in the status.
    pub fn find_path<F>(
        &mut self,
        start: PolyRef,
        end: PolyRef,
        start_pos: &[f32; 3],
        end_pos: &[f32; 3],
        filter: &F,
        max_path: usize,
    ) -> Result<PathResult>
    where
        F: QueryFilter + ?Sized,
    {
        nav_ensure!(
            self.nav.is_valid_poly_ref(start) && self.nav.is_valid_poly_ref(end),
            Status::invalid_param()
        );
        nav_ensure!(
            visfinite(start_pos) && visfinite(end_pos) && max_path > 0,
            Status::invalid_param()
        );

        if start == end {
            return Ok(PathResult {
                path: vec![start],
                status: Status::success(),
            });
        }

        self.node_pool.clear();
        self.open_list.clear();

        let h_scale = filter.heuristic_scale()
            * if filter.lowest_area_cost() > 0.0 {
                filter.lowest_area_cost()
            } else {
                1.0
            };

        let start_idx = nav_unwrap!(
            self.node_pool.get_node(start),
            Status::failure_detail(Status::OUT_OF_NODES)
        );
        {
            let node = self.node_pool.node_mut(start_idx);
            node.pos = *start_pos;
            node.cost = 0.0;
            node.total = vdist(start_pos, end_pos) * h_scale;
            node.pidx = 0;
            node.flags = NODE_OPEN;
        }
        self.open_list.push(start_idx, &self.node_pool);

        let mut last_best = start_idx;
        let mut last_best_cost = self.node_pool.node(start_idx).total;
        let mut detail = 0u32;

        let limit = self.iteration_limit();
        let mut iterations = 0usize;

        while let Some(best_idx) = self.open_list.pop(&self.node_pool) {
            iterations += 1;
            if iterations >= limit {
                return Err(Status::failure_detail(Status::INVALID_CYCLE_PATH));
            }

            let (best_ref, best_pos, best_cost, best_pidx) = {
                let node = self.node_pool.node_mut(best_idx);
                node.flags &= !NODE_OPEN;
                node.flags |= NODE_CLOSED;
                (node.id, node.pos, node.cost, node.pidx)
            };

            if best_ref == end {
                last_best = best_idx;
                break;
            }

            let (best_tile, best_poly) =
                nav_unwrap!(self.nav.tile_and_poly_by_ref(best_ref));
            let parent_ref = self
                .node_pool
                .pidx_to_node(best_pidx)
                .map(|i| self.node_pool.node(i).id)
                .unwrap_or(PolyRef::NULL);

            let mut link_idx = best_poly.first_link;
            while link_idx != NULL_LINK {
                let link = best_tile.link(link_idx);
                let neighbour_ref = link.target;
                let link_side = link.side;
                link_idx = link.next;

                if neighbour_ref.is_null() || neighbour_ref == parent_ref {
                    continue;
                }
                if !filter.is_valid_link_side(link_side) {
                    continue;
                }
                let (n_tile, n_poly) = match self.nav.tile_and_poly_by_ref(neighbour_ref) {
                    Some(v) => v,
                    None => continue,
                };
                if !filter.pass_filter(neighbour_ref, n_tile, n_poly) {
                    continue;
                }
                if n_poly.poly_type != PolyType::Ground {
                    let ip = self.nav.decode_poly_id_poly(neighbour_ref) as usize;
                    if let Some(uid) = self.nav.off_mesh_user_id(n_tile, ip) {
                        if !filter.allow_off_mesh_connection(uid) {
                            continue;
                        }
                    }
                }

                let n_idx = match self.node_pool.get_node(neighbour_ref) {
                    Some(i) => i,
                    None => {
                        detail |= Status::OUT_OF_NODES;
                        continue;
                    }
                };

                if self.node_pool.node(n_idx).flags == 0 {
                    let mid = self.get_edge_mid_point(best_ref, neighbour_ref)?;
                    self.node_pool.node_mut(n_idx).pos = mid;
                }
                let n_pos = self.node_pool.node(n_idx).pos;

                let (cost, heuristic) = if neighbour_ref == end {
                    let cur = filter.get_cost(&best_pos, &n_pos, best_poly, Some(n_poly));
                    let endc = filter.get_cost(&n_pos, end_pos, n_poly, None);
                    (best_cost + cur + endc, 0.0)
                } else {
                    let cur = filter.get_cost(&best_pos, &n_pos, best_poly, Some(n_poly));
                    (best_cost + cur, vdist(&n_pos, end_pos) * h_scale)
                };
                let total = cost + heuristic;

                let n_flags = self.node_pool.node(n_idx).flags;
                if n_flags & (NODE_OPEN | NODE_CLOSED) != 0
                    && total >= self.node_pool.node(n_idx).total
                {
                    continue;
                }

                {
                    let node = self.node_pool.node_mut(n_idx);
                    node.pidx = best_idx + 1;
                    node.id = neighbour_ref;
                    node.cost = cost;
                    node.total = total;
                    node.flags &= !NODE_CLOSED;
                }
                if n_flags & NODE_OPEN != 0 {
                    self.open_list.modify(n_idx, &self.node_pool);
                } else {
                    self.node_pool.node_mut(n_idx).flags |= NODE_OPEN;
                    self.open_list.push(n_idx, &self.node_pool);
                }

                if heuristic < last_best_cost {
                    last_best_cost = heuristic;
                    last_best = n_idx;
                }
            }
        }

        let mut status = Status::success_detail(detail);
        if self.node_pool.node(last_best).id != end {
            status |= Status::PARTIAL_RESULT;
        }

        let path = self.trace_path(last_best, max_path, &mut status);
        Ok(PathResult { path, status })
    }

    /// Walks parent pointers from a node back to the root and returns the
    /// corridor in forward order
    pub(crate) fn trace_path(
        &self,
        from_idx: u32,
        max_path: usize,
        status: &mut Status,
    ) -> Vec<PolyRef> {
        let mut rev = Vec::new();
        let mut cur = Some(from_idx);
        while let Some(idx) = cur {
            let node = self.node_pool.node(idx);
            rev.push(node.id);
            cur = self.node_pool.pidx_to_node(node.pidx);
        }
        rev.reverse();
        if rev.len() > max_path {
            rev.truncate(max_path);
            *status |= Status::BUFFER_TOO_SMALL;
        }
        rev
    }

    // ==================================================================
    // Raycast

    /// Walks a 2D ray across polygon edges from `start_ref` toward
    /// `end_pos`, stopping at the first blocking edge
    pub fn raycast<F>(
        &self,
        start_ref: PolyRef,
        start_pos: &[f32; 3],
        end_pos: &[f32; 3],
        filter: &F,
    ) -> Result<RaycastHit>
    where
        F: QueryFilter + ?Sized,
    {
        nav_ensure!(
            self.nav.is_valid_poly_ref(start_ref),
            Status::invalid_param()
        );
        nav_ensure!(
            visfinite(start_pos) && visfinite(end_pos),
            Status::invalid_param()
        );

        let mut hit = RaycastHit {
            t: 0.0,
            normal: [0.0; 3],
            path: Vec::new(),
        };

        let mut cur_ref = start_ref;
        let limit = self.iteration_limit();
        let mut iterations = 0usize;

        while !cur_ref.is_null() {
            iterations += 1;
            if iterations >= limit {
                return Err(Status::failure_detail(Status::INVALID_CYCLE_PATH));
            }

            let (tile, poly) = nav_unwrap!(self.nav.tile_and_poly_by_ref(cur_ref));
            let nv = poly.vert_count as usize;
            let mut verts = [0.0f32; MAX_VERTS_PER_POLYGON * 3];
            for i in 0..nv {
                let v = tile.vert(poly.verts[i]);
                verts[i * 3..i * 3 + 3].copy_from_slice(&v);
            }

            let (_, tmax, _, seg_max) =
                match intersect_segment_poly_2d(start_pos, end_pos, &verts[..nv * 3], nv) {
                    Some(v) => v,
                    // Could not enter the polygon, keep the current t.
                    None => return Ok(hit),
                };

            if tmax > hit.t {
                hit.t = tmax;
            }
            hit.path.push(cur_ref);

            // End point fully inside the current polygon.
            if seg_max < 0 {
                hit.t = f32::MAX;
                return Ok(hit);
            }

            // Follow the link crossing the exit edge, if any is open at
            // the crossing point.
            let mut next_ref = PolyRef::NULL;
            let mut link_idx = poly.first_link;
            while link_idx != NULL_LINK {
                let link = tile.link(link_idx);
                link_idx = link.next;

                if link.edge as i32 != seg_max {
                    continue;
                }
                let (n_tile, n_poly) = match self.nav.tile_and_poly_by_ref(link.target) {
                    Some(v) => v,
                    None => continue,
                };
                // Rays stay on the ground surface.
                if n_poly.poly_type != PolyType::Ground {
                    continue;
                }
                if !filter.pass_filter(link.target, n_tile, n_poly) {
                    continue;
                }
                if !filter.is_valid_link_side(link.side) {
                    continue;
                }

                // In-tile links cover the whole edge.
                if link.side == INTERNAL_LINK_SIDE {
                    next_ref = link.target;
                    break;
                }
                if link.bmin == 0 && link.bmax == 255 {
                    next_ref = link.target;
                    break;
                }

                // Partial boundary link: check the crossing point against
                // the linked sub-range on the boundary axis.
                let e = link.edge as usize;
                let left = [verts[e * 3], verts[e * 3 + 1], verts[e * 3 + 2]];
                let j = (e + 1) % nv;
                let right = [verts[j * 3], verts[j * 3 + 1], verts[j * 3 + 2]];
                let s = 1.0 / 255.0;
                let side = link.side & 0x07;
                if side == 0 || side == 4 {
                    let mut lmin = left[2] + (right[2] - left[2]) * (link.bmin as f32 * s);
                    let mut lmax = left[2] + (right[2] - left[2]) * (link.bmax as f32 * s);
                    if lmin > lmax {
                        std::mem::swap(&mut lmin, &mut lmax);
                    }
                    let z = start_pos[2] + (end_pos[2] - start_pos[2]) * tmax;
                    if z >= lmin && z <= lmax {
                        next_ref = link.target;
                        break;
                    }
                } else if side == 2 || side == 6 {
                    let mut lmin = left[0] + (right[0] - left[0]) * (link.bmin as f32 * s);
                    let mut lmax = left[0] + (right[0] - left[0]) * (link.bmax as f32 * s);
                    if lmin > lmax {
                        std::mem::swap(&mut lmin, &mut lmax);
                    }
                    let x = start_pos[0] + (end_pos[0] - start_pos[0]) * tmax;
                    if x >= lmin && x <= lmax {
                        next_ref = link.target;
                        break;
                    }
                }
            }

            if next_ref.is_null() {
                // Blocked: the exit edge is the hit, normal points back
                // into the polygon.
                let a = seg_max as usize;
                let b = (a + 1) % nv;
                let dx = verts[b * 3] - verts[a * 3];
                let dz = verts[b * 3 + 2] - verts[a * 3 + 2];
                hit.normal = [dz, 0.0, -dx];
                vnormalize(&mut hit.normal);
                return Ok(hit);
            }

            cur_ref = next_ref;
        }

        Ok(hit)
    }

    // ==================================================================
    // Dijkstra expansions

    fn dijkstra_expand<F, P>(
        &mut self,
        start_ref: PolyRef,
        start_pos: &[f32; 3],
        filter: &F,
        mut admit: P,
    ) -> Result<(PolyExpansion, u32)>
    where
        F: QueryFilter + ?Sized,
        P: FnMut(&NavMesh, &[f32; 3], &[f32; 3], f32) -> bool,
    {
        nav_ensure!(
            self.nav.is_valid_poly_ref(start_ref) && visfinite(start_pos),
            Status::invalid_param()
        );

        self.node_pool.clear();
        self.open_list.clear();

        let mut out = PolyExpansion {
            refs: Vec::new(),
            parents: Vec::new(),
            costs: Vec::new(),
        };
        let mut detail = 0u32;

        let start_idx = nav_unwrap!(
            self.node_pool.get_node(start_ref),
            Status::failure_detail(Status::OUT_OF_NODES)
        );
        {
            let node = self.node_pool.node_mut(start_idx);
            node.pos = *start_pos;
            node.cost = 0.0;
            node.total = 0.0;
            node.pidx = 0;
            node.flags = NODE_OPEN;
        }
        self.open_list.push(start_idx, &self.node_pool);
        out.refs.push(start_ref);
        out.parents.push(PolyRef::NULL);
        out.costs.push(0.0);

        let limit = self.iteration_limit();
        let mut iterations = 0usize;

        while let Some(best_idx) = self.open_list.pop(&self.node_pool) {
            iterations += 1;
            if iterations >= limit {
                return Err(Status::failure_detail(Status::INVALID_CYCLE_PATH));
            }

            let (best_ref, best_pos, best_total, best_pidx) = {
                let node = self.node_pool.node_mut(best_idx);
                node.flags &= !NODE_OPEN;
                node.flags |= NODE_CLOSED;
                (node.id, node.pos, node.total, node.pidx)
            };

            let (best_tile, best_poly) =
                nav_unwrap!(self.nav.tile_and_poly_by_ref(best_ref));
            let parent_ref = self
                .node_pool
                .pidx_to_node(best_pidx)
                .map(|i| self.node_pool.node(i).id)
                .unwrap_or(PolyRef::NULL);

            let mut link_idx = best_poly.first_link;
            while link_idx != NULL_LINK {
                let link = best_tile.link(link_idx);
                let neighbour_ref = link.target;
                let link_side = link.side;
                link_idx = link.next;

                if neighbour_ref.is_null() || neighbour_ref == parent_ref {
                    continue;
                }
                if !filter.is_valid_link_side(link_side) {
                    continue;
                }
                let (n_tile, n_poly) = match self.nav.tile_and_poly_by_ref(neighbour_ref) {
                    Some(v) => v,
                    None => continue,
                };
                if !filter.pass_filter(neighbour_ref, n_tile, n_poly) {
                    continue;
                }

                let (left, right) = match self.get_portal_points(best_ref, neighbour_ref) {
                    Ok(v) => v,
                    Err(_) => continue,
                };
                let n_pos = vlerp(&left, &right, 0.5);
                if !admit(self.nav, &left, &right, best_total) {
                    continue;
                }

                let n_idx = match self.node_pool.get_node(neighbour_ref) {
                    Some(i) => i,
                    None => {
                        detail |= Status::OUT_OF_NODES;
                        continue;
                    }
                };
                if self.node_pool.node(n_idx).flags & NODE_CLOSED != 0 {
                    continue;
                }

                let cost =
                    best_total + filter.get_cost(&best_pos, &n_pos, best_poly, Some(n_poly));
                let n_flags = self.node_pool.node(n_idx).flags;
                if n_flags & NODE_OPEN != 0 && cost >= self.node_pool.node(n_idx).total {
                    continue;
                }

                {
                    let node = self.node_pool.node_mut(n_idx);
                    node.id = neighbour_ref;
                    node.pidx = best_idx + 1;
                    node.pos = n_pos;
                    node.total = cost;
                }
                if n_flags & NODE_OPEN != 0 {
                    self.open_list.modify(n_idx, &self.node_pool);
                } else {
                    self.node_pool.node_mut(n_idx).flags = NODE_OPEN;
                    self.open_list.push(n_idx, &self.node_pool);
                    out.refs.push(neighbour_ref);
                    out.parents.push(best_ref);
                    out.costs.push(cost);
                }
            }
        }

        Ok((out, detail))
    }

    /// Polygons reachable within a cost radius of a center point
    pub fn find_polys_around_circle<F>(
        &mut self,
        start_ref: PolyRef,
        center: &[f32; 3],
        radius: f32,
        filter: &F,
    ) -> Result<PolyExpansion>
    where
        F: QueryFilter + ?Sized,
    {
        nav_ensure!(radius >= 0.0, Status::invalid_param());
        let radius_sqr = radius * radius;
        let center = *center;
        let (out, _) = self.dijkstra_expand(start_ref, &center, filter, |_, left, right, _| {
            let (d, _) = dist_pt_seg_sqr_2d(&center, left, right);
            d <= radius_sqr
        })?;
        Ok(out)
    }

    /// Polygons reachable without leaving a convex search polygon.
    /// `shape` is a flat XZ-convex vertex loop.
    pub fn find_polys_around_shape<F>(
        &mut self,
        start_ref: PolyRef,
        shape: &[f32],
        filter: &F,
    ) -> Result<PolyExpansion>
    where
        F: QueryFilter + ?Sized,
    {
        let nverts = shape.len() / 3;
        nav_ensure!(nverts >= 3, Status::invalid_param());

        let mut center = [0.0f32; 3];
        for i in 0..nverts {
            center[0] += shape[i * 3];
            center[1] += shape[i * 3 + 1];
            center[2] += shape[i * 3 + 2];
        }
        let inv = 1.0 / nverts as f32;
        center[0] *= inv;
        center[1] *= inv;
        center[2] *= inv;

        let shape_vec = shape.to_vec();
        let (out, _) = self.dijkstra_expand(start_ref, &center, filter, |_, left, right, _| {
            // The portal must touch the search shape.
            match intersect_segment_poly_2d(left, right, &shape_vec, nverts) {
                Some((tmin, tmax, _, _)) => tmin <= 1.0 && tmax >= 0.0,
                None => {
                    point_in_polygon(left, &shape_vec, nverts)
                        || point_in_polygon(right, &shape_vec, nverts)
                }
            }
        })?;
        Ok(out)
    }

    /// Polygons whose path distance from the start position stays within
    /// `path_distance`
    pub fn find_polys_in_path_distance<F>(
        &mut self,
        start_ref: PolyRef,
        center: &[f32; 3],
        path_distance: f32,
        filter: &F,
    ) -> Result<PolyExpansion>
    where
        F: QueryFilter + ?Sized,
    {
        nav_ensure!(path_distance >= 0.0, Status::invalid_param());
        let center_copy = *center;
        // The front stops expanding once the accumulated cost passes the
        // limit; overshooting entries are trimmed afterwards.
        let (out, _) = self.dijkstra_expand(start_ref, &center_copy, filter, |_, _, _, total| {
            total <= path_distance
        })?;
        let mut trimmed = PolyExpansion {
            refs: Vec::new(),
            parents: Vec::new(),
            costs: Vec::new(),
        };
        for i in 0..out.refs.len() {
            if out.costs[i] <= path_distance {
                trimmed.refs.push(out.refs[i]);
                trimmed.parents.push(out.parents[i]);
                trimmed.costs.push(out.costs[i]);
            }
        }
        Ok(trimmed)
    }

    // ==================================================================
    // Local (tiny pool) queries

    /// Polygons around a center whose expansion never crosses overlapping
    /// geometry, a cheap "what is directly around me" query
    pub fn find_local_neighbourhood<F>(
        &mut self,
        start_ref: PolyRef,
        center: &[f32; 3],
        radius: f32,
        filter: &F,
        max_polys: usize,
    ) -> Result<(Vec<PolyRef>, Vec<PolyRef>)>
    where
        F: QueryFilter + ?Sized,
    {
        nav_ensure!(
            self.nav.is_valid_poly_ref(start_ref) && visfinite(center) && radius >= 0.0,
            Status::invalid_param()
        );

        self.tiny_node_pool.clear();
        let radius_sqr = radius * radius;

        let start_idx = nav_unwrap!(
            self.tiny_node_pool.get_node(start_ref),
            Status::failure_detail(Status::OUT_OF_NODES)
        );
        self.tiny_node_pool.node_mut(start_idx).flags = NODE_CLOSED;

        let mut stack = std::collections::VecDeque::with_capacity(MAX_LOCAL_STACK);
        stack.push_back(start_idx);

        let mut refs = vec![start_ref];
        let mut parents = vec![PolyRef::NULL];

        while let Some(cur_idx) = stack.pop_front() {
            let cur_ref = self.tiny_node_pool.node(cur_idx).id;
            let (cur_tile, cur_poly) = nav_unwrap!(self.nav.tile_and_poly_by_ref(cur_ref));

            let mut link_idx = cur_poly.first_link;
            while link_idx != NULL_LINK {
                let link = cur_tile.link(link_idx);
                let neighbour_ref = link.target;
                link_idx = link.next;

                if neighbour_ref.is_null() {
                    continue;
                }
                if self.tiny_node_pool.find_node(neighbour_ref).is_some() {
                    continue;
                }
                let (n_tile, n_poly) = match self.nav.tile_and_poly_by_ref(neighbour_ref) {
                    Some(v) => v,
                    None => continue,
                };
                // Local neighbourhood stays on the surface.
                if n_poly.poly_type != PolyType::Ground {
                    continue;
                }
                if !filter.pass_filter(neighbour_ref, n_tile, n_poly) {
                    continue;
                }

                let (left, right) = match self.get_portal_points(cur_ref, neighbour_ref) {
                    Ok(v) => v,
                    Err(_) => continue,
                };
                let (d, _) = dist_pt_seg_sqr_2d(center, &left, &right);
                if d > radius_sqr {
                    continue;
                }

                let n_idx = match self.tiny_node_pool.get_node(neighbour_ref) {
                    Some(i) => i,
                    None => continue,
                };
                self.tiny_node_pool.node_mut(n_idx).flags = NODE_CLOSED;

                // Reject polygons overlapping already collected ones in
                // plan view; those belong to other floors.
                let nv = n_poly.vert_count as usize;
                let mut pa = [0.0f32; MAX_VERTS_PER_POLYGON * 3];
                for i in 0..nv {
                    let v = n_tile.vert(n_poly.verts[i]);
                    pa[i * 3..i * 3 + 3].copy_from_slice(&v);
                }
                let mut overlaps = false;
                for &past in &refs {
                    let (p_tile, p_poly) = match self.nav.tile_and_poly_by_ref(past) {
                        Some(v) => v,
                        None => continue,
                    };
                    let pnv = p_poly.vert_count as usize;
                    let mut pb = [0.0f32; MAX_VERTS_PER_POLYGON * 3];
                    for i in 0..pnv {
                        let v = p_tile.vert(p_poly.verts[i]);
                        pb[i * 3..i * 3 + 3].copy_from_slice(&v);
                    }
                    if overlap_poly_poly_2d(&pa[..nv * 3], nv, &pb[..pnv * 3], pnv) {
                        overlaps = true;
                        break;
                    }
                }
                if overlaps {
                    continue;
                }

                if refs.len() < max_polys {
                    refs.push(neighbour_ref);
                    parents.push(cur_ref);
                }
                if stack.len() < MAX_LOCAL_STACK {
                    stack.push_back(n_idx);
                }
            }
        }

        Ok((refs, parents))
    }

    /// Moves from a start position toward an end position, sliding along
    /// walls, never leaving the surface. Returns the final position and
    /// the polygons visited.
    pub fn move_along_surface<F>(
        &mut self,
        start_ref: PolyRef,
        start_pos: &[f32; 3],
        end_pos: &[f32; 3],
        filter: &F,
        max_visited: usize,
    ) -> Result<([f32; 3], Vec<PolyRef>)>
    where
        F: QueryFilter + ?Sized,
    {
        nav_ensure!(
            self.nav.is_valid_poly_ref(start_ref),
            Status::invalid_param()
        );
        nav_ensure!(
            visfinite(start_pos) && visfinite(end_pos),
            Status::invalid_param()
        );

        self.tiny_node_pool.clear();

        let start_idx = nav_unwrap!(
            self.tiny_node_pool.get_node(start_ref),
            Status::failure_detail(Status::OUT_OF_NODES)
        );
        {
            let node = self.tiny_node_pool.node_mut(start_idx);
            node.pidx = 0;
            node.cost = 0.0;
            node.total = 0.0;
            node.flags = NODE_CLOSED;
        }

        let mut best_pos = *start_pos;
        let mut best_dist = f32::MAX;
        let mut best_idx = start_idx;

        // Constrain the walk to a circle over the travel segment.
        let search_pos = vlerp(start_pos, end_pos, 0.5);
        let search_rad = vdist(start_pos, end_pos) / 2.0 + 0.001;
        let search_rad_sqr = search_rad * search_rad;

        let mut stack = std::collections::VecDeque::with_capacity(MAX_LOCAL_STACK);
        stack.push_back(start_idx);

        while let Some(cur_idx) = stack.pop_front() {
            let cur_ref = self.tiny_node_pool.node(cur_idx).id;
            let (tile, poly) = nav_unwrap!(self.nav.tile_and_poly_by_ref(cur_ref));

            let nv = poly.vert_count as usize;
            let mut verts = [0.0f32; MAX_VERTS_PER_POLYGON * 3];
            for i in 0..nv {
                let v = tile.vert(poly.verts[i]);
                verts[i * 3..i * 3 + 3].copy_from_slice(&v);
            }

            if point_in_polygon(end_pos, &verts[..nv * 3], nv) {
                best_idx = cur_idx;
                best_pos = *end_pos;
                break;
            }

            for j in 0..nv {
                let vj = [verts[j * 3], verts[j * 3 + 1], verts[j * 3 + 2]];
                let i2 = (j + 1) % nv;
                let vi = [verts[i2 * 3], verts[i2 * 3 + 1], verts[i2 * 3 + 2]];

                // Collect traversable neighbours over this edge.
                let mut neis: Vec<PolyRef> = Vec::new();
                if poly.neis[j] & EXT_LINK != 0 || poly.neis[j] == 0 {
                    let mut link_idx = poly.first_link;
                    while link_idx != NULL_LINK {
                        let link = tile.link(link_idx);
                        link_idx = link.next;
                        if link.edge as usize != j {
                            continue;
                        }
                        if let Some((n_tile, n_poly)) =
                            self.nav.tile_and_poly_by_ref(link.target)
                        {
                            if n_poly.poly_type == PolyType::Ground
                                && filter.pass_filter(link.target, n_tile, n_poly)
                            {
                                neis.push(link.target);
                            }
                        }
                    }
                } else {
                    let base = self.nav.poly_ref_base(self.nav.decode_poly_id_tile(cur_ref) as usize);
                    let target = PolyRef(base.0 | (poly.neis[j] - 1) as u64);
                    if let Some((n_tile, n_poly)) = self.nav.tile_and_poly_by_ref(target) {
                        if filter.pass_filter(target, n_tile, n_poly) {
                            neis.push(target);
                        }
                    }
                }

                if neis.is_empty() {
                    // Wall edge: candidate slide target.
                    let (d, t) = dist_pt_seg_sqr_2d(end_pos, &vj, &vi);
                    if d < best_dist {
                        best_dist = d;
                        best_pos = vlerp(&vj, &vi, t);
                        best_idx = cur_idx;
                    }
                } else {
                    for target in neis {
                        if self.tiny_node_pool.find_node(target).is_some() {
                            continue;
                        }
                        let (d, _) = dist_pt_seg_sqr_2d(&search_pos, &vj, &vi);
                        if d > search_rad_sqr {
                            continue;
                        }
                        if let Some(n_idx) = self.tiny_node_pool.get_node(target) {
                            {
                                let node = self.tiny_node_pool.node_mut(n_idx);
                                node.pidx = cur_idx + 1;
                                node.flags = NODE_CLOSED;
                            }
                            if stack.len() < MAX_LOCAL_STACK {
                                stack.push_back(n_idx);
                            }
                        }
                    }
                }
            }
        }

        // Reconstruct the visited chain.
        let mut visited = Vec::new();
        let mut cur = Some(best_idx);
        while let Some(idx) = cur {
            let node = self.tiny_node_pool.node(idx);
            visited.push(node.id);
            cur = self.tiny_node_pool.pidx_to_node(node.pidx);
        }
        visited.reverse();
        visited.truncate(max_visited.max(1));

        Ok((best_pos, visited))
    }

    // ==================================================================
    // Wall queries

    /// Wall and portal segments of one polygon. Boundary edges merge their
    /// link sub-ranges so partially linked edges report the uncovered
    /// pieces as walls.
    pub fn get_poly_wall_segments<F>(
        &self,
        r: PolyRef,
        filter: &F,
        store_portals: bool,
    ) -> Result<Vec<WallSegment>>
    where
        F: QueryFilter + ?Sized,
    {
        let (tile, poly) = nav_unwrap!(self.nav.tile_and_poly_by_ref(r));
        nav_ensure!(
            poly.poly_type == PolyType::Ground,
            Status::invalid_param()
        );

        let mut out = Vec::new();
        let nv = poly.vert_count as usize;

        for j in 0..nv {
            let vj = tile.vert(poly.verts[j]);
            let vi = tile.vert(poly.verts[(j + 1) % nv]);

            if poly.neis[j] & EXT_LINK != 0 {
                // Boundary edge: merge the covered sub-ranges.
                let mut ints: Vec<(i16, i16, PolyRef)> = Vec::new();
                let mut link_idx = poly.first_link;
                while link_idx != NULL_LINK {
                    let link = tile.link(link_idx);
                    link_idx = link.next;
                    if link.edge as usize != j {
                        continue;
                    }
                    if link.target.is_null() {
                        continue;
                    }
                    if let Some((n_tile, n_poly)) = self.nav.tile_and_poly_by_ref(link.target) {
                        if filter.pass_filter(link.target, n_tile, n_poly) {
                            insert_interval(
                                &mut ints,
                                link.bmin as i16,
                                link.bmax as i16,
                                link.target,
                            );
                        }
                    }
                }
                // Sentinels bracket the whole edge.
                insert_interval(&mut ints, -1, 0, PolyRef::NULL);
                insert_interval(&mut ints, 255, 256, PolyRef::NULL);

                for k in 1..ints.len() {
                    // Gap between intervals is a wall.
                    if ints[k - 1].1 < ints[k].0 {
                        let tmin = ints[k - 1].1 as f32 / 255.0;
                        let tmax = ints[k].0 as f32 / 255.0;
                        out.push(WallSegment {
                            start: vlerp(&vj, &vi, tmin),
                            end: vlerp(&vj, &vi, tmax),
                            neighbor: PolyRef::NULL,
                        });
                    }
                    // The interval itself is a portal.
                    if store_portals && ints[k].0 < ints[k].1 {
                        let tmin = ints[k].0 as f32 / 255.0;
                        let tmax = ints[k].1 as f32 / 255.0;
                        out.push(WallSegment {
                            start: vlerp(&vj, &vi, tmin),
                            end: vlerp(&vj, &vi, tmax),
                            neighbor: ints[k].2,
                        });
                    }
                }
            } else {
                // Internal edge or hard border.
                let mut neighbor = PolyRef::NULL;
                if poly.neis[j] != 0 {
                    let base =
                        self.nav.poly_ref_base(self.nav.decode_poly_id_tile(r) as usize);
                    let target = PolyRef(base.0 | (poly.neis[j] - 1) as u64);
                    if let Some((n_tile, n_poly)) = self.nav.tile_and_poly_by_ref(target) {
                        if filter.pass_filter(target, n_tile, n_poly) {
                            neighbor = target;
                        }
                    }
                }
                if neighbor.is_null() {
                    out.push(WallSegment {
                        start: vj,
                        end: vi,
                        neighbor: PolyRef::NULL,
                    });
                } else if store_portals {
                    out.push(WallSegment {
                        start: vj,
                        end: vi,
                        neighbor,
                    });
                }
            }
        }

        Ok(out)
    }

    /// Wall segments of every polygon in the local neighbourhood
    pub fn find_walls_in_neighbourhood<F>(
        &mut self,
        start_ref: PolyRef,
        center: &[f32; 3],
        radius: f32,
        filter: &F,
        max_polys: usize,
    ) -> Result<Vec<WallSegment>>
    where
        F: QueryFilter + ?Sized,
    {
        let (refs, _) =
            self.find_local_neighbourhood(start_ref, center, radius, filter, max_polys)?;
        let radius_sqr = radius * radius;

        let mut walls = Vec::new();
        for r in refs {
            for seg in self.get_poly_wall_segments(r, filter, false)? {
                let (d, _) = dist_pt_seg_sqr_2d(center, &seg.start, &seg.end);
                if d <= radius_sqr {
                    walls.push(seg);
                }
            }
        }
        Ok(walls)
    }

    /// Distance from a point to the nearest wall reachable on the surface.
    /// Returns (distance, hit position, hit normal).
    pub fn find_distance_to_wall<F>(
        &mut self,
        start_ref: PolyRef,
        center: &[f32; 3],
        max_radius: f32,
        filter: &F,
    ) -> Result<(f32, [f32; 3], [f32; 3])>
    where
        F: QueryFilter + ?Sized,
    {
        nav_ensure!(
            self.nav.is_valid_poly_ref(start_ref) && visfinite(center) && max_radius >= 0.0,
            Status::invalid_param()
        );

        self.node_pool.clear();
        self.open_list.clear();

        let start_idx = nav_unwrap!(
            self.node_pool.get_node(start_ref),
            Status::failure_detail(Status::OUT_OF_NODES)
        );
        {
            let node = self.node_pool.node_mut(start_idx);
            node.pos = *center;
            node.cost = 0.0;
            node.total = 0.0;
            node.pidx = 0;
            node.flags = NODE_OPEN;
        }
        self.open_list.push(start_idx, &self.node_pool);

        let mut radius_sqr = max_radius * max_radius;
        let mut hit_pos = *center;

        let limit = self.iteration_limit();
        let mut iterations = 0usize;

        while let Some(best_idx) = self.open_list.pop(&self.node_pool) {
            iterations += 1;
            if iterations >= limit {
                return Err(Status::failure_detail(Status::INVALID_CYCLE_PATH));
            }

            let (best_ref, best_pos, best_total, best_pidx) = {
                let node = self.node_pool.node_mut(best_idx);
                node.flags &= !NODE_OPEN;
                node.flags |= NODE_CLOSED;
                (node.id, node.pos, node.total, node.pidx)
            };

            let (tile, poly) = nav_unwrap!(self.nav.tile_and_poly_by_ref(best_ref));
            let parent_ref = self
                .node_pool
                .pidx_to_node(best_pidx)
                .map(|i| self.node_pool.node(i).id)
                .unwrap_or(PolyRef::NULL);

            // Walls of this polygon shrink the search radius.
            let nv = poly.vert_count as usize;
            for j in 0..nv {
                let vj = tile.vert(poly.verts[j]);
                let vi = tile.vert(poly.verts[(j + 1) % nv]);

                let mut solid = true;
                if poly.neis[j] & EXT_LINK != 0 {
                    let mut link_idx = poly.first_link;
                    while link_idx != NULL_LINK {
                        let link = tile.link(link_idx);
                        link_idx = link.next;
                        if link.edge as usize != j || link.target.is_null() {
                            continue;
                        }
                        if let Some((n_tile, n_poly)) =
                            self.nav.tile_and_poly_by_ref(link.target)
                        {
                            if n_poly.poly_type == PolyType::Ground
                                && filter.pass_filter(link.target, n_tile, n_poly)
                            {
                                solid = false;
                                break;
                            }
                        }
                    }
                } else if poly.neis[j] != 0 {
                    let base =
                        self.nav.poly_ref_base(self.nav.decode_poly_id_tile(best_ref) as usize);
                    let target = PolyRef(base.0 | (poly.neis[j] - 1) as u64);
                    if let Some((n_tile, n_poly)) = self.nav.tile_and_poly_by_ref(target) {
                        if filter.pass_filter(target, n_tile, n_poly) {
                            solid = false;
                        }
                    }
                }
                if !solid {
                    continue;
                }

                let (d, t) = dist_pt_seg_sqr_2d(center, &vj, &vi);
                if d < radius_sqr {
                    radius_sqr = d;
                    hit_pos = vlerp(&vj, &vi, t);
                }
            }

            // Expand across open edges still inside the radius.
            let mut link_idx = poly.first_link;
            while link_idx != NULL_LINK {
                let link = tile.link(link_idx);
                let neighbour_ref = link.target;
                let link_side = link.side;
                link_idx = link.next;

                if neighbour_ref.is_null() || neighbour_ref == parent_ref {
                    continue;
                }
                if !filter.is_valid_link_side(link_side) {
                    continue;
                }
                let (n_tile, n_poly) = match self.nav.tile_and_poly_by_ref(neighbour_ref) {
                    Some(v) => v,
                    None => continue,
                };
                if n_poly.poly_type != PolyType::Ground {
                    continue;
                }
                if !filter.pass_filter(neighbour_ref, n_tile, n_poly) {
                    continue;
                }

                let (left, right) = match self.get_portal_points(best_ref, neighbour_ref) {
                    Ok(v) => v,
                    Err(_) => continue,
                };
                let (d, _) = dist_pt_seg_sqr_2d(center, &left, &right);
                if d > radius_sqr {
                    continue;
                }

                let n_idx = match self.node_pool.get_node(neighbour_ref) {
                    Some(i) => i,
                    None => continue,
                };
                if self.node_pool.node(n_idx).flags & NODE_CLOSED != 0 {
                    continue;
                }

                let n_pos = vlerp(&left, &right, 0.5);
                let total = best_total + vdist(&best_pos, &n_pos);
                let n_flags = self.node_pool.node(n_idx).flags;
                if n_flags & NODE_OPEN != 0 && total >= self.node_pool.node(n_idx).total {
                    continue;
                }

                {
                    let node = self.node_pool.node_mut(n_idx);
                    node.id = neighbour_ref;
                    node.pidx = best_idx + 1;
                    node.pos = n_pos;
                    node.total = total;
                }
                if n_flags & NODE_OPEN != 0 {
                    self.open_list.modify(n_idx, &self.node_pool);
                } else {
                    self.node_pool.node_mut(n_idx).flags = NODE_OPEN;
                    self.open_list.push(n_idx, &self.node_pool);
                }
            }
        }

        let mut normal = vsub(center, &hit_pos);
        vnormalize(&mut normal);
        Ok((radius_sqr.sqrt(), hit_pos, normal))
    }

    // ==================================================================
    // Random points

    /// Uniformly random point on the mesh, weighted by polygon area
    pub fn find_random_point<F>(&mut self, filter: &F) -> Result<(PolyRef, [f32; 3])>
    where
        F: QueryFilter + ?Sized,
    {
        let mut chosen = PolyRef::NULL;
        let mut area_sum = 0.0f32;

        for tidx in 0..self.nav.max_tiles() {
            let tile = match self.nav.tile(tidx) {
                Some(t) => t,
                None => continue,
            };
            let base = self.nav.poly_ref_base(tidx);
            for (ip, poly) in tile.polys.iter().enumerate() {
                if poly.poly_type != PolyType::Ground {
                    continue;
                }
                let r = PolyRef(base.0 | ip as u64);
                if !filter.pass_filter(r, tile, poly) {
                    continue;
                }
                let area = poly_surface_area(tile, poly);
                area_sum += area;
                // Reservoir sampling keeps each poly with p = area/sum.
                if area_sum > 0.0 && self.rand.next_f32() * area_sum <= area {
                    chosen = r;
                }
            }
        }
        nav_ensure!(!chosen.is_null(), Status::failure());

        let pt = self.random_point_in_poly(chosen)?;
        Ok((chosen, pt))
    }

    /// Random reachable point within a cost radius of a center
    pub fn find_random_point_around_circle<F>(
        &mut self,
        start_ref: PolyRef,
        center: &[f32; 3],
        radius: f32,
        filter: &F,
    ) -> Result<(PolyRef, [f32; 3])>
    where
        F: QueryFilter + ?Sized,
    {
        let expansion = self.find_polys_around_circle(start_ref, center, radius, filter)?;
        nav_ensure!(!expansion.refs.is_empty(), Status::failure());

        // Keep a small random subset of reached polygons, then try a few
        // sample points in each until one lands inside the circle.
        const CANDIDATES: usize = 4;
        const TRIES_PER_CANDIDATE: usize = 4;
        let mut candidates: Vec<PolyRef> = Vec::with_capacity(CANDIDATES);
        for (i, &r) in expansion.refs.iter().enumerate() {
            if candidates.len() < CANDIDATES {
                candidates.push(r);
            } else {
                let j = (self.rand.next_f32() * (i + 1) as f32) as usize;
                if j < CANDIDATES {
                    candidates[j] = r;
                }
            }
        }

        let radius_sqr = radius * radius;
        for r in candidates {
            for _ in 0..TRIES_PER_CANDIDATE {
                let pt = self.random_point_in_poly(r)?;
                if vdist_2d_sqr(&pt, center) <= radius_sqr {
                    return Ok((r, pt));
                }
            }
        }
        Err(Status::failure())
    }

    /// Random point inside a cluster, weighted by polygon area
    pub fn find_random_point_in_cluster<F>(
        &mut self,
        cluster: crate::nav_mesh::ClusterRef,
        filter: &F,
    ) -> Result<(PolyRef, [f32; 3])>
    where
        F: QueryFilter + ?Sized,
    {
        nav_ensure!(
            self.nav.is_valid_cluster_ref(cluster),
            Status::invalid_param()
        );
        let (_, it, ic) = self.nav.decode_poly_id(PolyRef(cluster.0));
        let tile = nav_unwrap!(self.nav.tile(it as usize));
        let base = self.nav.poly_ref_base(it as usize);

        let mut chosen = PolyRef::NULL;
        let mut area_sum = 0.0f32;
        for (ip, poly) in tile.polys.iter().enumerate() {
            if poly.poly_type != PolyType::Ground {
                continue;
            }
            if tile.poly_clusters.get(ip).copied() != Some(ic as u16) {
                continue;
            }
            let r = PolyRef(base.0 | ip as u64);
            if !filter.pass_filter(r, tile, poly) {
                continue;
            }
            let area = poly_surface_area(tile, poly);
            area_sum += area;
            if area_sum > 0.0 && self.rand.next_f32() * area_sum <= area {
                chosen = r;
            }
        }
        nav_ensure!(!chosen.is_null(), Status::failure());

        let pt = self.random_point_in_poly(chosen)?;
        Ok((chosen, pt))
    }

    fn random_point_in_poly(&mut self, r: PolyRef) -> Result<[f32; 3]> {
        let (tile, poly) = nav_unwrap!(self.nav.tile_and_poly_by_ref(r));
        let nv = poly.vert_count as usize;
        let mut verts = [0.0f32; MAX_VERTS_PER_POLYGON * 3];
        for i in 0..nv {
            let v = tile.vert(poly.verts[i]);
            verts[i * 3..i * 3 + 3].copy_from_slice(&v);
        }
        let s = self.rand.next_f32();
        let t = self.rand.next_f32();
        let mut pt = random_point_in_convex_poly(&verts[..nv * 3], nv, s, t);
        let ip = self.nav.decode_poly_id_poly(r) as usize;
        if let Some(h) = self.nav.poly_height_in_tile(tile, ip, &pt) {
            pt[1] = h;
        }
        Ok(pt)
    }

    // ==================================================================
    // Cluster path test

    /// Cheap reachability test over the cluster graph. Errors with a plain
    /// failure when the mesh carries no cluster data, so callers can fall
    /// back to a full path query.
    pub fn test_cluster_path(&mut self, start: PolyRef, end: PolyRef) -> Result<bool> {
        let start_cluster = self.nav.get_poly_cluster(start).map_err(|_| {
            if self.nav.is_valid_poly_ref(start) {
                Status::failure()
            } else {
                Status::invalid_param()
            }
        })?;
        let end_cluster = self.nav.get_poly_cluster(end).map_err(|_| {
            if self.nav.is_valid_poly_ref(end) {
                Status::failure()
            } else {
                Status::invalid_param()
            }
        })?;

        if start_cluster == end_cluster {
            return Ok(true);
        }

        self.tiny_node_pool.clear();
        let start_idx = nav_unwrap!(
            self.tiny_node_pool.get_node(PolyRef(start_cluster.0)),
            Status::failure_detail(Status::OUT_OF_NODES)
        );
        self.tiny_node_pool.node_mut(start_idx).flags = NODE_CLOSED;

        let mut stack = std::collections::VecDeque::new();
        stack.push_back(start_idx);

        let limit = self.iteration_limit();
        let mut iterations = 0usize;

        while let Some(cur_idx) = stack.pop_front() {
            iterations += 1;
            if iterations >= limit {
                return Err(Status::failure_detail(Status::INVALID_CYCLE_PATH));
            }
            let cur = crate::nav_mesh::ClusterRef(self.tiny_node_pool.node(cur_idx).id.0);
            for (target, flags) in self.nav.cluster_links(cur)? {
                if flags & crate::cluster::CLUSTER_LINK_VALID_FWD == 0 {
                    continue;
                }
                if target == end_cluster {
                    return Ok(true);
                }
                if self.tiny_node_pool.find_node(PolyRef(target.0)).is_some() {
                    continue;
                }
                if let Some(idx) = self.tiny_node_pool.get_node(PolyRef(target.0)) {
                    self.tiny_node_pool.node_mut(idx).flags = NODE_CLOSED;
                    stack.push_back(idx);
                }
            }
        }
        Ok(false)
    }
}

/// Sorted insertion of a covered interval along a boundary edge
fn insert_interval(ints: &mut Vec<(i16, i16, PolyRef)>, tmin: i16, tmax: i16, r: PolyRef) {
    let pos = ints
        .iter()
        .position(|&(imin, _, _)| tmin <= imin)
        .unwrap_or(ints.len());
    ints.insert(pos, (tmin, tmax, r));
}

/// Surface area of a ground polygon, from its triangle fan
fn poly_surface_area(tile: &MeshTile, poly: &Poly) -> f32 {
    let mut area = 0.0;
    let v0 = tile.vert(poly.verts[0]);
    for i in 2..poly.vert_count as usize {
        let v1 = tile.vert(poly.verts[i - 1]);
        let v2 = tile.vert(poly.verts[i]);
        area += tri_area_2d(&v0, &v1, &v2).abs() * 0.5;
    }
    area
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interval_insertion_sorted() {
        let mut ints = Vec::new();
        insert_interval(&mut ints, 100, 150, PolyRef(1));
        insert_interval(&mut ints, -1, 0, PolyRef::NULL);
        insert_interval(&mut ints, 255, 256, PolyRef::NULL);
        insert_interval(&mut ints, 10, 50, PolyRef(2));
        let mins: Vec<i16> = ints.iter().map(|i| i.0).collect();
        assert_eq!(mins, vec![-1, 10, 100, 255]);
    }

    #[test]
    fn lcg_is_deterministic_and_bounded() {
        let mut a = Lcg::new(7);
        let mut b = Lcg::new(7);
        for _ in 0..100 {
            let va = a.next_f32();
            assert_eq!(va, b.next_f32());
            assert!((0.0..1.0).contains(&va));
        }
    }
}
