//! Incremental pathfinding
//!
//! The sliced query runs the same A* as the one-shot path query but
//! spread over multiple `update` calls, so a server tick can budget a
//! fixed number of node expansions across many agents. The search state
//! lives in the query context; the filter is passed to every call and
//! must describe the same costs throughout one query, and the polygon
//! references are re-validated on each update so tile changes between
//! slices fail the query instead of following stale links.

use crate::filter::QueryFilter;
use crate::nav_mesh::{PolyRef, PolyType, NULL_LINK};
use crate::nav_mesh_query::{NavMeshQuery, PathResult};
use crate::node_pool::{NODE_CLOSED, NODE_OPEN};
use crate::status::{Result, Status};
use crate::{nav_ensure, nav_unwrap};
use tilenav_common::math::{vdist, visfinite};

/// State of an in-flight sliced path query
#[derive(Debug, Clone)]
pub struct SlicedQueryState {
    pub(crate) status: Status,
    start_ref: PolyRef,
    end_ref: PolyRef,
    start_pos: [f32; 3],
    end_pos: [f32; 3],
    h_scale: f32,
    last_best: u32,
    last_best_cost: f32,
    detail: u32,
    iterations: usize,
    active: bool,
}

impl Default for SlicedQueryState {
    fn default() -> Self {
        Self {
            status: Status::failure(),
            start_ref: PolyRef::NULL,
            end_ref: PolyRef::NULL,
            start_pos: [0.0; 3],
            end_pos: [0.0; 3],
            h_scale: 1.0,
            last_best: 0,
            last_best_cost: 0.0,
            detail: 0,
            iterations: 0,
            active: false,
        }
    }
}

impl<'m> NavMeshQuery<'m> {
    /// Starts a sliced path query. Any previous sliced query on this
    /// context is discarded.
    pub fn init_sliced_find_path<F>(
        &mut self,
        start: PolyRef,
        end: PolyRef,
        start_pos: &[f32; 3],
        end_pos: &[f32; 3],
        filter: &F,
    ) -> Result<Status>
    where
        F: QueryFilter + ?Sized,
    {
        self.sliced = SlicedQueryState::default();

        nav_ensure!(
            self.nav_mesh().is_valid_poly_ref(start) && self.nav_mesh().is_valid_poly_ref(end),
            Status::invalid_param()
        );
        nav_ensure!(
            visfinite(start_pos) && visfinite(end_pos),
            Status::invalid_param()
        );

        let h_scale = filter.heuristic_scale()
            * if filter.lowest_area_cost() > 0.0 {
                filter.lowest_area_cost()
            } else {
                1.0
            };

        self.sliced.start_ref = start;
        self.sliced.end_ref = end;
        self.sliced.start_pos = *start_pos;
        self.sliced.end_pos = *end_pos;
        self.sliced.h_scale = h_scale;
        self.sliced.active = true;

        if start == end {
            self.sliced.status = Status::success();
            return Ok(self.sliced.status);
        }

        self.node_pool.clear();
        self.open_list.clear();

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

        self.sliced.last_best = start_idx;
        self.sliced.last_best_cost = self.node_pool.node(start_idx).total;
        self.sliced.status = Status::in_progress();
        Ok(self.sliced.status)
    }

    /// Runs up to `max_iter` node expansions. Returns the query status and
    /// the number of expansions actually performed.
    pub fn update_sliced_find_path<F>(
        &mut self,
        max_iter: usize,
        filter: &F,
    ) -> Result<(Status, usize)>
    where
        F: QueryFilter + ?Sized,
    {
        if !self.sliced.active || !self.sliced.status.is_in_progress() {
            return Ok((self.sliced.status, 0));
        }

        // Tiles may have changed between slices.
        if !self.nav_mesh().is_valid_poly_ref(self.sliced.start_ref)
            || !self.nav_mesh().is_valid_poly_ref(self.sliced.end_ref)
        {
            self.sliced.status = Status::failure();
            return Ok((self.sliced.status, 0));
        }

        let end_ref = self.sliced.end_ref;
        let end_pos = self.sliced.end_pos;
        let h_scale = self.sliced.h_scale;
        let limit = self.iteration_limit();

        let mut done = 0usize;
        while done < max_iter {
            let best_idx = match self.open_list.pop(&self.node_pool) {
                Some(i) => i,
                None => {
                    // Exhausted the reachable graph without touching the
                    // end polygon.
                    self.sliced.status =
                        Status::success_detail(self.sliced.detail | Status::PARTIAL_RESULT);
                    return Ok((self.sliced.status, done));
                }
            };
            done += 1;
            self.sliced.iterations += 1;
            if self.sliced.iterations >= limit {
                self.sliced.status = Status::failure_detail(Status::INVALID_CYCLE_PATH);
                return Ok((self.sliced.status, done));
            }

            let (best_ref, best_pos, best_cost, best_pidx) = {
                let node = self.node_pool.node_mut(best_idx);
                node.flags &= !NODE_OPEN;
                node.flags |= NODE_CLOSED;
                (node.id, node.pos, node.cost, node.pidx)
            };

            if best_ref == end_ref {
                self.sliced.last_best = best_idx;
                self.sliced.status = Status::success_detail(self.sliced.detail);
                return Ok((self.sliced.status, done));
            }

            // The popped reference may have gone stale since it was pushed.
            let (best_tile, best_poly) = match self.nav_mesh().tile_and_poly_by_ref(best_ref) {
                Some(v) => v,
                None => {
                    self.sliced.status = Status::failure();
                    return Ok((self.sliced.status, done));
                }
            };
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
                let (n_tile, n_poly) = match self.nav_mesh().tile_and_poly_by_ref(neighbour_ref) {
                    Some(v) => v,
                    None => continue,
                };
                if !filter.pass_filter(neighbour_ref, n_tile, n_poly) {
                    continue;
                }
                if n_poly.poly_type != PolyType::Ground {
                    let ip = self.nav_mesh().decode_poly_id_poly(neighbour_ref) as usize;
                    if let Some(uid) = self.nav_mesh().off_mesh_user_id(n_tile, ip) {
                        if !filter.allow_off_mesh_connection(uid) {
                            continue;
                        }
                    }
                }

                let n_idx = match self.node_pool.get_node(neighbour_ref) {
                    Some(i) => i,
                    None => {
                        self.sliced.detail |= Status::OUT_OF_NODES;
                        continue;
                    }
                };

                if self.node_pool.node(n_idx).flags == 0 {
                    let mid = self.get_edge_mid_point(best_ref, neighbour_ref)?;
                    self.node_pool.node_mut(n_idx).pos = mid;
                }
                let n_pos = self.node_pool.node(n_idx).pos;

                let (cost, heuristic) = if neighbour_ref == end_ref {
                    let cur = filter.get_cost(&best_pos, &n_pos, best_poly, Some(n_poly));
                    let endc = filter.get_cost(&n_pos, &end_pos, n_poly, None);
                    (best_cost + cur + endc, 0.0)
                } else {
                    let cur = filter.get_cost(&best_pos, &n_pos, best_poly, Some(n_poly));
                    (best_cost + cur, vdist(&n_pos, &end_pos) * h_scale)
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

                if heuristic < self.sliced.last_best_cost {
                    self.sliced.last_best_cost = heuristic;
                    self.sliced.last_best = n_idx;
                }
            }
        }

        Ok((self.sliced.status, done))
    }

    /// Finishes the sliced query and returns the corridor found so far
    pub fn finalize_sliced_find_path(&mut self, max_path: usize) -> Result<PathResult> {
        nav_ensure!(self.sliced.active, Status::failure());
        nav_ensure!(max_path > 0, Status::invalid_param());

        if self.sliced.status.is_failure() {
            let status = self.sliced.status;
            self.sliced = SlicedQueryState::default();
            return Err(status);
        }

        if self.sliced.start_ref == self.sliced.end_ref {
            let path = vec![self.sliced.start_ref];
            self.sliced = SlicedQueryState::default();
            return Ok(PathResult {
                path,
                status: Status::success(),
            });
        }

        let mut status = Status::success_detail(self.sliced.detail);
        if self.node_pool.node(self.sliced.last_best).id != self.sliced.end_ref {
            status |= Status::PARTIAL_RESULT;
        }
        let path = self.trace_path(self.sliced.last_best, max_path, &mut status);
        self.sliced = SlicedQueryState::default();
        Ok(PathResult { path, status })
    }

    /// Finishes the sliced query against an existing corridor: the result
    /// runs from the start to the furthest polygon of `existing` the
    /// search visited. Used to patch a corridor after the mesh changed
    /// under it.
    pub fn finalize_sliced_find_path_partial(
        &mut self,
        existing: &[PolyRef],
        max_path: usize,
    ) -> Result<PathResult> {
        nav_ensure!(self.sliced.active, Status::failure());
        nav_ensure!(!existing.is_empty() && max_path > 0, Status::invalid_param());

        if self.sliced.status.is_failure() {
            let status = self.sliced.status;
            self.sliced = SlicedQueryState::default();
            return Err(status);
        }

        // Furthest visited polygon along the existing corridor.
        let mut from_idx = None;
        for &r in existing.iter().rev() {
            if let Some(idx) = self.node_pool.find_node(r) {
                from_idx = Some(idx);
                break;
            }
        }

        let mut status = Status::success_detail(self.sliced.detail | Status::PARTIAL_RESULT);
        let path = match from_idx {
            Some(idx) => self.trace_path(idx, max_path, &mut status),
            None => vec![self.sliced.start_ref],
        };
        self.sliced = SlicedQueryState::default();
        Ok(PathResult { path, status })
    }
}
