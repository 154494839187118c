//! Straight path (string pulling)
//!
//! Turns a polygon corridor into a sequence of waypoints with the funnel
//! algorithm. Portals between boundary polygons are clamped to the linked
//! sub-range of the shared edge, off-mesh connections appear as their own
//! flagged waypoints, and off-mesh segment crossings are locked to a fixed
//! point on each rail so both ends of the jump line up.

use crate::filter::QueryFilter;
use crate::nav_mesh::{PolyRef, PolyType};
use crate::nav_mesh_query::NavMeshQuery;
use crate::status::{Result, Status};
use crate::{nav_ensure, nav_unwrap};
use tilenav_common::geometry::{dist_pt_seg_sqr_2d, intersect_seg_seg_2d, tri_area_2d};
use tilenav_common::math::{sqr, vequal, visfinite, vlerp, vperp_2d, vsub};

/// Waypoint is the path start
pub const STRAIGHT_PATH_START: u8 = 0x01;
/// Waypoint is the path end
pub const STRAIGHT_PATH_END: u8 = 0x02;
/// Waypoint enters an off-mesh connection
pub const STRAIGHT_PATH_OFFMESH_CONNECTION: u8 = 0x04;

/// Add a waypoint at every polygon crossing where the area changes
pub const STRAIGHT_PATH_AREA_CROSSINGS: u8 = 0x01;
/// Add a waypoint at every polygon crossing
pub const STRAIGHT_PATH_ALL_CROSSINGS: u8 = 0x02;

/// One waypoint of a straightened path
#[derive(Debug, Clone, Copy)]
pub struct StraightPathPoint {
    /// Waypoint position
    pub pos: [f32; 3],
    /// `STRAIGHT_PATH_*` flags
    pub flags: u8,
    /// Polygon being entered at this waypoint, null at the path end
    pub poly: PolyRef,
}

/// Straightened path plus the status detail bits accumulated building it
#[derive(Debug, Clone)]
pub struct StraightPathResult {
    /// Waypoints from start to end
    pub points: Vec<StraightPathPoint>,
    /// Success status, possibly carrying `PARTIAL_RESULT` or
    /// `BUFFER_TOO_SMALL`
    pub status: Status,
}

/// Appends a waypoint, merging with an equal trailing point. Returns
/// false when the buffer is full.
fn append_vertex(
    points: &mut Vec<StraightPathPoint>,
    pos: [f32; 3],
    flags: u8,
    poly: PolyRef,
    max_points: usize,
) -> bool {
    if let Some(last) = points.last_mut() {
        if vequal(&last.pos, &pos) {
            last.flags = flags;
            last.poly = poly;
            return true;
        }
    }
    if points.len() >= max_points {
        return false;
    }
    points.push(StraightPathPoint { pos, flags, poly });
    true
}

impl<'m> NavMeshQuery<'m> {
    /// Portal for string pulling, with the polygon types on both sides
    fn portal_points_with_types(
        &self,
        from: PolyRef,
        to: PolyRef,
    ) -> Result<([f32; 3], [f32; 3], PolyType, PolyType)> {
        let (_, from_poly) = nav_unwrap!(self.nav_mesh().tile_and_poly_by_ref(from));
        let (_, to_poly) = nav_unwrap!(self.nav_mesh().tile_and_poly_by_ref(to));
        let (left, right) = self.get_portal_points(from, to)?;
        Ok((left, right, from_poly.poly_type, to_poly.poly_type))
    }

    /// Appends crossing waypoints between two corridor positions,
    /// honoring the crossing options
    #[allow(clippy::too_many_arguments)]
    fn append_portals(
        &self,
        start_idx: usize,
        end_idx: usize,
        end_pos: &[f32; 3],
        path: &[PolyRef],
        points: &mut Vec<StraightPathPoint>,
        max_points: usize,
        options: u8,
    ) -> bool {
        let start_pos = match points.last() {
            Some(p) => p.pos,
            None => return true,
        };
        for i in start_idx..end_idx {
            let from = path[i];
            let to = path[i + 1];
            let (left, right) = match self.get_portal_points(from, to) {
                Ok(v) => v,
                Err(_) => break,
            };
            if options & STRAIGHT_PATH_AREA_CROSSINGS != 0
                && options & STRAIGHT_PATH_ALL_CROSSINGS == 0
            {
                let from_area = self
                    .nav_mesh()
                    .tile_and_poly_by_ref(from)
                    .map(|(_, p)| p.area);
                let to_area = self
                    .nav_mesh()
                    .tile_and_poly_by_ref(to)
                    .map(|(_, p)| p.area);
                if from_area == to_area {
                    continue;
                }
            }
            if let Some((_, t)) = intersect_seg_seg_2d(&start_pos, end_pos, &left, &right) {
                let pt = vlerp(&left, &right, t);
                if !append_vertex(points, pt, 0, to, max_points) {
                    return false;
                }
            }
        }
        true
    }

    /// Straightens a polygon corridor into waypoints.
    ///
    /// `path` is a corridor as produced by the path queries; `start_pos`
    /// and `end_pos` are clamped onto its first and last polygons. With a
    /// crossings option set, intermediate polygon boundaries produce
    /// waypoints too.
    pub fn find_straight_path(
        &self,
        start_pos: &[f32; 3],
        end_pos: &[f32; 3],
        path: &[PolyRef],
        max_points: usize,
        options: u8,
    ) -> Result<StraightPathResult> {
        nav_ensure!(
            !path.is_empty() && max_points > 0,
            Status::invalid_param()
        );
        nav_ensure!(
            visfinite(start_pos) && visfinite(end_pos),
            Status::invalid_param()
        );

        let closest_start = self.closest_point_on_poly_boundary(path[0], start_pos)?;
        let closest_end =
            self.closest_point_on_poly_boundary(path[path.len() - 1], end_pos)?;

        let mut points = Vec::new();
        let mut status = Status::success();

        if !append_vertex(
            &mut points,
            closest_start,
            STRAIGHT_PATH_START,
            path[0],
            max_points,
        ) {
            return Ok(StraightPathResult {
                points,
                status: status | Status::BUFFER_TOO_SMALL,
            });
        }

        let n = path.len();
        if n > 1 {
            let mut portal_apex = closest_start;
            let mut portal_left = portal_apex;
            let mut portal_right = portal_apex;
            let mut apex_index = 0usize;
            let mut left_index = 0usize;
            let mut right_index = 0usize;
            let mut left_poly = path[0];
            let mut right_poly = path[0];
            let mut left_type = PolyType::Ground;
            let mut right_type = PolyType::Ground;
            let mut segt = 0.0f32;
            let mut seg_swapped = false;

            let mut i = 0usize;
            while i < n {
                let (mut left, mut right, from_type, to_type, to_ref) = if i + 1 < n {
                    match self.portal_points_with_types(path[i], path[i + 1]) {
                        Ok((l, r, ft, tt)) => (l, r, ft, tt, path[i + 1]),
                        Err(_) => {
                            // Stale corridor: stop at the last good
                            // polygon.
                            let clamped = self
                                .closest_point_on_poly_boundary(path[i], end_pos)
                                .unwrap_or(*end_pos);
                            if options != 0
                                && !self.append_portals(
                                    apex_index,
                                    i,
                                    &clamped,
                                    path,
                                    &mut points,
                                    max_points,
                                    options,
                                )
                            {
                                status |= Status::BUFFER_TOO_SMALL;
                            }
                            if !append_vertex(
                                &mut points,
                                clamped,
                                STRAIGHT_PATH_END,
                                PolyRef::NULL,
                                max_points,
                            ) {
                                status |= Status::BUFFER_TOO_SMALL;
                            }
                            return Ok(StraightPathResult {
                                points,
                                status: status | Status::PARTIAL_RESULT,
                            });
                        }
                    }
                } else {
                    (
                        closest_end,
                        closest_end,
                        PolyType::Ground,
                        PolyType::Ground,
                        PolyRef::NULL,
                    )
                };

                if i + 1 < n && i == 0 && to_type == PolyType::Ground {
                    // Degenerate first portal right at the start point.
                    let (d, _) = dist_pt_seg_sqr_2d(&portal_apex, &left, &right);
                    if d < sqr(0.001) {
                        i += 1;
                        continue;
                    }
                }

                // Lock the exit rail of a segment crossing to the same
                // parameter the funnel entered it at.
                if from_type == PolyType::OffMeshSegment {
                    if seg_swapped {
                        segt = 1.0 - segt;
                    }
                    let locked = vlerp(&left, &right, segt);
                    left = locked;
                    right = locked;
                }

                // Detect a reversed rail pose before tightening on it.
                seg_swapped = false;
                if to_type == PolyType::OffMeshSegment && i != apex_index {
                    let mid0 = vlerp(&portal_left, &portal_right, 0.5);
                    let mid1 = vlerp(&left, &right, 0.5);
                    let dirm = vsub(&mid1, &mid0);
                    let dir0 = vsub(&portal_left, &mid0);
                    let dir1 = vsub(&left, &mid1);
                    let c0 = vperp_2d(&dirm, &dir0);
                    let c1 = vperp_2d(&dirm, &dir1);
                    seg_swapped = (c0 > 0.0 && c1 < 0.0) || (c0 < 0.0 && c1 > 0.0);
                }
                if seg_swapped {
                    std::mem::swap(&mut left, &mut right);
                }

                // Tighten the right side of the funnel.
                if tri_area_2d(&portal_apex, &portal_right, &right) <= 0.0 {
                    if vequal(&portal_apex, &portal_right)
                        || tri_area_2d(&portal_apex, &portal_left, &right) > 0.0
                    {
                        portal_right = right;
                        right_poly = to_ref;
                        right_type = to_type;
                        right_index = i;
                    } else {
                        // Left corner becomes the new apex.
                        if options != 0
                            && !self.append_portals(
                                apex_index,
                                left_index,
                                &portal_left,
                                path,
                                &mut points,
                                max_points,
                                options,
                            )
                        {
                            status |= Status::BUFFER_TOO_SMALL;
                            return Ok(StraightPathResult { points, status });
                        }

                        portal_apex = portal_left;
                        apex_index = left_index;
                        let flags = if left_poly.is_null() {
                            STRAIGHT_PATH_END
                        } else if left_type != PolyType::Ground {
                            STRAIGHT_PATH_OFFMESH_CONNECTION
                        } else {
                            0
                        };
                        if !append_vertex(&mut points, portal_apex, flags, left_poly, max_points)
                        {
                            status |= Status::BUFFER_TOO_SMALL;
                            return Ok(StraightPathResult { points, status });
                        }

                        portal_left = portal_apex;
                        portal_right = portal_apex;
                        left_index = apex_index;
                        right_index = apex_index;
                        if to_type == PolyType::OffMeshSegment {
                            let (_, t) = dist_pt_seg_sqr_2d(&portal_apex, &left, &right);
                            segt = t;
                        }
                        i = apex_index + 1;
                        continue;
                    }
                }

                // Tighten the left side of the funnel.
                if tri_area_2d(&portal_apex, &portal_left, &left) >= 0.0 {
                    if vequal(&portal_apex, &portal_left)
                        || tri_area_2d(&portal_apex, &portal_right, &left) < 0.0
                    {
                        portal_left = left;
                        left_poly = to_ref;
                        left_type = to_type;
                        left_index = i;
                    } else {
                        // Right corner becomes the new apex.
                        if options != 0
                            && !self.append_portals(
                                apex_index,
                                right_index,
                                &portal_right,
                                path,
                                &mut points,
                                max_points,
                                options,
                            )
                        {
                            status |= Status::BUFFER_TOO_SMALL;
                            return Ok(StraightPathResult { points, status });
                        }

                        portal_apex = portal_right;
                        apex_index = right_index;
                        let flags = if right_poly.is_null() {
                            STRAIGHT_PATH_END
                        } else if right_type != PolyType::Ground {
                            STRAIGHT_PATH_OFFMESH_CONNECTION
                        } else {
                            0
                        };
                        if !append_vertex(&mut points, portal_apex, flags, right_poly, max_points)
                        {
                            status |= Status::BUFFER_TOO_SMALL;
                            return Ok(StraightPathResult { points, status });
                        }

                        portal_left = portal_apex;
                        portal_right = portal_apex;
                        left_index = apex_index;
                        right_index = apex_index;
                        if to_type == PolyType::OffMeshSegment {
                            let (_, t) = dist_pt_seg_sqr_2d(&portal_apex, &left, &right);
                            segt = t;
                        }
                        i = apex_index + 1;
                        continue;
                    }
                }

                // Entering a segment crossing: pick the rail point closest
                // to the apex and restart the funnel from it.
                if to_type == PolyType::OffMeshSegment {
                    let (_, t) = dist_pt_seg_sqr_2d(&portal_apex, &left, &right);
                    segt = t;
                    portal_apex = vlerp(&left, &right, segt);
                    if !append_vertex(
                        &mut points,
                        portal_apex,
                        STRAIGHT_PATH_OFFMESH_CONNECTION,
                        path[i + 1],
                        max_points,
                    ) {
                        status |= Status::BUFFER_TOO_SMALL;
                        return Ok(StraightPathResult { points, status });
                    }
                    portal_left = portal_apex;
                    portal_right = portal_apex;
                    left_index = i;
                    right_index = i;
                }

                i += 1;
            }

            if options != 0
                && !self.append_portals(
                    apex_index,
                    n - 1,
                    &closest_end,
                    path,
                    &mut points,
                    max_points,
                    options,
                )
            {
                status |= Status::BUFFER_TOO_SMALL;
                return Ok(StraightPathResult { points, status });
            }
        }

        if !append_vertex(
            &mut points,
            closest_end,
            STRAIGHT_PATH_END,
            PolyRef::NULL,
            max_points,
        ) {
            status |= Status::BUFFER_TOO_SMALL;
        }

        Ok(StraightPathResult { points, status })
    }

    /// Convenience wrapper: full path query plus string pulling in one
    /// call
    pub fn find_smooth_path_points<F>(
        &mut self,
        start: PolyRef,
        end: PolyRef,
        start_pos: &[f32; 3],
        end_pos: &[f32; 3],
        filter: &F,
        max_points: usize,
    ) -> Result<StraightPathResult>
    where
        F: QueryFilter + ?Sized,
    {
        let path = self.find_path(start, end, start_pos, end_pos, filter, max_points.max(16))?;
        let mut result =
            self.find_straight_path(start_pos, end_pos, &path.path, max_points, 0)?;
        result.status = result.status.with_details_of(path.status);
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn append_merges_equal_points() {
        let mut points = Vec::new();
        assert!(append_vertex(
            &mut points,
            [1.0, 0.0, 1.0],
            STRAIGHT_PATH_START,
            PolyRef(7),
            8
        ));
        assert!(append_vertex(
            &mut points,
            [1.0, 0.0, 1.0],
            STRAIGHT_PATH_END,
            PolyRef::NULL,
            8
        ));
        assert_eq!(points.len(), 1);
        assert_eq!(points[0].flags, STRAIGHT_PATH_END);
        assert!(points[0].poly.is_null());
    }

    #[test]
    fn append_respects_capacity() {
        let mut points = Vec::new();
        assert!(append_vertex(&mut points, [0.0; 3], 0, PolyRef(1), 2));
        assert!(append_vertex(&mut points, [1.0, 0.0, 0.0], 0, PolyRef(2), 2));
        assert!(!append_vertex(
            &mut points,
            [2.0, 0.0, 0.0],
            0,
            PolyRef(3),
            2
        ));
        assert_eq!(points.len(), 2);
    }
}
