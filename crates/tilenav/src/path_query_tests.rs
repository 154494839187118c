//! Path query tests over small hand-built meshes
//!
//! Covers the full A* query, the sliced variant and the straight-path
//! funnel against meshes with known geometry.

#[cfg(test)]
mod tests {
    use crate::filter::StandardFilter;
    use crate::nav_mesh_query::NavMeshQuery;
    use crate::status::Status;
    use crate::straight_path::{STRAIGHT_PATH_END, STRAIGHT_PATH_START};
    use crate::test_mesh_helpers::{
        disconnected_squares_mesh, test_extents, two_square_corridor_mesh, two_tile_mesh,
    };

    const WEST_CENTER: [f32; 3] = [5.0, 0.0, 5.0];
    const EAST_CENTER: [f32; 3] = [15.0, 0.0, 5.0];

    #[test]
    fn corridor_path_crosses_both_polys() {
        let nav = two_square_corridor_mesh().unwrap();
        let mut query = NavMeshQuery::new(&nav, 128).unwrap();
        let filter = StandardFilter::new();

        let (start, sp) = query
            .find_nearest_poly(&WEST_CENTER, &test_extents(), &filter)
            .unwrap();
        let (end, ep) = query
            .find_nearest_poly(&EAST_CENTER, &test_extents(), &filter)
            .unwrap();
        assert_ne!(start, end);

        let result = query.find_path(start, end, &sp, &ep, &filter, 16).unwrap();
        assert!(result.status.is_success());
        assert!(!result.status.has_detail(Status::PARTIAL_RESULT));
        assert_eq!(result.path, vec![start, end]);
    }

    #[test]
    fn corridor_path_has_no_repeats() {
        let nav = two_tile_mesh().unwrap();
        let mut query = NavMeshQuery::new(&nav, 128).unwrap();
        let filter = StandardFilter::new();

        let (start, sp) = query
            .find_nearest_poly(&WEST_CENTER, &test_extents(), &filter)
            .unwrap();
        let (end, ep) = query
            .find_nearest_poly(&EAST_CENTER, &test_extents(), &filter)
            .unwrap();

        let result = query.find_path(start, end, &sp, &ep, &filter, 16).unwrap();
        assert_eq!(result.path.first(), Some(&start));
        assert_eq!(result.path.last(), Some(&end));
        for (i, a) in result.path.iter().enumerate() {
            for b in result.path.iter().skip(i + 1) {
                assert_ne!(a, b);
            }
        }
    }

    #[test]
    fn same_start_and_end_is_trivial() {
        let nav = two_square_corridor_mesh().unwrap();
        let mut query = NavMeshQuery::new(&nav, 128).unwrap();
        let filter = StandardFilter::new();

        let (start, sp) = query
            .find_nearest_poly(&WEST_CENTER, &test_extents(), &filter)
            .unwrap();
        let result = query.find_path(start, start, &sp, &sp, &filter, 16).unwrap();
        assert_eq!(result.path, vec![start]);
        assert!(result.status.is_success());
    }

    #[test]
    fn disconnected_target_yields_partial_result() {
        let nav = disconnected_squares_mesh().unwrap();
        let mut query = NavMeshQuery::new(&nav, 128).unwrap();
        let filter = StandardFilter::new();

        let (start, sp) = query
            .find_nearest_poly(&WEST_CENTER, &test_extents(), &filter)
            .unwrap();
        let (end, ep) = query
            .find_nearest_poly(&[25.0, 0.0, 5.0], &test_extents(), &filter)
            .unwrap();
        assert_ne!(start, end);

        let result = query.find_path(start, end, &sp, &ep, &filter, 16).unwrap();
        assert!(result.status.has_detail(Status::PARTIAL_RESULT));
        assert_eq!(result.path, vec![start]);
    }

    #[test]
    fn exhausted_node_pool_reports_out_of_nodes() {
        let nav = two_square_corridor_mesh().unwrap();
        let mut query = NavMeshQuery::new(&nav, 1).unwrap();
        let filter = StandardFilter::new();

        let (start, sp) = query
            .find_nearest_poly(&WEST_CENTER, &test_extents(), &filter)
            .unwrap();
        let (end, ep) = query
            .find_nearest_poly(&EAST_CENTER, &test_extents(), &filter)
            .unwrap();

        let result = query.find_path(start, end, &sp, &ep, &filter, 16).unwrap();
        assert!(result.status.has_detail(Status::OUT_OF_NODES));
        assert!(result.status.has_detail(Status::PARTIAL_RESULT));
        assert_eq!(result.path, vec![start]);
    }

    #[test]
    fn iteration_limit_scales_with_pool_size() {
        let nav = two_square_corridor_mesh().unwrap();
        let query = NavMeshQuery::new(&nav, 10).unwrap();
        assert_eq!(query.iteration_limit(), 44);
    }

    #[test]
    fn straight_path_through_corridor_is_a_line() {
        let nav = two_square_corridor_mesh().unwrap();
        let mut query = NavMeshQuery::new(&nav, 128).unwrap();
        let filter = StandardFilter::new();

        let (start, sp) = query
            .find_nearest_poly(&WEST_CENTER, &test_extents(), &filter)
            .unwrap();
        let (end, ep) = query
            .find_nearest_poly(&EAST_CENTER, &test_extents(), &filter)
            .unwrap();
        let corridor = query.find_path(start, end, &sp, &ep, &filter, 16).unwrap();

        let straight = query
            .find_straight_path(&sp, &ep, &corridor.path, 16, 0)
            .unwrap();
        assert!(straight.status.is_success());
        assert_eq!(straight.points.len(), 2);
        assert_eq!(straight.points[0].flags, STRAIGHT_PATH_START);
        assert_eq!(straight.points[1].flags, STRAIGHT_PATH_END);
        for k in 0..3 {
            assert!((straight.points[0].pos[k] - sp[k]).abs() < 1e-4);
            assert!((straight.points[1].pos[k] - ep[k]).abs() < 1e-4);
        }
    }

    #[test]
    fn straight_path_is_stable_under_repetition() {
        let nav = two_square_corridor_mesh().unwrap();
        let mut query = NavMeshQuery::new(&nav, 128).unwrap();
        let filter = StandardFilter::new();

        let (start, sp) = query
            .find_nearest_poly(&[2.0, 0.0, 2.0], &test_extents(), &filter)
            .unwrap();
        let (end, ep) = query
            .find_nearest_poly(&[18.0, 0.0, 8.0], &test_extents(), &filter)
            .unwrap();
        let corridor = query.find_path(start, end, &sp, &ep, &filter, 16).unwrap();

        let first = query
            .find_straight_path(&sp, &ep, &corridor.path, 16, 0)
            .unwrap();
        let second = query
            .find_straight_path(&sp, &ep, &corridor.path, 16, 0)
            .unwrap();
        assert_eq!(first.points.len(), second.points.len());
        for (a, b) in first.points.iter().zip(&second.points) {
            assert_eq!(a.pos, b.pos);
            assert_eq!(a.flags, b.flags);
            assert_eq!(a.poly, b.poly);
        }
    }

    #[test]
    fn sliced_path_matches_full_query() {
        let nav = two_tile_mesh().unwrap();
        let mut query = NavMeshQuery::new(&nav, 128).unwrap();
        let filter = StandardFilter::new();

        let (start, sp) = query
            .find_nearest_poly(&WEST_CENTER, &test_extents(), &filter)
            .unwrap();
        let (end, ep) = query
            .find_nearest_poly(&EAST_CENTER, &test_extents(), &filter)
            .unwrap();

        let full = query.find_path(start, end, &sp, &ep, &filter, 16).unwrap();

        let status = query
            .init_sliced_find_path(start, end, &sp, &ep, &filter)
            .unwrap();
        assert!(status.is_in_progress() || status.is_success());
        loop {
            let (status, _) = query.update_sliced_find_path(1, &filter).unwrap();
            if !status.is_in_progress() {
                break;
            }
        }
        let sliced = query.finalize_sliced_find_path(16).unwrap();

        assert_eq!(sliced.path, full.path);
        assert!(sliced.status.is_success());
    }

    #[test]
    fn sliced_partial_finalize_follows_existing_corridor() {
        let nav = two_tile_mesh().unwrap();
        let mut query = NavMeshQuery::new(&nav, 128).unwrap();
        let filter = StandardFilter::new();

        let (start, sp) = query
            .find_nearest_poly(&WEST_CENTER, &test_extents(), &filter)
            .unwrap();
        let (end, ep) = query
            .find_nearest_poly(&EAST_CENTER, &test_extents(), &filter)
            .unwrap();
        let existing = query
            .find_path(start, end, &sp, &ep, &filter, 16)
            .unwrap()
            .path;

        query
            .init_sliced_find_path(start, end, &sp, &ep, &filter)
            .unwrap();
        loop {
            let (status, _) = query.update_sliced_find_path(4, &filter).unwrap();
            if !status.is_in_progress() {
                break;
            }
        }
        let result = query
            .finalize_sliced_find_path_partial(&existing, 16)
            .unwrap();
        assert_eq!(result.path.first(), Some(&start));
        assert_eq!(result.path.last(), Some(&end));
    }

    #[test]
    fn find_smooth_path_points_combines_both_stages() {
        let nav = two_square_corridor_mesh().unwrap();
        let mut query = NavMeshQuery::new(&nav, 128).unwrap();
        let filter = StandardFilter::new();

        let (start, sp) = query
            .find_nearest_poly(&WEST_CENTER, &test_extents(), &filter)
            .unwrap();
        let (end, ep) = query
            .find_nearest_poly(&EAST_CENTER, &test_extents(), &filter)
            .unwrap();

        let points = query
            .find_smooth_path_points(start, end, &sp, &ep, &filter, 16)
            .unwrap();
        assert_eq!(points.points.len(), 2);
    }
}
