//! Raycast, wall probe and surface movement tests

#[cfg(test)]
mod tests {
    use crate::filter::StandardFilter;
    use crate::nav_mesh_query::NavMeshQuery;
    use crate::status::Status;
    use crate::test_mesh_helpers::{
        self_linked_square_mesh, single_square_mesh, test_extents, two_square_corridor_mesh,
    };
    use tilenav_common::math::vdist_2d_sqr;

    #[test]
    fn raycast_stops_at_outer_wall() {
        let nav = single_square_mesh().unwrap();
        let query = NavMeshQuery::new(&nav, 128).unwrap();
        let filter = StandardFilter::new();

        let (start, sp) = query
            .find_nearest_poly(&[5.0, 0.0, 5.0], &test_extents(), &filter)
            .unwrap();
        let hit = query
            .raycast(start, &sp, &[15.0, 0.0, 5.0], &filter)
            .unwrap();

        assert!(!hit.reached_end());
        assert!((hit.t - 0.5).abs() < 1e-4);
        // Blocked edge runs along +Z, so the normal lies on the X axis.
        assert!((hit.normal[0].abs() - 1.0).abs() < 1e-4);
        assert!(hit.normal[2].abs() < 1e-4);
        assert_eq!(hit.path, vec![start]);
    }

    #[test]
    fn raycast_crosses_shared_edge() {
        let nav = two_square_corridor_mesh().unwrap();
        let query = NavMeshQuery::new(&nav, 128).unwrap();
        let filter = StandardFilter::new();

        let (start, sp) = query
            .find_nearest_poly(&[5.0, 0.0, 5.0], &test_extents(), &filter)
            .unwrap();
        let (end, _) = query
            .find_nearest_poly(&[15.0, 0.0, 5.0], &test_extents(), &filter)
            .unwrap();
        let hit = query
            .raycast(start, &sp, &[15.0, 0.0, 5.0], &filter)
            .unwrap();

        assert!(hit.reached_end());
        assert_eq!(hit.path, vec![start, end]);
        // Every visited polygon must still resolve.
        for &r in &hit.path {
            assert!(nav.is_valid_poly_ref(r));
        }
    }

    #[test]
    fn raycast_terminates_on_a_self_linked_poly() {
        let nav = self_linked_square_mesh().unwrap();
        let query = NavMeshQuery::new(&nav, 16).unwrap();
        let filter = StandardFilter::new();

        let (start, sp) = query
            .find_nearest_poly(&[5.0, 0.0, 5.0], &test_extents(), &filter)
            .unwrap();
        let err = query
            .raycast(start, &sp, &[15.0, 0.0, 5.0], &filter)
            .unwrap_err();
        assert!(err.has_detail(Status::INVALID_CYCLE_PATH));
    }

    #[test]
    fn wall_segments_skip_the_shared_edge() {
        let nav = two_square_corridor_mesh().unwrap();
        let query = NavMeshQuery::new(&nav, 128).unwrap();
        let filter = StandardFilter::new();

        let (west, _) = query
            .find_nearest_poly(&[5.0, 0.0, 5.0], &test_extents(), &filter)
            .unwrap();

        let walls = query.get_poly_wall_segments(west, &filter, false).unwrap();
        assert_eq!(walls.len(), 3);
        for seg in &walls {
            assert!(seg.neighbor.is_null());
        }

        let with_portals = query.get_poly_wall_segments(west, &filter, true).unwrap();
        assert_eq!(with_portals.len(), 4);
        assert_eq!(
            with_portals.iter().filter(|s| !s.neighbor.is_null()).count(),
            1
        );
    }

    #[test]
    fn distance_to_wall_from_square_center() {
        let nav = single_square_mesh().unwrap();
        let mut query = NavMeshQuery::new(&nav, 128).unwrap();
        let filter = StandardFilter::new();

        let center = [5.0, 0.0, 5.0];
        let (start, _) = query
            .find_nearest_poly(&center, &test_extents(), &filter)
            .unwrap();
        let (dist, hit_pos, normal) = query
            .find_distance_to_wall(start, &center, 20.0, &filter)
            .unwrap();

        assert!((dist - 5.0).abs() < 1e-3);
        assert!((vdist_2d_sqr(&center, &hit_pos).sqrt() - 5.0).abs() < 1e-3);
        let len = (normal[0] * normal[0] + normal[2] * normal[2]).sqrt();
        assert!((len - 1.0).abs() < 1e-3);
    }

    #[test]
    fn move_along_surface_slides_into_neighbour() {
        let nav = two_square_corridor_mesh().unwrap();
        let mut query = NavMeshQuery::new(&nav, 128).unwrap();
        let filter = StandardFilter::new();

        let (start, sp) = query
            .find_nearest_poly(&[5.0, 0.0, 5.0], &test_extents(), &filter)
            .unwrap();
        let target = [15.0, 0.0, 5.0];
        let (pos, visited) = query
            .move_along_surface(start, &sp, &target, &filter, 8)
            .unwrap();

        assert!(vdist_2d_sqr(&pos, &target) < 0.01);
        assert_eq!(visited.len(), 2);
        assert_eq!(visited[0], start);
    }

    #[test]
    fn move_along_surface_is_blocked_by_walls() {
        let nav = single_square_mesh().unwrap();
        let mut query = NavMeshQuery::new(&nav, 128).unwrap();
        let filter = StandardFilter::new();

        let (start, sp) = query
            .find_nearest_poly(&[5.0, 0.0, 5.0], &test_extents(), &filter)
            .unwrap();
        let (pos, visited) = query
            .move_along_surface(start, &sp, &[15.0, 0.0, 5.0], &filter, 8)
            .unwrap();

        // Clamped to the x = 10 wall.
        assert!(pos[0] <= 10.0 + 1e-3);
        assert_eq!(visited, vec![start]);
    }

    #[test]
    fn circle_expansion_respects_radius() {
        let nav = two_square_corridor_mesh().unwrap();
        let mut query = NavMeshQuery::new(&nav, 128).unwrap();
        let filter = StandardFilter::new();

        let center = [5.0, 0.0, 5.0];
        let (start, _) = query
            .find_nearest_poly(&center, &test_extents(), &filter)
            .unwrap();

        let wide = query
            .find_polys_around_circle(start, &center, 20.0, &filter)
            .unwrap();
        assert_eq!(wide.refs.len(), 2);
        assert_eq!(wide.refs[0], start);
        assert!(wide.parents[0].is_null());
        assert!(wide.costs[1] > 0.0);

        let narrow = query
            .find_polys_around_circle(start, &center, 1.0, &filter)
            .unwrap();
        assert_eq!(narrow.refs.len(), 1);
    }

    #[test]
    fn local_neighbourhood_stays_near_center() {
        let nav = two_square_corridor_mesh().unwrap();
        let mut query = NavMeshQuery::new(&nav, 128).unwrap();
        let filter = StandardFilter::new();

        let center = [2.0, 0.0, 5.0];
        let (start, _) = query
            .find_nearest_poly(&center, &test_extents(), &filter)
            .unwrap();
        let (refs, parents) = query
            .find_local_neighbourhood(start, &center, 2.0, &filter, 16)
            .unwrap();
        assert_eq!(refs, vec![start]);
        assert_eq!(parents.len(), refs.len());
    }

    #[test]
    fn random_points_land_on_the_mesh() {
        let nav = two_square_corridor_mesh().unwrap();
        let mut query = NavMeshQuery::new(&nav, 128).unwrap();
        let filter = StandardFilter::new();
        query.seed_random(1234);

        for _ in 0..8 {
            let (r, pos) = query.find_random_point(&filter).unwrap();
            assert!(nav.is_valid_poly_ref(r));
            assert!(pos[0] >= -1e-3 && pos[0] <= 20.0 + 1e-3);
            assert!(pos[2] >= -1e-3 && pos[2] <= 10.0 + 1e-3);
        }
    }

    #[test]
    fn random_point_around_circle_stays_inside() {
        let nav = two_square_corridor_mesh().unwrap();
        let mut query = NavMeshQuery::new(&nav, 128).unwrap();
        let filter = StandardFilter::new();
        query.seed_random(99);

        let center = [5.0, 0.0, 5.0];
        let (start, _) = query
            .find_nearest_poly(&center, &test_extents(), &filter)
            .unwrap();
        let (r, pos) = query
            .find_random_point_around_circle(start, &center, 3.0, &filter)
            .unwrap();
        assert!(nav.is_valid_poly_ref(r));
        assert!(vdist_2d_sqr(&center, &pos).sqrt() <= 3.0 + 1e-3);
    }
}
