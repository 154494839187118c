//! Off-mesh connection traversal tests
//!
//! Uses a mesh with two squares separated by a gap, bridged by a point
//! connection from (9, 0, 5) to (21, 0, 5).

#[cfg(test)]
mod tests {
    use crate::filter::StandardFilter;
    use crate::nav_mesh::PolyType;
    use crate::nav_mesh_query::NavMeshQuery;
    use crate::status::Status;
    use crate::straight_path::STRAIGHT_PATH_OFFMESH_CONNECTION;
    use crate::test_mesh_helpers::{
        clustered_bridge_mesh, clustered_one_way_bridge_mesh, off_mesh_bridge_mesh,
        one_way_bridge_mesh, test_extents,
    };

    const WEST_CENTER: [f32; 3] = [5.0, 0.0, 5.0];
    const EAST_CENTER: [f32; 3] = [25.0, 0.0, 5.0];

    #[test]
    fn path_uses_the_connection() {
        let nav = off_mesh_bridge_mesh().unwrap();
        let mut query = NavMeshQuery::new(&nav, 128).unwrap();
        let filter = StandardFilter::new();

        let (start, sp) = query
            .find_nearest_poly(&WEST_CENTER, &test_extents(), &filter)
            .unwrap();
        let (end, ep) = query
            .find_nearest_poly(&EAST_CENTER, &test_extents(), &filter)
            .unwrap();

        let result = query.find_path(start, end, &sp, &ep, &filter, 16).unwrap();
        assert!(result.status.is_success());
        assert!(!result.status.has_detail(Status::PARTIAL_RESULT));
        assert_eq!(result.path.len(), 3);
        assert_eq!(result.path[0], start);
        assert_eq!(result.path[2], end);

        let (_, mid_poly) = nav.tile_and_poly_by_ref(result.path[1]).unwrap();
        assert_eq!(mid_poly.poly_type, PolyType::OffMeshPoint);
    }

    #[test]
    fn straight_path_flags_the_jump_point() {
        let nav = off_mesh_bridge_mesh().unwrap();
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
        assert_eq!(straight.points.len(), 4);
        assert_eq!(straight.points[1].flags, STRAIGHT_PATH_OFFMESH_CONNECTION);
        assert!((straight.points[1].pos[0] - 9.0).abs() < 1e-3);
        assert!((straight.points[1].pos[2] - 5.0).abs() < 1e-3);
        assert!((straight.points[2].pos[0] - 21.0).abs() < 1e-3);
    }

    #[test]
    fn user_id_veto_blocks_the_connection() {
        let nav = off_mesh_bridge_mesh().unwrap();
        let mut query = NavMeshQuery::new(&nav, 128).unwrap();
        let mut filter = StandardFilter::new();
        filter.set_off_mesh_predicate(|uid| uid != 100);

        let (start, sp) = query
            .find_nearest_poly(&WEST_CENTER, &test_extents(), &filter)
            .unwrap();
        let (end, ep) = query
            .find_nearest_poly(&EAST_CENTER, &test_extents(), &filter)
            .unwrap();

        let result = query.find_path(start, end, &sp, &ep, &filter, 16).unwrap();
        assert!(result.status.has_detail(Status::PARTIAL_RESULT));
        assert_eq!(result.path, vec![start]);
    }

    #[test]
    fn portal_to_connection_is_its_endpoint() {
        let nav = off_mesh_bridge_mesh().unwrap();
        let mut query = NavMeshQuery::new(&nav, 128).unwrap();
        let filter = StandardFilter::new();

        let (start, sp) = query
            .find_nearest_poly(&WEST_CENTER, &test_extents(), &filter)
            .unwrap();
        let (end, ep) = query
            .find_nearest_poly(&EAST_CENTER, &test_extents(), &filter)
            .unwrap();
        let corridor = query.find_path(start, end, &sp, &ep, &filter, 16).unwrap();
        let con = corridor.path[1];

        let (left, right) = query.get_portal_points(start, con).unwrap();
        assert_eq!(left, right);
        assert!((left[0] - 9.0).abs() < 1e-3);
        assert!((left[2] - 5.0).abs() < 1e-3);
    }

    #[test]
    fn backwards_path_works_over_bidirectional_link() {
        let nav = off_mesh_bridge_mesh().unwrap();
        let mut query = NavMeshQuery::new(&nav, 128).unwrap();
        let filter = StandardFilter::new();

        let (start, sp) = query
            .find_nearest_poly(&EAST_CENTER, &test_extents(), &filter)
            .unwrap();
        let (end, ep) = query
            .find_nearest_poly(&WEST_CENTER, &test_extents(), &filter)
            .unwrap();

        let result = query.find_path(start, end, &sp, &ep, &filter, 16).unwrap();
        assert!(result.status.is_success());
        assert_eq!(result.path.len(), 3);
    }

    #[test]
    fn one_way_link_rejects_the_return_trip() {
        let nav = one_way_bridge_mesh().unwrap();
        let mut query = NavMeshQuery::new(&nav, 128).unwrap();
        let filter = StandardFilter::new();

        let (west, wp) = query
            .find_nearest_poly(&WEST_CENTER, &test_extents(), &filter)
            .unwrap();
        let (east, ep) = query
            .find_nearest_poly(&EAST_CENTER, &test_extents(), &filter)
            .unwrap();

        let forward = query.find_path(west, east, &wp, &ep, &filter, 16).unwrap();
        assert!(forward.status.is_success());
        assert_eq!(forward.path.len(), 3);

        let back = query.find_path(east, west, &ep, &wp, &filter, 16).unwrap();
        assert!(back.status.has_detail(Status::PARTIAL_RESULT));
        assert_eq!(back.path, vec![east]);
    }

    #[test]
    fn backtracking_filter_reverses_a_one_way_link() {
        let nav = one_way_bridge_mesh().unwrap();
        let mut query = NavMeshQuery::new(&nav, 128).unwrap();
        let mut filter = StandardFilter::new();
        filter.set_backtracking(true);

        let (west, wp) = query
            .find_nearest_poly(&WEST_CENTER, &test_extents(), &filter)
            .unwrap();
        let (east, ep) = query
            .find_nearest_poly(&EAST_CENTER, &test_extents(), &filter)
            .unwrap();

        // Against the link direction works, along it does not.
        let back = query.find_path(east, west, &ep, &wp, &filter, 16).unwrap();
        assert!(back.status.is_success());
        assert!(!back.status.has_detail(Status::PARTIAL_RESULT));
        assert_eq!(back.path.len(), 3);

        let forward = query.find_path(west, east, &wp, &ep, &filter, 16).unwrap();
        assert!(forward.status.has_detail(Status::PARTIAL_RESULT));
        assert_eq!(forward.path, vec![west]);
    }

    #[test]
    fn bridge_joins_the_cluster_graph() {
        let nav = clustered_bridge_mesh().unwrap();
        let mut query = NavMeshQuery::new(&nav, 128).unwrap();
        let filter = StandardFilter::new();

        let (west, _) = query
            .find_nearest_poly(&WEST_CENTER, &test_extents(), &filter)
            .unwrap();
        let (east, _) = query
            .find_nearest_poly(&EAST_CENTER, &test_extents(), &filter)
            .unwrap();
        assert!(query.test_cluster_path(west, east).unwrap());
        assert!(query.test_cluster_path(east, west).unwrap());
    }

    #[test]
    fn one_way_bridge_joins_clusters_forward_only() {
        let nav = clustered_one_way_bridge_mesh().unwrap();
        let mut query = NavMeshQuery::new(&nav, 128).unwrap();
        let filter = StandardFilter::new();

        let (west, _) = query
            .find_nearest_poly(&WEST_CENTER, &test_extents(), &filter)
            .unwrap();
        let (east, _) = query
            .find_nearest_poly(&EAST_CENTER, &test_extents(), &filter)
            .unwrap();
        assert!(query.test_cluster_path(west, east).unwrap());
        assert!(!query.test_cluster_path(east, west).unwrap());
    }
}
