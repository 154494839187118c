//! Tile lifecycle, cluster reachability and persistence tests

#[cfg(test)]
mod tests {
    use crate::binary_format::{load_nav_mesh, save_nav_mesh};
    use crate::filter::StandardFilter;
    use crate::nav_mesh_query::NavMeshQuery;
    use crate::test_mesh_helpers::{
        clustered_corridor_mesh, disconnected_squares_mesh, test_extents, two_tile_mesh,
    };

    const WEST_CENTER: [f32; 3] = [5.0, 0.0, 5.0];
    const EAST_CENTER: [f32; 3] = [15.0, 0.0, 5.0];

    #[test]
    fn removing_a_tile_invalidates_its_refs() {
        let mut nav = two_tile_mesh().unwrap();
        let filter = StandardFilter::new();

        let (east, _) = {
            let query = NavMeshQuery::new(&nav, 128).unwrap();
            query
                .find_nearest_poly(&EAST_CENTER, &test_extents(), &filter)
                .unwrap()
        };
        assert!(nav.is_valid_poly_ref(east));

        let tile_idx = nav.decode_poly_id_tile(east) as usize;
        let data = nav.remove_tile(nav.tile_ref(tile_idx)).unwrap();
        assert!(!nav.is_valid_poly_ref(east));

        // Re-adding the tile bumps the salt, old refs stay dead.
        nav.add_tile(data).unwrap();
        assert!(!nav.is_valid_poly_ref(east));

        let query = NavMeshQuery::new(&nav, 128).unwrap();
        let (fresh, _) = query
            .find_nearest_poly(&EAST_CENTER, &test_extents(), &filter)
            .unwrap();
        assert!(nav.is_valid_poly_ref(fresh));
        assert_ne!(fresh, east);
    }

    #[test]
    fn relinked_tile_is_reachable_again() {
        let mut nav = two_tile_mesh().unwrap();
        let filter = StandardFilter::new();

        let east_idx = {
            let query = NavMeshQuery::new(&nav, 128).unwrap();
            let (east, _) = query
                .find_nearest_poly(&EAST_CENTER, &test_extents(), &filter)
                .unwrap();
            nav.decode_poly_id_tile(east) as usize
        };
        let data = nav.remove_tile(nav.tile_ref(east_idx)).unwrap();
        nav.add_tile(data).unwrap();

        let mut query = NavMeshQuery::new(&nav, 128).unwrap();
        let (start, sp) = query
            .find_nearest_poly(&WEST_CENTER, &test_extents(), &filter)
            .unwrap();
        let (end, ep) = query
            .find_nearest_poly(&EAST_CENTER, &test_extents(), &filter)
            .unwrap();
        let result = query.find_path(start, end, &sp, &ep, &filter, 16).unwrap();
        assert_eq!(result.path.len(), 2);
        assert!(result.status.is_success());
    }

    #[test]
    fn saved_mesh_loads_and_answers_queries() {
        let nav = two_tile_mesh().unwrap();
        let bytes = save_nav_mesh(&nav).unwrap();
        let loaded = load_nav_mesh(&bytes).unwrap();

        assert_eq!(loaded.params().max_tiles, nav.params().max_tiles);

        let filter = StandardFilter::new();
        let mut query = NavMeshQuery::new(&loaded, 128).unwrap();
        let (start, sp) = query
            .find_nearest_poly(&WEST_CENTER, &test_extents(), &filter)
            .unwrap();
        let (end, ep) = query
            .find_nearest_poly(&EAST_CENTER, &test_extents(), &filter)
            .unwrap();
        assert_ne!(start, end);

        let result = query.find_path(start, end, &sp, &ep, &filter, 16).unwrap();
        assert_eq!(result.path.len(), 2);
        assert!(result.status.is_success());
    }

    #[test]
    fn boundary_portal_lies_on_the_tile_edge() {
        let nav = two_tile_mesh().unwrap();
        let query = NavMeshQuery::new(&nav, 128).unwrap();
        let filter = StandardFilter::new();

        let (west, _) = query
            .find_nearest_poly(&WEST_CENTER, &test_extents(), &filter)
            .unwrap();
        let (east, _) = query
            .find_nearest_poly(&EAST_CENTER, &test_extents(), &filter)
            .unwrap();

        let (left, right) = query.get_portal_points(west, east).unwrap();
        assert!((left[0] - 10.0).abs() < 1e-3);
        assert!((right[0] - 10.0).abs() < 1e-3);
        assert!((left[2] - right[2]).abs() > 1.0);

        let mid = query.get_edge_mid_point(west, east).unwrap();
        assert!((mid[0] - 10.0).abs() < 1e-3);
        assert!((mid[2] - 5.0).abs() < 1e-3);
    }

    #[test]
    fn adjacent_clusters_are_reachable() {
        let nav = clustered_corridor_mesh().unwrap();
        let mut query = NavMeshQuery::new(&nav, 128).unwrap();
        let filter = StandardFilter::new();

        let (west, _) = query
            .find_nearest_poly(&WEST_CENTER, &test_extents(), &filter)
            .unwrap();
        let (east, _) = query
            .find_nearest_poly(&EAST_CENTER, &test_extents(), &filter)
            .unwrap();
        assert_ne!(west, east);

        assert!(query.test_cluster_path(west, east).unwrap());
        assert!(query.test_cluster_path(east, west).unwrap());
        assert!(query.test_cluster_path(west, west).unwrap());
    }

    #[test]
    fn cluster_query_without_cluster_data_fails() {
        let nav = disconnected_squares_mesh().unwrap();
        let mut query = NavMeshQuery::new(&nav, 128).unwrap();
        let filter = StandardFilter::new();

        let (west, _) = query
            .find_nearest_poly(&WEST_CENTER, &test_extents(), &filter)
            .unwrap();
        let (east, _) = query
            .find_nearest_poly(&[25.0, 0.0, 5.0], &test_extents(), &filter)
            .unwrap();

        let err = query.test_cluster_path(west, east).unwrap_err();
        assert!(err.is_failure());
    }

    #[test]
    fn random_point_in_cluster_stays_in_its_half() {
        let nav = clustered_corridor_mesh().unwrap();
        let mut query = NavMeshQuery::new(&nav, 128).unwrap();
        let filter = StandardFilter::new();
        query.seed_random(7);

        let west_cluster = nav.cluster_ref_base(0);
        assert!(nav.is_valid_cluster_ref(west_cluster));

        let (r, pos) = query
            .find_random_point_in_cluster(west_cluster, &filter)
            .unwrap();
        assert!(nav.is_valid_poly_ref(r));
        assert!(pos[0] >= -1e-3 && pos[0] <= 10.0 + 1e-3);
    }
}
