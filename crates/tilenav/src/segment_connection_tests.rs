//! Segment connection tests
//!
//! Uses a mesh with two squares separated by a gap, bridged by a segment
//! connection whose rails run along x = 9 and x = 21 from z = 2 to z = 8,
//! and a striped mesh where the rails overlap more strips than a
//! connection has part slots.

#[cfg(test)]
mod tests {
    use crate::filter::StandardFilter;
    use crate::nav_mesh::PolyType;
    use crate::nav_mesh_query::NavMeshQuery;
    use crate::off_mesh::MAX_OFFMESH_SEGMENT_PARTS;
    use crate::status::Status;
    use crate::straight_path::STRAIGHT_PATH_OFFMESH_CONNECTION;
    use crate::test_mesh_helpers::{segment_bridge_mesh, striped_segment_mesh, test_extents};

    const WEST_CENTER: [f32; 3] = [5.0, 0.0, 5.0];
    const EAST_CENTER: [f32; 3] = [25.0, 0.0, 5.0];

    #[test]
    fn rails_carve_a_single_part() {
        let nav = segment_bridge_mesh().unwrap();
        let tile = nav.tile(0).unwrap();
        let con = &tile.off_mesh_seg_cons[0];
        assert_eq!(con.npolys, 1);

        let part = &tile.polys[con.first_poly as usize];
        assert_eq!(part.poly_type, PolyType::OffMeshSegment);
        assert_eq!(part.vert_count, 4);
        // Rails overlap end to end, so the part spans both rails whole.
        let a0 = tile.vert(part.verts[0]);
        let a1 = tile.vert(part.verts[1]);
        let b0 = tile.vert(part.verts[2]);
        assert!((a0[0] - 9.0).abs() < 1e-3);
        assert!((a0[2] - 2.0).abs() < 1e-3);
        assert!((a1[2] - 8.0).abs() < 1e-3);
        assert!((b0[0] - 21.0).abs() < 1e-3);
    }

    #[test]
    fn path_crosses_the_segment_bridge() {
        let nav = segment_bridge_mesh().unwrap();
        let mut query = NavMeshQuery::new(&nav, 128).unwrap();
        let filter = StandardFilter::new();

        let (west, wp) = query
            .find_nearest_poly(&WEST_CENTER, &test_extents(), &filter)
            .unwrap();
        let (east, ep) = query
            .find_nearest_poly(&EAST_CENTER, &test_extents(), &filter)
            .unwrap();

        let result = query.find_path(west, east, &wp, &ep, &filter, 16).unwrap();
        assert!(result.status.is_success());
        assert!(!result.status.has_detail(Status::PARTIAL_RESULT));
        assert_eq!(result.path.len(), 3);
        let (_, mid_poly) = nav.tile_and_poly_by_ref(result.path[1]).unwrap();
        assert_eq!(mid_poly.poly_type, PolyType::OffMeshSegment);

        let back = query.find_path(east, west, &ep, &wp, &filter, 16).unwrap();
        assert!(back.status.is_success());
        assert_eq!(back.path.len(), 3);
    }

    #[test]
    fn straight_path_enters_at_the_funnel_parameter() {
        let nav = segment_bridge_mesh().unwrap();
        let mut query = NavMeshQuery::new(&nav, 128).unwrap();
        let filter = StandardFilter::new();

        // Hug the north side of the corridor; the crossing should stay
        // near z = 8 instead of sliding to the rail midpoints.
        let start = [5.0, 0.0, 8.0];
        let end = [25.0, 0.0, 8.0];
        let (west, wp) = query
            .find_nearest_poly(&start, &test_extents(), &filter)
            .unwrap();
        let (east, ep) = query
            .find_nearest_poly(&end, &test_extents(), &filter)
            .unwrap();
        let corridor = query.find_path(west, east, &wp, &ep, &filter, 16).unwrap();

        let straight = query
            .find_straight_path(&wp, &ep, &corridor.path, 16, 0)
            .unwrap();
        assert_eq!(straight.points.len(), 4);
        assert_eq!(straight.points[1].flags, STRAIGHT_PATH_OFFMESH_CONNECTION);
        assert!((straight.points[1].pos[0] - 9.0).abs() < 1e-3);
        assert!((straight.points[1].pos[2] - 8.0).abs() < 1e-3);
        assert!((straight.points[2].pos[0] - 21.0).abs() < 1e-3);
        assert!((straight.points[2].pos[2] - 8.0).abs() < 1e-3);
        for p in &straight.points {
            assert!(p.pos[2] > 7.0);
        }
    }

    #[test]
    fn bridged_clusters_are_reachable() {
        let nav = segment_bridge_mesh().unwrap();
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
    fn part_slots_prefer_longer_overlaps() {
        let nav = striped_segment_mesh().unwrap();
        let tile = nav.tile(0).unwrap();
        let con = &tile.off_mesh_seg_cons[0];
        assert_eq!(con.npolys as usize, MAX_OFFMESH_SEGMENT_PARTS);

        let mut lens = Vec::new();
        let mut starts = Vec::new();
        for k in 0..con.npolys as usize {
            let part = &tile.polys[con.first_poly as usize + k];
            let v0 = tile.vert(part.verts[0]);
            let v1 = tile.vert(part.verts[1]);
            lens.push(v1[0] - v0[0]);
            starts.push(v0[0]);
        }
        // The 20 unit strip beats the 3 unit strips for a slot.
        assert!(lens.iter().any(|&l| l > 19.0));
        // Survivors stay in rail parameter order.
        assert!(starts.windows(2).all(|w| w[0] < w[1]));
    }
}
