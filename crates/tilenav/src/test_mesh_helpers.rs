//! Canned meshes for tests
//!
//! Small hand-built tiles with known geometry so query tests can assert
//! exact positions and costs. All meshes are flat (y = 0) and use world
//! units directly.

use crate::nav_mesh::{NavMesh, NavMeshParams, PolyFlags, EXT_LINK};
use crate::nav_mesh_builder::{
    build_tile_data, OffMeshPointParams, OffMeshSegmentParams, TileDataParams, NULL_IDX,
};
use crate::off_mesh::{OFFMESH_CON_BIDIR, OFFMESH_CON_POINT, OFFMESH_CON_SEGMENT};
use crate::status::Result;

/// Reasonable search extents for the meshes in this module
pub fn test_extents() -> [f32; 3] {
    [2.0, 4.0, 2.0]
}

fn base_params() -> TileDataParams {
    TileDataParams {
        nvp: 6,
        walkable_height: 2.0,
        walkable_radius: 0.5,
        walkable_climb: 0.5,
        cs: 0.3,
        ch: 0.2,
        build_bv_tree: true,
        ..Default::default()
    }
}

/// One tile holding a single 10x10 square polygon at the origin
pub fn single_square_mesh() -> Result<NavMesh> {
    let mut nav = NavMesh::new(NavMeshParams {
        origin: [0.0, 0.0, 0.0],
        tile_width: 10.0,
        tile_height: 10.0,
        max_tiles: 1,
        max_polys_per_tile: 8,
    })?;

    let mut params = base_params();
    params.verts = vec![
        0.0, 0.0, 0.0, //
        10.0, 0.0, 0.0, //
        10.0, 0.0, 10.0, //
        0.0, 0.0, 10.0,
    ];
    params.polys = vec![
        0, 1, 2, 3, NULL_IDX, NULL_IDX, //
        NULL_IDX, NULL_IDX, NULL_IDX, NULL_IDX, NULL_IDX, NULL_IDX,
    ];
    params.poly_flags = vec![PolyFlags::WALK];
    params.poly_areas = vec![1];
    params.bmin = [0.0, 0.0, 0.0];
    params.bmax = [10.0, 2.0, 10.0];

    nav.add_tile(build_tile_data(&params)?)?;
    Ok(nav)
}

/// One tile holding two 10x10 squares sharing the x = 10 edge.
///
/// Polygon 0 covers x 0..10, polygon 1 covers x 10..20. The shared edge
/// makes the shortest path between the square centers the straight line
/// through (10, 0, 5).
pub fn two_square_corridor_mesh() -> Result<NavMesh> {
    let mut nav = NavMesh::new(NavMeshParams {
        origin: [0.0, 0.0, 0.0],
        tile_width: 20.0,
        tile_height: 10.0,
        max_tiles: 1,
        max_polys_per_tile: 8,
    })?;

    let mut params = corridor_tile_params();
    params.bmin = [0.0, 0.0, 0.0];
    params.bmax = [20.0, 2.0, 10.0];

    nav.add_tile(build_tile_data(&params)?)?;
    Ok(nav)
}

fn corridor_tile_params() -> TileDataParams {
    let mut params = base_params();
    params.verts = vec![
        0.0, 0.0, 0.0, //
        10.0, 0.0, 0.0, //
        20.0, 0.0, 0.0, //
        0.0, 0.0, 10.0, //
        10.0, 0.0, 10.0, //
        20.0, 0.0, 10.0,
    ];
    params.polys = vec![
        0, 1, 4, 3, NULL_IDX, NULL_IDX, //
        NULL_IDX, 1, NULL_IDX, NULL_IDX, NULL_IDX, NULL_IDX, //
        1, 2, 5, 4, NULL_IDX, NULL_IDX, //
        NULL_IDX, NULL_IDX, NULL_IDX, 0, NULL_IDX, NULL_IDX,
    ];
    params.poly_flags = vec![PolyFlags::WALK; 2];
    params.poly_areas = vec![1, 1];
    params
}

/// Same corridor, with each square in its own cluster
pub fn clustered_corridor_mesh() -> Result<NavMesh> {
    let mut nav = NavMesh::new(NavMeshParams {
        origin: [0.0, 0.0, 0.0],
        tile_width: 20.0,
        tile_height: 10.0,
        max_tiles: 1,
        max_polys_per_tile: 8,
    })?;

    let mut params = corridor_tile_params();
    params.bmin = [0.0, 0.0, 0.0];
    params.bmax = [20.0, 2.0, 10.0];
    params.poly_clusters = vec![0, 1];
    params.cluster_count = 2;

    nav.add_tile(build_tile_data(&params)?)?;
    Ok(nav)
}

/// Two 10x10 tiles side by side, one square polygon each, joined across
/// the x = 10 tile boundary
pub fn two_tile_mesh() -> Result<NavMesh> {
    let mut nav = NavMesh::new(NavMeshParams {
        origin: [0.0, 0.0, 0.0],
        tile_width: 10.0,
        tile_height: 10.0,
        max_tiles: 4,
        max_polys_per_tile: 8,
    })?;

    let mut west = base_params();
    west.verts = vec![
        0.0, 0.0, 0.0, //
        10.0, 0.0, 0.0, //
        10.0, 0.0, 10.0, //
        0.0, 0.0, 10.0,
    ];
    west.polys = vec![
        0, 1, 2, 3, NULL_IDX, NULL_IDX, //
        NULL_IDX, EXT_LINK, NULL_IDX, NULL_IDX, NULL_IDX, NULL_IDX,
    ];
    west.poly_flags = vec![PolyFlags::WALK];
    west.poly_areas = vec![1];
    west.tile_x = 0;
    west.tile_y = 0;
    west.bmin = [0.0, 0.0, 0.0];
    west.bmax = [10.0, 2.0, 10.0];

    let mut east = base_params();
    east.verts = vec![
        10.0, 0.0, 0.0, //
        20.0, 0.0, 0.0, //
        20.0, 0.0, 10.0, //
        10.0, 0.0, 10.0,
    ];
    east.polys = vec![
        0, 1, 2, 3, NULL_IDX, NULL_IDX, //
        NULL_IDX, NULL_IDX, NULL_IDX, EXT_LINK | 4, NULL_IDX, NULL_IDX,
    ];
    east.poly_flags = vec![PolyFlags::WALK];
    east.poly_areas = vec![1];
    east.tile_x = 1;
    east.tile_y = 0;
    east.bmin = [10.0, 0.0, 0.0];
    east.bmax = [20.0, 2.0, 10.0];

    nav.add_tile(build_tile_data(&west)?)?;
    nav.add_tile(build_tile_data(&east)?)?;
    Ok(nav)
}

fn gap_tile_params(con_flags: Option<u8>) -> TileDataParams {
    let mut params = base_params();
    params.verts = vec![
        0.0, 0.0, 0.0, //
        10.0, 0.0, 0.0, //
        10.0, 0.0, 10.0, //
        0.0, 0.0, 10.0, //
        20.0, 0.0, 0.0, //
        30.0, 0.0, 0.0, //
        30.0, 0.0, 10.0, //
        20.0, 0.0, 10.0,
    ];
    params.polys = vec![
        0, 1, 2, 3, NULL_IDX, NULL_IDX, //
        NULL_IDX, NULL_IDX, NULL_IDX, NULL_IDX, NULL_IDX, NULL_IDX, //
        4, 5, 6, 7, NULL_IDX, NULL_IDX, //
        NULL_IDX, NULL_IDX, NULL_IDX, NULL_IDX, NULL_IDX, NULL_IDX,
    ];
    params.poly_flags = vec![PolyFlags::WALK; 2];
    params.poly_areas = vec![1, 1];
    params.bmin = [0.0, 0.0, 0.0];
    params.bmax = [30.0, 2.0, 10.0];
    if let Some(flags) = con_flags {
        params.off_mesh_points = vec![OffMeshPointParams {
            start: [9.0, 0.0, 5.0],
            end: [21.0, 0.0, 5.0],
            radius: 1.0,
            snap_height: 0.0,
            flags,
            area: 1,
            poly_flags: PolyFlags::WALK,
            user_id: 100,
        }];
    }
    params
}

fn gap_mesh(con_flags: Option<u8>, clustered: bool) -> Result<NavMesh> {
    let mut nav = NavMesh::new(NavMeshParams {
        origin: [0.0, 0.0, 0.0],
        tile_width: 30.0,
        tile_height: 10.0,
        max_tiles: 1,
        max_polys_per_tile: 8,
    })?;
    let mut params = gap_tile_params(con_flags);
    if clustered {
        params.poly_clusters = vec![0, 1];
        params.cluster_count = 2;
    }
    nav.add_tile(build_tile_data(&params)?)?;
    Ok(nav)
}

/// Two squares separated by a 10 unit gap with no connection between them
pub fn disconnected_squares_mesh() -> Result<NavMesh> {
    gap_mesh(None, false)
}

/// Two squares separated by a gap, bridged by a bidirectional point
/// connection from (9, 0, 5) to (21, 0, 5)
pub fn off_mesh_bridge_mesh() -> Result<NavMesh> {
    gap_mesh(Some(OFFMESH_CON_POINT | OFFMESH_CON_BIDIR), false)
}

/// Same gap, but the point connection only runs west to east
pub fn one_way_bridge_mesh() -> Result<NavMesh> {
    gap_mesh(Some(OFFMESH_CON_POINT), false)
}

/// Bidirectional bridge with each square in its own cluster
pub fn clustered_bridge_mesh() -> Result<NavMesh> {
    gap_mesh(Some(OFFMESH_CON_POINT | OFFMESH_CON_BIDIR), true)
}

/// One-way bridge with each square in its own cluster
pub fn clustered_one_way_bridge_mesh() -> Result<NavMesh> {
    gap_mesh(Some(OFFMESH_CON_POINT), true)
}

/// The gap squares bridged by a bidirectional segment connection: rail A
/// runs along x = 9 on the west square, rail B along x = 21 on the east
/// square, both from z = 2 to z = 8. Each square is its own cluster.
pub fn segment_bridge_mesh() -> Result<NavMesh> {
    let mut nav = NavMesh::new(NavMeshParams {
        origin: [0.0, 0.0, 0.0],
        tile_width: 30.0,
        tile_height: 10.0,
        max_tiles: 1,
        max_polys_per_tile: 8,
    })?;
    let mut params = gap_tile_params(None);
    params.poly_clusters = vec![0, 1];
    params.cluster_count = 2;
    params.off_mesh_segments = vec![OffMeshSegmentParams {
        start_a: [9.0, 0.0, 2.0],
        end_a: [9.0, 0.0, 8.0],
        start_b: [21.0, 0.0, 2.0],
        end_b: [21.0, 0.0, 8.0],
        radius: 1.0,
        flags: OFFMESH_CON_SEGMENT | OFFMESH_CON_BIDIR,
        area: 1,
        poly_flags: PolyFlags::WALK,
        user_id: 200,
    }];
    nav.add_tile(build_tile_data(&params)?)?;
    Ok(nav)
}

/// One segment connection whose rails cross five ground strips: four
/// 3 units wide and one 20 units wide, so the overlap count exceeds the
/// part slots
pub fn striped_segment_mesh() -> Result<NavMesh> {
    let mut nav = NavMesh::new(NavMeshParams {
        origin: [0.0, 0.0, 0.0],
        tile_width: 50.0,
        tile_height: 10.0,
        max_tiles: 1,
        max_polys_per_tile: 16,
    })?;

    let strips = [
        (1.0, 4.0),
        (6.0, 9.0),
        (11.0, 14.0),
        (16.0, 19.0),
        (25.0, 45.0),
    ];
    let mut params = base_params();
    for &(x0, x1) in &strips {
        let b = (params.verts.len() / 3) as u16;
        params.verts.extend_from_slice(&[
            x0, 0.0, 0.0, //
            x1, 0.0, 0.0, //
            x1, 0.0, 10.0, //
            x0, 0.0, 10.0,
        ]);
        params.polys.extend_from_slice(&[
            b,
            b + 1,
            b + 2,
            b + 3,
            NULL_IDX,
            NULL_IDX,
            NULL_IDX,
            NULL_IDX,
            NULL_IDX,
            NULL_IDX,
            NULL_IDX,
            NULL_IDX,
        ]);
    }
    params.poly_flags = vec![PolyFlags::WALK; strips.len()];
    params.poly_areas = vec![1; strips.len()];
    params.bmin = [0.0, 0.0, 0.0];
    params.bmax = [50.0, 2.0, 10.0];
    params.off_mesh_segments = vec![OffMeshSegmentParams {
        start_a: [0.0, 0.0, 3.0],
        end_a: [50.0, 0.0, 3.0],
        start_b: [0.0, 0.0, 7.0],
        end_b: [50.0, 0.0, 7.0],
        radius: 1.0,
        flags: OFFMESH_CON_SEGMENT | OFFMESH_CON_BIDIR,
        area: 1,
        poly_flags: PolyFlags::WALK,
        user_id: 300,
    }];

    nav.add_tile(build_tile_data(&params)?)?;
    Ok(nav)
}

/// Malformed tile: the square's east edge lists the square itself as its
/// neighbour, so edge walks loop forever. Used to exercise the cycle
/// guards.
pub fn self_linked_square_mesh() -> Result<NavMesh> {
    let mut nav = NavMesh::new(NavMeshParams {
        origin: [0.0, 0.0, 0.0],
        tile_width: 10.0,
        tile_height: 10.0,
        max_tiles: 1,
        max_polys_per_tile: 8,
    })?;

    let mut params = base_params();
    params.verts = vec![
        0.0, 0.0, 0.0, //
        10.0, 0.0, 0.0, //
        10.0, 0.0, 10.0, //
        0.0, 0.0, 10.0,
    ];
    params.polys = vec![
        0, 1, 2, 3, NULL_IDX, NULL_IDX, //
        NULL_IDX, 0, NULL_IDX, NULL_IDX, NULL_IDX, NULL_IDX,
    ];
    params.poly_flags = vec![PolyFlags::WALK];
    params.poly_areas = vec![1];
    params.bmin = [0.0, 0.0, 0.0];
    params.bmax = [10.0, 2.0, 10.0];

    nav.add_tile(build_tile_data(&params)?)?;
    Ok(nav)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::StandardFilter;
    use crate::nav_mesh_query::NavMeshQuery;

    #[test]
    fn single_square_finds_poly_at_center() {
        let nav = single_square_mesh().unwrap();
        let query = NavMeshQuery::new(&nav, 128).unwrap();
        let filter = StandardFilter::new();
        let (r, pos) = query
            .find_nearest_poly(&[5.0, 0.0, 5.0], &test_extents(), &filter)
            .unwrap();
        assert!(!r.is_null());
        assert!((pos[0] - 5.0).abs() < 1e-4);
        assert!((pos[2] - 5.0).abs() < 1e-4);
    }

    #[test]
    fn corridor_polys_are_neighbours() {
        let nav = two_square_corridor_mesh().unwrap();
        let tile = nav.tile(0).unwrap();
        assert_eq!(tile.polys[0].neis[1], 2);
        assert_eq!(tile.polys[1].neis[3], 1);
    }

    #[test]
    fn two_tile_mesh_links_across_boundary() {
        let nav = two_tile_mesh().unwrap();
        let mut query = NavMeshQuery::new(&nav, 128).unwrap();
        let filter = StandardFilter::new();
        let (west, _) = query
            .find_nearest_poly(&[5.0, 0.0, 5.0], &test_extents(), &filter)
            .unwrap();
        let (east, _) = query
            .find_nearest_poly(&[15.0, 0.0, 5.0], &test_extents(), &filter)
            .unwrap();
        assert!(!west.is_null());
        assert!(!east.is_null());
        assert_ne!(west, east);
        let result = query
            .find_path(west, east, &[5.0, 0.0, 5.0], &[15.0, 0.0, 5.0], &filter, 16)
            .unwrap();
        assert_eq!(result.path.len(), 2);
    }

    #[test]
    fn bridge_mesh_stores_connection() {
        let nav = off_mesh_bridge_mesh().unwrap();
        let tile = nav.tile(0).unwrap();
        assert_eq!(tile.off_mesh_cons.len(), 1);
        assert_eq!(tile.off_mesh_cons[0].user_id, 100);
    }
}
