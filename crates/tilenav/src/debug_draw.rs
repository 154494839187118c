//! Debug geometry extraction
//!
//! Pulls renderable primitives out of a live mesh so an external viewer
//! can draw it without knowing the tile internals: polygon outlines with
//! their edge kind, off-mesh connection endpoints and cluster centers.

use crate::nav_mesh::{NavMesh, PolyRef, PolyType, EXT_LINK, NULL_LINK};
use crate::off_mesh::OFFMESH_CON_BIDIR;

/// Kind of a polygon edge, for color coding
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EdgeKind {
    /// Edge shared with another polygon in the same tile
    Inner,
    /// Edge on the tile boundary, linked into a neighbour tile
    Portal,
    /// Solid wall
    Border,
}

/// One polygon outline edge
#[derive(Debug, Clone, Copy)]
pub struct DebugEdge {
    /// Edge start
    pub start: [f32; 3],
    /// Edge end
    pub end: [f32; 3],
    /// Edge kind
    pub kind: EdgeKind,
    /// Owning polygon
    pub poly: PolyRef,
    /// Owning polygon's area id
    pub area: u8,
}

/// One off-mesh connection, point or segment rail pair
#[derive(Debug, Clone, Copy)]
pub struct DebugConnection {
    /// Start endpoint (or rail A start)
    pub start: [f32; 3],
    /// End endpoint (or rail B start)
    pub end: [f32; 3],
    /// True when the connection is traversable both ways
    pub bidirectional: bool,
    /// True when the connection is linked into the mesh
    pub linked: bool,
}

/// Extracted debug geometry of one tile
#[derive(Debug, Clone, Default)]
pub struct TileDebugGeometry {
    /// Ground polygon outlines
    pub edges: Vec<DebugEdge>,
    /// Off-mesh connections
    pub connections: Vec<DebugConnection>,
    /// Cluster centers
    pub cluster_centers: Vec<[f32; 3]>,
}

/// Extracts the debug geometry of one tile slot. Returns `None` for free
/// slots.
pub fn extract_tile_geometry(mesh: &NavMesh, tile_idx: usize) -> Option<TileDebugGeometry> {
    let tile = mesh.tile(tile_idx)?;
    tile.header.as_ref()?;
    let base = mesh.poly_ref_base(tile_idx);

    let mut out = TileDebugGeometry::default();

    for (ip, poly) in tile.polys.iter().enumerate() {
        if poly.poly_type != PolyType::Ground {
            continue;
        }
        let r = PolyRef(base.0 | ip as u64);
        let nv = poly.vert_count as usize;
        for j in 0..nv {
            let kind = if poly.neis[j] & EXT_LINK != 0 {
                EdgeKind::Portal
            } else if poly.neis[j] != 0 {
                EdgeKind::Inner
            } else {
                EdgeKind::Border
            };
            out.edges.push(DebugEdge {
                start: tile.vert(poly.verts[j]),
                end: tile.vert(poly.verts[(j + 1) % nv]),
                kind,
                poly: r,
                area: poly.area,
            });
        }
    }

    for con in &tile.off_mesh_cons {
        out.connections.push(DebugConnection {
            start: [con.pos[0], con.pos[1], con.pos[2]],
            end: [con.pos[3], con.pos[4], con.pos[5]],
            bidirectional: con.flags & OFFMESH_CON_BIDIR != 0,
            linked: tile
                .polys
                .get(con.poly as usize)
                .map(|p| p.first_link != NULL_LINK)
                .unwrap_or(false),
        });
    }
    for con in &tile.off_mesh_seg_cons {
        out.connections.push(DebugConnection {
            start: con.start_a,
            end: con.start_b,
            bidirectional: con.flags & OFFMESH_CON_BIDIR != 0,
            linked: con.npolys > 0,
        });
    }

    for cluster in &tile.clusters {
        out.cluster_centers.push(cluster.center);
    }

    Some(out)
}

/// Extracts the debug geometry of every live tile
pub fn extract_mesh_geometry(mesh: &NavMesh) -> Vec<TileDebugGeometry> {
    (0..mesh.max_tiles())
        .filter_map(|i| extract_tile_geometry(mesh, i))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_mesh_helpers::{clustered_corridor_mesh, off_mesh_bridge_mesh};

    #[test]
    fn extracts_edges_and_connections() {
        let nav = off_mesh_bridge_mesh().unwrap();
        let geo = extract_tile_geometry(&nav, 0).unwrap();

        // Two ground quads; the connection polygon has no outline.
        assert_eq!(geo.edges.len(), 8);
        assert!(geo.edges.iter().all(|e| e.kind == EdgeKind::Border));

        assert_eq!(geo.connections.len(), 1);
        assert!(geo.connections[0].bidirectional);
        assert!(geo.connections[0].linked);
    }

    #[test]
    fn marks_shared_edges_and_cluster_centers() {
        let nav = clustered_corridor_mesh().unwrap();
        let geo = extract_tile_geometry(&nav, 0).unwrap();

        let inner = geo
            .edges
            .iter()
            .filter(|e| e.kind == EdgeKind::Inner)
            .count();
        assert_eq!(inner, 2);
        assert_eq!(geo.cluster_centers.len(), 2);

        let all = extract_mesh_geometry(&nav);
        assert_eq!(all.len(), 1);
    }
}
