//! Tile builder
//!
//! Turns raw polygon soup into a [`TileData`] payload ready for
//! [`NavMesh::add_tile`]: lays out the vertex and polygon arrays with the
//! off-mesh slots behind the ground section, classifies off-mesh
//! connection endpoints against the tile bounds, builds the quantized
//! BV tree and falls back to a fan triangulation when no height detail is
//! supplied.

use crate::cluster::Cluster;
use crate::nav_mesh::{
    BVNode, Poly, PolyDetail, PolyFlags, PolyType, TileData, TileHeader, EXT_LINK,
    MAX_VERTS_PER_POLYGON,
};
use crate::off_mesh::{OffMeshPointConnection, OffMeshSegmentConnection, MAX_OFFMESH_SEGMENT_PARTS};
use crate::status::{Result, Status};
use crate::nav_ensure;
use tilenav_common::math::{vlerp, vmax, vmin};

/// Sentinel for unused vertex/neighbour slots in [`TileDataParams::polys`]
pub const NULL_IDX: u16 = 0xffff;

/// Point connection input for the builder
#[derive(Debug, Clone)]
pub struct OffMeshPointParams {
    /// Start endpoint; must lie inside the tile for the connection to be
    /// stored
    pub start: [f32; 3],
    /// End endpoint; may lie in a neighbouring tile
    pub end: [f32; 3],
    /// Snap radius around the endpoints
    pub radius: f32,
    /// Vertical snap tolerance, zero for the tile walkable climb
    pub snap_height: f32,
    /// `OFFMESH_CON_*` bits
    pub flags: u8,
    /// Area id of the connection polygon
    pub area: u8,
    /// User flags of the connection polygon
    pub poly_flags: PolyFlags,
    /// Opaque user id
    pub user_id: u32,
}

/// Segment connection input for the builder
#[derive(Debug, Clone)]
pub struct OffMeshSegmentParams {
    /// Rail A start
    pub start_a: [f32; 3],
    /// Rail A end
    pub end_a: [f32; 3],
    /// Rail B start
    pub start_b: [f32; 3],
    /// Rail B end
    pub end_b: [f32; 3],
    /// Snap radius around the rails
    pub radius: f32,
    /// `OFFMESH_CON_*` bits
    pub flags: u8,
    /// Area id of the part polygons
    pub area: u8,
    /// User flags of the part polygons
    pub poly_flags: PolyFlags,
    /// Opaque user id
    pub user_id: u32,
}

/// Input for [`build_tile_data`]
#[derive(Debug, Clone, Default)]
pub struct TileDataParams {
    /// Ground vertices, `x y z` per vertex, world units
    pub verts: Vec<f32>,
    /// Ground polygons, `2 * nvp` entries each: `nvp` vertex indices
    /// (padded with [`NULL_IDX`]) followed by `nvp` neighbour entries.
    /// A neighbour entry is [`NULL_IDX`] for a border edge, a polygon
    /// index for an internal neighbour, or `EXT_LINK | side` for a tile
    /// boundary edge.
    pub polys: Vec<u16>,
    /// User flags per ground polygon
    pub poly_flags: Vec<PolyFlags>,
    /// Area id per ground polygon
    pub poly_areas: Vec<u8>,
    /// Vertex slots per polygon in `polys`
    pub nvp: usize,

    /// Height detail per ground polygon as
    /// `(vert_base, vert_count, tri_base, tri_count)`. Leave empty to get
    /// a flat fan triangulation.
    pub detail_meshes: Vec<(u32, u8, u32, u8)>,
    /// Detail vertices
    pub detail_verts: Vec<f32>,
    /// Detail triangles, 4 bytes each
    pub detail_tris: Vec<u8>,

    /// Point connections
    pub off_mesh_points: Vec<OffMeshPointParams>,
    /// Segment connections
    pub off_mesh_segments: Vec<OffMeshSegmentParams>,

    /// Cluster id per ground polygon; leave empty for no cluster graph
    pub poly_clusters: Vec<u16>,
    /// Number of clusters referenced by `poly_clusters`
    pub cluster_count: usize,

    /// Tile grid x coordinate
    pub tile_x: i32,
    /// Tile grid y coordinate
    pub tile_y: i32,
    /// Tile layer
    pub tile_layer: i32,
    /// Opaque user id for the tile
    pub user_id: u32,
    /// Tile bounds minimum
    pub bmin: [f32; 3],
    /// Tile bounds maximum
    pub bmax: [f32; 3],
    /// Agent height
    pub walkable_height: f32,
    /// Agent radius
    pub walkable_radius: f32,
    /// Agent climb tolerance
    pub walkable_climb: f32,
    /// Voxel cell size, drives BV quantization
    pub cs: f32,
    /// Voxel cell height
    pub ch: f32,
    /// Build the BV tree for spatial queries
    pub build_bv_tree: bool,
}

/// Compass side of a point relative to a tile's XZ bounds, `0xff` when the
/// point is inside
fn classify_off_mesh_point(pt: &[f32; 3], bmin: &[f32; 3], bmax: &[f32; 3]) -> u8 {
    const XP: u8 = 1 << 0;
    const ZP: u8 = 1 << 1;
    const XM: u8 = 1 << 2;
    const ZM: u8 = 1 << 3;

    let mut outcode = 0u8;
    if pt[0] >= bmax[0] {
        outcode |= XP;
    }
    if pt[2] >= bmax[2] {
        outcode |= ZP;
    }
    if pt[0] < bmin[0] {
        outcode |= XM;
    }
    if pt[2] < bmin[2] {
        outcode |= ZM;
    }
    match outcode {
        x if x == XP => 0,
        x if x == XP | ZP => 1,
        x if x == ZP => 2,
        x if x == XM | ZP => 3,
        x if x == XM => 4,
        x if x == XM | ZM => 5,
        x if x == ZM => 6,
        x if x == XP | ZM => 7,
        _ => 0xff,
    }
}

struct BVItem {
    bmin: [u16; 3],
    bmax: [u16; 3],
    i: i32,
}

fn longest_axis(extents: &[u16; 3]) -> usize {
    let mut axis = 0;
    let mut max = extents[0];
    if extents[1] > max {
        axis = 1;
        max = extents[1];
    }
    if extents[2] > max {
        axis = 2;
    }
    axis
}

fn subdivide(items: &mut [BVItem], imin: usize, imax: usize, nodes: &mut Vec<BVNode>) {
    let count = imax - imin;
    if count == 1 {
        let it = &items[imin];
        nodes.push(BVNode {
            bmin: it.bmin,
            bmax: it.bmax,
            i: it.i,
        });
        return;
    }

    let mut bmin = items[imin].bmin;
    let mut bmax = items[imin].bmax;
    for it in items[imin + 1..imax].iter() {
        for k in 0..3 {
            bmin[k] = bmin[k].min(it.bmin[k]);
            bmax[k] = bmax[k].max(it.bmax[k]);
        }
    }

    let extents = [
        bmax[0] - bmin[0],
        bmax[1] - bmin[1],
        bmax[2] - bmin[2],
    ];
    let axis = longest_axis(&extents);
    items[imin..imax].sort_by_key(|it| it.bmin[axis]);

    let node_idx = nodes.len();
    nodes.push(BVNode { bmin, bmax, i: 0 });

    let split = imin + count / 2;
    subdivide(items, imin, split, nodes);
    subdivide(items, split, imax, nodes);

    // Inner nodes store the negated escape offset.
    let escape = (nodes.len() - node_idx) as i32;
    nodes[node_idx].i = -escape;
}

fn build_bv_tree(
    polys: &[Poly],
    ground_count: usize,
    verts: &[f32],
    bmin: &[f32; 3],
    quant_factor: f32,
) -> Vec<BVNode> {
    let mut items: Vec<BVItem> = Vec::with_capacity(ground_count);
    for (i, poly) in polys.iter().enumerate().take(ground_count) {
        let mut pbmin = [f32::MAX; 3];
        let mut pbmax = [f32::MIN; 3];
        for j in 0..poly.vert_count as usize {
            let vi = poly.verts[j] as usize * 3;
            let v = [verts[vi], verts[vi + 1], verts[vi + 2]];
            vmin(&mut pbmin, &v);
            vmax(&mut pbmax, &v);
        }
        let q = |v: f32, axis: usize| -> u16 {
            (((v - bmin[axis]).max(0.0) * quant_factor) as u32).min(u16::MAX as u32) as u16
        };
        items.push(BVItem {
            bmin: [q(pbmin[0], 0), q(pbmin[1], 1), q(pbmin[2], 2)],
            bmax: [q(pbmax[0], 0), q(pbmax[1], 1), q(pbmax[2], 2)],
            i: i as i32,
        });
    }

    let mut nodes = Vec::with_capacity(ground_count * 2);
    if !items.is_empty() {
        let count = items.len();
        subdivide(&mut items, 0, count, &mut nodes);
    }
    nodes
}

/// Builds a [`TileData`] payload from raw polygon data.
///
/// Off-mesh connections whose start point lies outside the tile bounds
/// are dropped; segment connections always reserve their full
/// [`MAX_OFFMESH_SEGMENT_PARTS`] polygon and vertex slots, filled in when
/// tiles link up.
pub fn build_tile_data(params: &TileDataParams) -> Result<TileData> {
    let nvp = params.nvp;
    nav_ensure!(
        nvp >= 3 && nvp <= MAX_VERTS_PER_POLYGON,
        Status::invalid_param()
    );
    nav_ensure!(
        params.verts.len() % 3 == 0 && !params.polys.is_empty(),
        Status::invalid_param()
    );
    nav_ensure!(
        params.polys.len() % (nvp * 2) == 0,
        Status::invalid_param()
    );
    let ground_poly_count = params.polys.len() / (nvp * 2);
    let ground_vert_count = params.verts.len() / 3;
    nav_ensure!(
        params.poly_flags.len() == ground_poly_count
            && params.poly_areas.len() == ground_poly_count,
        Status::invalid_param()
    );
    nav_ensure!(
        params.poly_clusters.is_empty() || params.poly_clusters.len() == ground_poly_count,
        Status::invalid_param()
    );
    nav_ensure!(params.cs > 0.0 && params.ch > 0.0, Status::invalid_param());

    // Only connections starting inside this tile belong to it.
    let mut stored_points: Vec<(&OffMeshPointParams, u8)> = Vec::new();
    for con in &params.off_mesh_points {
        if classify_off_mesh_point(&con.start, &params.bmin, &params.bmax) != 0xff {
            continue;
        }
        let side = classify_off_mesh_point(&con.end, &params.bmin, &params.bmax);
        stored_points.push((con, side));
    }

    let point_count = stored_points.len();
    let seg_count = params.off_mesh_segments.len();
    let seg_poly_slots = seg_count * MAX_OFFMESH_SEGMENT_PARTS;
    let seg_vert_slots = seg_poly_slots * 4;

    let total_poly_count = ground_poly_count + point_count + seg_poly_slots;
    let total_vert_count = ground_vert_count + point_count * 2 + seg_vert_slots;
    nav_ensure!(total_vert_count <= u16::MAX as usize, Status::invalid_param());

    // Vertex array: ground, point connection endpoints, segment slots.
    let mut verts = Vec::with_capacity(total_vert_count * 3);
    verts.extend_from_slice(&params.verts);
    for (con, _) in &stored_points {
        verts.extend_from_slice(&con.start);
        verts.extend_from_slice(&con.end);
    }
    verts.resize(total_vert_count * 3, 0.0);

    // Polygon array in the same layout.
    let mut polys = Vec::with_capacity(total_poly_count);
    for i in 0..ground_poly_count {
        let src = &params.polys[i * nvp * 2..(i + 1) * nvp * 2];
        let mut poly = Poly::new(
            params.poly_areas[i],
            PolyType::Ground,
            params.poly_flags[i],
        );
        let mut nv = 0u8;
        for j in 0..nvp {
            if src[j] == NULL_IDX {
                break;
            }
            nav_ensure!(
                (src[j] as usize) < ground_vert_count,
                Status::invalid_param()
            );
            poly.verts[j] = src[j];
            let nei = src[nvp + j];
            poly.neis[j] = if nei == NULL_IDX {
                0
            } else if nei & EXT_LINK != 0 {
                nei
            } else {
                nei + 1
            };
            nv += 1;
        }
        nav_ensure!(nv >= 3, Status::invalid_param());
        poly.vert_count = nv;
        polys.push(poly);
    }

    let off_mesh_base = ground_poly_count;
    for (k, (con, _)) in stored_points.iter().enumerate() {
        let mut poly = Poly::new(con.area, PolyType::OffMeshPoint, con.poly_flags);
        let iv = (ground_vert_count + k * 2) as u16;
        poly.verts[0] = iv;
        poly.verts[1] = iv + 1;
        poly.vert_count = 2;
        polys.push(poly);
    }

    let off_mesh_seg_poly_base = off_mesh_base + point_count;
    let off_mesh_seg_vert_base = ground_vert_count + point_count * 2;
    for con in &params.off_mesh_segments {
        for _ in 0..MAX_OFFMESH_SEGMENT_PARTS {
            // Slot polygons get their vertices when the parts are carved.
            polys.push(Poly::new(con.area, PolyType::OffMeshSegment, con.poly_flags));
        }
    }

    // Height detail: passthrough or a flat fan per ground polygon.
    let (detail_meshes, detail_verts, detail_tris) = if params.detail_meshes.is_empty() {
        let mut meshes = Vec::with_capacity(ground_poly_count);
        let mut tris: Vec<u8> = Vec::new();
        let mut tri_base = 0u32;
        for poly in polys.iter().take(ground_poly_count) {
            let nv = poly.vert_count as usize;
            meshes.push(PolyDetail {
                vert_base: 0,
                vert_count: 0,
                tri_base,
                tri_count: (nv - 2) as u8,
            });
            for j in 2..nv {
                let mut flags = 1u8 << 2;
                if j == 2 {
                    flags |= 1 << 0;
                }
                if j == nv - 1 {
                    flags |= 1 << 4;
                }
                tris.extend_from_slice(&[0, (j - 1) as u8, j as u8, flags]);
            }
            tri_base += (nv - 2) as u32;
        }
        (meshes, Vec::new(), tris)
    } else {
        nav_ensure!(
            params.detail_meshes.len() == ground_poly_count,
            Status::invalid_param()
        );
        let meshes = params
            .detail_meshes
            .iter()
            .map(|&(vb, vc, tb, tc)| PolyDetail {
                vert_base: vb,
                vert_count: vc,
                tri_base: tb,
                tri_count: tc,
            })
            .collect();
        (meshes, params.detail_verts.clone(), params.detail_tris.clone())
    };

    let quant_factor = 1.0 / params.cs;
    let bv_tree = if params.build_bv_tree {
        build_bv_tree(&polys, ground_poly_count, &verts, &params.bmin, quant_factor)
    } else {
        Vec::new()
    };

    let off_mesh_cons: Vec<OffMeshPointConnection> = stored_points
        .iter()
        .enumerate()
        .map(|(k, (con, side))| OffMeshPointConnection {
            pos: [
                con.start[0], con.start[1], con.start[2], con.end[0], con.end[1], con.end[2],
            ],
            radius: con.radius,
            snap_height: con.snap_height,
            poly: (off_mesh_base + k) as u16,
            flags: con.flags,
            side: *side,
            user_id: con.user_id,
        })
        .collect();

    let off_mesh_seg_cons: Vec<OffMeshSegmentConnection> = params
        .off_mesh_segments
        .iter()
        .map(|con| OffMeshSegmentConnection {
            start_a: con.start_a,
            end_a: con.end_a,
            start_b: con.start_b,
            end_b: con.end_b,
            radius: con.radius,
            first_poly: 0,
            npolys: 0,
            flags: con.flags,
            user_id: con.user_id,
        })
        .collect();

    // Cluster centers averaged over member polygons.
    let mut clusters = vec![Cluster::default(); params.cluster_count];
    if !params.poly_clusters.is_empty() {
        let mut counts = vec![0u32; params.cluster_count];
        for (i, &ci) in params.poly_clusters.iter().enumerate() {
            nav_ensure!((ci as usize) < params.cluster_count, Status::invalid_param());
            let poly = &polys[i];
            let mut center = [0.0f32; 3];
            for j in 0..poly.vert_count as usize {
                let vi = poly.verts[j] as usize * 3;
                center[0] += verts[vi];
                center[1] += verts[vi + 1];
                center[2] += verts[vi + 2];
            }
            let inv = 1.0 / poly.vert_count as f32;
            let c = &mut clusters[ci as usize].center;
            c[0] += center[0] * inv;
            c[1] += center[1] * inv;
            c[2] += center[2] * inv;
            counts[ci as usize] += 1;
        }
        for (cluster, &count) in clusters.iter_mut().zip(&counts) {
            if count > 0 {
                let inv = 1.0 / count as f32;
                cluster.center = [
                    cluster.center[0] * inv,
                    cluster.center[1] * inv,
                    cluster.center[2] * inv,
                ];
            }
        }
    }

    let header = TileHeader {
        x: params.tile_x,
        y: params.tile_y,
        layer: params.tile_layer,
        user_id: params.user_id,
        poly_count: total_poly_count as i32,
        vert_count: ground_vert_count as i32,
        max_link_count: (total_poly_count * MAX_VERTS_PER_POLYGON) as i32,
        detail_mesh_count: detail_meshes.len() as i32,
        detail_vert_count: (detail_verts.len() / 3) as i32,
        detail_tri_count: (detail_tris.len() / 4) as i32,
        bv_node_count: bv_tree.len() as i32,
        off_mesh_con_count: point_count as i32,
        off_mesh_base: off_mesh_base as i32,
        off_mesh_seg_con_count: seg_count as i32,
        off_mesh_seg_poly_base: off_mesh_seg_poly_base as i32,
        off_mesh_seg_vert_base: off_mesh_seg_vert_base as i32,
        cluster_count: params.cluster_count as i32,
        walkable_height: params.walkable_height,
        walkable_radius: params.walkable_radius,
        walkable_climb: params.walkable_climb,
        bmin: params.bmin,
        bmax: params.bmax,
        bv_quant_factor: quant_factor,
    };

    Ok(TileData {
        header,
        verts,
        polys,
        detail_meshes,
        detail_verts,
        detail_tris,
        bv_tree,
        off_mesh_cons,
        off_mesh_seg_cons,
        clusters,
        poly_clusters: params.poly_clusters.clone(),
    })
}

/// Midpoint of a point connection, useful for placing debug labels
pub fn off_mesh_point_mid(con: &OffMeshPointConnection) -> [f32; 3] {
    let a = [con.pos[0], con.pos[1], con.pos[2]];
    let b = [con.pos[3], con.pos[4], con.pos[5]];
    vlerp(&a, &b, 0.5)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square_params() -> TileDataParams {
        TileDataParams {
            verts: vec![
                0.0, 0.0, 0.0, //
                4.0, 0.0, 0.0, //
                4.0, 0.0, 4.0, //
                0.0, 0.0, 4.0,
            ],
            polys: vec![
                0, 1, 2, 3, NULL_IDX, NULL_IDX, // verts
                NULL_IDX, NULL_IDX, NULL_IDX, NULL_IDX, NULL_IDX, NULL_IDX, // neis
            ],
            poly_flags: vec![PolyFlags::WALK],
            poly_areas: vec![1],
            nvp: 6,
            bmin: [0.0, 0.0, 0.0],
            bmax: [4.0, 1.0, 4.0],
            walkable_height: 2.0,
            walkable_radius: 0.5,
            walkable_climb: 0.5,
            cs: 0.3,
            ch: 0.2,
            build_bv_tree: true,
            ..Default::default()
        }
    }

    #[test]
    fn builds_single_square() {
        let data = build_tile_data(&square_params()).unwrap();
        assert_eq!(data.header.poly_count, 1);
        assert_eq!(data.header.vert_count, 4);
        assert_eq!(data.polys[0].vert_count, 4);
        assert_eq!(data.polys[0].poly_type, PolyType::Ground);
        // Fan detail for a quad is two triangles.
        assert_eq!(data.detail_meshes[0].tri_count, 2);
        assert_eq!(data.bv_tree.len(), 1);
    }

    #[test]
    fn classifies_off_mesh_sides() {
        let bmin = [0.0, 0.0, 0.0];
        let bmax = [4.0, 1.0, 4.0];
        assert_eq!(classify_off_mesh_point(&[2.0, 0.0, 2.0], &bmin, &bmax), 0xff);
        assert_eq!(classify_off_mesh_point(&[5.0, 0.0, 2.0], &bmin, &bmax), 0);
        assert_eq!(classify_off_mesh_point(&[2.0, 0.0, 5.0], &bmin, &bmax), 2);
        assert_eq!(classify_off_mesh_point(&[-1.0, 0.0, 2.0], &bmin, &bmax), 4);
        assert_eq!(classify_off_mesh_point(&[2.0, 0.0, -1.0], &bmin, &bmax), 6);
        assert_eq!(classify_off_mesh_point(&[5.0, 0.0, 5.0], &bmin, &bmax), 1);
    }

    #[test]
    fn drops_connections_starting_outside() {
        let mut params = square_params();
        params.off_mesh_points = vec![
            OffMeshPointParams {
                start: [2.0, 0.0, 2.0],
                end: [6.0, 0.0, 2.0],
                radius: 0.5,
                snap_height: 0.0,
                flags: crate::off_mesh::OFFMESH_CON_POINT,
                area: 1,
                poly_flags: PolyFlags::WALK,
                user_id: 10,
            },
            OffMeshPointParams {
                start: [9.0, 0.0, 9.0],
                end: [2.0, 0.0, 2.0],
                radius: 0.5,
                snap_height: 0.0,
                flags: crate::off_mesh::OFFMESH_CON_POINT,
                area: 1,
                poly_flags: PolyFlags::WALK,
                user_id: 11,
            },
        ];
        let data = build_tile_data(&params).unwrap();
        assert_eq!(data.off_mesh_cons.len(), 1);
        assert_eq!(data.off_mesh_cons[0].user_id, 10);
        assert_eq!(data.off_mesh_cons[0].side, 0);
        assert_eq!(data.header.poly_count, 2);
        assert_eq!(data.polys[1].poly_type, PolyType::OffMeshPoint);
    }

    #[test]
    fn segment_connections_reserve_slots() {
        let mut params = square_params();
        params.off_mesh_segments = vec![OffMeshSegmentParams {
            start_a: [0.5, 0.0, 0.5],
            end_a: [3.5, 0.0, 0.5],
            start_b: [0.5, 0.0, 3.5],
            end_b: [3.5, 0.0, 3.5],
            radius: 0.5,
            flags: crate::off_mesh::OFFMESH_CON_SEGMENT,
            area: 1,
            poly_flags: PolyFlags::WALK,
            user_id: 42,
        }];
        let data = build_tile_data(&params).unwrap();
        assert_eq!(
            data.header.poly_count as usize,
            1 + MAX_OFFMESH_SEGMENT_PARTS
        );
        assert_eq!(data.header.off_mesh_seg_poly_base, 1);
        assert_eq!(data.off_mesh_seg_cons[0].npolys, 0);
        assert_eq!(
            data.verts.len() / 3,
            4 + MAX_OFFMESH_SEGMENT_PARTS * 4
        );
    }

    #[test]
    fn bv_tree_covers_all_polys() {
        let params = TileDataParams {
            verts: vec![
                0.0, 0.0, 0.0, //
                2.0, 0.0, 0.0, //
                2.0, 0.0, 2.0, //
                0.0, 0.0, 2.0, //
                4.0, 0.0, 0.0, //
                4.0, 0.0, 2.0,
            ],
            polys: vec![
                0, 1, 2, 3, NULL_IDX, NULL_IDX, //
                NULL_IDX, 1, NULL_IDX, NULL_IDX, NULL_IDX, NULL_IDX, //
                1, 4, 5, 2, NULL_IDX, NULL_IDX, //
                NULL_IDX, NULL_IDX, NULL_IDX, 0, NULL_IDX, NULL_IDX,
            ],
            poly_flags: vec![PolyFlags::WALK; 2],
            poly_areas: vec![1, 1],
            nvp: 6,
            bmin: [0.0, 0.0, 0.0],
            bmax: [4.0, 1.0, 2.0],
            walkable_height: 2.0,
            walkable_radius: 0.5,
            walkable_climb: 0.5,
            cs: 0.3,
            ch: 0.2,
            build_bv_tree: true,
            ..Default::default()
        };
        let data = build_tile_data(&params).unwrap();
        // Two leaves plus one inner node.
        assert_eq!(data.bv_tree.len(), 3);
        let leaves: Vec<i32> = data.bv_tree.iter().filter(|n| n.i >= 0).map(|n| n.i).collect();
        assert_eq!(leaves.len(), 2);
        assert!(data.bv_tree[0].i < 0);
        // Internal neighbours are stored plus one.
        assert_eq!(data.polys[0].neis[1], 2);
        assert_eq!(data.polys[1].neis[3], 1);
    }
}
