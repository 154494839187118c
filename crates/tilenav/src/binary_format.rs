//! Binary tile format
//!
//! Serializes [`TileData`] payloads and whole meshes to a little-endian
//! stream. Link pools and the mutable connection state are not stored;
//! they are rebuilt when the tile is added back to a mesh, so a decoded
//! tile behaves exactly like a freshly built one.

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::{Cursor, Read, Write};

use crate::cluster::Cluster;
use crate::nav_mesh::{
    BVNode, NavMesh, NavMeshParams, Poly, PolyDetail, PolyFlags, PolyType, TileData, TileHeader,
    TileRef, TileState, MAX_VERTS_PER_POLYGON, NULL_LINK,
};
use crate::off_mesh::{OffMeshPointConnection, OffMeshSegmentConnection};
use tilenav_common::{Error, Result};

/// Magic number of a serialized tile ('TNAV', little-endian)
pub const TILE_MAGIC: u32 = 0x5641_4e54;

/// Current tile format version
pub const TILE_VERSION: u32 = 1;

/// Magic number of a serialized mesh set ('TSET', little-endian)
pub const MESH_SET_MAGIC: u32 = 0x5445_5354;

/// Current mesh set format version
pub const MESH_SET_VERSION: u32 = 1;

/// Magic bytes of a tile state snapshot ('TSTA')
pub const TILE_STATE_MAGIC: u32 = 0x4154_5354;

/// Current tile state snapshot version
pub const TILE_STATE_VERSION: u32 = 1;

fn write_vec3<W: Write>(w: &mut W, v: &[f32; 3]) -> Result<()> {
    for &c in v {
        w.write_f32::<LittleEndian>(c)?;
    }
    Ok(())
}

fn read_vec3<R: Read>(r: &mut R) -> Result<[f32; 3]> {
    Ok([
        r.read_f32::<LittleEndian>()?,
        r.read_f32::<LittleEndian>()?,
        r.read_f32::<LittleEndian>()?,
    ])
}

fn write_header<W: Write>(w: &mut W, h: &TileHeader) -> Result<()> {
    w.write_i32::<LittleEndian>(h.x)?;
    w.write_i32::<LittleEndian>(h.y)?;
    w.write_i32::<LittleEndian>(h.layer)?;
    w.write_u32::<LittleEndian>(h.user_id)?;
    w.write_i32::<LittleEndian>(h.poly_count)?;
    w.write_i32::<LittleEndian>(h.vert_count)?;
    w.write_i32::<LittleEndian>(h.max_link_count)?;
    w.write_i32::<LittleEndian>(h.detail_mesh_count)?;
    w.write_i32::<LittleEndian>(h.detail_vert_count)?;
    w.write_i32::<LittleEndian>(h.detail_tri_count)?;
    w.write_i32::<LittleEndian>(h.bv_node_count)?;
    w.write_i32::<LittleEndian>(h.off_mesh_con_count)?;
    w.write_i32::<LittleEndian>(h.off_mesh_base)?;
    w.write_i32::<LittleEndian>(h.off_mesh_seg_con_count)?;
    w.write_i32::<LittleEndian>(h.off_mesh_seg_poly_base)?;
    w.write_i32::<LittleEndian>(h.off_mesh_seg_vert_base)?;
    w.write_i32::<LittleEndian>(h.cluster_count)?;
    w.write_f32::<LittleEndian>(h.walkable_height)?;
    w.write_f32::<LittleEndian>(h.walkable_radius)?;
    w.write_f32::<LittleEndian>(h.walkable_climb)?;
    write_vec3(w, &h.bmin)?;
    write_vec3(w, &h.bmax)?;
    w.write_f32::<LittleEndian>(h.bv_quant_factor)?;
    Ok(())
}

fn read_header<R: Read>(r: &mut R) -> Result<TileHeader> {
    Ok(TileHeader {
        x: r.read_i32::<LittleEndian>()?,
        y: r.read_i32::<LittleEndian>()?,
        layer: r.read_i32::<LittleEndian>()?,
        user_id: r.read_u32::<LittleEndian>()?,
        poly_count: r.read_i32::<LittleEndian>()?,
        vert_count: r.read_i32::<LittleEndian>()?,
        max_link_count: r.read_i32::<LittleEndian>()?,
        detail_mesh_count: r.read_i32::<LittleEndian>()?,
        detail_vert_count: r.read_i32::<LittleEndian>()?,
        detail_tri_count: r.read_i32::<LittleEndian>()?,
        bv_node_count: r.read_i32::<LittleEndian>()?,
        off_mesh_con_count: r.read_i32::<LittleEndian>()?,
        off_mesh_base: r.read_i32::<LittleEndian>()?,
        off_mesh_seg_con_count: r.read_i32::<LittleEndian>()?,
        off_mesh_seg_poly_base: r.read_i32::<LittleEndian>()?,
        off_mesh_seg_vert_base: r.read_i32::<LittleEndian>()?,
        cluster_count: r.read_i32::<LittleEndian>()?,
        walkable_height: r.read_f32::<LittleEndian>()?,
        walkable_radius: r.read_f32::<LittleEndian>()?,
        walkable_climb: r.read_f32::<LittleEndian>()?,
        bmin: read_vec3(r)?,
        bmax: read_vec3(r)?,
        bv_quant_factor: r.read_f32::<LittleEndian>()?,
    })
}

fn write_poly<W: Write>(w: &mut W, p: &Poly) -> Result<()> {
    for &v in &p.verts {
        w.write_u16::<LittleEndian>(v)?;
    }
    for &n in &p.neis {
        w.write_u16::<LittleEndian>(n)?;
    }
    w.write_u16::<LittleEndian>(p.flags.bits())?;
    w.write_u8(p.vert_count)?;
    w.write_u8(p.area)?;
    w.write_u8(match p.poly_type {
        PolyType::Ground => 0,
        PolyType::OffMeshPoint => 1,
        PolyType::OffMeshSegment => 2,
    })?;
    Ok(())
}

fn read_poly<R: Read>(r: &mut R) -> Result<Poly> {
    let mut verts = [0u16; MAX_VERTS_PER_POLYGON];
    for v in &mut verts {
        *v = r.read_u16::<LittleEndian>()?;
    }
    let mut neis = [0u16; MAX_VERTS_PER_POLYGON];
    for n in &mut neis {
        *n = r.read_u16::<LittleEndian>()?;
    }
    let flags = PolyFlags(r.read_u16::<LittleEndian>()?);
    let vert_count = r.read_u8()?;
    let area = r.read_u8()?;
    let poly_type = match r.read_u8()? {
        0 => PolyType::Ground,
        1 => PolyType::OffMeshPoint,
        2 => PolyType::OffMeshSegment,
        other => {
            return Err(Error::InvalidTileData(format!(
                "unknown polygon type {other}"
            )))
        }
    };
    let mut poly = Poly::new(area, poly_type, flags);
    poly.verts = verts;
    poly.neis = neis;
    poly.vert_count = vert_count;
    poly.first_link = NULL_LINK;
    Ok(poly)
}

/// Serializes a tile payload
pub fn serialize_tile_data(data: &TileData) -> Result<Vec<u8>> {
    let mut w = Vec::new();
    w.write_u32::<LittleEndian>(TILE_MAGIC)?;
    w.write_u32::<LittleEndian>(TILE_VERSION)?;
    write_header(&mut w, &data.header)?;

    w.write_u32::<LittleEndian>(data.verts.len() as u32)?;
    for &v in &data.verts {
        w.write_f32::<LittleEndian>(v)?;
    }

    w.write_u32::<LittleEndian>(data.polys.len() as u32)?;
    for p in &data.polys {
        write_poly(&mut w, p)?;
    }

    w.write_u32::<LittleEndian>(data.detail_meshes.len() as u32)?;
    for d in &data.detail_meshes {
        w.write_u32::<LittleEndian>(d.vert_base)?;
        w.write_u32::<LittleEndian>(d.tri_base)?;
        w.write_u8(d.vert_count)?;
        w.write_u8(d.tri_count)?;
    }

    w.write_u32::<LittleEndian>(data.detail_verts.len() as u32)?;
    for &v in &data.detail_verts {
        w.write_f32::<LittleEndian>(v)?;
    }
    w.write_u32::<LittleEndian>(data.detail_tris.len() as u32)?;
    w.write_all(&data.detail_tris)?;

    w.write_u32::<LittleEndian>(data.bv_tree.len() as u32)?;
    for n in &data.bv_tree {
        for &b in &n.bmin {
            w.write_u16::<LittleEndian>(b)?;
        }
        for &b in &n.bmax {
            w.write_u16::<LittleEndian>(b)?;
        }
        w.write_i32::<LittleEndian>(n.i)?;
    }

    w.write_u32::<LittleEndian>(data.off_mesh_cons.len() as u32)?;
    for c in &data.off_mesh_cons {
        for &p in &c.pos {
            w.write_f32::<LittleEndian>(p)?;
        }
        w.write_f32::<LittleEndian>(c.radius)?;
        w.write_f32::<LittleEndian>(c.snap_height)?;
        w.write_u16::<LittleEndian>(c.poly)?;
        w.write_u8(c.flags)?;
        w.write_u8(c.side)?;
        w.write_u32::<LittleEndian>(c.user_id)?;
    }

    w.write_u32::<LittleEndian>(data.off_mesh_seg_cons.len() as u32)?;
    for c in &data.off_mesh_seg_cons {
        write_vec3(&mut w, &c.start_a)?;
        write_vec3(&mut w, &c.end_a)?;
        write_vec3(&mut w, &c.start_b)?;
        write_vec3(&mut w, &c.end_b)?;
        w.write_f32::<LittleEndian>(c.radius)?;
        w.write_u8(c.flags)?;
        w.write_u32::<LittleEndian>(c.user_id)?;
    }

    w.write_u32::<LittleEndian>(data.clusters.len() as u32)?;
    for c in &data.clusters {
        write_vec3(&mut w, &c.center)?;
    }
    w.write_u32::<LittleEndian>(data.poly_clusters.len() as u32)?;
    for &pc in &data.poly_clusters {
        w.write_u16::<LittleEndian>(pc)?;
    }

    Ok(w)
}

/// Decodes a tile payload.
///
/// Fails with [`Error::WrongMagic`] or [`Error::WrongVersion`] when the
/// stream is not a supported tile.
pub fn deserialize_tile_data(bytes: &[u8]) -> Result<TileData> {
    let mut r = Cursor::new(bytes);

    let magic = r.read_u32::<LittleEndian>()?;
    if magic != TILE_MAGIC {
        return Err(Error::WrongMagic(magic));
    }
    let version = r.read_u32::<LittleEndian>()?;
    if version != TILE_VERSION {
        return Err(Error::WrongVersion(version));
    }

    let header = read_header(&mut r)?;

    let vert_len = r.read_u32::<LittleEndian>()? as usize;
    let mut verts = Vec::with_capacity(vert_len);
    for _ in 0..vert_len {
        verts.push(r.read_f32::<LittleEndian>()?);
    }

    let poly_len = r.read_u32::<LittleEndian>()? as usize;
    if poly_len != header.poly_count as usize {
        return Err(Error::InvalidTileData(format!(
            "polygon count mismatch: header {} stream {}",
            header.poly_count, poly_len
        )));
    }
    let mut polys = Vec::with_capacity(poly_len);
    for _ in 0..poly_len {
        polys.push(read_poly(&mut r)?);
    }

    let dm_len = r.read_u32::<LittleEndian>()? as usize;
    let mut detail_meshes = Vec::with_capacity(dm_len);
    for _ in 0..dm_len {
        let vert_base = r.read_u32::<LittleEndian>()?;
        let tri_base = r.read_u32::<LittleEndian>()?;
        let vert_count = r.read_u8()?;
        let tri_count = r.read_u8()?;
        detail_meshes.push(PolyDetail {
            vert_base,
            tri_base,
            vert_count,
            tri_count,
        });
    }

    let dv_len = r.read_u32::<LittleEndian>()? as usize;
    let mut detail_verts = Vec::with_capacity(dv_len);
    for _ in 0..dv_len {
        detail_verts.push(r.read_f32::<LittleEndian>()?);
    }
    let dt_len = r.read_u32::<LittleEndian>()? as usize;
    let mut detail_tris = vec![0u8; dt_len];
    r.read_exact(&mut detail_tris)?;

    let bv_len = r.read_u32::<LittleEndian>()? as usize;
    let mut bv_tree = Vec::with_capacity(bv_len);
    for _ in 0..bv_len {
        let mut bmin = [0u16; 3];
        let mut bmax = [0u16; 3];
        for b in &mut bmin {
            *b = r.read_u16::<LittleEndian>()?;
        }
        for b in &mut bmax {
            *b = r.read_u16::<LittleEndian>()?;
        }
        let i = r.read_i32::<LittleEndian>()?;
        bv_tree.push(BVNode { bmin, bmax, i });
    }

    let con_len = r.read_u32::<LittleEndian>()? as usize;
    let mut off_mesh_cons = Vec::with_capacity(con_len);
    for _ in 0..con_len {
        let mut pos = [0.0f32; 6];
        for p in &mut pos {
            *p = r.read_f32::<LittleEndian>()?;
        }
        let radius = r.read_f32::<LittleEndian>()?;
        let snap_height = r.read_f32::<LittleEndian>()?;
        let poly = r.read_u16::<LittleEndian>()?;
        let flags = r.read_u8()?;
        let side = r.read_u8()?;
        let user_id = r.read_u32::<LittleEndian>()?;
        off_mesh_cons.push(OffMeshPointConnection {
            pos,
            radius,
            snap_height,
            poly,
            flags,
            side,
            user_id,
        });
    }

    let seg_len = r.read_u32::<LittleEndian>()? as usize;
    let mut off_mesh_seg_cons = Vec::with_capacity(seg_len);
    for _ in 0..seg_len {
        let start_a = read_vec3(&mut r)?;
        let end_a = read_vec3(&mut r)?;
        let start_b = read_vec3(&mut r)?;
        let end_b = read_vec3(&mut r)?;
        let radius = r.read_f32::<LittleEndian>()?;
        let flags = r.read_u8()?;
        let user_id = r.read_u32::<LittleEndian>()?;
        off_mesh_seg_cons.push(OffMeshSegmentConnection {
            start_a,
            end_a,
            start_b,
            end_b,
            radius,
            first_poly: 0,
            npolys: 0,
            flags,
            user_id,
        });
    }

    let cluster_len = r.read_u32::<LittleEndian>()? as usize;
    let mut clusters = Vec::with_capacity(cluster_len);
    for _ in 0..cluster_len {
        clusters.push(Cluster::new(read_vec3(&mut r)?));
    }
    let pc_len = r.read_u32::<LittleEndian>()? as usize;
    let mut poly_clusters = Vec::with_capacity(pc_len);
    for _ in 0..pc_len {
        poly_clusters.push(r.read_u16::<LittleEndian>()?);
    }

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
        poly_clusters,
    })
}

/// Encodes a tile state snapshot into a standalone blob.
///
/// The snapshot carries only the mutable per-polygon state (flags and
/// area ids) so runtime edits survive a tile reload.
pub fn serialize_tile_state(state: &TileState) -> Result<Vec<u8>> {
    let mut w = Vec::new();
    w.write_u32::<LittleEndian>(TILE_STATE_MAGIC)?;
    w.write_u32::<LittleEndian>(TILE_STATE_VERSION)?;
    w.write_u64::<LittleEndian>(state.tile_ref.0)?;
    w.write_u32::<LittleEndian>(state.flags.len() as u32)?;
    for flags in &state.flags {
        w.write_u16::<LittleEndian>(flags.bits())?;
    }
    for &area in &state.areas {
        w.write_u8(area)?;
    }
    Ok(w)
}

/// Decodes a tile state snapshot.
///
/// Fails with [`Error::WrongMagic`] or [`Error::WrongVersion`] when the
/// stream is not a supported snapshot.
pub fn deserialize_tile_state(bytes: &[u8]) -> Result<TileState> {
    let mut r = Cursor::new(bytes);

    let magic = r.read_u32::<LittleEndian>()?;
    if magic != TILE_STATE_MAGIC {
        return Err(Error::WrongMagic(magic));
    }
    let version = r.read_u32::<LittleEndian>()?;
    if version != TILE_STATE_VERSION {
        return Err(Error::WrongVersion(version));
    }

    let tile_ref = TileRef(r.read_u64::<LittleEndian>()?);
    let count = r.read_u32::<LittleEndian>()? as usize;
    let mut flags = Vec::with_capacity(count);
    for _ in 0..count {
        flags.push(PolyFlags(r.read_u16::<LittleEndian>()?));
    }
    let mut areas = vec![0u8; count];
    r.read_exact(&mut areas)?;

    Ok(TileState {
        tile_ref,
        flags,
        areas,
    })
}

/// Serializes a whole mesh: parameters plus every live tile
pub fn save_nav_mesh(mesh: &NavMesh) -> Result<Vec<u8>> {
    let mut w = Vec::new();
    w.write_u32::<LittleEndian>(MESH_SET_MAGIC)?;
    w.write_u32::<LittleEndian>(MESH_SET_VERSION)?;

    let params = mesh.params();
    write_vec3(&mut w, &params.origin)?;
    w.write_f32::<LittleEndian>(params.tile_width)?;
    w.write_f32::<LittleEndian>(params.tile_height)?;
    w.write_i32::<LittleEndian>(params.max_tiles)?;
    w.write_i32::<LittleEndian>(params.max_polys_per_tile)?;

    let mut tiles = Vec::new();
    for i in 0..mesh.max_tiles() {
        if let Some(tile) = mesh.tile(i) {
            if tile.header.is_some() {
                tiles.push(mesh.export_tile_data(i));
            }
        }
    }
    w.write_u32::<LittleEndian>(tiles.len() as u32)?;
    for data in &tiles {
        let blob = serialize_tile_data(data)?;
        w.write_u32::<LittleEndian>(blob.len() as u32)?;
        w.write_all(&blob)?;
    }
    Ok(w)
}

/// Reconstructs a mesh from [`save_nav_mesh`] output. Tiles are re-linked
/// as they are added, so cross-tile links match a freshly built mesh.
pub fn load_nav_mesh(bytes: &[u8]) -> Result<NavMesh> {
    let mut r = Cursor::new(bytes);

    let magic = r.read_u32::<LittleEndian>()?;
    if magic != MESH_SET_MAGIC {
        return Err(Error::WrongMagic(magic));
    }
    let version = r.read_u32::<LittleEndian>()?;
    if version != MESH_SET_VERSION {
        return Err(Error::WrongVersion(version));
    }

    let params = NavMeshParams {
        origin: read_vec3(&mut r)?,
        tile_width: r.read_f32::<LittleEndian>()?,
        tile_height: r.read_f32::<LittleEndian>()?,
        max_tiles: r.read_i32::<LittleEndian>()?,
        max_polys_per_tile: r.read_i32::<LittleEndian>()?,
    };
    let mut mesh = NavMesh::new(params)
        .map_err(|s| Error::InvalidParams(s.to_string()))?;

    let tile_count = r.read_u32::<LittleEndian>()? as usize;
    let mut offset = r.position() as usize;
    for _ in 0..tile_count {
        let mut rr = Cursor::new(&bytes[offset..]);
        let blob_len = rr.read_u32::<LittleEndian>()? as usize;
        offset += 4;
        if offset + blob_len > bytes.len() {
            return Err(Error::InvalidTileData("truncated tile blob".into()));
        }
        let data = deserialize_tile_data(&bytes[offset..offset + blob_len])?;
        offset += blob_len;
        mesh.add_tile(data)
            .map_err(|s| Error::InvalidTileData(s.to_string()))?;
    }
    Ok(mesh)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_tile_data() -> TileData {
        let params = crate::nav_mesh_builder::TileDataParams {
            verts: vec![
                0.0, 0.0, 0.0, //
                4.0, 0.0, 0.0, //
                4.0, 0.0, 4.0, //
                0.0, 0.0, 4.0,
            ],
            polys: vec![
                0,
                1,
                2,
                3,
                crate::nav_mesh_builder::NULL_IDX,
                crate::nav_mesh_builder::NULL_IDX,
                crate::nav_mesh_builder::NULL_IDX,
                crate::nav_mesh_builder::NULL_IDX,
                crate::nav_mesh_builder::NULL_IDX,
                crate::nav_mesh_builder::NULL_IDX,
                crate::nav_mesh_builder::NULL_IDX,
                crate::nav_mesh_builder::NULL_IDX,
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
        };
        crate::nav_mesh_builder::build_tile_data(&params).unwrap()
    }

    #[test]
    fn tile_round_trip() {
        let data = sample_tile_data();
        let blob = serialize_tile_data(&data).unwrap();
        let back = deserialize_tile_data(&blob).unwrap();

        assert_eq!(back.header.poly_count, data.header.poly_count);
        assert_eq!(back.header.x, data.header.x);
        assert_eq!(back.verts, data.verts);
        assert_eq!(back.polys.len(), data.polys.len());
        assert_eq!(back.polys[0].verts, data.polys[0].verts);
        assert_eq!(back.polys[0].flags, data.polys[0].flags);
        assert_eq!(back.detail_tris, data.detail_tris);
        assert_eq!(back.bv_tree.len(), data.bv_tree.len());
    }

    #[test]
    fn rejects_wrong_magic() {
        let data = sample_tile_data();
        let mut blob = serialize_tile_data(&data).unwrap();
        blob[0] ^= 0xff;
        match deserialize_tile_data(&blob) {
            Err(Error::WrongMagic(_)) => {}
            other => panic!("expected WrongMagic, got {other:?}"),
        }
    }

    #[test]
    fn rejects_wrong_version() {
        let data = sample_tile_data();
        let mut blob = serialize_tile_data(&data).unwrap();
        blob[4] = 0xfe;
        match deserialize_tile_data(&blob) {
            Err(Error::WrongVersion(_)) => {}
            other => panic!("expected WrongVersion, got {other:?}"),
        }
    }

    #[test]
    fn tile_state_round_trip() {
        let state = TileState {
            tile_ref: TileRef(0x42),
            flags: vec![PolyFlags::WALK, PolyFlags(0)],
            areas: vec![1, 7],
        };
        let blob = serialize_tile_state(&state).unwrap();
        let back = deserialize_tile_state(&blob).unwrap();

        assert_eq!(back.tile_ref, state.tile_ref);
        assert_eq!(back.flags, state.flags);
        assert_eq!(back.areas, state.areas);
    }

    #[test]
    fn tile_state_rejects_wrong_magic() {
        let state = TileState {
            tile_ref: TileRef(1),
            flags: vec![PolyFlags::WALK],
            areas: vec![1],
        };
        let mut blob = serialize_tile_state(&state).unwrap();
        blob[0] ^= 0xff;
        match deserialize_tile_state(&blob) {
            Err(Error::WrongMagic(_)) => {}
            other => panic!("expected WrongMagic, got {other:?}"),
        }
    }

    #[test]
    fn wrong_magic_converts_to_status_detail() {
        let err = deserialize_tile_data(&[0u8; 16]).unwrap_err();
        let status: crate::status::Status = err.into();
        assert!(status.is_failure());
        assert!(status.has_detail(crate::status::Status::WRONG_MAGIC));
    }
}
