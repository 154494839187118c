//! Tiled navigation mesh: data model, reference codec and tile store
//!
//! The mesh owns a fixed-capacity slot array of tiles plus a spatial hash
//! keyed by grid location. Polygon and cluster references are generational
//! handles: a bit-packed (salt, tile index, entity index) triple whose salt
//! must match the tile slot's current salt to be valid. Removing a tile
//! bumps the slot salt, so every reference issued into the removed tile
//! turns stale without any bookkeeping.

use crate::cluster::{Cluster, ClusterLink};
use crate::filter::QueryFilter;
use crate::off_mesh::{OffMeshPointConnection, OffMeshSegmentConnection};
use crate::status::{Result, Status};
use crate::{nav_ensure, nav_unwrap};
use log::{debug, warn};
use tilenav_common::geometry::{
    closest_height_point_triangle, distance_pt_poly_edges_sqr, overlap_bounds,
    overlap_quant_bounds,
};
use tilenav_common::math::{
    clamp, ilog2, next_pow2, opposite_tile_side, vadd, vdist, vdist_sqr, vlerp, vmax, vmin, vsub,
};

/// Maximum vertices per navigation polygon
pub const MAX_VERTS_PER_POLYGON: usize = 6;

/// Sentinel for "no link" in link chains
pub const NULL_LINK: u32 = u32::MAX;

/// Neighbour-table flag marking an edge that crosses the tile border.
/// The low bits then hold the compass side.
pub const EXT_LINK: u16 = 0x8000;

/// Minimum number of salt bits; init fails below this
pub const MIN_SALT_BITS: u32 = 5;

/// Number of distinct area ids
pub const MAX_AREAS: usize = 64;

/// Area id for unwalkable polygons
pub const NULL_AREA: u8 = 0;

/// First index of the per-tile cluster link pool
pub const CLUSTER_LINK_FIRST: u32 = 0x8000_0000;

/// Side value of links internal to a tile
pub const INTERNAL_LINK_SIDE: u8 = 0xff;

/// Mask extracting the compass side from a link `side` field
pub const LINK_SIDE_MASK: u8 = 0x07;

/// Link side flag: link was created for an off-mesh connection
pub const LINK_FLAG_OFFMESH_CON: u8 = 0x40;
/// Link side flag: the off-mesh connection is bidirectional
pub const LINK_FLAG_OFFMESH_CON_BIDIR: u8 = 0x20;
/// Link side flag: traversal direction reserved for backtracking filters
pub const LINK_FLAG_OFFMESH_CON_BACKTRACKER: u8 = 0x10;
/// Link side flag: the off-mesh connection is currently enabled
pub const LINK_FLAG_OFFMESH_CON_ENABLED: u8 = 0x08;
/// Link side flag: both endpoints live in the same tile
pub const CONNECTION_INTERNAL: u8 = 0x80;

/// Polygon flag bitmask
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(
    feature = "serialization",
    derive(serde::Serialize, serde::Deserialize)
)]
pub struct PolyFlags(pub u16);

impl PolyFlags {
    /// Regular walkable surface
    pub const WALK: PolyFlags = PolyFlags(0x01);
    /// Polygon is temporarily disabled
    pub const DISABLED: PolyFlags = PolyFlags(0x10);
    /// All flags set
    pub const ALL: PolyFlags = PolyFlags(0xffff);

    /// No flags set
    pub const fn empty() -> Self {
        PolyFlags(0)
    }

    /// Returns true if no flags are set
    pub const fn is_empty(&self) -> bool {
        self.0 == 0
    }

    /// Returns true if any flag of `other` is set
    pub const fn intersects(&self, other: PolyFlags) -> bool {
        self.0 & other.0 != 0
    }

    /// Raw bits
    pub const fn bits(&self) -> u16 {
        self.0
    }
}

impl std::ops::BitOr for PolyFlags {
    type Output = PolyFlags;
    fn bitor(self, rhs: PolyFlags) -> PolyFlags {
        PolyFlags(self.0 | rhs.0)
    }
}

/// Polygon kind
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(
    feature = "serialization",
    derive(serde::Serialize, serde::Deserialize)
)]
pub enum PolyType {
    /// Part of the walkable surface, has a height-detail triangulation
    Ground,
    /// Two-vertex off-mesh point connection
    OffMeshPoint,
    /// Four-vertex off-mesh segment connection part
    OffMeshSegment,
}

/// Navigation polygon
#[derive(Debug, Clone)]
#[cfg_attr(
    feature = "serialization",
    derive(serde::Serialize, serde::Deserialize)
)]
pub struct Poly {
    /// First link in the tile's link chain, or [`NULL_LINK`]
    pub first_link: u32,
    /// Vertex indices into the tile vertex array
    pub verts: [u16; MAX_VERTS_PER_POLYGON],
    /// Packed neighbour data per edge: 0 = border, `idx + 1` = internal
    /// neighbour, `EXT_LINK | side` = tile boundary edge
    pub neis: [u16; MAX_VERTS_PER_POLYGON],
    /// User flags
    pub flags: PolyFlags,
    /// Number of vertices in use
    pub vert_count: u8,
    /// Area id
    pub area: u8,
    /// Polygon kind
    pub poly_type: PolyType,
}

impl Poly {
    /// Creates an empty ground polygon
    pub fn new(area: u8, poly_type: PolyType, flags: PolyFlags) -> Self {
        Self {
            first_link: NULL_LINK,
            verts: [0; MAX_VERTS_PER_POLYGON],
            neis: [0; MAX_VERTS_PER_POLYGON],
            flags,
            vert_count: 0,
            area,
            poly_type,
        }
    }
}

/// Directed adjacency edge between two polygons
#[derive(Debug, Clone)]
#[cfg_attr(
    feature = "serialization",
    derive(serde::Serialize, serde::Deserialize)
)]
pub struct Link {
    /// Destination polygon
    pub target: PolyRef,
    /// Next link in the owning polygon's chain, or [`NULL_LINK`]
    pub next: u32,
    /// Source polygon edge the link originates from
    pub edge: u8,
    /// Compass side for boundary links, [`INTERNAL_LINK_SIDE`] for
    /// in-tile links, or off-mesh flag bits
    pub side: u8,
    /// Sub-edge range minimum, quantized to 0..=255
    pub bmin: u8,
    /// Sub-edge range maximum, quantized to 0..=255
    pub bmax: u8,
}

impl Link {
    fn empty() -> Self {
        Self {
            target: PolyRef::NULL,
            next: NULL_LINK,
            edge: 0,
            side: 0,
            bmin: 0,
            bmax: 0,
        }
    }
}

/// Height-detail sub-triangulation of one ground polygon
#[derive(Debug, Clone, Default)]
#[cfg_attr(
    feature = "serialization",
    derive(serde::Serialize, serde::Deserialize)
)]
pub struct PolyDetail {
    /// First detail vertex
    pub vert_base: u32,
    /// First detail triangle
    pub tri_base: u32,
    /// Detail vertex count
    pub vert_count: u8,
    /// Detail triangle count
    pub tri_count: u8,
}

/// Bounding-volume tree node with quantized bounds.
/// Leaf nodes store a polygon index in `i`; inner nodes store the negated
/// escape index.
#[derive(Debug, Clone)]
#[cfg_attr(
    feature = "serialization",
    derive(serde::Serialize, serde::Deserialize)
)]
pub struct BVNode {
    /// Quantized minimum bounds
    pub bmin: [u16; 3],
    /// Quantized maximum bounds
    pub bmax: [u16; 3],
    /// Polygon index (leaf) or negated escape index (inner)
    pub i: i32,
}

/// Opaque generational polygon handle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(
    feature = "serialization",
    derive(serde::Serialize, serde::Deserialize)
)]
pub struct PolyRef(pub u64);

impl PolyRef {
    /// The null reference
    pub const NULL: PolyRef = PolyRef(0);

    /// Returns true for the null reference
    pub const fn is_null(&self) -> bool {
        self.0 == 0
    }
}

impl Default for PolyRef {
    fn default() -> Self {
        PolyRef::NULL
    }
}

/// Opaque generational cluster handle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(
    feature = "serialization",
    derive(serde::Serialize, serde::Deserialize)
)]
pub struct ClusterRef(pub u64);

impl ClusterRef {
    /// The null reference
    pub const NULL: ClusterRef = ClusterRef(0);

    /// Returns true for the null reference
    pub const fn is_null(&self) -> bool {
        self.0 == 0
    }
}

/// Opaque generational tile handle (a poly ref with entity index zero)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(
    feature = "serialization",
    derive(serde::Serialize, serde::Deserialize)
)]
pub struct TileRef(pub u64);

impl TileRef {
    /// The null reference
    pub const NULL: TileRef = TileRef(0);

    /// Returns true for the null reference
    pub const fn is_null(&self) -> bool {
        self.0 == 0
    }
}

/// Immutable per-tile metadata
#[derive(Debug, Clone, Default)]
#[cfg_attr(
    feature = "serialization",
    derive(serde::Serialize, serde::Deserialize)
)]
pub struct TileHeader {
    /// Tile grid x coordinate
    pub x: i32,
    /// Tile grid y coordinate
    pub y: i32,
    /// Tile layer
    pub layer: i32,
    /// Opaque user id for the tile
    pub user_id: u32,
    /// Total polygon count (ground + off-mesh)
    pub poly_count: i32,
    /// Vertex count (ground portion of the vertex array)
    pub vert_count: i32,
    /// Capacity of the preallocated link pool
    pub max_link_count: i32,
    /// Detail mesh count
    pub detail_mesh_count: i32,
    /// Detail vertex count
    pub detail_vert_count: i32,
    /// Detail triangle count
    pub detail_tri_count: i32,
    /// BV-tree node count
    pub bv_node_count: i32,
    /// Off-mesh point connection count
    pub off_mesh_con_count: i32,
    /// Index of the first off-mesh point polygon; also the ground poly count
    pub off_mesh_base: i32,
    /// Off-mesh segment connection count
    pub off_mesh_seg_con_count: i32,
    /// Index of the first off-mesh segment polygon slot
    pub off_mesh_seg_poly_base: i32,
    /// Index of the first off-mesh segment vertex slot
    pub off_mesh_seg_vert_base: i32,
    /// Cluster count
    pub cluster_count: i32,
    /// Agent height the tile was built for
    pub walkable_height: f32,
    /// Agent radius the tile was built for
    pub walkable_radius: f32,
    /// Agent climb tolerance used by boundary matching
    pub walkable_climb: f32,
    /// Tile bounds minimum
    pub bmin: [f32; 3],
    /// Tile bounds maximum
    pub bmax: [f32; 3],
    /// BV-tree quantization factor
    pub bv_quant_factor: f32,
}

/// Fully-built tile payload, produced by the builder or decoded from the
/// binary format, consumed by [`NavMesh::add_tile`]
#[derive(Debug, Clone, Default)]
#[cfg_attr(
    feature = "serialization",
    derive(serde::Serialize, serde::Deserialize)
)]
pub struct TileData {
    /// Tile header
    pub header: TileHeader,
    /// Flat vertex array (ground, then off-mesh point, then segment slots)
    pub verts: Vec<f32>,
    /// Polygons (ground, then off-mesh point, then segment slots)
    pub polys: Vec<Poly>,
    /// Detail meshes, one per ground polygon
    pub detail_meshes: Vec<PolyDetail>,
    /// Detail vertices
    pub detail_verts: Vec<f32>,
    /// Detail triangles, 4 bytes each
    pub detail_tris: Vec<u8>,
    /// BV tree nodes
    pub bv_tree: Vec<BVNode>,
    /// Off-mesh point connections
    pub off_mesh_cons: Vec<OffMeshPointConnection>,
    /// Off-mesh segment connections
    pub off_mesh_seg_cons: Vec<OffMeshSegmentConnection>,
    /// Cluster centers
    pub clusters: Vec<Cluster>,
    /// Cluster id per ground polygon
    pub poly_clusters: Vec<u16>,
}

/// One tile of the navigation mesh
#[derive(Debug, Clone, Default)]
#[cfg_attr(
    feature = "serialization",
    derive(serde::Serialize, serde::Deserialize)
)]
pub struct MeshTile {
    /// Slot generation counter
    pub salt: u32,
    /// Header; `None` while the slot is free
    pub header: Option<TileHeader>,
    /// Flat vertex array
    pub verts: Vec<f32>,
    /// Polygons
    pub polys: Vec<Poly>,
    /// Preallocated link pool
    pub links: Vec<Link>,
    /// Head of the free chain inside `links`
    pub links_free_list: u32,
    /// Dynamic link pool for off-mesh links (indices offset by
    /// `header.max_link_count`)
    pub dynamic_links: Vec<Link>,
    /// Head of the free chain inside `dynamic_links`
    pub dynamic_free_list: u32,
    /// Detail meshes
    pub detail_meshes: Vec<PolyDetail>,
    /// Detail vertices
    pub detail_verts: Vec<f32>,
    /// Detail triangles
    pub detail_tris: Vec<u8>,
    /// BV tree
    pub bv_tree: Vec<BVNode>,
    /// Off-mesh point connections
    pub off_mesh_cons: Vec<OffMeshPointConnection>,
    /// Off-mesh segment connections
    pub off_mesh_seg_cons: Vec<OffMeshSegmentConnection>,
    /// Clusters
    pub clusters: Vec<Cluster>,
    /// Cluster id per ground polygon
    pub poly_clusters: Vec<u16>,
    /// Dynamic cluster link pool (indices offset by [`CLUSTER_LINK_FIRST`])
    pub cluster_links: Vec<ClusterLink>,
    /// Free-list / hash-bucket chain, [`NULL_LINK`] terminated
    pub next: u32,
}

impl MeshTile {
    /// Allocates a link from the preallocated pool, falling back to the
    /// dynamic pool when exhausted. Returns the link index.
    pub fn alloc_link(&mut self) -> u32 {
        if self.links_free_list != NULL_LINK {
            let idx = self.links_free_list;
            self.links_free_list = self.links[idx as usize].next;
            return idx;
        }
        // Dynamic pool, indices continue past the preallocated range.
        let base = self.links.len() as u32;
        if self.dynamic_free_list != NULL_LINK {
            let idx = self.dynamic_free_list;
            self.dynamic_free_list = self.dynamic_links[(idx - base) as usize].next;
            return idx;
        }
        self.dynamic_links.push(Link::empty());
        base + (self.dynamic_links.len() as u32 - 1)
    }

    /// Returns a link back to its pool
    pub fn free_link(&mut self, idx: u32) {
        let base = self.links.len() as u32;
        if idx < base {
            self.links[idx as usize].next = self.links_free_list;
            self.links_free_list = idx;
        } else {
            self.dynamic_links[(idx - base) as usize].next = self.dynamic_free_list;
            self.dynamic_free_list = idx;
        }
    }

    /// Resolves a link index against both pools
    pub fn link(&self, idx: u32) -> &Link {
        let base = self.links.len() as u32;
        if idx < base {
            &self.links[idx as usize]
        } else {
            &self.dynamic_links[(idx - base) as usize]
        }
    }

    /// Mutable variant of [`MeshTile::link`]
    pub fn link_mut(&mut self, idx: u32) -> &mut Link {
        let base = self.links.len() as u32;
        if idx < base {
            &mut self.links[idx as usize]
        } else {
            &mut self.dynamic_links[(idx - base) as usize]
        }
    }

    /// Position of a tile vertex
    pub fn vert(&self, idx: u16) -> [f32; 3] {
        let i = idx as usize * 3;
        [self.verts[i], self.verts[i + 1], self.verts[i + 2]]
    }

    /// Writes a tile vertex position
    pub fn set_vert(&mut self, idx: u16, pos: &[f32; 3]) {
        let i = idx as usize * 3;
        self.verts[i..i + 3].copy_from_slice(pos);
    }
}

/// Navigation mesh initialization parameters
#[derive(Debug, Clone)]
#[cfg_attr(
    feature = "serialization",
    derive(serde::Serialize, serde::Deserialize)
)]
pub struct NavMeshParams {
    /// World origin of the tile grid
    pub origin: [f32; 3],
    /// Width of each tile along X
    pub tile_width: f32,
    /// Height of each tile along Z
    pub tile_height: f32,
    /// Maximum number of tile slots
    pub max_tiles: i32,
    /// Maximum polygons in any tile
    pub max_polys_per_tile: i32,
}

/// Snapshot of the mutable per-polygon state of one tile
#[derive(Debug, Clone)]
#[cfg_attr(
    feature = "serialization",
    derive(serde::Serialize, serde::Deserialize)
)]
pub struct TileState {
    /// Reference of the tile the snapshot was taken from
    pub tile_ref: TileRef,
    /// Flags per polygon
    pub flags: Vec<PolyFlags>,
    /// Area id per polygon
    pub areas: Vec<u8>,
}

/// Tiled navigation mesh
#[derive(Debug)]
pub struct NavMesh {
    params: NavMeshParams,
    origin: [f32; 3],
    tile_width: f32,
    tile_height: f32,
    tiles: Vec<MeshTile>,
    /// Hash buckets over (x, y); heads index into `tiles`
    pos_lookup: Vec<u32>,
    lut_mask: u32,
    free_list: u32,
    salt_bits: u32,
    tile_bits: u32,
    poly_bits: u32,
    /// Optional preference ranking of areas for "cheapest area" snapping
    area_cost_order: Option<[u8; MAX_AREAS]>,
}

fn compute_tile_hash(x: i32, y: i32, mask: u32) -> u32 {
    const H1: u32 = 0x8da6b343;
    const H2: u32 = 0xd8163841;
    let n = H1
        .wrapping_mul(x as u32)
        .wrapping_add(H2.wrapping_mul(y as u32));
    n & mask
}

impl NavMesh {
    /// Creates an empty navigation mesh.
    ///
    /// Fails with `INVALID_PARAM` when the configured capacities leave
    /// fewer than [`MIN_SALT_BITS`] bits of salt in the reference encoding.
    pub fn new(params: NavMeshParams) -> Result<Self> {
        if !params.origin.iter().all(|v| v.is_finite()) {
            return Err(Status::invalid_param());
        }
        if params.tile_width <= 0.0 || params.tile_height <= 0.0 {
            return Err(Status::invalid_param());
        }
        if params.max_tiles <= 0 || params.max_polys_per_tile <= 0 {
            return Err(Status::invalid_param());
        }

        let tile_bits = ilog2(next_pow2(params.max_tiles as u32));
        let poly_bits = ilog2(next_pow2(params.max_polys_per_tile as u32));
        // Keep the reference budget at 32 bits so salts stay meaningful
        // under heavy tile churn.
        let salt_bits = 31u32.min(32u32.saturating_sub(tile_bits + poly_bits));
        if salt_bits < MIN_SALT_BITS {
            return Err(Status::invalid_param());
        }

        let max_tiles = params.max_tiles as usize;
        let lut_size = next_pow2((params.max_tiles / 4).max(1) as u32).max(1);
        let lut_mask = lut_size - 1;

        let mut tiles = Vec::with_capacity(max_tiles);
        // Free list runs back to front so the first add lands in slot 0.
        for i in 0..max_tiles {
            let mut tile = MeshTile {
                salt: 1,
                ..MeshTile::default()
            };
            tile.next = if i + 1 < max_tiles {
                (i + 1) as u32
            } else {
                NULL_LINK
            };
            tiles.push(tile);
        }

        Ok(Self {
            origin: params.origin,
            tile_width: params.tile_width,
            tile_height: params.tile_height,
            params,
            tiles,
            pos_lookup: vec![NULL_LINK; lut_size as usize],
            lut_mask,
            free_list: 0,
            salt_bits,
            tile_bits,
            poly_bits,
            area_cost_order: None,
        })
    }

    /// Initialization parameters
    pub fn params(&self) -> &NavMeshParams {
        &self.params
    }

    /// Number of tile slots
    pub fn max_tiles(&self) -> usize {
        self.tiles.len()
    }

    /// World origin of the tile grid
    pub fn origin(&self) -> [f32; 3] {
        self.origin
    }

    // ------------------------------------------------------------------
    // Reference codec

    /// Packs a polygon reference
    #[inline]
    pub fn encode_poly_id(&self, salt: u32, tile_idx: u32, poly_idx: u32) -> PolyRef {
        PolyRef(
            ((salt as u64) << (self.poly_bits + self.tile_bits))
                | ((tile_idx as u64) << self.poly_bits)
                | poly_idx as u64,
        )
    }

    /// Unpacks a polygon reference into (salt, tile index, poly index)
    #[inline]
    pub fn decode_poly_id(&self, r: PolyRef) -> (u32, u32, u32) {
        let salt_mask = (1u64 << self.salt_bits) - 1;
        let tile_mask = (1u64 << self.tile_bits) - 1;
        let poly_mask = (1u64 << self.poly_bits) - 1;
        (
            ((r.0 >> (self.poly_bits + self.tile_bits)) & salt_mask) as u32,
            ((r.0 >> self.poly_bits) & tile_mask) as u32,
            (r.0 & poly_mask) as u32,
        )
    }

    /// Extracts only the polygon index of a reference
    #[inline]
    pub fn decode_poly_id_poly(&self, r: PolyRef) -> u32 {
        (r.0 & ((1u64 << self.poly_bits) - 1)) as u32
    }

    /// Extracts only the tile index of a reference
    #[inline]
    pub fn decode_poly_id_tile(&self, r: PolyRef) -> u32 {
        ((r.0 >> self.poly_bits) & ((1u64 << self.tile_bits) - 1)) as u32
    }

    /// (tile bits, poly bits) of the reference encoding
    pub(crate) fn ref_bits(&self) -> (u32, u32) {
        (self.tile_bits, self.poly_bits)
    }

    /// Base reference of a tile; OR a polygon index to address its polys
    pub fn poly_ref_base(&self, tile_idx: usize) -> PolyRef {
        let salt = self.tiles[tile_idx].salt;
        self.encode_poly_id(salt, tile_idx as u32, 0)
    }

    /// Packs a cluster reference
    #[inline]
    pub fn encode_cluster_id(&self, salt: u32, tile_idx: u32, cluster_idx: u32) -> ClusterRef {
        ClusterRef(
            ((salt as u64) << (self.poly_bits + self.tile_bits))
                | ((tile_idx as u64) << self.poly_bits)
                | cluster_idx as u64,
        )
    }

    /// Extracts only the cluster index of a reference
    #[inline]
    pub fn decode_cluster_id_cluster(&self, r: ClusterRef) -> u32 {
        (r.0 & ((1u64 << self.poly_bits) - 1)) as u32
    }

    /// Base cluster reference of a tile
    pub fn cluster_ref_base(&self, tile_idx: usize) -> ClusterRef {
        let salt = self.tiles[tile_idx].salt;
        self.encode_cluster_id(salt, tile_idx as u32, 0)
    }

    /// Reference of a tile slot
    pub fn tile_ref(&self, tile_idx: usize) -> TileRef {
        if self.tiles[tile_idx].header.is_none() {
            return TileRef::NULL;
        }
        TileRef(self.poly_ref_base(tile_idx).0)
    }

    /// Checks a polygon reference against the live tile set
    pub fn is_valid_poly_ref(&self, r: PolyRef) -> bool {
        if r.is_null() {
            return false;
        }
        let (salt, it, ip) = self.decode_poly_id(r);
        if it as usize >= self.tiles.len() {
            return false;
        }
        let tile = &self.tiles[it as usize];
        match &tile.header {
            Some(header) => tile.salt == salt && (ip as i32) < header.poly_count,
            None => false,
        }
    }

    /// Checks a cluster reference against the live tile set
    pub fn is_valid_cluster_ref(&self, r: ClusterRef) -> bool {
        if r.is_null() {
            return false;
        }
        let (salt, it, ic) = self.decode_poly_id(PolyRef(r.0));
        if it as usize >= self.tiles.len() {
            return false;
        }
        let tile = &self.tiles[it as usize];
        match &tile.header {
            Some(header) => tile.salt == salt && (ic as i32) < header.cluster_count,
            None => false,
        }
    }

    // ------------------------------------------------------------------
    // Tile access

    /// Tile by slot index, if live
    pub fn tile(&self, idx: usize) -> Option<&MeshTile> {
        let tile = self.tiles.get(idx)?;
        tile.header.as_ref()?;
        Some(tile)
    }

    pub(crate) fn tile_unchecked(&self, idx: usize) -> &MeshTile {
        &self.tiles[idx]
    }

    pub(crate) fn tile_mut(&mut self, idx: usize) -> &mut MeshTile {
        &mut self.tiles[idx]
    }

    /// Splits two distinct tile slots into simultaneous mutable borrows
    pub(crate) fn two_tiles_mut(&mut self, a: usize, b: usize) -> (&mut MeshTile, &mut MeshTile) {
        debug_assert!(a != b);
        if a < b {
            let (lo, hi) = self.tiles.split_at_mut(b);
            (&mut lo[a], &mut hi[0])
        } else {
            let (lo, hi) = self.tiles.split_at_mut(a);
            (&mut hi[0], &mut lo[b])
        }
    }

    /// Tile slot index for a tile reference, when live and salt-valid
    pub fn tile_index_by_ref(&self, r: TileRef) -> Option<usize> {
        if r.is_null() {
            return None;
        }
        let (salt, it, _) = self.decode_poly_id(PolyRef(r.0));
        let tile = self.tiles.get(it as usize)?;
        if tile.header.is_none() || tile.salt != salt {
            return None;
        }
        Some(it as usize)
    }

    /// Tile by reference
    pub fn tile_by_ref(&self, r: TileRef) -> Option<&MeshTile> {
        self.tile_index_by_ref(r).map(|i| &self.tiles[i])
    }

    /// Grid location containing a world position
    pub fn calc_tile_loc(&self, pos: &[f32; 3]) -> (i32, i32) {
        (
            ((pos[0] - self.origin[0]) / self.tile_width).floor() as i32,
            ((pos[2] - self.origin[2]) / self.tile_height).floor() as i32,
        )
    }

    /// Tile at an exact grid location and layer
    pub fn tile_at(&self, x: i32, y: i32, layer: i32) -> Option<&MeshTile> {
        self.tile_index_at(x, y, layer).map(|i| &self.tiles[i])
    }

    pub(crate) fn tile_index_at(&self, x: i32, y: i32, layer: i32) -> Option<usize> {
        let mut i = self.pos_lookup[compute_tile_hash(x, y, self.lut_mask) as usize];
        while i != NULL_LINK {
            let tile = &self.tiles[i as usize];
            if let Some(h) = &tile.header {
                if h.x == x && h.y == y && h.layer == layer {
                    return Some(i as usize);
                }
            }
            i = tile.next;
        }
        None
    }

    /// Slot indices of all layered tiles at a grid location
    pub fn tile_indices_at(&self, x: i32, y: i32) -> Vec<usize> {
        let mut out = Vec::new();
        let mut i = self.pos_lookup[compute_tile_hash(x, y, self.lut_mask) as usize];
        while i != NULL_LINK {
            let tile = &self.tiles[i as usize];
            if let Some(h) = &tile.header {
                if h.x == x && h.y == y {
                    out.push(i as usize);
                }
            }
            i = tile.next;
        }
        out
    }

    /// All layered tiles at a grid location
    pub fn tiles_at(&self, x: i32, y: i32) -> Vec<&MeshTile> {
        self.tile_indices_at(x, y)
            .into_iter()
            .map(|i| &self.tiles[i])
            .collect()
    }

    /// Slot indices of tiles bordering side `side` of grid cell (x, y)
    pub(crate) fn neighbour_tile_indices(&self, x: i32, y: i32, side: u8) -> Vec<usize> {
        let (nx, ny) = match side {
            0 => (x + 1, y),
            1 => (x + 1, y + 1),
            2 => (x, y + 1),
            3 => (x - 1, y + 1),
            4 => (x - 1, y),
            5 => (x - 1, y - 1),
            6 => (x, y - 1),
            7 => (x + 1, y - 1),
            _ => (x, y),
        };
        self.tile_indices_at(nx, ny)
    }

    /// Resolves a polygon reference into its tile and polygon
    pub fn tile_and_poly_by_ref(&self, r: PolyRef) -> Option<(&MeshTile, &Poly)> {
        if !self.is_valid_poly_ref(r) {
            return None;
        }
        let (_, it, ip) = self.decode_poly_id(r);
        let tile = &self.tiles[it as usize];
        Some((tile, &tile.polys[ip as usize]))
    }

    /// Resolves a reference assumed valid (callers on hot paths that have
    /// already validated the input)
    pub fn tile_and_poly_by_ref_unchecked(&self, r: PolyRef) -> (&MeshTile, &Poly) {
        let (_, it, ip) = self.decode_poly_id(r);
        let tile = &self.tiles[it as usize];
        (tile, &tile.polys[ip as usize])
    }

    // ------------------------------------------------------------------
    // Tile lifecycle

    /// Adds a built tile to the mesh and links it to its neighbours.
    ///
    /// Fails with `ALREADY_OCCUPIED` when the grid cell and layer already
    /// hold a live tile, and `OUT_OF_MEMORY` when no slot is free.
    pub fn add_tile(&mut self, data: TileData) -> Result<TileRef> {
        let header = &data.header;
        if header.poly_count > self.params.max_polys_per_tile
            || header.poly_count as usize != data.polys.len()
            || header.vert_count < 0
        {
            return Err(Status::invalid_param());
        }
        if self
            .tile_index_at(header.x, header.y, header.layer)
            .is_some()
        {
            return Err(Status::failure_detail(Status::ALREADY_OCCUPIED));
        }

        // Take a slot from the free list.
        if self.free_list == NULL_LINK {
            return Err(Status::failure_detail(Status::OUT_OF_MEMORY));
        }
        let tile_idx = self.free_list as usize;
        self.free_list = self.tiles[tile_idx].next;

        let (x, y, layer) = (header.x, header.y, header.layer);

        {
            let salt = self.tiles[tile_idx].salt;
            let tile = &mut self.tiles[tile_idx];
            let max_links = data.header.max_link_count.max(0) as usize;

            let mut links = vec![Link::empty(); max_links];
            for (i, link) in links.iter_mut().enumerate() {
                link.next = if i + 1 < max_links {
                    (i + 1) as u32
                } else {
                    NULL_LINK
                };
            }

            *tile = MeshTile {
                salt,
                header: Some(data.header),
                verts: data.verts,
                polys: data.polys,
                links,
                links_free_list: if max_links > 0 { 0 } else { NULL_LINK },
                dynamic_links: Vec::new(),
                dynamic_free_list: NULL_LINK,
                detail_meshes: data.detail_meshes,
                detail_verts: data.detail_verts,
                detail_tris: data.detail_tris,
                bv_tree: data.bv_tree,
                off_mesh_cons: data.off_mesh_cons,
                off_mesh_seg_cons: data.off_mesh_seg_cons,
                clusters: data.clusters,
                poly_clusters: data.poly_clusters,
                cluster_links: Vec::new(),
                next: NULL_LINK,
            };
        }

        // Insert into the position lookup.
        let bucket = compute_tile_hash(x, y, self.lut_mask) as usize;
        self.tiles[tile_idx].next = self.pos_lookup[bucket];
        self.pos_lookup[bucket] = tile_idx as u32;

        self.connect_int_links(tile_idx);
        self.base_off_mesh_links(tile_idx);
        // Far endpoints that stay inside the tile.
        self.connect_ext_off_mesh_links(tile_idx, tile_idx, -1);

        // Connect to layered tiles in the same cell, then the 8 compass
        // neighbours, both directions each.
        for nei in self.tile_indices_at(x, y) {
            if nei == tile_idx {
                continue;
            }
            self.connect_ext_links(tile_idx, nei, -1);
            self.connect_ext_links(nei, tile_idx, -1);
            self.connect_ext_off_mesh_links(tile_idx, nei, -1);
            self.connect_ext_off_mesh_links(nei, tile_idx, -1);
        }
        for side in 0..8u8 {
            for nei in self.neighbour_tile_indices(x, y, side) {
                self.connect_ext_links(tile_idx, nei, side as i32);
                self.connect_ext_links(nei, tile_idx, opposite_tile_side(side) as i32);
                self.connect_ext_off_mesh_links(tile_idx, nei, side as i32);
                self.connect_ext_off_mesh_links(nei, tile_idx, opposite_tile_side(side) as i32);
            }
        }

        // Segment connections can span several tiles; link the new tile's
        // own segments and retry any neighbour segments left unattached.
        self.create_off_mesh_segment_links(tile_idx);
        let mut retry = Vec::new();
        for side in 0..8u8 {
            for nei in self.neighbour_tile_indices(x, y, side) {
                if self.tiles[nei]
                    .off_mesh_seg_cons
                    .iter()
                    .any(|c| c.npolys == 0)
                {
                    retry.push(nei);
                }
            }
        }
        for nei in retry {
            self.create_off_mesh_segment_links(nei);
        }

        debug!(
            "added tile ({}, {}, layer {}) into slot {}",
            x, y, layer, tile_idx
        );

        Ok(self.tile_ref(tile_idx))
    }

    /// Removes a tile, invalidating every reference into it.
    ///
    /// Returns the tile's payload so callers may re-add or persist it.
    pub fn remove_tile(&mut self, r: TileRef) -> Result<TileData> {
        let tile_idx = nav_unwrap!(self.tile_index_by_ref(r));
        let (x, y) = {
            let h = nav_unwrap!(self.tiles[tile_idx].header.as_ref());
            (h.x, h.y)
        };

        // Remove from the position lookup bucket chain.
        let bucket = compute_tile_hash(x, y, self.lut_mask) as usize;
        let mut prev = NULL_LINK;
        let mut cur = self.pos_lookup[bucket];
        while cur != NULL_LINK {
            if cur as usize == tile_idx {
                if prev == NULL_LINK {
                    self.pos_lookup[bucket] = self.tiles[cur as usize].next;
                } else {
                    self.tiles[prev as usize].next = self.tiles[cur as usize].next;
                }
                break;
            }
            prev = cur;
            cur = self.tiles[cur as usize].next;
        }

        // Unlink neighbours pointing into this tile.
        for nei in self.tile_indices_at(x, y) {
            if nei != tile_idx {
                self.unconnect_ext_links(nei, tile_idx);
            }
        }
        for side in 0..8u8 {
            for nei in self.neighbour_tile_indices(x, y, side) {
                self.unconnect_ext_links(nei, tile_idx);
            }
        }

        let tile = &mut self.tiles[tile_idx];
        let header = tile.header.take().unwrap_or_default();
        let removed_layer = header.layer;
        let mut data = TileData {
            header,
            verts: std::mem::take(&mut tile.verts),
            polys: std::mem::take(&mut tile.polys),
            detail_meshes: std::mem::take(&mut tile.detail_meshes),
            detail_verts: std::mem::take(&mut tile.detail_verts),
            detail_tris: std::mem::take(&mut tile.detail_tris),
            bv_tree: std::mem::take(&mut tile.bv_tree),
            off_mesh_cons: std::mem::take(&mut tile.off_mesh_cons),
            off_mesh_seg_cons: std::mem::take(&mut tile.off_mesh_seg_cons),
            clusters: std::mem::take(&mut tile.clusters),
            poly_clusters: std::mem::take(&mut tile.poly_clusters),
        };
        tile.links = Vec::new();
        tile.links_free_list = NULL_LINK;
        tile.dynamic_links = Vec::new();
        tile.dynamic_free_list = NULL_LINK;
        tile.cluster_links = Vec::new();

        // Reset link state so the payload can be re-added cleanly.
        for poly in &mut data.polys {
            poly.first_link = NULL_LINK;
        }
        for con in &mut data.off_mesh_seg_cons {
            con.first_poly = 0;
            con.npolys = 0;
        }
        for cluster in &mut data.clusters {
            cluster.first_link = NULL_LINK;
        }

        // Bump the slot salt so outstanding references go stale.
        tile.salt = (tile.salt + 1) & ((1u32 << self.salt_bits) - 1);
        if tile.salt == 0 {
            tile.salt = 1;
        }

        tile.next = self.free_list;
        self.free_list = tile_idx as u32;

        debug!(
            "removed tile ({}, {}, layer {}) from slot {}",
            x, y, removed_layer, tile_idx
        );

        Ok(data)
    }

    // ------------------------------------------------------------------
    // Mutable per-polygon state

    /// Sets the flags of a polygon
    pub fn set_poly_flags(&mut self, r: PolyRef, flags: PolyFlags) -> Result<()> {
        nav_ensure!(self.is_valid_poly_ref(r), Status::invalid_param());
        let (_, it, ip) = self.decode_poly_id(r);
        self.tiles[it as usize].polys[ip as usize].flags = flags;
        Ok(())
    }

    /// Flags of a polygon
    pub fn poly_flags(&self, r: PolyRef) -> Result<PolyFlags> {
        let (_, poly) = nav_unwrap!(self.tile_and_poly_by_ref(r));
        Ok(poly.flags)
    }

    /// Sets the area id of a polygon
    pub fn set_poly_area(&mut self, r: PolyRef, area: u8) -> Result<()> {
        nav_ensure!(self.is_valid_poly_ref(r), Status::invalid_param());
        let (_, it, ip) = self.decode_poly_id(r);
        self.tiles[it as usize].polys[ip as usize].area = area;
        Ok(())
    }

    /// Area id of a polygon
    pub fn poly_area(&self, r: PolyRef) -> Result<u8> {
        let (_, poly) = nav_unwrap!(self.tile_and_poly_by_ref(r));
        Ok(poly.area)
    }

    /// Captures the mutable per-polygon state of a tile
    pub fn store_tile_state(&self, r: TileRef) -> Result<TileState> {
        let idx = nav_unwrap!(self.tile_index_by_ref(r));
        let tile = &self.tiles[idx];
        Ok(TileState {
            tile_ref: r,
            flags: tile.polys.iter().map(|p| p.flags).collect(),
            areas: tile.polys.iter().map(|p| p.area).collect(),
        })
    }

    /// Restores a previously captured tile state.
    ///
    /// Fails when the snapshot's tile reference no longer resolves (the
    /// tile was removed and the slot reused) or the poly count changed.
    pub fn restore_tile_state(&mut self, state: &TileState) -> Result<()> {
        let idx = nav_unwrap!(self.tile_index_by_ref(state.tile_ref));
        let tile = &mut self.tiles[idx];
        if tile.polys.len() != state.flags.len() || tile.polys.len() != state.areas.len() {
            return Err(Status::invalid_param());
        }
        for (i, poly) in tile.polys.iter_mut().enumerate() {
            poly.flags = state.flags[i];
            poly.area = state.areas[i];
        }
        Ok(())
    }

    /// Snapshot of a live tile as a payload that can be serialized or
    /// added to another mesh. Link and connection state is reset so the
    /// tile relinks cleanly on add.
    pub fn export_tile_data(&self, idx: usize) -> TileData {
        let tile = &self.tiles[idx];
        let mut data = TileData {
            header: tile.header.clone().unwrap_or_default(),
            verts: tile.verts.clone(),
            polys: tile.polys.clone(),
            detail_meshes: tile.detail_meshes.clone(),
            detail_verts: tile.detail_verts.clone(),
            detail_tris: tile.detail_tris.clone(),
            bv_tree: tile.bv_tree.clone(),
            off_mesh_cons: tile.off_mesh_cons.clone(),
            off_mesh_seg_cons: tile.off_mesh_seg_cons.clone(),
            clusters: tile.clusters.clone(),
            poly_clusters: tile.poly_clusters.clone(),
        };
        for poly in &mut data.polys {
            poly.first_link = NULL_LINK;
        }
        for con in &mut data.off_mesh_seg_cons {
            con.first_poly = 0;
            con.npolys = 0;
        }
        for cluster in &mut data.clusters {
            cluster.first_link = NULL_LINK;
        }
        data
    }

    /// Ranks areas for the "cheapest area" off-mesh snapping mode; lower
    /// rank wins
    pub fn apply_area_cost_order(&mut self, order: [u8; MAX_AREAS]) {
        self.area_cost_order = Some(order);
    }

    pub(crate) fn area_cost_order(&self) -> Option<&[u8; MAX_AREAS]> {
        self.area_cost_order.as_ref()
    }

    /// Shifts the whole mesh, including off-mesh endpoints, by `offset`
    pub fn apply_world_offset(&mut self, offset: &[f32; 3]) {
        self.origin = vadd(&self.origin, offset);
        self.params.origin = self.origin;
        for tile in &mut self.tiles {
            if tile.header.is_none() {
                continue;
            }
            for v in tile.verts.chunks_exact_mut(3) {
                v[0] += offset[0];
                v[1] += offset[1];
                v[2] += offset[2];
            }
            for v in tile.detail_verts.chunks_exact_mut(3) {
                v[0] += offset[0];
                v[1] += offset[1];
                v[2] += offset[2];
            }
            if let Some(h) = tile.header.as_mut() {
                h.bmin = vadd(&h.bmin, offset);
                h.bmax = vadd(&h.bmax, offset);
            }
            for con in &mut tile.off_mesh_cons {
                for i in 0..3 {
                    con.pos[i] += offset[i];
                    con.pos[i + 3] += offset[i];
                }
            }
            for con in &mut tile.off_mesh_seg_cons {
                con.start_a = vadd(&con.start_a, offset);
                con.end_a = vadd(&con.end_a, offset);
                con.start_b = vadd(&con.start_b, offset);
                con.end_b = vadd(&con.end_b, offset);
            }
            for cluster in &mut tile.clusters {
                cluster.center = vadd(&cluster.center, offset);
            }
        }
        warn!("applied world offset {:?}", offset);
    }

    // ------------------------------------------------------------------
    // Tile-local queries (used by the link builder and the query engine)

    /// Polygons of one tile whose bounds overlap a query box
    pub fn query_polygons_in_tile<F>(
        &self,
        tile_idx: usize,
        qmin: &[f32; 3],
        qmax: &[f32; 3],
        filter: &F,
        out: &mut Vec<PolyRef>,
        max_polys: usize,
    ) where
        F: QueryFilter + ?Sized,
    {
        let tile = &self.tiles[tile_idx];
        let header = match &tile.header {
            Some(h) => h,
            None => return,
        };
        if !overlap_bounds(qmin, qmax, &header.bmin, &header.bmax) {
            return;
        }

        let base = self.poly_ref_base(tile_idx);
        if !tile.bv_tree.is_empty() {
            // Quantize the query box into tile-local BV space.
            let tbmin = header.bmin;
            let tbmax = header.bmax;
            let qfac = header.bv_quant_factor;
            let mut bmin = [0u16; 3];
            let mut bmax = [0u16; 3];
            for i in 0..3 {
                let minv = clamp(qmin[i], tbmin[i], tbmax[i]) - tbmin[i];
                let maxv = clamp(qmax[i], tbmin[i], tbmax[i]) - tbmin[i];
                bmin[i] = ((qfac * minv) as u16) & 0xfffe;
                bmax[i] = ((qfac * maxv + 1.0) as u16) | 1;
            }

            let mut node = 0usize;
            let end = header.bv_node_count as usize;
            while node < end {
                let n = &tile.bv_tree[node];
                let overlap = overlap_quant_bounds(&bmin, &bmax, &n.bmin, &n.bmax);
                let is_leaf = n.i >= 0;
                if is_leaf && overlap {
                    let r = PolyRef(base.0 | n.i as u64);
                    if filter.pass_filter(r, tile, &tile.polys[n.i as usize])
                        && out.len() < max_polys
                    {
                        out.push(r);
                    }
                }
                if overlap || is_leaf {
                    node += 1;
                } else {
                    node += (-n.i) as usize;
                }
            }
        } else {
            for (i, p) in tile.polys.iter().enumerate() {
                if p.poly_type != PolyType::Ground {
                    continue;
                }
                let r = PolyRef(base.0 | i as u64);
                if !filter.pass_filter(r, tile, p) {
                    continue;
                }
                let mut pbmin = tile.vert(p.verts[0]);
                let mut pbmax = pbmin;
                for j in 1..p.vert_count as usize {
                    let v = tile.vert(p.verts[j]);
                    vmin(&mut pbmin, &v);
                    vmax(&mut pbmax, &v);
                }
                if overlap_bounds(qmin, qmax, &pbmin, &pbmax) && out.len() < max_polys {
                    out.push(r);
                }
            }
        }
    }

    /// Closest point on a polygon, using the detail mesh for height
    pub fn closest_point_on_poly_in_tile(
        &self,
        tile: &MeshTile,
        poly_idx: usize,
        pos: &[f32; 3],
    ) -> [f32; 3] {
        let poly = &tile.polys[poly_idx];

        // Off-mesh point connections have no surface to project onto.
        if poly.poly_type == PolyType::OffMeshPoint {
            let v0 = tile.vert(poly.verts[0]);
            let v1 = tile.vert(poly.verts[1]);
            let d0 = vdist(pos, &v0);
            let d1 = vdist(pos, &v1);
            let u = d0 / (d0 + d1).max(1e-6);
            return vlerp(&v0, &v1, u);
        }

        let nv = poly.vert_count as usize;
        let mut verts = [0.0f32; MAX_VERTS_PER_POLYGON * 3];
        for i in 0..nv {
            let v = tile.vert(poly.verts[i]);
            verts[i * 3..i * 3 + 3].copy_from_slice(&v);
        }

        let mut closest = *pos;
        let mut edged = [0.0f32; MAX_VERTS_PER_POLYGON];
        let mut edget = [0.0f32; MAX_VERTS_PER_POLYGON];
        if !distance_pt_poly_edges_sqr(pos, &verts[..nv * 3], nv, &mut edged, &mut edget) {
            // Outside: clamp to the nearest edge.
            let mut dmin = f32::MAX;
            let mut imin = 0usize;
            for i in 0..nv {
                if edged[i] < dmin {
                    dmin = edged[i];
                    imin = i;
                }
            }
            let va = [
                verts[imin * 3],
                verts[imin * 3 + 1],
                verts[imin * 3 + 2],
            ];
            let j = (imin + 1) % nv;
            let vb = [verts[j * 3], verts[j * 3 + 1], verts[j * 3 + 2]];
            closest = vlerp(&va, &vb, edget[imin]);
        }

        if poly.poly_type == PolyType::Ground {
            if let Some(h) = self.poly_height_in_tile(tile, poly_idx, &closest) {
                closest[1] = h;
            }
        } else if nv >= 4 {
            // Segment parts are two triangles of their quad.
            let v = |i: usize| -> [f32; 3] {
                [verts[i * 3], verts[i * 3 + 1], verts[i * 3 + 2]]
            };
            if let Some(h) = closest_height_point_triangle(&closest, &v(0), &v(2), &v(1)) {
                closest[1] = h;
            } else if let Some(h) = closest_height_point_triangle(&closest, &v(1), &v(2), &v(3)) {
                closest[1] = h;
            }
        }

        closest
    }

    /// Surface height of a ground polygon at an XZ position
    pub fn poly_height_in_tile(
        &self,
        tile: &MeshTile,
        poly_idx: usize,
        pos: &[f32; 3],
    ) -> Option<f32> {
        let poly = &tile.polys[poly_idx];
        let pd = tile.detail_meshes.get(poly_idx)?;
        for j in 0..pd.tri_count as usize {
            let t = &tile.detail_tris[(pd.tri_base as usize + j) * 4..];
            let mut v = [[0.0f32; 3]; 3];
            for k in 0..3 {
                if (t[k] as usize) < poly.vert_count as usize {
                    v[k] = tile.vert(poly.verts[t[k] as usize]);
                } else {
                    let di = pd.vert_base as usize + (t[k] as usize - poly.vert_count as usize);
                    v[k] = [
                        tile.detail_verts[di * 3],
                        tile.detail_verts[di * 3 + 1],
                        tile.detail_verts[di * 3 + 2],
                    ];
                }
            }
            if let Some(h) = closest_height_point_triangle(pos, &v[0], &v[1], &v[2]) {
                return Some(h);
            }
        }
        None
    }

    /// Nearest polygon to a point within a tile-local search box
    pub fn find_nearest_poly_in_tile<F>(
        &self,
        tile_idx: usize,
        center: &[f32; 3],
        extents: &[f32; 3],
        filter: &F,
    ) -> (PolyRef, [f32; 3])
    where
        F: QueryFilter + ?Sized,
    {
        let bmin = vsub(center, extents);
        let bmax = vadd(center, extents);

        let mut polys = Vec::new();
        self.query_polygons_in_tile(tile_idx, &bmin, &bmax, filter, &mut polys, 128);

        let tile = &self.tiles[tile_idx];
        let mut nearest = PolyRef::NULL;
        let mut nearest_pt = *center;
        let mut nearest_dist = f32::MAX;
        for r in polys {
            let ip = self.decode_poly_id_poly(r) as usize;
            let pt = self.closest_point_on_poly_in_tile(tile, ip, center);
            let d = vdist_sqr(center, &pt);
            if d < nearest_dist {
                nearest_dist = d;
                nearest_pt = pt;
                nearest = r;
            }
        }
        (nearest, nearest_pt)
    }

    /// Like [`NavMesh::find_nearest_poly_in_tile`] but preferring the
    /// cheapest area rank set by [`NavMesh::apply_area_cost_order`],
    /// breaking ties by distance
    pub fn find_cheapest_near_poly_in_tile<F>(
        &self,
        tile_idx: usize,
        center: &[f32; 3],
        extents: &[f32; 3],
        filter: &F,
    ) -> (PolyRef, [f32; 3])
    where
        F: QueryFilter + ?Sized,
    {
        let order = match self.area_cost_order {
            Some(ref o) => o,
            None => return self.find_nearest_poly_in_tile(tile_idx, center, extents, filter),
        };

        let bmin = vsub(center, extents);
        let bmax = vadd(center, extents);
        let mut polys = Vec::new();
        self.query_polygons_in_tile(tile_idx, &bmin, &bmax, filter, &mut polys, 128);

        let tile = &self.tiles[tile_idx];
        let mut best = PolyRef::NULL;
        let mut best_pt = *center;
        let mut best_rank = u8::MAX;
        let mut best_dist = f32::MAX;
        for r in polys {
            let ip = self.decode_poly_id_poly(r) as usize;
            let rank = order[(tile.polys[ip].area as usize) % MAX_AREAS];
            let pt = self.closest_point_on_poly_in_tile(tile, ip, center);
            let d = vdist_sqr(center, &pt);
            if rank < best_rank || (rank == best_rank && d < best_dist) {
                best_rank = rank;
                best_dist = d;
                best_pt = pt;
                best = r;
            }
        }
        (best, best_pt)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params() -> NavMeshParams {
        NavMeshParams {
            origin: [0.0, 0.0, 0.0],
            tile_width: 10.0,
            tile_height: 10.0,
            max_tiles: 32,
            max_polys_per_tile: 128,
        }
    }

    #[test]
    fn ref_codec_round_trip() {
        let mesh = NavMesh::new(params()).unwrap();
        let r = mesh.encode_poly_id(7, 3, 42);
        assert_eq!(mesh.decode_poly_id(r), (7, 3, 42));
        assert_eq!(mesh.decode_poly_id_poly(r), 42);
        assert_eq!(mesh.decode_poly_id_tile(r), 3);
    }

    #[test]
    fn init_rejects_salt_starvation() {
        // 2^20 tiles x 2^12 polys leaves no salt bits in a 32-bit budget.
        let p = NavMeshParams {
            origin: [0.0, 0.0, 0.0],
            tile_width: 10.0,
            tile_height: 10.0,
            max_tiles: 1 << 20,
            max_polys_per_tile: 1 << 12,
        };
        let err = NavMesh::new(p).unwrap_err();
        assert!(err.has_detail(Status::INVALID_PARAM));
    }

    #[test]
    fn init_rejects_bad_dimensions() {
        let mut p = params();
        p.tile_width = 0.0;
        assert!(NavMesh::new(p).is_err());

        let mut p = params();
        p.origin[1] = f32::NAN;
        assert!(NavMesh::new(p).is_err());
    }

    #[test]
    fn null_ref_is_invalid() {
        let mesh = NavMesh::new(params()).unwrap();
        assert!(!mesh.is_valid_poly_ref(PolyRef::NULL));
        assert!(!mesh.is_valid_poly_ref(mesh.encode_poly_id(1, 0, 0)));
    }

    #[test]
    fn tile_loc_from_position() {
        let mesh = NavMesh::new(params()).unwrap();
        assert_eq!(mesh.calc_tile_loc(&[5.0, 0.0, 5.0]), (0, 0));
        assert_eq!(mesh.calc_tile_loc(&[15.0, 0.0, -5.0]), (1, -1));
    }
}
