//! Cluster graph
//!
//! Ground polygons are grouped into clusters at build time. Cluster links
//! form a coarse connectivity graph over tiles that can answer "is there
//! any chance of a path" much faster than polygon-level search. Links are
//! directed; a link stores forward and backward validity flags so a pair
//! of clusters needs only one link per direction of creation.

use crate::nav_mesh::{ClusterRef, NavMesh, PolyRef, PolyType, CLUSTER_LINK_FIRST, NULL_LINK};
use crate::status::{Result, Status};
use crate::{nav_ensure, nav_unwrap};

/// Cluster link is traversable from owner to target
pub const CLUSTER_LINK_VALID_FWD: u8 = 0x01;
/// Cluster link is traversable from target to owner
pub const CLUSTER_LINK_VALID_BCK: u8 = 0x02;
/// Both directions at once, the common case for ground adjacency
pub const CLUSTER_LINK_BCK_AND_FWD: u8 = CLUSTER_LINK_VALID_FWD | CLUSTER_LINK_VALID_BCK;

/// One cluster of ground polygons
#[derive(Debug, Clone)]
#[cfg_attr(
    feature = "serialization",
    derive(serde::Serialize, serde::Deserialize)
)]
pub struct Cluster {
    /// Representative center of the cluster's polygons
    pub center: [f32; 3],
    /// First link in the tile's cluster link pool, or [`NULL_LINK`]
    pub first_link: u32,
}

impl Cluster {
    /// Creates an unlinked cluster
    pub fn new(center: [f32; 3]) -> Self {
        Self {
            center,
            first_link: NULL_LINK,
        }
    }
}

impl Default for Cluster {
    fn default() -> Self {
        Self::new([0.0; 3])
    }
}

/// Directed edge in the cluster graph
#[derive(Debug, Clone)]
#[cfg_attr(
    feature = "serialization",
    derive(serde::Serialize, serde::Deserialize)
)]
pub struct ClusterLink {
    /// Target cluster
    pub target: ClusterRef,
    /// Next link of the owning cluster, or [`NULL_LINK`]
    pub next: u32,
    /// `CLUSTER_LINK_VALID_FWD` / `CLUSTER_LINK_VALID_BCK`
    pub flags: u8,
}

impl NavMesh {
    /// Cluster containing a ground polygon
    pub fn get_poly_cluster(&self, r: PolyRef) -> Result<ClusterRef> {
        nav_ensure!(self.is_valid_poly_ref(r), Status::invalid_param());
        let (_, it, ip) = self.decode_poly_id(r);
        let tile = self.tile_unchecked(it as usize);
        let poly = &tile.polys[ip as usize];
        nav_ensure!(
            poly.poly_type == PolyType::Ground,
            Status::invalid_param()
        );
        nav_ensure!(
            (ip as usize) < tile.poly_clusters.len(),
            Status::invalid_param()
        );
        Ok(ClusterRef(
            (self.cluster_ref_base(it as usize).0) | tile.poly_clusters[ip as usize] as u64,
        ))
    }

    /// Adds (or widens) a cluster link from a cluster in `tile_idx` to
    /// `target`, merging flags with any existing link to the same target
    pub(crate) fn connect_cluster_link(
        &mut self,
        tile_idx: usize,
        cluster_idx: u16,
        target: ClusterRef,
        flags: u8,
    ) {
        let own = ClusterRef(self.cluster_ref_base(tile_idx).0 | cluster_idx as u64);
        if own == target {
            return;
        }
        let tile = self.tile_mut(tile_idx);
        if cluster_idx as usize >= tile.clusters.len() {
            return;
        }

        // Widen an existing link when one already points at the target.
        let mut i = tile.clusters[cluster_idx as usize].first_link;
        while i != NULL_LINK {
            let link = &mut tile.cluster_links[(i - CLUSTER_LINK_FIRST) as usize];
            if link.target == target {
                link.flags |= flags;
                return;
            }
            i = link.next;
        }

        let idx = CLUSTER_LINK_FIRST + tile.cluster_links.len() as u32;
        tile.cluster_links.push(ClusterLink {
            target,
            next: tile.clusters[cluster_idx as usize].first_link,
            flags,
        });
        tile.clusters[cluster_idx as usize].first_link = idx;
    }

    /// Drops every cluster link in `tile_idx` whose target lives in the
    /// tile slot `target_tile`
    pub(crate) fn unconnect_cluster_links(&mut self, tile_idx: usize, target_tile: usize) {
        let target_tile = target_tile as u32;
        // Rebuild the pool without the dead links; chains are per cluster
        // so each cluster is rethreaded from scratch.
        let tile = self.tile_mut(tile_idx);
        let old = std::mem::take(&mut tile.cluster_links);
        let mut owners: Vec<u16> = Vec::with_capacity(old.len());
        for (ci, cluster) in tile.clusters.iter_mut().enumerate() {
            let mut i = cluster.first_link;
            while i != NULL_LINK {
                owners.resize(old.len(), u16::MAX);
                owners[(i - CLUSTER_LINK_FIRST) as usize] = ci as u16;
                i = old[(i - CLUSTER_LINK_FIRST) as usize].next;
            }
            cluster.first_link = NULL_LINK;
        }
        for (li, link) in old.into_iter().enumerate() {
            let link_tile = self.decode_poly_id(PolyRef(link.target.0)).1;
            if link_tile == target_tile {
                continue;
            }
            let owner = owners.get(li).copied().unwrap_or(u16::MAX);
            if owner == u16::MAX {
                continue;
            }
            let tile = self.tile_mut(tile_idx);
            let idx = CLUSTER_LINK_FIRST + tile.cluster_links.len() as u32;
            let mut link = link;
            link.next = tile.clusters[owner as usize].first_link;
            tile.cluster_links.push(link);
            tile.clusters[owner as usize].first_link = idx;
        }
    }

    /// Cluster link targets of a cluster reference, with their flags
    pub fn cluster_links(&self, r: ClusterRef) -> Result<Vec<(ClusterRef, u8)>> {
        nav_ensure!(self.is_valid_cluster_ref(r), Status::invalid_param());
        let (_, it, ic) = self.decode_poly_id(PolyRef(r.0));
        let tile = self.tile_unchecked(it as usize);
        let cluster = nav_unwrap!(tile.clusters.get(ic as usize));
        let mut out = Vec::new();
        let mut i = cluster.first_link;
        while i != NULL_LINK {
            let link = &tile.cluster_links[(i - CLUSTER_LINK_FIRST) as usize];
            out.push((link.target, link.flags));
            i = link.next;
        }
        Ok(out)
    }
}
