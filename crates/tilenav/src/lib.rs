//! Tiled navigation mesh runtime with pathfinding queries
//!
//! This crate provides the runtime side of a tiled navigation mesh: tiles
//! are built offline (or at load time) from polygon soup, inserted into a
//! mesh that links them to their neighbours, and queried for paths,
//! raycasts and spatial lookups.
//!
//! # Features
//!
//! - **Tiled Mesh**: Add and remove tiles at runtime; polygon references
//!   carry a salt so references to removed tiles go stale safely
//! - **Pathfinding**: Full and sliced A* over the polygon graph with
//!   pluggable cost filters
//! - **Straight Paths**: Funnel-based corridor to waypoint conversion
//! - **Off-Mesh Connections**: Point jumps and segment rails (ledges,
//!   walls) linked into the graph
//! - **Cluster Graph**: Coarse per-tile clusters for cheap reachability
//!   checks before a full path query
//! - **Spatial Queries**: Nearest polygon, raycast, wall probes, random
//!   points and Dijkstra neighbourhood expansions
//! - **Serialization**: Binary tile and mesh-set format for saving and
//!   loading built meshes
//!
//! # Example
//!
//! ```rust,ignore
//! use tilenav::{build_tile_data, NavMesh, NavMeshParams, NavMeshQuery, StandardFilter};
//!
//! let mut nav = NavMesh::new(params)?;
//! nav.add_tile(build_tile_data(&tile_params)?)?;
//!
//! let mut query = NavMeshQuery::new(&nav, 2048)?;
//! let filter = StandardFilter::new();
//!
//! let (start, start_pos) = query.find_nearest_poly(&a, &extents, &filter)?;
//! let (end, end_pos) = query.find_nearest_poly(&b, &extents, &filter)?;
//!
//! let corridor = query.find_path(start, end, &start_pos, &end_pos, &filter, 256)?;
//! let waypoints = query.find_straight_path(&start_pos, &end_pos, &corridor.path, 256, 0)?;
//! ```
//!
//! # Architecture
//!
//! - [`NavMesh`]: Tile storage, reference encoding and link construction
//! - [`NavMeshQuery`]: All queries; borrows the mesh immutably so many
//!   queries can run against one mesh
//! - [`QueryFilter`] / [`StandardFilter`]: Which polygons may be visited
//!   and what traversal costs
//! - [`build_tile_data`]: Turns raw polygons into an insertable tile
//! - [`save_nav_mesh`] / [`load_nav_mesh`]: Binary persistence

pub mod binary_format;
pub mod cluster;
pub mod debug_draw;
pub mod filter;
pub mod link_builder;
pub mod nav_mesh;
pub mod nav_mesh_builder;
pub mod nav_mesh_query;
pub mod node_pool;
pub mod off_mesh;
pub mod sliced_pathfinding;
pub mod status;
pub mod straight_path;
pub mod test_mesh_helpers;

pub use binary_format::*;
pub use cluster::*;
pub use debug_draw::*;
pub use filter::*;
pub use nav_mesh::*;
pub use nav_mesh_builder::*;
pub use nav_mesh_query::*;
pub use node_pool::*;
pub use off_mesh::*;
pub use sliced_pathfinding::*;
pub use status::*;
pub use straight_path::*;

#[cfg(test)]
mod multi_tile_tests;
#[cfg(test)]
mod off_mesh_connection_tests;
#[cfg(test)]
mod path_query_tests;
#[cfg(test)]
mod raycast_wall_tests;
#[cfg(test)]
mod segment_connection_tests;
