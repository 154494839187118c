//! Shared primitives for the tilenav navigation crates
//!
//! This crate provides the math and 2D geometry helpers used by the tile
//! store and query engine, plus the common error type. All geometry works
//! in a Y-up coordinate system; "2D" operations project onto the XZ plane.

pub mod geometry;
pub mod math;

/// 3D vector type used throughout the navigation crates
pub type Vec3 = glam::Vec3;

/// Common error type for tilenav operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Tile payload is malformed or inconsistent
    #[error("Invalid tile data: {0}")]
    InvalidTileData(String),

    /// Tile payload has an unrecognized magic number
    #[error("Wrong magic number: {0:#x}")]
    WrongMagic(u32),

    /// Tile payload version is not supported
    #[error("Wrong format version: {0}")]
    WrongVersion(u32),

    /// Navigation mesh configuration is invalid
    #[error("Invalid navigation mesh parameters: {0}")]
    InvalidParams(String),

    /// Query failed
    #[error("Query error: {0}")]
    Query(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for tilenav operations
pub type Result<T> = std::result::Result<T, Error>;
