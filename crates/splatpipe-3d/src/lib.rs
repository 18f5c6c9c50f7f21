#![deny(missing_docs)]
#![doc = env!("CARGO_PKG_DESCRIPTION")]

/// I/O utilities for reading and writing COLMAP and PLY data.
pub mod io;

/// Point cloud table.
pub mod pointcloud;

/// Coordinate convention transforms.
pub mod transforms;
