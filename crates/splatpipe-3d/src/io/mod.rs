/// Colmap reader and writer module.
pub mod colmap;

/// PLY reader module.
pub mod ply;
