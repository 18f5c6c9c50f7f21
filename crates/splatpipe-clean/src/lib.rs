#![deny(missing_docs)]
#![doc = env!("CARGO_PKG_DESCRIPTION")]

mod config;
pub use config::*;

/// Camera outlier and point proximity filters.
pub mod filter;

/// Cross-reference reconciliation between images and 3D points.
pub mod reconcile;

mod pipeline;
pub use pipeline::*;
