//! Point-cloud data preparation for Gaussian splatting.
//!
//! Re-exports the COLMAP and PLY readers and the COLMAP clean step.

#[doc(inline)]
pub use splatpipe_3d as k3d;

#[doc(inline)]
pub use splatpipe_clean as clean;
