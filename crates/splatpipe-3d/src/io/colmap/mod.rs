mod binary;
mod text;
mod types;
mod writer;

pub use binary::*;
pub use text::*;
pub use types::*;
pub use writer::*;

use std::path::{Path, PathBuf};

/// Error types for the COLMAP module.
#[derive(Debug, thiserror::Error)]
pub enum ColmapError {
    /// Error reading or writing file
    #[error("error reading or writing file")]
    IoError(#[from] std::io::Error),

    /// A text record could not be parsed.
    #[error("{}:{line}: {reason} (line: {content:?})", path.display())]
    ParseError {
        /// File the record was read from.
        path: PathBuf,
        /// 1-based physical line number.
        line: usize,
        /// Raw content of the offending line.
        content: String,
        /// What was wrong with it.
        reason: String,
    },

    /// Unknown camera model id in a binary file.
    #[error("{}: unknown camera model id {model_id}", path.display())]
    UnknownCameraModel {
        /// File the record was read from.
        path: PathBuf,
        /// The model id found.
        model_id: i32,
    },

    /// A binary observation references a negative point id other than the `-1` sentinel.
    #[error("{}: image {image_id} observes invalid point3d id {point3d_id}", path.display())]
    InvalidPoint3dId {
        /// File the record was read from.
        path: PathBuf,
        /// Image holding the observation.
        image_id: u32,
        /// The id found.
        point3d_id: i64,
    },

    /// A binary file ended before the declared number of records was read.
    #[error("{}: truncated binary file, {remaining} records still expected", path.display())]
    Truncated {
        /// File the record was read from.
        path: PathBuf,
        /// Number of records that were still expected.
        remaining: u64,
    },
}

/// On-disk layout of a COLMAP reconstruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColmapFormat {
    /// `cameras.txt`, `images.txt`, `points3D.txt`
    Text,
    /// `cameras.bin`, `images.bin`, `points3D.bin`
    Binary,
}

impl ColmapFormat {
    /// Detect which COLMAP layout a directory holds. Text wins when both are present.
    pub fn detect(dir: impl AsRef<Path>) -> Option<Self> {
        let dir = dir.as_ref();
        let all_exist = |files: [&str; 3]| files.iter().all(|f| dir.join(f).is_file());

        if all_exist(["cameras.txt", "images.txt", "points3D.txt"]) {
            Some(ColmapFormat::Text)
        } else if all_exist(["cameras.bin", "images.bin", "points3D.bin"]) {
            Some(ColmapFormat::Binary)
        } else {
            None
        }
    }

    /// File extension used by this layout.
    pub fn extension(&self) -> &'static str {
        match self {
            ColmapFormat::Text => "txt",
            ColmapFormat::Binary => "bin",
        }
    }
}
