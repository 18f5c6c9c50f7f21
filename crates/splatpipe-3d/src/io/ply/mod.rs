mod parser;
mod properties;

pub use parser::*;
pub use properties::*;

/// Error types for the PLY module.
///
/// Everything except `Io` means the file itself is malformed.
#[derive(Debug, thiserror::Error)]
pub enum PlyError {
    /// Failed to read PLY file
    #[error("Failed to read PLY file")]
    Io(#[from] std::io::Error),

    /// Failed to deserialize a vertex row
    #[error("Failed to deserialize PLY vertex")]
    Deserialize(#[from] bincode::error::DecodeError),

    /// The first line is not `ply`
    #[error("Not a PLY file: missing `ply` magic line")]
    MissingMagic,

    /// No `end_header` within the scan budget
    #[error("PLY header not terminated by `end_header` within {limit} bytes")]
    UnterminatedHeader {
        /// Maximum number of header bytes scanned.
        limit: u64,
    },

    /// Missing or non-binary `format` line
    #[error("Unsupported PLY format: {0}")]
    UnsupportedFormat(String),

    /// Unknown scalar type name in a `property` line
    #[error("Unknown PLY property type: {0}")]
    UnknownPropertyType(String),

    /// `property list` inside the vertex element
    #[error("Unsupported list property in vertex element: {0}")]
    UnsupportedListProperty(String),

    /// No `element vertex` declaration
    #[error("PLY header declares no vertex element")]
    MissingVertexElement,

    /// Another element precedes the vertex element
    #[error("PLY vertex element must be declared first, found `{0}` before it")]
    VertexElementNotFirst(String),

    /// Vertex element without a position coordinate
    #[error("PLY vertex element has no `{0}` property")]
    MissingPositionProperty(String),

    /// Header line that cannot be understood
    #[error("Malformed PLY header line {line}: {content:?}")]
    MalformedHeaderLine {
        /// 1-based header line number.
        line: usize,
        /// Raw line content.
        content: String,
    },

    /// Declared vertex payload exceeds the remaining stream
    #[error("PLY header declares {expected} payload bytes but only {available} are available")]
    PayloadTooLarge {
        /// Bytes implied by the header.
        expected: u64,
        /// Bytes left after the header.
        available: u64,
    },
}
