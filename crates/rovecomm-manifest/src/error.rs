use std::path::PathBuf;

use rovecomm_packet::{DataId, ElementType};

/// Errors raised while loading a manifest or validating a header against it.
#[derive(Debug, thiserror::Error)]
pub enum ManifestError {
    /// Failed to read a manifest file.
    #[error("failed to load manifest {path}: {source}")]
    Load {
        path: PathBuf,
        source: std::io::Error,
    },

    /// The manifest JSON could not be parsed.
    #[error("manifest parse error: {0}")]
    Parse(#[from] serde_json::Error),

    /// An entry names an element type this implementation does not know.
    #[error("entry {name:?} has unknown element type {element_type:?}")]
    UnknownElementType { name: String, element_type: String },

    /// Two entries claim the same data identifier.
    #[error("duplicate data id {0}")]
    DuplicateDataId(DataId),

    /// A decoded header carries a data identifier absent from the manifest.
    #[error("unknown data id {0}")]
    UnknownDataId(DataId),

    /// A decoded header's element type contradicts the manifest.
    #[error("data id {data_id} expects {expected:?}, wire has {actual:?}")]
    TypeMismatch {
        data_id: DataId,
        expected: ElementType,
        actual: ElementType,
    },

    /// A decoded header's element count contradicts the manifest.
    #[error("data id {data_id} expects {expected} elements, wire has {actual}")]
    CountMismatch {
        data_id: DataId,
        expected: u16,
        actual: u16,
    },
}

pub type Result<T> = std::result::Result<T, ManifestError>;
