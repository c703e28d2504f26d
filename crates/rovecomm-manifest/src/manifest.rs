use std::collections::HashMap;
use std::path::Path;

use rovecomm_packet::{DataId, ElementType, PacketHeader};
use serde::Deserialize;
use tracing::info;

use crate::error::{ManifestError, Result};

/// One manifest row: a named data stream with its wire shape.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestEntry {
    pub name: String,
    pub data_id: DataId,
    pub element_type: ElementType,
    pub element_count: u16,
}

/// JSON shape of one entry. Element types are interchanged by name so the
/// manifest stays readable by non-Rust tooling.
#[derive(Deserialize)]
struct RawEntry {
    name: String,
    data_id: DataId,
    element_type: String,
    element_count: u16,
}

impl TryFrom<RawEntry> for ManifestEntry {
    type Error = ManifestError;

    fn try_from(raw: RawEntry) -> Result<Self> {
        let element_type = ElementType::from_name(&raw.element_type).ok_or_else(|| {
            ManifestError::UnknownElementType {
                name: raw.name.clone(),
                element_type: raw.element_type.clone(),
            }
        })?;
        Ok(ManifestEntry {
            name: raw.name,
            data_id: raw.data_id,
            element_type,
            element_count: raw.element_count,
        })
    }
}

/// Lookup table from data identifier to declared wire shape.
///
/// The identifier space is flat; every id maps to at most one entry. The
/// manifest is immutable once built, so shared use needs no locking.
#[derive(Debug)]
pub struct Manifest {
    by_id: HashMap<DataId, ManifestEntry>,
    by_name: HashMap<String, DataId>,
}

impl Manifest {
    /// Build a manifest from entries, rejecting duplicate identifiers.
    pub fn from_entries(entries: impl IntoIterator<Item = ManifestEntry>) -> Result<Self> {
        let mut by_id = HashMap::new();
        let mut by_name = HashMap::new();

        for entry in entries {
            by_name.insert(entry.name.clone(), entry.data_id);
            if by_id.insert(entry.data_id, entry.clone()).is_some() {
                return Err(ManifestError::DuplicateDataId(entry.data_id));
            }
        }

        Ok(Self { by_id, by_name })
    }

    /// Parse a manifest from its JSON representation: an array of
    /// `{name, data_id, element_type, element_count}` objects.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let raw: Vec<RawEntry> = serde_json::from_str(json)?;
        let entries = raw
            .into_iter()
            .map(ManifestEntry::try_from)
            .collect::<Result<Vec<_>>>()?;
        Self::from_entries(entries)
    }

    /// Load a manifest from a JSON file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|source| ManifestError::Load {
            path: path.to_path_buf(),
            source,
        })?;
        let manifest = Self::from_json_str(&json)?;
        info!(path = %path.display(), entries = manifest.len(), "loaded manifest");
        Ok(manifest)
    }

    /// Look up the declared shape of a data identifier.
    pub fn lookup(&self, data_id: DataId) -> Option<&ManifestEntry> {
        self.by_id.get(&data_id)
    }

    /// Resolve a symbolic stream name to its identifier.
    pub fn id_of(&self, name: &str) -> Option<DataId> {
        self.by_name.get(name).copied()
    }

    /// Human-facing name for an identifier.
    pub fn name_of(&self, data_id: DataId) -> Option<&str> {
        self.by_id.get(&data_id).map(|entry| entry.name.as_str())
    }

    /// Strict-mode check: a decoded header must match its manifest entry in
    /// type and count, and the identifier must be known.
    pub fn validate(&self, header: &PacketHeader) -> Result<()> {
        let entry = self
            .lookup(header.data_id)
            .ok_or(ManifestError::UnknownDataId(header.data_id))?;

        if header.element_type != entry.element_type {
            return Err(ManifestError::TypeMismatch {
                data_id: header.data_id,
                expected: entry.element_type,
                actual: header.element_type,
            });
        }
        if header.element_count != entry.element_count {
            return Err(ManifestError::CountMismatch {
                data_id: header.data_id,
                expected: entry.element_count,
                actual: header.element_count,
            });
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }
}
