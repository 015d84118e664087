// Genotype matrix data models

use genobank_common::{MatrixFormat, MemberKind, Orientation};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

// ============================================================================
// Header directives
// ============================================================================

pub const DIRECTIVE_DATASET: &str = "dataset";
pub const DIRECTIVE_MAP: &str = "map";
pub const DIRECTIVE_MARKER_TYPE: &str = "markerType";

/// Marker technology label used when the file does not name one
pub const DEFAULT_MARKER_TYPE: &str = "UNKNOWN";

/// Canonical spelling of a directive key, if it is one we recognise
pub fn canonical_directive(key: &str) -> Option<&'static str> {
    [DIRECTIVE_DATASET, DIRECTIVE_MAP, DIRECTIVE_MARKER_TYPE]
        .into_iter()
        .find(|known| known.eq_ignore_ascii_case(key))
}

// ============================================================================
// Matrix descriptor
// ============================================================================

/// Everything about a matrix file except the allele calls themselves
///
/// Built fresh for every parse. `chromosomes` and `positions` are either both
/// empty or both as long as `markers` in a file that passed validation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatrixDescriptor {
    pub format: MatrixFormat,
    /// Marker names in column (flat) or row (Hapmap) order
    pub markers: Vec<String>,
    pub chromosomes: Vec<String>,
    /// `None` where the position could not be parsed
    pub positions: Vec<Option<f64>>,
    /// Accession names in row (flat) or column (Hapmap) order
    pub accessions: Vec<String>,
    /// Zero-based input line that introduced each accession
    pub accession_rows: Vec<usize>,
    /// Header directives with defaults filled in
    pub directives: BTreeMap<String, String>,
}

impl MatrixDescriptor {
    /// Empty descriptor with default directives derived from `source_name`
    pub fn new(format: MatrixFormat, source_name: &str) -> Self {
        let mut directives = BTreeMap::new();
        directives.insert(DIRECTIVE_DATASET.to_string(), source_name.to_string());
        directives.insert(DIRECTIVE_MAP.to_string(), source_name.to_string());
        directives.insert(
            DIRECTIVE_MARKER_TYPE.to_string(),
            DEFAULT_MARKER_TYPE.to_string(),
        );

        Self {
            format,
            markers: Vec::new(),
            chromosomes: Vec::new(),
            positions: Vec::new(),
            accessions: Vec::new(),
            accession_rows: Vec::new(),
            directives,
        }
    }

    pub fn dataset_name(&self) -> &str {
        self.directive(DIRECTIVE_DATASET)
    }

    pub fn map_name(&self) -> &str {
        self.directive(DIRECTIVE_MAP)
    }

    pub fn marker_type(&self) -> &str {
        self.directive(DIRECTIVE_MARKER_TYPE)
    }

    fn directive(&self, key: &str) -> &str {
        self.directives.get(key).map(String::as_str).unwrap_or_default()
    }

    /// True when the file carried chromosome/position information
    pub fn has_positions(&self) -> bool {
        !self.chromosomes.is_empty() || !self.positions.is_empty()
    }

    /// Mapping rows are either absent or exactly as long as the marker list
    pub fn is_consistent(&self) -> bool {
        !self.has_positions()
            || (self.chromosomes.len() == self.markers.len()
                && self.positions.len() == self.markers.len())
    }

    /// `(marker, chromosome, position)` for every marker with a usable position
    pub fn placements(&self) -> impl Iterator<Item = (&str, &str, f64)> + '_ {
        self.markers
            .iter()
            .zip(self.chromosomes.iter())
            .zip(self.positions.iter())
            .filter_map(|((marker, chromosome), position)| {
                position.map(|p| (marker.as_str(), chromosome.as_str(), p))
            })
    }

    pub fn native_orientation(&self) -> Orientation {
        self.format.native_orientation()
    }

    /// Same marker and accession axes as `other`, in the same order
    pub fn same_axes(&self, other: &MatrixDescriptor) -> bool {
        self.markers == other.markers && self.accessions == other.accessions
    }
}

// ============================================================================
// Store entities
// ============================================================================

/// A marker about to be created through the staging loader
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewMarker {
    pub name: String,
    pub marker_type_id: i64,
}

/// One marker placed on a chromosome position under a map
#[derive(Debug, Clone, PartialEq)]
pub struct MapDefinition {
    pub map_id: i64,
    pub marker_id: i64,
    pub chromosome: String,
    pub position: f64,
}

/// Association of a dataset with a marker or an accession
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DatasetMember {
    pub dataset_id: i64,
    pub kind: MemberKind,
    pub member_id: i64,
}

/// Dataset visibility state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Visibility {
    Hidden,
    Public,
    DeletedOnFailure,
}

impl Visibility {
    pub fn as_str(&self) -> &'static str {
        match self {
            Visibility::Hidden => "hidden",
            Visibility::Public => "public",
            Visibility::DeletedOnFailure => "deleted_on_failure",
        }
    }
}

impl From<String> for Visibility {
    fn from(s: String) -> Self {
        match s.as_str() {
            "public" => Visibility::Public,
            "deleted_on_failure" => Visibility::DeletedOnFailure,
            _ => Visibility::Hidden,
        }
    }
}

/// A binary matrix artifact produced by the codec
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatrixArtifact {
    pub orientation: Orientation,
    pub path: PathBuf,
    /// Hex SHA-256 of the artifact file
    pub sha256: String,
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_come_from_source_name() {
        let descriptor = MatrixDescriptor::new(MatrixFormat::Flat, "maize_panel.txt");
        assert_eq!(descriptor.dataset_name(), "maize_panel.txt");
        assert_eq!(descriptor.map_name(), "maize_panel.txt");
        assert_eq!(descriptor.marker_type(), DEFAULT_MARKER_TYPE);
        assert!(!descriptor.has_positions());
        assert!(descriptor.is_consistent());
    }

    #[test]
    fn test_consistency_requires_parallel_lengths() {
        let mut descriptor = MatrixDescriptor::new(MatrixFormat::Flat, "f");
        descriptor.markers = vec!["m1".into(), "m2".into()];
        descriptor.chromosomes = vec!["1".into(), "2".into()];
        assert!(!descriptor.is_consistent());

        descriptor.positions = vec![Some(1.5), None];
        assert!(descriptor.is_consistent());

        let placements: Vec<_> = descriptor.placements().collect();
        assert_eq!(placements, vec![("m1", "1", 1.5)]);
    }

    #[test]
    fn test_canonical_directive() {
        assert_eq!(canonical_directive("MARKERTYPE"), Some(DIRECTIVE_MARKER_TYPE));
        assert_eq!(canonical_directive("Dataset"), Some(DIRECTIVE_DATASET));
        assert_eq!(canonical_directive("platform"), None);
    }
}
