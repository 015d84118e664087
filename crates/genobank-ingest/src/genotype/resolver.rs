//! Identifier resolution
//!
//! Marker and accession names are resolved against name→id universes loaded
//! from the store once per job. Lookups are case-insensitive. Unknown
//! accessions are validation failures; unknown markers are created in bulk.

use crate::genotype::models::{MatrixDescriptor, NewMarker};
use crate::genotype::outcome::{JobOutcome, StatusKind};
use crate::genotype::staging::{StagingBulkLoader, MARKERS};
use crate::genotype::store::GenotypeStore;
use crate::genotype::{IngestError, Result};
use std::collections::{HashMap, HashSet};
use tracing::{info, instrument};

/// Case-insensitive name → id lookup
#[derive(Debug, Clone, Default)]
pub struct NameIndex {
    ids: HashMap<String, i64>,
}

impl NameIndex {
    pub fn from_pairs(pairs: impl IntoIterator<Item = (String, i64)>) -> Self {
        let ids = pairs
            .into_iter()
            .map(|(name, id)| (name.to_lowercase(), id))
            .collect();
        Self { ids }
    }

    pub fn get(&self, name: &str) -> Option<i64> {
        self.ids.get(&name.to_lowercase()).copied()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

/// Name universes for one job
///
/// Read-only once built, so it can be shared across concurrent units behind
/// an `Arc` without locking.
#[derive(Debug, Clone, Default)]
pub struct IdentifierResolver {
    accessions: NameIndex,
    markers: NameIndex,
}

impl IdentifierResolver {
    pub fn new(accessions: NameIndex, markers: NameIndex) -> Self {
        Self {
            accessions,
            markers,
        }
    }

    /// Load both universes from the store
    pub async fn load(store: &dyn GenotypeStore) -> Result<Self> {
        let accessions = NameIndex::from_pairs(store.accession_names().await?);
        let markers = NameIndex::from_pairs(store.marker_names().await?);

        info!(
            accessions = accessions.len(),
            markers = markers.len(),
            "Loaded identifier universes"
        );

        Ok(Self::new(accessions, markers))
    }

    pub fn accession_id(&self, name: &str) -> Option<i64> {
        self.accessions.get(name)
    }

    pub fn marker_id(&self, name: &str) -> Option<i64> {
        self.markers.get(name)
    }

    /// Report every accession the store does not know, at the row that named it
    ///
    /// Returns the number of unknown accessions.
    pub fn check_accessions(&self, descriptor: &MatrixDescriptor, outcome: &mut JobOutcome) -> usize {
        let mut unknown = 0;
        for (name, row) in descriptor.accessions.iter().zip(&descriptor.accession_rows) {
            if !self.accessions.contains(name) {
                unknown += 1;
                outcome.record(
                    StatusKind::InvalidAccession,
                    Some(*row),
                    format!("unknown accession '{}'", name),
                );
            }
        }
        unknown
    }

    /// Markers named by the descriptor that the store does not know yet
    pub fn new_markers(&self, descriptor: &MatrixDescriptor) -> Vec<String> {
        let mut seen = HashSet::new();
        descriptor
            .markers
            .iter()
            .filter(|name| !self.markers.contains(name))
            .filter(|name| seen.insert(name.to_lowercase()))
            .cloned()
            .collect()
    }

    /// Bulk-create unknown markers, then reload the full marker universe
    ///
    /// Returns the number of markers created.
    #[instrument(skip_all, fields(markers = descriptor.markers.len()))]
    pub async fn create_missing_markers(
        &mut self,
        store: &dyn GenotypeStore,
        loader: &StagingBulkLoader,
        descriptor: &MatrixDescriptor,
        marker_type_id: i64,
    ) -> Result<usize> {
        let new_markers: Vec<NewMarker> = self
            .new_markers(descriptor)
            .into_iter()
            .map(|name| NewMarker {
                name,
                marker_type_id,
            })
            .collect();

        if new_markers.is_empty() {
            info!("All markers already known");
            return Ok(0);
        }

        loader.load(store, &MARKERS, &new_markers).await?;

        self.markers = NameIndex::from_pairs(store.marker_names().await?);
        info!(
            created = new_markers.len(),
            universe = self.markers.len(),
            "Created new markers and reloaded marker universe"
        );

        Ok(new_markers.len())
    }

    /// Ids of the descriptor's markers, in descriptor order
    pub fn resolve_markers(&self, descriptor: &MatrixDescriptor) -> Result<Vec<i64>> {
        descriptor
            .markers
            .iter()
            .map(|name| {
                self.marker_id(name)
                    .ok_or_else(|| IngestError::Internal(format!("marker '{}' is unresolved", name)))
            })
            .collect()
    }

    /// Ids of the descriptor's accessions, in descriptor order
    pub fn resolve_accessions(&self, descriptor: &MatrixDescriptor) -> Result<Vec<i64>> {
        descriptor
            .accessions
            .iter()
            .map(|name| {
                self.accession_id(name).ok_or_else(|| {
                    IngestError::Internal(format!("accession '{}' is unresolved", name))
                })
            })
            .collect()
    }
}
