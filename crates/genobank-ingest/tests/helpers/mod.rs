//! Test doubles for genotype pipeline integration tests
//!
//! - `MemoryStore`: a `GenotypeStore` that keeps every table in memory and
//!   applies staging files the way the Postgres `COPY` path would
//! - `RecordingCodec`: a `MatrixCodec` that records what it was asked to
//!   encode and can be told to fail for one orientation
#![allow(dead_code, clippy::unwrap_used, clippy::expect_used)]

use async_trait::async_trait;
use genobank_common::{MemberKind, Orientation};
use genobank_ingest::genotype::jobs::ImportJob;
use genobank_ingest::genotype::models::{DatasetMember, MapDefinition, MatrixArtifact, Visibility};
use genobank_ingest::genotype::staging::BulkTarget;
use genobank_ingest::genotype::{GenotypeStore, MatrixCodec};
use genobank_ingest::{IngestError, Result};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use uuid::Uuid;

// ============================================================================
// Memory Store
// ============================================================================

#[derive(Debug, Clone)]
pub struct DatasetRow {
    pub name: String,
    pub visibility: Visibility,
    pub orientation: Orientation,
    pub job_id: Option<Uuid>,
}

#[derive(Debug, Default)]
pub struct MemoryState {
    next_id: i64,
    pub marker_types: BTreeMap<String, i64>,
    /// `(id, name, marker_type_id)`
    pub markers: Vec<(i64, String, i64)>,
    pub germplasm: Vec<(String, i64)>,
    pub maps: BTreeMap<i64, String>,
    pub map_definitions: Vec<MapDefinition>,
    pub datasets: BTreeMap<i64, DatasetRow>,
    pub members: Vec<DatasetMember>,
    pub artifacts: Vec<(i64, MatrixArtifact)>,
    pub jobs: HashMap<Uuid, ImportJob>,
    /// Tables touched by `bulk_load`, in call order
    pub bulk_loads: Vec<String>,
}

impl MemoryState {
    fn next_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
    fail_bulk_load_for: Option<&'static str>,
    fail_visibility: Option<Visibility>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the accession universe
    pub fn with_germplasm(self, names: &[&str]) -> Self {
        {
            let mut state = self.state.lock().unwrap();
            for name in names {
                let id = state.next_id();
                state.germplasm.push((name.to_string(), id));
            }
        }
        self
    }

    /// Seed an existing marker
    pub fn with_marker(self, name: &str) -> Self {
        {
            let mut state = self.state.lock().unwrap();
            let id = state.next_id();
            state.markers.push((id, name.to_string(), 0));
        }
        self
    }

    /// Make bulk loads into `table` fail
    pub fn failing_bulk_load(mut self, table: &'static str) -> Self {
        self.fail_bulk_load_for = Some(table);
        self
    }

    /// Make `set_visibility` to `visibility` fail
    pub fn failing_set_visibility(mut self, visibility: Visibility) -> Self {
        self.fail_visibility = Some(visibility);
        self
    }

    /// Inspect the state
    pub fn with_state<T>(&self, f: impl FnOnce(&MemoryState) -> T) -> T {
        f(&self.state.lock().unwrap())
    }

    pub fn insert_dataset(&self, name: &str, visibility: Visibility) -> i64 {
        let mut state = self.state.lock().unwrap();
        let id = state.next_id();
        state.datasets.insert(
            id,
            DatasetRow {
                name: name.to_string(),
                visibility,
                orientation: Orientation::AccessionMajor,
                job_id: None,
            },
        );
        id
    }

    pub fn visibility(&self, dataset_id: i64) -> Option<Visibility> {
        self.with_state(|s| s.datasets.get(&dataset_id).map(|d| d.visibility))
    }

    pub fn marker_id(&self, name: &str) -> Option<i64> {
        self.with_state(|s| {
            s.markers
                .iter()
                .find(|(_, n, _)| n.eq_ignore_ascii_case(name))
                .map(|(id, _, _)| *id)
        })
    }

    pub fn members_of(&self, dataset_id: i64, kind: MemberKind) -> Vec<i64> {
        self.with_state(|s| {
            s.members
                .iter()
                .filter(|m| m.dataset_id == dataset_id && m.kind == kind)
                .map(|m| m.member_id)
                .collect()
        })
    }

    pub fn job(&self, id: Uuid) -> Option<ImportJob> {
        self.with_state(|s| s.jobs.get(&id).cloned())
    }
}

fn field<T: std::str::FromStr>(value: &str) -> Result<T> {
    value
        .parse()
        .map_err(|_| IngestError::Staging(format!("unparseable staged value '{}'", value)))
}

#[async_trait]
impl GenotypeStore for MemoryStore {
    async fn accession_names(&self) -> Result<Vec<(String, i64)>> {
        Ok(self.with_state(|s| s.germplasm.clone()))
    }

    async fn marker_names(&self) -> Result<Vec<(String, i64)>> {
        Ok(self.with_state(|s| {
            s.markers
                .iter()
                .map(|(id, name, _)| (name.clone(), *id))
                .collect()
        }))
    }

    async fn marker_type_id(&self, label: &str) -> Result<i64> {
        let mut state = self.state.lock().unwrap();
        if let Some(id) = state.marker_types.get(label) {
            return Ok(*id);
        }
        let id = state.next_id();
        state.marker_types.insert(label.to_string(), id);
        Ok(id)
    }

    async fn create_map(&self, name: &str) -> Result<i64> {
        let mut state = self.state.lock().unwrap();
        let id = state.next_id();
        state.maps.insert(id, name.to_string());
        Ok(id)
    }

    async fn create_dataset(
        &self,
        name: &str,
        orientation: Orientation,
        job_id: Uuid,
    ) -> Result<i64> {
        let mut state = self.state.lock().unwrap();
        let id = state.next_id();
        state.datasets.insert(
            id,
            DatasetRow {
                name: name.to_string(),
                visibility: Visibility::Hidden,
                orientation,
                job_id: Some(job_id),
            },
        );
        Ok(id)
    }

    async fn reuse_dataset(&self, dataset_id: i64, job_id: Uuid) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        let dataset = state
            .datasets
            .get_mut(&dataset_id)
            .ok_or_else(|| IngestError::NotFound(format!("dataset {}", dataset_id)))?;
        dataset.visibility = Visibility::Hidden;
        dataset.job_id = Some(job_id);
        Ok(())
    }

    async fn set_visibility(&self, dataset_id: i64, visibility: Visibility) -> Result<()> {
        if self.fail_visibility == Some(visibility) {
            return Err(IngestError::Database(sqlx::Error::PoolTimedOut));
        }
        let mut state = self.state.lock().unwrap();
        let dataset = state
            .datasets
            .get_mut(&dataset_id)
            .ok_or_else(|| IngestError::NotFound(format!("dataset {}", dataset_id)))?;
        dataset.visibility = visibility;
        Ok(())
    }

    async fn record_artifact(&self, dataset_id: i64, artifact: &MatrixArtifact) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state
            .artifacts
            .retain(|(id, a)| !(*id == dataset_id && a.orientation == artifact.orientation));
        state.artifacts.push((dataset_id, artifact.clone()));
        Ok(())
    }

    async fn bulk_load(&self, target: &BulkTarget, path: &Path) -> Result<u64> {
        if self.fail_bulk_load_for == Some(target.table) {
            return Err(IngestError::Database(sqlx::Error::PoolTimedOut));
        }

        let content = std::fs::read_to_string(path)?;
        let mut lines = content.lines();
        if lines.next() != Some(target.header().as_str()) {
            return Err(IngestError::Staging("header mismatch".to_string()));
        }

        let mut state = self.state.lock().unwrap();
        state.bulk_loads.push(target.table.to_string());

        let mut loaded = 0;
        for line in lines {
            let values: Vec<&str> = line.split('\t').collect();
            match target.table {
                "markers" => {
                    let id = state.next_id();
                    state
                        .markers
                        .push((id, values[0].to_string(), field(values[1])?));
                },
                "map_definitions" => state.map_definitions.push(MapDefinition {
                    map_id: field(values[0])?,
                    marker_id: field(values[1])?,
                    chromosome: values[2].to_string(),
                    position: field(values[3])?,
                }),
                "dataset_members" => state.members.push(DatasetMember {
                    dataset_id: field(values[0])?,
                    kind: field(values[1])?,
                    member_id: field(values[2])?,
                }),
                other => {
                    return Err(IngestError::Staging(format!("unknown table {}", other)));
                },
            }
            loaded += 1;
        }

        Ok(loaded)
    }

    async fn discard_dataset_rows(&self, dataset_id: i64, map_id: Option<i64>) -> Result<u64> {
        let mut state = self.state.lock().unwrap();
        let before = state.members.len() + state.artifacts.len() + state.map_definitions.len();

        state.members.retain(|m| m.dataset_id != dataset_id);
        state.artifacts.retain(|(id, _)| *id != dataset_id);
        if let Some(map_id) = map_id {
            state.map_definitions.retain(|d| d.map_id != map_id);
            state.maps.remove(&map_id);
        }

        let after = state.members.len() + state.artifacts.len() + state.map_definitions.len();
        Ok((before - after) as u64)
    }

    async fn create_job(&self, job: &ImportJob) -> Result<()> {
        self.state.lock().unwrap().jobs.insert(job.id, job.clone());
        Ok(())
    }

    async fn update_job(&self, job: &ImportJob) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        match state.jobs.get_mut(&job.id) {
            Some(existing) => {
                *existing = job.clone();
                Ok(())
            },
            None => Err(IngestError::NotFound(format!("import job {}", job.id))),
        }
    }
}

// ============================================================================
// Recording Codec
// ============================================================================

#[derive(Debug, Clone)]
pub struct EncodeCall {
    pub orientation: Orientation,
    pub matrix: String,
    pub artifact: PathBuf,
}

/// Writes `<orientation>\n<matrix>` as the artifact and records each call
#[derive(Debug, Default)]
pub struct RecordingCodec {
    calls: Mutex<Vec<EncodeCall>>,
    fail_for: Option<Orientation>,
}

impl RecordingCodec {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_for(orientation: Orientation) -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            fail_for: Some(orientation),
        }
    }

    pub fn calls(&self) -> Vec<EncodeCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_for(&self, orientation: Orientation) -> Option<EncodeCall> {
        self.calls()
            .into_iter()
            .find(|c| c.orientation == orientation)
    }
}

#[async_trait]
impl MatrixCodec for RecordingCodec {
    async fn encode(&self, matrix: &Path, orientation: Orientation, artifact: &Path) -> Result<()> {
        let content = tokio::fs::read_to_string(matrix).await?;
        self.calls.lock().unwrap().push(EncodeCall {
            orientation,
            matrix: content.clone(),
            artifact: artifact.to_path_buf(),
        });

        if self.fail_for == Some(orientation) {
            return Err(IngestError::Codec(format!("refusing {} matrix", orientation)));
        }

        tokio::fs::write(artifact, format!("{}\n{}", orientation, content)).await?;
        Ok(())
    }
}
