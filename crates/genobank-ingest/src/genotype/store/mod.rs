//! Relational store seam for the genotype pipeline
//!
//! Every method acquires its own connection, so concurrent post-processing
//! units never share a session.

mod postgres;

pub use postgres::PgGenotypeStore;

use crate::genotype::jobs::ImportJob;
use crate::genotype::models::{MatrixArtifact, Visibility};
use crate::genotype::staging::BulkTarget;
use crate::genotype::Result;
use async_trait::async_trait;
use genobank_common::Orientation;
use std::path::Path;
use uuid::Uuid;

#[async_trait]
pub trait GenotypeStore: Send + Sync {
    /// Every known accession as `(name, id)`
    async fn accession_names(&self) -> Result<Vec<(String, i64)>>;

    /// Every known marker as `(name, id)`
    async fn marker_names(&self) -> Result<Vec<(String, i64)>>;

    /// Id of the marker type labelled `label`, created if absent
    async fn marker_type_id(&self, label: &str) -> Result<i64>;

    /// Create a new map and return its id
    async fn create_map(&self, name: &str) -> Result<i64>;

    /// Create a hidden dataset for an import job
    async fn create_dataset(&self, name: &str, orientation: Orientation, job_id: Uuid)
        -> Result<i64>;

    /// Hide an existing dataset and attach it to an import job
    ///
    /// Fails with `NotFound` when no dataset has this id.
    async fn reuse_dataset(&self, dataset_id: i64, job_id: Uuid) -> Result<()>;

    async fn set_visibility(&self, dataset_id: i64, visibility: Visibility) -> Result<()>;

    /// Record (or replace) the artifact of one orientation on a dataset
    async fn record_artifact(&self, dataset_id: i64, artifact: &MatrixArtifact) -> Result<()>;

    /// Load a staging file into `target.table`, returning the rows loaded
    ///
    /// The file's first line names the target fields and must match
    /// `target.fields`.
    async fn bulk_load(&self, target: &BulkTarget, path: &Path) -> Result<u64>;

    /// Remove the membership rows of a dataset and, if given, a map with its definitions
    async fn discard_dataset_rows(&self, dataset_id: i64, map_id: Option<i64>) -> Result<u64>;

    async fn create_job(&self, job: &ImportJob) -> Result<()>;

    /// Persist the job's status, dataset and outcome
    async fn update_job(&self, job: &ImportJob) -> Result<()>;
}
