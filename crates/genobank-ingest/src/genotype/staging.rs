//! Staging bulk-loader
//!
//! Records are written to a tab-delimited side file (one header line naming
//! the target fields, then one line per record) and the whole file is handed
//! to [`GenotypeStore::bulk_load`]. The side file is removed afterwards
//! whether or not the load succeeded.

use crate::genotype::models::{DatasetMember, MapDefinition, NewMarker};
use crate::genotype::store::GenotypeStore;
use crate::genotype::{IngestError, Result};
use std::path::{Path, PathBuf};
use tokio::io::{AsyncWriteExt, BufWriter};
use tracing::{debug, info, warn};

/// Target table and the ordered field list a staging file populates
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BulkTarget {
    pub table: &'static str,
    pub fields: &'static [&'static str],
}

impl BulkTarget {
    /// Header line of a staging file for this target
    pub fn header(&self) -> String {
        self.fields.join("\t")
    }
}

pub const MARKERS: BulkTarget = BulkTarget {
    table: "markers",
    fields: &["name", "marker_type_id"],
};

pub const MAP_DEFINITIONS: BulkTarget = BulkTarget {
    table: "map_definitions",
    fields: &["map_id", "marker_id", "chromosome", "position"],
};

pub const DATASET_MEMBERS: BulkTarget = BulkTarget {
    table: "dataset_members",
    fields: &["dataset_id", "member_kind", "member_id"],
};

/// A record that can be written as one staging line
pub trait StagedRecord {
    /// Field values in the target's field order
    fn values(&self) -> Vec<String>;
}

impl StagedRecord for NewMarker {
    fn values(&self) -> Vec<String> {
        vec![self.name.clone(), self.marker_type_id.to_string()]
    }
}

impl StagedRecord for MapDefinition {
    fn values(&self) -> Vec<String> {
        vec![
            self.map_id.to_string(),
            self.marker_id.to_string(),
            self.chromosome.clone(),
            self.position.to_string(),
        ]
    }
}

impl StagedRecord for DatasetMember {
    fn values(&self) -> Vec<String> {
        vec![
            self.dataset_id.to_string(),
            self.kind.as_str().to_string(),
            self.member_id.to_string(),
        ]
    }
}

/// Values go into the file verbatim, so the delimiter set must not appear
fn check_value(target: &BulkTarget, value: &str) -> Result<()> {
    if value.contains(['\t', '\n', '\r', '\\']) {
        return Err(IngestError::Staging(format!(
            "value {:?} for {} cannot be staged without escaping",
            value, target.table
        )));
    }
    Ok(())
}

#[derive(Debug, Clone)]
pub struct StagingBulkLoader {
    work_dir: PathBuf,
}

impl StagingBulkLoader {
    pub fn new(work_dir: impl Into<PathBuf>) -> Self {
        Self {
            work_dir: work_dir.into(),
        }
    }

    pub fn work_dir(&self) -> &Path {
        &self.work_dir
    }

    /// Stage `records` for `target` and bulk-load them
    ///
    /// Returns the number of rows the store reports as loaded. An empty batch
    /// never reaches the store.
    pub async fn load<T: StagedRecord + Sync>(
        &self,
        store: &dyn GenotypeStore,
        target: &BulkTarget,
        records: &[T],
    ) -> Result<u64> {
        if records.is_empty() {
            debug!(table = target.table, "Nothing to stage");
            return Ok(0);
        }

        tokio::fs::create_dir_all(&self.work_dir).await?;
        let staged = tempfile::Builder::new()
            .prefix(&format!("stage-{}-", target.table))
            .suffix(".tsv")
            .tempfile_in(&self.work_dir)?
            .into_temp_path();

        let result = async {
            write_staging_file(&staged, target, records).await?;
            store.bulk_load(target, &staged).await
        }
        .await;

        let path = staged.to_path_buf();
        if let Err(e) = staged.close() {
            warn!(path = %path.display(), error = %e, "Failed to remove staging file");
        }

        let loaded = result?;
        info!(table = target.table, rows = loaded, "Bulk-loaded staged records");
        Ok(loaded)
    }
}

async fn write_staging_file<T: StagedRecord>(
    path: &Path,
    target: &BulkTarget,
    records: &[T],
) -> Result<()> {
    let file = tokio::fs::File::create(path).await?;
    let mut writer = BufWriter::new(file);

    writer.write_all(target.header().as_bytes()).await?;
    writer.write_all(b"\n").await?;

    for record in records {
        let values = record.values();
        if values.len() != target.fields.len() {
            return Err(IngestError::Staging(format!(
                "record has {} values, {} expects {}",
                values.len(),
                target.table,
                target.fields.len()
            )));
        }
        for value in &values {
            check_value(target, value)?;
        }
        writer.write_all(values.join("\t").as_bytes()).await?;
        writer.write_all(b"\n").await?;
    }

    writer.flush().await?;
    debug!(path = %path.display(), records = records.len(), "Wrote staging file");
    Ok(())
}
