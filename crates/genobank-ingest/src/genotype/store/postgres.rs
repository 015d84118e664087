// Postgres implementation of the genotype store

use crate::genotype::jobs::ImportJob;
use crate::genotype::models::{MatrixArtifact, Visibility};
use crate::genotype::staging::BulkTarget;
use crate::genotype::store::GenotypeStore;
use crate::genotype::{IngestError, Result};
use async_trait::async_trait;
use genobank_common::Orientation;
use sqlx::postgres::PgConnection;
use sqlx::types::Json;
use sqlx::{Connection, PgPool};
use std::path::Path;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, BufReader};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

/// Bytes handed to `COPY` per round-trip
const COPY_CHUNK_SIZE: usize = 64 * 1024;

#[derive(Debug, Clone)]
pub struct PgGenotypeStore {
    pool: PgPool,
}

impl PgGenotypeStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Get database connection pool
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl GenotypeStore for PgGenotypeStore {
    async fn accession_names(&self) -> Result<Vec<(String, i64)>> {
        let rows: Vec<(String, i64)> = sqlx::query_as("SELECT name, id FROM germplasm")
            .fetch_all(&self.pool)
            .await?;

        debug!(count = rows.len(), "Loaded accession names");
        Ok(rows)
    }

    async fn marker_names(&self) -> Result<Vec<(String, i64)>> {
        let rows: Vec<(String, i64)> = sqlx::query_as("SELECT name, id FROM markers")
            .fetch_all(&self.pool)
            .await?;

        debug!(count = rows.len(), "Loaded marker names");
        Ok(rows)
    }

    async fn marker_type_id(&self, label: &str) -> Result<i64> {
        let id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO marker_types (label)
            VALUES ($1)
            ON CONFLICT (label) DO UPDATE SET label = EXCLUDED.label
            RETURNING id
            "#,
        )
        .bind(label)
        .fetch_one(&self.pool)
        .await?;

        Ok(id)
    }

    async fn create_map(&self, name: &str) -> Result<i64> {
        let id: i64 = sqlx::query_scalar("INSERT INTO maps (name) VALUES ($1) RETURNING id")
            .bind(name)
            .fetch_one(&self.pool)
            .await?;

        info!(map_id = id, name, "Created map");
        Ok(id)
    }

    async fn create_dataset(
        &self,
        name: &str,
        orientation: Orientation,
        job_id: Uuid,
    ) -> Result<i64> {
        let id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO datasets (name, visibility, native_orientation, job_id)
            VALUES ($1, $2, $3, $4)
            RETURNING id
            "#,
        )
        .bind(name)
        .bind(Visibility::Hidden.as_str())
        .bind(orientation.as_str())
        .bind(job_id)
        .fetch_one(&self.pool)
        .await?;

        info!(dataset_id = id, name, "Created hidden dataset");
        Ok(id)
    }

    async fn reuse_dataset(&self, dataset_id: i64, job_id: Uuid) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE datasets
            SET visibility = $2, job_id = $3, updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(dataset_id)
        .bind(Visibility::Hidden.as_str())
        .bind(job_id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(IngestError::NotFound(format!("dataset {}", dataset_id)));
        }
        Ok(())
    }

    async fn set_visibility(&self, dataset_id: i64, visibility: Visibility) -> Result<()> {
        let result =
            sqlx::query("UPDATE datasets SET visibility = $2, updated_at = NOW() WHERE id = $1")
                .bind(dataset_id)
                .bind(visibility.as_str())
                .execute(&self.pool)
                .await?;

        if result.rows_affected() == 0 {
            return Err(IngestError::NotFound(format!("dataset {}", dataset_id)));
        }
        info!(dataset_id, visibility = visibility.as_str(), "Updated dataset visibility");
        Ok(())
    }

    async fn record_artifact(&self, dataset_id: i64, artifact: &MatrixArtifact) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO dataset_artifacts (dataset_id, orientation, path, sha256)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (dataset_id, orientation) DO UPDATE
            SET path = EXCLUDED.path, sha256 = EXCLUDED.sha256, created_at = NOW()
            "#,
        )
        .bind(dataset_id)
        .bind(artifact.orientation.as_str())
        .bind(artifact.path.to_string_lossy().into_owned())
        .bind(&artifact.sha256)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    #[instrument(skip(self, path), fields(table = target.table))]
    async fn bulk_load(&self, target: &BulkTarget, path: &Path) -> Result<u64> {
        let file = tokio::fs::File::open(path).await?;
        let mut reader = BufReader::new(file);

        let mut header = String::new();
        reader.read_line(&mut header).await?;
        let header = header.trim_end_matches(['\n', '\r']);
        if header != target.header() {
            return Err(IngestError::Staging(format!(
                "staging header '{}' does not match {} fields '{}'",
                header,
                target.table,
                target.header()
            )));
        }

        let mut conn = self.pool.acquire().await?;

        // Foreign-key triggers stay off for this session until reset below
        sqlx::query("SET session_replication_role = replica")
            .execute(&mut *conn)
            .await?;

        let loaded = copy_staged(&mut conn, target, &mut reader).await;

        let reset = sqlx::query("RESET session_replication_role")
            .execute(&mut *conn)
            .await;
        if let Err(e) = reset {
            warn!(error = %e, "Failed to restore session settings, closing connection");
            if let Err(e) = conn.detach().close().await {
                warn!(error = %e, "Failed to close connection");
            }
        }

        loaded
    }

    async fn discard_dataset_rows(&self, dataset_id: i64, map_id: Option<i64>) -> Result<u64> {
        let mut tx = self.pool.begin().await?;

        let mut removed = sqlx::query("DELETE FROM dataset_members WHERE dataset_id = $1")
            .bind(dataset_id)
            .execute(&mut *tx)
            .await?
            .rows_affected();

        removed += sqlx::query("DELETE FROM dataset_artifacts WHERE dataset_id = $1")
            .bind(dataset_id)
            .execute(&mut *tx)
            .await?
            .rows_affected();

        if let Some(map_id) = map_id {
            removed += sqlx::query("DELETE FROM map_definitions WHERE map_id = $1")
                .bind(map_id)
                .execute(&mut *tx)
                .await?
                .rows_affected();

            removed += sqlx::query("DELETE FROM maps WHERE id = $1")
                .bind(map_id)
                .execute(&mut *tx)
                .await?
                .rows_affected();
        }

        tx.commit().await?;

        info!(dataset_id, ?map_id, removed, "Discarded rows of failed dataset");
        Ok(removed)
    }

    async fn create_job(&self, job: &ImportJob) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO import_jobs
                (id, input_path, format, status, dataset_id, outcome, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(job.id)
        .bind(job.input_path.to_string_lossy().into_owned())
        .bind(job.format.as_str())
        .bind(job.status.as_str())
        .bind(job.dataset_id)
        .bind(Json(&job.outcome))
        .bind(job.created_at)
        .bind(job.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn update_job(&self, job: &ImportJob) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE import_jobs
            SET status = $2, dataset_id = $3, outcome = $4, updated_at = $5
            WHERE id = $1
            "#,
        )
        .bind(job.id)
        .bind(job.status.as_str())
        .bind(job.dataset_id)
        .bind(Json(&job.outcome))
        .bind(job.updated_at)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(IngestError::NotFound(format!("import job {}", job.id)));
        }
        Ok(())
    }
}

/// Stream the rest of a staging file into `COPY ... FROM STDIN` inside one transaction
async fn copy_staged<R: AsyncRead + Unpin>(
    conn: &mut PgConnection,
    target: &BulkTarget,
    reader: &mut R,
) -> Result<u64> {
    let mut tx = conn.begin().await?;

    // Uniqueness constraints are DEFERRABLE; check them at commit
    sqlx::query("SET CONSTRAINTS ALL DEFERRED")
        .execute(&mut *tx)
        .await?;

    let statement = format!(
        "COPY {} ({}) FROM STDIN",
        target.table,
        target.fields.join(", ")
    );
    let mut copy = tx.copy_in_raw(&statement).await?;

    let mut buf = vec![0u8; COPY_CHUNK_SIZE];
    loop {
        let n = match reader.read(&mut buf).await {
            Ok(n) => n,
            Err(e) => {
                copy.abort(format!("failed to read staging file: {}", e)).await?;
                return Err(e.into());
            },
        };
        if n == 0 {
            break;
        }
        copy.send(&buf[..n]).await?;
    }

    let rows = copy.finish().await?;
    tx.commit().await?;

    Ok(rows)
}
