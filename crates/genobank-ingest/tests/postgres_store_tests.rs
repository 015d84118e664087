//! Postgres store tests using testcontainers
//!
//! Run with: cargo test --test postgres_store_tests -- --ignored
#![allow(clippy::unwrap_used, clippy::expect_used)]

mod common;
mod helpers;

use common::TestPostgres;
use genobank_ingest::genotype::staging::{DATASET_MEMBERS, MARKERS};
use genobank_ingest::genotype::{
    GenotypeImportRequest, GenotypePipeline, GenotypeStore, IngestError, JobStatus,
    PgGenotypeStore, PipelineSettings, StagingBulkLoader, Visibility,
};
use genobank_ingest::genotype::models::NewMarker;
use helpers::RecordingCodec;
use std::sync::Arc;
use tempfile::TempDir;

const FLAT_PANEL: &str = "# dataset = Maize panel A\n\
                          # markerType = SNP\n\
                          Linkage Group / Chromosome\t1\t2\n\
                          Position\t10.5\t20\n\
                          Lines/Markers\tm1\tm2\n\
                          B73\tAA\tCC\n\
                          Mo17\tAG\tCT\n\
                          W22\tGG\tTT\n";

async fn seed_germplasm(pg: &TestPostgres, names: &[&str]) {
    for name in names {
        sqlx::query("INSERT INTO germplasm (name) VALUES ($1)")
            .bind(name)
            .execute(pg.pool())
            .await
            .unwrap();
    }
}

async fn count(pg: &TestPostgres, table: &str) -> i64 {
    sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {}", table))
        .fetch_one(pg.pool())
        .await
        .unwrap()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
#[ignore = "requires Docker"]
async fn test_flat_import_end_to_end() {
    common::init_test_tracing();
    let pg = TestPostgres::start().await.unwrap();
    seed_germplasm(&pg, &["B73", "Mo17", "W22"]).await;

    let dir = TempDir::new().unwrap();
    let input = dir.path().join("panel.txt");
    std::fs::write(&input, FLAT_PANEL).unwrap();

    let settings = PipelineSettings {
        work_dir: dir.path().join("work"),
        artifact_dir: dir.path().join("artifacts"),
        ..PipelineSettings::default()
    };
    let store = Arc::new(PgGenotypeStore::new(pg.pool().clone()));
    let codec = Arc::new(RecordingCodec::new());
    let pipeline = GenotypePipeline::new(store, codec.clone(), settings);

    let report = pipeline.run(GenotypeImportRequest::new(&input)).await.unwrap();

    assert!(report.succeeded(), "outcome: {:?}", report.outcome);
    assert_eq!(report.markers_created, 2);
    assert_eq!(codec.calls().len(), 2);

    let dataset_id = report.dataset_id.unwrap();
    let (name, visibility): (String, String) =
        sqlx::query_as("SELECT name, visibility FROM datasets WHERE id = $1")
            .bind(dataset_id)
            .fetch_one(pg.pool())
            .await
            .unwrap();
    assert_eq!(name, "Maize panel A");
    assert_eq!(Visibility::from(visibility), Visibility::Public);

    assert_eq!(count(&pg, "markers").await, 2);
    assert_eq!(count(&pg, "map_definitions").await, 2);
    assert_eq!(count(&pg, "dataset_members").await, 5);
    assert_eq!(count(&pg, "dataset_artifacts").await, 2);

    let marker_type: String = sqlx::query_scalar(
        "SELECT t.label FROM markers m JOIN marker_types t ON t.id = m.marker_type_id LIMIT 1",
    )
    .fetch_one(pg.pool())
    .await
    .unwrap();
    assert_eq!(marker_type, "SNP");

    let (status, outcome): (String, serde_json::Value) =
        sqlx::query_as("SELECT status, outcome FROM import_jobs WHERE id = $1")
            .bind(report.job_id)
            .fetch_one(pg.pool())
            .await
            .unwrap();
    assert_eq!(JobStatus::from(status), JobStatus::Completed);
    assert_eq!(outcome["entries"], serde_json::json!([]));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
#[ignore = "requires Docker"]
async fn test_unknown_accession_leaves_dataset_hidden() {
    common::init_test_tracing();
    let pg = TestPostgres::start().await.unwrap();
    seed_germplasm(&pg, &["B73", "W22"]).await;

    let dir = TempDir::new().unwrap();
    let input = dir.path().join("panel.txt");
    std::fs::write(&input, FLAT_PANEL).unwrap();

    let settings = PipelineSettings {
        work_dir: dir.path().join("work"),
        artifact_dir: dir.path().join("artifacts"),
        ..PipelineSettings::default()
    };
    let pipeline = GenotypePipeline::new(
        Arc::new(PgGenotypeStore::new(pg.pool().clone())),
        Arc::new(RecordingCodec::new()),
        settings,
    );

    let report = pipeline.run(GenotypeImportRequest::new(&input)).await.unwrap();

    assert_eq!(report.status, JobStatus::Failed);
    let visibility: String = sqlx::query_scalar("SELECT visibility FROM datasets WHERE id = $1")
        .bind(report.dataset_id.unwrap())
        .fetch_one(pg.pool())
        .await
        .unwrap();
    assert_eq!(visibility, "hidden");
    assert_eq!(count(&pg, "markers").await, 0);
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_bulk_load_rejects_mismatched_header() {
    common::init_test_tracing();
    let pg = TestPostgres::start().await.unwrap();
    let store = PgGenotypeStore::new(pg.pool().clone());

    let dir = TempDir::new().unwrap();
    let staged = dir.path().join("members.tsv");
    std::fs::write(&staged, "name\tmarker_type_id\nm1\t1\n").unwrap();

    let err = store.bulk_load(&DATASET_MEMBERS, &staged).await.unwrap_err();
    assert!(matches!(err, IngestError::Staging(_)));
    assert_eq!(count(&pg, "dataset_members").await, 0);
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_staged_markers_load_and_duplicates_roll_back() {
    common::init_test_tracing();
    let pg = TestPostgres::start().await.unwrap();
    let store = PgGenotypeStore::new(pg.pool().clone());
    let dir = TempDir::new().unwrap();
    let loader = StagingBulkLoader::new(dir.path());

    let type_id = store.marker_type_id("SNP").await.unwrap();
    assert_eq!(store.marker_type_id("SNP").await.unwrap(), type_id);

    let markers = vec![
        NewMarker {
            name: "m1".to_string(),
            marker_type_id: type_id,
        },
        NewMarker {
            name: "m2".to_string(),
            marker_type_id: type_id,
        },
    ];
    assert_eq!(loader.load(&store, &MARKERS, &markers).await.unwrap(), 2);

    // The deferred unique constraint fires at commit and nothing is kept
    let err = loader.load(&store, &MARKERS, &markers).await.unwrap_err();
    assert!(matches!(err, IngestError::Database(_)));
    assert_eq!(count(&pg, "markers").await, 2);

    // The connection went back to the pool with replication role reset
    let role: String = sqlx::query_scalar("SHOW session_replication_role")
        .fetch_one(pg.pool())
        .await
        .unwrap();
    assert_eq!(role, "origin");
}
