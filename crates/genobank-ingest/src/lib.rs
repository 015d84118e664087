//! Genobank genotype ingestion
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Imports genotype matrices (allele calls for germplasm accessions across
//! genetic markers) from the flat genotype format or Hapmap into the biobank
//! store, and publishes each matrix as binary artifacts in both orientations.
//!
//! # Overview
//!
//! - **Parsing**: [`genotype::parser`] streams either encoding into a
//!   [`genotype::MatrixDescriptor`]
//! - **Resolution**: [`genotype::resolver`] maps names to store ids and
//!   bulk-creates unknown markers
//! - **Bulk loading**: [`genotype::staging`] writes side files for the store's
//!   bulk-load path
//! - **Transposition**: [`genotype::transpose`] reshapes matrices larger than
//!   memory
//! - **Publication**: [`genotype::coordinator`] and [`genotype::publication`]
//!   run the finishing units and flip the dataset public
//!
//! # Example
//!
//! ```no_run
//! use genobank_ingest::config::Config;
//! use genobank_ingest::db;
//! use genobank_ingest::genotype::{
//!     ExternalCodec, GenotypeImportRequest, GenotypePipeline, PgGenotypeStore,
//! };
//! use std::sync::Arc;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let config = Config::load()?;
//! let pool = db::create_pool(&config.database).await?;
//!
//! let pipeline = GenotypePipeline::new(
//!     Arc::new(PgGenotypeStore::new(pool)),
//!     Arc::new(ExternalCodec::new(
//!         config.genotype.codec_program.clone(),
//!         config.genotype.codec_args.clone(),
//!     )),
//!     config.genotype.pipeline_settings(),
//! );
//!
//! let report = pipeline
//!     .run(GenotypeImportRequest::new("/data/maize_panel.hmp.txt"))
//!     .await?;
//! println!("job {} finished as {}", report.job_id, report.status.as_str());
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod db;
pub mod error;
pub mod genotype;

pub use error::{IngestError, Result};
