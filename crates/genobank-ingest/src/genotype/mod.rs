// Genotype Matrix Ingestion Module
//
// Imports allele-call matrices (accessions x markers) in the flat genotype
// format or in Hapmap format.
//
// Architecture:
// - Parse: streaming flat/Hapmap parser producing a MatrixDescriptor
// - Resolve: marker/accession names to store ids, bulk-creating new markers
// - Stage: tab-delimited side files handed to the store's bulk-load path
// - Transpose: external-memory transpose for the second orientation
// - Post-process: four concurrent units behind a completion barrier
// - Publish: hidden -> public only when every unit succeeded
//
// Job state is persisted in import_jobs, never held in process memory.

pub mod codec;
pub mod coordinator;
pub mod jobs;
pub mod models;
pub mod outcome;
pub mod parser;
pub mod pipeline;
pub mod publication;
pub mod resolver;
pub mod staging;
pub mod store;
pub mod transpose;

// Re-export main types
pub use crate::error::{IngestError, Result};
pub use codec::{ExternalCodec, MatrixCodec};
pub use coordinator::{
    BarrierReport, CompletionBarrier, PostProcessingCoordinator, PostProcessingUnit, UnitKind,
    UnitOutput, UnitStatus,
};
pub use jobs::{ImportJob, JobStatus};
pub use models::{MatrixArtifact, MatrixDescriptor, Visibility};
pub use outcome::{JobOutcome, OutcomeSink, StatusEntry, StatusKind};
pub use parser::{MatrixParser, MatrixWriter, NullSink, RowSink};
pub use pipeline::{GenotypeImportRequest, GenotypePipeline, ImportReport, PipelineSettings};
pub use publication::{PublicationGate, ValidationFailurePolicy};
pub use resolver::IdentifierResolver;
pub use staging::{BulkTarget, StagingBulkLoader};
pub use store::{GenotypeStore, PgGenotypeStore};
pub use transpose::{TransposeStats, Transposer};
