// Genotype Import Pipeline
//
// Orchestrates one file-at-a-time import:
// 1. Check: parse the whole file, resolve accessions, collect every problem
// 2. Dataset: create (or reuse) the dataset, hidden
// 3. Markers: bulk-create unknown markers, reload the marker universe
// 4. Materialize: second parse writing the calls-only native matrix
// 5. Post-process: map definitions, members, codec per orientation (concurrent)
// 6. Publish: public only when every post-processing unit succeeded

use crate::genotype::codec::MatrixCodec;
use crate::genotype::coordinator::{
    PostProcessingCoordinator, PostProcessingUnit, UnitKind, UnitOutput, UnitReport, UnitStatus,
};
use crate::genotype::jobs::{ImportJob, JobStatus};
use crate::genotype::models::{
    DatasetMember, MapDefinition, MatrixArtifact, MatrixDescriptor, Visibility,
};
use crate::genotype::outcome::{JobOutcome, OutcomeSink};
use crate::genotype::parser::{source_name, MatrixParser, MatrixWriter, NullSink};
use crate::genotype::publication::{PublicationGate, ValidationFailurePolicy};
use crate::genotype::resolver::IdentifierResolver;
use crate::genotype::staging::{StagingBulkLoader, DATASET_MEMBERS, MAP_DEFINITIONS};
use crate::genotype::store::GenotypeStore;
use crate::genotype::transpose::{Transposer, DEFAULT_BATCH_LINES};
use crate::genotype::{IngestError, Result};
use genobank_common::checksum::sha256_file;
use genobank_common::{MatrixFormat, MemberKind, Orientation};
use serde::Serialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

/// Pipeline knobs, normally taken from [`GenotypeConfig`](crate::config::GenotypeConfig)
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    /// Scratch space for staging files, spill files and canonical matrices
    pub work_dir: PathBuf,
    /// Where binary artifacts are written, one subdirectory per dataset
    pub artifact_dir: PathBuf,
    pub transpose_batch_lines: usize,
    /// Remove the input file when the job fails before post-processing
    pub delete_input_on_failure: bool,
    pub dataset_on_validation_failure: ValidationFailurePolicy,
    /// Run the compensating cleanup when post-processing fails
    pub cleanup_on_failure: bool,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        let work_dir = std::env::temp_dir().join("genobank");
        Self {
            artifact_dir: work_dir.join("artifacts"),
            work_dir,
            transpose_batch_lines: DEFAULT_BATCH_LINES,
            delete_input_on_failure: false,
            dataset_on_validation_failure: ValidationFailurePolicy::Keep,
            cleanup_on_failure: true,
        }
    }
}

#[derive(Debug, Clone)]
pub struct GenotypeImportRequest {
    pub input: PathBuf,
    /// Detected from the file name when absent
    pub format: Option<MatrixFormat>,
    /// Existing dataset to import into instead of creating one
    pub dataset_id: Option<i64>,
}

impl GenotypeImportRequest {
    pub fn new(input: impl Into<PathBuf>) -> Self {
        Self {
            input: input.into(),
            format: None,
            dataset_id: None,
        }
    }

    pub fn with_format(mut self, format: MatrixFormat) -> Self {
        self.format = Some(format);
        self
    }

    pub fn with_dataset(mut self, dataset_id: i64) -> Self {
        self.dataset_id = Some(dataset_id);
        self
    }

    fn resolved_format(&self) -> MatrixFormat {
        self.format
            .unwrap_or_else(|| MatrixFormat::detect(&self.input))
    }
}

/// Result of the check phase alone
#[derive(Debug, Clone, Serialize)]
pub struct CheckReport {
    pub format: MatrixFormat,
    pub descriptor: MatrixDescriptor,
    pub outcome: JobOutcome,
}

/// Result of a full import job
#[derive(Debug, Clone, Serialize)]
pub struct ImportReport {
    pub job_id: Uuid,
    pub status: JobStatus,
    pub dataset_id: Option<i64>,
    pub visibility: Option<Visibility>,
    pub map_id: Option<i64>,
    pub markers_created: usize,
    pub map_definitions: usize,
    pub members: usize,
    pub units: Vec<UnitReport>,
    pub outcome: JobOutcome,
    /// Set once the post-processing units were launched
    #[serde(skip)]
    post_processing_started: bool,
}

impl ImportReport {
    fn new(job_id: Uuid) -> Self {
        Self {
            job_id,
            status: JobStatus::Pending,
            dataset_id: None,
            visibility: None,
            map_id: None,
            markers_created: 0,
            map_definitions: 0,
            members: 0,
            units: Vec::new(),
            outcome: JobOutcome::new(),
            post_processing_started: false,
        }
    }

    pub fn succeeded(&self) -> bool {
        self.status == JobStatus::Completed
    }
}

pub struct GenotypePipeline {
    store: Arc<dyn GenotypeStore>,
    codec: Arc<dyn MatrixCodec>,
    settings: PipelineSettings,
}

impl GenotypePipeline {
    pub fn new(
        store: Arc<dyn GenotypeStore>,
        codec: Arc<dyn MatrixCodec>,
        settings: PipelineSettings,
    ) -> Self {
        Self {
            store,
            codec,
            settings,
        }
    }

    pub fn settings(&self) -> &PipelineSettings {
        &self.settings
    }

    /// Run only the check phase: parse the file and resolve accessions
    pub async fn check(&self, input: &Path, format: Option<MatrixFormat>) -> Result<CheckReport> {
        let format = format.unwrap_or_else(|| MatrixFormat::detect(input));
        let (descriptor, outcome, _) = self.check_phase(input, format).await?;

        Ok(CheckReport {
            format,
            descriptor,
            outcome,
        })
    }

    /// Run a full import job
    ///
    /// Validation problems and post-processing failures end the job as
    /// `Failed` with the problems in the report; an `Err` is returned only if
    /// the job record itself cannot be written.
    #[instrument(skip(self, request), fields(input = %request.input.display()))]
    pub async fn run(&self, request: GenotypeImportRequest) -> Result<ImportReport> {
        let format = request.resolved_format();
        let mut job = ImportJob::new(&request.input, format);
        self.store.create_job(&job).await?;

        info!(job_id = %job.id, %format, "Starting genotype import");

        let mut report = ImportReport::new(job.id);
        if let Err(e) = self.execute(&request, format, &mut job, &mut report).await {
            error!(job_id = %job.id, error = %e, "Genotype import failed");
            job.outcome.record(e.status_kind(), None, e.to_string());
            job.transition(JobStatus::Failed);
            // The input stays for a rerun once post-processing has touched the store
            if !report.post_processing_started {
                self.discard_input(&request.input).await;
            }
        }

        self.store.update_job(&job).await?;

        report.status = job.status;
        report.dataset_id = job.dataset_id;
        report.outcome = job.outcome;

        info!(
            job_id = %report.job_id,
            status = report.status.as_str(),
            dataset_id = ?report.dataset_id,
            visibility = ?report.visibility,
            problems = report.outcome.len(),
            "Genotype import finished"
        );

        Ok(report)
    }

    async fn execute(
        &self,
        request: &GenotypeImportRequest,
        format: MatrixFormat,
        job: &mut ImportJob,
        report: &mut ImportReport,
    ) -> Result<()> {
        job.transition(JobStatus::Checking);
        self.store.update_job(job).await?;

        let (descriptor, outcome, resolver) = self.check_phase(&request.input, format).await?;

        let dataset_id = match request.dataset_id {
            Some(id) => {
                self.store.reuse_dataset(id, job.id).await?;
                id
            },
            None => {
                self.store
                    .create_dataset(descriptor.dataset_name(), descriptor.native_orientation(), job.id)
                    .await?
            },
        };
        job.dataset_id = Some(dataset_id);
        report.visibility = Some(Visibility::Hidden);

        if outcome.has_errors() {
            warn!(
                job_id = %job.id,
                dataset_id,
                problems = outcome.len(),
                "Check phase found problems, import skipped"
            );
            job.outcome.merge(outcome);

            let gate = PublicationGate::new(self.store.clone(), self.settings.cleanup_on_failure);
            report.visibility = Some(
                gate.withhold_after_validation(dataset_id, self.settings.dataset_on_validation_failure)
                    .await?,
            );
            self.discard_input(&request.input).await;
            job.transition(JobStatus::Failed);
            return Ok(());
        }

        job.transition(JobStatus::Importing);
        self.store.update_job(job).await?;

        let scratch = self.settings.work_dir.join(format!("job-{}", job.id));
        tokio::fs::create_dir_all(&scratch).await?;

        let result = self
            .import(request, format, descriptor, resolver, dataset_id, &scratch, job, report)
            .await;

        if let Err(e) = tokio::fs::remove_dir_all(&scratch).await {
            warn!(path = %scratch.display(), error = %e, "Failed to remove job scratch directory");
        }

        result
    }

    #[allow(clippy::too_many_arguments)]
    async fn import(
        &self,
        request: &GenotypeImportRequest,
        format: MatrixFormat,
        descriptor: MatrixDescriptor,
        mut resolver: IdentifierResolver,
        dataset_id: i64,
        scratch: &Path,
        job: &mut ImportJob,
        report: &mut ImportReport,
    ) -> Result<()> {
        let store = self.store.as_ref();
        let loader = StagingBulkLoader::new(scratch);

        // Markers first: every later step needs resolved marker ids
        let marker_type_id = store.marker_type_id(descriptor.marker_type()).await?;
        report.markers_created = resolver
            .create_missing_markers(store, &loader, &descriptor, marker_type_id)
            .await?;

        let native = descriptor.native_orientation();
        let native_matrix = scratch.join(format!("matrix.{}.txt", native.as_str()));
        let (written, second_outcome) =
            parse_matrix(request.input.clone(), format, Some(native_matrix.clone())).await?;
        if second_outcome.has_errors() || !written.same_axes(&descriptor) {
            return Err(IngestError::Validation(format!(
                "{} changed between check and import",
                request.input.display()
            )));
        }

        let map_id = if descriptor.has_positions() {
            Some(store.create_map(descriptor.map_name()).await?)
        } else {
            None
        };
        report.map_id = map_id;

        let definitions = match map_id {
            Some(map_id) => map_definitions(&descriptor, &resolver, map_id)?,
            None => Vec::new(),
        };
        let members = dataset_members(&descriptor, &resolver, dataset_id)?;

        let artifact_dir = self.settings.artifact_dir.join(format!("dataset-{}", dataset_id));
        tokio::fs::create_dir_all(&artifact_dir).await?;

        let definition_count = definitions.len();
        let member_count = members.len();

        let units = [
            self.map_definitions_unit(&loader, map_id, definitions),
            self.members_unit(&loader, members),
            self.codec_unit(
                UnitKind::NativeMatrix,
                dataset_id,
                native,
                native_matrix.clone(),
                artifact_dir.clone(),
                None,
            ),
            self.codec_unit(
                UnitKind::TransposedMatrix,
                dataset_id,
                native.transposed(),
                scratch.join(format!("matrix.{}.txt", native.transposed().as_str())),
                artifact_dir,
                Some((native_matrix, native_axes(&descriptor))),
            ),
        ];

        report.post_processing_started = true;
        let sink = OutcomeSink::new();
        let barrier = PostProcessingCoordinator::new(sink.clone()).run(units).await;
        job.outcome.merge(sink.snapshot());

        if matches!(barrier.status(UnitKind::MapDefinitions), Some(UnitStatus::Completed(_))) {
            report.map_definitions = definition_count;
        }
        if matches!(barrier.status(UnitKind::DatasetMembers), Some(UnitStatus::Completed(_))) {
            report.members = member_count;
        }
        report.units = barrier.reports.clone();

        let gate = PublicationGate::new(self.store.clone(), self.settings.cleanup_on_failure);
        let visibility = gate.conclude(dataset_id, map_id, &barrier).await?;
        report.visibility = Some(visibility);

        if visibility == Visibility::Public {
            job.transition(JobStatus::Completed);
        } else {
            job.transition(JobStatus::Failed);
        }
        Ok(())
    }

    async fn check_phase(
        &self,
        input: &Path,
        format: MatrixFormat,
    ) -> Result<(MatrixDescriptor, JobOutcome, IdentifierResolver)> {
        let (descriptor, mut outcome) = parse_matrix(input.to_path_buf(), format, None).await?;

        let resolver = IdentifierResolver::load(self.store.as_ref()).await?;
        let unknown = resolver.check_accessions(&descriptor, &mut outcome);

        info!(
            markers = descriptor.markers.len(),
            accessions = descriptor.accessions.len(),
            unknown_accessions = unknown,
            problems = outcome.len(),
            "Check phase finished"
        );

        Ok((descriptor, outcome, resolver))
    }

    fn map_definitions_unit(
        &self,
        loader: &StagingBulkLoader,
        map_id: Option<i64>,
        definitions: Vec<MapDefinition>,
    ) -> PostProcessingUnit {
        let store = self.store.clone();
        let loader = loader.clone();

        PostProcessingUnit::new(UnitKind::MapDefinitions, async move {
            if map_id.is_none() {
                return Ok(UnitOutput::Skipped("no position data".to_string()));
            }
            let loaded = loader
                .load(store.as_ref(), &MAP_DEFINITIONS, &definitions)
                .await?;
            Ok(UnitOutput::Completed(format!("{} map definitions", loaded)))
        })
    }

    fn members_unit(
        &self,
        loader: &StagingBulkLoader,
        members: Vec<DatasetMember>,
    ) -> PostProcessingUnit {
        let store = self.store.clone();
        let loader = loader.clone();

        PostProcessingUnit::new(UnitKind::DatasetMembers, async move {
            let loaded = loader.load(store.as_ref(), &DATASET_MEMBERS, &members).await?;
            Ok(UnitOutput::Completed(format!("{} dataset members", loaded)))
        })
    }

    /// Encode one orientation, transposing `transpose_from` into `matrix` first when given
    ///
    /// `transpose_from` carries the native matrix and its `(rows, columns)`;
    /// a transpose that saw any other shape fails the unit.
    fn codec_unit(
        &self,
        kind: UnitKind,
        dataset_id: i64,
        orientation: Orientation,
        matrix: PathBuf,
        artifact_dir: PathBuf,
        transpose_from: Option<(PathBuf, (usize, usize))>,
    ) -> PostProcessingUnit {
        let store = self.store.clone();
        let codec = self.codec.clone();
        let transposer = Transposer::new()
            .with_batch_lines(self.settings.transpose_batch_lines)
            .with_spill_dir(self.settings.work_dir.join("spill"));

        PostProcessingUnit::new(kind, async move {
            if let Some((source, (rows, columns))) = transpose_from {
                let stats = transposer.transpose_file(&source, &matrix).await?;
                let shape_ok = stats.rows_in == rows && (rows == 0 || stats.columns == columns);
                if !shape_ok || stats.skipped_values > 0 {
                    return Err(IngestError::Validation(format!(
                        "transposed {}x{} matrix ({} values skipped), expected {}x{}",
                        stats.rows_in, stats.columns, stats.skipped_values, rows, columns
                    )));
                }
            }

            let path = artifact_dir.join(format!("matrix.{}.bin", orientation.as_str()));
            codec.encode(&matrix, orientation, &path).await?;

            let digest_path = path.clone();
            let sha256 = tokio::task::spawn_blocking(move || sha256_file(&digest_path)).await??;

            let artifact = MatrixArtifact {
                orientation,
                path,
                sha256,
            };
            store.record_artifact(dataset_id, &artifact).await?;

            Ok(UnitOutput::Completed(format!(
                "{} artifact {}",
                orientation,
                artifact.path.display()
            )))
        })
    }

    async fn discard_input(&self, input: &Path) {
        if !self.settings.delete_input_on_failure {
            return;
        }
        match tokio::fs::remove_file(input).await {
            Ok(()) => info!(path = %input.display(), "Deleted input of failed job"),
            Err(e) => warn!(path = %input.display(), error = %e, "Failed to delete input"),
        }
    }
}

/// Parse on a blocking thread, optionally writing the calls-only matrix
async fn parse_matrix(
    input: PathBuf,
    format: MatrixFormat,
    matrix_out: Option<PathBuf>,
) -> Result<(MatrixDescriptor, JobOutcome)> {
    tokio::task::spawn_blocking(move || -> Result<(MatrixDescriptor, JobOutcome)> {
        let parser = MatrixParser::new(format, source_name(&input));
        let mut outcome = JobOutcome::new();

        let descriptor = match matrix_out {
            Some(path) => {
                let mut writer = MatrixWriter::create(&path)?;
                let descriptor = parser.parse_file(&input, &mut writer, &mut outcome)?;
                writer.finish()?;
                descriptor
            },
            None => parser.parse_file(&input, &mut NullSink, &mut outcome)?,
        };

        Ok((descriptor, outcome))
    })
    .await?
}

/// `(rows, columns)` of the calls-only matrix in its native orientation
fn native_axes(descriptor: &MatrixDescriptor) -> (usize, usize) {
    match descriptor.native_orientation() {
        Orientation::AccessionMajor => (descriptor.accessions.len(), descriptor.markers.len()),
        Orientation::MarkerMajor => (descriptor.markers.len(), descriptor.accessions.len()),
    }
}

fn map_definitions(
    descriptor: &MatrixDescriptor,
    resolver: &IdentifierResolver,
    map_id: i64,
) -> Result<Vec<MapDefinition>> {
    descriptor
        .placements()
        .map(|(marker, chromosome, position)| {
            let marker_id = resolver.marker_id(marker).ok_or_else(|| {
                IngestError::Internal(format!("marker '{}' is unresolved", marker))
            })?;
            Ok(MapDefinition {
                map_id,
                marker_id,
                chromosome: chromosome.to_string(),
                position,
            })
        })
        .collect()
}

/// One member row per distinct marker and accession id observed in the matrix
fn dataset_members(
    descriptor: &MatrixDescriptor,
    resolver: &IdentifierResolver,
    dataset_id: i64,
) -> Result<Vec<DatasetMember>> {
    let markers = resolver.resolve_markers(descriptor)?;
    let accessions = resolver.resolve_accessions(descriptor)?;

    let mut seen = HashSet::new();
    let members = markers
        .into_iter()
        .map(|id| (MemberKind::Marker, id))
        .chain(accessions.into_iter().map(|id| (MemberKind::Accession, id)))
        .filter(|member| seen.insert(*member))
        .map(|(kind, member_id)| DatasetMember {
            dataset_id,
            kind,
            member_id,
        })
        .collect();

    Ok(members)
}
