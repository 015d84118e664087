//! Genobank Ingest - genotype matrix import tool

use anyhow::Result;
use clap::{Parser, Subcommand};
use genobank_common::logging::{init_logging, LogConfig, LogLevel};
use genobank_common::MatrixFormat;
use genobank_ingest::config::Config;
use genobank_ingest::db;
use genobank_ingest::genotype::{
    ExternalCodec, GenotypeImportRequest, GenotypePipeline, PgGenotypeStore, Transposer,
    ValidationFailurePolicy,
};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "genobank-ingest")]
#[command(author, version, about = "Genobank genotype matrix ingestion tool")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Scratch directory (overrides GENOTYPE_WORK_DIR)
    #[arg(long, global = true)]
    work_dir: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Check a matrix file without importing it
    Check {
        /// Matrix file (flat or Hapmap, optionally gzipped)
        #[arg(short, long)]
        input: PathBuf,

        /// Input format; detected from the file name when omitted
        #[arg(short, long)]
        format: Option<MatrixFormat>,
    },

    /// Check and import a matrix file
    Import {
        #[arg(short, long)]
        input: PathBuf,

        #[arg(short, long)]
        format: Option<MatrixFormat>,

        /// Import into this existing dataset instead of creating one
        #[arg(long)]
        dataset_id: Option<i64>,

        /// Delete the input file if the job fails before post-processing
        #[arg(long)]
        delete_input_on_failure: bool,

        /// What to do with the dataset when the check phase fails (keep | delete)
        #[arg(long)]
        on_validation_failure: Option<ValidationFailurePolicy>,
    },

    /// Transpose a tab-delimited matrix using bounded memory
    Transpose {
        #[arg(short, long)]
        input: PathBuf,

        #[arg(short, long)]
        output: PathBuf,

        /// Leading lines copied verbatim to the output
        #[arg(long, default_value_t = 0)]
        header_lines: usize,

        /// Rows read per batch (overrides GENOTYPE_TRANSPOSE_BATCH_LINES)
        #[arg(long)]
        batch_lines: Option<usize>,
    },

    /// Apply database migrations
    Migrate,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_level = if cli.verbose {
        LogLevel::Debug
    } else {
        LogLevel::Info
    };

    let log_config = LogConfig::builder()
        .level(log_level)
        .log_file_prefix("genobank-ingest")
        .filter_directives("genobank_ingest=debug,sqlx=warn")
        .build();

    // Environment variables take precedence
    let log_config = log_config.clone().merge_env().unwrap_or(log_config);

    let _guard = init_logging(&log_config)?;

    let mut config = Config::load()?;
    if let Some(work_dir) = cli.work_dir {
        config.genotype.work_dir = work_dir;
    }

    match cli.command {
        Command::Check { input, format } => {
            let pipeline = build_pipeline(&config).await?;
            let report = pipeline.check(&input, format).await?;

            println!("{}", serde_json::to_string_pretty(&report.outcome)?);
            if report.outcome.has_errors() {
                anyhow::bail!("{} failed the check phase", input.display());
            }
            info!(
                markers = report.descriptor.markers.len(),
                accessions = report.descriptor.accessions.len(),
                "Check passed"
            );
        },
        Command::Import {
            input,
            format,
            dataset_id,
            delete_input_on_failure,
            on_validation_failure,
        } => {
            if delete_input_on_failure {
                config.genotype.delete_input_on_failure = true;
            }
            if let Some(policy) = on_validation_failure {
                config.genotype.dataset_on_validation_failure = policy;
            }

            let pipeline = build_pipeline(&config).await?;
            let mut request = GenotypeImportRequest::new(input);
            if let Some(format) = format {
                request = request.with_format(format);
            }
            if let Some(dataset_id) = dataset_id {
                request = request.with_dataset(dataset_id);
            }

            let report = pipeline.run(request).await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
            if !report.succeeded() {
                anyhow::bail!("import job {} failed", report.job_id);
            }
        },
        Command::Transpose {
            input,
            output,
            header_lines,
            batch_lines,
        } => {
            let stats = Transposer::new()
                .with_header_lines(header_lines)
                .with_batch_lines(batch_lines.unwrap_or(config.genotype.transpose_batch_lines))
                .with_spill_dir(config.genotype.work_dir.join("spill"))
                .transpose_file(&input, &output)
                .await?;
            info!(
                rows_in = stats.rows_in,
                rows_out = stats.columns,
                skipped = stats.skipped_values,
                "Transpose complete"
            );
        },
        Command::Migrate => {
            let pool = db::create_pool(&config.database).await?;
            db::run_migrations(&pool).await?;
        },
    }

    Ok(())
}

async fn build_pipeline(config: &Config) -> Result<GenotypePipeline> {
    let pool = db::create_pool(&config.database).await?;
    let store = Arc::new(PgGenotypeStore::new(pool));
    let codec = Arc::new(ExternalCodec::new(
        config.genotype.codec_program.clone(),
        config.genotype.codec_args.clone(),
    ));

    Ok(GenotypePipeline::new(
        store,
        codec,
        config.genotype.pipeline_settings(),
    ))
}
