//! Configuration management

use crate::genotype::pipeline::PipelineSettings;
use crate::genotype::publication::ValidationFailurePolicy;
use crate::genotype::transpose::DEFAULT_BATCH_LINES;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

// ============================================================================
// Database Configuration Constants
// ============================================================================

/// Default database URL for local development.
pub const DEFAULT_DATABASE_URL: &str = "postgresql://localhost/genobank";

/// Default maximum database connections in the pool.
///
/// Post-processing holds up to three connections at once (two bulk loads and
/// an artifact write) on top of the pipeline's own.
pub const DEFAULT_DATABASE_MAX_CONNECTIONS: u32 = 10;

/// Default minimum database connections in the pool.
pub const DEFAULT_DATABASE_MIN_CONNECTIONS: u32 = 2;

/// Default database connection timeout in seconds.
pub const DEFAULT_DATABASE_CONNECT_TIMEOUT_SECS: u64 = 10;

/// Default database idle timeout in seconds (10 minutes).
pub const DEFAULT_DATABASE_IDLE_TIMEOUT_SECS: u64 = 600;

// ============================================================================
// Genotype Pipeline Constants
// ============================================================================

/// Default scratch directory for staging, spill and matrix files.
pub const DEFAULT_GENOTYPE_WORK_DIR: &str = "/tmp/genobank";

/// Default directory for binary matrix artifacts.
pub const DEFAULT_GENOTYPE_ARTIFACT_DIR: &str = "/var/lib/genobank/artifacts";

/// Default external codec program.
pub const DEFAULT_GENOTYPE_CODEC_PROGRAM: &str = "genotype-matrix-codec";

/// Ingestion configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub database: DatabaseConfig,
    pub genotype: GenotypeConfig,
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
    pub connect_timeout_secs: u64,
    pub idle_timeout_secs: u64,
}

/// Genotype pipeline configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenotypeConfig {
    pub work_dir: PathBuf,
    pub artifact_dir: PathBuf,
    pub transpose_batch_lines: usize,
    pub codec_program: PathBuf,
    pub codec_args: Vec<String>,
    pub delete_input_on_failure: bool,
    pub dataset_on_validation_failure: ValidationFailurePolicy,
    pub cleanup_on_failure: bool,
}

impl GenotypeConfig {
    pub fn pipeline_settings(&self) -> PipelineSettings {
        PipelineSettings {
            work_dir: self.work_dir.clone(),
            artifact_dir: self.artifact_dir.clone(),
            transpose_batch_lines: self.transpose_batch_lines,
            delete_input_on_failure: self.delete_input_on_failure,
            dataset_on_validation_failure: self.dataset_on_validation_failure,
            cleanup_on_failure: self.cleanup_on_failure,
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|s| s.trim().parse().ok())
}

impl Config {
    /// Load configuration from environment and defaults
    pub fn load() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let config = Config {
            database: DatabaseConfig {
                url: std::env::var("DATABASE_URL")
                    .unwrap_or_else(|_| DEFAULT_DATABASE_URL.to_string()),
                max_connections: env_parse("DATABASE_MAX_CONNECTIONS")
                    .unwrap_or(DEFAULT_DATABASE_MAX_CONNECTIONS),
                min_connections: env_parse("DATABASE_MIN_CONNECTIONS")
                    .unwrap_or(DEFAULT_DATABASE_MIN_CONNECTIONS),
                connect_timeout_secs: env_parse("DATABASE_CONNECT_TIMEOUT")
                    .unwrap_or(DEFAULT_DATABASE_CONNECT_TIMEOUT_SECS),
                idle_timeout_secs: env_parse("DATABASE_IDLE_TIMEOUT")
                    .unwrap_or(DEFAULT_DATABASE_IDLE_TIMEOUT_SECS),
            },
            genotype: GenotypeConfig {
                work_dir: std::env::var("GENOTYPE_WORK_DIR")
                    .unwrap_or_else(|_| DEFAULT_GENOTYPE_WORK_DIR.to_string())
                    .into(),
                artifact_dir: std::env::var("GENOTYPE_ARTIFACT_DIR")
                    .unwrap_or_else(|_| DEFAULT_GENOTYPE_ARTIFACT_DIR.to_string())
                    .into(),
                transpose_batch_lines: env_parse("GENOTYPE_TRANSPOSE_BATCH_LINES")
                    .unwrap_or(DEFAULT_BATCH_LINES),
                codec_program: std::env::var("GENOTYPE_CODEC_PROGRAM")
                    .unwrap_or_else(|_| DEFAULT_GENOTYPE_CODEC_PROGRAM.to_string())
                    .into(),
                codec_args: std::env::var("GENOTYPE_CODEC_ARGS")
                    .map(|s| s.split_whitespace().map(str::to_string).collect())
                    .unwrap_or_default(),
                delete_input_on_failure: env_parse("GENOTYPE_DELETE_INPUT_ON_FAILURE")
                    .unwrap_or(false),
                dataset_on_validation_failure: match std::env::var(
                    "GENOTYPE_DATASET_ON_VALIDATION_FAILURE",
                ) {
                    Ok(value) => value.parse().map_err(anyhow::Error::msg)?,
                    Err(_) => ValidationFailurePolicy::Keep,
                },
                cleanup_on_failure: env_parse("GENOTYPE_CLEANUP_ON_FAILURE").unwrap_or(true),
            },
        };

        config.validate()?;

        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        // Validate database URL
        if self.database.url.is_empty() {
            anyhow::bail!("Database URL cannot be empty");
        }

        // Validate connection pool settings
        if self.database.max_connections == 0 {
            anyhow::bail!("Database max_connections must be greater than 0");
        }

        if self.database.min_connections > self.database.max_connections {
            anyhow::bail!(
                "Database min_connections ({}) cannot be greater than max_connections ({})",
                self.database.min_connections,
                self.database.max_connections
            );
        }

        if self.genotype.transpose_batch_lines == 0 {
            anyhow::bail!("GENOTYPE_TRANSPOSE_BATCH_LINES must be greater than 0");
        }

        if self.genotype.codec_program.as_os_str().is_empty() {
            anyhow::bail!("GENOTYPE_CODEC_PROGRAM cannot be empty");
        }

        if self.genotype.work_dir == self.genotype.artifact_dir {
            // Job scratch directories are removed after each run
            tracing::warn!("Artifact directory equals the work directory");
        }

        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database: DatabaseConfig {
                url: DEFAULT_DATABASE_URL.to_string(),
                max_connections: DEFAULT_DATABASE_MAX_CONNECTIONS,
                min_connections: DEFAULT_DATABASE_MIN_CONNECTIONS,
                connect_timeout_secs: DEFAULT_DATABASE_CONNECT_TIMEOUT_SECS,
                idle_timeout_secs: DEFAULT_DATABASE_IDLE_TIMEOUT_SECS,
            },
            genotype: GenotypeConfig {
                work_dir: DEFAULT_GENOTYPE_WORK_DIR.into(),
                artifact_dir: DEFAULT_GENOTYPE_ARTIFACT_DIR.into(),
                transpose_batch_lines: DEFAULT_BATCH_LINES,
                codec_program: DEFAULT_GENOTYPE_CODEC_PROGRAM.into(),
                codec_args: Vec::new(),
                delete_input_on_failure: false,
                dataset_on_validation_failure: ValidationFailurePolicy::Keep,
                cleanup_on_failure: true,
            },
        }
    }
}
