//! Matrix codec adapters
//!
//! A codec turns a tab-delimited, calls-only matrix into the binary columnar
//! artifact served to readers. The binary layout belongs to the codec; this
//! side only knows "text matrix + orientation in, one file out".

use crate::genotype::{IngestError, Result};
use async_trait::async_trait;
use genobank_common::Orientation;
use std::path::{Path, PathBuf};
use tokio::process::Command;
use tracing::{debug, info, instrument};

/// Bytes of codec stderr kept in error messages
const STDERR_TAIL: usize = 2048;

#[async_trait]
pub trait MatrixCodec: Send + Sync {
    /// Encode `matrix` (rows in `orientation`) into a binary artifact at `artifact`
    async fn encode(&self, matrix: &Path, orientation: Orientation, artifact: &Path) -> Result<()>;
}

/// Runs an external program:
/// `<program> <args...> --orientation <accession|marker> <matrix> <artifact>`
#[derive(Debug, Clone)]
pub struct ExternalCodec {
    program: PathBuf,
    args: Vec<String>,
}

impl ExternalCodec {
    pub fn new(program: impl Into<PathBuf>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    fn command(&self, matrix: &Path, orientation: Orientation, artifact: &Path) -> Command {
        let mut command = Command::new(&self.program);
        command
            .args(&self.args)
            .arg("--orientation")
            .arg(orientation.as_str())
            .arg(matrix)
            .arg(artifact)
            .kill_on_drop(true);
        command
    }
}

#[async_trait]
impl MatrixCodec for ExternalCodec {
    #[instrument(skip(self), fields(program = %self.program.display()))]
    async fn encode(&self, matrix: &Path, orientation: Orientation, artifact: &Path) -> Result<()> {
        debug!("Starting matrix codec");

        let output = self
            .command(matrix, orientation, artifact)
            .output()
            .await
            .map_err(|e| {
                IngestError::Codec(format!(
                    "failed to start {}: {}",
                    self.program.display(),
                    e
                ))
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let start = stderr.len().saturating_sub(STDERR_TAIL);
            let tail = stderr.get(start..).unwrap_or(&stderr);
            return Err(IngestError::Codec(format!(
                "{} exited with {}: {}",
                self.program.display(),
                output.status,
                tail.trim()
            )));
        }

        if !tokio::fs::try_exists(artifact).await? {
            return Err(IngestError::Codec(format!(
                "{} reported success but wrote no artifact at {}",
                self.program.display(),
                artifact.display()
            )));
        }

        info!(artifact = %artifact.display(), "Encoded matrix artifact");
        Ok(())
    }
}

#[cfg(all(test, unix))]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn shell_codec(script: &str) -> ExternalCodec {
        // `sh -c <script> codec --orientation <o> <in> <out>` binds $0..$4
        ExternalCodec::new("sh", vec!["-c".to_string(), script.to_string(), "codec".to_string()])
    }

    #[tokio::test]
    async fn test_external_codec_writes_artifact() {
        let dir = tempfile::tempdir().unwrap();
        let matrix = dir.path().join("matrix.txt");
        let artifact = dir.path().join("matrix.bin");
        std::fs::write(&matrix, "A\tC\n").unwrap();

        shell_codec(r#"printf '%s' "$2" > "$4""#)
            .encode(&matrix, Orientation::MarkerMajor, &artifact)
            .await
            .unwrap();

        assert_eq!(std::fs::read_to_string(&artifact).unwrap(), "marker");
    }

    #[tokio::test]
    async fn test_external_codec_failure_carries_stderr() {
        let dir = tempfile::tempdir().unwrap();
        let matrix = dir.path().join("matrix.txt");
        std::fs::write(&matrix, "A\tC\n").unwrap();

        let err = shell_codec("echo 'bad matrix' >&2; exit 3")
            .encode(&matrix, Orientation::AccessionMajor, &dir.path().join("out.bin"))
            .await
            .unwrap_err();

        match err {
            IngestError::Codec(message) => assert!(message.contains("bad matrix")),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_external_codec_requires_output() {
        let dir = tempfile::tempdir().unwrap();
        let matrix = dir.path().join("matrix.txt");
        std::fs::write(&matrix, "A\tC\n").unwrap();

        let err = shell_codec("exit 0")
            .encode(&matrix, Orientation::AccessionMajor, &dir.path().join("out.bin"))
            .await
            .unwrap_err();

        assert!(matches!(err, IngestError::Codec(_)));
    }
}
