//! External-memory matrix transpose
//!
//! The input is read in batches of `batch_lines` rows. For each batch every
//! column's values are appended to that column's spill file, each value
//! followed by a tab. When the input is exhausted each spill file holds one
//! complete output row; the files are concatenated in column order with the
//! trailing tab dropped. At most one batch is held in memory.
//!
//! Only end of input ends the matrix: a blank line is a row whose single value
//! is empty, as written for one-column matrices with a missing call.
//!
//! Every row is expected to be as wide as the first data row. A short row
//! simply contributes nothing to the columns it lacks, and values past the
//! first row's width are dropped; both are counted in
//! [`TransposeStats::skipped_values`].

use crate::genotype::Result;
use std::fs::{File, OpenOptions};
use std::io::{self, BufRead, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tracing::{debug, info, warn};

/// Rows read per batch
pub const DEFAULT_BATCH_LINES: usize = 10_000;

const DELIMITER: u8 = b'\t';

/// Counters from one transpose run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TransposeStats {
    /// Data rows read (header prefix excluded)
    pub rows_in: usize,
    /// Columns of the first data row, i.e. rows written
    pub columns: usize,
    /// Values missing from short rows or beyond the first row's width
    pub skipped_values: usize,
}

#[derive(Debug, Clone)]
pub struct Transposer {
    batch_lines: usize,
    header_lines: usize,
    spill_dir: Option<PathBuf>,
}

impl Default for Transposer {
    fn default() -> Self {
        Self {
            batch_lines: DEFAULT_BATCH_LINES,
            header_lines: 0,
            spill_dir: None,
        }
    }
}

impl Transposer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_batch_lines(mut self, batch_lines: usize) -> Self {
        self.batch_lines = batch_lines.max(1);
        self
    }

    /// Number of leading lines copied verbatim to the top of the output
    pub fn with_header_lines(mut self, header_lines: usize) -> Self {
        self.header_lines = header_lines;
        self
    }

    /// Directory under which spill files are created (system temp dir otherwise)
    pub fn with_spill_dir(mut self, spill_dir: impl Into<PathBuf>) -> Self {
        self.spill_dir = Some(spill_dir.into());
        self
    }

    /// Transpose `input` into `output` on a blocking worker thread
    pub async fn transpose_file(&self, input: &Path, output: &Path) -> Result<TransposeStats> {
        let transposer = self.clone();
        let input = input.to_path_buf();
        let output = output.to_path_buf();

        tokio::task::spawn_blocking(move || transposer.transpose(&input, &output)).await?
    }

    /// Transpose the file at `input` into a new file at `output`
    pub fn transpose(&self, input: &Path, output: &Path) -> Result<TransposeStats> {
        let reader = io::BufReader::new(File::open(input)?);
        let writer = BufWriter::new(File::create(output)?);

        let stats = self.transpose_reader(reader, writer)?;
        info!(
            input = %input.display(),
            output = %output.display(),
            rows_in = stats.rows_in,
            columns = stats.columns,
            "Transposed matrix"
        );
        Ok(stats)
    }

    pub fn transpose_reader<R: BufRead, W: Write>(
        &self,
        reader: R,
        mut writer: W,
    ) -> Result<TransposeStats> {
        let mut stats = TransposeStats::default();
        let mut lines = reader.lines();

        for _ in 0..self.header_lines {
            match lines.next() {
                Some(line) => {
                    writer.write_all(line?.as_bytes())?;
                    writer.write_all(b"\n")?;
                },
                None => break,
            }
        }

        let mut spill: Option<SpillSet> = None;
        let mut batch: Vec<String> = Vec::with_capacity(self.batch_lines);

        loop {
            batch.clear();
            while batch.len() < self.batch_lines {
                let Some(line) = lines.next() else {
                    break;
                };
                let mut line = line?;
                if line.ends_with('\r') {
                    line.pop();
                }
                // A blank line is a row holding one empty value
                batch.push(line);
            }
            if batch.is_empty() {
                break;
            }

            let rows: Vec<Vec<&str>> = batch.iter().map(|l| l.split('\t').collect()).collect();
            if spill.is_none() {
                spill = Some(SpillSet::create(rows[0].len(), self.spill_dir.as_deref())?);
            }
            if let Some(set) = spill.as_mut() {
                stats.skipped_values += set.append_batch(&rows)?;
            }
            stats.rows_in += rows.len();
            debug!(rows = stats.rows_in, "Spilled batch");
        }

        if let Some(spill) = spill {
            stats.columns = spill.columns();
            spill.drain_into(&mut writer)?;
        }
        writer.flush()?;

        if stats.skipped_values > 0 {
            warn!(
                skipped = stats.skipped_values,
                "Rows did not match the first row's width; values skipped"
            );
        }

        Ok(stats)
    }
}

/// One open spill file per column, living in a private temp directory
struct SpillSet {
    dir: TempDir,
    files: Vec<File>,
}

impl SpillSet {
    fn create(columns: usize, parent: Option<&Path>) -> io::Result<Self> {
        let dir = match parent {
            Some(parent) => {
                std::fs::create_dir_all(parent)?;
                tempfile::Builder::new().prefix("transpose-").tempdir_in(parent)?
            },
            None => tempfile::Builder::new().prefix("transpose-").tempdir()?,
        };

        let files = (0..columns)
            .map(|c| {
                OpenOptions::new()
                    .read(true)
                    .write(true)
                    .create_new(true)
                    .open(dir.path().join(format!("col-{:06}", c)))
            })
            .collect::<io::Result<Vec<_>>>()?;

        debug!(columns, dir = %dir.path().display(), "Opened spill files");
        Ok(Self { dir, files })
    }

    fn columns(&self) -> usize {
        self.files.len()
    }

    /// Append one batch, column by column; returns the number of skipped values
    fn append_batch(&mut self, rows: &[Vec<&str>]) -> io::Result<usize> {
        let columns = self.files.len();
        let mut skipped: usize = rows.iter().map(|r| r.len().saturating_sub(columns)).sum();
        let mut buf = Vec::new();

        for (c, file) in self.files.iter_mut().enumerate() {
            buf.clear();
            for row in rows {
                match row.get(c) {
                    Some(value) => {
                        buf.extend_from_slice(value.as_bytes());
                        buf.push(DELIMITER);
                    },
                    None => skipped += 1,
                }
            }
            file.write_all(&buf)?;
        }

        Ok(skipped)
    }

    /// Write every spill file as one output line, then remove the spill directory
    fn drain_into<W: Write>(self, writer: &mut W) -> io::Result<()> {
        let SpillSet { dir, files } = self;

        for mut file in files {
            let len = file.seek(SeekFrom::End(0))?;
            file.seek(SeekFrom::Start(0))?;
            // Drop the dangling delimiter after the last value
            io::copy(&mut (&mut file).take(len.saturating_sub(1)), writer)?;
            writer.write_all(b"\n")?;
        }

        dir.close()
    }
}
