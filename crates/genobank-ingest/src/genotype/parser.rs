// Genotype matrix parsers (flat and Hapmap formats)
//
// Both parsers stream the input line by line. Header information is collected
// into a `MatrixDescriptor`; data rows are handed to a `RowSink` as they are
// read, so a caller can either discard them (check phase) or write them out
// (import phase) without holding the matrix in memory.

use crate::genotype::models::{canonical_directive, MatrixDescriptor};
use crate::genotype::outcome::{JobOutcome, StatusKind};
use crate::genotype::Result;
use flate2::read::MultiGzDecoder;
use genobank_common::MatrixFormat;
use std::collections::HashSet;
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;
use tracing::{debug, info};

// ============================================================================
// Format constants
// ============================================================================

pub const DIRECTIVE_PREFIX: char = '#';

pub const CHROMOSOME_ROW_PREFIX: &str = "Linkage Group / Chromosome";
pub const POSITION_ROW_PREFIX: &str = "Position";
pub const MARKER_ROW_PREFIX: &str = "Lines/Markers";

/// Fixed leading columns of a Hapmap header row
pub const HAPMAP_HEADER: [&str; 11] = [
    "rs#",
    "alleles",
    "chrom",
    "pos",
    "strand",
    "assembly#",
    "center",
    "protLSID",
    "assayLSID",
    "panelLSID",
    "QCcode",
];

pub const HAPMAP_CHROM_COLUMN: usize = 2;
pub const HAPMAP_POS_COLUMN: usize = 3;
pub const HAPMAP_FIRST_CALL_COLUMN: usize = HAPMAP_HEADER.len();

/// Open a matrix file for streaming, gunzipping `.gz` inputs on the fly
pub fn open_matrix(path: &Path) -> Result<Box<dyn BufRead + Send>> {
    let file = File::open(path)?;
    let gzipped = path
        .extension()
        .map(|ext| ext.eq_ignore_ascii_case("gz"))
        .unwrap_or(false);

    if gzipped {
        Ok(Box::new(BufReader::new(MultiGzDecoder::new(file))))
    } else {
        Ok(Box::new(BufReader::new(file)))
    }
}

/// Name used for directive defaults: the input file name
pub fn source_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

// ============================================================================
// Row sinks
// ============================================================================

/// One data row as read from the input
#[derive(Debug)]
pub struct DataRow<'a> {
    /// Zero-based line index in the input
    pub line: usize,
    /// Accession (flat) or marker (Hapmap) name
    pub name: &'a str,
    /// Allele calls in column order
    pub calls: &'a [&'a str],
}

/// Receiver for data rows streamed by [`MatrixParser`]
pub trait RowSink {
    fn accept(&mut self, row: &DataRow<'_>) -> Result<()>;
}

/// Discards every row
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl RowSink for NullSink {
    fn accept(&mut self, _row: &DataRow<'_>) -> Result<()> {
        Ok(())
    }
}

/// Writes the allele calls of every row as a tab-delimited matrix
///
/// The output carries no header and no row names; the descriptor holds both
/// axes. Rows keep the input's native orientation.
pub struct MatrixWriter {
    writer: BufWriter<File>,
    rows: usize,
}

impl MatrixWriter {
    pub fn create(path: &Path) -> Result<Self> {
        Ok(Self {
            writer: BufWriter::new(File::create(path)?),
            rows: 0,
        })
    }

    /// Flush the output and return the number of rows written
    pub fn finish(mut self) -> Result<usize> {
        self.writer.flush()?;
        Ok(self.rows)
    }
}

impl RowSink for MatrixWriter {
    fn accept(&mut self, row: &DataRow<'_>) -> Result<()> {
        for (i, call) in row.calls.iter().enumerate() {
            if i > 0 {
                self.writer.write_all(b"\t")?;
            }
            self.writer.write_all(call.trim().as_bytes())?;
        }
        self.writer.write_all(b"\n")?;
        self.rows += 1;
        Ok(())
    }
}

// ============================================================================
// Matrix Parser
// ============================================================================

pub struct MatrixParser {
    format: MatrixFormat,
    source_name: String,
}

impl MatrixParser {
    pub fn new(format: MatrixFormat, source_name: impl Into<String>) -> Self {
        Self {
            format,
            source_name: source_name.into(),
        }
    }

    pub fn format(&self) -> MatrixFormat {
        self.format
    }

    /// Parse a matrix file from disk
    pub fn parse_file<S: RowSink>(
        &self,
        path: &Path,
        sink: &mut S,
        outcome: &mut JobOutcome,
    ) -> Result<MatrixDescriptor> {
        let reader = open_matrix(path)?;
        self.parse(reader, sink, outcome)
    }

    /// Parse a matrix from any buffered reader
    ///
    /// Validation findings go to `outcome` and never stop the scan. An `Err`
    /// is returned only for I/O failures or a sink error.
    pub fn parse<R: BufRead, S: RowSink>(
        &self,
        reader: R,
        sink: &mut S,
        outcome: &mut JobOutcome,
    ) -> Result<MatrixDescriptor> {
        info!(
            format = %self.format,
            source = %self.source_name,
            "Parsing genotype matrix"
        );

        let descriptor = match self.format {
            MatrixFormat::Flat => FlatParser::new(&self.source_name).parse(reader, sink, outcome)?,
            MatrixFormat::Hapmap => {
                HapmapParser::new(&self.source_name).parse(reader, sink, outcome)?
            },
        };

        info!(
            markers = descriptor.markers.len(),
            accessions = descriptor.accessions.len(),
            mapped = descriptor.has_positions(),
            problems = outcome.len(),
            "Parsed genotype matrix"
        );

        Ok(descriptor)
    }
}

/// Read lines with their zero-based index, stripping line terminators
fn numbered_lines<R: BufRead>(reader: R) -> impl Iterator<Item = (usize, std::io::Result<String>)> {
    reader.lines().enumerate().map(|(i, line)| {
        (
            i,
            line.map(|mut l| {
                if l.ends_with('\r') {
                    l.pop();
                }
                l
            }),
        )
    })
}

/// Parse a `# key = value` directive into the descriptor
fn apply_directive(descriptor: &mut MatrixDescriptor, line: &str, index: usize) {
    let body = line.trim_start_matches(DIRECTIVE_PREFIX).trim();
    let Some((key, value)) = body.split_once('=') else {
        debug!(line = index, "Skipping comment line");
        return;
    };

    let key = key.trim();
    let value = value.trim();
    if key.is_empty() || value.is_empty() {
        return;
    }

    let key = canonical_directive(key)
        .map(str::to_string)
        .unwrap_or_else(|| key.to_string());
    descriptor.directives.insert(key, value.to_string());
}

fn parse_position(value: &str, line: usize, outcome: &mut JobOutcome) -> Option<f64> {
    let value = value.trim();
    match value.parse::<f64>() {
        Ok(p) if p.is_finite() => Some(p),
        _ => {
            outcome.record(
                StatusKind::InvalidNumber,
                Some(line),
                format!("position '{}' is not a number", value),
            );
            None
        },
    }
}

/// Chromosomes are staged verbatim into map definitions
fn check_chromosome<'a>(value: &'a str, line: usize, outcome: &mut JobOutcome) -> &'a str {
    if value.contains(['\\', '\r']) {
        outcome.record(
            StatusKind::UnsafeValue,
            Some(line),
            format!("chromosome '{}' cannot be staged", value.escape_debug()),
        );
    }
    value
}

/// Record a marker name, reporting duplicates and unstageable names
fn check_marker_name(
    name: &str,
    line: usize,
    seen: &mut HashSet<String>,
    outcome: &mut JobOutcome,
) -> bool {
    if name.is_empty() {
        outcome.record(StatusKind::Validation, Some(line), "empty marker name");
        return false;
    }
    if name.contains('\\') {
        outcome.record(
            StatusKind::UnsafeValue,
            Some(line),
            format!("marker name '{}' contains a backslash", name),
        );
    }
    if !seen.insert(name.to_lowercase()) {
        outcome.record(
            StatusKind::DuplicateName,
            Some(line),
            format!("marker '{}' appears more than once", name),
        );
        return false;
    }
    true
}

// ============================================================================
// Flat format
// ============================================================================

/// Header rows recognised in the flat format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum HeaderRow {
    Chromosome,
    Position,
    Markers,
}

impl HeaderRow {
    fn classify(label: &str) -> Option<Self> {
        let starts_with = |prefix: &str| {
            label.len() >= prefix.len()
                && label.as_bytes()[..prefix.len()].eq_ignore_ascii_case(prefix.as_bytes())
        };

        if starts_with(CHROMOSOME_ROW_PREFIX) {
            Some(HeaderRow::Chromosome)
        } else if starts_with(POSITION_ROW_PREFIX) {
            Some(HeaderRow::Position)
        } else if starts_with(MARKER_ROW_PREFIX) {
            Some(HeaderRow::Markers)
        } else {
            None
        }
    }
}

struct FlatParser {
    descriptor: MatrixDescriptor,
    marker_row_seen: bool,
    data_started: bool,
    header_checked: bool,
    seen_markers: HashSet<String>,
    seen_accessions: HashSet<String>,
}

impl FlatParser {
    fn new(source_name: &str) -> Self {
        Self {
            descriptor: MatrixDescriptor::new(MatrixFormat::Flat, source_name),
            marker_row_seen: false,
            data_started: false,
            header_checked: false,
            seen_markers: HashSet::new(),
            seen_accessions: HashSet::new(),
        }
    }

    fn parse<R: BufRead, S: RowSink>(
        mut self,
        reader: R,
        sink: &mut S,
        outcome: &mut JobOutcome,
    ) -> Result<MatrixDescriptor> {
        for (index, line) in numbered_lines(reader) {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }

            if line.starts_with(DIRECTIVE_PREFIX) {
                if self.data_started {
                    debug!(line = index, "Skipping comment line inside data block");
                } else {
                    apply_directive(&mut self.descriptor, &line, index);
                }
                continue;
            }

            let fields: Vec<&str> = line.split('\t').collect();
            let label = fields[0].trim();

            if let Some(row) = HeaderRow::classify(label) {
                if self.data_started {
                    outcome.record(
                        StatusKind::Validation,
                        Some(index),
                        format!("'{}' row appears after the first data row", label),
                    );
                } else {
                    self.header_row(row, &fields[1..], index, outcome);
                }
                continue;
            }

            if !self.marker_row_seen {
                // Lenient header block: unknown lines before the marker row are skipped
                debug!(line = index, label, "Skipping unrecognised header line");
                continue;
            }

            if !self.data_started {
                self.data_started = true;
                self.check_header(outcome);
            }

            self.data_row(label, &fields[1..], index, sink, outcome)?;
        }

        if !self.marker_row_seen {
            outcome.record(
                StatusKind::MissingRequiredRow,
                None,
                format!("no '{}' row found", MARKER_ROW_PREFIX),
            );
        } else if !self.header_checked {
            self.check_header(outcome);
        }

        Ok(self.descriptor)
    }

    fn header_row(&mut self, row: HeaderRow, values: &[&str], index: usize, outcome: &mut JobOutcome) {
        match row {
            HeaderRow::Chromosome => {
                self.descriptor.chromosomes = values
                    .iter()
                    .map(|v| check_chromosome(v.trim(), index, outcome).to_string())
                    .collect();
            },
            HeaderRow::Position => {
                self.descriptor.positions =
                    values.iter().map(|v| parse_position(v, index, outcome)).collect();
            },
            HeaderRow::Markers => {
                self.marker_row_seen = true;
                self.descriptor.markers.clear();
                self.seen_markers.clear();
                for value in values {
                    let name = value.trim();
                    if check_marker_name(name, index, &mut self.seen_markers, outcome) {
                        self.descriptor.markers.push(name.to_string());
                    }
                }
            },
        }
    }

    /// Mapping rows, when present, must line up with the marker row
    fn check_header(&mut self, outcome: &mut JobOutcome) {
        self.header_checked = true;
        if !self.descriptor.is_consistent() {
            outcome.record(
                StatusKind::HeaderLengthMismatch,
                None,
                format!(
                    "{} chromosomes and {} positions for {} markers",
                    self.descriptor.chromosomes.len(),
                    self.descriptor.positions.len(),
                    self.descriptor.markers.len()
                ),
            );
        }
    }

    fn data_row<S: RowSink>(
        &mut self,
        name: &str,
        calls: &[&str],
        index: usize,
        sink: &mut S,
        outcome: &mut JobOutcome,
    ) -> Result<()> {
        if calls.len() != self.descriptor.markers.len() {
            outcome.record(
                StatusKind::HeaderLengthMismatch,
                Some(index),
                format!(
                    "row has {} calls, expected {}",
                    calls.len(),
                    self.descriptor.markers.len()
                ),
            );
        }

        if name.is_empty() {
            outcome.record(StatusKind::Validation, Some(index), "empty accession name");
        } else if self.seen_accessions.insert(name.to_lowercase()) {
            self.descriptor.accessions.push(name.to_string());
            self.descriptor.accession_rows.push(index);
        } else {
            outcome.record(
                StatusKind::DuplicateName,
                Some(index),
                format!("accession '{}' appears more than once", name),
            );
        }

        sink.accept(&DataRow {
            line: index,
            name,
            calls,
        })
    }
}

// ============================================================================
// Hapmap format
// ============================================================================

struct HapmapParser {
    descriptor: MatrixDescriptor,
    seen_markers: HashSet<String>,
}

impl HapmapParser {
    fn new(source_name: &str) -> Self {
        Self {
            descriptor: MatrixDescriptor::new(MatrixFormat::Hapmap, source_name),
            seen_markers: HashSet::new(),
        }
    }

    fn parse<R: BufRead, S: RowSink>(
        mut self,
        reader: R,
        sink: &mut S,
        outcome: &mut JobOutcome,
    ) -> Result<MatrixDescriptor> {
        let mut width: Option<usize> = None;

        for (index, line) in numbered_lines(reader) {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }

            let Some(expected) = width else {
                if line.starts_with(DIRECTIVE_PREFIX) {
                    apply_directive(&mut self.descriptor, &line, index);
                    continue;
                }
                if !self.header(&line, index, outcome) {
                    // Without the fixed header the data columns cannot be interpreted
                    return Ok(self.descriptor);
                }
                width = Some(HAPMAP_FIRST_CALL_COLUMN + self.descriptor.accessions.len());
                continue;
            };

            let fields: Vec<&str> = line.split('\t').collect();
            if fields.len() != expected {
                outcome.record(
                    StatusKind::HeaderLengthMismatch,
                    Some(index),
                    format!("row has {} columns, header has {}", fields.len(), expected),
                );
            }

            self.data_row(&fields, index, sink, outcome)?;
        }

        if width.is_none() {
            outcome.record(StatusKind::MissingRequiredRow, None, "no Hapmap header row found");
        }

        Ok(self.descriptor)
    }

    fn header(&mut self, line: &str, index: usize, outcome: &mut JobOutcome) -> bool {
        let fields: Vec<&str> = line.split('\t').map(str::trim).collect();
        let fixed_ok = fields.len() >= HAPMAP_HEADER.len()
            && HAPMAP_HEADER
                .iter()
                .zip(fields.iter())
                .all(|(expected, actual)| expected.eq_ignore_ascii_case(actual));

        if !fixed_ok {
            outcome.record(
                StatusKind::MissingRequiredRow,
                Some(index),
                format!("Hapmap header must start with '{}'", HAPMAP_HEADER.join("\t")),
            );
            return false;
        }

        let mut seen = HashSet::new();
        for name in &fields[HAPMAP_FIRST_CALL_COLUMN..] {
            if name.is_empty() {
                outcome.record(StatusKind::Validation, Some(index), "empty accession name");
            } else if !seen.insert(name.to_lowercase()) {
                outcome.record(
                    StatusKind::DuplicateName,
                    Some(index),
                    format!("accession '{}' appears more than once", name),
                );
            }
            // Keep every column so calls stay aligned with the header
            self.descriptor.accessions.push((*name).to_string());
            self.descriptor.accession_rows.push(index);
        }

        true
    }

    fn data_row<S: RowSink>(
        &mut self,
        fields: &[&str],
        index: usize,
        sink: &mut S,
        outcome: &mut JobOutcome,
    ) -> Result<()> {
        let name = fields[0].trim();
        let chromosome = fields.get(HAPMAP_CHROM_COLUMN).map(|c| c.trim()).unwrap_or_default();
        let chromosome = check_chromosome(chromosome, index, outcome);
        let position = match fields.get(HAPMAP_POS_COLUMN) {
            Some(value) => parse_position(value, index, outcome),
            None => None,
        };

        if check_marker_name(name, index, &mut self.seen_markers, outcome) {
            self.descriptor.markers.push(name.to_string());
            self.descriptor.chromosomes.push(chromosome.to_string());
            self.descriptor.positions.push(position);
        }

        let calls = fields.get(HAPMAP_FIRST_CALL_COLUMN..).unwrap_or_default();
        sink.accept(&DataRow {
            line: index,
            name,
            calls,
        })
    }
}
