//! Job outcome accumulation
//!
//! A job reports a list of `(kind, row, message)` entries. The list keeps at
//! most one entry per kind: the first occurrence wins and later ones only bump
//! its `occurrences` counter, so a caller sees every distinct problem in one
//! round-trip without a flood of repeats.

use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};

/// Row value for entries that are not tied to a single line of the input
pub const FILE_SCOPE: i64 = -1;

/// Kind of a reported problem
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusKind {
    /// The marker-name row (flat) or the fixed header (Hapmap) is absent
    MissingRequiredRow,
    /// Chromosome/position/marker counts disagree, or a row has the wrong width
    HeaderLengthMismatch,
    /// A position value is not numeric
    InvalidNumber,
    /// A row names an accession the store does not know
    InvalidAccession,
    /// The same accession or marker name appears twice
    DuplicateName,
    /// A name cannot be written to a staging file without escaping
    UnsafeValue,
    /// Any other validation failure
    Validation,
    Io,
    Database,
    Codec,
    Internal,
}

impl StatusKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            StatusKind::MissingRequiredRow => "missing_required_row",
            StatusKind::HeaderLengthMismatch => "header_length_mismatch",
            StatusKind::InvalidNumber => "invalid_number",
            StatusKind::InvalidAccession => "invalid_accession",
            StatusKind::DuplicateName => "duplicate_name",
            StatusKind::UnsafeValue => "unsafe_value",
            StatusKind::Validation => "validation",
            StatusKind::Io => "io",
            StatusKind::Database => "database",
            StatusKind::Codec => "codec",
            StatusKind::Internal => "internal",
        }
    }
}

impl std::fmt::Display for StatusKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One reported problem
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusEntry {
    pub kind: StatusKind,
    /// Zero-based line index in the input file, or [`FILE_SCOPE`]
    pub row: i64,
    pub message: String,
    /// How many times this kind was reported, including the kept entry
    pub occurrences: usize,
}

impl StatusEntry {
    pub fn new(kind: StatusKind, row: Option<usize>, message: impl Into<String>) -> Self {
        Self {
            kind,
            row: row.map(|r| r as i64).unwrap_or(FILE_SCOPE),
            message: message.into(),
            occurrences: 1,
        }
    }
}

/// Accumulated outcome of a job, de-duplicated by kind
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobOutcome {
    entries: Vec<StatusEntry>,
}

impl JobOutcome {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a problem at `row` (`None` for file-scoped problems)
    pub fn record(&mut self, kind: StatusKind, row: Option<usize>, message: impl Into<String>) {
        self.push(StatusEntry::new(kind, row, message));
    }

    /// Add an entry, folding it into an existing entry of the same kind
    pub fn push(&mut self, entry: StatusEntry) {
        match self.entries.iter_mut().find(|e| e.kind == entry.kind) {
            Some(existing) => existing.occurrences += entry.occurrences,
            None => self.entries.push(entry),
        }
    }

    /// Fold another outcome into this one
    pub fn merge(&mut self, other: JobOutcome) {
        for entry in other.entries {
            self.push(entry);
        }
    }

    pub fn has_errors(&self) -> bool {
        !self.entries.is_empty()
    }

    pub fn entries(&self) -> &[StatusEntry] {
        &self.entries
    }

    pub fn get(&self, kind: StatusKind) -> Option<&StatusEntry> {
        self.entries.iter().find(|e| e.kind == kind)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Cloneable handle through which concurrent units report into one outcome
#[derive(Debug, Clone, Default)]
pub struct OutcomeSink {
    inner: Arc<Mutex<JobOutcome>>,
}

impl OutcomeSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn report(&self, kind: StatusKind, row: Option<usize>, message: impl Into<String>) {
        // A poisoned lock still holds a usable outcome; keep collecting.
        let mut outcome = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        outcome.record(kind, row, message);
    }

    pub fn snapshot(&self) -> JobOutcome {
        self.inner.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn has_errors(&self) -> bool {
        self.inner
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .has_errors()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_first_entry_per_kind_wins() {
        let mut outcome = JobOutcome::new();
        outcome.record(StatusKind::InvalidAccession, Some(5), "unknown accession 'B73x'");
        outcome.record(StatusKind::InvalidAccession, Some(9), "unknown accession 'Mo17x'");
        outcome.record(StatusKind::InvalidNumber, Some(2), "position 'abc' is not a number");

        assert_eq!(outcome.len(), 2);
        let accession = outcome.get(StatusKind::InvalidAccession).unwrap();
        assert_eq!(accession.row, 5);
        assert_eq!(accession.message, "unknown accession 'B73x'");
        assert_eq!(accession.occurrences, 2);
    }

    #[test]
    fn test_file_scope_row() {
        let entry = StatusEntry::new(StatusKind::MissingRequiredRow, None, "no marker row");
        assert_eq!(entry.row, FILE_SCOPE);

        let json = serde_json::to_value(&entry).unwrap();
        assert_eq!(json["row"], -1);
        assert_eq!(json["kind"], "missing_required_row");
    }

    #[test]
    fn test_merge_keeps_dedup() {
        let mut a = JobOutcome::new();
        a.record(StatusKind::Io, None, "disk full");
        let mut b = JobOutcome::new();
        b.record(StatusKind::Io, None, "disk still full");
        b.record(StatusKind::Codec, None, "exit status 2");

        a.merge(b);
        assert_eq!(a.len(), 2);
        assert_eq!(a.get(StatusKind::Io).unwrap().message, "disk full");
        assert_eq!(a.get(StatusKind::Io).unwrap().occurrences, 2);
    }

    #[test]
    fn test_sink_is_shared_across_clones() {
        let sink = OutcomeSink::new();
        let other = sink.clone();
        other.report(StatusKind::Database, None, "connection reset");

        assert!(sink.has_errors());
        assert_eq!(sink.snapshot().len(), 1);
    }
}
