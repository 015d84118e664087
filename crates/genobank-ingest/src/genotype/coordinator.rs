//! Post-processing coordinator
//!
//! Once markers are resolved and the hidden dataset exists, four independent
//! units finish the import: map definitions, dataset members, and the codec
//! run for each orientation. They run as separate tasks. Each unit reports
//! through a [`CompletionSignal`] that fires exactly once, on completion,
//! failure or unwinding, so waiting on the [`CompletionBarrier`] always returns.

use crate::genotype::outcome::{OutcomeSink, StatusKind};
use crate::genotype::Result;
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use std::future::Future;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

/// Number of units every import runs
pub const UNIT_COUNT: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnitKind {
    MapDefinitions,
    DatasetMembers,
    NativeMatrix,
    TransposedMatrix,
}

impl UnitKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            UnitKind::MapDefinitions => "map_definitions",
            UnitKind::DatasetMembers => "dataset_members",
            UnitKind::NativeMatrix => "native_matrix",
            UnitKind::TransposedMatrix => "transposed_matrix",
        }
    }
}

impl std::fmt::Display for UnitKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a unit's work produced when it did not fail
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UnitOutput {
    Completed(String),
    /// Nothing to do; counts as complete
    Skipped(String),
}

/// Final status of one unit as seen by the barrier
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "detail", rename_all = "snake_case")]
pub enum UnitStatus {
    Completed(String),
    Skipped(String),
    Failed(String),
}

impl UnitStatus {
    pub fn is_failure(&self) -> bool {
        matches!(self, UnitStatus::Failed(_))
    }
}

impl From<UnitOutput> for UnitStatus {
    fn from(output: UnitOutput) -> Self {
        match output {
            UnitOutput::Completed(detail) => UnitStatus::Completed(detail),
            UnitOutput::Skipped(detail) => UnitStatus::Skipped(detail),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitReport {
    pub kind: UnitKind,
    pub status: UnitStatus,
}

// ============================================================================
// Completion barrier
// ============================================================================

/// Wait-for-N barrier built on a channel fan-in
pub struct CompletionBarrier {
    expected: usize,
    tx: mpsc::UnboundedSender<UnitReport>,
    rx: mpsc::UnboundedReceiver<UnitReport>,
}

impl CompletionBarrier {
    pub fn new(expected: usize) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self { expected, tx, rx }
    }

    /// Hand out a signal for one unit
    pub fn signal(&self, kind: UnitKind) -> CompletionSignal {
        CompletionSignal {
            kind,
            tx: Some(self.tx.clone()),
        }
    }

    /// Block until `expected` signals arrived or every signal is gone
    pub async fn wait(self) -> BarrierReport {
        let CompletionBarrier {
            expected,
            tx,
            mut rx,
        } = self;
        drop(tx);

        let mut reports = Vec::with_capacity(expected);
        while reports.len() < expected {
            match rx.recv().await {
                Some(report) => reports.push(report),
                None => break,
            }
        }

        BarrierReport { expected, reports }
    }
}

/// Fires once per unit; dropping it unfired reports the unit as failed
pub struct CompletionSignal {
    kind: UnitKind,
    tx: Option<mpsc::UnboundedSender<UnitReport>>,
}

impl CompletionSignal {
    pub fn kind(&self) -> UnitKind {
        self.kind
    }

    pub fn complete(mut self, status: UnitStatus) {
        self.send(status);
    }

    fn send(&mut self, status: UnitStatus) {
        if let Some(tx) = self.tx.take() {
            // The barrier may already have given up waiting
            let _ = tx.send(UnitReport {
                kind: self.kind,
                status,
            });
        }
    }
}

impl Drop for CompletionSignal {
    fn drop(&mut self) {
        if self.tx.is_some() {
            self.send(UnitStatus::Failed(
                "unit stopped before reporting completion".to_string(),
            ));
        }
    }
}

/// What the barrier saw
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BarrierReport {
    pub expected: usize,
    pub reports: Vec<UnitReport>,
}

impl BarrierReport {
    /// Every expected unit signalled, whatever its status
    pub fn opened(&self) -> bool {
        self.reports.len() == self.expected
    }

    pub fn all_succeeded(&self) -> bool {
        self.opened() && !self.reports.iter().any(|r| r.status.is_failure())
    }

    pub fn failures(&self) -> impl Iterator<Item = &UnitReport> {
        self.reports.iter().filter(|r| r.status.is_failure())
    }

    pub fn status(&self, kind: UnitKind) -> Option<&UnitStatus> {
        self.reports.iter().find(|r| r.kind == kind).map(|r| &r.status)
    }
}

// ============================================================================
// Coordinator
// ============================================================================

/// One finishing job
pub struct PostProcessingUnit {
    kind: UnitKind,
    work: BoxFuture<'static, Result<UnitOutput>>,
}

impl PostProcessingUnit {
    pub fn new<F>(kind: UnitKind, work: F) -> Self
    where
        F: Future<Output = Result<UnitOutput>> + Send + 'static,
    {
        Self {
            kind,
            work: Box::pin(work),
        }
    }

    pub fn kind(&self) -> UnitKind {
        self.kind
    }
}

pub struct PostProcessingCoordinator {
    sink: OutcomeSink,
}

impl PostProcessingCoordinator {
    pub fn new(sink: OutcomeSink) -> Self {
        Self { sink }
    }

    /// Run all units concurrently and wait for every one of them
    ///
    /// A failing unit is recorded in the outcome sink and does not stop the
    /// others. There is no timeout.
    pub async fn run(&self, units: [PostProcessingUnit; UNIT_COUNT]) -> BarrierReport {
        let barrier = CompletionBarrier::new(UNIT_COUNT);
        let mut handles = Vec::with_capacity(UNIT_COUNT);

        for unit in units {
            let kind = unit.kind;
            let signal = barrier.signal(kind);
            let sink = self.sink.clone();

            let handle = tokio::spawn(async move {
                let status = match unit.work.await {
                    Ok(output) => {
                        info!(unit = %kind, ?output, "Post-processing unit finished");
                        UnitStatus::from(output)
                    },
                    Err(e) => {
                        error!(unit = %kind, error = %e, "Post-processing unit failed");
                        sink.report(e.status_kind(), None, format!("{}: {}", kind, e));
                        UnitStatus::Failed(e.to_string())
                    },
                };
                signal.complete(status);
            });
            handles.push((kind, handle));
        }

        let report = barrier.wait().await;

        // Every task has signalled by now; surface panics that bypassed the error path
        for (kind, handle) in handles {
            if let Err(e) = handle.await {
                warn!(unit = %kind, error = %e, "Post-processing unit panicked");
                self.sink
                    .report(StatusKind::Internal, None, format!("{}: {}", kind, e));
            }
        }

        info!(
            opened = report.opened(),
            failures = report.failures().count(),
            "Post-processing barrier released"
        );
        report
    }
}
