//! Publication gate
//!
//! Datasets are created hidden. Only this gate moves one to `Public`, and only
//! after the post-processing barrier opened with every unit succeeding.

use crate::genotype::coordinator::BarrierReport;
use crate::genotype::models::Visibility;
use crate::genotype::store::GenotypeStore;
use crate::genotype::Result;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

/// What happens to a dataset whose input failed the check phase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValidationFailurePolicy {
    /// Leave the dataset hidden
    #[default]
    Keep,
    /// Mark the dataset deleted-on-failure
    Delete,
}

impl std::str::FromStr for ValidationFailurePolicy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "keep" | "hidden" => Ok(ValidationFailurePolicy::Keep),
            "delete" | "remove" => Ok(ValidationFailurePolicy::Delete),
            other => Err(format!("unknown validation failure policy '{}'", other)),
        }
    }
}

pub struct PublicationGate {
    store: Arc<dyn GenotypeStore>,
    cleanup_on_failure: bool,
}

impl PublicationGate {
    pub fn new(store: Arc<dyn GenotypeStore>, cleanup_on_failure: bool) -> Self {
        Self {
            store,
            cleanup_on_failure,
        }
    }

    /// Publish the dataset if post-processing succeeded, otherwise withdraw it
    ///
    /// On failure with cleanup enabled the dataset's member rows, artifact
    /// records and this run's map are removed and the dataset is marked
    /// `DeletedOnFailure`. Without cleanup it stays hidden for an operator.
    pub async fn conclude(
        &self,
        dataset_id: i64,
        map_id: Option<i64>,
        barrier: &BarrierReport,
    ) -> Result<Visibility> {
        if barrier.all_succeeded() {
            self.store.set_visibility(dataset_id, Visibility::Public).await?;
            info!(dataset_id, "Dataset published");
            return Ok(Visibility::Public);
        }

        let failed: Vec<&str> = barrier.failures().map(|r| r.kind.as_str()).collect();
        warn!(
            dataset_id,
            opened = barrier.opened(),
            ?failed,
            "Post-processing did not complete, dataset withheld"
        );

        if !self.cleanup_on_failure {
            return Ok(Visibility::Hidden);
        }

        let removed = self.store.discard_dataset_rows(dataset_id, map_id).await?;
        self.store
            .set_visibility(dataset_id, Visibility::DeletedOnFailure)
            .await?;
        info!(dataset_id, removed, "Compensating cleanup finished");

        Ok(Visibility::DeletedOnFailure)
    }

    /// Settle a dataset whose input never reached the import phase
    pub async fn withhold_after_validation(
        &self,
        dataset_id: i64,
        policy: ValidationFailurePolicy,
    ) -> Result<Visibility> {
        match policy {
            ValidationFailurePolicy::Keep => Ok(Visibility::Hidden),
            ValidationFailurePolicy::Delete => {
                self.store
                    .set_visibility(dataset_id, Visibility::DeletedOnFailure)
                    .await?;
                Ok(Visibility::DeletedOnFailure)
            },
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_policy_from_str() {
        assert_eq!(
            "DELETE".parse::<ValidationFailurePolicy>().unwrap(),
            ValidationFailurePolicy::Delete
        );
        assert_eq!(
            "keep".parse::<ValidationFailurePolicy>().unwrap(),
            ValidationFailurePolicy::Keep
        );
        assert!("archive".parse::<ValidationFailurePolicy>().is_err());
    }
}
