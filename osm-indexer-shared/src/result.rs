//! Per-layer run outcomes and the aggregate run report.
//!
//! Each layer pipeline produces exactly one [`LayerRunResult`] on reaching a
//! terminal state; the orchestrator collects them into a [`RunReport`].
//! Results are immutable values returned to the orchestrator, not shared
//! counters.

use serde::Serialize;

use crate::layer::Layer;

/// Terminal (or not-yet-started) state of one layer pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LayerState {
    /// The pipeline never started (e.g. shutdown before its turn).
    Pending,
    /// Source exhausted and final batch flushed.
    Completed,
    /// Decode failure (fail-fast policy), exhausted retries, or cancellation.
    Failed,
}

/// Outcome of one layer's ingestion run.
#[derive(Debug, Clone, Serialize)]
pub struct LayerRunResult {
    /// The layer this result belongs to.
    pub layer: Layer,
    /// Terminal state of the layer pipeline.
    pub state: LayerState,
    /// Features the converter attempted (emitted plus decode skips).
    pub attempted: u64,
    /// Documents acknowledged by the engine.
    pub indexed: u64,
    /// Features skipped: decode failures plus per-document bulk rejections.
    pub skipped: u64,
    /// Document count reported by the engine after load. Reporting is
    /// best-effort; `None` when the count call failed.
    pub final_count: Option<u64>,
    /// Error message for a `Failed` layer.
    pub error: Option<String>,
}

impl LayerRunResult {
    /// A layer that never started.
    pub fn pending(layer: Layer) -> Self {
        Self {
            layer,
            state: LayerState::Pending,
            attempted: 0,
            indexed: 0,
            skipped: 0,
            final_count: None,
            error: None,
        }
    }

    /// A layer that failed before producing counts.
    pub fn failed(layer: Layer, error: impl Into<String>) -> Self {
        Self {
            layer,
            state: LayerState::Failed,
            attempted: 0,
            indexed: 0,
            skipped: 0,
            final_count: None,
            error: Some(error.into()),
        }
    }

    /// Accounting invariant: every attempted feature is indexed or skipped.
    pub fn is_consistent(&self) -> bool {
        self.indexed + self.skipped == self.attempted
    }
}

/// Aggregate outcome of one ingestion run, one entry per layer.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    /// Per-layer results, in load order.
    pub layers: Vec<LayerRunResult>,
}

impl RunReport {
    /// Whether the run succeeded: no layer reached `Failed`.
    ///
    /// Drives the process exit status.
    pub fn succeeded(&self) -> bool {
        self.layers
            .iter()
            .all(|layer| layer.state != LayerState::Failed)
    }

    /// Total documents acknowledged across all layers.
    pub fn total_indexed(&self) -> u64 {
        self.layers.iter().map(|layer| layer.indexed).sum()
    }

    /// Total features skipped across all layers.
    pub fn total_skipped(&self) -> u64 {
        self.layers.iter().map(|layer| layer.skipped).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn completed(layer: Layer, attempted: u64, indexed: u64) -> LayerRunResult {
        LayerRunResult {
            layer,
            state: LayerState::Completed,
            attempted,
            indexed,
            skipped: attempted - indexed,
            final_count: Some(indexed),
            error: None,
        }
    }

    #[test]
    fn test_accounting_invariant() {
        let result = completed(Layer::Points, 10, 8);
        assert!(result.is_consistent());

        let mut broken = completed(Layer::Points, 10, 8);
        broken.skipped = 1;
        assert!(!broken.is_consistent());
    }

    #[test]
    fn test_report_success() {
        let report = RunReport {
            layers: vec![
                completed(Layer::Points, 5, 5),
                completed(Layer::OtherRelations, 0, 0),
            ],
        };
        assert!(report.succeeded());
        assert_eq!(report.total_indexed(), 5);
    }

    #[test]
    fn test_report_failure_and_pending() {
        let report = RunReport {
            layers: vec![
                completed(Layer::Points, 5, 5),
                LayerRunResult::failed(Layer::Lines, "bulk retries exhausted"),
                LayerRunResult::pending(Layer::Multipolygons),
            ],
        };
        assert!(!report.succeeded());

        let no_failures = RunReport {
            layers: vec![LayerRunResult::pending(Layer::Multipolygons)],
        };
        assert!(no_failures.succeeded());
    }
}
