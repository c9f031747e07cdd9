//! Baseline vs optimized timing comparison.

use crate::connection::{DocumentConnectionInfo, GraphConnectionInfo};
use crate::correlate::{CombinedResult, ResultCorrelator};
use crate::document::DocumentBackend;
use crate::error::QueryError;
use crate::graph::GraphBackend;
use crate::query::ExecutionMode;
use crate::tasks::AnalyticalTask;
use crate::timing::TimingSample;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModeComparison {
    pub baseline_seconds: f64,
    pub optimized_seconds: f64,
    /// `(baseline - optimized) / baseline * 100`; absent when the baseline
    /// total is zero.
    pub improvement_percent: Option<f64>,
}

/// Sum the samples per mode and compare the totals.
pub fn compare_modes(samples: &[TimingSample]) -> ModeComparison {
    let total = |mode: ExecutionMode| {
        samples
            .iter()
            .filter(|s| s.mode == mode)
            .map(|s| s.elapsed_seconds)
            .sum::<f64>()
    };
    let baseline_seconds = total(ExecutionMode::Baseline);
    let optimized_seconds = total(ExecutionMode::Optimized);
    let improvement_percent = (baseline_seconds > 0.0)
        .then(|| (baseline_seconds - optimized_seconds) / baseline_seconds * 100.0);
    ModeComparison {
        baseline_seconds,
        optimized_seconds,
        improvement_percent,
    }
}

/// Both runs of a task plus their comparison.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskComparison {
    pub task: String,
    pub baseline: CombinedResult,
    pub optimized: CombinedResult,
    pub comparison: ModeComparison,
}

/// Run `task` in baseline mode, then optimized mode, and compare timings.
pub fn compare_task<D, G>(
    correlator: &ResultCorrelator<D, G>,
    task: &AnalyticalTask,
    document: &DocumentConnectionInfo,
    graph: &GraphConnectionInfo,
) -> Result<TaskComparison, QueryError>
where
    D: DocumentBackend,
    G: GraphBackend,
{
    let baseline = correlator.run_task(task, document, graph, ExecutionMode::Baseline)?;
    let optimized = correlator.run_task(task, document, graph, ExecutionMode::Optimized)?;
    let samples: Vec<TimingSample> = baseline
        .timings
        .iter()
        .chain(&optimized.timings)
        .cloned()
        .collect();
    let comparison = compare_modes(&samples);
    tracing::info!(
        task = %task.slug,
        baseline_s = comparison.baseline_seconds,
        optimized_s = comparison.optimized_seconds,
        "mode comparison finished"
    );
    Ok(TaskComparison {
        task: task.slug.clone(),
        baseline,
        optimized,
        comparison,
    })
}
