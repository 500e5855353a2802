//! Training metrics reported by a run: activity -> metric -> per-axis values.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Activity whose MAE decides the best run.
pub const SCORING_ACTIVITY: &str = "TE-all";
/// Older reports used this key before activities were split out.
pub const LEGACY_ACTIVITY: &str = "all";
pub const SCORING_METRIC: &str = "mae";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Axis {
    First,
    Last,
}

/// e.g. `{"TE-all": {"mae": [1.2, 0.8, 3.1], "rmse": [...]}}`
///
/// JSON has no inf or NaN, so an axis that is not a finite number is kept as
/// `None` and stored as `null`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MetricsReport(pub BTreeMap<String, BTreeMap<String, Vec<Option<f64>>>>);

impl MetricsReport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder used mostly by tests and fixtures.
    pub fn with(mut self, activity: &str, metric: &str, values: Vec<f64>) -> Self {
        self.0
            .entry(activity.to_string())
            .or_default()
            .insert(
                metric.to_string(),
                values.into_iter().map(|v| v.is_finite().then_some(v)).collect(),
            );
        self
    }

    pub fn has_activity(&self, activity: &str) -> bool {
        self.0.contains_key(activity)
    }

    /// `None` when the metric is missing or that axis was not a finite number.
    pub fn value(&self, activity: &str, metric: &str, axis: Axis) -> Option<f64> {
        let values = self.0.get(activity)?.get(metric)?;
        match axis {
            Axis::First => values.first().copied().flatten(),
            Axis::Last => values.last().copied().flatten(),
        }
    }

    /// `TE-all` MAE on the last axis; the figure runs are ranked by.
    pub fn score(&self) -> Option<f64> {
        self.value(SCORING_ACTIVITY, SCORING_METRIC, Axis::Last)
    }

    /// Copy the legacy `all` entry to `TE-all` when only the former exists.
    /// Returns false when neither is present.
    pub fn normalize_activity(&mut self) -> bool {
        if self.has_activity(SCORING_ACTIVITY) {
            return true;
        }
        match self.0.get(LEGACY_ACTIVITY).cloned() {
            Some(legacy) => {
                self.0.insert(SCORING_ACTIVITY.to_string(), legacy);
                true
            }
            None => false,
        }
    }
}
