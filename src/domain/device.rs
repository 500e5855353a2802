//! Device: a sensor unit identified by its AXF id (`<type>.<serial>`).

use crate::domain::job::ModelType;
use crate::domain::metrics::{Axis, MetricsReport, SCORING_ACTIVITY, SCORING_METRIC};
use crate::domain::record::{known_columns, Entity, Record};
use crate::domain::schema::Column;
use crate::domain::errors::DomainError;
use crate::utils::time::current_time;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, warn};

pub const UNKNOWN_DEVICE: &str = "Unknown Device";

/// Type prefix of an AXF id -> product name.
const DEVICE_TYPES: &[(&str, &str)] = &[
    ("01", "(Deprecated) Small Force Plate"),
    ("02", "(Deprecated) Large Force Plate"),
    ("03", "(Deprecated) Shoe Insole"),
    ("04", "Demo Kit"),
    ("05", "Load Cells"),
    ("06", "Launch Pad Lite"),
    ("07", "Launch Pad"),
    ("08", "Launch Pad XL"),
    ("09", "Shoe Insole Left"),
    ("0a", "Shoe Insole Right"),
    ("0b", "Rowing Ergometer Left"),
    ("0c", "Rowing Ergometer Right"),
    ("0d", "Rat Pad Right"),
    ("0e", "Rat Pad Left"),
];

pub fn device_type_name(type_id: &str) -> Option<&'static str> {
    DEVICE_TYPES
        .iter()
        .find(|(id, _)| *id == type_id)
        .map(|(_, name)| *name)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Device {
    pub axf_id: String,
    pub name: Option<String>,
    pub type_id: String,
    pub type_name: String,
    pub device_metadata: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub best_force_run: Option<i64>,
    pub best_force_timestamp: Option<i64>,
    pub best_force_train_metrics: Option<MetricsReport>,
    pub best_force_val_metrics: Option<MetricsReport>,
    pub best_force_test_metrics: Option<MetricsReport>,
    pub best_moment_run: Option<i64>,
    pub best_moment_timestamp: Option<i64>,
    pub best_moment_train_metrics: Option<MetricsReport>,
    pub best_moment_val_metrics: Option<MetricsReport>,
    pub best_moment_test_metrics: Option<MetricsReport>,
}

impl Default for Device {
    fn default() -> Self {
        let now = current_time();
        Self {
            axf_id: String::new(),
            name: None,
            type_id: String::new(),
            type_name: UNKNOWN_DEVICE.to_string(),
            device_metadata: None,
            created_at: now,
            updated_at: now,
            best_force_run: None,
            best_force_timestamp: None,
            best_force_train_metrics: None,
            best_force_val_metrics: None,
            best_force_test_metrics: None,
            best_moment_run: None,
            best_moment_timestamp: None,
            best_moment_train_metrics: None,
            best_moment_val_metrics: None,
            best_moment_test_metrics: None,
        }
    }
}

/// Best run per model type, as served to the dashboard.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct BestRun {
    pub run: Option<i64>,
    pub timestamp: Option<i64>,
    pub train_metrics: Option<MetricsReport>,
    pub val_metrics: Option<MetricsReport>,
    pub test_metrics: Option<MetricsReport>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BestDeviceMetrics {
    pub axf_id: String,
    pub force: BestRun,
    pub moment: BestRun,
}

/// Metrics of a freshly completed run, offered to the device.
#[derive(Debug, Clone, Copy)]
pub struct RunResult<'a> {
    pub run_number: i64,
    pub job_timestamp: i64,
    pub train_metrics: &'a MetricsReport,
    pub val_metrics: &'a MetricsReport,
    pub test_metrics: &'a MetricsReport,
}

impl Device {
    /// Derive type fields from the AXF id prefix.
    pub fn new(axf_id: &str) -> Self {
        let type_id = axf_id.split('.').next().unwrap_or_default().to_string();
        let type_name = device_type_name(&type_id).unwrap_or(UNKNOWN_DEVICE);
        Self {
            axf_id: axf_id.to_string(),
            name: Some(type_name.to_string()),
            type_id,
            type_name: type_name.to_string(),
            ..Self::default()
        }
    }

    /// Serial part of the AXF id (after the last `.`).
    pub fn serial(&self) -> &str {
        self.axf_id.rsplit('.').next().unwrap_or(&self.axf_id)
    }

    /// Record a run if it beats the device's current best for its model type.
    ///
    /// Force models are ranked on the last axis, moment models on the first.
    /// Returns true when the run became the new best.
    pub fn update_best_metrics(&mut self, model_type: &ModelType, result: RunResult<'_>) -> bool {
        let axis = match model_type {
            ModelType::Force => Axis::Last,
            ModelType::Moment => Axis::First,
            ModelType::Other(other) => {
                warn!(axf_id = %self.axf_id, model_type = %other, "unknown model type");
                return false;
            }
        };
        let Some(new_value) = result
            .test_metrics
            .value(SCORING_ACTIVITY, SCORING_METRIC, axis)
        else {
            warn!(
                axf_id = %self.axf_id,
                run = result.run_number,
                "run has no {SCORING_ACTIVITY} {SCORING_METRIC}; best metrics unchanged"
            );
            return false;
        };

        let axf_id = self.axf_id.clone();
        let best = self.best_mut(model_type);
        let mut current_best = best.test_metrics.clone().unwrap_or_default();
        if !current_best.normalize_activity() {
            *best.run = None;
        } else {
            *best.test_metrics = Some(current_best.clone());
        }
        let best_value = match best.run {
            Some(_) => current_best
                .value(SCORING_ACTIVITY, SCORING_METRIC, axis)
                .unwrap_or(f64::INFINITY),
            None => f64::INFINITY,
        };

        if best.run.is_some() && new_value >= best_value {
            info!(
                axf_id = %axf_id,
                run = result.run_number,
                model_type = %model_type,
                "run did not improve device metrics"
            );
            return false;
        }

        if best.run.is_some() {
            info!(
                axf_id = %axf_id,
                model_type = %model_type,
                "best metrics updated: {}/{} ({:.4} < {:.4})",
                result.job_timestamp,
                result.run_number,
                new_value,
                best_value
            );
        } else {
            info!(
                axf_id = %axf_id,
                model_type = %model_type,
                "best metrics updated: {}/{} ({:.4})",
                result.job_timestamp,
                result.run_number,
                new_value
            );
        }
        *best.run = Some(result.run_number);
        *best.timestamp = Some(result.job_timestamp);
        *best.train_metrics = Some(result.train_metrics.clone());
        *best.val_metrics = Some(result.val_metrics.clone());
        *best.test_metrics = Some(result.test_metrics.clone());
        true
    }

    pub fn best_metrics(&self) -> BestDeviceMetrics {
        BestDeviceMetrics {
            axf_id: self.axf_id.clone(),
            force: BestRun {
                run: self.best_force_run,
                timestamp: self.best_force_timestamp,
                train_metrics: self.best_force_train_metrics.clone(),
                val_metrics: self.best_force_val_metrics.clone(),
                test_metrics: self.best_force_test_metrics.clone(),
            },
            moment: BestRun {
                run: self.best_moment_run,
                timestamp: self.best_moment_timestamp,
                train_metrics: self.best_moment_train_metrics.clone(),
                val_metrics: self.best_moment_val_metrics.clone(),
                test_metrics: self.best_moment_test_metrics.clone(),
            },
        }
    }

    fn best_mut(&mut self, model_type: &ModelType) -> BestFields<'_> {
        match model_type {
            ModelType::Moment => BestFields {
                run: &mut self.best_moment_run,
                timestamp: &mut self.best_moment_timestamp,
                train_metrics: &mut self.best_moment_train_metrics,
                val_metrics: &mut self.best_moment_val_metrics,
                test_metrics: &mut self.best_moment_test_metrics,
            },
            _ => BestFields {
                run: &mut self.best_force_run,
                timestamp: &mut self.best_force_timestamp,
                train_metrics: &mut self.best_force_train_metrics,
                val_metrics: &mut self.best_force_val_metrics,
                test_metrics: &mut self.best_force_test_metrics,
            },
        }
    }
}

struct BestFields<'a> {
    run: &'a mut Option<i64>,
    timestamp: &'a mut Option<i64>,
    train_metrics: &'a mut Option<MetricsReport>,
    val_metrics: &'a mut Option<MetricsReport>,
    test_metrics: &'a mut Option<MetricsReport>,
}

impl Entity for Device {
    const NAME: &'static str = "Device";
    const TABLE: &'static str = "devices";

    fn columns() -> Vec<Column> {
        vec![
            Column::text("axf_id").primary_key(),
            Column::text("name").nullable(),
            Column::text("type_id"),
            Column::text("type_name"),
            Column::text("device_metadata").nullable(),
            Column::datetime("created_at"),
            Column::datetime("updated_at"),
            Column::integer("best_force_run").nullable(),
            Column::big_integer("best_force_timestamp").nullable(),
            Column::json("best_force_train_metrics").nullable(),
            Column::json("best_force_val_metrics").nullable(),
            Column::json("best_force_test_metrics").nullable(),
            Column::integer("best_moment_run").nullable(),
            Column::big_integer("best_moment_timestamp").nullable(),
            Column::json("best_moment_train_metrics").nullable(),
            Column::json("best_moment_val_metrics").nullable(),
            Column::json("best_moment_test_metrics").nullable(),
        ]
    }

    fn id(&self) -> &str {
        &self.axf_id
    }

    fn touch(&mut self, now: DateTime<Utc>) {
        self.updated_at = now;
    }

    /// `axf_id` is mandatory; type fields are derived from it and then
    /// overwritten by whatever the record carries.
    fn from_record(record: Record) -> Result<Self, DomainError> {
        let record = known_columns::<Self>(record);
        let axf_id = match record.get("axf_id") {
            Some(Value::String(id)) => id.clone(),
            _ => {
                return Err(DomainError::InvalidRecord(
                    "Device must have an axf_id".into(),
                ))
            }
        };
        let mut device = Device::new(&axf_id);
        device.update_from_record(&record)?;
        Ok(device)
    }
}
