//! Core domain layer. No external I/O dependencies.
//!
//! Entities, their table schemas and the pure state transitions live here.
//! Dependencies flow inward.

pub mod client;
pub mod device;
pub mod errors;
pub mod job;
pub mod messages;
pub mod metrics;
pub mod record;
pub mod run;
pub mod schema;

pub use client::{Client, ClientStatus};
pub use device::{BestDeviceMetrics, BestRun, Device, RunResult};
pub use errors::DomainError;
pub use job::{Job, JobStatus, ModelType, SimpleJob};
pub use metrics::MetricsReport;
pub use record::{Entity, Record};
pub use run::{Run, RunConfig};
pub use schema::{Column, ColumnType, Registry, TableSchema};
