//! axio-common: shared entity models and helpers for the Axio API server and dashboard.

pub mod adapters;
pub mod domain;
pub mod ports;
pub mod shared;
pub mod usecases;
pub mod utils;
