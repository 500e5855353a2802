//! Application use cases. Combine entity transitions with a ModelStore.

pub mod client_service;
pub mod device_service;
pub mod job_service;

pub use client_service::ClientService;
pub use device_service::DeviceService;
pub use job_service::JobService;
