//! Device lookup and on-demand creation.

use crate::domain::{Device, DomainError};
use crate::ports::{ModelStore, ModelStoreExt};
use serde_json::Value;
use std::sync::Arc;
use tracing::info;

/// Key in the job config naming the device, e.g. `"07-00c4"`.
pub const DEVICE_ID_KEY: &str = "DEVICE_ID";

pub struct DeviceService {
    store: Arc<dyn ModelStore>,
}

impl DeviceService {
    pub fn new(store: Arc<dyn ModelStore>) -> Self {
        Self { store }
    }

    pub async fn device_by_id(&self, axf_id: &str) -> Result<Option<Device>, DomainError> {
        self.store.get::<Device>(axf_id).await
    }

    /// Device named by a job config's `DEVICE_ID` (dashes read as dots), created if unknown.
    pub async fn resolve_device(&self, job_config: &Value) -> Result<Device, DomainError> {
        let device_id = job_config
            .get(DEVICE_ID_KEY)
            .and_then(Value::as_str)
            .ok_or_else(|| {
                DomainError::InvalidRecord(format!("job config has no {DEVICE_ID_KEY}"))
            })?
            .replace('-', ".");
        if let Some(device) = self.device_by_id(&device_id).await? {
            return Ok(device);
        }
        info!(device_id = %device_id, "device not found; creating");
        let device = Device::new(&device_id);
        self.store.insert(&device).await?;
        info!(axf_id = %device.axf_id, type_name = %device.type_name, "device created");
        Ok(device)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::persistence::MemoryStore;
    use crate::domain::Registry;
    use serde_json::json;

    fn service() -> DeviceService {
        DeviceService::new(Arc::new(MemoryStore::new(Registry::with_models().unwrap())))
    }

    #[tokio::test]
    async fn resolve_creates_once() {
        let svc = service();
        let config = json!({"DEVICE_ID": "07-00c4", "OUTPUT_TYPE": "force [N]"});
        let created = svc.resolve_device(&config).await.unwrap();
        assert_eq!(created.axf_id, "07.00c4");
        assert_eq!(created.type_name, "Launch Pad");

        let again = svc.resolve_device(&config).await.unwrap();
        assert_eq!(again.created_at, created.created_at);
        assert!(svc.device_by_id("07.00c4").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn creation_is_logged_once() {
        let capture = crate::shared::logging::LogCapture::default();
        let _guard = tracing::subscriber::set_default(capture.subscriber());
        let svc = service();
        let config = json!({"DEVICE_ID": "07-00c4"});
        svc.resolve_device(&config).await.unwrap();
        svc.resolve_device(&config).await.unwrap();
        svc.device_by_id("07.00c4").await.unwrap();
        assert_eq!(capture.contents().matches("device created").count(), 1);
    }

    #[tokio::test]
    async fn missing_device_id_is_rejected() {
        let svc = service();
        let err = svc.resolve_device(&json!({"OUTPUT_TYPE": "force"})).await.unwrap_err();
        assert!(matches!(err, DomainError::InvalidRecord(_)));
    }
}
