use serde::Serialize;
use tracing::{debug, info};

use super::backend::{BleBackend, MacAddr};
use crate::device::models::profile_for_model;
use crate::error::BackendError;

/// A bonded device, with the model name when it is a supported one.
#[derive(Debug, Clone, Serialize)]
pub struct BondedDevice {
    pub name: String,
    pub address: MacAddr,
    pub model: Option<&'static str>,
}

/// List bonded devices, optionally only the ones that look like Soundcore headphones.
pub async fn list_bonded_devices(
    backend: &dyn BleBackend,
    filter_known: bool,
) -> Result<Vec<BondedDevice>, BackendError> {
    let mut result = Vec::new();
    for descriptor in backend.bonded_devices().await? {
        if filter_known && !is_known_device(&descriptor.name) {
            continue;
        }
        let model = profile_for_model(&descriptor.name).map(|p| p.name);
        debug!(
            "Found device: {} ({}), model={:?}",
            descriptor.name, descriptor.mac_address, model
        );
        result.push(BondedDevice {
            name: descriptor.name,
            address: descriptor.mac_address,
            model,
        });
    }

    info!("Found {} bonded devices", result.len());
    Ok(result)
}

/// Check if a device name matches a known supported device.
pub fn is_known_device(name: &str) -> bool {
    name.starts_with("Soundcore") || profile_for_model(name).is_some()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bluetooth::demo::{DemoBackend, DemoConfig};

    #[test]
    fn test_known_device_names() {
        assert!(is_known_device("Soundcore Life Q30"));
        assert!(is_known_device("Life Q35"));
        assert!(is_known_device("Soundcore Space One"));
        assert!(!is_known_device("Pixel Buds Pro"));
    }

    #[tokio::test]
    async fn test_list_filters_unknown_names() {
        let q30 = DemoBackend::new(DemoConfig::default());
        let listed = list_bonded_devices(&q30, true).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].model, Some("Soundcore Life Q30"));

        let speaker = DemoBackend::new(DemoConfig {
            name: "Kitchen Speaker".into(),
            ..Default::default()
        });
        assert!(list_bonded_devices(&speaker, true).await.unwrap().is_empty());
        assert_eq!(list_bonded_devices(&speaker, false).await.unwrap().len(), 1);
    }
}
