//! Camera device selection.

/// Device id meaning "let the platform choose".
pub const DEFAULT_CAMERA: &str = "default-camera";

pub const IDEAL_WIDTH: u32 = 1280;
pub const IDEAL_HEIGHT: u32 = 720;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CameraDevice {
    pub device_id: String,
    pub label: String,
}

/// Constraints passed to the provider when opening a camera.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VideoConstraints {
    /// Exact device to open. `None` lets the platform choose.
    pub device_id: Option<String>,
    pub ideal_width: u32,
    pub ideal_height: u32,
}

impl VideoConstraints {
    pub fn for_device(device_id: &str) -> Self {
        let device_id = device_id.trim();
        Self {
            device_id: if device_id.is_empty() || device_id == DEFAULT_CAMERA {
                None
            } else {
                Some(device_id.to_string())
            },
            ideal_width: IDEAL_WIDTH,
            ideal_height: IDEAL_HEIGHT,
        }
    }
}

/// Drop entries without a usable id and give unlabeled devices a readable name.
pub fn normalize_devices(devices: Vec<CameraDevice>) -> Vec<CameraDevice> {
    devices
        .into_iter()
        .filter(|device| !device.device_id.trim().is_empty())
        .enumerate()
        .map(|(index, device)| CameraDevice {
            label: if device.label.trim().is_empty() {
                format!("Camera {}", index + 1)
            } else {
                device.label
            },
            device_id: device.device_id,
        })
        .collect()
}
