//! The `capture` module covers the camera side of snapsight: device
//! enumeration and acquisition, capability probing, and freezing a frame
//! into the fixed-size square JPEG sent upstream.

use async_trait::async_trait;
use image::DynamicImage;
use serde::Serialize;

pub mod frame;
#[cfg(feature = "screen-capture")]
pub mod screen;
pub mod still;

/// Error type for camera operations
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DeviceError {
    #[error("device unavailable: {0}")]
    Unavailable(String),
    #[error("not supported: {0}")]
    Unsupported(String),
}

/// Which device to acquire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceSelector {
    Id(String),
    /// Let the backend pick, favouring a rear-facing ("environment") camera.
    PreferRear,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeviceInfo {
    pub id: String,
    pub label: String,
    pub rear_facing: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SettingRange {
    pub min: f64,
    pub max: f64,
    pub step: f64,
}

impl SettingRange {
    pub fn contains(&self, value: f64) -> bool {
        value >= self.min && value <= self.max
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FocusMode {
    Manual,
    Single,
    Continuous,
}

/// What the live source lets the operator adjust. `None`/empty means the
/// control is unavailable and should not be rendered.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CapabilityDescriptor {
    pub zoom: Option<SettingRange>,
    pub focus_modes: Vec<FocusMode>,
    pub focus_distance: Option<SettingRange>,
}

impl CapabilityDescriptor {
    pub fn zoom_available(&self) -> bool {
        self.zoom.is_some()
    }

    pub fn focus_available(&self) -> bool {
        !self.focus_modes.is_empty()
    }

    pub fn focus_distance_available(&self) -> bool {
        self.focus_distance.is_some() && self.focus_modes.contains(&FocusMode::Manual)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CameraSetting {
    Zoom(f64),
    FocusMode(FocusMode),
    FocusDistance(f64),
}

/// A live video feed owned by the controller.
pub trait CaptureSource: Send {
    fn device_id(&self) -> &str;

    /// Native frame (width, height).
    fn native_size(&self) -> (u32, u32);

    fn is_live(&self) -> bool;

    /// Freeze the current frame at native resolution.
    fn grab_frame(&mut self) -> Result<DynamicImage, DeviceError>;

    /// Best-effort capability query.
    fn capabilities(&self) -> Result<CapabilityDescriptor, DeviceError>;

    /// Best-effort setting change.
    fn apply(&mut self, setting: CameraSetting) -> Result<(), DeviceError>;

    /// Release the underlying device. The source is not live afterwards.
    fn stop(&mut self);
}

/// Entry point to the platform's media devices.
#[async_trait]
pub trait CameraBackend: Send + Sync {
    async fn enumerate(&self) -> Result<Vec<DeviceInfo>, DeviceError>;

    async fn acquire(&self, selector: &DeviceSelector) -> Result<Box<dyn CaptureSource>, DeviceError>;
}

/// Resolve a selector against an enumerated device list.
pub fn pick_device<'a>(devices: &'a [DeviceInfo], selector: &DeviceSelector) -> Option<&'a DeviceInfo> {
    match selector {
        DeviceSelector::Id(id) => devices.iter().find(|d| &d.id == id),
        DeviceSelector::PreferRear => devices
            .iter()
            .find(|d| d.rear_facing)
            .or_else(|| devices.first()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn devices() -> Vec<DeviceInfo> {
        vec![
            DeviceInfo {
                id: "front".into(),
                label: "Front".into(),
                rear_facing: false,
            },
            DeviceInfo {
                id: "back".into(),
                label: "Back".into(),
                rear_facing: true,
            },
        ]
    }

    #[test]
    fn prefer_rear_picks_environment_camera() {
        let list = devices();
        assert_eq!(pick_device(&list, &DeviceSelector::PreferRear).unwrap().id, "back");
    }

    #[test]
    fn prefer_rear_falls_back_to_first() {
        let list = vec![devices().remove(0)];
        assert_eq!(pick_device(&list, &DeviceSelector::PreferRear).unwrap().id, "front");
        assert!(pick_device(&[], &DeviceSelector::PreferRear).is_none());
    }

    #[test]
    fn explicit_id_must_exist() {
        let list = devices();
        assert!(pick_device(&list, &DeviceSelector::Id("missing".into())).is_none());
        assert_eq!(pick_device(&list, &DeviceSelector::Id("front".into())).unwrap().id, "front");
    }

    #[test]
    fn empty_descriptor_reports_nothing_available() {
        let caps = CapabilityDescriptor::default();
        assert!(!caps.zoom_available());
        assert!(!caps.focus_available());
        assert!(!caps.focus_distance_available());
    }
}
