// screen.rs — Exposes monitors as capture devices via `xcap`, for machines
// without a camera. Monitors have no zoom or focus, so the capability probe
// always reports those controls as unavailable.

use async_trait::async_trait;
use image::DynamicImage;

use super::{
    pick_device, CameraBackend, CameraSetting, CapabilityDescriptor, CaptureSource, DeviceError,
    DeviceInfo, DeviceSelector,
};

pub struct ScreenBackend;

fn monitors() -> Result<Vec<xcap::Monitor>, DeviceError> {
    xcap::Monitor::all().map_err(|e| DeviceError::Unavailable(format!("enumerate monitors: {e}")))
}

#[async_trait]
impl CameraBackend for ScreenBackend {
    async fn enumerate(&self) -> Result<Vec<DeviceInfo>, DeviceError> {
        Ok(monitors()?
            .iter()
            .map(|m| DeviceInfo {
                id: m.id().to_string(),
                label: m.name().to_string(),
                // The primary monitor stands in for the "environment" camera.
                rear_facing: m.is_primary(),
            })
            .collect())
    }

    async fn acquire(&self, selector: &DeviceSelector) -> Result<Box<dyn CaptureSource>, DeviceError> {
        let devices = self.enumerate().await?;
        let device = pick_device(&devices, selector)
            .ok_or_else(|| DeviceError::Unavailable("no monitors found".into()))?;
        let monitor = monitors()?
            .into_iter()
            .find(|m| m.id().to_string() == device.id)
            .ok_or_else(|| DeviceError::Unavailable(format!("monitor {} disappeared", device.id)))?;

        log::info!("Screen device '{}' acquired", device.label);
        Ok(Box::new(ScreenSource {
            id: device.id.clone(),
            monitor,
            live: true,
        }))
    }
}

pub struct ScreenSource {
    id: String,
    monitor: xcap::Monitor,
    live: bool,
}

impl CaptureSource for ScreenSource {
    fn device_id(&self) -> &str {
        &self.id
    }

    fn native_size(&self) -> (u32, u32) {
        (self.monitor.width(), self.monitor.height())
    }

    fn is_live(&self) -> bool {
        self.live
    }

    fn grab_frame(&mut self) -> Result<DynamicImage, DeviceError> {
        if !self.live {
            return Err(DeviceError::Unavailable("source stopped".into()));
        }
        let raw = self
            .monitor
            .capture_image()
            .map_err(|e| DeviceError::Unavailable(format!("capture_image: {e}")))?;
        Ok(DynamicImage::ImageRgba8(raw))
    }

    fn capabilities(&self) -> Result<CapabilityDescriptor, DeviceError> {
        Ok(CapabilityDescriptor::default())
    }

    fn apply(&mut self, setting: CameraSetting) -> Result<(), DeviceError> {
        Err(DeviceError::Unsupported(format!("{:?} on a monitor", setting)))
    }

    fn stop(&mut self) {
        self.live = false;
    }
}
