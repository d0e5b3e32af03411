// still.rs — Treats image files on disk as camera devices. Each file is one
// device whose "live feed" is the decoded picture; zoom is emulated by
// cropping around the centre.

use async_trait::async_trait;
use image::{DynamicImage, GenericImageView};
use std::path::PathBuf;

use super::{
    pick_device, CameraBackend, CameraSetting, CapabilityDescriptor, CaptureSource, DeviceError,
    DeviceInfo, DeviceSelector, SettingRange,
};

const MAX_ZOOM: f64 = 4.0;

pub struct StillImageBackend {
    files: Vec<PathBuf>,
}

impl StillImageBackend {
    pub fn new(files: Vec<PathBuf>) -> Self {
        Self { files }
    }

    fn device_info(path: &std::path::Path) -> DeviceInfo {
        let label = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        DeviceInfo {
            id: path.display().to_string(),
            rear_facing: label.contains("rear") || label.contains("back"),
            label,
        }
    }
}

#[async_trait]
impl CameraBackend for StillImageBackend {
    async fn enumerate(&self) -> Result<Vec<DeviceInfo>, DeviceError> {
        Ok(self.files.iter().map(|p| Self::device_info(p)).collect())
    }

    async fn acquire(&self, selector: &DeviceSelector) -> Result<Box<dyn CaptureSource>, DeviceError> {
        let devices = self.enumerate().await?;
        let device = pick_device(&devices, selector)
            .ok_or_else(|| DeviceError::Unavailable(format!("no device matches {:?}", selector)))?
            .clone();

        let path = PathBuf::from(&device.id);
        let image = tokio::task::spawn_blocking(move || image::open(&path))
            .await
            .map_err(|e| DeviceError::Unavailable(e.to_string()))?
            .map_err(|e| DeviceError::Unavailable(format!("{}: {}", device.id, e)))?;

        log::info!(
            "Still image device '{}' opened ({}x{})",
            device.label,
            image.width(),
            image.height()
        );

        Ok(Box::new(StillImageSource {
            id: device.id,
            image,
            zoom: 1.0,
            live: true,
        }))
    }
}

pub struct StillImageSource {
    id: String,
    image: DynamicImage,
    zoom: f64,
    live: bool,
}

impl StillImageSource {
    pub fn from_image(id: impl Into<String>, image: DynamicImage) -> Self {
        Self {
            id: id.into(),
            image,
            zoom: 1.0,
            live: true,
        }
    }
}

impl CaptureSource for StillImageSource {
    fn device_id(&self) -> &str {
        &self.id
    }

    fn native_size(&self) -> (u32, u32) {
        self.image.dimensions()
    }

    fn is_live(&self) -> bool {
        self.live
    }

    fn grab_frame(&mut self) -> Result<DynamicImage, DeviceError> {
        if !self.live {
            return Err(DeviceError::Unavailable("source stopped".into()));
        }
        if self.zoom <= 1.0 {
            return Ok(self.image.clone());
        }
        // The frame keeps its native size: crop the centre, scale back up.
        let (w, h) = self.image.dimensions();
        let cw = ((w as f64 / self.zoom).round() as u32).max(1);
        let ch = ((h as f64 / self.zoom).round() as u32).max(1);
        let cropped = self.image.crop_imm((w - cw) / 2, (h - ch) / 2, cw, ch);
        Ok(cropped.resize_exact(w, h, image::imageops::FilterType::Triangle))
    }

    fn capabilities(&self) -> Result<CapabilityDescriptor, DeviceError> {
        Ok(CapabilityDescriptor {
            zoom: Some(SettingRange {
                min: 1.0,
                max: MAX_ZOOM,
                step: 0.1,
            }),
            ..CapabilityDescriptor::default()
        })
    }

    fn apply(&mut self, setting: CameraSetting) -> Result<(), DeviceError> {
        match setting {
            CameraSetting::Zoom(z) if (1.0..=MAX_ZOOM).contains(&z) => {
                self.zoom = z;
                Ok(())
            }
            CameraSetting::Zoom(z) => Err(DeviceError::Unsupported(format!("zoom {} out of range", z))),
            other => Err(DeviceError::Unsupported(format!("{:?}", other))),
        }
    }

    fn stop(&mut self) {
        self.live = false;
    }
}
