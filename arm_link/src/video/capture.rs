use tracing::info;

use super::{ChannelOrder, RawFrame};
use crate::LinkError;

/// A source of raw frames, owned exclusively by one pipeline.
pub trait CaptureDevice: Send {
    fn name(&self) -> &str;

    /// Grabs the next frame. An error means this tick has nothing to show.
    fn grab(&mut self) -> Result<RawFrame, LinkError>;

    /// Gives the device back to the system. Called exactly once, when the pipeline stops.
    fn release(&mut self);
}

/// Which capture device the console opens.
#[derive(serde::Serialize, serde::Deserialize, Debug, Clone, PartialEq, Default)]
#[serde(rename_all = "lowercase")]
pub enum VideoSource {
    /// A generated test pattern; no hardware needed.
    #[default]
    Synthetic,
    /// The system camera with the given index.
    Camera { index: u32 },
}

/// Opens the device described by `source`.
pub fn open_device(source: &VideoSource) -> Result<Box<dyn CaptureDevice>, LinkError> {
    match source {
        VideoSource::Synthetic => Ok(Box::new(SyntheticCapture::new(640, 480))),
        #[cfg(feature = "camera")]
        VideoSource::Camera { index } => Ok(Box::new(camera::NokhwaCamera::open(*index)?)),
        #[cfg(not(feature = "camera"))]
        VideoSource::Camera { index } => Err(LinkError::CaptureUnavailable(format!(
            "camera {} requested but camera support is not compiled in",
            index
        ))),
    }
}

/// Moving BGR gradient, the same byte layout a camera driver hands over.
#[derive(Debug)]
pub struct SyntheticCapture {
    width: u32,
    height: u32,
    tick: u32,
    released: bool,
}

impl SyntheticCapture {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            tick: 0,
            released: false,
        }
    }
}

impl CaptureDevice for SyntheticCapture {
    fn name(&self) -> &str {
        "synthetic"
    }

    fn grab(&mut self) -> Result<RawFrame, LinkError> {
        if self.released {
            return Err(LinkError::CaptureUnavailable("device released".to_string()));
        }
        self.tick = self.tick.wrapping_add(1);
        let mut data = Vec::with_capacity((self.width * self.height * 3) as usize);
        for y in 0..self.height {
            for x in 0..self.width {
                let band = (x.wrapping_add(self.tick.wrapping_mul(4)) % self.width.max(1)) * 255 / self.width.max(1);
                let fade = y * 255 / self.height.max(1);
                // B, G, R
                data.extend_from_slice(&[band as u8, fade as u8, (255 - band) as u8]);
            }
        }
        Ok(RawFrame {
            data,
            width: self.width,
            height: self.height,
            order: ChannelOrder::Bgr,
        })
    }

    fn release(&mut self) {
        self.released = true;
        info!("Released synthetic capture");
    }
}

#[cfg(feature = "camera")]
mod camera {
    use nokhwa::pixel_format::RgbFormat;
    use nokhwa::utils::{CameraIndex, RequestedFormat, RequestedFormatType};
    use nokhwa::Camera;
    use tracing::{info, warn};

    use super::CaptureDevice;
    use crate::video::{ChannelOrder, RawFrame};
    use crate::LinkError;

    pub struct NokhwaCamera {
        camera: Camera,
        label: String,
    }

    impl NokhwaCamera {
        pub fn open(index: u32) -> Result<Self, LinkError> {
            let requested = RequestedFormat::new::<RgbFormat>(RequestedFormatType::AbsoluteHighestFrameRate);
            let mut camera = Camera::new(CameraIndex::Index(index), requested)
                .map_err(|e| LinkError::CaptureUnavailable(e.to_string()))?;
            camera
                .open_stream()
                .map_err(|e| LinkError::CaptureUnavailable(e.to_string()))?;
            info!("Opened camera {}", index);
            Ok(Self {
                camera,
                label: format!("camera {}", index),
            })
        }
    }

    impl CaptureDevice for NokhwaCamera {
        fn name(&self) -> &str {
            &self.label
        }

        fn grab(&mut self) -> Result<RawFrame, LinkError> {
            let buffer = self
                .camera
                .frame()
                .map_err(|e| LinkError::CaptureUnavailable(e.to_string()))?;
            let image = buffer
                .decode_image::<RgbFormat>()
                .map_err(|e| LinkError::CaptureUnavailable(e.to_string()))?;
            let (width, height) = (image.width(), image.height());
            Ok(RawFrame {
                data: image.into_raw(),
                width,
                height,
                order: ChannelOrder::Rgb,
            })
        }

        fn release(&mut self) {
            match self.camera.stop_stream() {
                Ok(()) => info!("Released {}", self.label),
                Err(e) => warn!("Failed to release {}: {}", self.label, e),
            }
        }
    }
}
