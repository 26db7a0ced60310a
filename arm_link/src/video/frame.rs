use std::time::Instant;

use image::imageops::{self, FilterType};
use image::RgbImage;

use crate::LinkError;

/// Byte order of the three channels in a [`RawFrame`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelOrder {
    Bgr,
    Rgb,
}

/// Packed 8-bit, 3-channel pixels exactly as a capture device produced them.
#[derive(Debug, Clone, PartialEq)]
pub struct RawFrame {
    pub data: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub order: ChannelOrder,
}

/// A display-ready frame: RGB, already scaled to the display size.
#[derive(Debug, Clone)]
pub struct Frame {
    pub pixels: RgbImage,
    pub sequence: u64,
    pub captured_at: Instant,
}

impl Frame {
    /// Scales `raw` to exactly `width` x `height` and reorders it to RGB.
    ///
    /// Triangle (bilinear) filtering is used; it is the closest to area averaging that
    /// `imageops` offers when shrinking camera frames.
    pub fn from_raw(raw: RawFrame, width: u32, height: u32, sequence: u64) -> Result<Frame, LinkError> {
        let RawFrame {
            data,
            width: src_width,
            height: src_height,
            order,
        } = raw;
        if src_width == 0 || src_height == 0 {
            return Err(LinkError::CaptureUnavailable("empty frame".to_string()));
        }

        // resizing treats channels independently, so the order can be fixed afterwards
        let source = RgbImage::from_raw(src_width, src_height, data).ok_or_else(|| {
            LinkError::CaptureUnavailable(format!(
                "buffer does not hold {}x{} pixels",
                src_width, src_height
            ))
        })?;
        let mut pixels = if (src_width, src_height) == (width, height) {
            source
        } else {
            imageops::resize(&source, width, height, FilterType::Triangle)
        };
        if order == ChannelOrder::Bgr {
            for pixel in pixels.pixels_mut() {
                pixel.0.swap(0, 2);
            }
        }

        Ok(Frame {
            pixels,
            sequence,
            captured_at: Instant::now(),
        })
    }

    pub fn width(&self) -> u32 {
        self.pixels.width()
    }

    pub fn height(&self) -> u32 {
        self.pixels.height()
    }

    /// Rec. 601 luma of the pixel at (`x`, `y`), or 0 outside the frame.
    pub fn luma(&self, x: u32, y: u32) -> u8 {
        match self.pixels.get_pixel_checked(x, y) {
            Some(pixel) => {
                let [r, g, b] = pixel.0;
                let weighted = 299 * u32::from(r) + 587 * u32::from(g) + 114 * u32::from(b);
                u8::try_from(weighted / 1000).unwrap_or(u8::MAX)
            }
            None => 0,
        }
    }
}
