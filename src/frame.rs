//! Owned frame container.
//!
//! A `Frame` is one captured camera image in packed RGB8. Sources produce
//! frames, the detector reads them through `to_luma()`, and the stream layer
//! copies them for annotation. Frames are ephemeral: they live for one loop
//! iteration and are never stored.

use anyhow::{anyhow, Result};

/// One captured frame, packed RGB8 (3 bytes per pixel, row-major).
pub struct Frame {
    data: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

impl Frame {
    /// Create a frame from packed RGB8 bytes. The buffer length must be
    /// exactly `width * height * 3`.
    pub fn new(data: Vec<u8>, width: u32, height: u32) -> Result<Self> {
        let expected = width as usize * height as usize * 3;
        if data.len() != expected {
            return Err(anyhow!(
                "frame buffer length {} does not match {}x{} rgb8 ({} bytes)",
                data.len(),
                width,
                height,
                expected
            ));
        }
        Ok(Self {
            data,
            width,
            height,
        })
    }

    /// Packed RGB8 pixel bytes.
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Convert to a grayscale plane (one byte per pixel, Rec. 601 weights).
    pub fn to_luma(&self) -> Vec<u8> {
        self.data
            .chunks_exact(3)
            .map(|px| {
                let r = px[0] as u32;
                let g = px[1] as u32;
                let b = px[2] as u32;
                ((r * 299 + g * 587 + b * 114) / 1000) as u8
            })
            .collect()
    }
}
