//! Synthetic dice-scene source (`stub://`).
//!
//! Renders a light background with a changing number of dark circular pips,
//! so the whole pipeline — detection, stabilization, expiry, streaming —
//! can run without camera hardware. The pip count cycles through 0..=6,
//! holding each face long enough for the stability engine to confirm it.

use anyhow::Result;

use super::{SourceConfig, SourceStats};
use crate::frame::Frame;

const BACKGROUND: u8 = 230;
const PIP: u8 = 30;

/// Frames per simulated dice face.
const SCENE_HOLD_FRAMES: u64 = 60;

/// Pip centers per face value, on a 3x3 grid (column, row).
const FACES: [&[(u32, u32)]; 7] = [
    &[],
    &[(1, 1)],
    &[(0, 0), (2, 2)],
    &[(0, 0), (1, 1), (2, 2)],
    &[(0, 0), (2, 0), (0, 2), (2, 2)],
    &[(0, 0), (2, 0), (1, 1), (0, 2), (2, 2)],
    &[(0, 0), (0, 1), (0, 2), (2, 0), (2, 1), (2, 2)],
];

pub struct SyntheticSource {
    config: SourceConfig,
    frame_count: u64,
}

impl SyntheticSource {
    pub fn new(config: SourceConfig) -> Self {
        Self {
            config,
            frame_count: 0,
        }
    }

    pub fn connect(&mut self) -> Result<()> {
        log::info!("SyntheticSource: connected to {}", self.config.url);
        Ok(())
    }

    pub fn next_frame(&mut self) -> Result<Frame> {
        let face = ((self.frame_count / SCENE_HOLD_FRAMES) % FACES.len() as u64) as usize;
        self.frame_count += 1;
        self.render_face(face)
    }

    pub fn is_healthy(&self) -> bool {
        true
    }

    pub fn stats(&self) -> SourceStats {
        SourceStats {
            frames_captured: self.frame_count,
            source: self.config.url.clone(),
        }
    }

    fn render_face(&self, face: usize) -> Result<Frame> {
        let width = self.config.width;
        let height = self.config.height;
        let mut luma = vec![BACKGROUND; width as usize * height as usize];

        let radius = (width.min(height) / 12).max(4) as i32;
        for &(col, row) in FACES[face] {
            let cx = (width * (col + 1) / 4) as i32;
            let cy = (height * (row + 1) / 4) as i32;
            fill_circle(&mut luma, width as usize, height as usize, cx, cy, radius);
        }

        let rgb: Vec<u8> = luma.iter().flat_map(|&v| [v, v, v]).collect();
        Frame::new(rgb, width, height)
    }
}

fn fill_circle(luma: &mut [u8], width: usize, height: usize, cx: i32, cy: i32, radius: i32) {
    for dy in -radius..=radius {
        for dx in -radius..=radius {
            if dx * dx + dy * dy > radius * radius {
                continue;
            }
            let x = cx + dx;
            let y = cy + dy;
            if x >= 0 && y >= 0 && (x as usize) < width && (y as usize) < height {
                luma[y as usize * width + x as usize] = PIP;
            }
        }
    }
}
