//! Blob detection.
//!
//! Finds dark circular features ("pips") in a frame. The detector is
//! configured once at startup and holds no state across calls; given the
//! same frame and parameters it always returns the same keypoints.

mod blob;

pub use blob::BlobDetector;

/// Detection parameters, fixed at startup.
#[derive(Clone, Debug)]
pub struct DetectorParams {
    /// Lowest binarization threshold in the sweep.
    pub min_threshold: u8,
    /// Highest binarization threshold in the sweep.
    pub max_threshold: u8,
    /// Step between thresholds.
    pub threshold_step: u8,
    /// A blob must appear at this many thresholds to count.
    pub min_repeatability: usize,
    /// Centers closer than this (pixels) are the same blob.
    pub min_dist_between_blobs: f32,
    /// Minimum blob area in pixels.
    pub min_area: f32,
    /// Minimum circularity, `4π·area / perimeter²`.
    pub min_circularity: f32,
    /// Minimum ratio of the blob's principal second moments.
    pub min_inertia_ratio: f32,
}

impl Default for DetectorParams {
    fn default() -> Self {
        Self {
            min_threshold: 10,
            max_threshold: 200,
            threshold_step: 10,
            min_repeatability: 2,
            min_dist_between_blobs: 10.0,
            min_area: 100.0,
            min_circularity: 0.3,
            min_inertia_ratio: 0.5,
        }
    }
}

/// A detected blob: center position and estimated diameter, for annotation.
#[derive(Clone, Copy, Debug)]
pub struct Keypoint {
    pub x: f32,
    pub y: f32,
    pub size: f32,
}
