//! Threshold-sweep blob detector.
//!
//! The frame's luma plane is binarized at each threshold in
//! `[min_threshold, max_threshold]`; connected dark regions are measured and
//! filtered by area, circularity, and inertia ratio; surviving centers are
//! grouped across thresholds, and groups seen at `min_repeatability` or more
//! thresholds become keypoints.
//!
//! Perimeter is counted as exposed pixel edges (4-neighborhood), so
//! circularity values are relative to the Manhattan metric: a rasterized
//! disk lands near 0.6, an elongated bar well below the 0.3 default.

use std::f32::consts::PI;

use crate::detect::{DetectorParams, Keypoint};
use crate::frame::Frame;

/// Stateless blob detector. Configured once, reused read-only.
pub struct BlobDetector {
    params: DetectorParams,
}

/// One blob measured at a single threshold.
#[derive(Clone, Copy, Debug)]
struct BlobCandidate {
    x: f32,
    y: f32,
    area: f32,
}

impl BlobDetector {
    pub fn new(params: DetectorParams) -> Self {
        Self { params }
    }

    pub fn params(&self) -> &DetectorParams {
        &self.params
    }

    /// Detect blobs in a frame. Deterministic given frame and parameters.
    pub fn detect(&self, frame: &Frame) -> Vec<Keypoint> {
        let luma = frame.to_luma();
        let width = frame.width as usize;
        let height = frame.height as usize;
        let step = self.params.threshold_step.max(1);

        // Candidates from nearby thresholds that describe the same blob.
        let mut groups: Vec<Vec<BlobCandidate>> = Vec::new();

        let mut threshold = self.params.min_threshold;
        loop {
            for cand in self.threshold_blobs(&luma, width, height, threshold) {
                let slot = groups.iter().position(|group| {
                    group
                        .last()
                        .map(|last| center_distance(last, &cand) < self.params.min_dist_between_blobs)
                        .unwrap_or(false)
                });
                match slot {
                    Some(i) => groups[i].push(cand),
                    None => groups.push(vec![cand]),
                }
            }
            match threshold.checked_add(step) {
                Some(next) if next <= self.params.max_threshold => threshold = next,
                _ => break,
            }
        }

        groups
            .into_iter()
            .filter(|group| group.len() >= self.params.min_repeatability.max(1))
            .map(|group| {
                let n = group.len() as f32;
                let x = group.iter().map(|c| c.x).sum::<f32>() / n;
                let y = group.iter().map(|c| c.y).sum::<f32>() / n;
                let area = group.iter().map(|c| c.area).sum::<f32>() / n;
                Keypoint {
                    x,
                    y,
                    size: 2.0 * (area / PI).sqrt(),
                }
            })
            .collect()
    }

    /// Connected dark regions at one threshold, filtered by shape.
    fn threshold_blobs(
        &self,
        luma: &[u8],
        width: usize,
        height: usize,
        threshold: u8,
    ) -> Vec<BlobCandidate> {
        let mut visited = vec![false; luma.len()];
        let mut candidates = Vec::new();
        let mut stack = Vec::new();
        let mut pixels: Vec<(usize, usize)> = Vec::new();

        for start in 0..luma.len() {
            if visited[start] || luma[start] >= threshold {
                continue;
            }

            pixels.clear();
            let mut perimeter = 0u32;
            stack.push(start);
            visited[start] = true;

            while let Some(idx) = stack.pop() {
                let x = idx % width;
                let y = idx / width;
                pixels.push((x, y));

                let mut visit = |nx: isize, ny: isize| {
                    if nx < 0 || ny < 0 || nx as usize >= width || ny as usize >= height {
                        perimeter += 1;
                        return;
                    }
                    let nidx = ny as usize * width + nx as usize;
                    if luma[nidx] >= threshold {
                        perimeter += 1;
                    } else if !visited[nidx] {
                        visited[nidx] = true;
                        stack.push(nidx);
                    }
                };
                visit(x as isize - 1, y as isize);
                visit(x as isize + 1, y as isize);
                visit(x as isize, y as isize - 1);
                visit(x as isize, y as isize + 1);
            }

            if let Some(cand) = self.measure(&pixels, perimeter) {
                candidates.push(cand);
            }
        }

        candidates
    }

    /// Apply area, circularity, and inertia filters to one region.
    fn measure(&self, pixels: &[(usize, usize)], perimeter: u32) -> Option<BlobCandidate> {
        let area = pixels.len() as f32;
        if area < self.params.min_area {
            return None;
        }

        let perimeter = perimeter as f32;
        if perimeter <= 0.0 {
            return None;
        }
        let circularity = 4.0 * PI * area / (perimeter * perimeter);
        if circularity < self.params.min_circularity {
            return None;
        }

        let cx = pixels.iter().map(|&(x, _)| x as f32).sum::<f32>() / area;
        let cy = pixels.iter().map(|&(_, y)| y as f32).sum::<f32>() / area;

        // Normalized central second moments.
        let mut m20 = 0.0f32;
        let mut m02 = 0.0f32;
        let mut m11 = 0.0f32;
        for &(x, y) in pixels {
            let dx = x as f32 - cx;
            let dy = y as f32 - cy;
            m20 += dx * dx;
            m02 += dy * dy;
            m11 += dx * dy;
        }
        m20 /= area;
        m02 /= area;
        m11 /= area;

        let common = ((m20 - m02) * (m20 - m02) + 4.0 * m11 * m11).sqrt();
        let eig_max = (m20 + m02 + common) / 2.0;
        let eig_min = (m20 + m02 - common) / 2.0;
        let inertia_ratio = if eig_max > f32::EPSILON {
            eig_min / eig_max
        } else {
            1.0
        };
        if inertia_ratio < self.params.min_inertia_ratio {
            return None;
        }

        Some(BlobCandidate {
            x: cx,
            y: cy,
            area,
        })
    }
}

fn center_distance(a: &BlobCandidate, b: &BlobCandidate) -> f32 {
    let dx = a.x - b.x;
    let dy = a.y - b.y;
    (dx * dx + dy * dy).sqrt()
}
