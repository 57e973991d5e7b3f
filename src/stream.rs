//! Frame annotation, JPEG encoding, and multipart streaming.
//!
//! The producer loop annotates each frame with its detected keypoints,
//! encodes it to JPEG, and publishes the bytes into a [`FrameFeed`]. Each
//! `/video` consumer drains the feed independently and wraps the bytes in
//! `multipart/x-mixed-replace` parts via [`MjpegWriter`]. A consumer that
//! disconnects fails its next write and ends its own stream; the producer
//! and other consumers are unaffected.

use anyhow::{anyhow, Context, Result};
use image::{Rgb, RgbImage};
use std::io::Write;
use std::sync::{Arc, Condvar, Mutex};
use std::time::Duration;

use crate::detect::Keypoint;
use crate::frame::Frame;

/// Multipart boundary marker used by the `/video` stream.
pub const STREAM_BOUNDARY: &str = "frame";

const JPEG_QUALITY: u8 = 80;
const KEYPOINT_COLOR: Rgb<u8> = Rgb([255, 0, 0]);

/// Content-Type header value for the `/video` response.
pub fn video_content_type() -> String {
    format!("multipart/x-mixed-replace; boundary={}", STREAM_BOUNDARY)
}

/// Copy a frame and draw a ring around every keypoint.
pub fn annotate(frame: &Frame, keypoints: &[Keypoint]) -> Result<RgbImage> {
    let mut image = RgbImage::from_raw(frame.width, frame.height, frame.data().to_vec())
        .ok_or_else(|| anyhow!("frame buffer does not match its dimensions"))?;
    for kp in keypoints {
        let radius = (kp.size / 2.0).round() as i32;
        // Three concentric rings give the outline some thickness.
        for r in radius.saturating_sub(1)..=radius + 1 {
            draw_ring(&mut image, kp.x.round() as i32, kp.y.round() as i32, r);
        }
    }
    Ok(image)
}

/// Encode an annotated image to JPEG.
pub fn encode_jpeg(image: &RgbImage) -> Result<Vec<u8>> {
    let mut jpeg = Vec::new();
    let mut encoder = image::codecs::jpeg::JpegEncoder::new_with_quality(&mut jpeg, JPEG_QUALITY);
    encoder
        .encode(
            image.as_raw(),
            image.width(),
            image.height(),
            image::ExtendedColorType::Rgb8,
        )
        .context("encode frame to jpeg")?;
    Ok(jpeg)
}

/// Midpoint circle outline with bounds-checked pixel writes.
fn draw_ring(image: &mut RgbImage, cx: i32, cy: i32, radius: i32) {
    if radius <= 0 {
        put_pixel(image, cx, cy);
        return;
    }
    let mut x = radius;
    let mut y = 0;
    let mut err = 1 - radius;
    while x >= y {
        for (px, py) in [
            (cx + x, cy + y),
            (cx + y, cy + x),
            (cx - y, cy + x),
            (cx - x, cy + y),
            (cx - x, cy - y),
            (cx - y, cy - x),
            (cx + y, cy - x),
            (cx + x, cy - y),
        ] {
            put_pixel(image, px, py);
        }
        y += 1;
        if err < 0 {
            err += 2 * y + 1;
        } else {
            x -= 1;
            err += 2 * (y - x) + 1;
        }
    }
}

fn put_pixel(image: &mut RgbImage, x: i32, y: i32) {
    if x >= 0 && y >= 0 && (x as u32) < image.width() && (y as u32) < image.height() {
        image.put_pixel(x as u32, y as u32, KEYPOINT_COLOR);
    }
}

// ----------------------------------------------------------------------------
// MjpegWriter
// ----------------------------------------------------------------------------

/// Frames JPEG images into a `multipart/x-mixed-replace` byte stream.
///
/// Each part is `--frame\r\nContent-Type: image/jpeg\r\n\r\n<jpeg>\r\n\r\n`.
/// A write error means the consumer went away; the caller stops its stream.
pub struct MjpegWriter<W: Write> {
    sink: W,
}

impl<W: Write> MjpegWriter<W> {
    pub fn new(sink: W) -> Self {
        Self { sink }
    }

    pub fn write_part(&mut self, jpeg: &[u8]) -> Result<()> {
        self.sink
            .write_all(
                format!("--{}\r\nContent-Type: image/jpeg\r\n\r\n", STREAM_BOUNDARY).as_bytes(),
            )
            .context("write stream part header")?;
        self.sink.write_all(jpeg).context("write stream part body")?;
        self.sink
            .write_all(b"\r\n\r\n")
            .context("write stream part trailer")?;
        self.sink.flush().context("flush stream part")?;
        Ok(())
    }
}

// ----------------------------------------------------------------------------
// FrameFeed
// ----------------------------------------------------------------------------

/// Latest-frame fan-out slot between the producer loop and video consumers.
///
/// The producer overwrites the slot with each encoded frame; consumers block
/// on [`FrameFeed::wait_next`] until a frame newer than the one they last
/// delivered appears. Slow consumers skip frames instead of backing up the
/// producer.
#[derive(Clone, Default)]
pub struct FrameFeed {
    inner: Arc<FeedInner>,
}

#[derive(Default)]
struct FeedInner {
    state: Mutex<FeedState>,
    cond: Condvar,
}

#[derive(Default)]
struct FeedState {
    seq: u64,
    jpeg: Option<Arc<Vec<u8>>>,
}

impl FrameFeed {
    pub fn new() -> Self {
        Self::default()
    }

    /// Publish the newest encoded frame, waking all waiting consumers.
    pub fn publish(&self, jpeg: Vec<u8>) {
        let mut state = lock_feed(&self.inner.state);
        state.seq += 1;
        state.jpeg = Some(Arc::new(jpeg));
        drop(state);
        self.inner.cond.notify_all();
    }

    /// Wait for a frame newer than `last_seq`. Returns `None` on timeout so
    /// callers can re-check their shutdown condition.
    pub fn wait_next(&self, last_seq: u64, timeout: Duration) -> Option<(u64, Arc<Vec<u8>>)> {
        let deadline = std::time::Instant::now() + timeout;
        let mut state = lock_feed(&self.inner.state);
        loop {
            if state.seq > last_seq {
                if let Some(jpeg) = &state.jpeg {
                    return Some((state.seq, jpeg.clone()));
                }
            }
            let now = std::time::Instant::now();
            if now >= deadline {
                return None;
            }
            let (next, result) = match self.inner.cond.wait_timeout(state, deadline - now) {
                Ok((guard, result)) => (guard, result),
                Err(poisoned) => {
                    let (guard, result) = poisoned.into_inner();
                    (guard, result)
                }
            };
            state = next;
            if result.timed_out() && state.seq <= last_seq {
                return None;
            }
        }
    }
}

fn lock_feed(mutex: &Mutex<FeedState>) -> std::sync::MutexGuard<'_, FeedState> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_frame() -> Frame {
        Frame::new(vec![200u8; 32 * 32 * 3], 32, 32).unwrap()
    }

    #[test]
    fn annotate_draws_keypoint_rings() {
        let frame = test_frame();
        let keypoints = [Keypoint {
            x: 16.0,
            y: 16.0,
            size: 10.0,
        }];
        let image = annotate(&frame, &keypoints).unwrap();
        // The ring passes through (16 + 5, 16).
        assert_eq!(*image.get_pixel(21, 16), Rgb([255, 0, 0]));
        // The center stays untouched.
        assert_eq!(*image.get_pixel(16, 16), Rgb([200, 200, 200]));
    }

    #[test]
    fn annotate_clips_keypoints_at_the_border() {
        let frame = test_frame();
        let keypoints = [Keypoint {
            x: 0.0,
            y: 0.0,
            size: 40.0,
        }];
        // Must not panic on out-of-bounds ring pixels.
        annotate(&frame, &keypoints).unwrap();
    }

    #[test]
    fn encode_produces_jpeg_magic() {
        let image = annotate(&test_frame(), &[]).unwrap();
        let jpeg = encode_jpeg(&image).unwrap();
        assert_eq!(&jpeg[..2], &[0xFF, 0xD8]);
        assert_eq!(&jpeg[jpeg.len() - 2..], &[0xFF, 0xD9]);
    }

    #[test]
    fn mjpeg_writer_frames_parts() {
        let mut out = Vec::new();
        {
            let mut writer = MjpegWriter::new(&mut out);
            writer.write_part(b"AAA").unwrap();
            writer.write_part(b"BBB").unwrap();
        }
        let text = String::from_utf8_lossy(&out);
        assert_eq!(text.matches("--frame\r\n").count(), 2);
        assert_eq!(text.matches("Content-Type: image/jpeg\r\n\r\n").count(), 2);
        assert!(text.contains("AAA\r\n\r\n"));
        assert!(text.contains("BBB\r\n\r\n"));
    }

    #[test]
    fn feed_delivers_newer_frames_only() {
        let feed = FrameFeed::new();
        assert!(feed.wait_next(0, Duration::from_millis(10)).is_none());

        feed.publish(vec![1]);
        let (seq, jpeg) = feed.wait_next(0, Duration::from_millis(100)).unwrap();
        assert_eq!(seq, 1);
        assert_eq!(*jpeg, vec![1]);

        // Already delivered: times out instead of re-delivering.
        assert!(feed.wait_next(seq, Duration::from_millis(10)).is_none());

        feed.publish(vec![2]);
        let (seq2, jpeg2) = feed.wait_next(seq, Duration::from_millis(100)).unwrap();
        assert_eq!(seq2, 2);
        assert_eq!(*jpeg2, vec![2]);
    }

    #[test]
    fn feed_fans_out_to_multiple_consumers() {
        let feed = FrameFeed::new();
        let mut handles = Vec::new();
        for _ in 0..3 {
            let feed = feed.clone();
            handles.push(std::thread::spawn(move || {
                feed.wait_next(0, Duration::from_secs(2)).map(|(_, j)| j)
            }));
        }
        std::thread::sleep(Duration::from_millis(50));
        feed.publish(vec![7, 7]);
        for handle in handles {
            let jpeg = handle.join().unwrap().expect("consumer should see frame");
            assert_eq!(*jpeg, vec![7, 7]);
        }
    }
}
