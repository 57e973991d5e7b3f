//! Frame sources.
//!
//! One front type, [`CameraSource`], dispatches on the source URL scheme:
//!
//! - `stub://` — synthetic dice scene (always built, used by tests)
//! - `http(s)://` — MJPEG or single-JPEG pull source (feature: ingest-http)
//! - device paths / `v4l2://` — local V4L2 devices (feature: ingest-v4l2)
//!
//! All sources expose the same contract: `connect()` once at startup (a
//! failure here is fatal, there is nothing to retry), then `next_frame()`
//! per loop iteration (a failure here is transient; the caller logs it,
//! skips the tick, and keeps going). Only the producer loop may call
//! `next_frame()`; the underlying devices do not support concurrent reads.

#[cfg(feature = "ingest-http")]
pub mod http;
pub mod synthetic;
#[cfg(feature = "ingest-v4l2")]
pub mod v4l2;

use anyhow::Result;

use crate::frame::Frame;

#[cfg(feature = "ingest-http")]
use http::HttpSource;
use synthetic::SyntheticSource;
#[cfg(feature = "ingest-v4l2")]
use v4l2::V4l2Source;

/// Configuration shared by all frame sources.
#[derive(Clone, Debug)]
pub struct SourceConfig {
    /// Source URL or device path.
    pub url: String,
    /// Target frame rate; 0 means unthrottled.
    pub target_fps: u32,
    /// Preferred frame width.
    pub width: u32,
    /// Preferred frame height.
    pub height: u32,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            url: "stub://dice".to_string(),
            target_fps: 30,
            width: 640,
            height: 480,
        }
    }
}

/// Statistics for a frame source.
#[derive(Clone, Debug)]
pub struct SourceStats {
    pub frames_captured: u64,
    pub source: String,
}

/// Scheme-dispatched camera source.
pub struct CameraSource {
    backend: Backend,
}

enum Backend {
    Synthetic(SyntheticSource),
    #[cfg(feature = "ingest-http")]
    Http(HttpSource),
    #[cfg(feature = "ingest-v4l2")]
    V4l2(V4l2Source),
}

impl CameraSource {
    pub fn new(config: SourceConfig) -> Result<Self> {
        let backend = if config.url.starts_with("stub://") {
            Backend::Synthetic(SyntheticSource::new(config))
        } else if config.url.starts_with("http://") || config.url.starts_with("https://") {
            #[cfg(feature = "ingest-http")]
            {
                Backend::Http(HttpSource::new(config)?)
            }
            #[cfg(not(feature = "ingest-http"))]
            {
                return Err(anyhow::anyhow!(
                    "source '{}' requires the ingest-http feature",
                    config.url
                ));
            }
        } else {
            #[cfg(feature = "ingest-v4l2")]
            {
                Backend::V4l2(V4l2Source::new(config)?)
            }
            #[cfg(not(feature = "ingest-v4l2"))]
            {
                return Err(anyhow::anyhow!(
                    "source '{}' requires the ingest-v4l2 feature",
                    config.url
                ));
            }
        };
        Ok(Self { backend })
    }

    /// Open the source. Fatal on failure; the process cannot recover from a
    /// camera it could never open.
    pub fn connect(&mut self) -> Result<()> {
        match &mut self.backend {
            Backend::Synthetic(source) => source.connect(),
            #[cfg(feature = "ingest-http")]
            Backend::Http(source) => source.connect(),
            #[cfg(feature = "ingest-v4l2")]
            Backend::V4l2(source) => source.connect(),
        }
    }

    /// Capture the next frame. Transient failures are expected; callers skip
    /// the tick and retry.
    pub fn next_frame(&mut self) -> Result<Frame> {
        match &mut self.backend {
            Backend::Synthetic(source) => source.next_frame(),
            #[cfg(feature = "ingest-http")]
            Backend::Http(source) => source.next_frame(),
            #[cfg(feature = "ingest-v4l2")]
            Backend::V4l2(source) => source.next_frame(),
        }
    }

    /// True while the source is delivering frames at a plausible rate.
    pub fn is_healthy(&self) -> bool {
        match &self.backend {
            Backend::Synthetic(source) => source.is_healthy(),
            #[cfg(feature = "ingest-http")]
            Backend::Http(source) => source.is_healthy(),
            #[cfg(feature = "ingest-v4l2")]
            Backend::V4l2(source) => source.is_healthy(),
        }
    }

    pub fn stats(&self) -> SourceStats {
        match &self.backend {
            Backend::Synthetic(source) => source.stats(),
            #[cfg(feature = "ingest-http")]
            Backend::Http(source) => source.stats(),
            #[cfg(feature = "ingest-v4l2")]
            Backend::V4l2(source) => source.stats(),
        }
    }
}
