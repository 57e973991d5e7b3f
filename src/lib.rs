//! dicecam
//!
//! A camera service that reads the face of a die in view and serves it over
//! HTTP. Per-frame blob counts are noisy; the interesting part is turning
//! them into a debounced integer:
//!
//! - readings are sampled every 10th frame (decimation against
//!   single-frame noise),
//! - a number is confirmed only after 3 consecutive equal non-zero
//!   readings (hysteresis),
//! - a confirmed number expires after 5 seconds without a qualifying
//!   sample.
//!
//! # Module structure
//!
//! - `frame`: owned RGB frame container
//! - `ingest`: frame sources (synthetic stub, HTTP MJPEG, V4L2)
//! - `detect`: threshold-sweep blob detector
//! - `stability`: reading buffer, debouncing state machine, publish sinks
//! - `state`: atomically shared current-number cell
//! - `stream`: annotation, JPEG encoding, multipart fan-out
//! - `api`: HTTP server (`/get-current-number`, `/get-score`, `/video`,
//!   `/health`)
//! - `config`: file + env configuration
//!
//! The producer loop (`dicecamd`) is the sole writer of the published
//! state; any number of HTTP readers poll it concurrently. A separate
//! `dicecam_api` binary serves queries from the mirror file when the
//! producer runs in another process.

pub mod api;
pub mod config;
pub mod detect;
pub mod frame;
pub mod ingest;
pub mod stability;
pub mod state;
pub mod stream;

pub use detect::{BlobDetector, DetectorParams, Keypoint};
pub use frame::Frame;
pub use ingest::{CameraSource, SourceConfig, SourceStats};
pub use stability::{
    FileMirrorSink, NumberSink, ReadingBuffer, SharedStateSink, StabilityEngine, EXPIRY,
    READING_CAPACITY, SAMPLE_INTERVAL_FRAMES, STABLE_RUN,
};
pub use state::SharedNumber;
pub use stream::{annotate, encode_jpeg, FrameFeed, MjpegWriter, STREAM_BOUNDARY};
