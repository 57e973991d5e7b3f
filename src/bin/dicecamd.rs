//! dicecamd - dice reader daemon
//!
//! This daemon:
//! 1. Captures frames from the configured source
//! 2. Detects pip blobs in every frame
//! 3. Samples the count every 10th frame into the stability engine
//! 4. Publishes the debounced number to the shared cell and mirror file
//! 5. Streams annotated JPEG frames to `/video` consumers
//! 6. Serves `/get-current-number` from the shared cell

use anyhow::{Context, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use dicecam::{
    annotate,
    api::{ApiConfig, ApiServer, NumberSource},
    config::DicecamConfig,
    encode_jpeg, BlobDetector, CameraSource, FileMirrorSink, FrameFeed, NumberSink,
    SharedNumber, SharedStateSink, StabilityEngine, SAMPLE_INTERVAL_FRAMES,
};

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = DicecamConfig::load()?;

    // Startup failure here is fatal: a camera that never opened cannot be
    // retried into existence.
    let mut source = CameraSource::new(config.source.clone())?;
    source
        .connect()
        .with_context(|| format!("open frame source {}", config.source.url))?;

    let detector = BlobDetector::new(config.detector.clone());
    let shared = SharedNumber::new();
    let feed = FrameFeed::new();

    let api_config = ApiConfig {
        addr: config.api_addr.clone(),
    };
    let api_handle = ApiServer::new(
        api_config,
        NumberSource::Shared(shared.clone()),
        Some(feed.clone()),
    )
    .spawn()?;
    log::info!("api listening on {}", api_handle.addr);

    let mut sinks: Vec<Box<dyn NumberSink>> = vec![
        Box::new(SharedStateSink::new(shared)),
        Box::new(FileMirrorSink::new(config.mirror_path.clone())),
    ];
    log::info!(
        "mirroring current number to {}",
        config.mirror_path.display()
    );

    let mut engine = StabilityEngine::new();

    let running = Arc::new(AtomicBool::new(true));
    {
        let running = running.clone();
        ctrlc::set_handler(move || {
            running.store(false, Ordering::SeqCst);
        })?;
    }

    let frame_interval = if config.source.target_fps == 0 {
        Duration::ZERO
    } else {
        Duration::from_millis((1000 / config.source.target_fps).max(1) as u64)
    };

    let mut frame_counter = 0u64;
    let mut last_health_log = Instant::now();

    log::info!("dicecamd running. source={}", config.source.url);

    while running.load(Ordering::SeqCst) {
        let frame = match source.next_frame() {
            Ok(frame) => frame,
            Err(err) => {
                // Transient: skip the tick and retry. A failed capture does
                // not advance the sample counter.
                log::warn!("frame capture failed: {:#}", err);
                std::thread::sleep(Duration::from_millis(50));
                continue;
            }
        };

        let keypoints = detector.detect(&frame);

        if frame_counter % SAMPLE_INTERVAL_FRAMES == 0 {
            engine.observe(keypoints.len() as u32, Instant::now());
            if let Err(err) = engine.publish(&mut sinks) {
                log::warn!("publish failed, will retry next tick: {:#}", err);
            }
        }

        match annotate(&frame, &keypoints).and_then(|image| encode_jpeg(&image)) {
            Ok(jpeg) => feed.publish(jpeg),
            Err(err) => log::warn!("frame encode failed, skipping frame: {:#}", err),
        }

        frame_counter += 1;

        if last_health_log.elapsed() >= Duration::from_secs(5) {
            let stats = source.stats();
            log::info!(
                "source health={} frames={} current={:?}",
                source.is_healthy(),
                stats.frames_captured,
                engine.current()
            );
            last_health_log = Instant::now();
        }

        if !frame_interval.is_zero() {
            std::thread::sleep(frame_interval);
        }
    }

    log::info!("shutdown signal received, stopping api server...");
    api_handle.stop()?;
    Ok(())
}
