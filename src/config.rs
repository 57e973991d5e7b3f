use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::detect::DetectorParams;
use crate::ingest::SourceConfig;

const DEFAULT_API_ADDR: &str = "127.0.0.1:8650";
const DEFAULT_SOURCE_URL: &str = "stub://dice";
const DEFAULT_TARGET_FPS: u32 = 30;
const DEFAULT_WIDTH: u32 = 640;
const DEFAULT_HEIGHT: u32 = 480;
const DEFAULT_MIRROR_PATH: &str = "current_number.txt";

#[derive(Debug, Deserialize, Default)]
struct DicecamConfigFile {
    api: Option<ApiConfigFile>,
    source: Option<SourceConfigFile>,
    detector: Option<DetectorConfigFile>,
    mirror: Option<MirrorConfigFile>,
}

#[derive(Debug, Deserialize, Default)]
struct ApiConfigFile {
    addr: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct SourceConfigFile {
    url: Option<String>,
    target_fps: Option<u32>,
    width: Option<u32>,
    height: Option<u32>,
}

#[derive(Debug, Deserialize, Default)]
struct DetectorConfigFile {
    min_threshold: Option<u8>,
    max_threshold: Option<u8>,
    threshold_step: Option<u8>,
    min_repeatability: Option<usize>,
    min_dist_between_blobs: Option<f32>,
    min_area: Option<f32>,
    min_circularity: Option<f32>,
    min_inertia_ratio: Option<f32>,
}

#[derive(Debug, Deserialize, Default)]
struct MirrorConfigFile {
    path: Option<PathBuf>,
}

/// Resolved daemon configuration: JSON file (`DICECAM_CONFIG`), then env
/// overrides, then validation.
#[derive(Clone, Debug)]
pub struct DicecamConfig {
    pub api_addr: String,
    pub source: SourceConfig,
    pub detector: DetectorParams,
    pub mirror_path: PathBuf,
}

impl DicecamConfig {
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("DICECAM_CONFIG").ok();
        let file_cfg = match config_path.as_deref() {
            Some(path) => Some(read_config_file(Path::new(path))?),
            None => None,
        };
        let mut cfg = Self::from_file(file_cfg.unwrap_or_default());
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: DicecamConfigFile) -> Self {
        let api_addr = file
            .api
            .and_then(|api| api.addr)
            .unwrap_or_else(|| DEFAULT_API_ADDR.to_string());

        let source = SourceConfig {
            url: file
                .source
                .as_ref()
                .and_then(|source| source.url.clone())
                .unwrap_or_else(|| DEFAULT_SOURCE_URL.to_string()),
            target_fps: file
                .source
                .as_ref()
                .and_then(|source| source.target_fps)
                .unwrap_or(DEFAULT_TARGET_FPS),
            width: file
                .source
                .as_ref()
                .and_then(|source| source.width)
                .unwrap_or(DEFAULT_WIDTH),
            height: file
                .source
                .as_ref()
                .and_then(|source| source.height)
                .unwrap_or(DEFAULT_HEIGHT),
        };

        let defaults = DetectorParams::default();
        let file_detector = file.detector.unwrap_or_default();
        let detector = DetectorParams {
            min_threshold: file_detector.min_threshold.unwrap_or(defaults.min_threshold),
            max_threshold: file_detector.max_threshold.unwrap_or(defaults.max_threshold),
            threshold_step: file_detector
                .threshold_step
                .unwrap_or(defaults.threshold_step),
            min_repeatability: file_detector
                .min_repeatability
                .unwrap_or(defaults.min_repeatability),
            min_dist_between_blobs: file_detector
                .min_dist_between_blobs
                .unwrap_or(defaults.min_dist_between_blobs),
            min_area: file_detector.min_area.unwrap_or(defaults.min_area),
            min_circularity: file_detector
                .min_circularity
                .unwrap_or(defaults.min_circularity),
            min_inertia_ratio: file_detector
                .min_inertia_ratio
                .unwrap_or(defaults.min_inertia_ratio),
        };

        let mirror_path = file
            .mirror
            .and_then(|mirror| mirror.path)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_MIRROR_PATH));

        Self {
            api_addr,
            source,
            detector,
            mirror_path,
        }
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Ok(addr) = std::env::var("DICECAM_API_ADDR") {
            if !addr.trim().is_empty() {
                self.api_addr = addr;
            }
        }
        if let Ok(url) = std::env::var("DICECAM_SOURCE_URL") {
            if !url.trim().is_empty() {
                self.source.url = url;
            }
        }
        if let Ok(path) = std::env::var("DICECAM_NUMBER_FILE") {
            if !path.trim().is_empty() {
                self.mirror_path = PathBuf::from(path);
            }
        }
        if let Ok(fps) = std::env::var("DICECAM_TARGET_FPS") {
            let fps: u32 = fps
                .parse()
                .map_err(|_| anyhow!("DICECAM_TARGET_FPS must be an integer frame rate"))?;
            self.source.target_fps = fps;
        }
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        if self.source.width == 0 || self.source.height == 0 {
            return Err(anyhow!("source dimensions must be greater than zero"));
        }
        let det = &self.detector;
        if det.min_threshold >= det.max_threshold {
            return Err(anyhow!(
                "detector min_threshold ({}) must be below max_threshold ({})",
                det.min_threshold,
                det.max_threshold
            ));
        }
        if det.threshold_step == 0 {
            return Err(anyhow!("detector threshold_step must be at least 1"));
        }
        if det.min_repeatability == 0 {
            return Err(anyhow!("detector min_repeatability must be at least 1"));
        }
        if det.min_area <= 0.0 {
            return Err(anyhow!("detector min_area must be positive"));
        }
        if !(0.0..=1.0).contains(&det.min_circularity) {
            return Err(anyhow!("detector min_circularity must be within 0..=1"));
        }
        if !(0.0..=1.0).contains(&det.min_inertia_ratio) {
            return Err(anyhow!("detector min_inertia_ratio must be within 0..=1"));
        }
        Ok(())
    }
}

fn read_config_file(path: &Path) -> Result<DicecamConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let cfg = serde_json::from_str(&raw)
        .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?;
    Ok(cfg)
}
