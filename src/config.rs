use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::capture::CaptureConstraints;
use crate::detect::{DEFAULT_MAX_DETECTIONS, DEFAULT_REPORT_FLOOR};
use crate::overlay::{OverlayStyle, DEFAULT_GUIDE_MARGIN};
use crate::policy::DEFAULT_CAPTURE_THRESHOLD;
use crate::scanner::ScannerSettings;

const DEFAULT_CAMERA_URL: &str = "stub://front_camera";
const DEFAULT_CAMERA_WIDTH: u32 = 640;
const DEFAULT_CAMERA_HEIGHT: u32 = 480;
const DEFAULT_CAMERA_FPS: u32 = 30;
const DEFAULT_BACKEND: &str = "stub";
const DEFAULT_MODEL_INPUT: u32 = 300;
const DEFAULT_FONT_PX: f32 = 16.0;
const DEFAULT_LINE_WIDTH: f32 = 2.0;
const DEFAULT_SLOW_CYCLE_MS: u64 = 250;
const MAX_FONT_PX: f32 = 256.0;
const MAX_LINE_WIDTH: f32 = 64.0;

#[derive(Debug, Deserialize, Default)]
struct ScannerConfigFile {
    camera: Option<CameraConfigFile>,
    detector: Option<DetectorConfigFile>,
    capture: Option<CaptureConfigFile>,
    overlay: Option<OverlayConfigFile>,
    slow_cycle_warn_ms: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
struct CameraConfigFile {
    url: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    target_fps: Option<u32>,
}

#[derive(Debug, Deserialize, Default)]
struct DetectorConfigFile {
    backend: Option<String>,
    model_path: Option<PathBuf>,
    labels_path: Option<PathBuf>,
    input_width: Option<u32>,
    input_height: Option<u32>,
    report_floor: Option<f32>,
    max_detections: Option<usize>,
}

#[derive(Debug, Deserialize, Default)]
struct CaptureConfigFile {
    threshold: Option<f32>,
}

#[derive(Debug, Deserialize, Default)]
struct OverlayConfigFile {
    guide_margin: Option<f32>,
    font_px: Option<f32>,
    line_width: Option<f32>,
}

#[derive(Debug, Clone)]
pub struct ScannerConfig {
    pub camera: CameraSettings,
    pub detector: DetectorSettings,
    pub capture_threshold: f32,
    pub overlay: OverlayStyle,
    pub slow_cycle_warn: Duration,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CameraSettings {
    /// `stub://name` or a device path such as `/dev/video0`.
    pub url: String,
    pub width: u32,
    pub height: u32,
    pub target_fps: u32,
}

impl Default for CameraSettings {
    fn default() -> Self {
        Self {
            url: DEFAULT_CAMERA_URL.to_string(),
            width: DEFAULT_CAMERA_WIDTH,
            height: DEFAULT_CAMERA_HEIGHT,
            target_fps: DEFAULT_CAMERA_FPS,
        }
    }
}

impl CameraSettings {
    pub fn constraints(&self) -> CaptureConstraints {
        CaptureConstraints {
            width: self.width,
            height: self.height,
            target_fps: self.target_fps,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DetectorSettings {
    /// `stub` or `tract`.
    pub backend: String,
    pub model_path: Option<PathBuf>,
    pub labels_path: Option<PathBuf>,
    pub input_width: u32,
    pub input_height: u32,
    pub report_floor: f32,
    pub max_detections: usize,
}

impl Default for DetectorSettings {
    fn default() -> Self {
        Self {
            backend: DEFAULT_BACKEND.to_string(),
            model_path: None,
            labels_path: None,
            input_width: DEFAULT_MODEL_INPUT,
            input_height: DEFAULT_MODEL_INPUT,
            report_floor: DEFAULT_REPORT_FLOOR,
            max_detections: DEFAULT_MAX_DETECTIONS,
        }
    }
}

impl Default for ScannerConfig {
    fn default() -> Self {
        // Infallible: an empty file only yields defaults.
        Self::from_file(ScannerConfigFile::default())
    }
}

impl ScannerConfig {
    /// Load from `SCANNER_CONFIG` (if set), apply env overrides, validate.
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("SCANNER_CONFIG").ok();
        let file_cfg = match config_path.as_deref() {
            Some(path) if !path.trim().is_empty() => read_config_file(Path::new(path))?,
            _ => ScannerConfigFile::default(),
        };
        let mut cfg = Self::from_file(file_cfg);
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Load a specific file, then apply env overrides and validate.
    pub fn load_from(path: &Path) -> Result<Self> {
        let mut cfg = Self::from_file(read_config_file(path)?);
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: ScannerConfigFile) -> Self {
        let camera = file.camera.unwrap_or_default();
        let detector = file.detector.unwrap_or_default();
        let overlay = file.overlay.unwrap_or_default();
        let style = OverlayStyle {
            guide_margin: overlay.guide_margin.unwrap_or(DEFAULT_GUIDE_MARGIN),
            font_px: overlay.font_px.unwrap_or(DEFAULT_FONT_PX),
            line_width: overlay.line_width.unwrap_or(DEFAULT_LINE_WIDTH),
            ..OverlayStyle::default()
        };
        Self {
            camera: CameraSettings {
                url: camera
                    .url
                    .unwrap_or_else(|| DEFAULT_CAMERA_URL.to_string()),
                width: camera.width.unwrap_or(DEFAULT_CAMERA_WIDTH),
                height: camera.height.unwrap_or(DEFAULT_CAMERA_HEIGHT),
                target_fps: camera.target_fps.unwrap_or(DEFAULT_CAMERA_FPS),
            },
            detector: DetectorSettings {
                backend: detector
                    .backend
                    .unwrap_or_else(|| DEFAULT_BACKEND.to_string()),
                model_path: detector.model_path,
                labels_path: detector.labels_path,
                input_width: detector.input_width.unwrap_or(DEFAULT_MODEL_INPUT),
                input_height: detector.input_height.unwrap_or(DEFAULT_MODEL_INPUT),
                report_floor: detector.report_floor.unwrap_or(DEFAULT_REPORT_FLOOR),
                max_detections: detector.max_detections.unwrap_or(DEFAULT_MAX_DETECTIONS),
            },
            capture_threshold: file
                .capture
                .and_then(|capture| capture.threshold)
                .unwrap_or(DEFAULT_CAPTURE_THRESHOLD),
            overlay: style,
            slow_cycle_warn: Duration::from_millis(
                file.slow_cycle_warn_ms.unwrap_or(DEFAULT_SLOW_CYCLE_MS),
            ),
        }
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Some(url) = non_empty_env("SCANNER_CAMERA_URL") {
            self.camera.url = url;
        }
        if let Some(fps) = non_empty_env("SCANNER_FPS") {
            self.camera.target_fps = fps
                .parse()
                .map_err(|_| anyhow!("SCANNER_FPS must be a positive integer"))?;
        }
        if let Some(threshold) = non_empty_env("SCANNER_CAPTURE_THRESHOLD") {
            self.capture_threshold = threshold
                .parse()
                .map_err(|_| anyhow!("SCANNER_CAPTURE_THRESHOLD must be a number in 0..=1"))?;
        }
        if let Some(backend) = non_empty_env("SCANNER_DETECTOR_BACKEND") {
            self.detector.backend = backend;
        }
        if let Some(path) = non_empty_env("SCANNER_MODEL_PATH") {
            self.detector.model_path = Some(PathBuf::from(path));
        }
        if let Some(path) = non_empty_env("SCANNER_LABELS_PATH") {
            self.detector.labels_path = Some(PathBuf::from(path));
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.capture_threshold) {
            return Err(anyhow!(
                "capture threshold {} must be within 0..=1",
                self.capture_threshold
            ));
        }
        if !(0.0..=1.0).contains(&self.detector.report_floor) {
            return Err(anyhow!(
                "detector report floor {} must be within 0..=1",
                self.detector.report_floor
            ));
        }
        if self.detector.report_floor > self.capture_threshold {
            return Err(anyhow!(
                "detector report floor {} exceeds capture threshold {}",
                self.detector.report_floor,
                self.capture_threshold
            ));
        }
        if self.detector.max_detections == 0 {
            return Err(anyhow!("detector max_detections must be greater than zero"));
        }
        if self.camera.target_fps == 0 {
            return Err(anyhow!("camera target_fps must be greater than zero"));
        }
        if self.camera.width == 0 || self.camera.height == 0 {
            return Err(anyhow!(
                "camera resolution {}x{} is invalid",
                self.camera.width,
                self.camera.height
            ));
        }
        if !(0.0..0.5).contains(&self.overlay.guide_margin) {
            return Err(anyhow!(
                "overlay guide_margin {} must be within [0, 0.5)",
                self.overlay.guide_margin
            ));
        }
        let font_px = self.overlay.font_px;
        if !(font_px > 0.0 && font_px <= MAX_FONT_PX) {
            return Err(anyhow!(
                "overlay font_px {} must be within (0, {}]",
                font_px,
                MAX_FONT_PX
            ));
        }
        let line_width = self.overlay.line_width;
        if !(line_width > 0.0 && line_width <= MAX_LINE_WIDTH) {
            return Err(anyhow!(
                "overlay line_width {} must be within (0, {}]",
                line_width,
                MAX_LINE_WIDTH
            ));
        }
        if self.detector.backend == "tract"
            && (self.detector.model_path.is_none() || self.detector.labels_path.is_none())
        {
            return Err(anyhow!(
                "tract backend requires detector.model_path and detector.labels_path"
            ));
        }
        Ok(())
    }

    /// Settings for `Scanner::new`.
    pub fn scanner_settings(&self) -> ScannerSettings {
        ScannerSettings {
            constraints: self.camera.constraints(),
            capture_threshold: self.capture_threshold,
            overlay: self.overlay,
            slow_cycle_warn: self.slow_cycle_warn,
        }
    }
}

fn read_config_file(path: &Path) -> Result<ScannerConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let is_toml = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("toml"));
    let cfg = if is_toml {
        toml::from_str(&raw).map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    } else {
        serde_json::from_str(&raw)
            .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    };
    Ok(cfg)
}

fn non_empty_env(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .filter(|value| !value.trim().is_empty())
}
