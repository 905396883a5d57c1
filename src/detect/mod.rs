mod adapter;
mod backend;
pub mod backends;
mod result;

use anyhow::{anyhow, Result};

use crate::config::DetectorSettings;

pub use adapter::{DetectorAdapter, DEFAULT_MAX_DETECTIONS, DEFAULT_REPORT_FLOOR};
pub use backend::DetectorBackend;
pub use backends::{BackendProbe, ScriptedBackend};
pub use result::{BoundingBox, Detection, DetectionSet};

/// Build the backend named in `settings`.
///
/// `frame_width`/`frame_height` size the scripted demo scene.
pub fn build_backend(
    settings: &DetectorSettings,
    frame_width: u32,
    frame_height: u32,
) -> Result<Box<dyn DetectorBackend>> {
    match settings.backend.as_str() {
        "stub" | "scripted" => Ok(Box::new(ScriptedBackend::demo(frame_width, frame_height))),
        "tract" => build_tract(settings),
        other => Err(anyhow!("unknown detector backend '{}'", other)),
    }
}

/// Build a contract-enforcing adapter for the backend named in `settings`.
pub fn build_adapter(
    settings: &DetectorSettings,
    frame_width: u32,
    frame_height: u32,
) -> Result<DetectorAdapter> {
    let backend = build_backend(settings, frame_width, frame_height)?;
    Ok(DetectorAdapter::new(backend)
        .with_report_floor(settings.report_floor)
        .with_max_detections(settings.max_detections))
}

#[cfg(feature = "backend-tract")]
fn build_tract(settings: &DetectorSettings) -> Result<Box<dyn DetectorBackend>> {
    let model = settings
        .model_path
        .as_ref()
        .ok_or_else(|| anyhow!("tract backend requires detector.model_path"))?;
    let labels = settings
        .labels_path
        .as_ref()
        .ok_or_else(|| anyhow!("tract backend requires detector.labels_path"))?;
    Ok(Box::new(backends::TractBackend::new(
        model,
        labels,
        settings.input_width,
        settings.input_height,
    )))
}

#[cfg(not(feature = "backend-tract"))]
fn build_tract(_settings: &DetectorSettings) -> Result<Box<dyn DetectorBackend>> {
    Err(anyhow!("tract backend requires the backend-tract feature"))
}
