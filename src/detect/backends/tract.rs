#![cfg(feature = "backend-tract")]

use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use image::imageops::{self, FilterType};
use tract_onnx::prelude::*;

use crate::detect::backend::DetectorBackend;
use crate::detect::result::{BoundingBox, Detection};
use crate::frame::Frame;

type RunnableModel = TypedRunnableModel<TypedModel>;

/// Scores below this never leave the backend; the adapter applies the real floor.
const MODEL_MIN_SCORE: f32 = 0.2;

/// Tract-based backend for SSD-style ONNX object detectors.
///
/// Expected model signature:
/// - input 0: `f32[1, 3, H, W]`, RGB scaled to 0..1
/// - output 0: boxes `f32[1, N, 4]` as normalized `(ymin, xmin, ymax, xmax)`
/// - output 1: class indices `f32[1, N]`
/// - output 2: scores `f32[1, N]`
///
/// Class index `i` maps to line `i` of the labels file.
pub struct TractBackend {
    model_path: PathBuf,
    labels_path: PathBuf,
    input_width: u32,
    input_height: u32,
    model: Option<RunnableModel>,
    labels: Vec<String>,
}

impl TractBackend {
    /// Describe a model; nothing is read from disk until `load`.
    pub fn new<P: AsRef<Path>, L: AsRef<Path>>(
        model_path: P,
        labels_path: L,
        input_width: u32,
        input_height: u32,
    ) -> Self {
        Self {
            model_path: model_path.as_ref().to_path_buf(),
            labels_path: labels_path.as_ref().to_path_buf(),
            input_width,
            input_height,
            model: None,
            labels: Vec::new(),
        }
    }

    fn build_input(&self, frame: &Frame) -> Result<Tensor> {
        let image = frame.to_rgb_image()?;
        let resized = imageops::resize(
            &image,
            self.input_width,
            self.input_height,
            FilterType::Triangle,
        );
        let width = self.input_width as usize;
        let height = self.input_height as usize;
        let input = tract_ndarray::Array4::from_shape_fn((1, 3, height, width), |(_, c, y, x)| {
            resized.get_pixel(x as u32, y as u32)[c] as f32 / 255.0
        });
        Ok(input.into_tensor())
    }

    fn decode(&self, outputs: TVec<TValue>, frame: &Frame) -> Result<Vec<Detection>> {
        if outputs.len() < 3 {
            return Err(anyhow!(
                "model produced {} outputs, expected boxes/classes/scores",
                outputs.len()
            ));
        }
        let boxes = outputs[0]
            .to_array_view::<f32>()
            .context("box tensor was not f32")?;
        let classes = outputs[1]
            .to_array_view::<f32>()
            .context("class tensor was not f32")?;
        let scores = outputs[2]
            .to_array_view::<f32>()
            .context("score tensor was not f32")?;

        let boxes: Vec<f32> = boxes.iter().copied().collect();
        let classes: Vec<f32> = classes.iter().copied().collect();
        let scores: Vec<f32> = scores.iter().copied().collect();
        if boxes.len() != scores.len() * 4 || classes.len() != scores.len() {
            return Err(anyhow!(
                "inconsistent output shapes: {} box values, {} classes, {} scores",
                boxes.len(),
                classes.len(),
                scores.len()
            ));
        }

        let fw = frame.width as f32;
        let fh = frame.height as f32;
        let mut detections = Vec::new();
        for (i, &score) in scores.iter().enumerate() {
            if score < MODEL_MIN_SCORE {
                continue;
            }
            let class_idx = classes[i].max(0.0) as usize;
            let label = self
                .labels
                .get(class_idx)
                .cloned()
                .unwrap_or_else(|| format!("class {}", class_idx));
            let b = &boxes[i * 4..i * 4 + 4];
            let (ymin, xmin, ymax, xmax) = (
                b[0].clamp(0.0, 1.0),
                b[1].clamp(0.0, 1.0),
                b[2].clamp(0.0, 1.0),
                b[3].clamp(0.0, 1.0),
            );
            detections.push(Detection::new(
                label,
                score,
                BoundingBox::new(
                    xmin * fw,
                    ymin * fh,
                    (xmax - xmin).max(0.0) * fw,
                    (ymax - ymin).max(0.0) * fh,
                ),
            ));
        }
        Ok(detections)
    }
}

impl DetectorBackend for TractBackend {
    fn name(&self) -> &'static str {
        "tract"
    }

    fn load(&mut self) -> Result<()> {
        let labels = std::fs::read_to_string(&self.labels_path).with_context(|| {
            format!("failed to read labels from {}", self.labels_path.display())
        })?;
        self.labels = labels.lines().map(|l| l.trim().to_string()).collect();

        let model = tract_onnx::onnx()
            .model_for_path(&self.model_path)
            .with_context(|| {
                format!(
                    "failed to load ONNX model from {}",
                    self.model_path.display()
                )
            })?
            .with_input_fact(
                0,
                InferenceFact::dt_shape(
                    f32::datum_type(),
                    tvec!(1, 3, self.input_height as usize, self.input_width as usize),
                ),
            )
            .context("failed to set input fact")?
            .into_optimized()
            .context("failed to optimize ONNX model")?
            .into_runnable()
            .context("failed to build runnable ONNX model")?;
        self.model = Some(model);
        Ok(())
    }

    fn detect(&mut self, frame: &Frame) -> Result<Vec<Detection>> {
        let input = self.build_input(frame)?;
        let model = self
            .model
            .as_ref()
            .ok_or_else(|| anyhow!("model not loaded"))?;
        let outputs = model
            .run(tvec!(input.into()))
            .context("ONNX inference failed")?;
        self.decode(outputs, frame)
    }
}
