#![cfg(feature = "backend-tract")]

use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use tract_onnx::prelude::*;

use crate::detect::labels::label_for;
use crate::detect::{Detection, Detector};
use crate::frame::Frame;
use crate::NavError;

type Plan = TypedRunnableModel<TypedModel>;

/// Tract-based ONNX object detector.
///
/// Expects a single-shot detector with NHWC float input in `[0, 1]` and two
/// outputs: per-anchor class scores `[1, N, C]` and boxes `[1, N, 4]` laid out
/// as `(ymin, xmin, ymax, xmax)`. The model is loaded on the first `load` or
/// `detect` call.
pub struct TractBackend {
    model_path: PathBuf,
    model: Option<Plan>,
    width: u32,
    height: u32,
    confidence_threshold: f32,
}

impl TractBackend {
    pub fn new<P: AsRef<Path>>(model_path: P, width: u32, height: u32) -> Self {
        Self {
            model_path: model_path.as_ref().to_path_buf(),
            model: None,
            width,
            height,
            confidence_threshold: 0.5,
        }
    }

    /// Override the default confidence threshold.
    pub fn with_threshold(mut self, threshold: f32) -> Self {
        self.confidence_threshold = threshold;
        self
    }

    fn build_plan(&self) -> Result<Plan> {
        tract_onnx::onnx()
            .model_for_path(&self.model_path)
            .context("failed to read ONNX model")?
            .with_input_fact(
                0,
                InferenceFact::dt_shape(
                    f32::datum_type(),
                    tvec!(1, self.height as usize, self.width as usize, 3),
                ),
            )
            .context("failed to set input fact")?
            .into_optimized()
            .context("failed to optimize ONNX model")?
            .into_runnable()
            .context("failed to build runnable ONNX model")
    }

    /// Nearest-neighbour resize into an NHWC tensor scaled to `[0, 1]`.
    fn build_input(&self, frame: &Frame) -> Result<Tensor> {
        if frame.width == 0 || frame.height == 0 {
            return Err(anyhow!("cannot run detection on an empty frame"));
        }
        let (in_w, in_h) = (self.width as usize, self.height as usize);
        let (src_w, src_h) = (frame.width as usize, frame.height as usize);
        let input = tract_ndarray::Array4::from_shape_fn((1, in_h, in_w, 3), |(_, y, x, c)| {
            let sx = (x * src_w / in_w).min(src_w - 1) as u32;
            let sy = (y * src_h / in_h).min(src_h - 1) as u32;
            frame.pixel(sx, sy)[c] as f32 / 255.0
        });
        Ok(input.into_tensor())
    }

    fn decode(&self, outputs: TVec<TValue>) -> Result<Vec<Detection>> {
        if outputs.len() < 2 {
            return Err(anyhow!(
                "expected score and box outputs, model produced {}",
                outputs.len()
            ));
        }
        let scores = outputs[0]
            .to_array_view::<f32>()
            .context("score tensor was not f32")?
            .into_dimensionality::<tract_ndarray::Ix3>()
            .context("score tensor must be [1, N, C]")?;
        let boxes = outputs[1]
            .to_array_view::<f32>()
            .context("box tensor was not f32")?
            .into_dimensionality::<tract_ndarray::Ix3>()
            .context("box tensor must be [1, N, 4]")?;

        let (_, anchors, classes) = scores.dim();
        if boxes.dim().1 != anchors || boxes.dim().2 < 4 {
            return Err(anyhow!(
                "box tensor {:?} does not match score tensor {:?}",
                boxes.dim(),
                scores.dim()
            ));
        }

        let mut detections = Vec::new();
        for i in 0..anchors {
            let (class_id, score) = (0..classes)
                .map(|c| (c, scores[[0, i, c]]))
                .fold((0, f32::NEG_INFINITY), |best, cur| {
                    if cur.1 > best.1 {
                        cur
                    } else {
                        best
                    }
                });
            if score < self.confidence_threshold {
                continue;
            }
            let (ymin, xmin, ymax, xmax) = (
                boxes[[0, i, 0]],
                boxes[[0, i, 1]],
                boxes[[0, i, 2]],
                boxes[[0, i, 3]],
            );
            detections.push(Detection::new(
                [xmin, ymin, xmax, ymax],
                score,
                label_for(class_id),
            ));
        }
        Ok(detections)
    }
}

impl Detector for TractBackend {
    fn name(&self) -> &'static str {
        "tract"
    }

    fn load(&mut self) -> Result<()> {
        if self.model.is_some() {
            return Ok(());
        }
        let plan = self.build_plan().map_err(|err| NavError::ModelLoadFailure {
            model: self.model_path.display().to_string(),
            reason: format!("{:#}", err),
        })?;
        log::info!(
            "TractBackend: loaded {} ({}x{} input)",
            self.model_path.display(),
            self.width,
            self.height
        );
        self.model = Some(plan);
        Ok(())
    }

    fn detect(&mut self, frame: &Frame) -> Result<Vec<Detection>> {
        self.load()?;
        let input = self.build_input(frame)?;
        let model = self
            .model
            .as_ref()
            .ok_or_else(|| anyhow!("model not loaded"))?;
        let outputs = model
            .run(tvec!(input.into()))
            .context("ONNX inference failed")?;
        self.decode(outputs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_model_is_model_load_failure() {
        let mut backend = TractBackend::new("/nonexistent/detector.onnx", 64, 64);
        let err = backend.load().err().expect("load must fail");
        assert!(matches!(
            err.downcast_ref::<NavError>(),
            Some(NavError::ModelLoadFailure { .. })
        ));
    }
}
