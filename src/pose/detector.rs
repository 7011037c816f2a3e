use anyhow::{Context, Result};
use ndarray::Array4;
use opencv::{
    core::{AlgorithmHint, Mat, Rect, Size, CV_32FC3},
    imgproc,
    prelude::*,
};
use ort::session::builder::GraphOptimizationLevel;
use ort::session::Session;
use ort::value::Tensor;
use std::path::Path;
use tracing::info;

use super::keypoint::{Keypoint, KeypointIndex, Pose};
use super::region::{remap_pose, RegionHint};
use super::{PoseEstimate, PoseEstimator};

/// MoveNet用の入力サイズ
const MOVENET_INPUT_SIZE: i32 = 192;

/// MoveNet (ONNX) による姿勢推定
pub struct MoveNetEstimator {
    session: Session,
}

impl MoveNetEstimator {
    pub fn new<P: AsRef<Path>>(model_path: P) -> Result<Self> {
        let session = Session::builder()?
            .with_optimization_level(GraphOptimizationLevel::Level3)?
            .commit_from_file(model_path.as_ref())
            .context("Failed to load ONNX model")?;
        info!("MoveNet model loaded: {}", model_path.as_ref().display());
        Ok(Self { session })
    }

    /// 前処理済みテンソルから姿勢を検出
    ///
    /// 入力: [1, 192, 192, 3] の f32 テンソル
    fn detect(&mut self, input: Array4<f32>) -> Result<Pose> {
        let input_tensor = Tensor::from_array(input)?;
        let outputs = self
            .session
            .run(ort::inputs!["serving_default_input_0" => input_tensor])
            .context("Inference failed")?;

        // 出力は [1, 1, 17, 3] (y, x, confidence)
        let output: ndarray::ArrayViewD<f32> = outputs["StatefulPartitionedCall_0"]
            .try_extract_array()
            .context("Failed to extract output tensor")?;

        let mut keypoints = [Keypoint::default(); KeypointIndex::COUNT];
        for (i, kp) in keypoints.iter_mut().enumerate() {
            *kp = Keypoint::new(output[[0, 0, i, 1]], output[[0, 0, i, 0]], output[[0, 0, i, 2]]);
        }
        Ok(Pose::new(keypoints))
    }
}

impl PoseEstimator for MoveNetEstimator {
    type Frame = Mat;

    fn estimate(&mut self, frame: &Mat, region: Option<&RegionHint>) -> Result<PoseEstimate> {
        let pose = match region.filter(|r| !r.is_full()) {
            Some(region) => {
                let cropped = crop_region(frame, region)?;
                let pose = self.detect(preprocess_for_movenet(&cropped)?)?;
                remap_pose(&pose, region)
            }
            None => self.detect(preprocess_for_movenet(frame)?)?,
        };
        Ok(PoseEstimate::from_pose(pose))
    }
}

fn crop_region(frame: &Mat, region: &RegionHint) -> Result<Mat> {
    if frame.cols() < 1 || frame.rows() < 1 {
        anyhow::bail!("empty frame");
    }
    let (x, y, w, h) = region.pixel_rect(frame.cols(), frame.rows());
    let roi = Mat::roi(frame, Rect::new(x, y, w, h))?;
    Ok(roi.try_clone()?)
}

/// BGR -> RGB, 192x192 にリサイズ, [1, 192, 192, 3] の f32 テンソル (0.0-255.0)
fn preprocess_for_movenet(frame: &Mat) -> Result<Array4<f32>> {
    let mut rgb = Mat::default();
    imgproc::cvt_color(frame, &mut rgb, imgproc::COLOR_BGR2RGB, 0, AlgorithmHint::ALGO_HINT_DEFAULT)?;

    let mut resized = Mat::default();
    imgproc::resize(
        &rgb,
        &mut resized,
        Size::new(MOVENET_INPUT_SIZE, MOVENET_INPUT_SIZE),
        0.0,
        0.0,
        imgproc::INTER_LINEAR,
    )?;

    let mut float_mat = Mat::default();
    resized.convert_to(&mut float_mat, CV_32FC3, 1.0, 0.0)?;

    let size = MOVENET_INPUT_SIZE as usize;
    let mut tensor = Array4::<f32>::zeros((1, size, size, 3));
    for y in 0..MOVENET_INPUT_SIZE {
        for x in 0..MOVENET_INPUT_SIZE {
            let pixel = float_mat.at_2d::<opencv::core::Vec3f>(y, x)?;
            for c in 0..3 {
                tensor[[0, y as usize, x as usize, c]] = pixel[c];
            }
        }
    }
    Ok(tensor)
}
