use tracing::{debug, info, warn};

use crate::config::TrackingConfig;
use crate::error::{PipelineError, Result};
use crate::pose::{
    bbox_from_keypoints, region_from_bbox, PoseEstimator, ReferencePointExtractor, RegionHint,
};
use crate::timebase::Timebase;
use crate::video::FrameSource;

use super::cancel::CancellationToken;
use super::TrackedFrame;

/// 有効ウィンドウの全フレームに姿勢推定をかけてトラックを作る
pub struct TrackingRunner {
    config: TrackingConfig,
    extractor: ReferencePointExtractor,
    /// アスリート選択モードで指定された初期領域
    initial_hint: Option<RegionHint>,
}

impl TrackingRunner {
    pub fn new(config: &TrackingConfig) -> Self {
        Self {
            config: config.clone(),
            extractor: ReferencePointExtractor::default(),
            initial_hint: None,
        }
    }

    pub fn with_region_hint(mut self, hint: RegionHint) -> Self {
        self.initial_hint = Some(hint);
        self
    }

    pub fn with_extractor(mut self, extractor: ReferencePointExtractor) -> Self {
        self.extractor = extractor;
        self
    }

    /// フレーム順に推定し、各フレーム後に進捗 (0–100) を通知してキャンセルを確認する。
    ///
    /// キャンセル時は `PipelineError::Cancelled` を返し、途中までのフレームは破棄する。
    pub fn run<S, E>(
        &self,
        source: &mut S,
        estimator: &mut E,
        timebase: &Timebase,
        on_progress: &mut dyn FnMut(f32),
        cancel: &CancellationToken,
    ) -> Result<Vec<TrackedFrame>>
    where
        S: FrameSource,
        E: PoseEstimator<Frame = S::Frame>,
    {
        if !estimator.is_ready() {
            return Err(PipelineError::TrackingUnavailable(
                "pose estimator is not initialized".into(),
            ));
        }
        let total = timebase.total_frames();
        if total == 0 {
            return Err(PipelineError::invalid("analysis window contains no frames"));
        }

        let (frame_w, frame_h) = source.frame_size();
        let threshold = self.config.confidence_threshold;
        let mut hint = self.initial_hint;
        let mut frames = Vec::with_capacity(total);
        info!("tracking {} frames (threshold {:.2})", total, threshold);

        for index in 0..total {
            let media_time = timebase.frame_to_media_time(index);
            let time_sec = timebase.frame_to_time(index);

            let estimate = source
                .read_frame(media_time)
                .and_then(|image| estimator.estimate(&image, hint.as_ref()));

            let tracked = match estimate {
                Ok(estimate) => {
                    if self.config.follow_subject {
                        if let Some(bbox) = bbox_from_keypoints(
                            &estimate.pose,
                            frame_w,
                            frame_h,
                            self.config.hint_confidence,
                        ) {
                            hint = Some(region_from_bbox(&bbox, frame_w, frame_h));
                        }
                    }
                    let point = self
                        .extractor
                        .extract(&estimate.pose, frame_w, frame_h)
                        .map(|rp| rp.point);
                    TrackedFrame {
                        frame: index,
                        time_sec,
                        point,
                        confidence: estimate.confidence,
                        is_missing: point.is_none() || estimate.confidence < threshold,
                        is_manually_adjusted: false,
                    }
                }
                Err(e) => {
                    warn!("frame {}: pose estimation failed: {:#}", index, e);
                    TrackedFrame {
                        frame: index,
                        time_sec,
                        point: None,
                        confidence: 0.0,
                        is_missing: true,
                        is_manually_adjusted: false,
                    }
                }
            };
            frames.push(tracked);

            on_progress((index + 1) as f32 / total as f32 * 100.0);
            // 最終フレームまで終わっていればトラックは完成している
            if index + 1 < total && cancel.is_cancelled() {
                info!("tracking cancelled after {}/{} frames", index + 1, total);
                return Err(PipelineError::Cancelled);
            }
        }

        let missing = frames.iter().filter(|f| f.is_missing).count();
        debug!("tracking finished: {} frames, {} missing", frames.len(), missing);
        Ok(frames)
    }
}
