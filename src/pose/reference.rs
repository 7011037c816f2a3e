use crate::geometry::Point2D;

use super::keypoint::{KeypointIndex, Pose};

/// トラッキングする基準点（ピクセル座標）とその信頼度
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReferencePoint {
    pub point: Point2D,
    pub confidence: f32,
}

/// Poseから重心の代わりとなる基準点を取り出す
///
/// 左右ヒップの中点を優先し、片側しか見えなければそのヒップ、
/// ヒップが見えなければ左右肩の中点を使う。
#[derive(Debug, Clone)]
pub struct ReferencePointExtractor {
    /// 関節を「見えている」とみなす最小信頼度
    visibility_threshold: f32,
}

impl ReferencePointExtractor {
    pub fn new(visibility_threshold: f32) -> Self {
        Self {
            visibility_threshold,
        }
    }

    pub fn extract(&self, pose: &Pose, frame_w: u32, frame_h: u32) -> Option<ReferencePoint> {
        self.pair(pose, KeypointIndex::LeftHip, KeypointIndex::RightHip, frame_w, frame_h)
            .or_else(|| {
                self.pair(
                    pose,
                    KeypointIndex::LeftShoulder,
                    KeypointIndex::RightShoulder,
                    frame_w,
                    frame_h,
                )
            })
            .or_else(|| self.best_of(pose, &[KeypointIndex::LeftHip, KeypointIndex::RightHip], frame_w, frame_h))
    }

    /// 左右両方が見えていれば中点、片方だけならそちら
    fn pair(
        &self,
        pose: &Pose,
        left: KeypointIndex,
        right: KeypointIndex,
        frame_w: u32,
        frame_h: u32,
    ) -> Option<ReferencePoint> {
        let l = pose.get(left);
        let r = pose.get(right);
        match (l.is_valid(self.visibility_threshold), r.is_valid(self.visibility_threshold)) {
            (true, true) => Some(ReferencePoint {
                point: Point2D::midpoint(&l.to_pixel(frame_w, frame_h), &r.to_pixel(frame_w, frame_h)),
                confidence: (l.confidence + r.confidence) / 2.0,
            }),
            (true, false) => Some(ReferencePoint {
                point: l.to_pixel(frame_w, frame_h),
                confidence: l.confidence,
            }),
            (false, true) => Some(ReferencePoint {
                point: r.to_pixel(frame_w, frame_h),
                confidence: r.confidence,
            }),
            (false, false) => None,
        }
    }

    /// どれも閾値未満のとき、最も信頼度の高い候補を低信頼度のまま返す
    fn best_of(
        &self,
        pose: &Pose,
        candidates: &[KeypointIndex],
        frame_w: u32,
        frame_h: u32,
    ) -> Option<ReferencePoint> {
        candidates
            .iter()
            .map(|&idx| pose.get(idx))
            .filter(|kp| kp.confidence > 0.0)
            .max_by(|a, b| a.confidence.total_cmp(&b.confidence))
            .map(|kp| ReferencePoint {
                point: kp.to_pixel(frame_w, frame_h),
                confidence: kp.confidence,
            })
    }
}

impl Default for ReferencePointExtractor {
    fn default() -> Self {
        Self::new(0.1)
    }
}
