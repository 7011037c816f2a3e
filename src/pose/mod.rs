#[cfg(feature = "desktop")]
pub mod detector;
pub mod keypoint;
pub mod reference;
pub mod region;

use anyhow::Result;

#[cfg(feature = "desktop")]
pub use detector::MoveNetEstimator;
pub use keypoint::{Keypoint, KeypointIndex, Pose};
pub use reference::{ReferencePoint, ReferencePointExtractor};
pub use region::{bbox_from_keypoints, region_from_bbox, remap_pose, BBox, RegionHint};

/// 姿勢推定サービスの1フレーム分の出力
#[derive(Debug, Clone, PartialEq)]
pub struct PoseEstimate {
    pub pose: Pose,
    /// 推定全体の信頼度 (0.0〜1.0)
    pub confidence: f32,
}

impl PoseEstimate {
    /// 全体信頼度をキーポイント平均で代用する
    pub fn from_pose(pose: Pose) -> Self {
        let confidence = pose.average_confidence();
        Self { pose, confidence }
    }
}

/// 外部の姿勢推定サービス
///
/// モデル自体はブラックボックス。パイプラインは呼び出しループと閾値判定だけを持つ。
pub trait PoseEstimator {
    type Frame;

    /// 初期化済みで推論可能か。false ならAIトラッキングは使えない
    fn is_ready(&self) -> bool {
        true
    }

    /// キーポイントはフレーム全体に対する正規化座標で返すこと
    fn estimate(&mut self, frame: &Self::Frame, region: Option<&RegionHint>) -> Result<PoseEstimate>;
}
