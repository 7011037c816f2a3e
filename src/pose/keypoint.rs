use serde::{Deserialize, Serialize};

use crate::geometry::Point2D;

/// MoveNet の 17 キーポイント（姿勢推定サービスの関節ID）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(usize)]
pub enum KeypointIndex {
    Nose = 0,
    LeftEye = 1,
    RightEye = 2,
    LeftEar = 3,
    RightEar = 4,
    LeftShoulder = 5,
    RightShoulder = 6,
    LeftElbow = 7,
    RightElbow = 8,
    LeftWrist = 9,
    RightWrist = 10,
    LeftHip = 11,
    RightHip = 12,
    LeftKnee = 13,
    RightKnee = 14,
    LeftAnkle = 15,
    RightAnkle = 16,
}

impl KeypointIndex {
    pub const COUNT: usize = 17;
}

/// 単一キーポイント
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Keypoint {
    /// 正規化されたX座標 (0.0〜1.0)
    pub x: f32,
    /// 正規化されたY座標 (0.0〜1.0)
    pub y: f32,
    /// 信頼度スコア (0.0〜1.0)
    #[serde(alias = "score")]
    pub confidence: f32,
}

impl Keypoint {
    pub fn new(x: f32, y: f32, confidence: f32) -> Self {
        Self { x, y, confidence }
    }

    pub fn is_valid(&self, threshold: f32) -> bool {
        self.confidence >= threshold
    }

    /// フレームサイズを掛けてピクセル座標にする
    pub fn to_pixel(&self, width: u32, height: u32) -> Point2D {
        Point2D::new(self.x as f64 * width as f64, self.y as f64 * height as f64)
    }
}

/// 17キーポイントからなる姿勢
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Pose {
    pub keypoints: [Keypoint; KeypointIndex::COUNT],
}

impl Pose {
    pub fn new(keypoints: [Keypoint; KeypointIndex::COUNT]) -> Self {
        Self { keypoints }
    }

    pub fn get(&self, index: KeypointIndex) -> &Keypoint {
        &self.keypoints[index as usize]
    }

    /// 全キーポイントの平均信頼度
    pub fn average_confidence(&self) -> f32 {
        let sum: f32 = self.keypoints.iter().map(|k| k.confidence).sum();
        sum / KeypointIndex::COUNT as f32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_to_pixel() {
        let kp = Keypoint::new(0.5, 0.25, 1.0);
        assert_eq!(kp.to_pixel(1920, 1080), Point2D::new(960.0, 270.0));
    }

    #[test]
    fn test_keypoint_accepts_score_alias() {
        let kp: Keypoint = serde_json::from_str(r#"{"x":0.1,"y":0.2,"score":0.7}"#).unwrap();
        assert_eq!(kp.confidence, 0.7);
    }

    #[test]
    fn test_pose_average_confidence() {
        let pose = Pose::new([Keypoint::new(0.0, 0.0, 0.5); KeypointIndex::COUNT]);
        assert!((pose.average_confidence() - 0.5).abs() < 0.001);
    }
}
