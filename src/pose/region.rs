use serde::{Deserialize, Serialize};

use super::keypoint::{Keypoint, KeypointIndex, Pose};

/// 姿勢推定サービスに渡す領域ヒント（正規化座標 0.0〜1.0）
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RegionHint {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl RegionHint {
    pub fn is_full(&self) -> bool {
        self.width >= 1.0 && self.height >= 1.0
    }

    pub fn contains(&self, x: f32, y: f32) -> bool {
        x >= self.x && x <= self.x + self.width && y >= self.y && y <= self.y + self.height
    }

    /// フレーム内に収まるピクセル矩形 (x, y, w, h)。幅・高さは最低1px
    pub fn pixel_rect(&self, frame_w: i32, frame_h: i32) -> (i32, i32, i32, i32) {
        let fw = frame_w.max(1);
        let fh = frame_h.max(1);
        let x = ((self.x * fw as f32) as i32).clamp(0, fw - 1);
        let y = ((self.y * fh as f32) as i32).clamp(0, fh - 1);
        let w = ((self.width * fw as f32) as i32).max(1).min(fw - x);
        let h = ((self.height * fh as f32) as i32).max(1).min(fh - y);
        (x, y, w, h)
    }
}

/// BBox（ピクセル座標）
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

/// 前フレームのPoseからBBoxを推定
///
/// 有効なキーポイントが2個未満ならNone。
pub fn bbox_from_keypoints(
    pose: &Pose,
    frame_w: u32,
    frame_h: u32,
    confidence_threshold: f32,
) -> Option<BBox> {
    let valid: Vec<&Keypoint> = pose
        .keypoints
        .iter()
        .filter(|kp| kp.is_valid(confidence_threshold))
        .collect();
    if valid.len() < 2 {
        return None;
    }

    let (mut min_x, mut min_y) = (f32::MAX, f32::MAX);
    let (mut max_x, mut max_y) = (f32::MIN, f32::MIN);
    for kp in valid {
        let px = kp.x * frame_w as f32;
        let py = kp.y * frame_h as f32;
        min_x = min_x.min(px);
        min_y = min_y.min(py);
        max_x = max_x.max(px);
        max_y = max_y.max(py);
    }

    Some(BBox {
        x: min_x,
        y: min_y,
        width: max_x - min_x,
        height: max_y - min_y,
    })
}

/// BBoxから次フレーム用の領域ヒントを作る
///
/// - 1.25倍に拡張（中心を保持）
/// - 縦長 4:3（h:w）に調整
/// - フレーム境界にクリップ
pub fn region_from_bbox(bbox: &BBox, frame_w: u32, frame_h: u32) -> RegionHint {
    let expand = 1.25;
    let cx = bbox.x + bbox.width / 2.0;
    let cy = bbox.y + bbox.height / 2.0;
    let mut w = bbox.width * expand;
    let mut h = bbox.height * expand;

    let target_ratio = 4.0 / 3.0;
    if h / w.max(f32::EPSILON) < target_ratio {
        h = w * target_ratio;
    } else {
        w = h / target_ratio;
    }

    let fw = frame_w as f32;
    let fh = frame_h as f32;
    let x = (cx - w / 2.0).max(0.0).min(fw - 1.0);
    let y = (cy - h / 2.0).max(0.0).min(fh - 1.0);
    let w = w.min(fw - x).max(1.0);
    let h = h.min(fh - y).max(1.0);

    RegionHint {
        x: x / fw,
        y: y / fh,
        width: w / fw,
        height: h / fh,
    }
}

/// 領域内の正規化座標をフレーム全体の正規化座標に変換
pub fn remap_pose(pose: &Pose, region: &RegionHint) -> Pose {
    let mut keypoints = [Keypoint::default(); KeypointIndex::COUNT];
    for (dst, kp) in keypoints.iter_mut().zip(pose.keypoints.iter()) {
        *dst = Keypoint {
            x: region.x + kp.x * region.width,
            y: region.y + kp.y * region.height,
            confidence: kp.confidence,
        };
    }
    Pose::new(keypoints)
}
