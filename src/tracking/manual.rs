use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, Result};
use crate::geometry::Point2D;

use super::TrackedFrame;

/// オペレーターが任意のフレームに置いた基準点（キーフレーム）
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ManualPoint {
    pub frame: usize,
    pub point: Point2D,
}

impl ManualPoint {
    pub fn new(frame: usize, point: Point2D) -> Self {
        Self { frame, point }
    }
}

/// キーフレーム間を区分線形補間してトラックを作る。
///
/// - 同じフレームに複数の点があれば最後に置いた点を使う
/// - 最初のキーフレームより前・最後より後は生成しない（外挿なし）
/// - 信頼度は常に 1.0、キーフレーム自体は手動調整済みとして印を付ける
pub fn interpolate_manual(points: &[ManualPoint], fps: f64) -> Result<Vec<TrackedFrame>> {
    if !(fps > 0.0) || !fps.is_finite() {
        return Err(PipelineError::invalid(format!("invalid fps {}", fps)));
    }

    let mut keyframes: Vec<ManualPoint> = Vec::with_capacity(points.len());
    let mut sorted = points.to_vec();
    // 安定ソートなので同一フレーム内は配置順が保たれる
    sorted.sort_by_key(|p| p.frame);
    for p in sorted {
        match keyframes.last_mut() {
            Some(last) if last.frame == p.frame => *last = p,
            _ => keyframes.push(p),
        }
    }

    if keyframes.len() < 2 {
        return Err(PipelineError::invalid(format!(
            "manual tracking needs at least 2 points on distinct frames, got {}",
            keyframes.len()
        )));
    }

    let first = keyframes[0].frame;
    let last = keyframes[keyframes.len() - 1].frame;
    let mut frames = Vec::with_capacity(last - first + 1);

    for pair in keyframes.windows(2) {
        let (a, b) = (pair[0], pair[1]);
        let span = (b.frame - a.frame) as f64;
        // 区間の終端は次の区間の始端として出力する（最後の区間のみ含める）
        let end = if b.frame == last { b.frame } else { b.frame - 1 };
        for frame in a.frame..=end {
            let t = (frame - a.frame) as f64 / span;
            frames.push(TrackedFrame {
                frame,
                time_sec: frame as f64 / fps,
                point: Some(Point2D::lerp(&a.point, &b.point, t)),
                confidence: 1.0,
                is_missing: false,
                is_manually_adjusted: frame == a.frame || frame == b.frame,
            });
        }
    }

    Ok(frames)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx_eq(a: &Point2D, b: &Point2D) -> bool {
        (a.x - b.x).abs() < 1e-9 && (a.y - b.y).abs() < 1e-9
    }

    #[test]
    fn test_midpoint() {
        let points = [
            ManualPoint::new(0, Point2D::new(0.0, 0.0)),
            ManualPoint::new(10, Point2D::new(100.0, 0.0)),
        ];
        let frames = interpolate_manual(&points, 30.0).unwrap();
        assert_eq!(frames.len(), 11);
        assert!(approx_eq(&frames[5].point.unwrap(), &Point2D::new(50.0, 0.0)));
        assert!(frames.iter().all(|f| f.confidence == 1.0 && !f.is_missing));
    }

    #[test]
    fn test_unsorted_input_and_no_extrapolation() {
        let points = [
            ManualPoint::new(20, Point2D::new(200.0, 40.0)),
            ManualPoint::new(5, Point2D::new(50.0, 10.0)),
            ManualPoint::new(10, Point2D::new(100.0, 20.0)),
        ];
        let frames = interpolate_manual(&points, 10.0).unwrap();
        assert_eq!(frames.first().unwrap().frame, 5);
        assert_eq!(frames.last().unwrap().frame, 20);
        assert_eq!(frames.len(), 16);
        // 連続で重複なし
        assert!(frames.windows(2).all(|w| w[1].frame == w[0].frame + 1));
        let f15 = frames.iter().find(|f| f.frame == 15).unwrap();
        assert!(approx_eq(&f15.point.unwrap(), &Point2D::new(150.0, 30.0)));
        assert!((f15.time_sec - 1.5).abs() < 1e-9);
    }

    #[test]
    fn test_keyframes_marked() {
        let points = [
            ManualPoint::new(0, Point2D::new(0.0, 0.0)),
            ManualPoint::new(4, Point2D::new(40.0, 0.0)),
            ManualPoint::new(8, Point2D::new(80.0, 0.0)),
        ];
        let frames = interpolate_manual(&points, 30.0).unwrap();
        let marked: Vec<usize> = frames
            .iter()
            .filter(|f| f.is_manually_adjusted)
            .map(|f| f.frame)
            .collect();
        assert_eq!(marked, vec![0, 4, 8]);
    }

    #[test]
    fn test_idempotent() {
        let points = [
            ManualPoint::new(3, Point2D::new(10.0, 5.0)),
            ManualPoint::new(9, Point2D::new(70.0, -5.0)),
        ];
        assert_eq!(
            interpolate_manual(&points, 25.0).unwrap(),
            interpolate_manual(&points, 25.0).unwrap()
        );
    }

    #[test]
    fn test_duplicate_frame_keeps_last() {
        let points = [
            ManualPoint::new(0, Point2D::new(0.0, 0.0)),
            ManualPoint::new(2, Point2D::new(10.0, 0.0)),
            ManualPoint::new(2, Point2D::new(20.0, 0.0)),
        ];
        let frames = interpolate_manual(&points, 30.0).unwrap();
        assert!(approx_eq(&frames[2].point.unwrap(), &Point2D::new(20.0, 0.0)));
    }

    #[test]
    fn test_requires_two_points() {
        let one = [ManualPoint::new(0, Point2D::new(0.0, 0.0))];
        assert!(matches!(interpolate_manual(&one, 30.0), Err(PipelineError::InvalidInput(_))));
        let same_frame = [
            ManualPoint::new(4, Point2D::new(0.0, 0.0)),
            ManualPoint::new(4, Point2D::new(1.0, 0.0)),
        ];
        assert!(interpolate_manual(&same_frame, 30.0).is_err());
        assert!(interpolate_manual(&[], 30.0).is_err());
    }
}
