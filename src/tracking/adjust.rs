use crate::error::{PipelineError, Result};
use crate::geometry::Point2D;

use super::TrackedFrame;

/// 指定フレームの点だけを差し替える（点修正であって平滑化ではない）。
///
/// 信頼度や他フレームはそのまま、隣接フレームの再補間もしない。
pub fn apply_adjustment(track: &[TrackedFrame], frame: usize, point: Point2D) -> Result<Vec<TrackedFrame>> {
    let index = track
        .binary_search_by_key(&frame, |f| f.frame)
        .map_err(|_| PipelineError::invalid(format!("frame {} is not in the track", frame)))?;

    let mut adjusted = track.to_vec();
    let target = &mut adjusted[index];
    target.point = Some(point);
    target.is_manually_adjusted = true;
    Ok(adjusted)
}

/// 手動で修正されたフレーム番号（表示・監査用）
pub fn adjusted_frames(track: &[TrackedFrame]) -> Vec<usize> {
    track
        .iter()
        .filter(|f| f.is_manually_adjusted)
        .map(|f| f.frame)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn track() -> Vec<TrackedFrame> {
        (0..5)
            .map(|i| TrackedFrame {
                frame: i,
                time_sec: i as f64 / 30.0,
                point: if i == 2 { None } else { Some(Point2D::new(i as f64 * 10.0, 0.0)) },
                confidence: 0.4 + i as f32 * 0.1,
                is_missing: i == 2,
                is_manually_adjusted: false,
            })
            .collect()
    }

    #[test]
    fn test_point_fix_only_touches_target() {
        let original = track();
        let adjusted = apply_adjustment(&original, 3, Point2D::new(33.0, 1.0)).unwrap();
        assert_eq!(adjusted[3].point, Some(Point2D::new(33.0, 1.0)));
        assert!(adjusted[3].is_manually_adjusted);
        assert_eq!(adjusted[3].confidence, original[3].confidence);
        for i in [0, 1, 2, 4] {
            assert_eq!(adjusted[i], original[i]);
        }
        assert_eq!(adjusted_frames(&adjusted), vec![3]);
    }

    #[test]
    fn test_fills_null_point() {
        let adjusted = apply_adjustment(&track(), 2, Point2D::new(20.0, 0.0)).unwrap();
        assert_eq!(adjusted[2].point, Some(Point2D::new(20.0, 0.0)));
        assert!(adjusted[2].is_missing);
    }

    #[test]
    fn test_unknown_frame() {
        assert!(matches!(
            apply_adjustment(&track(), 9, Point2D::default()),
            Err(PipelineError::InvalidInput(_))
        ));
    }
}
