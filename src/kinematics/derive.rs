use tracing::debug;

use crate::calibration::Calibration;
use crate::config::KinematicsConfig;
use crate::error::{PipelineError, Result};
use crate::geometry::Point2D;
use crate::tracking::TrackedFrame;

use super::overrides::{TimeMap, TimeOverrides};
use super::{KinematicFrame, KinematicSummary, KinematicsResult, PositionOrigin, SplitTime};

/// 追跡点から位置・速度・加速度・パワーとスプリットを導出する。
///
/// 入力の純関数で、途中結果を差分更新することはない。同じ入力なら常に同じ出力になる。
/// 時刻補正は追跡をやり直さず時間軸だけを伸縮する。
pub fn derive(
    track: &[TrackedFrame],
    calibration: Option<&Calibration>,
    fps: f64,
    overrides: &TimeOverrides,
    mass_kg: Option<f64>,
    config: &KinematicsConfig,
) -> Result<KinematicsResult> {
    let cal = calibration.ok_or_else(|| PipelineError::invalid("no calibration; refusing to derive unscaled output"))?;
    if !(cal.scale_px_per_unit > 0.0) || !cal.scale_px_per_unit.is_finite() {
        return Err(PipelineError::invalid(format!(
            "calibration scale must be positive, got {}",
            cal.scale_px_per_unit
        )));
    }
    if !(fps > 0.0) || !fps.is_finite() {
        return Err(PipelineError::invalid(format!("invalid fps {}", fps)));
    }
    if let Some(mass) = mass_kg {
        if !(mass > 0.0) || !mass.is_finite() {
            return Err(PipelineError::invalid(format!("mass must be positive, got {}", mass)));
        }
    }
    config.smoothing.validate()?;
    overrides.validate()?;

    let samples: Vec<(usize, Point2D)> = track
        .iter()
        .filter_map(|f| f.point.map(|p| (f.frame, p)))
        .collect();
    if samples.windows(2).any(|w| w[1].0 <= w[0].0) {
        return Err(PipelineError::invalid("track frames must be strictly increasing"));
    }
    if samples.is_empty() {
        return Ok(empty_result(cal, !overrides.is_empty()));
    }

    // 計測軸への射影
    let projected: Vec<f64> = samples.iter().map(|(_, p)| cal.project(p)).collect();
    let origin = match config.origin {
        PositionOrigin::FirstFrame => projected[0],
        PositionOrigin::Marker => 0.0,
    };
    let relative: Vec<f64> = projected.iter().map(|p| p - origin).collect();
    let positions = config.smoothing.apply(&relative);

    let raw_times: Vec<f64> = samples.iter().map(|(f, _)| *f as f64 / fps).collect();
    let crossing = |distance: f64| positions.iter().position(|&p| p >= distance);

    let time_map = build_time_map(&raw_times, overrides, &crossing)?;
    if !time_map.is_identity() {
        debug!("field times rescale the time axis by {:.4}", time_map.scale());
    }
    let times: Vec<f64> = raw_times.iter().map(|&t| time_map.map(t)).collect();

    let unit = cal.unit;
    let gravity = unit.gravity();
    let meters_per_unit = unit.meters_per_unit();

    let mut frames: Vec<KinematicFrame> = Vec::with_capacity(samples.len());
    for (i, &(frame, _)) in samples.iter().enumerate() {
        let (velocity, acceleration) = if i == 0 {
            // 前のサンプルがないので定義上0
            (0.0, 0.0)
        } else {
            let dt = times[i] - times[i - 1];
            let velocity = (positions[i] - positions[i - 1]) / dt;
            // フレーム0の速度は測定値ではないので加速度の差分には使わない
            let acceleration = if i == 1 {
                0.0
            } else {
                (velocity - frames[i - 1].velocity) / dt
            };
            (velocity, acceleration)
        };

        let power = mass_kg.map(|mass| {
            let force = mass * acceleration * meters_per_unit;
            force * velocity * meters_per_unit
        });

        frames.push(KinematicFrame {
            frame,
            time_sec: times[i],
            position_units: positions[i],
            velocity,
            velocity_display_units: unit.to_display_speed(velocity),
            acceleration,
            acceleration_g: acceleration / gravity,
            power,
        });
    }

    let splits = compute_splits(config, overrides, &times, &crossing);
    let summary = summarize(cal, &frames, splits, !overrides.is_empty());
    debug!(
        "derived {} frames, max velocity {:.2} {}/s, {} splits",
        frames.len(),
        summary.max_velocity,
        unit.symbol(),
        summary.splits.len()
    );

    Ok(KinematicsResult { frames, summary })
}

/// 現場計測値をアンカーにして時間軸の写像を作る
fn build_time_map(
    raw_times: &[f64],
    overrides: &TimeOverrides,
    crossing: &dyn Fn(f64) -> Option<usize>,
) -> Result<TimeMap> {
    let first = raw_times[0];
    let last = raw_times[raw_times.len() - 1];

    let mut anchors = Vec::new();
    if let Some(start) = overrides.start_time_sec {
        anchors.push((first, start));
    }
    if let Some(end) = overrides.end_time_sec {
        anchors.push((last, end));
    }
    for split in &overrides.splits {
        if let Some(i) = crossing(split.distance) {
            anchors.push((raw_times[i], split.time_sec));
        }
    }
    // 開始時刻が未入力なら計算上の開始を固定点にする
    if overrides.start_time_sec.is_none() && !anchors.is_empty() {
        anchors.push((first, first));
    }

    TimeMap::from_anchors(&anchors)
}

fn compute_splits(
    config: &KinematicsConfig,
    overrides: &TimeOverrides,
    times: &[f64],
    crossing: &dyn Fn(f64) -> Option<usize>,
) -> Vec<SplitTime> {
    let mut distances: Vec<f64> = config
        .split_distances
        .iter()
        .copied()
        .chain(overrides.splits.iter().map(|s| s.distance))
        .filter(|d| d.is_finite() && *d > 0.0)
        .collect();
    distances.sort_by(|a, b| a.total_cmp(b));
    distances.dedup_by(|a, b| (*a - *b).abs() < 1e-9);

    distances
        .into_iter()
        .filter_map(|distance| match overrides.split(distance) {
            Some(time_sec) => Some(SplitTime {
                distance,
                time_sec,
                overridden: true,
            }),
            None => crossing(distance).map(|i| SplitTime {
                distance,
                time_sec: times[i],
                overridden: false,
            }),
        })
        .collect()
}

fn summarize(
    cal: &Calibration,
    frames: &[KinematicFrame],
    splits: Vec<SplitTime>,
    used_time_overrides: bool,
) -> KinematicSummary {
    let first = &frames[0];
    let last = &frames[frames.len() - 1];
    let total_distance = last.position_units - first.position_units;
    let elapsed_time_sec = last.time_sec - first.time_sec;
    let avg_velocity = if elapsed_time_sec > 0.0 {
        total_distance / elapsed_time_sec
    } else {
        0.0
    };

    let max_velocity = max_of(frames.iter().map(|f| f.velocity));
    let max_acceleration = max_of(frames.iter().map(|f| f.acceleration));

    // パワー未計算のフレームは0扱いせず除外する
    let powers: Vec<f64> = frames.iter().filter_map(|f| f.power).collect();
    let (max_power, avg_power) = if powers.is_empty() {
        (None, None)
    } else {
        (
            Some(max_of(powers.iter().copied())),
            Some(powers.iter().sum::<f64>() / powers.len() as f64),
        )
    };

    KinematicSummary {
        unit: cal.unit,
        max_velocity,
        avg_velocity,
        max_velocity_display: cal.unit.to_display_speed(max_velocity),
        max_acceleration,
        max_acceleration_g: max_acceleration / cal.unit.gravity(),
        max_power,
        avg_power,
        total_distance,
        elapsed_time_sec,
        splits,
        used_time_overrides,
    }
}

fn max_of(values: impl Iterator<Item = f64>) -> f64 {
    values.fold(f64::NEG_INFINITY, f64::max)
}

fn empty_result(cal: &Calibration, used_time_overrides: bool) -> KinematicsResult {
    KinematicsResult {
        frames: Vec::new(),
        summary: KinematicSummary {
            unit: cal.unit,
            max_velocity: 0.0,
            avg_velocity: 0.0,
            max_velocity_display: 0.0,
            max_acceleration: 0.0,
            max_acceleration_g: 0.0,
            max_power: None,
            avg_power: None,
            total_distance: 0.0,
            elapsed_time_sec: 0.0,
            splits: Vec::new(),
            used_time_overrides,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calibration::{CalibrationEngine, Topology};
    use crate::kinematics::Smoothing;
    use crate::units::Unit;

    /// (100,0)-(300,0) を 10 単位とする → 20 px/unit, x軸方向
    fn calibration(unit: Unit) -> Calibration {
        let mut engine = CalibrationEngine::new(Topology::TwoPoint, unit);
        engine.place_marker(Point2D::new(100.0, 0.0));
        engine.place_marker(Point2D::new(300.0, 0.0));
        engine.compute(10.0).unwrap()
    }

    fn track_from_positions(positions: &[Option<f64>], fps: f64) -> Vec<TrackedFrame> {
        positions
            .iter()
            .enumerate()
            .map(|(i, p)| TrackedFrame {
                frame: i,
                time_sec: i as f64 / fps,
                point: p.map(|units| Point2D::new(100.0 + units * 20.0, 50.0)),
                confidence: 0.9,
                is_missing: false,
                is_manually_adjusted: false,
            })
            .collect()
    }

    fn linear_track(n: usize, step: f64, fps: f64) -> Vec<TrackedFrame> {
        let positions: Vec<Option<f64>> = (0..n).map(|i| Some(i as f64 * step)).collect();
        track_from_positions(&positions, fps)
    }

    fn config(splits: &[f64]) -> KinematicsConfig {
        KinematicsConfig {
            split_distances: splits.to_vec(),
            ..KinematicsConfig::default()
        }
    }

    fn approx_eq(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn test_constant_velocity() {
        let cal = calibration(Unit::Meters);
        let track = linear_track(11, 1.0, 10.0);
        let result = derive(&track, Some(&cal), 10.0, &TimeOverrides::default(), None, &config(&[])).unwrap();

        assert_eq!(result.frames.len(), 11);
        assert_eq!(result.frames[0].velocity, 0.0);
        for f in &result.frames[1..] {
            assert!(approx_eq(f.velocity, 10.0), "frame {} velocity {}", f.frame, f.velocity);
        }
        for f in &result.frames {
            assert!(approx_eq(f.acceleration, 0.0));
            assert!(f.power.is_none());
        }
        assert!(approx_eq(result.summary.max_velocity, 10.0));
        assert!(approx_eq(result.summary.max_velocity_display, 36.0));
        assert!(approx_eq(result.summary.total_distance, 10.0));
        assert!(approx_eq(result.summary.avg_velocity, 10.0));
        assert!(result.summary.max_power.is_none());
    }

    #[test]
    fn test_missing_calibration_refused() {
        let track = linear_track(5, 1.0, 10.0);
        let err = derive(&track, None, 10.0, &TimeOverrides::default(), None, &config(&[])).unwrap_err();
        assert!(matches!(err, PipelineError::InvalidInput(_)));
    }

    #[test]
    fn test_invalid_fps_and_mass() {
        let cal = calibration(Unit::Meters);
        let track = linear_track(5, 1.0, 10.0);
        let o = TimeOverrides::default();
        assert!(derive(&track, Some(&cal), 0.0, &o, None, &config(&[])).is_err());
        assert!(derive(&track, Some(&cal), 10.0, &o, Some(-70.0), &config(&[])).is_err());
    }

    #[test]
    fn test_splits_first_crossing_and_absent() {
        let cal = calibration(Unit::Meters);
        let track = linear_track(11, 1.0, 10.0);
        let result = derive(&track, Some(&cal), 10.0, &TimeOverrides::default(), None, &config(&[5.0, 2.5, 20.0])).unwrap();
        let s = &result.summary;
        assert_eq!(s.splits.len(), 2);
        assert!(approx_eq(s.split(2.5).unwrap(), 0.3));
        assert!(approx_eq(s.split(5.0).unwrap(), 0.5));
        assert!(s.split(20.0).is_none());
        assert!(s.splits.iter().all(|sp| !sp.overridden));
    }

    #[test]
    fn test_splits_monotonic_for_advancing_track() {
        let cal = calibration(Unit::Meters);
        // 加速しながら進む
        let positions: Vec<Option<f64>> = (0..40).map(|i| Some(0.01 * (i * i) as f64)).collect();
        let track = track_from_positions(&positions, 30.0);
        let distances: Vec<f64> = (1..=15).map(|d| d as f64).collect();
        let result = derive(&track, Some(&cal), 30.0, &TimeOverrides::default(), None, &config(&distances)).unwrap();
        let times: Vec<f64> = result.summary.splits.iter().map(|s| s.time_sec).collect();
        assert!(times.len() > 5);
        assert!(times.windows(2).all(|w| w[0] <= w[1]));
    }

    #[test]
    fn test_power_requires_mass() {
        let cal = calibration(Unit::Meters);
        // 等加速度: x = t² (m), fps=10
        let positions: Vec<Option<f64>> = (0..6).map(|i| Some((i as f64 / 10.0).powi(2))).collect();
        let track = track_from_positions(&positions, 10.0);
        let result = derive(&track, Some(&cal), 10.0, &TimeOverrides::default(), Some(80.0), &config(&[])).unwrap();

        // 速度の差分 0.2 m/s / 0.1 s = 2 m/s²
        let f = &result.frames[3];
        assert!(approx_eq(f.acceleration, 2.0));
        assert!((f.acceleration_g - 2.0 / 9.80665).abs() < 1e-9);
        assert!(approx_eq(f.power.unwrap(), 80.0 * 2.0 * f.velocity));
        assert!(result.frames.iter().all(|f| f.power.is_some()));
        assert!(result.summary.max_power.unwrap() >= result.summary.avg_power.unwrap());
    }

    #[test]
    fn test_null_points_skipped_with_real_time_delta() {
        let cal = calibration(Unit::Meters);
        let track = track_from_positions(&[Some(0.0), Some(1.0), None, Some(3.0), Some(4.0)], 10.0);
        let result = derive(&track, Some(&cal), 10.0, &TimeOverrides::default(), None, &config(&[])).unwrap();
        assert_eq!(result.frames.len(), 4);
        assert_eq!(result.frames[2].frame, 3);
        // 2m / 0.2s
        assert!(approx_eq(result.frames[2].velocity, 10.0));
        assert!(approx_eq(result.frames[2].acceleration, 0.0));
    }

    #[test]
    fn test_end_override_rescales_time() {
        let cal = calibration(Unit::Meters);
        let track = linear_track(11, 1.0, 10.0);
        let overrides = TimeOverrides {
            end_time_sec: Some(1.25),
            ..Default::default()
        };
        let result = derive(&track, Some(&cal), 10.0, &overrides, None, &config(&[5.0])).unwrap();
        let last = result.frames.last().unwrap();
        assert!(approx_eq(last.time_sec, 1.25));
        assert!(approx_eq(result.frames[0].time_sec, 0.0));
        assert!(approx_eq(result.frames[4].velocity, 8.0));
        assert!(approx_eq(result.summary.split(5.0).unwrap(), 0.625));
        assert!(result.summary.used_time_overrides);
    }

    #[test]
    fn test_start_and_end_override_anchor_elapsed_time() {
        let cal = calibration(Unit::Meters);
        let track = linear_track(11, 1.0, 10.0);
        let overrides = TimeOverrides {
            start_time_sec: Some(2.0),
            end_time_sec: Some(4.0),
            ..Default::default()
        };
        let result = derive(&track, Some(&cal), 10.0, &overrides, None, &config(&[])).unwrap();
        assert!(approx_eq(result.frames[0].time_sec, 2.0));
        assert!(approx_eq(result.summary.elapsed_time_sec, 2.0));
        assert!(approx_eq(result.summary.max_velocity, 5.0));
    }

    #[test]
    fn test_split_override_reported_verbatim() {
        let cal = calibration(Unit::Meters);
        let track = linear_track(21, 1.0, 10.0);
        let mut overrides = TimeOverrides::default();
        overrides.set_split(10.0, 1.1);
        let result = derive(&track, Some(&cal), 10.0, &overrides, None, &config(&[5.0, 10.0, 30.0])).unwrap();
        let s = &result.summary;
        assert_eq!(s.split(10.0), Some(1.1));
        assert!(s.splits.iter().find(|sp| sp.distance == 10.0).unwrap().overridden);
        // 5m は同じ係数 1.1 で伸びる
        assert!(approx_eq(s.split(5.0).unwrap(), 0.55));
        // 範囲外のフレームも同じ係数で外挿
        assert!(approx_eq(result.frames[20].time_sec, 2.2));
        assert!(s.split(30.0).is_none());
    }

    #[test]
    fn test_override_idempotent() {
        let cal = calibration(Unit::Yards);
        let positions: Vec<Option<f64>> = (0..30).map(|i| Some(0.02 * (i * i) as f64)).collect();
        let track = track_from_positions(&positions, 30.0);
        let mut overrides = TimeOverrides {
            start_time_sec: Some(0.1),
            end_time_sec: Some(1.2),
            ..Default::default()
        };
        overrides.set_split(5.0, 0.8);
        let cfg = config(&[5.0, 10.0]);
        let a = derive(&track, Some(&cal), 30.0, &overrides, Some(90.0), &cfg).unwrap();
        let b = derive(&track, Some(&cal), 30.0, &overrides, Some(90.0), &cfg).unwrap();
        assert_eq!(a, b);
        for (fa, fb) in a.frames.iter().zip(b.frames.iter()) {
            assert_eq!(fa.time_sec.to_bits(), fb.time_sec.to_bits());
            assert_eq!(fa.velocity.to_bits(), fb.velocity.to_bits());
        }
    }

    #[test]
    fn test_inconsistent_overrides_rejected() {
        let cal = calibration(Unit::Meters);
        let track = linear_track(11, 1.0, 10.0);
        let overrides = TimeOverrides {
            start_time_sec: Some(3.0),
            end_time_sec: Some(1.0),
            ..Default::default()
        };
        assert!(derive(&track, Some(&cal), 10.0, &overrides, None, &config(&[])).is_err());
    }

    #[test]
    fn test_marker_origin() {
        let cal = calibration(Unit::Meters);
        let track = track_from_positions(&[Some(2.0), Some(3.0)], 10.0);
        let cfg = KinematicsConfig {
            origin: PositionOrigin::Marker,
            ..config(&[])
        };
        let result = derive(&track, Some(&cal), 10.0, &TimeOverrides::default(), None, &cfg).unwrap();
        assert!(approx_eq(result.frames[0].position_units, 2.0));
        let first_frame = derive(&track, Some(&cal), 10.0, &TimeOverrides::default(), None, &config(&[])).unwrap();
        assert!(approx_eq(first_frame.frames[0].position_units, 0.0));
    }

    #[test]
    fn test_smoothing_applied_before_differencing() {
        let cal = calibration(Unit::Meters);
        let track = track_from_positions(&[Some(0.0), Some(2.0), Some(2.0)], 10.0);
        let cfg = KinematicsConfig {
            smoothing: Smoothing::Ema { alpha: 0.5 },
            ..config(&[])
        };
        let result = derive(&track, Some(&cal), 10.0, &TimeOverrides::default(), None, &cfg).unwrap();
        assert!(approx_eq(result.frames[1].position_units, 1.0));
        assert!(approx_eq(result.frames[2].position_units, 1.5));
    }

    #[test]
    fn test_empty_track() {
        let cal = calibration(Unit::Feet);
        let track = track_from_positions(&[None, None], 10.0);
        let result = derive(&track, Some(&cal), 10.0, &TimeOverrides::default(), None, &config(&[10.0])).unwrap();
        assert!(result.frames.is_empty());
        assert_eq!(result.summary.unit, Unit::Feet);
        assert!(result.summary.splits.is_empty());
    }
}
