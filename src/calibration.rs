use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use tracing::{debug, info};

use crate::drill::DrillTemplate;
use crate::error::PipelineError;
use crate::geometry::Point2D;
use crate::units::Unit;

// --- データ構造 ---

/// マーカー配置のトポロジー
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Topology {
    /// 2点ライン（スタート/フィニッシュ）
    #[default]
    TwoPoint,
    /// 3点: 角度のある2区間
    ThreePointAngled,
    /// 3点: L字（L-drill のコーン配置）
    ThreePointL,
    /// 4点: 平面四角形
    FourPointQuad,
}

impl Topology {
    /// 必要なマーカー数
    pub fn required_markers(self) -> usize {
        match self {
            Topology::TwoPoint => 2,
            Topology::ThreePointAngled | Topology::ThreePointL => 3,
            Topology::FourPointQuad => 4,
        }
    }

    pub fn default_labels(self) -> Vec<String> {
        ["A", "B", "C", "D"]
            .iter()
            .take(self.required_markers())
            .map(|s| s.to_string())
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalibrationMarker {
    pub position_px: Point2D,
    pub label: String,
}

/// 計算済みキャリブレーション。再計算で丸ごと置き換える
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Calibration {
    /// 1単位あたりのピクセル数 (> 0)
    pub scale_px_per_unit: f64,
    pub topology: Topology,
    pub unit: Unit,
    /// 計測軸の原点（1番目のマーカー）
    pub origin_px: Point2D,
    /// 計測軸の向き（1番目→2番目のマーカー、単位ベクトル）
    pub axis: Point2D,
    /// 画面表示用に全マーカーを保持
    #[serde(default)]
    pub markers: Vec<CalibrationMarker>,
}

impl Calibration {
    /// ピクセル座標を計測軸へ射影し、原点からの距離（単位）を返す
    pub fn project(&self, point: &Point2D) -> f64 {
        point.sub(&self.origin_px).dot(&self.axis) / self.scale_px_per_unit
    }
}

// --- Save / Load ---

pub fn save_calibration<P: AsRef<Path>>(path: P, cal: &Calibration) -> Result<()> {
    let json = serde_json::to_string_pretty(cal)?;
    fs::write(path, json).context("Failed to write calibration file")?;
    Ok(())
}

pub fn load_calibration<P: AsRef<Path>>(path: P) -> Result<Calibration> {
    let content = fs::read_to_string(path).context("Failed to read calibration file")?;
    let cal: Calibration = serde_json::from_str(&content)?;
    if !(cal.scale_px_per_unit > 0.0) {
        anyhow::bail!("Calibration scale must be positive, got {}", cal.scale_px_per_unit);
    }
    Ok(cal)
}

// --- キャリブレーションエンジン ---

/// オペレーターのマーカー配置からスケールを求める
#[derive(Debug, Clone, Default)]
pub struct CalibrationEngine {
    topology: Topology,
    unit: Unit,
    labels: Vec<String>,
    markers: Vec<CalibrationMarker>,
    reference_distance: Option<f64>,
    calibration: Option<Calibration>,
}

impl CalibrationEngine {
    pub fn new(topology: Topology, unit: Unit) -> Self {
        let mut engine = Self {
            unit,
            ..Self::default()
        };
        engine.select_topology(topology);
        engine
    }

    /// トポロジーを切り替え、マーカーと計算結果をリセットする
    pub fn select_topology(&mut self, topology: Topology) {
        self.topology = topology;
        self.labels = topology.default_labels();
        self.markers.clear();
        self.calibration = None;
    }

    /// ドリルテンプレートを適用（マーカーはリセット、基準距離は事前入力）
    pub fn apply_template(&mut self, template: &DrillTemplate) {
        self.select_topology(template.topology);
        if template.marker_labels.len() == template.topology.required_markers() {
            self.labels = template.marker_labels.clone();
        }
        self.unit = template.unit;
        self.reference_distance = template.reference_distance;
        debug!(drill = %template.name, "applied drill template");
    }

    /// マーカーを追加。必要数に達していれば無視して false を返す
    pub fn place_marker(&mut self, point: Point2D) -> bool {
        let index = self.markers.len();
        if index >= self.topology.required_markers() {
            return false;
        }
        let label = self
            .labels
            .get(index)
            .cloned()
            .unwrap_or_else(|| format!("{}", index + 1));
        self.markers.push(CalibrationMarker {
            position_px: point,
            label,
        });
        self.calibration = None;
        true
    }

    /// ドラッグによるマーカー移動
    pub fn move_marker(&mut self, index: usize, point: Point2D) -> crate::error::Result<()> {
        let marker = self.markers.get_mut(index).ok_or_else(|| {
            PipelineError::invalid(format!("no marker at index {}", index))
        })?;
        marker.position_px = point;
        self.calibration = None;
        Ok(())
    }

    /// 先頭2マーカー間のピクセル距離 / 基準距離 でスケールを計算
    ///
    /// 3点・4点トポロジーでも残りのマーカーは表示用でスケールには使わない。
    pub fn compute(&mut self, reference_distance: f64) -> crate::error::Result<Calibration> {
        if self.markers.len() < 2 {
            return Err(PipelineError::invalid(format!(
                "need at least 2 markers, got {}",
                self.markers.len()
            )));
        }
        if !(reference_distance > 0.0) || !reference_distance.is_finite() {
            return Err(PipelineError::invalid(format!(
                "reference distance must be positive, got {}",
                reference_distance
            )));
        }

        let a = self.markers[0].position_px;
        let b = self.markers[1].position_px;
        let axis = b
            .sub(&a)
            .normalized()
            .ok_or_else(|| PipelineError::invalid("first two markers coincide"))?;
        let pixel_distance = a.distance(&b);
        let scale = pixel_distance / reference_distance;

        let calibration = Calibration {
            scale_px_per_unit: scale,
            topology: self.topology,
            unit: self.unit,
            origin_px: a,
            axis,
            markers: self.markers.clone(),
        };
        info!(
            "calibration: {:.1}px / {}{} = {:.3} px/{}",
            pixel_distance,
            reference_distance,
            self.unit.symbol(),
            scale,
            self.unit.symbol()
        );
        self.reference_distance = Some(reference_distance);
        self.calibration = Some(calibration.clone());
        Ok(calibration)
    }

    /// 事前入力された基準距離で計算
    pub fn compute_with_prefilled(&mut self) -> crate::error::Result<Calibration> {
        let distance = self
            .reference_distance
            .ok_or_else(|| PipelineError::invalid("no reference distance supplied"))?;
        self.compute(distance)
    }

    pub fn topology(&self) -> Topology {
        self.topology
    }

    pub fn unit(&self) -> Unit {
        self.unit
    }

    pub fn markers(&self) -> &[CalibrationMarker] {
        &self.markers
    }

    pub fn reference_distance(&self) -> Option<f64> {
        self.reference_distance
    }

    /// マーカー数がトポロジーの必要数に達しているか
    pub fn is_complete(&self) -> bool {
        self.markers.len() == self.topology.required_markers()
    }

    /// マーカー数が揃い、正の基準距離で計算済みのときのみ有効
    pub fn is_valid(&self) -> bool {
        self.is_complete() && self.calibration.is_some()
    }

    pub fn calibration(&self) -> Option<&Calibration> {
        self.calibration.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx_eq(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn test_required_markers() {
        assert_eq!(Topology::TwoPoint.required_markers(), 2);
        assert_eq!(Topology::ThreePointAngled.required_markers(), 3);
        assert_eq!(Topology::ThreePointL.required_markers(), 3);
        assert_eq!(Topology::FourPointQuad.required_markers(), 4);
    }

    #[test]
    fn test_two_point_scale() {
        let mut engine = CalibrationEngine::new(Topology::TwoPoint, Unit::Meters);
        engine.place_marker(Point2D::new(100.0, 200.0));
        engine.place_marker(Point2D::new(400.0, 600.0));
        // 距離 500px / 10m = 50 px/m
        let cal = engine.compute(10.0).unwrap();
        assert!(approx_eq(cal.scale_px_per_unit, 50.0));
        assert!(engine.is_valid());
    }

    #[test]
    fn test_scale_invariant_to_marker_order() {
        let mut forward = CalibrationEngine::new(Topology::TwoPoint, Unit::Meters);
        forward.place_marker(Point2D::new(10.0, 10.0));
        forward.place_marker(Point2D::new(250.0, 80.0));

        let mut reverse = CalibrationEngine::new(Topology::TwoPoint, Unit::Meters);
        reverse.place_marker(Point2D::new(250.0, 80.0));
        reverse.place_marker(Point2D::new(10.0, 10.0));

        let a = forward.compute(7.5).unwrap();
        let b = reverse.compute(7.5).unwrap();
        assert!(approx_eq(a.scale_px_per_unit, b.scale_px_per_unit));
    }

    #[test]
    fn test_place_marker_ignored_when_full() {
        let mut engine = CalibrationEngine::new(Topology::TwoPoint, Unit::Meters);
        assert!(engine.place_marker(Point2D::new(0.0, 0.0)));
        assert!(engine.place_marker(Point2D::new(1.0, 0.0)));
        assert!(!engine.place_marker(Point2D::new(2.0, 0.0)));
        assert_eq!(engine.markers().len(), 2);
    }

    #[test]
    fn test_compute_rejects_insufficient_markers() {
        let mut engine = CalibrationEngine::new(Topology::FourPointQuad, Unit::Meters);
        engine.place_marker(Point2D::new(0.0, 0.0));
        let err = engine.compute(5.0).unwrap_err();
        assert!(matches!(err, PipelineError::InvalidInput(_)));
    }

    #[test]
    fn test_compute_rejects_non_positive_distance() {
        let mut engine = CalibrationEngine::new(Topology::TwoPoint, Unit::Meters);
        engine.place_marker(Point2D::new(0.0, 0.0));
        engine.place_marker(Point2D::new(100.0, 0.0));
        assert!(engine.compute(0.0).is_err());
        assert!(engine.compute(-3.0).is_err());
        assert!(engine.compute(f64::NAN).is_err());
        assert!(!engine.is_valid());
    }

    #[test]
    fn test_quad_uses_first_two_markers_only() {
        let mut engine = CalibrationEngine::new(Topology::FourPointQuad, Unit::Yards);
        engine.place_marker(Point2D::new(0.0, 0.0));
        engine.place_marker(Point2D::new(300.0, 0.0));
        engine.place_marker(Point2D::new(300.0, 900.0));
        engine.place_marker(Point2D::new(0.0, 900.0));
        let cal = engine.compute(10.0).unwrap();
        assert!(approx_eq(cal.scale_px_per_unit, 30.0));
        assert_eq!(cal.markers.len(), 4);
        assert_eq!(cal.unit, Unit::Yards);
    }

    #[test]
    fn test_partial_quad_computes_but_is_not_valid() {
        let mut engine = CalibrationEngine::new(Topology::FourPointQuad, Unit::Meters);
        engine.place_marker(Point2D::new(0.0, 0.0));
        engine.place_marker(Point2D::new(100.0, 0.0));
        assert!(engine.compute(1.0).is_ok());
        assert!(!engine.is_complete());
        assert!(!engine.is_valid());
    }

    #[test]
    fn test_move_marker_invalidates() {
        let mut engine = CalibrationEngine::new(Topology::TwoPoint, Unit::Meters);
        engine.place_marker(Point2D::new(0.0, 0.0));
        engine.place_marker(Point2D::new(100.0, 0.0));
        engine.compute(1.0).unwrap();
        engine.move_marker(1, Point2D::new(200.0, 0.0)).unwrap();
        assert!(engine.calibration().is_none());
        let cal = engine.compute(1.0).unwrap();
        assert!(approx_eq(cal.scale_px_per_unit, 200.0));
        assert!(engine.move_marker(5, Point2D::default()).is_err());
    }

    #[test]
    fn test_select_topology_resets() {
        let mut engine = CalibrationEngine::new(Topology::TwoPoint, Unit::Meters);
        engine.place_marker(Point2D::new(0.0, 0.0));
        engine.place_marker(Point2D::new(100.0, 0.0));
        engine.compute(1.0).unwrap();
        engine.select_topology(Topology::ThreePointL);
        assert!(engine.markers().is_empty());
        assert!(engine.calibration().is_none());
        assert_eq!(engine.topology(), Topology::ThreePointL);
    }

    #[test]
    fn test_coincident_markers_rejected() {
        let mut engine = CalibrationEngine::new(Topology::TwoPoint, Unit::Meters);
        engine.place_marker(Point2D::new(50.0, 50.0));
        engine.place_marker(Point2D::new(50.0, 50.0));
        assert!(engine.compute(1.0).is_err());
    }

    #[test]
    fn test_project_along_axis() {
        let mut engine = CalibrationEngine::new(Topology::TwoPoint, Unit::Meters);
        engine.place_marker(Point2D::new(100.0, 100.0));
        engine.place_marker(Point2D::new(100.0, 600.0));
        let cal = engine.compute(10.0).unwrap();
        // 軸は下向き、50px/m。軸に直交する成分は無視される
        assert!(approx_eq(cal.project(&Point2D::new(100.0, 350.0)), 5.0));
        assert!(approx_eq(cal.project(&Point2D::new(900.0, 350.0)), 5.0));
        assert!(approx_eq(cal.project(&Point2D::new(100.0, 50.0)), -1.0));
    }

    #[test]
    fn test_save_load_roundtrip() {
        let mut engine = CalibrationEngine::new(Topology::ThreePointAngled, Unit::Feet);
        engine.place_marker(Point2D::new(0.0, 0.0));
        engine.place_marker(Point2D::new(120.0, 0.0));
        engine.place_marker(Point2D::new(120.0, 60.0));
        let cal = engine.compute(15.0).unwrap();

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("calibration.json");
        save_calibration(&path, &cal).unwrap();
        let loaded = load_calibration(&path).unwrap();
        assert_eq!(loaded, cal);
    }
}
