pub mod derive;
pub mod overrides;
pub mod record;
pub mod smooth;

use serde::{Deserialize, Serialize};

pub use crate::units::Unit;
pub use derive::derive;
pub use overrides::{SplitOverride, TimeMap, TimeOverrides};
pub use record::{MetricStatistics, MetricSummary, PerformanceRecord, SplitStatistics};
pub use smooth::{Smoother, Smoothing};

/// 位置の原点
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PositionOrigin {
    /// 最初に追跡できたフレームの位置を0とする（移動距離）
    #[default]
    FirstFrame,
    /// 1番目のキャリブレーションマーカーを0とする
    Marker,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KinematicFrame {
    pub frame: usize,
    /// 時刻補正を反映した報告時刻
    pub time_sec: f64,
    pub position_units: f64,
    /// unit/s
    pub velocity: f64,
    /// km/h（メートル）または mph（ヤード・フィート）
    pub velocity_display_units: f64,
    /// unit/s²
    pub acceleration: f64,
    pub acceleration_g: f64,
    /// W。体重未入力なら None
    pub power: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SplitTime {
    pub distance: f64,
    pub time_sec: f64,
    /// 現場計測値をそのまま使った
    pub overridden: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KinematicSummary {
    pub unit: Unit,
    pub max_velocity: f64,
    pub avg_velocity: f64,
    pub max_velocity_display: f64,
    pub max_acceleration: f64,
    pub max_acceleration_g: f64,
    pub max_power: Option<f64>,
    pub avg_power: Option<f64>,
    pub total_distance: f64,
    pub elapsed_time_sec: f64,
    /// 距離の昇順。到達しなかった距離は含まない
    pub splits: Vec<SplitTime>,
    pub used_time_overrides: bool,
}

impl KinematicSummary {
    pub fn split(&self, distance: f64) -> Option<f64> {
        self.splits
            .iter()
            .find(|s| (s.distance - distance).abs() < 1e-9)
            .map(|s| s.time_sec)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KinematicsResult {
    pub frames: Vec<KinematicFrame>,
    pub summary: KinematicSummary,
}
