use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::units::Unit;

use super::{KinematicsResult, SplitTime};

/// 1回の試技の保存用レコード（選手の履歴に積む）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceRecord {
    pub date: NaiveDate,
    pub drill_name: String,
    pub unit: Unit,
    /// unit/s
    pub max_speed: f64,
    /// unit/s²
    pub max_acceleration: f64,
    pub max_power: Option<f64>,
    pub splits: Vec<SplitTime>,
    pub used_time_overrides: bool,
}

impl PerformanceRecord {
    pub fn from_result(date: NaiveDate, drill_name: impl Into<String>, result: &KinematicsResult) -> Self {
        let s = &result.summary;
        Self {
            date,
            drill_name: drill_name.into(),
            unit: s.unit,
            max_speed: s.max_velocity,
            max_acceleration: s.max_acceleration,
            max_power: s.max_power,
            splits: s.splits.clone(),
            used_time_overrides: s.used_time_overrides,
        }
    }

    pub fn split(&self, distance: f64) -> Option<f64> {
        self.splits
            .iter()
            .find(|s| (s.distance - distance).abs() < 1e-9)
            .map(|s| s.time_sec)
    }
}

/// 1指標の集計。値が2件未満なら count 以外は None
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct MetricSummary {
    pub mean: Option<f64>,
    /// 標本標準偏差（n-1）
    pub std: Option<f64>,
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub count: usize,
}

impl MetricSummary {
    pub fn from_values(values: &[f64]) -> Self {
        let count = values.len();
        if count < 2 {
            return Self {
                count,
                ..Self::default()
            };
        }

        let n = count as f64;
        let mean = values.iter().sum::<f64>() / n;
        let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1.0);
        Self {
            mean: Some(mean),
            std: Some(variance.sqrt()),
            min: Some(values.iter().copied().fold(f64::INFINITY, f64::min)),
            max: Some(values.iter().copied().fold(f64::NEG_INFINITY, f64::max)),
            count,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SplitStatistics {
    pub distance: f64,
    pub summary: MetricSummary,
}

/// 同じドリルの履歴から指標ごとの統計を出す
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct MetricStatistics {
    pub max_speed: MetricSummary,
    pub max_acceleration: MetricSummary,
    pub max_power: MetricSummary,
    /// 距離の昇順
    pub splits: Vec<SplitStatistics>,
}

impl MetricStatistics {
    /// 値のない指標（体重未入力のパワー、未到達のスプリット）はその記録を数えない
    pub fn from_records(records: &[PerformanceRecord]) -> Self {
        let speeds: Vec<f64> = records.iter().map(|r| r.max_speed).collect();
        let accels: Vec<f64> = records.iter().map(|r| r.max_acceleration).collect();
        let powers: Vec<f64> = records.iter().filter_map(|r| r.max_power).collect();

        let mut distances: Vec<f64> = records
            .iter()
            .flat_map(|r| r.splits.iter().map(|s| s.distance))
            .collect();
        distances.sort_by(|a, b| a.total_cmp(b));
        distances.dedup_by(|a, b| (*a - *b).abs() < 1e-9);

        let splits = distances
            .into_iter()
            .map(|distance| {
                let times: Vec<f64> = records.iter().filter_map(|r| r.split(distance)).collect();
                SplitStatistics {
                    distance,
                    summary: MetricSummary::from_values(&times),
                }
            })
            .collect();

        Self {
            max_speed: MetricSummary::from_values(&speeds),
            max_acceleration: MetricSummary::from_values(&accels),
            max_power: MetricSummary::from_values(&powers),
            splits,
        }
    }
}
