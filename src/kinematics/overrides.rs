use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, Result};

/// 距離の一致判定に使う許容誤差
const DISTANCE_EPSILON: f64 = 1e-9;

/// オペレーターが現場計測で入力した時刻。未入力は計算値を使う
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TimeOverrides {
    #[serde(default)]
    pub start_time_sec: Option<f64>,
    #[serde(default)]
    pub end_time_sec: Option<f64>,
    #[serde(default)]
    pub splits: Vec<SplitOverride>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SplitOverride {
    pub distance: f64,
    pub time_sec: f64,
}

impl TimeOverrides {
    pub fn is_empty(&self) -> bool {
        self.start_time_sec.is_none() && self.end_time_sec.is_none() && self.splits.is_empty()
    }

    pub fn split(&self, distance: f64) -> Option<f64> {
        self.splits
            .iter()
            .find(|s| (s.distance - distance).abs() < DISTANCE_EPSILON)
            .map(|s| s.time_sec)
    }

    /// 同じ距離の既存値は置き換える
    pub fn set_split(&mut self, distance: f64, time_sec: f64) {
        match self
            .splits
            .iter_mut()
            .find(|s| (s.distance - distance).abs() < DISTANCE_EPSILON)
        {
            Some(existing) => existing.time_sec = time_sec,
            None => self.splits.push(SplitOverride { distance, time_sec }),
        }
    }

    pub fn validate(&self) -> Result<()> {
        let values = self
            .start_time_sec
            .iter()
            .chain(self.end_time_sec.iter())
            .chain(self.splits.iter().map(|s| &s.time_sec));
        for &v in values {
            if !v.is_finite() || v < 0.0 {
                return Err(PipelineError::invalid(format!(
                    "override time must be a non-negative number, got {}",
                    v
                )));
            }
        }
        Ok(())
    }
}

/// 計算時刻 → 報告時刻 のアフィン写像 `t' = anchor_out + (t - anchor_in) * scale`
///
/// フレームの順序と相対間隔を保ち、アンカー外も同じ係数で外挿する。
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimeMap {
    anchor_in: f64,
    anchor_out: f64,
    scale: f64,
}

impl TimeMap {
    pub fn identity() -> Self {
        Self {
            anchor_in: 0.0,
            anchor_out: 0.0,
            scale: 1.0,
        }
    }

    /// (計算時刻, 計測時刻) のアンカー列から写像を作る。
    ///
    /// 最小・最大の計算時刻を持つアンカーで係数を決める。アンカーが1点なら平行移動のみ。
    pub fn from_anchors(anchors: &[(f64, f64)]) -> Result<Self> {
        let lo = anchors
            .iter()
            .copied()
            .min_by(|a, b| a.0.total_cmp(&b.0));
        let hi = anchors
            .iter()
            .copied()
            .max_by(|a, b| a.0.total_cmp(&b.0));
        let (lo, hi) = match (lo, hi) {
            (Some(lo), Some(hi)) => (lo, hi),
            _ => return Ok(Self::identity()),
        };

        let span = hi.0 - lo.0;
        let scale = if span.abs() < f64::EPSILON {
            1.0
        } else {
            (hi.1 - lo.1) / span
        };
        if !(scale > 0.0) || !scale.is_finite() {
            return Err(PipelineError::invalid(format!(
                "time overrides are inconsistent with frame order (scale {})",
                scale
            )));
        }

        Ok(Self {
            anchor_in: lo.0,
            anchor_out: lo.1,
            scale,
        })
    }

    pub fn map(&self, t: f64) -> f64 {
        self.anchor_out + (t - self.anchor_in) * self.scale
    }

    pub fn scale(&self) -> f64 {
        self.scale
    }

    pub fn is_identity(&self) -> bool {
        self.scale == 1.0 && self.anchor_in == self.anchor_out
    }
}
