use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, Result};

/// 微分前に位置系列へかける平滑化
///
/// 既定は Off（後退差分のみ）。推定ノイズが大きい場合に EMA か移動平均を選ぶ。
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Smoothing {
    #[default]
    Off,
    /// 指数移動平均。alpha=1 で平滑化なし
    Ema { alpha: f64 },
    /// 中心移動平均（端では窓を縮める）
    MovingAverage { window: usize },
}

impl Smoothing {
    pub fn validate(&self) -> Result<()> {
        match *self {
            Smoothing::Off => Ok(()),
            Smoothing::Ema { alpha } if alpha > 0.0 && alpha <= 1.0 => Ok(()),
            Smoothing::Ema { alpha } => Err(PipelineError::invalid(format!(
                "EMA alpha must be in (0, 1], got {}",
                alpha
            ))),
            Smoothing::MovingAverage { window } if window >= 1 => Ok(()),
            Smoothing::MovingAverage { .. } => {
                Err(PipelineError::invalid("moving average window must be >= 1"))
            }
        }
    }

    pub fn apply(&self, values: &[f64]) -> Vec<f64> {
        match *self {
            Smoothing::Off => values.to_vec(),
            Smoothing::Ema { alpha } => {
                let mut smoother = Smoother::new(alpha);
                values.iter().map(|&v| smoother.apply(v)).collect()
            }
            Smoothing::MovingAverage { window } => moving_average(values, window),
        }
    }
}

/// EMAベースのスカラー平滑化フィルタ
pub struct Smoother {
    alpha: f64,
    prev: Option<f64>,
}

impl Smoother {
    pub fn new(alpha: f64) -> Self {
        Self { alpha, prev: None }
    }

    /// 最初の値はそのまま通す
    pub fn apply(&mut self, value: f64) -> f64 {
        let result = match self.prev {
            Some(prev) => self.alpha * value + (1.0 - self.alpha) * prev,
            None => value,
        };
        self.prev = Some(result);
        result
    }
}

fn moving_average(values: &[f64], window: usize) -> Vec<f64> {
    let half = window / 2;
    (0..values.len())
        .map(|i| {
            let lo = i.saturating_sub(half);
            let hi = (i + half).min(values.len() - 1);
            let slice = &values[lo..=hi];
            slice.iter().sum::<f64>() / slice.len() as f64
        })
        .collect()
}
