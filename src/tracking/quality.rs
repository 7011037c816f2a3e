use serde::{Deserialize, Serialize};

use super::{TrackedFrame, TrackingMode};

/// トラッキング品質。Poor < Fair < Good < Excellent < Manual の全順序
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QualityRating {
    Poor,
    Fair,
    Good,
    Excellent,
    Manual,
}

impl QualityRating {
    /// 平均信頼度の帯で判定
    pub fn from_avg_confidence(avg: f64) -> Self {
        if avg < 0.3 {
            QualityRating::Poor
        } else if avg < 0.5 {
            QualityRating::Fair
        } else if avg < 0.7 {
            QualityRating::Good
        } else {
            QualityRating::Excellent
        }
    }

    /// 手動モードへの切り替えを勧めるべきか。計算は止めない
    pub fn recommends_manual(self) -> bool {
        matches!(self, QualityRating::Poor | QualityRating::Fair)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityAssessment {
    pub avg_confidence: f64,
    pub good_frame_fraction: f64,
    pub missing_frame_count: usize,
    pub rating: QualityRating,
}

impl QualityAssessment {
    pub fn recommends_manual(&self) -> bool {
        self.rating.recommends_manual()
    }
}

/// トラック全体の品質を集計する。欠損フレームは信頼度に関わらず失敗として数える
pub fn assess_quality(frames: &[TrackedFrame], threshold: f32, mode: TrackingMode) -> QualityAssessment {
    let count = frames.len();
    let missing_frame_count = frames.iter().filter(|f| f.is_missing).count();

    let (avg_confidence, good_frame_fraction) = if count == 0 {
        (0.0, 0.0)
    } else {
        let sum: f64 = frames.iter().map(|f| f.confidence as f64).sum();
        let good = frames
            .iter()
            .filter(|f| !f.is_missing && f.confidence >= threshold)
            .count();
        (sum / count as f64, good as f64 / count as f64)
    };

    let rating = match mode {
        TrackingMode::Manual => QualityRating::Manual,
        TrackingMode::Ai => QualityRating::from_avg_confidence(avg_confidence),
    };

    QualityAssessment {
        avg_confidence,
        good_frame_fraction,
        missing_frame_count,
        rating,
    }
}
