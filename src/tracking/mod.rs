pub mod adjust;
pub mod cancel;
pub mod manual;
pub mod quality;
pub mod runner;

use serde::{Deserialize, Serialize};

use crate::geometry::Point2D;

pub use adjust::{adjusted_frames, apply_adjustment};
pub use cancel::CancellationToken;
pub use manual::{interpolate_manual, ManualPoint};
pub use quality::{assess_quality, QualityAssessment, QualityRating};
pub use runner::TrackingRunner;

/// トラックの作り方。AIと手動は排他
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrackingMode {
    Ai,
    Manual,
}

/// 1フレーム分の追跡結果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackedFrame {
    pub frame: usize,
    /// 有効ウィンドウ先頭からの時刻
    pub time_sec: f64,
    pub point: Option<Point2D>,
    pub confidence: f32,
    /// 閾値未満の検出。点は残るが品質評価では失敗扱い
    pub is_missing: bool,
    pub is_manually_adjusted: bool,
}

/// フレーム順に並んだ追跡結果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Track {
    pub mode: TrackingMode,
    pub frames: Vec<TrackedFrame>,
}

impl Track {
    pub fn new(mode: TrackingMode, frames: Vec<TrackedFrame>) -> Self {
        Self { mode, frames }
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn get(&self, frame: usize) -> Option<&TrackedFrame> {
        self.frames
            .binary_search_by_key(&frame, |f| f.frame)
            .ok()
            .map(|i| &self.frames[i])
    }
}
