use thiserror::Error;

/// パイプライン全体のエラー分類
///
/// 低品質トラッキングはエラーではなく `QualityRating` で通知する。
/// 範囲外のシーク/ステップはクランプされるためエラーにならない。
#[derive(Debug, Error, Clone, PartialEq)]
pub enum PipelineError {
    /// マーカー不足、基準距離が正でない、手動ポイントが2点未満 など
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// 姿勢推定サービスが未初期化・利用不可（手動モードは引き続き使用可能）
    #[error("tracking unavailable: {0}")]
    TrackingUnavailable(String),

    /// キャンセルによる正常終了。部分結果は破棄される
    #[error("processing cancelled")]
    Cancelled,
}

impl PipelineError {
    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

pub type Result<T> = std::result::Result<T, PipelineError>;
