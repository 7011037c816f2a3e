use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// トラッキングループがフレームごとに確認する協調的キャンセルフラグ
///
/// クローンは同じフラグを共有するので、UIスレッド側で `cancel` できる。
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }
}
