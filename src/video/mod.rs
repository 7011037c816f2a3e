#[cfg(feature = "desktop")]
pub mod capture;

use anyhow::Result;

#[cfg(feature = "desktop")]
pub use capture::OpenCvVideoSource;

/// 解析対象の動画からフレーム画像を取り出す
pub trait FrameSource {
    type Frame;

    /// フレームの幅と高さ（ピクセル）
    fn frame_size(&self) -> (u32, u32);

    /// 動画ネイティブの再生時刻（秒）のフレームを読む
    fn read_frame(&mut self, media_time_sec: f64) -> Result<Self::Frame>;
}
