use anyhow::{Context, Result};
use opencv::{
    core::Mat,
    prelude::*,
    videoio::{self, VideoCapture, VideoCaptureAPIs, VideoCaptureTrait},
};
use std::path::Path;
use tracing::info;

use super::FrameSource;

/// OpenCVで動画ファイルを読み込むフレームソース
pub struct OpenCvVideoSource {
    capture: VideoCapture,
    width: u32,
    height: u32,
    fps: f64,
    duration_sec: f64,
}

impl OpenCvVideoSource {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let path_str = path
            .to_str()
            .with_context(|| format!("Non UTF-8 video path: {}", path.display()))?;
        let capture = VideoCapture::from_file(path_str, VideoCaptureAPIs::CAP_ANY as i32)
            .context("Failed to open video")?;

        if !capture.is_opened()? {
            anyhow::bail!("Video {} could not be opened", path.display());
        }

        let width = capture.get(videoio::CAP_PROP_FRAME_WIDTH)? as u32;
        let height = capture.get(videoio::CAP_PROP_FRAME_HEIGHT)? as u32;
        let fps = capture.get(videoio::CAP_PROP_FPS)?;
        let frame_count = capture.get(videoio::CAP_PROP_FRAME_COUNT)?;
        if !(fps > 0.0) {
            anyhow::bail!("Video {} reports invalid fps {}", path.display(), fps);
        }
        let duration_sec = frame_count / fps;
        info!(
            "Video: {}x{} @ {:.2}fps, {:.2}s",
            width, height, fps, duration_sec
        );

        Ok(Self {
            capture,
            width,
            height,
            fps,
            duration_sec,
        })
    }

    pub fn fps(&self) -> f64 {
        self.fps
    }

    pub fn duration_sec(&self) -> f64 {
        self.duration_sec
    }
}

impl FrameSource for OpenCvVideoSource {
    type Frame = Mat;

    fn frame_size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn read_frame(&mut self, media_time_sec: f64) -> Result<Mat> {
        self.capture
            .set(videoio::CAP_PROP_POS_MSEC, media_time_sec * 1000.0)
            .context("Failed to seek video")?;

        let mut frame = Mat::default();
        self.capture
            .read(&mut frame)
            .context("Failed to read frame")?;

        if frame.empty() {
            anyhow::bail!("Empty frame at {:.3}s", media_time_sec);
        }
        Ok(frame)
    }
}
