//! 連続的な再生時刻と、トリム後の離散フレームインデックスの対応を管理する。
//!
//! フレーム↔時刻の変換はここだけで行い、他のモジュールはフレームインデックスのみを扱う。

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{PipelineError, Result};

/// 浮動小数点の丸めで floor が1フレーム手前に落ちるのを防ぐ
const FRAME_EPSILON: f64 = 1e-6;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Timebase {
    pub native_duration_sec: f64,
    pub fps: f64,
    pub trim_start_sec: f64,
    pub trim_end_sec: f64,
    pub is_trim_applied: bool,
}

impl Timebase {
    /// 有効ウィンドウ [start, end)
    pub fn effective_window(&self) -> (f64, f64) {
        if self.is_trim_applied {
            (self.trim_start_sec, self.trim_end_sec)
        } else {
            (0.0, self.native_duration_sec)
        }
    }

    pub fn effective_duration(&self) -> f64 {
        let (start, end) = self.effective_window();
        end - start
    }

    pub fn total_frames(&self) -> usize {
        (self.effective_duration() * self.fps + FRAME_EPSILON).floor().max(0.0) as usize
    }

    /// ウィンドウ先頭からの相対時刻
    pub fn frame_to_time(&self, frame: usize) -> f64 {
        frame as f64 / self.fps
    }

    /// 動画ネイティブの再生時刻
    pub fn frame_to_media_time(&self, frame: usize) -> f64 {
        self.effective_window().0 + self.frame_to_time(frame)
    }

    /// 再生時刻 → フレーム（有効ウィンドウ内にクランプ）
    pub fn media_time_to_frame(&self, media_time: f64) -> usize {
        let (start, _) = self.effective_window();
        let raw = ((media_time - start) * self.fps + FRAME_EPSILON).floor();
        self.clamp_frame(raw as i64)
    }

    pub fn clamp_frame(&self, frame: i64) -> usize {
        let last = self.total_frames().saturating_sub(1) as i64;
        frame.clamp(0, last) as usize
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PlaybackState {
    Idle,
    Loaded,
    Playing,
    Paused,
}

/// 再生時刻リスナーの判定結果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeUpdate {
    /// 未ロード
    Ignored,
    /// プログラムによるシークの反映。操作として扱わない
    SeekEcho { frame: usize },
    /// 再生中の進行
    Advanced { frame: usize },
    /// 停止中にオペレーターがスクラブした
    Scrubbed { frame: usize },
    /// 再生中にトリム終端に達したので一時停止した
    BoundaryReached { frame: usize },
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrimOutcome {
    pub applied: bool,
    /// ホスト側プレイヤーがシークすべき再生時刻
    pub seek_to: f64,
}

#[derive(Debug, Clone)]
pub struct TimebaseController {
    state: PlaybackState,
    timebase: Option<Timebase>,
    current_frame: usize,
    /// プログラムシーク直後の再生時刻通知を1回だけ無視する
    seek_guard: bool,
}

impl Default for TimebaseController {
    fn default() -> Self {
        Self::new()
    }
}

impl TimebaseController {
    pub fn new() -> Self {
        Self {
            state: PlaybackState::Idle,
            timebase: None,
            current_frame: 0,
            seek_guard: false,
        }
    }

    /// 動画を読み込み、トリムを全範囲にリセット
    pub fn load(&mut self, duration_sec: f64, fps: f64) -> Result<()> {
        if !(duration_sec > 0.0) || !duration_sec.is_finite() {
            return Err(PipelineError::invalid(format!("invalid duration {}", duration_sec)));
        }
        if !(fps > 0.0) || !fps.is_finite() {
            return Err(PipelineError::invalid(format!("invalid fps {}", fps)));
        }
        self.timebase = Some(Timebase {
            native_duration_sec: duration_sec,
            fps,
            trim_start_sec: 0.0,
            trim_end_sec: duration_sec,
            is_trim_applied: false,
        });
        self.state = PlaybackState::Loaded;
        self.current_frame = 0;
        self.seek_guard = false;
        debug!("loaded media: {:.3}s @ {}fps", duration_sec, fps);
        Ok(())
    }

    fn loaded(&self) -> Result<Timebase> {
        self.timebase
            .ok_or_else(|| PipelineError::invalid("no media loaded"))
    }

    /// ネイティブ長に対する割合でトリムを適用する。
    ///
    /// トリム適用中に再度呼ぶとトリムを解除する（`reset_trim` と同じ）。
    pub fn apply_trim(&mut self, start_frac: f64, end_frac: f64) -> Result<TrimOutcome> {
        let tb = self.loaded()?;
        if tb.is_trim_applied {
            let seek_to = self.reset_trim()?;
            return Ok(TrimOutcome {
                applied: false,
                seek_to,
            });
        }
        if !(0.0..=1.0).contains(&start_frac)
            || !(0.0..=1.0).contains(&end_frac)
            || start_frac >= end_frac
        {
            return Err(PipelineError::invalid(format!(
                "trim fractions must satisfy 0 <= start < end <= 1, got {}..{}",
                start_frac, end_frac
            )));
        }

        let trimmed = Timebase {
            trim_start_sec: start_frac * tb.native_duration_sec,
            trim_end_sec: end_frac * tb.native_duration_sec,
            is_trim_applied: true,
            ..tb
        };
        if trimmed.total_frames() == 0 {
            return Err(PipelineError::invalid("trim window is shorter than one frame"));
        }
        debug!(
            "trim applied: {:.3}s..{:.3}s ({} frames)",
            trimmed.trim_start_sec,
            trimmed.trim_end_sec,
            trimmed.total_frames()
        );
        self.timebase = Some(trimmed);
        let seek_to = self.seek_to_frame(0).unwrap_or(trimmed.trim_start_sec);
        Ok(TrimOutcome {
            applied: true,
            seek_to,
        })
    }

    /// トリムを解除。再生位置のネイティブ時刻は保持する
    pub fn reset_trim(&mut self) -> Result<f64> {
        let tb = self.loaded()?;
        let media_time = tb.frame_to_media_time(self.current_frame);
        let full = Timebase {
            trim_start_sec: 0.0,
            trim_end_sec: tb.native_duration_sec,
            is_trim_applied: false,
            ..tb
        };
        self.timebase = Some(full);
        let frame = full.media_time_to_frame(media_time);
        Ok(self.seek_to_frame(frame as i64).unwrap_or(media_time))
    }

    /// フレームへシーク（範囲外はクランプ）。プレイヤーに渡す再生時刻を返す
    pub fn seek_to_frame(&mut self, frame: i64) -> Option<f64> {
        let tb = self.timebase?;
        self.current_frame = tb.clamp_frame(frame);
        self.seek_guard = true;
        Some(tb.frame_to_media_time(self.current_frame))
    }

    pub fn step(&mut self, delta: i64) -> Option<f64> {
        let target = self.current_frame as i64 + delta;
        self.seek_to_frame(target)
    }

    /// 通常の再生時刻リスナー
    pub fn on_time_update(&mut self, media_time: f64) -> TimeUpdate {
        let tb = match self.timebase {
            Some(tb) => tb,
            None => return TimeUpdate::Ignored,
        };

        if self.seek_guard {
            self.seek_guard = false;
            return TimeUpdate::SeekEcho {
                frame: self.current_frame,
            };
        }

        let frame = tb.media_time_to_frame(media_time);
        let (_, end) = tb.effective_window();
        match self.state {
            PlaybackState::Playing if media_time >= end => {
                self.current_frame = tb.clamp_frame(i64::MAX);
                self.state = PlaybackState::Paused;
                TimeUpdate::BoundaryReached {
                    frame: self.current_frame,
                }
            }
            PlaybackState::Playing => {
                self.current_frame = frame;
                TimeUpdate::Advanced { frame }
            }
            _ => {
                self.current_frame = frame;
                TimeUpdate::Scrubbed { frame }
            }
        }
    }

    /// 再生/一時停止を切り替える。終端から再開する場合は先頭へ巻き戻し、その再生時刻を返す
    pub fn toggle_play(&mut self) -> Option<f64> {
        let tb = self.timebase?;
        match self.state {
            PlaybackState::Playing => {
                self.state = PlaybackState::Paused;
                None
            }
            _ => {
                self.state = PlaybackState::Playing;
                if self.current_frame + 1 >= tb.total_frames() {
                    self.seek_to_frame(0)
                } else {
                    None
                }
            }
        }
    }

    pub fn state(&self) -> PlaybackState {
        self.state
    }

    pub fn timebase(&self) -> Option<&Timebase> {
        self.timebase.as_ref()
    }

    pub fn is_trim_applied(&self) -> bool {
        self.timebase.map(|tb| tb.is_trim_applied).unwrap_or(false)
    }

    pub fn current_frame(&self) -> usize {
        self.current_frame
    }

    /// 現在フレームのウィンドウ相対時刻
    pub fn current_time(&self) -> Option<f64> {
        self.timebase.map(|tb| tb.frame_to_time(self.current_frame))
    }

    pub fn total_frames(&self) -> usize {
        self.timebase.map(|tb| tb.total_frames()).unwrap_or(0)
    }
}
