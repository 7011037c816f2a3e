//! 解析1件分の状態を一箇所で所有する。
//!
//! 入力（キャリブレーション・トラック・時刻補正・体重）は丸ごと置き換え、
//! 置き換えるたびに品質と運動学を最初から計算し直す。部分的な差分更新はしない。

use chrono::NaiveDate;
use tracing::{info, warn};

use crate::calibration::Calibration;
use crate::config::Config;
use crate::error::{PipelineError, Result};
use crate::geometry::Point2D;
use crate::kinematics::{self, KinematicsResult, PerformanceRecord, TimeOverrides};
use crate::pose::{PoseEstimator, RegionHint};
use crate::timebase::{TimeUpdate, Timebase, TimebaseController, TrimOutcome};
use crate::tracking::{
    self, assess_quality, CancellationToken, ManualPoint, QualityAssessment, Track, TrackingMode,
    TrackingRunner,
};
use crate::video::FrameSource;

pub struct AnalysisSession {
    config: Config,
    timebase: TimebaseController,
    calibration: Option<Calibration>,
    region_hint: Option<RegionHint>,
    manual_points: Vec<ManualPoint>,
    track: Option<Track>,
    quality: Option<QualityAssessment>,
    overrides: TimeOverrides,
    mass_kg: Option<f64>,
    kinematics: Option<KinematicsResult>,
}

impl AnalysisSession {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            timebase: TimebaseController::new(),
            calibration: None,
            region_hint: None,
            manual_points: Vec::new(),
            track: None,
            quality: None,
            overrides: TimeOverrides::default(),
            mass_kg: None,
            kinematics: None,
        }
    }

    // --- 動画・タイムベース ---

    /// 新しい動画を読み込む。以前のトラック・手動ポイント・現場計測の時刻は破棄する
    pub fn load_video(&mut self, duration_sec: f64, fps: f64) -> Result<()> {
        self.timebase.load(duration_sec, fps)?;
        self.discard_track();
        self.overrides = TimeOverrides::default();
        Ok(())
    }

    /// トリム変更でフレーム番号の意味が変わるため、トラックも破棄する
    pub fn apply_trim(&mut self, start_frac: f64, end_frac: f64) -> Result<TrimOutcome> {
        let outcome = self.timebase.apply_trim(start_frac, end_frac)?;
        self.discard_track();
        Ok(outcome)
    }

    pub fn reset_trim(&mut self) -> Result<f64> {
        let media_time = self.timebase.reset_trim()?;
        self.discard_track();
        Ok(media_time)
    }

    pub fn seek_to_frame(&mut self, frame: i64) -> Option<f64> {
        self.timebase.seek_to_frame(frame)
    }

    pub fn step(&mut self, delta: i64) -> Option<f64> {
        self.timebase.step(delta)
    }

    pub fn on_time_update(&mut self, media_time: f64) -> TimeUpdate {
        self.timebase.on_time_update(media_time)
    }

    pub fn toggle_play(&mut self) -> Option<f64> {
        self.timebase.toggle_play()
    }

    pub fn timebase(&self) -> &TimebaseController {
        &self.timebase
    }

    fn loaded_timebase(&self) -> Result<Timebase> {
        self.timebase
            .timebase()
            .copied()
            .ok_or_else(|| PipelineError::invalid("no video loaded"))
    }

    pub fn fps(&self) -> Option<f64> {
        self.timebase.timebase().map(|tb| tb.fps)
    }

    fn discard_track(&mut self) {
        self.manual_points.clear();
        self.track = None;
        self.quality = None;
        self.kinematics = None;
    }

    // --- 入力の置き換え ---

    pub fn set_calibration(&mut self, calibration: Option<Calibration>) -> Result<()> {
        let kinematics = self.derive_with(calibration.as_ref(), self.track.as_ref(), &self.overrides, self.mass_kg);
        self.calibration = calibration;
        self.commit_kinematics(kinematics)
    }

    /// トラックを置き換え、品質と運動学を再計算する
    pub fn set_track(&mut self, track: Track) -> Result<()> {
        let quality = assess_quality(&track.frames, self.config.tracking.confidence_threshold, track.mode);
        let kinematics = self.derive_with(self.calibration.as_ref(), Some(&track), &self.overrides, self.mass_kg);
        if quality.recommends_manual() {
            warn!(
                "tracking quality {:?} (avg confidence {:.2}); manual tracking recommended",
                quality.rating, quality.avg_confidence
            );
        }
        self.track = Some(track);
        self.quality = Some(quality);
        self.commit_kinematics(kinematics)
    }

    /// 時刻補正を置き換える。導出できない補正は状態を変えずに拒否する
    pub fn set_overrides(&mut self, overrides: TimeOverrides) -> Result<()> {
        let kinematics = self.derive_with(self.calibration.as_ref(), self.track.as_ref(), &overrides, self.mass_kg)?;
        self.overrides = overrides;
        self.kinematics = kinematics;
        Ok(())
    }

    pub fn set_mass(&mut self, mass_kg: Option<f64>) -> Result<()> {
        let kinematics = self.derive_with(self.calibration.as_ref(), self.track.as_ref(), &self.overrides, mass_kg)?;
        self.mass_kg = mass_kg;
        self.kinematics = kinematics;
        Ok(())
    }

    pub fn set_region_hint(&mut self, hint: Option<RegionHint>) {
        self.region_hint = hint;
    }

    /// キャリブレーションとトラックが揃っていなければ None
    fn derive_with(
        &self,
        calibration: Option<&Calibration>,
        track: Option<&Track>,
        overrides: &TimeOverrides,
        mass_kg: Option<f64>,
    ) -> Result<Option<KinematicsResult>> {
        let (calibration, track, fps) = match (calibration, track, self.fps()) {
            (Some(c), Some(t), Some(fps)) => (c, t, fps),
            _ => return Ok(None),
        };
        kinematics::derive(&track.frames, Some(calibration), fps, overrides, mass_kg, &self.config.kinematics)
            .map(Some)
    }

    /// 導出に失敗しても入力の置き換え自体は有効。結果だけ破棄してエラーを返す
    fn commit_kinematics(&mut self, kinematics: Result<Option<KinematicsResult>>) -> Result<()> {
        match kinematics {
            Ok(result) => {
                self.kinematics = result;
                Ok(())
            }
            Err(e) => {
                warn!("kinematics not derived: {}", e);
                self.kinematics = None;
                Err(e)
            }
        }
    }

    // --- トラッキング ---

    /// 有効ウィンドウ全体をAIで追跡する。
    ///
    /// 成功した場合のみトラックを置き換える。キャンセル・失敗時は以前の状態がそのまま残る。
    pub fn run_tracking<S, E>(
        &mut self,
        source: &mut S,
        estimator: &mut E,
        on_progress: &mut dyn FnMut(f32),
        cancel: &CancellationToken,
    ) -> Result<&QualityAssessment>
    where
        S: FrameSource,
        E: PoseEstimator<Frame = S::Frame>,
    {
        let timebase = self.loaded_timebase()?;
        let mut runner = TrackingRunner::new(&self.config.tracking);
        if let Some(hint) = self.region_hint {
            runner = runner.with_region_hint(hint);
        }
        let frames = runner.run(source, estimator, &timebase, on_progress, cancel)?;

        self.manual_points.clear();
        self.set_track(Track::new(TrackingMode::Ai, frames))?;
        self.quality_or_err()
    }

    /// 手動キーフレームを追加する（範囲外のフレームはクランプ）
    pub fn add_manual_point(&mut self, frame: i64, point: Point2D) -> Result<()> {
        let timebase = self.loaded_timebase()?;
        let frame = timebase.clamp_frame(frame);
        self.manual_points.push(ManualPoint::new(frame, point));
        Ok(())
    }

    pub fn manual_points(&self) -> &[ManualPoint] {
        &self.manual_points
    }

    pub fn clear_manual_points(&mut self) {
        self.manual_points.clear();
    }

    /// 手動キーフレームを補間してトラックを置き換える
    pub fn interpolate_manual(&mut self) -> Result<&QualityAssessment> {
        let timebase = self.loaded_timebase()?;
        let frames = tracking::interpolate_manual(&self.manual_points, timebase.fps)?;
        info!(
            "manual track: {} keyframes, {} frames",
            self.manual_points.len(),
            frames.len()
        );
        self.set_track(Track::new(TrackingMode::Manual, frames))?;
        self.quality_or_err()
    }

    /// 1フレームの点を修正してトラックを置き換える
    pub fn apply_adjustment(&mut self, frame: usize, point: Point2D) -> Result<()> {
        let track = self
            .track
            .as_ref()
            .ok_or_else(|| PipelineError::invalid("no track to adjust"))?;
        let frames = tracking::apply_adjustment(&track.frames, frame, point)?;
        let mode = track.mode;
        self.set_track(Track::new(mode, frames))
    }

    fn quality_or_err(&self) -> Result<&QualityAssessment> {
        self.quality
            .as_ref()
            .ok_or_else(|| PipelineError::invalid("no track"))
    }

    // --- 参照 ---

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn calibration(&self) -> Option<&Calibration> {
        self.calibration.as_ref()
    }

    pub fn track(&self) -> Option<&Track> {
        self.track.as_ref()
    }

    pub fn quality(&self) -> Option<&QualityAssessment> {
        self.quality.as_ref()
    }

    pub fn overrides(&self) -> &TimeOverrides {
        &self.overrides
    }

    pub fn mass_kg(&self) -> Option<f64> {
        self.mass_kg
    }

    pub fn kinematics(&self) -> Option<&KinematicsResult> {
        self.kinematics.as_ref()
    }

    pub fn performance_record(&self, date: NaiveDate, drill_name: &str) -> Option<PerformanceRecord> {
        self.kinematics
            .as_ref()
            .map(|result| PerformanceRecord::from_result(date, drill_name, result))
    }
}
