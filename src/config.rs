use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::Path;
use tracing::warn;

use crate::drill::DrillTemplate;
use crate::kinematics::{PositionOrigin, Smoothing};

#[derive(Debug, Deserialize, Default, Clone)]
pub struct Config {
    #[serde(default)]
    pub tracking: TrackingConfig,
    #[serde(default)]
    pub kinematics: KinematicsConfig,
    /// 組み込みプリセットに追加するドリル
    #[serde(default)]
    pub drills: Vec<DrillTemplate>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct TrackingConfig {
    /// この値未満の信頼度のフレームは欠損扱い
    #[serde(default = "default_confidence_threshold")]
    pub confidence_threshold: f32,
    /// 前フレームのキーポイントから次フレームの領域ヒントを作る
    #[serde(default = "default_follow_subject")]
    pub follow_subject: bool,
    /// 領域ヒント用キーポイントの最小信頼度
    #[serde(default = "default_hint_confidence")]
    pub hint_confidence: f32,
}

fn default_confidence_threshold() -> f32 { 0.3 }
fn default_follow_subject() -> bool { true }
fn default_hint_confidence() -> f32 { 0.3 }

impl Default for TrackingConfig {
    fn default() -> Self {
        Self {
            confidence_threshold: default_confidence_threshold(),
            follow_subject: default_follow_subject(),
            hint_confidence: default_hint_confidence(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct KinematicsConfig {
    /// スプリット計測距離（キャリブレーション単位）
    #[serde(default = "default_split_distances")]
    pub split_distances: Vec<f64>,
    #[serde(default)]
    pub origin: PositionOrigin,
    #[serde(default)]
    pub smoothing: Smoothing,
}

fn default_split_distances() -> Vec<f64> { vec![10.0, 20.0, 30.0, 40.0] }

impl Default for KinematicsConfig {
    fn default() -> Self {
        Self {
            split_distances: default_split_distances(),
            origin: PositionOrigin::default(),
            smoothing: Smoothing::default(),
        }
    }
}

impl Config {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content).context("Failed to parse config")?;
        Ok(config)
    }

    /// 読み込みに失敗したらデフォルト設定を使う
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Self {
        match Self::load(path.as_ref()) {
            Ok(config) => config,
            Err(e) => {
                warn!("{:#}; using default config", e);
                Self::default()
            }
        }
    }
}
