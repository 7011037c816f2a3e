use serde::{Deserialize, Serialize};

use crate::calibration::Topology;
use crate::units::Unit;

/// ドリルのプリセット
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DrillTemplate {
    pub name: String,
    pub topology: Topology,
    #[serde(default)]
    pub marker_labels: Vec<String>,
    /// 事前入力する基準距離（キャリブレーション単位）
    #[serde(default)]
    pub reference_distance: Option<f64>,
    #[serde(default)]
    pub unit: Unit,
    /// このドリルで計測するスプリット距離。空なら設定値を使う
    #[serde(default)]
    pub split_distances: Vec<f64>,
}

impl DrillTemplate {
    fn preset(
        name: &str,
        topology: Topology,
        labels: &[&str],
        reference_distance: Option<f64>,
        unit: Unit,
        splits: &[f64],
    ) -> Self {
        Self {
            name: name.to_string(),
            topology,
            marker_labels: labels.iter().map(|s| s.to_string()).collect(),
            reference_distance,
            unit,
            split_distances: splits.to_vec(),
        }
    }
}

/// 組み込みプリセット
pub fn builtin_templates() -> Vec<DrillTemplate> {
    vec![
        DrillTemplate::preset(
            "40-yard dash",
            Topology::TwoPoint,
            &["Start", "Finish"],
            Some(40.0),
            Unit::Yards,
            &[10.0, 20.0, 40.0],
        ),
        DrillTemplate::preset(
            "10m sprint",
            Topology::TwoPoint,
            &["Start", "10m"],
            Some(10.0),
            Unit::Meters,
            &[5.0, 10.0],
        ),
        DrillTemplate::preset(
            "Pro agility (5-10-5)",
            Topology::ThreePointAngled,
            &["Left cone", "Center", "Right cone"],
            Some(5.0),
            Unit::Yards,
            &[],
        ),
        DrillTemplate::preset(
            "L-drill (3-cone)",
            Topology::ThreePointL,
            &["Cone 1", "Cone 2", "Cone 3"],
            Some(5.0),
            Unit::Yards,
            &[],
        ),
        DrillTemplate::preset(
            "Broad jump",
            Topology::FourPointQuad,
            &["Takeoff near", "Takeoff far", "Landing far", "Landing near"],
            None,
            Unit::Feet,
            &[],
        ),
    ]
}

/// 組み込み + 設定ファイルのドリル。同名なら設定側を優先
pub fn all_templates(extra: &[DrillTemplate]) -> Vec<DrillTemplate> {
    let mut templates: Vec<DrillTemplate> = builtin_templates()
        .into_iter()
        .filter(|t| !extra.iter().any(|e| e.name == t.name))
        .collect();
    templates.extend(extra.iter().cloned());
    templates
}

pub fn find_template<'a>(templates: &'a [DrillTemplate], name: &str) -> Option<&'a DrillTemplate> {
    templates.iter().find(|t| t.name.eq_ignore_ascii_case(name))
}
