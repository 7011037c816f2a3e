use serde::{Deserialize, Serialize};

/// 標準重力加速度 (m/s²)
pub const STANDARD_GRAVITY_MPS2: f64 = 9.80665;

const METERS_PER_FOOT: f64 = 0.3048;
const METERS_PER_YARD: f64 = 0.9144;
const KMH_PER_MPS: f64 = 3.6;
const MPH_PER_MPS: f64 = 2.236_936_292_054_402;

/// キャリブレーション距離の単位
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Unit {
    #[default]
    Meters,
    Yards,
    Feet,
}

impl Unit {
    /// 1単位あたりのメートル
    pub fn meters_per_unit(self) -> f64 {
        match self {
            Unit::Meters => 1.0,
            Unit::Yards => METERS_PER_YARD,
            Unit::Feet => METERS_PER_FOOT,
        }
    }

    /// 同じ単位系での重力加速度 (unit/s²)
    pub fn gravity(self) -> f64 {
        STANDARD_GRAVITY_MPS2 / self.meters_per_unit()
    }

    /// unit/s → 表示用速度 (メートル系は km/h, ヤード・フィートは mph)
    pub fn to_display_speed(self, units_per_sec: f64) -> f64 {
        let mps = units_per_sec * self.meters_per_unit();
        match self {
            Unit::Meters => mps * KMH_PER_MPS,
            Unit::Yards | Unit::Feet => mps * MPH_PER_MPS,
        }
    }

    pub fn display_speed_label(self) -> &'static str {
        match self {
            Unit::Meters => "km/h",
            Unit::Yards | Unit::Feet => "mph",
        }
    }

    pub fn symbol(self) -> &'static str {
        match self {
            Unit::Meters => "m",
            Unit::Yards => "yd",
            Unit::Feet => "ft",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gravity_in_units() {
        assert!((Unit::Meters.gravity() - 9.80665).abs() < 1e-9);
        assert!((Unit::Feet.gravity() - 32.174).abs() < 1e-3);
        assert!((Unit::Yards.gravity() - 10.7247).abs() < 1e-3);
    }

    #[test]
    fn test_display_speed() {
        // 10 m/s = 36 km/h
        assert!((Unit::Meters.to_display_speed(10.0) - 36.0).abs() < 1e-9);
        // 1 yd/s = 0.9144 m/s ≈ 2.045 mph
        assert!((Unit::Yards.to_display_speed(1.0) - 2.0455).abs() < 1e-3);
        assert_eq!(Unit::Feet.display_speed_label(), "mph");
    }
}
