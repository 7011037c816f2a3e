use serde::{Deserialize, Serialize};

/// 画像平面上の点（ピクセル座標）
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point2D {
    pub x: f64,
    pub y: f64,
}

impl Point2D {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn distance(&self, other: &Point2D) -> f64 {
        let dx = other.x - self.x;
        let dy = other.y - self.y;
        (dx * dx + dy * dy).sqrt()
    }

    pub fn sub(&self, other: &Point2D) -> Point2D {
        Point2D::new(self.x - other.x, self.y - other.y)
    }

    pub fn dot(&self, other: &Point2D) -> f64 {
        self.x * other.x + self.y * other.y
    }

    pub fn length(&self) -> f64 {
        self.dot(self).sqrt()
    }

    /// 単位ベクトル。長さ0ならNone
    pub fn normalized(&self) -> Option<Point2D> {
        let len = self.length();
        if len > 0.0 && len.is_finite() {
            Some(Point2D::new(self.x / len, self.y / len))
        } else {
            None
        }
    }

    /// a→b の線形補間 (t は 0.0..=1.0 を想定)
    pub fn lerp(a: &Point2D, b: &Point2D, t: f64) -> Point2D {
        Point2D::new((1.0 - t) * a.x + t * b.x, (1.0 - t) * a.y + t * b.y)
    }

    pub fn midpoint(a: &Point2D, b: &Point2D) -> Point2D {
        Self::lerp(a, b, 0.5)
    }
}
