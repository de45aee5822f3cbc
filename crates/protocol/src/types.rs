use serde::{Deserialize, Serialize};

/// Axis-aligned rectangle in origin + extent form.
///
/// Traces usually describe rectangles as `left/top/right/bottom`; use
/// [`Rect::from_ltrb`] to convert.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub w: f64,
    pub h: f64,
}

impl Rect {
    pub fn new(x: f64, y: f64, w: f64, h: f64) -> Self {
        Self { x, y, w, h }
    }

    pub fn from_ltrb(left: f64, top: f64, right: f64, bottom: f64) -> Self {
        Self {
            x: left,
            y: top,
            w: right - left,
            h: bottom - top,
        }
    }

    pub fn right(&self) -> f64 {
        self.x + self.w
    }

    pub fn bottom(&self) -> f64 {
        self.y + self.h
    }

    /// A rectangle with no area covers nothing.
    pub fn is_empty(&self) -> bool {
        self.w <= 0.0 || self.h <= 0.0
    }

    pub fn contains_rect(&self, other: &Rect) -> bool {
        !self.is_empty()
            && !other.is_empty()
            && self.x <= other.x
            && self.y <= other.y
            && self.right() >= other.right()
            && self.bottom() >= other.bottom()
    }

    pub fn intersects_rect(&self, other: &Rect) -> bool {
        !self.is_empty()
            && !other.is_empty()
            && self.x < other.right()
            && other.x < self.right()
            && self.y < other.bottom()
            && other.y < self.bottom()
    }

    /// Intersection of the two rectangles; empty when they do not overlap.
    pub fn crop_rect(&self, crop: &Rect) -> Rect {
        let left = self.x.max(crop.x);
        let top = self.y.max(crop.y);
        let right = self.right().min(crop.right());
        let bottom = self.bottom().min(crop.bottom());
        if right <= left || bottom <= top {
            return Rect::new(0.0, 0.0, 0.0, 0.0);
        }
        Rect::from_ltrb(left, top, right, bottom)
    }

    pub fn is_almost_equal(&self, other: &Rect, eps: f64) -> bool {
        (self.x - other.x).abs() <= eps
            && (self.y - other.y).abs() <= eps
            && (self.w - other.w).abs() <= eps
            && (self.h - other.h).abs() <= eps
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Color {
    pub r: f32,
    pub g: f32,
    pub b: f32,
    pub a: f32,
}

impl Color {
    pub fn rgba(r: f32, g: f32, b: f32, a: f32) -> Self {
        Self { r, g, b, a }
    }

    /// Surface-flinger reports "no color" as negative channels or zero alpha.
    pub fn is_empty(&self) -> bool {
        self.a == 0.0 || self.r < 0.0 || self.g < 0.0 || self.b < 0.0
    }
}
