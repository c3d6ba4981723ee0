use serde::{Deserialize, Serialize};

/// Axis-aligned box in image pixel space, `x1 < x2` and `y1 < y2` once validated.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "[f32; 4]", into = "[f32; 4]")]
pub struct BoxPx {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
}

impl BoxPx {
    pub fn new(x1: f32, y1: f32, x2: f32, y2: f32) -> Self {
        Self { x1, y1, x2, y2 }
    }

    pub fn width(&self) -> f32 {
        self.x2 - self.x1
    }

    pub fn height(&self) -> f32 {
        self.y2 - self.y1
    }

    pub fn area(&self) -> f32 {
        self.width() * self.height()
    }

    /// Longer side over shorter side; the shorter side is floored at one pixel.
    pub fn aspect_ratio(&self) -> f32 {
        let w = self.width();
        let h = self.height();
        w.max(h) / w.min(h).max(1.0)
    }

    pub fn is_degenerate(&self) -> bool {
        !(self.x1.is_finite() && self.y1.is_finite() && self.x2.is_finite() && self.y2.is_finite())
            || self.width() <= 0.0
            || self.height() <= 0.0
    }

    /// Integer pixel rectangle `(x, y, w, h)` clipped to an image of the given size.
    /// Coordinates are truncated toward zero.
    pub(crate) fn pixel_rect(&self, width: u32, height: u32) -> Option<(u32, u32, u32, u32)> {
        let x1 = (self.x1.max(0.0) as u32).min(width);
        let y1 = (self.y1.max(0.0) as u32).min(height);
        let x2 = (self.x2.max(0.0) as u32).min(width);
        let y2 = (self.y2.max(0.0) as u32).min(height);
        if x2 <= x1 || y2 <= y1 {
            return None;
        }
        Some((x1, y1, x2 - x1, y2 - y1))
    }
}

impl From<[f32; 4]> for BoxPx {
    fn from(value: [f32; 4]) -> Self {
        Self::new(value[0], value[1], value[2], value[3])
    }
}

impl From<BoxPx> for [f32; 4] {
    fn from(value: BoxPx) -> Self {
        [value.x1, value.y1, value.x2, value.y2]
    }
}

pub fn iou(a: &BoxPx, b: &BoxPx) -> f32 {
    let ix1 = a.x1.max(b.x1);
    let iy1 = a.y1.max(b.y1);
    let ix2 = a.x2.min(b.x2);
    let iy2 = a.y2.min(b.y2);

    if ix2 < ix1 || iy2 < iy1 {
        return 0.0;
    }
    let inter = (ix2 - ix1) * (iy2 - iy1);
    let union = a.area() + b.area() - inter;
    if union > 0.0 { inter / union } else { 0.0 }
}

/// Pure geometric enclosure: every edge of `inner` lies within `margin` pixels
/// of the inside of `outer`. No area check.
pub fn encloses(outer: &BoxPx, inner: &BoxPx, margin: f32) -> bool {
    outer.x1 <= inner.x1 + margin
        && outer.y1 <= inner.y1 + margin
        && outer.x2 >= inner.x2 - margin
        && outer.y2 >= inner.y2 - margin
}

/// Parent/child containment: enclosure within `margin` and `outer` more than
/// twice the area of `inner`, so two similar boxes never contain each other.
pub fn contains(outer: &BoxPx, inner: &BoxPx, margin: f32) -> bool {
    encloses(outer, inner, margin) && outer.area() > inner.area() * 2.0
}

/// True when the boxes differ in area by at least `size_ratio` and the smaller
/// one sits inside the larger within `margin` pixels.
pub fn is_nested(a: &BoxPx, b: &BoxPx, size_ratio: f32, margin: f32) -> bool {
    let area_a = a.area();
    let area_b = b.area();
    if area_a.min(area_b) <= 0.0 {
        return false;
    }
    if area_a.max(area_b) / area_a.min(area_b) < size_ratio {
        return false;
    }
    let (outer, inner) = if area_a >= area_b { (a, b) } else { (b, a) };
    encloses(outer, inner, margin)
}
