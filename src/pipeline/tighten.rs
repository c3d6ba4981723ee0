use image::GrayImage;
use tracing::{debug, warn};

use super::config::PipelineConfig;
use super::geom::BoxPx;
use super::segment::Segment;

const MIN_TIGHTEN_DIM: f32 = 10.0;

/// Shrinks each box inward to its visible content, probing every side against
/// the median intensity of the box's outer ring.
pub fn tighten_boxes(
    segments: Vec<Segment>,
    gray: &GrayImage,
    config: &PipelineConfig,
) -> Vec<Segment> {
    segments
        .into_iter()
        .filter_map(|seg| {
            let b = seg.box_pixels;
            if b.width() < MIN_TIGHTEN_DIM || b.height() < MIN_TIGHTEN_DIM {
                return Some(seg);
            }
            let Some(rect) = b.pixel_rect(gray.width(), gray.height()) else {
                warn!("tighten: dropping box outside image {:?}", <[f32; 4]>::from(b));
                return None;
            };
            match tightened_box(gray, rect, config) {
                Some(tight) => {
                    debug!(
                        "tighten: {:?} -> {:?}",
                        <[f32; 4]>::from(b),
                        <[f32; 4]>::from(tight)
                    );
                    Some(seg.with_box(tight))
                }
                None => Some(seg),
            }
        })
        .collect()
}

/// Returns the trimmed box, or `None` when nothing was trimmed or the result
/// would break the size or aspect limits.
fn tightened_box(
    gray: &GrayImage,
    (x, y, w, h): (u32, u32, u32, u32),
    config: &PipelineConfig,
) -> Option<BoxPx> {
    let crop = Crop { gray, x, y, w, h };
    let max_trim_x = (w as f32 * config.tighten_margin) as u32;
    let max_trim_y = (h as f32 * config.tighten_margin) as u32;
    let bg = crop.border_median();
    let threshold = config.tighten_bg_threshold;

    let mut trim_left = 0;
    for col in 0..max_trim_x.min(w - 1) {
        if crop.column_deviation(col, bg) > threshold {
            break;
        }
        trim_left = col + 1;
    }

    let mut trim_right = 0;
    for col in ((w - 1).saturating_sub(max_trim_x) + 1..w).rev() {
        if crop.column_deviation(col, bg) > threshold {
            break;
        }
        trim_right = w - col;
    }

    let mut trim_top = 0;
    for row in 0..max_trim_y.min(h - 1) {
        if crop.row_deviation(row, bg) > threshold {
            break;
        }
        trim_top = row + 1;
    }

    let mut trim_bottom = 0;
    for row in ((h - 1).saturating_sub(max_trim_y) + 1..h).rev() {
        if crop.row_deviation(row, bg) > threshold {
            break;
        }
        trim_bottom = h - row;
    }

    if trim_left + trim_right + trim_top + trim_bottom == 0 {
        return None;
    }

    let tight = BoxPx::new(
        (x + trim_left) as f32,
        (y + trim_top) as f32,
        (x + w).saturating_sub(trim_right) as f32,
        (y + h).saturating_sub(trim_bottom) as f32,
    );
    if tight.width() < config.min_dimension || tight.height() < config.min_dimension {
        return None;
    }
    if tight.aspect_ratio() > config.max_aspect_ratio {
        return None;
    }
    Some(tight)
}

struct Crop<'a> {
    gray: &'a GrayImage,
    x: u32,
    y: u32,
    w: u32,
    h: u32,
}

impl Crop<'_> {
    fn at(&self, col: u32, row: u32) -> f32 {
        self.gray.get_pixel(self.x + col, self.y + row)[0] as f32
    }

    fn border_median(&self) -> f32 {
        let mut ring = Vec::with_capacity(2 * (self.w + self.h) as usize);
        for col in 0..self.w {
            ring.push(self.at(col, 0));
            ring.push(self.at(col, self.h - 1));
        }
        for row in 0..self.h {
            ring.push(self.at(0, row));
            ring.push(self.at(self.w - 1, row));
        }
        median(&mut ring)
    }

    fn column_deviation(&self, col: u32, bg: f32) -> f32 {
        let sum: f32 = (0..self.h).map(|row| (self.at(col, row) - bg).abs()).sum();
        sum / self.h as f32
    }

    fn row_deviation(&self, row: u32, bg: f32) -> f32 {
        let sum: f32 = (0..self.w).map(|col| (self.at(col, row) - bg).abs()).sum();
        sum / self.w as f32
    }
}

fn median(values: &mut [f32]) -> f32 {
    if values.is_empty() {
        return 0.0;
    }
    values.sort_by(|a, b| a.total_cmp(b));
    let mid = values.len() / 2;
    if values.len() % 2 == 0 {
        (values[mid - 1] + values[mid]) / 2.0
    } else {
        values[mid]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;

    /// White canvas with a black-outlined gray rectangle spanning `[x1, x2) x [y1, y2)`.
    fn canvas_with_rect(x1: u32, y1: u32, x2: u32, y2: u32) -> GrayImage {
        let mut img = GrayImage::from_pixel(300, 200, Luma([255]));
        for y in y1..y2 {
            for x in x1..x2 {
                let edge = x < x1 + 2 || x >= x2 - 2 || y < y1 + 2 || y >= y2 - 2;
                img.put_pixel(x, y, Luma([if edge { 0 } else { 190 }]));
            }
        }
        img
    }

    #[test]
    fn shrinks_overextended_box_to_content() {
        let gray = canvas_with_rect(60, 60, 160, 120);
        let seg = Segment::new(BoxPx::new(50.0, 50.0, 170.0, 130.0), 0.9);
        let out = tighten_boxes(vec![seg], &gray, &PipelineConfig::default());
        assert_eq!(out[0].box_pixels, BoxPx::new(60.0, 60.0, 160.0, 120.0));
        assert_eq!(out[0].area_pixels, 6000.0);
        assert_eq!(out[0].confidence, 0.9);
    }

    #[test]
    fn trim_is_capped_per_side() {
        // 30px of padding on each side; 15% of 160 is 24 and 15% of 120 is 18
        let gray = canvas_with_rect(70, 50, 170, 110);
        let seg = Segment::new(BoxPx::new(40.0, 20.0, 200.0, 140.0), 0.9);
        let out = tighten_boxes(vec![seg], &gray, &PipelineConfig::default());
        assert_eq!(out[0].box_pixels, BoxPx::new(64.0, 38.0, 176.0, 122.0));
    }

    #[test]
    fn keeps_original_when_tight_box_would_be_too_small() {
        let gray = canvas_with_rect(100, 100, 120, 120);
        let original = BoxPx::new(95.0, 95.0, 125.0, 125.0);
        let seg = Segment::new(original, 0.9);
        let out = tighten_boxes(vec![seg], &gray, &PipelineConfig::default());
        assert_eq!(out[0].box_pixels, original);
    }

    #[test]
    fn textured_box_is_untouched() {
        let gray = GrayImage::from_fn(300, 200, |x, y| Luma([if (x + y) % 2 == 0 { 0 } else { 255 }]));
        let original = BoxPx::new(60.5, 60.0, 160.0, 120.0);
        let out = tighten_boxes(
            vec![Segment::new(original, 0.7)],
            &gray,
            &PipelineConfig::default(),
        );
        assert_eq!(out[0].box_pixels, original);
    }

    #[test]
    fn tiny_boxes_pass_through() {
        let gray = canvas_with_rect(60, 60, 160, 120);
        let original = BoxPx::new(0.0, 0.0, 8.0, 40.0);
        let out = tighten_boxes(
            vec![Segment::new(original, 0.7)],
            &gray,
            &PipelineConfig::default(),
        );
        assert_eq!(out[0].box_pixels, original);
    }

    #[test]
    fn boxes_outside_the_image_are_dropped() {
        let gray = canvas_with_rect(60, 60, 160, 120);
        let out = tighten_boxes(
            vec![Segment::new(BoxPx::new(400.0, 10.0, 450.0, 60.0), 0.7)],
            &gray,
            &PipelineConfig::default(),
        );
        assert!(out.is_empty());
    }

    #[test]
    fn median_of_even_count_averages_middle_pair() {
        assert_eq!(median(&mut [4.0, 1.0, 3.0, 2.0]), 2.5);
        assert_eq!(median(&mut [9.0, 1.0, 5.0]), 5.0);
    }
}
