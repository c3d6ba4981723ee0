use image::GrayImage;
use tracing::{debug, warn};

use super::config::PipelineConfig;
use super::segment::Segment;

/// Rejects small, visually flat boxes. Large boxes always pass since solid
/// blocks are legitimate components.
pub fn filter_by_visual_complexity(
    segments: Vec<Segment>,
    gray: &GrayImage,
    config: &PipelineConfig,
) -> Vec<Segment> {
    let image_area = gray.width() as f32 * gray.height() as f32;
    segments
        .into_iter()
        .filter(|seg| {
            let area_ratio = seg.area_pixels / image_area;
            if area_ratio >= config.complexity_bypass_area {
                return true;
            }
            let Some((x, y, w, h)) = seg.box_pixels.pixel_rect(gray.width(), gray.height())
            else {
                warn!(
                    "complexity: dropping box outside image {:?}",
                    <[f32; 4]>::from(seg.box_pixels)
                );
                return false;
            };
            let stats = RegionStats::measure(gray, x, y, w, h, config.edge_pixel_delta);
            let keep = stats.std_dev > config.min_color_variance
                || stats.edge_density > config.min_edge_density;
            if !keep {
                debug!(
                    "complexity: rejected {:?} (std {:.1}, edges {:.4}, area ratio {:.4})",
                    <[f32; 4]>::from(seg.box_pixels),
                    stats.std_dev,
                    stats.edge_density,
                    area_ratio
                );
            }
            keep
        })
        .collect()
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct RegionStats {
    pub(crate) std_dev: f32,
    pub(crate) edge_density: f32,
}

impl RegionStats {
    /// Population standard deviation of intensity, and the fraction of pixels
    /// whose first-difference gradient magnitude exceeds `delta`.
    pub(crate) fn measure(gray: &GrayImage, x: u32, y: u32, w: u32, h: u32, delta: f32) -> Self {
        let at = |col: u32, row: u32| gray.get_pixel(x + col, y + row)[0] as f32;
        let count = (w * h) as f32;

        let mut sum = 0.0f64;
        let mut sum_sq = 0.0f64;
        let mut edges = 0u32;
        for row in 0..h {
            for col in 0..w {
                let value = at(col, row);
                sum += value as f64;
                sum_sq += (value as f64) * (value as f64);
                let dx = if col == 0 { 0.0 } else { value - at(col - 1, row) };
                let dy = if row == 0 { 0.0 } else { value - at(col, row - 1) };
                if (dx * dx + dy * dy).sqrt() > delta {
                    edges += 1;
                }
            }
        }
        let mean = sum / count as f64;
        let variance = (sum_sq / count as f64 - mean * mean).max(0.0);
        Self {
            std_dev: variance.sqrt() as f32,
            edge_density: edges as f32 / count,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::geom::BoxPx;
    use image::Luma;

    fn seg(x1: f32, y1: f32, x2: f32, y2: f32) -> Segment {
        Segment::new(BoxPx::new(x1, y1, x2, y2), 0.9)
    }

    #[test]
    fn flat_small_region_is_rejected() {
        let gray = GrayImage::from_pixel(400, 400, Luma([240]));
        let out = filter_by_visual_complexity(
            vec![seg(10.0, 10.0, 50.0, 50.0)],
            &gray,
            &PipelineConfig::default(),
        );
        assert!(out.is_empty());
    }

    #[test]
    fn flat_large_region_bypasses_check() {
        let gray = GrayImage::from_pixel(400, 400, Luma([240]));
        // 100x100 is 0.0625 of the image
        let out = filter_by_visual_complexity(
            vec![seg(10.0, 10.0, 110.0, 110.0)],
            &gray,
            &PipelineConfig::default(),
        );
        assert_eq!(out.len(), 1);
    }

    #[test]
    fn a_single_edge_is_enough() {
        // Two halves 20 levels apart: low variance overall but a sharp seam.
        let gray = GrayImage::from_fn(400, 400, |x, _| Luma([if x < 30 { 100 } else { 120 }]));
        let stats = RegionStats::measure(&gray, 10, 10, 40, 40, 8.0);
        assert!(stats.std_dev <= 10.0);
        assert!(stats.edge_density > 0.01);
        let out = filter_by_visual_complexity(
            vec![seg(10.0, 10.0, 50.0, 50.0)],
            &gray,
            &PipelineConfig::default(),
        );
        assert_eq!(out.len(), 1);
    }

    #[test]
    fn variance_alone_is_enough() {
        // Smooth ramp: large spread of values but every step below the edge delta.
        let gray = GrayImage::from_fn(400, 400, |x, _| Luma([(x.min(255)) as u8]));
        let stats = RegionStats::measure(&gray, 10, 10, 40, 40, 8.0);
        assert!(stats.std_dev > 10.0);
        assert_eq!(stats.edge_density, 0.0);
        let out = filter_by_visual_complexity(
            vec![seg(10.0, 10.0, 50.0, 50.0)],
            &gray,
            &PipelineConfig::default(),
        );
        assert_eq!(out.len(), 1);
    }

    #[test]
    fn stats_of_uniform_region() {
        let gray = GrayImage::from_pixel(20, 20, Luma([50]));
        let stats = RegionStats::measure(&gray, 0, 0, 20, 20, 8.0);
        assert_eq!(stats.std_dev, 0.0);
        assert_eq!(stats.edge_density, 0.0);
    }
}
