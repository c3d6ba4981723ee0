use tracing::debug;

use super::config::PipelineConfig;
use super::segment::Segment;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Rejection {
    LowConfidence,
    TooSmallArea,
    TooSmallRatio,
    TooLarge,
    ExtremeAspect,
    TooSmallDimension,
    BorderArtifact,
    EdgeSliver,
}

pub fn filter_segments(
    segments: Vec<Segment>,
    width: u32,
    height: u32,
    config: &PipelineConfig,
) -> Vec<Segment> {
    segments
        .into_iter()
        .filter(|seg| match rejection(seg, width, height, config) {
            Some(reason) => {
                debug!("filter: {:?} rejected ({:?})", <[f32; 4]>::from(seg.box_pixels), reason);
                false
            }
            None => true,
        })
        .collect()
}

pub(crate) fn rejection(
    seg: &Segment,
    width: u32,
    height: u32,
    config: &PipelineConfig,
) -> Option<Rejection> {
    let (img_w, img_h) = (width as f32, height as f32);
    let img_area = img_w * img_h;
    let b = &seg.box_pixels;
    let (w, h) = (b.width(), b.height());
    let area_ratio = seg.area_pixels / img_area;

    if seg.confidence < config.confidence_threshold {
        return Some(Rejection::LowConfidence);
    }
    if seg.area_pixels < config.min_box_area {
        return Some(Rejection::TooSmallArea);
    }
    if area_ratio < config.min_area_ratio {
        return Some(Rejection::TooSmallRatio);
    }
    if seg.area_pixels > img_area * config.max_area_ratio {
        return Some(Rejection::TooLarge);
    }
    if b.aspect_ratio() > config.max_aspect_ratio {
        return Some(Rejection::ExtremeAspect);
    }
    if w < config.min_dimension || h < config.min_dimension {
        return Some(Rejection::TooSmallDimension);
    }

    // Large boxes near the border are real components; only small ones are grid noise.
    let margin = config.edge_exclude_margin;
    if area_ratio < config.border_small_area_ratio
        && (b.y2 / img_h > 1.0 - margin
            || b.y1 / img_h < margin
            || b.x1 / img_w < margin
            || b.x2 / img_w > 1.0 - margin)
    {
        return Some(Rejection::BorderArtifact);
    }

    let sliver = config.edge_sliver_margin;
    let touches_edge =
        b.x1 < sliver || b.y1 < sliver || b.x2 > img_w - sliver || b.y2 > img_h - sliver;
    if touches_edge && (w < config.edge_sliver_min_dim || h < config.edge_sliver_min_dim) {
        return Some(Rejection::EdgeSliver);
    }

    None
}
