use image::GrayImage;
use tracing::info;

mod complexity;
mod config;
mod containment;
mod filter;
mod geom;
mod label;
mod normalize;
mod overlap;
mod relations;
mod segment;
mod tighten;

pub use complexity::filter_by_visual_complexity;
pub use config::PipelineConfig;
pub use containment::remove_contained_duplicates;
pub use filter::filter_segments;
pub use geom::{BoxPx, contains, encloses, iou, is_nested};
pub use label::{
    Labeled, UNKNOWN_LABEL, clean_label, deduplicate_by_label, is_placeholder, label_components,
    placeholder_label,
};
pub use normalize::{Component, normalize_components};
pub use overlap::remove_overlaps;
pub use relations::{Relationship, Relationships, analyze_relationships};
pub use segment::{OracleBox, Segment, ingest};
pub use tighten::tighten_boxes;

/// Runs the geometric stages, filter through visual complexity, over
/// ingested detector boxes.
pub fn refine_segments(
    segments: Vec<Segment>,
    gray: &GrayImage,
    config: &PipelineConfig,
) -> Vec<Segment> {
    let (width, height) = gray.dimensions();
    let image_area = width as f32 * height as f32;
    info!("raw segments: {}", segments.len());

    let filtered = filter_segments(segments, width, height, config);
    info!("after filtering: {}", filtered.len());

    let tightened = if config.tighten_boxes {
        let tightened = tighten_boxes(filtered, gray, config);
        info!("after tightening: {}", tightened.len());
        tightened
    } else {
        filtered
    };

    let unique = remove_overlaps(tightened, image_area, config);
    info!("after NMS: {}", unique.len());

    let unique = remove_contained_duplicates(unique, config);
    info!("after containment dedup: {}", unique.len());

    let complex = filter_by_visual_complexity(unique, gray, config);
    info!("after visual complexity filtering: {}", complex.len());
    complex
}
