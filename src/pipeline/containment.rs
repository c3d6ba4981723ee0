use tracing::debug;

use super::config::PipelineConfig;
use super::geom::encloses;
use super::segment::Segment;

/// Drops boxes that span several detections, and boxes that barely extend
/// past their single child. A box holding one small child is a real parent
/// and stays.
pub fn remove_contained_duplicates(
    segments: Vec<Segment>,
    config: &PipelineConfig,
) -> Vec<Segment> {
    if segments.len() < 2 {
        return segments;
    }

    let children: Vec<Vec<usize>> = segments
        .iter()
        .enumerate()
        .map(|(i, outer)| {
            segments
                .iter()
                .enumerate()
                .filter(|&(j, inner)| {
                    j != i && encloses(&outer.box_pixels, &inner.box_pixels, config.dedup_margin)
                })
                .map(|(j, _)| j)
                .collect()
        })
        .collect();

    let remove: Vec<bool> = segments
        .iter()
        .zip(&children)
        .map(|(seg, kids)| match kids.as_slice() {
            [] => false,
            [only] => {
                let parent_area = seg.box_pixels.area();
                let fill = segments[*only].box_pixels.area() / parent_area;
                let redundant = parent_area > 0.0 && fill > config.dedup_single_child_fill;
                if redundant {
                    debug!(
                        "containment: removed {:?} (child fills {:.0}%)",
                        <[f32; 4]>::from(seg.box_pixels),
                        fill * 100.0
                    );
                }
                redundant
            }
            many => {
                debug!(
                    "containment: removed {:?} (contains {} children)",
                    <[f32; 4]>::from(seg.box_pixels),
                    many.len()
                );
                true
            }
        })
        .collect();

    segments
        .into_iter()
        .zip(remove)
        .filter_map(|(seg, drop)| (!drop).then_some(seg))
        .collect()
}
