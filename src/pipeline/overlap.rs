use tracing::debug;

use super::config::PipelineConfig;
use super::geom::{contains, iou, is_nested};
use super::segment::Segment;

/// Nesting-aware NMS. Strips page-sized containers that enclose many other
/// detections, then suppresses similar-sized duplicates while letting a small
/// box drawn inside a larger one survive next to it.
///
/// Survivors are returned in input order.
pub fn remove_overlaps(
    segments: Vec<Segment>,
    image_area: f32,
    config: &PipelineConfig,
) -> Vec<Segment> {
    if segments.is_empty() {
        return segments;
    }

    let mut order: Vec<usize> = (0..segments.len()).collect();
    order.sort_by(|&a, &b| segments[b].confidence.total_cmp(&segments[a].confidence));

    let candidates = strip_containers(&segments, &order, image_area, config);

    let mut kept = candidates
        .into_iter()
        .fold(Vec::<usize>::new(), |mut kept, idx| {
            let seg = &segments[idx];
            let duplicate_of = kept.iter().copied().find(|&k| {
                let other = &segments[k];
                iou(&seg.box_pixels, &other.box_pixels) > config.iou_threshold
                    && !is_nested(
                        &seg.box_pixels,
                        &other.box_pixels,
                        config.nesting_size_ratio,
                        config.nesting_margin,
                    )
            });
            match duplicate_of {
                Some(k) => debug!(
                    "nms: suppressed {:?} (iou {:.2} with {:?})",
                    <[f32; 4]>::from(seg.box_pixels),
                    iou(&seg.box_pixels, &segments[k].box_pixels),
                    <[f32; 4]>::from(segments[k].box_pixels)
                ),
                None => kept.push(idx),
            }
            kept
        });

    kept.sort_unstable();
    let mut slots: Vec<Option<Segment>> = segments.into_iter().map(Some).collect();
    kept.into_iter().filter_map(|idx| slots[idx].take()).collect()
}

/// Indices (in confidence order) of segments that are not background
/// containers. Falls back to every segment when all of them would go.
fn strip_containers(
    segments: &[Segment],
    order: &[usize],
    image_area: f32,
    config: &PipelineConfig,
) -> Vec<usize> {
    let survivors: Vec<usize> = order
        .iter()
        .copied()
        .filter(|&i| {
            let seg = &segments[i];
            if seg.area_pixels <= image_area * config.container_min_area_ratio {
                return true;
            }
            let children = segments
                .iter()
                .enumerate()
                .filter(|&(j, other)| {
                    j != i && contains(&seg.box_pixels, &other.box_pixels, config.contains_margin)
                })
                .count();
            if children >= config.container_min_children {
                debug!(
                    "nms: removing background box {:?} (contains {} others, area ratio {:.2})",
                    <[f32; 4]>::from(seg.box_pixels),
                    children,
                    seg.area_pixels / image_area
                );
                return false;
            }
            true
        })
        .collect();

    if survivors.is_empty() {
        order.to_vec()
    } else {
        survivors
    }
}
