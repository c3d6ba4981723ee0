use serde::{Deserialize, Serialize};
use tracing::debug;

use super::geom::BoxPx;

/// One detector box as returned by the segmentation oracle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OracleBox {
    #[serde(rename = "box")]
    pub bbox: BoxPx,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f32>,
}

/// Candidate box flowing through the refinement stages. Filters only admit or
/// reject; the tightener is the one stage that rewrites `box_pixels`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Segment {
    pub box_pixels: BoxPx,
    pub confidence: f32,
    pub area_pixels: f32,
}

impl Segment {
    pub fn new(box_pixels: BoxPx, confidence: f32) -> Self {
        Self {
            area_pixels: box_pixels.area(),
            box_pixels,
            confidence,
        }
    }

    pub(crate) fn with_box(&self, box_pixels: BoxPx) -> Self {
        Self::new(box_pixels, self.confidence)
    }
}

/// Turns raw oracle boxes into segments clamped to the image. Boxes that are
/// empty or non-finite after clamping are dropped.
pub fn ingest(raw: Vec<OracleBox>, width: u32, height: u32) -> Vec<Segment> {
    let (w, h) = (width as f32, height as f32);
    raw.into_iter()
        .filter_map(|item| {
            let b = item.bbox;
            let clamped = BoxPx::new(
                b.x1.clamp(0.0, w),
                b.y1.clamp(0.0, h),
                b.x2.clamp(0.0, w),
                b.y2.clamp(0.0, h),
            );
            if b.is_degenerate() || clamped.is_degenerate() {
                debug!("dropping degenerate detection {:?}", <[f32; 4]>::from(b));
                return None;
            }
            let confidence = item.confidence.unwrap_or(1.0);
            if !confidence.is_finite() {
                debug!("dropping detection with non-finite confidence");
                return None;
            }
            Some(Segment::new(clamped, confidence.clamp(0.0, 1.0)))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(b: [f32; 4], confidence: Option<f32>) -> OracleBox {
        OracleBox {
            bbox: b.into(),
            confidence,
        }
    }

    #[test]
    fn missing_confidence_defaults_to_one() {
        let segments = ingest(vec![raw([10.0, 10.0, 50.0, 40.0], None)], 100, 100);
        assert_eq!(segments.len(), 1);
        assert_eq!(segments[0].confidence, 1.0);
        assert_eq!(segments[0].area_pixels, 1200.0);
    }

    #[test]
    fn clamps_to_image_bounds() {
        let segments = ingest(vec![raw([-20.0, 5.0, 130.0, 60.0], Some(0.8))], 100, 50);
        assert_eq!(segments[0].box_pixels, BoxPx::new(0.0, 5.0, 100.0, 50.0));
        assert_eq!(segments[0].area_pixels, 4500.0);
    }

    #[test]
    fn drops_degenerate_boxes() {
        let segments = ingest(
            vec![
                raw([10.0, 10.0, 10.0, 40.0], Some(0.9)),
                raw([50.0, 10.0, 20.0, 40.0], Some(0.9)),
                raw([200.0, 10.0, 300.0, 40.0], Some(0.9)),
                raw([f32::NAN, 0.0, 10.0, 10.0], Some(0.9)),
                raw([0.0, 0.0, 10.0, 10.0], Some(f32::NAN)),
                raw([1.0, 1.0, 20.0, 20.0], Some(0.9)),
            ],
            100,
            100,
        );
        assert_eq!(segments.len(), 1);
        assert_eq!(segments[0].box_pixels, BoxPx::new(1.0, 1.0, 20.0, 20.0));
    }

    #[test]
    fn parses_oracle_json() {
        let parsed: Vec<OracleBox> =
            serde_json::from_str(r#"[{"box":[1,2,30,40],"confidence":0.5},{"box":[0,0,5,5]}]"#)
                .unwrap();
        assert_eq!(parsed[0].confidence, Some(0.5));
        assert_eq!(parsed[1].confidence, None);
        assert_eq!(parsed[0].bbox, BoxPx::new(1.0, 2.0, 30.0, 40.0));
    }
}
