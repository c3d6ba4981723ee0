use serde::{Deserialize, Serialize};

use super::segment::Segment;

/// Public component record. Coordinates are fractions of the image size.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Component {
    pub id: String,
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub center_x: f32,
    pub center_y: f32,
    pub confidence: f32,
    pub area: f32,
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

impl Component {
    pub fn pixel_box(&self, width: u32, height: u32) -> [f32; 4] {
        let (w, h) = (width as f32, height as f32);
        [
            self.x * w,
            self.y * h,
            (self.x + self.width) * w,
            (self.y + self.height) * h,
        ]
    }
}

pub fn normalize_components(segments: &[Segment], width: u32, height: u32) -> Vec<Component> {
    let (img_w, img_h) = (width as f32, height as f32);
    segments
        .iter()
        .enumerate()
        .map(|(i, seg)| {
            let b = &seg.box_pixels;
            let x = b.x1 / img_w;
            let y = b.y1 / img_h;
            let w = b.width() / img_w;
            let h = b.height() / img_h;
            Component {
                id: format!("component_{}", i),
                x,
                y,
                width: w,
                height: h,
                center_x: x + w / 2.0,
                center_y: y + h / 2.0,
                confidence: seg.confidence,
                area: w * h,
                label: None,
                description: None,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::geom::BoxPx;

    #[test]
    fn normalizes_against_image_size() {
        let segments = vec![
            Segment::new(BoxPx::new(200.0, 150.0, 400.0, 300.0), 0.9),
            Segment::new(BoxPx::new(0.0, 0.0, 80.0, 60.0), 0.5),
        ];
        let out = normalize_components(&segments, 800, 600);
        assert_eq!(out[0].id, "component_0");
        assert_eq!(out[1].id, "component_1");
        assert_eq!(out[0].x, 0.25);
        assert_eq!(out[0].y, 0.25);
        assert_eq!(out[0].width, 0.25);
        assert_eq!(out[0].center_x, 0.375);
        assert_eq!(out[0].area, 0.0625);
        assert_eq!(out[1].confidence, 0.5);
        assert!(out[1].label.is_none());
    }

    #[test]
    fn pixel_box_reconstructs_input() {
        let original = BoxPx::new(61.0, 47.5, 333.0, 290.25);
        let out = normalize_components(&[Segment::new(original, 0.7)], 1023, 767);
        let rebuilt = out[0].pixel_box(1023, 767);
        let expected: [f32; 4] = original.into();
        for (a, b) in rebuilt.iter().zip(expected) {
            assert!((a - b).abs() < 1e-3, "{} vs {}", a, b);
        }
    }

    #[test]
    fn stays_within_unit_square() {
        let out = normalize_components(
            &[Segment::new(BoxPx::new(700.0, 500.0, 800.0, 600.0), 0.8)],
            800,
            600,
        );
        let c = &out[0];
        assert!(c.x + c.width <= 1.0 + 1e-6);
        assert!(c.y + c.height <= 1.0 + 1e-6);
    }

    #[test]
    fn deserializes_without_optional_fields() {
        let component: Component = serde_json::from_str(
            r#"{"id":"component_3","x":0.1,"y":0.2,"width":0.3,"height":0.1,
                "center_x":0.25,"center_y":0.25,"confidence":0.8,"area":0.03}"#,
        )
        .unwrap();
        assert_eq!(component.id, "component_3");
        assert!(component.label.is_none());
        assert!(component.description.is_none());
    }
}
