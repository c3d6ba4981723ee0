use anyhow::{Result, anyhow};
use serde::{Deserialize, Serialize};

/// Thresholds for every refinement stage. Built once, shared read-only by all
/// stages of an extraction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    // segment filter
    pub confidence_threshold: f32,
    pub min_box_area: f32,
    pub min_area_ratio: f32,
    pub max_area_ratio: f32,
    pub max_aspect_ratio: f32,
    pub min_dimension: f32,
    pub border_small_area_ratio: f32,
    pub edge_exclude_margin: f32,
    pub edge_sliver_margin: f32,
    pub edge_sliver_min_dim: f32,

    // box tightener
    pub tighten_boxes: bool,
    pub tighten_margin: f32,
    pub tighten_bg_threshold: f32,

    // overlap resolver
    pub iou_threshold: f32,
    pub container_min_area_ratio: f32,
    pub container_min_children: usize,
    pub contains_margin: f32,
    pub nesting_size_ratio: f32,
    pub nesting_margin: f32,

    // containment deduplicator
    pub dedup_margin: f32,
    pub dedup_single_child_fill: f32,

    // visual complexity filter
    pub complexity_bypass_area: f32,
    pub min_color_variance: f32,
    pub min_edge_density: f32,
    pub edge_pixel_delta: f32,

    // labeling and output
    pub label_max_edge: u32,
    pub max_components: usize,
    pub proximity_threshold: f32,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            confidence_threshold: 0.35,
            min_box_area: 1000.0,
            min_area_ratio: 0.004,
            max_area_ratio: 0.85,
            max_aspect_ratio: 4.0,
            min_dimension: 30.0,
            border_small_area_ratio: 0.008,
            edge_exclude_margin: 0.02,
            edge_sliver_margin: 5.0,
            edge_sliver_min_dim: 10.0,
            tighten_boxes: true,
            tighten_margin: 0.15,
            tighten_bg_threshold: 12.0,
            iou_threshold: 0.45,
            container_min_area_ratio: 0.55,
            container_min_children: 5,
            contains_margin: 10.0,
            nesting_size_ratio: 1.8,
            nesting_margin: 20.0,
            dedup_margin: 15.0,
            dedup_single_child_fill: 0.40,
            complexity_bypass_area: 0.015,
            min_color_variance: 10.0,
            min_edge_density: 0.01,
            edge_pixel_delta: 8.0,
            label_max_edge: 224,
            max_components: 50,
            proximity_threshold: 0.15,
        }
    }
}

impl PipelineConfig {
    pub fn validate(&self) -> Result<()> {
        let ratios = [
            ("confidence_threshold", self.confidence_threshold),
            ("min_area_ratio", self.min_area_ratio),
            ("max_area_ratio", self.max_area_ratio),
            ("border_small_area_ratio", self.border_small_area_ratio),
            ("edge_exclude_margin", self.edge_exclude_margin),
            ("tighten_margin", self.tighten_margin),
            ("iou_threshold", self.iou_threshold),
            ("container_min_area_ratio", self.container_min_area_ratio),
            ("dedup_single_child_fill", self.dedup_single_child_fill),
            ("complexity_bypass_area", self.complexity_bypass_area),
            ("min_edge_density", self.min_edge_density),
        ];
        for (name, value) in ratios {
            if !(0.0..=1.0).contains(&value) {
                return Err(anyhow!("pipeline.{} must be within 0..=1 (got {})", name, value));
            }
        }
        let non_negative = [
            ("min_box_area", self.min_box_area),
            ("min_dimension", self.min_dimension),
            ("edge_sliver_margin", self.edge_sliver_margin),
            ("edge_sliver_min_dim", self.edge_sliver_min_dim),
            ("tighten_bg_threshold", self.tighten_bg_threshold),
            ("contains_margin", self.contains_margin),
            ("nesting_margin", self.nesting_margin),
            ("dedup_margin", self.dedup_margin),
            ("min_color_variance", self.min_color_variance),
            ("edge_pixel_delta", self.edge_pixel_delta),
            ("proximity_threshold", self.proximity_threshold),
        ];
        for (name, value) in non_negative {
            if !value.is_finite() || value < 0.0 {
                return Err(anyhow!("pipeline.{} must be non-negative (got {})", name, value));
            }
        }
        if self.min_area_ratio > self.max_area_ratio {
            return Err(anyhow!(
                "pipeline.min_area_ratio ({}) exceeds max_area_ratio ({})",
                self.min_area_ratio,
                self.max_area_ratio
            ));
        }
        if self.max_aspect_ratio < 1.0 {
            return Err(anyhow!("pipeline.max_aspect_ratio must be at least 1"));
        }
        if self.nesting_size_ratio < 1.0 {
            return Err(anyhow!("pipeline.nesting_size_ratio must be at least 1"));
        }
        if self.max_components == 0 {
            return Err(anyhow!("pipeline.max_components must be positive"));
        }
        if self.label_max_edge == 0 {
            return Err(anyhow!("pipeline.label_max_edge must be positive"));
        }
        Ok(())
    }
}
