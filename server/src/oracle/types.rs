//! Oracle request/response types and error definitions

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::mask::{BoundingBox, ScoredMask};
use crate::paint::PaintLayer;

/// Errors that can occur when calling the segmentation oracle
#[derive(Debug, Error)]
pub enum OracleError {
    #[error("Oracle call timed out after {0:?}")]
    Timeout(Duration),

    #[error("Oracle error: {0}")]
    Upstream(String),

    #[error("Oracle unreachable: {0}")]
    Transport(String),

    #[error("Invalid oracle response: {0}")]
    InvalidResponse(String),
}

/// Click prompt; `label` is 1 for foreground, 0 for background
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PromptPoint {
    pub x: i64,
    pub y: i64,
    pub label: u8,
}

impl PromptPoint {
    pub fn foreground(x: i64, y: i64) -> Self {
        Self { x, y, label: 1 }
    }
}

/// Box prompt in pixel coordinates
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PromptBox {
    pub x1: i64,
    pub y1: i64,
    pub x2: i64,
    pub y2: i64,
}

/// Prompt for a single-mask segmentation
#[derive(Debug, Clone, Default)]
pub struct SegmentPrompt {
    pub points: Vec<PromptPoint>,
    pub boxes: Vec<PromptBox>,
    /// Transport-encoded mask prompt
    pub mask: Option<String>,
}

impl SegmentPrompt {
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
            && self.boxes.is_empty()
            && self.mask.as_deref().is_none_or(|m| m.trim().is_empty())
    }
}

/// Single best mask for a prompt
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SegmentResult {
    pub mask: String,
    #[serde(default)]
    pub score: Option<f32>,
    #[serde(default)]
    pub bbox: Option<BoundingBox>,
}

/// Density and filtering for whole-image mask generation
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct GenerateParams {
    pub points_per_side: u32,
    pub pred_iou_thresh: f32,
    pub stability_score_thresh: f32,
}

impl GenerateParams {
    /// Default generation
    pub const STANDARD: Self = Self {
        points_per_side: 96,
        pred_iou_thresh: 0.7,
        stability_score_thresh: 0.8,
    };

    /// Denser sampling, looser filters
    pub const ADVANCED: Self = Self {
        points_per_side: 128,
        pred_iou_thresh: 0.6,
        stability_score_thresh: 0.7,
    };

    /// Overlay explicit request values on a preset
    pub fn with_overrides(
        self,
        points_per_side: Option<u32>,
        pred_iou_thresh: Option<f32>,
        stability_score_thresh: Option<f32>,
    ) -> Self {
        Self {
            points_per_side: points_per_side.unwrap_or(self.points_per_side),
            pred_iou_thresh: pred_iou_thresh.unwrap_or(self.pred_iou_thresh),
            stability_score_thresh: stability_score_thresh.unwrap_or(self.stability_score_thresh),
        }
    }
}

/// One mask from whole-image generation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneratedMask {
    #[serde(default)]
    pub id: Option<u32>,
    pub mask: String,
    #[serde(default)]
    pub score: Option<f32>,
    #[serde(default)]
    pub bbox: Option<BoundingBox>,
    #[serde(default)]
    pub area: Option<u64>,
    #[serde(default)]
    pub stability_score: Option<f32>,
}

impl ScoredMask for GeneratedMask {
    fn encoded_mask(&self) -> &str {
        &self.mask
    }

    fn score(&self) -> Option<f32> {
        self.score
    }
}

/// Whole-image mask set
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneratedMaskSet {
    pub masks: Vec<GeneratedMask>,
    #[serde(default)]
    pub total_masks: Option<usize>,
    #[serde(default)]
    pub width: Option<u32>,
    #[serde(default)]
    pub height: Option<u32>,
}

/// Paint layer as sent to the oracle's compositor
#[derive(Debug, Clone, Serialize)]
pub struct RemoteColoredMask {
    pub mask: String,
    pub color: String,
    pub opacity: f32,
}

impl From<&PaintLayer> for RemoteColoredMask {
    fn from(layer: &PaintLayer) -> Self {
        Self {
            mask: layer.mask.to_string(),
            color: layer.color.to_string(),
            opacity: layer.opacity,
        }
    }
}

/// Result of remote compositing
#[derive(Debug, Clone, Deserialize)]
pub struct RemotePaintResult {
    pub painted_image: String,
    #[serde(default)]
    pub width: Option<u32>,
    #[serde(default)]
    pub height: Option<u32>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prompt_is_empty() {
        assert!(SegmentPrompt::default().is_empty());
        assert!(
            SegmentPrompt {
                mask: Some(" ".into()),
                ..Default::default()
            }
            .is_empty()
        );
        assert!(
            !SegmentPrompt {
                points: vec![PromptPoint::foreground(1, 2)],
                ..Default::default()
            }
            .is_empty()
        );
    }

    #[test]
    fn test_generate_overrides() {
        let params = GenerateParams::ADVANCED.with_overrides(Some(64), None, Some(0.9));
        assert_eq!(params.points_per_side, 64);
        assert_eq!(params.pred_iou_thresh, 0.6);
        assert_eq!(params.stability_score_thresh, 0.9);
    }

    #[test]
    fn test_generated_set_accepts_integer_bbox_and_missing_fields() {
        let json = r#"{"masks":[{"id":0,"mask":"abc","bbox":[1,2,3,4]},{"mask":"def"}]}"#;
        let set: GeneratedMaskSet = serde_json::from_str(json).unwrap();

        assert_eq!(set.masks.len(), 2);
        assert_eq!(set.masks[0].bbox, Some([1.0, 2.0, 3.0, 4.0]));
        assert_eq!(set.masks[1].score, None);
        assert_eq!(set.total_masks, None);
    }
}
