//! HTTP request and response bodies

use serde::{Deserialize, Serialize};

use crate::mask::BoundingBox;
use crate::oracle::{GeneratedMask, PromptBox, PromptPoint, SegmentResult};
use crate::results::SavedFile;
use crate::session::StoredMask;

use super::error::ApiError;

/// Response for POST /upload
#[derive(Debug, Serialize, Deserialize)]
pub struct UploadResponse {
    pub session_id: String,
    /// Transport-encoded image
    pub image_data: String,
    pub width: u32,
    pub height: u32,
    pub message: String,
}

/// Request for POST /segment
#[derive(Debug, Deserialize)]
pub struct SegmentRequest {
    pub session_id: String,
    #[serde(default)]
    pub points: Option<Vec<PromptPoint>>,
    #[serde(default)]
    pub boxes: Option<Vec<PromptBox>>,
    /// Transport-encoded mask prompt
    #[serde(default)]
    pub mask: Option<String>,
}

/// Single-mask response shared by the segment and point endpoints
#[derive(Debug, Serialize, Deserialize)]
pub struct SegmentResponse {
    pub session_id: String,
    pub mask: String,
    pub score: Option<f32>,
    pub bbox: Option<BoundingBox>,
}

impl SegmentResponse {
    pub fn new(session_id: String, result: SegmentResult) -> Self {
        Self {
            session_id,
            mask: result.mask,
            score: result.score,
            bbox: result.bbox,
        }
    }
}

/// Request for POST /generate-masks and /generate-masks-advanced
///
/// Absent parameters take the endpoint's preset.
#[derive(Debug, Deserialize)]
pub struct GenerateMasksRequest {
    pub session_id: String,
    #[serde(default)]
    pub points_per_side: Option<u32>,
    #[serde(default)]
    pub pred_iou_thresh: Option<f32>,
    #[serde(default)]
    pub stability_score_thresh: Option<f32>,
}

/// A stored mask as listed to clients
#[derive(Debug, Serialize, Deserialize)]
pub struct MaskInfo {
    pub id: u32,
    pub mask: String,
    pub score: Option<f32>,
    pub bbox: Option<BoundingBox>,
    pub area: Option<u64>,
    pub stability_score: Option<f32>,
}

impl From<&StoredMask> for MaskInfo {
    fn from(stored: &StoredMask) -> Self {
        Self {
            id: stored.id,
            mask: stored.mask.to_string(),
            score: stored.score,
            bbox: stored.bbox,
            area: stored.area,
            stability_score: stored.stability_score,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct GenerateMasksResponse {
    pub session_id: String,
    pub masks: Vec<MaskInfo>,
    pub total_masks: usize,
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Deserialize)]
pub struct CombineMasksRequest {
    pub session_id: String,
    pub mask_ids: Vec<u32>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CombineMasksResponse {
    pub session_id: String,
    pub combined_mask: String,
    pub width: u32,
    pub height: u32,
    pub num_masks_combined: usize,
}

/// Request for POST /get-mask-at-point
#[derive(Debug, Deserialize)]
pub struct GetMaskAtPointRequest {
    pub session_id: String,
    /// `[x, y]`
    pub point: Vec<i64>,
    /// Candidates to search; the session's stored masks when absent or empty
    #[serde(default)]
    pub all_masks: Option<Vec<GeneratedMask>>,
}

/// Request for POST /generate-mask-at-point
#[derive(Debug, Deserialize)]
pub struct GenerateMaskAtPointRequest {
    pub session_id: String,
    /// `[x, y]`
    pub point: Vec<i64>,
}

/// Validate a `[x, y]` point: exactly two non-negative coordinates
pub fn parse_point(point: &[i64]) -> Result<(i64, i64), ApiError> {
    match *point {
        [x, y] if x >= 0 && y >= 0 => Ok((x, y)),
        [_, _] => Err(ApiError::BadRequest(
            "Point coordinates must be non-negative".to_string(),
        )),
        _ => Err(ApiError::BadRequest("Point must be [x, y]".to_string())),
    }
}

/// Request for POST /paint-mask
#[derive(Debug, Deserialize)]
pub struct PaintMaskRequest {
    pub session_id: String,
    #[serde(default)]
    pub mask_id: Option<u32>,
    #[serde(default)]
    pub mask: Option<String>,
    #[serde(default)]
    pub color: Option<String>,
    #[serde(default)]
    pub opacity: Option<f32>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PaintMaskResponse {
    pub session_id: String,
    pub painted_image: String,
    pub width: u32,
    pub height: u32,
}

/// One entry of a multi-mask paint request
#[derive(Debug, Deserialize)]
pub struct ColoredMaskEntry {
    #[serde(default)]
    pub mask_id: Option<u32>,
    #[serde(default)]
    pub mask: Option<String>,
    #[serde(default)]
    pub color: Option<String>,
    #[serde(default)]
    pub opacity: Option<f32>,
}

/// Request for POST /paint-multiple-masks; masks are painted in list order
#[derive(Debug, Deserialize)]
pub struct PaintMultipleMasksRequest {
    pub session_id: String,
    pub colored_masks: Vec<ColoredMaskEntry>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PaintMultipleMasksResponse {
    pub session_id: String,
    pub painted_image: String,
    pub width: u32,
    pub height: u32,
    pub num_masks_painted: usize,
}

fn default_format() -> String {
    "PNG".to_string()
}

/// Request for POST /download-image
#[derive(Debug, Deserialize)]
pub struct DownloadImageRequest {
    pub session_id: String,
    #[serde(default = "default_format")]
    pub format: String,
    #[serde(default)]
    pub quality: Option<i64>,
}

/// Request for POST /download-painted-image
#[derive(Debug, Deserialize)]
pub struct DownloadPaintedImageRequest {
    pub session_id: String,
    #[serde(default)]
    pub mask_id: Option<u32>,
    #[serde(default)]
    pub mask: Option<String>,
    #[serde(default)]
    pub color: Option<String>,
    #[serde(default)]
    pub opacity: Option<f32>,
    #[serde(default = "default_format")]
    pub format: String,
    #[serde(default)]
    pub quality: Option<i64>,
}

/// Response for both download-preparation endpoints
#[derive(Debug, Serialize, Deserialize)]
pub struct DownloadResponse {
    pub session_id: String,
    pub image_url: String,
    pub format: String,
    pub size_bytes: u64,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct ListDownloadsResponse {
    pub downloads: Vec<SavedFile>,
    pub total_files: usize,
    pub message: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SessionInfoResponse {
    pub session_id: String,
    pub filename: String,
    pub width: u32,
    pub height: u32,
    /// RFC 3339 creation time
    pub created_at: String,
    pub stored_masks: usize,
    pub message: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct MessageResponse {
    pub message: String,
}
