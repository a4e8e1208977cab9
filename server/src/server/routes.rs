//! HTTP route handlers

use axum::{
    Json, Router,
    extract::{DefaultBodyLimit, Multipart, Path, State},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use chrono::{SecondsFormat, Utc};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::mask::codec::{MASK_THRESHOLD, decode_fitted, encode};
use crate::mask::geometry::union_all;
use crate::mask::{BinaryMask, best_mask_at};
use crate::oracle::{GenerateParams, PromptPoint, SegmentPrompt};
use crate::paint::{ColoredMaskRequest, PaintError};
use crate::results::{OutputFormat, SavedFile, parse_quality, result_filename};
use crate::session::{NewSession, Session, SessionError, StoredMask};

use super::error::{ApiError, ApiJson};
use super::state::AppState;
use super::types::*;
use super::upload::{UploadError, fingerprint, prepare_image, validate_filename};

/// Slack on top of the upload limit for multipart framing
const MULTIPART_OVERHEAD: usize = 1024 * 1024;

/// All API routes, without middleware
pub fn api_routes(max_upload_size: usize) -> Router<AppState> {
    Router::new()
        .route("/health", get(health))
        .route("/metrics", get(metrics))
        .route(
            "/upload",
            post(upload).layer(DefaultBodyLimit::max(max_upload_size + MULTIPART_OVERHEAD)),
        )
        .route("/segment", post(segment))
        .route("/generate-masks", post(generate_masks))
        .route("/generate-masks-advanced", post(generate_masks_advanced))
        .route("/combine-masks", post(combine_masks))
        .route("/get-mask-at-point", post(get_mask_at_point))
        .route("/generate-mask-at-point", post(generate_mask_at_point))
        .route("/paint-mask", post(paint_mask))
        .route("/paint-multiple-masks", post(paint_multiple_masks))
        .route("/download-image", post(download_image))
        .route("/download-painted-image", post(download_painted_image))
        .route("/download-file/:filename", get(download_file))
        .route("/list-downloads", get(list_downloads))
        .route("/session/:session_id", get(session_info).delete(delete_session))
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
    oracle_status: serde_json::Value,
    oracle_endpoint: String,
    timestamp: String,
    sessions_count: usize,
    uptime_seconds: u64,
}

/// GET /health - service status plus the oracle's own health payload
async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let oracle_status = match state.oracle.health().await {
        Ok(status) => status,
        Err(e) => {
            warn!("Oracle health check failed: {}", e);
            serde_json::json!({ "status": "error", "message": e.to_string() })
        }
    };

    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
        oracle_status,
        oracle_endpoint: state.oracle.endpoint().to_string(),
        timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
        sessions_count: state.sessions.session_count().await,
        uptime_seconds: state.uptime_seconds(),
    })
}

#[derive(Serialize)]
struct MetricsResponse {
    uptime_seconds: u64,
    version: &'static str,
    active_sessions: usize,
}

/// GET /metrics - JSON summary
async fn metrics(State(state): State<AppState>) -> Json<MetricsResponse> {
    Json(MetricsResponse {
        uptime_seconds: state.uptime_seconds(),
        version: env!("CARGO_PKG_VERSION"),
        active_sessions: state.sessions.session_count().await,
    })
}

/// POST /upload - multipart field `file`
async fn upload(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<UploadResponse>, ApiError> {
    let mut file: Option<(String, bytes::Bytes)> = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(format!("Failed to read field: {}", e)))?
    {
        if field.name() != Some("file") {
            continue;
        }
        let filename = field.file_name().unwrap_or_default().to_string();
        let data = field
            .bytes()
            .await
            .map_err(|e| ApiError::BadRequest(format!("Failed to read file: {}", e)))?;
        file = Some((filename, data));
    }

    let (filename, data) = file.ok_or(UploadError::MissingFile)?;
    if filename.is_empty() {
        return Err(UploadError::MissingFile.into());
    }
    validate_filename(&filename)?;
    if data.len() > state.max_upload_size {
        return Err(UploadError::TooLarge {
            max_mb: state.max_upload_size / (1024 * 1024),
        }
        .into());
    }

    let content = data.clone();
    let digest = tokio::task::spawn_blocking(move || fingerprint(&content)).await?;
    if let Some(existing_id) = state.uploads.lookup(&digest) {
        match state.sessions.get(&existing_id).await {
            Ok(existing) => {
                info!(
                    "Returning existing session {} for {}",
                    existing.id, filename
                );
                return Ok(Json(UploadResponse {
                    session_id: existing.id.clone(),
                    image_data: existing.encoded_image.to_string(),
                    width: existing.width,
                    height: existing.height,
                    message: "Image already uploaded, returning existing session".to_string(),
                }));
            }
            Err(_) => state.uploads.forget(&digest),
        }
    }

    let prepared = tokio::task::spawn_blocking(move || prepare_image(&data)).await??;
    let session = state
        .sessions
        .create(NewSession {
            filename,
            image: prepared.image,
            encoded_image: prepared.encoded,
        })
        .await;
    state.uploads.record(digest, session.id.clone());

    Ok(Json(UploadResponse {
        session_id: session.id.clone(),
        image_data: session.encoded_image.to_string(),
        width: session.width,
        height: session.height,
        message: "Image uploaded successfully".to_string(),
    }))
}

/// POST /segment - single mask for a point/box/mask prompt
async fn segment(
    State(state): State<AppState>,
    ApiJson(request): ApiJson<SegmentRequest>,
) -> Result<Json<SegmentResponse>, ApiError> {
    let session = state.sessions.get(&request.session_id).await?;

    let prompt = SegmentPrompt {
        points: request.points.unwrap_or_default(),
        boxes: request.boxes.unwrap_or_default(),
        mask: request.mask,
    };
    if prompt.is_empty() {
        return Err(ApiError::BadRequest(
            "At least one prompt (points, boxes, or mask) must be provided".to_string(),
        ));
    }

    let result = state.oracle.segment(&session.encoded_image, &prompt).await?;
    Ok(Json(SegmentResponse::new(session.id.clone(), result)))
}

/// POST /generate-masks
async fn generate_masks(
    State(state): State<AppState>,
    ApiJson(request): ApiJson<GenerateMasksRequest>,
) -> Result<Json<GenerateMasksResponse>, ApiError> {
    generate(state, request, GenerateParams::STANDARD).await
}

/// POST /generate-masks-advanced
async fn generate_masks_advanced(
    State(state): State<AppState>,
    ApiJson(request): ApiJson<GenerateMasksRequest>,
) -> Result<Json<GenerateMasksResponse>, ApiError> {
    generate(state, request, GenerateParams::ADVANCED).await
}

/// Generate the whole-image mask set and make it the session's table
async fn generate(
    state: AppState,
    request: GenerateMasksRequest,
    preset: GenerateParams,
) -> Result<Json<GenerateMasksResponse>, ApiError> {
    let session = state.sessions.get(&request.session_id).await?;
    let params = preset.with_overrides(
        request.points_per_side,
        request.pred_iou_thresh,
        request.stability_score_thresh,
    );

    let generated = state
        .oracle
        .generate_all(&session.encoded_image, &params)
        .await?;
    let masks = generated
        .masks
        .into_iter()
        .map(|m| StoredMask {
            score: m.score,
            bbox: m.bbox,
            area: m.area,
            stability_score: m.stability_score,
            ..StoredMask::new(m.mask)
        })
        .collect();

    let updated = state.sessions.replace_masks(&session.id, masks).await?;
    info!(
        "Stored {} masks for session {} (points_per_side={})",
        updated.masks().len(),
        updated.id,
        params.points_per_side
    );

    Ok(Json(GenerateMasksResponse {
        session_id: updated.id.clone(),
        masks: updated.masks().iter().map(MaskInfo::from).collect(),
        total_masks: updated.masks().len(),
        width: updated.width,
        height: updated.height,
    }))
}

/// POST /combine-masks - union of stored masks
async fn combine_masks(
    State(state): State<AppState>,
    ApiJson(request): ApiJson<CombineMasksRequest>,
) -> Result<Json<CombineMasksResponse>, ApiError> {
    let session = state.sessions.get(&request.session_id).await?;
    if request.mask_ids.is_empty() {
        return Err(ApiError::BadRequest("No mask IDs provided".to_string()));
    }

    let encoded = request
        .mask_ids
        .iter()
        .map(|&mask_id| {
            session
                .mask(mask_id)
                .map(|m| Arc::clone(&m.mask))
                .ok_or_else(|| SessionError::MaskNotFound {
                    session_id: session.id.clone(),
                    mask_id,
                })
        })
        .collect::<Result<Vec<_>, _>>()?;

    let (width, height) = (session.width, session.height);
    let count = encoded.len();
    let combined = tokio::task::spawn_blocking(move || -> Result<String, ApiError> {
        let masks = encoded
            .iter()
            .map(|m| decode_fitted(m, width, height, MASK_THRESHOLD))
            .collect::<Result<Vec<BinaryMask>, _>>()?;
        let union = union_all(&masks)?.unwrap_or_else(|| BinaryMask::new(width, height));
        Ok(encode(&union)?)
    })
    .await??;

    debug!("Combined {} masks for session {}", count, session.id);
    Ok(Json(CombineMasksResponse {
        session_id: session.id.clone(),
        combined_mask: combined,
        width,
        height,
        num_masks_combined: count,
    }))
}

/// POST /get-mask-at-point - best-scoring candidate containing the point
async fn get_mask_at_point(
    State(state): State<AppState>,
    ApiJson(request): ApiJson<GetMaskAtPointRequest>,
) -> Result<Json<SegmentResponse>, ApiError> {
    let session = state.sessions.get(&request.session_id).await?;
    let (x, y) = parse_point(&request.point)?;

    let candidates = request.all_masks.filter(|masks| !masks.is_empty());
    let search = Arc::clone(&session);
    let (mask, score, bbox) = tokio::task::spawn_blocking(move || {
        let (width, height) = (search.width, search.height);
        match candidates {
            Some(masks) => best_mask_at(x, y, &masks, width, height)
                .map(|m| (m.mask.clone(), m.score, m.bbox)),
            None => best_mask_at(x, y, search.masks(), width, height)
                .map(|m| (m.mask.to_string(), m.score, m.bbox)),
        }
    })
    .await??;

    Ok(Json(SegmentResponse {
        session_id: session.id.clone(),
        mask,
        score,
        bbox,
    }))
}

/// POST /generate-mask-at-point - oracle segmentation from one foreground click
async fn generate_mask_at_point(
    State(state): State<AppState>,
    ApiJson(request): ApiJson<GenerateMaskAtPointRequest>,
) -> Result<Json<SegmentResponse>, ApiError> {
    let session = state.sessions.get(&request.session_id).await?;
    let (x, y) = parse_point(&request.point)?;

    let prompt = SegmentPrompt {
        points: vec![PromptPoint::foreground(x, y)],
        ..Default::default()
    };
    let result = state.oracle.segment(&session.encoded_image, &prompt).await?;
    Ok(Json(SegmentResponse::new(session.id.clone(), result)))
}

/// POST /paint-mask
async fn paint_mask(
    State(state): State<AppState>,
    ApiJson(request): ApiJson<PaintMaskRequest>,
) -> Result<Json<PaintMaskResponse>, ApiError> {
    let session = state.sessions.get(&request.session_id).await?;
    let colored = ColoredMaskRequest::from_parts(
        request.mask_id,
        request.mask,
        request.color.as_deref(),
        request.opacity,
    )?;

    let painted = state.painter.paint(&session, vec![colored]).await?;
    Ok(Json(PaintMaskResponse {
        session_id: session.id.clone(),
        painted_image: painted.encoded,
        width: session.width,
        height: session.height,
    }))
}

/// POST /paint-multiple-masks - inline mask data wins over a stored id
async fn paint_multiple_masks(
    State(state): State<AppState>,
    ApiJson(request): ApiJson<PaintMultipleMasksRequest>,
) -> Result<Json<PaintMultipleMasksResponse>, ApiError> {
    let session = state.sessions.get(&request.session_id).await?;
    if request.colored_masks.is_empty() {
        return Err(PaintError::NoLayers.into());
    }

    let colored = request
        .colored_masks
        .into_iter()
        .map(|entry| {
            ColoredMaskRequest::from_parts_inline_first(
                entry.mask_id,
                entry.mask,
                entry.color.as_deref(),
                entry.opacity,
            )
        })
        .collect::<Result<Vec<_>, _>>()?;

    let painted = state.painter.paint(&session, colored).await?;
    Ok(Json(PaintMultipleMasksResponse {
        session_id: session.id.clone(),
        painted_image: painted.encoded,
        width: session.width,
        height: session.height,
        num_masks_painted: painted.layers,
    }))
}

/// POST /download-image - write the session's image to the results directory
async fn download_image(
    State(state): State<AppState>,
    ApiJson(request): ApiJson<DownloadImageRequest>,
) -> Result<Json<DownloadResponse>, ApiError> {
    let session = state.sessions.get(&request.session_id).await?;
    let format: OutputFormat = request.format.parse()?;
    let quality = parse_quality(request.quality)?;

    let filename = result_filename(&session.id, &session.file_stem(), false, format);
    let saved = state
        .results
        .save(&filename, (*session.image).clone(), format, quality)
        .await?;

    Ok(Json(download_response(&session, saved, format, "Image download ready")))
}

/// POST /download-painted-image - paint one mask and write the result
async fn download_painted_image(
    State(state): State<AppState>,
    ApiJson(request): ApiJson<DownloadPaintedImageRequest>,
) -> Result<Json<DownloadResponse>, ApiError> {
    let session = state.sessions.get(&request.session_id).await?;
    let format: OutputFormat = request.format.parse()?;
    let quality = parse_quality(request.quality)?;
    let colored = ColoredMaskRequest::from_parts(
        request.mask_id,
        request.mask,
        request.color.as_deref(),
        request.opacity,
    )?;

    let painted = state.painter.paint(&session, vec![colored]).await?;
    let filename = result_filename(&session.id, &session.file_stem(), true, format);
    let saved = state
        .results
        .save(&filename, painted.image, format, quality)
        .await?;

    Ok(Json(download_response(
        &session,
        saved,
        format,
        "Painted image download ready",
    )))
}

fn download_response(
    session: &Session,
    saved: SavedFile,
    format: OutputFormat,
    message: &str,
) -> DownloadResponse {
    DownloadResponse {
        session_id: session.id.clone(),
        image_url: saved.download_url,
        format: format.as_str().to_string(),
        size_bytes: saved.size_bytes,
        message: message.to_string(),
    }
}

/// GET /download-file/:filename
async fn download_file(
    State(state): State<AppState>,
    Path(filename): Path<String>,
) -> Result<Response, ApiError> {
    let (bytes, content_type) = state.results.read(&filename).await?;

    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, content_type.to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename={}", filename),
            ),
            (header::CACHE_CONTROL, "no-cache".to_string()),
        ],
        bytes,
    )
        .into_response())
}

/// GET /list-downloads
async fn list_downloads(
    State(state): State<AppState>,
) -> Result<Json<ListDownloadsResponse>, ApiError> {
    let downloads = state.results.list().await?;
    let total_files = downloads.len();
    let message = if total_files == 0 {
        "No downloads available".to_string()
    } else {
        format!("Found {} downloadable files", total_files)
    };

    Ok(Json(ListDownloadsResponse {
        downloads,
        total_files,
        message,
    }))
}

/// GET /session/:session_id
async fn session_info(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<Json<SessionInfoResponse>, ApiError> {
    let session = state.sessions.get(&session_id).await?;

    Ok(Json(SessionInfoResponse {
        session_id: session.id.clone(),
        filename: session.filename.clone(),
        width: session.width,
        height: session.height,
        created_at: session
            .created_at_utc
            .to_rfc3339_opts(SecondsFormat::Secs, true),
        stored_masks: session.masks().len(),
        message: "Session information retrieved successfully".to_string(),
    }))
}

/// DELETE /session/:session_id
async fn delete_session(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<Json<MessageResponse>, ApiError> {
    state.sessions.delete(&session_id).await?;

    Ok(Json(MessageResponse {
        message: "Session deleted successfully".to_string(),
    }))
}
