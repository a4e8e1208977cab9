//! Upload validation, preprocessing and duplicate detection

use std::io::Cursor;
use std::path::Path;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use image::{ImageReader, RgbImage, imageops};
use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::debug;

use crate::mask::MaskError;
use crate::mask::codec::encode_transport_image;
use crate::session::SessionId;

/// Accepted upload extensions, lowercase
pub const ALLOWED_EXTENSIONS: [&str; 5] = ["jpg", "jpeg", "png", "bmp", "tiff"];

/// Uploads above this pixel count are rejected
const MAX_PIXELS: u64 = 10_000 * 10_000;

/// Uploads above this pixel count are downscaled to fit `MAX_DIMENSION`
const DOWNSCALE_PIXELS: u64 = 5_000 * 5_000;
const MAX_DIMENSION: u32 = 5_000;

/// Errors that can occur while accepting an upload
#[derive(Debug, Error)]
pub enum UploadError {
    #[error("No file provided")]
    MissingFile,

    #[error("File type not allowed. Allowed types: {}", ALLOWED_EXTENSIONS.join(", "))]
    UnsupportedType,

    #[error("File too large. Maximum size: {max_mb}MB")]
    TooLarge { max_mb: usize },

    #[error("Image dimensions too large ({width}x{height}). Maximum: 10000x10000 pixels")]
    DimensionsTooLarge { width: u32, height: u32 },

    #[error("Invalid image file: {0}")]
    InvalidImage(String),

    #[error(transparent)]
    Encode(#[from] MaskError),

    #[error("Image processing task failed: {0}")]
    Task(String),
}

/// Check the upload's extension against [`ALLOWED_EXTENSIONS`]
pub fn validate_filename(filename: &str) -> Result<(), UploadError> {
    let extension = Path::new(filename)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .ok_or(UploadError::UnsupportedType)?;

    if ALLOWED_EXTENSIONS.contains(&extension.as_str()) {
        Ok(())
    } else {
        Err(UploadError::UnsupportedType)
    }
}

/// Decoded upload ready to become a session
#[derive(Debug)]
pub struct PreparedImage {
    pub image: RgbImage,
    /// Transport encoding of `image`
    pub encoded: String,
}

/// Decode, bound and transport-encode an uploaded image
pub fn prepare_image(bytes: &[u8]) -> Result<PreparedImage, UploadError> {
    let reader = ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .map_err(|e| UploadError::InvalidImage(e.to_string()))?;
    let (width, height) = reader
        .into_dimensions()
        .map_err(|e| UploadError::InvalidImage(e.to_string()))?;

    let pixels = width as u64 * height as u64;
    if pixels > MAX_PIXELS {
        return Err(UploadError::DimensionsTooLarge { width, height });
    }

    let mut image = image::load_from_memory(bytes)
        .map_err(|e| UploadError::InvalidImage(e.to_string()))?
        .into_rgb8();

    if pixels > DOWNSCALE_PIXELS && (width > MAX_DIMENSION || height > MAX_DIMENSION) {
        let (new_width, new_height) = downscaled_size(width, height);
        debug!(
            "Downscaling upload from {}x{} to {}x{}",
            width, height, new_width, new_height
        );
        image = imageops::resize(&image, new_width, new_height, imageops::FilterType::Lanczos3);
    }

    let encoded = encode_transport_image(&image)?;
    Ok(PreparedImage { image, encoded })
}

fn downscaled_size(width: u32, height: u32) -> (u32, u32) {
    let ratio = f64::min(
        MAX_DIMENSION as f64 / width as f64,
        MAX_DIMENSION as f64 / height as f64,
    );
    (
        ((width as f64 * ratio) as u32).max(1),
        ((height as f64 * ratio) as u32).max(1),
    )
}

/// SHA-256 of the upload bytes, hex-encoded
pub fn fingerprint(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

struct DedupEntry {
    session_id: SessionId,
    seen_at: Instant,
}

/// Maps recent upload fingerprints to the session they created
pub struct UploadDedup {
    entries: DashMap<String, DedupEntry>,
    window: Duration,
}

impl UploadDedup {
    pub fn new(window: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            window,
        }
    }

    /// Session created for this fingerprint within the window, if any
    pub fn lookup(&self, fingerprint: &str) -> Option<SessionId> {
        let entry = self.entries.get(fingerprint)?;
        if entry.seen_at.elapsed() < self.window {
            return Some(entry.session_id.clone());
        }
        drop(entry);
        self.entries.remove(fingerprint);
        None
    }

    pub fn record(&self, fingerprint: String, session_id: SessionId) {
        self.prune();
        self.entries.insert(
            fingerprint,
            DedupEntry {
                session_id,
                seen_at: Instant::now(),
            },
        );
    }

    pub fn forget(&self, fingerprint: &str) {
        self.entries.remove(fingerprint);
    }

    fn prune(&self) {
        let window = self.window;
        self.entries.retain(|_, entry| entry.seen_at.elapsed() < window);
    }
}
