//! On-disk store for downloadable results
//!
//! Rendered images are written under a single flat directory and served back
//! by filename. Filenames are never allowed to leave that directory.

use std::path::{Path, PathBuf};
use std::str::FromStr;

use image::RgbImage;
use serde::Serialize;
use thiserror::Error;
use tokio::fs;
use tracing::{debug, info};

use crate::mask::MaskError;
use crate::mask::codec::{ImageFormat, encode_image_bytes};

/// JPEG quality used when a request does not give one
pub const DEFAULT_JPEG_QUALITY: u8 = 95;

/// Errors that can occur when saving or serving results
#[derive(Debug, Error)]
pub enum ResultsError {
    #[error("Invalid filename: {0}")]
    InvalidFilename(String),

    #[error("File not found: {0}")]
    NotFound(String),

    #[error("Unsupported format '{0}': must be PNG or JPG")]
    UnsupportedFormat(String),

    #[error("Invalid quality {0}: must be between 1 and 100")]
    InvalidQuality(i64),

    #[error(transparent)]
    Encode(#[from] MaskError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Download file format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Png,
    Jpg,
}

impl OutputFormat {
    pub fn extension(self) -> &'static str {
        match self {
            Self::Png => "png",
            Self::Jpg => "jpg",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Png => "PNG",
            Self::Jpg => "JPG",
        }
    }
}

impl FromStr for OutputFormat {
    type Err = ResultsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "PNG" => Ok(Self::Png),
            "JPG" | "JPEG" => Ok(Self::Jpg),
            _ => Err(ResultsError::UnsupportedFormat(s.to_string())),
        }
    }
}

/// Validate a requested JPEG quality, defaulting when absent
pub fn parse_quality(quality: Option<i64>) -> Result<u8, ResultsError> {
    match quality {
        None => Ok(DEFAULT_JPEG_QUALITY),
        Some(q) if (1..=100).contains(&q) => Ok(q as u8),
        Some(q) => Err(ResultsError::InvalidQuality(q)),
    }
}

/// A file written to the results directory
#[derive(Debug, Clone, Serialize)]
pub struct SavedFile {
    pub filename: String,
    pub size_bytes: u64,
    pub download_url: String,
}

/// Results directory handle
#[derive(Debug, Clone)]
pub struct ResultStore {
    dir: PathBuf,
}

impl ResultStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Encode `image` and write it as `filename`
    pub async fn save(
        &self,
        filename: &str,
        image: RgbImage,
        format: OutputFormat,
        quality: u8,
    ) -> Result<SavedFile, ResultsError> {
        let path = self.path_for(filename)?;
        let encoding = match format {
            OutputFormat::Png => ImageFormat::Png,
            OutputFormat::Jpg => ImageFormat::Jpeg(quality),
        };
        let bytes = tokio::task::spawn_blocking(move || encode_image_bytes(&image, encoding))
            .await
            .map_err(|e| ResultsError::Io(std::io::Error::other(e)))??;

        fs::create_dir_all(&self.dir).await?;
        fs::write(&path, &bytes).await?;
        info!("Saved result {} ({} bytes)", filename, bytes.len());

        Ok(SavedFile {
            filename: filename.to_string(),
            size_bytes: bytes.len() as u64,
            download_url: download_url(filename),
        })
    }

    /// Read a stored file and its content type
    pub async fn read(&self, filename: &str) -> Result<(Vec<u8>, &'static str), ResultsError> {
        let path = self.path_for(filename)?;
        let bytes = match fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(ResultsError::NotFound(filename.to_string()));
            }
            Err(e) => return Err(e.into()),
        };
        debug!("Serving result {} ({} bytes)", filename, bytes.len());
        Ok((bytes, content_type(filename)))
    }

    /// Every downloadable image in the directory, sorted by name
    pub async fn list(&self) -> Result<Vec<SavedFile>, ResultsError> {
        let mut entries = match fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut files = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let Ok(filename) = entry.file_name().into_string() else {
                continue;
            };
            if !is_image_filename(&filename) {
                continue;
            }
            let size_bytes = entry.metadata().await.map(|m| m.len()).unwrap_or(0);
            files.push(SavedFile {
                download_url: download_url(&filename),
                filename,
                size_bytes,
            });
        }
        files.sort_by(|a, b| a.filename.cmp(&b.filename));
        Ok(files)
    }

    fn path_for(&self, filename: &str) -> Result<PathBuf, ResultsError> {
        if filename.is_empty()
            || filename.contains("..")
            || filename.contains('/')
            || filename.contains('\\')
        {
            return Err(ResultsError::InvalidFilename(filename.to_string()));
        }
        Ok(self.dir.join(filename))
    }
}

/// Name for a downloaded copy of a session's image
pub fn result_filename(
    session_id: &str,
    stem: &str,
    painted: bool,
    format: OutputFormat,
) -> String {
    let suffix = if painted { "_painted" } else { "" };
    format!("{}_{}{}.{}", session_id, stem, suffix, format.extension())
}

fn download_url(filename: &str) -> String {
    format!("/download-file/{}", filename)
}

fn extension(filename: &str) -> String {
    Path::new(filename)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default()
}

fn is_image_filename(filename: &str) -> bool {
    matches!(extension(filename).as_str(), "png" | "jpg" | "jpeg")
}

fn content_type(filename: &str) -> &'static str {
    match extension(filename).as_str() {
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        _ => "application/octet-stream",
    }
}
