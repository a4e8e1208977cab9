use crate::mask::codec::{MASK_THRESHOLD, decode_fitted};
use crate::mask::{BinaryMask, BoundingBox, MaskError, ScoredMask};
use chrono::{DateTime, Utc};
use image::RgbImage;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};
use uuid::Uuid;

/// Session ID: hyphenated UUIDv4, never reused
pub type SessionId = String;

/// Generate a fresh session ID
pub fn generate_session_id() -> SessionId {
    Uuid::new_v4().to_string()
}

/// A mask held in a session's table
///
/// The mask is kept in its transport encoding and decoded on use, fitted to
/// the owning session's image dimensions.
#[derive(Debug, Clone)]
pub struct StoredMask {
    /// Position in the session's table, assigned by the store
    pub id: u32,
    /// Transport-encoded mask
    pub mask: Arc<str>,
    /// Oracle quality estimate
    pub score: Option<f32>,
    pub bbox: Option<BoundingBox>,
    /// Set-pixel count
    pub area: Option<u64>,
    pub stability_score: Option<f32>,
}

impl StoredMask {
    /// Build an unnumbered mask; the store assigns the id on insertion
    pub fn new(mask: impl Into<Arc<str>>) -> Self {
        Self {
            id: 0,
            mask: mask.into(),
            score: None,
            bbox: None,
            area: None,
            stability_score: None,
        }
    }

    /// Decode and fit to `width`x`height`
    pub fn decode(&self, width: u32, height: u32) -> Result<BinaryMask, MaskError> {
        decode_fitted(&self.mask, width, height, MASK_THRESHOLD)
    }
}

impl ScoredMask for StoredMask {
    fn encoded_mask(&self) -> &str {
        &self.mask
    }

    fn score(&self) -> Option<f32> {
        self.score
    }
}

/// Input for creating a session
pub struct NewSession {
    /// Original upload filename
    pub filename: String,
    /// Decoded image
    pub image: RgbImage,
    /// Transport encoding of `image`, sent to clients and the oracle
    pub encoded_image: String,
}

/// Session data
///
/// Sessions are immutable snapshots: replacing the mask table produces a
/// new `Session` sharing the same image.
#[derive(Debug, Clone)]
pub struct Session {
    pub id: SessionId,
    pub filename: String,
    pub width: u32,
    pub height: u32,
    pub image: Arc<RgbImage>,
    pub encoded_image: Arc<str>,
    /// Monotonic creation time; the TTL is measured from here
    pub created_at: Instant,
    /// Wall-clock creation time for display
    pub created_at_utc: DateTime<Utc>,
    masks: Arc<Vec<StoredMask>>,
}

impl Session {
    pub(crate) fn new(id: SessionId, new: NewSession) -> Self {
        Self {
            id,
            filename: new.filename,
            width: new.image.width(),
            height: new.image.height(),
            image: Arc::new(new.image),
            encoded_image: new.encoded_image.into(),
            created_at: Instant::now(),
            created_at_utc: Utc::now(),
            masks: Arc::new(Vec::new()),
        }
    }

    /// Copy of this session with a different mask table
    pub(crate) fn with_masks(&self, masks: Vec<StoredMask>) -> Self {
        Self {
            masks: Arc::new(masks),
            ..self.clone()
        }
    }

    /// Stored mask by id
    pub fn mask(&self, mask_id: u32) -> Option<&StoredMask> {
        self.masks.get(mask_id as usize)
    }

    /// The whole mask table, in generation order
    pub fn masks(&self) -> &[StoredMask] {
        &self.masks
    }

    pub fn age(&self) -> Duration {
        self.created_at.elapsed()
    }

    /// Filename without extension, for naming downloads
    pub fn file_stem(&self) -> String {
        Path::new(&self.filename)
            .file_stem()
            .and_then(|s| s.to_str())
            .map(|s| s.to_string())
            .unwrap_or_else(|| "image".to_string())
    }
}

/// Session configuration
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Sessions older than this are reaped, regardless of activity
    pub ttl: Duration,
    /// How often the reaper scans the table
    pub reaper_interval: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(60 * 60),             // 1 hour
            reaper_interval: Duration::from_secs(60 * 60), // 1 hour
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mask::codec::encode;

    fn new_session(filename: &str) -> Session {
        Session::new(
            generate_session_id(),
            NewSession {
                filename: filename.to_string(),
                image: RgbImage::new(8, 4),
                encoded_image: String::new(),
            },
        )
    }

    #[test]
    fn test_session_ids_are_unique() {
        let a = generate_session_id();
        let b = generate_session_id();
        assert_ne!(a, b);
        assert!(Uuid::parse_str(&a).is_ok());
    }

    #[test]
    fn test_file_stem() {
        assert_eq!(new_session("house.front.jpg").file_stem(), "house.front");
        assert_eq!(new_session("wall").file_stem(), "wall");
    }

    #[test]
    fn test_with_masks_shares_image() {
        let session = new_session("a.png");
        let updated = session.with_masks(vec![StoredMask::new("x")]);

        assert!(Arc::ptr_eq(&session.image, &updated.image));
        assert!(session.masks().is_empty());
        assert_eq!(updated.masks().len(), 1);
    }

    #[test]
    fn test_stored_mask_decodes_to_session_dimensions() {
        let small = BinaryMask::from_fn(4, 2, |x, _| x < 2);
        let stored = StoredMask::new(encode(&small).unwrap());

        let decoded = stored.decode(8, 4).unwrap();
        assert_eq!(decoded.dimensions(), (8, 4));
        assert_eq!(decoded.count_ones(), 16);
    }
}
