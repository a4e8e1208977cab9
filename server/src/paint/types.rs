//! Paint request types and error definitions

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use thiserror::Error;

use crate::mask::MaskError;
use crate::session::{Session, SessionError};

/// Color used when a request does not name one
pub const DEFAULT_COLOR: PaintColor = PaintColor([0xFF, 0x00, 0x00]);

/// Opacity used when a request does not give one
pub const DEFAULT_OPACITY: f32 = 0.7;

/// Errors that can occur while resolving or compositing paint layers
#[derive(Debug, Error)]
pub enum PaintError {
    #[error("Invalid color '{0}': expected #RRGGBB")]
    InvalidColor(String),

    #[error("Invalid opacity {0}: must be between 0 and 1")]
    InvalidOpacity(f32),

    #[error("Either mask_id or mask must be provided")]
    MissingMask,

    #[error("No colored masks provided")]
    NoLayers,

    #[error(transparent)]
    Mask(#[from] MaskError),

    #[error(transparent)]
    Session(#[from] SessionError),

    #[error("Compositing task failed: {0}")]
    Task(String),
}

/// Opaque RGB paint color
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PaintColor(pub [u8; 3]);

impl PaintColor {
    pub fn channels(&self) -> [u8; 3] {
        self.0
    }
}

impl FromStr for PaintColor {
    type Err = PaintError;

    /// Parse `#RRGGBB`; the leading `#` is optional
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let hex = s.trim().strip_prefix('#').unwrap_or(s.trim());
        if hex.len() != 6 || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(PaintError::InvalidColor(s.to_string()));
        }

        let mut rgb = [0u8; 3];
        for (i, channel) in rgb.iter_mut().enumerate() {
            *channel = u8::from_str_radix(&hex[i * 2..i * 2 + 2], 16)
                .map_err(|_| PaintError::InvalidColor(s.to_string()))?;
        }
        Ok(Self(rgb))
    }
}

impl fmt::Display for PaintColor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [r, g, b] = self.0;
        write!(f, "#{:02X}{:02X}{:02X}", r, g, b)
    }
}

fn validate_opacity(opacity: f32) -> Result<f32, PaintError> {
    if opacity.is_finite() && (0.0..=1.0).contains(&opacity) {
        Ok(opacity)
    } else {
        Err(PaintError::InvalidOpacity(opacity))
    }
}

/// A mask to paint, referenced either by stored id or inline
#[derive(Debug, Clone)]
pub enum ColoredMaskRequest {
    ById {
        mask_id: u32,
        color: PaintColor,
        opacity: f32,
    },
    Inline {
        mask: String,
        color: PaintColor,
        opacity: f32,
    },
}

impl ColoredMaskRequest {
    /// Build a request from loosely-shaped input
    ///
    /// A stored id takes precedence over inline data. Missing color and
    /// opacity fall back to [`DEFAULT_COLOR`] and [`DEFAULT_OPACITY`].
    pub fn from_parts(
        mask_id: Option<u32>,
        mask: Option<String>,
        color: Option<&str>,
        opacity: Option<f32>,
    ) -> Result<Self, PaintError> {
        let color = match color {
            Some(c) => c.parse()?,
            None => DEFAULT_COLOR,
        };
        let opacity = validate_opacity(opacity.unwrap_or(DEFAULT_OPACITY))?;

        match (mask_id, mask) {
            (Some(mask_id), _) => Ok(Self::ById {
                mask_id,
                color,
                opacity,
            }),
            (None, Some(mask)) if !mask.trim().is_empty() => Ok(Self::Inline {
                mask,
                color,
                opacity,
            }),
            _ => Err(PaintError::MissingMask),
        }
    }

    /// Like [`from_parts`](Self::from_parts), but non-blank inline data
    /// takes precedence over a stored id
    pub fn from_parts_inline_first(
        mask_id: Option<u32>,
        mask: Option<String>,
        color: Option<&str>,
        opacity: Option<f32>,
    ) -> Result<Self, PaintError> {
        match mask {
            Some(mask) if !mask.trim().is_empty() => {
                Self::from_parts(None, Some(mask), color, opacity)
            }
            _ => Self::from_parts(mask_id, None, color, opacity),
        }
    }

    pub fn color(&self) -> PaintColor {
        match self {
            Self::ById { color, .. } | Self::Inline { color, .. } => *color,
        }
    }

    pub fn opacity(&self) -> f32 {
        match self {
            Self::ById { opacity, .. } | Self::Inline { opacity, .. } => *opacity,
        }
    }

    /// Resolve against a session snapshot into a paintable layer
    pub fn resolve(self, session: &Session) -> Result<PaintLayer, PaintError> {
        match self {
            Self::ById {
                mask_id,
                color,
                opacity,
            } => {
                let stored = session.mask(mask_id).ok_or_else(|| SessionError::MaskNotFound {
                    session_id: session.id.clone(),
                    mask_id,
                })?;
                Ok(PaintLayer {
                    mask: Arc::clone(&stored.mask),
                    color,
                    opacity,
                })
            }
            Self::Inline {
                mask,
                color,
                opacity,
            } => Ok(PaintLayer {
                mask: mask.into(),
                color,
                opacity,
            }),
        }
    }
}

/// A resolved paint layer: encoded mask plus how to paint it
#[derive(Debug, Clone)]
pub struct PaintLayer {
    pub mask: Arc<str>,
    pub color: PaintColor,
    pub opacity: f32,
}
