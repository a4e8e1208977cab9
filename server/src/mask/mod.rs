//! Binary region masks
//!
//! This module provides:
//! - `BinaryMask`, the in-memory mask representation
//! - The base64/PNG transport codec for masks and images
//! - Geometry helpers (bounding box, point containment, union)
//! - Point-based selection over a scored candidate set

pub mod codec;
pub mod geometry;
pub mod selection;
mod types;

pub use selection::{ScoredMask, SelectionError, best_mask_at};
pub use types::{BinaryMask, BoundingBox, MaskError};
