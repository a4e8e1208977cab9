//! Mask compositing
//!
//! - `compositor`: the pixel pipeline (`paint_one`, `paint_many`)
//! - `service`: remote-first painting with a mandatory local fallback
//! - `types`: colored-mask requests and paint errors

pub mod compositor;
pub mod service;
pub mod types;

pub use compositor::{paint_many, paint_one};
pub use service::{PaintService, PaintSource, PaintedImage};
pub use types::{
    ColoredMaskRequest, DEFAULT_COLOR, DEFAULT_OPACITY, PaintColor, PaintError, PaintLayer,
};
