//! Maskpaint Server Library
//!
//! Session-scoped mask store and compositing engine for interactive image
//! segmentation. Exported for integration tests and external tooling.

pub mod config;
pub mod mask;
pub mod oracle;
pub mod paint;
pub mod results;
pub mod server;
pub mod session;

// Re-export commonly used types
pub use mask::{BinaryMask, MaskError};
pub use oracle::{HttpOracle, OracleError, SegmentationOracle};
pub use paint::{PaintService, paint_many, paint_one};
pub use server::{AppState, build_router};
pub use session::{SessionError, SessionStore};
