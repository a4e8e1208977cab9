//! Segmentation oracle boundary
//!
//! The oracle computes masks; this crate only stores, selects and paints
//! them. `HttpOracle` talks to a remote deployment, tests substitute their
//! own implementation of [`SegmentationOracle`].

pub mod remote;
pub mod service;
pub mod types;

pub use remote::HttpOracle;
pub use service::SegmentationOracle;
pub use types::{
    GenerateParams, GeneratedMask, GeneratedMaskSet, OracleError, PromptBox, PromptPoint,
    RemoteColoredMask, RemotePaintResult, SegmentPrompt, SegmentResult,
};
