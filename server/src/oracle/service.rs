//! SegmentationOracle trait definition

use async_trait::async_trait;

use super::types::{
    GenerateParams, GeneratedMaskSet, OracleError, RemoteColoredMask, RemotePaintResult,
    SegmentPrompt, SegmentResult,
};

/// Trait for the external segmentation service
///
/// Images and masks cross this boundary in their base64 transport encoding.
#[async_trait]
pub trait SegmentationOracle: Send + Sync {
    /// Single best mask for a prompt
    async fn segment(&self, image: &str, prompt: &SegmentPrompt)
    -> Result<SegmentResult, OracleError>;

    /// Exhaustive mask set for the whole image
    async fn generate_all(
        &self,
        image: &str,
        params: &GenerateParams,
    ) -> Result<GeneratedMaskSet, OracleError>;

    /// Composite colored masks remotely
    async fn paint_remote(
        &self,
        image: &str,
        layers: &[RemoteColoredMask],
    ) -> Result<RemotePaintResult, OracleError>;

    /// Oracle health payload
    async fn health(&self) -> Result<serde_json::Value, OracleError>;

    /// Base URL, for display
    fn endpoint(&self) -> &str;
}
