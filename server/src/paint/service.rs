//! Paint service: remote compositing with a local fallback

use std::sync::Arc;
use std::time::Instant;

use image::RgbImage;
use metrics::{counter, histogram};
use tracing::{debug, warn};

use crate::mask::BinaryMask;
use crate::mask::codec::{decode_fallback, decode_image, encode_png};
use crate::oracle::{OracleError, RemoteColoredMask, SegmentationOracle};
use crate::session::Session;

use super::compositor::paint_many;
use super::types::{ColoredMaskRequest, PaintError, PaintLayer};

/// Which path produced a painted image
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaintSource {
    Remote,
    Local,
}

impl PaintSource {
    fn as_str(self) -> &'static str {
        match self {
            Self::Remote => "remote",
            Self::Local => "local",
        }
    }
}

/// A composited image in both decoded and transport form
#[derive(Debug, Clone)]
pub struct PaintedImage {
    pub image: RgbImage,
    /// Base64 PNG
    pub encoded: String,
    pub layers: usize,
    pub source: PaintSource,
}

/// Paints resolved mask layers onto a session's image
pub struct PaintService {
    oracle: Arc<dyn SegmentationOracle>,
    remote_enabled: bool,
}

impl PaintService {
    pub fn new(oracle: Arc<dyn SegmentationOracle>, remote_enabled: bool) -> Self {
        Self {
            oracle,
            remote_enabled,
        }
    }

    /// Resolve `requests` against `session` and paint them in order
    ///
    /// Unknown stored ids fail before anything is painted. When remote
    /// compositing is enabled it is tried first; any remote failure falls
    /// back to local compositing.
    pub async fn paint(
        &self,
        session: &Session,
        requests: Vec<ColoredMaskRequest>,
    ) -> Result<PaintedImage, PaintError> {
        let layers = requests
            .into_iter()
            .map(|request| request.resolve(session))
            .collect::<Result<Vec<_>, _>>()?;

        let start = Instant::now();
        let result = if self.remote_enabled && !layers.is_empty() {
            match self.paint_remote(session, &layers).await {
                Ok(painted) => Ok(painted),
                Err(e) => {
                    warn!(
                        "Remote paint failed for session {}, using local fallback: {}",
                        session.id, e
                    );
                    counter!("maskpaint_paint_fallback_total").increment(1);
                    paint_local(session, layers).await
                }
            }
        } else {
            paint_local(session, layers).await
        };

        if let Ok(ref painted) = result {
            histogram!("maskpaint_paint_duration_seconds", "source" => painted.source.as_str())
                .record(start.elapsed());
            debug!(
                "Painted {} layers on session {} ({})",
                painted.layers,
                session.id,
                painted.source.as_str()
            );
        }
        result
    }

    async fn paint_remote(
        &self,
        session: &Session,
        layers: &[PaintLayer],
    ) -> Result<PaintedImage, OracleError> {
        let remote: Vec<RemoteColoredMask> = layers.iter().map(RemoteColoredMask::from).collect();
        let result = self
            .oracle
            .paint_remote(&session.encoded_image, &remote)
            .await?;

        let (width, height) = (session.width, session.height);
        let encoded = result.painted_image;
        let image = tokio::task::spawn_blocking({
            let encoded = encoded.clone();
            move || decode_image(&encoded)
        })
        .await
        .map_err(|e| OracleError::InvalidResponse(e.to_string()))?
        .map_err(|e| OracleError::InvalidResponse(e.to_string()))?;

        if image.dimensions() != (width, height) {
            return Err(OracleError::InvalidResponse(format!(
                "painted image is {}x{}, expected {}x{}",
                image.width(),
                image.height(),
                width,
                height
            )));
        }

        Ok(PaintedImage {
            image,
            encoded,
            layers: layers.len(),
            source: PaintSource::Remote,
        })
    }
}

/// Decode every layer with the fallback decoder, then composite on a
/// blocking thread
async fn paint_local(
    session: &Session,
    layers: Vec<PaintLayer>,
) -> Result<PaintedImage, PaintError> {
    let image = Arc::clone(&session.image);
    let (width, height) = (session.width, session.height);

    tokio::task::spawn_blocking(move || -> Result<PaintedImage, PaintError> {
        let masks = layers
            .iter()
            .map(|layer| decode_fallback(&layer.mask, width, height))
            .collect::<Result<Vec<BinaryMask>, _>>()?;

        let painted = paint_many(
            &image,
            masks
                .iter()
                .zip(&layers)
                .map(|(mask, layer)| (mask, layer.color, layer.opacity)),
        )?;
        let encoded = encode_png(&painted)?;

        Ok(PaintedImage {
            image: painted,
            encoded,
            layers: layers.len(),
            source: PaintSource::Local,
        })
    })
    .await
    .map_err(|e| PaintError::Task(e.to_string()))?
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mask::codec::encode;
    use crate::oracle::{
        GenerateParams, GeneratedMaskSet, RemotePaintResult, SegmentPrompt, SegmentResult,
    };
    use crate::paint::PaintColor;
    use crate::session::{NewSession, SessionError, SessionStore, StoredMask};
    use async_trait::async_trait;
    use base64::Engine;
    use image::Rgb;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Oracle whose paint endpoint returns a fixed reply
    struct PaintOnlyOracle {
        reply: Result<RgbImage, ()>,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl SegmentationOracle for PaintOnlyOracle {
        async fn segment(&self, _: &str, _: &SegmentPrompt) -> Result<SegmentResult, OracleError> {
            Err(OracleError::Upstream("unused".into()))
        }

        async fn generate_all(
            &self,
            _: &str,
            _: &GenerateParams,
        ) -> Result<GeneratedMaskSet, OracleError> {
            Err(OracleError::Upstream("unused".into()))
        }

        async fn paint_remote(
            &self,
            _: &str,
            _: &[RemoteColoredMask],
        ) -> Result<RemotePaintResult, OracleError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match &self.reply {
                Ok(image) => Ok(RemotePaintResult {
                    painted_image: encode_png(image).unwrap(),
                    width: Some(image.width()),
                    height: Some(image.height()),
                }),
                Err(()) => Err(OracleError::Transport("connection refused".into())),
            }
        }

        async fn health(&self) -> Result<serde_json::Value, OracleError> {
            Ok(serde_json::json!({"status": "ok"}))
        }

        fn endpoint(&self) -> &str {
            "mock://oracle"
        }
    }

    fn oracle(reply: Result<RgbImage, ()>) -> Arc<PaintOnlyOracle> {
        Arc::new(PaintOnlyOracle {
            reply,
            calls: AtomicUsize::new(0),
        })
    }

    async fn session_with_mask() -> Arc<Session> {
        let store = SessionStore::new();
        let session = store
            .create(NewSession {
                filename: "wall.png".into(),
                image: RgbImage::from_pixel(8, 8, Rgb([100, 100, 100])),
                encoded_image: String::new(),
            })
            .await;
        let mask = BinaryMask::from_fn(8, 8, |x, _| x < 4);
        store
            .replace_masks(&session.id, vec![StoredMask::new(encode(&mask).unwrap())])
            .await
            .unwrap()
    }

    fn by_id(mask_id: u32, opacity: f32) -> ColoredMaskRequest {
        ColoredMaskRequest::ById {
            mask_id,
            color: PaintColor([0, 0, 255]),
            opacity,
        }
    }

    #[tokio::test]
    async fn test_remote_result_is_used() {
        let remote_image = RgbImage::from_pixel(8, 8, Rgb([1, 2, 3]));
        let oracle = oracle(Ok(remote_image.clone()));
        let service = PaintService::new(oracle.clone(), true);
        let session = session_with_mask().await;

        let painted = service.paint(&session, vec![by_id(0, 0.5)]).await.unwrap();

        assert_eq!(painted.source, PaintSource::Remote);
        assert_eq!(painted.image, remote_image);
        assert_eq!(oracle.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_remote_failure_falls_back_to_local() {
        let service = PaintService::new(oracle(Err(())), true);
        let session = session_with_mask().await;

        let painted = service.paint(&session, vec![by_id(0, 0.2)]).await.unwrap();

        assert_eq!(painted.source, PaintSource::Local);
        assert_eq!(painted.layers, 1);
        // Left half painted toward blue, right half untouched
        assert!(painted.image.get_pixel(1, 4).0[2] > 100);
        assert_eq!(painted.image.get_pixel(6, 4).0, [100, 100, 100]);
    }

    #[tokio::test]
    async fn test_wrong_size_remote_image_falls_back() {
        let service = PaintService::new(oracle(Ok(RgbImage::new(3, 3))), true);
        let session = session_with_mask().await;

        let painted = service.paint(&session, vec![by_id(0, 0.2)]).await.unwrap();
        assert_eq!(painted.source, PaintSource::Local);
        assert_eq!(painted.image.dimensions(), (8, 8));
    }

    #[tokio::test]
    async fn test_remote_disabled_skips_oracle() {
        let oracle = oracle(Ok(RgbImage::new(8, 8)));
        let service = PaintService::new(oracle.clone(), false);
        let session = session_with_mask().await;

        let painted = service.paint(&session, vec![by_id(0, 0.2)]).await.unwrap();
        assert_eq!(painted.source, PaintSource::Local);
        assert_eq!(oracle.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_unknown_mask_id_is_not_found() {
        let oracle = oracle(Ok(RgbImage::new(8, 8)));
        let service = PaintService::new(oracle.clone(), true);
        let session = session_with_mask().await;

        let err = service
            .paint(&session, vec![by_id(0, 0.5), by_id(9, 0.5)])
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            PaintError::Session(SessionError::MaskNotFound { mask_id: 9, .. })
        ));
        assert_eq!(oracle.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_undecodable_inline_mask_fails_locally() {
        let service = PaintService::new(oracle(Err(())), true);
        let session = session_with_mask().await;
        let request = ColoredMaskRequest::Inline {
            mask: "not a mask".into(),
            color: PaintColor([0, 0, 0]),
            opacity: 0.5,
        };

        let err = service.paint(&session, vec![request]).await.unwrap_err();
        assert!(matches!(err, PaintError::Mask(_)));
    }

    #[tokio::test]
    async fn test_local_fallback_threshold() {
        // Gray 100 is inside the mask at the primary threshold but not at
        // the fallback threshold, so it is not painted.
        let service = PaintService::new(oracle(Err(())), true);
        let session = session_with_mask().await;
        let faint = image::GrayImage::from_pixel(8, 8, image::Luma([100]));
        let mut bytes = Vec::new();
        image::DynamicImage::ImageLuma8(faint)
            .write_to(&mut std::io::Cursor::new(&mut bytes), image::ImageFormat::Png)
            .unwrap();
        let request = ColoredMaskRequest::Inline {
            mask: base64::engine::general_purpose::STANDARD.encode(bytes),
            color: PaintColor([255, 0, 0]),
            opacity: 0.9,
        };

        let painted = service.paint(&session, vec![request]).await.unwrap();
        assert_eq!(painted.image, *session.image);
    }

    #[tokio::test]
    async fn test_local_fallback_reads_red_channel() {
        // A pure red inline mask is dark in luma but set in its first channel
        let service = PaintService::new(oracle(Err(())), true);
        let session = session_with_mask().await;
        let red = RgbImage::from_fn(8, 8, |x, _| {
            if x >= 4 { Rgb([255, 0, 0]) } else { Rgb([0, 0, 0]) }
        });
        let request = ColoredMaskRequest::Inline {
            mask: encode_png(&red).unwrap(),
            color: PaintColor([0, 255, 0]),
            opacity: 0.2,
        };

        let painted = service.paint(&session, vec![request]).await.unwrap();
        assert_eq!(painted.source, PaintSource::Local);
        assert!(painted.image.get_pixel(6, 4).0[1] > 100);
        assert_eq!(painted.image.get_pixel(1, 4).0, [100, 100, 100]);
    }
}
