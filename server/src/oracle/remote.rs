//! HTTP client for the remote segmentation oracle

use std::time::{Duration, Instant};

use async_trait::async_trait;
use metrics::{counter, histogram};
use reqwest::Client;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, error, info};

use crate::config::OracleConfig;

use super::service::SegmentationOracle;
use super::types::{
    GenerateParams, GeneratedMaskSet, OracleError, RemoteColoredMask, RemotePaintResult,
    SegmentPrompt, SegmentResult,
};

#[derive(Debug, Serialize)]
struct SegmentRequest<'a> {
    image_data: &'a str,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    points: Vec<[i64; 2]>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    point_labels: Vec<u8>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    boxes: Vec<[i64; 4]>,
    #[serde(skip_serializing_if = "Option::is_none")]
    mask: Option<&'a str>,
}

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    image_data: &'a str,
    #[serde(flatten)]
    params: &'a GenerateParams,
}

#[derive(Debug, Serialize)]
struct PaintRequest<'a> {
    image_data: &'a str,
    colored_masks: &'a [RemoteColoredMask],
}

/// Oracle reached over HTTP/JSON
///
/// Every call carries its own deadline. Calls are never retried.
pub struct HttpOracle {
    client: Client,
    config: OracleConfig,
}

impl HttpOracle {
    pub fn new(config: OracleConfig) -> Self {
        info!("Initialized oracle client for {}", config.url);
        Self {
            client: Client::builder()
                .connect_timeout(Duration::from_secs(10))
                .build()
                .unwrap_or_else(|_| Client::new()),
            config,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.config.url.trim_end_matches('/'), path)
    }

    async fn post<B, T>(
        &self,
        op: &'static str,
        path: &str,
        body: &B,
        timeout: Duration,
    ) -> Result<T, OracleError>
    where
        B: Serialize + ?Sized + Sync,
        T: DeserializeOwned,
    {
        let url = self.url(path);
        debug!("Calling oracle {} endpoint: {}", op, url);

        let start = Instant::now();
        let result = async {
            let response = self
                .client
                .post(&url)
                .json(body)
                .timeout(timeout)
                .send()
                .await
                .map_err(|e| transport_error(e, timeout))?;
            read_json(response, timeout).await
        }
        .await;

        histogram!("maskpaint_oracle_call_duration_seconds", "op" => op).record(start.elapsed());
        if let Err(ref e) = result {
            counter!("maskpaint_oracle_failures_total", "op" => op).increment(1);
            error!("Oracle {} call failed: {}", op, e);
        }
        result
    }
}

fn transport_error(e: reqwest::Error, timeout: Duration) -> OracleError {
    if e.is_timeout() {
        OracleError::Timeout(timeout)
    } else {
        OracleError::Transport(e.to_string())
    }
}

/// Decode a JSON reply, turning an `error` key or a failure status into
/// [`OracleError::Upstream`]
async fn read_json<T: DeserializeOwned>(
    response: reqwest::Response,
    timeout: Duration,
) -> Result<T, OracleError> {
    let status = response.status();
    let body = response
        .text()
        .await
        .map_err(|e| transport_error(e, timeout))?;
    let value: Option<Value> = serde_json::from_str(&body).ok();

    if let Some(message) = value.as_ref().and_then(upstream_message) {
        return Err(OracleError::Upstream(message));
    }
    if !status.is_success() {
        return Err(OracleError::Upstream(format!("HTTP {}: {}", status, body)));
    }

    let value = value.ok_or_else(|| OracleError::InvalidResponse("body is not JSON".to_string()))?;
    serde_json::from_value(value).map_err(|e| OracleError::InvalidResponse(e.to_string()))
}

fn upstream_message(value: &Value) -> Option<String> {
    let field = value.get("error").or_else(|| value.get("detail"))?;
    match field {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

#[async_trait]
impl SegmentationOracle for HttpOracle {
    async fn segment(
        &self,
        image: &str,
        prompt: &SegmentPrompt,
    ) -> Result<SegmentResult, OracleError> {
        let request = SegmentRequest {
            image_data: image,
            points: prompt.points.iter().map(|p| [p.x, p.y]).collect(),
            point_labels: prompt.points.iter().map(|p| p.label).collect(),
            boxes: prompt.boxes.iter().map(|b| [b.x1, b.y1, b.x2, b.y2]).collect(),
            mask: prompt.mask.as_deref(),
        };
        self.post("segment", "segment", &request, self.config.segment_timeout)
            .await
    }

    async fn generate_all(
        &self,
        image: &str,
        params: &GenerateParams,
    ) -> Result<GeneratedMaskSet, OracleError> {
        let request = GenerateRequest {
            image_data: image,
            params,
        };
        self.post(
            "generate",
            "generate-masks",
            &request,
            self.config.generate_timeout,
        )
        .await
    }

    async fn paint_remote(
        &self,
        image: &str,
        layers: &[RemoteColoredMask],
    ) -> Result<RemotePaintResult, OracleError> {
        let request = PaintRequest {
            image_data: image,
            colored_masks: layers,
        };
        self.post(
            "paint",
            "paint-multiple-masks",
            &request,
            self.config.segment_timeout,
        )
        .await
    }

    async fn health(&self) -> Result<Value, OracleError> {
        let timeout = self.config.health_timeout;
        let response = self
            .client
            .get(&self.config.health_url)
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| transport_error(e, timeout))?;
        read_json(response, timeout).await
    }

    fn endpoint(&self) -> &str {
        &self.config.url
    }
}
