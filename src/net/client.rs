use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;

use crate::metrics::DataPoint;
use crate::poll::{FetchError, SampleFetcher};

/// Fetches data points from a running server's `/api/speed`.
pub struct SpeedClient {
    url: String,
    http: Client,
}

impl SpeedClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, FetchError> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| FetchError::Transport(e.to_string()))?;
        Ok(Self {
            url: format!("{}/api/speed", base_url.trim_end_matches('/')),
            http,
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

fn classify(err: reqwest::Error) -> FetchError {
    if err.is_timeout() {
        FetchError::Timeout
    } else {
        FetchError::Transport(err.to_string())
    }
}

// absent, null or non-numeric fields read as 0
fn mbps(body: &Value, key: &str) -> f64 {
    match body.get(key) {
        Some(Value::Number(n)) => n.as_f64().unwrap_or(0.0),
        Some(Value::String(s)) => s.trim().parse::<f64>().ok().filter(|v| v.is_finite()).unwrap_or(0.0),
        _ => 0.0,
    }
}

pub fn decode_point(body: &Value) -> Result<DataPoint, FetchError> {
    if !body.is_object() {
        return Err(FetchError::Decode("expected a JSON object".into()));
    }
    Ok(DataPoint {
        download_mbps: mbps(body, "download_mbps"),
        upload_mbps: mbps(body, "upload_mbps"),
    })
}

#[async_trait]
impl SampleFetcher for SpeedClient {
    async fn fetch(&self) -> Result<DataPoint, FetchError> {
        let resp = self
            .http
            .get(&self.url)
            .header(reqwest::header::CACHE_CONTROL, "no-store")
            .send()
            .await
            .map_err(classify)?;
        let status = resp.status();
        let text = resp.text().await.map_err(classify)?;
        if !status.is_success() {
            let message = serde_json::from_str::<Value>(&text)
                .ok()
                .and_then(|v| v.get("error").and_then(Value::as_str).map(str::to_string))
                .unwrap_or(text);
            return Err(FetchError::Status { status: status.as_u16(), message });
        }
        let body: Value = serde_json::from_str(&text).map_err(|e| FetchError::Decode(e.to_string()))?;
        decode_point(&body)
    }
}
