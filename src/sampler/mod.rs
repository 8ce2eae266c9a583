//! Access to the router's traffic counters.
//!
//! A [`CounterSampler`] returns the device's statistics as a flat map of
//! fields. Which field holds which metric differs between firmware
//! versions, so each metric is looked up through an ordered list of
//! candidate names; the first present and parseable value wins.

mod huawei;

pub use huawei::{HuaweiSampler, SamplerOptions};

use std::time::Instant;

use async_trait::async_trait;
use serde_json::{Map, Value};
use thiserror::Error;

use crate::metrics::RawSample;

pub const DOWNLOAD_COUNTER_FIELDS: &[&str] = &["CurrentDownload", "TotalDownload"];
pub const UPLOAD_COUNTER_FIELDS: &[&str] = &["CurrentUpload", "TotalUpload"];
pub const DOWNLOAD_RATE_FIELDS: &[&str] = &["CurrentDownloadRate", "DownloadRate"];
pub const UPLOAD_RATE_FIELDS: &[&str] = &["CurrentUploadRate", "UploadRate"];

#[derive(Debug, Error)]
pub enum DeviceError {
    #[error("router unreachable: {0}")]
    Unreachable(String),

    #[error("router did not answer in time")]
    Timeout,

    #[error("router rejected credentials (code {code})")]
    Authentication { code: u32 },

    #[error("router returned error code {code}")]
    Rejected { code: u32 },

    #[error("router answered HTTP {status}")]
    Http { status: u16 },

    #[error("malformed router response: {0}")]
    Malformed(String),
}

impl From<reqwest::Error> for DeviceError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            DeviceError::Timeout
        } else {
            DeviceError::Unreachable(err.to_string())
        }
    }
}

/// Raw statistics as delivered by the device, stamped on arrival.
#[derive(Clone, Debug, PartialEq)]
pub struct TrafficReading {
    pub received_at: Instant,
    pub fields: Map<String, Value>,
}

impl TrafficReading {
    pub fn new(fields: Map<String, Value>) -> Self {
        Self { received_at: Instant::now(), fields }
    }

    pub fn raw_sample(&self) -> RawSample {
        RawSample {
            timestamp: self.received_at,
            rx_bytes: first_counter(&self.fields, DOWNLOAD_COUNTER_FIELDS).unwrap_or(0),
            tx_bytes: first_counter(&self.fields, UPLOAD_COUNTER_FIELDS).unwrap_or(0),
            rx_rate_hint: first_rate(&self.fields, DOWNLOAD_RATE_FIELDS),
            tx_rate_hint: first_rate(&self.fields, UPLOAD_RATE_FIELDS),
        }
    }
}

#[async_trait]
pub trait CounterSampler: Send + Sync {
    async fn get_counters(&self) -> Result<TrafficReading, DeviceError>;
}

fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

pub fn first_counter(fields: &Map<String, Value>, candidates: &[&str]) -> Option<u64> {
    candidates
        .iter()
        .filter_map(|k| fields.get(*k))
        .find_map(|v| scalar_text(v)?.parse::<u64>().ok())
}

pub fn first_rate(fields: &Map<String, Value>, candidates: &[&str]) -> Option<f64> {
    candidates
        .iter()
        .filter_map(|k| fields.get(*k))
        .find_map(|v| {
            let rate = scalar_text(v)?.parse::<f64>().ok()?;
            (rate.is_finite() && rate >= 0.0).then_some(rate)
        })
}
