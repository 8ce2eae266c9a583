use std::time::Instant;

use serde::Serialize;

/// Weight of the newest instantaneous rate in the running average.
pub const SMOOTHING_ALPHA: f64 = 0.6;
/// Applied to the previous instantaneous rate when a counter did not move
/// and the device gave no rate hint.
pub const STALL_DECAY: f64 = 0.85;

/// One reading of the device's cumulative byte counters.
#[derive(Clone, Debug, PartialEq)]
pub struct RawSample {
    pub timestamp: Instant,
    pub rx_bytes: u64,
    pub tx_bytes: u64,
    /// Device reported download rate, assumed bytes/s.
    pub rx_rate_hint: Option<f64>,
    /// Device reported upload rate, assumed bytes/s.
    pub tx_rate_hint: Option<f64>,
}

/// Smoothed rates in decimal megabits per second, rounded to 2 decimals.
#[derive(Copy, Clone, Debug, Default, PartialEq, Serialize)]
pub struct DataPoint {
    pub download_mbps: f64,
    pub upload_mbps: f64,
}

impl DataPoint {
    pub fn from_bps(rx_bps: f64, tx_bps: f64) -> Self {
        Self {
            download_mbps: to_mbps(rx_bps),
            upload_mbps: to_mbps(tx_bps),
        }
    }

    pub fn peak(&self) -> f64 {
        self.download_mbps.max(self.upload_mbps)
    }
}

pub fn to_mbps(bps: f64) -> f64 {
    (bps / 1_000_000.0 * 100.0).round() / 100.0
}

#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct DirectionState {
    pub last_bytes: u64,
    pub instant_bps: f64,
    pub smoothed_bps: f64,
}

impl DirectionState {
    fn seeded(bytes: u64) -> Self {
        Self { last_bytes: bytes, instant_bps: 0.0, smoothed_bps: 0.0 }
    }

    fn advance(&mut self, bytes: u64, hint: Option<f64>, dt_secs: f64) {
        // a counter that went backwards (reboot, wrap) contributes nothing
        let delta = bytes.saturating_sub(self.last_bytes);
        let instant = match hint.filter(|h| h.is_finite() && *h >= 0.0) {
            Some(bytes_per_sec) => bytes_per_sec * 8.0,
            None if delta == 0 => self.instant_bps * STALL_DECAY,
            None => (delta as f64) * 8.0 / dt_secs,
        };
        self.smoothed_bps = if self.smoothed_bps == 0.0 {
            instant
        } else {
            self.smoothed_bps * (1.0 - SMOOTHING_ALPHA) + instant * SMOOTHING_ALPHA
        };
        self.instant_bps = instant;
        self.last_bytes = bytes;
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct EstimatorState {
    pub last_timestamp: Option<Instant>,
    pub rx: DirectionState,
    pub tx: DirectionState,
}

/// Turns cumulative counters into a smoothed bitrate for a single device.
///
/// Not internally synchronised: callers serialise `update` per device.
#[derive(Clone, Debug, Default)]
pub struct RateEstimator {
    state: EstimatorState,
}

impl RateEstimator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> &EstimatorState {
        &self.state
    }

    pub fn current(&self) -> DataPoint {
        DataPoint::from_bps(self.state.rx.smoothed_bps, self.state.tx.smoothed_bps)
    }

    pub fn update(&mut self, raw: &RawSample) -> DataPoint {
        let Some(last) = self.state.last_timestamp else {
            self.state = EstimatorState {
                last_timestamp: Some(raw.timestamp),
                rx: DirectionState::seeded(raw.rx_bytes),
                tx: DirectionState::seeded(raw.tx_bytes),
            };
            return DataPoint::default();
        };

        let dt = match raw.timestamp.checked_duration_since(last) {
            Some(d) if !d.is_zero() => d.as_secs_f64(),
            _ => {
                tracing::debug!("non-increasing sample timestamp, keeping previous rates");
                return self.current();
            }
        };

        self.state.rx.advance(raw.rx_bytes, raw.rx_rate_hint, dt);
        self.state.tx.advance(raw.tx_bytes, raw.tx_rate_hint, dt);
        self.state.last_timestamp = Some(raw.timestamp);
        self.current()
    }
}
