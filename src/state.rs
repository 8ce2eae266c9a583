use std::sync::Arc;

use parking_lot::Mutex;

use crate::config::Cadence;
use crate::metrics::{DataPoint, EstimatorState, RateEstimator};
use crate::sampler::{CounterSampler, DeviceError, TrafficReading};

/// Process-wide state behind the HTTP handlers: one monitored router and
/// its rate estimator.
pub struct SharedState {
    pub router_host: String,
    pub cadence: Cadence,
    sampler: Arc<dyn CounterSampler>,
    // held only for the synchronous update, never across the device round-trip
    estimator: Mutex<RateEstimator>,
}

impl SharedState {
    pub fn new(router_host: impl Into<String>, cadence: Cadence, sampler: Arc<dyn CounterSampler>) -> Self {
        Self {
            router_host: router_host.into(),
            cadence,
            sampler,
            estimator: Mutex::new(RateEstimator::new()),
        }
    }

    /// Reads the router once and folds the reading into the estimator.
    /// On failure the estimator is left untouched.
    pub async fn sample(&self) -> Result<(DataPoint, TrafficReading), DeviceError> {
        let reading = self.sampler.get_counters().await?;
        let point = self.estimator.lock().update(&reading.raw_sample());
        Ok((point, reading))
    }

    pub fn estimator_state(&self) -> EstimatorState {
        self.estimator.lock().state().clone()
    }
}
