use std::collections::VecDeque;
use std::time::Duration;

use crate::metrics::DataPoint;

/// Fewest points the chart keeps, whatever the window/interval ratio.
pub const MIN_CAPACITY: usize = 10;
/// Most points kept, one day of history at one sample per second.
pub const MAX_CAPACITY: usize = 86_400;

pub fn capacity_for(window: Duration, interval: Duration) -> usize {
    let interval_ms = interval.as_millis().max(1);
    let fit = usize::try_from(window.as_millis() / interval_ms).unwrap_or(MAX_CAPACITY);
    fit.clamp(MIN_CAPACITY, MAX_CAPACITY)
}

/// Bounded FIFO of data points in display order; the oldest point is
/// evicted once the capacity is reached.
#[derive(Clone, Debug)]
pub struct TimeSeries {
    points: VecDeque<DataPoint>,
    capacity: usize,
}

impl TimeSeries {
    pub fn new(capacity: usize) -> Self {
        // grows on demand; the capacity only bounds it
        Self { points: VecDeque::new(), capacity: capacity.clamp(1, MAX_CAPACITY) }
    }

    pub fn for_window(window: Duration, interval: Duration) -> Self {
        Self::new(capacity_for(window, interval))
    }

    pub fn push(&mut self, point: DataPoint) {
        if self.points.len() == self.capacity {
            self.points.pop_front();
        }
        self.points.push_back(point);
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn latest(&self) -> Option<&DataPoint> {
        self.points.back()
    }

    pub fn iter(&self) -> impl ExactSizeIterator<Item = &DataPoint> + '_ {
        self.points.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn p(v: f64) -> DataPoint {
        DataPoint { download_mbps: v, upload_mbps: v / 2.0 }
    }

    #[test]
    fn capacity_from_window_and_interval() {
        assert_eq!(capacity_for(Duration::from_secs(180), Duration::from_secs(1)), 180);
        assert_eq!(capacity_for(Duration::from_secs(180), Duration::from_millis(1500)), 120);
        assert_eq!(capacity_for(Duration::from_secs(180), Duration::from_secs(60)), 10);
        assert_eq!(capacity_for(Duration::from_secs(10), Duration::ZERO), 10_000);
    }

    #[test]
    fn capacity_is_capped_for_huge_windows() {
        let window = Duration::from_secs(1_000_000_000);
        assert_eq!(capacity_for(window, Duration::from_millis(1)), MAX_CAPACITY);
        assert_eq!(capacity_for(Duration::MAX, Duration::ZERO), MAX_CAPACITY);
        let s = TimeSeries::for_window(window, Duration::from_millis(1));
        assert_eq!(s.capacity(), MAX_CAPACITY);
        assert_eq!(TimeSeries::new(usize::MAX).capacity(), MAX_CAPACITY);
    }

    #[test]
    fn evicts_oldest_at_capacity() {
        let mut s = TimeSeries::new(3);
        for v in 1..=5 {
            s.push(p(v as f64));
            assert!(s.len() <= s.capacity());
        }
        let values: Vec<f64> = s.iter().map(|d| d.download_mbps).collect();
        assert_eq!(values, vec![3.0, 4.0, 5.0]);
        assert_eq!(s.latest(), Some(&p(5.0)));
    }

    #[test]
    fn empty_series() {
        let s = TimeSeries::for_window(Duration::from_secs(180), Duration::from_secs(1));
        assert!(s.is_empty());
        assert_eq!(s.capacity(), 180);
        assert!(s.latest().is_none());
    }
}
