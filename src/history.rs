//! Rolling balance history and consumption-rate estimation.
//!
//! A [`HistoryStore`] keeps the numeric balances a provider observed during
//! the last 24 hours. [`estimate_rate`] turns two of those samples into a
//! credits-per-hour figure.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Samples older than this (relative to the newest append) are evicted.
pub const RETENTION_HOURS: i64 = 24;

/// Default lookback used when estimating the consumption rate.
pub const DEFAULT_RATE_WINDOW_MINUTES: u32 = 60;

/// One observed balance.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HistorySample {
    pub timestamp: DateTime<Utc>,
    pub balance: f64,
}

impl HistorySample {
    pub fn new(timestamp: DateTime<Utc>, balance: f64) -> Self {
        Self { timestamp, balance }
    }
}

/// Insertion-ordered samples, bounded to a trailing 24 hour window.
#[derive(Debug, Clone, Default)]
pub struct HistoryStore {
    samples: Vec<HistorySample>,
}

impl HistoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a sample, then drop everything older than the retention
    /// window measured from that sample's timestamp.
    pub fn append(&mut self, sample: HistorySample) {
        self.samples.push(sample);

        let cutoff = sample.timestamp - Duration::hours(RETENTION_HOURS);
        self.samples.retain(|s| s.timestamp >= cutoff);
    }

    #[cfg(test)]
    pub fn samples(&self) -> &[HistorySample] {
        &self.samples
    }

    pub fn snapshot(&self) -> Vec<HistorySample> {
        self.samples.clone()
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Consumption rate over `window`, evaluated at `now`.
    pub fn consumption_rate(&self, window: Duration, now: DateTime<Utc>) -> Option<f64> {
        estimate_rate(&self.samples, window, now)
    }
}

/// Estimate credits consumed per hour.
///
/// The newest sample is compared against the sample closest to
/// `now - window`. When even that sample is newer than the target, the
/// oldest sample is used instead so a short history still yields a rate.
/// A positive result means the balance went down.
///
/// Returns `None` with fewer than two samples or when the two chosen
/// samples are not strictly increasing in time.
pub fn estimate_rate(
    samples: &[HistorySample],
    window: Duration,
    now: DateTime<Utc>,
) -> Option<f64> {
    if samples.len() < 2 {
        return None;
    }

    let latest = samples.last()?;
    let oldest = samples.first()?;
    let target = now - window;

    let mut baseline = oldest;
    let mut best_distance = (oldest.timestamp - target).num_milliseconds().abs();
    for sample in samples {
        let distance = (sample.timestamp - target).num_milliseconds().abs();
        if distance < best_distance {
            best_distance = distance;
            baseline = sample;
        }
    }

    if baseline.timestamp > target {
        baseline = oldest;
    }

    let hours = (latest.timestamp - baseline.timestamp).num_milliseconds() as f64 / 3_600_000.0;
    if hours <= 0.0 {
        return None;
    }

    Some((baseline.balance - latest.balance) / hours)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap()
    }

    fn sample(offset_minutes: i64, balance: f64) -> HistorySample {
        HistorySample::new(t0() + Duration::minutes(offset_minutes), balance)
    }

    #[test]
    fn append_keeps_samples_inside_window() {
        let mut store = HistoryStore::new();
        store.append(sample(0, 10.0));
        store.append(sample(60 * 12, 9.0));
        store.append(sample(60 * 24, 8.0));

        // Exactly 24h old is still retained
        assert_eq!(store.len(), 3);

        store.append(sample(60 * 24 + 1, 7.5));
        assert_eq!(store.len(), 3);
        assert_eq!(store.samples()[0].balance, 9.0);
    }

    #[test]
    fn append_evicts_relative_to_latest_sample() {
        let mut store = HistoryStore::new();
        for hour in 0..48 {
            store.append(sample(hour * 60, 100.0 - hour as f64));
            let newest = store.samples().last().unwrap().timestamp;
            assert!(store
                .samples()
                .iter()
                .all(|s| s.timestamp >= newest - Duration::hours(RETENTION_HOURS)));
        }
        assert_eq!(store.len(), 25);
    }

    #[test]
    fn rate_requires_two_samples() {
        let now = t0();
        assert_eq!(estimate_rate(&[], Duration::minutes(60), now), None);
        assert_eq!(
            estimate_rate(&[sample(0, 10.0)], Duration::minutes(60), now),
            None
        );
    }

    #[test]
    fn rate_is_positive_when_balance_drops() {
        let samples = [sample(0, 10.0), sample(60, 8.0)];
        let now = t0() + Duration::hours(1);

        let rate = estimate_rate(&samples, Duration::minutes(60), now).unwrap();
        assert!((rate - 2.0).abs() < 1e-9);
    }

    #[test]
    fn rate_is_negative_after_top_up() {
        let samples = [sample(0, 5.0), sample(30, 15.0)];
        let now = t0() + Duration::minutes(30);

        let rate = estimate_rate(&samples, Duration::minutes(30), now).unwrap();
        assert!((rate + 20.0).abs() < 1e-9);
    }

    #[test]
    fn rate_uses_sample_closest_to_window_start() {
        let samples = [
            sample(0, 20.0),
            sample(60, 14.0),
            sample(110, 13.0),
            sample(120, 12.0),
        ];
        let now = t0() + Duration::minutes(120);

        // Target is t0+60m, so the baseline is the 14.0 sample
        let rate = estimate_rate(&samples, Duration::minutes(60), now).unwrap();
        assert!((rate - 2.0).abs() < 1e-9);
    }

    #[test]
    fn rate_falls_back_to_oldest_when_history_is_short() {
        let samples = [sample(0, 10.0), sample(15, 9.5), sample(30, 9.0)];
        let now = t0() + Duration::minutes(30);

        // 60 minute window but only 30 minutes of history
        let rate = estimate_rate(&samples, Duration::minutes(60), now).unwrap();
        assert!((rate - 2.0).abs() < 1e-9);
    }

    #[test]
    fn rate_undefined_for_identical_timestamps() {
        let samples = [sample(0, 10.0), sample(0, 9.0)];
        assert_eq!(estimate_rate(&samples, Duration::minutes(60), t0()), None);
    }

    #[test]
    fn store_rate_matches_free_function() {
        let mut store = HistoryStore::new();
        store.append(sample(0, 10.0));
        store.append(sample(60, 8.0));

        let now = t0() + Duration::hours(1);
        assert_eq!(
            store.consumption_rate(Duration::minutes(60), now),
            estimate_rate(store.samples(), Duration::minutes(60), now)
        );
    }
}
