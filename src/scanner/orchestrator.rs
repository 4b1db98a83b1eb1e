//! Scan orchestrator - turns measured pages into tree contributions
//!
//! Each measured key stands in for `100 / sample_perc` keys of the same
//! size, so the tree holds a full-keyspace estimate even when only part of
//! it was measured. The division remainders are carried from key to key,
//! which keeps the totals exact for percentages that do not divide 100.

use crate::config::ScanOptions;
use crate::scanner::service::{KeyScanService, ScanCompletion};
use crate::trie::{ParamValue, Trie};

use chrono::{DateTime, Utc};
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{info, trace, warn};

/// Sink for scan progress
///
/// The expected total is an estimate; `increment` may be called more often
/// than it announced.
pub trait ScanProgress {
    /// Scan started; `expected` is the estimated number of measured keys
    fn start(&self, expected: Option<u64>);

    /// One more key measured
    fn increment(&self);

    /// Scan finished
    fn stop(&self);
}

/// Progress sink that discards everything
#[derive(Debug, Default, Clone, Copy)]
pub struct NoProgress;

impl ScanProgress for NoProgress {
    fn start(&self, _expected: Option<u64>) {}
    fn increment(&self) {}
    fn stop(&self) {}
}

/// Outcome of one scan run
#[derive(Debug, Clone)]
pub struct ScanReport {
    /// How the underlying stream ended
    pub completion: ScanCompletion,

    /// Pages consumed
    pub pages: u64,

    /// Keys actually measured
    pub keys_sampled: u64,

    /// Estimated measured keys announced to the progress sink
    pub expected_total: Option<u64>,

    /// Keys each measurement stood in for, on average
    pub extrapolation_factor: f64,

    /// Wall-clock start
    pub started_at: DateTime<Utc>,

    /// Time taken
    pub duration: Duration,
}

impl ScanReport {
    /// True when the whole keyspace was walked
    pub fn is_complete(&self) -> bool {
        self.completion.is_complete()
    }
}

/// Scales measured keys up to full-keyspace estimates
#[derive(Debug, Clone)]
pub struct Extrapolator {
    sample_perc: i64,
    bytes_carry: i64,
    keys_carry: i64,
}

impl Extrapolator {
    /// Extrapolator for a sample of `sample_perc` percent
    pub fn new(sample_perc: u32) -> Self {
        Self {
            sample_perc: i64::from(sample_perc.clamp(1, 100)),
            bytes_carry: 0,
            keys_carry: 0,
        }
    }

    /// Estimated bytes and key count for one measured key of `size` bytes
    pub fn scale(&mut self, size: u64) -> (i64, i64) {
        let size = i64::try_from(size).unwrap_or(i64::MAX).saturating_mul(100);
        let bytes = carry_div(size, &mut self.bytes_carry, self.sample_perc);
        let keys = carry_div(100, &mut self.keys_carry, self.sample_perc);
        (bytes, keys)
    }
}

fn carry_div(value: i64, carry: &mut i64, divisor: i64) -> i64 {
    let total = value.saturating_add(*carry);
    *carry = total % divisor;
    total / divisor
}

/// Drives a scan and fills an aggregation tree
pub struct Scanner<P: ScanProgress> {
    service: KeyScanService,
    progress: P,
}

impl<P: ScanProgress> Scanner<P> {
    /// Create a scanner reporting to `progress`
    pub fn new(service: KeyScanService, progress: P) -> Self {
        Self { service, progress }
    }

    /// Progress sink
    pub fn progress(&self) -> &P {
        &self.progress
    }

    /// Scan the keyspace into `result`
    ///
    /// Never fails: a scan that ends early leaves an undercounted tree and
    /// says so in [`ScanReport::completion`].
    pub async fn scan(
        &self,
        options: &ScanOptions,
        result: &mut Trie,
        token: CancellationToken,
    ) -> ScanReport {
        let started_at = Utc::now();
        let start = Instant::now();

        let expected_total = if options.matches_everything() {
            self.keys_count(&token)
                .await
                .map(|total| total * u64::from(options.sample_perc()) / 100)
        } else {
            None
        };

        info!(
            pattern = %options.pattern(),
            count = options.scan_count(),
            sample = options.sample_perc(),
            expected = ?expected_total,
            "Starting scan"
        );

        self.progress.start(expected_total);

        let mut extrapolator = Extrapolator::new(options.sample_perc());
        let mut pages = 0u64;
        let mut keys_sampled = 0u64;

        let mut stream = self.service.scan_keys(token, options);
        while let Some(page) = stream.next().await {
            pages += 1;
            for (key, size) in page.iter() {
                self.progress.increment();

                let (bytes, keys) = extrapolator.scale(size);
                result.add(key, &[ParamValue::bytes(bytes), ParamValue::keys(keys)]);
                keys_sampled += 1;

                trace!(key, size, "Measured key");
            }
        }

        let completion = stream.finish().await;
        self.progress.stop();

        let report = ScanReport {
            completion,
            pages,
            keys_sampled,
            expected_total,
            extrapolation_factor: options.extrapolation_factor(),
            started_at,
            duration: start.elapsed(),
        };

        info!(
            pages = report.pages,
            keys = report.keys_sampled,
            complete = report.is_complete(),
            elapsed_ms = report.duration.as_millis() as u64,
            "Scan finished"
        );

        report
    }

    async fn keys_count(&self, token: &CancellationToken) -> Option<u64> {
        match self.service.get_keys_count(token).await {
            Ok(count) => Some(count),
            Err(e) => {
                warn!(error = %e, "Error getting number of keys");
                None
            }
        }
    }
}
