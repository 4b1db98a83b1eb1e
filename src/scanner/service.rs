//! Key scanning service
//!
//! Walks the keyspace with SCAN and measures a systematic sample of each
//! page with one pipelined batch of MEMORY USAGE lookups.
//!
//! ```text
//! ┌──────────────────────────── producer task ────────────────────────────┐
//! │  SCAN cursor ──▶ sample page ──▶ MEMORY USAGE x N (1 round trip) ──┐  │
//! │       ▲                                                            │  │
//! │       └──────────── throttle ◀──── cursor != "0" ◀─────────────────┘  │
//! └──────────────────────────────────┬────────────────────────────────────┘
//!                                    │ bounded channel (2 x scan count)
//!                                    ▼
//!                           consumer: ScanStream::next()
//! ```
//!
//! Any failed round trip ends the stream; the cause is reported by
//! [`ScanStream::finish`].

use crate::config::ScanOptions;
use crate::error::{StoreError, StoreResult};
use crate::store::{
    int_reply, memory_usage_reply, CommandExecutor, ScanPage, StoreCommand, CURSOR_START,
};

use std::future::Future;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace};

/// Measured keys of one SCAN page
///
/// `keys` and `sizes` are parallel. Keys left out of the sample, and keys
/// that expired before they could be measured, are not present at all.
/// Names that are not UTF-8 are decoded lossily; they were measured under
/// their raw bytes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BulkKeyInfo {
    pub keys: Vec<String>,
    pub sizes: Vec<u64>,
}

impl BulkKeyInfo {
    /// Number of measured keys
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    /// True when the page had no sampled keys
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Keys with their sizes, in scan order
    pub fn iter(&self) -> impl Iterator<Item = (&str, u64)> {
        self.keys
            .iter()
            .map(String::as_str)
            .zip(self.sizes.iter().copied())
    }
}

/// How a scan ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanCompletion {
    /// The cursor came back to the start sentinel
    Complete,
    /// Cancelled, or the consumer went away
    Cancelled,
    /// A round trip failed; the stream was cut short
    Failed(String),
}

impl ScanCompletion {
    /// True when every page of the keyspace was delivered
    pub fn is_complete(&self) -> bool {
        matches!(self, ScanCompletion::Complete)
    }
}

/// Whether the key at `index` within a page is measured
///
/// Selection is spread evenly: exactly `sample_perc` keys out of every
/// consecutive block of 100, and the same indices for the same inputs.
pub fn is_sampled(index: usize, sample_perc: u32) -> bool {
    let perc = sample_perc.min(100) as usize;
    (index * perc) % 100 < perc
}

/// Stream of measured pages from a running scan
pub struct ScanStream {
    pages: mpsc::Receiver<BulkKeyInfo>,
    handle: JoinHandle<ScanCompletion>,
}

impl ScanStream {
    /// Next page in cursor order; `None` once the scan has ended
    pub async fn next(&mut self) -> Option<BulkKeyInfo> {
        self.pages.recv().await
    }

    /// Pages produced but not yet consumed
    pub fn buffered(&self) -> usize {
        self.pages.len()
    }

    /// Drop any unread pages and wait for the producer to report how it ended
    pub async fn finish(self) -> ScanCompletion {
        let ScanStream { pages, handle } = self;
        drop(pages);

        match handle.await {
            Ok(completion) => completion,
            Err(e) => ScanCompletion::Failed(format!("scan task failed: {}", e)),
        }
    }
}

/// Scans keys and measures their memory usage
#[derive(Clone)]
pub struct KeyScanService {
    executor: Arc<dyn CommandExecutor>,
}

impl KeyScanService {
    /// Create a service issuing commands through `executor`
    pub fn new(executor: Arc<dyn CommandExecutor>) -> Self {
        Self { executor }
    }

    /// Start scanning in a background task
    ///
    /// Pages are delivered over a channel holding up to
    /// `2 x scan_count` pages; a full channel stalls the scan.
    pub fn scan_keys(&self, token: CancellationToken, options: &ScanOptions) -> ScanStream {
        let (tx, rx) = mpsc::channel(options.channel_capacity());
        let executor = Arc::clone(&self.executor);
        let options = options.clone();

        let handle = tokio::spawn(async move {
            match produce(executor.as_ref(), &options, &token, &tx).await {
                Ok(pages) => {
                    info!(pages, "Scan complete");
                    ScanCompletion::Complete
                }
                Err(StoreError::Cancelled) => {
                    info!("Scan cancelled");
                    ScanCompletion::Cancelled
                }
                Err(e) => {
                    error!(error = %e, "Scan aborted");
                    ScanCompletion::Failed(e.to_string())
                }
            }
        });

        ScanStream { pages: rx, handle }
    }

    /// Total number of keys in the database
    pub async fn get_keys_count(&self, token: &CancellationToken) -> StoreResult<u64> {
        let reply = cancellable(token, self.executor.execute(StoreCommand::DbSize)).await?;
        match int_reply("DBSIZE", reply)? {
            Some(n) if n >= 0 => Ok(n as u64),
            other => Err(StoreError::malformed(
                "DBSIZE",
                format!("unexpected value {:?}", other),
            )),
        }
    }

    /// Memory usage of a single key; `None` when the key does not exist
    pub async fn get_memory_usage(
        &self,
        token: &CancellationToken,
        key: &[u8],
    ) -> StoreResult<Option<u64>> {
        let command = StoreCommand::MemoryUsage { key: key.to_vec() };
        let reply = cancellable(token, self.executor.execute(command)).await?;
        memory_usage_reply(reply)
    }
}

/// Producer loop; returns the number of pages sent
async fn produce(
    executor: &dyn CommandExecutor,
    options: &ScanOptions,
    token: &CancellationToken,
    tx: &mpsc::Sender<BulkKeyInfo>,
) -> StoreResult<u64> {
    let pattern = (!options.matches_everything()).then(|| options.pattern().to_string());
    let mut cursor = CURSOR_START.to_string();
    let mut pages = 0u64;

    loop {
        let command = StoreCommand::Scan {
            cursor: cursor.clone(),
            count: options.scan_count(),
            pattern: pattern.clone(),
        };
        let reply = cancellable(token, executor.execute(command)).await?;
        let page = ScanPage::from_reply(reply)?;
        let last = page.is_last();
        let next_cursor = page.cursor.clone();

        let info = measure_page(executor, token, page.keys, options.sample_perc()).await?;
        pages += 1;
        debug!(page = pages, cursor = %next_cursor, sampled = info.len(), "Scanned page");

        tokio::select! {
            biased;
            _ = token.cancelled() => return Err(StoreError::Cancelled),
            sent = tx.send(info) => {
                if sent.is_err() {
                    debug!("Page consumer dropped");
                    return Err(StoreError::Cancelled);
                }
            }
        }

        if last {
            return Ok(pages);
        }
        cursor = next_cursor;

        if !options.throttle().is_zero() {
            tokio::select! {
                biased;
                _ = token.cancelled() => return Err(StoreError::Cancelled),
                _ = tokio::time::sleep(options.throttle()) => {}
            }
        }
    }
}

/// Measure the sampled keys of a page in one pipelined round trip
async fn measure_page(
    executor: &dyn CommandExecutor,
    token: &CancellationToken,
    keys: Vec<Vec<u8>>,
    sample_perc: u32,
) -> StoreResult<BulkKeyInfo> {
    let keys: Vec<Vec<u8>> = keys
        .into_iter()
        .enumerate()
        .filter(|(index, _)| is_sampled(*index, sample_perc))
        .map(|(_, key)| key)
        .collect();

    if keys.is_empty() {
        return Ok(BulkKeyInfo::default());
    }

    let commands = keys
        .iter()
        .map(|key| StoreCommand::MemoryUsage { key: key.clone() })
        .collect();
    let replies = cancellable(token, executor.execute_batch(commands)).await?;

    if replies.len() != keys.len() {
        return Err(StoreError::malformed(
            "MEMORY USAGE",
            format!("expected {} replies, got {}", keys.len(), replies.len()),
        ));
    }

    let mut info = BulkKeyInfo {
        keys: Vec::with_capacity(keys.len()),
        sizes: Vec::with_capacity(keys.len()),
    };
    for (key, reply) in keys.into_iter().zip(replies) {
        match memory_usage_reply(reply)? {
            Some(size) => {
                info.keys.push(String::from_utf8_lossy(&key).into_owned());
                info.sizes.push(size);
            }
            None => trace!(key = %String::from_utf8_lossy(&key), "Key expired before measurement"),
        }
    }

    Ok(info)
}

/// Race a round trip against cancellation
async fn cancellable<T, F>(token: &CancellationToken, fut: F) -> StoreResult<T>
where
    F: Future<Output = StoreResult<T>>,
{
    tokio::select! {
        biased;
        _ = token.cancelled() => Err(StoreError::Cancelled),
        result = fut => result,
    }
}
