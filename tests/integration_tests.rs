//! Integration tests for redis-inventory
//!
//! Note: No test talks to a real Redis server. The pipeline runs against
//! the in-memory store or a scripted executor that replays canned replies.

use parking_lot::Mutex;
use redis::Value;
use redis_inventory::error::{StoreError, StoreResult};
use redis_inventory::scanner::{KeyScanService, NoProgress, ScanCompletion, Scanner};
use redis_inventory::store::{CommandExecutor, MemoryStore, StoreCommand};
use redis_inventory::trie::{Param, Trie};
use redis_inventory::ScanOptions;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Replays SCAN replies in order and answers MEMORY USAGE from a size table
///
/// Sizes are looked up by exact key bytes; anything else replies nil.
struct ScriptedStore {
    scans: Mutex<VecDeque<StoreResult<Value>>>,
    sizes: Vec<(&'static [u8], i64)>,
    issued: Mutex<Vec<StoreCommand>>,
    batches: Mutex<Vec<usize>>,
}

impl ScriptedStore {
    fn new(scans: Vec<StoreResult<Value>>, sizes: Vec<(&'static str, i64)>) -> Self {
        let sizes = sizes.into_iter().map(|(k, s)| (k.as_bytes(), s)).collect();
        Self::with_raw_sizes(scans, sizes)
    }

    fn with_raw_sizes(scans: Vec<StoreResult<Value>>, sizes: Vec<(&'static [u8], i64)>) -> Self {
        Self {
            scans: Mutex::new(scans.into()),
            sizes,
            issued: Mutex::new(Vec::new()),
            batches: Mutex::new(Vec::new()),
        }
    }

    fn size_of(&self, key: &[u8]) -> Value {
        self.sizes
            .iter()
            .find(|(k, _)| *k == key)
            .map_or(Value::Nil, |(_, size)| Value::Int(*size))
    }

    fn scan_cursors(&self) -> Vec<String> {
        self.issued
            .lock()
            .iter()
            .filter_map(|c| match c {
                StoreCommand::Scan { cursor, .. } => Some(cursor.clone()),
                _ => None,
            })
            .collect()
    }

    fn measured_keys(&self) -> Vec<Vec<u8>> {
        self.issued
            .lock()
            .iter()
            .filter_map(|c| match c {
                StoreCommand::MemoryUsage { key } => Some(key.clone()),
                _ => None,
            })
            .collect()
    }
}

#[async_trait::async_trait]
impl CommandExecutor for ScriptedStore {
    async fn execute(&self, command: StoreCommand) -> StoreResult<Value> {
        self.issued.lock().push(command.clone());
        match command {
            StoreCommand::Scan { .. } => self
                .scans
                .lock()
                .pop_front()
                .unwrap_or_else(|| Err(StoreError::Protocol("script exhausted".into()))),
            StoreCommand::MemoryUsage { key } => Ok(self.size_of(&key)),
            StoreCommand::DbSize => Ok(Value::Int(self.sizes.len() as i64)),
            StoreCommand::Set { .. } => Ok(Value::Okay),
        }
    }

    async fn execute_batch(&self, commands: Vec<StoreCommand>) -> StoreResult<Vec<Value>> {
        self.batches.lock().push(commands.len());
        let mut replies = Vec::with_capacity(commands.len());
        for command in commands {
            replies.push(self.execute(command).await?);
        }
        Ok(replies)
    }
}

fn bulk(s: &str) -> Value {
    Value::BulkString(s.as_bytes().to_vec())
}

fn scan_reply(cursor: &str, keys: &[&str]) -> StoreResult<Value> {
    let keys: Vec<&[u8]> = keys.iter().map(|k| k.as_bytes()).collect();
    raw_scan_reply(cursor, &keys)
}

fn raw_scan_reply(cursor: &str, keys: &[&[u8]]) -> StoreResult<Value> {
    Ok(Value::Array(vec![
        bulk(cursor),
        Value::Array(keys.iter().map(|k| Value::BulkString(k.to_vec())).collect()),
    ]))
}

fn options(count: usize, perc: u32) -> ScanOptions {
    ScanOptions::new("*", count, Duration::ZERO, perc).unwrap()
}

#[tokio::test]
async fn test_cursor_walk_stops_at_sentinel() {
    let store = Arc::new(ScriptedStore::new(
        vec![
            scan_reply("17", &["a:b:x", "a:b:y"]),
            scan_reply("0", &["a:c:z"]),
        ],
        vec![("a:b:x", 100), ("a:b:y", 50), ("a:c:z", 25)],
    ));
    let service = KeyScanService::new(store.clone());

    let mut stream = service.scan_keys(CancellationToken::new(), &options(100, 100));
    let mut pages = Vec::new();
    while let Some(page) = stream.next().await {
        pages.push(page);
    }

    assert_eq!(stream.finish().await, ScanCompletion::Complete);
    assert_eq!(pages.len(), 2);
    assert_eq!(pages[0].keys, vec!["a:b:x", "a:b:y"]);
    assert_eq!(pages[0].sizes, vec![100, 50]);
    assert_eq!(pages[1].keys, vec!["a:c:z"]);

    // No round trip after the sentinel
    assert_eq!(store.scan_cursors(), vec!["0", "17"]);
    // One batched lookup per page
    assert_eq!(*store.batches.lock(), vec![2, 1]);
}

#[tokio::test]
async fn test_inventory_scenario() {
    let store = Arc::new(ScriptedStore::new(
        vec![
            scan_reply("17", &["a:b:x", "a:b:y"]),
            scan_reply("0", &["a:c:z"]),
        ],
        vec![("a:b:x", 100), ("a:b:y", 50), ("a:c:z", 25)],
    ));
    let scanner = Scanner::new(KeyScanService::new(store), NoProgress);
    let mut trie = Trie::new();

    let report = scanner
        .scan(&options(100, 100), &mut trie, CancellationToken::new())
        .await;

    assert!(report.is_complete());
    assert_eq!(trie.root().value(Param::BytesSize), 175);
    assert_eq!(trie.root().value(Param::KeysCount), 3);
    assert_eq!(trie.node("a").unwrap().value(Param::BytesSize), 175);
    assert_eq!(trie.node("a:b").unwrap().value(Param::BytesSize), 150);
    assert_eq!(trie.node("a:b").unwrap().value(Param::KeysCount), 2);
    assert_eq!(trie.node("a:c").unwrap().value(Param::BytesSize), 25);
    assert_eq!(trie.node("a:c").unwrap().value(Param::KeysCount), 1);
}

#[tokio::test]
async fn test_binary_key_measured_under_raw_bytes() {
    const BINARY: &[u8] = b"bin:\xff\xfe:blob";
    const TEXT: &[u8] = b"text:1";
    let store = Arc::new(ScriptedStore::with_raw_sizes(
        vec![raw_scan_reply("0", &[BINARY, TEXT])],
        vec![(BINARY, 4096), (TEXT, 10)],
    ));
    let scanner = Scanner::new(KeyScanService::new(store.clone()), NoProgress);
    let mut trie = Trie::new();

    let report = scanner
        .scan(&options(10, 100), &mut trie, CancellationToken::new())
        .await;

    assert!(report.is_complete());
    assert_eq!(store.measured_keys(), vec![BINARY.to_vec(), TEXT.to_vec()]);
    assert_eq!(trie.root().value(Param::BytesSize), 4106);
    assert_eq!(trie.root().value(Param::KeysCount), 2);
    assert_eq!(trie.node("bin").unwrap().value(Param::BytesSize), 4096);
}

#[tokio::test]
async fn test_expired_key_is_not_counted() {
    // "s:expired" has no size entry, so MEMORY USAGE replies nil
    let store = Arc::new(ScriptedStore::new(
        vec![scan_reply("0", &["s:live", "s:expired"])],
        vec![("s:live", 40)],
    ));
    let scanner = Scanner::new(KeyScanService::new(store.clone()), NoProgress);
    let mut trie = Trie::new();

    let report = scanner
        .scan(&options(10, 100), &mut trie, CancellationToken::new())
        .await;

    assert!(report.is_complete());
    assert_eq!(store.measured_keys().len(), 2);
    assert_eq!(report.keys_sampled, 1);
    assert_eq!(trie.root().value(Param::KeysCount), 1);
    assert_eq!(trie.root().value(Param::BytesSize), 40);
    assert!(trie.node("s:expired").is_none());
}

#[tokio::test]
async fn test_failure_ends_stream_and_keeps_partial_tree() {
    let store = Arc::new(ScriptedStore::new(
        vec![
            scan_reply("5", &["a:1", "a:2"]),
            Err(StoreError::Protocol("connection reset by peer".into())),
            scan_reply("0", &["b:1"]),
        ],
        vec![("a:1", 10), ("a:2", 10), ("b:1", 10)],
    ));
    let scanner = Scanner::new(KeyScanService::new(store.clone()), NoProgress);
    let mut trie = Trie::new();

    let report = scanner
        .scan(&options(10, 100), &mut trie, CancellationToken::new())
        .await;

    match &report.completion {
        ScanCompletion::Failed(reason) => assert!(reason.contains("connection reset")),
        other => panic!("expected failure, got {:?}", other),
    }
    assert_eq!(report.pages, 1);
    assert_eq!(trie.root().value(Param::KeysCount), 2);
    assert!(trie.node("b").is_none());
    // No retry
    assert_eq!(store.scan_cursors(), vec!["0", "5"]);
}

#[tokio::test]
async fn test_malformed_page_is_fatal() {
    let store = Arc::new(ScriptedStore::new(
        vec![Ok(Value::Array(vec![bulk("0")]))],
        vec![],
    ));
    let service = KeyScanService::new(store);

    let mut stream = service.scan_keys(CancellationToken::new(), &options(10, 100));
    assert!(stream.next().await.is_none());
    assert!(matches!(stream.finish().await, ScanCompletion::Failed(_)));
}

#[tokio::test]
async fn test_failed_size_lookup_drops_page() {
    struct BrokenPipeline(MemoryStore);

    #[async_trait::async_trait]
    impl CommandExecutor for BrokenPipeline {
        async fn execute(&self, command: StoreCommand) -> StoreResult<Value> {
            self.0.execute(command).await
        }

        async fn execute_batch(&self, _commands: Vec<StoreCommand>) -> StoreResult<Vec<Value>> {
            Err(StoreError::Protocol("pipeline timed out".into()))
        }
    }

    let store = BrokenPipeline(MemoryStore::with_keys([("a", 1), ("b", 2)]));
    let service = KeyScanService::new(Arc::new(store));

    let mut stream = service.scan_keys(CancellationToken::new(), &options(10, 100));
    assert!(stream.next().await.is_none());
    assert!(matches!(stream.finish().await, ScanCompletion::Failed(_)));
}

#[tokio::test]
async fn test_keys_count_failure_is_soft() {
    struct NoDbSize(MemoryStore);

    #[async_trait::async_trait]
    impl CommandExecutor for NoDbSize {
        async fn execute(&self, command: StoreCommand) -> StoreResult<Value> {
            match command {
                StoreCommand::DbSize => Err(StoreError::Protocol("ERR unknown command".into())),
                other => self.0.execute(other).await,
            }
        }

        async fn execute_batch(&self, commands: Vec<StoreCommand>) -> StoreResult<Vec<Value>> {
            self.0.execute_batch(commands).await
        }
    }

    let store = NoDbSize(MemoryStore::with_keys([("a:1", 5), ("a:2", 7)]));
    let scanner = Scanner::new(KeyScanService::new(Arc::new(store)), NoProgress);
    let mut trie = Trie::new();

    let report = scanner
        .scan(&options(10, 100), &mut trie, CancellationToken::new())
        .await;

    assert!(report.is_complete());
    assert_eq!(report.expected_total, None);
    assert_eq!(trie.node("a").unwrap().value(Param::BytesSize), 12);
}

#[tokio::test]
async fn test_backpressure_bounds_buffered_pages() {
    let store = Arc::new(MemoryStore::with_keys(
        (0..50).map(|i| (format!("k:{:02}", i), 1u64)),
    ));
    let service = KeyScanService::new(store.clone());
    let opts = options(1, 100);

    // Never drained while the producer runs ahead
    let stream = service.scan_keys(CancellationToken::new(), &opts);
    tokio::time::sleep(Duration::from_millis(100)).await;

    assert_eq!(stream.buffered(), opts.channel_capacity());
    // The channel holds two pages and a third waits to be sent
    assert_eq!(store.scan_calls(), opts.channel_capacity() as u64 + 1);

    // Dropping the consumer stops the producer
    assert_eq!(stream.finish().await, ScanCompletion::Cancelled);
    assert!(store.scan_calls() < 50);
}

#[tokio::test]
async fn test_cancellation_mid_scan() {
    let store = Arc::new(MemoryStore::with_keys(
        (0..100).map(|i| (format!("k:{:03}", i), 1u64)),
    ));
    let service = KeyScanService::new(store.clone());
    let token = CancellationToken::new();
    let opts = ScanOptions::new("*", 10, Duration::from_millis(20), 100).unwrap();

    let mut stream = service.scan_keys(token.clone(), &opts);
    let first = stream.next().await.unwrap();
    assert_eq!(first.len(), 10);
    token.cancel();

    while stream.next().await.is_some() {}
    assert_eq!(stream.finish().await, ScanCompletion::Cancelled);
    assert!(store.scan_calls() < 10);
}

#[tokio::test]
async fn test_sampled_inventory_is_deterministic() {
    let keys: Vec<(String, u64)> = (0..1000)
        .map(|i| (format!("env{}:user:{}", i % 3, i), 64 + (i % 17) as u64))
        .collect();

    let mut trees = Vec::new();
    for _ in 0..2 {
        let store = Arc::new(MemoryStore::with_keys(keys.clone()));
        let scanner = Scanner::new(KeyScanService::new(store), NoProgress);
        let mut trie = Trie::new();
        let report = scanner
            .scan(&options(100, 10), &mut trie, CancellationToken::new())
            .await;
        assert_eq!(report.keys_sampled, 100);
        trees.push(trie);
    }

    assert_eq!(trees[0], trees[1]);
    assert_eq!(trees[0].root().value(Param::KeysCount), 1000);
}
