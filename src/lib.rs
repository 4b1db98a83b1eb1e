//! redis-inventory - Sampled Memory Inventory of a Redis Keyspace
//!
//! Finds which key namespaces dominate memory without a full dump. The
//! keyspace is walked with `SCAN`, a systematic sample of every page is
//! measured with pipelined `MEMORY USAGE`, and the results are rolled up
//! along the delimiter-separated structure of the key names.
//!
//! # Features
//!
//! - **Sampling with Extrapolation**: Measure 1-100% of keys; every measured
//!   key stands in for `100 / sample` keys of the same size.
//!
//! - **Bounded Streaming**: The scan runs ahead of aggregation by at most
//!   a fixed number of pages, regardless of keyspace size.
//!
//! - **O(1) Roll-ups**: Every namespace node holds the totals of its whole
//!   subtree.
//!
//! - **Gentle on Production**: Optional throttle between pages and one
//!   round trip per page for size lookups.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                         Redis Server                            │
//! └─────────────────────────────┬───────────────────────────────────┘
//!                               │
//!                               │ SCAN + pipelined MEMORY USAGE
//!                               ▼
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                    KeyScanService (tokio task)                  │
//! │  - cursor walk, systematic sampling                             │
//! │  - throttle, cancellation                                       │
//! └─────────────────────────────┬───────────────────────────────────┘
//!                               │ bounded channel (2 x page size)
//!                               ▼
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                       Scanner (caller task)                     │
//! │  - extrapolation, progress                                      │
//! └─────────────────────────────┬───────────────────────────────────┘
//!                               │ add(key, bytes, keys)
//!                               ▼
//!                    ┌──────────────────────┐
//!                    │   Trie (namespaces)  │
//!                    └──────────────────────┘
//! ```
//!
//! # Example
//!
//! ```bash
//! # Full inventory
//! redis-inventory inventory 127.0.0.1:6379
//!
//! # 10% sample, three levels deep, as JSON
//! redis-inventory inventory redis://cache:6379/0 --sample 10 -d 3 -o json
//! ```

pub mod config;
pub mod error;
pub mod progress;
pub mod report;
pub mod scanner;
pub mod seed;
pub mod store;
pub mod trie;

pub use config::{CliArgs, InventoryConfig, OutputFormat, RedisUrl, ScanOptions};
pub use error::{InventoryError, Result};
pub use scanner::{BulkKeyInfo, KeyScanService, ScanCompletion, ScanReport, Scanner};
pub use trie::{Node, Param, ParamValue, Trie};
