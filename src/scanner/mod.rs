//! Keyspace scanning
//!
//! Two-stage pipeline: a [`KeyScanService`] task produces measured pages
//! over a bounded channel and a [`Scanner`] consumes them into a
//! [`Trie`](crate::trie::Trie) on the caller's task.
//!
//! ```text
//!  Redis ──SCAN / MEMORY USAGE──▶ KeyScanService ──pages──▶ Scanner ──▶ Trie
//!                                 (tokio task)    bounded   (caller)
//! ```

pub mod orchestrator;
pub mod service;

pub use orchestrator::{Extrapolator, NoProgress, ScanProgress, ScanReport, Scanner};
pub use service::{is_sampled, BulkKeyInfo, KeyScanService, ScanCompletion, ScanStream};
