//! Store module - the boundary to the key-value store
//!
//! The scanner never talks to a connection directly. It issues
//! [`StoreCommand`]s through a [`CommandExecutor`], which can run one
//! command per round trip or a whole batch in a single pipelined round trip.
//!
//! Two executors are provided:
//! - [`RedisExecutor`]: a multiplexed async connection to a real server
//! - [`MemoryStore`]: an in-process keyspace for tests and demos

mod memory;
mod redis_executor;
mod reply;

pub use memory::MemoryStore;
pub use redis_executor::RedisExecutor;
pub use reply::{int_reply, memory_usage_reply, ScanPage, CURSOR_START};

use crate::error::StoreResult;
use redis::Value;
use std::time::Duration;

/// A single store operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreCommand {
    /// One page of cursor-based key enumeration
    Scan {
        cursor: String,
        count: usize,
        pattern: Option<String>,
    },
    /// Approximate memory footprint of one key, named by its raw bytes
    MemoryUsage { key: Vec<u8> },
    /// Number of keys in the selected database
    DbSize,
    /// Write a string value, optionally expiring
    Set {
        key: String,
        value: String,
        ttl: Option<Duration>,
    },
}

impl StoreCommand {
    /// Command name as sent on the wire
    pub fn name(&self) -> &'static str {
        match self {
            StoreCommand::Scan { .. } => "SCAN",
            StoreCommand::MemoryUsage { .. } => "MEMORY USAGE",
            StoreCommand::DbSize => "DBSIZE",
            StoreCommand::Set { .. } => "SET",
        }
    }

    /// Build the redis command
    pub fn to_cmd(&self) -> redis::Cmd {
        match self {
            StoreCommand::Scan {
                cursor,
                count,
                pattern,
            } => {
                let mut cmd = redis::cmd("SCAN");
                cmd.arg(cursor);
                if let Some(pattern) = pattern {
                    cmd.arg("MATCH").arg(pattern);
                }
                cmd.arg("COUNT").arg(*count);
                cmd
            }
            StoreCommand::MemoryUsage { key } => {
                let mut cmd = redis::cmd("MEMORY");
                cmd.arg("USAGE").arg(key.as_slice());
                cmd
            }
            StoreCommand::DbSize => redis::cmd("DBSIZE"),
            StoreCommand::Set { key, value, ttl } => {
                let mut cmd = redis::cmd("SET");
                cmd.arg(key).arg(value);
                if let Some(ttl) = ttl {
                    cmd.arg("PX").arg(ttl.as_millis().max(1) as u64);
                }
                cmd
            }
        }
    }
}

/// Executes store commands
///
/// `execute_batch` must issue all commands in one round trip and return
/// one reply per command, in order.
#[async_trait::async_trait]
pub trait CommandExecutor: Send + Sync {
    /// Run one command
    async fn execute(&self, command: StoreCommand) -> StoreResult<Value>;

    /// Run a batch of commands as a single pipelined round trip
    async fn execute_batch(&self, commands: Vec<StoreCommand>) -> StoreResult<Vec<Value>>;
}

// Re-export async_trait for executor implementations
pub use async_trait::async_trait;
