//! Random keyspace seeder
//!
//! Fills a store with namespaced keys of random size and TTL so the
//! inventory has something realistic to chew on. Writes go out in
//! pipelined batches.

use crate::error::{StoreError, StoreResult};
use crate::store::{CommandExecutor, StoreCommand};

use rand::seq::SliceRandom;
use rand::Rng;
use std::ops::RangeInclusive;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// SET commands per pipelined round trip
pub const DEFAULT_BATCH_SIZE: usize = 500;

const HEX_CHARS: &[u8] = b"abdef0123456789";

/// Generator for one `{}` slot of a key pattern
#[derive(Debug, Clone)]
pub enum Segment {
    /// One of a fixed set of words
    Choice(&'static [&'static str]),
    /// A decimal integer in range
    Int(RangeInclusive<u32>),
    /// A random hex-like identifier with length in range
    Hex(RangeInclusive<usize>),
}

impl Segment {
    fn generate<R: Rng + ?Sized>(&self, rng: &mut R) -> String {
        match self {
            Segment::Choice(words) => words.choose(rng).copied().unwrap_or_default().to_string(),
            Segment::Int(range) => rng.gen_range(range.clone()).to_string(),
            Segment::Hex(len) => {
                let len = rng.gen_range(len.clone());
                (0..len)
                    .map(|_| HEX_CHARS[rng.gen_range(0..HEX_CHARS.len())] as char)
                    .collect()
            }
        }
    }
}

/// A family of keys generated from one pattern
#[derive(Debug, Clone)]
pub struct RecordTemplate {
    /// Keys generated per cycle
    pub count: usize,
    /// Key pattern; every `{}` is filled by the matching segment
    pub pattern: &'static str,
    pub segments: Vec<Segment>,
    /// Value length in bytes
    pub value_len: RangeInclusive<usize>,
    /// Expiry in seconds
    pub ttl_secs: RangeInclusive<u64>,
}

impl RecordTemplate {
    /// Generate one SET command
    pub fn generate<R: Rng + ?Sized>(&self, rng: &mut R) -> StoreCommand {
        let mut key = String::with_capacity(self.pattern.len() + 16);
        let mut segments = self.segments.iter();
        let mut parts = self.pattern.split("{}").peekable();
        while let Some(part) = parts.next() {
            key.push_str(part);
            if parts.peek().is_some() {
                if let Some(segment) = segments.next() {
                    key.push_str(&segment.generate(rng));
                }
            }
        }

        let len = rng.gen_range(self.value_len.clone());
        let value: String = (0..len)
            .map(|_| if rng.gen_bool(0.5) { '1' } else { '0' })
            .collect();

        StoreCommand::Set {
            key,
            value,
            ttl: Some(Duration::from_secs(rng.gen_range(self.ttl_secs.clone()))),
        }
    }
}

/// The demo keyspace: blog posts, comments and user profiles per environment
pub fn default_catalogue() -> Vec<RecordTemplate> {
    const ENVS: &[&str] = &["dev", "prod"];
    let value_len = 100..=1000;
    let ttl_secs = 3600..=86400;

    vec![
        RecordTemplate {
            count: 200,
            pattern: "{}:blogpost:{}:content",
            segments: vec![Segment::Choice(ENVS), Segment::Int(1..=5)],
            value_len: value_len.clone(),
            ttl_secs: ttl_secs.clone(),
        },
        RecordTemplate {
            count: 100,
            pattern: "{}:blogpost:{}:comment:{}",
            segments: vec![
                Segment::Choice(ENVS),
                Segment::Int(1..=5),
                Segment::Int(1..=1000),
            ],
            value_len: value_len.clone(),
            ttl_secs: ttl_secs.clone(),
        },
        RecordTemplate {
            count: 500,
            pattern: "{}:user:{}:profile",
            segments: vec![Segment::Choice(ENVS), Segment::Hex(4..=10)],
            value_len: value_len.clone(),
            ttl_secs: ttl_secs.clone(),
        },
        RecordTemplate {
            count: 500,
            pattern: "{}:friends:foobar:{}:profile",
            segments: vec![Segment::Choice(ENVS), Segment::Hex(4..=10)],
            value_len,
            ttl_secs,
        },
    ]
}

/// Writes generated records to a store
pub struct Seeder {
    executor: Arc<dyn CommandExecutor>,
    batch_size: usize,
}

impl Seeder {
    /// Create a seeder writing through `executor`
    pub fn new(executor: Arc<dyn CommandExecutor>) -> Self {
        Self {
            executor,
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }

    /// Override the pipeline batch size
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// Generate `cycles` rounds of every template; returns keys written
    pub async fn seed<R: Rng + Send>(
        &self,
        rng: &mut R,
        templates: &[RecordTemplate],
        cycles: usize,
        token: &CancellationToken,
    ) -> StoreResult<u64> {
        let mut written = 0u64;
        let mut batch = Vec::with_capacity(self.batch_size);

        for cycle in 0..cycles {
            for template in templates {
                for _ in 0..template.count {
                    batch.push(template.generate(rng));
                    if batch.len() >= self.batch_size {
                        written += self.flush(&mut batch, token).await?;
                    }
                }
            }
            debug!(cycle, written, "Seed cycle done");
        }
        written += self.flush(&mut batch, token).await?;

        info!(written, "Seeding complete");
        Ok(written)
    }

    async fn flush(
        &self,
        batch: &mut Vec<StoreCommand>,
        token: &CancellationToken,
    ) -> StoreResult<u64> {
        if batch.is_empty() {
            return Ok(0);
        }
        let commands = std::mem::take(batch);
        let count = commands.len() as u64;

        tokio::select! {
            biased;
            _ = token.cancelled() => Err(StoreError::Cancelled),
            result = self.executor.execute_batch(commands) => result.map(|_| count),
        }
    }
}
