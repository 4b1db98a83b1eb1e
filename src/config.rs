//! Configuration types for redis-inventory
//!
//! This module defines:
//! - CLI argument parsing using clap derive macros
//! - Scan options with validation
//! - Redis address parsing

use crate::error::ConfigError;
use clap::{Parser, Subcommand, ValueEnum};
use regex::Regex;
use std::sync::LazyLock;
use std::time::Duration;

/// Default SCAN page size
pub const DEFAULT_SCAN_COUNT: usize = 1000;

/// Default port when the address omits one
pub const DEFAULT_PORT: u16 = 6379;

/// Matches: host, host:port, host:port/db
static REDIS_ADDR_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([^:/\s]+)(?::(\d+))?(?:/(\d+))?$").expect("Invalid Redis address regex")
});

/// Sampled memory inventory of a Redis keyspace
#[derive(Parser, Debug, Clone)]
#[command(
    name = "redis-inventory",
    version,
    about = "Hierarchical memory inventory of a Redis keyspace",
    long_about = "Scans a Redis keyspace with SCAN, measures sampled keys with MEMORY USAGE\n\
                  and groups them by their delimiter-separated namespaces.\n\n\
                  Every namespace level reports estimated bytes and key count.",
    after_help = "EXAMPLES:\n    \
        redis-inventory inventory 127.0.0.1:6379\n    \
        redis-inventory inventory redis://cache:6379/2 --sample 10 --depth 3\n    \
        redis-inventory inventory 127.0.0.1 --match 'prod:*' --output json\n    \
        redis-inventory seed 127.0.0.1:6379 --cycles 5"
)]
pub struct CliArgs {
    /// Subcommand to run
    #[command(subcommand)]
    pub command: Command,

    /// Quiet mode - suppress progress output
    #[arg(short = 'q', long, global = true)]
    pub quiet: bool,

    /// Verbose output (debug logging)
    #[arg(short = 'v', long, global = true)]
    pub verbose: bool,
}

/// Available subcommands
#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Scan the keyspace and print the namespace inventory
    Inventory {
        /// Redis address (host[:port][/db] or redis://...)
        #[arg(value_name = "ADDR", env = "REDIS_URL")]
        addr: String,

        /// Only scan keys matching this glob pattern
        #[arg(short = 'm', long = "match", default_value = "*", value_name = "PATTERN")]
        pattern: String,

        /// Keys requested per SCAN round trip
        #[arg(short = 'c', long, default_value_t = DEFAULT_SCAN_COUNT, value_name = "NUM")]
        count: usize,

        /// Pause between SCAN pages, in nanoseconds
        #[arg(long, default_value = "0", value_name = "NANOS")]
        throttle: u64,

        /// Percentage of keys measured with MEMORY USAGE (1-100)
        #[arg(long, default_value = "100", value_name = "PERC")]
        sample: u32,

        /// Characters that separate namespace segments
        #[arg(long, default_value = ":", value_name = "CHARS")]
        separators: String,

        /// Maximum depth of the printed tree
        #[arg(short = 'd', long, default_value = "10", value_name = "NUM")]
        depth: usize,

        /// Fold away namespaces smaller than this many bytes
        #[arg(long, default_value = "0", value_name = "BYTES")]
        min_size: u64,

        /// Report format
        #[arg(short = 'o', long, value_enum, default_value_t = OutputFormat::Text)]
        output: OutputFormat,
    },

    /// Fill a Redis instance with random namespaced keys
    Seed {
        /// Redis address (host[:port][/db] or redis://...)
        #[arg(value_name = "ADDR", env = "REDIS_URL")]
        addr: String,

        /// Number of times the key catalogue is generated
        #[arg(long, default_value = "1000", value_name = "NUM")]
        cycles: usize,
    },
}

/// Report output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Indented tree on the terminal
    Text,
    /// The whole tree as JSON
    Json,
}

/// Options for one keyspace scan
///
/// Built once per run and immutable afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanOptions {
    pattern: String,
    scan_count: usize,
    throttle: Duration,
    sample_perc: u32,
}

impl ScanOptions {
    /// Create validated scan options
    pub fn new(
        pattern: impl Into<String>,
        scan_count: usize,
        throttle: Duration,
        sample_perc: u32,
    ) -> Result<Self, ConfigError> {
        if !(1..=100).contains(&sample_perc) {
            return Err(ConfigError::InvalidSamplePercent(sample_perc));
        }
        if scan_count == 0 {
            return Err(ConfigError::InvalidScanCount(scan_count));
        }

        Ok(Self {
            pattern: pattern.into(),
            scan_count,
            throttle,
            sample_perc,
        })
    }

    /// Key pattern passed to SCAN MATCH
    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    /// Keys requested per SCAN round trip
    pub fn scan_count(&self) -> usize {
        self.scan_count
    }

    /// Pause between pages
    pub fn throttle(&self) -> Duration {
        self.throttle
    }

    /// Percentage of keys measured per page
    pub fn sample_perc(&self) -> u32 {
        self.sample_perc
    }

    /// True when the pattern selects every key
    pub fn matches_everything(&self) -> bool {
        self.pattern.is_empty() || self.pattern == "*"
    }

    /// Capacity of the page channel between scanner and consumer
    pub fn channel_capacity(&self) -> usize {
        self.scan_count * 2
    }

    /// Number of keys each measured key stands in for
    pub fn extrapolation_factor(&self) -> f64 {
        100.0 / f64::from(self.sample_perc)
    }
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            pattern: "*".to_string(),
            scan_count: DEFAULT_SCAN_COUNT,
            throttle: Duration::ZERO,
            sample_perc: 100,
        }
    }
}

/// Parsed Redis address
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RedisUrl {
    url: String,
}

impl RedisUrl {
    /// Parse `host`, `host:port`, `host:port/db` or a `redis://` / `rediss://` URL
    pub fn parse(addr: &str) -> Result<Self, ConfigError> {
        let addr = addr.trim();
        let invalid = |reason: &str| ConfigError::InvalidRedisUrl {
            addr: addr.to_string(),
            reason: reason.to_string(),
        };

        if let Some(rest) = addr
            .strip_prefix("redis://")
            .or_else(|| addr.strip_prefix("rediss://"))
        {
            if rest.is_empty() {
                return Err(invalid("missing host"));
            }
            return Ok(Self {
                url: addr.to_string(),
            });
        }

        let caps = REDIS_ADDR_REGEX
            .captures(addr)
            .ok_or_else(|| invalid("expected host[:port][/db] or redis://..."))?;

        let host = &caps[1];
        let port = match caps.get(2) {
            Some(m) => m
                .as_str()
                .parse::<u16>()
                .map_err(|_| invalid("port out of range"))?,
            None => DEFAULT_PORT,
        };

        let url = match caps.get(3) {
            Some(db) => format!("redis://{}:{}/{}", host, port, db.as_str()),
            None => format!("redis://{}:{}", host, port),
        };

        Ok(Self { url })
    }

    /// Connection URL understood by the redis client
    pub fn as_str(&self) -> &str {
        &self.url
    }

    /// URL with any password masked, for logs and headers
    pub fn to_display_string(&self) -> String {
        match (self.url.find("://"), self.url.rfind('@')) {
            (Some(scheme_end), Some(at)) if at > scheme_end => {
                format!("{}***{}", &self.url[..scheme_end + 3], &self.url[at..])
            }
            _ => self.url.clone(),
        }
    }
}

/// Validated configuration for the `inventory` command
#[derive(Debug, Clone)]
pub struct InventoryConfig {
    /// Store address
    pub redis_url: RedisUrl,
    /// Scan options
    pub scan: ScanOptions,
    /// Segment separators
    pub separators: Vec<char>,
    /// Printed tree depth
    pub max_depth: usize,
    /// Rendering threshold in bytes
    pub min_size: u64,
    /// Report format
    pub output: OutputFormat,
    /// Show progress
    pub show_progress: bool,
}

impl InventoryConfig {
    /// Create from CLI args
    pub fn from_args(args: &CliArgs) -> Result<Self, ConfigError> {
        let Command::Inventory {
            addr,
            pattern,
            count,
            throttle,
            sample,
            separators,
            depth,
            min_size,
            output,
        } = &args.command
        else {
            return Err(ConfigError::InvalidRedisUrl {
                addr: String::new(),
                reason: "not an inventory command".into(),
            });
        };

        let separators = parse_separators(separators)?;
        let scan = ScanOptions::new(
            pattern.clone(),
            *count,
            Duration::from_nanos(*throttle),
            *sample,
        )?;

        Ok(Self {
            redis_url: RedisUrl::parse(addr)?,
            scan,
            separators,
            max_depth: *depth,
            min_size: *min_size,
            output: *output,
            // JSON goes to stdout; keep the terminal clean for it
            show_progress: !args.quiet && *output == OutputFormat::Text,
        })
    }
}

/// Split a separator argument into its characters
pub fn parse_separators(s: &str) -> Result<Vec<char>, ConfigError> {
    let mut chars: Vec<char> = s.chars().collect();
    chars.dedup();
    if chars.is_empty() {
        return Err(ConfigError::InvalidSeparator(s.to_string()));
    }
    Ok(chars)
}
