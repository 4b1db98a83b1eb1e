//! Progress reporting for keyspace scans
//!
//! Provides real-time progress display using indicatif progress bars,
//! plus the header and summary printed around a scan.

use crate::config::ScanOptions;
use crate::scanner::{ScanCompletion, ScanProgress, ScanReport};
use crate::trie::{Param, Trie};
use console::style;
use humansize::{format_size, BINARY};
use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

/// Progress reporter that displays scan status
pub struct ProgressReporter {
    /// Progress bar
    bar: ProgressBar,
}

impl ProgressReporter {
    /// Create a new progress reporter
    pub fn new() -> Self {
        Self::with_bar(ProgressBar::new_spinner())
    }

    /// Reporter that draws nothing
    pub fn hidden() -> Self {
        Self::with_bar(ProgressBar::hidden())
    }

    fn with_bar(bar: ProgressBar) -> Self {
        Self { bar }
    }

    /// Keys counted so far
    pub fn position(&self) -> u64 {
        self.bar.position()
    }

    /// Current bar length, if a total is known
    pub fn length(&self) -> Option<u64> {
        self.bar.length()
    }

    fn bar_style() -> ProgressStyle {
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {human_pos}/{human_len} keys ({per_sec}, ETA {eta})")
            .expect("Invalid progress template")
            .progress_chars("=> ")
    }

    fn spinner_style() -> ProgressStyle {
        ProgressStyle::default_spinner()
            .template("{spinner:.green} [{elapsed_precise}] {human_pos} keys ({per_sec})")
            .expect("Invalid progress template")
            .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏")
    }
}

impl Default for ProgressReporter {
    fn default() -> Self {
        Self::new()
    }
}

impl ScanProgress for ProgressReporter {
    fn start(&self, expected: Option<u64>) {
        match expected {
            Some(total) => {
                self.bar.set_length(total);
                self.bar.set_style(Self::bar_style());
            }
            None => {
                self.bar.unset_length();
                self.bar.set_style(Self::spinner_style());
            }
        }
        self.bar.set_position(0);
        self.bar.enable_steady_tick(Duration::from_millis(100));
    }

    fn increment(&self) {
        self.bar.inc(1);
        // Sampling makes the total an estimate; grow instead of overflowing
        if let Some(len) = self.bar.length() {
            let pos = self.bar.position();
            if pos > len {
                self.bar.set_length(pos);
            }
        }
    }

    fn stop(&self) {
        self.bar.finish_and_clear();
    }
}

/// Format a number with thousands separators
pub fn format_number(n: u64) -> String {
    let s = n.to_string();
    let bytes: Vec<_> = s.bytes().rev().collect();

    let chunks: Vec<String> = bytes
        .chunks(3)
        .map(|chunk| chunk.iter().rev().map(|&b| b as char).collect::<String>())
        .collect();

    chunks.into_iter().rev().collect::<Vec<_>>().join(",")
}

/// Print a header at the start of the scan
pub fn print_header(url: &str, options: &ScanOptions) {
    eprintln!();
    eprintln!(
        "{} {}",
        style("redis-inventory").cyan().bold(),
        env!("CARGO_PKG_VERSION")
    );
    eprintln!("{}", style("─".repeat(50)).dim());
    eprintln!("  {} {}", style("Source:").bold(), url);
    eprintln!("  {} {}", style("Pattern:").bold(), options.pattern());
    eprintln!(
        "  {} {} keys/page, {}% sampled",
        style("Scan:").bold(),
        format_number(options.scan_count() as u64),
        options.sample_perc()
    );
    if !options.throttle().is_zero() {
        eprintln!("  {} {:?}", style("Throttle:").bold(), options.throttle());
    }
    eprintln!();
}

/// Print a summary of the scan results
pub fn print_summary(report: &ScanReport, trie: &Trie) {
    let root = trie.root();
    let bytes = root.value(Param::BytesSize).max(0) as u64;
    let keys = root.value(Param::KeysCount).max(0) as u64;
    let duration_secs = report.duration.as_secs_f64();
    let rate = if duration_secs > 0.0 {
        report.keys_sampled as f64 / duration_secs
    } else {
        0.0
    };

    let (status, headline) = match &report.completion {
        ScanCompletion::Complete => (style("complete").green(), style("Scan Complete").green()),
        ScanCompletion::Cancelled => (style("cancelled").yellow(), style("Scan Interrupted").yellow()),
        ScanCompletion::Failed(_) => (style("failed").red(), style("Scan Failed").red()),
    };

    println!();
    println!("{}", headline.bold());
    println!("{}", style("─".repeat(50)).dim());
    println!(
        "  {} {}",
        style("Keys measured:").bold(),
        format_number(report.keys_sampled)
    );
    println!("  {} {}", style("Estimated keys:").bold(), format_number(keys));
    println!(
        "  {} {}",
        style("Estimated size:").bold(),
        format_size(bytes, BINARY)
    );
    println!(
        "  {} {:.1}s ({:.0} keys/sec, {} pages)",
        style("Duration:").bold(),
        duration_secs,
        rate,
        format_number(report.pages)
    );
    println!("  {} {}", style("Status:").bold(), status);
    if let ScanCompletion::Failed(reason) = &report.completion {
        println!("  {} {}", style("Cause:").red().bold(), reason);
        println!("  {}", style("Totals cover only the pages scanned before the failure").dim());
    }
    println!();
}
