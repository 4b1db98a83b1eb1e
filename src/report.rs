//! Rendering of a finished inventory
//!
//! Reads the tree only through its query surface: node values and
//! children. Ordering and pruning happen here, not in the tree.

use crate::error::Result;
use crate::scanner::{ScanCompletion, ScanReport};
use crate::trie::{Node, Param, Trie};
use chrono::{DateTime, Utc};
use humansize::{format_size, BINARY};
use serde::Serialize;
use std::io::Write;

/// Text rendering options
#[derive(Debug, Clone, Copy)]
pub struct RenderOptions {
    /// Deepest level printed (top-level namespaces are depth 1)
    pub max_depth: usize,
    /// Namespaces below this many bytes are folded into a summary line
    pub min_size: u64,
    /// Ordering of siblings, largest first
    pub sort_by: Param,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            max_depth: 10,
            min_size: 0,
            sort_by: Param::BytesSize,
        }
    }
}

const SIZE_WIDTH: usize = 12;
const KEYS_WIDTH: usize = 12;

/// Write the tree as an indented table
pub fn render_text<W: Write>(out: &mut W, trie: &Trie, options: &RenderOptions) -> Result<()> {
    let separator = trie
        .separators()
        .first()
        .copied()
        .unwrap_or(crate::trie::DEFAULT_SEPARATOR);

    let width = name_width(trie, options.max_depth);
    writeln!(
        out,
        "{:<width$} {:>SIZE_WIDTH$} {:>KEYS_WIDTH$}",
        "NAMESPACE", "SIZE", "KEYS",
    )?;

    let mut walker = TextWalker {
        out: &mut *out,
        options,
        separator,
        width,
    };
    walker.children(trie.root(), "", 1)?;

    let root = trie.root();
    writeln!(
        out,
        "{:<width$} {:>SIZE_WIDTH$} {:>KEYS_WIDTH$}",
        "TOTAL",
        format_size(root.value(Param::BytesSize).max(0) as u64, BINARY),
        root.value(Param::KeysCount),
    )?;
    Ok(())
}

struct TextWalker<'a, W: Write> {
    out: &'a mut W,
    options: &'a RenderOptions,
    separator: char,
    width: usize,
}

impl<W: Write> TextWalker<'_, W> {
    fn children(&mut self, node: &Node, prefix: &str, depth: usize) -> Result<()> {
        if depth > self.options.max_depth {
            return Ok(());
        }

        let indent = "  ".repeat(depth - 1);
        let mut folded = 0usize;
        let mut folded_bytes = 0i64;
        let mut folded_keys = 0i64;

        for (segment, child) in node.sorted_children(self.options.sort_by) {
            let bytes = child.value(Param::BytesSize);
            if (bytes.max(0) as u64) < self.options.min_size {
                folded += 1;
                folded_bytes += bytes;
                folded_keys += child.value(Param::KeysCount);
                continue;
            }

            let path = if child.is_leaf() {
                format!("{}{}", prefix, segment)
            } else {
                format!("{}{}{}", prefix, segment, self.separator)
            };

            writeln!(
                self.out,
                "{:<width$} {:>SIZE_WIDTH$} {:>KEYS_WIDTH$}",
                format!("{}{}", indent, path),
                format_size(bytes.max(0) as u64, BINARY),
                child.value(Param::KeysCount),
                width = self.width
            )?;

            self.children(child, &path, depth + 1)?;
        }

        if folded > 0 {
            writeln!(
                self.out,
                "{:<width$} {:>SIZE_WIDTH$} {:>KEYS_WIDTH$}",
                format!("{}({} smaller)", indent, folded),
                format_size(folded_bytes.max(0) as u64, BINARY),
                folded_keys,
                width = self.width
            )?;
        }
        Ok(())
    }
}

/// Width of the namespace column: longest printed path plus indentation
fn name_width(trie: &Trie, max_depth: usize) -> usize {
    fn widest(node: &Node, prefix_len: usize, depth: usize, max_depth: usize) -> usize {
        if depth > max_depth {
            return 0;
        }
        node.children()
            .iter()
            .map(|(segment, child)| {
                let len = prefix_len + segment.chars().count() + 1;
                (2 * (depth - 1) + len).max(widest(child, len, depth + 1, max_depth))
            })
            .max()
            .unwrap_or(0)
    }

    widest(trie.root(), 0, 1, max_depth).clamp(12, 120)
}

/// Machine-readable inventory
#[derive(Debug, Serialize)]
pub struct JsonReport<'a> {
    pub started_at: DateTime<Utc>,
    pub duration_ms: u64,
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<&'a str>,
    pub pages: u64,
    pub keys_sampled: u64,
    pub extrapolation_factor: f64,
    pub separators: String,
    pub tree: &'a Trie,
}

impl<'a> JsonReport<'a> {
    /// Assemble the report for a finished scan
    pub fn new(report: &'a ScanReport, trie: &'a Trie) -> Self {
        let (status, error) = match &report.completion {
            ScanCompletion::Complete => ("complete", None),
            ScanCompletion::Cancelled => ("cancelled", None),
            ScanCompletion::Failed(reason) => ("failed", Some(reason.as_str())),
        };

        Self {
            started_at: report.started_at,
            duration_ms: report.duration.as_millis() as u64,
            status,
            error,
            pages: report.pages,
            keys_sampled: report.keys_sampled,
            extrapolation_factor: report.extrapolation_factor,
            separators: trie.separators().iter().collect(),
            tree: trie,
        }
    }
}

/// Write the report as pretty JSON
pub fn render_json<W: Write>(out: &mut W, report: &ScanReport, trie: &Trie) -> Result<()> {
    serde_json::to_writer_pretty(&mut *out, &JsonReport::new(report, trie))?;
    writeln!(out)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trie::ParamValue;
    use std::time::Duration;

    fn sample_trie() -> Trie {
        let mut trie = Trie::new();
        for (key, bytes) in [("a:b:x", 100), ("a:b:y", 50), ("a:c:z", 25), ("tiny", 1)] {
            trie.add(key, &[ParamValue::bytes(bytes), ParamValue::keys(1)]);
        }
        trie
    }

    fn render(trie: &Trie, options: RenderOptions) -> String {
        let mut out = Vec::new();
        render_text(&mut out, trie, &options).unwrap();
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn test_text_tree_order_and_paths() {
        let text = render(&sample_trie(), RenderOptions::default());
        let lines: Vec<&str> = text.lines().collect();

        assert!(lines[0].starts_with("NAMESPACE"));
        assert!(lines[1].starts_with("a:"));
        assert!(lines[2].trim_start().starts_with("a:b:"));
        assert!(lines[3].trim_start().starts_with("a:b:x"));
        assert!(lines[4].trim_start().starts_with("a:b:y"));
        assert!(lines[5].trim_start().starts_with("a:c:"));
        assert!(lines.last().unwrap().starts_with("TOTAL"));
        assert!(text.contains("176 B"));
    }

    #[test]
    fn test_depth_limit() {
        let text = render(
            &sample_trie(),
            RenderOptions {
                max_depth: 1,
                ..Default::default()
            },
        );
        assert!(text.contains("a:"));
        assert!(!text.contains("a:b:"));
    }

    #[test]
    fn test_min_size_folds_small_namespaces() {
        let text = render(
            &sample_trie(),
            RenderOptions {
                min_size: 10,
                ..Default::default()
            },
        );
        assert!(!text.lines().any(|l| l.trim_start().starts_with("tiny")));
        assert!(text.contains("(1 smaller)"));
    }

    #[test]
    fn test_json_report() {
        let trie = sample_trie();
        let report = ScanReport {
            completion: ScanCompletion::Failed("connection reset".into()),
            pages: 2,
            keys_sampled: 4,
            expected_total: Some(4),
            extrapolation_factor: 1.0,
            started_at: Utc::now(),
            duration: Duration::from_millis(1500),
        };

        let mut out = Vec::new();
        render_json(&mut out, &report, &trie).unwrap();
        let json: serde_json::Value = serde_json::from_slice(&out).unwrap();

        assert_eq!(json["status"], "failed");
        assert_eq!(json["error"], "connection reset");
        assert_eq!(json["duration_ms"], 1500);
        assert_eq!(json["separators"], ":");
        assert_eq!(json["tree"]["bytes_size"], 176);
        assert_eq!(json["tree"]["children"]["a"]["children"]["b"]["keys_count"], 2);
    }
}
