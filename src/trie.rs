//! Aggregation tree over key namespaces
//!
//! Keys are split into segments on a set of separator characters and
//! inserted as paths from the root. Every node on an inserted path
//! accumulates the supplied metrics, so the total under any namespace
//! prefix is a single node lookup.
//!
//! ```text
//! add("a:b:x", 100)    root          175 / 3
//! add("a:b:y",  50)     └─ a         175 / 3
//! add("a:c:z",  25)         ├─ b     150 / 2
//!                           │  ├─ x  100 / 1
//!                           │  └─ y   50 / 1
//!                           └─ c      25 / 1
//!                              └─ z   25 / 1
//! ```
//!
//! The tree has no cardinality cap and is not synchronized; it is built by
//! a single writer and read afterwards.

use serde::ser::{Serialize, SerializeStruct, Serializer};
use std::collections::{BTreeMap, HashMap};

/// Default namespace separator
pub const DEFAULT_SEPARATOR: char = ':';

const PARAM_COUNT: usize = 2;

/// Metric accumulated on every node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Param {
    /// Estimated memory footprint in bytes
    BytesSize,
    /// Estimated number of keys
    KeysCount,
}

impl Param {
    /// Every tracked metric
    pub const ALL: [Param; PARAM_COUNT] = [Param::BytesSize, Param::KeysCount];

    const fn index(self) -> usize {
        match self {
            Param::BytesSize => 0,
            Param::KeysCount => 1,
        }
    }
}

/// One metric contribution for an insertion
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParamValue {
    pub param: Param,
    pub value: i64,
}

impl ParamValue {
    /// Bytes contribution
    pub fn bytes(value: i64) -> Self {
        Self {
            param: Param::BytesSize,
            value,
        }
    }

    /// Key count contribution
    pub fn keys(value: i64) -> Self {
        Self {
            param: Param::KeysCount,
            value,
        }
    }
}

/// A namespace in the tree
///
/// Its values are the sums over itself and its whole subtree.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Node {
    children: HashMap<String, Node>,
    values: [i64; PARAM_COUNT],
}

impl Node {
    /// Accumulated value of `param`
    pub fn value(&self, param: Param) -> i64 {
        self.values[param.index()]
    }

    /// Direct children by segment
    pub fn children(&self) -> &HashMap<String, Node> {
        &self.children
    }

    /// Direct child for `segment`
    pub fn child(&self, segment: &str) -> Option<&Node> {
        self.children.get(segment)
    }

    /// True when nothing was inserted below this node
    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }

    /// Children ordered by `param` descending, ties by segment
    pub fn sorted_children(&self, param: Param) -> Vec<(&str, &Node)> {
        let mut children: Vec<(&str, &Node)> = self
            .children
            .iter()
            .map(|(segment, node)| (segment.as_str(), node))
            .collect();
        children.sort_by(|a, b| {
            b.1.value(param)
                .cmp(&a.1.value(param))
                .then_with(|| a.0.cmp(b.0))
        });
        children
    }

    fn accumulate(&mut self, values: &[ParamValue]) {
        for pv in values {
            let slot = &mut self.values[pv.param.index()];
            *slot = slot.saturating_add(pv.value);
        }
    }

    fn count_nodes(&self) -> usize {
        1 + self.children.values().map(Node::count_nodes).sum::<usize>()
    }
}

impl Serialize for Node {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        // Sorted so repeated runs produce identical documents
        let children: BTreeMap<&String, &Node> = self.children.iter().collect();

        let mut state = serializer.serialize_struct("Node", 3)?;
        state.serialize_field("bytes_size", &self.value(Param::BytesSize))?;
        state.serialize_field("keys_count", &self.value(Param::KeysCount))?;
        state.serialize_field("children", &children)?;
        state.end()
    }
}

/// Prefix tree of key namespaces
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Trie {
    root: Node,
    separators: Vec<char>,
}

impl Trie {
    /// Create a tree splitting on `:`
    pub fn new() -> Self {
        Self::with_separators(&[DEFAULT_SEPARATOR])
    }

    /// Create a tree splitting on any of `separators`
    pub fn with_separators(separators: &[char]) -> Self {
        Self {
            root: Node::default(),
            separators: separators.to_vec(),
        }
    }

    /// Add `values` to every node on the path of `key`, creating missing nodes
    pub fn add(&mut self, key: &str, values: &[ParamValue]) {
        let separators = &self.separators;
        let mut node = &mut self.root;
        node.accumulate(values);

        for segment in key.split(|c: char| separators.contains(&c)) {
            node = node.children.entry(segment.to_owned()).or_default();
            node.accumulate(values);
        }
    }

    /// The node for the whole keyspace
    pub fn root(&self) -> &Node {
        &self.root
    }

    /// Look up the node addressed by `path`
    pub fn node(&self, path: &str) -> Option<&Node> {
        path.split(|c: char| self.separators.contains(&c))
            .try_fold(&self.root, |node, segment| node.child(segment))
    }

    /// Separator characters
    pub fn separators(&self) -> &[char] {
        &self.separators
    }

    /// Total number of nodes, root included
    pub fn node_count(&self) -> usize {
        self.root.count_nodes()
    }
}

impl Default for Trie {
    fn default() -> Self {
        Self::new()
    }
}

impl Serialize for Trie {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.root.serialize(serializer)
    }
}
