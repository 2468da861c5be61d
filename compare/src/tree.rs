//! Nested comparison tree.
//!
//! A tree built for buckets `[b1, b2]` looks like
//! `{b1: {v1: {b2: {v2: {avg: {run_a: 1.0, run_b: 1.5}}}}}}`: levels alternate
//! between a bucket field name and a bucket value, and at depth `2 * buckets`
//! every key is an aggregation key holding a leaf of run id -> value.

use serde::{Deserialize, Serialize};
use std::collections::{btree_map::Entry, BTreeMap};
use tracing::{trace, warn};

/// run id -> aggregated value
pub type Leaf = BTreeMap<String, f64>;

/// Untagged on the wire: a mapping whose values are all mappings is a branch,
/// a mapping of numbers is a leaf. `{}` reads back as an empty branch.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Node {
    Branch(BTreeMap<String, Node>),
    Leaf(Leaf),
}

impl Default for Node {
    fn default() -> Self {
        Self::new()
    }
}

impl Node {
    /// empty branch
    pub fn new() -> Self {
        Self::Branch(BTreeMap::new())
    }

    pub fn is_empty(&self) -> bool {
        match self {
            Self::Leaf(values) => values.is_empty(),
            Self::Branch(children) => children.is_empty(),
        }
    }

    pub fn get(&self, key: &str) -> Option<&Node> {
        match self {
            Self::Branch(children) => children.get(key),
            Self::Leaf(_) => None,
        }
    }

    /// follow a sequence of keys from this node
    pub fn get_path<'a, I>(&self, path: I) -> Option<&Node>
    where
        I: IntoIterator<Item = &'a str>,
    {
        path.into_iter().try_fold(self, |node, key| node.get(key))
    }

    pub fn as_leaf(&self) -> Option<&Leaf> {
        match self {
            Self::Leaf(values) => Some(values),
            Self::Branch(_) => None,
        }
    }

    /// children of a branch, empty for leaves
    pub fn children(&self) -> impl Iterator<Item = (&String, &Node)> {
        let children = match self {
            Self::Branch(children) => Some(children.iter()),
            Self::Leaf(_) => None,
        };

        children.into_iter().flatten()
    }

    fn branch_mut(&mut self) -> &mut BTreeMap<String, Node> {
        if let Self::Leaf(values) = self {
            if !values.is_empty() {
                warn!("Replacing a leaf with a branch, the tree shapes of two runs disagree");
            }
            *self = Self::new();
        }

        match self {
            Self::Branch(children) => children,
            Self::Leaf(_) => unreachable!(),
        }
    }

    /// child for `key`, created as an empty branch if absent
    pub fn child_mut(&mut self, key: &str) -> &mut Node {
        self.branch_mut()
            .entry(key.to_owned())
            .or_insert_with(Node::new)
    }

    /// Store `value` for `run` under the alternating field/value `path` and
    /// aggregation `key`
    pub fn insert_value<S: AsRef<str>>(&mut self, path: &[S], key: &str, run: &str, value: f64) {
        let node = path
            .iter()
            .fold(self, |node, step| node.child_mut(step.as_ref()));

        let leaf = node
            .branch_mut()
            .entry(key.to_owned())
            .or_insert_with(|| Node::Leaf(Leaf::new()));

        if let Node::Branch(_) = leaf {
            warn!(key, "Replacing a branch with a leaf, the tree shapes of two runs disagree");
            *leaf = Node::Leaf(Leaf::new());
        }

        if let Node::Leaf(values) = leaf {
            values.insert(run.to_owned(), value);
        }
    }

    /// In place deep merge, `other` wins on conflicting leaves
    pub fn absorb(&mut self, other: Node) {
        match (self, other) {
            (Self::Branch(mine), Self::Branch(theirs)) => {
                for (key, node) in theirs {
                    match mine.entry(key) {
                        Entry::Vacant(entry) => {
                            entry.insert(node);
                        }
                        Entry::Occupied(mut entry) => entry.get_mut().absorb(node),
                    }
                }
            }
            (Self::Leaf(mine), Self::Leaf(theirs)) => mine.extend(theirs),
            // an empty mapping is neutral whatever variant it was parsed as
            (_, other) if other.is_empty() => {}
            (this, other) => *this = other,
        }
    }
}

/// Deep structural merge of two trees into a new one. Keys unique to either side
/// survive, nested mappings merge recursively and the right side wins on leaves.
pub fn merge(left: &Node, right: &Node) -> Node {
    let mut merged = left.clone();
    merged.absorb(right.clone());

    merged
}

/// Place `fresh` into `accumulator` below the path described by the filter pairs.
///
/// Each (field, value) pair descends two levels, the field name and then its
/// value, creating missing nodes on the way. At most `depth` pairs are followed;
/// an empty filter merges `fresh` at the root.
pub fn distribute(
    filter: &[(String, String)],
    accumulator: Node,
    depth: usize,
    fresh: Node,
) -> Node {
    let mut tree = accumulator;
    let mut cursor = &mut tree;

    for (field, value) in filter.iter().take(depth) {
        trace!(field = %field, value = %value, "Descending into filter path");
        cursor = cursor.child_mut(field).child_mut(value);
    }
    cursor.absorb(fresh);

    tree
}
