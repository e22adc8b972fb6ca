//! Splitting documents into flattened leaves plus the leftover "remain"
//! payload, and merging them back.
//!
//! The remain payload keeps the nested shape of the document: every key not
//! covered by a flattened path is kept at its original nesting level.

use crate::schema::flat_schema::FlatPath;
use serde_json::{Map, Value};

#[derive(Debug, Default)]
struct PathTrie {
    children: Vec<(String, PathNode)>,
}

#[derive(Debug)]
enum PathNode {
    Leaf,
    Inner(PathTrie),
}

impl PathTrie {
    fn insert(&mut self, segments: &[String]) {
        let Some((head, rest)) = segments.split_first() else {
            return;
        };
        let idx = match self.children.iter().position(|(k, _)| k == head) {
            Some(idx) => idx,
            None => {
                let node = if rest.is_empty() {
                    PathNode::Leaf
                } else {
                    PathNode::Inner(PathTrie::default())
                };
                self.children.push((head.clone(), node));
                self.children.len() - 1
            }
        };
        if let PathNode::Inner(trie) = &mut self.children[idx].1 {
            trie.insert(rest);
        }
    }

    fn get(&self, key: &str) -> Option<&PathNode> {
        self.children.iter().find(|(k, _)| k == key).map(|(_, n)| n)
    }

    /// Whether any flattened leaf below this trie has a value in `obj`
    fn any_leaf_present(&self, obj: &Map<String, Value>) -> bool {
        self.children.iter().any(|(key, node)| match (node, obj.get(key)) {
            (_, None) => false,
            (PathNode::Leaf, Some(_)) => true,
            (PathNode::Inner(trie), Some(Value::Object(inner))) => trie.any_leaf_present(inner),
            (PathNode::Inner(_), Some(_)) => false,
        })
    }

    fn leftover(&self, obj: &Map<String, Value>) -> Map<String, Value> {
        let mut out = Map::new();
        for (key, value) in obj.iter() {
            match (self.get(key), value) {
                (None, _) => {
                    out.insert(key.clone(), value.clone());
                }
                (Some(PathNode::Leaf), _) => {}
                (Some(PathNode::Inner(trie)), Value::Object(inner)) => {
                    let rest = trie.leftover(inner);
                    // An object with no flattened leaf present would vanish on merge
                    if !rest.is_empty() || !trie.any_leaf_present(inner) {
                        out.insert(key.clone(), Value::Object(rest));
                    }
                }
                (Some(PathNode::Inner(_)), other) => {
                    out.insert(key.clone(), other.clone());
                }
            }
        }
        out
    }
}

/// Computes the remain payload of documents for a fixed set of flat paths
#[derive(Debug)]
pub struct RemainSplitter {
    trie: PathTrie,
}

impl RemainSplitter {
    pub fn new(paths: &[FlatPath]) -> Self {
        let mut trie = PathTrie::default();
        for path in paths {
            trie.insert(path.segments());
        }
        RemainSplitter { trie }
    }

    /// Leftover content of one document; `{}` when fully covered.
    ///
    /// A document that is not an object is kept whole.
    pub fn split(&self, doc: &Value) -> Value {
        match doc {
            Value::Object(obj) => Value::Object(self.trie.leftover(obj)),
            other => other.clone(),
        }
    }
}

/// True when a remain payload carries nothing
pub fn is_empty_remain(remain: &Value) -> bool {
    matches!(remain, Value::Object(obj) if obj.is_empty())
}

/// Value at a nested path, if every level is an object holding the key
pub fn lookup_path<'a, S: AsRef<str>>(doc: &'a Value, segments: &[S]) -> Option<&'a Value> {
    let mut current = doc;
    for segment in segments {
        current = current.as_object()?.get(segment.as_ref())?;
    }
    Some(current)
}

/// Place `value` at a nested path, creating intermediate objects.
///
/// Returns false when an intermediate level holds a non-object.
pub fn insert_path(obj: &mut Map<String, Value>, segments: &[String], value: Value) -> bool {
    let Some((last, parents)) = segments.split_last() else {
        return false;
    };
    let mut current = obj;
    for segment in parents {
        let entry = current
            .entry(segment.clone())
            .or_insert_with(|| Value::Object(Map::new()));
        match entry {
            Value::Object(inner) => current = inner,
            _ => return false,
        }
    }
    current.insert(last.clone(), value);
    true
}

/// Merge `src` into `dst`, recursing where both sides hold objects
pub fn deep_merge(dst: &mut Map<String, Value>, src: Map<String, Value>) {
    for (key, value) in src {
        match (dst.get_mut(&key), value) {
            (Some(Value::Object(existing)), Value::Object(incoming)) => deep_merge(existing, incoming),
            (Some(_), _) => {}
            (None, value) => {
                dst.insert(key, value);
            }
        }
    }
}

/// Rebuild a document from its flattened leaves and remain payload
pub fn reconstruct<I>(leaves: I, remain: Option<Value>) -> Value
where
    I: IntoIterator<Item = (Vec<String>, Value)>,
{
    let mut obj = Map::new();
    for (segments, value) in leaves {
        insert_path(&mut obj, &segments, value);
    }
    match remain {
        Some(Value::Object(rest)) => {
            deep_merge(&mut obj, rest);
            Value::Object(obj)
        }
        Some(other) if obj.is_empty() => other,
        _ => Value::Object(obj),
    }
}
