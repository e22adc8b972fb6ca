use crate::error::{FlatJsonError, Result};
use crate::storage::meta::ColumnMeta;
use crate::types::LogicalType;

/// Child name of the per-row document null marker
pub const NULLS_NAME: &str = "nulls";
/// Child name of the leftover-fields sub-column
pub const REMAIN_NAME: &str = "remain";

/// Keys that can be part of a flattened path
pub fn is_flattenable_key(key: &str) -> bool {
    !key.is_empty() && !key.contains('.')
}

/// Top-level keys that would collide with the marker children
pub fn is_reserved_name(key: &str) -> bool {
    key == NULLS_NAME || key == REMAIN_NAME
}

/// A flattened field location and the type its sub-column stores
#[derive(Debug, Clone, PartialEq)]
pub struct FlatPath {
    path: String,
    segments: Vec<String>,
    logical_type: LogicalType,
}

impl FlatPath {
    pub fn new(segments: Vec<String>, logical_type: LogicalType) -> Self {
        FlatPath {
            path: segments.join("."),
            segments,
            logical_type,
        }
    }

    pub fn parse(dotted: &str, logical_type: LogicalType) -> Self {
        FlatPath::new(dotted.split('.').map(str::to_string).collect(), logical_type)
    }

    /// Dotted path, e.g. `b.b2.b3`
    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    pub fn logical_type(&self) -> LogicalType {
        self.logical_type
    }

    /// True when `other` lies strictly below this path
    pub fn is_ancestor_of(&self, other: &[String]) -> bool {
        other.len() > self.segments.len() && other.starts_with(&self.segments)
    }

    /// True when this path lies strictly below `other`
    pub fn is_descendant_of(&self, other: &[String]) -> bool {
        self.segments.len() > other.len() && self.segments.starts_with(other)
    }
}

/// Decomposition of a JSON column into sub-columns.
///
/// Children are laid out as `[nulls?] paths... [remain?]`. Readers trust
/// this order as persisted and never re-infer it.
#[derive(Debug, Clone, PartialEq)]
pub struct FlatSchema {
    pub is_flat: bool,
    pub paths: Vec<FlatPath>,
    pub has_remain: bool,
    pub has_nulls: bool,
}

impl FlatSchema {
    /// Store the column as a single JSON blob
    pub fn unflattened() -> Self {
        FlatSchema {
            is_flat: false,
            paths: Vec::new(),
            has_remain: false,
            has_nulls: false,
        }
    }

    /// Child names and types in persisted order
    pub fn children(&self) -> Vec<(String, LogicalType)> {
        if !self.is_flat {
            return Vec::new();
        }
        let mut children = Vec::with_capacity(self.paths.len() + 2);
        if self.has_nulls {
            children.push((NULLS_NAME.to_string(), LogicalType::Boolean));
        }
        children.extend(
            self.paths
                .iter()
                .map(|p| (p.path().to_string(), p.logical_type())),
        );
        if self.has_remain {
            children.push((REMAIN_NAME.to_string(), LogicalType::Json));
        }
        children
    }

    pub fn child_names(&self) -> Vec<String> {
        self.children().into_iter().map(|(name, _)| name).collect()
    }

    /// Index of the `i`-th path among the persisted children
    pub fn path_child_index(&self, i: usize) -> usize {
        i + usize::from(self.has_nulls)
    }

    pub fn remain_child_index(&self) -> Option<usize> {
        self.has_remain
            .then(|| self.paths.len() + usize::from(self.has_nulls))
    }

    /// Rebuild the schema from validated column metadata
    pub fn from_meta(meta: &ColumnMeta) -> Result<Self> {
        if !meta.json.is_flat {
            return Ok(FlatSchema::unflattened());
        }
        let has_nulls = meta.has_nulls();
        let has_remain = meta.json.has_remain;
        let paths: Vec<FlatPath> = meta
            .children
            .iter()
            .filter(|c| c.name != NULLS_NAME && c.name != REMAIN_NAME)
            .map(|c| FlatPath::parse(&c.name, c.logical_type))
            .collect();

        let expected = paths.len() + usize::from(has_nulls) + usize::from(has_remain);
        if expected != meta.children.len() || paths.is_empty() {
            return Err(FlatJsonError::corruption(format!(
                "flat json children mismatch: {} children, {} paths",
                meta.children.len(),
                paths.len()
            )));
        }
        Ok(FlatSchema {
            is_flat: true,
            paths,
            has_remain,
            has_nulls,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn path(p: &str) -> FlatPath {
        FlatPath::parse(p, LogicalType::Json)
    }

    #[test]
    fn test_children_layout() {
        let schema = FlatSchema {
            is_flat: true,
            paths: vec![path("a"), path("b.b1")],
            has_remain: true,
            has_nulls: true,
        };
        assert_eq!(schema.child_names(), vec!["nulls", "a", "b.b1", "remain"]);
        assert_eq!(schema.path_child_index(1), 2);
        assert_eq!(schema.remain_child_index(), Some(3));
    }

    #[test]
    fn test_unflattened_has_no_children() {
        assert!(FlatSchema::unflattened().children().is_empty());
    }

    #[test]
    fn test_ancestry() {
        let b4 = path("b.b4");
        let segments: Vec<String> = vec!["b".into(), "b4".into(), "b5".into()];
        assert!(b4.is_ancestor_of(&segments));
        assert!(!b4.is_ancestor_of(b4.segments()));
        assert!(b4.is_descendant_of(&["b".to_string()]));
    }

    #[test]
    fn test_key_rules() {
        assert!(is_flattenable_key("a"));
        assert!(!is_flattenable_key("a.b"));
        assert!(!is_flattenable_key(""));
        assert!(is_reserved_name("remain"));
    }
}
