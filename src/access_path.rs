//! Access paths: typed trees of field paths.
//!
//! At write time an access path forces the listed fields to be flattened.
//! At read time it is a projection: only the listed paths are produced.

use crate::error::{FlatJsonError, Result};
use crate::types::LogicalType;

pub const ROOT_NAME: &str = "root";

/// One node of an access path tree
#[derive(Debug, Clone, PartialEq)]
pub struct AccessPath {
    path: String,
    target_type: Option<LogicalType>,
    children: Vec<AccessPath>,
}

/// A requested leaf, with its full dotted path relative to the root
#[derive(Debug, Clone, PartialEq)]
pub struct PathLeaf {
    pub path: String,
    pub target_type: Option<LogicalType>,
}

impl AccessPath {
    pub fn new(path: impl Into<String>, target_type: Option<LogicalType>) -> Self {
        AccessPath {
            path: path.into(),
            target_type,
            children: Vec::new(),
        }
    }

    /// An empty tree rooted at the column itself
    pub fn root() -> Self {
        AccessPath::new(ROOT_NAME, None)
    }

    /// Build a tree from `path[:TYPE]` strings such as `b.b4.b5:BIGINT`
    pub fn from_specs<S: AsRef<str>>(specs: &[S]) -> Result<Self> {
        let mut root = AccessPath::root();
        for spec in specs {
            let spec = spec.as_ref().trim();
            let (path, ty) = match spec.rsplit_once(':') {
                Some((path, ty)) => (path, Some(ty.parse::<LogicalType>()?)),
                None => (spec, None),
            };
            root.insert_json_path(ty, path)?;
        }
        Ok(root)
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn target_type(&self) -> Option<LogicalType> {
        self.target_type
    }

    pub fn children(&self) -> &[AccessPath] {
        &self.children
    }

    pub fn child(&self, name: &str) -> Option<&AccessPath> {
        self.children.iter().find(|c| c.path == name)
    }

    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }

    /// Insert a dotted path below this node, creating intermediate nodes.
    ///
    /// The target type is set on the last segment; an existing node keeps
    /// its children and gets the new type.
    pub fn insert_json_path(&mut self, target_type: Option<LogicalType>, dotted: &str) -> Result<()> {
        if dotted.is_empty() || dotted.split('.').any(str::is_empty) {
            return Err(FlatJsonError::invalid_argument(format!(
                "invalid json path: {:?}",
                dotted
            )));
        }

        let mut node = self;
        for segment in dotted.split('.') {
            let idx = match node.children.iter().position(|c| c.path == segment) {
                Some(idx) => idx,
                None => {
                    node.children.push(AccessPath::new(segment, None));
                    node.children.len() - 1
                }
            };
            node = &mut node.children[idx];
        }
        node.target_type = target_type;
        Ok(())
    }

    /// Leaves in depth-first order, as dotted paths relative to this node
    pub fn leaves(&self) -> Vec<PathLeaf> {
        let mut out = Vec::new();
        for child in &self.children {
            child.collect_leaves("", &mut out);
        }
        out
    }

    fn collect_leaves(&self, prefix: &str, out: &mut Vec<PathLeaf>) {
        let full = join_path(prefix, &self.path);
        if self.children.is_empty() {
            out.push(PathLeaf {
                path: full,
                target_type: self.target_type,
            });
            return;
        }
        for child in &self.children {
            child.collect_leaves(&full, out);
        }
    }
}

pub(crate) fn join_path(prefix: &str, name: &str) -> String {
    if prefix.is_empty() {
        name.to_string()
    } else {
        format!("{}.{}", prefix, name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_creates_intermediate_nodes() {
        let mut root = AccessPath::root();
        root.insert_json_path(Some(LogicalType::BigInt), "b.b4.b5").unwrap();

        let b = root.child("b").unwrap();
        assert_eq!(b.target_type(), None);
        let b5 = b.child("b4").unwrap().child("b5").unwrap();
        assert_eq!(b5.target_type(), Some(LogicalType::BigInt));
        assert!(b5.is_leaf());
    }

    #[test]
    fn test_leaves_in_insertion_order() {
        let mut root = AccessPath::root();
        root.insert_json_path(None, "b.b4.b5").unwrap();
        root.insert_json_path(None, "b.b2.b3").unwrap();
        root.insert_json_path(Some(LogicalType::Varchar), "a").unwrap();
        root.insert_json_path(None, "ff.f1").unwrap();

        let paths: Vec<String> = root.leaves().into_iter().map(|l| l.path).collect();
        assert_eq!(paths, vec!["b.b4.b5", "b.b2.b3", "a", "ff.f1"]);
    }

    #[test]
    fn test_reinsert_shares_nodes() {
        let mut root = AccessPath::root();
        root.insert_json_path(None, "b.b1").unwrap();
        root.insert_json_path(None, "b.b2").unwrap();
        assert_eq!(root.children().len(), 1);
        assert_eq!(root.child("b").unwrap().children().len(), 2);
    }

    #[test]
    fn test_invalid_paths() {
        let mut root = AccessPath::root();
        assert!(root.insert_json_path(None, "").is_err());
        assert!(root.insert_json_path(None, "a..b").is_err());
        assert!(root.insert_json_path(None, ".a").is_err());
    }

    #[test]
    fn test_from_specs() {
        let root = AccessPath::from_specs(&["a:varchar", "b.b2"]).unwrap();
        let leaves = root.leaves();
        assert_eq!(leaves[0].target_type, Some(LogicalType::Varchar));
        assert_eq!(leaves[1].path, "b.b2");
        assert!(AccessPath::from_specs(&["a:date"]).is_err());
    }
}
