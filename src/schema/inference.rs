//! Flat schema inference.
//!
//! A field path becomes its own sub-column when it occurs in at least
//! `sparsity_factor` of the non-null rows. Objects are descended into so that
//! only the deepest qualifying level is stored; a node whose rows mix objects
//! with scalars or arrays is kept as a single JSON leaf, unless an access path
//! forces a path below it and no arrays were seen there.

use crate::access_path::AccessPath;
use crate::column::JsonColumn;
use crate::config::FlatJsonConfig;
use crate::flat::remain::{is_empty_remain, RemainSplitter};
use crate::schema::builder::{JsonKind, PathStats, SchemaBuilder};
use crate::schema::flat_schema::{is_flattenable_key, is_reserved_name, FlatPath, FlatSchema};
use crate::types::LogicalType;
use tracing::debug;

/// Decides the decomposition of one column write
#[derive(Debug, Clone)]
pub struct SchemaInferrer<'a> {
    config: FlatJsonConfig,
    access_path: Option<&'a AccessPath>,
}

impl<'a> SchemaInferrer<'a> {
    pub fn new(config: FlatJsonConfig) -> Self {
        SchemaInferrer {
            config,
            access_path: None,
        }
    }

    /// Paths in `access_path` are flattened regardless of sparsity
    pub fn with_access_path(mut self, access_path: &'a AccessPath) -> Self {
        self.access_path = Some(access_path);
        self
    }

    /// Infer the schema for a batch. Never fails; the worst case is an
    /// unflattened schema.
    pub fn infer(&self, column: &JsonColumn) -> FlatSchema {
        let mut builder = SchemaBuilder::new();
        for row in column.rows() {
            builder.add_document(row.as_ref());
        }

        let mut paths = Vec::new();
        self.select(
            builder.root(),
            &[],
            builder.non_null_rows(),
            self.access_path,
            &mut paths,
        );

        if paths.is_empty() {
            debug!(rows = builder.total_rows(), "no flat json path qualified");
            return FlatSchema::unflattened();
        }

        let total = builder.total_rows();
        let has_nulls = column.is_nullable()
            && total > 0
            && builder.null_rows() as f64 / total as f64 >= self.config.null_factor;

        let splitter = RemainSplitter::new(&paths);
        let has_remain = column
            .rows()
            .iter()
            .flatten()
            .any(|doc| !is_empty_remain(&splitter.split(doc)));

        debug!(
            rows = total,
            null_rows = builder.null_rows(),
            paths = paths.len(),
            has_nulls,
            has_remain,
            "inferred flat json schema"
        );

        FlatSchema {
            is_flat: true,
            paths,
            has_remain,
            has_nulls,
        }
    }

    fn select(
        &self,
        node: &PathStats,
        prefix: &[String],
        denominator: usize,
        forced: Option<&AccessPath>,
        out: &mut Vec<FlatPath>,
    ) {
        let top_level = prefix.is_empty();
        for (name, stats) in node.children() {
            if top_level && is_reserved_name(name) {
                continue;
            }
            let forced_child = forced.and_then(|f| f.child(name));
            let dense = denominator > 0
                && stats.occurrences() as f64 / denominator as f64 >= self.config.sparsity_factor;
            if !dense && forced_child.is_none() {
                continue;
            }

            let mut segments = prefix.to_vec();
            segments.push(name.to_string());

            if stats.kinds().is_object() || forces_descent(forced_child, stats) {
                // Below a forced but sparse node, siblings are judged against
                // the rows that node occurs in
                let child_denominator = if dense { denominator } else { stats.occurrences() };
                let before = out.len();
                self.select(stats, &segments, child_denominator, forced_child, out);
                if out.len() == before {
                    let ty = forced_type(forced_child).unwrap_or(LogicalType::Json);
                    out.push(FlatPath::new(segments, ty));
                }
            } else {
                let ty = forced_type(forced_child).unwrap_or_else(|| stats.kinds().natural_type());
                out.push(FlatPath::new(segments, ty));
            }
        }

        // Forced paths the batch never contained still get a column
        if let Some(forced) = forced {
            for child in forced.children() {
                if node.child(child.path()).is_some()
                    || !is_flattenable_key(child.path())
                    || (top_level && is_reserved_name(child.path()))
                {
                    continue;
                }
                push_forced_leaves(child, prefix, out);
            }
        }
    }
}

/// A forced path below an object that also holds scalars in some rows.
/// The scalar rows are left to remain. Arrays keep the node a JSON leaf.
fn forces_descent(forced: Option<&AccessPath>, stats: &PathStats) -> bool {
    let kinds = stats.kinds();
    forced.map_or(false, |f| !f.is_leaf())
        && kinds.contains(JsonKind::Object)
        && !kinds.contains(JsonKind::Array)
}

/// Target type of a forced leaf
fn forced_type(forced: Option<&AccessPath>) -> Option<LogicalType> {
    forced.filter(|f| f.is_leaf()).and_then(AccessPath::target_type)
}

fn push_forced_leaves(node: &AccessPath, prefix: &[String], out: &mut Vec<FlatPath>) {
    let mut segments = prefix.to_vec();
    segments.push(node.path().to_string());
    if node.is_leaf() {
        let ty = node.target_type().unwrap_or(LogicalType::Json);
        out.push(FlatPath::new(segments, ty));
        return;
    }
    for child in node.children() {
        if is_flattenable_key(child.path()) {
            push_forced_leaves(child, &segments, out);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};

    fn infer(rows: Vec<Value>, sparsity: f64) -> FlatSchema {
        let config = FlatJsonConfig::new(sparsity, 0.3).unwrap();
        SchemaInferrer::new(config).infer(&JsonColumn::from_values(rows))
    }

    fn names(schema: &FlatSchema) -> Vec<String> {
        schema.child_names()
    }

    fn nested_rows() -> Vec<Value> {
        vec![
            json!({"a": 1, "b": {"b1": 22, "b2": {"b3": "abc"}, "b4": 1}}),
            json!({"a": 2, "b": {"b1": 23, "b2": {"b3": "abcd"}, "b4": [1, 2, 3]}}),
            json!({"a": 3, "b": {"b1": 24, "b2": {"b3": "abcde"}, "b4": {"b5": 1}}}),
            json!({"a": 4, "b": {"b1": 25, "b2": {"b3": "ab"}, "b4": {"b5": 2}}, "c": 1}),
            json!({"a": 5, "b": {"b1": 26, "b2": {"b3": "a"}, "b4": {"b5": 3}}}),
        ]
    }

    #[test]
    fn test_sparsity_threshold() {
        let rows = vec![
            json!({"a": 1, "b": 21, "c": 31}),
            json!({"a": 2, "b": 22, "d": 32}),
            json!({"a": 3, "b": 23, "e": [1, 2, 3]}),
            json!({"a": 4, "b": 24, "g": {"x": 1}}),
            json!({"a": 5, "b": 25}),
        ];
        let schema = infer(rows, 0.9);
        assert!(schema.is_flat);
        assert_eq!(names(&schema), vec!["a", "b", "remain"]);
        assert_eq!(schema.paths[0].logical_type(), LogicalType::BigInt);
    }

    #[test]
    fn test_fully_covered_has_no_remain() {
        let rows = vec![json!({"a": 1, "b": "x"}), json!({"a": 2, "b": "y"})];
        let schema = infer(rows, 0.9);
        assert_eq!(names(&schema), vec!["a", "b"]);
        assert_eq!(schema.paths[1].logical_type(), LogicalType::Varchar);
    }

    #[test]
    fn test_deepest_level_and_heterogeneous_leaf() {
        let schema = infer(nested_rows(), 0.9);
        assert_eq!(names(&schema), vec!["a", "b.b1", "b.b2.b3", "b.b4", "remain"]);
        assert_eq!(schema.paths[3].logical_type(), LogicalType::Json);
        assert_eq!(schema.paths[2].logical_type(), LogicalType::Varchar);
    }

    #[test]
    fn test_nothing_qualifies() {
        let rows = vec![json!({"a": 1}), json!({"b": 2}), json!({"c": 3})];
        let schema = infer(rows, 0.9);
        assert!(!schema.is_flat);
        assert!(schema.child_names().is_empty());
    }

    #[test]
    fn test_scalar_rows_count_in_denominator() {
        let rows = vec![json!({"a": 1}), json!(""), json!({"a": 2}), json!(7)];
        assert!(!infer(rows.clone(), 0.9).is_flat);
        assert_eq!(names(&infer(rows, 0.5)), vec!["a", "remain"]);
    }

    #[test]
    fn test_forced_deep_path() {
        let mut rows = nested_rows();
        for row in rows.iter_mut().skip(3) {
            row.as_object_mut().unwrap().remove("b");
        }
        let mut path = AccessPath::root();
        path.insert_json_path(None, "b.b4.b5").unwrap();

        let config = FlatJsonConfig::new(0.9, 0.3).unwrap();
        let schema = SchemaInferrer::new(config)
            .with_access_path(&path)
            .infer(&JsonColumn::from_values(rows));
        assert_eq!(names(&schema), vec!["a", "b.b1", "b.b2.b3", "b.b4", "remain"]);
    }

    #[test]
    fn test_forced_path_through_mixed_node() {
        let mut rows: Vec<Value> = (0..3).map(|i| json!({"a": i, "ff": {"f1": format!("98{}", i)}})).collect();
        rows.push(json!({"a": 3, "ff": 781}));
        rows.push(json!({"a": 4, "ff": 782}));
        let mut path = AccessPath::root();
        path.insert_json_path(None, "ff.f1").unwrap();

        let config = FlatJsonConfig::new(0.5, 0.4).unwrap();
        let schema = SchemaInferrer::new(config)
            .with_access_path(&path)
            .infer(&JsonColumn::from_values(rows.clone()));
        assert_eq!(names(&schema), vec!["a", "ff.f1", "remain"]);
        assert_eq!(schema.paths[1].logical_type(), LogicalType::Varchar);

        // without the access path the mixed node stays a single JSON leaf
        let unforced = SchemaInferrer::new(config).infer(&JsonColumn::from_values(rows));
        assert_eq!(names(&unforced), vec!["a", "ff"]);
    }

    #[test]
    fn test_forced_type_on_object_node_keeps_descendants() {
        let mut path = AccessPath::root();
        path.insert_json_path(Some(LogicalType::BigInt), "b.b2").unwrap();

        let config = FlatJsonConfig::new(0.9, 0.3).unwrap();
        let schema = SchemaInferrer::new(config)
            .with_access_path(&path)
            .infer(&JsonColumn::from_values(nested_rows()));
        assert_eq!(names(&schema), vec!["a", "b.b1", "b.b2.b3", "b.b4", "remain"]);
    }

    #[test]
    fn test_forced_type_overrides_natural_type() {
        let rows = vec![json!({"a": 1}), json!({"a": 2})];
        let mut path = AccessPath::root();
        path.insert_json_path(Some(LogicalType::Varchar), "a").unwrap();

        let config = FlatJsonConfig::default();
        let schema = SchemaInferrer::new(config)
            .with_access_path(&path)
            .infer(&JsonColumn::from_values(rows));
        assert_eq!(schema.paths[0].logical_type(), LogicalType::Varchar);
    }

    #[test]
    fn test_forced_missing_path_appended() {
        let rows = vec![json!({"a": 1}), json!({"a": 2})];
        let mut path = AccessPath::root();
        path.insert_json_path(Some(LogicalType::BigInt), "zz.q").unwrap();

        let schema = SchemaInferrer::new(FlatJsonConfig::default())
            .with_access_path(&path)
            .infer(&JsonColumn::from_values(rows));
        assert_eq!(names(&schema), vec!["a", "zz.q"]);
        assert_eq!(schema.paths[1].logical_type(), LogicalType::BigInt);
    }

    #[test]
    fn test_null_factor() {
        let rows = vec![
            None,
            None,
            Some(json!({"a": 1})),
            Some(json!({"a": 2})),
            Some(json!({"a": 3})),
        ];
        let column = JsonColumn::from_rows(rows);

        let low = SchemaInferrer::new(FlatJsonConfig::new(0.9, 0.4).unwrap()).infer(&column);
        assert_eq!(names(&low), vec!["nulls", "a"]);

        let high = SchemaInferrer::new(FlatJsonConfig::new(0.9, 0.5).unwrap()).infer(&column);
        assert_eq!(names(&high), vec!["a"]);
    }

    #[test]
    fn test_mixed_numbers_stay_json() {
        let rows = vec![json!({"a": 1}), json!({"a": 1.5})];
        assert_eq!(infer(rows, 0.9).paths[0].logical_type(), LogicalType::Json);
    }

    #[test]
    fn test_reserved_top_level_names_stay_in_remain() {
        let rows = vec![json!({"remain": 1, "a": 1}), json!({"remain": 2, "a": 2})];
        assert_eq!(names(&infer(rows, 0.9)), vec!["a", "remain"]);
    }
}
