//! Read plans: which sub-columns a read needs and how each output value is
//! produced from them.
//!
//! A projected path `P` is served by, in order of preference:
//! - the child stored exactly at `P`
//! - a JSON child stored at an ancestor of `P`, by extracting below it
//! - the children stored below `P`, re-nested and merged with remain at `P`
//! - remain at `P`

use crate::access_path::AccessPath;
use crate::schema::flat_schema::FlatSchema;
use crate::storage::meta::ColumnMeta;
use crate::types::LogicalType;

/// A persisted sub-column a read depends on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SubColumnRef {
    Body,
    Child(usize),
    NullMap,
}

/// Where a projected value comes from
#[derive(Debug, Clone, PartialEq)]
pub enum FieldSource {
    /// Unflattened column: extract the path from the whole document
    Document,
    Child(usize),
    /// Extract `rest` from the JSON child at `child`
    Extract { child: usize, rest: Vec<String> },
    /// Re-nest `(child, relative path)` pairs, then merge remain at the path
    Merge { children: Vec<(usize, Vec<String>)> },
    Remain,
}

/// One output field of a projection
#[derive(Debug, Clone, PartialEq)]
pub struct ProjectedField {
    pub path: String,
    pub segments: Vec<String>,
    pub target_type: Option<LogicalType>,
    pub source: FieldSource,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ReadPlan {
    /// Whole documents, straight from the body
    Passthrough,
    /// Whole documents rebuilt from every child
    Reconstruct,
    /// Flat view keyed by dotted path
    Project {
        fields: Vec<ProjectedField>,
        needs_remain: bool,
    },
}

impl ReadPlan {
    pub fn new(meta: &ColumnMeta, schema: &FlatSchema, projection: Option<&AccessPath>) -> Self {
        let leaves = projection.map(AccessPath::leaves).unwrap_or_default();
        if leaves.is_empty() {
            return if schema.is_flat {
                ReadPlan::Reconstruct
            } else {
                ReadPlan::Passthrough
            };
        }

        let fields: Vec<ProjectedField> = leaves
            .into_iter()
            .map(|leaf| {
                let segments: Vec<String> = leaf.path.split('.').map(str::to_string).collect();
                let source = if schema.is_flat {
                    resolve(schema, &segments)
                } else {
                    FieldSource::Document
                };
                ProjectedField {
                    path: leaf.path,
                    segments,
                    target_type: leaf.target_type,
                    source,
                }
            })
            .collect();

        let needs_remain = meta.json.has_remain
            && fields
                .iter()
                .any(|f| matches!(f.source, FieldSource::Merge { .. } | FieldSource::Remain));

        ReadPlan::Project {
            fields,
            needs_remain,
        }
    }

    /// Sub-columns to decode, in a stable order
    pub fn sub_columns(&self, meta: &ColumnMeta, schema: &FlatSchema) -> Vec<SubColumnRef> {
        let mut refs = Vec::new();
        match self {
            ReadPlan::Passthrough => refs.push(SubColumnRef::Body),
            ReadPlan::Reconstruct => {
                refs.extend((0..meta.children.len()).map(SubColumnRef::Child));
            }
            ReadPlan::Project {
                fields,
                needs_remain,
            } => {
                if !schema.is_flat {
                    refs.push(SubColumnRef::Body);
                } else {
                    if schema.has_nulls {
                        refs.push(SubColumnRef::Child(0));
                    }
                    for field in fields {
                        match &field.source {
                            FieldSource::Child(idx) | FieldSource::Extract { child: idx, .. } => {
                                refs.push(SubColumnRef::Child(*idx));
                            }
                            FieldSource::Merge { children } => {
                                refs.extend(children.iter().map(|(idx, _)| SubColumnRef::Child(*idx)));
                            }
                            FieldSource::Document | FieldSource::Remain => {}
                        }
                    }
                    if *needs_remain {
                        if let Some(idx) = schema.remain_child_index() {
                            refs.push(SubColumnRef::Child(idx));
                        }
                    }
                }
            }
        }
        if meta.null_map.is_some() {
            refs.push(SubColumnRef::NullMap);
        }
        let mut seen = std::collections::HashSet::new();
        refs.retain(|r| seen.insert(*r));
        refs
    }
}

fn resolve(schema: &FlatSchema, segments: &[String]) -> FieldSource {
    for (i, path) in schema.paths.iter().enumerate() {
        let child = schema.path_child_index(i);
        if path.segments() == segments {
            return FieldSource::Child(child);
        }
        if path.is_ancestor_of(segments) {
            return FieldSource::Extract {
                child,
                rest: segments[path.segments().len()..].to_vec(),
            };
        }
    }

    let children: Vec<(usize, Vec<String>)> = schema
        .paths
        .iter()
        .enumerate()
        .filter(|(_, p)| p.is_descendant_of(segments))
        .map(|(i, p)| (schema.path_child_index(i), p.segments()[segments.len()..].to_vec()))
        .collect();
    if children.is_empty() {
        FieldSource::Remain
    } else {
        FieldSource::Merge { children }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Compression;
    use crate::schema::flat_schema::FlatPath;
    use crate::storage::meta::JsonMeta;

    fn schema() -> FlatSchema {
        FlatSchema {
            is_flat: true,
            paths: vec![
                FlatPath::parse("a", LogicalType::BigInt),
                FlatPath::parse("b.b2.b3", LogicalType::Varchar),
                FlatPath::parse("b.b2.c1.c2", LogicalType::BigInt),
                FlatPath::parse("b.b4", LogicalType::Json),
            ],
            has_remain: true,
            has_nulls: true,
        }
    }

    fn meta() -> ColumnMeta {
        ColumnMeta {
            column_id: 0,
            is_nullable: true,
            num_rows: 0,
            compression: Compression::None,
            json: JsonMeta {
                is_flat: true,
                has_remain: true,
            },
            children: Vec::new(),
            body: None,
            null_map: None,
        }
    }

    fn project(specs: &[&str]) -> ReadPlan {
        let path = AccessPath::from_specs(specs).unwrap();
        ReadPlan::new(&meta(), &schema(), Some(&path))
    }

    #[test]
    fn test_resolve_sources() {
        let s = schema();
        assert_eq!(resolve(&s, &["a".to_string()]), FieldSource::Child(1));
        assert_eq!(
            resolve(&s, &["b".to_string(), "b4".to_string(), "b5".to_string()]),
            FieldSource::Extract {
                child: 4,
                rest: vec!["b5".to_string()]
            }
        );
        assert_eq!(
            resolve(&s, &["b".to_string(), "b2".to_string()]),
            FieldSource::Merge {
                children: vec![
                    (2, vec!["b3".to_string()]),
                    (3, vec!["c1".to_string(), "c2".to_string()])
                ]
            }
        );
        assert_eq!(resolve(&s, &["zz".to_string()]), FieldSource::Remain);
    }

    #[test]
    fn test_covered_projection_skips_remain() {
        let plan = project(&["a:varchar", "b.b4.b5"]);
        let refs = plan.sub_columns(&meta(), &schema());
        assert_eq!(
            refs,
            vec![SubColumnRef::Child(0), SubColumnRef::Child(1), SubColumnRef::Child(4)]
        );
    }

    #[test]
    fn test_uncovered_projection_reads_remain() {
        let plan = project(&["c"]);
        let ReadPlan::Project { needs_remain, .. } = &plan else {
            panic!("expected projection plan");
        };
        assert!(*needs_remain);
        assert!(plan.sub_columns(&meta(), &schema()).contains(&SubColumnRef::Child(5)));
    }

    #[test]
    fn test_no_projection() {
        let plan = ReadPlan::new(&meta(), &schema(), None);
        assert_eq!(plan, ReadPlan::Reconstruct);
        let empty = AccessPath::root();
        let plan = ReadPlan::new(&meta(), &FlatSchema::unflattened(), Some(&empty));
        assert_eq!(plan, ReadPlan::Passthrough);
    }
}
