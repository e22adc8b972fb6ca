//! Flat JSON schema inference
//!
//! This module decides which field paths of a JSON column get their own
//! typed sub-column, and describes the resulting decomposition.

pub mod builder;
pub mod flat_schema;
pub mod inference;

pub use builder::{JsonKind, KindSet, PathStats, SchemaBuilder};
pub use flat_schema::{FlatPath, FlatSchema, NULLS_NAME, REMAIN_NAME};
pub use inference::SchemaInferrer;
