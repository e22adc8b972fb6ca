//! Flat JSON: splitting documents into typed sub-columns on write, and
//! rebuilding or projecting them on read.

pub mod plan;
pub mod reader;
pub mod remain;
pub mod writer;


pub use plan::{FieldSource, ProjectedField, ReadPlan, SubColumnRef};
pub use reader::{ColumnReader, FlatJsonIterator, IteratorState, ProjectedBatch, ReadBatch};
pub use remain::RemainSplitter;
pub use writer::{flatten, FlatJsonWriter, FlattenedColumns};
