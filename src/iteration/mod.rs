//! The row-oriented, order-preserving execution engine.
//!
//! Payloads are [`RowIterable`](rows::RowIterable)s; operations apply as
//! lazy iterator pipelines except for the two gather stages
//! (deduplication and sort), which materialize. Joins are not realized
//! by this engine: building one over an iteration-engine relation fails
//! at construction.

pub mod engine;
pub mod rows;

pub use engine::IterationEngine;
pub use rows::{Row, RowIterable, RowSequence, RowStream};
