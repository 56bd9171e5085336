//! The SQL execution engine.
//!
//! This engine never talks to a database. It normalizes relation trees
//! into a canonical single-`SELECT` shape (certified by `Select`
//! markers) and emits an executable description, a [`ast::SelectQuery`]
//! rendering to a PostgreSQL-flavored string, for the host's database
//! client to run:
//!
//! ```text
//! Relation tree
//!       ↓
//! conform          (conform.rs: commutation into canonical layers)
//!       ↓
//! Select-marked canonical tree
//!       ↓
//! to_executable    (engine.rs: layers → SELECT / UNION)
//!       ↓
//! ast::SelectQuery → SQL string  (ast.rs, compile.rs)
//! ```

pub mod ast;
pub mod compile;
pub mod conform;
pub mod engine;

pub use compile::compile;
pub use engine::{LogicalColumn, ScalarColumn, SqlEngine, SqlPayload, SqlTable};
