//! Relational-algebra expression trees spanning multiple execution
//! engines.
//!
//! A data-access layer describes a query abstractly as a tree of
//! [`Relation`]s, leaves of engine-resident data combined by unary and
//! binary operations, and hands the tree to a backend for
//! materialization. A single tree may cross engine boundaries through
//! explicit transfer markers; a [`Processor`] walks such trees,
//! executes each engine's subtree on that engine, and ferries the
//! intermediate payloads across:
//!
//! ```text
//! Relation tree            (relation.rs, operation.rs, expr.rs)
//!       ↓
//! conform                  (per engine: sql/conform.rs, iteration/)
//!       ↓
//! execute                  (sql emits a SELECT; iteration streams rows)
//!       ↓
//! Payload                  (rows, or an executable description)
//! ```
//!
//! Trees are immutable values: construction goes through factory
//! methods that enforce the column and engine rules, and the only
//! post-construction mutation anywhere is the single assignment of a
//! cached payload. The crate is parametric over the host's column
//! identifier type via [`ColumnTag`].

pub mod datum;
pub mod engine;
pub mod error;
pub mod expr;
pub mod iteration;
pub mod operation;
pub mod processor;
pub mod relation;
pub mod serial;
pub mod sql;
pub mod tag;

pub use datum::{DataType, Datum, F64};
pub use engine::{Engine, EngineRef, Payload};
pub use error::{RelationError, Result};
pub use expr::{ColumnContainer, ColumnExpression, Predicate, SortTerm};
pub use operation::{
    BinaryOperation, CustomFlavor, CustomOp, CustomUnary, MarkerKind, UnaryOperation,
};
pub use processor::Processor;
pub use relation::{Relation, RelationView};
pub use serial::{EngineRegistry, OperationTree, RelationTree, Resolver};
pub use tag::{ColumnTag, StringTag};
