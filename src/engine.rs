//! The contract execution backends satisfy, and the payloads they trade.

use std::any::Any;
use std::collections::BTreeSet;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::ops::Deref;
use std::sync::Arc;

use crate::error::{RelationError, Result};
use crate::iteration::rows::RowIterable;
use crate::operation::{BinaryOperation, CustomOp, UnaryOperation};
use crate::relation::Relation;
use crate::sql::SqlPayload;
use crate::tag::ColumnTag;

/// The engine-specific content of a relation: actual rows, or an
/// executable description of how to obtain them.
#[derive(Clone)]
pub enum Payload<T: ColumnTag> {
    /// In-memory rows (the iteration engine).
    Rows(RowIterable<T>),
    /// A SQL table or query description (the SQL engine).
    Select(SqlPayload<T>),
    /// An opaque payload owned by a host-defined engine.
    External(Arc<dyn Any + Send + Sync>),
}

impl<T: ColumnTag> fmt::Debug for Payload<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Payload::Rows(rows) => f.debug_tuple("Rows").field(rows).finish(),
            Payload::Select(select) => f.debug_tuple("Select").field(select).finish(),
            Payload::External(_) => f.write_str("External(..)"),
        }
    }
}

impl<T: ColumnTag> Payload<T> {
    pub fn rows(&self) -> Option<&RowIterable<T>> {
        match self {
            Payload::Rows(rows) => Some(rows),
            _ => None,
        }
    }

    pub fn select(&self) -> Option<&SqlPayload<T>> {
        match self {
            Payload::Select(select) => Some(select),
            _ => None,
        }
    }
}

/// A backend capable of holding relation payloads and executing conformed
/// relation trees.
///
/// Engines are compared by identity, never by value: a relation belongs
/// to one specific engine object, and two engines configured identically
/// are still distinct. Implementations therefore need no `PartialEq`;
/// identity comparison is handled by [`EngineRef`].
pub trait Engine<T: ColumnTag>: fmt::Debug + Send + Sync {
    /// The engine's display name. Also the key under which serialized
    /// trees reference it, so names should be unique within a host.
    fn name(&self) -> &str;

    /// Whether this engine can realize the given unary operation.
    fn supports_unary(&self, operation: &UnaryOperation<T>) -> bool;

    /// Whether this engine can realize the given binary operation.
    fn supports_binary(&self, operation: &BinaryOperation<T>) -> bool;

    /// Whether this engine can realize the named expression function.
    fn supports_function(&self, name: &str) -> bool;

    /// Return a semantically equal relation in this engine's canonical
    /// shape. Conformation never changes observable columns, uniqueness,
    /// or row bounds.
    fn conform(&self, relation: &Relation<T>) -> Result<Relation<T>>;

    /// Drive a fully conformed, single-engine relation tree to a payload.
    ///
    /// May be partial: an engine that cannot execute a particular shape
    /// reports `RelationError::NotImplemented`.
    fn execute(&self, relation: &Relation<T>) -> Result<Payload<T>>;

    /// Realize a host-defined unary operation, or fail.
    fn apply_custom_unary(
        &self,
        operation: &CustomOp<T>,
        _target: &Relation<T>,
    ) -> Result<Relation<T>> {
        Err(RelationError::not_implemented(format!(
            "custom operation {} is not supported by engine {}",
            operation.name(),
            self.name()
        )))
    }

    /// Accept a payload produced elsewhere as the content of a leaf in
    /// this engine, converting representations where the engine can.
    ///
    /// Payloads the engine cannot absorb are rejected; bridging those is
    /// the processor host's concern.
    fn import_payload(&self, columns: &BTreeSet<T>, payload: Payload<T>) -> Result<Payload<T>> {
        let _ = columns;
        let _ = payload;
        Err(RelationError::engine(format!(
            "engine {} cannot import foreign payloads",
            self.name()
        )))
    }
}

/// A shared handle to an engine, with identity semantics.
///
/// Cloning is cheap; equality and hashing are by pointer, which is what
/// makes engine identity stable across an immutable relation tree.
#[derive(Clone)]
pub struct EngineRef<T: ColumnTag>(Arc<dyn Engine<T>>);

impl<T: ColumnTag> EngineRef<T> {
    pub fn new(engine: impl Engine<T> + 'static) -> Self {
        EngineRef(Arc::new(engine))
    }

    pub fn from_arc(engine: Arc<dyn Engine<T>>) -> Self {
        EngineRef(engine)
    }

    /// Whether two handles refer to the same engine object.
    pub fn same(a: &EngineRef<T>, b: &EngineRef<T>) -> bool {
        Arc::ptr_eq(&a.0, &b.0)
    }
}

impl<T: ColumnTag> Deref for EngineRef<T> {
    type Target = dyn Engine<T>;

    fn deref(&self) -> &Self::Target {
        self.0.as_ref()
    }
}

impl<T: ColumnTag> PartialEq for EngineRef<T> {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl<T: ColumnTag> Eq for EngineRef<T> {}

impl<T: ColumnTag> Hash for EngineRef<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        (Arc::as_ptr(&self.0) as *const () as usize).hash(state);
    }
}

impl<T: ColumnTag> fmt::Debug for EngineRef<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EngineRef({})", self.0.name())
    }
}

impl<T: ColumnTag> fmt::Display for EngineRef<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0.name())
    }
}
