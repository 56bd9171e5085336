//! The closed sets of operations relations are built from.
//!
//! An operation value describes the operation alone; the pairing of an
//! operation with the relation(s) it acts on is a tree node, built through
//! the factory methods on [`Relation`](crate::relation::Relation). Those
//! factories are the only supported way to combine the two: they enforce
//! the column and engine rules and apply the documented simplifications.

use std::collections::BTreeSet;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use crate::expr::{ColumnExpression, Predicate, SortTerm};
use crate::tag::ColumnTag;

/// An operation acting on a single relation.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum UnaryOperation<T: ColumnTag> {
    /// Add a new column computed from existing columns.
    Calculation {
        tag: T,
        expression: ColumnExpression<T>,
    },
    /// Remove duplicate rows.
    Deduplication,
    /// Do nothing. Never appears in trees; applying it returns the target.
    Identity,
    /// Keep only the given columns.
    Projection { columns: BTreeSet<T> },
    /// Keep only rows satisfying a predicate.
    Selection { predicate: Predicate<T> },
    /// Keep only rows in a positional window.
    Slice { start: usize, stop: Option<usize> },
    /// Reorder rows by a sequence of sort terms.
    Sort { terms: Vec<SortTerm<T>> },
    /// A host-defined row filter or reordering, realized per engine.
    Custom(CustomOp<T>),
}

impl<T: ColumnTag> UnaryOperation<T> {
    /// The columns the target relation must provide.
    pub fn columns_required(&self) -> BTreeSet<T> {
        match self {
            UnaryOperation::Calculation { expression, .. } => expression.columns(),
            UnaryOperation::Projection { columns } => columns.clone(),
            UnaryOperation::Selection { predicate } => predicate.columns(),
            UnaryOperation::Sort { terms } => {
                let mut out = BTreeSet::new();
                for term in terms {
                    term.expression.collect_columns(&mut out);
                }
                out
            }
            UnaryOperation::Custom(op) => op.0.columns_required(),
            UnaryOperation::Deduplication
            | UnaryOperation::Identity
            | UnaryOperation::Slice { .. } => BTreeSet::new(),
        }
    }

    /// Whether the operation never changes the number of rows
    /// (duplicates included).
    pub fn is_count_invariant(&self) -> bool {
        match self {
            UnaryOperation::Calculation { .. }
            | UnaryOperation::Identity
            | UnaryOperation::Projection { .. }
            | UnaryOperation::Sort { .. } => true,
            UnaryOperation::Custom(op) => matches!(op.flavor(), CustomFlavor::Reordering),
            UnaryOperation::Deduplication
            | UnaryOperation::Selection { .. }
            | UnaryOperation::Slice { .. } => false,
        }
    }

    /// Whether the operation can never turn a nonempty relation into an
    /// empty one.
    pub fn is_empty_invariant(&self) -> bool {
        match self {
            UnaryOperation::Selection { .. } | UnaryOperation::Slice { .. } => false,
            UnaryOperation::Custom(op) => matches!(op.flavor(), CustomFlavor::Reordering),
            _ => true,
        }
    }

    /// Whether the operation's result depends on the order of its input.
    pub fn is_order_dependent(&self) -> bool {
        matches!(self, UnaryOperation::Slice { .. })
    }

    /// Whether the operation's result depends on the number of input rows.
    pub fn is_count_dependent(&self) -> bool {
        matches!(self, UnaryOperation::Slice { .. })
    }

    /// A short name for diagnostics.
    pub fn name(&self) -> &str {
        match self {
            UnaryOperation::Calculation { .. } => "calculation",
            UnaryOperation::Deduplication => "deduplication",
            UnaryOperation::Identity => "identity",
            UnaryOperation::Projection { .. } => "projection",
            UnaryOperation::Selection { .. } => "selection",
            UnaryOperation::Slice { .. } => "slice",
            UnaryOperation::Sort { .. } => "sort",
            UnaryOperation::Custom(op) => op.0.name(),
        }
    }
}

impl<T: ColumnTag> fmt::Display for UnaryOperation<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UnaryOperation::Calculation { tag, .. } => {
                write!(f, "+[{}]", tag.qualified_name())
            }
            UnaryOperation::Projection { columns } => {
                let names: Vec<String> = columns.iter().map(|t| t.qualified_name()).collect();
                write!(f, "Π[{}]", names.join(", "))
            }
            UnaryOperation::Selection { .. } => f.write_str("σ"),
            UnaryOperation::Slice { start, stop } => match stop {
                Some(stop) => write!(f, "slice[{start}:{stop}]"),
                None => write!(f, "slice[{start}:]"),
            },
            UnaryOperation::Sort { terms } => write!(f, "sort[{}]", terms.len()),
            other => f.write_str(other.name()),
        }
    }
}

/// An operation acting on a pair of relations.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum BinaryOperation<T: ColumnTag> {
    /// A natural join: rows matching on all common columns, further
    /// constrained by an optional predicate. `common` is resolved by the
    /// join factory to the intersection of the operand column sets.
    Join {
        predicate: Predicate<T>,
        common: BTreeSet<T>,
    },
    /// Multiset concatenation of two relations with equal columns.
    Chain,
}

impl<T: ColumnTag> BinaryOperation<T> {
    pub fn name(&self) -> &str {
        match self {
            BinaryOperation::Join { .. } => "join",
            BinaryOperation::Chain => "chain",
        }
    }
}

impl<T: ColumnTag> fmt::Display for BinaryOperation<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BinaryOperation::Join { .. } => f.write_str("⋈"),
            BinaryOperation::Chain => f.write_str("∪"),
        }
    }
}

/// Annotations that change how a tree is processed without changing its
/// rows or columns.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum MarkerKind {
    /// Evaluate the target once and cache the resulting payload on the
    /// marker for reuse.
    Materialization { name: String },
    /// Move the target's content to the marker's (different) engine.
    Transfer,
    /// Certifies that the subtree below is in the SQL engine's canonical
    /// single-`SELECT` shape. Only the SQL conform pass creates these.
    Select,
}

impl MarkerKind {
    pub fn name(&self) -> &str {
        match self {
            MarkerKind::Materialization { .. } => "materialization",
            MarkerKind::Transfer => "transfer",
            MarkerKind::Select => "select",
        }
    }
}

impl fmt::Display for MarkerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MarkerKind::Materialization { name } => write!(f, "materialize[{name}]"),
            MarkerKind::Transfer => f.write_str("→"),
            MarkerKind::Select => f.write_str("select"),
        }
    }
}

/// The two admissible shapes of a custom unary operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CustomFlavor {
    /// Only removes rows; columns and order pass through.
    RowFilter,
    /// Only reorders rows; columns and count pass through.
    Reordering,
}

/// A host-defined unary operation.
///
/// Custom operations may only filter or reorder rows; they can never
/// change the column set, so the structural invariants of the tree stay
/// checkable without engine involvement. Engines realize them through
/// [`Engine::apply_custom_unary`](crate::engine::Engine::apply_custom_unary)
/// and reject the ones they do not recognize.
pub trait CustomUnary<T: ColumnTag>: fmt::Debug + Send + Sync {
    /// A name engines can dispatch on.
    fn name(&self) -> &str;

    fn flavor(&self) -> CustomFlavor;

    /// The columns the target relation must provide.
    fn columns_required(&self) -> BTreeSet<T>;
}

/// A shared handle to a custom operation.
///
/// Equality and hashing are by handle identity: two custom operations are
/// the same operation only when they are literally the same object.
#[derive(Debug, Clone)]
pub struct CustomOp<T: ColumnTag>(pub Arc<dyn CustomUnary<T>>);

impl<T: ColumnTag> CustomOp<T> {
    pub fn new(op: impl CustomUnary<T> + 'static) -> Self {
        CustomOp(Arc::new(op))
    }

    pub fn name(&self) -> &str {
        self.0.name()
    }

    pub fn flavor(&self) -> CustomFlavor {
        self.0.flavor()
    }

    pub fn columns_required(&self) -> BTreeSet<T> {
        self.0.columns_required()
    }
}

impl<T: ColumnTag> PartialEq for CustomOp<T> {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl<T: ColumnTag> Eq for CustomOp<T> {}

impl<T: ColumnTag> Hash for CustomOp<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        (Arc::as_ptr(&self.0) as *const () as usize).hash(state);
    }
}
