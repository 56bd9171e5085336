//! Column expressions: scalar values, boolean predicates, and containers.
//!
//! Each family is a closed sum. Constructors normalize as they build:
//! nested conjunctions flatten, literal `true`/`false` operands fold, and
//! the degenerate empty forms collapse to literals (an empty `AND` is
//! true, an empty `OR` is false). Normalizing here keeps every downstream
//! consumer (engines, the conform pass, the emitter) free of special
//! cases.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::datum::{DataType, Datum};
use crate::engine::{Engine, EngineRef};
use crate::tag::ColumnTag;

/// A scalar expression over the columns of a relation.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ColumnExpression<T: ColumnTag> {
    /// A constant value.
    Literal(Datum),
    /// A reference to an existing column.
    Reference(T),
    /// A named function of other scalar expressions. The name is resolved
    /// by each engine; engines reject names they cannot realize.
    Function {
        name: String,
        args: Vec<ColumnExpression<T>>,
    },
}

impl<T: ColumnTag> ColumnExpression<T> {
    pub fn literal(value: impl Into<Datum>) -> Self {
        ColumnExpression::Literal(value.into())
    }

    pub fn reference(tag: impl Into<T>) -> Self {
        ColumnExpression::Reference(tag.into())
    }

    pub fn function(name: impl Into<String>, args: Vec<ColumnExpression<T>>) -> Self {
        ColumnExpression::Function {
            name: name.into(),
            args,
        }
    }

    /// The set of columns this expression reads.
    pub fn columns(&self) -> BTreeSet<T> {
        let mut out = BTreeSet::new();
        self.collect_columns(&mut out);
        out
    }

    pub(crate) fn collect_columns(&self, out: &mut BTreeSet<T>) {
        match self {
            ColumnExpression::Literal(_) => {}
            ColumnExpression::Reference(tag) => {
                out.insert(tag.clone());
            }
            ColumnExpression::Function { args, .. } => {
                for arg in args {
                    arg.collect_columns(out);
                }
            }
        }
    }

    /// Whether every function used here is realizable by `engine`.
    pub fn is_supported_by(&self, engine: &EngineRef<T>) -> bool {
        match self {
            ColumnExpression::Literal(_) | ColumnExpression::Reference(_) => true,
            ColumnExpression::Function { name, args } => {
                engine.supports_function(name)
                    && args.iter().all(|arg| arg.is_supported_by(engine))
            }
        }
    }

    /// The value type, where statically known (literals only).
    pub fn data_type(&self) -> Option<DataType> {
        match self {
            ColumnExpression::Literal(value) => value.data_type(),
            _ => None,
        }
    }
}

/// A boolean expression over the columns of a relation.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Predicate<T: ColumnTag> {
    /// A constant truth value.
    Literal(bool),
    /// A reference to a boolean-valued column.
    Reference(T),
    /// A named boolean function of scalar arguments.
    Function {
        name: String,
        args: Vec<ColumnExpression<T>>,
    },
    Not(Box<Predicate<T>>),
    And(Vec<Predicate<T>>),
    Or(Vec<Predicate<T>>),
    /// Membership of a scalar in a container.
    InContainer {
        item: ColumnExpression<T>,
        container: ColumnContainer<T>,
    },
}

impl<T: ColumnTag> Predicate<T> {
    pub fn literal(value: bool) -> Self {
        Predicate::Literal(value)
    }

    pub fn reference(tag: impl Into<T>) -> Self {
        Predicate::Reference(tag.into())
    }

    pub fn function(name: impl Into<String>, args: Vec<ColumnExpression<T>>) -> Self {
        Predicate::Function {
            name: name.into(),
            args,
        }
    }

    pub fn negate(operand: Predicate<T>) -> Self {
        match operand.as_trivial() {
            Some(value) => Predicate::Literal(!value),
            None => Predicate::Not(Box::new(operand)),
        }
    }

    /// Conjunction. Nested `And`s flatten, `true` operands drop, and any
    /// `false` operand collapses the whole predicate. An empty input is
    /// the trivially true predicate.
    pub fn and(operands: Vec<Predicate<T>>) -> Self {
        let mut flat = Vec::new();
        for operand in operands {
            match operand {
                Predicate::Literal(true) => {}
                Predicate::Literal(false) => return Predicate::Literal(false),
                Predicate::And(inner) => flat.extend(inner),
                other => flat.push(other),
            }
        }
        match flat.len() {
            0 => Predicate::Literal(true),
            1 => flat.pop().expect("length checked"),
            _ => Predicate::And(flat),
        }
    }

    /// Disjunction, dual to [`Predicate::and`]. An empty input is the
    /// trivially false predicate.
    pub fn or(operands: Vec<Predicate<T>>) -> Self {
        let mut flat = Vec::new();
        for operand in operands {
            match operand {
                Predicate::Literal(false) => {}
                Predicate::Literal(true) => return Predicate::Literal(true),
                Predicate::Or(inner) => flat.extend(inner),
                other => flat.push(other),
            }
        }
        match flat.len() {
            0 => Predicate::Literal(false),
            1 => flat.pop().expect("length checked"),
            _ => Predicate::Or(flat),
        }
    }

    /// Membership test of `item` in `container`.
    pub fn in_container(item: ColumnExpression<T>, container: ColumnContainer<T>) -> Self {
        Predicate::InContainer { item, container }
    }

    /// `Some(value)` when this predicate is a constant, empty forms
    /// included.
    pub fn as_trivial(&self) -> Option<bool> {
        match self {
            Predicate::Literal(value) => Some(*value),
            Predicate::And(operands) if operands.is_empty() => Some(true),
            Predicate::Or(operands) if operands.is_empty() => Some(false),
            _ => None,
        }
    }

    /// The set of columns this predicate reads.
    pub fn columns(&self) -> BTreeSet<T> {
        let mut out = BTreeSet::new();
        self.collect_columns(&mut out);
        out
    }

    pub(crate) fn collect_columns(&self, out: &mut BTreeSet<T>) {
        match self {
            Predicate::Literal(_) => {}
            Predicate::Reference(tag) => {
                out.insert(tag.clone());
            }
            Predicate::Function { args, .. } => {
                for arg in args {
                    arg.collect_columns(out);
                }
            }
            Predicate::Not(operand) => operand.collect_columns(out),
            Predicate::And(operands) | Predicate::Or(operands) => {
                for operand in operands {
                    operand.collect_columns(out);
                }
            }
            Predicate::InContainer { item, container } => {
                item.collect_columns(out);
                container.collect_columns(out);
            }
        }
    }

    pub fn is_supported_by(&self, engine: &EngineRef<T>) -> bool {
        match self {
            Predicate::Literal(_) | Predicate::Reference(_) => true,
            Predicate::Function { name, args } => {
                engine.supports_function(name)
                    && args.iter().all(|arg| arg.is_supported_by(engine))
            }
            Predicate::Not(operand) => operand.is_supported_by(engine),
            Predicate::And(operands) | Predicate::Or(operands) => {
                operands.iter().all(|operand| operand.is_supported_by(engine))
            }
            Predicate::InContainer { item, container } => {
                item.is_supported_by(engine) && container.is_supported_by(engine)
            }
        }
    }

    /// The conjuncts of this predicate: the operands of a top-level `And`,
    /// or the predicate itself.
    pub fn conjuncts(self) -> Vec<Predicate<T>> {
        match self {
            Predicate::And(operands) => operands,
            other => vec![other],
        }
    }
}

/// A container of scalar values for membership tests.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ColumnContainer<T: ColumnTag> {
    /// An explicit sequence of scalar expressions.
    Sequence(Vec<ColumnExpression<T>>),
    /// A half-open integer range with a positive step.
    Range { start: i64, stop: i64, step: i64 },
}

impl<T: ColumnTag> ColumnContainer<T> {
    pub fn sequence(items: Vec<ColumnExpression<T>>) -> Self {
        ColumnContainer::Sequence(items)
    }

    pub fn range(start: i64, stop: i64, step: i64) -> Self {
        debug_assert!(step >= 1, "range step must be positive");
        ColumnContainer::Range { start, stop, step }
    }

    pub(crate) fn collect_columns(&self, out: &mut BTreeSet<T>) {
        match self {
            ColumnContainer::Sequence(items) => {
                for item in items {
                    item.collect_columns(out);
                }
            }
            ColumnContainer::Range { .. } => {}
        }
    }

    pub fn is_supported_by(&self, engine: &EngineRef<T>) -> bool {
        match self {
            ColumnContainer::Sequence(items) => {
                items.iter().all(|item| item.is_supported_by(engine))
            }
            ColumnContainer::Range { .. } => true,
        }
    }
}

/// One key of a sort: an expression and a direction.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SortTerm<T: ColumnTag> {
    pub expression: ColumnExpression<T>,
    pub ascending: bool,
}

impl<T: ColumnTag> SortTerm<T> {
    pub fn ascending(expression: ColumnExpression<T>) -> Self {
        SortTerm {
            expression,
            ascending: true,
        }
    }

    pub fn descending(expression: ColumnExpression<T>) -> Self {
        SortTerm {
            expression,
            ascending: false,
        }
    }
}
