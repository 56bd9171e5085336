//! The immutable relation tree and the factories that build it.
//!
//! A [`Relation`] is a cheap handle (`Arc`) to an immutable node. All
//! construction goes through the factory methods, which enforce the
//! column and engine rules, propagate the uniqueness bit and row-count
//! bounds, and apply the documented simplifications (adjacent slices,
//! sorts, and selections merge; no-op operations return their target
//! unchanged). Once built, a node never changes; the single exception
//! is the payload slot of a leaf or materialization marker, which is
//! assigned at most once.
//!
//! Relations compare and hash structurally, ignoring payloads; engines
//! compare by identity. Shared subtrees are therefore safe: the tree is
//! a DAG, never a cycle.

use std::collections::BTreeSet;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::{Arc, OnceLock};

use tracing::trace;

use crate::engine::{Engine, EngineRef, Payload};
use crate::error::{RelationError, Result};
use crate::expr::{ColumnExpression, Predicate, SortTerm};
use crate::operation::{
    BinaryOperation, CustomFlavor, CustomOp, MarkerKind, UnaryOperation,
};
use crate::tag::ColumnTag;

/// An immutable node in a relational-algebra expression tree.
#[derive(Clone)]
pub struct Relation<T: ColumnTag> {
    node: Arc<Node<T>>,
}

pub(crate) struct Node<T: ColumnTag> {
    pub(crate) kind: NodeKind<T>,
    pub(crate) engine: EngineRef<T>,
    pub(crate) columns: BTreeSet<T>,
    pub(crate) unique: bool,
    pub(crate) min_rows: usize,
    pub(crate) max_rows: Option<usize>,
}

pub(crate) enum NodeKind<T: ColumnTag> {
    Leaf {
        name: String,
        payload: OnceLock<Payload<T>>,
    },
    Unary {
        operation: UnaryOperation<T>,
        target: Relation<T>,
    },
    Binary {
        operation: BinaryOperation<T>,
        lhs: Relation<T>,
        rhs: Relation<T>,
    },
    Marker {
        kind: MarkerKind,
        target: Relation<T>,
        payload: OnceLock<Payload<T>>,
    },
}

/// A borrowed view of a relation node, for pattern-match dispatch.
pub enum RelationView<'a, T: ColumnTag> {
    Leaf {
        name: &'a str,
    },
    Unary {
        operation: &'a UnaryOperation<T>,
        target: &'a Relation<T>,
    },
    Binary {
        operation: &'a BinaryOperation<T>,
        lhs: &'a Relation<T>,
        rhs: &'a Relation<T>,
    },
    Marker {
        kind: &'a MarkerKind,
        target: &'a Relation<T>,
    },
}

impl<T: ColumnTag> Relation<T> {
    fn from_node(node: Node<T>) -> Self {
        Relation {
            node: Arc::new(node),
        }
    }

    /// Create a leaf relation: engine-resident base data.
    ///
    /// The payload is mandatory at construction; leaves without content
    /// do not exist.
    pub fn leaf(
        name: impl Into<String>,
        engine: &EngineRef<T>,
        columns: impl IntoIterator<Item = T>,
        unique: bool,
        min_rows: usize,
        max_rows: Option<usize>,
        payload: Payload<T>,
    ) -> Result<Relation<T>> {
        let name = name.into();
        let columns: BTreeSet<T> = columns.into_iter().collect();
        if let Some(max) = max_rows {
            if max < min_rows {
                return Err(RelationError::invariant(format!(
                    "leaf {name} has max_rows {max} below min_rows {min_rows}"
                )));
            }
        }
        let slot = OnceLock::new();
        let _ = slot.set(payload);
        Ok(Relation::from_node(Node {
            kind: NodeKind::Leaf {
                name,
                payload: slot,
            },
            engine: engine.clone(),
            columns,
            unique,
            min_rows,
            max_rows,
        }))
    }

    /// The engine responsible for interpreting this relation.
    pub fn engine(&self) -> &EngineRef<T> {
        &self.node.engine
    }

    /// The columns of this relation.
    pub fn columns(&self) -> &BTreeSet<T> {
        &self.node.columns
    }

    /// Whether this relation is known to hold no duplicate rows.
    /// Best-effort: `false` never means "definitely has duplicates".
    pub fn is_unique(&self) -> bool {
        self.node.unique
    }

    /// The minimum number of rows this relation can have.
    pub fn min_rows(&self) -> usize {
        self.node.min_rows
    }

    /// The maximum number of rows this relation can have, if bounded.
    pub fn max_rows(&self) -> Option<usize> {
        self.node.max_rows
    }

    /// The attached payload, for leaves and markers that have one.
    pub fn payload(&self) -> Option<&Payload<T>> {
        match &self.node.kind {
            NodeKind::Leaf { payload, .. } | NodeKind::Marker { payload, .. } => payload.get(),
            _ => None,
        }
    }

    /// A borrowed view of the node for exhaustive matching.
    pub fn view(&self) -> RelationView<'_, T> {
        match &self.node.kind {
            NodeKind::Leaf { name, .. } => RelationView::Leaf { name },
            NodeKind::Unary { operation, target } => RelationView::Unary { operation, target },
            NodeKind::Binary {
                operation,
                lhs,
                rhs,
            } => RelationView::Binary {
                operation,
                lhs,
                rhs,
            },
            NodeKind::Marker { kind, target, .. } => RelationView::Marker { kind, target },
        }
    }

    /// Whether two handles refer to the very same node object (not just
    /// structurally equal trees).
    pub fn same(a: &Relation<T>, b: &Relation<T>) -> bool {
        Arc::ptr_eq(&a.node, &b.node)
    }

    /// Whether this relation is the join identity: no columns, exactly
    /// one row. Joining it onto anything returns the other operand.
    pub fn is_join_identity(&self) -> bool {
        self.node.columns.is_empty() && self.node.min_rows == 1 && self.node.max_rows == Some(1)
    }

    /// Attach the payload of a materialization marker, first write wins.
    ///
    /// Returns the payload that ended up attached, whether it was the
    /// caller's or a concurrent winner's. Leaves are born with payloads,
    /// so any attempt to attach one again is a double assignment.
    pub fn attach_payload(&self, payload: Payload<T>) -> Result<&Payload<T>> {
        match &self.node.kind {
            NodeKind::Marker {
                kind: MarkerKind::Materialization { .. },
                payload: slot,
                ..
            } => {
                let _ = slot.set(payload);
                Ok(slot.get().expect("slot was just set"))
            }
            NodeKind::Leaf { name, .. } => Err(RelationError::invariant(format!(
                "leaf {name} already has a payload; payloads are single-assignment"
            ))),
            _ => Err(RelationError::invariant(
                "only leaves and materialization markers can bear payloads",
            )),
        }
    }

    // ------------------------------------------------------------------
    // Unary factories
    // ------------------------------------------------------------------

    /// Add a column computed from existing columns.
    pub fn calculated(&self, tag: T, expression: ColumnExpression<T>) -> Result<Relation<T>> {
        let required = expression.columns();
        if required.is_empty() {
            return Err(RelationError::column(format!(
                "calculated column {} reads no existing columns; constant columns are not allowed",
                tag.qualified_name()
            )));
        }
        if !required.is_subset(&self.node.columns) {
            return Err(RelationError::column(format!(
                "calculated column {} needs columns missing from its target: {}",
                tag.qualified_name(),
                missing_names(&required, &self.node.columns)
            )));
        }
        if self.node.columns.contains(&tag) {
            return Err(RelationError::column(format!(
                "calculated column {} is already present in the target",
                tag.qualified_name()
            )));
        }
        if !expression.is_supported_by(self.engine()) {
            return Err(RelationError::engine(format!(
                "expression for column {} is not supported by engine {}",
                tag.qualified_name(),
                self.engine()
            )));
        }
        let operation = UnaryOperation::Calculation { tag, expression };
        self.check_unary_support(&operation)?;
        let mut columns = self.node.columns.clone();
        if let UnaryOperation::Calculation { tag, .. } = &operation {
            columns.insert(tag.clone());
        }
        Ok(Relation::from_node(Node {
            engine: self.node.engine.clone(),
            columns,
            unique: self.node.unique,
            min_rows: self.node.min_rows,
            max_rows: self.node.max_rows,
            kind: NodeKind::Unary {
                operation,
                target: self.clone(),
            },
        }))
    }

    /// Keep only the given columns.
    pub fn project(&self, keep: impl IntoIterator<Item = T>) -> Result<Relation<T>> {
        let keep: BTreeSet<T> = keep.into_iter().collect();
        if keep == self.node.columns {
            return Ok(self.clone());
        }
        if !keep.is_subset(&self.node.columns) {
            return Err(RelationError::column(format!(
                "cannot project columns missing from the target: {}",
                missing_names(&keep, &self.node.columns)
            )));
        }
        match &self.node.kind {
            // Two projections compose into one.
            NodeKind::Unary {
                operation: UnaryOperation::Projection { .. },
                target,
            } => {
                trace!("merging adjacent projections");
                return target.project(keep);
            }
            // A calculation whose column is projected away never happened.
            NodeKind::Unary {
                operation: UnaryOperation::Calculation { tag, .. },
                target,
            } if !keep.contains(tag) => {
                trace!(column = %tag.qualified_name(), "dropping dead calculation");
                return target.project(keep);
            }
            _ => {}
        }
        let operation = UnaryOperation::Projection {
            columns: keep.clone(),
        };
        self.check_unary_support(&operation)?;
        // Dropping columns can expose duplicates; only a row-count bound
        // of at most one keeps the uniqueness bit.
        let unique = self.node.max_rows.is_some_and(|max| max <= 1);
        Ok(Relation::from_node(Node {
            engine: self.node.engine.clone(),
            columns: keep,
            unique,
            min_rows: self.node.min_rows,
            max_rows: self.node.max_rows,
            kind: NodeKind::Unary {
                operation,
                target: self.clone(),
            },
        }))
    }

    /// Keep only rows satisfying `predicate`.
    pub fn filtered(&self, predicate: Predicate<T>) -> Result<Relation<T>> {
        if predicate.as_trivial() == Some(true) {
            return Ok(self.clone());
        }
        // A trivially false predicate is kept: doomed relations stay in
        // the tree so the shape of the query remains inspectable.
        let required = predicate.columns();
        if !required.is_subset(&self.node.columns) {
            return Err(RelationError::column(format!(
                "selection predicate needs columns missing from the target: {}",
                missing_names(&required, &self.node.columns)
            )));
        }
        if !predicate.is_supported_by(self.engine()) {
            return Err(RelationError::engine(format!(
                "selection predicate is not supported by engine {}",
                self.engine()
            )));
        }
        if let NodeKind::Unary {
            operation: UnaryOperation::Selection { predicate: earlier },
            target,
        } = &self.node.kind
        {
            trace!("merging adjacent selections");
            return target.filtered(Predicate::and(vec![earlier.clone(), predicate]));
        }
        let operation = UnaryOperation::Selection { predicate };
        self.check_unary_support(&operation)?;
        Ok(Relation::from_node(Node {
            engine: self.node.engine.clone(),
            columns: self.node.columns.clone(),
            unique: self.node.unique,
            min_rows: 0,
            max_rows: self.node.max_rows,
            kind: NodeKind::Unary {
                operation,
                target: self.clone(),
            },
        }))
    }

    /// Keep only rows in the half-open positional window `start..stop`.
    pub fn sliced(&self, start: usize, stop: Option<usize>) -> Result<Relation<T>> {
        if let Some(stop) = stop {
            if stop < start {
                return Err(RelationError::invariant(format!(
                    "slice stop {stop} is below start {start}"
                )));
            }
        }
        if start == 0 && stop.is_none() {
            return Ok(self.clone());
        }
        // Back-to-back slices compose into a single window.
        if let NodeKind::Unary {
            operation:
                UnaryOperation::Slice {
                    start: earlier_start,
                    stop: earlier_stop,
                },
            target,
        } = &self.node.kind
        {
            let new_start = earlier_start + start;
            let new_stop = match (earlier_stop, stop) {
                (None, None) => None,
                (None, Some(stop)) => Some(stop + earlier_start),
                (Some(earlier), None) => Some(*earlier),
                (Some(earlier), Some(stop)) => Some((stop + earlier_start).min(*earlier)),
            };
            trace!("merging adjacent slices");
            return target.sliced(new_start, new_stop);
        }
        let operation = UnaryOperation::Slice { start, stop };
        self.check_unary_support(&operation)?;
        let window = stop.map(|stop| stop - start);
        let max_rows = match (self.node.max_rows, window) {
            (Some(max), Some(window)) => Some(max.saturating_sub(start).min(window)),
            (Some(max), None) => Some(max.saturating_sub(start)),
            (None, window) => window,
        };
        let mut min_rows = self.node.min_rows.saturating_sub(start);
        if let Some(window) = window {
            min_rows = min_rows.min(window);
        }
        Ok(Relation::from_node(Node {
            engine: self.node.engine.clone(),
            columns: self.node.columns.clone(),
            unique: self.node.unique,
            min_rows,
            max_rows,
            kind: NodeKind::Unary {
                operation,
                target: self.clone(),
            },
        }))
    }

    /// Order rows by the given sort terms.
    pub fn sorted(&self, terms: Vec<SortTerm<T>>) -> Result<Relation<T>> {
        if terms.is_empty() {
            return Ok(self.clone());
        }
        for term in &terms {
            let required = term.expression.columns();
            if !required.is_subset(&self.node.columns) {
                return Err(RelationError::column(format!(
                    "sort term needs columns missing from the target: {}",
                    missing_names(&required, &self.node.columns)
                )));
            }
            if !term.expression.is_supported_by(self.engine()) {
                return Err(RelationError::engine(format!(
                    "sort term is not supported by engine {}",
                    self.engine()
                )));
            }
        }
        // Sorting a sorted relation: the new terms take precedence, the
        // earlier ones break remaining ties.
        if let NodeKind::Unary {
            operation: UnaryOperation::Sort { terms: earlier },
            target,
        } = &self.node.kind
        {
            let mut merged = terms;
            for term in earlier {
                if !merged.contains(term) {
                    merged.push(term.clone());
                }
            }
            trace!("merging adjacent sorts");
            return target.sorted(merged);
        }
        let operation = UnaryOperation::Sort { terms };
        self.check_unary_support(&operation)?;
        Ok(Relation::from_node(Node {
            engine: self.node.engine.clone(),
            columns: self.node.columns.clone(),
            unique: self.node.unique,
            min_rows: self.node.min_rows,
            max_rows: self.node.max_rows,
            kind: NodeKind::Unary {
                operation,
                target: self.clone(),
            },
        }))
    }

    /// Remove duplicate rows.
    ///
    /// A relation already known to be unique, including any relation
    /// bounded to at most one row, is returned unchanged.
    pub fn distinct(&self) -> Result<Relation<T>> {
        if self.node.unique || self.node.max_rows.is_some_and(|max| max <= 1) {
            trace!("deduplication of a unique relation is a no-op");
            return Ok(self.clone());
        }
        let operation = UnaryOperation::Deduplication;
        self.check_unary_support(&operation)?;
        Ok(Relation::from_node(Node {
            engine: self.node.engine.clone(),
            columns: self.node.columns.clone(),
            unique: true,
            min_rows: self.node.min_rows.min(1),
            max_rows: self.node.max_rows,
            kind: NodeKind::Unary {
                operation,
                target: self.clone(),
            },
        }))
    }

    /// Apply any unary operation through the factory that enforces its
    /// rules. `Identity` returns the target unchanged.
    pub fn apply(&self, operation: UnaryOperation<T>) -> Result<Relation<T>> {
        match operation {
            UnaryOperation::Calculation { tag, expression } => self.calculated(tag, expression),
            UnaryOperation::Deduplication => self.distinct(),
            UnaryOperation::Identity => Ok(self.clone()),
            UnaryOperation::Projection { columns } => self.project(columns),
            UnaryOperation::Selection { predicate } => self.filtered(predicate),
            UnaryOperation::Slice { start, stop } => self.sliced(start, stop),
            UnaryOperation::Sort { terms } => self.sorted(terms),
            UnaryOperation::Custom(op) => self.custom(op),
        }
    }

    /// Apply a host-defined row filter or reordering.
    pub fn custom(&self, op: CustomOp<T>) -> Result<Relation<T>> {
        let required = op.columns_required();
        if !required.is_subset(&self.node.columns) {
            return Err(RelationError::column(format!(
                "custom operation {} needs columns missing from the target: {}",
                op.name(),
                missing_names(&required, &self.node.columns)
            )));
        }
        let operation = UnaryOperation::Custom(op);
        self.check_unary_support(&operation)?;
        let min_rows = match &operation {
            UnaryOperation::Custom(op) if op.flavor() == CustomFlavor::RowFilter => 0,
            _ => self.node.min_rows,
        };
        Ok(Relation::from_node(Node {
            engine: self.node.engine.clone(),
            columns: self.node.columns.clone(),
            unique: self.node.unique,
            min_rows,
            max_rows: self.node.max_rows,
            kind: NodeKind::Unary {
                operation,
                target: self.clone(),
            },
        }))
    }

    // ------------------------------------------------------------------
    // Binary factories
    // ------------------------------------------------------------------

    /// Natural join: match rows on all common columns, further constrained
    /// by `predicate`.
    pub fn join(&self, other: &Relation<T>, predicate: Predicate<T>) -> Result<Relation<T>> {
        if self.engine() != other.engine() {
            return Err(RelationError::invariant(format!(
                "join operands have different engines: {} and {}",
                self.engine(),
                other.engine()
            )));
        }
        let mut columns = self.node.columns.clone();
        columns.extend(other.node.columns.iter().cloned());
        let required = predicate.columns();
        if !required.is_subset(&columns) {
            return Err(RelationError::column(format!(
                "join predicate needs columns missing from both operands: {}",
                missing_names(&required, &columns)
            )));
        }
        if !predicate.is_supported_by(self.engine()) {
            return Err(RelationError::engine(format!(
                "join predicate is not supported by engine {}",
                self.engine()
            )));
        }
        let common: BTreeSet<T> = self
            .node
            .columns
            .intersection(&other.node.columns)
            .cloned()
            .collect();
        let operation = BinaryOperation::Join {
            predicate,
            common: common.clone(),
        };
        if !self.engine().supports_binary(&operation) {
            return Err(RelationError::not_implemented(format!(
                "engine {} cannot realize joins",
                self.engine()
            )));
        }
        // Identity simplification happens after the checks so that logic
        // errors in predicates are still reported.
        if self.is_join_identity() {
            return Ok(other.clone());
        }
        if other.is_join_identity() {
            return Ok(self.clone());
        }
        // Each row of a side whose entire column set is part of the join
        // key matches at most one row of the other side.
        let unique = self.node.unique
            && other.node.unique
            && (self.node.columns.is_subset(&common) || other.node.columns.is_subset(&common));
        let max_rows = match (self.node.max_rows, other.node.max_rows) {
            (Some(0), _) | (_, Some(0)) => Some(0),
            (Some(a), Some(b)) => Some(a.saturating_mul(b)),
            _ => None,
        };
        Ok(Relation::from_node(Node {
            engine: self.node.engine.clone(),
            columns,
            unique,
            min_rows: 0,
            max_rows,
            kind: NodeKind::Binary {
                operation,
                lhs: self.clone(),
                rhs: other.clone(),
            },
        }))
    }

    /// Multiset concatenation of two relations with identical columns.
    pub fn chain(&self, other: &Relation<T>) -> Result<Relation<T>> {
        if self.engine() != other.engine() {
            return Err(RelationError::invariant(format!(
                "chain operands have different engines: {} and {}",
                self.engine(),
                other.engine()
            )));
        }
        if self.node.columns != other.node.columns {
            return Err(RelationError::invariant(
                "chain operands must have identical column sets",
            ));
        }
        let operation = BinaryOperation::Chain;
        if !self.engine().supports_binary(&operation) {
            return Err(RelationError::not_implemented(format!(
                "engine {} cannot realize chains",
                self.engine()
            )));
        }
        let max_rows = match (self.node.max_rows, other.node.max_rows) {
            (Some(a), Some(b)) => Some(a.saturating_add(b)),
            _ => None,
        };
        Ok(Relation::from_node(Node {
            engine: self.node.engine.clone(),
            columns: self.node.columns.clone(),
            unique: false,
            min_rows: self.node.min_rows + other.node.min_rows,
            max_rows,
            kind: NodeKind::Binary {
                operation,
                lhs: self.clone(),
                rhs: other.clone(),
            },
        }))
    }

    // ------------------------------------------------------------------
    // Marker factories
    // ------------------------------------------------------------------

    /// Mark this subtree for one-time evaluation and payload caching.
    ///
    /// Leaves and existing materializations are already cached content,
    /// so they are returned unchanged.
    pub fn materialized(&self, name: impl Into<String>) -> Result<Relation<T>> {
        match &self.node.kind {
            NodeKind::Leaf { .. } => return Ok(self.clone()),
            NodeKind::Marker {
                kind: MarkerKind::Materialization { .. },
                ..
            } => return Ok(self.clone()),
            _ => {}
        }
        Ok(Relation::from_node(Node {
            engine: self.node.engine.clone(),
            columns: self.node.columns.clone(),
            unique: self.node.unique,
            min_rows: self.node.min_rows,
            max_rows: self.node.max_rows,
            kind: NodeKind::Marker {
                kind: MarkerKind::Materialization { name: name.into() },
                target: self.clone(),
                payload: OnceLock::new(),
            },
        }))
    }

    /// Mark this subtree's content for movement to another engine.
    ///
    /// Transferring a relation to its own engine is a no-op.
    pub fn transferred_to(&self, destination: &EngineRef<T>) -> Result<Relation<T>> {
        if destination == self.engine() {
            return Ok(self.clone());
        }
        Ok(Relation::from_node(Node {
            engine: destination.clone(),
            columns: self.node.columns.clone(),
            unique: self.node.unique,
            min_rows: self.node.min_rows,
            max_rows: self.node.max_rows,
            kind: NodeKind::Marker {
                kind: MarkerKind::Transfer,
                target: self.clone(),
                payload: OnceLock::new(),
            },
        }))
    }

    /// Build a `Select` conformance marker. SQL-conform internal: the
    /// marker may narrow the visible columns to `columns`, which is the
    /// statement's final SELECT list.
    pub(crate) fn select_marker(target: &Relation<T>, columns: BTreeSet<T>) -> Relation<T> {
        debug_assert!(columns.is_subset(target.columns()));
        let unique = target.node.unique;
        Relation::from_node(Node {
            engine: target.node.engine.clone(),
            columns,
            unique,
            min_rows: target.node.min_rows,
            max_rows: target.node.max_rows,
            kind: NodeKind::Marker {
                kind: MarkerKind::Select,
                target: target.clone(),
                payload: OnceLock::new(),
            },
        })
    }

    fn check_unary_support(&self, operation: &UnaryOperation<T>) -> Result<()> {
        if self.engine().supports_unary(operation) {
            Ok(())
        } else {
            Err(RelationError::not_implemented(format!(
                "engine {} cannot realize {} operations",
                self.engine(),
                operation.name()
            )))
        }
    }
}

fn missing_names<T: ColumnTag>(required: &BTreeSet<T>, available: &BTreeSet<T>) -> String {
    let names: Vec<String> = required
        .difference(available)
        .map(|tag| tag.qualified_name())
        .collect();
    names.join(", ")
}

impl<T: ColumnTag> PartialEq for Relation<T> {
    fn eq(&self, other: &Self) -> bool {
        if Arc::ptr_eq(&self.node, &other.node) {
            return true;
        }
        let a = &self.node;
        let b = &other.node;
        if a.engine != b.engine
            || a.columns != b.columns
            || a.unique != b.unique
            || a.min_rows != b.min_rows
            || a.max_rows != b.max_rows
        {
            return false;
        }
        match (&a.kind, &b.kind) {
            (NodeKind::Leaf { name: an, .. }, NodeKind::Leaf { name: bn, .. }) => an == bn,
            (
                NodeKind::Unary {
                    operation: ao,
                    target: at,
                },
                NodeKind::Unary {
                    operation: bo,
                    target: bt,
                },
            ) => ao == bo && at == bt,
            (
                NodeKind::Binary {
                    operation: ao,
                    lhs: al,
                    rhs: ar,
                },
                NodeKind::Binary {
                    operation: bo,
                    lhs: bl,
                    rhs: br,
                },
            ) => ao == bo && al == bl && ar == br,
            (
                NodeKind::Marker {
                    kind: ak,
                    target: at,
                    ..
                },
                NodeKind::Marker {
                    kind: bk,
                    target: bt,
                    ..
                },
            ) => ak == bk && at == bt,
            _ => false,
        }
    }
}

impl<T: ColumnTag> Eq for Relation<T> {}

impl<T: ColumnTag> Hash for Relation<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        let node = &self.node;
        node.engine.hash(state);
        node.columns.hash(state);
        node.unique.hash(state);
        node.min_rows.hash(state);
        node.max_rows.hash(state);
        match &node.kind {
            NodeKind::Leaf { name, .. } => {
                0u8.hash(state);
                name.hash(state);
            }
            NodeKind::Unary { operation, target } => {
                1u8.hash(state);
                operation.hash(state);
                target.hash(state);
            }
            NodeKind::Binary {
                operation,
                lhs,
                rhs,
            } => {
                2u8.hash(state);
                operation.hash(state);
                lhs.hash(state);
                rhs.hash(state);
            }
            NodeKind::Marker { kind, target, .. } => {
                3u8.hash(state);
                kind.hash(state);
                target.hash(state);
            }
        }
    }
}

impl<T: ColumnTag> fmt::Debug for Relation<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Relation({self})")
    }
}

impl<T: ColumnTag> fmt::Display for Relation<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.node.kind {
            NodeKind::Leaf { name, .. } => f.write_str(name),
            NodeKind::Unary { operation, target } => write!(f, "{operation}({target})"),
            NodeKind::Binary {
                operation,
                lhs,
                rhs,
            } => write!(f, "({lhs} {operation} {rhs})"),
            NodeKind::Marker { kind, target, .. } => write!(f, "{kind}({target})"),
        }
    }
}
