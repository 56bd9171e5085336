//! Normalization of relation trees into the canonical SELECT shape.
//!
//! A conformed SQL subtree is either a bare leaf/marker, or a `Select`
//! marker over a stack of the shape (root to leaves)
//!
//! ```text
//! Slice? · Sort? · Dedup? · Projection? · Selection* · Calculation* · source
//! ```
//!
//! where the source is a join tree or a chain of conformed subtrees.
//! Conformation works by gathering a tree bottom-up into [`Layers`]
//! (one bucket per canonical stack position), absorbing each operation
//! into the bucket its commutation rules allow. An operation that cannot
//! commute past what is already gathered seals the gathered layers into
//! a `Select`-marked subquery and starts fresh above it.
//!
//! Selections and calculations distribute into chain branches, with
//! explicit recursion into each branch so chains nested under other
//! absorbed operations are rewritten too. Interior sorts die under joins
//! and chains unless a slice pins them.

use std::collections::BTreeSet;

use tracing::debug;

use crate::error::{RelationError, Result};
use crate::expr::{ColumnExpression, Predicate, SortTerm};
use crate::operation::{BinaryOperation, MarkerKind, UnaryOperation};
use crate::relation::{Relation, RelationView};
use crate::tag::ColumnTag;

/// The canonical clause buckets of a single SELECT statement.
pub(crate) struct Layers<T: ColumnTag> {
    pub source: Source<T>,
    pub calculations: Vec<(T, ColumnExpression<T>)>,
    pub selections: Vec<Predicate<T>>,
    pub projection: Option<BTreeSet<T>>,
    pub dedup: bool,
    pub sort: Vec<SortTerm<T>>,
    pub slice: Option<(usize, Option<usize>)>,
}

/// What the statement selects from.
pub(crate) enum Source<T: ColumnTag> {
    /// One conformed relation: a leaf, a payload-bearing marker, or a
    /// sealed `Select` subquery.
    Single(Relation<T>),
    /// A flattened join of conformed relations. Common columns between
    /// accumulated members become equi-join keys at emission; explicit
    /// join predicates conjoin into the WHERE clause.
    Join {
        members: Vec<Relation<T>>,
        conditions: Vec<Predicate<T>>,
    },
    /// A union of conformed branches.
    Chain(Vec<Relation<T>>),
}

impl<T: ColumnTag> Layers<T> {
    pub(crate) fn from_source(relation: Relation<T>) -> Self {
        Layers {
            source: Source::Single(relation),
            calculations: Vec::new(),
            selections: Vec::new(),
            projection: None,
            dedup: false,
            sort: Vec::new(),
            slice: None,
        }
    }

    /// The columns the FROM clause and calculations make available,
    /// before any projection narrows them.
    fn available_columns(&self) -> BTreeSet<T> {
        let mut out = match &self.source {
            Source::Single(relation) => relation.columns().clone(),
            Source::Join { members, .. } => {
                let mut out = BTreeSet::new();
                for member in members {
                    out.extend(member.columns().iter().cloned());
                }
                out
            }
            Source::Chain(branches) => branches
                .first()
                .map(|branch| branch.columns().clone())
                .unwrap_or_default(),
        };
        for (tag, _) in &self.calculations {
            out.insert(tag.clone());
        }
        out
    }

    fn has_operations(&self) -> bool {
        !self.calculations.is_empty()
            || !self.selections.is_empty()
            || self.projection.is_some()
            || self.dedup
            || !self.sort.is_empty()
            || self.slice.is_some()
    }

    /// Whether this side can merge into an enclosing join's SELECT
    /// without a subquery boundary.
    fn join_mergeable(&self, other_columns: &BTreeSet<T>) -> bool {
        if self.projection.is_some()
            || self.dedup
            || !self.sort.is_empty()
            || self.slice.is_some()
            || matches!(self.source, Source::Chain(_))
        {
            return false;
        }
        // A calculated column that is also a column of the other side
        // would be a join key; it must be exposed by a subquery so the
        // equi-join constraint can see it as a plain column.
        self.calculations
            .iter()
            .all(|(tag, _)| !other_columns.contains(tag))
    }

    fn is_bare_chain(&self) -> bool {
        matches!(self.source, Source::Chain(_)) && !self.has_operations()
    }
}

/// Conform a relation tree into the canonical SELECT shape.
pub fn conform<T: ColumnTag>(relation: &Relation<T>) -> Result<Relation<T>> {
    match relation.view() {
        RelationView::Leaf { .. } => Ok(relation.clone()),
        RelationView::Marker {
            kind: MarkerKind::Select,
            ..
        } => Ok(relation.clone()),
        RelationView::Marker {
            kind: MarkerKind::Materialization { .. },
            ..
        } if relation.payload().is_some() => Ok(relation.clone()),
        _ => {
            let layers = gather(relation)?;
            let conformed = to_conformed(layers)?;
            debug_assert_eq!(
                conformed.columns(),
                relation.columns(),
                "conformation changed the observable column set"
            );
            Ok(conformed)
        }
    }
}

/// Gather a tree bottom-up into canonical layers.
pub(crate) fn gather<T: ColumnTag>(relation: &Relation<T>) -> Result<Layers<T>> {
    match relation.view() {
        RelationView::Leaf { .. } => Ok(Layers::from_source(relation.clone())),
        RelationView::Marker { kind, target } => match kind {
            MarkerKind::Select => {
                // Re-absorb the certified stack; a marker that narrows
                // the select list re-applies as a projection.
                let layers = gather(target)?;
                if relation.columns() == target.columns() {
                    Ok(layers)
                } else {
                    absorb_projection(layers, relation.columns().clone())
                }
            }
            MarkerKind::Materialization { name } => {
                if relation.payload().is_some() {
                    Ok(Layers::from_source(relation.clone()))
                } else {
                    // Not yet evaluated: behaves as if the marker were
                    // absent.
                    debug!(name = %name, "conforming through an unevaluated materialization");
                    gather(target)
                }
            }
            MarkerKind::Transfer => Err(RelationError::engine(
                "cannot conform across a transfer; use a processor first",
            )),
        },
        RelationView::Unary { operation, target } => {
            let layers = gather(target)?;
            absorb(layers, operation)
        }
        RelationView::Binary {
            operation,
            lhs,
            rhs,
        } => {
            let left = gather(lhs)?;
            let right = gather(rhs)?;
            match operation {
                BinaryOperation::Join { predicate, .. } => {
                    merge_join(left, right, predicate.clone())
                }
                BinaryOperation::Chain => merge_chain(left, right),
            }
        }
    }
}

fn absorb<T: ColumnTag>(layers: Layers<T>, operation: &UnaryOperation<T>) -> Result<Layers<T>> {
    match operation {
        UnaryOperation::Selection { predicate } => absorb_selection(layers, predicate.clone()),
        UnaryOperation::Calculation { tag, expression } => {
            absorb_calculation(layers, tag.clone(), expression.clone())
        }
        UnaryOperation::Projection { columns } => absorb_projection(layers, columns.clone()),
        UnaryOperation::Deduplication => absorb_dedup(layers),
        UnaryOperation::Sort { terms } => absorb_sort(layers, terms.clone()),
        UnaryOperation::Slice { start, stop } => absorb_slice(layers, *start, *stop),
        UnaryOperation::Identity => Ok(layers),
        UnaryOperation::Custom(op) => Err(RelationError::engine(format!(
            "custom operation {} cannot be conformed to SQL",
            op.name()
        ))),
    }
}

/// Seal the gathered layers into a conformed subquery and start fresh
/// layers above it.
fn restart<T: ColumnTag>(layers: Layers<T>) -> Result<Layers<T>> {
    let sealed = to_conformed(layers)?;
    Ok(Layers::from_source(sealed))
}

fn absorb_selection<T: ColumnTag>(layers: Layers<T>, predicate: Predicate<T>) -> Result<Layers<T>> {
    // A selection cannot commute into a sliced window.
    let mut layers = if layers.slice.is_some() {
        restart(layers)?
    } else {
        layers
    };
    if let Source::Chain(branches) = &layers.source {
        // Distribute into every branch, conforming each so chains
        // nested deeper down are rewritten as well.
        let mut rewritten = Vec::with_capacity(branches.len());
        for branch in branches {
            let filtered = branch.filtered(predicate.clone())?;
            rewritten.push(conform(&filtered)?);
        }
        layers.source = Source::Chain(rewritten);
        Ok(layers)
    } else {
        // Gather conjuncts individually so the rebuild can order them
        // canonically.
        layers.selections.extend(predicate.conjuncts());
        Ok(layers)
    }
}

fn absorb_calculation<T: ColumnTag>(
    layers: Layers<T>,
    tag: T,
    expression: ColumnExpression<T>,
) -> Result<Layers<T>> {
    // Only a plain column alias is injective for sure; anything else
    // stays above an already-gathered deduplication.
    let mut layers = if layers.dedup && !matches!(expression, ColumnExpression::Reference(_)) {
        restart(layers)?
    } else {
        layers
    };
    if let Source::Chain(branches) = &layers.source {
        let required = expression.columns();
        let distributable = branches.iter().all(|branch| {
            required.is_subset(branch.columns()) && !branch.columns().contains(&tag)
        });
        if distributable {
            let mut rewritten = Vec::with_capacity(branches.len());
            for branch in branches {
                let extended = branch.calculated(tag.clone(), expression.clone())?;
                rewritten.push(conform(&extended)?);
            }
            layers.source = Source::Chain(rewritten);
            return Ok(layers);
        }
        layers = restart(layers)?;
    }
    // The new tag must not collide with a column the projection hid.
    if layers.projection.is_some() && layers.available_columns().contains(&tag) {
        layers = restart(layers)?;
    }
    if let Some(projection) = &mut layers.projection {
        projection.insert(tag.clone());
    }
    layers.calculations.push((tag, expression));
    Ok(layers)
}

fn absorb_projection<T: ColumnTag>(
    layers: Layers<T>,
    columns: BTreeSet<T>,
) -> Result<Layers<T>> {
    // Projecting after deduplication changes which rows are duplicates;
    // the dedup must happen in a subquery of its own.
    let mut layers = if layers.dedup {
        restart(layers)?
    } else {
        layers
    };
    if let Source::Chain(branches) = &layers.source {
        if layers.sort.is_empty() && layers.slice.is_none() {
            let mut rewritten = Vec::with_capacity(branches.len());
            for branch in branches {
                let projected = branch.project(columns.iter().cloned())?;
                rewritten.push(conform(&projected)?);
            }
            layers.source = Source::Chain(rewritten);
            layers.projection = None;
            return Ok(layers);
        }
        // A union already pinned by ORDER BY/LIMIT projects outside.
        layers = restart(layers)?;
    }
    layers.projection = Some(columns);
    Ok(layers)
}

fn absorb_dedup<T: ColumnTag>(layers: Layers<T>) -> Result<Layers<T>> {
    // DISTINCT applies before LIMIT in SQL, so a gathered slice forces a
    // subquery. Likewise a narrowed select list whose ORDER BY reads
    // hidden columns cannot carry a DISTINCT.
    let narrowing = match &layers.projection {
        Some(projection) => layers
            .sort
            .iter()
            .any(|term| !term.expression.columns().is_subset(projection)),
        None => false,
    };
    let mut layers = if layers.slice.is_some() || narrowing {
        restart(layers)?
    } else {
        layers
    };
    layers.dedup = true;
    Ok(layers)
}

fn absorb_sort<T: ColumnTag>(layers: Layers<T>, terms: Vec<SortTerm<T>>) -> Result<Layers<T>> {
    let mut layers = if layers.slice.is_some() {
        restart(layers)?
    } else {
        layers
    };
    if layers.sort.is_empty() {
        layers.sort = terms;
    } else {
        // The outer sort takes precedence; the gathered one breaks ties.
        let mut merged = terms;
        for term in std::mem::take(&mut layers.sort) {
            if !merged.contains(&term) {
                merged.push(term);
            }
        }
        layers.sort = merged;
    }
    Ok(layers)
}

fn absorb_slice<T: ColumnTag>(
    mut layers: Layers<T>,
    start: usize,
    stop: Option<usize>,
) -> Result<Layers<T>> {
    layers.slice = Some(match layers.slice {
        None => (start, stop),
        Some((earlier_start, earlier_stop)) => {
            let new_start = earlier_start + start;
            let new_stop = match (earlier_stop, stop) {
                (None, None) => None,
                (None, Some(stop)) => Some(stop + earlier_start),
                (Some(earlier), None) => Some(earlier),
                (Some(earlier), Some(stop)) => Some((stop + earlier_start).min(earlier)),
            };
            (new_start, new_stop)
        }
    });
    Ok(layers)
}

fn merge_join<T: ColumnTag>(
    left: Layers<T>,
    right: Layers<T>,
    predicate: Predicate<T>,
) -> Result<Layers<T>> {
    let left_columns = left.available_columns();
    let right_columns = right.available_columns();
    let mut members = Vec::new();
    let mut conditions = Vec::new();
    let mut selections = Vec::new();
    let mut calculations = Vec::new();

    for (mut side, other_columns) in [(left, right_columns), (right, left_columns)] {
        if !side.sort.is_empty() && side.slice.is_none() {
            debug!("dropping interior sort under a join");
            side.sort.clear();
        }
        if side.join_mergeable(&other_columns) {
            match side.source {
                Source::Single(relation) => members.push(relation),
                Source::Join {
                    members: inner_members,
                    conditions: inner_conditions,
                } => {
                    members.extend(inner_members);
                    conditions.extend(inner_conditions);
                }
                Source::Chain(_) => unreachable!("chains are never join-mergeable"),
            }
            selections.extend(side.selections);
            calculations.extend(side.calculations);
        } else {
            members.push(to_conformed(side)?);
        }
    }
    if predicate.as_trivial() != Some(true) {
        conditions.push(predicate);
    }
    Ok(Layers {
        source: Source::Join {
            members,
            conditions,
        },
        calculations,
        selections,
        projection: None,
        dedup: false,
        sort: Vec::new(),
        slice: None,
    })
}

fn merge_chain<T: ColumnTag>(left: Layers<T>, right: Layers<T>) -> Result<Layers<T>> {
    let mut branches = Vec::new();
    for mut side in [left, right] {
        if !side.sort.is_empty() && side.slice.is_none() {
            debug!("dropping interior sort under a chain");
            side.sort.clear();
        }
        if side.is_bare_chain() {
            // Chain(Chain(a, b), c) flattens to one branch list.
            if let Source::Chain(inner) = side.source {
                branches.extend(inner);
            }
        } else {
            branches.push(to_conformed(side)?);
        }
    }
    Ok(Layers {
        source: Source::Chain(branches),
        calculations: Vec::new(),
        selections: Vec::new(),
        projection: None,
        dedup: false,
        sort: Vec::new(),
        slice: None,
    })
}

/// Turn gathered layers into a conformed relation: the rebuilt canonical
/// stack under a `Select` marker, or the bare source when nothing was
/// gathered.
pub(crate) fn to_conformed<T: ColumnTag>(layers: Layers<T>) -> Result<Relation<T>> {
    if !layers.has_operations() {
        if let Source::Single(relation) = &layers.source {
            return Ok(relation.clone());
        }
    }
    let (relation, final_columns) = rebuild(layers)?;
    Ok(Relation::select_marker(&relation, final_columns))
}

/// Rebuild the canonical operation stack from layers. Returns the inner
/// stack and the final (possibly narrower) select-list columns.
fn rebuild<T: ColumnTag>(layers: Layers<T>) -> Result<(Relation<T>, BTreeSet<T>)> {
    let Layers {
        source,
        calculations,
        mut selections,
        projection,
        dedup,
        sort,
        slice,
    } = layers;

    let mut relation = match source {
        Source::Single(relation) => relation,
        Source::Join {
            members,
            conditions,
        } => {
            let mut iter = members.into_iter();
            let mut joined = iter.next().ok_or_else(|| {
                RelationError::invariant("a join source must have at least one member")
            })?;
            for member in iter {
                joined = joined.join(&member, Predicate::literal(true))?;
            }
            // Join predicates conjoin into the statement's WHERE.
            selections.splice(0..0, conditions);
            joined
        }
        Source::Chain(branches) => {
            let mut iter = branches.into_iter();
            let mut chained = iter.next().ok_or_else(|| {
                RelationError::invariant("a chain source must have at least one branch")
            })?;
            for branch in iter {
                chained = chained.chain(&branch)?;
            }
            chained
        }
    };

    for (tag, expression) in order_calculations(calculations) {
        relation = relation.calculated(tag, expression)?;
    }

    // Canonical ordering: selections sort by the total order on their
    // column sets, so structurally equal trees conform identically.
    selections.sort_by(|a, b| a.columns().cmp(&b.columns()).then_with(|| a.cmp(b)));
    for predicate in selections {
        relation = relation.filtered(predicate)?;
    }

    let final_columns = match &projection {
        Some(columns) => columns.clone(),
        None => relation.columns().clone(),
    };
    if let Some(columns) = projection {
        // ORDER BY may read columns the select list drops; the inner
        // projection keeps them and the marker narrows.
        let mut inner = columns;
        for term in &sort {
            inner.extend(term.expression.columns());
        }
        relation = relation.project(inner)?;
    }
    if dedup {
        relation = relation.distinct()?;
    }
    if !sort.is_empty() {
        relation = relation.sorted(sort)?;
    }
    if let Some((start, stop)) = slice {
        relation = relation.sliced(start, stop)?;
    }
    Ok((relation, final_columns))
}

/// Calculations sort by tag for canonical form, unless one depends on
/// another's output, in which case the gathered (dependency) order is
/// kept.
fn order_calculations<T: ColumnTag>(
    calculations: Vec<(T, ColumnExpression<T>)>,
) -> Vec<(T, ColumnExpression<T>)> {
    let tags: BTreeSet<T> = calculations.iter().map(|(tag, _)| tag.clone()).collect();
    let interdependent = calculations
        .iter()
        .any(|(_, expression)| expression.columns().iter().any(|column| tags.contains(column)));
    if interdependent {
        calculations
    } else {
        let mut sorted = calculations;
        sorted.sort_by(|(a, _), (b, _)| a.cmp(b));
        sorted
    }
}
