//! Row payloads for the iteration engine.
//!
//! A payload is a [`RowIterable`] in one of three shapes: a lazy one-shot
//! generator, a materialized sequence with O(1) slicing, or an
//! insertion-ordered mapping keyed by the full row (the shape
//! deduplication produces). Sequences and mappings can be re-iterated
//! freely; a generator yields its rows exactly once, and consuming it a
//! second time is an execution error.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, Mutex};

use indexmap::IndexSet;

use crate::datum::Datum;
use crate::error::{RelationError, Result};
use crate::tag::ColumnTag;

/// A single row: a mapping from column tag to value.
pub type Row<T> = BTreeMap<T, Datum>;

/// A fallible stream of rows.
pub type RowStream<T> = Box<dyn Iterator<Item = Result<Row<T>>> + Send>;

/// The content of an iteration-engine relation.
#[derive(Debug, Clone)]
pub enum RowIterable<T: ColumnTag> {
    /// Lazy, order-preserving, single pass.
    Generator(RowGenerator<T>),
    /// Materialized rows; re-iterable, O(1) slicing.
    Sequence(RowSequence<T>),
    /// Materialized, duplicate-free rows in first-seen order.
    Mapping(RowMapping<T>),
}

impl<T: ColumnTag> RowIterable<T> {
    pub fn generator(stream: impl Iterator<Item = Result<Row<T>>> + Send + 'static) -> Self {
        RowIterable::Generator(RowGenerator::new(Box::new(stream)))
    }

    pub fn sequence(rows: Vec<Row<T>>) -> Self {
        RowIterable::Sequence(RowSequence::new(rows))
    }

    pub fn mapping(rows: impl IntoIterator<Item = Row<T>>) -> Self {
        RowIterable::Mapping(RowMapping::from_rows(rows))
    }

    /// The exact row count, where the shape knows it.
    pub fn known_len(&self) -> Option<usize> {
        match self {
            RowIterable::Generator(_) => None,
            RowIterable::Sequence(seq) => Some(seq.len()),
            RowIterable::Mapping(map) => Some(map.len()),
        }
    }

    /// Whether this shape guarantees duplicate-free rows.
    pub fn is_unique(&self) -> bool {
        matches!(self, RowIterable::Mapping(_))
    }

    /// Open a stream of rows. Consumes a generator; sequences and
    /// mappings stream copies and stay re-iterable.
    pub fn stream(&self) -> Result<RowStream<T>> {
        match self {
            RowIterable::Generator(generator) => generator.take(),
            RowIterable::Sequence(seq) => Ok(seq.stream()),
            RowIterable::Mapping(map) => Ok(map.stream()),
        }
    }

    /// Materialize into a sequence. Sequences and mappings are already
    /// materialized and pass through unchanged.
    pub fn materialized(self) -> Result<RowIterable<T>> {
        match self {
            RowIterable::Generator(generator) => {
                let rows: Result<Vec<Row<T>>> = generator.take()?.collect();
                Ok(RowIterable::sequence(rows?))
            }
            already => Ok(already),
        }
    }

    /// Drain into a plain vector, in stream order.
    pub fn collect_rows(&self) -> Result<Vec<Row<T>>> {
        self.stream()?.collect()
    }
}

/// A lazy, one-shot row source.
#[derive(Clone)]
pub struct RowGenerator<T: ColumnTag> {
    stream: Arc<Mutex<Option<RowStream<T>>>>,
}

impl<T: ColumnTag> RowGenerator<T> {
    pub fn new(stream: RowStream<T>) -> Self {
        RowGenerator {
            stream: Arc::new(Mutex::new(Some(stream))),
        }
    }

    /// Take the underlying stream. The second taker gets an error: the
    /// rows have already been handed out.
    pub fn take(&self) -> Result<RowStream<T>> {
        let mut slot = self
            .stream
            .lock()
            .map_err(|_| RelationError::execution("row generator lock poisoned", anyhow::anyhow!("poisoned mutex")))?;
        slot.take().ok_or_else(|| {
            RelationError::execution(
                "row generator already consumed",
                anyhow::anyhow!("one-shot generator streamed twice"),
            )
        })
    }
}

impl<T: ColumnTag> fmt::Debug for RowGenerator<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let consumed = self
            .stream
            .lock()
            .map(|slot| slot.is_none())
            .unwrap_or(true);
        f.debug_struct("RowGenerator")
            .field("consumed", &consumed)
            .finish()
    }
}

/// Materialized rows with an O(1) sliced view.
#[derive(Debug, Clone)]
pub struct RowSequence<T: ColumnTag> {
    rows: Arc<Vec<Row<T>>>,
    start: usize,
    end: usize,
}

impl<T: ColumnTag> RowSequence<T> {
    pub fn new(rows: Vec<Row<T>>) -> Self {
        let end = rows.len();
        RowSequence {
            rows: Arc::new(rows),
            start: 0,
            end,
        }
    }

    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn iter(&self) -> impl Iterator<Item = &Row<T>> {
        self.rows[self.start..self.end].iter()
    }

    /// A view of the positional window `start..stop`, sharing storage.
    pub fn slice(&self, start: usize, stop: Option<usize>) -> RowSequence<T> {
        let from = (self.start + start).min(self.end);
        let to = match stop {
            Some(stop) => (self.start + stop).min(self.end),
            None => self.end,
        };
        RowSequence {
            rows: self.rows.clone(),
            start: from,
            end: to.max(from),
        }
    }

    fn stream(&self) -> RowStream<T> {
        let rows = self.rows.clone();
        let range = self.start..self.end;
        Box::new(range.map(move |index| Ok(rows[index].clone())))
    }
}

/// Duplicate-free rows keyed by the full row, in first-seen order.
#[derive(Debug, Clone)]
pub struct RowMapping<T: ColumnTag> {
    rows: Arc<IndexSet<Row<T>>>,
}

impl<T: ColumnTag> RowMapping<T> {
    pub fn from_rows(rows: impl IntoIterator<Item = Row<T>>) -> Self {
        RowMapping {
            rows: Arc::new(rows.into_iter().collect()),
        }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Row<T>> {
        self.rows.iter()
    }

    fn stream(&self) -> RowStream<T> {
        let rows = self.rows.clone();
        let mut index = 0;
        Box::new(std::iter::from_fn(move || {
            let row = rows.get_index(index).cloned().map(Ok);
            index += 1;
            row
        }))
    }
}
