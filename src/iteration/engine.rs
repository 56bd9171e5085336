//! Engine implementation and row-level expression evaluation.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use tracing::trace;

use crate::datum::{Datum, F64};
use crate::engine::{Engine, EngineRef, Payload};
use crate::error::{RelationError, Result};
use crate::expr::{ColumnContainer, ColumnExpression, Predicate, SortTerm};
use crate::iteration::rows::{Row, RowIterable};
use crate::operation::{BinaryOperation, MarkerKind, UnaryOperation};
use crate::relation::{Relation, RelationView};
use crate::tag::ColumnTag;

/// A host-registered scalar function over datum arguments.
pub type ScalarFn = Arc<dyn Fn(&[Datum]) -> Result<Datum> + Send + Sync>;

/// Named functions available to column expressions in this engine.
///
/// Comparison and arithmetic names are built in; hosts register the
/// rest. Builtins win a name collision, so expression semantics stay
/// stable across hosts.
#[derive(Default)]
pub struct FunctionTable {
    registered: RwLock<HashMap<String, ScalarFn>>,
}

const BUILTINS: &[&str] = &[
    "eq", "ne", "lt", "le", "gt", "ge", "add", "sub", "mul", "div", "neg", "abs", "not",
];

impl FunctionTable {
    pub fn supports(&self, name: &str) -> bool {
        BUILTINS.contains(&name)
            || self
                .registered
                .read()
                .map(|map| map.contains_key(name))
                .unwrap_or(false)
    }

    pub fn register(&self, name: impl Into<String>, function: ScalarFn) {
        if let Ok(mut map) = self.registered.write() {
            map.insert(name.into(), function);
        }
    }

    pub fn call(&self, name: &str, args: &[Datum]) -> Result<Datum> {
        if let Some(result) = call_builtin(name, args) {
            return result;
        }
        let function = self
            .registered
            .read()
            .ok()
            .and_then(|map| map.get(name).cloned());
        match function {
            Some(function) => function(args),
            None => Err(RelationError::engine(format!(
                "unknown function {name}"
            ))),
        }
    }
}

impl std::fmt::Debug for FunctionTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let registered: Vec<String> = self
            .registered
            .read()
            .map(|map| map.keys().cloned().collect())
            .unwrap_or_default();
        f.debug_struct("FunctionTable")
            .field("registered", &registered)
            .finish()
    }
}

/// The in-memory, row-iterator execution engine.
#[derive(Debug)]
pub struct IterationEngine {
    name: String,
    functions: Arc<FunctionTable>,
}

impl IterationEngine {
    pub fn new(name: impl Into<String>) -> Self {
        IterationEngine {
            name: name.into(),
            functions: Arc::new(FunctionTable::default()),
        }
    }

    /// Register a named function for use in expressions.
    pub fn register_function(
        &self,
        name: impl Into<String>,
        function: impl Fn(&[Datum]) -> Result<Datum> + Send + Sync + 'static,
    ) {
        self.functions.register(name, Arc::new(function));
    }

    /// Create a leaf relation holding the given rows.
    ///
    /// Row-count bounds come from the payload shape; a mapping payload
    /// additionally proves uniqueness.
    pub fn make_leaf<T: ColumnTag>(
        engine: &EngineRef<T>,
        name: impl Into<String>,
        columns: impl IntoIterator<Item = T>,
        rows: RowIterable<T>,
    ) -> Result<Relation<T>> {
        let unique = rows.is_unique();
        let (min_rows, max_rows) = match rows.known_len() {
            Some(len) => (len, Some(len)),
            None => (0, None),
        };
        Relation::leaf(
            name,
            engine,
            columns,
            unique,
            min_rows,
            max_rows,
            Payload::Rows(rows),
        )
    }

    fn execute_rows<T: ColumnTag>(&self, relation: &Relation<T>) -> Result<RowIterable<T>> {
        match relation.view() {
            RelationView::Leaf { name } => match relation.payload() {
                Some(Payload::Rows(rows)) => Ok(rows.clone()),
                Some(_) => Err(RelationError::engine(format!(
                    "leaf {name} does not hold a row payload"
                ))),
                None => Err(RelationError::engine(format!(
                    "leaf {name} has no payload"
                ))),
            },
            RelationView::Marker { kind, target } => match kind {
                MarkerKind::Materialization { name } => {
                    if let Some(Payload::Rows(rows)) = relation.payload() {
                        trace!(name = %name, "reusing materialized payload");
                        return Ok(rows.clone());
                    }
                    let rows = self.execute_rows(target)?.materialized()?;
                    // First writer wins; read back whatever is attached.
                    let stored = relation.attach_payload(Payload::Rows(rows))?;
                    match stored {
                        Payload::Rows(rows) => Ok(rows.clone()),
                        _ => Err(RelationError::invariant(
                            "materialization holds a foreign payload",
                        )),
                    }
                }
                MarkerKind::Transfer => Err(RelationError::engine(
                    "cannot execute a transfer; use a processor to bridge engines",
                )),
                MarkerKind::Select => Err(RelationError::engine(
                    "select markers belong to SQL-engine trees",
                )),
            },
            RelationView::Unary { operation, target } => {
                let rows = self.execute_rows(target)?;
                self.apply_operation(operation, rows)
            }
            RelationView::Binary {
                operation,
                lhs,
                rhs,
            } => match operation {
                BinaryOperation::Chain => {
                    let left = self.execute_rows(lhs)?.stream()?;
                    let right = self.execute_rows(rhs)?.stream()?;
                    Ok(RowIterable::generator(left.chain(right)))
                }
                BinaryOperation::Join { .. } => Err(RelationError::not_implemented(
                    "the iteration engine does not realize joins",
                )),
            },
        }
    }

    fn apply_operation<T: ColumnTag>(
        &self,
        operation: &UnaryOperation<T>,
        rows: RowIterable<T>,
    ) -> Result<RowIterable<T>> {
        match operation {
            UnaryOperation::Selection { predicate } => {
                let functions = self.functions.clone();
                let predicate = predicate.clone();
                let stream = rows.stream()?;
                Ok(RowIterable::generator(stream.filter_map(move |item| {
                    match item {
                        Err(err) => Some(Err(err)),
                        Ok(row) => match eval_predicate(&functions, &predicate, &row) {
                            Ok(true) => Some(Ok(row)),
                            Ok(false) => None,
                            Err(err) => Some(Err(err)),
                        },
                    }
                })))
            }
            UnaryOperation::Calculation { tag, expression } => {
                let functions = self.functions.clone();
                let tag = tag.clone();
                let expression = expression.clone();
                let stream = rows.stream()?;
                Ok(RowIterable::generator(stream.map(move |item| {
                    let mut row = item?;
                    let value = eval_expression(&functions, &expression, &row)?;
                    row.insert(tag.clone(), value);
                    Ok(row)
                })))
            }
            UnaryOperation::Projection { columns } => {
                let columns = columns.clone();
                let stream = rows.stream()?;
                Ok(RowIterable::generator(stream.map(move |item| {
                    let mut row = item?;
                    row.retain(|tag, _| columns.contains(tag));
                    Ok(row)
                })))
            }
            UnaryOperation::Deduplication => {
                let collected: Result<Vec<Row<T>>> = rows.stream()?.collect();
                Ok(RowIterable::mapping(collected?))
            }
            UnaryOperation::Sort { terms } => {
                let mut keyed = Vec::new();
                for item in rows.stream()? {
                    let row = item?;
                    let mut key = Vec::with_capacity(terms.len());
                    for term in terms {
                        key.push(eval_expression(&self.functions, &term.expression, &row)?);
                    }
                    keyed.push((key, row));
                }
                let directions: Vec<bool> = terms.iter().map(|term| term.ascending).collect();
                keyed.sort_by(|(a, _), (b, _)| compare_sort_keys(a, b, &directions));
                Ok(RowIterable::sequence(
                    keyed.into_iter().map(|(_, row)| row).collect(),
                ))
            }
            UnaryOperation::Slice { start, stop } => match rows {
                RowIterable::Sequence(seq) => {
                    Ok(RowIterable::Sequence(seq.slice(*start, *stop)))
                }
                other => {
                    let stream = other.stream()?;
                    let skipped = stream.skip(*start);
                    match stop {
                        Some(stop) => {
                            Ok(RowIterable::generator(skipped.take(stop - start)))
                        }
                        None => Ok(RowIterable::generator(skipped)),
                    }
                }
            },
            UnaryOperation::Identity => Ok(rows),
            UnaryOperation::Custom(op) => Err(RelationError::not_implemented(format!(
                "custom operation {} is not realized by the iteration engine",
                op.name()
            ))),
        }
    }

    fn validate_tree<T: ColumnTag>(&self, root: &Relation<T>, relation: &Relation<T>) -> Result<()> {
        if relation.engine() != root.engine() {
            return Err(RelationError::engine(format!(
                "tree spans engines {} and {}; use a processor to bridge them",
                root.engine(),
                relation.engine()
            )));
        }
        match relation.view() {
            RelationView::Leaf { .. } => Ok(()),
            RelationView::Unary { target, .. } => self.validate_tree(root, target),
            RelationView::Binary { lhs, rhs, .. } => {
                self.validate_tree(root, lhs)?;
                self.validate_tree(root, rhs)
            }
            RelationView::Marker { kind, target } => match kind {
                MarkerKind::Transfer => Err(RelationError::engine(
                    "tree contains a transfer; use a processor to bridge engines",
                )),
                MarkerKind::Select => Err(RelationError::engine(
                    "select markers belong to SQL-engine trees",
                )),
                MarkerKind::Materialization { .. } => {
                    if relation.payload().is_some() {
                        Ok(())
                    } else {
                        self.validate_tree(root, target)
                    }
                }
            },
        }
    }
}

impl<T: ColumnTag> Engine<T> for IterationEngine {
    fn name(&self) -> &str {
        &self.name
    }

    fn supports_unary(&self, operation: &UnaryOperation<T>) -> bool {
        !matches!(operation, UnaryOperation::Custom(_))
    }

    fn supports_binary(&self, operation: &BinaryOperation<T>) -> bool {
        matches!(operation, BinaryOperation::Chain)
    }

    fn supports_function(&self, name: &str) -> bool {
        self.functions.supports(name)
    }

    /// The iteration engine executes trees in their built shape, so
    /// conformation is validation only.
    fn conform(&self, relation: &Relation<T>) -> Result<Relation<T>> {
        self.validate_tree(relation, relation)?;
        Ok(relation.clone())
    }

    fn execute(&self, relation: &Relation<T>) -> Result<Payload<T>> {
        self.validate_tree(relation, relation)?;
        Ok(Payload::Rows(self.execute_rows(relation)?))
    }

    fn import_payload(&self, _columns: &std::collections::BTreeSet<T>, payload: Payload<T>) -> Result<Payload<T>> {
        match payload {
            Payload::Rows(rows) => Ok(Payload::Rows(rows.materialized()?)),
            _ => Err(RelationError::engine(format!(
                "engine {} can only import row payloads",
                self.name
            ))),
        }
    }
}

fn compare_sort_keys(a: &[Datum], b: &[Datum], directions: &[bool]) -> Ordering {
    for (index, ascending) in directions.iter().enumerate() {
        let ordering = a[index].cmp(&b[index]);
        let ordering = if *ascending {
            ordering
        } else {
            ordering.reverse()
        };
        if ordering != Ordering::Equal {
            return ordering;
        }
    }
    Ordering::Equal
}

/// Evaluate a scalar expression against one row.
pub fn eval_expression<T: ColumnTag>(
    functions: &FunctionTable,
    expression: &ColumnExpression<T>,
    row: &Row<T>,
) -> Result<Datum> {
    match expression {
        ColumnExpression::Literal(value) => Ok(value.clone()),
        ColumnExpression::Reference(tag) => row.get(tag).cloned().ok_or_else(|| {
            RelationError::execution(
                format!("row is missing column {}", tag.qualified_name()),
                anyhow::anyhow!("incomplete row"),
            )
        }),
        ColumnExpression::Function { name, args } => {
            let mut values = Vec::with_capacity(args.len());
            for arg in args {
                values.push(eval_expression(functions, arg, row)?);
            }
            functions.call(name, &values)
        }
    }
}

/// Evaluate a predicate against one row.
pub fn eval_predicate<T: ColumnTag>(
    functions: &FunctionTable,
    predicate: &Predicate<T>,
    row: &Row<T>,
) -> Result<bool> {
    match predicate {
        Predicate::Literal(value) => Ok(*value),
        Predicate::Reference(tag) => {
            let value = row.get(tag).ok_or_else(|| {
                RelationError::execution(
                    format!("row is missing column {}", tag.qualified_name()),
                    anyhow::anyhow!("incomplete row"),
                )
            })?;
            value.as_bool().ok_or_else(|| {
                RelationError::execution(
                    format!("column {} is not boolean", tag.qualified_name()),
                    anyhow::anyhow!("predicate over non-boolean column"),
                )
            })
        }
        Predicate::Function { name, args } => {
            let mut values = Vec::with_capacity(args.len());
            for arg in args {
                values.push(eval_expression(functions, arg, row)?);
            }
            match functions.call(name, &values)? {
                Datum::Bool(value) => Ok(value),
                other => Err(RelationError::execution(
                    format!("predicate function {name} returned {other}, expected a boolean"),
                    anyhow::anyhow!("non-boolean predicate result"),
                )),
            }
        }
        Predicate::Not(operand) => Ok(!eval_predicate(functions, operand, row)?),
        Predicate::And(operands) => {
            for operand in operands {
                if !eval_predicate(functions, operand, row)? {
                    return Ok(false);
                }
            }
            Ok(true)
        }
        Predicate::Or(operands) => {
            for operand in operands {
                if eval_predicate(functions, operand, row)? {
                    return Ok(true);
                }
            }
            Ok(false)
        }
        Predicate::InContainer { item, container } => {
            let value = eval_expression(functions, item, row)?;
            match container {
                ColumnContainer::Sequence(items) => {
                    for candidate in items {
                        let candidate = eval_expression(functions, candidate, row)?;
                        if datum_eq(&value, &candidate) {
                            return Ok(true);
                        }
                    }
                    Ok(false)
                }
                ColumnContainer::Range { start, stop, step } => match value {
                    Datum::Int(v) => {
                        Ok(v >= *start && v < *stop && (v - start).rem_euclid(*step) == 0)
                    }
                    _ => Ok(false),
                },
            }
        }
    }
}

fn datum_eq(a: &Datum, b: &Datum) -> bool {
    match numeric_pair(a, b) {
        Some((x, y)) => x == y,
        None => a == b,
    }
}

fn numeric_pair(a: &Datum, b: &Datum) -> Option<(f64, f64)> {
    match (a, b) {
        (Datum::Int(x), Datum::Float(F64(y))) => Some((*x as f64, *y)),
        (Datum::Float(F64(x)), Datum::Int(y)) => Some((*x, *y as f64)),
        _ => None,
    }
}

fn call_builtin(name: &str, args: &[Datum]) -> Option<Result<Datum>> {
    match name {
        "eq" | "ne" | "lt" | "le" | "gt" | "ge" => Some(compare_builtin(name, args)),
        "add" | "sub" | "mul" | "div" => Some(arith_builtin(name, args)),
        "neg" | "abs" => Some(unary_builtin(name, args)),
        "not" => Some(match args {
            [Datum::Bool(value)] => Ok(Datum::Bool(!value)),
            _ => Err(bad_arguments(name, args)),
        }),
        _ => None,
    }
}

fn compare_builtin(name: &str, args: &[Datum]) -> Result<Datum> {
    let [a, b] = args else {
        return Err(bad_arguments(name, args));
    };
    let ordering = match numeric_pair(a, b) {
        Some((x, y)) => x
            .partial_cmp(&y)
            .unwrap_or_else(|| F64(x).cmp(&F64(y))),
        None => {
            if std::mem::discriminant(a) != std::mem::discriminant(b) {
                return Err(bad_arguments(name, args));
            }
            a.cmp(b)
        }
    };
    let value = match name {
        "eq" => ordering == Ordering::Equal,
        "ne" => ordering != Ordering::Equal,
        "lt" => ordering == Ordering::Less,
        "le" => ordering != Ordering::Greater,
        "gt" => ordering == Ordering::Greater,
        "ge" => ordering != Ordering::Less,
        _ => unreachable!("checked by caller"),
    };
    Ok(Datum::Bool(value))
}

fn arith_builtin(name: &str, args: &[Datum]) -> Result<Datum> {
    let [a, b] = args else {
        return Err(bad_arguments(name, args));
    };
    match (a, b) {
        (Datum::Int(x), Datum::Int(y)) => {
            let value = match name {
                "add" => x.checked_add(*y),
                "sub" => x.checked_sub(*y),
                "mul" => x.checked_mul(*y),
                "div" => x.checked_div(*y),
                _ => unreachable!("checked by caller"),
            };
            value.map(Datum::Int).ok_or_else(|| {
                RelationError::execution(
                    format!("integer {name} overflowed or divided by zero"),
                    anyhow::anyhow!("{a} {name} {b}"),
                )
            })
        }
        _ => {
            let (x, y) = match numeric_pair(a, b) {
                Some(pair) => pair,
                None => match (a, b) {
                    (Datum::Float(F64(x)), Datum::Float(F64(y))) => (*x, *y),
                    _ => return Err(bad_arguments(name, args)),
                },
            };
            let value = match name {
                "add" => x + y,
                "sub" => x - y,
                "mul" => x * y,
                "div" => x / y,
                _ => unreachable!("checked by caller"),
            };
            Ok(Datum::float(value))
        }
    }
}

fn unary_builtin(name: &str, args: &[Datum]) -> Result<Datum> {
    let [value] = args else {
        return Err(bad_arguments(name, args));
    };
    match (name, value) {
        ("neg", Datum::Int(v)) => Ok(Datum::Int(-v)),
        ("neg", Datum::Float(F64(v))) => Ok(Datum::float(-v)),
        ("abs", Datum::Int(v)) => Ok(Datum::Int(v.abs())),
        ("abs", Datum::Float(F64(v))) => Ok(Datum::float(v.abs())),
        _ => Err(bad_arguments(name, args)),
    }
}

fn bad_arguments(name: &str, args: &[Datum]) -> RelationError {
    let rendered: Vec<String> = args.iter().map(|value| value.to_string()).collect();
    RelationError::execution(
        format!("function {name} cannot be applied to ({})", rendered.join(", ")),
        anyhow::anyhow!("bad argument types"),
    )
}
