//! End-to-end scenarios: conform shapes, emitted SQL, cross-engine
//! processing, and the documented boundary behaviors.

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicUsize, Ordering};

use relalg::iteration::rows::{Row, RowIterable};
use relalg::iteration::IterationEngine;
use relalg::sql::{compile, ScalarColumn, SqlEngine, SqlPayload, SqlTable};
use relalg::{
    BinaryOperation, ColumnExpression, Datum, Engine, EngineRef, MarkerKind, Payload, Predicate,
    Processor, Relation, RelationView, Result, SortTerm, StringTag, UnaryOperation,
};

type Rel = Relation<StringTag>;
type Expr = ColumnExpression<StringTag>;
type Pred = Predicate<StringTag>;

fn tag(name: &str) -> StringTag {
    StringTag::from(name)
}

fn sql_engine() -> EngineRef<StringTag> {
    EngineRef::new(SqlEngine::<ScalarColumn>::new("sql"))
}

fn iteration_engine(name: &str) -> EngineRef<StringTag> {
    EngineRef::new(IterationEngine::new(name))
}

fn table_leaf(engine: &EngineRef<StringTag>, name: &str, columns: &[&str]) -> Rel {
    let table = SqlTable::from_tags(name, columns.iter().map(|c| tag(c)));
    SqlEngine::<ScalarColumn>::make_leaf(engine, table, false, 0, None).unwrap()
}

fn row2(a: i64, b: i64) -> Row<StringTag> {
    [(tag("a"), Datum::Int(a)), (tag("b"), Datum::Int(b))]
        .into_iter()
        .collect()
}

fn lt(column: &str, value: i64) -> Pred {
    Pred::function("lt", vec![Expr::reference(column), Expr::literal(value)])
}

fn emitted_sql(relation: &Rel) -> String {
    let engine = SqlEngine::<ScalarColumn>::new("sql");
    compile(&engine.to_executable(relation).unwrap())
}

fn assert_parses(sql: &str) {
    use sqlparser::dialect::PostgreSqlDialect;
    use sqlparser::parser::Parser;
    Parser::parse_sql(&PostgreSqlDialect {}, sql)
        .unwrap_or_else(|err| panic!("emitted SQL failed to parse: {err}\n{sql}"));
}

fn unwrap_select(relation: &Rel) -> &Rel {
    match relation.view() {
        RelationView::Marker {
            kind: MarkerKind::Select,
            target,
        } => target,
        _ => panic!("expected a select marker, got {relation}"),
    }
}

// S1: a selection over a chain distributes into both branches and emits
// a UNION ALL with the predicate repeated per branch.
#[test]
fn selection_distributes_through_chain() {
    let engine = sql_engine();
    let a = table_leaf(&engine, "a", &["x", "y"]);
    let b = table_leaf(&engine, "b", &["x", "y"]);
    let tree = a.chain(&b).unwrap().filtered(lt("x", 5)).unwrap();

    let conformed = engine.conform(&tree).unwrap();
    assert_eq!(conformed.columns(), tree.columns());
    let chain = unwrap_select(&conformed);
    match chain.view() {
        RelationView::Binary {
            operation: BinaryOperation::Chain,
            lhs,
            rhs,
        } => {
            for (branch, leaf) in [(lhs, &a), (rhs, &b)] {
                match unwrap_select(branch).view() {
                    RelationView::Unary { operation, target } => {
                        assert!(matches!(operation, UnaryOperation::Selection { .. }));
                        assert!(Relation::same(target, leaf));
                    }
                    _ => panic!("expected a selection in each branch"),
                }
            }
        }
        _ => panic!("expected a chain under the select marker"),
    }

    let sql = emitted_sql(&tree);
    assert_parses(&sql);
    let (first, second) = sql.split_once("UNION ALL").expect("a union of branches");
    assert!(first.contains("FROM a AS t0"));
    assert!(first.contains("WHERE t0.x < 5"));
    assert!(second.contains("FROM b AS t0"));
    assert!(second.contains("WHERE t0.x < 5"));
}

// S2: a calculation over a chain distributes when every branch covers
// its inputs.
#[test]
fn calculation_distributes_through_chain() {
    let engine = sql_engine();
    let a = table_leaf(&engine, "a", &["x"]);
    let b = table_leaf(&engine, "b", &["x"]);
    let tree = a
        .chain(&b)
        .unwrap()
        .calculated(
            tag("doubled"),
            Expr::function("mul", vec![Expr::reference("x"), Expr::literal(2i64)]),
        )
        .unwrap();

    let conformed = engine.conform(&tree).unwrap();
    assert_eq!(conformed.columns(), tree.columns());
    match unwrap_select(&conformed).view() {
        RelationView::Binary {
            operation: BinaryOperation::Chain,
            lhs,
            rhs,
        } => {
            for branch in [lhs, rhs] {
                assert!(branch.columns().contains(&tag("doubled")));
            }
        }
        _ => panic!("expected a chain under the select marker"),
    }

    let sql = emitted_sql(&tree);
    assert_parses(&sql);
    assert_eq!(sql.matches("t0.x * 2 AS doubled").count(), 2);
}

// S3: deduplicating a relation bounded to at most one row returns the
// very same node.
#[test]
fn dedup_of_single_row_relation_is_identity() {
    let engine = iteration_engine("iter");
    let leaf = IterationEngine::make_leaf(
        &engine,
        "t",
        [tag("a"), tag("b")],
        RowIterable::sequence(vec![row2(1, 10), row2(2, 20)]),
    )
    .unwrap();
    let single = leaf.sliced(0, Some(1)).unwrap();
    assert_eq!(single.max_rows(), Some(1));
    let dedup = single.distinct().unwrap();
    assert!(Relation::same(&dedup, &single));
}

// S4: a projection over a sort bubbles the sort outward; the emitted
// statement orders by the hidden column while selecting only the
// projected one.
#[test]
fn sort_bubbles_past_projection() {
    let engine = sql_engine();
    let leaf = table_leaf(&engine, "points", &["x", "y"]);
    let tree = leaf
        .sorted(vec![SortTerm::ascending(Expr::reference("x"))])
        .unwrap()
        .project([tag("y")])
        .unwrap();

    let conformed = engine.conform(&tree).unwrap();
    let expected: BTreeSet<StringTag> = [tag("y")].into_iter().collect();
    assert_eq!(conformed.columns(), &expected);
    match unwrap_select(&conformed).view() {
        RelationView::Unary { operation, .. } => {
            assert!(matches!(operation, UnaryOperation::Sort { .. }));
        }
        _ => panic!("expected the sort at the top of the conformed stack"),
    }

    let sql = emitted_sql(&tree);
    assert_parses(&sql);
    assert!(sql.starts_with("SELECT t0.y AS y "));
    assert!(sql.contains("ORDER BY t0.x ASC"));
}

/// Wraps the iteration engine and counts how often `execute` runs.
#[derive(Debug)]
struct CountingEngine {
    inner: IterationEngine,
    executions: AtomicUsize,
}

impl CountingEngine {
    fn new() -> Self {
        CountingEngine {
            inner: IterationEngine::new("counted"),
            executions: AtomicUsize::new(0),
        }
    }
}

impl Engine<StringTag> for CountingEngine {
    fn name(&self) -> &str {
        Engine::<StringTag>::name(&self.inner)
    }

    fn supports_unary(&self, operation: &UnaryOperation<StringTag>) -> bool {
        self.inner.supports_unary(operation)
    }

    fn supports_binary(&self, operation: &BinaryOperation<StringTag>) -> bool {
        self.inner.supports_binary(operation)
    }

    fn supports_function(&self, name: &str) -> bool {
        Engine::<StringTag>::supports_function(&self.inner, name)
    }

    fn conform(&self, relation: &Rel) -> Result<Rel> {
        self.inner.conform(relation)
    }

    fn execute(&self, relation: &Rel) -> Result<Payload<StringTag>> {
        self.executions.fetch_add(1, Ordering::SeqCst);
        self.inner.execute(relation)
    }
}

struct NoTransfers;

impl Processor<StringTag> for NoTransfers {
    fn transfer(
        &self,
        _source: &Rel,
        _destination: &EngineRef<StringTag>,
        _payload: Payload<StringTag>,
    ) -> Result<Payload<StringTag>> {
        panic!("no transfers expected in this scenario");
    }
}

// S5: processing the same materialization twice executes the engine
// exactly once; the payload is cached on the marker.
#[test]
fn materialization_caches_across_process_calls() {
    let counting = EngineRef::new(CountingEngine::new());
    let leaf = IterationEngine::make_leaf(
        &counting,
        "t",
        [tag("a"), tag("b")],
        RowIterable::sequence(vec![row2(2, 20), row2(1, 10), row2(2, 20)]),
    )
    .unwrap();
    let mat = leaf.distinct().unwrap().materialized("cache").unwrap();

    assert!(mat.payload().is_none());
    let first = NoTransfers.process(&mat).unwrap();
    assert!(mat.payload().is_some());
    let second = NoTransfers.process(&mat).unwrap();

    let first_rows = first.rows().unwrap().collect_rows().unwrap();
    let second_rows = second.rows().unwrap().collect_rows().unwrap();
    assert_eq!(first_rows, second_rows);
    assert_eq!(first_rows.len(), 2);
}

// S5, counted directly: the engine's execute is invoked exactly once no
// matter how many times the tree is processed.
#[test]
fn materialization_executes_engine_once() {
    let engine_impl = std::sync::Arc::new(CountingEngine::new());
    let counting = EngineRef::from_arc(engine_impl.clone());
    let leaf = IterationEngine::make_leaf(
        &counting,
        "t",
        [tag("a"), tag("b")],
        RowIterable::sequence(vec![row2(1, 10), row2(1, 10)]),
    )
    .unwrap();
    let mat = leaf.distinct().unwrap().materialized("cache").unwrap();

    NoTransfers.process(&mat).unwrap();
    NoTransfers.process(&mat).unwrap();
    NoTransfers.process(&mat).unwrap();
    assert_eq!(engine_impl.executions.load(Ordering::SeqCst), 1);
}

/// Bridges the SQL and iteration engines by pretending to run the
/// emitted statement against a database.
struct FakeDatabase {
    rows: Vec<Row<StringTag>>,
    statements: AtomicUsize,
}

impl Processor<StringTag> for FakeDatabase {
    fn transfer(
        &self,
        _source: &Rel,
        destination: &EngineRef<StringTag>,
        payload: Payload<StringTag>,
    ) -> Result<Payload<StringTag>> {
        let statement = match payload.select() {
            Some(SqlPayload::Statement(query)) => compile(query),
            _ => panic!("the SQL engine should hand over an executable"),
        };
        assert!(statement.contains("JOIN"));
        self.statements.fetch_add(1, Ordering::SeqCst);
        destination.import_payload(
            &BTreeSet::new(),
            Payload::Rows(RowIterable::sequence(self.rows.clone())),
        )
    }
}

// S6: a SQL join behind a transfer executes on the SQL side, its rows
// import into the iteration engine, and a downstream sort runs there.
#[test]
fn cross_engine_transfer_and_sort() {
    let sql = sql_engine();
    let iter = iteration_engine("iter");
    let orders = table_leaf(&sql, "orders", &["a", "b"]);
    let labels = table_leaf(&sql, "labels", &["b"]);
    let joined = orders.join(&labels, Pred::literal(true)).unwrap();
    let moved = joined.transferred_to(&iter).unwrap();
    let sorted = moved
        .sorted(vec![SortTerm::ascending(Expr::reference("a"))])
        .unwrap();

    let database = FakeDatabase {
        rows: vec![row2(3, 30), row2(1, 10), row2(2, 20)],
        statements: AtomicUsize::new(0),
    };
    let payload = database.process(&sorted).unwrap();
    assert_eq!(database.statements.load(Ordering::SeqCst), 1);
    let values: Vec<i64> = payload
        .rows()
        .unwrap()
        .collect_rows()
        .unwrap()
        .iter()
        .map(|row| row[&tag("a")].as_int().unwrap())
        .collect();
    assert_eq!(values, [1, 2, 3]);
}

#[test]
fn slice_with_equal_bounds_yields_zero_rows_and_same_columns() {
    let engine = iteration_engine("iter");
    let leaf = IterationEngine::make_leaf(
        &engine,
        "t",
        [tag("a"), tag("b")],
        RowIterable::sequence(vec![row2(1, 10), row2(2, 20)]),
    )
    .unwrap();
    let empty = leaf.sliced(1, Some(1)).unwrap();
    assert_eq!(empty.columns(), leaf.columns());
    assert_eq!(empty.max_rows(), Some(0));
    let payload = engine.execute(&empty).unwrap();
    assert!(payload.rows().unwrap().collect_rows().unwrap().is_empty());
}

#[test]
fn empty_sort_is_identity_everywhere() {
    let iter = iteration_engine("iter");
    let rows_leaf = IterationEngine::make_leaf(
        &iter,
        "t",
        [tag("a"), tag("b")],
        RowIterable::sequence(vec![row2(1, 10)]),
    )
    .unwrap();
    assert!(Relation::same(&rows_leaf.sorted(vec![]).unwrap(), &rows_leaf));

    let sql = sql_engine();
    let table = table_leaf(&sql, "t", &["x"]);
    assert!(Relation::same(&table.sorted(vec![]).unwrap(), &table));
}

#[test]
fn empty_logical_connectives() {
    let engine = iteration_engine("iter");
    let leaf = IterationEngine::make_leaf(
        &engine,
        "t",
        [tag("a"), tag("b")],
        RowIterable::sequence(vec![row2(1, 10), row2(2, 20)]),
    )
    .unwrap();

    // Empty AND is true: the selection is the identity.
    let all = leaf.filtered(Pred::and(vec![])).unwrap();
    assert!(Relation::same(&all, &leaf));

    // Empty OR is false: every row is filtered out.
    let none = leaf.filtered(Pred::or(vec![])).unwrap();
    let payload = engine.execute(&none).unwrap();
    assert!(payload.rows().unwrap().collect_rows().unwrap().is_empty());
}

#[test]
fn conform_preserves_columns_on_compound_trees() {
    let engine = sql_engine();
    let a = table_leaf(&engine, "a", &["x", "y"]);
    let b = table_leaf(&engine, "b", &["y", "z"]);
    let tree = a
        .join(&b, Pred::literal(true))
        .unwrap()
        .calculated(
            tag("s"),
            Expr::function("add", vec![Expr::reference("x"), Expr::reference("z")]),
        )
        .unwrap()
        .filtered(lt("s", 100))
        .unwrap()
        .project([tag("s"), tag("y")])
        .unwrap()
        .distinct()
        .unwrap()
        .sorted(vec![SortTerm::descending(Expr::reference("s"))])
        .unwrap()
        .sliced(0, Some(10))
        .unwrap();

    let conformed = engine.conform(&tree).unwrap();
    assert_eq!(conformed.columns(), tree.columns());
    assert_eq!(conformed.is_unique(), tree.is_unique());

    let sql = emitted_sql(&tree);
    assert_parses(&sql);
    assert!(sql.contains("JOIN"));
    assert!(sql.contains("DISTINCT"));
    assert!(sql.contains("ORDER BY"));
    assert!(sql.contains("LIMIT 10"));
}

#[test]
fn emitted_union_with_sort_and_slice_parses() {
    let engine = sql_engine();
    let a = table_leaf(&engine, "a", &["x"]);
    let b = table_leaf(&engine, "b", &["x"]);
    let tree = a
        .chain(&b)
        .unwrap()
        .distinct()
        .unwrap()
        .sorted(vec![SortTerm::ascending(Expr::reference("x"))])
        .unwrap()
        .sliced(2, Some(7))
        .unwrap();
    let sql = emitted_sql(&tree);
    assert_parses(&sql);
    assert!(sql.contains("UNION SELECT"));
    assert!(sql.contains("ORDER BY x ASC"));
    assert!(sql.contains("LIMIT 5"));
    assert!(sql.contains("OFFSET 2"));
}
