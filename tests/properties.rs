//! Property-based checks of the algebraic invariants.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use proptest::prelude::*;

use relalg::iteration::rows::{Row, RowIterable};
use relalg::iteration::IterationEngine;
use relalg::sql::{compile, ScalarColumn, SqlEngine, SqlTable};
use relalg::{
    ColumnExpression, Datum, Engine, EngineRef, Predicate, Relation, SortTerm, StringTag,
};

type Rel = Relation<StringTag>;
type Expr = ColumnExpression<StringTag>;
type Pred = Predicate<StringTag>;

fn tag(name: &str) -> StringTag {
    StringTag::from(name)
}

fn row2(a: i64, b: i64) -> Row<StringTag> {
    [(tag("a"), Datum::Int(a)), (tag("b"), Datum::Int(b))]
        .into_iter()
        .collect()
}

fn rows_leaf(rows: &[(i64, i64)]) -> (EngineRef<StringTag>, Rel) {
    let engine: EngineRef<StringTag> = EngineRef::new(IterationEngine::new("iter"));
    let rows = rows.iter().map(|(a, b)| row2(*a, *b)).collect();
    let leaf = IterationEngine::make_leaf(
        &engine,
        "t",
        [tag("a"), tag("b")],
        RowIterable::sequence(rows),
    )
    .unwrap();
    (engine, leaf)
}

fn collect(engine: &EngineRef<StringTag>, relation: &Rel) -> Vec<Row<StringTag>> {
    engine
        .execute(relation)
        .unwrap()
        .rows()
        .unwrap()
        .collect_rows()
        .unwrap()
}

fn lt(column: &str, value: i64) -> Pred {
    Pred::function("lt", vec![Expr::reference(column), Expr::literal(value)])
}

fn hash_of(relation: &Rel) -> u64 {
    let mut hasher = DefaultHasher::new();
    relation.hash(&mut hasher);
    hasher.finish()
}

fn rows_strategy() -> impl Strategy<Value = Vec<(i64, i64)>> {
    prop::collection::vec((0i64..5, 0i64..5), 0..12)
}

proptest! {
    // Selection(p, Selection(q, R)) equals Selection(p AND q, R).
    #[test]
    fn selection_conjunction(rows in rows_strategy(), c1 in 0i64..6, c2 in 0i64..6) {
        let (engine, leaf) = rows_leaf(&rows);
        let stacked = leaf
            .filtered(lt("a", c1))
            .unwrap()
            .filtered(lt("b", c2))
            .unwrap();
        let merged = leaf
            .filtered(Pred::and(vec![lt("a", c1), lt("b", c2)]))
            .unwrap();
        let expected: Vec<Row<StringTag>> = rows
            .iter()
            .filter(|(a, b)| *a < c1 && *b < c2)
            .map(|(a, b)| row2(*a, *b))
            .collect();
        prop_assert_eq!(&collect(&engine, &stacked), &expected);
        prop_assert_eq!(&collect(&engine, &merged), &expected);
    }

    // Chain is associative on row sequences.
    #[test]
    fn chain_associativity(
        xs in rows_strategy(),
        ys in rows_strategy(),
        zs in rows_strategy(),
    ) {
        let (engine, x) = rows_leaf(&xs);
        let y = IterationEngine::make_leaf(
            &engine,
            "y",
            [tag("a"), tag("b")],
            RowIterable::sequence(ys.iter().map(|(a, b)| row2(*a, *b)).collect()),
        )
        .unwrap();
        let z = IterationEngine::make_leaf(
            &engine,
            "z",
            [tag("a"), tag("b")],
            RowIterable::sequence(zs.iter().map(|(a, b)| row2(*a, *b)).collect()),
        )
        .unwrap();
        let left = x.chain(&y).unwrap().chain(&z).unwrap();
        let right = x.chain(&y.chain(&z).unwrap()).unwrap();
        prop_assert_eq!(collect(&engine, &left), collect(&engine, &right));
    }

    // Deduplication is idempotent and keeps first occurrences in order.
    #[test]
    fn dedup_idempotent(rows in rows_strategy()) {
        let (engine, leaf) = rows_leaf(&rows);
        let distinct = leaf.distinct().unwrap();
        // A second dedup is the identity on the node itself.
        let twice = distinct.distinct().unwrap();
        prop_assert!(Relation::same(&twice, &distinct));

        let mut expected: Vec<Row<StringTag>> = Vec::new();
        for (a, b) in &rows {
            let row = row2(*a, *b);
            if !expected.contains(&row) {
                expected.push(row);
            }
        }
        prop_assert_eq!(collect(&engine, &distinct), expected);
    }

    // Projection composes: dropping to {a} via {a, b} equals dropping
    // directly.
    #[test]
    fn projection_composes(rows in rows_strategy()) {
        let (engine, leaf) = rows_leaf(&rows);
        let direct = leaf.project([tag("a")]).unwrap();
        let via = leaf
            .project([tag("a"), tag("b")])
            .unwrap()
            .project([tag("a")])
            .unwrap();
        prop_assert_eq!(&via, &direct);
        prop_assert_eq!(collect(&engine, &via), collect(&engine, &direct));
    }

    // Slicing matches the positional window of the row sequence.
    #[test]
    fn slice_window(rows in rows_strategy(), start in 0usize..14, extra in 0usize..14) {
        let (engine, leaf) = rows_leaf(&rows);
        let stop = start + extra;
        let sliced = leaf.sliced(start, Some(stop)).unwrap();
        let expected: Vec<Row<StringTag>> = rows
            .iter()
            .skip(start)
            .take(extra)
            .map(|(a, b)| row2(*a, *b))
            .collect();
        prop_assert_eq!(collect(&engine, &sliced), expected);
    }

    // Sorting is stable: rows with equal keys keep their input order.
    #[test]
    fn sort_stability(rows in rows_strategy()) {
        let (engine, leaf) = rows_leaf(&rows);
        let sorted = leaf
            .sorted(vec![SortTerm::ascending(Expr::reference("a"))])
            .unwrap();
        let mut expected: Vec<Row<StringTag>> =
            rows.iter().map(|(a, b)| row2(*a, *b)).collect();
        expected.sort_by_key(|row| row[&tag("a")].clone());
        prop_assert_eq!(collect(&engine, &sorted), expected);
    }

    // Structurally equal trees are equal and hash equal.
    #[test]
    fn structural_equality_and_hash(rows in rows_strategy(), c in 0i64..6) {
        let (_, leaf_one) = rows_leaf(&rows);
        let (_, leaf_two) = rows_leaf(&rows);
        // Different engine objects make the trees distinct...
        prop_assert_ne!(&leaf_one, &leaf_two);
        // ...but the same leaf built on twice yields equal trees.
        let one = leaf_one.filtered(lt("a", c)).unwrap().distinct().unwrap();
        let two = leaf_one.filtered(lt("a", c)).unwrap().distinct().unwrap();
        prop_assert_eq!(&one, &two);
        prop_assert_eq!(hash_of(&one), hash_of(&two));
    }

    // SQL conformation never changes the observable column set, and the
    // emitted statement always parses.
    #[test]
    fn sql_conform_stable_and_parseable(
        c1 in 0i64..100,
        c2 in 0i64..100,
        start in 0usize..5,
        extra in 1usize..10,
    ) {
        let engine: EngineRef<StringTag> =
            EngineRef::new(SqlEngine::<ScalarColumn>::new("sql"));
        let table = SqlTable::from_tags("points", [tag("x"), tag("y")]);
        let leaf = SqlEngine::<ScalarColumn>::make_leaf(&engine, table, false, 0, None).unwrap();
        let tree = leaf
            .filtered(lt("x", c1))
            .unwrap()
            .calculated(
                tag("s"),
                Expr::function("add", vec![Expr::reference("x"), Expr::reference("y")]),
            )
            .unwrap()
            .filtered(lt("s", c2))
            .unwrap()
            .project([tag("s"), tag("y")])
            .unwrap()
            .sorted(vec![SortTerm::descending(Expr::reference("s"))])
            .unwrap()
            .sliced(start, Some(start + extra))
            .unwrap();

        let conformed = engine.conform(&tree).unwrap();
        prop_assert_eq!(conformed.columns(), tree.columns());
        // Conforming twice changes nothing.
        let again = engine.conform(&conformed).unwrap();
        prop_assert!(Relation::same(&again, &conformed));

        let emitter = SqlEngine::<ScalarColumn>::new("sql");
        let sql = compile(&emitter.to_executable(&tree).unwrap());
        use sqlparser::dialect::PostgreSqlDialect;
        use sqlparser::parser::Parser;
        prop_assert!(Parser::parse_sql(&PostgreSqlDialect {}, &sql).is_ok(), "unparseable: {}", sql);
    }
}
