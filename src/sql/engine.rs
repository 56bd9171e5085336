//! The SQL engine type, its logical-column parameterization, and the
//! emission of executables from conformed trees.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::marker::PhantomData;

use crate::engine::{Engine, EngineRef, Payload};
use crate::error::{RelationError, Result};
use crate::expr::{ColumnContainer, ColumnExpression, Predicate};
use crate::operation::{BinaryOperation, MarkerKind, UnaryOperation};
use crate::relation::{Relation, RelationView};
use crate::tag::ColumnTag;

use super::ast::{
    BinaryOperator, Join, OrderByExpr, SelectItem, SelectQuery, SqlExpr, TableRef, UnaryOperator,
};
use super::conform::{self, Layers, Source};

/// A base table in the database: the payload of a SQL leaf relation.
#[derive(Debug, Clone)]
pub struct SqlTable<T: ColumnTag> {
    pub name: String,
    /// Column name in the table, per tag.
    pub columns: BTreeMap<T, String>,
}

impl<T: ColumnTag> SqlTable<T> {
    pub fn new(name: impl Into<String>, columns: impl IntoIterator<Item = (T, String)>) -> Self {
        SqlTable {
            name: name.into(),
            columns: columns.into_iter().collect(),
        }
    }

    /// A table whose column names are the tags' qualified names.
    pub fn from_tags(name: impl Into<String>, tags: impl IntoIterator<Item = T>) -> Self {
        SqlTable {
            name: name.into(),
            columns: tags
                .into_iter()
                .map(|tag| {
                    let column = tag.qualified_name();
                    (tag, column)
                })
                .collect(),
        }
    }
}

/// The SQL engine's payload: a base table, or an emitted statement.
#[derive(Debug, Clone)]
pub enum SqlPayload<T: ColumnTag> {
    Table(SqlTable<T>),
    Statement(SelectQuery),
}

/// The representation of one column tag inside emitted expressions.
///
/// The default, [`ScalarColumn`], is a single backend column element. A
/// host whose logical columns span several underlying columns (a region
/// encoded as two bounds, say) substitutes its own implementation and
/// overrides these hooks; everything is resolved at compile time, so no
/// per-column dynamic dispatch is paid.
pub trait LogicalColumn<T: ColumnTag>: Clone + fmt::Debug + Send + Sync + 'static {
    /// Wrap the named column of a FROM-clause source.
    fn from_source(source: Option<&str>, column: &str) -> Self;

    /// Wrap a computed scalar expression.
    fn from_expr(expr: SqlExpr) -> Self;

    /// The SELECT-list items for this logical column, labeled for `tag`.
    fn select_items(&self, tag: &T) -> Vec<SelectItem>;

    /// A single scalar expression, for predicates and sort keys.
    fn scalar(&self) -> Result<SqlExpr>;

    /// Equality with the same tag's logical column from another source,
    /// for equi-join constraints.
    fn join_eq(&self, other: &Self) -> Result<SqlExpr>;
}

/// The default logical column: exactly one backend column element.
#[derive(Debug, Clone)]
pub struct ScalarColumn(pub SqlExpr);

impl<T: ColumnTag> LogicalColumn<T> for ScalarColumn {
    fn from_source(source: Option<&str>, column: &str) -> Self {
        ScalarColumn(SqlExpr::column(source, column))
    }

    fn from_expr(expr: SqlExpr) -> Self {
        ScalarColumn(expr)
    }

    fn select_items(&self, tag: &T) -> Vec<SelectItem> {
        vec![SelectItem::aliased(self.0.clone(), tag.qualified_name())]
    }

    fn scalar(&self) -> Result<SqlExpr> {
        Ok(self.0.clone())
    }

    fn join_eq(&self, other: &Self) -> Result<SqlExpr> {
        Ok(SqlExpr::binary(
            self.0.clone(),
            BinaryOperator::Eq,
            other.0.clone(),
        ))
    }
}

/// The SQL execution engine.
///
/// Parametric over the logical-column representation `L`; the default is
/// a single column element per tag.
pub struct SqlEngine<L = ScalarColumn> {
    name: String,
    _logical: PhantomData<fn() -> L>,
}

impl<L> SqlEngine<L> {
    pub fn new(name: impl Into<String>) -> Self {
        SqlEngine {
            name: name.into(),
            _logical: PhantomData,
        }
    }

    /// Create a leaf relation over a base table.
    pub fn make_leaf<T: ColumnTag>(
        engine: &EngineRef<T>,
        table: SqlTable<T>,
        unique: bool,
        min_rows: usize,
        max_rows: Option<usize>,
    ) -> Result<Relation<T>> {
        let tags: Vec<T> = table.columns.keys().cloned().collect();
        Relation::leaf(
            table.name.clone(),
            engine,
            tags,
            unique,
            min_rows,
            max_rows,
            Payload::Select(SqlPayload::Table(table)),
        )
    }
}

impl<L> fmt::Debug for SqlEngine<L> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SqlEngine").field("name", &self.name).finish()
    }
}

impl<L> SqlEngine<L> {
    /// Convert a relation tree to an executable SELECT (or UNION of
    /// SELECTs), conforming it first if necessary.
    ///
    /// Materializations must already carry payloads and transfers must
    /// already be bridged; a `Processor` handles both.
    pub fn to_executable<T: ColumnTag>(&self, relation: &Relation<T>) -> Result<SelectQuery>
    where
        L: LogicalColumn<T>,
    {
        let conformed = conform::conform(relation)?;
        self.emit_conformed(&conformed)
    }

    fn emit_conformed<T: ColumnTag>(&self, relation: &Relation<T>) -> Result<SelectQuery>
    where
        L: LogicalColumn<T>,
    {
        match relation.view() {
            RelationView::Leaf { .. } => self.build_query(
                Layers::from_source(relation.clone()),
                relation.columns(),
            ),
            RelationView::Marker { kind, target } => match kind {
                MarkerKind::Select => {
                    let layers = conform::gather(target)?;
                    self.build_query(layers, relation.columns())
                }
                MarkerKind::Materialization { name } => match relation.payload() {
                    Some(Payload::Select(SqlPayload::Statement(query))) => Ok(query.clone()),
                    Some(Payload::Select(SqlPayload::Table(_))) => self.build_query(
                        Layers::from_source(relation.clone()),
                        relation.columns(),
                    ),
                    Some(_) => Err(RelationError::engine(format!(
                        "materialization {name} holds a non-SQL payload"
                    ))),
                    None => Err(RelationError::engine(format!(
                        "materialization {name} has no payload; process the tree first"
                    ))),
                },
                MarkerKind::Transfer => Err(RelationError::engine(
                    "cannot emit SQL across a transfer; use a processor first",
                )),
            },
            _ => {
                let conformed = conform::conform(relation)?;
                self.emit_conformed(&conformed)
            }
        }
    }

    fn build_query<T: ColumnTag>(
        &self,
        layers: Layers<T>,
        final_columns: &BTreeSet<T>,
    ) -> Result<SelectQuery>
    where
        L: LogicalColumn<T>,
    {
        if let Source::Chain(branches) = &layers.source {
            return self.build_union(&layers, branches, final_columns);
        }

        let (members, conditions) = match layers.source {
            Source::Single(relation) => (vec![relation], Vec::new()),
            Source::Join {
                members,
                conditions,
            } => (members, conditions),
            Source::Chain(_) => unreachable!("handled above"),
        };

        let mut alias_counter = 0usize;
        let mut columns_available: BTreeMap<T, L> = BTreeMap::new();
        let mut from = Vec::new();
        let mut joins = Vec::new();
        for (index, member) in members.iter().enumerate() {
            let (table_ref, member_columns) = self.member_source(member, &mut alias_counter)?;
            if index == 0 {
                from.push(table_ref);
            } else {
                // Common columns with everything gathered so far become
                // the equi-join constraint.
                let mut on_terms = Vec::new();
                for (tag, logical) in &member_columns {
                    if let Some(existing) = columns_available.get(tag) {
                        on_terms.push(existing.join_eq(logical)?);
                    }
                }
                let on = SqlExpr::and_all(on_terms).unwrap_or_else(|| SqlExpr::literal(true));
                joins.push(Join {
                    table: table_ref,
                    on: Some(on),
                });
            }
            for (tag, logical) in member_columns {
                columns_available.entry(tag).or_insert(logical);
            }
        }

        for (tag, expression) in &layers.calculations {
            let lowered = self.lower_expression(expression, &columns_available)?;
            columns_available.insert(tag.clone(), L::from_expr(lowered));
        }

        let mut where_terms = Vec::new();
        for predicate in conditions.iter().chain(layers.selections.iter()) {
            where_terms.push(self.lower_predicate(predicate, &columns_available)?);
        }

        let mut projections = Vec::new();
        for tag in final_columns {
            let logical = columns_available.get(tag).ok_or_else(|| {
                RelationError::invariant(format!(
                    "column {} is not available in the emitted statement",
                    tag.qualified_name()
                ))
            })?;
            projections.extend(logical.select_items(tag));
        }
        // A SELECT cannot be column-free; emit an ignored literal.
        if projections.is_empty() {
            projections.push(SelectItem::aliased(SqlExpr::literal(true), "ignored"));
        }

        let mut order_by = Vec::new();
        for term in &layers.sort {
            order_by.push(OrderByExpr {
                expr: self.lower_expression(&term.expression, &columns_available)?,
                asc: term.ascending,
            });
        }

        let (limit, offset) = slice_bounds(layers.slice);
        Ok(SelectQuery {
            distinct: layers.dedup,
            projections,
            from,
            joins,
            filter: SqlExpr::and_all(where_terms),
            set_op: None,
            order_by,
            limit,
            offset,
        })
    }

    fn build_union<T: ColumnTag>(
        &self,
        layers: &Layers<T>,
        branches: &[Relation<T>],
        final_columns: &BTreeSet<T>,
    ) -> Result<SelectQuery>
    where
        L: LogicalColumn<T>,
    {
        if !layers.selections.is_empty()
            || !layers.calculations.is_empty()
            || layers.projection.is_some()
        {
            return Err(RelationError::invariant(
                "conformed chains carry no per-row operations of their own",
            ));
        }
        let mut queries = Vec::with_capacity(branches.len());
        for branch in branches {
            queries.push(self.emit_conformed(branch)?);
        }
        let mut iter = queries.into_iter();
        let mut query = iter
            .next()
            .ok_or_else(|| RelationError::invariant("a chain must have at least one branch"))?;
        // A deduplicated chain is a plain UNION; otherwise UNION ALL.
        for right in iter {
            query = query.union(right, !layers.dedup);
        }
        // ORDER BY on a union refers to output labels.
        let label_columns: BTreeMap<T, L> = final_columns
            .iter()
            .map(|tag| {
                let logical = L::from_source(None, &tag.qualified_name());
                (tag.clone(), logical)
            })
            .collect();
        for term in &layers.sort {
            query.order_by.push(OrderByExpr {
                expr: self.lower_expression(&term.expression, &label_columns)?,
                asc: term.ascending,
            });
        }
        let (limit, offset) = slice_bounds(layers.slice);
        query.limit = limit;
        query.offset = offset;
        Ok(query)
    }

    /// Resolve one FROM-clause member to a table reference and its
    /// column map. Every member gets a distinct alias so self-joins and
    /// repeated subqueries stay unambiguous.
    fn member_source<T: ColumnTag>(
        &self,
        member: &Relation<T>,
        alias_counter: &mut usize,
    ) -> Result<(TableRef, Vec<(T, L)>)>
    where
        L: LogicalColumn<T>,
    {
        let alias = format!("t{}", *alias_counter);
        *alias_counter += 1;
        match member.view() {
            RelationView::Leaf { name } => match member.payload() {
                Some(Payload::Select(SqlPayload::Table(table))) => {
                    let columns = table
                        .columns
                        .iter()
                        .map(|(tag, column)| {
                            (tag.clone(), L::from_source(Some(&alias), column))
                        })
                        .collect();
                    Ok((
                        TableRef::Table {
                            name: table.name.clone(),
                            alias: Some(alias),
                        },
                        columns,
                    ))
                }
                Some(Payload::Select(SqlPayload::Statement(query))) => {
                    Ok((
                        TableRef::Subquery {
                            query: Box::new(query.clone()),
                            alias: alias.clone(),
                        },
                        qualified_columns(member, &alias),
                    ))
                }
                _ => Err(RelationError::engine(format!(
                    "leaf {name} does not hold a SQL payload"
                ))),
            },
            RelationView::Marker { kind, .. } => match kind {
                MarkerKind::Select | MarkerKind::Materialization { .. } => {
                    let query = self.emit_conformed(member)?;
                    Ok((
                        TableRef::Subquery {
                            query: Box::new(query),
                            alias: alias.clone(),
                        },
                        qualified_columns(member, &alias),
                    ))
                }
                MarkerKind::Transfer => Err(RelationError::engine(
                    "cannot emit SQL across a transfer; use a processor first",
                )),
            },
            _ => Err(RelationError::invariant(
                "join members of a conformed tree are leaves, markers, or subqueries",
            )),
        }
    }

    fn lower_expression<T: ColumnTag>(
        &self,
        expression: &ColumnExpression<T>,
        columns: &BTreeMap<T, L>,
    ) -> Result<SqlExpr>
    where
        L: LogicalColumn<T>,
    {
        match expression {
            ColumnExpression::Literal(value) => Ok(SqlExpr::Literal(value.clone())),
            ColumnExpression::Reference(tag) => lookup(columns, tag)?.scalar(),
            ColumnExpression::Function { name, args } => {
                let mut lowered = Vec::with_capacity(args.len());
                for arg in args {
                    lowered.push(self.lower_expression(arg, columns)?);
                }
                Ok(lower_function(name, lowered))
            }
        }
    }

    fn lower_predicate<T: ColumnTag>(
        &self,
        predicate: &Predicate<T>,
        columns: &BTreeMap<T, L>,
    ) -> Result<SqlExpr>
    where
        L: LogicalColumn<T>,
    {
        match predicate {
            Predicate::Literal(value) => Ok(SqlExpr::literal(*value)),
            Predicate::Reference(tag) => lookup(columns, tag)?.scalar(),
            Predicate::Function { name, args } => {
                let mut lowered = Vec::with_capacity(args.len());
                for arg in args {
                    lowered.push(self.lower_expression(arg, columns)?);
                }
                Ok(lower_function(name, lowered))
            }
            Predicate::Not(operand) => Ok(SqlExpr::UnaryOp {
                op: UnaryOperator::Not,
                expr: Box::new(SqlExpr::Nested(Box::new(
                    self.lower_predicate(operand, columns)?,
                ))),
            }),
            Predicate::And(operands) => {
                let mut terms = Vec::with_capacity(operands.len());
                for operand in operands {
                    terms.push(self.lower_predicate(operand, columns)?);
                }
                Ok(SqlExpr::and_all(terms).unwrap_or_else(|| SqlExpr::literal(true)))
            }
            Predicate::Or(operands) => {
                let mut terms = Vec::with_capacity(operands.len());
                for operand in operands {
                    terms.push(self.lower_predicate(operand, columns)?);
                }
                Ok(terms
                    .into_iter()
                    .reduce(|left, right| SqlExpr::binary(left, BinaryOperator::Or, right))
                    .unwrap_or_else(|| SqlExpr::literal(false)))
            }
            Predicate::InContainer { item, container } => {
                let lowered = self.lower_expression(item, columns)?;
                match container {
                    ColumnContainer::Sequence(items) => {
                        let mut list = Vec::with_capacity(items.len());
                        for candidate in items {
                            list.push(self.lower_expression(candidate, columns)?);
                        }
                        Ok(SqlExpr::InList {
                            expr: Box::new(lowered),
                            list,
                        })
                    }
                    ColumnContainer::Range { start, stop, step } => {
                        Ok(lower_range(lowered, *start, *stop, *step))
                    }
                }
            }
        }
    }
}

fn lookup<'a, T: ColumnTag, L>(columns: &'a BTreeMap<T, L>, tag: &T) -> Result<&'a L> {
    columns.get(tag).ok_or_else(|| {
        RelationError::invariant(format!(
            "column {} is not available in the emitted statement",
            tag.qualified_name()
        ))
    })
}

/// Known operator names render as infix SQL; everything else becomes a
/// function call under its own name.
fn lower_function(name: &str, mut args: Vec<SqlExpr>) -> SqlExpr {
    let infix = match name {
        "eq" => Some(BinaryOperator::Eq),
        "ne" => Some(BinaryOperator::NotEq),
        "lt" => Some(BinaryOperator::Lt),
        "le" => Some(BinaryOperator::LtEq),
        "gt" => Some(BinaryOperator::Gt),
        "ge" => Some(BinaryOperator::GtEq),
        "add" => Some(BinaryOperator::Plus),
        "sub" => Some(BinaryOperator::Minus),
        "mul" => Some(BinaryOperator::Multiply),
        "div" => Some(BinaryOperator::Divide),
        "mod" => Some(BinaryOperator::Modulo),
        _ => None,
    };
    if let Some(op) = infix {
        if args.len() == 2 {
            let right = args.pop().expect("length checked");
            let left = args.pop().expect("length checked");
            return SqlExpr::binary(left, op, right);
        }
    }
    if name == "neg" && args.len() == 1 {
        return SqlExpr::UnaryOp {
            op: UnaryOperator::Minus,
            expr: Box::new(args.pop().expect("length checked")),
        };
    }
    if name == "not" && args.len() == 1 {
        return SqlExpr::UnaryOp {
            op: UnaryOperator::Not,
            expr: Box::new(args.pop().expect("length checked")),
        };
    }
    SqlExpr::Function {
        name: name.to_string(),
        args,
    }
}

/// Membership in a half-open integer range, as BETWEEN plus a stride
/// condition for steps above one.
fn lower_range(item: SqlExpr, start: i64, stop: i64, step: i64) -> SqlExpr {
    if stop <= start {
        return SqlExpr::literal(false);
    }
    let last = stop - 1;
    if start == last {
        return SqlExpr::binary(item, BinaryOperator::Eq, SqlExpr::literal(start));
    }
    let between = SqlExpr::Between {
        expr: Box::new(item.clone()),
        low: Box::new(SqlExpr::literal(start)),
        high: Box::new(SqlExpr::literal(last)),
    };
    if step == 1 {
        between
    } else {
        let stride = SqlExpr::binary(
            SqlExpr::binary(item, BinaryOperator::Modulo, SqlExpr::literal(step)),
            BinaryOperator::Eq,
            SqlExpr::literal(start.rem_euclid(step)),
        );
        SqlExpr::binary(between, BinaryOperator::And, stride)
    }
}

fn qualified_columns<T: ColumnTag, L: LogicalColumn<T>>(
    member: &Relation<T>,
    alias: &str,
) -> Vec<(T, L)> {
    member
        .columns()
        .iter()
        .map(|tag| {
            let logical = L::from_source(Some(alias), &tag.qualified_name());
            (tag.clone(), logical)
        })
        .collect()
}

fn slice_bounds(slice: Option<(usize, Option<usize>)>) -> (Option<u64>, Option<u64>) {
    match slice {
        None => (None, None),
        Some((start, stop)) => {
            let limit = stop.map(|stop| (stop - start) as u64);
            let offset = if start > 0 { Some(start as u64) } else { None };
            (limit, offset)
        }
    }
}

impl<T: ColumnTag, L: LogicalColumn<T>> Engine<T> for SqlEngine<L> {
    fn name(&self) -> &str {
        &self.name
    }

    fn supports_unary(&self, operation: &UnaryOperation<T>) -> bool {
        !matches!(operation, UnaryOperation::Custom(_))
    }

    fn supports_binary(&self, _operation: &BinaryOperation<T>) -> bool {
        true
    }

    fn supports_function(&self, _name: &str) -> bool {
        // Unknown names render as function calls for the database to
        // resolve.
        true
    }

    fn conform(&self, relation: &Relation<T>) -> Result<Relation<T>> {
        conform::conform(relation)
    }

    fn execute(&self, relation: &Relation<T>) -> Result<Payload<T>> {
        let query = self.to_executable(relation)?;
        Ok(Payload::Select(SqlPayload::Statement(query)))
    }

    fn import_payload(&self, _columns: &BTreeSet<T>, payload: Payload<T>) -> Result<Payload<T>> {
        match payload {
            Payload::Select(select) => Ok(Payload::Select(select)),
            _ => Err(RelationError::engine(format!(
                "engine {} can only import SQL payloads",
                self.name
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::SortTerm;
    use crate::relation::Relation;
    use crate::sql::compile;
    use crate::tag::StringTag;

    type Rel = Relation<StringTag>;
    type Expr = ColumnExpression<StringTag>;
    type Pred = Predicate<StringTag>;

    fn tag(name: &str) -> StringTag {
        StringTag::from(name)
    }

    fn setup() -> (SqlEngine<ScalarColumn>, EngineRef<StringTag>) {
        let engine = EngineRef::new(SqlEngine::<ScalarColumn>::new("sql"));
        (SqlEngine::new("sql"), engine)
    }

    fn table_leaf(engine: &EngineRef<StringTag>, name: &str, columns: &[&str]) -> Rel {
        let table = SqlTable::from_tags(name, columns.iter().map(|c| tag(c)));
        SqlEngine::<ScalarColumn>::make_leaf(engine, table, false, 0, None).unwrap()
    }

    fn lt(column: &str, value: i64) -> Pred {
        Pred::function("lt", vec![Expr::reference(column), Expr::literal(value)])
    }

    #[test]
    fn test_emit_leaf() {
        let (sql, engine) = setup();
        let leaf = table_leaf(&engine, "points", &["x", "y"]);
        let query = sql.to_executable(&leaf).unwrap();
        assert_eq!(
            compile(&query),
            "SELECT t0.x AS x, t0.y AS y FROM points AS t0"
        );
    }

    #[test]
    fn test_emit_selection_and_calculation() {
        let (sql, engine) = setup();
        let leaf = table_leaf(&engine, "points", &["x", "y"]);
        let tree = leaf
            .calculated(
                tag("s"),
                Expr::function("add", vec![Expr::reference("x"), Expr::reference("y")]),
            )
            .unwrap()
            .filtered(lt("s", 10))
            .unwrap();
        let rendered = compile(&sql.to_executable(&tree).unwrap());
        assert!(rendered.contains("t0.x + t0.y AS s"));
        assert!(rendered.contains("WHERE (t0.x + t0.y) < 10"));
    }

    #[test]
    fn test_emit_join_with_equi_keys() {
        let (sql, engine) = setup();
        let a = table_leaf(&engine, "a", &["x", "y"]);
        let b = table_leaf(&engine, "b", &["y", "z"]);
        let tree = a.join(&b, Pred::literal(true)).unwrap();
        let rendered = compile(&sql.to_executable(&tree).unwrap());
        assert!(rendered.contains("FROM a AS t0"));
        assert!(rendered.contains("JOIN b AS t1 ON t0.y = t1.y"));
        assert!(rendered.starts_with("SELECT t0.x AS x, t0.y AS y, t1.z AS z"));
    }

    #[test]
    fn test_emit_join_predicate_lands_in_where() {
        let (sql, engine) = setup();
        let a = table_leaf(&engine, "a", &["x", "y"]);
        let b = table_leaf(&engine, "b", &["y", "z"]);
        let predicate = Pred::function(
            "lt",
            vec![Expr::reference("x"), Expr::reference("z")],
        );
        let tree = a.join(&b, predicate).unwrap();
        let rendered = compile(&sql.to_executable(&tree).unwrap());
        assert!(rendered.contains("WHERE t0.x < t1.z"));
    }

    #[test]
    fn test_emit_union_all_and_union() {
        let (sql, engine) = setup();
        let a = table_leaf(&engine, "a", &["x"]);
        let b = table_leaf(&engine, "b", &["x"]);
        let chained = a.chain(&b).unwrap();
        let rendered = compile(&sql.to_executable(&chained).unwrap());
        assert!(rendered.contains("UNION ALL SELECT"));
        assert!(!rendered.contains("DISTINCT"));

        let distinct = chained.distinct().unwrap();
        let rendered = compile(&sql.to_executable(&distinct).unwrap());
        assert!(rendered.contains("UNION SELECT"));
        assert!(!rendered.contains("UNION ALL"));
    }

    #[test]
    fn test_emit_sort_slice_and_narrowed_projection() {
        let (sql, engine) = setup();
        let leaf = table_leaf(&engine, "points", &["x", "y"]);
        let tree = leaf
            .sorted(vec![SortTerm::descending(Expr::reference("x"))])
            .unwrap()
            .project([tag("y")])
            .unwrap()
            .sliced(5, Some(15))
            .unwrap();
        let rendered = compile(&sql.to_executable(&tree).unwrap());
        assert!(rendered.starts_with("SELECT t0.y AS y "));
        assert!(rendered.contains("ORDER BY t0.x DESC"));
        assert!(rendered.contains("LIMIT 10"));
        assert!(rendered.contains("OFFSET 5"));
    }

    #[test]
    fn test_emit_distinct() {
        let (sql, engine) = setup();
        let leaf = table_leaf(&engine, "points", &["x"]);
        let rendered = compile(&sql.to_executable(&leaf.distinct().unwrap()).unwrap());
        assert!(rendered.starts_with("SELECT DISTINCT"));
    }

    #[test]
    fn test_emit_sealed_subquery() {
        let (sql, engine) = setup();
        let leaf = table_leaf(&engine, "points", &["x"]);
        let tree = leaf
            .sliced(0, Some(10))
            .unwrap()
            .filtered(lt("x", 5))
            .unwrap();
        let rendered = compile(&sql.to_executable(&tree).unwrap());
        assert!(rendered.contains("FROM (SELECT t0.x AS x FROM points AS t0 LIMIT 10) AS t0"));
        assert!(rendered.contains("WHERE t0.x < 5"));
    }

    #[test]
    fn test_emit_zero_column_relation() {
        let (sql, engine) = setup();
        let leaf = table_leaf(&engine, "points", &["x"]);
        let tree = leaf.project([]).unwrap();
        let rendered = compile(&sql.to_executable(&tree).unwrap());
        assert!(rendered.starts_with("SELECT TRUE AS ignored"));
    }

    #[test]
    fn test_emit_in_container_predicates() {
        let (sql, engine) = setup();
        let leaf = table_leaf(&engine, "points", &["x"]);
        let in_list = leaf
            .filtered(Pred::in_container(
                Expr::reference("x"),
                crate::expr::ColumnContainer::sequence(vec![
                    Expr::literal(1i64),
                    Expr::literal(2i64),
                ]),
            ))
            .unwrap();
        let rendered = compile(&sql.to_executable(&in_list).unwrap());
        assert!(rendered.contains("t0.x IN (1, 2)"));

        let in_range = leaf
            .filtered(Pred::in_container(
                Expr::reference("x"),
                crate::expr::ColumnContainer::range(0, 10, 2),
            ))
            .unwrap();
        let rendered = compile(&sql.to_executable(&in_range).unwrap());
        assert!(rendered.contains("t0.x BETWEEN 0 AND 9"));
        assert!(rendered.contains("% 2) = 0"));
    }

    #[test]
    fn test_execute_returns_statement_payload() {
        let (_, engine) = setup();
        let leaf = table_leaf(&engine, "points", &["x"]);
        let payload = engine.execute(&leaf.filtered(lt("x", 3)).unwrap()).unwrap();
        match payload.select() {
            Some(SqlPayload::Statement(query)) => {
                assert!(compile(query).contains("WHERE t0.x < 3"));
            }
            _ => panic!("expected an emitted statement"),
        }
    }

    #[test]
    fn test_materialized_statement_payload_is_reused() {
        let (sql, engine) = setup();
        let leaf = table_leaf(&engine, "points", &["x"]);
        let mat = leaf.filtered(lt("x", 3)).unwrap().materialized("m").unwrap();
        let payload = engine.execute(&mat).unwrap();
        // Processing would attach the payload; emulate it here.
        mat.attach_payload(payload).unwrap();
        let rendered = compile(&sql.to_executable(&mat).unwrap());
        assert!(rendered.contains("WHERE t0.x < 3"));
    }
}
