//! The emitted SQL representation.
//!
//! A deliberately small AST: the conform pass guarantees every emitted
//! statement is a single `SELECT` or a `UNION`/`UNION ALL` chain of
//! them, so there is no DML, no CTEs, and no window machinery here.
//! [`compile`](super::compile::compile) renders it to a
//! PostgreSQL-flavored string.

use std::fmt;

use crate::datum::Datum;

/// A scalar SQL expression.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlExpr {
    /// Column reference: `table.column` or bare `column`.
    Column {
        table: Option<String>,
        name: String,
    },
    /// Literal value.
    Literal(Datum),
    /// Binary operation: `left op right`.
    BinaryOp {
        left: Box<SqlExpr>,
        op: BinaryOperator,
        right: Box<SqlExpr>,
    },
    /// Unary operation: `op expr`.
    UnaryOp {
        op: UnaryOperator,
        expr: Box<SqlExpr>,
    },
    /// Function call: `name(args)`.
    Function { name: String, args: Vec<SqlExpr> },
    /// `expr IN (values)`.
    InList {
        expr: Box<SqlExpr>,
        list: Vec<SqlExpr>,
    },
    /// `expr BETWEEN low AND high`.
    Between {
        expr: Box<SqlExpr>,
        low: Box<SqlExpr>,
        high: Box<SqlExpr>,
    },
    /// Parenthesized expression.
    Nested(Box<SqlExpr>),
}

impl SqlExpr {
    pub fn column(table: Option<&str>, name: impl Into<String>) -> Self {
        SqlExpr::Column {
            table: table.map(str::to_string),
            name: name.into(),
        }
    }

    pub fn literal(value: impl Into<Datum>) -> Self {
        SqlExpr::Literal(value.into())
    }

    pub fn binary(left: SqlExpr, op: BinaryOperator, right: SqlExpr) -> Self {
        SqlExpr::BinaryOp {
            left: Box::new(left),
            op,
            right: Box::new(right),
        }
    }

    /// Conjoin a list of expressions with `AND`, or `None` when empty.
    pub fn and_all(terms: Vec<SqlExpr>) -> Option<SqlExpr> {
        terms
            .into_iter()
            .reduce(|left, right| SqlExpr::binary(left, BinaryOperator::And, right))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOperator {
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
    And,
    Or,
    Plus,
    Minus,
    Multiply,
    Divide,
    Modulo,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOperator {
    Not,
    Minus,
}

/// One item of the SELECT list: `expr AS alias`.
#[derive(Debug, Clone, PartialEq)]
pub struct SelectItem {
    pub expr: SqlExpr,
    pub alias: Option<String>,
}

impl SelectItem {
    pub fn aliased(expr: SqlExpr, alias: impl Into<String>) -> Self {
        SelectItem {
            expr,
            alias: Some(alias.into()),
        }
    }
}

/// A FROM-clause source.
#[derive(Debug, Clone, PartialEq)]
pub enum TableRef {
    /// Base table, optionally aliased.
    Table {
        name: String,
        alias: Option<String>,
    },
    /// Subquery: `(SELECT ...) AS alias`.
    Subquery {
        query: Box<SelectQuery>,
        alias: String,
    },
}

/// An inner join onto the accumulated FROM clause.
#[derive(Debug, Clone, PartialEq)]
pub struct Join {
    pub table: TableRef,
    pub on: Option<SqlExpr>,
}

/// `expr [ASC|DESC]`.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderByExpr {
    pub expr: SqlExpr,
    pub asc: bool,
}

/// A set operation chained to the right of a query.
#[derive(Debug, Clone, PartialEq)]
pub struct SetOperation {
    /// `UNION ALL` when true, plain `UNION` otherwise.
    pub all: bool,
    pub right: SelectQuery,
}

/// A SELECT statement, or the head of a UNION chain of them.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SelectQuery {
    pub distinct: bool,
    pub projections: Vec<SelectItem>,
    pub from: Vec<TableRef>,
    pub joins: Vec<Join>,
    pub filter: Option<SqlExpr>,
    pub set_op: Option<Box<SetOperation>>,
    pub order_by: Vec<OrderByExpr>,
    pub limit: Option<u64>,
    pub offset: Option<u64>,
}

impl SelectQuery {
    /// Chain another query onto this one with `UNION` or `UNION ALL`.
    pub fn union(mut self, right: SelectQuery, all: bool) -> SelectQuery {
        let mut tail = &mut self.set_op;
        while let Some(op) = tail {
            tail = &mut op.right.set_op;
        }
        *tail = Some(Box::new(SetOperation { all, right }));
        self
    }
}

impl fmt::Display for SelectQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&super::compile::compile(self))
    }
}
