//! AST → SQL string rendering, targeting PostgreSQL.

use crate::datum::Datum;

use super::ast::*;

/// Render a query AST into a SQL string.
pub fn compile(query: &SelectQuery) -> String {
    let mut parts = Vec::new();

    let mut select_clause = String::from("SELECT ");
    if query.distinct {
        select_clause.push_str("DISTINCT ");
    }
    if query.projections.is_empty() {
        select_clause.push('*');
    } else {
        let items: Vec<String> = query.projections.iter().map(compile_select_item).collect();
        select_clause.push_str(&items.join(", "));
    }
    parts.push(select_clause);

    if !query.from.is_empty() {
        let tables: Vec<String> = query.from.iter().map(compile_table_ref).collect();
        parts.push(format!("FROM {}", tables.join(", ")));
    }

    for join in &query.joins {
        parts.push(compile_join(join));
    }

    if let Some(ref filter) = query.filter {
        parts.push(format!("WHERE {}", compile_expr(filter)));
    }

    if let Some(ref set_op) = query.set_op {
        let op_str = if set_op.all { "UNION ALL" } else { "UNION" };
        parts.push(format!("{} {}", op_str, compile(&set_op.right)));
    }

    if !query.order_by.is_empty() {
        let orders: Vec<String> = query.order_by.iter().map(compile_order_by).collect();
        parts.push(format!("ORDER BY {}", orders.join(", ")));
    }

    if let Some(limit) = query.limit {
        parts.push(format!("LIMIT {limit}"));
    }

    if let Some(offset) = query.offset {
        if offset > 0 {
            parts.push(format!("OFFSET {offset}"));
        }
    }

    parts.join(" ")
}

fn compile_select_item(item: &SelectItem) -> String {
    let expr = compile_expr(&item.expr);
    match &item.alias {
        Some(alias) => format!("{expr} AS {alias}"),
        None => expr,
    }
}

fn compile_table_ref(table: &TableRef) -> String {
    match table {
        TableRef::Table { name, alias } => match alias {
            Some(alias) => format!("{name} AS {alias}"),
            None => name.clone(),
        },
        TableRef::Subquery { query, alias } => {
            format!("({}) AS {alias}", compile(query))
        }
    }
}

fn compile_join(join: &Join) -> String {
    let table = compile_table_ref(&join.table);
    match &join.on {
        Some(on) => format!("JOIN {table} ON {}", compile_expr(on)),
        None => format!("CROSS JOIN {table}"),
    }
}

fn compile_expr(expr: &SqlExpr) -> String {
    match expr {
        SqlExpr::Column { table, name } => match table {
            Some(table) => format!("{table}.{name}"),
            None => name.clone(),
        },
        SqlExpr::Literal(value) => compile_literal(value),
        SqlExpr::BinaryOp { left, op, right } => {
            let op_str = match op {
                BinaryOperator::Eq => "=",
                BinaryOperator::NotEq => "<>",
                BinaryOperator::Lt => "<",
                BinaryOperator::LtEq => "<=",
                BinaryOperator::Gt => ">",
                BinaryOperator::GtEq => ">=",
                BinaryOperator::And => "AND",
                BinaryOperator::Or => "OR",
                BinaryOperator::Plus => "+",
                BinaryOperator::Minus => "-",
                BinaryOperator::Multiply => "*",
                BinaryOperator::Divide => "/",
                BinaryOperator::Modulo => "%",
            };
            let left_str = compile_operand(left, op);
            let right_str = compile_operand(right, op);
            format!("{left_str} {op_str} {right_str}")
        }
        SqlExpr::UnaryOp { op, expr } => {
            let op_str = match op {
                UnaryOperator::Not => "NOT",
                UnaryOperator::Minus => "-",
            };
            format!("{op_str} {}", compile_operand(expr, &BinaryOperator::And))
        }
        SqlExpr::Function { name, args } => {
            let args_str: Vec<String> = args.iter().map(compile_expr).collect();
            format!("{name}({})", args_str.join(", "))
        }
        SqlExpr::InList { expr, list } => {
            let items: Vec<String> = list.iter().map(compile_expr).collect();
            format!("{} IN ({})", compile_expr(expr), items.join(", "))
        }
        SqlExpr::Between { expr, low, high } => {
            format!(
                "{} BETWEEN {} AND {}",
                compile_expr(expr),
                compile_expr(low),
                compile_expr(high)
            )
        }
        SqlExpr::Nested(expr) => format!("({})", compile_expr(expr)),
    }
}

/// Parenthesize compound operands so precedence survives rendering.
fn compile_operand(expr: &SqlExpr, _parent: &BinaryOperator) -> String {
    match expr {
        SqlExpr::BinaryOp { .. } => format!("({})", compile_expr(expr)),
        _ => compile_expr(expr),
    }
}

fn compile_literal(value: &Datum) -> String {
    match value {
        Datum::Null => "NULL".to_string(),
        Datum::Bool(true) => "TRUE".to_string(),
        Datum::Bool(false) => "FALSE".to_string(),
        Datum::Int(v) => v.to_string(),
        Datum::Float(v) => format!("{v}"),
        Datum::Text(v) => format!("'{}'", v.replace('\'', "''")),
        Datum::Bytes(v) => {
            let hex: String = v.iter().map(|byte| format!("{byte:02x}")).collect();
            format!("'\\x{hex}'")
        }
        Datum::Date(v) => format!("DATE '{v}'"),
        Datum::Time(v) => format!("TIME '{v}'"),
        Datum::Timestamp(v) => format!("TIMESTAMP '{v}'"),
        Datum::TimestampTz(v) => format!("TIMESTAMPTZ '{}'", v.to_rfc3339()),
    }
}

fn compile_order_by(order: &OrderByExpr) -> String {
    let expr = compile_expr(&order.expr);
    if order.asc {
        format!("{expr} ASC")
    } else {
        format!("{expr} DESC")
    }
}
