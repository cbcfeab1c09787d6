//! Select-expression rendering and pattern matching.
//!
//! The attribute store speaks a small SQL-ish select language. The engine
//! evaluates plans directly, but it still renders the expression a real
//! backend would receive and traces it, which keeps the translation honest
//! and testable.

use duostore_core::query::{Direction, Filter, QueryOp, QueryPlan};
use duostore_core::storage::TableSchema;

/// Backend-native name of the id attribute. The id value is the item name,
/// not a stored attribute.
pub const ITEM_NAME: &str = "itemName()";

fn quote_name(schema: &TableSchema, attr: &str) -> String {
    if attr == schema.id_attr.name {
        ITEM_NAME.to_string()
    } else {
        format!("`{attr}`")
    }
}

fn quote_value(encoded: &str) -> String {
    format!("'{}'", encoded.replace('\'', "''"))
}

fn render_filter(schema: &TableSchema, filter: &Filter) -> String {
    let name = quote_name(schema, &filter.attr);
    let operands: Vec<String> = filter
        .operands
        .iter()
        .map(|v| quote_value(&v.canonical_encode()))
        .collect();
    let first = operands.first().map(String::as_str).unwrap_or("''");
    match filter.op {
        QueryOp::Eq => format!("{name} = {first}"),
        QueryOp::Ne => format!("{name} != {first}"),
        QueryOp::Le => format!("{name} <= {first}"),
        QueryOp::Lt => format!("{name} < {first}"),
        QueryOp::Ge => format!("{name} >= {first}"),
        QueryOp::Gt => format!("{name} > {first}"),
        QueryOp::Like => format!("{name} like {first}"),
        QueryOp::NotLike => format!("{name} not like {first}"),
        QueryOp::Between => {
            let second = operands.get(1).map(String::as_str).unwrap_or("''");
            format!("{name} between {first} and {second}")
        }
        QueryOp::In => format!("{name} in ({})", operands.join(", ")),
        QueryOp::IsNull => format!("{name} is null"),
        QueryOp::NotNull => format!("{name} is not null"),
        // Not part of this store's language; rendered plainly for traces.
        op => format!("{name} {op} {}", operands.join(", ")),
    }
}

/// Renders the select expression for a plan.
pub fn render_select(schema: &TableSchema, plan: &QueryPlan, count_only: bool) -> String {
    let columns = if count_only {
        "count(*)".to_string()
    } else {
        match &plan.projection {
            Some(attrs) => attrs
                .iter()
                .map(|a| quote_name(schema, a))
                .collect::<Vec<_>>()
                .join(", "),
            None => "*".to_string(),
        }
    };

    let mut expr = format!("select {columns} from `{}`", schema.table_name);

    if !plan.filters.is_empty() {
        let conditions: Vec<String> = plan
            .filters
            .iter()
            .map(|f| render_filter(schema, f))
            .collect();
        expr.push_str(" where ");
        expr.push_str(&conditions.join(" and "));
    }

    if let Some(order) = &plan.order_by {
        expr.push_str(" order by ");
        expr.push_str(&quote_name(schema, &order.attr));
        expr.push_str(match order.direction {
            Direction::Asc => " asc",
            Direction::Desc => " desc",
        });
    }

    if let Some(limit) = plan.limit {
        expr.push_str(&format!(" limit {limit}"));
    }

    expr
}

/// Matches a `like` pattern where `%` stands for any run of characters.
/// A pattern without `%` is an exact match.
pub fn like_match(pattern: &str, text: &str) -> bool {
    if !pattern.contains('%') {
        return pattern == text;
    }
    let parts: Vec<&str> = pattern.split('%').collect();
    let mut rest = text;

    let head = parts[0];
    if !head.is_empty() {
        match rest.strip_prefix(head) {
            Some(stripped) => rest = stripped,
            None => return false,
        }
    }

    let tail = parts[parts.len() - 1];
    for part in &parts[1..parts.len() - 1] {
        if part.is_empty() {
            continue;
        }
        match rest.find(part) {
            Some(idx) => rest = &rest[idx + part.len()..],
            None => return false,
        }
    }

    tail.is_empty() || rest.ends_with(tail)
}
