//! Query plan types shared by the builder, the validator and the drivers.
//!
//! A plan is validated against the target backend's capability profile
//! before any translation happens; an unsupported combination fails with an
//! explicit error instead of being dropped or approximated.

use std::fmt;

use crate::model::{Value, ValueKind};
use crate::storage::{StoreCapabilities, StoreError, TableSchema};

/// Filter operators across both backends. Each backend supports a subset,
/// declared in its [`StoreCapabilities`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryOp {
    Eq,
    Ne,
    Le,
    Lt,
    Ge,
    Gt,
    Between,
    In,
    Like,
    NotLike,
    Contains,
    NotContains,
    BeginsWith,
    IsNull,
    NotNull,
}

impl QueryOp {
    pub fn as_str(&self) -> &'static str {
        match self {
            QueryOp::Eq => "eq",
            QueryOp::Ne => "ne",
            QueryOp::Le => "le",
            QueryOp::Lt => "lt",
            QueryOp::Ge => "ge",
            QueryOp::Gt => "gt",
            QueryOp::Between => "between",
            QueryOp::In => "in",
            QueryOp::Like => "like",
            QueryOp::NotLike => "not-like",
            QueryOp::Contains => "contains",
            QueryOp::NotContains => "not-contains",
            QueryOp::BeginsWith => "begins-with",
            QueryOp::IsNull => "is-null",
            QueryOp::NotNull => "not-null",
        }
    }

    /// Operand count this operator expects: `(min, max)`, `max = None`
    /// meaning unbounded.
    pub fn arity(&self) -> (usize, Option<usize>) {
        match self {
            QueryOp::IsNull | QueryOp::NotNull => (0, Some(0)),
            QueryOp::Between => (2, Some(2)),
            QueryOp::In => (1, None),
            _ => (1, Some(1)),
        }
    }

    /// Operators that need a string-valued target.
    pub fn needs_text_target(&self) -> bool {
        matches!(
            self,
            QueryOp::Like | QueryOp::NotLike | QueryOp::BeginsWith
        )
    }
}

impl fmt::Display for QueryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Range-key operators usable inside a direct key access.
pub const KEY_RANGE_OPS: &[QueryOp] = &[
    QueryOp::Eq,
    QueryOp::Le,
    QueryOp::Lt,
    QueryOp::Ge,
    QueryOp::Gt,
    QueryOp::Between,
    QueryOp::BeginsWith,
];

/// One filter condition; operands are already coerced to the attribute's
/// kind (element kind for sets) by the query builder.
#[derive(Debug, Clone, PartialEq)]
pub struct Filter {
    pub attr: String,
    pub op: QueryOp,
    pub operands: Vec<Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Asc,
    Desc,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OrderBy {
    pub attr: String,
    pub direction: Direction,
}

/// The backend-independent query representation handed to drivers.
#[derive(Debug, Clone, Default)]
pub struct QueryPlan {
    pub filters: Vec<Filter>,
    /// Attribute names to materialize; `None` fetches everything.
    pub projection: Option<Vec<String>>,
    pub order_by: Option<OrderBy>,
    /// Caps the total number of records across all pages.
    pub limit: Option<usize>,
    pub consistent_read: bool,
}

impl QueryPlan {
    /// The filters touching the given attribute.
    pub fn filters_on<'a>(&'a self, attr: &'a str) -> impl Iterator<Item = &'a Filter> {
        self.filters.iter().filter(move |f| f.attr == attr)
    }
}

/// Opaque continuation cursor. Callers hold it between batches; only the
/// driver that produced it interprets the contents.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageToken(String);

impl PageToken {
    pub fn new(inner: impl Into<String>) -> Self {
        Self(inner.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

/// Checks a plan against a backend's declared capabilities and the model's
/// schema. Runs before translation; nothing is executed when this fails.
pub fn validate_plan(
    schema: &TableSchema,
    caps: &StoreCapabilities,
    plan: &QueryPlan,
) -> Result<(), StoreError> {
    let unsupported = |what: String| StoreError::Unsupported { store: caps.store, what };

    for filter in &plan.filters {
        let kind = schema
            .attr_kind(&filter.attr)
            .ok_or_else(|| StoreError::Validation(format!("unknown attribute {}", filter.attr)))?;

        if !caps.supports_operator(filter.op) {
            return Err(unsupported(format!("operator {}", filter.op)));
        }

        let (min, max) = filter.op.arity();
        let count = filter.operands.len();
        if count < min || max.is_some_and(|m| count > m) {
            return Err(StoreError::Validation(format!(
                "operator {} on {} takes {} operand(s), got {count}",
                filter.op, filter.attr, min
            )));
        }

        if filter.op.needs_text_target() && kind.element() != ValueKind::Str {
            return Err(StoreError::Validation(format!(
                "operator {} requires a string attribute, {} is {}",
                filter.op, filter.attr, kind
            )));
        }

        if filter.op == QueryOp::In {
            let on_range = schema.range_attr.as_ref().is_some_and(|r| r.name == filter.attr);
            if on_range && !caps.in_on_range_key {
                return Err(unsupported("operator in on the range key".to_string()));
            }
        }
    }

    if let Some(projection) = &plan.projection {
        for attr in projection {
            if schema.attr_kind(attr).is_none() {
                return Err(StoreError::Validation(format!("unknown attribute {attr}")));
            }
        }
    }

    let mut key_access = false;
    if caps.id_filters_force_key_access {
        let id_attr = &schema.id_attr.name;
        let range_attr = schema.range_attr.as_ref().map(|r| r.name.as_str());
        let id_filters: Vec<&Filter> = plan.filters_on(id_attr).collect();

        if !id_filters.is_empty() {
            key_access = true;
            if id_filters.len() > 1 {
                return Err(StoreError::Validation(format!(
                    "more than one filter on the id attribute {id_attr}"
                )));
            }
            if id_filters[0].op != QueryOp::Eq {
                return Err(unsupported(format!(
                    "operator {} on the id attribute",
                    id_filters[0].op
                )));
            }

            let mut range_filters = 0usize;
            let mut extra_filters = 0usize;
            for filter in &plan.filters {
                if filter.attr == *id_attr {
                    continue;
                }
                if Some(filter.attr.as_str()) == range_attr {
                    range_filters += 1;
                    if !KEY_RANGE_OPS.contains(&filter.op) {
                        return Err(unsupported(format!(
                            "operator {} on the range key of a key query",
                            filter.op
                        )));
                    }
                } else {
                    extra_filters += 1;
                }
            }
            if range_filters > 1 {
                return Err(StoreError::Validation(
                    "more than one filter on the range key".to_string(),
                ));
            }
            if extra_filters > 0 && !caps.extra_filters_with_key_access {
                return Err(unsupported(
                    "non-key filters alongside a key query".to_string(),
                ));
            }
        }
    }

    if let Some(order) = &plan.order_by {
        if schema.attr_kind(&order.attr).is_none() {
            return Err(StoreError::Validation(format!("unknown attribute {}", order.attr)));
        }
        if caps.order_by_any_field {
            // The attribute store only sorts on an attribute constrained by
            // the where clause.
            if plan.filters_on(&order.attr).next().is_none() {
                return Err(unsupported(format!(
                    "order by {} without a filter on it",
                    order.attr
                )));
            }
        } else {
            let on_range_of_key_access = key_access
                && schema.range_attr.as_ref().is_some_and(|r| r.name == order.attr);
            if !on_range_of_key_access {
                return Err(unsupported(
                    "order by is limited to the range key of a key query".to_string(),
                ));
            }
        }
    }

    Ok(())
}
