//! In-process flexible attribute store.
//!
//! Items are rows of string-encoded attribute values keyed by item name,
//! which is the canonical encoding of the id value. Attributes are
//! multi-valued (sets store one entry per element) and comparisons are
//! lexicographic over the encodings, which the canonical number encoding
//! makes agree with value order. A filter on a multi-valued attribute
//! matches when any stored value satisfies it.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use duostore_core::model::Value;
use duostore_core::query::{Direction, Filter, PageToken, QueryOp, QueryPlan};
use duostore_core::storage::{
    KeyPair, PutCondition, QueryPage, RawItem, Result, StoreCapabilities, StoreDriver, StoreError,
    StoreKind, TableSchema,
};

use super::select::{like_match, render_select, ITEM_NAME};

const DEFAULT_PAGE_SIZE: usize = 100;

/// Operators the attribute store's select language can express.
const OPERATORS: &[QueryOp] = &[
    QueryOp::Eq,
    QueryOp::Ne,
    QueryOp::Le,
    QueryOp::Lt,
    QueryOp::Ge,
    QueryOp::Gt,
    QueryOp::Between,
    QueryOp::In,
    QueryOp::Like,
    QueryOp::NotLike,
    QueryOp::IsNull,
    QueryOp::NotNull,
];

/// Encoded attribute values of one item, multi-valued per attribute.
type AttrRow = HashMap<String, Vec<String>>;

#[derive(Debug, Default)]
struct AttrTable {
    items: BTreeMap<String, AttrRow>,
}

/// In-process engine with attribute-store semantics.
///
/// Cheap to clone; clones share the same tables.
#[derive(Debug, Clone)]
pub struct AttrStore {
    tables: Arc<RwLock<HashMap<String, AttrTable>>>,
    page_size: usize,
}

impl AttrStore {
    pub fn new() -> Self {
        Self {
            tables: Arc::new(RwLock::new(HashMap::new())),
            page_size: DEFAULT_PAGE_SIZE,
        }
    }

    /// Overrides the number of items returned per query batch.
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }
}

impl Default for AttrStore {
    fn default() -> Self {
        Self::new()
    }
}

/// Item name plus encoded row for one item.
fn encode_item(schema: &TableSchema, item: &RawItem) -> Result<(String, AttrRow)> {
    let id = item
        .get(&schema.id_attr.name)
        .filter(|v| !v.is_empty())
        .ok_or_else(|| {
            StoreError::Validation(format!("item is missing the id attribute {}", schema.id_attr.name))
        })?;
    let name = id.canonical_encode();

    let mut row = AttrRow::new();
    for (attr, value) in item {
        if attr == &schema.id_attr.name || matches!(value, Value::Null) {
            continue;
        }
        row.insert(attr.clone(), value.canonical_elements());
    }
    Ok((name, row))
}

/// Decodes a stored row back into a raw item, reattaching the id attribute
/// from the item name. Attributes the schema does not know are dropped.
fn decode_item(schema: &TableSchema, name: &str, row: &AttrRow) -> Result<RawItem> {
    let mut item = RawItem::new();
    let id = Value::canonical_decode(schema.id_attr.kind, name).map_err(StoreError::Serialization)?;
    item.insert(schema.id_attr.name.clone(), id);

    for (attr, encoded) in row {
        let Some(kind) = schema.attr_kind(attr) else {
            continue;
        };
        let value = if kind.is_set() {
            // Set elements may contain the join separator, so sets decode
            // entry by entry rather than from the joined encoding.
            Value::canonical_decode_elements(kind, encoded).map_err(StoreError::Serialization)?
        } else {
            let Some(first) = encoded.first() else {
                continue;
            };
            Value::canonical_decode(kind, first).map_err(StoreError::Serialization)?
        };
        item.insert(attr.clone(), value);
    }
    Ok(item)
}

/// Evaluates one filter against an item's stored values. Multi-valued
/// attributes match when any stored value satisfies the condition.
fn filter_matches(filter: &Filter, operands: &[String], values: &[String]) -> Result<bool> {
    let first = operands.first().map(String::as_str).unwrap_or("");
    let second = operands.get(1).map(String::as_str).unwrap_or("");

    Ok(match filter.op {
        QueryOp::IsNull => values.is_empty(),
        QueryOp::NotNull => !values.is_empty(),
        QueryOp::Eq => values.iter().any(|v| v == first),
        QueryOp::Ne => values.iter().any(|v| v != first),
        QueryOp::Le => values.iter().any(|v| v.as_str() <= first),
        QueryOp::Lt => values.iter().any(|v| v.as_str() < first),
        QueryOp::Ge => values.iter().any(|v| v.as_str() >= first),
        QueryOp::Gt => values.iter().any(|v| v.as_str() > first),
        QueryOp::Between => values.iter().any(|v| v.as_str() >= first && v.as_str() <= second),
        QueryOp::In => values.iter().any(|v| operands.contains(v)),
        QueryOp::Like => values.iter().any(|v| like_match(first, v)),
        QueryOp::NotLike => values.iter().any(|v| !like_match(first, v)),
        op => {
            return Err(StoreError::Unsupported {
                store: StoreKind::AttrStore,
                what: format!("operator {op}"),
            })
        }
    })
}

impl AttrStore {
    /// Names and rows matching the plan's filters, in item-name order or the
    /// requested sort order, capped by the plan's limit.
    fn matching<'a>(
        &self,
        schema: &TableSchema,
        table: &'a AttrTable,
        plan: &QueryPlan,
    ) -> Result<Vec<(&'a String, &'a AttrRow)>> {
        // The id attribute lives in the item name, not the row; filters and
        // sort keys on it read the name as a single-valued attribute.
        let id_attr = &schema.id_attr.name;
        let encoded: Vec<Vec<String>> = plan
            .filters
            .iter()
            .map(|f| f.operands.iter().map(Value::canonical_encode).collect())
            .collect();
        let empty: Vec<String> = Vec::new();

        let mut matched = Vec::new();
        'items: for (name, row) in &table.items {
            let id_values = [name.clone()];
            for (filter, operands) in plan.filters.iter().zip(&encoded) {
                let values: &[String] = if filter.attr == *id_attr {
                    &id_values
                } else {
                    row.get(&filter.attr).unwrap_or(&empty)
                };
                if !filter_matches(filter, operands, values)? {
                    continue 'items;
                }
            }
            matched.push((name, row));
        }

        if let Some(order) = &plan.order_by {
            let sort_key = |entry: &(&String, &AttrRow)| -> String {
                if order.attr == *id_attr {
                    entry.0.clone()
                } else {
                    entry
                        .1
                        .get(&order.attr)
                        .and_then(|vals| vals.first())
                        .cloned()
                        .unwrap_or_default()
                }
            };
            match order.direction {
                Direction::Asc => matched.sort_by_key(sort_key),
                Direction::Desc => {
                    matched.sort_by_key(sort_key);
                    matched.reverse();
                }
            }
        }

        if let Some(limit) = plan.limit {
            matched.truncate(limit);
        }
        Ok(matched)
    }
}

#[async_trait]
impl StoreDriver for AttrStore {
    fn kind(&self) -> StoreKind {
        StoreKind::AttrStore
    }

    fn capabilities(&self) -> StoreCapabilities {
        StoreCapabilities {
            store: StoreKind::AttrStore,
            operators: OPERATORS,
            in_on_range_key: true,
            id_filters_force_key_access: false,
            extra_filters_with_key_access: true,
            order_by_any_field: true,
            consistent_read: true,
            native_batch_put: true,
        }
    }

    fn attr_name(&self, schema: &TableSchema, attr: &str) -> String {
        if attr == schema.id_attr.name {
            ITEM_NAME.to_string()
        } else {
            attr.to_string()
        }
    }

    async fn create_table(&self, schema: &TableSchema) -> Result<()> {
        let mut tables = self.tables.write().await;
        tables.entry(schema.table_name.clone()).or_default();
        Ok(())
    }

    async fn delete_table(&self, schema: &TableSchema) -> Result<()> {
        let mut tables = self.tables.write().await;
        tables.remove(&schema.table_name);
        Ok(())
    }

    async fn list_tables(&self) -> Result<Vec<String>> {
        let tables = self.tables.read().await;
        let mut names: Vec<String> = tables.keys().cloned().collect();
        names.sort();
        Ok(names)
    }

    async fn put(
        &self,
        schema: &TableSchema,
        item: RawItem,
        condition: Option<PutCondition>,
    ) -> Result<()> {
        let (name, row) = encode_item(schema, &item)?;
        let mut tables = self.tables.write().await;
        let table = tables
            .get_mut(&schema.table_name)
            .ok_or_else(|| StoreError::TableMissing(schema.table_name.clone()))?;

        if let Some(condition) = &condition {
            // The id attribute lives in the item name, so a condition on it
            // reads the stored item's name instead of the row.
            let existing = table.items.get(&name);
            let id_value = [name.clone()];
            let stored: Option<&[String]> = if condition.attr() == schema.id_attr.name {
                existing.map(|_| id_value.as_slice())
            } else {
                existing
                    .and_then(|row| row.get(condition.attr()))
                    .map(Vec::as_slice)
            };
            match condition {
                PutCondition::Absent { attr } => {
                    if stored.is_some() {
                        return Err(StoreError::WriteConflict {
                            model: schema.model_name.clone(),
                            detail: format!("expected {attr} to be absent"),
                        });
                    }
                }
                PutCondition::Equals { attr, value } => {
                    let encoded = value.canonical_encode();
                    if !stored.is_some_and(|vals| vals.contains(&encoded)) {
                        return Err(StoreError::WriteConflict {
                            model: schema.model_name.clone(),
                            detail: format!("expected {attr} = {value}"),
                        });
                    }
                }
            }
        }

        table.items.insert(name, row);
        Ok(())
    }

    async fn put_batch(&self, schema: &TableSchema, items: Vec<RawItem>) -> Result<()> {
        // Encode everything up front so the batch either lands whole or not
        // at all, matching a native batch write.
        let mut encoded = Vec::with_capacity(items.len());
        for item in &items {
            encoded.push(encode_item(schema, item)?);
        }
        let mut tables = self.tables.write().await;
        let table = tables
            .get_mut(&schema.table_name)
            .ok_or_else(|| StoreError::TableMissing(schema.table_name.clone()))?;
        for (name, row) in encoded {
            table.items.insert(name, row);
        }
        Ok(())
    }

    async fn get(
        &self,
        schema: &TableSchema,
        id: &Value,
        range: Option<&Value>,
    ) -> Result<Option<RawItem>> {
        // This store has no range dimension; a declared range key is part of
        // the stored attributes and plays no part in addressing.
        let _ = range;
        let name = id.canonical_encode();
        let tables = self.tables.read().await;
        let table = tables
            .get(&schema.table_name)
            .ok_or_else(|| StoreError::TableMissing(schema.table_name.clone()))?;
        match table.items.get(&name) {
            Some(row) => Ok(Some(decode_item(schema, &name, row)?)),
            None => Ok(None),
        }
    }

    async fn delete(&self, schema: &TableSchema, id: &Value, range: Option<&Value>) -> Result<()> {
        let _ = range;
        let mut tables = self.tables.write().await;
        let table = tables
            .get_mut(&schema.table_name)
            .ok_or_else(|| StoreError::TableMissing(schema.table_name.clone()))?;
        table.items.remove(&id.canonical_encode());
        Ok(())
    }

    async fn delete_batch(&self, schema: &TableSchema, keys: Vec<KeyPair>) -> Result<()> {
        let mut tables = self.tables.write().await;
        let table = tables
            .get_mut(&schema.table_name)
            .ok_or_else(|| StoreError::TableMissing(schema.table_name.clone()))?;
        for (id, _range) in keys {
            table.items.remove(&id.canonical_encode());
        }
        Ok(())
    }

    async fn query(
        &self,
        schema: &TableSchema,
        plan: &QueryPlan,
        token: Option<&PageToken>,
    ) -> Result<QueryPage> {
        tracing::debug!(expression = %render_select(schema, plan, false), "Running select");
        let tables = self.tables.read().await;
        let table = tables
            .get(&schema.table_name)
            .ok_or_else(|| StoreError::TableMissing(schema.table_name.clone()))?;

        let matched = self.matching(schema, table, plan)?;

        let offset = match token {
            Some(token) => token
                .as_str()
                .parse::<usize>()
                .map_err(|_| StoreError::Validation("invalid continuation token".to_string()))?,
            None => 0,
        };
        let start = offset.min(matched.len());
        let end = (offset + self.page_size).min(matched.len());

        let mut items = Vec::with_capacity(end - start);
        for (name, row) in &matched[start..end] {
            let mut item = decode_item(schema, name, row)?;
            if let Some(projection) = &plan.projection {
                item.retain(|attr, _| {
                    attr == &schema.id_attr.name || projection.iter().any(|p| p == attr)
                });
            }
            items.push(item);
        }

        let next = (end < matched.len()).then(|| PageToken::new(end.to_string()));
        Ok(QueryPage { items, next })
    }

    async fn count(&self, schema: &TableSchema, plan: &QueryPlan) -> Result<u64> {
        tracing::debug!(expression = %render_select(schema, plan, true), "Running count");
        let tables = self.tables.read().await;
        let table = tables
            .get(&schema.table_name)
            .ok_or_else(|| StoreError::TableMissing(schema.table_name.clone()))?;
        Ok(self.matching(schema, table, plan)?.len() as u64)
    }
}
