//! In-process strict hash/range key store.
//!
//! Tables declare their key layout up front and every item must carry the
//! declared key attributes. Items keep their typed values; only the key is
//! encoded, so the tree order of `(hash, range)` pairs follows value order.
//!
//! A query with an equality filter on the id attribute becomes a direct key
//! access over one hash value; anything else is a full scan with typed
//! filter evaluation. Batch put is emulated with sequential writes, so a
//! failure partway leaves the earlier items committed.

use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use duostore_core::model::Value;
use duostore_core::query::{Direction, Filter, PageToken, QueryOp, QueryPlan, KEY_RANGE_OPS};
use duostore_core::storage::{
    KeyPair, PutCondition, QueryPage, RawItem, Result, StoreCapabilities, StoreDriver, StoreError,
    StoreKind, TableSchema,
};

const DEFAULT_PAGE_SIZE: usize = 100;

/// Operators this store evaluates, on key access or scan.
const OPERATORS: &[QueryOp] = &[
    QueryOp::Eq,
    QueryOp::Ne,
    QueryOp::Le,
    QueryOp::Lt,
    QueryOp::Ge,
    QueryOp::Gt,
    QueryOp::Between,
    QueryOp::In,
    QueryOp::Contains,
    QueryOp::NotContains,
    QueryOp::BeginsWith,
    QueryOp::IsNull,
    QueryOp::NotNull,
];

/// Full key of one item: encoded hash value plus encoded range value when
/// the table declares one. Encodings preserve value order, so the derived
/// `Ord` walks ranges in order within a hash.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
struct ItemKey {
    hash: String,
    range: Option<String>,
}

#[derive(Debug, Default)]
struct KeyTable {
    /// Key layout snapshot taken when the table was created.
    range_declared: bool,
    items: BTreeMap<ItemKey, RawItem>,
}

/// In-process engine with hash/range key-store semantics.
///
/// Cheap to clone; clones share the same tables.
#[derive(Debug, Clone)]
pub struct KeyStore {
    tables: Arc<RwLock<HashMap<String, KeyTable>>>,
    page_size: usize,
}

impl KeyStore {
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

impl Default for KeyStore {
    fn default() -> Self {
        Self::new()
    }
}

/// Builds the storage key for explicit key values, enforcing the table's
/// declared key shape.
fn item_key(
    schema: &TableSchema,
    table: &KeyTable,
    id: &Value,
    range: Option<&Value>,
) -> Result<ItemKey> {
    if id.is_empty() {
        return Err(StoreError::Validation(format!(
            "missing value for key attribute {}",
            schema.id_attr.name
        )));
    }
    let range = match (table.range_declared, range) {
        (true, Some(range)) if !range.is_empty() => Some(range.canonical_encode()),
        (true, _) => {
            return Err(StoreError::Validation(format!(
                "table {} requires a range key value",
                schema.table_name
            )))
        }
        (false, None) => None,
        (false, Some(_)) => {
            return Err(StoreError::Validation(format!(
                "table {} has no range key",
                schema.table_name
            )))
        }
    };
    Ok(ItemKey { hash: id.canonical_encode(), range })
}

/// Extracts the storage key from an item about to be stored.
fn key_of_item(schema: &TableSchema, table: &KeyTable, item: &RawItem) -> Result<ItemKey> {
    let id = item
        .get(&schema.id_attr.name)
        .filter(|v| !v.is_empty())
        .ok_or_else(|| {
            StoreError::Validation(format!("item is missing key attribute {}", schema.id_attr.name))
        })?;
    let range = if table.range_declared {
        let Some(range_attr) = &schema.range_attr else {
            return Err(StoreError::Validation(format!(
                "table {} requires a range key value",
                schema.table_name
            )));
        };
        let range = item
            .get(&range_attr.name)
            .filter(|v| !v.is_empty())
            .ok_or_else(|| {
                StoreError::Validation(format!("item is missing key attribute {}", range_attr.name))
            })?;
        Some(range.canonical_encode())
    } else {
        None
    };
    Ok(ItemKey { hash: id.canonical_encode(), range })
}

/// Compares two values of the same scalar kind, widening across `Int` and
/// `Long`. Incomparable pairs yield `None` and never match.
fn cmp_values(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Str(x), Value::Str(y)) => Some(x.cmp(y)),
        (Value::Int(_) | Value::Long(_), Value::Int(_) | Value::Long(_)) => {
            Some(a.as_long()?.cmp(&b.as_long()?))
        }
        (Value::Float(x), Value::Float(y)) => x.partial_cmp(y),
        (Value::Double(x), Value::Double(y)) => x.partial_cmp(y),
        (Value::Date(x), Value::Date(y)) => Some(x.cmp(y)),
        _ => None,
    }
}

/// Membership or substring test behind `contains`.
fn contains_value(stored: &Value, needle: &Value) -> bool {
    match (stored, needle) {
        (Value::Str(s), Value::Str(n)) => s.contains(n.as_str()),
        (Value::StrSet(s), Value::Str(n)) => s.contains(n),
        (Value::IntSet(s), Value::Int(n)) => s.contains(n),
        (Value::LongSet(s), Value::Long(n)) => s.contains(n),
        (Value::LongSet(s), Value::Int(n)) => s.contains(&i64::from(*n)),
        _ => false,
    }
}

/// Typed filter evaluation for the scan path.
fn scan_matches(item: &RawItem, filter: &Filter) -> Result<bool> {
    let stored = item
        .get(&filter.attr)
        .filter(|v| !matches!(v, Value::Null));

    match filter.op {
        QueryOp::IsNull => return Ok(stored.is_none()),
        QueryOp::NotNull => return Ok(stored.is_some()),
        _ => {}
    }
    let Some(stored) = stored else {
        return Ok(false);
    };

    // Sets only answer membership questions.
    let is_set = stored.kind().is_some_and(|k| k.is_set());
    if is_set && !matches!(filter.op, QueryOp::Contains | QueryOp::NotContains) {
        return Err(StoreError::Validation(format!(
            "operator {} not usable on the set attribute {}",
            filter.op, filter.attr
        )));
    }

    let first = filter.operands.first();
    let second = filter.operands.get(1);
    let ordered = |wanted: &[Ordering]| -> bool {
        first
            .and_then(|op| cmp_values(stored, op))
            .is_some_and(|ord| wanted.contains(&ord))
    };

    Ok(match filter.op {
        QueryOp::Eq => first.is_some_and(|op| stored == op),
        QueryOp::Ne => first.is_some_and(|op| stored != op),
        QueryOp::Le => ordered(&[Ordering::Less, Ordering::Equal]),
        QueryOp::Lt => ordered(&[Ordering::Less]),
        QueryOp::Ge => ordered(&[Ordering::Greater, Ordering::Equal]),
        QueryOp::Gt => ordered(&[Ordering::Greater]),
        QueryOp::Between => {
            let low = first.and_then(|op| cmp_values(stored, op));
            let high = second.and_then(|op| cmp_values(stored, op));
            low.is_some_and(|o| o != Ordering::Less) && high.is_some_and(|o| o != Ordering::Greater)
        }
        QueryOp::In => filter.operands.iter().any(|op| stored == op),
        QueryOp::Contains => first.is_some_and(|op| contains_value(stored, op)),
        QueryOp::NotContains => first.is_some_and(|op| !contains_value(stored, op)),
        QueryOp::BeginsWith => match (stored, first) {
            (Value::Str(s), Some(Value::Str(p))) => s.starts_with(p.as_str()),
            _ => false,
        },
        op => {
            return Err(StoreError::Unsupported {
                store: StoreKind::KeyStore,
                what: format!("operator {op}"),
            })
        }
    })
}

/// Encoded-range condition of a key access.
fn range_matches(op: QueryOp, range: &str, first: &str, second: &str) -> bool {
    match op {
        QueryOp::Eq => range == first,
        QueryOp::Le => range <= first,
        QueryOp::Lt => range < first,
        QueryOp::Ge => range >= first,
        QueryOp::Gt => range > first,
        QueryOp::Between => range >= first && range <= second,
        QueryOp::BeginsWith => range.starts_with(first),
        _ => false,
    }
}

impl KeyStore {
    /// Items matching the plan, already in result order and capped by the
    /// plan's limit.
    fn matching(
        &self,
        schema: &TableSchema,
        table: &KeyTable,
        plan: &QueryPlan,
    ) -> Result<Vec<RawItem>> {
        let id_attr = &schema.id_attr.name;
        let range_attr = schema.range_attr.as_ref().map(|r| r.name.as_str());

        let id_filter = plan
            .filters
            .iter()
            .find(|f| f.attr == *id_attr && f.op == QueryOp::Eq);

        let mut matched: Vec<RawItem> = if let Some(id_filter) = id_filter {
            // Direct key access over one hash value.
            let range_filters: Vec<&Filter> = plan
                .filters
                .iter()
                .filter(|f| Some(f.attr.as_str()) == range_attr)
                .collect();
            let extra = plan
                .filters
                .iter()
                .any(|f| f.attr != *id_attr && Some(f.attr.as_str()) != range_attr);
            if extra {
                return Err(StoreError::Unsupported {
                    store: StoreKind::KeyStore,
                    what: "non-key filters alongside a key query".to_string(),
                });
            }
            if range_filters.len() > 1 {
                return Err(StoreError::Validation(
                    "more than one filter on the range key".to_string(),
                ));
            }
            if let Some(range_filter) = range_filters.first() {
                if !KEY_RANGE_OPS.contains(&range_filter.op) {
                    return Err(StoreError::Unsupported {
                        store: StoreKind::KeyStore,
                        what: format!("operator {} on the range key of a key query", range_filter.op),
                    });
                }
            }

            let hash = id_filter
                .operands
                .first()
                .map(Value::canonical_encode)
                .ok_or_else(|| {
                    StoreError::Validation(format!("missing operand for the filter on {id_attr}"))
                })?;
            let range_condition = range_filters.first().map(|f| {
                let encoded: Vec<String> = f.operands.iter().map(Value::canonical_encode).collect();
                (f.op, encoded)
            });

            let mut hits = Vec::new();
            for (key, item) in &table.items {
                if key.hash != hash {
                    continue;
                }
                if let Some((op, encoded)) = &range_condition {
                    let range = key.range.as_deref().unwrap_or("");
                    let first = encoded.first().map(String::as_str).unwrap_or("");
                    let second = encoded.get(1).map(String::as_str).unwrap_or("");
                    if !range_matches(*op, range, first, second) {
                        continue;
                    }
                }
                hits.push(item.clone());
            }
            if let Some(order) = &plan.order_by {
                if order.direction == Direction::Desc {
                    hits.reverse();
                }
            }
            hits
        } else {
            // Full scan with typed filter evaluation.
            if plan.order_by.is_some() {
                return Err(StoreError::Unsupported {
                    store: StoreKind::KeyStore,
                    what: "order by is limited to the range key of a key query".to_string(),
                });
            }
            let mut hits = Vec::new();
            'items: for item in table.items.values() {
                for filter in &plan.filters {
                    if !scan_matches(item, filter)? {
                        continue 'items;
                    }
                }
                hits.push(item.clone());
            }
            hits
        };

        if let Some(limit) = plan.limit {
            matched.truncate(limit);
        }
        Ok(matched)
    }
}

#[async_trait]
impl StoreDriver for KeyStore {
    fn kind(&self) -> StoreKind {
        StoreKind::KeyStore
    }

    fn capabilities(&self) -> StoreCapabilities {
        StoreCapabilities {
            store: StoreKind::KeyStore,
            operators: OPERATORS,
            in_on_range_key: false,
            id_filters_force_key_access: true,
            extra_filters_with_key_access: false,
            order_by_any_field: false,
            consistent_read: true,
            native_batch_put: false,
        }
    }

    fn attr_name(&self, _schema: &TableSchema, attr: &str) -> String {
        attr.to_string()
    }

    async fn create_table(&self, schema: &TableSchema) -> Result<()> {
        let mut tables = self.tables.write().await;
        if tables.contains_key(&schema.table_name) {
            return Err(StoreError::TableExists(schema.table_name.clone()));
        }
        tables.insert(
            schema.table_name.clone(),
            KeyTable { range_declared: schema.range_attr.is_some(), items: BTreeMap::new() },
        );
        Ok(())
    }

    async fn delete_table(&self, schema: &TableSchema) -> Result<()> {
        let mut tables = self.tables.write().await;
        tables
            .remove(&schema.table_name)
            .map(|_| ())
            .ok_or_else(|| StoreError::TableMissing(schema.table_name.clone()))
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
        let mut tables = self.tables.write().await;
        let table = tables
            .get_mut(&schema.table_name)
            .ok_or_else(|| StoreError::TableMissing(schema.table_name.clone()))?;
        let key = key_of_item(schema, table, &item)?;

        if let Some(condition) = &condition {
            let stored = table
                .items
                .get(&key)
                .and_then(|existing| existing.get(condition.attr()))
                .filter(|v| !matches!(v, Value::Null));
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
                    if stored != Some(value) {
                        return Err(StoreError::WriteConflict {
                            model: schema.model_name.clone(),
                            detail: format!("expected {attr} = {value}"),
                        });
                    }
                }
            }
        }

        table.items.insert(key, item);
        Ok(())
    }

    async fn put_batch(&self, schema: &TableSchema, items: Vec<RawItem>) -> Result<()> {
        // No native batch write here: items land one by one and a failure
        // partway leaves the earlier ones committed.
        tracing::debug!(
            table = %schema.table_name,
            count = items.len(),
            "Emulating batch put with sequential writes"
        );
        for item in items {
            self.put(schema, item, None).await?;
        }
        Ok(())
    }

    async fn get(
        &self,
        schema: &TableSchema,
        id: &Value,
        range: Option<&Value>,
    ) -> Result<Option<RawItem>> {
        let tables = self.tables.read().await;
        let table = tables
            .get(&schema.table_name)
            .ok_or_else(|| StoreError::TableMissing(schema.table_name.clone()))?;
        let key = item_key(schema, table, id, range)?;
        Ok(table.items.get(&key).cloned())
    }

    async fn delete(&self, schema: &TableSchema, id: &Value, range: Option<&Value>) -> Result<()> {
        let mut tables = self.tables.write().await;
        let table = tables
            .get_mut(&schema.table_name)
            .ok_or_else(|| StoreError::TableMissing(schema.table_name.clone()))?;
        let key = item_key(schema, table, id, range)?;
        table.items.remove(&key);
        Ok(())
    }

    async fn delete_batch(&self, schema: &TableSchema, keys: Vec<KeyPair>) -> Result<()> {
        let mut tables = self.tables.write().await;
        let table = tables
            .get_mut(&schema.table_name)
            .ok_or_else(|| StoreError::TableMissing(schema.table_name.clone()))?;
        for (id, range) in keys {
            let key = item_key(schema, table, &id, range.as_ref())?;
            table.items.remove(&key);
        }
        Ok(())
    }

    async fn query(
        &self,
        schema: &TableSchema,
        plan: &QueryPlan,
        token: Option<&PageToken>,
    ) -> Result<QueryPage> {
        if plan.consistent_read {
            tracing::debug!(table = %schema.table_name, "Serving consistent read");
        }
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
        for item in &matched[start..end] {
            let mut item = item.clone();
            if let Some(projection) = &plan.projection {
                // Unlike the attribute store, keys are not implicitly added.
                item.retain(|attr, _| projection.iter().any(|p| p == attr));
            }
            items.push(item);
        }

        let next = (end < matched.len()).then(|| PageToken::new(end.to_string()));
        Ok(QueryPage { items, next })
    }

    async fn count(&self, schema: &TableSchema, plan: &QueryPlan) -> Result<u64> {
        let tables = self.tables.read().await;
        let table = tables
            .get(&schema.table_name)
            .ok_or_else(|| StoreError::TableMissing(schema.table_name.clone()))?;
        Ok(self.matching(schema, table, plan)?.len() as u64)
    }
}
