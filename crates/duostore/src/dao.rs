//! Object-level data access over one registered model.
//!
//! A [`Dao`] binds a model descriptor to a backend driver and a cache
//! manager. Writes run the full pre-store pipeline (hooks, generated
//! fields, composites, validators) before reaching the driver; reads
//! consult the cache first and fall back to the backend. Every id and
//! range value is checked against the declared key shape before any
//! backend call.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use duostore_core::cache::CacheStore;
use duostore_core::model::{FieldDef, IdLength, ModelDescriptor, Registry, Value, ValueKind};
use duostore_core::query::QueryOp;
use duostore_core::storage::{
    KeyPair, PutCondition, Result, StoreDriver, StoreError, TableSchema,
};

use crate::cache::ObjectCache;
use crate::query::Query;

/// Wraps an integer in the value variant matching the field's declared kind.
fn numeric_for_kind(kind: ValueKind, n: i64) -> Value {
    if kind == ValueKind::Int {
        Value::Int(n as i32)
    } else {
        Value::Long(n)
    }
}

/// A fresh hex token for a generated id field.
fn fresh_id_token(length: IdLength) -> String {
    let hex = Uuid::new_v4().simple().to_string();
    hex[..length.token_len()].to_string()
}

/// Typed persistence surface for one model.
///
/// Construct one per record type from a [`Registry`] holding the model,
/// a backend driver and a cache provider. Clones are cheap and share the
/// driver and cache.
///
/// `put` carries optimistic concurrency when the model declares a version
/// field: the expected value is captured before the pipeline bumps it, so
/// a concurrent writer surfaces as `StoreError::WriteConflict`. Nothing
/// retries on the caller's behalf.
pub struct Dao<T> {
    descriptor: Arc<ModelDescriptor<T>>,
    schema: Arc<TableSchema>,
    driver: Arc<dyn StoreDriver>,
    cache: ObjectCache,
}

impl<T> Clone for Dao<T> {
    fn clone(&self) -> Self {
        Self {
            descriptor: self.descriptor.clone(),
            schema: self.schema.clone(),
            driver: self.driver.clone(),
            cache: self.cache.clone(),
        }
    }
}

impl<T: Default + Send + Sync + 'static> Dao<T> {
    /// Resolves the model for `T` from the registry and binds it to the
    /// given driver and cache provider.
    pub fn new(
        registry: &Registry,
        driver: Arc<dyn StoreDriver>,
        cache_store: Arc<dyn CacheStore>,
    ) -> Result<Self> {
        let descriptor = registry
            .descriptor::<T>()
            .map_err(|e| StoreError::Validation(e.to_string()))?;
        let schema = registry
            .schema(descriptor.model_name())
            .map_err(|e| StoreError::Validation(e.to_string()))?;
        let cache = ObjectCache::new(driver.kind(), cache_store);
        Ok(Self {
            descriptor,
            schema,
            driver,
            cache,
        })
    }

    pub fn model_name(&self) -> &str {
        self.descriptor.model_name()
    }

    pub fn schema(&self) -> &TableSchema {
        &self.schema
    }

    /// The cache manager serving this Dao.
    pub fn cache(&self) -> &ObjectCache {
        &self.cache
    }

    pub async fn create_table(&self) -> Result<()> {
        self.driver.create_table(&self.schema).await
    }

    pub async fn delete_table(&self) -> Result<()> {
        self.driver.delete_table(&self.schema).await
    }

    /// Stores one record.
    ///
    /// Runs the pre-store pipeline first: the pre-persist hook, generated
    /// id / version / modified-time fills, composite fills, the
    /// pre-validate hook, then field validators. The record is mutated in
    /// place by the pipeline whether or not the write goes through.
    ///
    /// When the model declares a version field the write is conditional:
    /// a record with version zero expects no stored version (a fresh
    /// item), any other value expects an exact match. On success the
    /// record is written back to the cache best effort.
    pub async fn put(&self, record: &mut T) -> Result<()> {
        // The expected version is read before the pipeline bumps it.
        let condition = self.version_condition(record);
        self.store(record, condition).await
    }

    /// Stores one record gated on `field` currently holding `expected`.
    ///
    /// The pre-store pipeline runs exactly as in [`Dao::put`]; only the
    /// condition differs.
    pub async fn put_if(
        &self,
        record: &mut T,
        field: &str,
        expected: impl Into<Value>,
    ) -> Result<()> {
        let def = self.field(field)?;
        let expected = expected
            .into()
            .coerce(def.kind)
            .map_err(|e| StoreError::Validation(format!("condition on {}: {e}", def.name)))?;
        let condition = PutCondition::Equals {
            attr: def.attr_name.clone(),
            value: expected,
        };
        self.store(record, Some(condition)).await
    }

    /// Stores one record gated on `field` currently holding no value.
    ///
    /// The complement of [`Dao::put_if`] for claim-style writes: the write
    /// goes through only when the attribute is absent from the stored item.
    pub async fn put_if_absent(&self, record: &mut T, field: &str) -> Result<()> {
        let def = self.field(field)?;
        let condition = PutCondition::Absent {
            attr: def.attr_name.clone(),
        };
        self.store(record, Some(condition)).await
    }

    /// Stores a batch of records without conditional checks.
    ///
    /// Every record runs the pre-store pipeline before the first write is
    /// issued, so a pipeline failure leaves the backend untouched. The
    /// batch itself is not transactional on every backend; on a partial
    /// failure nothing is written back to the cache.
    pub async fn batch_put(&self, records: &mut [T]) -> Result<()> {
        for record in records.iter_mut() {
            self.pre_store(record)?;
        }
        let items = records
            .iter()
            .map(|record| self.descriptor.to_raw(record))
            .collect();
        self.driver.put_batch(&self.schema, items).await?;
        for record in records.iter() {
            self.cache.put_record(&self.descriptor, record).await;
        }
        Ok(())
    }

    /// Loads one record by id. The model must not declare a range key.
    ///
    /// The cache is consulted first; a hit is returned as-is. Only a
    /// record loaded from the backend passes through the post-load hook
    /// before being cached and returned.
    pub async fn get(&self, id: impl Into<Value>) -> Result<Option<T>> {
        let (id, range) = self.key_args(id.into(), None)?;
        self.load(id, range).await
    }

    /// Loads one record by id and range key.
    pub async fn get_with_range(
        &self,
        id: impl Into<Value>,
        range: impl Into<Value>,
    ) -> Result<Option<T>> {
        let (id, range) = self.key_args(id.into(), Some(range.into()))?;
        self.load(id, range).await
    }

    /// Deletes one record by id. Missing records delete cleanly.
    pub async fn delete(&self, id: impl Into<Value>) -> Result<()> {
        let (id, range) = self.key_args(id.into(), None)?;
        self.remove(id, range).await
    }

    /// Deletes one record by id and range key.
    pub async fn delete_with_range(
        &self,
        id: impl Into<Value>,
        range: impl Into<Value>,
    ) -> Result<()> {
        let (id, range) = self.key_args(id.into(), Some(range.into()))?;
        self.remove(id, range).await
    }

    /// Deletes a batch of records by id.
    pub async fn batch_delete<I: Into<Value>>(&self, ids: Vec<I>) -> Result<()> {
        let mut keys = Vec::with_capacity(ids.len());
        for id in ids {
            keys.push(self.key_args(id.into(), None)?);
        }
        self.remove_batch(keys).await
    }

    /// Deletes a batch of records by id and range key.
    pub async fn batch_delete_with_range<I, R>(&self, pairs: Vec<(I, R)>) -> Result<()>
    where
        I: Into<Value>,
        R: Into<Value>,
    {
        let mut keys = Vec::with_capacity(pairs.len());
        for (id, range) in pairs {
            keys.push(self.key_args(id.into(), Some(range.into()))?);
        }
        self.remove_batch(keys).await
    }

    /// Finds the first record whose `field` equals `value`.
    ///
    /// When the field is a declared cache-index the cache is probed by
    /// field value before any backend query runs.
    pub async fn find_by(&self, field: &str, value: impl Into<Value>) -> Result<Option<T>> {
        let def = self.field(field)?;
        let value = value
            .into()
            .coerce(def.kind.element())
            .map_err(|e| StoreError::Validation(format!("filter on {}: {e}", def.name)))?;
        if def.cache_index {
            if let Some(record) = self
                .cache
                .get_by_field(&self.descriptor, &def.name, &value)
                .await
            {
                return Ok(Some(record));
            }
        }
        let mut query = self.query().filter(field, QueryOp::Eq, value).limit(1);
        let records = query.run().await?;
        Ok(records.into_iter().next())
    }

    /// Starts a query over this model.
    pub fn query(&self) -> Query<T> {
        Query::new(
            self.descriptor.clone(),
            self.schema.clone(),
            self.driver.clone(),
            self.cache.clone(),
        )
    }

    // ==================== Pre-store pipeline ====================

    fn pre_store(&self, record: &mut T) -> Result<()> {
        if let Some(hook) = self.descriptor.pre_persist_hook() {
            hook(record);
        }
        self.fill_generated(record)?;
        self.fill_composites(record)?;
        if let Some(hook) = self.descriptor.pre_validate_hook() {
            hook(record);
        }
        self.validate(record)
    }

    fn fill_generated(&self, record: &mut T) -> Result<()> {
        for field in self.descriptor.fields() {
            if let Some(length) = field.generated_id {
                if (field.getter)(record).is_empty() {
                    let token = fresh_id_token(length);
                    (field.setter)(record, Value::Str(token)).map_err(StoreError::Validation)?;
                }
            }
            if field.is_version {
                let next = (field.getter)(record).as_long().unwrap_or(0) + 1;
                let value = numeric_for_kind(field.kind, next);
                (field.setter)(record, value).map_err(StoreError::Validation)?;
            }
            if field.is_modified_time {
                // Stamp at millisecond precision, matching the stored
                // date encoding.
                let now = Utc::now();
                let now = DateTime::from_timestamp_millis(now.timestamp_millis()).unwrap_or(now);
                (field.setter)(record, Value::Date(now)).map_err(StoreError::Validation)?;
            }
        }
        Ok(())
    }

    /// Joins composite fields from their sources. A composite with a
    /// caller-assigned value is left alone; empty source parts are
    /// skipped rather than joined as empty segments.
    fn fill_composites(&self, record: &mut T) -> Result<()> {
        for field in self.descriptor.fields() {
            let Some(spec) = &field.composite else {
                continue;
            };
            if !(field.getter)(record).is_empty() {
                continue;
            }
            let mut parts = Vec::with_capacity(spec.sources.len());
            for source in &spec.sources {
                let Some(source_field) = self.descriptor.field(&source.field) else {
                    continue;
                };
                let value = (source_field.getter)(record);
                if value.is_empty() {
                    continue;
                }
                let mut text = value.to_string();
                if let Some(len) = source.substr_len {
                    text = text.chars().take(len).collect();
                }
                parts.push(text);
            }
            let joined = parts.join(&spec.separator);
            (field.setter)(record, Value::Str(joined)).map_err(StoreError::Validation)?;
        }
        Ok(())
    }

    fn validate(&self, record: &T) -> Result<()> {
        for field in self.descriptor.fields() {
            if let Some(validator) = &field.validator {
                let value = (field.getter)(record);
                validator(&value)
                    .map_err(|e| StoreError::Validation(format!("field {}: {e}", field.name)))?;
            }
        }
        Ok(())
    }

    fn version_condition(&self, record: &T) -> Option<PutCondition> {
        let field = self.descriptor.version_field()?;
        let current = (field.getter)(record).as_long().unwrap_or(0);
        if current > 0 {
            Some(PutCondition::Equals {
                attr: field.attr_name.clone(),
                value: numeric_for_kind(field.kind, current),
            })
        } else {
            Some(PutCondition::Absent {
                attr: field.attr_name.clone(),
            })
        }
    }

    // ==================== Key handling ====================

    fn field(&self, name: &str) -> Result<&FieldDef<T>> {
        self.descriptor.field(name).ok_or_else(|| {
            StoreError::Validation(format!(
                "unknown field {name} on model {}",
                self.descriptor.model_name()
            ))
        })
    }

    /// Checks one key value against a key field: only string and integer
    /// kinds are usable as keys, and `Int` widens to a `Long` field.
    fn check_key(&self, value: Value, field: &FieldDef<T>) -> Result<Value> {
        match value.kind() {
            Some(kind) if kind.is_key_kind() => value
                .coerce(field.kind)
                .map_err(|e| StoreError::Validation(format!("key value for {}: {e}", field.name))),
            Some(kind) => Err(StoreError::Validation(format!(
                "key value for {} must be str, int or long, got {kind}",
                field.name
            ))),
            None => Err(StoreError::Validation(format!(
                "key value for {} must not be null",
                field.name
            ))),
        }
    }

    fn key_args(&self, id: Value, range: Option<Value>) -> Result<(Value, Option<Value>)> {
        let id = self.check_key(id, self.descriptor.id_field())?;
        match (self.descriptor.range_field(), range) {
            (Some(range_field), Some(range)) => {
                Ok((id, Some(self.check_key(range, range_field)?)))
            }
            (Some(_), None) => Err(StoreError::Validation(format!(
                "model {} requires a range key",
                self.descriptor.model_name()
            ))),
            (None, Some(_)) => Err(StoreError::Validation(format!(
                "model {} does not declare a range key",
                self.descriptor.model_name()
            ))),
            (None, None) => Ok((id, None)),
        }
    }

    // ==================== Backend round trips ====================

    async fn store(&self, record: &mut T, condition: Option<PutCondition>) -> Result<()> {
        self.pre_store(record)?;
        let item = self.descriptor.to_raw(record);
        self.driver.put(&self.schema, item, condition).await?;
        self.cache.put_record(&self.descriptor, record).await;
        Ok(())
    }

    async fn load(&self, id: Value, range: Option<Value>) -> Result<Option<T>> {
        if let Some(record) = self
            .cache
            .get_record(&self.descriptor, &id, range.as_ref())
            .await
        {
            return Ok(Some(record));
        }
        let Some(item) = self.driver.get(&self.schema, &id, range.as_ref()).await? else {
            return Ok(None);
        };
        let mut record = self
            .descriptor
            .from_raw(&item)
            .map_err(StoreError::Serialization)?;
        if let Some(hook) = self.descriptor.post_load_hook() {
            hook(&mut record);
        }
        self.cache.put_record(&self.descriptor, &record).await;
        Ok(Some(record))
    }

    async fn remove(&self, id: Value, range: Option<Value>) -> Result<()> {
        // Evicted before the backend delete so an interruption in between
        // leaves a cache miss, not a stale record.
        self.cache
            .delete_record(&self.descriptor, &id, range.as_ref())
            .await;
        self.driver.delete(&self.schema, &id, range.as_ref()).await
    }

    async fn remove_batch(&self, keys: Vec<KeyPair>) -> Result<()> {
        for (id, range) in &keys {
            self.cache
                .delete_record(&self.descriptor, id, range.as_ref())
                .await;
        }
        self.driver.delete_batch(&self.schema, keys).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;

    use duostore_core::model::{CompositeSource, ModelBuilder};
    use duostore_core::query::{PageToken, QueryPlan};
    use duostore_core::storage::{QueryPage, RawItem, StoreCapabilities, StoreKind};

    use crate::cache::LruCacheStore;
    use crate::storage::{AttrStore, KeyStore};

    // ==================== Test Models ====================

    #[derive(Debug, Clone, Default, PartialEq)]
    struct Person {
        id: String,
        name: String,
        age: i32,
        nickname: String,
        version: i64,
        updated_at: Option<DateTime<Utc>>,
    }

    fn person_model() -> ModelDescriptor<Person> {
        ModelBuilder::new("person")
            .field(
                FieldDef::new(
                    "id",
                    ValueKind::Str,
                    |p: &Person| Value::Str(p.id.clone()),
                    |p: &mut Person, v| {
                        p.id = v.try_into_string()?;
                        Ok(())
                    },
                )
                .id()
                .generated_id(IdLength::Short),
            )
            .field(FieldDef::new(
                "name",
                ValueKind::Str,
                |p: &Person| Value::Str(p.name.clone()),
                |p: &mut Person, v| {
                    p.name = v.try_into_string()?;
                    Ok(())
                },
            ))
            .field(
                FieldDef::new(
                    "age",
                    ValueKind::Int,
                    |p: &Person| Value::Int(p.age),
                    |p: &mut Person, v| {
                        p.age = v.try_into_int()?;
                        Ok(())
                    },
                )
                .validator(|v| {
                    if v.as_long().is_some_and(|age| age < 0) {
                        Err("age must not be negative".to_string())
                    } else {
                        Ok(())
                    }
                }),
            )
            .field(
                FieldDef::new(
                    "nickname",
                    ValueKind::Str,
                    |p: &Person| Value::Str(p.nickname.clone()),
                    |p: &mut Person, v| {
                        p.nickname = v.try_into_string()?;
                        Ok(())
                    },
                )
                .cache_index(),
            )
            .field(
                FieldDef::new(
                    "version",
                    ValueKind::Long,
                    |p: &Person| Value::Long(p.version),
                    |p: &mut Person, v| {
                        p.version = v.try_into_long()?;
                        Ok(())
                    },
                )
                .version(),
            )
            .field(
                FieldDef::new(
                    "updated_at",
                    ValueKind::Date,
                    |p: &Person| p.updated_at.map_or(Value::Null, Value::Date),
                    |p: &mut Person, v| {
                        p.updated_at = match v {
                            Value::Null => None,
                            other => Some(other.try_into_date()?),
                        };
                        Ok(())
                    },
                )
                .modified_time(),
            )
            .build()
            .unwrap()
    }

    #[derive(Debug, Clone, Default, PartialEq)]
    struct Session {
        id: String,
        data: String,
    }

    fn session_model() -> ModelDescriptor<Session> {
        ModelBuilder::new("session")
            .field(
                FieldDef::new(
                    "id",
                    ValueKind::Str,
                    |s: &Session| Value::Str(s.id.clone()),
                    |s: &mut Session, v| {
                        s.id = v.try_into_string()?;
                        Ok(())
                    },
                )
                .id()
                .generated_id(IdLength::Long),
            )
            .field(FieldDef::new(
                "data",
                ValueKind::Str,
                |s: &Session| Value::Str(s.data.clone()),
                |s: &mut Session, v| {
                    s.data = v.try_into_string()?;
                    Ok(())
                },
            ))
            .cache(true, 1)
            .build()
            .unwrap()
    }

    #[derive(Debug, Clone, Default, PartialEq)]
    struct Order {
        id: String,
        name: String,
        phone: String,
        code: String,
        label: String,
    }

    fn order_model() -> ModelDescriptor<Order> {
        ModelBuilder::new("order")
            .field(
                FieldDef::new(
                    "id",
                    ValueKind::Str,
                    |o: &Order| Value::Str(o.id.clone()),
                    |o: &mut Order, v| {
                        o.id = v.try_into_string()?;
                        Ok(())
                    },
                )
                .id(),
            )
            .field(FieldDef::new(
                "name",
                ValueKind::Str,
                |o: &Order| Value::Str(o.name.clone()),
                |o: &mut Order, v| {
                    o.name = v.try_into_string()?;
                    Ok(())
                },
            ))
            .field(FieldDef::new(
                "phone",
                ValueKind::Str,
                |o: &Order| Value::Str(o.phone.clone()),
                |o: &mut Order, v| {
                    o.phone = v.try_into_string()?;
                    Ok(())
                },
            ))
            .field(FieldDef::new(
                "code",
                ValueKind::Str,
                |o: &Order| Value::Str(o.code.clone()),
                |o: &mut Order, v| {
                    o.code = v.try_into_string()?;
                    Ok(())
                },
            ))
            .field(FieldDef::new(
                "label",
                ValueKind::Str,
                |o: &Order| Value::Str(o.label.clone()),
                |o: &mut Order, v| {
                    o.label = v.try_into_string()?;
                    Ok(())
                },
            )
            .composite(
                vec![
                    CompositeSource {
                        field: "name".to_string(),
                        substr_len: None,
                    },
                    CompositeSource {
                        field: "phone".to_string(),
                        substr_len: None,
                    },
                    CompositeSource {
                        field: "code".to_string(),
                        substr_len: Some(8),
                    },
                ],
                "/",
            ))
            .build()
            .unwrap()
    }

    #[derive(Debug, Clone, Default, PartialEq)]
    struct Event {
        account: String,
        ts: i64,
        amount: i32,
        note: String,
    }

    fn event_model() -> ModelDescriptor<Event> {
        ModelBuilder::new("event")
            .field(
                FieldDef::new(
                    "account",
                    ValueKind::Str,
                    |e: &Event| Value::Str(e.account.clone()),
                    |e: &mut Event, v| {
                        e.account = v.try_into_string()?;
                        Ok(())
                    },
                )
                .id(),
            )
            .field(
                FieldDef::new(
                    "ts",
                    ValueKind::Long,
                    |e: &Event| Value::Long(e.ts),
                    |e: &mut Event, v| {
                        e.ts = v.try_into_long()?;
                        Ok(())
                    },
                )
                .range_key(),
            )
            .field(FieldDef::new(
                "amount",
                ValueKind::Int,
                |e: &Event| Value::Int(e.amount),
                |e: &mut Event, v| {
                    e.amount = v.try_into_int()?;
                    Ok(())
                },
            ))
            .field(FieldDef::new(
                "note",
                ValueKind::Str,
                |e: &Event| Value::Str(e.note.clone()),
                |e: &mut Event, v| {
                    e.note = v.try_into_string()?;
                    Ok(())
                },
            ))
            .build()
            .unwrap()
    }

    #[derive(Debug, Clone, Default, PartialEq)]
    struct Audited {
        id: String,
        trail: String,
    }

    fn audited_model() -> ModelDescriptor<Audited> {
        ModelBuilder::new("audited")
            .field(
                FieldDef::new(
                    "id",
                    ValueKind::Str,
                    |a: &Audited| Value::Str(a.id.clone()),
                    |a: &mut Audited, v| {
                        a.id = v.try_into_string()?;
                        Ok(())
                    },
                )
                .id(),
            )
            .field(FieldDef::new(
                "trail",
                ValueKind::Str,
                |a: &Audited| Value::Str(a.trail.clone()),
                |a: &mut Audited, v| {
                    a.trail = v.try_into_string()?;
                    Ok(())
                },
            ))
            .pre_persist(|a: &mut Audited| a.trail.push_str("persist;"))
            .pre_validate(|a: &mut Audited| a.trail.push_str("validate;"))
            .post_load(|a: &mut Audited| a.trail.push_str("load;"))
            .build()
            .unwrap()
    }

    fn registry() -> Registry {
        let mut registry = Registry::new();
        registry.register(person_model()).unwrap();
        registry.register(session_model()).unwrap();
        registry.register(order_model()).unwrap();
        registry.register(event_model()).unwrap();
        registry.register(audited_model()).unwrap();
        registry
    }

    fn sample_person() -> Person {
        Person {
            name: "abc".to_string(),
            age: 25,
            nickname: "ace".to_string(),
            ..Person::default()
        }
    }

    // ==================== Counting Driver ====================

    /// Delegating driver that counts backend round trips, so tests can
    /// tell a cache hit from a backend load.
    struct CountingDriver {
        inner: Arc<dyn StoreDriver>,
        gets: AtomicUsize,
        puts: AtomicUsize,
        queries: AtomicUsize,
    }

    impl CountingDriver {
        fn new(inner: Arc<dyn StoreDriver>) -> Arc<Self> {
            Arc::new(Self {
                inner,
                gets: AtomicUsize::new(0),
                puts: AtomicUsize::new(0),
                queries: AtomicUsize::new(0),
            })
        }

        fn gets(&self) -> usize {
            self.gets.load(Ordering::SeqCst)
        }

        fn puts(&self) -> usize {
            self.puts.load(Ordering::SeqCst)
        }

        fn queries(&self) -> usize {
            self.queries.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl StoreDriver for CountingDriver {
        fn kind(&self) -> StoreKind {
            self.inner.kind()
        }

        fn capabilities(&self) -> StoreCapabilities {
            self.inner.capabilities()
        }

        fn attr_name(&self, schema: &TableSchema, attr: &str) -> String {
            self.inner.attr_name(schema, attr)
        }

        async fn create_table(&self, schema: &TableSchema) -> Result<()> {
            self.inner.create_table(schema).await
        }

        async fn delete_table(&self, schema: &TableSchema) -> Result<()> {
            self.inner.delete_table(schema).await
        }

        async fn list_tables(&self) -> Result<Vec<String>> {
            self.inner.list_tables().await
        }

        async fn put(
            &self,
            schema: &TableSchema,
            item: RawItem,
            condition: Option<PutCondition>,
        ) -> Result<()> {
            self.puts.fetch_add(1, Ordering::SeqCst);
            self.inner.put(schema, item, condition).await
        }

        async fn put_batch(&self, schema: &TableSchema, items: Vec<RawItem>) -> Result<()> {
            self.inner.put_batch(schema, items).await
        }

        async fn get(
            &self,
            schema: &TableSchema,
            id: &Value,
            range: Option<&Value>,
        ) -> Result<Option<RawItem>> {
            self.gets.fetch_add(1, Ordering::SeqCst);
            self.inner.get(schema, id, range).await
        }

        async fn delete(
            &self,
            schema: &TableSchema,
            id: &Value,
            range: Option<&Value>,
        ) -> Result<()> {
            self.inner.delete(schema, id, range).await
        }

        async fn delete_batch(&self, schema: &TableSchema, keys: Vec<KeyPair>) -> Result<()> {
            self.inner.delete_batch(schema, keys).await
        }

        async fn query(
            &self,
            schema: &TableSchema,
            plan: &QueryPlan,
            token: Option<&PageToken>,
        ) -> Result<QueryPage> {
            self.queries.fetch_add(1, Ordering::SeqCst);
            self.inner.query(schema, plan, token).await
        }

        async fn count(&self, schema: &TableSchema, plan: &QueryPlan) -> Result<u64> {
            self.inner.count(schema, plan).await
        }
    }

    async fn attr_dao<T: Default + Send + Sync + 'static>() -> (Arc<CountingDriver>, Dao<T>) {
        let counting = CountingDriver::new(Arc::new(AttrStore::new()));
        let driver: Arc<dyn StoreDriver> = counting.clone();
        let dao = Dao::new(&registry(), driver, Arc::new(LruCacheStore::new(100))).unwrap();
        dao.create_table().await.unwrap();
        (counting, dao)
    }

    async fn key_dao<T: Default + Send + Sync + 'static>() -> (Arc<CountingDriver>, Dao<T>) {
        let counting = CountingDriver::new(Arc::new(KeyStore::new()));
        let driver: Arc<dyn StoreDriver> = counting.clone();
        let dao = Dao::new(&registry(), driver, Arc::new(LruCacheStore::new(100))).unwrap();
        dao.create_table().await.unwrap();
        (counting, dao)
    }

    // ==================== Construction Tests ====================

    #[tokio::test]
    async fn test_new_requires_registered_model() {
        let driver: Arc<dyn StoreDriver> = Arc::new(AttrStore::new());
        let registry = Registry::new();

        let result = Dao::<Person>::new(&registry, driver, Arc::new(LruCacheStore::new(10)));

        assert!(matches!(result, Err(StoreError::Validation(_))));
    }

    // ==================== Put Pipeline Tests ====================

    #[tokio::test]
    async fn test_put_fills_generated_id_version_and_modified_time() {
        let (_, dao) = attr_dao::<Person>().await;
        let mut person = sample_person();

        dao.put(&mut person).await.unwrap();

        assert_eq!(person.id.len(), 8);
        assert_eq!(person.version, 1);
        assert!(person.updated_at.is_some());

        let first_stamp = person.updated_at;
        dao.put(&mut person).await.unwrap();
        assert_eq!(person.version, 2);
        assert!(person.updated_at >= first_stamp);

        // Tokens are distinct across records.
        let mut other = sample_person();
        dao.put(&mut other).await.unwrap();
        assert_ne!(other.id, person.id);

        // The long token class yields sixteen characters.
        let (_, sessions) = attr_dao::<Session>().await;
        let mut session = Session {
            data: "payload".to_string(),
            ..Session::default()
        };
        sessions.put(&mut session).await.unwrap();
        assert_eq!(session.id.len(), 16);
    }

    #[tokio::test]
    async fn test_put_keeps_caller_assigned_id() {
        let (_, dao) = attr_dao::<Person>().await;
        let mut person = Person {
            id: "custom-id".to_string(),
            ..sample_person()
        };

        dao.put(&mut person).await.unwrap();

        assert_eq!(person.id, "custom-id");
    }

    #[tokio::test]
    async fn test_put_stale_version_conflicts() {
        let (_, dao) = attr_dao::<Person>().await;
        let mut first = sample_person();
        dao.put(&mut first).await.unwrap();

        let mut second = first.clone();
        dao.put(&mut second).await.unwrap();

        // `first` still carries the version both started from.
        let err = dao.put(&mut first).await.unwrap_err();
        assert!(matches!(err, StoreError::WriteConflict { .. }));
    }

    #[tokio::test]
    async fn test_put_new_record_over_existing_conflicts() {
        let (_, dao) = attr_dao::<Person>().await;
        let mut stored = Person {
            id: "fixed".to_string(),
            ..sample_person()
        };
        dao.put(&mut stored).await.unwrap();

        let mut fresh = Person {
            id: "fixed".to_string(),
            ..sample_person()
        };
        let err = dao.put(&mut fresh).await.unwrap_err();

        assert!(matches!(err, StoreError::WriteConflict { .. }));
    }

    #[tokio::test]
    async fn test_put_if_checks_named_field() {
        let (_, dao) = attr_dao::<Person>().await;
        let mut person = sample_person();
        dao.put(&mut person).await.unwrap();

        dao.put_if(&mut person, "nickname", "ace").await.unwrap();

        let err = dao
            .put_if(&mut person, "nickname", "stranger")
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::WriteConflict { .. }));
    }

    #[tokio::test]
    async fn test_put_if_absent_claims_unset_field() {
        let (_, dao) = attr_dao::<Person>().await;
        let mut person = sample_person();
        dao.put_if_absent(&mut person, "nickname").await.unwrap();

        let mut again = person.clone();
        let err = dao.put_if_absent(&mut again, "nickname").await.unwrap_err();

        assert!(matches!(err, StoreError::WriteConflict { .. }));
    }

    #[tokio::test]
    async fn test_validator_failure_aborts_before_write() {
        let (counting, dao) = attr_dao::<Person>().await;
        let mut person = Person {
            age: -5,
            ..sample_person()
        };

        let err = dao.put(&mut person).await.unwrap_err();

        assert_eq!(
            err,
            StoreError::Validation("field age: age must not be negative".to_string())
        );
        assert_eq!(counting.puts(), 0);
    }

    #[tokio::test]
    async fn test_composite_label_fills_only_when_empty() {
        let (_, dao) = attr_dao::<Order>().await;
        let mut order = Order {
            id: "o-1".to_string(),
            name: "abc".to_string(),
            phone: "111-25-1111".to_string(),
            code: "XYZ1234567890".to_string(),
            label: String::new(),
        };

        dao.put(&mut order).await.unwrap();
        assert_eq!(order.label, "abc/111-25-1111/XYZ12345");

        let mut preset = Order {
            id: "o-2".to_string(),
            label: "hand-made".to_string(),
            ..order.clone()
        };
        dao.put(&mut preset).await.unwrap();
        assert_eq!(preset.label, "hand-made");
    }

    #[tokio::test]
    async fn test_hooks_run_in_order_and_only_on_backend_load() {
        let (_, dao) = attr_dao::<Audited>().await;
        let mut record = Audited {
            id: "a-1".to_string(),
            trail: String::new(),
        };

        dao.put(&mut record).await.unwrap();
        assert_eq!(record.trail, "persist;validate;");

        // A cache hit returns the record without the post-load hook.
        let hit = dao.get("a-1").await.unwrap().unwrap();
        assert_eq!(hit.trail, "persist;validate;");

        // A backend load runs it.
        dao.cache().provider().clear().await.unwrap();
        let loaded = dao.get("a-1").await.unwrap().unwrap();
        assert_eq!(loaded.trail, "persist;validate;load;");
    }

    // ==================== Get Tests ====================

    #[tokio::test]
    async fn test_get_round_trip_and_key_kind_validation() {
        let (_, dao) = attr_dao::<Person>().await;
        let mut person = sample_person();
        dao.put(&mut person).await.unwrap();

        let found = dao.get(person.id.clone()).await.unwrap();
        assert_eq!(found, Some(person.clone()));

        let missing = dao.get("no-such-id").await.unwrap();
        assert_eq!(missing, None);

        let err = dao.get(Value::Double(1.5)).await.unwrap_err();
        assert_eq!(
            err,
            StoreError::Validation(
                "key value for id must be str, int or long, got double".to_string()
            )
        );

        let err = dao.get(42).await.unwrap_err();
        assert_eq!(
            err,
            StoreError::Validation("key value for id: expected str, found int".to_string())
        );

        let err = dao
            .get_with_range(person.id.clone(), "x")
            .await
            .unwrap_err();
        assert_eq!(
            err,
            StoreError::Validation("model person does not declare a range key".to_string())
        );
    }

    #[tokio::test]
    async fn test_get_with_range_on_key_store() {
        let (_, dao) = key_dao::<Event>().await;
        let mut event = Event {
            account: "acct-1".to_string(),
            ts: 1000,
            amount: 10,
            note: "wire".to_string(),
        };
        dao.put(&mut event).await.unwrap();

        let found = dao.get_with_range("acct-1", 1000i64).await.unwrap();
        assert_eq!(found, Some(event.clone()));

        // An int range value widens to the declared long kind.
        let widened = dao.get_with_range("acct-1", 1000).await.unwrap();
        assert_eq!(widened, Some(event));

        let err = dao.get("acct-1").await.unwrap_err();
        assert_eq!(
            err,
            StoreError::Validation("model event requires a range key".to_string())
        );
    }

    // ==================== Cache Behavior Tests ====================

    #[tokio::test]
    async fn test_get_missing_does_not_populate_cache() {
        let (_, dao) = attr_dao::<Person>().await;

        assert_eq!(dao.get("ghost").await.unwrap(), None);

        assert_eq!(dao.cache().stats().entries, 0);
    }

    #[tokio::test]
    async fn test_repeat_gets_hit_cache() {
        let (counting, dao) = attr_dao::<Person>().await;
        let mut person = sample_person();
        dao.put(&mut person).await.unwrap();
        dao.cache().provider().clear().await.unwrap();

        for _ in 0..4 {
            let found = dao.get(person.id.clone()).await.unwrap();
            assert!(found.is_some());
        }

        assert_eq!(counting.gets(), 1);
        let stats = dao.cache().stats();
        assert_eq!(stats.hits, 3);
        assert_eq!(stats.misses, 1);
    }

    #[tokio::test]
    async fn test_cache_ttl_expires_entries() {
        let (counting, dao) = attr_dao::<Session>().await;
        let mut session = Session {
            data: "payload".to_string(),
            ..Session::default()
        };
        dao.put(&mut session).await.unwrap();

        // Fresh entry serves from cache.
        assert!(dao.get(session.id.clone()).await.unwrap().is_some());
        assert_eq!(counting.gets(), 0);

        tokio::time::sleep(std::time::Duration::from_millis(1100)).await;

        // Expired entry forces a backend load and re-primes the cache.
        assert!(dao.get(session.id.clone()).await.unwrap().is_some());
        assert_eq!(counting.gets(), 1);
        assert!(dao.get(session.id.clone()).await.unwrap().is_some());
        assert_eq!(counting.gets(), 1);
    }

    #[tokio::test]
    async fn test_delete_evicts_cache_and_backend() {
        let (counting, dao) = attr_dao::<Person>().await;
        let mut person = sample_person();
        dao.put(&mut person).await.unwrap();

        dao.delete(person.id.clone()).await.unwrap();

        assert_eq!(dao.get(person.id.clone()).await.unwrap(), None);
        assert_eq!(counting.gets(), 1);

        // The field-indexed entry is gone as well.
        let by_nickname = dao.find_by("nickname", "ace").await.unwrap();
        assert_eq!(by_nickname, None);
        assert_eq!(counting.queries(), 1);
    }

    // ==================== Find-by Tests ====================

    #[tokio::test]
    async fn test_find_by_prefers_cache_index() {
        let (counting, dao) = attr_dao::<Person>().await;
        let mut person = sample_person();
        dao.put(&mut person).await.unwrap();

        let found = dao.find_by("nickname", "ace").await.unwrap();
        assert_eq!(found, Some(person.clone()));
        assert_eq!(counting.queries(), 0);

        // A field without a cache index goes through the query path.
        let by_name = dao.find_by("name", "abc").await.unwrap();
        assert_eq!(by_name, Some(person));
        assert_eq!(counting.queries(), 1);

        let err = dao.find_by("ghost", "x").await.unwrap_err();
        assert_eq!(
            err,
            StoreError::Validation("unknown field ghost on model person".to_string())
        );
    }

    // ==================== Batch Tests ====================

    #[tokio::test]
    async fn test_batch_put_and_batch_delete() {
        let (_, dao) = attr_dao::<Person>().await;
        let mut records = vec![
            Person {
                name: "a".to_string(),
                ..sample_person()
            },
            Person {
                name: "b".to_string(),
                ..sample_person()
            },
            Person {
                name: "c".to_string(),
                ..sample_person()
            },
        ];

        dao.batch_put(&mut records).await.unwrap();

        for record in &records {
            assert_eq!(record.version, 1);
            assert!(dao.get(record.id.clone()).await.unwrap().is_some());
        }

        let ids: Vec<String> = records[..2].iter().map(|r| r.id.clone()).collect();
        dao.batch_delete(ids).await.unwrap();

        assert_eq!(dao.query().count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_batch_put_failure_caches_nothing() {
        let driver: Arc<dyn StoreDriver> = Arc::new(KeyStore::new());
        let provider = Arc::new(LruCacheStore::new(100));
        let dao: Dao<Event> = Dao::new(&registry(), driver, provider.clone()).unwrap();
        // No table: the batch fails at the first write.

        let mut records = vec![Event {
            account: "acct-1".to_string(),
            ts: 1,
            amount: 1,
            note: String::new(),
        }];
        let err = dao.batch_put(&mut records).await.unwrap_err();

        assert!(matches!(err, StoreError::TableMissing(_)));
        assert_eq!(provider.stats().entries, 0);
    }

    #[tokio::test]
    async fn test_batch_delete_with_range() {
        let (_, dao) = key_dao::<Event>().await;
        let mut records = vec![
            Event {
                account: "acct-1".to_string(),
                ts: 1000,
                amount: 1,
                note: "first".to_string(),
            },
            Event {
                account: "acct-1".to_string(),
                ts: 2000,
                amount: 2,
                note: "second".to_string(),
            },
        ];
        dao.batch_put(&mut records).await.unwrap();

        dao.batch_delete_with_range(vec![("acct-1", 1000i64), ("acct-1", 2000i64)])
            .await
            .unwrap();

        assert_eq!(dao.get_with_range("acct-1", 1000i64).await.unwrap(), None);
        assert_eq!(dao.get_with_range("acct-1", 2000i64).await.unwrap(), None);
    }

    // ==================== Query Tests ====================

    #[tokio::test]
    async fn test_query_unsupported_operator_executes_nothing() {
        let (counting, dao) = key_dao::<Event>().await;
        let mut event = Event {
            account: "acct-1".to_string(),
            ts: 1000,
            amount: 10,
            note: "wire".to_string(),
        };
        dao.put(&mut event).await.unwrap();

        let mut query = dao.query().filter("note", QueryOp::Like, "wi%");
        let err = query.run().await.unwrap_err();

        assert!(matches!(err, StoreError::Unsupported { .. }));
        assert_eq!(counting.queries(), 0);
    }

    #[tokio::test]
    async fn test_query_batches_follow_engine_page_size() {
        let counting = CountingDriver::new(Arc::new(AttrStore::new().with_page_size(2)));
        let driver: Arc<dyn StoreDriver> = counting.clone();
        let dao: Dao<Person> =
            Dao::new(&registry(), driver, Arc::new(LruCacheStore::new(100))).unwrap();
        dao.create_table().await.unwrap();

        for name in ["a", "b", "c", "d", "e"] {
            let mut person = Person {
                name: name.to_string(),
                ..sample_person()
            };
            dao.put(&mut person).await.unwrap();
        }

        let mut query = dao.query();
        let mut seen = 0;
        let mut batches = 0;
        while query.has_next() {
            let batch = query.run().await.unwrap();
            seen += batch.len();
            batches += 1;
        }

        assert_eq!(seen, 5);
        assert_eq!(batches, 3);
        assert!(query.run().await.unwrap().is_empty());
    }
}
