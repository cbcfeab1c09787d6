//! Best-effort write-through object cache.
//!
//! Sits between the data-access layer and a [`CacheStore`] provider. Records
//! are serialized into envelopes carrying their own expiration, keyed by
//! primary key and, for declared cache-index fields, by field value as well.
//!
//! Every provider or serialization fault is logged and swallowed: a cache
//! problem degrades into a miss, it never fails the surrounding operation.

use std::sync::Arc;
use std::time::Duration;

use duostore_core::cache::{
    deserialize_envelope, field_key, pk_key, serialize_envelope, CacheEnvelope, CacheStats,
    CacheStore,
};
use duostore_core::model::{ModelDescriptor, Value};
use duostore_core::storage::StoreKind;

/// Write-through cache manager bound to one backend's key namespace.
///
/// Cheap to clone; clones share the underlying provider.
#[derive(Clone)]
pub struct ObjectCache {
    store_kind: StoreKind,
    store: Arc<dyn CacheStore>,
}

impl ObjectCache {
    pub fn new(store_kind: StoreKind, store: Arc<dyn CacheStore>) -> Self {
        Self { store_kind, store }
    }

    /// The provider backing this manager.
    pub fn provider(&self) -> &Arc<dyn CacheStore> {
        &self.store
    }

    /// Hit, miss and entry counts of the underlying provider.
    pub fn stats(&self) -> CacheStats {
        self.store.stats()
    }

    fn ttl(expire_secs: u32) -> Option<Duration> {
        if expire_secs == 0 {
            None
        } else {
            Some(Duration::from_secs(u64::from(expire_secs)))
        }
    }

    /// Key of the record's primary-key entry, `None` when the record cannot
    /// be keyed (missing id or range value).
    fn record_key<T>(&self, descriptor: &ModelDescriptor<T>, record: &T) -> Option<String> {
        let (id, range) = descriptor.key_of(record);
        if id.is_empty() {
            return None;
        }
        match (descriptor.range_field(), range) {
            (Some(_), Some(range)) if !range.is_empty() => Some(pk_key(
                self.store_kind,
                descriptor.model_name(),
                &id,
                Some(&range),
            )),
            (Some(_), _) => None,
            (None, _) => Some(pk_key(self.store_kind, descriptor.model_name(), &id, None)),
        }
    }

    /// Stores a record under its primary key and every cache-index field.
    pub async fn put_record<T>(&self, descriptor: &ModelDescriptor<T>, record: &T) {
        let policy = descriptor.cache_policy();
        if !policy.cacheable {
            return;
        }
        let Some(key) = self.record_key(descriptor, record) else {
            tracing::warn!(
                model = %descriptor.model_name(),
                "Skipping cache put for record without a complete key"
            );
            return;
        };
        let ttl = Self::ttl(policy.expire_secs);
        let envelope = CacheEnvelope::new(descriptor.to_raw(record), ttl);
        let bytes = match serialize_envelope(&envelope) {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::warn!(model = %descriptor.model_name(), error = %e, "Cache serialization failed");
                return;
            }
        };

        if let Err(e) = self.store.put(&key, &bytes, ttl).await {
            tracing::warn!(key = %key, error = %e, "Cache put failed");
        }

        for field in descriptor.cache_index_fields() {
            let value = (field.getter)(record);
            if value.is_empty() {
                continue;
            }
            let key = field_key(self.store_kind, descriptor.model_name(), &field.name, &value);
            if let Err(e) = self.store.put(&key, &bytes, ttl).await {
                tracing::warn!(key = %key, error = %e, "Cache put failed");
            }
        }
    }

    /// Looks up a record by primary key. Any fault is a miss.
    pub async fn get_record<T: Default>(
        &self,
        descriptor: &ModelDescriptor<T>,
        id: &Value,
        range: Option<&Value>,
    ) -> Option<T> {
        if !descriptor.cache_policy().cacheable {
            return None;
        }
        let key = pk_key(self.store_kind, descriptor.model_name(), id, range);
        self.fetch(descriptor, &key).await
    }

    /// Looks up a record through a cache-index field entry.
    pub async fn get_by_field<T: Default>(
        &self,
        descriptor: &ModelDescriptor<T>,
        field_name: &str,
        value: &Value,
    ) -> Option<T> {
        if !descriptor.cache_policy().cacheable {
            return None;
        }
        let key = field_key(self.store_kind, descriptor.model_name(), field_name, value);
        self.fetch(descriptor, &key).await
    }

    /// Evicts a record's primary-key entry along with its cache-index
    /// entries. The delete call only carries the key, so the cached record
    /// itself is consulted first to recover the indexed field values.
    pub async fn delete_record<T: Default>(
        &self,
        descriptor: &ModelDescriptor<T>,
        id: &Value,
        range: Option<&Value>,
    ) {
        if !descriptor.cache_policy().cacheable {
            return;
        }
        let key = pk_key(self.store_kind, descriptor.model_name(), id, range);
        if let Some(record) = self.fetch::<T>(descriptor, &key).await {
            for field in descriptor.cache_index_fields() {
                let value = (field.getter)(&record);
                if value.is_empty() {
                    continue;
                }
                let entry = field_key(self.store_kind, descriptor.model_name(), &field.name, &value);
                if let Err(e) = self.store.delete(&entry).await {
                    tracing::warn!(key = %entry, error = %e, "Cache delete failed");
                }
            }
        }
        if let Err(e) = self.store.delete(&key).await {
            tracing::warn!(key = %key, error = %e, "Cache delete failed");
        }
    }

    async fn fetch<T: Default>(&self, descriptor: &ModelDescriptor<T>, key: &str) -> Option<T> {
        let bytes = match self.store.get(key).await {
            Ok(Some(bytes)) => bytes,
            Ok(None) => return None,
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "Cache get failed");
                return None;
            }
        };
        let envelope = match deserialize_envelope(&bytes) {
            Ok(envelope) => envelope,
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "Cached bytes are not a valid envelope");
                return None;
            }
        };
        // Stale entries are treated as misses and evicted so the provider
        // does not serve them again.
        if envelope.is_stale() {
            if let Err(e) = self.store.delete(key).await {
                tracing::warn!(key = %key, error = %e, "Cache delete failed");
            }
            return None;
        }
        match descriptor.from_raw(&envelope.item) {
            Ok(record) => Some(record),
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "Cached item does not fit the model");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{LruCacheStore, NoopCacheStore};
    use duostore_core::model::{FieldDef, ModelBuilder, ValueKind};

    // ==================== Test Model ====================

    #[derive(Debug, Clone, Default, PartialEq)]
    struct Person {
        name: String,
        age: i32,
        nickname: String,
    }

    fn person_model() -> ModelDescriptor<Person> {
        ModelBuilder::new("person")
            .field(
                FieldDef::new(
                    "name",
                    ValueKind::Str,
                    |p: &Person| Value::Str(p.name.clone()),
                    |p: &mut Person, v| {
                        p.name = v.try_into_string()?;
                        Ok(())
                    },
                )
                .id(),
            )
            .field(FieldDef::new(
                "age",
                ValueKind::Int,
                |p: &Person| Value::Int(p.age),
                |p: &mut Person, v| {
                    p.age = v.try_into_int()?;
                    Ok(())
                },
            ))
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
            .build()
            .unwrap()
    }

    fn sample() -> Person {
        Person {
            name: "abc".to_string(),
            age: 25,
            nickname: "ace".to_string(),
        }
    }

    fn manager() -> ObjectCache {
        ObjectCache::new(StoreKind::AttrStore, Arc::new(LruCacheStore::new(100)))
    }

    // ==================== Round Trip Tests ====================

    #[tokio::test]
    async fn test_put_then_get_by_pk() {
        let cache = manager();
        let model = person_model();

        cache.put_record(&model, &sample()).await;
        let found: Option<Person> = cache
            .get_record(&model, &Value::Str("abc".into()), None)
            .await;

        assert_eq!(found, Some(sample()));
    }

    #[tokio::test]
    async fn test_put_then_get_by_cache_index_field() {
        let cache = manager();
        let model = person_model();

        cache.put_record(&model, &sample()).await;
        let found: Option<Person> = cache
            .get_by_field(&model, "nickname", &Value::Str("ace".into()))
            .await;

        assert_eq!(found, Some(sample()));
    }

    #[tokio::test]
    async fn test_get_miss() {
        let cache = manager();
        let model = person_model();

        let found: Option<Person> = cache
            .get_record(&model, &Value::Str("missing".into()), None)
            .await;

        assert_eq!(found, None);
    }

    // ==================== Eviction Tests ====================

    #[tokio::test]
    async fn test_delete_evicts_pk_and_field_entries() {
        let cache = manager();
        let model = person_model();

        cache.put_record(&model, &sample()).await;
        cache
            .delete_record::<Person>(&model, &Value::Str("abc".into()), None)
            .await;

        let by_pk: Option<Person> = cache
            .get_record(&model, &Value::Str("abc".into()), None)
            .await;
        let by_field: Option<Person> = cache
            .get_by_field(&model, "nickname", &Value::Str("ace".into()))
            .await;

        assert_eq!(by_pk, None);
        assert_eq!(by_field, None);
    }

    #[tokio::test]
    async fn test_stale_entry_reads_as_miss_and_is_evicted() {
        let provider = Arc::new(LruCacheStore::new(100));
        let cache = ObjectCache::new(StoreKind::AttrStore, provider.clone());
        let model = person_model();

        // Plant an envelope whose own expiration is already in the past,
        // while the provider-level TTL is still open.
        let mut envelope = CacheEnvelope::new(model.to_raw(&sample()), None);
        envelope.expires_at_ms = Some(0);
        let bytes = serialize_envelope(&envelope).unwrap();
        let key = pk_key(
            StoreKind::AttrStore,
            "person",
            &Value::Str("abc".into()),
            None,
        );
        provider.put(&key, &bytes, None).await.unwrap();

        let found: Option<Person> = cache
            .get_record(&model, &Value::Str("abc".into()), None)
            .await;
        assert_eq!(found, None);
        assert_eq!(provider.stats().entries, 0);
    }

    #[tokio::test]
    async fn test_garbage_bytes_read_as_miss() {
        let provider = Arc::new(LruCacheStore::new(100));
        let cache = ObjectCache::new(StoreKind::AttrStore, provider.clone());
        let model = person_model();

        let key = pk_key(
            StoreKind::AttrStore,
            "person",
            &Value::Str("abc".into()),
            None,
        );
        provider.put(&key, b"not json", None).await.unwrap();

        let found: Option<Person> = cache
            .get_record(&model, &Value::Str("abc".into()), None)
            .await;
        assert_eq!(found, None);
    }

    // ==================== Policy Tests ====================

    #[tokio::test]
    async fn test_uncacheable_model_is_never_stored() {
        let provider = Arc::new(LruCacheStore::new(100));
        let cache = ObjectCache::new(StoreKind::AttrStore, provider.clone());
        let model = ModelBuilder::new("person")
            .field(
                FieldDef::new(
                    "name",
                    ValueKind::Str,
                    |p: &Person| Value::Str(p.name.clone()),
                    |p: &mut Person, v| {
                        p.name = v.try_into_string()?;
                        Ok(())
                    },
                )
                .id(),
            )
            .cache(false, 0)
            .build()
            .unwrap();

        cache.put_record(&model, &sample()).await;

        assert_eq!(provider.stats().entries, 0);
    }

    #[tokio::test]
    async fn test_record_without_id_is_not_stored() {
        let provider = Arc::new(LruCacheStore::new(100));
        let cache = ObjectCache::new(StoreKind::AttrStore, provider.clone());
        let model = person_model();

        cache.put_record(&model, &Person::default()).await;

        assert_eq!(provider.stats().entries, 0);
    }

    #[tokio::test]
    async fn test_noop_provider_swallows_everything() {
        let cache = ObjectCache::new(StoreKind::AttrStore, Arc::new(NoopCacheStore::new()));
        let model = person_model();

        cache.put_record(&model, &sample()).await;
        let found: Option<Person> = cache
            .get_record(&model, &Value::Str("abc".into()), None)
            .await;

        assert_eq!(found, None);
    }
}
