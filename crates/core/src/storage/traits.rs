use async_trait::async_trait;

use super::error::Result;
use super::types::{KeyPair, PutCondition, QueryPage, RawItem, StoreKind, TableSchema};
use crate::model::Value;
use crate::query::{PageToken, QueryOp, QueryPlan};

/// Declared capability profile of a backend.
///
/// The query path checks a plan against this before translating it, so
/// capability gaps surface as explicit unsupported-operation errors rather
/// than backend exceptions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreCapabilities {
    pub store: StoreKind,
    /// Operators this backend can evaluate at all.
    pub operators: &'static [QueryOp],
    /// Whether `in` may target the range key.
    pub in_on_range_key: bool,
    /// Whether a filter on the id attribute forces a direct key access
    /// (and restricts the remaining filters to the range key).
    pub id_filters_force_key_access: bool,
    /// Whether non-key filters may ride along with a key access.
    pub extra_filters_with_key_access: bool,
    /// Whether order-by may target any filtered attribute, or only the
    /// range key of a key access.
    pub order_by_any_field: bool,
    pub consistent_read: bool,
    /// Whether batch put is native or emulated with sequential writes.
    pub native_batch_put: bool,
}

impl StoreCapabilities {
    pub fn supports_operator(&self, op: QueryOp) -> bool {
        self.operators.contains(&op)
    }
}

/// The backend driver contract, implemented once per store variant.
///
/// Drivers deal exclusively in [`RawItem`]s and [`Value`]s; record types
/// never cross this boundary. Conditional writes signal a failed check with
/// `StoreError::WriteConflict`, and capability gaps with
/// `StoreError::Unsupported`.
#[async_trait]
pub trait StoreDriver: Send + Sync {
    fn kind(&self) -> StoreKind;

    fn capabilities(&self) -> StoreCapabilities;

    /// Maps a model attribute to its backend-native name.
    fn attr_name(&self, schema: &TableSchema, attr: &str) -> String;

    async fn create_table(&self, schema: &TableSchema) -> Result<()>;

    async fn delete_table(&self, schema: &TableSchema) -> Result<()>;

    async fn list_tables(&self) -> Result<Vec<String>>;

    /// Stores one item, optionally gated by a conditional check.
    async fn put(
        &self,
        schema: &TableSchema,
        item: RawItem,
        condition: Option<PutCondition>,
    ) -> Result<()>;

    /// Stores a batch without conditions; not transactional.
    async fn put_batch(&self, schema: &TableSchema, items: Vec<RawItem>) -> Result<()>;

    async fn get(
        &self,
        schema: &TableSchema,
        id: &Value,
        range: Option<&Value>,
    ) -> Result<Option<RawItem>>;

    async fn delete(&self, schema: &TableSchema, id: &Value, range: Option<&Value>) -> Result<()>;

    async fn delete_batch(&self, schema: &TableSchema, keys: Vec<KeyPair>) -> Result<()>;

    /// Runs one batch of a translated query. `token` continues a previous
    /// page; the returned page carries the next cursor while more remain.
    async fn query(
        &self,
        schema: &TableSchema,
        plan: &QueryPlan,
        token: Option<&PageToken>,
    ) -> Result<QueryPage>;

    /// Cardinality of the plan's result, independent of pagination.
    async fn count(&self, schema: &TableSchema, plan: &QueryPlan) -> Result<u64>;
}
