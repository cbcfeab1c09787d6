//! Stateful query builder and executor.
//!
//! A [`Query`] is built up with filter and shaping calls, validated against
//! the target backend's capabilities on first execution, then run one batch
//! at a time. Builder mistakes (unknown fields, operand kind mismatches) are
//! held until execution so chained calls stay infallible.

use std::sync::Arc;

use duostore_core::model::{ModelDescriptor, Value};
use duostore_core::query::{
    validate_plan, Direction, Filter, OrderBy, PageToken, QueryOp, QueryPlan,
};
use duostore_core::storage::{RawItem, Result, StoreDriver, StoreError, TableSchema};

use crate::cache::ObjectCache;

/// Where the query stands in its batch-by-batch execution.
enum ExecState {
    /// Not yet executed; the next `run` validates and fetches the first batch.
    Built,
    /// Mid-execution; the token continues where the last batch stopped.
    Executing(PageToken),
    /// No more batches; further `run` calls return empty.
    Exhausted,
}

/// A reusable-by-batch query over one model.
///
/// `run` returns one batch per call until the result set is exhausted;
/// `all` and `stream` drive the same loop to completion. Every materialized
/// record passes through the model's post-load hook and is written back to
/// the cache best effort.
pub struct Query<T> {
    descriptor: Arc<ModelDescriptor<T>>,
    schema: Arc<TableSchema>,
    driver: Arc<dyn StoreDriver>,
    cache: ObjectCache,
    plan: QueryPlan,
    state: ExecState,
    pending_error: Option<StoreError>,
}

impl<T: Default + Send + Sync + 'static> Query<T> {
    pub(crate) fn new(
        descriptor: Arc<ModelDescriptor<T>>,
        schema: Arc<TableSchema>,
        driver: Arc<dyn StoreDriver>,
        cache: ObjectCache,
    ) -> Self {
        Self {
            descriptor,
            schema,
            driver,
            cache,
            plan: QueryPlan::default(),
            state: ExecState::Built,
            pending_error: None,
        }
    }

    fn record_error(&mut self, error: StoreError) {
        // First mistake wins; later calls keep chaining but change nothing.
        if self.pending_error.is_none() {
            self.pending_error = Some(error);
        }
    }

    /// Resolves a model field to its backend attribute name.
    fn resolve(&mut self, field: &str) -> Option<(String, duostore_core::model::ValueKind)> {
        match self.descriptor.field(field) {
            Some(def) => Some((def.attr_name.clone(), def.kind)),
            None => {
                self.record_error(StoreError::Validation(format!(
                    "unknown field {field} on model {}",
                    self.descriptor.model_name()
                )));
                None
            }
        }
    }

    fn push_filter(mut self, field: &str, op: QueryOp, operands: Vec<Value>) -> Self {
        if self.pending_error.is_some() {
            return self;
        }
        let Some((attr, kind)) = self.resolve(field) else {
            return self;
        };
        // Operands for set fields are coerced to the element kind; a filter
        // speaks about members, not whole sets.
        let target = kind.element();
        let mut coerced = Vec::with_capacity(operands.len());
        for operand in operands {
            match operand.coerce(target) {
                Ok(operand) => coerced.push(operand),
                Err(e) => {
                    self.record_error(StoreError::Validation(format!("filter on {field}: {e}")));
                    return self;
                }
            }
        }
        self.plan.filters.push(Filter { attr, op, operands: coerced });
        self
    }

    /// Adds a single-operand filter condition.
    pub fn filter(self, field: &str, op: QueryOp, value: impl Into<Value>) -> Self {
        self.push_filter(field, op, vec![value.into()])
    }

    /// Adds a `between` condition over an inclusive value range.
    pub fn filter_between(
        self,
        field: &str,
        low: impl Into<Value>,
        high: impl Into<Value>,
    ) -> Self {
        self.push_filter(field, QueryOp::Between, vec![low.into(), high.into()])
    }

    /// Adds an `in` condition over a candidate list.
    pub fn filter_in<V: Into<Value>>(self, field: &str, values: Vec<V>) -> Self {
        self.push_filter(field, QueryOp::In, values.into_iter().map(Into::into).collect())
    }

    /// Matches records where the field is absent.
    pub fn filter_null(self, field: &str) -> Self {
        self.push_filter(field, QueryOp::IsNull, Vec::new())
    }

    /// Matches records where the field is present.
    pub fn filter_not_null(self, field: &str) -> Self {
        self.push_filter(field, QueryOp::NotNull, Vec::new())
    }

    /// Restricts fetched attributes to the given fields.
    pub fn select(mut self, fields: &[&str]) -> Self {
        if self.pending_error.is_some() {
            return self;
        }
        let mut attrs = Vec::with_capacity(fields.len());
        for field in fields {
            let Some((attr, _)) = self.resolve(field) else {
                return self;
            };
            attrs.push(attr);
        }
        self.plan.projection = Some(attrs);
        self
    }

    /// Sorts results ascending by the given field.
    pub fn order_by(mut self, field: &str) -> Self {
        if self.pending_error.is_some() {
            return self;
        }
        if let Some((attr, _)) = self.resolve(field) {
            self.plan.order_by = Some(OrderBy { attr, direction: Direction::Asc });
        }
        self
    }

    /// Sorts results descending by the given field.
    pub fn order_by_desc(mut self, field: &str) -> Self {
        if self.pending_error.is_some() {
            return self;
        }
        if let Some((attr, _)) = self.resolve(field) {
            self.plan.order_by = Some(OrderBy { attr, direction: Direction::Desc });
        }
        self
    }

    /// Caps the total number of records across all batches.
    pub fn limit(mut self, limit: usize) -> Self {
        self.plan.limit = Some(limit);
        self
    }

    /// Requests read-your-writes consistency where the backend offers it.
    pub fn consistent_read(mut self, consistent: bool) -> Self {
        self.plan.consistent_read = consistent;
        self
    }

    /// True while more batches may remain.
    pub fn has_next(&self) -> bool {
        !matches!(self.state, ExecState::Exhausted)
    }

    /// Fetches the next batch of records.
    ///
    /// The first call validates the plan against the backend's capabilities;
    /// nothing executes when validation fails. After the result set is
    /// exhausted every further call returns an empty batch.
    pub async fn run(&mut self) -> Result<Vec<T>> {
        if let Some(error) = &self.pending_error {
            return Err(error.clone());
        }
        let page = match &self.state {
            ExecState::Exhausted => return Ok(Vec::new()),
            ExecState::Built => {
                validate_plan(&self.schema, &self.driver.capabilities(), &self.plan)?;
                self.driver.query(&self.schema, &self.plan, None).await?
            }
            ExecState::Executing(token) => {
                self.driver.query(&self.schema, &self.plan, Some(token)).await?
            }
        };
        self.state = match &page.next {
            Some(token) => ExecState::Executing(token.clone()),
            None => ExecState::Exhausted,
        };
        self.materialize(page.items).await
    }

    /// Runs the query to completion and collects every record.
    pub async fn all(&mut self) -> Result<Vec<T>> {
        let mut records = Vec::new();
        loop {
            records.extend(self.run().await?);
            if !self.has_next() {
                break;
            }
        }
        Ok(records)
    }

    /// Result count for this plan, independent of batch state.
    pub async fn count(&self) -> Result<u64> {
        if let Some(error) = &self.pending_error {
            return Err(error.clone());
        }
        validate_plan(&self.schema, &self.driver.capabilities(), &self.plan)?;
        self.driver.count(&self.schema, &self.plan).await
    }

    /// Streams records one by one across batch boundaries.
    pub fn stream(mut self) -> impl tokio_stream::Stream<Item = Result<T>> {
        async_stream::try_stream! {
            loop {
                let batch = self.run().await?;
                for record in batch {
                    yield record;
                }
                if !self.has_next() {
                    break;
                }
            }
        }
    }

    async fn materialize(&self, items: Vec<RawItem>) -> Result<Vec<T>> {
        let mut records = Vec::with_capacity(items.len());
        for item in items {
            let mut record = self
                .descriptor
                .from_raw(&item)
                .map_err(StoreError::Serialization)?;
            if let Some(hook) = self.descriptor.post_load_hook() {
                hook(&mut record);
            }
            self.cache.put_record(&self.descriptor, &record).await;
            records.push(record);
        }
        Ok(records)
    }
}
