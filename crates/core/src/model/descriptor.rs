use std::collections::HashMap;
use std::sync::Arc;

use super::error::{ModelError, Result};
use super::value::{Value, ValueKind};
use crate::storage::{AttrSchema, RawItem, TableSchema};

/// Reads one field of a record as a [`Value`].
pub type Getter<T> = fn(&T) -> Value;

/// Writes one field of a record from a [`Value`]. Returns a message on a
/// kind mismatch.
pub type Setter<T> = fn(&mut T, Value) -> std::result::Result<(), String>;

/// Lifecycle hook resolved once at registration and invoked against the
/// record instance.
pub type Hook<T> = Arc<dyn Fn(&mut T) + Send + Sync>;

/// Per-field validation callback run at the end of the pre-store pipeline.
pub type FieldValidator = Arc<dyn Fn(&Value) -> std::result::Result<(), String> + Send + Sync>;

/// Length class for generated identifier tokens.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdLength {
    Short,
    Long,
}

impl IdLength {
    pub fn token_len(&self) -> usize {
        match self {
            IdLength::Short => 8,
            IdLength::Long => 16,
        }
    }
}

/// One source of a derived composite field.
#[derive(Debug, Clone)]
pub struct CompositeSource {
    pub field: String,
    /// Truncate the source's string form to this many characters.
    pub substr_len: Option<usize>,
}

/// Recipe for a derived composite field: the plain string forms of the
/// sources, optionally truncated, joined by the separator. Empty sub-parts
/// are skipped, and the target is only filled while it is itself empty.
#[derive(Debug, Clone)]
pub struct CompositeSpec {
    pub sources: Vec<CompositeSource>,
    pub separator: String,
}

/// Per-model cache behavior.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CachePolicy {
    pub cacheable: bool,
    /// Expiration in seconds; 0 means the provider's default (never for the
    /// in-process providers).
    pub expire_secs: u32,
}

impl Default for CachePolicy {
    fn default() -> Self {
        Self { cacheable: true, expire_secs: 0 }
    }
}

/// One entry of a model's accessor table.
///
/// Field access goes through the `getter`/`setter` pair resolved at
/// registration, so the hot path never inspects the record type.
pub struct FieldDef<T> {
    pub name: String,
    /// Backend attribute name; defaults to the field name.
    pub attr_name: String,
    pub kind: ValueKind,
    pub getter: Getter<T>,
    pub setter: Setter<T>,
    pub is_id: bool,
    pub is_range_key: bool,
    pub is_version: bool,
    pub is_modified_time: bool,
    pub generated_id: Option<IdLength>,
    pub composite: Option<CompositeSpec>,
    pub cache_index: bool,
    pub validator: Option<FieldValidator>,
}

impl<T> FieldDef<T> {
    pub fn new(name: &str, kind: ValueKind, getter: Getter<T>, setter: Setter<T>) -> Self {
        Self {
            name: name.to_string(),
            attr_name: name.to_string(),
            kind,
            getter,
            setter,
            is_id: false,
            is_range_key: false,
            is_version: false,
            is_modified_time: false,
            generated_id: None,
            composite: None,
            cache_index: false,
            validator: None,
        }
    }

    /// Overrides the backend attribute name.
    pub fn attr_name(mut self, attr_name: &str) -> Self {
        self.attr_name = attr_name.to_string();
        self
    }

    pub fn id(mut self) -> Self {
        self.is_id = true;
        self
    }

    pub fn range_key(mut self) -> Self {
        self.is_range_key = true;
        self
    }

    pub fn version(mut self) -> Self {
        self.is_version = true;
        self
    }

    pub fn modified_time(mut self) -> Self {
        self.is_modified_time = true;
        self
    }

    pub fn generated_id(mut self, length: IdLength) -> Self {
        self.generated_id = Some(length);
        self
    }

    pub fn composite(mut self, sources: Vec<CompositeSource>, separator: &str) -> Self {
        self.composite = Some(CompositeSpec { sources, separator: separator.to_string() });
        self
    }

    /// Additionally indexes this field in the cache for lookup-by-value.
    pub fn cache_index(mut self) -> Self {
        self.cache_index = true;
        self
    }

    pub fn validator(
        mut self,
        validator: impl Fn(&Value) -> std::result::Result<(), String> + Send + Sync + 'static,
    ) -> Self {
        self.validator = Some(Arc::new(validator));
        self
    }
}

/// Immutable description of a registered model: the accessor table, key
/// layout, cache policy and resolved lifecycle hooks.
///
/// Built once by [`ModelBuilder`] and owned by the registry for the life of
/// the process.
pub struct ModelDescriptor<T> {
    model_name: String,
    table_name: String,
    fields: Vec<FieldDef<T>>,
    by_name: HashMap<String, usize>,
    id_idx: usize,
    range_idx: Option<usize>,
    version_idx: Option<usize>,
    modified_idx: Option<usize>,
    cache_policy: CachePolicy,
    pre_persist: Option<Hook<T>>,
    pre_validate: Option<Hook<T>>,
    post_load: Option<Hook<T>>,
}

impl<T> ModelDescriptor<T> {
    pub fn model_name(&self) -> &str {
        &self.model_name
    }

    pub fn table_name(&self) -> &str {
        &self.table_name
    }

    pub fn fields(&self) -> &[FieldDef<T>] {
        &self.fields
    }

    pub fn field(&self, name: &str) -> Option<&FieldDef<T>> {
        self.by_name.get(name).map(|idx| &self.fields[*idx])
    }

    pub fn id_field(&self) -> &FieldDef<T> {
        &self.fields[self.id_idx]
    }

    pub fn range_field(&self) -> Option<&FieldDef<T>> {
        self.range_idx.map(|idx| &self.fields[idx])
    }

    pub fn version_field(&self) -> Option<&FieldDef<T>> {
        self.version_idx.map(|idx| &self.fields[idx])
    }

    pub fn modified_field(&self) -> Option<&FieldDef<T>> {
        self.modified_idx.map(|idx| &self.fields[idx])
    }

    pub fn cache_policy(&self) -> CachePolicy {
        self.cache_policy
    }

    pub fn cache_index_fields(&self) -> impl Iterator<Item = &FieldDef<T>> {
        self.fields.iter().filter(|f| f.cache_index)
    }

    pub fn pre_persist_hook(&self) -> Option<&Hook<T>> {
        self.pre_persist.as_ref()
    }

    pub fn pre_validate_hook(&self) -> Option<&Hook<T>> {
        self.pre_validate.as_ref()
    }

    pub fn post_load_hook(&self) -> Option<&Hook<T>> {
        self.post_load.as_ref()
    }

    /// Reads the record's key values through the accessor table.
    pub fn key_of(&self, record: &T) -> (Value, Option<Value>) {
        let id = (self.id_field().getter)(record);
        let range = self.range_field().map(|f| (f.getter)(record));
        (id, range)
    }

    /// Lowers a record to its attribute map. Unset (`Null`) fields are
    /// omitted, matching what the backends store.
    pub fn to_raw(&self, record: &T) -> RawItem {
        let mut item = RawItem::new();
        for field in &self.fields {
            let value = (field.getter)(record);
            if matches!(value, Value::Null) {
                continue;
            }
            item.insert(field.attr_name.clone(), value);
        }
        item
    }

    /// The type-erased view handed to store drivers.
    pub fn schema(&self) -> TableSchema {
        let id = self.id_field();
        let mut attr_kinds = HashMap::new();
        for field in &self.fields {
            attr_kinds.insert(field.attr_name.clone(), field.kind);
        }
        TableSchema {
            model_name: self.model_name.clone(),
            table_name: self.table_name.clone(),
            id_attr: AttrSchema { name: id.attr_name.clone(), kind: id.kind },
            range_attr: self
                .range_field()
                .map(|f| AttrSchema { name: f.attr_name.clone(), kind: f.kind }),
            version_attr: self.version_field().map(|f| f.attr_name.clone()),
            attr_kinds,
        }
    }
}

impl<T: Default> ModelDescriptor<T> {
    /// Materializes a record from its attribute map. Attributes the model
    /// does not declare are ignored; declared fields absent from the map
    /// keep their default.
    pub fn from_raw(&self, item: &RawItem) -> std::result::Result<T, String> {
        let mut record = T::default();
        for field in &self.fields {
            if let Some(value) = item.get(&field.attr_name) {
                if matches!(value, Value::Null) {
                    continue;
                }
                (field.setter)(&mut record, value.clone())
                    .map_err(|e| format!("field {}: {e}", field.name))?;
            }
        }
        Ok(record)
    }
}

/// Registration-time builder for [`ModelDescriptor`].
pub struct ModelBuilder<T> {
    model_name: String,
    table_name: Option<String>,
    fields: Vec<FieldDef<T>>,
    cache_policy: CachePolicy,
    pre_persist: Option<Hook<T>>,
    pre_validate: Option<Hook<T>>,
    post_load: Option<Hook<T>>,
}

impl<T> ModelBuilder<T> {
    pub fn new(model_name: &str) -> Self {
        Self {
            model_name: model_name.to_string(),
            table_name: None,
            fields: Vec::new(),
            cache_policy: CachePolicy::default(),
            pre_persist: None,
            pre_validate: None,
            post_load: None,
        }
    }

    /// Overrides the table name; defaults to the model name.
    pub fn table_name(mut self, table_name: &str) -> Self {
        self.table_name = Some(table_name.to_string());
        self
    }

    pub fn field(mut self, field: FieldDef<T>) -> Self {
        self.fields.push(field);
        self
    }

    pub fn cache(mut self, cacheable: bool, expire_secs: u32) -> Self {
        self.cache_policy = CachePolicy { cacheable, expire_secs };
        self
    }

    pub fn pre_persist(mut self, hook: impl Fn(&mut T) + Send + Sync + 'static) -> Self {
        self.pre_persist = Some(Arc::new(hook));
        self
    }

    pub fn pre_validate(mut self, hook: impl Fn(&mut T) + Send + Sync + 'static) -> Self {
        self.pre_validate = Some(Arc::new(hook));
        self
    }

    pub fn post_load(mut self, hook: impl Fn(&mut T) + Send + Sync + 'static) -> Self {
        self.post_load = Some(Arc::new(hook));
        self
    }

    pub fn build(self) -> Result<ModelDescriptor<T>> {
        let model = self.model_name.clone();
        let invalid = |detail: String| ModelError::InvalidModel { model: model.clone(), detail };

        if self.fields.is_empty() {
            return Err(invalid("no fields declared".to_string()));
        }

        let mut by_name = HashMap::new();
        let mut attr_names = HashMap::new();
        for (idx, field) in self.fields.iter().enumerate() {
            if by_name.insert(field.name.clone(), idx).is_some() {
                return Err(invalid(format!("duplicate field {}", field.name)));
            }
            if let Some(other) = attr_names.insert(field.attr_name.clone(), &field.name) {
                return Err(invalid(format!(
                    "attribute {} claimed by both {} and {}",
                    field.attr_name, other, field.name
                )));
            }
        }

        let id_idx = Self::single_index(&self.fields, "id", &invalid, |f| f.is_id)?
            .ok_or_else(|| invalid("no id field declared".to_string()))?;
        let range_idx = Self::single_index(&self.fields, "range-key", &invalid, |f| f.is_range_key)?;
        let version_idx = Self::single_index(&self.fields, "version", &invalid, |f| f.is_version)?;
        let modified_idx =
            Self::single_index(&self.fields, "modified-time", &invalid, |f| f.is_modified_time)?;

        for field in &self.fields {
            if field.is_id && !field.kind.is_key_kind() {
                return Err(invalid(format!(
                    "id field {} must be str, int or long, not {}",
                    field.name, field.kind
                )));
            }
            if field.is_range_key && !field.kind.is_key_kind() {
                return Err(invalid(format!(
                    "range-key field {} must be str, int or long, not {}",
                    field.name, field.kind
                )));
            }
            if field.is_version && !matches!(field.kind, ValueKind::Int | ValueKind::Long) {
                return Err(invalid(format!(
                    "version field {} must be int or long, not {}",
                    field.name, field.kind
                )));
            }
            if field.is_modified_time && field.kind != ValueKind::Date {
                return Err(invalid(format!(
                    "modified-time field {} must be a date, not {}",
                    field.name, field.kind
                )));
            }
            if field.generated_id.is_some() && field.kind != ValueKind::Str {
                return Err(invalid(format!(
                    "generated-id field {} must be a str, not {}",
                    field.name, field.kind
                )));
            }
            if let Some(spec) = &field.composite {
                if field.kind != ValueKind::Str {
                    return Err(invalid(format!(
                        "composite field {} must be a str, not {}",
                        field.name, field.kind
                    )));
                }
                if spec.sources.is_empty() {
                    return Err(invalid(format!("composite field {} has no sources", field.name)));
                }
                for source in &spec.sources {
                    if source.field == field.name {
                        return Err(invalid(format!(
                            "composite field {} references itself",
                            field.name
                        )));
                    }
                    if !by_name.contains_key(&source.field) {
                        return Err(invalid(format!(
                            "composite field {} references unknown field {}",
                            field.name, source.field
                        )));
                    }
                }
            }
        }

        Ok(ModelDescriptor {
            table_name: self.table_name.unwrap_or_else(|| self.model_name.clone()),
            model_name: self.model_name,
            fields: self.fields,
            by_name,
            id_idx,
            range_idx,
            version_idx,
            modified_idx,
            cache_policy: self.cache_policy,
            pre_persist: self.pre_persist,
            pre_validate: self.pre_validate,
            post_load: self.post_load,
        })
    }

    fn single_index(
        fields: &[FieldDef<T>],
        role: &str,
        invalid: &impl Fn(String) -> ModelError,
        pick: impl Fn(&FieldDef<T>) -> bool,
    ) -> Result<Option<usize>> {
        let mut found = None;
        for (idx, field) in fields.iter().enumerate() {
            if pick(field) {
                if found.is_some() {
                    return Err(invalid(format!("more than one {role} field")));
                }
                found = Some(idx);
            }
        }
        Ok(found)
    }
}
