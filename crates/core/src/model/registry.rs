use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::Arc;

use super::descriptor::ModelDescriptor;
use super::error::{ModelError, Result};
use crate::storage::TableSchema;

struct Registered {
    type_id: TypeId,
    descriptor: Arc<dyn Any + Send + Sync>,
    schema: Arc<TableSchema>,
}

/// Holds every registered model descriptor.
///
/// The registry is populated up front and then shared behind an `Arc` into
/// every Dao and query; there is no global instance and no mutation after
/// setup, so lookups need no locking.
#[derive(Default)]
pub struct Registry {
    models: HashMap<String, Registered>,
    names_by_type: HashMap<TypeId, String>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a model. Each model name and each record type may only be
    /// registered once.
    pub fn register<T: 'static>(&mut self, descriptor: ModelDescriptor<T>) -> Result<()> {
        let name = descriptor.model_name().to_string();
        if self.models.contains_key(&name) {
            return Err(ModelError::DuplicateModel(name));
        }
        let type_id = TypeId::of::<T>();
        if let Some(existing) = self.names_by_type.get(&type_id) {
            return Err(ModelError::DuplicateType(existing.clone()));
        }

        let schema = Arc::new(descriptor.schema());
        self.names_by_type.insert(type_id, name.clone());
        self.models.insert(
            name,
            Registered { type_id, descriptor: Arc::new(descriptor), schema },
        );
        Ok(())
    }

    /// Resolves the descriptor registered for the record type `T`.
    pub fn descriptor<T: 'static>(&self) -> Result<Arc<ModelDescriptor<T>>> {
        let name = self
            .names_by_type
            .get(&TypeId::of::<T>())
            .ok_or_else(|| ModelError::UnknownModel(std::any::type_name::<T>().to_string()))?;
        self.descriptor_by_name(name)
    }

    /// Resolves a descriptor by model name, checking the record type.
    pub fn descriptor_by_name<T: 'static>(&self, name: &str) -> Result<Arc<ModelDescriptor<T>>> {
        let entry = self
            .models
            .get(name)
            .ok_or_else(|| ModelError::UnknownModel(name.to_string()))?;
        if entry.type_id != TypeId::of::<T>() {
            return Err(ModelError::InvalidModel {
                model: name.to_string(),
                detail: format!("registered under a different record type than {}", std::any::type_name::<T>()),
            });
        }
        entry
            .descriptor
            .clone()
            .downcast::<ModelDescriptor<T>>()
            .map_err(|_| ModelError::InvalidModel {
                model: name.to_string(),
                detail: "descriptor downcast failed".to_string(),
            })
    }

    /// The driver-facing schema for a model name.
    pub fn schema(&self, name: &str) -> Result<Arc<TableSchema>> {
        self.models
            .get(name)
            .map(|entry| entry.schema.clone())
            .ok_or_else(|| ModelError::UnknownModel(name.to_string()))
    }

    pub fn model_name<T: 'static>(&self) -> Result<&str> {
        self.names_by_type
            .get(&TypeId::of::<T>())
            .map(String::as_str)
            .ok_or_else(|| ModelError::UnknownModel(std::any::type_name::<T>().to_string()))
    }

    pub fn model_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.models.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}
