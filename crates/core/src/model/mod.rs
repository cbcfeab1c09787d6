mod descriptor;
mod error;
mod registry;
mod value;

pub use descriptor::{
    CachePolicy, CompositeSource, CompositeSpec, FieldDef, FieldValidator, Getter, Hook, IdLength,
    ModelBuilder, ModelDescriptor, Setter,
};
pub use error::{ModelError, Result};
pub use registry::Registry;
pub use value::{Value, ValueKind};
