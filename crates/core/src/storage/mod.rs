mod error;
mod traits;
mod types;

pub use error::{Result, StoreError};
pub use traits::{StoreCapabilities, StoreDriver};
pub use types::{AttrSchema, KeyPair, PutCondition, QueryPage, RawItem, StoreKind, TableSchema};
