//! Query building and execution.

mod builder;

pub use builder::Query;
pub use duostore_core::query::QueryOp;
