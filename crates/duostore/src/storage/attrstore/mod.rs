//! Flexible attribute store engine.
//!
//! Schemaless items addressed by item name, queried through a select
//! expression, with every attribute stored as order-preserving encoded text.

mod engine;
mod select;

pub use engine::AttrStore;
pub use select::{like_match, render_select, ITEM_NAME};
