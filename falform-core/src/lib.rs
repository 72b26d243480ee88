//! Falform Core
//!
//! Framework boundary shared by providers and the CLI: the resource and
//! state model, the async `Provider` trait and attribute schemas.

pub mod provider;
pub mod resource;
pub mod schema;
