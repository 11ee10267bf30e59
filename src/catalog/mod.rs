//! Catalog module
//!
//! This module contains schema definitions and attribute types.

pub mod schema;
pub mod types;

pub use schema::{Attribute, Schema};
pub use types::AttType;
