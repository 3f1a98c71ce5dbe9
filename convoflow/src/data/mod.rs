//! Type-preserving conversation data.
//!
//! This module provides:
//! - The `Tagged` trait giving storable types a stable discriminator
//! - The `TypeRegistry` mapping discriminators to decoders
//! - The `ContextDataSet` bag of named, type-tagged values

mod bag;
mod registry;
mod tagged;

pub use bag::{ContextData, ContextDataSet, TYPE_FIELD};
pub use registry::{AnyValue, TypeRegistry};
pub use tagged::Tagged;
