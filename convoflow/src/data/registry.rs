//! Registry mapping type tags to decode functions.

use super::Tagged;
use crate::conversation::{ContextKind, ConversationContext, ConversationState};
use crate::errors::{FormatError, RegistryError, Result, TypeResolutionError};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::any::{Any, TypeId};
use std::collections::HashMap;
use uuid::Uuid;

/// A decoded value of some registered type.
pub type AnyValue = Box<dyn Any + Send + Sync>;

type ValueDecoder = fn(serde_json::Value) -> Result<AnyValue, serde_json::Error>;
type ContextDecoder = fn(&str) -> Result<Box<dyn ConversationState>, serde_json::Error>;

fn decode_value<T: Tagged>(raw: serde_json::Value) -> Result<AnyValue, serde_json::Error> {
    serde_json::from_value::<T>(raw).map(|value| Box::new(value) as AnyValue)
}

fn decode_context<T: ContextKind>(payload: &str) -> Result<Box<dyn ConversationState>, serde_json::Error> {
    serde_json::from_str::<T>(payload).map(|state| Box::new(state) as Box<dyn ConversationState>)
}

#[derive(Clone, Copy)]
struct Registration {
    type_id: TypeId,
    type_name: &'static str,
    value: ValueDecoder,
    context: Option<ContextDecoder>,
}

impl std::fmt::Debug for Registration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registration")
            .field("type_name", &self.type_name)
            .field("context", &self.context.is_some())
            .finish()
    }
}

impl Registration {
    fn value<T: Tagged>() -> Self {
        Self {
            type_id: TypeId::of::<T>(),
            type_name: std::any::type_name::<T>(),
            value: decode_value::<T>,
            context: None,
        }
    }

    fn context<T: ContextKind>() -> Self {
        Self {
            context: Some(decode_context::<T>),
            ..Self::value::<T>()
        }
    }
}

/// Maps stable discriminator strings to decoders.
///
/// One registry serves both the data bag (value types) and the packer
/// (conversation types). It is populated explicitly at startup and shared
/// behind an `Arc`.
#[derive(Debug)]
pub struct TypeRegistry {
    entries: RwLock<HashMap<String, Registration>>,
}

impl TypeRegistry {
    /// Creates a registry preloaded with the built-in value tags and the base
    /// [`ConversationContext`].
    #[must_use]
    pub fn new() -> Self {
        let builtins = [
            (bool::TYPE_TAG, Registration::value::<bool>()),
            (i32::TYPE_TAG, Registration::value::<i32>()),
            (i64::TYPE_TAG, Registration::value::<i64>()),
            (u32::TYPE_TAG, Registration::value::<u32>()),
            (u64::TYPE_TAG, Registration::value::<u64>()),
            (f64::TYPE_TAG, Registration::value::<f64>()),
            (String::TYPE_TAG, Registration::value::<String>()),
            (Uuid::TYPE_TAG, Registration::value::<Uuid>()),
            (<DateTime<Utc>>::TYPE_TAG, Registration::value::<DateTime<Utc>>()),
            (<Vec<String>>::TYPE_TAG, Registration::value::<Vec<String>>()),
            (serde_json::Value::TYPE_TAG, Registration::value::<serde_json::Value>()),
            (
                ConversationContext::TYPE_TAG,
                Registration::context::<ConversationContext>(),
            ),
        ];

        Self {
            entries: RwLock::new(
                builtins
                    .into_iter()
                    .map(|(tag, registration)| (tag.to_string(), registration))
                    .collect(),
            ),
        }
    }

    /// Creates a registry with nothing registered.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Registers a value type for the data bag.
    ///
    /// Registering the same type twice is a no-op.
    pub fn register_value<T: Tagged>(&self) -> Result<(), RegistryError> {
        self.insert(T::TYPE_TAG, Registration::value::<T>())
    }

    /// Registers a conversation type for the packer.
    ///
    /// Conversation types are also usable as data-bag values.
    pub fn register_context<T: ContextKind>(&self) -> Result<(), RegistryError> {
        self.insert(T::TYPE_TAG, Registration::context::<T>())
    }

    fn insert(&self, tag: &str, registration: Registration) -> Result<(), RegistryError> {
        let mut entries = self.entries.write();
        if let Some(existing) = entries.get(tag) {
            if existing.type_id != registration.type_id {
                return Err(RegistryError::TagConflict {
                    tag: tag.to_string(),
                    existing: existing.type_name,
                    requested: registration.type_name,
                });
            }
            // A value registration may be upgraded to a context registration.
            if existing.context.is_some() {
                return Ok(());
            }
        }
        entries.insert(tag.to_string(), registration);
        Ok(())
    }

    /// Returns true if the tag is registered.
    #[must_use]
    pub fn contains(&self, tag: &str) -> bool {
        self.entries.read().contains_key(tag)
    }

    /// Returns true if the tag names a conversation type.
    #[must_use]
    pub fn is_context(&self, tag: &str) -> bool {
        self.entries
            .read()
            .get(tag)
            .is_some_and(|r| r.context.is_some())
    }

    /// Returns the Rust type name bound to a tag.
    #[must_use]
    pub fn type_name(&self, tag: &str) -> Option<&'static str> {
        self.entries.read().get(tag).map(|r| r.type_name)
    }

    /// Returns all registered tags, sorted.
    #[must_use]
    pub fn tags(&self) -> Vec<String> {
        let mut tags: Vec<_> = self.entries.read().keys().cloned().collect();
        tags.sort();
        tags
    }

    /// Returns the number of registered tags.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Returns true if nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Decodes a raw value under the type bound to `tag`.
    pub fn decode_value(&self, tag: &str, raw: serde_json::Value) -> Result<AnyValue> {
        let decoder = self
            .entries
            .read()
            .get(tag)
            .map(|r| r.value)
            .ok_or_else(|| TypeResolutionError::new(tag, "data entry"))?;
        Ok(decoder(raw).map_err(FormatError::from)?)
    }

    /// Decodes a conversation payload under the type bound to `tag`.
    pub fn decode_context(&self, tag: &str, payload: &str) -> Result<Box<dyn ConversationState>> {
        let decoder = {
            let entries = self.entries.read();
            let registration = entries
                .get(tag)
                .ok_or_else(|| TypeResolutionError::new(tag, "conversation payload"))?;
            registration.context.ok_or_else(|| {
                TypeResolutionError::new(tag, "tag is registered, but not as a conversation type")
            })?
        };
        Ok(decoder(payload).map_err(FormatError::from)?)
    }
}

impl Default for TypeRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conversation::ConversationId;
    use crate::errors::ConvoflowError;
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Address {
        city: String,
    }

    impl Tagged for Address {
        const TYPE_TAG: &'static str = "Address";
    }

    #[derive(Debug, Serialize, Deserialize)]
    struct Impostor;

    impl Tagged for Impostor {
        const TYPE_TAG: &'static str = "Address";
    }

    #[test]
    fn test_builtins_present() {
        let registry = TypeRegistry::new();
        assert!(registry.contains("i64"));
        assert!(registry.contains("string"));
        assert!(registry.is_context("ConversationContext"));
        assert!(!registry.is_context("i64"));
        assert!(TypeRegistry::empty().is_empty());
    }

    #[test]
    fn test_register_value_idempotent() {
        let registry = TypeRegistry::new();
        let before = registry.len();
        registry.register_value::<Address>().unwrap();
        registry.register_value::<Address>().unwrap();
        assert_eq!(registry.len(), before + 1);
    }

    #[test]
    fn test_tag_conflict() {
        let registry = TypeRegistry::new();
        registry.register_value::<Address>().unwrap();

        let err = registry.register_value::<Impostor>().unwrap_err();
        assert!(matches!(err, RegistryError::TagConflict { ref tag, .. } if tag == "Address"));
    }

    #[test]
    fn test_decode_value() {
        let registry = TypeRegistry::new();
        registry.register_value::<Address>().unwrap();

        let decoded = registry
            .decode_value("Address", serde_json::json!({"city": "Oslo"}))
            .unwrap();
        let address = decoded.downcast_ref::<Address>().unwrap();
        assert_eq!(address.city, "Oslo");
    }

    #[test]
    fn test_decode_unknown_tag() {
        let registry = TypeRegistry::new();
        let err = registry
            .decode_value("Nope", serde_json::json!(1))
            .unwrap_err();
        assert!(matches!(err, ConvoflowError::TypeResolution(_)));
    }

    #[test]
    fn test_decode_malformed_value() {
        let registry = TypeRegistry::new();
        let err = registry
            .decode_value("i64", serde_json::json!("seven"))
            .unwrap_err();
        assert!(matches!(err, ConvoflowError::Format(_)));
    }

    #[test]
    fn test_decode_context_rejects_value_tag() {
        let registry = TypeRegistry::new();
        let err = registry.decode_context("i64", "1").unwrap_err();
        assert!(matches!(err, ConvoflowError::TypeResolution(_)));
    }

    #[test]
    fn test_decode_context() {
        let registry = TypeRegistry::new();
        let ctx = ConversationContext::new(ConversationId::new());
        let payload = serde_json::to_string(&ctx).unwrap();

        let decoded = registry
            .decode_context("ConversationContext", &payload)
            .unwrap();
        assert_eq!(decoded.downcast_ref::<ConversationContext>(), Some(&ctx));
    }
}
