//! Type-preserving named value bag attached to a conversation.

use super::{AnyValue, Tagged, TypeRegistry};
use crate::errors::{FormatError, Result, TypeResolutionError};
use serde::de::{self, MapAccess, Visitor};
use serde::ser::{SerializeSeq, SerializeStruct};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt;

/// Field name of the type tag in a serialized entry.
pub const TYPE_FIELD: &str = "$type";

/// One named slot: a value and the tag of its concrete type.
#[derive(Debug, Clone, PartialEq)]
pub struct ContextData {
    key: String,
    type_tag: String,
    value: serde_json::Value,
}

impl ContextData {
    /// Captures a value under its type tag.
    ///
    /// # Errors
    ///
    /// Returns `FormatError` if the value has no serialized form that decodes
    /// back as `T`, such as a non-finite float, which serializes as `null`.
    pub fn new<T: Tagged>(key: impl Into<String>, value: &T) -> Result<Self, FormatError> {
        let key = key.into();
        let value = serde_json::to_value(value)
            .map_err(|e| FormatError::from(e).with_key(&key))?;
        serde_json::from_value::<T>(value.clone()).map_err(|e| {
            FormatError::new(format!("value does not survive storage as '{}': {e}", T::TYPE_TAG))
                .with_key(&key)
        })?;
        Ok(Self {
            key,
            type_tag: T::TYPE_TAG.to_string(),
            value,
        })
    }

    /// The entry key.
    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    /// The concrete type tag.
    #[must_use]
    pub fn type_tag(&self) -> &str {
        &self.type_tag
    }

    /// The value in its serialized form.
    #[must_use]
    pub fn raw_value(&self) -> &serde_json::Value {
        &self.value
    }

    /// Re-materializes the value as `T`.
    ///
    /// # Errors
    ///
    /// Returns `FormatError` if the entry was stored as another type or its
    /// value does not decode as `T`.
    pub fn decode<T: Tagged>(&self) -> Result<T, FormatError> {
        if self.type_tag != T::TYPE_TAG {
            return Err(FormatError::tag_mismatch(&self.key, &self.type_tag, T::TYPE_TAG));
        }
        serde_json::from_value(self.value.clone())
            .map_err(|e| FormatError::from(e).with_key(&self.key))
    }

    /// Re-materializes the value as whatever type its tag is registered for.
    pub fn decode_dynamic(&self, registry: &TypeRegistry) -> Result<AnyValue> {
        if !registry.contains(&self.type_tag) {
            return Err(TypeResolutionError::new(
                &self.type_tag,
                format!("data entry '{}'", self.key),
            )
            .into());
        }
        registry.decode_value(&self.type_tag, self.value.clone())
    }
}

impl Serialize for ContextData {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        // The tag goes first so readers can pick a decoder before the value.
        let mut entry = serializer.serialize_struct("ContextData", 3)?;
        entry.serialize_field(TYPE_FIELD, &self.type_tag)?;
        entry.serialize_field("key", &self.key)?;
        entry.serialize_field("value", &self.value)?;
        entry.end()
    }
}

#[derive(Deserialize)]
#[serde(field_identifier)]
enum Field {
    #[serde(rename = "$type")]
    Type,
    #[serde(rename = "key")]
    Key,
    #[serde(rename = "value")]
    Value,
}

struct ContextDataVisitor;

impl<'de> Visitor<'de> for ContextDataVisitor {
    type Value = ContextData;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a data entry object starting with its type tag")
    }

    fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<ContextData, A::Error> {
        match map.next_key::<Field>()? {
            Some(Field::Type) => {}
            Some(_) => {
                return Err(de::Error::custom(
                    "the type tag must be the first field of a data entry",
                ))
            }
            None => return Err(de::Error::missing_field(TYPE_FIELD)),
        }
        let type_tag: String = map.next_value()?;
        if type_tag.is_empty() {
            return Err(de::Error::invalid_value(
                de::Unexpected::Str(""),
                &"a non-empty type tag",
            ));
        }

        let mut key: Option<String> = None;
        let mut value: Option<serde_json::Value> = None;
        while let Some(field) = map.next_key::<Field>()? {
            match field {
                Field::Type => return Err(de::Error::duplicate_field(TYPE_FIELD)),
                Field::Key => {
                    if key.is_some() {
                        return Err(de::Error::duplicate_field("key"));
                    }
                    key = Some(map.next_value()?);
                }
                Field::Value => {
                    if value.is_some() {
                        return Err(de::Error::duplicate_field("value"));
                    }
                    value = Some(map.next_value()?);
                }
            }
        }

        Ok(ContextData {
            key: key.ok_or_else(|| <A::Error as de::Error>::missing_field("key"))?,
            type_tag,
            value: value.ok_or_else(|| <A::Error as de::Error>::missing_field("value"))?,
        })
    }
}

impl<'de> Deserialize<'de> for ContextData {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_map(ContextDataVisitor)
    }
}

/// Named per-conversation working memory.
///
/// Keys are unique; setting an existing key replaces the entry, including its
/// type. Serialized as a list of entries, each led by its type tag.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ContextDataSet {
    entries: BTreeMap<String, ContextData>,
}

impl ContextDataSet {
    /// Creates an empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores a value under `key` together with its type tag.
    ///
    /// # Errors
    ///
    /// Returns `FormatError` if the value cannot be serialized.
    pub fn set<T: Tagged>(&mut self, key: impl Into<String>, value: T) -> Result<(), FormatError> {
        let entry = ContextData::new(key, &value)?;
        self.entries.insert(entry.key.clone(), entry);
        Ok(())
    }

    /// Reads the value under `key` as `T`.
    ///
    /// Returns `Ok(None)` when the key is absent.
    ///
    /// # Errors
    ///
    /// Returns `FormatError` when the entry holds another type or is malformed.
    pub fn get<T: Tagged>(&self, key: &str) -> Result<Option<T>, FormatError> {
        self.entries.get(key).map(ContextData::decode::<T>).transpose()
    }

    /// Reads the value under `key` as its registered concrete type.
    pub fn get_dynamic(&self, key: &str, registry: &TypeRegistry) -> Result<Option<AnyValue>> {
        self.entries
            .get(key)
            .map(|entry| entry.decode_dynamic(registry))
            .transpose()
    }

    /// Returns the raw entry under `key`.
    #[must_use]
    pub fn entry(&self, key: &str) -> Option<&ContextData> {
        self.entries.get(key)
    }

    /// Returns the type tag stored under `key`.
    #[must_use]
    pub fn type_tag(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(ContextData::type_tag)
    }

    /// Removes and returns the entry under `key`.
    pub fn remove(&mut self, key: &str) -> Option<ContextData> {
        self.entries.remove(key)
    }

    /// Checks if a key exists.
    #[must_use]
    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// Returns the number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if the set is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Returns all keys, sorted.
    #[must_use]
    pub fn keys(&self) -> Vec<String> {
        self.entries.keys().cloned().collect()
    }

    /// Iterates over the entries in key order.
    pub fn iter(&self) -> impl Iterator<Item = &ContextData> {
        self.entries.values()
    }

    /// Removes every entry.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Checks that every entry resolves and decodes through `registry`.
    ///
    /// # Errors
    ///
    /// The first unresolvable tag (`TypeResolutionError`) or undecodable value
    /// (`FormatError`).
    pub fn validate(&self, registry: &TypeRegistry) -> Result<()> {
        for entry in self.entries.values() {
            entry.decode_dynamic(registry)?;
        }
        Ok(())
    }
}

impl Serialize for ContextDataSet {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut seq = serializer.serialize_seq(Some(self.entries.len()))?;
        for entry in self.entries.values() {
            seq.serialize_element(entry)?;
        }
        seq.end()
    }
}

impl<'de> Deserialize<'de> for ContextDataSet {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let list = Vec::<ContextData>::deserialize(deserializer)?;
        let mut entries = BTreeMap::new();
        for entry in list {
            if entries.contains_key(&entry.key) {
                return Err(de::Error::custom(format!(
                    "duplicate data key '{}'",
                    entry.key
                )));
            }
            entries.insert(entry.key.clone(), entry);
        }
        Ok(Self { entries })
    }
}
