//! Stable discriminators for storable types.

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;
use uuid::Uuid;

/// A type that can be stored with an explicit type tag.
///
/// `TYPE_TAG` is written next to every serialized value and must never change
/// once data has been persisted under it.
pub trait Tagged: Serialize + DeserializeOwned + Send + Sync + 'static {
    /// The discriminator written to storage.
    const TYPE_TAG: &'static str;
}

macro_rules! builtin_tags {
    ($($ty:ty => $tag:literal),* $(,)?) => {
        $(
            impl Tagged for $ty {
                const TYPE_TAG: &'static str = $tag;
            }
        )*
    };
}

builtin_tags! {
    bool => "bool",
    i32 => "i32",
    i64 => "i64",
    u32 => "u32",
    u64 => "u64",
    f64 => "f64",
    String => "string",
    Uuid => "uuid",
    DateTime<Utc> => "datetime",
    Vec<String> => "string[]",
    serde_json::Value => "json",
}
