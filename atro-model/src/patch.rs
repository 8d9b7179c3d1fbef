//! Helpers for PATCH-style partial updates.

use serde::{Deserialize, Deserializer};

/// Deserialize a nullable field of a patch so that an absent key stays
/// `None` (keep the stored value) while an explicit `null` becomes
/// `Some(None)` (clear it). Pair with `#[serde(default)]`.
pub fn double_option<'de, D, T>(
    deserializer: D,
) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

/// Implemented by every `*Patch` type.
pub trait Patch {
    /// True when applying the patch would not change any column.
    fn is_empty(&self) -> bool;
}
