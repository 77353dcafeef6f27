use std::fmt;
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Unix timestamp in milliseconds, the wire representation of all dates.
pub type TimestampMs = i64;

/// Current time as a wire timestamp.
pub fn now_ms() -> TimestampMs {
    chrono::Utc::now().timestamp_millis()
}

/// Child key of an item in its list, tagged by the owning item type so a
/// `Id<Person>` can never be passed where an `Id<Fine>` is expected.
///
/// Keys are stored uppercased, matching the backend which uppercases every
/// item id before touching the database.
pub struct Id<T> {
    key: String,
    _tag: PhantomData<fn() -> T>,
}

impl<T> Id<T> {
    pub fn new(key: impl Into<String>) -> Self {
        Self { key: key.into().to_ascii_uppercase(), _tag: PhantomData }
    }

    /// Mint a fresh key (uppercase UUID v4, the format the app uses for
    /// locally created items).
    pub fn random() -> Self {
        Self::new(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.key
    }
}

impl<T> Clone for Id<T> {
    fn clone(&self) -> Self {
        Self { key: self.key.clone(), _tag: PhantomData }
    }
}

impl<T> PartialEq for Id<T> {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key
    }
}

impl<T> Eq for Id<T> {}

impl<T> Hash for Id<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.key.hash(state);
    }
}

impl<T> fmt::Debug for Id<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Id({})", self.key)
    }
}

impl<T> fmt::Display for Id<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.key)
    }
}

impl<T> Serialize for Id<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.key)
    }
}

impl<'de, T> Deserialize<'de> for Id<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let key = String::deserialize(deserializer)?;
        Ok(Self::new(key))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Marker;

    #[test]
    fn keys_are_uppercased() {
        let id: Id<Marker> = Id::new("3fa2-b");
        assert_eq!(id.as_str(), "3FA2-B");
    }

    #[test]
    fn random_keys_are_unique_and_uppercase() {
        let a: Id<Marker> = Id::random();
        let b: Id<Marker> = Id::random();
        assert_ne!(a, b);
        assert_eq!(a.as_str(), a.as_str().to_ascii_uppercase());
    }

    #[test]
    fn serde_roundtrip() {
        let id: Id<Marker> = Id::new("ABC");
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"ABC\"");
        let back: Id<Marker> = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
    }
}
