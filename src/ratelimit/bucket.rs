//! Bucket key composition.

/// Separator placed between key items.
///
/// Key items must not contain it themselves, otherwise distinct item lists
/// can join to the same key. Callers are responsible for that.
pub const KEY_SEPARATOR: char = '#';

/// The key of one rate-limited bucket in the counter store.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BucketKey(String);

impl BucketKey {
    /// Join key items with [`KEY_SEPARATOR`].
    ///
    /// An empty item list yields the empty key.
    pub fn from_items<S: AsRef<str>>(items: &[S]) -> Self {
        let mut key = String::new();
        for (i, item) in items.iter().enumerate() {
            if i > 0 {
                key.push(KEY_SEPARATOR);
            }
            key.push_str(item.as_ref());
        }
        Self(key)
    }

    /// The key as stored.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for BucketKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for BucketKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_items_are_joined_with_separator() {
        let key = BucketKey::from_items(&["key1", "key2"]);
        assert_eq!(key.as_str(), "key1#key2");
    }

    #[test]
    fn test_single_item_is_unchanged() {
        let key = BucketKey::from_items(&[String::from("alice")]);
        assert_eq!(key.to_string(), "alice");
    }

    #[test]
    fn test_empty_items_yield_empty_key() {
        let items: [&str; 0] = [];
        assert_eq!(BucketKey::from_items(&items).as_str(), "");
    }

    #[test]
    fn test_order_matters() {
        assert_ne!(
            BucketKey::from_items(&["a", "b"]),
            BucketKey::from_items(&["b", "a"])
        );
    }

    #[test]
    fn test_separator_inside_item_collides() {
        // Documented hazard: the separator is not escaped.
        assert_eq!(
            BucketKey::from_items(&["a#b", "c"]),
            BucketKey::from_items(&["a", "b#c"])
        );
    }
}
