/*!
 * Shared Segment
 * Cross-process key-value blackboard
 */

use crate::core::types::FastMap;
use serde_json::Value;

/// Shared segment key, inline-optimized like process ids
pub type SharedKey = smartstring::alias::String;

/// Mutable blackboard every process can read and write.
///
/// Last write wins; there is no per-key ownership. Contents live only as
/// long as the kernel and are not part of the persisted image.
#[derive(Default)]
pub(crate) struct SharedSegment {
    entries: FastMap<SharedKey, Value>,
}

impl SharedSegment {
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.entries.get(key)
    }

    /// Returns the previous value, if any
    pub fn set(&mut self, key: impl Into<SharedKey>, value: Value) -> Option<Value> {
        self.entries.insert(key.into(), value)
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.entries.remove(key)
    }

    pub fn keys(&self) -> Vec<SharedKey> {
        let mut keys: Vec<_> = self.entries.keys().cloned().collect();
        keys.sort();
        keys
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_last_write_wins() {
        let mut segment = SharedSegment::default();
        assert_eq!(segment.set("threat-level", json!(1)), None);
        assert_eq!(segment.set("threat-level", json!(2)), Some(json!(1)));
        assert_eq!(segment.get("threat-level"), Some(&json!(2)));
    }

    #[test]
    fn test_keys_sorted() {
        let mut segment = SharedSegment::default();
        segment.set("beta", json!(null));
        segment.set("alpha", json!(null));
        assert_eq!(segment.keys(), vec![SharedKey::from("alpha"), SharedKey::from("beta")]);
    }

    #[test]
    fn test_remove() {
        let mut segment = SharedSegment::default();
        segment.set("k", json!(true));
        assert_eq!(segment.remove("k"), Some(json!(true)));
        assert_eq!(segment.get("k"), None);
        assert!(segment.keys().is_empty());
    }
}
