//! Process-wide subscription registry.
//!
//! Two coupled maps: `by_id` owns the subscription records, `by_topic`
//! keeps per-topic id lists in insertion order (which is delivery order).
//! The registry itself is plain data; the [`Bus`](crate::Bus) wraps it in
//! the single mutex every mutation goes through.

use crate::message::Callback;
use std::collections::HashMap;
use std::sync::Arc;

/// Opaque handle returned by subscribe. Monotonic, never reused.
pub type SubscriptionId = u64;

struct Subscription {
    topic: String,
    callback: Arc<Callback>,
}

pub struct SubscriptionRegistry {
    by_id: HashMap<SubscriptionId, Subscription>,
    by_topic: HashMap<String, Vec<SubscriptionId>>,
    next_id: SubscriptionId,
}

impl SubscriptionRegistry {
    pub fn new() -> Self {
        Self {
            by_id: HashMap::new(),
            by_topic: HashMap::new(),
            next_id: 1,
        }
    }

    /// Insert a subscription, returning its id. Ids are allocated here,
    /// under the caller's lock, so they are strictly monotonic.
    pub fn insert(&mut self, topic: &str, callback: Arc<Callback>) -> SubscriptionId {
        let id = self.next_id;
        self.next_id += 1;
        self.by_id.insert(
            id,
            Subscription {
                topic: topic.to_string(),
                callback,
            },
        );
        self.by_topic.entry(topic.to_string()).or_default().push(id);
        id
    }

    /// Remove one subscription. True iff the id existed. Removing the last
    /// subscriber of a topic drops the topic key entirely.
    pub fn remove(&mut self, id: SubscriptionId) -> bool {
        let Some(sub) = self.by_id.remove(&id) else {
            return false;
        };
        if let Some(ids) = self.by_topic.get_mut(&sub.topic) {
            ids.retain(|&other| other != id);
            if ids.is_empty() {
                self.by_topic.remove(&sub.topic);
            }
        }
        true
    }

    /// Remove every subscription of a topic in one sweep. Returns how many
    /// were removed.
    pub fn remove_topic(&mut self, topic: &str) -> usize {
        let Some(ids) = self.by_topic.remove(topic) else {
            return 0;
        };
        for id in &ids {
            self.by_id.remove(id);
        }
        ids.len()
    }

    /// Clone the callback handles of a topic in delivery order.
    ///
    /// Cloning the `Arc`s (not borrowing) is what lets the dispatcher drop
    /// the registry lock before invoking anything: an unsubscribe racing
    /// with the dispatch unlinks the record but cannot free a callback the
    /// snapshot still holds.
    pub fn snapshot(&self, topic: &str) -> Vec<Arc<Callback>> {
        match self.by_topic.get(topic) {
            Some(ids) => ids
                .iter()
                .filter_map(|id| self.by_id.get(id))
                .map(|sub| Arc::clone(&sub.callback))
                .collect(),
            None => Vec::new(),
        }
    }

    pub fn subscriber_count(&self, topic: &str) -> usize {
        self.by_topic.get(topic).map_or(0, Vec::len)
    }

    pub fn topics(&self) -> Vec<String> {
        self.by_topic.keys().cloned().collect()
    }
}

impl Default for SubscriptionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn noop() -> Arc<Callback> {
        Arc::new(|_msg| {})
    }

    #[test]
    fn test_ids_are_monotonic() {
        let mut registry = SubscriptionRegistry::new();
        let a = registry.insert("t", noop());
        let b = registry.insert("t", noop());
        registry.remove(a);
        let c = registry.insert("t", noop());
        assert!(a < b && b < c);
    }

    #[test]
    fn test_snapshot_preserves_insertion_order() {
        let mut registry = SubscriptionRegistry::new();
        let order = Arc::new(std::sync::Mutex::new(Vec::new()));
        for tag in ["first", "second", "third"] {
            let order = Arc::clone(&order);
            registry.insert("t", Arc::new(move |_msg| order.lock().unwrap().push(tag)));
        }
        let msg = crate::message::Message {
            topic: "t".to_string(),
            payload: Vec::new(),
            timestamp_ms: 0,
        };
        for cb in registry.snapshot("t") {
            cb(&msg);
        }
        assert_eq!(*order.lock().unwrap(), vec!["first", "second", "third"]);
    }

    #[test]
    fn test_remove_cleans_empty_topic() {
        let mut registry = SubscriptionRegistry::new();
        let id = registry.insert("t", noop());
        assert_eq!(registry.subscriber_count("t"), 1);
        assert!(registry.remove(id));
        assert!(!registry.remove(id));
        assert_eq!(registry.subscriber_count("t"), 0);
        assert!(registry.topics().is_empty());
    }

    #[test]
    fn test_remove_topic_clears_both_maps() {
        let mut registry = SubscriptionRegistry::new();
        registry.insert("a", noop());
        registry.insert("a", noop());
        let keep = registry.insert("b", noop());
        assert_eq!(registry.remove_topic("a"), 2);
        assert_eq!(registry.remove_topic("a"), 0);
        assert_eq!(registry.subscriber_count("b"), 1);
        assert!(registry.remove(keep));
    }
}
