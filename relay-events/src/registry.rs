//! Subscription registry
//!
//! Subscriber lists are stored as `Arc<Vec<Subscription>>` and never mutated
//! in place. Every change builds a new list and swaps it in, so a dispatch
//! holding a snapshot keeps iterating the list it started with.

use crate::handler::Handler;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use parking_lot::RwLock;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Snapshot of one subscriber list, highest priority first.
pub type SubscriberList = Arc<Vec<Subscription>>;

/// Registry-unique subscription identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(u64);

/// A handler bound to an event name or to the wildcard.
#[derive(Debug, Clone)]
pub struct Subscription {
    id: SubscriptionId,
    handler: Handler,
    priority: i32,
    once: bool,
}

impl Subscription {
    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    pub fn handler(&self) -> &Handler {
        &self.handler
    }

    pub fn priority(&self) -> i32 {
        self.priority
    }

    pub fn is_once(&self) -> bool {
        self.once
    }
}

/// Event name to subscriber list mapping, plus the wildcard list.
#[derive(Debug)]
pub struct SubscriptionRegistry {
    events: DashMap<String, SubscriberList>,
    wildcard: RwLock<SubscriberList>,
    wildcard_name: String,
    next_id: AtomicU64,
}

impl SubscriptionRegistry {
    pub fn new(wildcard_name: impl Into<String>) -> Self {
        Self {
            events: DashMap::new(),
            wildcard: RwLock::new(SubscriberList::default()),
            wildcard_name: wildcard_name.into(),
            next_id: AtomicU64::new(1),
        }
    }

    pub fn wildcard_name(&self) -> &str {
        &self.wildcard_name
    }

    pub fn is_wildcard(&self, event: &str) -> bool {
        event == self.wildcard_name
    }

    /// Add a subscription and keep the list ordered by descending priority.
    ///
    /// Equal priorities keep registration order.
    pub fn register(
        &self,
        event: &str,
        handler: Handler,
        priority: i32,
        once: bool,
    ) -> SubscriptionId {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let subscription = Subscription {
            id,
            handler,
            priority,
            once,
        };

        let insert = move |current: &[Subscription]| {
            let mut next = Vec::with_capacity(current.len() + 1);
            next.extend_from_slice(current);
            next.push(subscription);
            next.sort_by(|a, b| b.priority.cmp(&a.priority));
            next
        };

        if self.is_wildcard(event) {
            let mut list = self.wildcard.write();
            let next = insert(list.as_slice());
            *list = Arc::new(next);
        } else {
            let mut entry = self.events.entry(event.to_string()).or_default();
            let next = insert(entry.as_slice());
            *entry = Arc::new(next);
        }

        id
    }

    /// Remove every subscription on `event` whose handler is `handler`.
    ///
    /// Returns the number of removed subscriptions.
    pub fn unregister(&self, event: &str, handler: &Handler) -> usize {
        self.retain(event, |sub| !sub.handler.ptr_eq(handler))
    }

    /// Remove the subscriptions with the given ids from `event`.
    pub fn remove(&self, event: &str, ids: &[SubscriptionId]) -> usize {
        if ids.is_empty() {
            return 0;
        }
        self.retain(event, |sub| !ids.contains(&sub.id))
    }

    /// Replace the list for `event` with the subscriptions matching `keep`.
    ///
    /// Emptied specific lists are dropped from the map.
    fn retain(&self, event: &str, keep: impl Fn(&Subscription) -> bool) -> usize {
        let filter = |current: &[Subscription]| -> Option<Vec<Subscription>> {
            let next: Vec<Subscription> = current.iter().filter(|s| keep(s)).cloned().collect();
            (next.len() != current.len()).then_some(next)
        };

        if self.is_wildcard(event) {
            let mut list = self.wildcard.write();
            let before = list.len();
            match filter(list.as_slice()) {
                Some(next) => {
                    let removed = before - next.len();
                    *list = Arc::new(next);
                    removed
                }
                None => 0,
            }
        } else {
            match self.events.entry(event.to_string()) {
                Entry::Occupied(mut entry) => {
                    let before = entry.get().len();
                    match filter(entry.get().as_slice()) {
                        Some(next) if next.is_empty() => {
                            entry.remove();
                            before
                        }
                        Some(next) => {
                            let removed = before - next.len();
                            entry.insert(Arc::new(next));
                            removed
                        }
                        None => 0,
                    }
                }
                Entry::Vacant(_) => 0,
            }
        }
    }

    /// Current subscriber list for `event` (the wildcard list for the
    /// wildcard name).
    pub fn snapshot(&self, event: &str) -> SubscriberList {
        if self.is_wildcard(event) {
            return self.wildcard_snapshot();
        }
        self.events
            .get(event)
            .map(|list| Arc::clone(list.value()))
            .unwrap_or_default()
    }

    pub fn wildcard_snapshot(&self) -> SubscriberList {
        Arc::clone(&self.wildcard.read())
    }

    pub fn count(&self, event: &str) -> usize {
        self.snapshot(event).len()
    }

    /// Clear one event, the wildcard list, or everything when `event` is `None`.
    pub fn clear(&self, event: Option<&str>) {
        match event {
            Some(name) if self.is_wildcard(name) => {
                *self.wildcard.write() = SubscriberList::default();
            }
            Some(name) => {
                self.events.remove(name);
            }
            None => {
                self.events.clear();
                *self.wildcard.write() = SubscriberList::default();
            }
        }
    }

    /// Specific event names with at least one subscriber, sorted.
    pub fn event_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.events.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }
}

impl Default for SubscriptionRegistry {
    fn default() -> Self {
        Self::new(crate::config::DEFAULT_WILDCARD)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn noop() -> Handler {
        Handler::sync(|_| Ok(()))
    }

    fn priorities(list: &SubscriberList) -> Vec<i32> {
        list.iter().map(|s| s.priority()).collect()
    }

    #[test]
    fn test_sorted_by_descending_priority() {
        let registry = SubscriptionRegistry::default();
        registry.register("tick", noop(), 1, false);
        registry.register("tick", noop(), 10, false);
        registry.register("tick", noop(), 5, false);

        assert_eq!(priorities(&registry.snapshot("tick")), vec![10, 5, 1]);
    }

    #[test]
    fn test_equal_priority_keeps_insertion_order() {
        let registry = SubscriptionRegistry::default();
        let first = registry.register("tick", noop(), 0, false);
        let second = registry.register("tick", noop(), 0, false);
        let high = registry.register("tick", noop(), 3, false);
        let third = registry.register("tick", noop(), 0, false);

        let ids: Vec<SubscriptionId> = registry.snapshot("tick").iter().map(|s| s.id()).collect();
        assert_eq!(ids, vec![high, first, second, third]);
    }

    #[test]
    fn test_unregister_removes_every_match() {
        let registry = SubscriptionRegistry::default();
        let handler = noop();
        let other = noop();
        registry.register("tick", handler.clone(), 0, false);
        registry.register("tick", handler.clone(), 0, true);
        registry.register("tick", other.clone(), 0, false);

        assert_eq!(registry.unregister("tick", &handler), 2);
        assert_eq!(registry.count("tick"), 1);
        assert!(registry.snapshot("tick")[0].handler().ptr_eq(&other));
    }

    #[test]
    fn test_unregister_unknown_is_noop() {
        let registry = SubscriptionRegistry::default();
        assert_eq!(registry.unregister("missing", &noop()), 0);

        registry.register("tick", noop(), 0, false);
        assert_eq!(registry.unregister("tick", &noop()), 0);
        assert_eq!(registry.count("tick"), 1);
    }

    #[test]
    fn test_empty_lists_are_dropped() {
        let registry = SubscriptionRegistry::default();
        let handler = noop();
        registry.register("tick", handler.clone(), 0, false);
        assert_eq!(registry.event_names(), vec!["tick".to_string()]);

        registry.unregister("tick", &handler);
        assert!(registry.event_names().is_empty());
        assert_eq!(registry.count("tick"), 0);
    }

    #[test]
    fn test_snapshot_is_not_affected_by_removal() {
        let registry = SubscriptionRegistry::default();
        let handler = noop();
        registry.register("tick", handler.clone(), 0, false);

        let snapshot = registry.snapshot("tick");
        registry.unregister("tick", &handler);
        registry.register("tick", noop(), 0, false);

        assert_eq!(snapshot.len(), 1);
        assert!(snapshot[0].handler().ptr_eq(&handler));
    }

    #[test]
    fn test_remove_by_id() {
        let registry = SubscriptionRegistry::default();
        let handler = noop();
        let keep = registry.register("tick", handler.clone(), 0, false);
        let fired = registry.register("tick", handler.clone(), 0, true);

        assert_eq!(registry.remove("tick", &[fired]), 1);
        assert_eq!(registry.remove("tick", &[fired]), 0);
        assert_eq!(registry.snapshot("tick")[0].id(), keep);
    }

    #[test]
    fn test_wildcard_is_separate() {
        let registry = SubscriptionRegistry::default();
        registry.register("*", noop(), 0, false);
        registry.register("tick", noop(), 0, false);

        assert_eq!(registry.count("*"), 1);
        assert_eq!(registry.count("tick"), 1);
        assert_eq!(registry.event_names(), vec!["tick".to_string()]);
    }

    #[test]
    fn test_clear_scopes() {
        let registry = SubscriptionRegistry::default();
        registry.register("*", noop(), 0, false);
        registry.register("a", noop(), 0, false);
        registry.register("b", noop(), 0, false);

        registry.clear(Some("*"));
        assert_eq!(registry.count("*"), 0);
        assert_eq!(registry.count("a"), 1);

        registry.clear(Some("a"));
        assert_eq!(registry.count("a"), 0);
        assert_eq!(registry.count("b"), 1);

        registry.register("*", noop(), 0, false);
        registry.clear(None);
        assert_eq!(registry.count("*"), 0);
        assert_eq!(registry.count("b"), 0);
    }
}
