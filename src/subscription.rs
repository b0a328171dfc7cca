//! Topics the client has subscribed to.
//!
//! Subscriptions live on the modem and vanish with every hardware reset, so
//! the client keeps this table only to replay them after reconnecting.

use heapless::{String, Vec};

use crate::command::{MAX_TOPIC_LEN, QoS};

/// One subscribed topic filter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subscription {
    pub topic: String<MAX_TOPIC_LEN>,
    pub qos: QoS,
}

/// Fixed-capacity table of subscriptions, owning its topic strings.
#[derive(Debug, Default)]
pub struct SubscriptionTable<const MAX_SUBS: usize> {
    entries: Vec<Subscription, MAX_SUBS>,
}

impl<const MAX_SUBS: usize> SubscriptionTable<MAX_SUBS> {
    pub const fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Looks up the QoS a topic was subscribed with.
    pub fn get(&self, topic: &str) -> Option<QoS> {
        self.entries
            .iter()
            .find(|s| s.topic.as_str() == topic)
            .map(|s| s.qos)
    }

    /// `true` if `topic` is new and the table has no room for it.
    pub fn is_full_for(&self, topic: &str) -> bool {
        self.get(topic).is_none() && self.entries.is_full()
    }

    /// Records a subscription, updating the QoS of an existing entry.
    ///
    /// Returns `false` if the table is full or the topic is too long.
    pub fn insert(&mut self, topic: &str, qos: QoS) -> bool {
        if let Some(existing) = self.entries.iter_mut().find(|s| s.topic.as_str() == topic) {
            existing.qos = qos;
            return true;
        }
        let mut owned = String::new();
        if owned.push_str(topic).is_err() {
            return false;
        }
        self.entries.push(Subscription { topic: owned, qos }).is_ok()
    }

    /// Get an iterator over the recorded subscriptions.
    pub fn iter(&self) -> impl Iterator<Item = (&str, QoS)> {
        self.entries.iter().map(|s| (s.topic.as_str(), s.qos))
    }

    /// The entry at `index`, in insertion order.
    pub fn nth(&self, index: usize) -> Option<&Subscription> {
        self.entries.get(index)
    }

    /// Forgets `topic`. Returns `false` if it was not recorded.
    pub fn remove(&mut self, topic: &str) -> bool {
        match self.entries.iter().position(|s| s.topic.as_str() == topic) {
            Some(index) => {
                self.entries.remove(index);
                true
            }
            None => false,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_updates_existing_qos() {
        let mut table = SubscriptionTable::<2>::new();
        assert!(table.insert("a/b", QoS::AtMostOnce));
        assert!(table.insert("a/b", QoS::AtLeastOnce));
        assert_eq!(table.len(), 1);
        assert_eq!(table.get("a/b"), Some(QoS::AtLeastOnce));
    }

    #[test]
    fn full_table_rejects_new_topics_only() {
        let mut table = SubscriptionTable::<1>::new();
        assert!(table.insert("a", QoS::AtMostOnce));
        assert!(table.is_full_for("b"));
        assert!(!table.is_full_for("a"));
        assert!(!table.insert("b", QoS::AtMostOnce));
    }

    #[test]
    fn remove_keeps_order_of_the_rest() {
        let mut table = SubscriptionTable::<3>::new();
        table.insert("a", QoS::AtMostOnce);
        table.insert("b", QoS::AtLeastOnce);
        table.insert("c", QoS::ExactlyOnce);
        assert!(table.remove("b"));
        assert!(!table.remove("b"));
        let topics: std::vec::Vec<&str> = table.iter().map(|(t, _)| t).collect();
        assert_eq!(topics, ["a", "c"]);
    }
}
