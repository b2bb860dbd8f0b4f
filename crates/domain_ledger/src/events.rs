//! Change notifications
//!
//! The entity store publishes a [`ChangeEvent`] for every field it changes.
//! Interested parties subscribe to `(entity, field)` topics on the
//! [`ChangeBus`]; matching events are queued as deliveries and handed out,
//! in publication order, by [`ChangeBus::drain`]. Delivery happens before the
//! mutating call returns to its caller, and nothing is ever delivered
//! asynchronously.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap, VecDeque};

use core_kernel::{
    AccountId, DocumentId, EntryId, JobId, LotId, SplitId, TaxTableId, TransactionId,
};

/// Reference to any entity in the store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id")]
pub enum EntityRef {
    Account(AccountId),
    Transaction(TransactionId),
    Split(SplitId),
    Lot(LotId),
    Document(DocumentId),
    Entry(EntryId),
    TaxTable(TaxTableId),
    Job(JobId),
}

/// Field (or aspect) of an entity that changed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ChangeField {
    Created,
    Removed,
    Currency,
    Parent,
    Children,
    /// Split set of an account, transaction or lot
    Splits,
    /// Account a split is booked against
    Account,
    Value,
    Quantity,
    /// Accounting date (for splits: the date of their transaction)
    Date,
    Lot,
    Entries,
    Owner,
    /// Any other plain attribute
    Attributes,
}

/// A single change, also used as subscription topic
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ChangeEvent {
    pub entity: EntityRef,
    pub field: ChangeField,
}

impl ChangeEvent {
    pub fn new(entity: EntityRef, field: ChangeField) -> Self {
        Self { entity, field }
    }
}

/// Who receives a delivery
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Subscriber {
    /// Memoized balance of one account
    AccountBalance(AccountId),
    /// External observer registered through the ledger facade
    Observer(u64),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Delivery {
    pub subscriber: Subscriber,
    pub event: ChangeEvent,
}

#[derive(Debug, Default)]
pub struct ChangeBus {
    by_topic: HashMap<ChangeEvent, BTreeSet<Subscriber>>,
    by_subscriber: HashMap<Subscriber, BTreeSet<ChangeEvent>>,
    outbox: VecDeque<Delivery>,
    next_observer: u64,
}

impl ChangeBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocates a fresh observer identity
    pub fn register_observer(&mut self) -> Subscriber {
        self.next_observer += 1;
        Subscriber::Observer(self.next_observer)
    }

    pub fn subscribe(&mut self, subscriber: Subscriber, topic: ChangeEvent) {
        self.by_topic.entry(topic).or_default().insert(subscriber);
        self.by_subscriber.entry(subscriber).or_default().insert(topic);
    }

    /// Drops every topic of `subscriber`
    pub fn unsubscribe_all(&mut self, subscriber: Subscriber) {
        let Some(topics) = self.by_subscriber.remove(&subscriber) else {
            return;
        };
        for topic in topics {
            if let Some(subscribers) = self.by_topic.get_mut(&topic) {
                subscribers.remove(&subscriber);
                if subscribers.is_empty() {
                    self.by_topic.remove(&topic);
                }
            }
        }
    }

    pub fn topics_of(&self, subscriber: Subscriber) -> usize {
        self.by_subscriber.get(&subscriber).map_or(0, BTreeSet::len)
    }

    /// Queues a delivery for every subscriber of the event's topic
    pub fn publish(&mut self, event: ChangeEvent) {
        if let Some(subscribers) = self.by_topic.get(&event) {
            for subscriber in subscribers {
                self.outbox.push_back(Delivery {
                    subscriber: *subscriber,
                    event,
                });
            }
        }
    }

    pub fn has_pending(&self) -> bool {
        !self.outbox.is_empty()
    }

    /// Hands out all queued deliveries
    pub fn drain(&mut self) -> Vec<Delivery> {
        self.outbox.drain(..).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn account_splits(id: AccountId) -> ChangeEvent {
        ChangeEvent::new(EntityRef::Account(id), ChangeField::Splits)
    }

    #[test]
    fn test_only_subscribed_topics_are_delivered() {
        let mut bus = ChangeBus::new();
        let watched = AccountId::new_v7();
        let other = AccountId::new_v7();
        let subscriber = Subscriber::AccountBalance(watched);

        bus.subscribe(subscriber, account_splits(watched));
        bus.publish(account_splits(other));
        bus.publish(account_splits(watched));

        let deliveries = bus.drain();
        assert_eq!(deliveries.len(), 1);
        assert_eq!(deliveries[0].subscriber, subscriber);
        assert!(!bus.has_pending());
    }

    #[test]
    fn test_unsubscribe_all_clears_topics() {
        let mut bus = ChangeBus::new();
        let account = AccountId::new_v7();
        let subscriber = Subscriber::AccountBalance(account);

        bus.subscribe(subscriber, account_splits(account));
        bus.subscribe(subscriber, ChangeEvent::new(EntityRef::Account(account), ChangeField::Currency));
        assert_eq!(bus.topics_of(subscriber), 2);

        bus.unsubscribe_all(subscriber);
        bus.publish(account_splits(account));

        assert_eq!(bus.topics_of(subscriber), 0);
        assert!(bus.drain().is_empty());
    }

    #[test]
    fn test_observers_get_distinct_ids() {
        let mut bus = ChangeBus::new();
        assert_ne!(bus.register_observer(), bus.register_observer());
    }
}
