//! Event plumbing for the single-threaded editing engine.
//!
//! Two delivery styles cover the engine's needs:
//! - [`EventBus`] is a bounded drain queue. Producers publish, the owner of
//!   the control flow drains after each update pass. Used where the consumer
//!   also mutates the engine (recipe activation, editor notices).
//! - [`Signal`] is an explicit subscribe/unsubscribe list for external
//!   observers (rendering, persistence). Subscribers must unsubscribe on
//!   teardown; subscriptions are not garbage collected.

use std::collections::VecDeque;

/// A bounded queue of pending events, drained by the control flow owner.
#[derive(Debug)]
pub struct EventBus<T> {
    events: VecDeque<T>,
    max_pending: usize,
}

impl<T> EventBus<T> {
    pub fn new(max_pending: usize) -> Self {
        Self {
            events: VecDeque::with_capacity(max_pending.min(64)),
            max_pending,
        }
    }

    pub fn publish(&mut self, event: T) {
        if self.events.len() >= self.max_pending {
            log::warn!("Event bus full ({} events), dropping oldest", self.max_pending);
            self.events.pop_front();
        }
        self.events.push_back(event);
    }

    pub fn drain(&mut self) -> Vec<T> {
        self.events.drain(..).collect()
    }

    pub fn pending_count(&self) -> usize {
        self.events.len()
    }
}

impl<T> Default for EventBus<T> {
    fn default() -> Self {
        Self::new(256)
    }
}

/// Handle returned by [`Signal::subscribe`], used to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubscriptionId(u64);

/// A subscriber list with explicit lifecycle.
///
/// Emission is synchronous and in subscription order. Subscribers receive a
/// shared reference to the event; they observe, they do not mutate the engine.
pub struct Signal<T> {
    subscribers: Vec<(SubscriptionId, Box<dyn FnMut(&T)>)>,
    next_id: u64,
}

impl<T> Signal<T> {
    pub fn new() -> Self {
        Self {
            subscribers: Vec::new(),
            next_id: 1,
        }
    }

    /// Register an observer. The returned id must be passed to
    /// [`Signal::unsubscribe`] on teardown.
    pub fn subscribe(&mut self, f: impl FnMut(&T) + 'static) -> SubscriptionId {
        let id = SubscriptionId(self.next_id);
        self.next_id += 1;
        self.subscribers.push((id, Box::new(f)));
        id
    }

    /// Remove an observer. Returns false if the id was not registered.
    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let before = self.subscribers.len();
        self.subscribers.retain(|(sid, _)| *sid != id);
        self.subscribers.len() != before
    }

    /// Notify every subscriber, in subscription order.
    pub fn emit(&mut self, event: &T) {
        for (_, f) in &mut self.subscribers {
            f(event);
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }
}

impl<T> Default for Signal<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> std::fmt::Debug for Signal<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Signal")
            .field("subscribers", &self.subscribers.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[test]
    fn test_event_bus_drain() {
        let mut bus = EventBus::new(4);
        bus.publish(1);
        bus.publish(2);
        assert_eq!(bus.pending_count(), 2);
        assert_eq!(bus.drain(), vec![1, 2]);
        assert_eq!(bus.pending_count(), 0);
    }

    #[test]
    fn test_event_bus_drops_oldest_when_full() {
        let mut bus = EventBus::new(2);
        bus.publish(1);
        bus.publish(2);
        bus.publish(3);
        assert_eq!(bus.drain(), vec![2, 3]);
    }

    #[test]
    fn test_signal_subscribe_unsubscribe() {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let mut signal = Signal::new();

        let sink = Rc::clone(&seen);
        let id = signal.subscribe(move |v: &i32| sink.borrow_mut().push(*v));
        signal.emit(&7);
        assert_eq!(*seen.borrow(), vec![7]);

        assert!(signal.unsubscribe(id));
        assert!(!signal.unsubscribe(id));
        signal.emit(&8);
        assert_eq!(*seen.borrow(), vec![7]);
    }
}
