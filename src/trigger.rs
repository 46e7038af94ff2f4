//! Synchronous event plumbing for persist and stop-tracking triggers.
//!
//! The engine never discovers events by name at runtime. Instead the host
//! registers explicit callbacks: a [`Trigger`] pairs an event name (used
//! for logging) with a resolver that maps a target to the [`Event`] that
//! actually fires. Hosts either embed `Event` values in their types or
//! bridge their own event systems by raising one.

use std::cell::RefCell;
use std::rc::{Rc, Weak};

type Handler = Rc<dyn Fn()>;

#[derive(Default)]
struct EventInner {
    next_id: u64,
    handlers: Vec<(u64, Handler)>,
}

/// A cloneable, single-threaded multicast signal.
///
/// Clones share the same handler list, so a target type can hand out copies
/// of its events freely. Not `Send`; everything happens on the thread that
/// owns the target objects.
#[derive(Clone, Default)]
pub struct Event {
    inner: Rc<RefCell<EventInner>>,
}

impl Event {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler. The subscription unsubscribes on drop.
    pub fn subscribe(&self, handler: impl Fn() + 'static) -> Subscription {
        let mut inner = self.inner.borrow_mut();
        let id = inner.next_id;
        inner.next_id += 1;
        inner.handlers.push((id, Rc::new(handler)));
        Subscription {
            event: Rc::downgrade(&self.inner),
            id,
        }
    }

    /// Invoke every registered handler, in subscription order.
    ///
    /// The handler list is snapshotted before dispatch, so a handler may
    /// subscribe or unsubscribe (itself included) while the event is
    /// raising. Raise after releasing any mutable borrow of the object that
    /// owns the event; handlers typically read the object's state.
    pub fn raise(&self) {
        let handlers: Vec<Handler> = self
            .inner
            .borrow()
            .handlers
            .iter()
            .map(|(_, handler)| handler.clone())
            .collect();
        for handler in handlers {
            handler();
        }
    }

    /// Number of live subscriptions.
    pub fn handler_count(&self) -> usize {
        self.inner.borrow().handlers.len()
    }
}

/// Handle for one registered handler. Dropping it detaches the handler.
pub struct Subscription {
    event: Weak<RefCell<EventInner>>,
    id: u64,
}

impl Subscription {
    /// Detach the handler now instead of waiting for drop.
    pub fn unsubscribe(self) {}
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(inner) = self.event.upgrade() {
            inner.borrow_mut().handlers.retain(|(id, _)| *id != self.id);
        }
    }
}

/// A named event plus a resolver for the object that raises it.
///
/// The resolver usually returns an event owned by the target itself, but it
/// may return one owned by a different collaborator object.
pub struct Trigger<T> {
    event_name: String,
    source: Rc<dyn Fn(&T) -> Event>,
}

impl<T> Clone for Trigger<T> {
    fn clone(&self) -> Self {
        Self {
            event_name: self.event_name.clone(),
            source: self.source.clone(),
        }
    }
}

impl<T: 'static> Trigger<T> {
    pub fn new(event_name: impl Into<String>, source: impl Fn(&T) -> Event + 'static) -> Self {
        Self {
            event_name: event_name.into(),
            source: Rc::new(source),
        }
    }

    pub fn event_name(&self) -> &str {
        &self.event_name
    }

    /// Resolve the event this trigger listens to for the given target.
    pub(crate) fn resolve(&self, target: &T) -> Event {
        (self.source)(target)
    }

    /// Re-target the trigger at a type that can be viewed as `T`.
    pub(crate) fn lift<U: 'static>(&self, project: Rc<dyn Fn(&U) -> &T>) -> Trigger<U> {
        let source = self.source.clone();
        Trigger {
            event_name: self.event_name.clone(),
            source: Rc::new(move |target: &U| source(project(target))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[test]
    fn handlers_fire_in_subscription_order() {
        let event = Event::new();
        let log = Rc::new(RefCell::new(Vec::new()));

        let l1 = log.clone();
        let _s1 = event.subscribe(move || l1.borrow_mut().push(1));
        let l2 = log.clone();
        let _s2 = event.subscribe(move || l2.borrow_mut().push(2));

        event.raise();
        assert_eq!(*log.borrow(), vec![1, 2]);
    }

    #[test]
    fn dropping_subscription_detaches_handler() {
        let event = Event::new();
        let fired = Rc::new(Cell::new(0));

        let f = fired.clone();
        let sub = event.subscribe(move || f.set(f.get() + 1));
        event.raise();
        assert_eq!(fired.get(), 1);

        sub.unsubscribe();
        event.raise();
        assert_eq!(fired.get(), 1);
        assert_eq!(event.handler_count(), 0);
    }

    #[test]
    fn handler_may_unsubscribe_another_during_raise() {
        let event = Event::new();
        let fired = Rc::new(Cell::new(0));

        let f = fired.clone();
        let victim = Rc::new(RefCell::new(Some(
            event.subscribe(move || f.set(f.get() + 1)),
        )));

        let v = victim.clone();
        let _killer = event.subscribe(move || {
            v.borrow_mut().take();
        });

        // the snapshot taken before dispatch still includes the victim once
        event.raise();
        assert_eq!(fired.get(), 1);

        event.raise();
        assert_eq!(fired.get(), 1);
    }

    #[test]
    fn clones_share_the_handler_list() {
        let event = Event::new();
        let copy = event.clone();
        let fired = Rc::new(Cell::new(false));

        let f = fired.clone();
        let _sub = event.subscribe(move || f.set(true));
        copy.raise();
        assert!(fired.get());
    }
}
