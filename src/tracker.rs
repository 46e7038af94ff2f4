//! Tracker - the engine root that orchestrates track/apply/persist for
//! many concurrently tracked objects.
//!
//! Targets are handed in as `Rc<RefCell<T>>`; the tracker keeps only weak
//! references, so it is never the reason an object stays alive. Entries for
//! dropped targets are pruned during sweeps.

use std::any::Any;
use std::cell::RefCell;
use std::rc::Rc;

use tracing::{debug, warn};

use crate::config::TrackingConfiguration;
use crate::error::Error;
use crate::registry::{ConfigurationRegistry, SharedConfig};
use crate::store::Store;
use crate::tracked::Tracked;
use crate::trigger::{Event, Subscription};

/// Orchestrates tracking for individual object instances: resolves their
/// configuration, applies stored state, wires persist triggers, and runs
/// global persist sweeps.
///
/// Single-threaded by design; distinct trackers are fully independent and
/// may share a store.
pub struct Tracker {
    shared: Rc<TrackerShared>,
}

struct TrackerShared {
    name: Option<String>,
    store: Rc<dyn Store>,
    registry: ConfigurationRegistry,
    tracked: RefCell<Vec<TrackedEntry>>,
}

/// Type-erased bookkeeping for one tracked target.
struct TrackedEntry {
    /// Pointer identity of the target's `Rc`.
    key: usize,
    alive: Box<dyn Fn() -> bool>,
    auto_persist: Box<dyn Fn() -> bool>,
    persist: Rc<dyn Fn(&dyn Store) -> Result<(), Error>>,
    /// `SharedConfig<T>` for typed retrieval by apply/persist.
    config: Box<dyn Any>,
    /// Trigger subscriptions, held only so dropping the entry detaches
    /// the handlers.
    _subscriptions: Vec<Subscription>,
}

fn entry_key<T>(target: &Rc<RefCell<T>>) -> usize {
    Rc::as_ptr(target) as *const () as usize
}

impl Tracker {
    /// A tracker persisting to `store`.
    pub fn new(store: impl Store + 'static) -> Self {
        Self::build(store, None)
    }

    /// A named tracker. The name is passed to [`Tracked::describe`] so a
    /// type can declare different property subsets for different trackers.
    pub fn named(store: impl Store + 'static, name: impl Into<String>) -> Self {
        Self::build(store, Some(name.into()))
    }

    fn build(store: impl Store + 'static, name: Option<String>) -> Self {
        let registry = ConfigurationRegistry::new(name.clone());
        Self {
            shared: Rc::new(TrackerShared {
                name,
                store: Rc::new(store),
                registry,
                tracked: RefCell::new(Vec::new()),
            }),
        }
    }

    pub fn name(&self) -> Option<&str> {
        self.shared.name.as_deref()
    }

    /// The memoized configuration for type `T`, for declaring tracked
    /// properties, identity, triggers, and hooks.
    pub fn configure<T: Tracked>(&self) -> ConfigHandle<T> {
        ConfigHandle {
            inner: self.shared.registry.configure::<T>(),
        }
    }

    /// Configure `T` starting from a copy of `B`'s configuration. Derived
    /// types get the base type's tracked properties by default and can be
    /// extended independently.
    pub fn configure_derived<T, B>(&self) -> ConfigHandle<T>
    where
        T: Tracked + AsRef<B> + AsMut<B>,
        B: Tracked,
    {
        ConfigHandle {
            inner: self.shared.registry.configure_derived::<T, B>(),
        }
    }

    /// Start tracking `target`: resolve its configuration (cloning it if
    /// the instance customizes its own tracking), apply stored state, wire
    /// persist triggers, and register the target weakly.
    ///
    /// Trigger subscriptions are wired only after the first apply has
    /// completed, so a trigger firing mid-apply can never overwrite freshly
    /// applied values with an empty read. Tracking an already-tracked
    /// target is a no-op.
    pub fn track<T: Tracked>(&self, target: &Rc<RefCell<T>>) -> Result<(), Error> {
        let key = entry_key(target);
        if self.shared.find_index(key).is_some() {
            debug!("target already tracked, ignoring");
            return Ok(());
        }

        let template = self.shared.registry.configure::<T>();
        let config = {
            // customization always happens on a copy of the template
            let mut instance = template.borrow().clone();
            if target.borrow().configure_tracking(&mut instance) {
                debug!("instance customized its tracking configuration");
                Rc::new(RefCell::new(instance))
            } else {
                template
            }
        };

        config
            .borrow()
            .apply(&mut target.borrow_mut(), self.shared.store.as_ref())?;

        let subscriptions = wire_triggers(&self.shared, key, target, &config);

        let alive = {
            let weak = Rc::downgrade(target);
            Box::new(move || weak.upgrade().is_some())
        };
        let auto_persist = {
            let config = config.clone();
            Box::new(move || config.borrow().auto_persist_enabled())
        };
        let persist: Rc<dyn Fn(&dyn Store) -> Result<(), Error>> = {
            let weak = Rc::downgrade(target);
            let config = config.clone();
            Rc::new(move |store: &dyn Store| match weak.upgrade() {
                Some(target) => config.borrow().persist(&target.borrow(), store),
                None => Ok(()),
            })
        };

        self.shared.tracked.borrow_mut().push(TrackedEntry {
            key,
            alive,
            auto_persist,
            persist,
            config: Box::new(config),
            _subscriptions: subscriptions,
        });
        Ok(())
    }

    /// Re-apply stored state to an already-tracked target.
    pub fn apply<T: Tracked>(&self, target: &Rc<RefCell<T>>) -> Result<(), Error> {
        let config = self
            .shared
            .config_of::<T>(entry_key(target))
            .ok_or(Error::NotTracked)?;
        let config = config.borrow();
        config.apply(&mut target.borrow_mut(), self.shared.store.as_ref())
    }

    /// Persist an already-tracked target's current values.
    pub fn persist<T: Tracked>(&self, target: &Rc<RefCell<T>>) -> Result<(), Error> {
        let config = self
            .shared
            .config_of::<T>(entry_key(target))
            .ok_or(Error::NotTracked)?;
        let config = config.borrow();
        config.persist(&target.borrow(), self.shared.store.as_ref())
    }

    /// Detach all trigger handlers and remove the target from the weak
    /// registry, excluding it from future sweeps. Terminal for the target;
    /// it can be tracked again from scratch.
    pub fn stop_tracking<T: 'static>(&self, target: &Rc<RefCell<T>>) {
        self.shared.remove_entry(entry_key(target));
    }

    /// Clear the stored bundle for an identity, independent of in-memory
    /// tracking state.
    pub fn forget(&self, id: &str) -> Result<(), Error> {
        self.shared
            .store
            .clear_bundle(id)
            .map_err(|source| Error::Store {
                id: id.to_string(),
                source,
            })
    }

    /// Clear the stored bundle for a target, whether or not it is
    /// currently tracked.
    pub fn forget_target<T: Tracked>(&self, target: &Rc<RefCell<T>>) -> Result<(), Error> {
        let config = self
            .shared
            .config_of::<T>(entry_key(target))
            .unwrap_or_else(|| self.shared.registry.configure::<T>());
        let id = config.borrow().id_of(&target.borrow());
        self.forget(&id)
    }

    /// Persist every still-alive tracked target whose configuration has
    /// auto-persist enabled. Dead entries are pruned first; a failure
    /// persisting one target never prevents persisting the others.
    pub fn persist_all(&self) {
        self.shared.persist_all();
    }

    /// Wire a global persist signal: on every raise of `signal`, run
    /// [`persist_all`](Self::persist_all). Typically connected to the host
    /// application's shutdown notification. Dropping the returned
    /// subscription disconnects the signal.
    #[must_use]
    pub fn auto_persist_on(&self, signal: &Event) -> Subscription {
        let weak = Rc::downgrade(&self.shared);
        signal.subscribe(move || {
            if let Some(shared) = weak.upgrade() {
                shared.persist_all();
            }
        })
    }
}

impl TrackerShared {
    fn find_index(&self, key: usize) -> Option<usize> {
        self.tracked
            .borrow()
            .iter()
            .position(|entry| entry.key == key)
    }

    fn config_of<T: 'static>(&self, key: usize) -> Option<SharedConfig<T>> {
        let tracked = self.tracked.borrow();
        let entry = tracked.iter().find(|entry| entry.key == key)?;
        entry.config.downcast_ref::<SharedConfig<T>>().cloned()
    }

    fn remove_entry(&self, key: usize) {
        // dropping the entry drops its subscriptions, detaching handlers
        let removed = {
            let mut tracked = self.tracked.borrow_mut();
            let before = tracked.len();
            tracked.retain(|entry| entry.key != key);
            before != tracked.len()
        };
        if removed {
            debug!("stopped tracking target");
        }
    }

    fn persist_all(&self) {
        self.tracked.borrow_mut().retain(|entry| (entry.alive)());

        // snapshot the persist closures so a hook that stops tracking
        // mid-sweep cannot invalidate the iteration
        let jobs: Vec<Rc<dyn Fn(&dyn Store) -> Result<(), Error>>> = self
            .tracked
            .borrow()
            .iter()
            .filter(|entry| (entry.auto_persist)())
            .map(|entry| entry.persist.clone())
            .collect();

        debug!(targets = jobs.len(), "global persist sweep");
        for persist in jobs {
            if let Err(err) = persist(self.store.as_ref()) {
                warn!(error = %err, "persisting a tracked target failed, continuing sweep");
            }
        }
    }
}

/// Subscribe the target's persist and stop-tracking triggers. Called after
/// the initial apply has completed.
fn wire_triggers<T: Tracked>(
    shared: &Rc<TrackerShared>,
    key: usize,
    target: &Rc<RefCell<T>>,
    config: &SharedConfig<T>,
) -> Vec<Subscription> {
    let mut subscriptions = Vec::new();
    let cfg = config.borrow();

    for trigger in cfg.persist_triggers() {
        let event = trigger.resolve(&target.borrow());
        let event_name = trigger.event_name().to_string();
        let weak_target = Rc::downgrade(target);
        let config = config.clone();
        let store = shared.store.clone();
        subscriptions.push(event.subscribe(move || {
            let Some(target) = weak_target.upgrade() else {
                return;
            };
            let Ok(target) = target.try_borrow() else {
                warn!(trigger = %event_name, "target borrowed while persist trigger fired, skipping");
                return;
            };
            if let Err(err) = config.borrow().persist(&target, store.as_ref()) {
                warn!(trigger = %event_name, error = %err, "trigger persist failed");
            }
        }));
    }

    if let Some(trigger) = cfg.stop_tracking_trigger() {
        let event = trigger.resolve(&target.borrow());
        let weak_shared = Rc::downgrade(shared);
        subscriptions.push(event.subscribe(move || {
            if let Some(shared) = weak_shared.upgrade() {
                shared.remove_entry(key);
            }
        }));
    }

    subscriptions
}

/// Chainable handle over a type's shared [`TrackingConfiguration`].
///
/// Mirrors the configuration's builder methods; mutations go to the shared
/// template, so they affect targets tracked afterwards.
pub struct ConfigHandle<T: 'static> {
    inner: SharedConfig<T>,
}

impl<T: 'static> Clone for ConfigHandle<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T: 'static> ConfigHandle<T> {
    pub fn id(&self, id_fn: impl Fn(&T) -> String + 'static) -> &Self {
        self.inner.borrow_mut().id(id_fn);
        self
    }

    pub fn id_scoped(
        &self,
        id_fn: impl Fn(&T) -> String + 'static,
        namespace: &[&str],
        include_type: bool,
    ) -> &Self {
        self.inner
            .borrow_mut()
            .id_scoped(id_fn, namespace, include_type);
        self
    }

    pub fn property<P, G, S>(&self, name: &str, get: G, set: S) -> &Self
    where
        P: serde::Serialize + serde::de::DeserializeOwned + 'static,
        G: Fn(&T) -> P + 'static,
        S: Fn(&mut T, P) + 'static,
    {
        self.inner.borrow_mut().property(name, get, set);
        self
    }

    pub fn property_with_default<P, G, S>(&self, name: &str, get: G, set: S, default: P) -> &Self
    where
        P: serde::Serialize + serde::de::DeserializeOwned + 'static,
        G: Fn(&T) -> P + 'static,
        S: Fn(&mut T, P) + 'static,
    {
        self.inner
            .borrow_mut()
            .property_with_default(name, get, set, default);
        self
    }

    pub fn persist_on(&self, event_name: &str, source: impl Fn(&T) -> Event + 'static) -> &Self {
        self.inner.borrow_mut().persist_on(event_name, source);
        self
    }

    pub fn stop_tracking_on(
        &self,
        event_name: &str,
        source: impl Fn(&T) -> Event + 'static,
    ) -> &Self {
        self.inner.borrow_mut().stop_tracking_on(event_name, source);
        self
    }

    pub fn when_applying_property(
        &self,
        hook: impl Fn(&T, &mut crate::config::PropertyOperation) + 'static,
    ) -> &Self {
        self.inner.borrow_mut().when_applying_property(hook);
        self
    }

    pub fn when_applied(&self, hook: impl Fn(&mut T) + 'static) -> &Self {
        self.inner.borrow_mut().when_applied(hook);
        self
    }

    pub fn when_persisting_property(
        &self,
        hook: impl Fn(&T, &mut crate::config::PropertyOperation) + 'static,
    ) -> &Self {
        self.inner.borrow_mut().when_persisting_property(hook);
        self
    }

    pub fn when_persisted(&self, hook: impl Fn(&T) + 'static) -> &Self {
        self.inner.borrow_mut().when_persisted(hook);
        self
    }

    pub fn auto_persist(&self, enabled: bool) -> &Self {
        self.inner.borrow_mut().auto_persist(enabled);
        self
    }

    /// Escape hatch for bulk edits against the underlying configuration.
    pub fn with(&self, edit: impl FnOnce(&mut TrackingConfiguration<T>)) -> &Self {
        edit(&mut self.inner.borrow_mut());
        self
    }

    /// Names of the tracked properties, in declaration order.
    pub fn property_names(&self) -> Vec<String> {
        self.inner.borrow().property_names()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use serde_json::json;

    #[derive(Default)]
    struct Counter {
        name: String,
        count: u32,
    }
    impl Tracked for Counter {}

    fn tracker() -> Tracker {
        let t = Tracker::new(MemoryStore::new());
        t.configure::<Counter>()
            .id(|c| c.name.clone())
            .property("count", |c: &Counter| c.count, |c, v| c.count = v);
        t
    }

    #[test]
    fn apply_and_persist_require_tracking() {
        let t = tracker();
        let counter = Rc::new(RefCell::new(Counter::default()));

        assert!(matches!(t.persist(&counter), Err(Error::NotTracked)));
        assert!(matches!(t.apply(&counter), Err(Error::NotTracked)));

        t.track(&counter).unwrap();
        t.persist(&counter).unwrap();
        t.apply(&counter).unwrap();
    }

    #[test]
    fn tracking_twice_is_a_noop() {
        let t = tracker();
        let counter = Rc::new(RefCell::new(Counter {
            name: "a".into(),
            count: 3,
        }));
        t.track(&counter).unwrap();
        t.track(&counter).unwrap();
        assert_eq!(t.shared.tracked.borrow().len(), 1);
    }

    #[test]
    fn dropped_targets_are_pruned_from_sweeps() {
        let t = tracker();
        let keeper = Rc::new(RefCell::new(Counter {
            name: "keeper".into(),
            count: 1,
        }));
        let goner = Rc::new(RefCell::new(Counter {
            name: "goner".into(),
            count: 2,
        }));
        t.track(&keeper).unwrap();
        t.track(&goner).unwrap();

        drop(goner);
        t.persist_all();

        assert_eq!(t.shared.tracked.borrow().len(), 1);
        let store = t.shared.store.clone();
        assert!(store.get_bundle("keeper").unwrap().is_some());
        assert!(store.get_bundle("goner").unwrap().is_none());
    }

    #[test]
    fn stop_tracking_excludes_from_sweeps() {
        let t = tracker();
        let counter = Rc::new(RefCell::new(Counter {
            name: "a".into(),
            count: 7,
        }));
        t.track(&counter).unwrap();
        t.stop_tracking(&counter);

        t.persist_all();
        assert!(t.shared.store.get_bundle("a").unwrap().is_none());
        assert!(matches!(t.persist(&counter), Err(Error::NotTracked)));
    }

    #[test]
    fn auto_persist_false_skips_the_sweep_but_not_explicit_persist() {
        let t = tracker();
        t.configure::<Counter>().auto_persist(false);

        let counter = Rc::new(RefCell::new(Counter {
            name: "a".into(),
            count: 7,
        }));
        t.track(&counter).unwrap();

        t.persist_all();
        assert!(t.shared.store.get_bundle("a").unwrap().is_none());

        t.persist(&counter).unwrap();
        let bundle = t.shared.store.get_bundle("a").unwrap().unwrap();
        assert_eq!(bundle.get("count"), Some(&json!(7)));
    }

    #[test]
    fn forget_clears_the_stored_bundle() {
        let t = tracker();
        let counter = Rc::new(RefCell::new(Counter {
            name: "a".into(),
            count: 7,
        }));
        t.track(&counter).unwrap();
        t.persist(&counter).unwrap();
        assert!(t.shared.store.get_bundle("a").unwrap().is_some());

        t.forget_target(&counter).unwrap();
        assert!(t.shared.store.get_bundle("a").unwrap().is_none());
    }

    #[test]
    fn track_applies_stored_state_immediately() {
        let t = tracker();
        {
            let seeded = Rc::new(RefCell::new(Counter {
                name: "a".into(),
                count: 41,
            }));
            t.track(&seeded).unwrap();
            t.persist(&seeded).unwrap();
        }

        let fresh = Rc::new(RefCell::new(Counter {
            name: "a".into(),
            count: 0,
        }));
        t.track(&fresh).unwrap();
        assert_eq!(fresh.borrow().count, 41);
    }
}
