//! Per-type configuration cache with copy-down inheritance.
//!
//! One `TrackingConfiguration<T>` is memoized per exact type. Rust has no
//! runtime ancestor chain to walk, so inheritance is declared at the call
//! site: `configure_derived::<Sub, Base>()` copies the base configuration
//! into a new one for `Sub`, lifting every accessor through
//! `AsRef`/`AsMut`. Chains compose because the base configuration already
//! contains whatever it lifted from its own base at creation time.
//!
//! The copy is taken when the derived configuration is first built.
//! Declarations added to the base type afterwards are not retrofitted into
//! already-finalized derived configurations; this is deliberate, matching
//! the call-order determinism rule for the registry.

use std::any::{Any, TypeId};
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use tracing::debug;

use crate::config::TrackingConfiguration;
use crate::tracked::Tracked;

pub(crate) type SharedConfig<T> = Rc<RefCell<TrackingConfiguration<T>>>;

pub(crate) struct ConfigurationRegistry {
    tracker_name: Option<String>,
    configs: RefCell<HashMap<TypeId, Box<dyn Any>>>,
}

impl ConfigurationRegistry {
    pub(crate) fn new(tracker_name: Option<String>) -> Self {
        Self {
            tracker_name,
            configs: RefCell::new(HashMap::new()),
        }
    }

    /// The memoized configuration for `T`, built from the type's
    /// self-description on first use.
    pub(crate) fn configure<T: Tracked>(&self) -> SharedConfig<T> {
        if let Some(existing) = self.get::<T>() {
            return existing;
        }

        let mut config = TrackingConfiguration::new();
        T::describe(&mut config, self.tracker_name.as_deref());
        debug!(
            type_name = std::any::type_name::<T>(),
            "built tracking configuration"
        );
        self.insert(config)
    }

    /// The memoized configuration for `T`, initialized as a copy of `B`'s
    /// configuration (creating `B`'s on demand).
    pub(crate) fn configure_derived<T, B>(&self) -> SharedConfig<T>
    where
        T: Tracked + AsRef<B> + AsMut<B>,
        B: Tracked,
    {
        if let Some(existing) = self.get::<T>() {
            return existing;
        }

        let base = self.configure::<B>();
        let config = base.borrow().lift::<T>();
        debug!(
            type_name = std::any::type_name::<T>(),
            base = std::any::type_name::<B>(),
            "built tracking configuration from base type"
        );
        self.insert(config)
    }

    fn get<T: 'static>(&self) -> Option<SharedConfig<T>> {
        self.configs
            .borrow()
            .get(&TypeId::of::<T>())
            .and_then(|boxed| boxed.downcast_ref::<SharedConfig<T>>())
            .cloned()
    }

    fn insert<T: 'static>(&self, config: TrackingConfiguration<T>) -> SharedConfig<T> {
        let shared = Rc::new(RefCell::new(config));
        self.configs
            .borrow_mut()
            .insert(TypeId::of::<T>(), Box::new(shared.clone()));
        shared
    }
}
