//! TrackingConfiguration - the declarative tracking contract for one type
//! (or one instance) and the apply/persist state machine that executes it.
//!
//! A configuration registered for a type is a template. Per-instance
//! customization always happens on a clone; the template itself is never
//! mutated by that path. Cloning is cheap because property accessors,
//! triggers, and hooks are shared behind `Rc`.

use std::rc::Rc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::accessor::TrackedProperty;
use crate::error::Error;
use crate::store::{Bundle, Store};
use crate::trigger::{Event, Trigger};

/// Mutable record handed to the before-apply and before-persist hooks.
///
/// Hooks may transform `value` or set `cancel`. Cancellation is a
/// first-class control signal, not an error: it affects only the property
/// being processed and never aborts the surrounding apply/persist call.
pub struct PropertyOperation {
    name: String,
    /// The value about to be applied or persisted. Hooks may replace it.
    pub value: Value,
    /// When set, the engine skips this property (apply) or keeps the
    /// previously stored value (persist).
    pub cancel: bool,
}

impl PropertyOperation {
    fn new(name: &str, value: Value) -> Self {
        Self {
            name: name.to_string(),
            value,
            cancel: false,
        }
    }

    /// Name of the property being processed.
    pub fn name(&self) -> &str {
        &self.name
    }
}

type BeforeHook<T> = Rc<dyn Fn(&T, &mut PropertyOperation)>;
type AppliedHook<T> = Rc<dyn Fn(&mut T)>;
type PersistedHook<T> = Rc<dyn Fn(&T)>;

/// How objects of type `T` (or one particular instance) are tracked.
pub struct TrackingConfiguration<T: 'static> {
    id_fn: Rc<dyn Fn(&T) -> String>,
    // insertion order preserved for deterministic processing
    properties: Vec<(String, TrackedProperty<T>)>,
    persist_triggers: Vec<Trigger<T>>,
    stop_tracking_trigger: Option<Trigger<T>>,
    applying_property: Option<BeforeHook<T>>,
    applied: Option<AppliedHook<T>>,
    persisting_property: Option<BeforeHook<T>>,
    persisted: Option<PersistedHook<T>>,
    auto_persist: bool,
}

impl<T: 'static> Clone for TrackingConfiguration<T> {
    fn clone(&self) -> Self {
        Self {
            id_fn: self.id_fn.clone(),
            properties: self.properties.clone(),
            persist_triggers: self.persist_triggers.clone(),
            stop_tracking_trigger: self.stop_tracking_trigger.clone(),
            applying_property: self.applying_property.clone(),
            applied: self.applied.clone(),
            persisting_property: self.persisting_property.clone(),
            persisted: self.persisted.clone(),
            auto_persist: self.auto_persist,
        }
    }
}

impl<T: 'static> Default for TrackingConfiguration<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: 'static> TrackingConfiguration<T> {
    /// An empty configuration. The identity defaults to the type's simple
    /// name, so every instance of the type shares one bundle until an
    /// identity function is supplied.
    pub fn new() -> Self {
        Self {
            id_fn: Rc::new(|_| simple_type_name::<T>().to_string()),
            properties: Vec::new(),
            persist_triggers: Vec::new(),
            stop_tracking_trigger: None,
            applying_property: None,
            applied: None,
            persisting_property: None,
            persisted: None,
            auto_persist: true,
        }
    }

    // ---- declaration -------------------------------------------------

    /// Use `id_fn` to derive the identity under which a target's bundle is
    /// stored.
    pub fn id(&mut self, id_fn: impl Fn(&T) -> String + 'static) -> &mut Self {
        self.id_fn = Rc::new(id_fn);
        self
    }

    /// Like [`id`](Self::id), additionally prefixing namespace segments
    /// (to disambiguate tracking contexts) and, when `include_type` is set,
    /// the type's simple name (to avoid cross-type collisions).
    pub fn id_scoped(
        &mut self,
        id_fn: impl Fn(&T) -> String + 'static,
        namespace: &[&str],
        include_type: bool,
    ) -> &mut Self {
        let segments: Vec<String> = namespace.iter().map(|s| s.to_string()).collect();
        let type_part = include_type.then(|| simple_type_name::<T>().to_string());
        self.id_fn = Rc::new(move |target| {
            let mut id = String::new();
            for segment in &segments {
                id.push_str(segment);
                id.push('.');
            }
            if let Some(type_name) = &type_part {
                id.push_str(type_name);
                id.push('.');
            }
            id.push_str(&id_fn(target));
            id
        });
        self
    }

    /// Track a property through the given accessors, stored under `name`.
    /// Redeclaring a name replaces the descriptor but keeps its position.
    pub fn property<P, G, S>(&mut self, name: &str, get: G, set: S) -> &mut Self
    where
        P: Serialize + DeserializeOwned + 'static,
        G: Fn(&T) -> P + 'static,
        S: Fn(&mut T, P) + 'static,
    {
        self.insert_property(name, TrackedProperty::new(name, get, set, None::<P>))
    }

    /// Track a property with a default used when the store has no value.
    pub fn property_with_default<P, G, S>(
        &mut self,
        name: &str,
        get: G,
        set: S,
        default: P,
    ) -> &mut Self
    where
        P: Serialize + DeserializeOwned + 'static,
        G: Fn(&T) -> P + 'static,
        S: Fn(&mut T, P) + 'static,
    {
        self.insert_property(name, TrackedProperty::new(name, get, set, Some(default)))
    }

    pub(crate) fn insert_property(
        &mut self,
        name: &str,
        property: TrackedProperty<T>,
    ) -> &mut Self {
        match self.properties.iter_mut().find(|(n, _)| n == name) {
            Some((_, existing)) => *existing = property,
            None => self.properties.push((name.to_string(), property)),
        }
        self
    }

    /// Persist the target whenever the resolved event fires. The event name
    /// is only used for logging; `source` does the actual wiring.
    pub fn persist_on(
        &mut self,
        event_name: &str,
        source: impl Fn(&T) -> Event + 'static,
    ) -> &mut Self {
        self.persist_triggers.push(Trigger::new(event_name, source));
        self
    }

    /// Stop tracking the target when the resolved event fires.
    pub fn stop_tracking_on(
        &mut self,
        event_name: &str,
        source: impl Fn(&T) -> Event + 'static,
    ) -> &mut Self {
        self.stop_tracking_trigger = Some(Trigger::new(event_name, source));
        self
    }

    /// Hook invoked before each stored value is applied to the target.
    pub fn when_applying_property(
        &mut self,
        hook: impl Fn(&T, &mut PropertyOperation) + 'static,
    ) -> &mut Self {
        self.applying_property = Some(Rc::new(hook));
        self
    }

    /// Hook invoked once after all stored state has been applied.
    pub fn when_applied(&mut self, hook: impl Fn(&mut T) + 'static) -> &mut Self {
        self.applied = Some(Rc::new(hook));
        self
    }

    /// Hook invoked before each property value is persisted.
    pub fn when_persisting_property(
        &mut self,
        hook: impl Fn(&T, &mut PropertyOperation) + 'static,
    ) -> &mut Self {
        self.persisting_property = Some(Rc::new(hook));
        self
    }

    /// Hook invoked once after the bundle has been written.
    pub fn when_persisted(&mut self, hook: impl Fn(&T) + 'static) -> &mut Self {
        self.persisted = Some(Rc::new(hook));
        self
    }

    /// Include or exclude this configuration's targets from global
    /// persist sweeps (included by default).
    pub fn auto_persist(&mut self, enabled: bool) -> &mut Self {
        self.auto_persist = enabled;
        self
    }

    // ---- introspection -----------------------------------------------

    /// The identity under which `target`'s bundle is stored.
    pub fn id_of(&self, target: &T) -> String {
        (self.id_fn)(target)
    }

    /// Names of the tracked properties, in declaration order.
    pub fn property_names(&self) -> Vec<String> {
        self.properties
            .iter()
            .map(|(name, _)| name.clone())
            .collect()
    }

    pub fn auto_persist_enabled(&self) -> bool {
        self.auto_persist
    }

    pub(crate) fn persist_triggers(&self) -> &[Trigger<T>] {
        &self.persist_triggers
    }

    pub(crate) fn stop_tracking_trigger(&self) -> Option<&Trigger<T>> {
        self.stop_tracking_trigger.as_ref()
    }

    // ---- execution ----------------------------------------------------

    /// Pull stored values into the target, in declaration order.
    ///
    /// Missing values fall back to declared defaults; properties without a
    /// default are left untouched. A failure applying one property is
    /// logged and does not abort the rest.
    pub fn apply(&self, target: &mut T, store: &dyn Store) -> Result<(), Error> {
        let id = (self.id_fn)(target);
        let data = store.get_bundle(&id).map_err(|source| Error::Store {
            id: id.clone(),
            source,
        })?;

        for (name, property) in &self.properties {
            match data.as_ref().and_then(|bundle| bundle.get(name)) {
                Some(stored) => {
                    let mut op = PropertyOperation::new(name, stored.clone());
                    if let Some(hook) = &self.applying_property {
                        hook(target, &mut op);
                    }
                    if op.cancel {
                        debug!(id = %id, property = %name, "apply canceled by hook, property skipped");
                        continue;
                    }
                    if let Err(err) = property.set(target, &op.value) {
                        warn!(id = %id, property = %name, error = %err, "applying stored value failed, property skipped");
                    }
                }
                None => {
                    if let Some(default) = property.default() {
                        if let Err(err) = property.set(target, default) {
                            warn!(id = %id, property = %name, error = %err, "applying default value failed, property skipped");
                        }
                    }
                }
            }
        }

        if let Some(hook) = &self.applied {
            hook(target);
        }
        debug!(id = %id, "state applied");
        Ok(())
    }

    /// Read current values from the target and write them to the store as
    /// one bundle, in declaration order.
    ///
    /// When the before-persist hook cancels a property, the previously
    /// stored value is kept instead. The prior bundle is fetched lazily,
    /// once per persist call, the first time any property is canceled.
    pub fn persist(&self, target: &T, store: &dyn Store) -> Result<(), Error> {
        let id = (self.id_fn)(target);
        let mut previous: Option<Bundle> = None;
        let mut bundle = Bundle::new();

        for (name, property) in &self.properties {
            let value = match property.get(target) {
                Ok(value) => value,
                Err(err) => {
                    warn!(id = %id, property = %name, error = %err, "reading property failed, property skipped");
                    continue;
                }
            };

            let mut op = PropertyOperation::new(name, value);
            if let Some(hook) = &self.persisting_property {
                hook(target, &mut op);
            }

            if op.cancel {
                if previous.is_none() {
                    let fetched = store.get_bundle(&id).map_err(|source| Error::Store {
                        id: id.clone(),
                        source,
                    })?;
                    previous = Some(fetched.unwrap_or_default());
                }
                match previous.as_ref().and_then(|prior| prior.get(name)) {
                    Some(old) => {
                        debug!(id = %id, property = %name, "persist canceled, keeping previously stored value");
                        bundle.insert(name.clone(), old.clone());
                    }
                    None => {
                        debug!(id = %id, property = %name, "persist canceled with no previously stored value, property omitted");
                    }
                }
            } else {
                bundle.insert(name.clone(), op.value);
            }
        }

        store.set_bundle(&id, bundle).map_err(|source| Error::Store {
            id: id.clone(),
            source,
        })?;

        if let Some(hook) = &self.persisted {
            hook(target);
        }
        debug!(id = %id, "state persisted");
        Ok(())
    }

    /// Copy this configuration for a type that can be viewed as `T`,
    /// lifting every accessor, trigger, and hook through `AsRef`/`AsMut`.
    pub(crate) fn lift<U>(&self) -> TrackingConfiguration<U>
    where
        U: AsRef<T> + AsMut<T> + 'static,
    {
        let project: Rc<dyn Fn(&U) -> &T> = Rc::new(|u: &U| u.as_ref());
        let project_mut: Rc<dyn Fn(&mut U) -> &mut T> = Rc::new(|u: &mut U| u.as_mut());

        let id_fn = {
            let id_fn = self.id_fn.clone();
            let project = project.clone();
            Rc::new(move |u: &U| id_fn(project(u)))
        };

        let properties = self
            .properties
            .iter()
            .map(|(name, property)| {
                (
                    name.clone(),
                    property.lift(project.clone(), project_mut.clone()),
                )
            })
            .collect();

        let persist_triggers = self
            .persist_triggers
            .iter()
            .map(|trigger| trigger.lift(project.clone()))
            .collect();
        let stop_tracking_trigger = self
            .stop_tracking_trigger
            .as_ref()
            .map(|trigger| trigger.lift(project.clone()));

        let applying_property = self.applying_property.clone().map(|hook| {
            let project = project.clone();
            let lifted: BeforeHook<U> =
                Rc::new(move |u: &U, op: &mut PropertyOperation| hook(project(u), op));
            lifted
        });
        let applied = self.applied.clone().map(|hook| {
            let project_mut = project_mut.clone();
            let lifted: AppliedHook<U> = Rc::new(move |u: &mut U| hook(project_mut(u)));
            lifted
        });
        let persisting_property = self.persisting_property.clone().map(|hook| {
            let project = project.clone();
            let lifted: BeforeHook<U> =
                Rc::new(move |u: &U, op: &mut PropertyOperation| hook(project(u), op));
            lifted
        });
        let persisted = self.persisted.clone().map(|hook| {
            let project = project.clone();
            let lifted: PersistedHook<U> = Rc::new(move |u: &U| hook(project(u)));
            lifted
        });

        TrackingConfiguration {
            id_fn,
            properties,
            persist_triggers,
            stop_tracking_trigger,
            applying_property,
            applied,
            persisting_property,
            persisted,
            auto_persist: self.auto_persist,
        }
    }
}

/// Last segment of the type's path, without generic arguments.
fn simple_type_name<T>() -> &'static str {
    let full = std::any::type_name::<T>();
    let base = full.split('<').next().unwrap_or(full);
    base.rsplit("::").next().unwrap_or(base)
}
