//! Property descriptors - typed getter/setter pairs over a target type.
//!
//! A [`TrackedProperty`] is built once at configuration time from a pair of
//! closures and is never re-resolved on apply/persist. Values cross the
//! storage boundary as `serde_json::Value`; the setter owns the coercion
//! back into the property's declared type (numeric widening, enums from
//! their serialized representation, and so on), so callers never see raw
//! stored values.

use std::rc::Rc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::error::PropertyError;

pub(crate) type Getter<T> = Rc<dyn Fn(&T) -> Result<Value, PropertyError>>;
pub(crate) type Setter<T> = Rc<dyn Fn(&mut T, &Value) -> Result<(), PropertyError>>;

/// Immutable descriptor for one tracked property of `T`.
///
/// Nested paths work out of the box: a getter like `|t| t.child.field` and a
/// setter like `|t, v| t.child.field = v` read and re-assign through the
/// full path. A path that does not exist on the type fails to compile,
/// which is the configuration-time error the engine wants.
pub struct TrackedProperty<T> {
    getter: Getter<T>,
    setter: Setter<T>,
    default: Option<Value>,
}

impl<T> Clone for TrackedProperty<T> {
    fn clone(&self) -> Self {
        Self {
            getter: self.getter.clone(),
            setter: self.setter.clone(),
            default: self.default.clone(),
        }
    }
}

impl<T: 'static> TrackedProperty<T> {
    /// Build a descriptor from typed accessors.
    ///
    /// Panics if `default` cannot be serialized; a default that cannot be
    /// stored is a configuration mistake, surfaced immediately.
    pub fn new<P, G, S>(name: &str, get: G, set: S, default: Option<P>) -> Self
    where
        P: Serialize + DeserializeOwned + 'static,
        G: Fn(&T) -> P + 'static,
        S: Fn(&mut T, P) + 'static,
    {
        let read_name = name.to_string();
        let getter: Getter<T> = Rc::new(move |target| {
            serde_json::to_value(get(target)).map_err(|source| PropertyError::Read {
                name: read_name.clone(),
                source,
            })
        });

        let write_name = name.to_string();
        let setter: Setter<T> = Rc::new(move |target, value| {
            let typed: P =
                serde_json::from_value(value.clone()).map_err(|source| PropertyError::Coerce {
                    name: write_name.clone(),
                    source,
                })?;
            set(target, typed);
            Ok(())
        });

        let default = default.map(|value| {
            serde_json::to_value(value).expect("default value for a tracked property must be serializable")
        });

        Self {
            getter,
            setter,
            default,
        }
    }

    /// Read the current value, serialized for storage.
    pub fn get(&self, target: &T) -> Result<Value, PropertyError> {
        (self.getter)(target)
    }

    /// Coerce `value` into the property's type and write it to the target.
    pub fn set(&self, target: &mut T, value: &Value) -> Result<(), PropertyError> {
        (self.setter)(target, value)
    }

    pub fn default(&self) -> Option<&Value> {
        self.default.as_ref()
    }

    pub fn has_default(&self) -> bool {
        self.default.is_some()
    }

    /// Re-target the descriptor at a type that can be viewed as `T`.
    pub(crate) fn lift<U: 'static>(
        &self,
        project: Rc<dyn Fn(&U) -> &T>,
        project_mut: Rc<dyn Fn(&mut U) -> &mut T>,
    ) -> TrackedProperty<U> {
        let getter = self.getter.clone();
        let setter = self.setter.clone();
        TrackedProperty {
            getter: Rc::new(move |target: &U| getter(project(target))),
            setter: Rc::new(move |target: &mut U, value: &Value| setter(project_mut(target), value)),
            default: self.default.clone(),
        }
    }
}

/// Declare several tracked fields at once on a configuration.
///
/// Each field becomes an independent property keyed by its own name:
///
/// ```
/// # use proptrack::{properties, Tracked, Tracker, MemoryStore};
/// # #[derive(Default)]
/// # struct Window { width: u32, height: u32 }
/// # impl Tracked for Window {}
/// # let tracker = Tracker::new(MemoryStore::new());
/// let cfg = tracker.configure::<Window>();
/// properties!(cfg, width, height);
/// ```
///
/// When two declared properties would otherwise collide (two child objects
/// sharing a field name), use the aliased form, which also supports nested
/// paths:
///
/// ```
/// # use proptrack::{properties, Tracked, Tracker, MemoryStore};
/// # #[derive(Default)]
/// # struct Pane { title: String }
/// # #[derive(Default)]
/// # struct Split { left: Pane, right: Pane }
/// # impl Tracked for Split {}
/// # let tracker = Tracker::new(MemoryStore::new());
/// let cfg = tracker.configure::<Split>();
/// properties!(cfg, left_title: left.title, right_title: right.title);
/// ```
///
/// Fields must be `Clone` (the getter clones the current value out).
#[macro_export]
macro_rules! properties {
    ($cfg:expr, $($name:ident : $($path:ident).+),+ $(,)?) => {
        $(
            $cfg.property(
                stringify!($name),
                |t| t.$($path).+.clone(),
                |t, v| t.$($path).+ = v,
            );
        )+
    };
    ($cfg:expr, $($field:ident),+ $(,)?) => {
        $(
            $cfg.property(
                stringify!($field),
                |t| t.$field.clone(),
                |t, v| t.$field = v,
            );
        )+
    };
}
