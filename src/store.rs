//! Persistent key/value storage contract and bundled backends.
//!
//! The engine only depends on the [`Store`] trait: a named-bundle backend
//! that maps an identity string to the full set of property values for one
//! tracked object. Two implementations ship with the crate: a JSON file
//! store ([`JsonFileStore`], one file per identity) and an in-memory store
//! ([`MemoryStore`]) for tests and session-scoped state.

mod json_file;
mod memory;

pub use json_file::JsonFileStore;
pub use memory::MemoryStore;

use std::collections::BTreeMap;
use std::rc::Rc;

use crate::error::StoreError;

/// The full map of property-name → value for one identity.
///
/// A bundle is always written in one call so a reader never observes a
/// partially updated set of values.
pub type Bundle = BTreeMap<String, serde_json::Value>;

/// Named-bundle key/value backend consumed by the tracking engine.
pub trait Store {
    /// Read the bundle stored under `id`, or `None` if nothing was stored.
    ///
    /// A bundle that exists but cannot be decoded is reported as `None`
    /// ("corrupt data is no data"); only genuine I/O failures are errors.
    fn get_bundle(&self, id: &str) -> Result<Option<Bundle>, StoreError>;

    /// Replace the bundle stored under `id` with `values`, atomically.
    fn set_bundle(&self, id: &str, values: Bundle) -> Result<(), StoreError>;

    /// Remove the bundle stored under `id`. Removing a missing bundle is
    /// not an error.
    fn clear_bundle(&self, id: &str) -> Result<(), StoreError>;

    /// Remove every stored bundle.
    fn clear_all(&self) -> Result<(), StoreError>;

    /// List the identities with stored bundles. Used for administrative
    /// sweeps, not by the core tracking path.
    fn list_ids(&self) -> Result<Vec<String>, StoreError>;
}

/// Several trackers may share one store.
impl<S: Store + ?Sized> Store for Rc<S> {
    fn get_bundle(&self, id: &str) -> Result<Option<Bundle>, StoreError> {
        (**self).get_bundle(id)
    }

    fn set_bundle(&self, id: &str, values: Bundle) -> Result<(), StoreError> {
        (**self).set_bundle(id, values)
    }

    fn clear_bundle(&self, id: &str) -> Result<(), StoreError> {
        (**self).clear_bundle(id)
    }

    fn clear_all(&self) -> Result<(), StoreError> {
        (**self).clear_all()
    }

    fn list_ids(&self) -> Result<Vec<String>, StoreError> {
        (**self).list_ids()
    }
}
