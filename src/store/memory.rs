//! In-memory storage backend for tests and session-scoped state.

use std::cell::RefCell;
use std::collections::HashMap;

use super::{Bundle, Store};
use crate::error::StoreError;

/// A [`Store`] backed by a plain in-process map. Nothing survives the
/// process; useful for tests and for state that should only live for one
/// session.
#[derive(Default)]
pub struct MemoryStore {
    bundles: RefCell<HashMap<String, Bundle>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored bundles.
    pub fn len(&self) -> usize {
        self.bundles.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.bundles.borrow().is_empty()
    }
}

impl Store for MemoryStore {
    fn get_bundle(&self, id: &str) -> Result<Option<Bundle>, StoreError> {
        Ok(self.bundles.borrow().get(id).cloned())
    }

    fn set_bundle(&self, id: &str, values: Bundle) -> Result<(), StoreError> {
        self.bundles.borrow_mut().insert(id.to_string(), values);
        Ok(())
    }

    fn clear_bundle(&self, id: &str) -> Result<(), StoreError> {
        self.bundles.borrow_mut().remove(id);
        Ok(())
    }

    fn clear_all(&self) -> Result<(), StoreError> {
        self.bundles.borrow_mut().clear();
        Ok(())
    }

    fn list_ids(&self) -> Result<Vec<String>, StoreError> {
        let mut ids: Vec<String> = self.bundles.borrow().keys().cloned().collect();
        ids.sort();
        Ok(ids)
    }
}
