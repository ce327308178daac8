//! Ordered client registry.
//!
//! A map keyed by [`ClientId`] that remembers registration order. Removal is
//! by key and tolerates absent ids; the relative order of the remaining
//! entries is preserved.
//!
//! The registry itself is not synchronized. The server keeps exactly one
//! instance inside its coordination loop, which is the only mutator.

use indexmap::IndexMap;

use crate::client_id::ClientId;
use crate::error::RegistryError;

#[derive(Debug)]
pub struct Registry<T> {
    entries: IndexMap<ClientId, T>,
}

impl<T> Registry<T> {
    pub fn new() -> Self {
        Self {
            entries: IndexMap::new(),
        }
    }

    /// Insert a new entry.
    ///
    /// Duplicate ids are rejected and the existing entry is left in place.
    pub fn insert(&mut self, id: ClientId, entry: T) -> Result<(), RegistryError> {
        if self.entries.contains_key(&id) {
            return Err(RegistryError::Duplicate(id));
        }
        self.entries.insert(id, entry);
        Ok(())
    }

    /// Remove by id. `None` if the id is not registered.
    pub fn remove(&mut self, id: &ClientId) -> Option<T> {
        self.entries.shift_remove(id)
    }

    pub fn get(&self, id: &ClientId) -> Option<&T> {
        self.entries.get(id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries in registration order.
    pub fn iter(&self) -> impl Iterator<Item = (&ClientId, &T)> {
        self.entries.iter()
    }

    /// Ids in registration order.
    pub fn ids(&self) -> impl Iterator<Item = &ClientId> {
        self.entries.keys()
    }

    /// Remove every entry, in registration order.
    pub fn drain(&mut self) -> Vec<(ClientId, T)> {
        self.entries.drain(..).collect()
    }
}

impl<T> Default for Registry<T> {
    fn default() -> Self {
        Self::new()
    }
}
