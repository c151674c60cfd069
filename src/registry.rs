//! Identity side table for shared and cyclic values.

use std::collections::BTreeMap;

use crate::error::{Error, Result};

/// Maps the small integer identities used by shared values to the value each one names.
///
/// A value tree keeps at most one of these, created the first time an identity is seen, and
/// binds each identity to the span of bytes it names. Nodes never hold the registry; it is passed
/// into whatever parse or decode step needs it.
#[derive(Clone, Debug)]
pub struct ReferenceRegistry<V> {
    entries: BTreeMap<u32, V>,
}

impl<V> Default for ReferenceRegistry<V> {
    fn default() -> Self {
        Self {
            entries: BTreeMap::new(),
        }
    }
}

impl<V: PartialEq> ReferenceRegistry<V> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `id` to `value`. Registering the same value again is allowed; binding an identity
    /// that already names a different value fails with [`Error::DuplicateIdentity`].
    pub fn register(&mut self, id: u32, value: V) -> Result<()> {
        match self.entries.get(&id) {
            Some(existing) if *existing == value => Ok(()),
            Some(_) => Err(Error::DuplicateIdentity(id)),
            None => {
                self.entries.insert(id, value);
                Ok(())
            }
        }
    }

    /// Look up the value bound to `id`, failing with [`Error::UnknownIdentity`] if there is none.
    pub fn lookup(&self, id: u32) -> Result<&V> {
        self.entries.get(&id).ok_or(Error::UnknownIdentity(id))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (u32, &V)> {
        self.entries.iter().map(|(id, v)| (*id, v))
    }
}
