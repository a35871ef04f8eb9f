//! Name keyed factory tables.
//!
//! Checkers, exporters and alerters are looked up by name. Instead of
//! package-level tables filled as a side effect of linking, a [`Registry`]
//! is an ordinary value built by the entry point and handed to whoever needs
//! it, which also lets tests register fakes in isolation.

use std::{collections::HashMap, fmt};

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("{kind} with same name already registered: {name}")]
    Duplicate { kind: &'static str, name: String },
}

/// A table of named entries
#[derive(Clone)]
pub struct Registry<T> {
    kind: &'static str,
    entries: HashMap<String, T>,
}

impl<T> Registry<T> {
    /// Create an empty registry, `kind` is only used in error messages
    pub fn new(kind: &'static str) -> Self {
        Self { kind, entries: HashMap::new() }
    }

    /// Add an entry under `name`, refusing to shadow an existing one
    pub fn register(&mut self, name: impl Into<String>, entry: T) -> Result<(), RegistryError> {
        let name = name.into();
        if self.entries.contains_key(&name) {
            return Err(RegistryError::Duplicate { kind: self.kind, name });
        }

        self.entries.insert(name, entry);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&T> {
        self.entries.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    /// Registered names in sorted order
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.entries.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn kind(&self) -> &'static str {
        self.kind
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<T> fmt::Debug for Registry<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry").field("kind", &self.kind).field("names", &self.names()).finish()
    }
}
