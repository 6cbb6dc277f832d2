use std::collections::HashSet;

use crate::{BlocklistError, NameSet, name::canonical_name};

/// Set of fully-qualified names blocked verbatim.
#[derive(Debug, Clone, Default)]
pub struct ExactSet {
    names: HashSet<Box<str>>,
}

impl ExactSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: &str) -> Result<(), BlocklistError> {
        self.names.insert(canonical_name(name).into());
        Ok(())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.names.contains(canonical_name(name).as_ref())
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

impl NameSet for ExactSet {
    fn insert(&mut self, name: &str) -> Result<(), BlocklistError> {
        ExactSet::insert(self, name)
    }

    fn contains(&self, name: &str) -> bool {
        ExactSet::contains(self, name)
    }
}
