//! Derivation registry

use super::{Derivation, UpdateError, UpdateResult};
use std::collections::HashMap;

/// Named collection of derivations, in registration order
#[derive(Default)]
pub struct Registry {
    derivations: Vec<Box<dyn Derivation>>,
    by_name: HashMap<String, usize>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a derivation; names must be unique
    pub fn register<D: Derivation + 'static>(&mut self, derivation: D) -> UpdateResult<()> {
        let name = derivation.name().to_string();
        if self.by_name.contains_key(&name) {
            return Err(UpdateError::DuplicateDerivation(name));
        }

        tracing::debug!("Registered derivation {}", name);
        self.by_name.insert(name, self.derivations.len());
        self.derivations.push(Box::new(derivation));
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&dyn Derivation> {
        self.by_name
            .get(name)
            .map(|&i| self.derivations[i].as_ref())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.by_name.contains_key(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &dyn Derivation> {
        self.derivations.iter().map(|d| d.as_ref())
    }

    pub fn len(&self) -> usize {
        self.derivations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.derivations.is_empty()
    }
}
