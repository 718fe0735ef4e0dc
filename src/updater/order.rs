//! Dependency ordering of derivations

use super::{Registry, UpdateError, UpdateResult};
use std::collections::{HashMap, VecDeque};

/// Produces an order in which every dependency precedes its dependents
pub trait DependencyResolver: Send + Sync {
    fn order(&self, registry: &Registry) -> UpdateResult<Vec<String>>;
}

/// Kahn's algorithm; ties keep registration order
#[derive(Debug, Clone, Copy, Default)]
pub struct TopologicalOrder;

impl DependencyResolver for TopologicalOrder {
    fn order(&self, registry: &Registry) -> UpdateResult<Vec<String>> {
        let names: Vec<&str> = registry.iter().map(|d| d.name()).collect();
        let mut pending: HashMap<&str, usize> = HashMap::with_capacity(names.len());
        let mut dependents: HashMap<String, Vec<&str>> = HashMap::new();

        for derivation in registry.iter() {
            let dependencies = derivation.dependencies();
            for dependency in &dependencies {
                if !registry.contains(dependency) {
                    return Err(UpdateError::UnknownDependency {
                        name: derivation.name().to_string(),
                        dependency: dependency.clone(),
                    });
                }
                dependents
                    .entry(dependency.clone())
                    .or_default()
                    .push(derivation.name());
            }
            pending.insert(derivation.name(), dependencies.len());
        }

        let mut ready: VecDeque<&str> = names
            .iter()
            .copied()
            .filter(|name| pending.get(name) == Some(&0))
            .collect();
        let mut order = Vec::with_capacity(names.len());

        while let Some(name) = ready.pop_front() {
            order.push(name.to_string());
            for dependent in dependents.get(name).into_iter().flatten() {
                if let Some(count) = pending.get_mut(dependent) {
                    *count -= 1;
                    if *count == 0 {
                        ready.push_back(dependent);
                    }
                }
            }
        }

        if order.len() < names.len() {
            let stuck = names
                .iter()
                .filter(|name| pending.get(*name).is_some_and(|c| *c > 0))
                .map(|name| name.to_string())
                .collect();
            return Err(UpdateError::DependencyCycle(stuck));
        }
        Ok(order)
    }
}
