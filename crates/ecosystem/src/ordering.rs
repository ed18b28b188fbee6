//! Load ordering over a resolved module set.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use modgate_core::{Error, ModuleMetadata, Name, Result};

use crate::resolver::ResolvedSet;

/// Order `set` so every module comes after the modules it depends on.
///
/// Kahn's algorithm; among modules that are ready at the same time the
/// lexicographically smallest name goes first. Only edges between members of
/// the set count. Fails with [`Error::CircularDependency`] naming the modules
/// that could not be ordered.
pub fn topological_order(set: &ResolvedSet) -> Result<Vec<Arc<ModuleMetadata>>> {
    // dependency -> dependents
    let mut dependents: BTreeMap<&Name, Vec<&Name>> = BTreeMap::new();
    let mut in_degree: BTreeMap<&Name, usize> = BTreeMap::new();

    for module in set.iter() {
        in_degree.entry(&module.name).or_insert(0);
        let targets: BTreeSet<&Name> = module
            .dependencies
            .iter()
            .map(|edge| &edge.target)
            .filter(|target| set.contains(target) && **target != module.name)
            .collect();
        for target in targets {
            dependents.entry(target).or_default().push(&module.name);
            *in_degree.entry(&module.name).or_insert(0) += 1;
        }
    }

    let mut ready: BTreeSet<&Name> = in_degree
        .iter()
        .filter(|(_, &degree)| degree == 0)
        .map(|(name, _)| *name)
        .collect();
    let mut ordered = Vec::with_capacity(set.len());

    while let Some(name) = ready.pop_first() {
        in_degree.remove(name);
        if let Some(module) = set.get(name) {
            ordered.push(module.clone());
        }
        for dependent in dependents.get(name).into_iter().flatten() {
            if let Some(degree) = in_degree.get_mut(dependent) {
                *degree -= 1;
                if *degree == 0 {
                    ready.insert(*dependent);
                }
            }
        }
    }

    if !in_degree.is_empty() {
        tracing::warn!(remaining = in_degree.len(), "Circular dependency prevents load ordering");
        return Err(Error::circular_dependency(in_degree.keys()));
    }

    Ok(ordered)
}

/// Names of every module `name` transitively depends on within `set`,
/// excluding `name` itself.
pub fn dependency_closure(set: &ResolvedSet, name: &Name) -> BTreeSet<Name> {
    let mut closure = BTreeSet::new();
    let mut stack = vec![name.clone()];

    while let Some(current) = stack.pop() {
        let Some(module) = set.get(&current) else {
            continue;
        };
        for edge in &module.dependencies {
            if set.contains(&edge.target) && edge.target != *name && closure.insert(edge.target.clone()) {
                stack.push(edge.target.clone());
            }
        }
    }

    closure
}
