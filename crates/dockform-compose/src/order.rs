//! Service creation order.

use crate::error::{ComposeError, Result};
use std::collections::{BTreeMap, BTreeSet};

/// Orders services so every service comes after the ones it depends on.
///
/// Among services whose dependencies are all placed, the one with the
/// smallest name goes first, so the order is stable for a given document.
///
/// # Errors
///
/// Returns [`ComposeError::Validation`] for a dependency on an unknown
/// service, and [`ComposeError::DependencyCycle`] naming every service that
/// sits on or behind a cycle.
pub fn creation_order(dependencies: &BTreeMap<String, Vec<String>>) -> Result<Vec<String>> {
    let mut pending: BTreeMap<&str, BTreeSet<&str>> = BTreeMap::new();
    for (service, deps) in dependencies {
        let mut wanted = BTreeSet::new();
        for dep in deps {
            if !dependencies.contains_key(dep) {
                return Err(ComposeError::validation(format!(
                    "service {service} depends on undefined service {dep}"
                )));
            }
            wanted.insert(dep.as_str());
        }
        pending.insert(service, wanted);
    }

    let mut order = Vec::with_capacity(pending.len());
    while let Some(next) = pending
        .iter()
        .find(|(_, deps)| deps.is_empty())
        .map(|(name, _)| *name)
    {
        pending.remove(next);
        for deps in pending.values_mut() {
            deps.remove(next);
        }
        order.push(next.to_string());
    }

    if !pending.is_empty() {
        return Err(ComposeError::DependencyCycle(
            pending.keys().map(ToString::to_string).collect(),
        ));
    }
    Ok(order)
}
