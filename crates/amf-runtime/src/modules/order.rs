//! Dependency tiers.
//!
//! `priority(m) = 1 + max(priority(d) for d in deps(m))`, with `1` for a
//! module without dependencies and `0` for a dependency name that is not in
//! the graph. Modules of equal priority form a tier; tiers initialize in
//! ascending order and tear down in descending order.

use std::collections::{BTreeMap, HashMap};

use crate::errors::RegistryError;

/// Compute every module's priority.
///
/// Fails with [`RegistryError::Cycle`] naming the first cycle found.
pub fn priorities(graph: &BTreeMap<String, Vec<String>>) -> Result<HashMap<String, u32>, RegistryError> {
    let mut memo = HashMap::with_capacity(graph.len());
    let mut stack = Vec::new();
    for name in graph.keys() {
        let _ = priority(name, graph, &mut memo, &mut stack)?;
    }
    Ok(memo)
}

/// Group modules into tiers, lowest priority first, names sorted within a tier.
pub fn tiers(graph: &BTreeMap<String, Vec<String>>) -> Result<Vec<Vec<String>>, RegistryError> {
    let priorities = priorities(graph)?;
    let mut grouped: BTreeMap<u32, Vec<String>> = BTreeMap::new();
    // graph iterates in name order, so each tier comes out sorted
    for name in graph.keys() {
        grouped
            .entry(priorities[name])
            .or_default()
            .push(name.clone());
    }
    Ok(grouped.into_values().collect())
}

fn priority(
    name: &str,
    graph: &BTreeMap<String, Vec<String>>,
    memo: &mut HashMap<String, u32>,
    stack: &mut Vec<String>,
) -> Result<u32, RegistryError> {
    if let Some(&p) = memo.get(name) {
        return Ok(p);
    }
    let Some(deps) = graph.get(name) else {
        return Ok(0);
    };
    if let Some(start) = stack.iter().position(|n| n == name) {
        let mut cycle: Vec<&str> = stack[start..].iter().map(String::as_str).collect();
        cycle.push(name);
        return Err(RegistryError::Cycle {
            path: cycle.join(" -> "),
        });
    }

    stack.push(name.to_owned());
    let mut deepest = 0;
    for dep in deps {
        deepest = deepest.max(priority(dep, graph, memo, stack)?);
    }
    let _ = stack.pop();

    let p = deepest + 1;
    let _ = memo.insert(name.to_owned(), p);
    Ok(p)
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
