//! Round scheduling
//!
//! Partitions transformers into ordered rounds with Kahn's layered
//! topological sort over the round-dependent edges. Anchors are virtual
//! transformer ids pinned in sequence; transformers attached to an
//! anchor are kept between it and its neighboring anchors.

use std::collections::{HashSet, VecDeque};

use indexmap::IndexMap;

use crate::error::{Error, Result};

/// Depth of every id under the given edges.
///
/// All ids of in-degree zero start at depth 0; discharging an edge sets
/// `depth(child) = max(depth(child), depth(parent) + 1)`. Ids mentioned
/// only in `edges` are layered too. Fails when a cycle prevents the
/// queue from draining.
pub(crate) fn layer_depths<'a>(
    ids: impl IntoIterator<Item = &'a String>,
    edges: &IndexMap<String, Vec<String>>,
) -> Result<IndexMap<String, usize>> {
    let mut in_degree: IndexMap<String, usize> = IndexMap::new();
    for (parent, dependents) in edges {
        in_degree.entry(parent.clone()).or_insert(0);
        for dependent in dependents {
            *in_degree.entry(dependent.clone()).or_insert(0) += 1;
        }
    }
    for id in ids {
        in_degree.entry(id.clone()).or_insert(0);
    }

    let mut depths: IndexMap<String, usize> = IndexMap::new();
    let mut queue: VecDeque<String> = VecDeque::new();
    for (id, &degree) in &in_degree {
        if degree == 0 {
            depths.insert(id.clone(), 0);
            queue.push_back(id.clone());
        }
    }

    let mut visited = 0;
    while let Some(id) = queue.pop_front() {
        visited += 1;
        let next_depth = depths.get(&id).copied().unwrap_or(0) + 1;
        let Some(dependents) = edges.get(&id) else {
            continue;
        };
        for dependent in dependents {
            let degree = in_degree
                .get_mut(dependent)
                .expect("dependent missing from in-degree map");
            *degree -= 1;
            depths
                .entry(dependent.clone())
                .and_modify(|depth| *depth = (*depth).max(next_depth))
                .or_insert(next_depth);
            if *degree == 0 {
                queue.push_back(dependent.clone());
            }
        }
    }

    if visited != in_degree.len() {
        let ids = in_degree
            .iter()
            .filter(|&(_, &degree)| degree > 0)
            .map(|(id, _)| id.clone())
            .collect();
        return Err(Error::CyclicDependency { ids });
    }

    Ok(depths)
}

/// Bucket transformers and anchors into rounds by depth.
///
/// Consecutive anchors induce `anchor[i] -> anchor[i+1]` edges, and a
/// transformer directly attached to an anchor stays sandwiched between
/// that anchor and its neighbors. Buckets containing no real transformer
/// are dropped; anchor ids riding in a kept bucket stay.
pub(crate) fn compute_rounds(
    transformer_ids: &[String],
    anchors: &[String],
    round_dependents: &IndexMap<String, Vec<String>>,
) -> Result<Vec<Vec<String>>> {
    if transformer_ids.is_empty() {
        return Ok(Vec::new());
    }

    let anchor_set: HashSet<&String> = anchors.iter().collect();
    let mut edges = round_dependents.clone();
    for pair in anchors.windows(2) {
        edges
            .entry(pair[0].clone())
            .or_default()
            .push(pair[1].clone());
    }
    for (position, anchor) in anchors.iter().enumerate() {
        // direct dependents of an anchor run before the next anchor
        if let Some(next) = anchors.get(position + 1) {
            let attached: Vec<String> = edges
                .get(anchor)
                .map(|dependents| {
                    dependents
                        .iter()
                        .filter(|id| !anchor_set.contains(id))
                        .cloned()
                        .collect()
                })
                .unwrap_or_default();
            for id in attached {
                edges.entry(id).or_default().push(next.clone());
            }
        }
        // direct dependencies of an anchor run after the previous anchor
        if position > 0 {
            let previous = anchors[position - 1].clone();
            let attached: Vec<String> = edges
                .iter()
                .filter(|(parent, dependents)| {
                    !anchor_set.contains(parent) && dependents.contains(anchor)
                })
                .map(|(parent, _)| parent.clone())
                .collect();
            for id in attached {
                edges.entry(previous.clone()).or_default().push(id);
            }
        }
    }

    let depths = layer_depths(anchors.iter().chain(transformer_ids), &edges)?;
    let max_depth = depths.values().copied().max().unwrap_or(0);

    let mut buckets: Vec<Vec<String>> = vec![Vec::new(); max_depth + 1];
    for id in anchors.iter().chain(transformer_ids) {
        let depth = depths.get(id).copied().unwrap_or(0);
        if !buckets[depth].contains(id) {
            buckets[depth].push(id.clone());
        }
    }

    let real: HashSet<&String> = transformer_ids.iter().collect();
    buckets.retain(|bucket| bucket.iter().any(|id| real.contains(id)));

    Ok(buckets)
}
