// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::collections::BTreeSet;

/// Depth-first, first-match search over a graph of inheriting nodes.
///
/// `root` is probed first, then each parent in declaration order, recursively.
/// Types and profiles both resolve inheritance through this search, so a field
/// declared by a type and a value set on a profile follow the same precedence.
/// Nodes are tracked by address; a node reachable twice is probed once and
/// inheritance cycles terminate.
pub(crate) fn find_first<'a, N, R, P, F>(root: &'a N, mut parents: P, mut probe: F) -> Option<R>
where
    P: FnMut(&'a N) -> Vec<&'a N>,
    F: FnMut(&'a N) -> Option<R>,
{
    let mut visited: BTreeSet<*const N> = BTreeSet::new();
    let mut stack = vec![root];
    while let Some(node) = stack.pop() {
        if !visited.insert(node as *const N) {
            continue;
        }
        if let Some(found) = probe(node) {
            return Some(found);
        }
        stack.extend(parents(node).into_iter().rev());
    }
    None
}

/// Every node reachable from `root`, in the order [`find_first`] probes them.
pub(crate) fn linearize<'a, N, P>(root: &'a N, parents: P) -> Vec<&'a N>
where
    P: FnMut(&'a N) -> Vec<&'a N>,
{
    let mut order = vec![];
    find_first(root, parents, |node| {
        order.push(node);
        None::<()>
    });
    order
}
