//! Topological ordering shared by the feature chains and the body graph.

use std::collections::{BTreeSet, HashMap};
use std::hash::Hash;

/// Order `nodes` so that every node comes after its dependencies.
///
/// Kahn's algorithm; among nodes that are ready at the same time the one
/// listed first in `nodes` wins, so the result is deterministic and follows
/// insertion order where the graph allows it. Dependencies outside `nodes`
/// are ignored.
///
/// On failure returns one cycle, as a path whose last element repeats the
/// first.
pub(crate) fn topological_order<T, F>(nodes: &[T], dependencies: F) -> Result<Vec<T>, Vec<T>>
where
    T: Copy + Eq + Hash,
    F: Fn(T) -> Vec<T>,
{
    let position: HashMap<T, usize> = nodes.iter().enumerate().map(|(i, &n)| (n, i)).collect();

    let mut indegree = vec![0usize; nodes.len()];
    let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); nodes.len()];
    let mut deps_of: Vec<Vec<usize>> = vec![Vec::new(); nodes.len()];

    for (i, &node) in nodes.iter().enumerate() {
        let mut seen = BTreeSet::new();
        for dep in dependencies(node) {
            if let Some(&j) = position.get(&dep) {
                if seen.insert(j) {
                    indegree[i] += 1;
                    dependents[j].push(i);
                    deps_of[i].push(j);
                }
            }
        }
    }

    let mut ready: BTreeSet<usize> = (0..nodes.len()).filter(|&i| indegree[i] == 0).collect();
    let mut order = Vec::with_capacity(nodes.len());

    while let Some(i) = ready.pop_first() {
        order.push(nodes[i]);
        for &d in &dependents[i] {
            indegree[d] -= 1;
            if indegree[d] == 0 {
                ready.insert(d);
            }
        }
    }

    if order.len() == nodes.len() {
        return Ok(order);
    }

    let cycle = find_cycle(&deps_of)
        .unwrap_or_default()
        .into_iter()
        .map(|i| nodes[i])
        .collect();
    Err(cycle)
}

fn find_cycle(adjacency: &[Vec<usize>]) -> Option<Vec<usize>> {
    #[derive(Clone, Copy, PartialEq, Eq)]
    enum VisitState {
        Unvisited,
        Visiting,
        Visited,
    }

    fn dfs(
        node: usize,
        adjacency: &[Vec<usize>],
        state: &mut [VisitState],
        stack: &mut Vec<usize>,
    ) -> Option<Vec<usize>> {
        state[node] = VisitState::Visiting;
        stack.push(node);

        for &next in &adjacency[node] {
            match state[next] {
                VisitState::Unvisited => {
                    if let Some(cycle) = dfs(next, adjacency, state, stack) {
                        return Some(cycle);
                    }
                }
                VisitState::Visiting => {
                    if let Some(position) = stack.iter().position(|&n| n == next) {
                        let mut cycle = stack[position..].to_vec();
                        cycle.push(next);
                        return Some(cycle);
                    }
                }
                VisitState::Visited => {}
            }
        }

        stack.pop();
        state[node] = VisitState::Visited;
        None
    }

    let mut state = vec![VisitState::Unvisited; adjacency.len()];
    for node in 0..adjacency.len() {
        if state[node] == VisitState::Unvisited {
            let mut stack = Vec::new();
            if let Some(cycle) = dfs(node, adjacency, &mut state, &mut stack) {
                return Some(cycle);
            }
        }
    }
    None
}
