use std::collections::{BTreeSet, HashSet};

/// Ordering graph between named nodes
///
/// An edge `from -> to` means `from` runs before `to`. Used to order configurers
/// and destroyers.
#[derive(Debug, Default)]
pub(crate) struct DependencyGraph {
    names: Vec<String>,
    edges: Vec<BTreeSet<usize>>,
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, name: impl Into<String>) -> usize {
        self.names.push(name.into());
        self.edges.push(BTreeSet::new());
        self.names.len() - 1
    }

    pub fn add_edge(&mut self, from: usize, to: usize) {
        self.edges[from].insert(to);
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    /// Sorts the nodes so every edge points forward
    ///
    /// Nodes without an ordering between them keep the order they were added in.
    /// Returns the chain of a cycle if one exists.
    pub fn sort(&self) -> Result<Vec<usize>, Vec<String>> {
        let mut incoming = vec![0usize; self.len()];
        for targets in &self.edges {
            for &to in targets {
                incoming[to] += 1;
            }
        }

        let mut ready: BTreeSet<usize> = (0..self.len()).filter(|&i| incoming[i] == 0).collect();
        let mut sorted = Vec::with_capacity(self.len());
        while let Some(next) = ready.pop_first() {
            sorted.push(next);
            for &to in &self.edges[next] {
                incoming[to] -= 1;
                if incoming[to] == 0 {
                    ready.insert(to);
                }
            }
        }

        if sorted.len() == self.len() {
            return Ok(sorted);
        }
        Err(self.find_cycle().unwrap_or_default())
    }

    /// The first cycle found by a depth first walk, closed with its first node
    fn find_cycle(&self) -> Option<Vec<String>> {
        let mut checked = HashSet::new();
        for start in 0..self.len() {
            let mut chain = Vec::new();
            if let Some(cycle) = check_recurse(self, &mut checked, &mut chain, start) {
                return Some(cycle.into_iter().map(|i| self.names[i].clone()).collect());
            }
        }
        return None;

        fn check_recurse(
            graph: &DependencyGraph,
            checked: &mut HashSet<usize>,
            chain: &mut Vec<usize>,
            node: usize,
        ) -> Option<Vec<usize>> {
            if let Some(position) = chain.iter().position(|&i| i == node) {
                let mut cycle = chain[position..].to_vec();
                cycle.push(node); // Close the chain
                return Some(cycle);
            }

            // Nodes are only walked once
            if !checked.insert(node) {
                return None;
            }

            chain.push(node);
            for &next in &graph.edges[node] {
                if let Some(cycle) = check_recurse(graph, checked, chain, next) {
                    return Some(cycle);
                }
            }
            chain.pop();
            None
        }
    }
}
