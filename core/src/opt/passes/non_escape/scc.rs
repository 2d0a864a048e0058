//! Deterministic Tarjan SCC decomposition.

use std::collections::{BTreeMap, BTreeSet};

struct Tarjan<'g, N: Ord + Clone> {
    graph: &'g BTreeMap<N, BTreeSet<N>>,
    next_index: usize,
    index: BTreeMap<N, usize>,
    lowlink: BTreeMap<N, usize>,
    stack: Vec<N>,
    on_stack: BTreeSet<N>,
    components: Vec<Vec<N>>,
}

impl<N: Ord + Clone> Tarjan<'_, N> {
    fn strong_connect(&mut self, v: &N) {
        self.index.insert(v.clone(), self.next_index);
        self.lowlink.insert(v.clone(), self.next_index);
        self.next_index += 1;
        self.stack.push(v.clone());
        self.on_stack.insert(v.clone());

        let graph = self.graph;
        // BTreeSet iteration is already sorted
        if let Some(neighbours) = graph.get(v) {
            for w in neighbours {
                if !self.index.contains_key(w) {
                    self.strong_connect(w);
                    let low = self.lowlink[v].min(self.lowlink[w]);
                    self.lowlink.insert(v.clone(), low);
                } else if self.on_stack.contains(w) {
                    let low = self.lowlink[v].min(self.index[w]);
                    self.lowlink.insert(v.clone(), low);
                }
            }
        }

        if self.lowlink[v] == self.index[v] {
            let mut component = Vec::new();
            while let Some(w) = self.stack.pop() {
                self.on_stack.remove(&w);
                let done = &w == v;
                component.push(w);
                if done {
                    break;
                }
            }
            component.sort();
            self.components.push(component);
        }
    }
}

/// Strongly connected components of `graph`, each sorted, emitted in
/// Tarjan completion order with roots visited in sorted order. Nodes that
/// only appear as edge targets are included.
pub fn strongly_connected_components<N: Ord + Clone>(graph: &BTreeMap<N, BTreeSet<N>>) -> Vec<Vec<N>> {
    let mut tarjan = Tarjan {
        graph,
        next_index: 0,
        index: BTreeMap::new(),
        lowlink: BTreeMap::new(),
        stack: Vec::new(),
        on_stack: BTreeSet::new(),
        components: Vec::new(),
    };
    for node in graph.keys() {
        if !tarjan.index.contains_key(node) {
            tarjan.strong_connect(node);
        }
    }
    tarjan.components
}

/// Components that form an actual recursion: more than one member, or a
/// single member calling itself.
pub fn recursive_components<N: Ord + Clone>(graph: &BTreeMap<N, BTreeSet<N>>) -> Vec<Vec<N>> {
    strongly_connected_components(graph)
        .into_iter()
        .filter(|component| match component.as_slice() {
            [single] => graph.get(single).is_some_and(|targets| targets.contains(single)),
            _ => true,
        })
        .collect()
}
