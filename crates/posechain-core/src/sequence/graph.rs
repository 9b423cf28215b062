//! Transition graph for sequencing clips.
//!
//! Design:
//! - Nodes are pose names, edges are clips keyed `"start2end"`.
//! - Adjacency: start -> outgoing edges. Each list is kept in reverse order
//!   (largest end name first) so `pop()` hands out the smallest edge next.
//! - Invariant: `out_degree[n] == adjacency[n].len()` until a walk starts
//!   consuming edges; walks work on a copy.

use std::collections::BTreeMap;

/// Split `"start2end"` at the first `'2'`. Both sides must be non-empty.
pub fn split_transition_key(key: &str) -> Option<(&str, &str)> {
    let (start, end) = key.split_once('2')?;
    if start.is_empty() || end.is_empty() {
        return None;
    }
    Some((start, end))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub(crate) struct Edge<'a> {
    pub end: &'a str,
    pub key: &'a str,
}

#[derive(Debug, Default)]
pub(crate) struct TransitionGraph<'a> {
    adjacency: BTreeMap<&'a str, Vec<Edge<'a>>>,
    edge_count: usize,
}

impl<'a> TransitionGraph<'a> {
    /// Build from clip keys. Keys that do not parse are returned separately.
    pub fn from_keys(keys: impl IntoIterator<Item = &'a str>) -> (Self, Vec<&'a str>) {
        let mut graph = Self::default();
        let mut unparsed = Vec::new();
        for key in keys {
            match split_transition_key(key) {
                Some((start, end)) => graph.add_edge(start, end, key),
                None => unparsed.push(key),
            }
        }
        for edges in graph.adjacency.values_mut() {
            edges.sort_by(|a, b| b.cmp(a));
        }
        (graph, unparsed)
    }

    fn add_edge(&mut self, start: &'a str, end: &'a str, key: &'a str) {
        self.adjacency
            .entry(start)
            .or_default()
            .push(Edge { end, key });
        self.edge_count += 1;
    }

    pub fn edge_count(&self) -> usize {
        self.edge_count
    }

    pub fn out_degree(&self, node: &str) -> usize {
        self.adjacency.get(node).map(Vec::len).unwrap_or(0)
    }

    /// `preferred` if it has outgoing edges, otherwise the node with the
    /// highest out-degree (smallest name on ties).
    pub fn start_node(&self, preferred: &str) -> Option<&'a str> {
        if let Some((node, _)) = self.adjacency.get_key_value(preferred)
            && self.out_degree(preferred) > 0
        {
            return Some(*node);
        }
        // BTreeMap iterates names ascending; only a strictly larger degree
        // replaces the current pick.
        let mut best: Option<(&'a str, usize)> = None;
        for (node, edges) in &self.adjacency {
            if best.is_none_or(|(_, degree)| edges.len() > degree) {
                best = Some((*node, edges.len()));
            }
        }
        best.map(|(node, _)| node)
    }

    /// Hierholzer's algorithm with an explicit stack, starting at `start`.
    ///
    /// Returns edge keys in walk order. On an Eulerian graph this is an
    /// Eulerian trail; otherwise consecutive edges may not connect, and edges
    /// unreachable from `start` are missing.
    pub fn walk_from(&self, start: &'a str) -> Vec<&'a str> {
        let mut remaining = self.adjacency.clone();
        let mut stack: Vec<(&'a str, Option<&'a str>)> = vec![(start, None)];
        let mut circuit = Vec::with_capacity(self.edge_count);

        while let Some(&(node, _)) = stack.last() {
            match remaining.get_mut(node).and_then(Vec::pop) {
                Some(edge) => stack.push((edge.end, Some(edge.key))),
                None => {
                    if let Some((_, Some(key))) = stack.pop() {
                        circuit.push(key);
                    }
                }
            }
        }

        circuit.reverse();
        circuit
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_requires_both_sides() {
        assert_eq!(split_transition_key("sit2walk"), Some(("sit", "walk")));
        assert_eq!(split_transition_key("2walk"), None);
        assert_eq!(split_transition_key("sit2"), None);
        assert_eq!(split_transition_key("intro"), None);
        // first '2' wins
        assert_eq!(split_transition_key("a2b2c"), Some(("a", "b2c")));
    }

    #[test]
    fn unparsed_keys_are_reported() {
        let (graph, unparsed) = TransitionGraph::from_keys(["sit2walk", "intro", "walk2sit"]);
        assert_eq!(graph.edge_count(), 2);
        assert_eq!(unparsed, vec!["intro"]);
    }

    #[test]
    fn start_prefers_given_node() {
        let (graph, _) = TransitionGraph::from_keys(["walk2sit", "walk2rest", "sit2walk"]);
        assert_eq!(graph.start_node("sit"), Some("sit"));
    }

    #[test]
    fn start_falls_back_to_highest_out_degree_then_name() {
        let (graph, _) =
            TransitionGraph::from_keys(["walk2rest", "walk2sleep", "rest2walk", "rest2sleep"]);
        assert_eq!(graph.start_node("sit"), Some("rest"));

        let (graph, _) = TransitionGraph::from_keys(["walk2rest", "walk2sleep", "rest2walk"]);
        assert_eq!(graph.start_node("sit"), Some("walk"));
    }

    #[test]
    fn walk_visits_smallest_end_first() {
        let (graph, _) = TransitionGraph::from_keys(["a2c", "a2b", "b2a", "c2a"]);
        assert_eq!(graph.walk_from("a"), vec!["a2b", "b2a", "a2c", "c2a"]);
    }
}
