//! Video sequencer: order transition clips into one continuous pose chain.
//!
//! Clips are edges of a directed graph over poses. An Eulerian trail through
//! that graph plays every clip exactly once with no visual jump. When the
//! clip set has no such trail (a batch left gaps, for example), the longest
//! chain the walk finds comes first and the rest follow as leftovers.

mod graph;

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;

use crate::domain::Pose;

pub use self::graph::split_transition_key;
use self::graph::TransitionGraph;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Entry<A> {
    pub key: String,
    pub artifact: A,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Playlist<A> {
    /// end pose of entry `i` == start pose of entry `i + 1`.
    pub chained: Vec<Entry<A>>,
    /// Everything else, sorted by key.
    pub leftovers: Vec<Entry<A>>,
}

impl<A> Playlist<A> {
    pub fn len(&self) -> usize {
        self.chained.len() + self.leftovers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Chain covers every clip and ends where it started.
    pub fn is_closed_loop(&self) -> bool {
        if !self.leftovers.is_empty() {
            return false;
        }
        let (Some(first), Some(last)) = (self.chained.first(), self.chained.last()) else {
            return false;
        };
        match (
            split_transition_key(&first.key),
            split_transition_key(&last.key),
        ) {
            (Some((start, _)), Some((_, end))) => start == end,
            _ => false,
        }
    }

    pub fn keys(&self) -> Vec<&str> {
        self.chained
            .iter()
            .chain(&self.leftovers)
            .map(|e| e.key.as_str())
            .collect()
    }

    /// All artifacts, chained first.
    pub fn into_ordered(self) -> Vec<A> {
        self.chained
            .into_iter()
            .chain(self.leftovers)
            .map(|e| e.artifact)
            .collect()
    }
}

/// Sequence clips starting from [`Pose::REST_POSE`] when possible.
pub fn sequence<A: Clone>(artifacts: &BTreeMap<String, A>) -> Playlist<A> {
    sequence_from(artifacts, Pose::REST_POSE.as_str())
}

pub fn sequence_from<A: Clone>(
    artifacts: &BTreeMap<String, A>,
    preferred_start: &str,
) -> Playlist<A> {
    let entry = |key: &str| Entry {
        key: key.to_string(),
        artifact: artifacts[key].clone(),
    };

    let (graph, unparsed) = TransitionGraph::from_keys(artifacts.keys().map(String::as_str));
    let Some(start) = graph.start_node(preferred_start) else {
        tracing::debug!(clips = artifacts.len(), "no transition keys, ordering by key");
        return Playlist {
            chained: Vec::new(),
            leftovers: artifacts.keys().map(|k| entry(k)).collect(),
        };
    };

    let walk = graph.walk_from(start);
    let mut chained_keys: Vec<&str> = Vec::with_capacity(walk.len());
    let mut previous_end: Option<&str> = None;
    for key in walk {
        let Some((from, to)) = split_transition_key(key) else {
            break;
        };
        if previous_end.is_some_and(|end| end != from) {
            break;
        }
        chained_keys.push(key);
        previous_end = Some(to);
    }

    let in_chain: BTreeSet<&str> = chained_keys.iter().copied().collect();
    let leftovers: Vec<Entry<A>> = artifacts
        .keys()
        .map(String::as_str)
        .filter(|k| !in_chain.contains(k))
        .map(entry)
        .collect();

    if !leftovers.is_empty() {
        tracing::info!(
            start,
            chained = chained_keys.len(),
            leftovers = leftovers.len(),
            unparsed = unparsed.len(),
            "clips do not form a single chain"
        );
    }

    Playlist {
        chained: chained_keys.into_iter().map(entry).collect(),
        leftovers,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Transition;

    fn clips(keys: &[&str]) -> BTreeMap<String, String> {
        keys.iter()
            .map(|k| (k.to_string(), format!("{k}.mp4")))
            .collect()
    }

    fn assert_chained(playlist: &Playlist<String>) {
        for pair in playlist.chained.windows(2) {
            let (_, end) = split_transition_key(&pair[0].key).unwrap();
            let (start, _) = split_transition_key(&pair[1].key).unwrap();
            assert_eq!(end, start, "{:?}", playlist.keys());
        }
    }

    #[test]
    fn four_clip_cycle_is_closed() {
        let playlist = sequence(&clips(&["sit2walk", "walk2rest", "rest2sleep", "sleep2sit"]));

        assert_eq!(
            playlist.keys(),
            vec!["sit2walk", "walk2rest", "rest2sleep", "sleep2sit"]
        );
        assert!(playlist.leftovers.is_empty());
        assert!(playlist.is_closed_loop());
        assert_chained(&playlist);
    }

    #[test]
    fn unchainable_clip_becomes_leftover() {
        let playlist = sequence(&clips(&["sit2walk", "walk2rest", "sit2sleep"]));

        assert_eq!(playlist.len(), 3);
        let mut keys = playlist.keys();
        keys.sort();
        assert_eq!(keys, vec!["sit2sleep", "sit2walk", "walk2rest"]);
        assert_chained(&playlist);
        assert_eq!(playlist.chained[0].key, "sit2walk");
        assert_eq!(playlist.leftovers.len(), 1);
        assert!(!playlist.is_closed_loop());
    }

    #[test]
    fn complete_pose_graph_forms_an_eulerian_circuit() {
        let names: Vec<String> = Transition::all().iter().map(Transition::name).collect();
        let refs: Vec<&str> = names.iter().map(String::as_str).collect();
        let playlist = sequence(&clips(&refs));

        assert_eq!(playlist.chained.len(), 12);
        assert!(playlist.leftovers.is_empty());
        assert!(playlist.is_closed_loop());
        assert!(playlist.chained[0].key.starts_with("sit2"));
        assert_chained(&playlist);
    }

    #[test]
    fn unparseable_keys_are_kept_sorted() {
        let playlist = sequence(&clips(&["sit2walk", "walk2sit", "outro", "intro"]));
        assert_eq!(playlist.keys(), vec!["sit2walk", "walk2sit", "intro", "outro"]);
    }

    #[test]
    fn no_transition_keys_falls_back_to_key_order() {
        let playlist = sequence(&clips(&["zeta", "alpha", "mid"]));
        assert!(playlist.chained.is_empty());
        assert_eq!(playlist.keys(), vec!["alpha", "mid", "zeta"]);
        assert_eq!(
            playlist.into_ordered(),
            vec!["alpha.mp4", "mid.mp4", "zeta.mp4"]
        );
    }

    #[test]
    fn starts_elsewhere_when_rest_pose_has_no_clips() {
        let playlist = sequence(&clips(&["walk2rest", "rest2walk", "walk2sleep"]));
        assert_eq!(playlist.chained[0].key, "walk2rest");
        assert_chained(&playlist);
        assert_eq!(playlist.len(), 3);
    }

    #[test]
    fn empty_input() {
        let playlist = sequence(&BTreeMap::<String, String>::new());
        assert!(playlist.is_empty());
    }
}
