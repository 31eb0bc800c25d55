use crate::data_wrappers::{MSTEdge, PairBucket, PairCounts};
use crate::union_find::LabelUnionFind;

/// The topology of one evaluation: which pairs each tree edge resolves. Only counts and
/// indices live here; distances are carried along so the math stage can weigh the buckets.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Decomposition<T> {
    pub(crate) pair_counts: Vec<PairCounts>,
    pub(crate) positive: Vec<PairBucket<T>>,
    pub(crate) negative: Vec<PairBucket<T>>,
}

/// Replays the tree edges in construction order through a label counting union find. Every
/// edge joins two sets A and B and so resolves exactly |A|·|B| pairs, whose ultrametric
/// distance is the weight of that edge.
pub(crate) fn decompose<T: Copy>(tree: &[MSTEdge<T>], labels: &[u64]) -> Decomposition<T> {
    let mut union_find = LabelUnionFind::new(labels);
    let mut decomposition = Decomposition {
        pair_counts: Vec::with_capacity(tree.len()),
        positive: Vec::new(),
        negative: Vec::new(),
    };

    for (edge_id, edge) in tree.iter().enumerate() {
        let counts = match union_find.union(edge.left_node_id, edge.right_node_id) {
            Some(merged) => PairCounts {
                positive: merged.same_label,
                negative: merged.total - merged.same_label - merged.background,
                excluded: merged.background,
            },
            // Not reachable for a tree, an edge closing a cycle connects nothing new
            None => PairCounts::default(),
        };

        if counts.positive > 0 {
            decomposition.positive.push(PairBucket {
                edge: edge_id,
                distance: edge.distance,
                count: counts.positive,
            });
        }
        if counts.negative > 0 {
            decomposition.negative.push(PairBucket {
                edge: edge_id,
                distance: edge.distance,
                count: counts.negative,
            });
        }
        decomposition.pair_counts.push(counts);
    }

    decomposition
}
