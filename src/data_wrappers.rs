/// An edge of the spanning tree. Node ids index into the extracted point set (see
/// `UmLossOutput::point_indices` to map them back onto the grid).
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MSTEdge<T> {
    pub left_node_id: usize,
    pub right_node_id: usize,
    pub distance: T,
}

/// The point pairs an edge resolves, i.e. the pairs whose ultrametric distance is the
/// weight of this edge, split by label agreement.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PairCounts {
    /// Pairs sharing the same non-background label.
    pub positive: u64,
    /// Pairs with different labels, including labelled against background.
    pub negative: u64,
    /// Background against background pairs. They take no part in the loss.
    pub excluded: u64,
}

impl PairCounts {
    pub fn total(&self) -> u64 {
        self.positive + self.negative + self.excluded
    }
}

/// An aggregated (distance, count) record of one pair class, pointing back at the tree edge
/// it came from so gradients can be routed to it.
#[derive(Clone, Copy, Debug, PartialEq)]
pub(crate) struct PairBucket<T> {
    pub(crate) edge: usize,
    pub(crate) distance: T,
    pub(crate) count: u64,
}
