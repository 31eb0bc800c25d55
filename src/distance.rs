use num_traits::Float;

/// Euclidean distance between two feature vectors. This is the only metric the loss is
/// defined over, and the kd-tree and the dense spanning tree builders both go through it so
/// that edge weights are bit-identical whichever algorithm produced them.
pub(crate) fn euclidean_distance<T: Float>(a: &[T], b: &[T]) -> T {
    squared_euclidean_distance(a, b).sqrt()
}

pub(crate) fn squared_euclidean_distance<T: Float>(a: &[T], b: &[T]) -> T {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| ((*x) - (*y)) * ((*x) - (*y)))
        .fold(T::zero(), std::ops::Add::add)
}
