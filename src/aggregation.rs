use crate::data_wrappers::PairBucket;
use crate::decomposition::Decomposition;
use num_traits::Float;

/// How the decomposed pairs are combined into a scalar.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum LossMode {
    /// Positives pulled to distance zero, negatives pushed beyond the margin.
    Pairwise { balance: bool },
    /// Every positive distance ranked against every negative distance.
    Quadruplet,
}

/// The loss and its derivative with respect to the length of each tree edge.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct LossTerms<T> {
    pub(crate) loss: T,
    pub(crate) edge_gradients: Vec<T>,
}

pub(crate) struct LossAggregator<T> {
    alpha: T,
    mode: LossMode,
}

impl<T: Float> LossAggregator<T> {
    pub(crate) fn new(alpha: T, mode: LossMode) -> Self {
        Self { alpha, mode }
    }

    pub(crate) fn aggregate(&self, decomposition: &Decomposition<T>) -> LossTerms<T> {
        let n_edges = decomposition.pair_counts.len();
        match self.mode {
            LossMode::Pairwise { balance } => self.pairwise(decomposition, balance, n_edges),
            LossMode::Quadruplet => self.quadruplet(decomposition, n_edges),
        }
    }

    fn pairwise(&self, decomposition: &Decomposition<T>, balance: bool, n_edges: usize)
        -> LossTerms<T> {
        let n_positive = total_count(&decomposition.positive);
        let n_negative = total_count(&decomposition.negative);
        let (positive_norm, negative_norm) = if balance {
            (n_positive, n_negative)
        } else {
            (n_positive + n_negative, n_positive + n_negative)
        };

        let two = T::one() + T::one();
        let mut positive_sum = T::zero();
        let mut negative_sum = T::zero();
        let mut edge_gradients = vec![T::zero(); n_edges];

        for bucket in &decomposition.positive {
            let count = to_float::<T>(bucket.count);
            positive_sum = positive_sum + count * bucket.distance * bucket.distance;
            edge_gradients[bucket.edge] = edge_gradients[bucket.edge]
                + mean(two * count * bucket.distance, positive_norm);
        }
        for bucket in &decomposition.negative {
            let count = to_float::<T>(bucket.count);
            let shortfall = (self.alpha - bucket.distance).max(T::zero());
            negative_sum = negative_sum + count * shortfall * shortfall;
            edge_gradients[bucket.edge] = edge_gradients[bucket.edge]
                - mean(two * count * shortfall, negative_norm);
        }

        let loss = if balance {
            mean(positive_sum, n_positive) + mean(negative_sum, n_negative)
        } else {
            mean(positive_sum + negative_sum, n_positive + n_negative)
        };
        LossTerms { loss, edge_gradients }
    }

    /// Evaluates `Σp Σn cp·cn·max(0, dp − dn + α)²` without the cross product: with the
    /// negatives sorted, the terms a positive takes part in form a prefix. Over that prefix
    /// `Σ c·(h − d)² = C·(h − μ)² + M2`, with the weighted mean μ and the scatter M2 of the
    /// prefix. Both summands are non-negative, so small hinges next to large distances do not
    /// cancel. Likewise for the positives a negative meets, which form a suffix.
    fn quadruplet(&self, decomposition: &Decomposition<T>, n_edges: usize) -> LossTerms<T> {
        let mut edge_gradients = vec![T::zero(); n_edges];
        let n_positive = total_count(&decomposition.positive);
        let n_negative = total_count(&decomposition.negative);
        if n_positive == 0 || n_negative == 0 {
            return LossTerms { loss: T::zero(), edge_gradients };
        }
        let norm = to_float::<T>(n_positive) * to_float(n_negative);
        let two = T::one() + T::one();
        let alpha = self.alpha;

        let negatives = sorted_by_distance(&decomposition.negative);
        // prefix[k] holds the k closest negatives
        let mut prefix = Vec::with_capacity(negatives.len() + 1);
        prefix.push(WeightedMoments::<T>::empty());
        for bucket in &negatives {
            let last = prefix[prefix.len() - 1];
            prefix.push(last.add(to_float(bucket.count), bucket.distance));
        }

        let positives = sorted_by_distance(&decomposition.positive);
        // suffix[k] holds all but the k closest positives
        let mut suffix = vec![WeightedMoments::<T>::empty(); positives.len() + 1];
        for (k, bucket) in positives.iter().enumerate().rev() {
            suffix[k] = suffix[k + 1].add(to_float(bucket.count), bucket.distance);
        }

        let mut loss = T::zero();
        for bucket in &positives {
            let k = negatives.partition_point(|n| bucket.distance - n.distance + alpha > T::zero());
            let moments = prefix[k];
            if moments.weight == T::zero() {
                continue;
            }
            let count = to_float::<T>(bucket.count);
            let hinge = (bucket.distance - moments.mean) + alpha;
            loss = loss + count * (moments.weight * hinge * hinge + moments.scatter);
            edge_gradients[bucket.edge] =
                edge_gradients[bucket.edge] + two * count * moments.weight * hinge / norm;
        }
        for bucket in &negatives {
            let k = positives.partition_point(|p| p.distance - bucket.distance + alpha <= T::zero());
            let moments = suffix[k];
            if moments.weight == T::zero() {
                continue;
            }
            let count = to_float::<T>(bucket.count);
            let hinge = (moments.mean - bucket.distance) + alpha;
            edge_gradients[bucket.edge] =
                edge_gradients[bucket.edge] - two * count * moments.weight * hinge / norm;
        }

        LossTerms { loss: loss / norm, edge_gradients }
    }
}

/// Total weight, weighted mean and weighted sum of squared deviations from the mean of a
/// set of distances, updated one bucket at a time (West's weighted Welford update).
#[derive(Debug, Clone, Copy, PartialEq)]
struct WeightedMoments<T> {
    weight: T,
    mean: T,
    scatter: T,
}

impl<T: Float> WeightedMoments<T> {
    fn empty() -> Self {
        WeightedMoments { weight: T::zero(), mean: T::zero(), scatter: T::zero() }
    }

    fn add(self, weight: T, value: T) -> Self {
        let total = self.weight + weight;
        let delta = value - self.mean;
        let mean = self.mean + delta * (weight / total);
        let scatter = self.scatter + weight * delta * (value - mean);
        WeightedMoments { weight: total, mean, scatter }
    }
}

pub(crate) fn total_count<T>(buckets: &[PairBucket<T>]) -> u64 {
    buckets.iter().map(|bucket| bucket.count).sum()
}

fn sorted_by_distance<T: Float>(buckets: &[PairBucket<T>]) -> Vec<PairBucket<T>> {
    let mut sorted = buckets.to_vec();
    sorted.sort_by(|a, b| {
        a.distance.partial_cmp(&b.distance).unwrap_or(std::cmp::Ordering::Equal)
    });
    sorted
}

fn to_float<T: Float>(count: u64) -> T {
    // u64 -> float casts cannot fail, they only round
    T::from(count).unwrap_or_else(T::max_value)
}

/// sum/n, or zero for an empty class so that it drops out of the loss.
fn mean<T: Float>(sum: T, n: u64) -> T {
    if n == 0 { T::zero() } else { sum / to_float(n) }
}
