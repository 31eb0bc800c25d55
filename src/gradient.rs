use crate::data_wrappers::MSTEdge;
use crate::distance::euclidean_distance;
use crate::points::PointSet;
use crate::UmLossError;
use ndarray::{ArrayD, IxDyn};
use num_traits::Float;

/// Routes the derivative of the loss with respect to each edge length back onto the
/// embedding. For an edge (u, v) of length d, `∂d/∂x_u = (x_u − x_v)/d` and `∂d/∂x_v` is its
/// negation. Only the embedding channels are differentiated: coordinate channels are inputs
/// of the distance but not of the embedding.
pub(crate) struct GradientChain<'a, T> {
    points: &'a PointSet<T>,
    tree: &'a [MSTEdge<T>],
}

impl<'a, T: Float> GradientChain<'a, T> {
    pub(crate) fn new(points: &'a PointSet<T>, tree: &'a [MSTEdge<T>]) -> Self {
        Self { points, tree }
    }

    /// Per point gradients over the embedding channels.
    pub(crate) fn point_gradients(&self, edge_gradients: &[T]) -> Vec<Vec<T>> {
        let n_channels = self.points.n_channels;
        let mut gradients = vec![vec![T::zero(); n_channels]; self.points.len()];

        for (edge, &dl_dd) in self.tree.iter().zip(edge_gradients) {
            if dl_dd == T::zero() {
                continue;
            }
            let x_u = &self.points.features[edge.left_node_id];
            let x_v = &self.points.features[edge.right_node_id];
            // Recomputed on the features so a zero edge is recognised exactly
            let length = euclidean_distance(x_u, x_v);
            if length == T::zero() {
                continue;
            }
            let scale = dl_dd / length;
            for c in 0..n_channels {
                let g = scale * (x_u[c] - x_v[c]);
                gradients[edge.left_node_id][c] = gradients[edge.left_node_id][c] + g;
                gradients[edge.right_node_id][c] = gradients[edge.right_node_id][c] - g;
            }
        }

        gradients
    }

    /// Scatters the point gradients into a field shaped like the embedding, zero wherever no
    /// point was extracted.
    pub(crate) fn embedding_gradient(&self, edge_gradients: &[T], shape: &[usize])
        -> Result<ArrayD<T>, UmLossError> {
        let n_spatial: usize = shape[1..].iter().product();
        let mut field = vec![T::zero(); shape[0] * n_spatial];

        let gradients = self.point_gradients(edge_gradients);
        for (gradient, &flat) in gradients.iter().zip(&self.points.grid_indices) {
            for (c, &g) in gradient.iter().enumerate() {
                field[c * n_spatial + flat] = g;
            }
        }

        ArrayD::from_shape_vec(IxDyn(shape), field)
            .map_err(|e| UmLossError::WrongDimension(e.to_string()))
    }
}
