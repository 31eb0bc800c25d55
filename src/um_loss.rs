use crate::aggregation::{LossAggregator, LossMode};
use crate::data_wrappers::{MSTEdge, PairCounts};
use crate::decomposition::decompose;
use crate::emst::{build_spanning_tree, ComponentConnector};
#[cfg(feature = "parallel")]
use crate::emst::parallel::EmstCalculatorPar;
#[cfg(feature = "serial")]
use crate::emst::serial::EmstCalculator;
use crate::gradient::GradientChain;
use crate::points::{PointExtractor, PointSet};
use crate::validation::DataValidator;
use crate::{UmLossError, UmLossHyperParams};
use ndarray::{ArrayD, ArrayViewD};
use num_traits::Float;
use tracing::{debug, debug_span, trace};

/// The ultrametric loss of a dense embedding against a segmentation. Generic over floating
/// point numeric types.
///
/// The points of the embedding (optionally restricted by a mask) are joined by a Euclidean
/// minimum spanning tree. The ultrametric distance of two points is the weight of the
/// heaviest edge on the tree path between them. The loss pulls points with the same label to
/// an ultrametric distance of zero and pushes points with different labels at least `alpha`
/// apart.
#[derive(Debug, Clone)]
pub struct UltrametricLoss<'a, T> {
    embedding: ArrayViewD<'a, T>,
    segmentation: ArrayViewD<'a, u64>,
    mask: Option<ArrayViewD<'a, bool>>,
    hp: UmLossHyperParams,
}

/// Everything one evaluation produces: the loss, its gradient with respect to the embedding,
/// and the spanning tree it was computed on.
#[derive(Debug, Clone, PartialEq)]
pub struct UmLossOutput<T> {
    /// The scalar loss.
    pub loss: T,
    /// The tree edges in the order they were decomposed.
    pub emst: Vec<MSTEdge<T>>,
    /// The first endpoint of every edge, an index into `point_indices`.
    pub edges_u: Vec<usize>,
    /// The second endpoint of every edge, an index into `point_indices`.
    pub edges_v: Vec<usize>,
    /// The Euclidean length of every edge.
    pub distances: Vec<T>,
    /// The row-major flat spatial index of every point that took part.
    pub point_indices: Vec<usize>,
    /// The pairs resolved by every edge.
    pub pair_counts: Vec<PairCounts>,
    /// The derivative of the loss with respect to the embedding, shaped like it.
    pub gradient: ArrayD<T>,
}

impl<'a, T: Float + Send + Sync> UltrametricLoss<'a, T> {
    /// Creates a loss evaluator using a custom hyper parameter configuration.
    ///
    /// # Parameters
    /// * `embedding` - the embedding field, of shape `[channels, s1, .., sk]`. Must contain
    ///                 only finite values.
    /// * `segmentation` - the label of every point, of shape `[s1, .., sk]`. Label 0 is
    ///                    background.
    /// * `hyper_params` - the hyper parameter configuration.
    ///
    /// # Returns
    /// * The loss evaluator.
    ///
    /// # Examples
    /// ```
    ///use ndarray::{ArrayD, IxDyn};
    ///use um_loss::{UltrametricLoss, UmLossHyperParams};
    ///
    ///let embedding = ArrayD::<f32>::zeros(IxDyn(&[3, 4, 4]));
    ///let segmentation = ArrayD::<u64>::ones(IxDyn(&[4, 4]));
    ///let config = UmLossHyperParams::builder()
    ///    .alpha(2.0)
    ///    .add_coordinates(false)
    ///    .balance(false)
    ///    .build();
    ///let um_loss = UltrametricLoss::new(embedding.view(), segmentation.view(), config);
    /// ```
    pub fn new(
        embedding: ArrayViewD<'a, T>,
        segmentation: ArrayViewD<'a, u64>,
        hyper_params: UmLossHyperParams,
    ) -> Self {
        UltrametricLoss { embedding, segmentation, mask: None, hp: hyper_params }
    }

    /// Creates a loss evaluator using the default hyper parameters.
    ///
    /// # Parameters
    /// * `embedding` - the embedding field, of shape `[channels, s1, .., sk]`. Must contain
    ///                 only finite values.
    /// * `segmentation` - the label of every point, of shape `[s1, .., sk]`. Label 0 is
    ///                    background.
    ///
    /// # Returns
    /// * The loss evaluator.
    pub fn default_hyper_params(
        embedding: ArrayViewD<'a, T>,
        segmentation: ArrayViewD<'a, u64>,
    ) -> Self {
        UltrametricLoss::new(embedding, segmentation, UmLossHyperParams::default())
    }

    /// Restricts the loss to the points where `mask` is true. The mask must have the spatial
    /// shape of the embedding.
    pub fn with_mask(mut self, mask: ArrayViewD<'a, bool>) -> Self {
        self.mask = Some(mask);
        self
    }

    /// Evaluates the loss and its gradient.
    ///
    /// # Returns
    /// * A result that, if successful, contains the loss, its gradient and the spanning tree
    ///   used. An Error will be returned if the shapes of the embedding, segmentation and mask
    ///   disagree, if the embedding contains non-finite values, or if the configuration is
    ///   invalid. Fewer than two points is not an error: the loss is zero.
    ///
    /// # Examples
    /// ```
    ///use ndarray::{ArrayD, IxDyn};
    ///use um_loss::{UltrametricLoss, UmLossHyperParams};
    ///
    ///// Two labels along a line, each label a tight cluster far from the other
    ///let embedding = ArrayD::from_shape_vec(
    ///    IxDyn(&[1, 4]),
    ///    vec![0.0_f64, 0.0, 10.0, 10.0],
    ///).unwrap();
    ///let segmentation = ArrayD::from_shape_vec(IxDyn(&[4]), vec![1_u64, 1, 2, 2]).unwrap();
    ///let config = UmLossHyperParams::builder()
    ///    .alpha(5.0)
    ///    .add_coordinates(false)
    ///    .build();
    ///let um_loss = UltrametricLoss::new(embedding.view(), segmentation.view(), config);
    ///let output = um_loss.compute().unwrap();
    ///assert_eq!(0.0, output.loss);
    ///assert_eq!(3, output.emst.len());
    /// ```
    #[cfg(feature = "serial")]
    pub fn compute(&self) -> Result<UmLossOutput<T>, UmLossError> {
        let span = debug_span!("um_loss", name = %self.hp.name);
        let _entered = span.enter();

        let points = self.extract_points()?;
        let calculator = EmstCalculator::new(&points.features, self.hp.mst_algo);
        self.evaluate(&points, &calculator)
    }

    /// Evaluates the loss and its gradient, building the spanning tree with some parallelism.
    /// The result is identical to `UltrametricLoss::compute`. Not recommended for small inputs.
    ///
    /// # Returns
    /// * A result that, if successful, contains the loss, its gradient and the spanning tree
    ///   used. An Error will be returned if the shapes of the embedding, segmentation and mask
    ///   disagree, if the embedding contains non-finite values, or if the configuration is
    ///   invalid.
    #[cfg(feature = "parallel")]
    pub fn compute_par(&self) -> Result<UmLossOutput<T>, UmLossError> {
        let span = debug_span!("um_loss", name = %self.hp.name, parallel = true);
        let _entered = span.enter();

        let points = self.extract_points()?;
        let calculator = EmstCalculatorPar::new(&points.features, self.hp.mst_algo);
        self.evaluate(&points, &calculator)
    }

    fn extract_points(&self) -> Result<PointSet<T>, UmLossError> {
        let validator =
            DataValidator::new(&self.embedding, &self.segmentation, self.mask.as_ref(), &self.hp);
        validator.validate_input_data()?;

        let extractor = PointExtractor::new(
            &self.embedding,
            &self.segmentation,
            self.mask.as_ref(),
            self.hp.add_coordinates,
            &self.hp.coordinate_scale,
        );
        let points = extractor.extract()?;
        debug!(n_points = points.len(), n_channels = points.n_channels, "extracted points");
        Ok(points)
    }

    fn evaluate<C: ComponentConnector<T>>(&self, points: &PointSet<T>, connector: &C)
        -> Result<UmLossOutput<T>, UmLossError> {
        let tree = build_spanning_tree(connector, &points.labels, self.hp.constrained_emst)?;
        trace!(n_edges = tree.len(), constrained = self.hp.constrained_emst, "built spanning tree");

        let decomposition = decompose(&tree, &points.labels);
        let totals = decomposition.pair_counts.iter().fold(PairCounts::default(), |acc, c| {
            PairCounts {
                positive: acc.positive + c.positive,
                negative: acc.negative + c.negative,
                excluded: acc.excluded + c.excluded,
            }
        });
        debug!(
            positive = totals.positive,
            negative = totals.negative,
            excluded = totals.excluded,
            "decomposed pairs"
        );

        let alpha = T::from(self.hp.alpha)
            .ok_or_else(|| UmLossError::NumericCast(format!("alpha {}", self.hp.alpha)))?;
        let mode = if self.hp.quadrupel_loss {
            LossMode::Quadruplet
        } else {
            LossMode::Pairwise { balance: self.hp.balance }
        };
        let terms = LossAggregator::new(alpha, mode).aggregate(&decomposition);
        debug!(loss = terms.loss.to_f64(), "aggregated loss");

        let gradient = GradientChain::new(points, &tree)
            .embedding_gradient(&terms.edge_gradients, self.embedding.shape())?;

        Ok(UmLossOutput {
            loss: terms.loss,
            edges_u: tree.iter().map(|edge| edge.left_node_id).collect(),
            edges_v: tree.iter().map(|edge| edge.right_node_id).collect(),
            distances: tree.iter().map(|edge| edge.distance).collect(),
            point_indices: points.grid_indices.clone(),
            pair_counts: decomposition.pair_counts,
            gradient,
            emst: tree,
        })
    }
}
