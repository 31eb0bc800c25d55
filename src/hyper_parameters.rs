use crate::emst::MstAlgorithm;
use tracing::warn;

// Defaults for parameters
const ALPHA_DEFAULT: f64 = 0.1;
const ADD_COORDINATES_DEFAULT: bool = true;
const COORDINATE_SCALE_DEFAULT: f64 = 1.0;
const BALANCE_DEFAULT: bool = true;
const CONSTRAINED_EMST_DEFAULT: bool = false;
const QUADRUPEL_LOSS_DEFAULT: bool = false;
const MST_ALGORITHM_DEFAULT: MstAlgorithm = MstAlgorithm::Auto;
const NAME_DEFAULT: &str = "um_loss";

// Valid minimums/left bounds of parameters
const ALPHA_MINIMUM: f64 = 0.0;

/// A wrapper around the various hyper parameters of the ultrametric loss.
/// Only use if you want to tune hyper parameters. Otherwise use
/// `UltrametricLoss::default_hyper_params()` to evaluate the loss with the defaults.
#[derive(Debug, Clone, PartialEq)]
pub struct UmLossHyperParams {
    pub(crate) alpha: f64,
    pub(crate) add_coordinates: bool,
    pub(crate) coordinate_scale: Vec<f64>,
    pub(crate) balance: bool,
    pub(crate) constrained_emst: bool,
    pub(crate) quadrupel_loss: bool,
    pub(crate) mst_algo: MstAlgorithm,
    pub(crate) name: String,
}

/// Builder object to set custom hyper parameters.
pub struct HyperParamBuilder {
    alpha: Option<f64>,
    add_coordinates: Option<bool>,
    coordinate_scale: Option<Vec<f64>>,
    balance: Option<bool>,
    constrained_emst: Option<bool>,
    quadrupel_loss: Option<bool>,
    mst_algo: Option<MstAlgorithm>,
    name: Option<String>,
}

impl UmLossHyperParams {
    pub(crate) fn default() -> Self {
        Self::builder().build()
    }

    /// Enters the builder pattern, allowing custom hyper parameters to be set using
    /// various setter methods.
    ///
    /// # Returns
    /// * the hyper parameter configuration builder
    pub fn builder() -> HyperParamBuilder {
        HyperParamBuilder {
            alpha: None,
            add_coordinates: None,
            coordinate_scale: None,
            balance: None,
            constrained_emst: None,
            quadrupel_loss: None,
            mst_algo: None,
            name: None,
        }
    }

    /// The margin used by the negative and quadruplet loss terms.
    pub fn alpha(&self) -> f64 {
        self.alpha
    }

    /// The diagnostic tag attached to the tracing span of every evaluation.
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl HyperParamBuilder {
    /// Sets the margin alpha. Pairs of points with different labels are penalised when their
    /// ultrametric distance is smaller than alpha. In quadruplet mode, every positive distance
    /// should be at least alpha smaller than every negative distance. Defaults to 0.1.
    ///
    /// # Parameters
    /// * alpha - the margin, clamped to be non-negative
    ///
    /// # Returns
    /// * the hyper parameter configuration builder
    pub fn alpha(mut self, alpha: f64) -> HyperParamBuilder {
        let valid_alpha = HyperParamBuilder::validate_input_left_bound(alpha, ALPHA_MINIMUM, "alpha");
        self.alpha = Some(valid_alpha);
        self
    }

    /// Sets whether the spatial coordinates of each point are appended to its embedding
    /// before the spanning tree is computed. Defaults to true.
    ///
    /// # Parameters
    /// * add_coordinates - whether to augment the embedding with coordinates
    ///
    /// # Returns
    /// * the hyper parameter configuration builder
    pub fn add_coordinates(mut self, add_coordinates: bool) -> HyperParamBuilder {
        self.add_coordinates = Some(add_coordinates);
        self
    }

    /// Sets the scale applied to the spatial coordinates when they are appended to the
    /// embedding. Either a single value used for every axis, or one value per spatial axis.
    /// Defaults to 1.0 for every axis. Has no effect unless `add_coordinates` is set.
    ///
    /// # Parameters
    /// * coordinate_scale - the per axis (or global) coordinate scale
    ///
    /// # Returns
    /// * the hyper parameter configuration builder
    pub fn coordinate_scale(mut self, coordinate_scale: Vec<f64>) -> HyperParamBuilder {
        self.coordinate_scale = Some(coordinate_scale);
        self
    }

    /// Sets whether positive and negative pairs are averaged separately and summed (balanced)
    /// or averaged together (unbalanced). Ignored in quadruplet mode. Defaults to true.
    ///
    /// # Parameters
    /// * balance - whether to balance the two pair classes
    ///
    /// # Returns
    /// * the hyper parameter configuration builder
    pub fn balance(mut self, balance: bool) -> HyperParamBuilder {
        self.balance = Some(balance);
        self
    }

    /// Sets whether the spanning tree connects every label internally before any edge
    /// between different labels is used. Defaults to false.
    ///
    /// # Parameters
    /// * constrained_emst - whether to build the label constrained tree
    ///
    /// # Returns
    /// * the hyper parameter configuration builder
    pub fn constrained_emst(mut self, constrained_emst: bool) -> HyperParamBuilder {
        self.constrained_emst = Some(constrained_emst);
        self
    }

    /// Sets whether the quadruplet ranking loss is used in place of the pairwise margin loss.
    /// Defaults to false.
    ///
    /// # Parameters
    /// * quadrupel_loss - whether to compute the quadruplet loss
    ///
    /// # Returns
    /// * the hyper parameter configuration builder
    pub fn quadrupel_loss(mut self, quadrupel_loss: bool) -> HyperParamBuilder {
        self.quadrupel_loss = Some(quadrupel_loss);
        self
    }

    /// Sets the minimum spanning tree algorithm. Both algorithms produce the same tree; the
    /// choice only matters for performance. Prim is quadratic in the number of points with a
    /// tiny constant. Boruvka uses a kd-tree and only pays off on low dimensional embeddings
    /// without well separated clusters. Defaults to Auto, which uses Prim.
    ///
    /// # Returns
    /// * the hyper parameter configuration builder
    pub fn mst_algorithm(mut self, mst_algorithm: MstAlgorithm) -> HyperParamBuilder {
        self.mst_algo = Some(mst_algorithm);
        self
    }

    /// Sets a name used to tag log output. Has no effect on the result.
    ///
    /// # Returns
    /// * the hyper parameter configuration builder
    pub fn name(mut self, name: impl Into<String>) -> HyperParamBuilder {
        self.name = Some(name.into());
        self
    }

    /// Finishes the building of the hyper parameter configuration. A call to this method is
    /// required to exist the builder pattern and complete the construction of the hyper parameters.
    ///
    /// # Returns
    /// * The completed hyper parameter configuration.
    pub fn build(self) -> UmLossHyperParams {
        UmLossHyperParams {
            alpha: self.alpha.unwrap_or(ALPHA_DEFAULT),
            add_coordinates: self.add_coordinates.unwrap_or(ADD_COORDINATES_DEFAULT),
            coordinate_scale: self
                .coordinate_scale
                .unwrap_or_else(|| vec![COORDINATE_SCALE_DEFAULT]),
            balance: self.balance.unwrap_or(BALANCE_DEFAULT),
            constrained_emst: self.constrained_emst.unwrap_or(CONSTRAINED_EMST_DEFAULT),
            quadrupel_loss: self.quadrupel_loss.unwrap_or(QUADRUPEL_LOSS_DEFAULT),
            mst_algo: self.mst_algo.unwrap_or(MST_ALGORITHM_DEFAULT),
            name: self.name.unwrap_or_else(|| String::from(NAME_DEFAULT)),
        }
    }

    fn validate_input_left_bound(input_param: f64, left_bound: f64, param: &str) -> f64 {
        // NaN is left alone here and rejected by the data validator
        if input_param < left_bound {
            warn!("{param} ({input_param}) cannot be lower than {left_bound}. Set to {left_bound}.");
            left_bound
        } else {
            input_param
        }
    }
}
