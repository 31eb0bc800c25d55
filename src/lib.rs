//! Ultrametric loss for training dense embeddings on segmentations, in Rust. Generic over
//! floating point numeric types.
//!
//! The points of an embedding field are connected by their Euclidean minimum spanning tree.
//! The tree defines an ultrametric: the distance of two points is the weight of the heaviest
//! edge on the tree path between them, which is the level at which single linkage clustering
//! would merge them. The loss compares this distance with the ground truth segmentation:
//!  1. Pairs of points with the same label are pulled towards an ultrametric distance of zero;
//!  2. Pairs of points with different labels are pushed to an ultrametric distance of at least
//!     `alpha`; and
//!  3. Pairs of background points (label 0) are ignored.
//!
//! Every tree edge resolves all the pairs whose paths it is the heaviest edge of, so the loss
//! over all point pairs is computed from the P − 1 tree edges with a union find, without ever
//! enumerating the pairs. The gradient with respect to the embedding is returned alongside the
//! loss.
//!
//! # Examples
//! ```
//!use ndarray::{ArrayD, IxDyn};
//!use um_loss::{UltrametricLoss, UmLossHyperParams};
//!
//!// Nine points on a line, three per label, one unit apart
//!let embedding = ArrayD::from_shape_vec(
//!    IxDyn(&[1, 9]),
//!    (0..9).map(|x| x as f64).collect(),
//!).unwrap();
//!let segmentation = ArrayD::from_shape_vec(
//!    IxDyn(&[9]),
//!    vec![1, 1, 1, 2, 2, 2, 3, 3, 3],
//!).unwrap();
//!let config = UmLossHyperParams::builder()
//!    .alpha(2.0)
//!    .add_coordinates(false)
//!    .balance(false)
//!    .build();
//!let um_loss = UltrametricLoss::new(embedding.view(), segmentation.view(), config);
//!let output = um_loss.compute().unwrap();
//!assert_eq!(1.0, output.loss);
//!assert_eq!(8, output.emst.len());
//! ```
//!
//! # References
//! * Luther, K.; Seung, H.S. Learning Metric Graphs for Neuron Segmentation In Electron Microscopy Images.
//! * [Funke, J. et al. Large Scale Image Segmentation with Structured Loss based Deep Learning for Connectome Reconstruction.](https://arxiv.org/abs/1709.02974)

pub use crate::data_wrappers::{MSTEdge, PairCounts};
pub use crate::emst::MstAlgorithm;
pub use crate::error::UmLossError;
pub use crate::hyper_parameters::{HyperParamBuilder, UmLossHyperParams};
pub use crate::um_loss::{UltrametricLoss, UmLossOutput};

mod aggregation;
mod data_wrappers;
mod decomposition;
mod distance;
mod emst;
mod error;
mod gradient;
mod hyper_parameters;
mod points;
mod um_loss;
mod union_find;
mod validation;
