use crate::{UmLossError, UmLossHyperParams};
use ndarray::ArrayViewD;
use num_traits::Float;

#[derive(Debug, Clone)]
pub(crate) struct DataValidator<'a, 'v, T> {
    embedding: &'a ArrayViewD<'v, T>,
    segmentation: &'a ArrayViewD<'v, u64>,
    mask: Option<&'a ArrayViewD<'v, bool>>,
    hp: &'a UmLossHyperParams,
}

impl<'a, 'v, T: Float> DataValidator<'a, 'v, T> {
    pub(crate) fn new(
        embedding: &'a ArrayViewD<'v, T>,
        segmentation: &'a ArrayViewD<'v, u64>,
        mask: Option<&'a ArrayViewD<'v, bool>>,
        hp: &'a UmLossHyperParams,
    ) -> Self {
        Self { embedding, segmentation, mask, hp }
    }

    pub(crate) fn validate_input_data(&self) -> Result<(), UmLossError> {
        self.validate_shapes()?;
        self.validate_embedding_values()?;
        self.validate_hyper_params()?;
        Ok(())
    }

    fn validate_shapes(&self) -> Result<(), UmLossError> {
        let emb_shape = self.embedding.shape();
        if emb_shape.len() < 2 {
            return Err(UmLossError::WrongDimension(format!(
                "Embedding must have a channel axis and at least one spatial axis, \
                but has {} axes",
                emb_shape.len()
            )));
        }
        let spatial_shape = &emb_shape[1..];
        let seg_shape = self.segmentation.shape();
        if seg_shape != spatial_shape {
            return Err(UmLossError::WrongDimension(format!(
                "Embedding spatial shape is {spatial_shape:?}, but segmentation shape is {seg_shape:?}"
            )));
        }
        if let Some(mask) = self.mask {
            let mask_shape = mask.shape();
            if mask_shape != spatial_shape {
                return Err(UmLossError::WrongDimension(format!(
                    "Embedding spatial shape is {spatial_shape:?}, but mask shape is {mask_shape:?}"
                )));
            }
        }
        if emb_shape[0] == 0 && !self.hp.add_coordinates {
            return Err(UmLossError::EmptyFeatures);
        }
        Ok(())
    }

    fn validate_embedding_values(&self) -> Result<(), UmLossError> {
        if let Some((idx, _)) = self.embedding.indexed_iter().find(|(_, v)| !v.is_finite()) {
            return Err(UmLossError::NonFiniteValue(format!(
                "embedding contains a non-finite element at {idx:?}"
            )));
        }
        Ok(())
    }

    fn validate_hyper_params(&self) -> Result<(), UmLossError> {
        if !self.hp.alpha.is_finite() {
            return Err(UmLossError::NonFiniteValue(format!("alpha is {}", self.hp.alpha)));
        }
        if !self.hp.add_coordinates {
            return Ok(());
        }
        let n_spatial = self.embedding.ndim() - 1;
        let n_scale = self.hp.coordinate_scale.len();
        if n_scale != 1 && n_scale != n_spatial {
            return Err(UmLossError::WrongDimension(format!(
                "Coordinate scale must have 1 or {n_spatial} values, not {n_scale}"
            )));
        }
        if self.hp.coordinate_scale.iter().any(|s| !s.is_finite()) {
            return Err(UmLossError::NonFiniteValue(String::from(
                "coordinate scale contains a non-finite value",
            )));
        }
        Ok(())
    }
}
