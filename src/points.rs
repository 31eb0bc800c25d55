use crate::UmLossError;
use ndarray::{ArrayViewD, Dimension};
use num_traits::Float;

/// The points taking part in one loss evaluation, in row-major order of their grid position.
/// The first `n_channels` features of a point are its embedding, anything after that is the
/// (scaled) grid coordinate.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct PointSet<T> {
    pub(crate) features: Vec<Vec<T>>,
    pub(crate) labels: Vec<u64>,
    pub(crate) grid_indices: Vec<usize>,
    pub(crate) n_channels: usize,
}

impl<T> PointSet<T> {
    pub(crate) fn len(&self) -> usize {
        self.features.len()
    }
}

pub(crate) struct PointExtractor<'a, 'v, T> {
    embedding: &'a ArrayViewD<'v, T>,
    segmentation: &'a ArrayViewD<'v, u64>,
    mask: Option<&'a ArrayViewD<'v, bool>>,
    add_coordinates: bool,
    coordinate_scale: &'a [f64],
}

impl<'a, 'v, T: Float> PointExtractor<'a, 'v, T> {
    pub(crate) fn new(
        embedding: &'a ArrayViewD<'v, T>,
        segmentation: &'a ArrayViewD<'v, u64>,
        mask: Option<&'a ArrayViewD<'v, bool>>,
        add_coordinates: bool,
        coordinate_scale: &'a [f64],
    ) -> Self {
        Self { embedding, segmentation, mask, add_coordinates, coordinate_scale }
    }

    /// Flattens the fields into a point set. Expects validated input: the segmentation (and
    /// mask) have the spatial shape of the embedding.
    pub(crate) fn extract(&self) -> Result<PointSet<T>, UmLossError> {
        let n_channels = self.embedding.shape()[0];
        let channels: Vec<Vec<T>> = self.embedding
            .outer_iter()
            .map(|channel| channel.iter().copied().collect())
            .collect();
        let included: Option<Vec<bool>> = self.mask.map(|mask| mask.iter().copied().collect());
        let scale = if self.add_coordinates { self.axis_scales()? } else { Vec::new() };

        let mut point_set = PointSet {
            features: Vec::new(),
            labels: Vec::new(),
            grid_indices: Vec::new(),
            n_channels,
        };

        for (flat, (idx, &label)) in self.segmentation.indexed_iter().enumerate() {
            if let Some(included) = &included {
                if !included[flat] {
                    continue;
                }
            }
            let mut feature: Vec<T> = channels.iter().map(|channel| channel[flat]).collect();
            if self.add_coordinates {
                for (axis, &coord) in idx.slice().iter().enumerate() {
                    let coord = T::from(coord).ok_or_else(|| {
                        UmLossError::NumericCast(format!("grid coordinate {coord}"))
                    })?;
                    feature.push(coord * scale[axis]);
                }
            }
            point_set.features.push(feature);
            point_set.labels.push(label);
            point_set.grid_indices.push(flat);
        }

        Ok(point_set)
    }

    fn axis_scales(&self) -> Result<Vec<T>, UmLossError> {
        let n_spatial = self.segmentation.ndim();
        let scales: Vec<f64> = match self.coordinate_scale {
            [single] => vec![*single; n_spatial],
            per_axis => per_axis.to_vec(),
        };
        scales.into_iter()
            .map(|s| {
                T::from(s).ok_or_else(|| UmLossError::NumericCast(format!("coordinate scale {s}")))
            })
            .collect()
    }
}
