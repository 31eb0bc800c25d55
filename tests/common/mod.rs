use ndarray::{ArrayD, IxDyn};
use num_traits::Float;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use um_loss::{MstAlgorithm, UltrametricLoss, UmLossError, UmLossHyperParams, UmLossOutput};

pub type ComputeFn<T> = fn(&UltrametricLoss<T>) -> Result<UmLossOutput<T>, UmLossError>;

pub fn test_zero(compute_fn: ComputeFn<f32>) {
    let embedding = ArrayD::<f32>::zeros(IxDyn(&[3, 10, 10, 10]));
    let segmentation = ArrayD::<u64>::ones(IxDyn(&[10, 10, 10]));
    let hp = UmLossHyperParams::builder().add_coordinates(false).name("um_test_zero").build();
    let um_loss = UltrametricLoss::new(embedding.view(), segmentation.view(), hp);
    let output = compute_fn(&um_loss).unwrap();

    assert_eq!(0.0, output.loss);
    assert_eq!(0.0, sum_of(&output.distances));
    assert_eq!(999, output.emst.len());
    assert!(output.gradient.iter().all(|&g| g == 0.0));
}

pub fn test_simple_unbalanced(compute_fn: ComputeFn<f32>) {
    let embedding = grid_3x3([[0.0, 1.0, 2.0], [3.0, 4.0, 5.0], [6.0, 7.0, 8.0]]);
    let segmentation = rows_3x3([1, 2, 3]);
    let hp = UmLossHyperParams::builder()
        .alpha(2.0)
        .add_coordinates(false)
        .balance(false)
        .build();
    let um_loss = UltrametricLoss::new(embedding.view(), segmentation.view(), hp);
    let output = compute_fn(&um_loss).unwrap();

    // 9 positive pairs and 27 negative pairs, each at distance 1 and each losing 1
    assert_eq!(1.0, output.loss);
    assert_close(8.0, sum_of(&output.distances));
}

pub fn test_simple_balanced(compute_fn: ComputeFn<f32>) {
    let embedding = grid_3x3([[0.0, 1.0, 2.0], [3.0, 4.0, 5.0], [6.0, 7.0, 8.0]]);
    let segmentation = rows_3x3([1, 2, 3]);
    let hp = UmLossHyperParams::builder().alpha(2.0).add_coordinates(false).build();
    let um_loss = UltrametricLoss::new(embedding.view(), segmentation.view(), hp);
    let output = compute_fn(&um_loss).unwrap();

    assert_eq!(2.0, output.loss);
    assert_close(8.0, sum_of(&output.distances));
}

pub fn test_quadruplet(compute_fn: ComputeFn<f32>) {
    let embedding = grid_3x3([[0.0, 1.0, 2.0], [4.0, 5.0, 6.0], [8.0, 9.0, 10.0]]);
    let segmentation = rows_3x3([1, 2, 3]);
    let hp = UmLossHyperParams::builder()
        .alpha(3.0)
        .add_coordinates(false)
        .quadrupel_loss(true)
        .build();
    let um_loss = UltrametricLoss::new(embedding.view(), segmentation.view(), hp);
    let output = compute_fn(&um_loss).unwrap();

    // Every positive at 1 against every negative at 2: (1 - 2 + 3)^2
    assert_eq!(4.0, output.loss);
    assert_close(10.0, sum_of(&output.distances));
}

pub fn test_quadruplet_small_margin_at_large_distances(compute_fn: ComputeFn<f32>) {
    let embedding =
        ArrayD::from_shape_vec(IxDyn(&[1, 6]), vec![0.0, 1000.0, 2000.0, 3000.05, 4000.1, 5000.15])
            .unwrap();
    let segmentation = ArrayD::from_shape_vec(IxDyn(&[6]), vec![1, 1, 1, 2, 2, 2]).unwrap();
    let alpha = 0.1_f32;
    let hp = UmLossHyperParams::builder()
        .alpha(f64::from(alpha))
        .add_coordinates(false)
        .quadrupel_loss(true)
        .build();
    let um_loss = UltrametricLoss::new(embedding.view(), segmentation.view(), hp);
    let output = compute_fn(&um_loss).unwrap();

    // Cross product of the per-edge buckets, in double precision
    let mut expected = 0.0_f64;
    for (p_counts, &p_distance) in output.pair_counts.iter().zip(&output.distances) {
        for (n_counts, &n_distance) in output.pair_counts.iter().zip(&output.distances) {
            let hinge = (f64::from(p_distance) - f64::from(n_distance) + f64::from(alpha)).max(0.0);
            expected += (p_counts.positive * n_counts.negative) as f64 * hinge * hinge;
        }
    }
    let n_positive: u64 = output.pair_counts.iter().map(|c| c.positive).sum();
    let n_negative: u64 = output.pair_counts.iter().map(|c| c.negative).sum();
    assert_eq!((6, 9), (n_positive, n_negative));
    expected /= (n_positive * n_negative) as f64;

    let relative = (f64::from(output.loss) - expected).abs() / expected;
    assert!(relative < 1e-3, "expected {expected}, got {}", output.loss);
}

pub fn test_background(compute_fn: ComputeFn<f32>) {
    let embedding = grid_3x3([[0.0, 1.0, 2.0], [4.0, 5.0, 6.0], [8.0, 9.0, 10.0]]);
    let segmentation = rows_3x3([1, 0, 3]);
    let hp = UmLossHyperParams::builder()
        .alpha(4.0)
        .add_coordinates(false)
        .balance(false)
        .build();
    let um_loss = UltrametricLoss::new(embedding.view(), segmentation.view(), hp);
    let output = compute_fn(&um_loss).unwrap();

    // 6 positive pairs losing 1, 27 negative pairs losing 4, 3 background pairs ignored
    assert_close(114.0 / 33.0, output.loss);
    assert_close(10.0, sum_of(&output.distances));
    let excluded: u64 = output.pair_counts.iter().map(|c| c.excluded).sum();
    assert_eq!(3, excluded);
}

pub fn test_mask(compute_fn: ComputeFn<f32>) {
    let embedding = grid_3x3([[0.0, 1.0, 2.0], [3.0, 4.0, 5.0], [6.0, 7.0, 8.0]]);
    let segmentation = rows_3x3([1, 2, 3]);
    let masked_loss = |mask: &ArrayD<bool>, alpha: f64| {
        let hp = UmLossHyperParams::builder().alpha(alpha).add_coordinates(false).build();
        let um_loss = UltrametricLoss::new(embedding.view(), segmentation.view(), hp)
            .with_mask(mask.view());
        compute_fn(&um_loss).unwrap()
    };

    let mut mask = ArrayD::from_elem(IxDyn(&[1, 3, 3]), false);
    let output = masked_loss(&mask, 2.0);
    assert_eq!(0.0, output.loss);
    assert!(output.emst.is_empty());
    assert!(output.point_indices.is_empty());

    mask[&[0, 1, 1][..]] = true;
    let output = masked_loss(&mask, 2.0);
    assert_eq!(0.0, output.loss);
    assert_eq!(0.0, sum_of(&output.distances));
    assert_eq!(vec![4], output.point_indices);

    mask[&[0, 0, 0][..]] = true;
    let output = masked_loss(&mask, 5.0);
    assert_eq!(1.0, output.loss);
    assert_close(4.0, sum_of(&output.distances));
    assert_eq!(vec![0, 4], output.point_indices);
    assert_eq!((vec![0], vec![1]), (output.edges_u, output.edges_v));
}

pub fn test_constrained_mask(compute_fn: ComputeFn<f32>) {
    let embedding = grid_3x3([[0.0, 1.0, 2.0], [3.0, 4.0, 5.0], [6.0, 7.0, 8.0]]);
    let segmentation = rows_3x3([1, 2, 3]);
    let masked_loss = |mask: &ArrayD<bool>, alpha: f64| {
        let hp = UmLossHyperParams::builder()
            .alpha(alpha)
            .add_coordinates(false)
            .constrained_emst(true)
            .build();
        let um_loss = UltrametricLoss::new(embedding.view(), segmentation.view(), hp)
            .with_mask(mask.view());
        compute_fn(&um_loss).unwrap()
    };

    let mut mask = ArrayD::from_elem(IxDyn(&[1, 3, 3]), false);
    let output = masked_loss(&mask, 2.0);
    assert_eq!(0.0, output.loss);
    assert!(output.emst.is_empty());
    assert!(output.point_indices.is_empty());

    mask[&[0, 1, 1][..]] = true;
    let output = masked_loss(&mask, 2.0);
    assert_eq!(0.0, output.loss);
    assert_eq!(0.0, sum_of(&output.distances));
    assert_eq!(vec![4], output.point_indices);

    // One point per label: the labels have no inner edges, only the connecting one
    mask[&[0, 0, 0][..]] = true;
    let output = masked_loss(&mask, 5.0);
    assert_eq!(1.0, output.loss);
    assert_close(4.0, sum_of(&output.distances));
    assert_eq!(vec![0, 4], output.point_indices);
    assert_eq!((vec![0], vec![1]), (output.edges_u, output.edges_v));
}

pub fn test_constrained(compute_fn: ComputeFn<f32>) {
    let embedding = grid_3x3([[0.0, 1.0, 101.0], [2.0, 3.0, 4.0], [5.0, 6.0, 7.0]]);
    let segmentation = rows_3x3([1, 2, 3]);
    let hp = UmLossHyperParams::builder()
        .alpha(2.0)
        .add_coordinates(false)
        .constrained_emst(true)
        .build();
    let um_loss = UltrametricLoss::new(embedding.view(), segmentation.view(), hp);
    let output = compute_fn(&um_loss).unwrap();

    // Positives: 6 at 1, 1 at 1 and 2 at 100, over 9. Negatives: 27 at 1, over 27.
    assert_close(2224.0, output.loss);
    assert_close(107.0, sum_of(&output.distances));
    // The labels are spanned before they are connected
    let positive: Vec<u64> = output.pair_counts.iter().map(|c| c.positive).collect();
    assert_eq!(vec![1, 1, 2, 1, 2, 2, 0, 0], positive);
}

pub fn test_coordinates(compute_fn: ComputeFn<f32>) {
    let embedding = ArrayD::<f32>::zeros(IxDyn(&[1, 3, 3]));
    let segmentation = ArrayD::from_shape_vec(IxDyn(&[3, 3]), vec![1, 1, 1, 2, 2, 2, 3, 3, 3])
        .unwrap();
    let hp = UmLossHyperParams::builder()
        .alpha(4.0)
        .coordinate_scale(vec![2.0, 1.0])
        .balance(false)
        .build();
    let um_loss = UltrametricLoss::new(embedding.view(), segmentation.view(), hp);
    let output = compute_fn(&um_loss).unwrap();

    // Rows are one unit apart along the row, two units apart across rows
    assert_close(10.0, sum_of(&output.distances));
    assert_close(117.0 / 36.0, output.loss);
    // Coordinates are not part of the embedding, so it does not move
    assert_eq!(&[1, 3, 3], output.gradient.shape());
    assert!(output.gradient.iter().all(|&g| g == 0.0));
}

pub fn test_gradient_of_masked_points_is_zero(compute_fn: ComputeFn<f32>) {
    let embedding = grid_3x3([[0.0, 1.0, 2.0], [3.0, 4.0, 5.0], [6.0, 7.0, 8.0]]);
    let segmentation = rows_3x3([1, 2, 3]);
    let mut mask = ArrayD::from_elem(IxDyn(&[1, 3, 3]), true);
    mask[&[0, 2, 2][..]] = false;
    let hp = UmLossHyperParams::builder().alpha(2.0).add_coordinates(false).build();
    let um_loss = UltrametricLoss::new(embedding.view(), segmentation.view(), hp)
        .with_mask(mask.view());
    let output = compute_fn(&um_loss).unwrap();

    assert_eq!(&[1, 1, 3, 3], output.gradient.shape());
    assert_eq!(0.0, output.gradient[&[0, 0, 2, 2][..]]);
    assert!(output.gradient.iter().any(|&g| g != 0.0));
    assert_eq!(8, output.point_indices.len());
}

pub fn test_mismatched_dimensions(compute_fn: ComputeFn<f32>) {
    let embedding = ArrayD::<f32>::zeros(IxDyn(&[2, 3, 4]));
    let segmentation = ArrayD::<u64>::zeros(IxDyn(&[3, 3]));
    let um_loss = UltrametricLoss::default_hyper_params(embedding.view(), segmentation.view());
    let result = compute_fn(&um_loss);
    assert!(matches!(result, Err(UmLossError::WrongDimension(..))));

    let segmentation = ArrayD::<u64>::zeros(IxDyn(&[3, 4]));
    let mask = ArrayD::from_elem(IxDyn(&[4, 3]), true);
    let um_loss = UltrametricLoss::default_hyper_params(embedding.view(), segmentation.view())
        .with_mask(mask.view());
    let result = compute_fn(&um_loss);
    assert!(matches!(result, Err(UmLossError::WrongDimension(..))));
}

pub fn test_non_finite_embedding(compute_fn: ComputeFn<f32>) {
    let mut embedding = ArrayD::<f32>::zeros(IxDyn(&[2, 3, 3]));
    embedding[&[1, 2, 0][..]] = f32::infinity();
    let segmentation = ArrayD::<u64>::ones(IxDyn(&[3, 3]));
    let um_loss = UltrametricLoss::default_hyper_params(embedding.view(), segmentation.view());
    let result = compute_fn(&um_loss);
    assert!(matches!(result, Err(UmLossError::NonFiniteValue(..))));
}

pub fn test_pair_conservation(compute_fn: ComputeFn<f64>) {
    let mut rng = StdRng::seed_from_u64(7);
    for constrained in [false, true] {
        let (embedding, segmentation, mask) = random_fields(&mut rng, &[3, 6, 7], 4);
        let hp = UmLossHyperParams::builder()
            .alpha(0.5)
            .constrained_emst(constrained)
            .build();
        let um_loss = UltrametricLoss::new(embedding.view(), segmentation.view(), hp)
            .with_mask(mask.view());
        let output = compute_fn(&um_loss).unwrap();

        let n_points = output.point_indices.len() as u64;
        assert_eq!(n_points.saturating_sub(1) as usize, output.emst.len());
        let n_pairs: u64 = output.pair_counts.iter().map(|c| c.total()).sum();
        assert_eq!(n_points * n_points.saturating_sub(1) / 2, n_pairs);

        let n_background = output.point_indices
            .iter()
            .filter(|&&flat| segmentation.as_slice().unwrap()[flat] == 0)
            .count() as u64;
        let excluded: u64 = output.pair_counts.iter().map(|c| c.excluded).sum();
        assert_eq!(n_background * n_background.saturating_sub(1) / 2, excluded);

        for (k, edge) in output.emst.iter().enumerate() {
            assert_eq!(edge.left_node_id, output.edges_u[k]);
            assert_eq!(edge.right_node_id, output.edges_v[k]);
            assert_eq!(edge.distance, output.distances[k]);
        }
    }
}

pub fn test_matches_brute_force(compute_fn: ComputeFn<f64>) {
    let mut rng = StdRng::seed_from_u64(11);
    for (balance, quadrupel) in [(false, false), (true, false), (true, true)] {
        let (embedding, segmentation, mask) = random_fields(&mut rng, &[2, 5, 8], 3);
        let alpha = 0.6;
        let hp = UmLossHyperParams::builder()
            .alpha(alpha)
            .add_coordinates(false)
            .balance(balance)
            .quadrupel_loss(quadrupel)
            .build();
        let um_loss = UltrametricLoss::new(embedding.view(), segmentation.view(), hp)
            .with_mask(mask.view());
        let output = compute_fn(&um_loss).unwrap();

        let (features, labels) = surviving_points(&embedding, &segmentation, &output);
        let expected = brute_force_loss(&features, &labels, alpha, balance, quadrupel);
        assert!(
            (expected - output.loss).abs() < 1e-9 * expected.abs().max(1.0),
            "balance {balance}, quadrupel {quadrupel}: expected {expected}, got {}",
            output.loss
        );
    }
}

pub fn test_prim_matches_boruvka(compute_fn: ComputeFn<f64>) {
    let mut rng = StdRng::seed_from_u64(3);
    let (embedding, segmentation, mask) = random_fields(&mut rng, &[3, 9, 9], 5);
    for constrained in [false, true] {
        let outputs: Vec<UmLossOutput<f64>> = [MstAlgorithm::Prim, MstAlgorithm::Boruvka]
            .into_iter()
            .map(|algo| {
                let hp = UmLossHyperParams::builder()
                    .constrained_emst(constrained)
                    .mst_algorithm(algo)
                    .build();
                let um_loss = UltrametricLoss::new(embedding.view(), segmentation.view(), hp)
                    .with_mask(mask.view());
                compute_fn(&um_loss).unwrap()
            })
            .collect();
        assert_eq!(outputs[0], outputs[1]);
    }
}

pub fn test_idempotent(compute_fn: ComputeFn<f64>) {
    let mut rng = StdRng::seed_from_u64(5);
    let (embedding, segmentation, mask) = random_fields(&mut rng, &[2, 4, 4, 4], 3);
    let hp = UmLossHyperParams::builder().constrained_emst(true).build();
    let um_loss = UltrametricLoss::new(embedding.view(), segmentation.view(), hp)
        .with_mask(mask.view());
    assert_eq!(compute_fn(&um_loss).unwrap(), compute_fn(&um_loss).unwrap());
}

pub fn test_alpha_monotonicity(compute_fn: ComputeFn<f64>) {
    let mut rng = StdRng::seed_from_u64(13);
    let (embedding, segmentation, mask) = random_fields(&mut rng, &[2, 6, 6], 4);
    let mut previous = 0.0;
    for alpha in [0.0, 0.1, 0.3, 0.7, 1.5, 4.0] {
        let hp = UmLossHyperParams::builder().alpha(alpha).balance(false).build();
        let um_loss = UltrametricLoss::new(embedding.view(), segmentation.view(), hp)
            .with_mask(mask.view());
        let loss = compute_fn(&um_loss).unwrap().loss;
        assert!(loss >= previous, "alpha {alpha}: {loss} < {previous}");
        previous = loss;
    }
}

pub fn test_gradient_matches_finite_differences(compute_fn: ComputeFn<f64>) {
    let mut rng = StdRng::seed_from_u64(17);
    let (embedding, segmentation, _) = random_fields(&mut rng, &[2, 4, 4], 3);
    for quadrupel in [false, true] {
        let hp = UmLossHyperParams::builder()
            .alpha(0.8)
            .coordinate_scale(vec![0.1])
            .quadrupel_loss(quadrupel)
            .build();
        let um_loss = UltrametricLoss::new(embedding.view(), segmentation.view(), hp.clone());
        let output = compute_fn(&um_loss).unwrap();

        let eps = 1e-6;
        for (idx, &analytic) in output.gradient.indexed_iter() {
            let mut shifted = embedding.clone();
            shifted[&idx] += eps;
            let plus = compute_fn(&UltrametricLoss::new(
                shifted.view(),
                segmentation.view(),
                hp.clone(),
            ))
            .unwrap()
            .loss;
            shifted[&idx] -= 2.0 * eps;
            let minus = compute_fn(&UltrametricLoss::new(
                shifted.view(),
                segmentation.view(),
                hp.clone(),
            ))
            .unwrap()
            .loss;
            let numeric = (plus - minus) / (2.0 * eps);
            assert!(
                (numeric - analytic).abs() < 1e-5,
                "quadrupel {quadrupel}, {idx:?}: {numeric} vs {analytic}"
            );
        }
    }
}

fn grid_3x3(values: [[f32; 3]; 3]) -> ArrayD<f32> {
    let flat: Vec<f32> = values.iter().flatten().copied().collect();
    ArrayD::from_shape_vec(IxDyn(&[1, 1, 3, 3]), flat).unwrap()
}

fn rows_3x3(labels: [u64; 3]) -> ArrayD<u64> {
    let flat: Vec<u64> = labels.iter().flat_map(|&label| [label; 3]).collect();
    ArrayD::from_shape_vec(IxDyn(&[1, 3, 3]), flat).unwrap()
}

fn sum_of<T: Float>(values: &[T]) -> T {
    values.iter().fold(T::zero(), |acc, &v| acc + v)
}

fn assert_close(expected: f32, actual: f32) {
    assert!((expected - actual).abs() < 1e-4 * expected.abs().max(1.0),
            "expected {expected}, got {actual}");
}

/// An embedding of the given shape with uniform values, labels in `0..n_labels` and a mask
/// keeping roughly four in five points.
fn random_fields(rng: &mut StdRng, shape: &[usize], n_labels: u64)
    -> (ArrayD<f64>, ArrayD<u64>, ArrayD<bool>) {
    let spatial = &shape[1..];
    let n_spatial: usize = spatial.iter().product();
    let embedding = ArrayD::from_shape_fn(IxDyn(shape), |_| rng.gen::<f64>());
    let labels: Vec<u64> = (0..n_spatial).map(|_| rng.gen_range(0..n_labels)).collect();
    let mask: Vec<bool> = (0..n_spatial).map(|_| rng.gen_bool(0.8)).collect();
    (
        embedding,
        ArrayD::from_shape_vec(IxDyn(spatial), labels).unwrap(),
        ArrayD::from_shape_vec(IxDyn(spatial), mask).unwrap(),
    )
}

fn surviving_points(
    embedding: &ArrayD<f64>,
    segmentation: &ArrayD<u64>,
    output: &UmLossOutput<f64>,
) -> (Vec<Vec<f64>>, Vec<u64>) {
    let n_channels = embedding.shape()[0];
    let n_spatial = segmentation.len();
    let values = embedding.as_slice().unwrap();
    let labels = segmentation.as_slice().unwrap();
    let features = output.point_indices
        .iter()
        .map(|&flat| (0..n_channels).map(|c| values[c * n_spatial + flat]).collect())
        .collect();
    let labels = output.point_indices.iter().map(|&flat| labels[flat]).collect();
    (features, labels)
}

/// The loss over all point pairs, with the ultrametric distance taken as the minimax path
/// distance in the complete graph.
fn brute_force_loss(
    features: &[Vec<f64>],
    labels: &[u64],
    alpha: f64,
    balance: bool,
    quadrupel: bool,
) -> f64 {
    let n = features.len();
    let mut minimax: Vec<Vec<f64>> = features
        .iter()
        .map(|a| {
            features.iter()
                .map(|b| a.iter().zip(b).map(|(x, y)| (x - y) * (x - y)).sum::<f64>().sqrt())
                .collect()
        })
        .collect();
    for k in 0..n {
        for i in 0..n {
            for j in 0..n {
                let through_k = minimax[i][k].max(minimax[k][j]);
                if through_k < minimax[i][j] {
                    minimax[i][j] = through_k;
                }
            }
        }
    }

    let mut positive = Vec::new();
    let mut negative = Vec::new();
    for i in 0..n {
        for j in (i + 1)..n {
            match (labels[i], labels[j]) {
                (0, 0) => {}
                (a, b) if a == b => positive.push(minimax[i][j]),
                _ => negative.push(minimax[i][j]),
            }
        }
    }

    let (n_pos, n_neg) = (positive.len() as f64, negative.len() as f64);
    if quadrupel {
        if positive.is_empty() || negative.is_empty() {
            return 0.0;
        }
        let mut sum = 0.0;
        for dp in &positive {
            for dn in &negative {
                let h = (dp - dn + alpha).max(0.0);
                sum += h * h;
            }
        }
        return sum / (n_pos * n_neg);
    }

    let pos_sum: f64 = positive.iter().map(|d| d * d).sum();
    let neg_sum: f64 = negative.iter().map(|d| (alpha - d).max(0.0).powi(2)).sum();
    let mean = |sum: f64, n: f64| if n == 0.0 { 0.0 } else { sum / n };
    if balance {
        mean(pos_sum, n_pos) + mean(neg_sum, n_neg)
    } else {
        mean(pos_sum + neg_sum, n_pos + n_neg)
    }
}
