//! Loss functions for training

use burn::tensor::{backend::Backend, Tensor};

const EPSILON: f64 = 1e-7;

/// Categorical cross-entropy on probabilities with per-timestep and per-class weights
///
/// # Arguments
/// * `probabilities` - network output `[batch, time, classes]`
/// * `targets` - one-hot or soft targets `[batch, time, classes]`
/// * `sample_weights` - `[batch, time]`, zero excludes a timestep
/// * `class_weights` - optional `[classes]` weights applied by target class
///
/// The weighted per-timestep losses are averaged over all timesteps.
pub fn weighted_categorical_crossentropy<B: Backend>(
    probabilities: Tensor<B, 3>,
    targets: Tensor<B, 3>,
    sample_weights: Tensor<B, 2>,
    class_weights: Option<Tensor<B, 1>>,
) -> Tensor<B, 1> {
    let [_, _, classes] = targets.dims();
    let log_probs = probabilities.clamp(EPSILON, 1.0 - EPSILON).log();

    let per_step: Tensor<B, 2> = (targets.clone() * log_probs).sum_dim(2).neg().squeeze(2);

    let weights = match class_weights {
        Some(class_weights) => {
            let by_class: Tensor<B, 2> = (targets * class_weights.reshape([1, 1, classes]))
                .sum_dim(2)
                .squeeze(2);
            sample_weights * by_class
        }
        None => sample_weights,
    };

    (per_step * weights).mean()
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::tensor::TensorData;
    use burn_ndarray::NdArray;

    type TestBackend = NdArray<f32>;

    fn tensor3(values: Vec<f32>, shape: [usize; 3]) -> Tensor<TestBackend, 3> {
        Tensor::from_data(TensorData::new(values, shape), &Default::default())
    }

    fn scalar(t: Tensor<TestBackend, 1>) -> f32 {
        t.into_data().to_vec::<f32>().unwrap()[0]
    }

    #[test]
    fn test_perfect_prediction_has_near_zero_loss() {
        let probs = tensor3(vec![1.0, 0.0, 0.0, 1.0], [1, 2, 2]);
        let targets = probs.clone();
        let weights = Tensor::ones([1, 2], &Default::default());
        let loss = weighted_categorical_crossentropy(probs, targets, weights, None);
        assert!(scalar(loss) < 1e-5);
    }

    #[test]
    fn test_uniform_prediction() {
        let probs = tensor3(vec![0.5, 0.5, 0.5, 0.5], [1, 2, 2]);
        let targets = tensor3(vec![1.0, 0.0, 0.0, 1.0], [1, 2, 2]);
        let weights = Tensor::ones([1, 2], &Default::default());
        let loss = weighted_categorical_crossentropy(probs, targets, weights, None);
        assert!((scalar(loss) - std::f32::consts::LN_2).abs() < 1e-5);
    }

    #[test]
    fn test_zero_weights_exclude_timesteps() {
        let probs = tensor3(vec![0.5, 0.5, 0.9, 0.1], [1, 2, 2]);
        let targets = tensor3(vec![1.0, 0.0, 1.0, 0.0], [1, 2, 2]);
        let weights = Tensor::from_data(TensorData::new(vec![0.0f32, 1.0], [1, 2]), &Default::default());
        let loss = weighted_categorical_crossentropy(probs, targets, weights, None);
        // only the second step counts, averaged over both steps
        let expected = -(0.9f32).ln() / 2.0;
        assert!((scalar(loss) - expected).abs() < 1e-5);
    }

    #[test]
    fn test_class_weights_scale_loss() {
        let probs = tensor3(vec![0.5, 0.5], [1, 1, 2]);
        let targets = tensor3(vec![0.0, 1.0], [1, 1, 2]);
        let weights = Tensor::ones([1, 1], &Default::default());
        let class_weights = Tensor::from_data(TensorData::new(vec![1.0f32, 3.0], [2]), &Default::default());

        let loss = weighted_categorical_crossentropy(probs, targets, weights, Some(class_weights));
        assert!((scalar(loss) - 3.0 * std::f32::consts::LN_2).abs() < 1e-5);
    }
}
