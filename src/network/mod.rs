//! Feed-forward classifier used both for the final egg-grading models and as
//! the training primitive behind fitness evaluation.
//!
//! Hidden layers are ReLU, the output layer is softmax with one unit per
//! grade, and training is mini-batch Adam on sparse categorical
//! cross-entropy.

use crate::data::DataSet;
use ndarray::{Array1, Array2, Axis, Zip};
use rand::prelude::*;
use std::time::Instant;
use thiserror::Error;

const BETA1: f64 = 0.9;
const BETA2: f64 = 0.999;
const ADAM_EPS: f64 = 1e-8;
const PROB_FLOOR: f64 = 1e-12;

#[derive(Error, Debug)]
pub enum NetworkError {
    #[error("Invalid architecture: {0}")]
    InvalidArchitecture(String),
    #[error("Training diverged at epoch {epoch} (loss = {loss})")]
    Diverged { epoch: usize, loss: f64 },
    #[error("Training dataset is empty")]
    EmptyDataset,
    #[error("Wall-clock budget exceeded at epoch {epoch}")]
    BudgetExceeded { epoch: usize },
    #[error("Sample has {got} features, network expects {expected}")]
    DimensionMismatch { expected: usize, got: usize },
}

/// One fully connected layer. Weights are `input × output` so a batch
/// multiplies as `x.dot(&weights)`.
#[derive(Debug, Clone)]
struct DenseLayer {
    weights: Array2<f64>,
    biases: Array1<f64>,
}

impl DenseLayer {
    /// Glorot-uniform initialization, zero biases.
    fn new(input: usize, output: usize, rng: &mut impl Rng) -> Self {
        let limit = (6.0 / (input + output) as f64).sqrt();
        Self {
            weights: Array2::from_shape_fn((input, output), |_| {
                rng.random_range(-limit..limit)
            }),
            biases: Array1::zeros(output),
        }
    }
}

/// Adam moment estimates for one layer.
#[derive(Debug, Clone)]
struct AdamState {
    m_w: Array2<f64>,
    v_w: Array2<f64>,
    m_b: Array1<f64>,
    v_b: Array1<f64>,
}

impl AdamState {
    fn new(layer: &DenseLayer) -> Self {
        Self {
            m_w: Array2::zeros(layer.weights.raw_dim()),
            v_w: Array2::zeros(layer.weights.raw_dim()),
            m_b: Array1::zeros(layer.biases.raw_dim()),
            v_b: Array1::zeros(layer.biases.raw_dim()),
        }
    }
}

/// Early stopping on validation loss, with best-weight restore.
pub struct EarlyStopping<'a> {
    pub validation: &'a DataSet,
    pub patience: usize,
}

/// Summary of one training run.
#[derive(Debug, Clone, Copy)]
pub struct TrainingReport {
    pub epochs_run: usize,
    pub final_loss: f64,
    pub stopped_early: bool,
}

#[derive(Debug, Clone)]
pub struct Network {
    layers: Vec<DenseLayer>,
    input_dim: usize,
}

impl Network {
    /// Builds a network with the given hidden-layer widths, in order, ending
    /// in a softmax layer with one unit per class.
    pub fn new(
        input_dim: usize,
        hidden_widths: &[u32],
        n_classes: usize,
        rng: &mut impl Rng,
    ) -> Result<Self, NetworkError> {
        if input_dim == 0 {
            return Err(NetworkError::InvalidArchitecture(
                "input dimension must be positive".to_string(),
            ));
        }
        if n_classes < 2 {
            return Err(NetworkError::InvalidArchitecture(format!(
                "need at least 2 output classes, got {}",
                n_classes
            )));
        }
        if hidden_widths.iter().any(|&w| w == 0) {
            return Err(NetworkError::InvalidArchitecture(
                "hidden layer width must be positive".to_string(),
            ));
        }

        let mut layers = Vec::with_capacity(hidden_widths.len() + 1);
        let mut fan_in = input_dim;
        for &width in hidden_widths {
            layers.push(DenseLayer::new(fan_in, width as usize, rng));
            fan_in = width as usize;
        }
        layers.push(DenseLayer::new(fan_in, n_classes, rng));

        Ok(Self { layers, input_dim })
    }

    /// Forward pass over a batch, keeping pre-activations and activations
    /// for backpropagation. `activations[0]` is the input batch.
    fn forward_cached(&self, x: &Array2<f64>) -> (Vec<Array2<f64>>, Vec<Array2<f64>>) {
        let mut activations = vec![x.clone()];
        let mut pre_activations = Vec::with_capacity(self.layers.len());

        for (i, layer) in self.layers.iter().enumerate() {
            let z = activations.last().unwrap().dot(&layer.weights) + &layer.biases;
            let a = if i + 1 == self.layers.len() {
                softmax_rows(&z)
            } else {
                z.mapv(|v| v.max(0.0))
            };
            pre_activations.push(z);
            activations.push(a);
        }

        (pre_activations, activations)
    }

    /// Class probabilities for a batch.
    pub fn forward(&self, x: &Array2<f64>) -> Array2<f64> {
        let (_, activations) = self.forward_cached(x);
        activations.into_iter().next_back().unwrap()
    }

    /// Trains with mini-batch Adam for at most `epochs` epochs.
    ///
    /// Returns `NetworkError::Diverged` on non-finite loss and
    /// `NetworkError::BudgetExceeded` when a `deadline` passes; both leave
    /// the caller free to treat the run as a failed, non-fatal evaluation.
    pub fn train(
        &mut self,
        train: &DataSet,
        epochs: usize,
        batch_size: usize,
        learning_rate: f64,
        early_stopping: Option<EarlyStopping<'_>>,
        deadline: Option<Instant>,
        rng: &mut impl Rng,
    ) -> Result<TrainingReport, NetworkError> {
        if train.is_empty() {
            return Err(NetworkError::EmptyDataset);
        }

        let mut adam: Vec<AdamState> = self.layers.iter().map(AdamState::new).collect();
        let mut step = 0usize;
        let mut indices: Vec<usize> = (0..train.len()).collect();
        let batch_size = batch_size.max(1).min(train.len());

        let mut best_val_loss = f64::INFINITY;
        let mut epochs_without_improvement = 0usize;
        let mut best_weights: Option<Vec<DenseLayer>> = None;

        let mut epoch_loss = 0.0;
        for epoch in 0..epochs {
            if let Some(deadline) = deadline {
                if Instant::now() >= deadline {
                    return Err(NetworkError::BudgetExceeded { epoch });
                }
            }

            indices.shuffle(rng);
            let mut loss_sum = 0.0;
            let mut batches = 0usize;

            for chunk in indices.chunks(batch_size) {
                let (x, y) = gather_batch(train, chunk);
                step += 1;
                loss_sum += self.train_batch(&x, &y, learning_rate, &mut adam, step);
                batches += 1;
            }

            epoch_loss = loss_sum / batches as f64;
            if !epoch_loss.is_finite() {
                return Err(NetworkError::Diverged {
                    epoch,
                    loss: epoch_loss,
                });
            }

            if let Some(es) = &early_stopping {
                let val_loss = self.loss(es.validation);
                if val_loss < best_val_loss {
                    best_val_loss = val_loss;
                    epochs_without_improvement = 0;
                    best_weights = Some(self.layers.clone());
                } else {
                    epochs_without_improvement += 1;
                    if epochs_without_improvement >= es.patience {
                        if let Some(weights) = best_weights {
                            self.layers = weights;
                        }
                        return Ok(TrainingReport {
                            epochs_run: epoch + 1,
                            final_loss: epoch_loss,
                            stopped_early: true,
                        });
                    }
                }
            }
        }

        // Even without a patience trigger, keep the best weights seen.
        if let Some(weights) = best_weights {
            self.layers = weights;
        }

        Ok(TrainingReport {
            epochs_run: epochs,
            final_loss: epoch_loss,
            stopped_early: false,
        })
    }

    /// One Adam step on one mini-batch; returns the batch loss.
    fn train_batch(
        &mut self,
        x: &Array2<f64>,
        y: &[usize],
        learning_rate: f64,
        adam: &mut [AdamState],
        step: usize,
    ) -> f64 {
        let batch = x.nrows() as f64;
        let (pre_activations, activations) = self.forward_cached(x);
        let probabilities = activations.last().unwrap();

        let loss = y
            .iter()
            .enumerate()
            .map(|(i, &label)| -probabilities[[i, label]].max(PROB_FLOOR).ln())
            .sum::<f64>()
            / batch;

        // Softmax + cross-entropy gradient: predicted probabilities minus
        // the one-hot targets.
        let mut delta = probabilities.clone();
        for (i, &label) in y.iter().enumerate() {
            delta[[i, label]] -= 1.0;
        }
        delta /= batch;

        for l in (0..self.layers.len()).rev() {
            let grad_w = activations[l].t().dot(&delta);
            let grad_b = delta.sum_axis(Axis(0));

            if l > 0 {
                let relu_mask = pre_activations[l - 1].mapv(|v| if v > 0.0 { 1.0 } else { 0.0 });
                delta = delta.dot(&self.layers[l].weights.t()) * relu_mask;
            }

            let state = &mut adam[l];
            let layer = &mut self.layers[l];
            adam_update(&mut layer.weights, &grad_w, &mut state.m_w, &mut state.v_w, learning_rate, step);
            adam_update_1d(&mut layer.biases, &grad_b, &mut state.m_b, &mut state.v_b, learning_rate, step);
        }

        loss
    }

    /// Mean cross-entropy over a dataset.
    pub fn loss(&self, data: &DataSet) -> f64 {
        if data.is_empty() {
            return f64::INFINITY;
        }
        let probabilities = self.forward(&data.x);
        data.y
            .iter()
            .enumerate()
            .map(|(i, &label)| -probabilities[[i, label]].max(PROB_FLOOR).ln())
            .sum::<f64>()
            / data.len() as f64
    }

    /// Argmax accuracy in [0, 1].
    pub fn evaluate(&self, data: &DataSet) -> f64 {
        if data.is_empty() {
            return 0.0;
        }
        let probabilities = self.forward(&data.x);
        let correct = data
            .y
            .iter()
            .enumerate()
            .filter(|(i, &label)| argmax_row(&probabilities, *i) == label)
            .count();
        correct as f64 / data.len() as f64
    }

    /// Predicted class index for a single scaled sample.
    pub fn predict(&self, sample: &Array1<f64>) -> Result<usize, NetworkError> {
        if sample.len() != self.input_dim {
            return Err(NetworkError::DimensionMismatch {
                expected: self.input_dim,
                got: sample.len(),
            });
        }
        let x = sample
            .clone()
            .into_shape_with_order((1, self.input_dim))
            .map_err(|_| NetworkError::DimensionMismatch {
                expected: self.input_dim,
                got: sample.len(),
            })?;
        let probabilities = self.forward(&x);
        Ok(argmax_row(&probabilities, 0))
    }
}

fn adam_update(
    param: &mut Array2<f64>,
    grad: &Array2<f64>,
    m: &mut Array2<f64>,
    v: &mut Array2<f64>,
    learning_rate: f64,
    step: usize,
) {
    let bias1 = 1.0 - BETA1.powi(step as i32);
    let bias2 = 1.0 - BETA2.powi(step as i32);
    Zip::from(param)
        .and(grad)
        .and(m)
        .and(v)
        .for_each(|p, &g, m, v| {
            *m = BETA1 * *m + (1.0 - BETA1) * g;
            *v = BETA2 * *v + (1.0 - BETA2) * g * g;
            let m_hat = *m / bias1;
            let v_hat = *v / bias2;
            *p -= learning_rate * m_hat / (v_hat.sqrt() + ADAM_EPS);
        });
}

fn adam_update_1d(
    param: &mut Array1<f64>,
    grad: &Array1<f64>,
    m: &mut Array1<f64>,
    v: &mut Array1<f64>,
    learning_rate: f64,
    step: usize,
) {
    let bias1 = 1.0 - BETA1.powi(step as i32);
    let bias2 = 1.0 - BETA2.powi(step as i32);
    Zip::from(param)
        .and(grad)
        .and(m)
        .and(v)
        .for_each(|p, &g, m, v| {
            *m = BETA1 * *m + (1.0 - BETA1) * g;
            *v = BETA2 * *v + (1.0 - BETA2) * g * g;
            let m_hat = *m / bias1;
            let v_hat = *v / bias2;
            *p -= learning_rate * m_hat / (v_hat.sqrt() + ADAM_EPS);
        });
}

/// Numerically stable row-wise softmax.
fn softmax_rows(z: &Array2<f64>) -> Array2<f64> {
    let mut out = z.clone();
    for mut row in out.rows_mut() {
        let max = row.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
        row.mapv_inplace(|v| (v - max).exp());
        let sum = row.sum();
        row.mapv_inplace(|v| v / sum);
    }
    out
}

fn argmax_row(probabilities: &Array2<f64>, row: usize) -> usize {
    let mut best = 0;
    let mut best_value = f64::NEG_INFINITY;
    for (j, &value) in probabilities.row(row).iter().enumerate() {
        if value > best_value {
            best_value = value;
            best = j;
        }
    }
    best
}

fn gather_batch(data: &DataSet, indices: &[usize]) -> (Array2<f64>, Vec<usize>) {
    let mut x = Array2::zeros((indices.len(), data.x.ncols()));
    let mut y = Vec::with_capacity(indices.len());
    for (row, &i) in indices.iter().enumerate() {
        x.row_mut(row).assign(&data.x.row(i));
        y.push(data.y[i]);
    }
    (x, y)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;

    /// Two well-separated Gaussian-ish blobs, trivially learnable.
    fn blob_dataset(n_per_class: usize, seed: u64) -> DataSet {
        let mut rng = StdRng::seed_from_u64(seed);
        let mut x = Array2::zeros((n_per_class * 2, 3));
        let mut y = Vec::with_capacity(n_per_class * 2);
        for i in 0..n_per_class * 2 {
            let class = i % 2;
            let center = if class == 0 { -2.0 } else { 2.0 };
            for j in 0..3 {
                x[[i, j]] = center + rng.random_range(-0.5..0.5);
            }
            y.push(class);
        }
        DataSet { x, y }
    }

    #[test]
    fn test_rejects_zero_width_layer() {
        let mut rng = StdRng::seed_from_u64(1);
        assert!(matches!(
            Network::new(3, &[64, 0], 3, &mut rng),
            Err(NetworkError::InvalidArchitecture(_))
        ));
    }

    #[test]
    fn test_rejects_single_class() {
        let mut rng = StdRng::seed_from_u64(1);
        assert!(Network::new(3, &[16], 1, &mut rng).is_err());
    }

    #[test]
    fn test_softmax_output_is_probability_distribution() {
        let mut rng = StdRng::seed_from_u64(2);
        let network = Network::new(3, &[12, 8], 3, &mut rng).unwrap();
        let data = blob_dataset(10, 2);
        let probabilities = network.forward(&data.x);

        for i in 0..probabilities.nrows() {
            let row_sum: f64 = probabilities.row(i).sum();
            assert!((row_sum - 1.0).abs() < 1e-9);
            assert!(probabilities.row(i).iter().all(|&p| (0.0..=1.0).contains(&p)));
        }
    }

    #[test]
    fn test_learns_separable_blobs() {
        let mut rng = StdRng::seed_from_u64(3);
        let data = blob_dataset(40, 3);
        let mut network = Network::new(3, &[16], 2, &mut rng).unwrap();

        network
            .train(&data, 60, 16, 0.01, None, None, &mut rng)
            .unwrap();

        // Linearly separable blobs with a wide margin; anything short of
        // near-perfect accuracy means training is broken.
        assert!(network.evaluate(&data) > 0.95);
    }

    #[test]
    fn test_accuracy_always_in_unit_interval() {
        let data = blob_dataset(15, 4);
        for seed in 0..5 {
            let mut rng = StdRng::seed_from_u64(seed);
            let mut network = Network::new(3, &[10, 10], 2, &mut rng).unwrap();
            network
                .train(&data, 3, 8, 0.01, None, None, &mut rng)
                .unwrap();
            let accuracy = network.evaluate(&data);
            assert!((0.0..=1.0).contains(&accuracy));
        }
    }

    #[test]
    fn test_empty_dataset_is_an_error() {
        let mut rng = StdRng::seed_from_u64(5);
        let mut network = Network::new(3, &[8], 2, &mut rng).unwrap();
        let empty = DataSet {
            x: Array2::zeros((0, 3)),
            y: vec![],
        };
        assert!(matches!(
            network.train(&empty, 5, 8, 0.01, None, None, &mut rng),
            Err(NetworkError::EmptyDataset)
        ));
    }

    #[test]
    fn test_expired_deadline_aborts_training() {
        let mut rng = StdRng::seed_from_u64(6);
        let data = blob_dataset(10, 6);
        let mut network = Network::new(3, &[8], 2, &mut rng).unwrap();

        let already_passed = Instant::now();
        assert!(matches!(
            network.train(&data, 50, 8, 0.01, None, Some(already_passed), &mut rng),
            Err(NetworkError::BudgetExceeded { .. })
        ));
    }

    #[test]
    fn test_early_stopping_halts_before_budget() {
        let mut rng = StdRng::seed_from_u64(7);
        let data = blob_dataset(40, 7);
        let validation = blob_dataset(10, 8);
        let mut network = Network::new(3, &[16], 2, &mut rng).unwrap();

        let report = network
            .train(
                &data,
                500,
                16,
                0.01,
                Some(EarlyStopping {
                    validation: &validation,
                    patience: 5,
                }),
                None,
                &mut rng,
            )
            .unwrap();

        // The blobs converge within a handful of epochs, so patience must
        // trigger long before the 500-epoch budget.
        assert!(report.epochs_run < 500);
        assert!(report.stopped_early);
    }

    #[test]
    fn test_predict_checks_dimensions() {
        let mut rng = StdRng::seed_from_u64(9);
        let network = Network::new(3, &[8], 2, &mut rng).unwrap();
        let wrong = Array1::zeros(5);
        assert!(matches!(
            network.predict(&wrong),
            Err(NetworkError::DimensionMismatch { .. })
        ));

        let ok = Array1::zeros(3);
        let class = network.predict(&ok).unwrap();
        assert!(class < 2);
    }
}
