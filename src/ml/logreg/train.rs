use rand::rngs::StdRng;
use rand::{Rng, SeedableRng, seq::SliceRandom};

use super::LogRegModel;
use crate::ml::{TrainSet, logit, sigmoid};

/// Training options for the logistic regression model.
#[derive(Debug, Clone)]
pub struct TrainOptions {
    pub epochs: usize,
    pub learning_rate: f32,
    pub l2: f32,
    pub batch_size: usize,
    pub seed: u64,
    pub balance_classes: bool,
}

impl Default for TrainOptions {
    fn default() -> Self {
        Self {
            epochs: 60,
            learning_rate: 0.1,
            l2: 1e-4,
            batch_size: 64,
            seed: 42,
            balance_classes: false,
        }
    }
}

pub fn train_logreg(dataset: &TrainSet, options: &TrainOptions) -> Result<LogRegModel, String> {
    let dim = dataset.check_shape()?;
    let (mean, scale) = standardization(&dataset.x, dim);
    let x: Vec<Vec<f32>> = dataset
        .x
        .iter()
        .map(|row| {
            row.iter()
                .enumerate()
                .map(|(i, v)| (v - mean[i]) / scale[i])
                .collect()
        })
        .collect();

    let mut rng = StdRng::seed_from_u64(options.seed);
    let mut weights: Vec<f32> = (0..dim).map(|_| (rng.random::<f32>() - 0.5) * 0.01).collect();
    let mut bias = logit(dataset.positive_rate());

    let class_weights = if options.balance_classes {
        balanced_class_weights(&dataset.y)
    } else {
        [1.0, 1.0]
    };

    let mut indices: Vec<usize> = (0..x.len()).collect();
    let batch_size = options.batch_size.max(1);
    let lr = options.learning_rate;
    let l2 = options.l2.max(0.0);

    for _epoch in 0..options.epochs {
        indices.shuffle(&mut rng);
        for chunk in indices.chunks(batch_size) {
            let mut grad_w = vec![0.0f32; dim];
            let mut grad_b = 0.0f32;
            let mut batch_weight = 0.0f32;
            for &idx in chunk {
                let label = dataset.y[idx];
                let weight = class_weights[label as usize];
                if weight == 0.0 {
                    continue;
                }
                let row = &x[idx];
                let raw = bias + weights.iter().zip(row).map(|(w, v)| w * v).sum::<f32>();
                let diff = sigmoid(raw) - f32::from(label);
                for i in 0..dim {
                    grad_w[i] += diff * row[i] * weight;
                }
                grad_b += diff * weight;
                batch_weight += weight;
            }
            if batch_weight == 0.0 {
                continue;
            }
            let inv = 1.0 / batch_weight;
            for i in 0..dim {
                weights[i] -= lr * (grad_w[i] * inv + l2 * weights[i]);
            }
            bias -= lr * grad_b * inv;
        }
    }

    let model = LogRegModel {
        model_version: 1,
        feature_len_f32: dim,
        mean,
        scale,
        weights,
        bias,
        temperature: 1.0,
    };
    model.validate()?;
    Ok(model)
}

/// Per-feature mean and standard deviation; constant columns get scale `1`.
fn standardization(x: &[Vec<f32>], dim: usize) -> (Vec<f32>, Vec<f32>) {
    let n = x.len().max(1) as f64;
    let mut mean = vec![0.0f64; dim];
    for row in x {
        for (i, &v) in row.iter().enumerate() {
            mean[i] += v as f64;
        }
    }
    mean.iter_mut().for_each(|m| *m /= n);
    let mut var = vec![0.0f64; dim];
    for row in x {
        for (i, &v) in row.iter().enumerate() {
            let d = v as f64 - mean[i];
            var[i] += d * d;
        }
    }
    let scale = var
        .into_iter()
        .map(|v| {
            let sd = (v / n).sqrt();
            if sd.is_finite() && sd > 1e-9 { sd as f32 } else { 1.0 }
        })
        .collect();
    (mean.into_iter().map(|m| m as f32).collect(), scale)
}

fn balanced_class_weights(y: &[u8]) -> [f32; 2] {
    let mut counts = [0f32; 2];
    for &label in y {
        counts[label as usize] += 1.0;
    }
    let total: f32 = counts.iter().sum();
    counts.map(|count| if count == 0.0 { 0.0 } else { total / (2.0 * count) })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ml::Classifier;

    fn imbalanced() -> TrainSet {
        let mut data = TrainSet::default();
        for i in 0..100 {
            let churned = i % 10 == 0;
            let inactivity = if churned { 30.0 } else { (i % 7) as f32 };
            data.x.push(vec![inactivity, 250.0]);
            data.y.push(u8::from(churned));
        }
        data
    }

    #[test]
    fn learns_direction_of_effect() {
        let model = train_logreg(&imbalanced(), &TrainOptions::default()).unwrap();
        assert!(model.weights[0] > 0.0);
        assert!(model.score(&[30.0, 250.0]) > 0.5);
        assert!(model.score(&[1.0, 250.0]) < 0.5);
    }

    #[test]
    fn constant_column_gets_unit_scale() {
        let model = train_logreg(&imbalanced(), &TrainOptions::default()).unwrap();
        assert_eq!(model.scale[1], 1.0);
        assert_eq!(model.mean[1], 250.0);
    }

    #[test]
    fn balanced_weights_upweight_minority() {
        let weights = balanced_class_weights(&[0, 0, 0, 1]);
        assert!(weights[1] > weights[0]);
        assert_eq!(balanced_class_weights(&[0, 0]), [0.5, 0.0]);
    }

    #[test]
    fn same_seed_same_model() {
        let options = TrainOptions {
            balance_classes: true,
            ..TrainOptions::default()
        };
        let a = train_logreg(&imbalanced(), &options).unwrap();
        let b = train_logreg(&imbalanced(), &options).unwrap();
        assert_eq!(a, b);
    }
}
