//! Cost-weighted logistic regression, pure numeric.

use crate::domain::features::{FEATURE_COUNT, UNLABELED};

pub const DEFAULT_LEARNING_RATE: f64 = 0.05;
pub const DEFAULT_EPOCHS: usize = 300;

const WEIGHT_EPS: f64 = 1e-6;
const PROB_EPS: f64 = 1e-9;

/// Trained artifact: one weight per feature column plus a bias. Immutable
/// once produced.
#[derive(Debug, Clone, PartialEq)]
pub struct LogisticModel {
    pub weights: Vec<f64>,
    pub bias: f64,
}

impl LogisticModel {
    /// Batch gradient descent over the rows with a non-sentinel target,
    /// using the default rate and epoch count. An empty filtered training
    /// set yields a zero model instead of an error.
    pub fn train(features: &[Vec<f64>], target: &[f64], spread: &[f64], fee_rate: f64) -> Self {
        Self::train_with(
            features,
            target,
            spread,
            fee_rate,
            DEFAULT_LEARNING_RATE,
            DEFAULT_EPOCHS,
        )
    }

    pub fn train_with(
        features: &[Vec<f64>],
        target: &[f64],
        spread: &[f64],
        fee_rate: f64,
        learning_rate: f64,
        epochs: usize,
    ) -> Self {
        let mut x: Vec<&[f64]> = Vec::new();
        let mut y: Vec<f64> = Vec::new();
        let mut sp: Vec<f64> = Vec::new();
        for (i, &t) in target.iter().enumerate() {
            if t != UNLABELED {
                x.push(&features[i]);
                y.push(t);
                sp.push(spread[i]);
            }
        }

        let columns = features
            .first()
            .map(|row| row.len())
            .unwrap_or(FEATURE_COUNT);
        if x.is_empty() {
            return Self {
                weights: vec![0.0; columns],
                bias: 0.0,
            };
        }

        let sample_weights = cost_weights(&sp, fee_rate);
        let mut w = vec![0.0; columns];
        let mut b = 0.0;
        let scale = 1.0 / x.len() as f64;

        for _ in 0..epochs {
            let mut grad_w = vec![0.0; columns];
            let mut grad_b = 0.0;
            for ((row, &label), &weight) in x.iter().zip(&y).zip(&sample_weights) {
                let prediction = sigmoid(dot(row, &w) + b);
                let error = (prediction - label) * weight;
                for (g, &value) in grad_w.iter_mut().zip(row.iter()) {
                    *g += error * value;
                }
                grad_b += error;
            }
            for (wi, g) in w.iter_mut().zip(&grad_w) {
                *wi -= learning_rate * scale * g;
            }
            b -= learning_rate * scale * grad_b;
        }

        Self { weights: w, bias: b }
    }

    /// One probability in [0,1] per input row.
    pub fn predict_proba(&self, features: &[Vec<f64>]) -> Vec<f64> {
        features
            .iter()
            .map(|row| sigmoid(dot(row, &self.weights) + self.bias))
            .collect()
    }

    /// Weighted logistic cross-entropy on the non-sentinel rows, using the
    /// same spread/fee cost weighting as training. An empty filtered set
    /// yields 0.
    pub fn score(&self, features: &[Vec<f64>], target: &[f64], spread: &[f64], fee_rate: f64) -> f64 {
        let pred = self.predict_proba(features);
        let mut filtered_pred = Vec::new();
        let mut filtered_target = Vec::new();
        let mut filtered_spread = Vec::new();
        for (i, &t) in target.iter().enumerate() {
            if t != UNLABELED {
                filtered_pred.push(pred[i]);
                filtered_target.push(t);
                filtered_spread.push(spread[i]);
            }
        }
        logistic_cost(
            &filtered_pred,
            &filtered_target,
            &cost_weights(&filtered_spread, fee_rate),
        )
    }
}

/// Per-sample loss weight: rows whose half-spread clears the fee push the
/// gradient harder.
pub fn cost_weights(spread: &[f64], fee_rate: f64) -> Vec<f64> {
    spread
        .iter()
        .map(|sp| {
            let edge = (sp / 2.0 - fee_rate).max(0.0);
            1.0 + edge / (fee_rate + WEIGHT_EPS)
        })
        .collect()
}

/// Weighted cross-entropy normalized by total weight; zero total weight
/// (including the empty case) yields 0.
pub fn logistic_cost(pred: &[f64], target: &[f64], weights: &[f64]) -> f64 {
    let total_weight: f64 = weights.iter().sum();
    if total_weight == 0.0 {
        return 0.0;
    }
    let mut loss = 0.0;
    for ((&p, &t), &w) in pred.iter().zip(target).zip(weights) {
        let p = p.clamp(PROB_EPS, 1.0 - PROB_EPS);
        loss += w * (-(t * p.ln() + (1.0 - t) * (1.0 - p).ln()));
    }
    loss / total_weight
}

/// Two-branch numerically stable sigmoid.
pub fn sigmoid(value: f64) -> f64 {
    if value >= 0.0 {
        let z = (-value).exp();
        1.0 / (1.0 + z)
    } else {
        let z = value.exp();
        z / (1.0 + z)
    }
}

fn dot(row: &[f64], weights: &[f64]) -> f64 {
    row.iter().zip(weights).map(|(a, b)| a * b).sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn separable_data() -> (Vec<Vec<f64>>, Vec<f64>, Vec<f64>) {
        // Positive feature -> label 1, negative -> label 0.
        let features = vec![
            vec![1.0, 0.5],
            vec![2.0, 0.1],
            vec![1.5, -0.2],
            vec![-1.0, 0.3],
            vec![-2.0, -0.1],
            vec![-1.5, 0.2],
        ];
        let target = vec![1.0, 1.0, 1.0, 0.0, 0.0, 0.0];
        let spread = vec![0.01; 6];
        (features, target, spread)
    }

    #[test]
    fn sigmoid_is_stable_at_extremes() {
        assert_eq!(sigmoid(1000.0), 1.0);
        assert_eq!(sigmoid(-1000.0), 0.0);
        assert!((sigmoid(0.0) - 0.5).abs() < f64::EPSILON);
        assert!(sigmoid(-745.0).is_finite());
        assert!(sigmoid(745.0).is_finite());
    }

    #[test]
    fn train_separates_trivial_data() {
        let (features, target, spread) = separable_data();
        let model = LogisticModel::train(&features, &target, &spread, 0.0004);
        let probs = model.predict_proba(&features);
        assert!(probs[0] > 0.5);
        assert!(probs[1] > 0.5);
        assert!(probs[3] < 0.5);
        assert!(probs[4] < 0.5);
    }

    #[test]
    fn sentinel_rows_are_excluded_from_training() {
        let (mut features, mut target, mut spread) = separable_data();
        // A wildly contradictory sentinel row must not influence the fit.
        features.push(vec![100.0, 100.0]);
        target.push(UNLABELED);
        spread.push(5.0);

        let with_sentinel = LogisticModel::train(&features, &target, &spread, 0.0004);
        let (f2, t2, s2) = separable_data();
        let without = LogisticModel::train(&f2, &t2, &s2, 0.0004);
        for (a, b) in with_sentinel.weights.iter().zip(&without.weights) {
            assert!((a - b).abs() < 1e-12);
        }
        assert!((with_sentinel.bias - without.bias).abs() < 1e-12);
    }

    #[test]
    fn empty_training_set_degrades_to_zero_model() {
        let features = vec![vec![1.0, 2.0], vec![3.0, 4.0]];
        let target = vec![UNLABELED, UNLABELED];
        let spread = vec![0.5, 0.5];
        let model = LogisticModel::train(&features, &target, &spread, 0.0004);
        assert_eq!(model.weights, vec![0.0, 0.0]);
        assert_eq!(model.bias, 0.0);
        // Zero model predicts 0.5 everywhere.
        assert!(model.predict_proba(&features).iter().all(|p| (p - 0.5).abs() < 1e-12));
    }

    #[test]
    fn cost_weights_reward_wide_spread() {
        let weights = cost_weights(&[0.0, 0.001, 1.0], 0.0004);
        assert!((weights[0] - 1.0).abs() < 1e-12);
        assert!(weights[1] > 1.0);
        assert!(weights[2] > weights[1]);
    }

    #[test]
    fn cost_weight_floor_is_one() {
        // Half-spread below the fee contributes nothing extra.
        let weights = cost_weights(&[0.0004], 0.0004);
        assert!((weights[0] - 1.0).abs() < 1e-12);
    }

    #[test]
    fn logistic_cost_of_perfect_predictions_is_tiny() {
        let cost = logistic_cost(&[1.0, 0.0], &[1.0, 0.0], &[1.0, 1.0]);
        assert!(cost < 1e-6);
        // Clamping keeps the cost finite at the boundaries.
        assert!(cost.is_finite());
    }

    #[test]
    fn logistic_cost_empty_is_zero() {
        assert_eq!(logistic_cost(&[], &[], &[]), 0.0);
    }

    #[test]
    fn score_ignores_sentinel_rows() {
        let (features, target, spread) = separable_data();
        let model = LogisticModel::train(&features, &target, &spread, 0.0004);

        let mut padded_features = features.clone();
        padded_features.push(vec![50.0, -50.0]);
        let mut padded_target = target.clone();
        padded_target.push(UNLABELED);
        let mut padded_spread = spread.clone();
        padded_spread.push(2.0);

        let base = model.score(&features, &target, &spread, 0.0004);
        let padded = model.score(&padded_features, &padded_target, &padded_spread, 0.0004);
        assert!((base - padded).abs() < 1e-12);
    }

    #[test]
    fn score_of_all_sentinel_rows_is_zero() {
        let model = LogisticModel {
            weights: vec![1.0],
            bias: 0.0,
        };
        let score = model.score(&[vec![1.0]], &[UNLABELED], &[0.5], 0.0004);
        assert_eq!(score, 0.0);
    }

    proptest! {
        #[test]
        fn predict_proba_bounded(values in proptest::collection::vec(-1e6f64..1e6, 8)) {
            let model = LogisticModel {
                weights: vec![0.3, -1.2, 4.0, 0.0, -0.5, 2.5, -3.0, 0.7],
                bias: -0.25,
            };
            let probs = model.predict_proba(&[values]);
            prop_assert!(probs[0] >= 0.0 && probs[0] <= 1.0);
        }

        #[test]
        fn sigmoid_bounded(value in -1e9f64..1e9) {
            let p = sigmoid(value);
            prop_assert!((0.0..=1.0).contains(&p));
        }
    }
}
