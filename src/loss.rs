//! Loss functions.
//!
//! Allocation-free helpers intended to be used like:
//!
//! - run `model.forward(...)`
//! - compute `d_output` via [`Loss::backward`]
//! - run `model.backward(...)`
//! - update parameters with an optimizer
//!
//! Predictions are post-activation outputs: the cross-entropy losses expect
//! probabilities (a sigmoid or softmax output layer), not logits.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Probabilities are clipped to `[EPSILON, 1 - EPSILON]` before taking logs.
pub const EPSILON: f32 = 1e-7;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
/// Supported loss functions.
pub enum Loss {
    /// Mean over outputs of `(pred - target)^2`.
    SquaredError,
    /// Binary cross-entropy over probabilities in `(0, 1)`.
    BinaryCrossEntropy,
    /// Categorical cross-entropy over a probability vector and a one-hot target.
    CategoricalCrossEntropy,
}

impl Loss {
    pub const ALL: [Loss; 3] = [
        Loss::SquaredError,
        Loss::BinaryCrossEntropy,
        Loss::CategoricalCrossEntropy,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Loss::SquaredError => "squaredError",
            Loss::BinaryCrossEntropy => "binaryCrossEntropy",
            Loss::CategoricalCrossEntropy => "categoricalCrossEntropy",
        }
    }

    /// Loss for a single sample.
    ///
    /// Shape contract: `pred.len() == target.len()`.
    #[inline]
    pub fn forward(self, pred: &[f32], target: &[f32]) -> f32 {
        assert_eq!(
            pred.len(),
            target.len(),
            "pred len {} does not match target len {}",
            pred.len(),
            target.len()
        );
        if pred.is_empty() {
            return 0.0;
        }

        match self {
            Loss::SquaredError => {
                let inv_n = 1.0 / pred.len() as f32;
                let mut sum_sq = 0.0_f32;
                for (&p, &t) in pred.iter().zip(target) {
                    let diff = p - t;
                    sum_sq = diff.mul_add(diff, sum_sq);
                }
                sum_sq * inv_n
            }
            Loss::BinaryCrossEntropy => {
                let inv_n = 1.0 / pred.len() as f32;
                let mut sum = 0.0_f32;
                for (&p, &t) in pred.iter().zip(target) {
                    let p = clip(p);
                    sum -= t * p.ln() + (1.0 - t) * (1.0 - p).ln();
                }
                sum * inv_n
            }
            Loss::CategoricalCrossEntropy => {
                let mut sum = 0.0_f32;
                for (&p, &t) in pred.iter().zip(target) {
                    if t != 0.0 {
                        sum -= t * clip(p).ln();
                    }
                }
                sum
            }
        }
    }

    /// Compute loss + gradient w.r.t `pred`.
    ///
    /// Writes `d_pred = dL/d(pred)` into `d_pred` and returns the loss. Where a
    /// probability was clipped the gradient is zero.
    ///
    /// Shape contract: `pred.len() == target.len() == d_pred.len()`.
    #[inline]
    pub fn backward(self, pred: &[f32], target: &[f32], d_pred: &mut [f32]) -> f32 {
        assert_eq!(
            pred.len(),
            d_pred.len(),
            "pred len {} does not match d_pred len {}",
            pred.len(),
            d_pred.len()
        );
        let loss = self.forward(pred, target);
        if pred.is_empty() {
            return loss;
        }

        match self {
            Loss::SquaredError => {
                let scale = 2.0 / pred.len() as f32;
                for i in 0..pred.len() {
                    d_pred[i] = (pred[i] - target[i]) * scale;
                }
            }
            Loss::BinaryCrossEntropy => {
                let inv_n = 1.0 / pred.len() as f32;
                for i in 0..pred.len() {
                    let p = pred[i];
                    d_pred[i] = if is_clipped(p) {
                        0.0
                    } else {
                        (p - target[i]) / (p * (1.0 - p)) * inv_n
                    };
                }
            }
            Loss::CategoricalCrossEntropy => {
                for i in 0..pred.len() {
                    let p = pred[i];
                    d_pred[i] = if is_clipped(p) { 0.0 } else { -target[i] / p };
                }
            }
        }

        loss
    }
}

impl fmt::Display for Loss {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Loss {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "squarederror" | "meansquarederror" | "mse" => Ok(Loss::SquaredError),
            "binarycrossentropy" | "bce" => Ok(Loss::BinaryCrossEntropy),
            "categoricalcrossentropy" | "cce" => Ok(Loss::CategoricalCrossEntropy),
            other => Err(Error::InvalidConfig(format!("unknown loss {other:?}"))),
        }
    }
}

#[inline]
fn clip(p: f32) -> f32 {
    p.clamp(EPSILON, 1.0 - EPSILON)
}

#[inline]
fn is_clipped(p: f32) -> bool {
    !(EPSILON..=1.0 - EPSILON).contains(&p)
}
