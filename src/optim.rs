//! Optimizers.
//!
//! Small, allocation-free-per-step optimizers that update an `Mlp` given a set of
//! `Gradients`.
//!
//! - Optimizer *state* (moments, accumulators) lives outside the model in
//!   [`OptimizerState`]; recompiling a model means allocating a fresh state.
//! - Each step rewrites the gradients into an update direction and then reuses
//!   `Mlp::sgd_step`, so every optimizer applies `param -= lr * direction`.
//! - Hyperparameters other than the learning rate are fixed at the usual defaults.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::{Error, Gradients, Mlp, Result};

const BETA1: f32 = 0.9;
const BETA2: f32 = 0.999;
const EPS: f32 = 1e-7;
const RHO: f32 = 0.95;
const RMS_DECAY: f32 = 0.9;
const ADAGRAD_INITIAL_ACCUMULATOR: f32 = 0.1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
/// Optimizer choice for training.
pub enum Optimizer {
    #[default]
    Adam,
    Sgd,
    Adagrad,
    Adadelta,
    Adamax,
    #[serde(rename = "rmsprop")]
    RmsProp,
}

impl Optimizer {
    pub const ALL: [Optimizer; 6] = [
        Optimizer::Adam,
        Optimizer::Sgd,
        Optimizer::Adagrad,
        Optimizer::Adadelta,
        Optimizer::Adamax,
        Optimizer::RmsProp,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Optimizer::Adam => "adam",
            Optimizer::Sgd => "sgd",
            Optimizer::Adagrad => "adagrad",
            Optimizer::Adadelta => "adadelta",
            Optimizer::Adamax => "adamax",
            Optimizer::RmsProp => "rmsprop",
        }
    }

    /// Allocate optimizer state for `model`.
    pub fn state(self, model: &Mlp) -> OptimizerState {
        let (first, second) = match self {
            Optimizer::Sgd => (Vec::new(), Vec::new()),
            Optimizer::Adagrad => (
                filled_like_params(model, ADAGRAD_INITIAL_ACCUMULATOR),
                Vec::new(),
            ),
            Optimizer::RmsProp => (filled_like_params(model, 0.0), Vec::new()),
            Optimizer::Adam | Optimizer::Adadelta | Optimizer::Adamax => {
                (filled_like_params(model, 0.0), filled_like_params(model, 0.0))
            }
        };

        OptimizerState {
            kind: self,
            beta1_pow: 1.0,
            beta2_pow: 1.0,
            first,
            second,
        }
    }
}

impl fmt::Display for Optimizer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Optimizer {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Optimizer::ALL
            .into_iter()
            .find(|o| o.name().eq_ignore_ascii_case(s))
            .ok_or_else(|| Error::InvalidConfig(format!("unknown optimizer {s:?}")))
    }
}

/// Owned optimizer state.
///
/// Slots are per parameter tensor, ordered `[layer0.weights, layer0.biases, layer1.weights, ...]`.
/// `first` holds the first moment / accumulator, `second` the second one where the
/// optimizer needs it.
#[derive(Debug, Clone)]
pub struct OptimizerState {
    kind: Optimizer,
    beta1_pow: f32,
    beta2_pow: f32,
    first: Vec<Vec<f32>>,
    second: Vec<Vec<f32>>,
}

#[derive(Debug, Clone, Copy)]
struct StepCoeffs {
    kind: Optimizer,
    corr1: f32,
    corr2: f32,
}

impl OptimizerState {
    #[inline]
    pub fn kind(&self) -> Optimizer {
        self.kind
    }


    /// Apply one optimizer step. `grads` is consumed as scratch space.
    pub fn step(&mut self, model: &mut Mlp, grads: &mut Gradients, lr: f32) {
        assert!(lr.is_finite() && lr > 0.0, "lr must be finite and > 0");

        self.beta1_pow *= BETA1;
        self.beta2_pow *= BETA2;
        let coeffs = StepCoeffs {
            kind: self.kind,
            corr1: 1.0 - self.beta1_pow,
            corr2: 1.0 - self.beta2_pow,
        };

        if self.kind != Optimizer::Sgd {
            for layer_idx in 0..model.num_layers() {
                let w_slot = 2 * layer_idx;
                let b_slot = w_slot + 1;
                update_direction(
                    coeffs,
                    grads.d_weights_mut(layer_idx),
                    &mut self.first[w_slot],
                    self.second.get_mut(w_slot).map(Vec::as_mut_slice).unwrap_or_default(),
                );
                update_direction(
                    coeffs,
                    grads.d_biases_mut(layer_idx),
                    &mut self.first[b_slot],
                    self.second.get_mut(b_slot).map(Vec::as_mut_slice).unwrap_or_default(),
                );
            }
        }

        model.sgd_step(grads, lr);
    }
}

/// Overwrite `g` with the update direction for one parameter tensor.
///
/// `b` is empty for optimizers with a single slot.
fn update_direction(c: StepCoeffs, g: &mut [f32], a: &mut [f32], b: &mut [f32]) {
    debug_assert_eq!(g.len(), a.len());

    for i in 0..g.len() {
        let grad = g[i];
        g[i] = match c.kind {
            Optimizer::Sgd => grad,
            Optimizer::Adam => {
                a[i] = BETA1 * a[i] + (1.0 - BETA1) * grad;
                b[i] = BETA2 * b[i] + (1.0 - BETA2) * grad * grad;
                (a[i] / c.corr1) / ((b[i] / c.corr2).sqrt() + EPS)
            }
            Optimizer::Adamax => {
                a[i] = BETA1 * a[i] + (1.0 - BETA1) * grad;
                b[i] = (BETA2 * b[i]).max(grad.abs());
                (a[i] / c.corr1) / (b[i] + EPS)
            }
            Optimizer::Adagrad => {
                a[i] += grad * grad;
                grad / (a[i] + EPS).sqrt()
            }
            Optimizer::RmsProp => {
                a[i] = RMS_DECAY * a[i] + (1.0 - RMS_DECAY) * grad * grad;
                grad / (a[i] + EPS).sqrt()
            }
            Optimizer::Adadelta => {
                a[i] = RHO * a[i] + (1.0 - RHO) * grad * grad;
                let upd = ((b[i] + EPS).sqrt() / (a[i] + EPS).sqrt()) * grad;
                b[i] = RHO * b[i] + (1.0 - RHO) * upd * upd;
                upd
            }
        };
    }
}

fn filled_like_params(model: &Mlp, value: f32) -> Vec<Vec<f32>> {
    let mut slots = Vec::with_capacity(2 * model.num_layers());
    for layer in model.layers() {
        slots.push(vec![value; layer.weights().len()]);
        slots.push(vec![value; layer.biases().len()]);
    }
    slots
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::{Activation, MlpBuilder};

    fn unit_model() -> Mlp {
        let mut mlp = MlpBuilder::new(1)
            .unwrap()
            .add_layer(1, Activation::Linear)
            .unwrap()
            .build_with_seed(0)
            .unwrap();
        let layer = mlp.layer_mut(0).unwrap();
        layer.weights_mut()[0] = 1.0;
        layer.biases_mut()[0] = 1.0;
        mlp
    }

    fn one_step(kind: Optimizer, grad: f32, lr: f32) -> f32 {
        let mut mlp = unit_model();
        let mut grads = mlp.gradients();
        grads.d_weights_mut(0)[0] = grad;
        grads.d_biases_mut(0)[0] = grad;
        let mut state = kind.state(&mlp);
        state.step(&mut mlp, &mut grads, lr);
        mlp.layer(0).unwrap().weights()[0]
    }

    #[test]
    fn sgd_moves_against_the_gradient() {
        let w = one_step(Optimizer::Sgd, 3.0, 0.1);
        assert!((w - (1.0 - 0.3)).abs() < 1e-6);
    }

    #[test]
    fn adam_first_step_is_roughly_lr() {
        // The bias-corrected first step is g / |g| = 1 for any non-zero gradient.
        let w = one_step(Optimizer::Adam, 0.5, 0.1);
        assert!((w - 0.9).abs() < 1e-4);
    }

    #[test]
    fn adamax_first_step_is_roughly_lr() {
        let w = one_step(Optimizer::Adamax, 2.0, 0.1);
        assert!((w - 0.9).abs() < 1e-4);
    }

    #[test]
    fn adagrad_uses_initial_accumulator() {
        // accum = 0.1 + 1, direction = 1 / sqrt(1.1)
        let w = one_step(Optimizer::Adagrad, 1.0, 0.1);
        assert!((w - (1.0 - 0.1 / 1.1_f32.sqrt())).abs() < 1e-5);
    }

    #[test]
    fn rmsprop_and_adadelta_descend() {
        for kind in [Optimizer::RmsProp, Optimizer::Adadelta] {
            let w = one_step(kind, 1.0, 0.1);
            assert!(w < 1.0, "{kind} did not descend: {w}");
        }
    }

    #[test]
    fn parses_names() {
        for o in Optimizer::ALL {
            assert_eq!(o.name().parse::<Optimizer>().unwrap(), o);
        }
        assert_eq!("RMSProp".parse::<Optimizer>().unwrap(), Optimizer::RmsProp);
        assert!("lbfgs".parse::<Optimizer>().is_err());
    }
}
