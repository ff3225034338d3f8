//! Activation functions.
//!
//! A dense layer computes a pre-activation value `z = W x + b` and then applies an
//! activation function: `y = activation(z)`.
//!
//! We cache the *post-activation* outputs `y` in `Scratch`. During backprop we compute
//! `dL/dz` from `dL/dy` using `y`, so no separate `z` buffer is needed.
//!
//! `Softmax` is the only activation that is not element-wise; it is reserved for the
//! output layer of multiclass models and handled row-wise by [`crate::Layer`].

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
/// Activation function applied by a dense layer.
pub enum Activation {
    Linear,
    #[serde(rename = "relu")]
    ReLU,
    Sigmoid,
    Tanh,
    Softmax,
}

impl Activation {
    /// Activations a user may pick for hidden layers.
    pub const CONFIGURABLE: [Activation; 4] = [
        Activation::Linear,
        Activation::ReLU,
        Activation::Sigmoid,
        Activation::Tanh,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Activation::Linear => "linear",
            Activation::ReLU => "relu",
            Activation::Sigmoid => "sigmoid",
            Activation::Tanh => "tanh",
            Activation::Softmax => "softmax",
        }
    }

    #[inline]
    pub fn is_elementwise(self) -> bool {
        !matches!(self, Activation::Softmax)
    }

    /// Element-wise forward. Softmax must go through [`softmax_in_place`].
    #[inline]
    pub(crate) fn forward(self, x: f32) -> f32 {
        match self {
            Activation::Linear => x,
            Activation::ReLU => x.max(0.0),
            Activation::Sigmoid => sigmoid(x),
            Activation::Tanh => x.tanh(),
            Activation::Softmax => unreachable!("softmax is applied row-wise"),
        }
    }

    /// Derivative of the activation with respect to its input, expressed in terms
    /// of the cached post-activation output `y`.
    #[inline]
    pub(crate) fn grad_from_output(self, y: f32) -> f32 {
        match self {
            Activation::Linear => 1.0,
            Activation::ReLU => {
                if y > 0.0 {
                    1.0
                } else {
                    0.0
                }
            }
            Activation::Sigmoid => y * (1.0 - y),
            Activation::Tanh => 1.0 - y * y,
            Activation::Softmax => unreachable!("softmax gradient is a Jacobian product"),
        }
    }
}

impl fmt::Display for Activation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Activation {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "linear" | "identity" => Ok(Activation::Linear),
            "relu" => Ok(Activation::ReLU),
            "sigmoid" => Ok(Activation::Sigmoid),
            "tanh" => Ok(Activation::Tanh),
            "softmax" => Ok(Activation::Softmax),
            other => Err(Error::InvalidConfig(format!("unknown activation {other:?}"))),
        }
    }
}

#[inline]
fn sigmoid(x: f32) -> f32 {
    // Numerically stable sigmoid.
    if x >= 0.0 {
        let z = (-x).exp();
        1.0 / (1.0 + z)
    } else {
        let z = x.exp();
        z / (1.0 + z)
    }
}

/// Replace `z` with `softmax(z)`.
#[inline]
pub(crate) fn softmax_in_place(z: &mut [f32]) {
    let max = z.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let mut sum = 0.0_f32;
    for v in z.iter_mut() {
        *v = (*v - max).exp();
        sum += *v;
    }
    let inv = 1.0 / sum;
    for v in z.iter_mut() {
        *v *= inv;
    }
}
