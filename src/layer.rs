use rand::Rng;
use rand::distributions::{Distribution, Uniform};

use crate::activation::softmax_in_place;
use crate::{Activation, Error, Result};

/// Weight initialization scheme.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Init {
    /// Glorot/Xavier uniform: `U(-sqrt(6 / (in + out)), +sqrt(6 / (in + out)))`.
    Xavier,
    /// He/Kaiming uniform: `U(-sqrt(6 / in), +sqrt(6 / in))`.
    He,
}

/// Dense (fully-connected) layer with bias.
#[derive(Debug, Clone)]
pub struct Layer {
    in_dim: usize,
    out_dim: usize,
    activation: Activation,
    /// Row-major matrix with shape (out_dim, in_dim).
    weights: Vec<f32>,
    biases: Vec<f32>,
}

impl Layer {
    /// Randomly initialized layer; biases start at zero.
    pub fn new_with_rng<R: Rng + ?Sized>(
        in_dim: usize,
        out_dim: usize,
        init: Init,
        activation: Activation,
        rng: &mut R,
    ) -> Result<Self> {
        if in_dim == 0 || out_dim == 0 {
            return Err(Error::InvalidConfig(format!(
                "layer dims must be > 0, got in_dim={in_dim} out_dim={out_dim}"
            )));
        }

        let limit = match init {
            Init::Xavier => (6.0 / (in_dim + out_dim) as f32).sqrt(),
            Init::He => (6.0 / in_dim as f32).sqrt(),
        };
        let dist = Uniform::new_inclusive(-limit, limit);
        let weights = (0..in_dim * out_dim).map(|_| dist.sample(rng)).collect();

        Ok(Self {
            in_dim,
            out_dim,
            activation,
            weights,
            biases: vec![0.0; out_dim],
        })
    }

    /// Build a layer from explicit parameters (validated).
    pub fn from_parts(
        in_dim: usize,
        out_dim: usize,
        activation: Activation,
        weights: Vec<f32>,
        biases: Vec<f32>,
    ) -> Result<Self> {
        if in_dim == 0 || out_dim == 0 {
            return Err(Error::InvalidData(format!(
                "layer dims must be > 0, got in_dim={in_dim} out_dim={out_dim}"
            )));
        }
        if weights.len() != in_dim * out_dim {
            return Err(Error::ShapeMismatch(format!(
                "weights length {} does not match out_dim * in_dim ({out_dim} * {in_dim})",
                weights.len()
            )));
        }
        if biases.len() != out_dim {
            return Err(Error::ShapeMismatch(format!(
                "biases length {} does not match out_dim {out_dim}",
                biases.len()
            )));
        }
        if weights.iter().chain(&biases).any(|v| !v.is_finite()) {
            return Err(Error::InvalidData(
                "layer parameters must be finite".to_owned(),
            ));
        }

        Ok(Self {
            in_dim,
            out_dim,
            activation,
            weights,
            biases,
        })
    }

    #[inline]
    pub fn in_dim(&self) -> usize {
        self.in_dim
    }

    #[inline]
    pub fn out_dim(&self) -> usize {
        self.out_dim
    }

    #[inline]
    pub fn activation(&self) -> Activation {
        self.activation
    }

    #[inline]
    pub fn weights(&self) -> &[f32] {
        &self.weights
    }

    #[inline]
    pub fn biases(&self) -> &[f32] {
        &self.biases
    }

    #[inline]
    pub fn weights_mut(&mut self) -> &mut [f32] {
        &mut self.weights
    }

    #[inline]
    pub fn biases_mut(&mut self) -> &mut [f32] {
        &mut self.biases
    }

    /// Forward pass for a single sample.
    ///
    /// Shape contract:
    /// - `inputs.len() == self.in_dim`
    /// - `outputs.len() == self.out_dim`
    #[inline]
    pub fn forward(&self, inputs: &[f32], outputs: &mut [f32]) {
        debug_assert_eq!(inputs.len(), self.in_dim);
        debug_assert_eq!(outputs.len(), self.out_dim);

        for o in 0..self.out_dim {
            let mut sum = self.biases[o];
            let row = o * self.in_dim;
            for i in 0..self.in_dim {
                sum = self.weights[row + i].mul_add(inputs[i], sum);
            }
            outputs[o] = sum;
        }

        if self.activation.is_elementwise() {
            for y in outputs.iter_mut() {
                *y = self.activation.forward(*y);
            }
        } else {
            softmax_in_place(outputs);
        }
    }

    /// Backward pass for a single sample.
    ///
    /// Overwrite semantics: `d_inputs`, `d_weights` and `d_biases` are overwritten.
    /// `d_biases` doubles as the `dL/dz` buffer.
    ///
    /// Shape contract:
    /// - `inputs.len() == self.in_dim`, `outputs.len() == self.out_dim`
    /// - `d_outputs.len() == self.out_dim`, `d_inputs.len() == self.in_dim`
    /// - `d_weights.len() == self.weights.len()`, `d_biases.len() == self.out_dim`
    #[inline]
    pub fn backward(
        &self,
        inputs: &[f32],
        outputs: &[f32],
        d_outputs: &[f32],
        d_inputs: &mut [f32],
        d_weights: &mut [f32],
        d_biases: &mut [f32],
    ) {
        debug_assert_eq!(inputs.len(), self.in_dim);
        debug_assert_eq!(outputs.len(), self.out_dim);
        debug_assert_eq!(d_outputs.len(), self.out_dim);
        debug_assert_eq!(d_inputs.len(), self.in_dim);
        debug_assert_eq!(d_weights.len(), self.weights.len());
        debug_assert_eq!(d_biases.len(), self.out_dim);

        if self.activation.is_elementwise() {
            for o in 0..self.out_dim {
                d_biases[o] = d_outputs[o] * self.activation.grad_from_output(outputs[o]);
            }
        } else {
            // Softmax Jacobian-vector product: dz = y * (dy - <dy, y>).
            let dot: f32 = d_outputs.iter().zip(outputs).map(|(d, y)| d * y).sum();
            for o in 0..self.out_dim {
                d_biases[o] = outputs[o] * (d_outputs[o] - dot);
            }
        }

        // d_inputs accumulates contributions from all outputs.
        d_inputs.fill(0.0);

        for o in 0..self.out_dim {
            let d_z = d_biases[o];
            let row = o * self.in_dim;
            for i in 0..self.in_dim {
                let w = self.weights[row + i];
                d_weights[row + i] = d_z * inputs[i];
                d_inputs[i] = w.mul_add(d_z, d_inputs[i]);
            }
        }
    }

    /// `param -= lr * d_param`.
    #[inline]
    pub fn sgd_step(&mut self, d_weights: &[f32], d_biases: &[f32], lr: f32) {
        debug_assert_eq!(d_weights.len(), self.weights.len());
        debug_assert_eq!(d_biases.len(), self.biases.len());

        for (w, &g) in self.weights.iter_mut().zip(d_weights) {
            *w -= lr * g;
        }
        for (b, &g) in self.biases.iter_mut().zip(d_biases) {
            *b -= lr * g;
        }
    }
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    use super::*;

    #[test]
    fn from_parts_validates_lengths() {
        assert!(Layer::from_parts(2, 1, Activation::Linear, vec![1.0, 2.0], vec![0.0]).is_ok());
        assert!(matches!(
            Layer::from_parts(2, 1, Activation::Linear, vec![1.0], vec![0.0]),
            Err(Error::ShapeMismatch(_))
        ));
        assert!(Layer::from_parts(2, 1, Activation::Linear, vec![1.0, f32::NAN], vec![0.0]).is_err());
    }

    #[test]
    fn xavier_weights_stay_within_limit() {
        let mut rng = StdRng::seed_from_u64(7);
        let layer = Layer::new_with_rng(4, 6, Init::Xavier, Activation::Tanh, &mut rng).unwrap();
        let limit = (6.0_f32 / 10.0).sqrt();
        assert!(layer.weights().iter().all(|w| w.abs() <= limit));
        assert!(layer.biases().iter().all(|&b| b == 0.0));
    }

    #[test]
    fn linear_forward_is_affine() {
        let layer =
            Layer::from_parts(2, 1, Activation::Linear, vec![2.0, -1.0], vec![0.5]).unwrap();
        let mut out = [0.0_f32];
        layer.forward(&[3.0, 4.0], &mut out);
        assert!((out[0] - 2.5).abs() < 1e-6);
    }

    #[test]
    fn softmax_layer_outputs_probabilities() {
        let layer = Layer::from_parts(
            1,
            3,
            Activation::Softmax,
            vec![1.0, 0.0, -1.0],
            vec![0.0, 0.0, 0.0],
        )
        .unwrap();
        let mut out = [0.0_f32; 3];
        layer.forward(&[2.0], &mut out);
        assert!((out.iter().sum::<f32>() - 1.0).abs() < 1e-6);
        assert!(out[0] > out[1] && out[1] > out[2]);
    }
}
