//! Owned copies of model parameters.

use crate::{Error, Mlp, Result};

/// An independent deep copy of every layer's weights and biases.
///
/// A snapshot is never executed; it is only copied back into a model of the same
/// shape.
#[derive(Debug, Clone, PartialEq)]
pub struct WeightSnapshot {
    layers: Vec<(Vec<f32>, Vec<f32>)>,
}

impl WeightSnapshot {
    pub fn capture(model: &Mlp) -> Self {
        Self {
            layers: model
                .layers()
                .iter()
                .map(|l| (l.weights().to_vec(), l.biases().to_vec()))
                .collect(),
        }
    }

    /// Overwrite this snapshot with `model`'s current parameters, reusing buffers
    /// when the shape matches.
    pub fn copy_from(&mut self, model: &Mlp) {
        if !self.matches(model) {
            *self = Self::capture(model);
            return;
        }
        for ((w, b), layer) in self.layers.iter_mut().zip(model.layers()) {
            w.copy_from_slice(layer.weights());
            b.copy_from_slice(layer.biases());
        }
    }

    /// Copy the snapshot into `model`. Fails without touching the model when the
    /// shapes differ.
    pub fn restore_into(&self, model: &mut Mlp) -> Result<()> {
        if !self.matches(model) {
            return Err(Error::ShapeMismatch(
                "weight snapshot does not match the model's shape".to_owned(),
            ));
        }
        for (i, (w, b)) in self.layers.iter().enumerate() {
            if let Some(layer) = model.layer_mut(i) {
                layer.weights_mut().copy_from_slice(w);
                layer.biases_mut().copy_from_slice(b);
            }
        }
        Ok(())
    }

    /// True when every parameter tensor has the same length as `model`'s.
    pub fn matches(&self, model: &Mlp) -> bool {
        self.layers.len() == model.num_layers()
            && self
                .layers
                .iter()
                .zip(model.layers())
                .all(|((w, b), l)| w.len() == l.weights().len() && b.len() == l.biases().len())
    }

    /// Total number of parameters held.
    pub fn len(&self) -> usize {
        self.layers.iter().map(|(w, b)| w.len() + b.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
