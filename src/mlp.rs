use crate::Layer;

/// A sequential stack of dense layers.
///
/// Always holds at least one layer; construct it with [`crate::MlpBuilder`] or
/// [`Mlp::from_layers`].
#[derive(Debug, Clone)]
pub struct Mlp {
    layers: Vec<Layer>,
}

/// Reusable buffers for `Mlp::forward`.
///
/// The output of the most recent forward pass lives inside `Scratch`.
#[derive(Debug, Clone)]
pub struct Scratch {
    layer_outputs: Vec<Vec<f32>>,
}

/// Parameter gradients for an `Mlp`.
///
/// `Mlp::backward` overwrites them for one sample; [`Gradients::accumulate`] sums
/// samples into a batch buffer.
#[derive(Debug, Clone)]
pub struct Gradients {
    d_weights: Vec<Vec<f32>>,
    d_biases: Vec<Vec<f32>>,

    // Gradient w.r.t each layer output, including the final one; `backward` reads
    // the upstream gradient from the last entry.
    d_layer_outputs: Vec<Vec<f32>>,

    d_input: Vec<f32>,
}

impl Mlp {
    /// Wrap already-built layers.
    ///
    /// Panics if `layers` is empty or consecutive dims do not chain; callers
    /// (the builder and the deserializer) validate first.
    pub fn from_layers(layers: Vec<Layer>) -> Self {
        assert!(!layers.is_empty(), "mlp must have at least one layer");
        for pair in layers.windows(2) {
            assert_eq!(
                pair[0].out_dim(),
                pair[1].in_dim(),
                "layer out_dim {} does not match next in_dim {}",
                pair[0].out_dim(),
                pair[1].in_dim()
            );
        }
        Self { layers }
    }

    #[inline]
    pub fn input_dim(&self) -> usize {
        self.layers[0].in_dim()
    }

    #[inline]
    pub fn output_dim(&self) -> usize {
        self.layers[self.layers.len() - 1].out_dim()
    }

    #[inline]
    pub fn num_layers(&self) -> usize {
        self.layers.len()
    }

    #[inline]
    pub fn layer(&self, idx: usize) -> Option<&Layer> {
        self.layers.get(idx)
    }

    #[inline]
    pub fn layer_mut(&mut self, idx: usize) -> Option<&mut Layer> {
        self.layers.get_mut(idx)
    }

    #[inline]
    pub fn layers(&self) -> &[Layer] {
        &self.layers
    }

    /// Total number of trainable scalars.
    pub fn num_params(&self) -> usize {
        self.layers
            .iter()
            .map(|l| l.weights().len() + l.biases().len())
            .sum()
    }

    pub fn scratch(&self) -> Scratch {
        Scratch::new(self)
    }

    pub fn gradients(&self) -> Gradients {
        Gradients::new(self)
    }

    /// Convenience constructor: allocate all training buffers.
    #[inline]
    pub fn trainer(&self) -> Trainer {
        Trainer::new(self)
    }

    /// Forward pass for a single sample.
    ///
    /// Writes intermediate activations into `scratch` and returns the final output slice.
    ///
    /// Shape contract:
    /// - `input.len() == self.input_dim()`
    /// - `scratch` must be built for this `Mlp`
    pub fn forward<'a>(&self, input: &[f32], scratch: &'a mut Scratch) -> &'a [f32] {
        assert_eq!(
            input.len(),
            self.input_dim(),
            "input len {} does not match model input_dim {}",
            input.len(),
            self.input_dim()
        );
        assert_eq!(
            scratch.layer_outputs.len(),
            self.layers.len(),
            "scratch has {} layer outputs, model has {} layers",
            scratch.layer_outputs.len(),
            self.layers.len()
        );

        for (idx, layer) in self.layers.iter().enumerate() {
            if idx == 0 {
                layer.forward(input, &mut scratch.layer_outputs[0]);
            } else {
                // Borrow the previous output immutably and the current output mutably.
                let (left, right) = scratch.layer_outputs.split_at_mut(idx);
                let out = &mut right[0];
                assert_eq!(
                    out.len(),
                    layer.out_dim(),
                    "scratch layer {idx} output len {} does not match layer out_dim {}",
                    out.len(),
                    layer.out_dim()
                );
                layer.forward(&left[idx - 1], out);
            }
        }

        scratch.output()
    }

    /// Backward pass for a single sample.
    ///
    /// Call `forward` first with the same `input` and `scratch`, then write
    /// `dL/d(output)` into `grads.d_output_mut()`.
    ///
    /// Returns dL/d(input).
    pub fn backward<'a>(
        &self,
        input: &[f32],
        scratch: &Scratch,
        grads: &'a mut Gradients,
    ) -> &'a [f32] {
        assert_eq!(
            input.len(),
            self.input_dim(),
            "input len {} does not match model input_dim {}",
            input.len(),
            self.input_dim()
        );
        assert_eq!(
            grads.d_weights.len(),
            self.layers.len(),
            "grads has {} d_weights entries, model has {} layers",
            grads.d_weights.len(),
            self.layers.len()
        );

        for idx in (0..self.layers.len()).rev() {
            let layer = &self.layers[idx];

            let layer_input: &[f32] = if idx == 0 {
                input
            } else {
                &scratch.layer_outputs[idx - 1]
            };
            let layer_output: &[f32] = &scratch.layer_outputs[idx];

            if idx == 0 {
                layer.backward(
                    layer_input,
                    layer_output,
                    &grads.d_layer_outputs[0],
                    &mut grads.d_input,
                    &mut grads.d_weights[0],
                    &mut grads.d_biases[0],
                );
            } else {
                // `d_inputs` of this layer is `d_outputs` of the previous one.
                let (left, right) = grads.d_layer_outputs.split_at_mut(idx);
                layer.backward(
                    layer_input,
                    layer_output,
                    &right[0],
                    &mut left[idx - 1],
                    &mut grads.d_weights[idx],
                    &mut grads.d_biases[idx],
                );
            }
        }

        &grads.d_input
    }

    /// Applies an SGD update to all layers.
    #[inline]
    pub fn sgd_step(&mut self, grads: &Gradients, lr: f32) {
        assert!(
            lr.is_finite() && lr > 0.0,
            "learning rate must be finite and > 0"
        );
        assert_eq!(
            self.layers.len(),
            grads.d_weights.len(),
            "grads has {} d_weights entries, model has {} layers",
            grads.d_weights.len(),
            self.layers.len()
        );

        for (i, layer) in self.layers.iter_mut().enumerate() {
            layer.sgd_step(&grads.d_weights[i], &grads.d_biases[i], lr);
        }
    }
}

/// Reusable buffers for training a specific `Mlp`.
///
/// `grads` receives one sample at a time; `batch` accumulates the mini-batch.
#[derive(Debug, Clone)]
pub struct Trainer {
    pub scratch: Scratch,
    pub grads: Gradients,
    pub batch: Gradients,
}

impl Trainer {
    pub fn new(mlp: &Mlp) -> Self {
        Self {
            scratch: Scratch::new(mlp),
            grads: Gradients::new(mlp),
            batch: Gradients::new(mlp),
        }
    }
}

impl Scratch {
    pub fn new(mlp: &Mlp) -> Self {
        let layer_outputs = mlp
            .layers
            .iter()
            .map(|layer| vec![0.0; layer.out_dim()])
            .collect();
        Self { layer_outputs }
    }

    #[inline]
    pub fn output(&self) -> &[f32] {
        self.layer_outputs
            .last()
            .map(Vec::as_slice)
            .unwrap_or_default()
    }
}

impl Gradients {
    pub fn new(mlp: &Mlp) -> Self {
        let mut d_weights = Vec::with_capacity(mlp.layers.len());
        let mut d_biases = Vec::with_capacity(mlp.layers.len());
        let mut d_layer_outputs = Vec::with_capacity(mlp.layers.len());

        for layer in &mlp.layers {
            d_weights.push(vec![0.0; layer.in_dim() * layer.out_dim()]);
            d_biases.push(vec![0.0; layer.out_dim()]);
            d_layer_outputs.push(vec![0.0; layer.out_dim()]);
        }

        Self {
            d_weights,
            d_biases,
            d_layer_outputs,
            d_input: vec![0.0; mlp.input_dim()],
        }
    }

    /// Mutable view of the upstream gradient buffer for the final model output.
    #[inline]
    pub fn d_output_mut(&mut self) -> &mut [f32] {
        self.d_layer_outputs
            .last_mut()
            .map(Vec::as_mut_slice)
            .unwrap_or_default()
    }

    #[inline]
    pub fn d_input(&self) -> &[f32] {
        &self.d_input
    }

    #[inline]
    pub fn d_weights(&self, layer_idx: usize) -> &[f32] {
        &self.d_weights[layer_idx]
    }

    #[inline]
    pub fn d_biases(&self, layer_idx: usize) -> &[f32] {
        &self.d_biases[layer_idx]
    }

    #[inline]
    pub fn d_weights_mut(&mut self, layer_idx: usize) -> &mut [f32] {
        &mut self.d_weights[layer_idx]
    }

    #[inline]
    pub fn d_biases_mut(&mut self, layer_idx: usize) -> &mut [f32] {
        &mut self.d_biases[layer_idx]
    }

    /// Zero all parameter gradients.
    pub fn zero(&mut self) {
        for g in self.d_weights.iter_mut().chain(self.d_biases.iter_mut()) {
            g.fill(0.0);
        }
    }

    /// `self += other` over parameter gradients.
    pub fn accumulate(&mut self, other: &Gradients) {
        for (dst, src) in self.d_weights.iter_mut().zip(&other.d_weights) {
            for (d, s) in dst.iter_mut().zip(src) {
                *d += s;
            }
        }
        for (dst, src) in self.d_biases.iter_mut().zip(&other.d_biases) {
            for (d, s) in dst.iter_mut().zip(src) {
                *d += s;
            }
        }
    }

    /// Multiply all parameter gradients by `factor`.
    pub fn scale(&mut self, factor: f32) {
        for g in self.d_weights.iter_mut().chain(self.d_biases.iter_mut()) {
            for v in g.iter_mut() {
                *v *= factor;
            }
        }
    }
}
