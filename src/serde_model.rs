//! Model serialization/deserialization.
//!
//! This module defines a versioned, stable on-disk format for `Mlp`; it is the
//! payload the artifact store keeps per problem.
//!
//! Design notes:
//! - Internal `Mlp`/`Layer` structs are not serialized directly, so the file
//!   format stays stable if the in-memory representation changes.
//! - Deserialization validates dimensions, parameter lengths, and that all
//!   parameters are finite.

use serde::{Deserialize, Serialize};

use crate::{Activation, Error, Layer, Mlp, Result};

pub const MODEL_FORMAT_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SerializedMlp {
    pub format_version: u32,
    pub layers: Vec<SerializedLayer>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SerializedLayer {
    pub in_dim: usize,
    pub out_dim: usize,
    pub activation: SerializedActivation,
    /// Row-major (out_dim, in_dim).
    pub weights: Vec<f32>,
    pub biases: Vec<f32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SerializedActivation {
    Linear,
    Relu,
    Sigmoid,
    Tanh,
    Softmax,
}

impl From<Activation> for SerializedActivation {
    fn from(value: Activation) -> Self {
        match value {
            Activation::Linear => SerializedActivation::Linear,
            Activation::ReLU => SerializedActivation::Relu,
            Activation::Sigmoid => SerializedActivation::Sigmoid,
            Activation::Tanh => SerializedActivation::Tanh,
            Activation::Softmax => SerializedActivation::Softmax,
        }
    }
}

impl From<SerializedActivation> for Activation {
    fn from(value: SerializedActivation) -> Self {
        match value {
            SerializedActivation::Linear => Activation::Linear,
            SerializedActivation::Relu => Activation::ReLU,
            SerializedActivation::Sigmoid => Activation::Sigmoid,
            SerializedActivation::Tanh => Activation::Tanh,
            SerializedActivation::Softmax => Activation::Softmax,
        }
    }
}

impl SerializedMlp {
    pub fn validate(&self) -> Result<()> {
        if self.format_version != MODEL_FORMAT_VERSION {
            return Err(Error::InvalidData(format!(
                "unsupported model format_version {}; expected {}",
                self.format_version, MODEL_FORMAT_VERSION
            )));
        }
        if self.layers.is_empty() {
            return Err(Error::InvalidData(
                "serialized model must have at least one layer".to_owned(),
            ));
        }

        for (i, layer) in self.layers.iter().enumerate() {
            layer.validate()?;

            if i > 0 {
                let prev_out = self.layers[i - 1].out_dim;
                if layer.in_dim != prev_out {
                    return Err(Error::InvalidData(format!(
                        "layer {i} in_dim {} does not match previous out_dim {}",
                        layer.in_dim, prev_out
                    )));
                }
            }
        }

        Ok(())
    }

    /// Input width of the serialized topology.
    pub fn input_dim(&self) -> Option<usize> {
        self.layers.first().map(|l| l.in_dim)
    }

    /// Output width of the serialized topology.
    pub fn output_dim(&self) -> Option<usize> {
        self.layers.last().map(|l| l.out_dim)
    }
}

impl SerializedLayer {
    fn validate(&self) -> Result<()> {
        let bad = |what: String| Err(Error::InvalidData(what));
        let (in_dim, out_dim) = (self.in_dim, self.out_dim);

        if in_dim == 0 || out_dim == 0 {
            return bad(format!("empty layer {in_dim}x{out_dim}"));
        }
        match in_dim.checked_mul(out_dim) {
            Some(n) if n == self.weights.len() => {}
            _ => {
                return bad(format!(
                    "{} weights for a {out_dim}x{in_dim} layer",
                    self.weights.len()
                ));
            }
        }
        if self.biases.len() != out_dim {
            return bad(format!("{} biases for {out_dim} outputs", self.biases.len()));
        }
        if self.activation == SerializedActivation::Softmax && out_dim < 2 {
            return bad("softmax layer needs at least 2 outputs".to_owned());
        }
        if self.weights.iter().chain(&self.biases).any(|v| !v.is_finite()) {
            return bad("parameters must contain only finite values".to_owned());
        }
        Ok(())
    }
}

impl From<&Mlp> for SerializedMlp {
    fn from(model: &Mlp) -> Self {
        Self {
            format_version: MODEL_FORMAT_VERSION,
            layers: model.layers().iter().map(SerializedLayer::from).collect(),
        }
    }
}

impl From<&Layer> for SerializedLayer {
    fn from(layer: &Layer) -> Self {
        Self {
            in_dim: layer.in_dim(),
            out_dim: layer.out_dim(),
            activation: SerializedActivation::from(layer.activation()),
            weights: layer.weights().to_vec(),
            biases: layer.biases().to_vec(),
        }
    }
}

impl TryFrom<SerializedMlp> for Mlp {
    type Error = Error;

    fn try_from(value: SerializedMlp) -> std::result::Result<Self, Self::Error> {
        value.validate()?;

        let mut layers = Vec::with_capacity(value.layers.len());
        for (i, layer) in value.layers.into_iter().enumerate() {
            let l = Layer::from_parts(
                layer.in_dim,
                layer.out_dim,
                layer.activation.into(),
                layer.weights,
                layer.biases,
            )
            .map_err(|e| Error::InvalidData(format!("layer {i} invalid: {e}")))?;
            layers.push(l);
        }

        Ok(Mlp::from_layers(layers))
    }
}

impl Mlp {
    /// Serialize the model to a pretty-printed JSON string.
    pub fn to_json_string_pretty(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(&SerializedMlp::from(self))?)
    }

    /// Parse a model from a JSON string.
    pub fn from_json_str(s: &str) -> Result<Self> {
        let ser: SerializedMlp = serde_json::from_str(s)
            .map_err(|e| Error::InvalidData(format!("failed to parse model json: {e}")))?;
        ser.try_into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn golden_model() -> Mlp {
        let l1 = Layer::from_parts(
            2,
            3,
            Activation::Sigmoid,
            vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0],
            vec![0.1, 0.2, 0.3],
        )
        .unwrap();
        let l2 = Layer::from_parts(
            3,
            2,
            Activation::Softmax,
            vec![7.0, 8.0, 9.0, -1.0, -2.0, -3.0],
            vec![0.4, -0.4],
        )
        .unwrap();
        Mlp::from_layers(vec![l1, l2])
    }

    #[test]
    fn golden_json_is_stable_and_roundtrips() {
        let json = golden_model().to_json_string_pretty().unwrap();

        let golden = include_str!(concat!(
            env!("CARGO_MANIFEST_DIR"),
            "/tests/golden/mlp_v1.json"
        ))
        .trim_end();
        assert_eq!(json, golden);

        let loaded = Mlp::from_json_str(golden).unwrap();
        assert_eq!(loaded.to_json_string_pretty().unwrap(), golden);
    }

    #[test]
    fn rejects_unknown_version() {
        let bad = r#"{"format_version":999,"layers":[]}"#;
        let err = Mlp::from_json_str(bad).unwrap_err();
        assert!(format!("{err}").contains("format_version"));
    }

    #[test]
    fn rejects_broken_chain() {
        let mut ser = SerializedMlp::from(&golden_model());
        ser.layers[1].in_dim = 4;
        ser.layers[1].weights = vec![0.0; 8];
        assert!(matches!(ser.validate(), Err(Error::InvalidData(_))));
    }
}
