//! Hyperparameters and the effects of editing them.
//!
//! `Hyperparameters` is a plain value. Editing it goes through
//! [`Hyperparameters::apply`], which returns the edited copy plus the [`Effect`]
//! the owner has to carry out (re-split the data, recompile, recreate the model).

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::{Activation, Error, Loss, Optimizer, Result};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default, deny_unknown_fields)]
pub struct Hyperparameters {
    /// Units in each of the two hidden layers.
    #[serde(alias = "hiddenLayers")]
    pub hidden_units: usize,
    #[serde(alias = "activationFunction")]
    pub activation: Activation,
    #[serde(alias = "lossFunction")]
    pub loss: Loss,
    pub optimizer: Optimizer,
    pub learning_rate: f32,
    /// Percentage of points used for training, `1..=99`.
    pub train_test_ratio: u8,
    pub batch_size: usize,
}

impl Default for Hyperparameters {
    fn default() -> Self {
        Self {
            hidden_units: 10,
            activation: Activation::Sigmoid,
            loss: Loss::SquaredError,
            optimizer: Optimizer::Adam,
            learning_rate: 0.05,
            train_test_ratio: 50,
            batch_size: 32,
        }
    }
}

/// One hyperparameter edit.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Setting {
    HiddenUnits(usize),
    Activation(Activation),
    Loss(Loss),
    Optimizer(Optimizer),
    LearningRate(f32),
    TrainTestRatio(u8),
    BatchSize(usize),
}

/// What the owner of the hyperparameters must do after an edit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Effect {
    /// Nothing to rebuild; the value is read on the next epoch.
    None,
    /// Re-partition the normalized data.
    Resplit,
    /// Rebuild loss and optimizer, keep weights.
    Recompile,
    /// Build a fresh model.
    Recreate,
    /// Build a fresh model of the same shape and copy the old weights into it.
    RecreateKeepingWeights,
}

impl Hyperparameters {
    pub fn validate(&self) -> Result<()> {
        if self.hidden_units == 0 {
            return Err(Error::InvalidConfig("hiddenUnits must be > 0".to_owned()));
        }
        if !Activation::CONFIGURABLE.contains(&self.activation) {
            return Err(Error::InvalidConfig(format!(
                "activation {} cannot be used for hidden layers",
                self.activation
            )));
        }
        if !(self.learning_rate.is_finite() && self.learning_rate > 0.0) {
            return Err(Error::InvalidConfig(format!(
                "learningRate must be finite and > 0, got {}",
                self.learning_rate
            )));
        }
        if !(1..=99).contains(&self.train_test_ratio) {
            return Err(Error::InvalidConfig(format!(
                "trainTestRatio must be in 1..=99, got {}",
                self.train_test_ratio
            )));
        }
        if self.batch_size == 0 {
            return Err(Error::InvalidConfig("batchSize must be > 0".to_owned()));
        }
        Ok(())
    }

    /// Apply one edit. `self` is left untouched; an invalid edit is an error.
    pub fn apply(&self, setting: Setting) -> Result<(Self, Effect)> {
        let mut next = *self;
        let effect = match setting {
            Setting::HiddenUnits(v) => {
                next.hidden_units = v;
                Effect::Recreate
            }
            Setting::Activation(v) => {
                next.activation = v;
                Effect::RecreateKeepingWeights
            }
            Setting::Loss(v) => {
                next.loss = v;
                Effect::Recompile
            }
            Setting::Optimizer(v) => {
                next.optimizer = v;
                Effect::Recompile
            }
            Setting::LearningRate(v) => {
                next.learning_rate = v;
                Effect::Recompile
            }
            Setting::TrainTestRatio(v) => {
                next.train_test_ratio = v;
                Effect::Resplit
            }
            Setting::BatchSize(v) => {
                next.batch_size = v;
                Effect::None
            }
        };
        next.validate()?;

        if next == *self {
            return Ok((next, Effect::None));
        }
        Ok((next, effect))
    }

    pub fn from_json_str(s: &str) -> Result<Self> {
        let hp: Self = serde_json::from_str(s)
            .map_err(|e| Error::InvalidConfig(format!("hyperparameters: {e}")))?;
        hp.validate()?;
        Ok(hp)
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::from_json_str(&std::fs::read_to_string(path)?)
    }
}

impl fmt::Display for Setting {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Setting::HiddenUnits(v) => write!(f, "hiddenUnits={v}"),
            Setting::Activation(v) => write!(f, "activation={v}"),
            Setting::Loss(v) => write!(f, "loss={v}"),
            Setting::Optimizer(v) => write!(f, "optimizer={v}"),
            Setting::LearningRate(v) => write!(f, "learningRate={v}"),
            Setting::TrainTestRatio(v) => write!(f, "trainTestRatio={v}"),
            Setting::BatchSize(v) => write!(f, "batchSize={v}"),
        }
    }
}

/// Parses `name=value`, e.g. `learningRate=0.01`.
impl FromStr for Setting {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let (name, value) = s
            .split_once('=')
            .ok_or_else(|| Error::InvalidConfig(format!("expected name=value, got {s:?}")))?;
        let value = value.trim();
        let bad = |e: &dyn fmt::Display| Error::InvalidConfig(format!("{name}: {e}"));

        Ok(match name.trim() {
            "hiddenUnits" | "hiddenLayers" => {
                Setting::HiddenUnits(value.parse().map_err(|e| bad(&e))?)
            }
            "activation" | "activationFunction" => Setting::Activation(value.parse()?),
            "loss" | "lossFunction" => Setting::Loss(value.parse()?),
            "optimizer" => Setting::Optimizer(value.parse()?),
            "learningRate" => Setting::LearningRate(value.parse().map_err(|e| bad(&e))?),
            "trainTestRatio" => Setting::TrainTestRatio(value.parse().map_err(|e| bad(&e))?),
            "batchSize" => Setting::BatchSize(value.parse().map_err(|e| bad(&e))?),
            other => return Err(Error::InvalidConfig(format!("unknown setting {other:?}"))),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let hp = Hyperparameters::default();
        hp.validate().unwrap();
        assert_eq!(hp.hidden_units, 10);
        assert_eq!(hp.activation, Activation::Sigmoid);
        assert_eq!(hp.train_test_ratio, 50);
    }

    #[test]
    fn effect_table() {
        let hp = Hyperparameters::default();
        let cases = [
            (Setting::HiddenUnits(20), Effect::Recreate),
            (Setting::Activation(Activation::ReLU), Effect::RecreateKeepingWeights),
            (Setting::Loss(Loss::BinaryCrossEntropy), Effect::Recompile),
            (Setting::Optimizer(Optimizer::Sgd), Effect::Recompile),
            (Setting::LearningRate(0.01), Effect::Recompile),
            (Setting::TrainTestRatio(66), Effect::Resplit),
            (Setting::BatchSize(8), Effect::None),
        ];
        for (setting, expected) in cases {
            let (next, effect) = hp.apply(setting).unwrap();
            assert_eq!(effect, expected, "{setting}");
            assert_ne!(next, hp);
        }
    }

    #[test]
    fn unchanged_value_has_no_effect() {
        let hp = Hyperparameters::default();
        let (next, effect) = hp.apply(Setting::HiddenUnits(10)).unwrap();
        assert_eq!(next, hp);
        assert_eq!(effect, Effect::None);
    }

    #[test]
    fn invalid_edits_are_rejected() {
        let hp = Hyperparameters::default();
        assert!(hp.apply(Setting::HiddenUnits(0)).is_err());
        assert!(hp.apply(Setting::TrainTestRatio(0)).is_err());
        assert!(hp.apply(Setting::TrainTestRatio(100)).is_err());
        assert!(hp.apply(Setting::LearningRate(-1.0)).is_err());
        assert!(hp.apply(Setting::LearningRate(f32::NAN)).is_err());
        assert!(hp.apply(Setting::BatchSize(0)).is_err());
        assert!(hp.apply(Setting::Activation(Activation::Softmax)).is_err());
    }

    #[test]
    fn json_uses_camel_case_and_fills_defaults() {
        let hp = Hyperparameters::from_json_str(
            r#"{"hiddenLayers": 16, "activation": "relu", "learningRate": 0.01}"#,
        )
        .unwrap();
        assert_eq!(hp.hidden_units, 16);
        assert_eq!(hp.activation, Activation::ReLU);
        assert_eq!(hp.batch_size, 32);

        assert!(Hyperparameters::from_json_str(r#"{"epochs": 3}"#).is_err());
        assert!(Hyperparameters::from_json_str(r#"{"trainTestRatio": 0}"#).is_err());
    }

    #[test]
    fn settings_parse_from_name_value() {
        assert_eq!(
            "learningRate=0.01".parse::<Setting>().unwrap(),
            Setting::LearningRate(0.01)
        );
        assert_eq!(
            "optimizer=rmsprop".parse::<Setting>().unwrap(),
            Setting::Optimizer(Optimizer::RmsProp)
        );
        assert!("batchSize".parse::<Setting>().is_err());
        assert!("momentum=0.9".parse::<Setting>().is_err());
        assert!("batchSize=lots".parse::<Setting>().is_err());
    }
}
