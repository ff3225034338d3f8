//! Problem variants and their capability table.
//!
//! Each [`ProblemKind`] fixes what the pipeline extracts from a [`Record`] and what
//! the model is asked to predict:
//!
//! | kind        | model      | features               | label                | classes          |
//! |-------------|------------|------------------------|----------------------|------------------|
//! | house-price | regression | `sqft_living`          | `price`              | none             |
//! | waterfront  | binary     | `sqft_living`, `price` | `waterfront` (0/1)   | `0`, `1`         |
//! | bedrooms    | multiclass | `sqft_living`, `price` | one-hot class index  | `1`, `2`, `3+`   |

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::{Error, Loss, Record, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ProblemKind {
    #[default]
    HousePrice,
    Waterfront,
    Bedrooms,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelType {
    Regression,
    BinaryClassification,
    MulticlassClassification,
}

impl fmt::Display for ModelType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ModelType::Regression => "Regression",
            ModelType::BinaryClassification => "Binary Classification",
            ModelType::MulticlassClassification => "Multiclass Classification",
        })
    }
}

/// The active problem descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Problem {
    kind: ProblemKind,
}

/// A problem together with the training defaults that travel with it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Activated {
    pub problem: Problem,
    pub loss: Loss,
    pub learning_rate: f32,
}

/// A record that passed the active problem's filter, with its class name.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProblemPoint {
    pub record: Record,
    pub class_name: Option<&'static str>,
}

const SQFT_LIVING: &str = "sqft_living";
const PRICE: &str = "price";

/// Upper bound on [`Problem::feature_arity`] over every problem.
pub const MAX_FEATURES: usize = 2;

impl ProblemKind {
    pub const ALL: [ProblemKind; 3] = [
        ProblemKind::HousePrice,
        ProblemKind::Waterfront,
        ProblemKind::Bedrooms,
    ];

    pub fn name(self) -> &'static str {
        match self {
            ProblemKind::HousePrice => "house-price",
            ProblemKind::Waterfront => "waterfront",
            ProblemKind::Bedrooms => "bedrooms",
        }
    }

    /// Build the descriptor plus its recommended loss and learning rate.
    pub fn activate(self) -> Activated {
        let problem = Problem { kind: self };
        let (loss, learning_rate) = match problem.model_type() {
            ModelType::Regression => (Loss::SquaredError, 0.005),
            ModelType::BinaryClassification => (Loss::BinaryCrossEntropy, 0.01),
            ModelType::MulticlassClassification => (Loss::CategoricalCrossEntropy, 0.01),
        };
        Activated {
            problem,
            loss,
            learning_rate,
        }
    }
}

impl fmt::Display for ProblemKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ProblemKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        ProblemKind::ALL
            .into_iter()
            .find(|k| k.name().eq_ignore_ascii_case(s))
            .ok_or_else(|| Error::InvalidConfig(format!("unknown problem {s:?}")))
    }
}

impl Default for Problem {
    fn default() -> Self {
        ProblemKind::default().activate().problem
    }
}

impl Problem {
    #[inline]
    pub fn kind(&self) -> ProblemKind {
        self.kind
    }

    pub fn model_type(&self) -> ModelType {
        match self.kind {
            ProblemKind::HousePrice => ModelType::Regression,
            ProblemKind::Waterfront => ModelType::BinaryClassification,
            ProblemKind::Bedrooms => ModelType::MulticlassClassification,
        }
    }

    pub fn class_names(&self) -> &'static [&'static str] {
        match self.kind {
            ProblemKind::HousePrice => &[],
            ProblemKind::Waterfront => &["0", "1"],
            ProblemKind::Bedrooms => &["1", "2", "3+"],
        }
    }

    #[inline]
    pub fn is_classification(&self) -> bool {
        !self.class_names().is_empty()
    }

    #[inline]
    pub fn is_binary(&self) -> bool {
        self.class_names().len() == 2
    }

    #[inline]
    pub fn is_multiclass(&self) -> bool {
        self.class_names().len() > 2
    }

    /// Ordered feature column names, at most [`MAX_FEATURES`] of them.
    pub fn feature_columns(&self) -> &'static [&'static str] {
        const CLASSIFICATION: [&str; MAX_FEATURES] = [SQFT_LIVING, PRICE];
        const REGRESSION: [&str; 1] = [SQFT_LIVING];
        if self.is_classification() {
            &CLASSIFICATION
        } else {
            &REGRESSION
        }
    }

    #[inline]
    pub fn feature_arity(&self) -> usize {
        self.feature_columns().len()
    }

    /// Width of the label tensor and of the model output.
    pub fn label_arity(&self) -> usize {
        if self.is_multiclass() {
            self.class_names().len()
        } else {
            1
        }
    }

    /// Record column the class name or label is read from.
    pub fn label_column(&self) -> &'static str {
        match self.kind {
            ProblemKind::HousePrice => PRICE,
            ProblemKind::Waterfront => "waterfront",
            ProblemKind::Bedrooms => "bedrooms",
        }
    }

    /// Key the trained model is persisted under.
    pub fn storage_key(&self) -> &'static str {
        match self.kind {
            ProblemKind::HousePrice => "house_price_model",
            ProblemKind::Waterfront => "water_front_model",
            ProblemKind::Bedrooms => "bedrooms_model",
        }
    }

    /// Display label for predictions and plots.
    pub fn label(&self) -> &'static str {
        match self.kind {
            ProblemKind::HousePrice => "Price",
            ProblemKind::Waterfront => "Water front",
            ProblemKind::Bedrooms => "Bedrooms",
        }
    }

    pub fn filter(&self, record: &Record) -> bool {
        match self.kind {
            ProblemKind::Bedrooms => record.bedrooms > 0.0,
            ProblemKind::HousePrice | ProblemKind::Waterfront => true,
        }
    }

    /// Class of `record`, `None` for regression or a value outside the class list.
    pub fn class_name_for(&self, record: &Record) -> Option<&'static str> {
        let names = self.class_names();
        let idx = match self.kind {
            ProblemKind::HousePrice => return None,
            ProblemKind::Waterfront => class_slot(record.waterfront)?,
            ProblemKind::Bedrooms => {
                let n = class_slot(record.bedrooms)?.min(names.len());
                n.checked_sub(1)?
            }
        };
        names.get(idx).copied()
    }

    pub fn class_index_for(&self, name: &str) -> Result<usize> {
        self.class_names()
            .iter()
            .position(|&c| c == name)
            .ok_or_else(|| Error::NotFound(format!("class {name:?} in {}", self.kind)))
    }

    pub fn class_name(&self, index: usize) -> Result<&'static str> {
        self.class_names()
            .get(index)
            .copied()
            .ok_or_else(|| Error::NotFound(format!("class index {index} in {}", self.kind)))
    }

    /// Append the record's features in [`feature_columns`](Self::feature_columns) order.
    pub fn push_features(&self, record: &Record, out: &mut Vec<f32>) {
        out.push(record.sqft_living);
        if self.is_classification() {
            out.push(record.price);
        }
    }

    /// Annotate a record that passed the filter.
    pub fn point(&self, record: Record) -> ProblemPoint {
        ProblemPoint {
            class_name: self.class_name_for(&record),
            record,
        }
    }
}

/// Non-negative integral column value as an index.
fn class_slot(v: f32) -> Option<usize> {
    (v.is_finite() && v >= 0.0).then(|| v.floor() as usize)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rec(waterfront: f32, bedrooms: f32) -> Record {
        Record::new(1500.0, 350_000.0, waterfront, bedrooms)
    }

    #[test]
    fn capability_table() {
        let p = ProblemKind::HousePrice.activate().problem;
        assert_eq!(p.model_type(), ModelType::Regression);
        assert!(!p.is_classification());
        assert_eq!(p.feature_arity(), 1);
        assert_eq!(p.storage_key(), "house_price_model");

        let p = ProblemKind::Waterfront.activate().problem;
        assert!(p.is_binary() && !p.is_multiclass());
        assert_eq!(p.class_names(), &["0", "1"]);
        assert_eq!(p.label_arity(), 1);
        assert_eq!(p.storage_key(), "water_front_model");

        let p = ProblemKind::Bedrooms.activate().problem;
        assert!(p.is_multiclass());
        assert_eq!(p.feature_columns(), &["sqft_living", "price"]);
        assert_eq!(p.label_arity(), 3);
        assert_eq!(p.label(), "Bedrooms");
    }

    #[test]
    fn every_problem_fits_the_feature_bound() {
        for kind in ProblemKind::ALL {
            let p = kind.activate().problem;
            assert!(p.feature_arity() <= MAX_FEATURES, "{kind}");
            assert_eq!(p.feature_columns()[0], "sqft_living");
        }
        assert_eq!(
            ProblemKind::Waterfront.activate().problem.feature_arity(),
            MAX_FEATURES
        );
    }

    #[test]
    fn activation_recommends_loss_and_rate() {
        let a = ProblemKind::HousePrice.activate();
        assert_eq!(a.loss, Loss::SquaredError);
        assert!(a.learning_rate < 0.01);
        assert_eq!(ProblemKind::Waterfront.activate().loss, Loss::BinaryCrossEntropy);
        assert_eq!(
            ProblemKind::Bedrooms.activate().loss,
            Loss::CategoricalCrossEntropy
        );
    }

    #[test]
    fn bedroom_classes_cap_at_three_plus() {
        let p = ProblemKind::Bedrooms.activate().problem;
        assert_eq!(p.class_name_for(&rec(0.0, 1.0)), Some("1"));
        assert_eq!(p.class_name_for(&rec(0.0, 2.0)), Some("2"));
        assert_eq!(p.class_name_for(&rec(0.0, 3.0)), Some("3+"));
        assert_eq!(p.class_name_for(&rec(0.0, 11.0)), Some("3+"));
        assert!(!p.filter(&rec(0.0, 0.0)));
        assert!(p.filter(&rec(0.0, 1.0)));
    }

    #[test]
    fn waterfront_class_is_the_raw_value() {
        let p = ProblemKind::Waterfront.activate().problem;
        assert_eq!(p.class_name_for(&rec(1.0, 3.0)), Some("1"));
        assert_eq!(p.class_name_for(&rec(0.0, 3.0)), Some("0"));
        assert_eq!(p.class_name_for(&rec(2.0, 3.0)), None);
    }

    #[test]
    fn class_lookup_by_name() {
        let p = ProblemKind::Bedrooms.activate().problem;
        assert_eq!(p.class_index_for("3+").unwrap(), 2);
        assert!(matches!(p.class_index_for("unknown"), Err(Error::NotFound(_))));
        assert_eq!(p.class_name(0).unwrap(), "1");
        assert!(p.class_name(3).is_err());
    }

    #[test]
    fn kind_names_roundtrip() {
        for k in ProblemKind::ALL {
            assert_eq!(k.to_string().parse::<ProblemKind>().unwrap(), k);
        }
        assert!("lot-size".parse::<ProblemKind>().is_err());
    }
}
