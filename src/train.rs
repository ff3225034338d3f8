//! Epoch-level training, evaluation and batch inference.
//!
//! The orchestrator drives training one epoch at a time: [`Mlp::fit_epoch`] is the
//! "fit with `epochs: 1`" primitive, and the caller decides whether another epoch
//! follows.

use rand::Rng;
use rand::seq::SliceRandom;

use crate::{Error, Loss, Matrix, Metric, Mlp, OptimizerState, Result, Trainer};

/// Fraction of the training partition held back for validation each epoch.
pub const DEFAULT_VALIDATION_SPLIT: f32 = 0.2;

#[derive(Debug, Clone, Copy)]
pub struct EpochConfig {
    pub batch_size: usize,
    /// The last `validation_split` fraction of rows is scored, never fitted.
    pub validation_split: f32,
    pub loss: Loss,
    pub lr: f32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EpochReport {
    /// Mean per-sample training loss accumulated during the epoch.
    pub loss: f32,
    /// `None` when the validation slice is empty.
    pub val_loss: Option<f32>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EvalReport {
    pub loss: f32,
    pub accuracy: Option<f32>,
}

impl EpochConfig {
    fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            return Err(Error::InvalidConfig("batch_size must be > 0".to_owned()));
        }
        if !(0.0..1.0).contains(&self.validation_split) {
            return Err(Error::InvalidConfig(format!(
                "validation_split must be in [0, 1), got {}",
                self.validation_split
            )));
        }
        if !(self.lr.is_finite() && self.lr > 0.0) {
            return Err(Error::InvalidConfig("lr must be finite and > 0".to_owned()));
        }
        Ok(())
    }
}

impl Mlp {
    fn check_pair(&self, x: &Matrix, y: &Matrix) -> Result<()> {
        if x.cols() != self.input_dim() {
            return Err(Error::ShapeMismatch(format!(
                "features have {} columns, model expects {}",
                x.cols(),
                self.input_dim()
            )));
        }
        if y.cols() != self.output_dim() {
            return Err(Error::ShapeMismatch(format!(
                "labels have {} columns, model outputs {}",
                y.cols(),
                self.output_dim()
            )));
        }
        if x.rows() != y.rows() {
            return Err(Error::ShapeMismatch(format!(
                "{} feature rows vs {} label rows",
                x.rows(),
                y.rows()
            )));
        }
        Ok(())
    }

    /// Run exactly one epoch of mini-batch training.
    ///
    /// Rows `[0, fit_len)` are visited in a fresh random order; the remaining
    /// validation rows are only scored. If the split would leave nothing to fit,
    /// every row is fitted and no validation loss is reported.
    pub fn fit_epoch<R: Rng + ?Sized>(
        &mut self,
        x: &Matrix,
        y: &Matrix,
        cfg: &EpochConfig,
        opt: &mut OptimizerState,
        trainer: &mut Trainer,
        rng: &mut R,
    ) -> Result<EpochReport> {
        self.check_pair(x, y)?;
        cfg.validate()?;
        if x.is_empty() {
            return Err(Error::NotReady("training partition is empty"));
        }

        let n = x.rows();
        let mut fit_len = (n as f32 * (1.0 - cfg.validation_split)).floor() as usize;
        if fit_len == 0 {
            fit_len = n;
        }

        let mut order: Vec<usize> = (0..fit_len).collect();
        order.shuffle(rng);

        let mut total = 0.0_f32;
        for batch in order.chunks(cfg.batch_size) {
            trainer.batch.zero();
            for &idx in batch {
                let input = x.row(idx);
                self.forward(input, &mut trainer.scratch);
                total += cfg.loss.backward(
                    trainer.scratch.output(),
                    y.row(idx),
                    trainer.grads.d_output_mut(),
                );
                self.backward(input, &trainer.scratch, &mut trainer.grads);
                trainer.batch.accumulate(&trainer.grads);
            }
            trainer.batch.scale(1.0 / batch.len() as f32);
            opt.step(self, &mut trainer.batch, cfg.lr);
        }

        let loss = total / fit_len as f32;
        if !loss.is_finite() {
            return Err(Error::Training(format!("training loss became {loss}")));
        }

        let val_loss = if fit_len < n {
            let mut sum = 0.0_f32;
            for idx in fit_len..n {
                self.forward(x.row(idx), &mut trainer.scratch);
                sum += cfg.loss.forward(trainer.scratch.output(), y.row(idx));
            }
            Some(sum / (n - fit_len) as f32)
        } else {
            None
        };

        Ok(EpochReport { loss, val_loss })
    }

    /// Mean loss over a dataset, plus accuracy when `with_accuracy` is set.
    pub fn evaluate(
        &self,
        x: &Matrix,
        y: &Matrix,
        loss: Loss,
        with_accuracy: bool,
    ) -> Result<EvalReport> {
        self.check_pair(x, y)?;
        if x.is_empty() {
            return Err(Error::NotReady("evaluation partition is empty"));
        }

        let mut scratch = self.scratch();
        let mut total = 0.0_f32;
        let mut hits = 0.0_f32;
        for idx in 0..x.rows() {
            let pred = self.forward(x.row(idx), &mut scratch);
            total += loss.forward(pred, y.row(idx));
            if with_accuracy {
                hits += Metric::Accuracy.sample(pred, y.row(idx));
            }
        }

        let n = x.rows() as f32;
        Ok(EvalReport {
            loss: total / n,
            accuracy: with_accuracy.then_some(hits / n),
        })
    }

    /// Predict outputs for every row of `x`; returns a `(rows, output_dim)` matrix.
    pub fn predict(&self, x: &Matrix) -> Result<Matrix> {
        if x.cols() != self.input_dim() {
            return Err(Error::ShapeMismatch(format!(
                "inputs have {} columns, model expects {}",
                x.cols(),
                self.input_dim()
            )));
        }

        let mut scratch = self.scratch();
        let out_dim = self.output_dim();
        let mut preds = Vec::with_capacity(x.rows() * out_dim);
        for idx in 0..x.rows() {
            preds.extend_from_slice(self.forward(x.row(idx), &mut scratch));
        }
        Matrix::from_flat(preds, out_dim)
    }
}
