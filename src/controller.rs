//! Model lifecycle: create, compile, train, test, persist, predict.
//!
//! `ModelController` owns the live model, its compiled loss/optimizer, the best
//! weights seen so far and the [`TrainingState`] counters. It borrows the
//! [`DataPipeline`] for tensors and normalizers on every call, so a rebuild of the
//! data can never happen under a running training loop.
//!
//! Training runs until paused. The loop checks a shared [`TrainingSwitch`] between
//! epochs only; pausing never interrupts an epoch in flight.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use log::{debug, info, warn};
use rand::SeedableRng;
use rand::rngs::StdRng;

use crate::problem::MAX_FEATURES;
use crate::serde_model::SerializedMlp;
use crate::store::ArtifactStore;
use crate::train::{DEFAULT_VALIDATION_SPLIT, EpochConfig, EpochReport};
use crate::visual::{Plot, Visualizer};
use crate::{
    Activation, DataPipeline, Error, Hyperparameters, Loss, Matrix, Mlp, MlpBuilder,
    OptimizerState, Result, Trainer, WeightSnapshot,
};

/// Points on the regression prediction line.
const LINE_POINTS: usize = 100;
/// Cells per side of the classification heatmap.
const GRID_SIZE: usize = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControllerState {
    Uninitialized,
    Ready,
    Training,
    Trained,
}

/// Progress counters, reset whenever a new model is created.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct TrainingState {
    pub in_progress: bool,
    pub current_epoch: u64,
    pub current_loss: Option<f32>,
    pub min_loss: Option<f32>,
    pub elapsed_ms: u64,
}

/// Shared on/off flag for the training loop.
///
/// Clones share the flag, so a handle can be moved into a signal handler or UI
/// task and used to pause a loop running elsewhere.
#[derive(Debug, Clone, Default)]
pub struct TrainingSwitch(Arc<AtomicBool>);

impl TrainingSwitch {
    #[inline]
    pub fn is_on(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    /// Stop the loop at the next epoch boundary.
    pub fn pause(&self) {
        self.0.store(false, Ordering::Release);
    }

    /// Turn the switch on. Returns `false` if it already was.
    fn start(&self) -> bool {
        self.0
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }
}

/// Switches training off on every exit path of the loop.
struct SwitchGuard<'a>(&'a TrainingSwitch);

impl Drop for SwitchGuard<'_> {
    fn drop(&mut self) {
        self.0.pause();
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrainOutcome {
    pub min_training_loss: Option<f32>,
    pub last_validation_loss: Option<f32>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TestReport {
    pub loss: f32,
    /// Only for classification problems.
    pub accuracy: Option<f32>,
}

/// One named output of [`ModelController::predict`].
#[derive(Debug, Clone, PartialEq)]
pub struct Prediction {
    pub name: String,
    /// Price in dollars for regression, percentage for classification.
    pub value: f32,
    pub display: String,
}

#[derive(Debug)]
struct Compiled {
    model: Mlp,
    loss: Loss,
    optimizer: OptimizerState,
    learning_rate: f32,
    trainer: Trainer,
}

#[derive(Debug)]
pub struct ModelController {
    compiled: Option<Compiled>,
    best: Option<WeightSnapshot>,
    training: TrainingState,
    state: ControllerState,
    switch: TrainingSwitch,
    rng: StdRng,
    generation: u64,
}

impl Default for ModelController {
    fn default() -> Self {
        Self::with_rng(StdRng::from_entropy())
    }
}

impl ModelController {
    pub fn new() -> Self {
        Self::default()
    }

    /// A controller whose weight init and batch order are reproducible.
    pub fn with_seed(seed: u64) -> Self {
        Self::with_rng(StdRng::seed_from_u64(seed))
    }

    fn with_rng(rng: StdRng) -> Self {
        Self {
            compiled: None,
            best: None,
            training: TrainingState::default(),
            state: ControllerState::Uninitialized,
            switch: TrainingSwitch::default(),
            rng,
            generation: 0,
        }
    }

    #[inline]
    pub fn state(&self) -> ControllerState {
        self.state
    }

    #[inline]
    pub fn training_state(&self) -> &TrainingState {
        &self.training
    }

    /// A handle to pause the training loop from elsewhere.
    pub fn switch(&self) -> TrainingSwitch {
        self.switch.clone()
    }

    pub fn model(&self) -> Option<&Mlp> {
        self.compiled.as_ref().map(|c| &c.model)
    }

    pub fn best_weights(&self) -> Option<&WeightSnapshot> {
        self.best.as_ref()
    }

    pub fn loss(&self) -> Option<Loss> {
        self.compiled.as_ref().map(|c| c.loss)
    }

    pub fn learning_rate(&self) -> Option<f32> {
        self.compiled.as_ref().map(|c| c.learning_rate)
    }

    pub fn optimizer(&self) -> Option<&OptimizerState> {
        self.compiled.as_ref().map(|c| &c.optimizer)
    }

    /// Number of models created or loaded so far.
    #[inline]
    pub fn generation(&self) -> u64 {
        self.generation
    }

    fn compiled(&self) -> Result<&Compiled> {
        self.compiled.as_ref().ok_or(Error::NotReady("no model"))
    }

    /// Build a fresh model for the pipeline's active problem and compile it.
    pub fn create(
        &mut self,
        pipeline: &DataPipeline,
        hp: &Hyperparameters,
        viz: &mut dyn Visualizer,
    ) -> Result<()> {
        hp.validate()?;
        let problem = pipeline.problem();
        let input_dim = pipeline.training_features()?.cols();
        if input_dim != problem.feature_arity() {
            return Err(Error::ShapeMismatch(format!(
                "pipeline has {input_dim} feature columns, {} expects {}",
                problem.kind(),
                problem.feature_arity()
            )));
        }

        let output_activation = if problem.is_multiclass() {
            Activation::Softmax
        } else {
            hp.activation
        };
        let model = MlpBuilder::new(input_dim)?
            .add_layer(hp.hidden_units, hp.activation)?
            .add_layer(hp.hidden_units, hp.activation)?
            .add_layer(problem.label_arity(), output_activation)?
            .build_with_rng(&mut self.rng)?;

        self.install(model, hp)?;
        self.training = TrainingState::default();
        self.log_summary();
        self.plot_prediction(pipeline, viz)
    }

    /// Swap in `model` with a freshly compiled loss and optimizer.
    fn install(&mut self, model: Mlp, hp: &Hyperparameters) -> Result<()> {
        check_loss(hp.loss, &model)?;
        self.compiled = Some(Compiled {
            loss: hp.loss,
            optimizer: hp.optimizer.state(&model),
            learning_rate: hp.learning_rate,
            trainer: model.trainer(),
            model,
        });
        self.best = None;
        self.state = ControllerState::Ready;
        self.generation += 1;
        Ok(())
    }

    /// Rebuild loss and optimizer in place, keeping the weights. Creates a model
    /// when there is none.
    pub fn compile(
        &mut self,
        pipeline: &DataPipeline,
        hp: &Hyperparameters,
        viz: &mut dyn Visualizer,
    ) -> Result<()> {
        if self.compiled.is_none() {
            return self.create(pipeline, hp, viz);
        }
        hp.validate()?;
        let compiled = self.compiled.as_mut().ok_or(Error::NotReady("no model"))?;
        check_loss(hp.loss, &compiled.model)?;

        compiled.loss = hp.loss;
        compiled.optimizer = hp.optimizer.state(&compiled.model);
        compiled.learning_rate = hp.learning_rate;
        debug!(
            "compiled loss={} optimizer={} lr={}",
            hp.loss, hp.optimizer, hp.learning_rate
        );
        Ok(())
    }

    /// Copy `snapshot` into the live model.
    pub fn restore_weights(&mut self, snapshot: &WeightSnapshot) -> Result<()> {
        let compiled = self.compiled.as_mut().ok_or(Error::NotReady("no model"))?;
        snapshot.restore_into(&mut compiled.model)
    }

    /// Roll the live model back to the lowest-loss weights seen.
    pub fn restore_best(&mut self) -> Result<()> {
        let best = self
            .best
            .as_ref()
            .ok_or(Error::NotReady("no best weights recorded"))?;
        let compiled = self.compiled.as_mut().ok_or(Error::NotReady("no model"))?;
        best.restore_into(&mut compiled.model)
    }

    /// Train until the switch is paused.
    ///
    /// Calling this while the switch is already on pauses the running loop and
    /// returns the current figures. Between epochs the loop yields to the runtime,
    /// which is when other tasks get to flip the switch.
    pub async fn train(
        &mut self,
        pipeline: &DataPipeline,
        hp: &Hyperparameters,
        viz: &mut dyn Visualizer,
    ) -> Result<TrainOutcome> {
        let switch = self.switch.clone();
        if !switch.start() {
            info!("training already running; pausing");
            switch.pause();
            return Ok(TrainOutcome {
                min_training_loss: self.training.min_loss,
                last_validation_loss: None,
            });
        }
        let _guard = SwitchGuard(&switch);

        if self.compiled.is_none() {
            self.create(pipeline, hp, viz)?;
        }

        self.state = ControllerState::Training;
        self.training.in_progress = true;
        info!("training started at epoch {}", self.training.current_epoch);

        let mut last_validation_loss = None;
        while switch.is_on() {
            match self.step_epoch(pipeline, hp, viz) {
                Ok(report) => last_validation_loss = report.val_loss,
                Err(e) => {
                    warn!("training stopped: {e}");
                    self.finish_training();
                    return Err(e);
                }
            }
            tokio::task::yield_now().await;
        }

        self.finish_training();
        info!(
            "training paused at epoch {} (min loss {:?})",
            self.training.current_epoch, self.training.min_loss
        );
        self.plot_prediction(pipeline, viz)?;
        Ok(TrainOutcome {
            min_training_loss: self.training.min_loss,
            last_validation_loss,
        })
    }

    fn finish_training(&mut self) {
        self.training.in_progress = false;
        self.state = if self.training.current_epoch > 0 {
            ControllerState::Trained
        } else {
            ControllerState::Ready
        };
    }

    /// Run exactly one epoch and do the per-epoch bookkeeping.
    pub fn step_epoch(
        &mut self,
        pipeline: &DataPipeline,
        hp: &Hyperparameters,
        viz: &mut dyn Visualizer,
    ) -> Result<EpochReport> {
        let started = Instant::now();
        let features = pipeline.training_features()?;
        let labels = pipeline.training_labels()?;
        let compiled = self.compiled.as_mut().ok_or(Error::NotReady("no model"))?;

        let cfg = EpochConfig {
            batch_size: hp.batch_size,
            validation_split: DEFAULT_VALIDATION_SPLIT,
            loss: compiled.loss,
            lr: compiled.learning_rate,
        };
        let report = compiled.model.fit_epoch(
            features,
            labels,
            &cfg,
            &mut compiled.optimizer,
            &mut compiled.trainer,
            &mut self.rng,
        )?;

        if self.training.min_loss.is_none_or(|min| report.loss < min) {
            self.training.min_loss = Some(report.loss);
            match self.best.as_mut() {
                Some(best) => best.copy_from(&compiled.model),
                None => self.best = Some(WeightSnapshot::capture(&compiled.model)),
            }
        }
        self.training.current_epoch += 1;
        self.training.current_loss = Some(report.loss);
        self.training.elapsed_ms += started.elapsed().as_millis() as u64;

        self.plot_prediction(pipeline, viz)?;
        viz.progress(&self.training);
        Ok(report)
    }

    /// Compiled loss over the held-out partition.
    pub fn test(&self, pipeline: &DataPipeline) -> Result<TestReport> {
        let compiled = self.compiled()?;
        let report = compiled.model.evaluate(
            pipeline.testing_features()?,
            pipeline.testing_labels()?,
            compiled.loss,
            pipeline.problem().is_classification(),
        )?;
        info!("testing set loss: {}", report.loss);
        Ok(TestReport {
            loss: report.loss,
            accuracy: report.accuracy,
        })
    }

    /// Persist the model under the active problem's key. Returns the save time.
    pub fn save(&self, pipeline: &DataPipeline, store: &mut dyn ArtifactStore) -> Result<u64> {
        let compiled = self.compiled()?;
        let key = pipeline.problem().storage_key();
        let saved_at = store.put(key, &SerializedMlp::from(&compiled.model))?;
        info!("saved model to {key}");
        Ok(saved_at)
    }

    pub fn model_saved(&self, pipeline: &DataPipeline, store: &dyn ArtifactStore) -> bool {
        store.exists(pipeline.problem().storage_key())
    }

    /// Replace the model with the one stored for the active problem.
    ///
    /// Epoch and elapsed-time counters carry on. The best-loss record is cleared
    /// since it belonged to the replaced weights.
    pub fn load(
        &mut self,
        pipeline: &DataPipeline,
        hp: &Hyperparameters,
        store: &dyn ArtifactStore,
        viz: &mut dyn Visualizer,
    ) -> Result<u64> {
        let problem = pipeline.problem();
        let stored = store.get(problem.storage_key())?;
        let model = Mlp::try_from(stored.model)?;
        if model.input_dim() != problem.feature_arity()
            || model.output_dim() != problem.label_arity()
        {
            return Err(Error::ShapeMismatch(format!(
                "stored model is {}->{}, {} needs {}->{}",
                model.input_dim(),
                model.output_dim(),
                problem.kind(),
                problem.feature_arity(),
                problem.label_arity()
            )));
        }

        self.install(model, hp)?;
        self.training.min_loss = None;
        info!("loaded model from {}", problem.storage_key());
        self.log_summary();
        self.plot_prediction(pipeline, viz)?;
        Ok(stored.saved_at_ms)
    }

    /// Denormalized prediction for raw text inputs, one per feature column.
    ///
    /// Inputs are validated before anything is allocated.
    pub fn predict(&self, pipeline: &DataPipeline, inputs: &[&str]) -> Result<Vec<Prediction>> {
        let problem = pipeline.problem();
        let columns = problem.feature_columns();
        if inputs.len() != columns.len() {
            return Err(Error::InvalidInput {
                field: "input",
                reason: "expected one value per feature column",
            });
        }
        debug_assert!(columns.len() <= MAX_FEATURES);
        let mut values = [0.0_f32; MAX_FEATURES];
        for ((slot, raw), &field) in values.iter_mut().zip(inputs).zip(columns) {
            *slot = parse_input(raw, field)?;
        }

        let compiled = self.compiled()?;
        let input = Matrix::from_flat(values[..columns.len()].to_vec(), columns.len())?;
        let normalized = pipeline.normalize_feature(&input)?;
        let output = compiled.model.predict(&normalized)?;
        let denormalized = pipeline.denormalize_label(&output)?;
        let scores = denormalized.row(0);

        if !problem.is_classification() {
            let price = (scores[0] / 1000.0).round() * 1000.0;
            return Ok(vec![Prediction {
                name: problem.label().to_owned(),
                value: price,
                display: format!("${price:.0}"),
            }]);
        }

        scores
            .iter()
            .enumerate()
            .map(|(i, &score)| {
                let name = if problem.is_multiclass() {
                    format!("{} {}", problem.class_name(i)?, problem.label())
                } else {
                    problem.label().to_owned()
                };
                let pct = score * 100.0;
                Ok(Prediction {
                    name,
                    value: pct,
                    display: format!("{pct:.1}%"),
                })
            })
            .collect()
    }

    /// Send the current prediction plot: a line for regression, one heatmap per
    /// output for classification.
    pub fn plot_prediction(&self, pipeline: &DataPipeline, viz: &mut dyn Visualizer) -> Result<()> {
        let model = &self.compiled()?.model;
        let problem = pipeline.problem();

        if !problem.is_classification() {
            let xs = Matrix::linspace(0.0, 1.0, LINE_POINTS);
            let ys = model.predict(&xs)?;
            let sqft = pipeline.denormalize_feature(&xs, None)?;
            let price = pipeline.denormalize_label(&ys)?;
            let points = sqft
                .as_slice()
                .iter()
                .copied()
                .zip(price.as_slice().iter().copied())
                .collect();
            viz.render(Plot::PredictionLine { points });
            return Ok(());
        }

        // Column-major grid: x grows left to right, y shrinks top to bottom.
        let step = 1.0 / GRID_SIZE as f32;
        let mut grid = Vec::with_capacity(GRID_SIZE * GRID_SIZE * 2);
        for col in 0..GRID_SIZE {
            for row in 0..GRID_SIZE {
                grid.push(col as f32 * step);
                grid.push((GRID_SIZE - row) as f32 * step);
            }
        }
        let outputs = model.predict(&Matrix::from_flat(grid, 2)?)?;

        let axis = Matrix::linspace(0.0, 1.0, GRID_SIZE);
        let x_ticks = pipeline.denormalize_feature(&axis, Some(0))?.into_vec();
        let mut y_ticks = pipeline.denormalize_feature(&axis, Some(1))?.into_vec();
        y_ticks.reverse();

        for out in 0..outputs.cols() {
            let values = (0..GRID_SIZE)
                .map(|col| {
                    (0..GRID_SIZE)
                        .map(|row| outputs.get(col * GRID_SIZE + row, out))
                        .collect()
                })
                .collect();
            let name = if problem.is_multiclass() {
                format!("{}:{}", problem.label(), problem.class_name(out)?)
            } else {
                problem.label().to_owned()
            };
            viz.render(Plot::Heatmap {
                name,
                values,
                x_ticks: x_ticks.clone(),
                y_ticks: y_ticks.clone(),
            });
        }
        Ok(())
    }

    fn log_summary(&self) {
        let Some(compiled) = self.compiled.as_ref() else {
            return;
        };
        let model = &compiled.model;
        info!(
            "model: {} layers, {} params, loss={} optimizer={} lr={}",
            model.num_layers(),
            model.num_params(),
            compiled.loss,
            compiled.optimizer.kind(),
            compiled.learning_rate
        );
        for (i, layer) in model.layers().iter().enumerate() {
            debug!(
                "layer {}: {} -> {} ({})",
                i + 1,
                layer.in_dim(),
                layer.out_dim(),
                layer.activation()
            );
        }
    }
}

fn check_loss(loss: Loss, model: &Mlp) -> Result<()> {
    if loss == Loss::CategoricalCrossEntropy && model.output_dim() < 2 {
        return Err(Error::InvalidConfig(format!(
            "{loss} needs at least 2 outputs, model has {}",
            model.output_dim()
        )));
    }
    Ok(())
}

/// Parse one prediction argument without allocating on failure.
fn parse_input(raw: &str, field: &'static str) -> Result<f32> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(Error::InvalidInput {
            field,
            reason: "empty value",
        });
    }
    match raw.parse::<f32>() {
        Ok(v) if v.is_finite() => Ok(v),
        Ok(_) => Err(Error::InvalidInput {
            field,
            reason: "not a finite number",
        }),
        Err(_) => Err(Error::InvalidInput {
            field,
            reason: "not a number",
        }),
    }
}
