//! The configuration surface.
//!
//! A `Session` owns the hyperparameters, the data pipeline, the model controller,
//! the artifact store and the visualizer. Every edit goes through
//! [`Session::apply`], which carries out the minimal rebuild the edit requires.

use log::{debug, info, warn};

use crate::config::{Effect, Setting};
use crate::controller::{Prediction, TestReport, TrainOutcome, TrainingSwitch};
use crate::pipeline::Split;
use crate::store::ArtifactStore;
use crate::train::EpochReport;
use crate::visual::Visualizer;
use crate::{
    DataPipeline, Error, Hyperparameters, ModelController, ProblemKind, RecordSource, Result,
    WeightSnapshot,
};

pub struct Session<S, V> {
    hp: Hyperparameters,
    pipeline: DataPipeline,
    controller: ModelController,
    store: S,
    viz: V,
}

impl<S: ArtifactStore, V: Visualizer> Session<S, V> {
    /// Start a session on `kind`. The problem's recommended loss and learning rate
    /// override the ones in `hp`.
    pub fn new(
        kind: ProblemKind,
        hp: Hyperparameters,
        store: S,
        viz: V,
        seed: Option<u64>,
    ) -> Result<Self> {
        hp.validate()?;
        let activated = kind.activate();
        let hp = Hyperparameters {
            loss: activated.loss,
            learning_rate: activated.learning_rate,
            ..hp
        };
        let (pipeline, controller) = match seed {
            Some(seed) => (
                DataPipeline::with_seed(seed, activated.problem, hp.train_test_ratio),
                ModelController::with_seed(seed.wrapping_add(1)),
            ),
            None => (
                DataPipeline::new(activated.problem, hp.train_test_ratio),
                ModelController::new(),
            ),
        };

        Ok(Self {
            hp,
            pipeline,
            controller,
            store,
            viz,
        })
    }

    /// Load the dataset, then create a model for it.
    pub fn load_records(&mut self, source: &mut dyn RecordSource) -> Result<usize> {
        let n = self.pipeline.load(source)?;
        self.viz.render(self.pipeline.points_plot());
        self.controller
            .create(&self.pipeline, &self.hp, &mut self.viz)?;
        Ok(n)
    }

    /// Apply one hyperparameter edit and whatever rebuild it calls for.
    ///
    /// On error the previous hyperparameters stay in effect.
    pub fn apply(&mut self, setting: Setting) -> Result<Effect> {
        let (next, effect) = self.hp.apply(setting)?;
        debug!("{setting}: {effect:?}");

        if self.pipeline.is_loaded() {
            match effect {
                Effect::None => {}
                Effect::Resplit => {
                    self.pipeline.split(next.train_test_ratio)?;
                }
                Effect::Recompile => {
                    self.controller
                        .compile(&self.pipeline, &next, &mut self.viz)?;
                }
                Effect::Recreate => {
                    self.controller
                        .create(&self.pipeline, &next, &mut self.viz)?;
                }
                Effect::RecreateKeepingWeights => {
                    let previous = self.controller.model().map(WeightSnapshot::capture);
                    self.controller
                        .create(&self.pipeline, &next, &mut self.viz)?;
                    if let Some(previous) = previous {
                        self.controller.restore_weights(&previous)?;
                        self.controller.plot_prediction(&self.pipeline, &mut self.viz)?;
                    }
                }
            }
        }

        self.hp = next;
        Ok(effect)
    }

    /// Switch problems: one pipeline rebuild, one new model.
    pub fn select_problem(&mut self, kind: ProblemKind) -> Result<()> {
        let activated = kind.activate();
        let hp = Hyperparameters {
            loss: activated.loss,
            learning_rate: activated.learning_rate,
            ..self.hp
        };
        info!(
            "problem {kind}: {} loss={} lr={}",
            activated.problem.model_type(),
            hp.loss,
            hp.learning_rate
        );

        if self.pipeline.set_problem(activated.problem)?.is_some() {
            self.viz.render(self.pipeline.points_plot());
            self.controller
                .create(&self.pipeline, &hp, &mut self.viz)?;
        }
        self.hp = hp;
        Ok(())
    }

    /// Re-permute the records, rebuild the data and start over with a new model.
    pub fn shuffle(&mut self) -> Result<Split> {
        let split = self.pipeline.shuffle()?;
        self.viz.render(self.pipeline.points_plot());
        self.controller
            .create(&self.pipeline, &self.hp, &mut self.viz)?;
        Ok(split)
    }

    /// Train until paused through [`switch`](Self::switch).
    pub async fn train(&mut self) -> Result<TrainOutcome> {
        self.controller
            .train(&self.pipeline, &self.hp, &mut self.viz)
            .await
    }

    pub fn step_epoch(&mut self) -> Result<EpochReport> {
        self.controller
            .step_epoch(&self.pipeline, &self.hp, &mut self.viz)
    }

    pub fn test(&self) -> Result<TestReport> {
        self.controller.test(&self.pipeline)
    }

    pub fn predict(&self, inputs: &[&str]) -> Result<Vec<Prediction>> {
        self.controller.predict(&self.pipeline, inputs)
    }

    pub fn restore_best(&mut self) -> Result<()> {
        self.controller.restore_best()?;
        self.controller.plot_prediction(&self.pipeline, &mut self.viz)
    }

    pub fn save(&mut self) -> Result<u64> {
        self.controller.save(&self.pipeline, &mut self.store)
    }

    pub fn load(&mut self) -> Result<u64> {
        self.controller
            .load(&self.pipeline, &self.hp, &self.store, &mut self.viz)
    }

    /// Like [`load`](Self::load), but a missing artifact leaves the current model
    /// in place and returns `Ok(None)`.
    pub fn try_load(&mut self) -> Result<Option<u64>> {
        match self.load() {
            Ok(saved_at) => Ok(Some(saved_at)),
            Err(Error::NotFound(what)) => {
                warn!("{what}");
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    pub fn model_saved(&self) -> bool {
        self.controller.model_saved(&self.pipeline, &self.store)
    }

    pub fn switch(&self) -> TrainingSwitch {
        self.controller.switch()
    }

    #[inline]
    pub fn settings(&self) -> &Hyperparameters {
        &self.hp
    }

    #[inline]
    pub fn pipeline(&self) -> &DataPipeline {
        &self.pipeline
    }

    #[inline]
    pub fn controller(&self) -> &ModelController {
        &self.controller
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn visualizer(&self) -> &V {
        &self.viz
    }

    pub fn visualizer_mut(&mut self) -> &mut V {
        &mut self.viz
    }
}
