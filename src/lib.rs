//! Interactive trainer for small feed-forward models over house-sale records.
//!
//! `house-mlp` pairs a small from-scratch dense network engine with the
//! orchestration around it: a data pipeline that filters, encodes, normalizes and
//! splits records for the active problem, and a model controller that creates,
//! compiles, trains (until paused), tests, persists and queries the model.
//!
//! # Layers
//!
//! - Engine: [`Matrix`], [`Layer`], [`Mlp`], [`MlpBuilder`], [`Loss`], [`Optimizer`],
//!   and the epoch-level helpers in [`train`]. The per-sample hot path
//!   ([`Mlp::forward`], [`Mlp::backward`]) reuses buffers and panics on shape misuse;
//!   [`Mlp::fit_epoch`], [`Mlp::evaluate`] and [`Mlp::predict`] validate shapes and
//!   return [`Result`].
//! - Orchestration: [`Normalizer`], [`Problem`], [`DataPipeline`],
//!   [`ModelController`], [`WeightSnapshot`].
//! - Configuration surface: [`Session`] applies [`Setting`] edits to
//!   [`Hyperparameters`] and performs the rebuild each edit needs.
//! - Collaborators behind traits: [`RecordSource`], [`ArtifactStore`],
//!   [`Visualizer`].
//!
//! # Data layout and shapes
//!
//! - Scalars are `f32`.
//! - [`Matrix`] stores samples contiguously in row-major layout.
//! - Layer weights are row-major with shape `(out_dim, in_dim)`.
//!
//! # Quick start
//!
//! ```rust
//! use house_mlp::{Hyperparameters, MemoryStore, NullVisualizer, ProblemKind, Record, Session};
//!
//! # fn main() -> house_mlp::Result<()> {
//! let mut records: Vec<Record> = (0..20)
//!     .map(|i| {
//!         let sqft = 1000.0 + 100.0 * i as f32;
//!         Record::new(sqft, 200.0 * sqft, 0.0, 3.0)
//!     })
//!     .collect();
//!
//! let mut session = Session::new(
//!     ProblemKind::HousePrice,
//!     Hyperparameters::default(),
//!     MemoryStore::new(),
//!     NullVisualizer,
//!     Some(0),
//! )?;
//! session.load_records(&mut records)?;
//! for _ in 0..10 {
//!     session.step_epoch()?;
//! }
//! let prediction = session.predict(&["1500"])?;
//! assert_eq!(prediction[0].name, "Price");
//! # Ok(())
//! # }
//! ```
//!
//! # Allocation-free training steps
//!
//! To drive the engine directly, allocate buffers once and reuse them:
//!
//! ```rust
//! use house_mlp::{Activation, Loss, MlpBuilder};
//!
//! # fn main() -> house_mlp::Result<()> {
//! let mut mlp = MlpBuilder::new(2)?
//!     .add_layer(8, Activation::Tanh)?
//!     .add_layer(3, Activation::Softmax)?
//!     .build_with_seed(0)?;
//!
//! let mut trainer = mlp.trainer();
//! let x = [0.1_f32, -0.2];
//! let t = [0.0_f32, 1.0, 0.0];
//!
//! let y = mlp.forward(&x, &mut trainer.scratch);
//! let _loss = Loss::CategoricalCrossEntropy.backward(y, &t, trainer.grads.d_output_mut());
//! mlp.backward(&x, &trainer.scratch, &mut trainer.grads);
//! mlp.sgd_step(&trainer.grads, 1e-2);
//! # Ok(())
//! # }
//! ```

pub mod activation;
pub mod builder;
pub mod config;
pub mod controller;
pub mod data;
pub mod error;
pub mod layer;
pub mod loss;
pub mod metrics;
pub mod mlp;
pub mod normalizer;
pub mod optim;
pub mod pipeline;
pub mod problem;
pub mod serde_model;
pub mod session;
pub mod snapshot;
pub mod source;
pub mod store;
pub mod train;
pub mod visual;

pub use activation::Activation;
pub use builder::MlpBuilder;
pub use config::{Effect, Hyperparameters, Setting};
pub use controller::{
    ControllerState, ModelController, Prediction, TestReport, TrainOutcome, TrainingState,
    TrainingSwitch,
};
pub use data::Matrix;
pub use error::{Error, Result};
pub use layer::{Init, Layer};
pub use loss::Loss;
pub use metrics::Metric;
pub use mlp::{Gradients, Mlp, Scratch, Trainer};
pub use normalizer::Normalizer;
pub use optim::{Optimizer, OptimizerState};
pub use pipeline::{DataPipeline, Split};
pub use problem::{Activated, ModelType, Problem, ProblemKind, ProblemPoint};
pub use serde_model::SerializedMlp;
pub use session::Session;
pub use snapshot::WeightSnapshot;
pub use source::{JsonLinesSource, Record, RecordSource};
pub use store::{ArtifactStore, JsonDirStore, MemoryStore, StoredModel};
pub use train::{EpochConfig, EpochReport, EvalReport};
pub use visual::{LogVisualizer, NullVisualizer, Plot, RecordingVisualizer, Visualizer};
