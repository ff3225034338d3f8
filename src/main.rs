use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use log::{error, info, warn};
use tokio::signal;

use house_mlp::{
    ArtifactStore, Hyperparameters, JsonDirStore, JsonLinesSource, LogVisualizer, MemoryStore,
    Plot, ProblemKind, Result, Session, Setting, TrainingState, TrainingSwitch, Visualizer,
};

#[derive(Parser, Debug)]
#[command(
    name = "house-mlp",
    version,
    about = "Train, test and query a small MLP on house-sale records."
)]
struct Cli {
    /// JSON-lines file with one house-sale record per line.
    #[arg(long)]
    records: PathBuf,

    /// house-price, waterfront or bedrooms.
    #[arg(long, default_value_t = ProblemKind::HousePrice)]
    problem: ProblemKind,

    /// Hyperparameter JSON file.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Hyperparameter edit applied after loading, e.g. `learningRate=0.01`.
    #[arg(long = "set", value_name = "NAME=VALUE")]
    settings: Vec<Setting>,

    /// Epochs to train before pausing. Ctrl-C pauses early.
    #[arg(long, default_value_t = 50)]
    epochs: u64,

    /// Directory for saved models. Without it models live in memory only.
    #[arg(long)]
    store: Option<PathBuf>,

    #[arg(long)]
    seed: Option<u64>,

    /// Load the saved model for the problem before training.
    #[arg(long)]
    load: bool,

    /// Save the model after training.
    #[arg(long)]
    save: bool,

    /// Roll back to the lowest-loss weights after training.
    #[arg(long)]
    restore_best: bool,

    /// Feature values to predict for: sqft_living, then price for classification.
    #[arg(long, num_args = 1..=2, value_name = "VALUE", allow_hyphen_values = true)]
    predict: Vec<String>,
}

/// Logs progress and pauses the run after a fixed number of epochs.
struct EpochLimit {
    inner: LogVisualizer,
    switch: Option<TrainingSwitch>,
    remaining: u64,
}

impl Visualizer for EpochLimit {
    fn render(&mut self, plot: Plot) {
        self.inner.render(plot);
    }

    fn progress(&mut self, state: &TrainingState) {
        self.inner.progress(state);
        self.remaining = self.remaining.saturating_sub(1);
        if self.remaining == 0 {
            if let Some(switch) = &self.switch {
                switch.pause();
            }
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let ret = match cli.store.clone() {
        Some(dir) => match JsonDirStore::open(dir) {
            Ok(store) => run(cli, store).await,
            Err(e) => Err(e),
        },
        None => run(cli, MemoryStore::new()).await,
    };

    match ret {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e}");
            ExitCode::FAILURE
        }
    }
}

async fn run<S: ArtifactStore>(cli: Cli, store: S) -> Result<()> {
    let hp = match &cli.config {
        Some(path) => Hyperparameters::load(path)?,
        None => Hyperparameters::default(),
    };
    let viz = EpochLimit {
        inner: LogVisualizer,
        switch: None,
        remaining: cli.epochs,
    };
    let mut session = Session::new(cli.problem, hp, store, viz, cli.seed)?;

    let n = session.load_records(&mut JsonLinesSource::new(&cli.records))?;
    let split = session.pipeline().current_split();
    info!(
        "{}: {n} records, {} points, split {split:?}",
        cli.problem,
        session.pipeline().dataset_size()
    );

    for setting in &cli.settings {
        let effect = session.apply(*setting)?;
        info!("{setting}: {effect:?}");
    }

    if cli.load {
        match session.try_load()? {
            Some(saved_at) => info!("loaded model saved at {saved_at}ms"),
            None => warn!(
                "no saved {} model, training a new one",
                session.pipeline().problem().kind()
            ),
        }
    }

    if cli.epochs > 0 {
        let switch = session.switch();
        session.visualizer_mut().switch = Some(switch.clone());
        let interrupt = tokio::spawn(async move {
            if signal::ctrl_c().await.is_ok() {
                info!("interrupted, pausing after the current epoch");
                switch.pause();
            }
        });
        let outcome = session.train().await;
        interrupt.abort();
        let outcome = outcome?;
        info!(
            "min training loss {:?}, last validation loss {:?}",
            outcome.min_training_loss, outcome.last_validation_loss
        );
    }

    if cli.restore_best {
        session.restore_best()?;
    }

    let report = session.test()?;
    match report.accuracy {
        Some(accuracy) => println!("test loss {:.6}, accuracy {:.1}%", report.loss, accuracy * 100.0),
        None => println!("test loss {:.6}", report.loss),
    }

    if !cli.predict.is_empty() {
        let inputs: Vec<&str> = cli.predict.iter().map(String::as_str).collect();
        match session.predict(&inputs) {
            Ok(predictions) => {
                for p in predictions {
                    println!("{}: {}", p.name, p.display);
                }
            }
            Err(e) if e.is_recoverable() => warn!("{e}"),
            Err(e) => return Err(e),
        }
    }

    if cli.save {
        let saved_at = session.save()?;
        info!(
            "saved {} at {saved_at}ms",
            session.pipeline().problem().storage_key()
        );
    }
    Ok(())
}
