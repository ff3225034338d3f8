mod common;

use common::house_sales;
use house_mlp::{
    ControllerState, DataPipeline, Error, Hyperparameters, JsonDirStore, Matrix, MemoryStore,
    Plot, ProblemKind, Record, Session, Setting, TrainingState, TrainingSwitch, Visualizer,
    WeightSnapshot,
};

/// Pauses training once the epoch counter reaches `stop_at`.
#[derive(Default)]
struct PauseAt {
    switch: Option<TrainingSwitch>,
    stop_at: u64,
    seen: Vec<TrainingState>,
}

impl Visualizer for PauseAt {
    fn render(&mut self, _plot: Plot) {}

    fn progress(&mut self, state: &TrainingState) {
        self.seen.push(*state);
        if state.current_epoch >= self.stop_at {
            if let Some(switch) = &self.switch {
                switch.pause();
            }
        }
    }
}

fn session_with<V: Visualizer>(kind: ProblemKind, viz: V) -> Session<MemoryStore, V> {
    let mut session = Session::new(
        kind,
        Hyperparameters::default(),
        MemoryStore::new(),
        viz,
        Some(21),
    )
    .unwrap();
    session.load_records(&mut house_sales(80)).unwrap();
    session
}

#[test]
fn three_record_split_and_label_roundtrip() {
    let mut records = vec![
        Record::new(1000.0, 200_000.0, 0.0, 2.0),
        Record::new(2000.0, 400_000.0, 0.0, 3.0),
        Record::new(3000.0, 600_000.0, 1.0, 4.0),
    ];
    let mut pipeline =
        DataPipeline::with_seed(1, ProblemKind::HousePrice.activate().problem, 66);
    assert_eq!(pipeline.load(&mut records).unwrap(), 3);

    let split = pipeline.current_split().unwrap();
    assert_eq!((split.training_size, split.testing_size), (2, 1));
    assert_eq!(pipeline.training_features().unwrap().rows(), 2);
    assert_eq!(pipeline.testing_labels().unwrap().rows(), 1);

    let prices = Matrix::column(vec![200_000.0, 400_000.0, 600_000.0]);
    let normalized = pipeline.normalize_label(&prices).unwrap();
    assert_eq!(normalized.as_slice(), &[0.0, 0.5, 1.0]);
    let back = pipeline.denormalize_label(&normalized).unwrap();
    for (a, b) in back.as_slice().iter().zip(prices.as_slice()) {
        assert!((a - b).abs() < 1.0, "{a} vs {b}");
    }
}

#[test]
fn bedroom_classes_encode_one_hot() {
    let problem = ProblemKind::Bedrooms.activate().problem;
    assert_eq!(problem.class_index_for("3+").unwrap(), 2);
    assert!(matches!(
        problem.class_index_for("unknown"),
        Err(Error::NotFound(_))
    ));

    let encoded = Matrix::one_hot(&[problem.class_index_for("3+").unwrap()], 3).unwrap();
    assert_eq!(encoded.as_slice(), &[0.0, 0.0, 1.0]);

    let seven = Record::new(4200.0, 900_000.0, 0.0, 7.0);
    assert_eq!(problem.class_name_for(&seven), Some("3+"));
    assert!(!problem.filter(&Record::new(500.0, 90_000.0, 0.0, 0.0)));
}

#[test]
fn switching_problem_rebuilds_once_and_recreates_once() {
    let mut session = session_with(ProblemKind::HousePrice, PauseAt::default());
    let rebuilds = session.pipeline().rebuilds();
    let generation = session.controller().generation();

    session.select_problem(ProblemKind::Bedrooms).unwrap();
    assert_eq!(session.pipeline().rebuilds(), rebuilds + 1);
    assert_eq!(session.controller().generation(), generation + 1);

    let model = session.controller().model().unwrap();
    assert_eq!(model.input_dim(), 2);
    assert_eq!(model.output_dim(), 3);
    assert_eq!(session.pipeline().label_dim(), 3);
    assert!(session.pipeline().points().iter().all(|p| p.class_name.is_some()));
}

#[test]
fn min_loss_only_improves_and_snapshot_follows_it() {
    let mut session = session_with(ProblemKind::Waterfront, PauseAt::default());
    let mut previous_min: Option<f32> = None;

    for _ in 0..15 {
        let report = session.step_epoch().unwrap();
        let state = *session.controller().training_state();
        let min = state.min_loss.unwrap();

        assert_eq!(state.current_loss, Some(report.loss));
        if let Some(prev) = previous_min {
            assert!(min <= prev, "min loss went up: {prev} -> {min}");
        }
        let best = session.controller().best_weights().unwrap();
        if previous_min.is_none_or(|prev| report.loss < prev) {
            assert_eq!(min, report.loss);
            assert!(best.matches(session.controller().model().unwrap()));
            assert_eq!(
                *best,
                WeightSnapshot::capture(session.controller().model().unwrap())
            );
        }
        previous_min = Some(min);
    }
}

#[tokio::test]
async fn pause_lands_on_an_epoch_boundary_and_resume_continues() {
    let mut session = session_with(ProblemKind::HousePrice, PauseAt::default());
    let switch = session.switch();
    session.visualizer_mut().switch = Some(switch.clone());
    session.visualizer_mut().stop_at = 3;

    let outcome = session.train().await.unwrap();
    assert!(!switch.is_on());
    assert_eq!(session.controller().training_state().current_epoch, 3);
    assert_eq!(session.controller().state(), ControllerState::Trained);
    assert!(!session.controller().training_state().in_progress);
    assert_eq!(
        outcome.min_training_loss,
        session.controller().training_state().min_loss
    );

    let seen = &session.visualizer().seen;
    assert_eq!(seen.len(), 3);
    assert!(seen.iter().all(|s| s.in_progress));
    assert!(seen.windows(2).all(|w| w[1].current_epoch == w[0].current_epoch + 1));

    session.visualizer_mut().stop_at = 5;
    session.train().await.unwrap();
    assert_eq!(session.controller().training_state().current_epoch, 5);
    assert_eq!(session.visualizer().seen.len(), 5);
}

#[tokio::test]
async fn pause_from_another_task_stops_training() {
    let mut session = session_with(ProblemKind::Waterfront, PauseAt::default());
    session.visualizer_mut().stop_at = u64::MAX;
    let switch = session.switch();

    let pauser = tokio::spawn(async move {
        while !switch.is_on() {
            tokio::task::yield_now().await;
        }
        switch.pause();
    });

    session.train().await.unwrap();
    pauser.await.unwrap();
    assert!(session.controller().training_state().current_epoch >= 1);
    assert!(!session.switch().is_on());
}

#[test]
fn edits_persist_and_models_reload_from_disk() {
    let dir = tempfile::tempdir().unwrap();
    let store = JsonDirStore::open(dir.path()).unwrap();
    let mut session = Session::new(
        ProblemKind::Bedrooms,
        Hyperparameters::default(),
        store,
        PauseAt::default(),
        Some(4),
    )
    .unwrap();
    session.load_records(&mut house_sales(60)).unwrap();
    session
        .apply("hiddenUnits=6".parse::<Setting>().unwrap())
        .unwrap();
    for _ in 0..3 {
        session.step_epoch().unwrap();
    }
    let trained = WeightSnapshot::capture(session.controller().model().unwrap());
    session.save().unwrap();
    assert!(dir.path().join("bedrooms_model.json").exists());

    session.shuffle().unwrap();
    assert_ne!(
        WeightSnapshot::capture(session.controller().model().unwrap()),
        trained
    );
    session.load().unwrap();
    assert_eq!(
        WeightSnapshot::capture(session.controller().model().unwrap()),
        trained
    );

    let predictions = session.predict(&["2100", "450000"]).unwrap();
    assert_eq!(predictions.len(), 3);
    assert_eq!(predictions[2].name, "3+ Bedrooms");
    let total: f32 = predictions.iter().map(|p| p.value).sum();
    assert!((total - 100.0).abs() < 1e-2, "{total}");
}
