mod common;

use common::{CountingAlloc, house_sales};
use house_mlp::{
    Error, Hyperparameters, MemoryStore, NullVisualizer, ProblemKind, Session,
};

#[global_allocator]
static ALLOC: CountingAlloc = CountingAlloc::new();

#[test]
fn rejected_predictions_allocate_nothing() {
    let mut session = Session::new(
        ProblemKind::Waterfront,
        Hyperparameters::default(),
        MemoryStore::new(),
        NullVisualizer,
        Some(5),
    )
    .unwrap();
    session.load_records(&mut house_sales(60)).unwrap();

    let bad: [&[&str]; 6] = [
        &["", "400000"],
        &["   ", "400000"],
        &["1500", "lots"],
        &["12ft", "400000"],
        &["1500", "inf"],
        &["1500"],
    ];

    for inputs in bad {
        ALLOC.reset();
        let before = ALLOC.snapshot();
        let result = session.predict(inputs);
        let events = ALLOC.alloc_events();
        let after = ALLOC.snapshot();

        assert!(
            matches!(result, Err(Error::InvalidInput { .. })),
            "{inputs:?} was accepted"
        );
        assert_eq!(
            events, 0,
            "{inputs:?} allocated: before={before:?} after={after:?}"
        );
    }

    assert!(session.predict(&["1500", "400000"]).is_ok());
}
