use crossbeam_queue::SegQueue;
use never::Never;
use std::sync::Arc;

use crate::common::{MockPublisher, Recorder, Signal, TestError};

use tributary::{
    dematerialize, filter, for_each, from_iter, map, materialize, pipe, share_replay, values,
    Completion, Event, Publisher, ShareScope,
};

pub mod common;

#[test_log::test]
fn it_chains_operators_left_to_right() {
    let actual = Arc::new(SegQueue::new());

    pipe!(
        from_iter::<_, Never, _>([1, 2, 3, 4, 5, 6]),
        map(|x| x * 10),
        filter(|x| x % 20 == 0),
        for_each({
            let actual = Arc::clone(&actual);
            move |x| actual.push(x)
        }),
    );

    assert_eq!(actual.pop(), Some(20));
    assert_eq!(actual.pop(), Some(40));
    assert_eq!(actual.pop(), Some(60));
    assert_eq!(actual.pop(), None);
}

#[test_log::test]
fn it_nests_pipes_as_operators() {
    let recorder = Recorder::<u32, Never>::unlimited();

    pipe!(
        from_iter::<u32, Never, _>([10, 20, 30, 40]),
        |s| pipe!(s, map(|x| x / 10), filter(|x| x % 2 != 0)),
    )
    .subscribe(recorder.clone());

    assert_eq!(recorder.values(), [1, 3]);
}

#[test_log::test]
fn it_round_trips_through_a_shared_materialized_stream() {
    let upstream = MockPublisher::<u32, TestError>::new("upstream");
    let shared = pipe!(
        upstream.clone(),
        materialize,
        share_replay(2, ShareScope::Forever)
    );

    let restored = Recorder::<u32, TestError>::unlimited();
    dematerialize(shared.clone()).subscribe(restored.clone());
    upstream.emit(1);
    upstream.emit(2);
    upstream.emit(3);
    upstream.complete(Completion::Failure(TestError::Fatal));

    let late = Recorder::<u32, Never>::unlimited();
    values(shared.clone()).subscribe(late.clone());

    assert_eq!(
        restored.signals(),
        [
            Signal::Value(1),
            Signal::Value(2),
            Signal::Value(3),
            Signal::Completion(Completion::Failure(TestError::Fatal)),
        ]
    );
    assert_eq!(
        late.signals(),
        [Signal::Value(3), Signal::Completion(Completion::Finished)],
        "replays the last value and the failure event"
    );

    let events = Recorder::<Event<u32, TestError>, Never>::unlimited();
    shared.subscribe(events.clone());
    assert_eq!(
        events.values(),
        [Event::Value(3), Event::Failure(TestError::Fatal)]
    );
}
