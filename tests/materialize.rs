use assert_matches::assert_matches;
use never::Never;

use crate::common::{MockPublisher, Recorder, Signal, TestError};

use tributary::{
    dematerialize, failures, from_iter, materialize, values, Completion, Demand, Event, Publisher,
};

pub mod common;

#[test_log::test]
fn it_materializes_values_then_the_finish() {
    let recorder = Recorder::<Event<u32, TestError>, Never>::unlimited();
    materialize(from_iter::<u32, TestError, _>([1, 2, 3])).subscribe(recorder.clone());

    assert_eq!(
        recorder.signals(),
        [
            Signal::Value(Event::Value(1)),
            Signal::Value(Event::Value(2)),
            Signal::Value(Event::Value(3)),
            Signal::Value(Event::Finished),
            Signal::Completion(Completion::Finished),
        ]
    );
}

#[test_log::test]
fn it_materializes_a_failure_and_finishes() {
    let upstream = MockPublisher::<u32, TestError>::new("upstream");
    let recorder = Recorder::<Event<u32, TestError>, Never>::unlimited();
    materialize(upstream.clone()).subscribe(recorder.clone());

    upstream.emit(1);
    upstream.emit(2);
    upstream.complete(Completion::Failure(TestError::Fatal));

    assert_eq!(
        recorder.signals(),
        [
            Signal::Value(Event::Value(1)),
            Signal::Value(Event::Value(2)),
            Signal::Value(Event::Failure(TestError::Fatal)),
            Signal::Completion(Completion::Finished),
        ]
    );
}

#[test_log::test]
fn it_holds_the_terminal_event_until_demanded() {
    let upstream = MockPublisher::<u32, TestError>::new("upstream");
    let recorder = Recorder::<Event<u32, TestError>, Never>::new(Demand::max(1), Demand::NONE);
    materialize(upstream.clone()).subscribe(recorder.clone());

    upstream.emit(1);
    upstream.complete(Completion::Failure(TestError::Fatal));
    assert_eq!(recorder.signals(), [Signal::Value(Event::Value(1))]);

    recorder.request(Demand::max(1));
    assert_matches!(
        &recorder.signals()[..],
        [
            Signal::Value(Event::Value(1)),
            Signal::Value(Event::Failure(TestError::Fatal)),
            Signal::Completion(Completion::Finished),
        ]
    );
}

#[test_log::test]
fn it_dematerializes_until_the_first_terminal_event() {
    let upstream = MockPublisher::<Event<u32, TestError>, Never>::new("upstream");
    let recorder = Recorder::<u32, TestError>::unlimited();
    dematerialize(upstream.clone()).subscribe(recorder.clone());

    upstream.emit(Event::Value(1));
    upstream.emit(Event::Failure(TestError::Fatal));

    assert_eq!(
        recorder.signals(),
        [
            Signal::Value(1),
            Signal::Completion(Completion::Failure(TestError::Fatal)),
        ]
    );
    assert!(upstream.is_cancelled());
}

#[test_log::test]
fn it_restores_a_materialized_stream() {
    let upstream = MockPublisher::<u32, TestError>::new("upstream");
    let recorder = Recorder::<u32, TestError>::unlimited();
    dematerialize(materialize(upstream.clone())).subscribe(recorder.clone());

    upstream.emit(4);
    upstream.complete(Completion::Finished);

    assert_eq!(
        recorder.signals(),
        [Signal::Value(4), Signal::Completion(Completion::Finished)]
    );
}

#[test_log::test]
fn it_splits_values_from_failures() {
    let events: [Event<u32, TestError>; 5] = [
        Event::Value(1),
        Event::Failure(TestError::Transient(0)),
        Event::Value(2),
        Event::Failure(TestError::Transient(1)),
        Event::Finished,
    ];

    let recorder = Recorder::<u32, Never>::new(Demand::max(1), Demand::max(1));
    values(from_iter::<_, Never, _>(events.clone())).subscribe(recorder.clone());
    assert_eq!(
        recorder.signals(),
        [
            Signal::Value(1),
            Signal::Value(2),
            Signal::Completion(Completion::Finished),
        ]
    );

    let recorder = Recorder::<TestError, Never>::unlimited();
    failures(from_iter::<_, Never, _>(events)).subscribe(recorder.clone());
    assert_eq!(
        recorder.values(),
        [TestError::Transient(0), TestError::Transient(1)]
    );
    assert_eq!(recorder.completion(), Some(Completion::Finished));
}
