use never::Never;
use std::sync::{
    atomic::{AtomicBool, Ordering as AtomicOrdering},
    Arc,
};

use crate::{
    utils::{talkback::Talkback, tracing::trace},
    Completion, Demand, DemandBuffer, Publisher, Sink, Source, Subscriber, Subscription,
};

/// A stream event reified as a value.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Event<T, E> {
    Value(T),
    Failure(E),
    Finished,
}

impl<T, E> From<Completion<E>> for Event<T, E> {
    fn from(completion: Completion<E>) -> Self {
        match completion {
            Completion::Finished => Event::Finished,
            Completion::Failure(error) => Event::Failure(error),
        }
    }
}

/// Converts every value and the terminal event of a source into [`Event`] values.
///
/// The resulting stream cannot fail. After delivering the event for the terminal event of the
/// source it finishes.
///
/// # Examples
///
/// ```
/// use crossbeam_queue::SegQueue;
/// use std::sync::Arc;
///
/// use tributary::{fail, for_each, materialize, Event};
///
/// let actual = Arc::new(SegQueue::new());
///
/// for_each({
///     let actual = Arc::clone(&actual);
///     move |event| actual.push(event)
/// })(materialize(fail::<u8, _>("boom")));
///
/// assert_eq!(actual.pop(), Some(Event::Failure("boom")));
/// assert_eq!(actual.pop(), None);
/// ```
pub fn materialize<T: 'static, E: 'static, S>(source: S) -> Source<Event<T, E>, Never>
where
    T: Send,
    E: Send,
    S: Publisher<T, E> + 'static,
{
    let source = source.into_source();
    Source::from_fn(move |subscriber: Arc<dyn Subscriber<Event<T, E>, Never>>| {
        let materialize = Arc::new(Materialize {
            sink: Sink::new(
                Arc::clone(&subscriber),
                |value| Some(Event::Value(value)),
                |never: Never| match never {},
            ),
        });
        subscriber.on_subscribe(Arc::clone(&materialize) as Arc<dyn Subscription>);
        source.subscribe(materialize);
    })
}

struct Materialize<T, E> {
    sink: Sink<T, Never, Event<T, E>, Never>,
}

impl<T, E> Subscriber<T, E> for Materialize<T, E>
where
    T: Send,
    E: Send,
{
    fn on_subscribe(&self, subscription: Arc<dyn Subscription>) {
        self.sink.on_subscribe(subscription);
    }

    fn on_value(&self, value: T) -> Demand {
        self.sink.on_value(value)
    }

    fn on_completion(&self, completion: Completion<E>) {
        self.sink.detach_upstream();
        let buffer = self.sink.buffer();
        if buffer.is_closed() {
            return;
        }
        buffer.buffer(completion.into());
        buffer.complete_when_drained(Completion::Finished);
    }
}

impl<T, E> Subscription for Materialize<T, E>
where
    T: Send,
    E: Send,
{
    fn request(&self, demand: Demand) {
        self.sink.request(demand);
    }

    fn cancel(&self) {
        self.sink.cancel();
    }
}

/// Converts a stream of [`Event`] values back into values and a terminal event.
///
/// The first [`Event::Failure`] or [`Event::Finished`] terminates the resulting stream and cancels
/// the source. A source that finishes without such an event finishes the resulting stream.
pub fn dematerialize<T: 'static, E: 'static, S>(source: S) -> Source<T, E>
where
    T: Send,
    E: Send,
    S: Publisher<Event<T, E>, Never> + 'static,
{
    let source = source.into_source();
    Source::from_fn(move |subscriber: Arc<dyn Subscriber<T, E>>| {
        let dematerialize = Arc::new(Dematerialize {
            buffer: DemandBuffer::new(Arc::clone(&subscriber)),
            upstream: Talkback::new(),
            terminated: AtomicBool::new(false),
        });
        subscriber.on_subscribe(Arc::clone(&dematerialize) as Arc<dyn Subscription>);
        source.subscribe(dematerialize);
    })
}

struct Dematerialize<T, E> {
    buffer: DemandBuffer<T, E>,
    upstream: Talkback,
    terminated: AtomicBool,
}

impl<T, E> Dematerialize<T, E>
where
    T: Send,
    E: Send,
{
    fn terminate(&self, completion: Completion<E>) {
        if self.terminated.swap(true, AtomicOrdering::AcqRel) {
            return;
        }
        self.upstream.cancel();
        self.buffer.complete_when_drained(completion);
    }
}

impl<T, E> Subscriber<Event<T, E>, Never> for Dematerialize<T, E>
where
    T: Send,
    E: Send,
{
    fn on_subscribe(&self, subscription: Arc<dyn Subscription>) {
        if self.buffer.is_closed() || self.terminated.load(AtomicOrdering::Acquire) {
            subscription.cancel();
            return;
        }
        self.upstream.store(Arc::clone(&subscription));
        let outstanding = self.buffer.outstanding();
        if !outstanding.is_none() {
            subscription.request(outstanding);
        }
    }

    fn on_value(&self, event: Event<T, E>) -> Demand {
        if self.terminated.load(AtomicOrdering::Acquire) {
            trace!("event after the terminal event ignored");
            return Demand::NONE;
        }
        match event {
            Event::Value(value) => self.buffer.buffer(value),
            Event::Failure(error) => {
                self.terminate(Completion::Failure(error));
                Demand::NONE
            },
            Event::Finished => {
                self.terminate(Completion::Finished);
                Demand::NONE
            },
        }
    }

    fn on_completion(&self, completion: Completion<Never>) {
        match completion {
            Completion::Finished => {
                self.upstream.clear();
                self.terminate(Completion::Finished);
            },
            Completion::Failure(never) => match never {},
        }
    }
}

impl<T, E> Subscription for Dematerialize<T, E>
where
    T: Send,
    E: Send,
{
    fn request(&self, demand: Demand) {
        let demand = self.buffer.demand(demand);
        self.upstream.request(demand);
    }

    fn cancel(&self) {
        self.terminated.store(true, AtomicOrdering::Release);
        self.buffer.cancel();
        self.upstream.cancel();
    }
}

/// Keeps only the values of a materialized stream.
pub fn values<T: 'static, E: 'static, S>(source: S) -> Source<T, Never>
where
    T: Send,
    S: Publisher<Event<T, E>, Never> + 'static,
{
    let source = source.into_source();
    Source::from_fn(move |subscriber: Arc<dyn Subscriber<T, Never>>| {
        let sink = Arc::new(Sink::new(
            Arc::clone(&subscriber),
            |event: Event<T, E>| match event {
                Event::Value(value) => Some(value),
                Event::Failure(_) | Event::Finished => None,
            },
            Some,
        ));
        subscriber.on_subscribe(Arc::clone(&sink) as Arc<dyn Subscription>);
        source.subscribe(sink);
    })
}

/// Keeps only the failures of a materialized stream.
///
/// # Examples
///
/// ```
/// use crossbeam_queue::SegQueue;
/// use std::sync::Arc;
///
/// use tributary::{fail, failures, for_each, materialize};
///
/// let actual = Arc::new(SegQueue::new());
///
/// for_each({
///     let actual = Arc::clone(&actual);
///     move |error| actual.push(error)
/// })(failures(materialize(fail::<u8, _>("boom"))));
///
/// assert_eq!(actual.pop(), Some("boom"));
/// ```
pub fn failures<T: 'static, E: 'static, S>(source: S) -> Source<E, Never>
where
    E: Send,
    S: Publisher<Event<T, E>, Never> + 'static,
{
    let source = source.into_source();
    Source::from_fn(move |subscriber: Arc<dyn Subscriber<E, Never>>| {
        let sink = Arc::new(Sink::new(
            Arc::clone(&subscriber),
            |event: Event<T, E>| match event {
                Event::Failure(error) => Some(error),
                Event::Value(_) | Event::Finished => None,
            },
            Some,
        ));
        subscriber.on_subscribe(Arc::clone(&sink) as Arc<dyn Subscription>);
        source.subscribe(sink);
    })
}
