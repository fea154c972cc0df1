use std::sync::{
    atomic::{AtomicBool, Ordering as AtomicOrdering},
    Arc,
};

use crate::{Completion, Demand, Publisher, Sink, Source, Subscriber, Subscription};

/// What [`replace_empty`] does with a source that finishes without emitting anything.
#[derive(Clone, Debug)]
pub enum EmptyReplacement<T, E> {
    /// Emit this value, then finish.
    Value(T),
    /// Continue with this source instead.
    Source(Source<T, E>),
    /// Fail with this failure.
    Failure(E),
}

/// Operator that replaces a successful but empty completion of the source.
///
/// A source that emitted at least one value, or that failed, is mirrored as is.
///
/// # Examples
///
/// ```
/// use crossbeam_queue::SegQueue;
/// use std::sync::Arc;
///
/// use tributary::{
///     empty, for_each, materialize, pipe, replace_empty, EmptyReplacement, Event,
/// };
///
/// let actual = Arc::new(SegQueue::new());
///
/// pipe!(
///     empty::<u8, _>(),
///     replace_empty(EmptyReplacement::Failure("no peripheral found")),
///     materialize,
///     for_each({
///         let actual = Arc::clone(&actual);
///         move |event| actual.push(event)
///     }),
/// );
///
/// assert_eq!(actual.pop(), Some(Event::Failure("no peripheral found")));
/// ```
pub fn replace_empty<T: 'static, E: 'static, S>(
    replacement: EmptyReplacement<T, E>,
) -> Box<dyn Fn(S) -> Source<T, E>>
where
    T: Clone + Send + Sync,
    E: Clone + Send + Sync,
    S: Publisher<T, E> + 'static,
{
    Box::new(move |source| {
        let source = source.into_source();
        let replacement = replacement.clone();
        Source::from_fn(move |subscriber: Arc<dyn Subscriber<T, E>>| {
            let sink = Arc::new(Sink::new(Arc::clone(&subscriber), Some, Some));
            subscriber.on_subscribe(Arc::clone(&sink) as Arc<dyn Subscription>);
            source.subscribe(Arc::new(ReplaceEmpty {
                sink,
                seen_value: AtomicBool::new(false),
                replacement: replacement.clone(),
            }));
        })
    })
}

struct ReplaceEmpty<T, E> {
    sink: Arc<Sink<T, E, T, E>>,
    seen_value: AtomicBool,
    replacement: EmptyReplacement<T, E>,
}

impl<T, E> Subscriber<T, E> for ReplaceEmpty<T, E>
where
    T: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
{
    fn on_subscribe(&self, subscription: Arc<dyn Subscription>) {
        self.sink.on_subscribe(subscription);
    }

    fn on_value(&self, value: T) -> Demand {
        self.seen_value.store(true, AtomicOrdering::Release);
        self.sink.on_value(value)
    }

    fn on_completion(&self, completion: Completion<E>) {
        if completion.is_failure() || self.seen_value.load(AtomicOrdering::Acquire) {
            self.sink.on_completion(completion);
            return;
        }
        match &self.replacement {
            EmptyReplacement::Value(value) => {
                self.sink.detach_upstream();
                let buffer = self.sink.buffer();
                buffer.buffer(value.clone());
                buffer.complete_when_drained(Completion::Finished);
            },
            EmptyReplacement::Source(replacement) => {
                self.sink.detach_upstream();
                replacement.subscribe(Arc::clone(&self.sink) as Arc<dyn Subscriber<T, E>>);
            },
            EmptyReplacement::Failure(error) => {
                self.sink.on_completion(Completion::Failure(error.clone()));
            },
        }
    }
}
