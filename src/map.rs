use never::Never;
use std::sync::{
    atomic::{AtomicBool, Ordering as AtomicOrdering},
    Arc,
};

use crate::{Completion, Demand, Publisher, Sink, Source, Subscriber, Subscription};

/// Operator that applies a transformation on data passing through it.
///
/// # Examples
///
/// ```
/// use crossbeam_queue::SegQueue;
/// use never::Never;
/// use std::sync::Arc;
///
/// use tributary::{for_each, from_iter, map, pipe};
///
/// let actual = Arc::new(SegQueue::new());
///
/// pipe!(
///     from_iter::<_, Never, _>([1, 2, 3]),
///     map(|x| x * 10),
///     for_each({
///         let actual = Arc::clone(&actual);
///         move |x| actual.push(x)
///     }),
/// );
///
/// assert_eq!(
///     &{
///         let mut v = vec![];
///         while let Some(x) = actual.pop() {
///             v.push(x);
///         }
///         v
///     }[..],
///     [10, 20, 30]
/// );
/// ```
pub fn map<T: 'static, U: 'static, E: 'static, S, F: 'static>(
    f: F,
) -> Box<dyn Fn(S) -> Source<U, E>>
where
    U: Send,
    E: Send,
    S: Publisher<T, E> + 'static,
    F: Fn(T) -> U + Send + Sync + Clone,
{
    Box::new(move |source| {
        let source = source.into_source();
        let f = f.clone();
        Source::from_fn(move |subscriber: Arc<dyn Subscriber<U, E>>| {
            let f = f.clone();
            let sink = Arc::new(Sink::new(
                Arc::clone(&subscriber),
                move |value| Some(f(value)),
                Some,
            ));
            subscriber.on_subscribe(Arc::clone(&sink) as Arc<dyn Subscription>);
            source.subscribe(sink);
        })
    })
}

/// Operator that changes the failure type of a source that cannot fail.
pub fn set_failure_type<T: 'static, E: 'static, S>(source: S) -> Source<T, E>
where
    T: Send,
    E: Send,
    S: Publisher<T, Never> + 'static,
{
    let source = source.into_source();
    Source::from_fn(move |subscriber: Arc<dyn Subscriber<T, E>>| {
        let sink = Arc::new(Sink::new(
            Arc::clone(&subscriber),
            Some,
            |never: Never| match never {},
        ));
        subscriber.on_subscribe(Arc::clone(&sink) as Arc<dyn Subscription>);
        source.subscribe(sink);
    })
}

/// Operator that applies a fallible transformation, terminating with the first error it returns.
///
/// Upstream failures pass through unchanged.
pub fn try_map<T: 'static, U: 'static, E: 'static, S, F: 'static>(
    f: F,
) -> Box<dyn Fn(S) -> Source<U, E>>
where
    U: Send,
    E: Send,
    S: Publisher<T, E> + 'static,
    F: Fn(T) -> Result<U, E> + Send + Sync + Clone,
{
    Box::new(move |source| {
        let source = source.into_source();
        let f = f.clone();
        Source::from_fn(move |subscriber: Arc<dyn Subscriber<U, E>>| {
            let try_map = Arc::new(TryMap {
                f: f.clone(),
                sink: Sink::new(Arc::clone(&subscriber), Some, Some),
                failed: AtomicBool::new(false),
            });
            subscriber.on_subscribe(Arc::clone(&try_map) as Arc<dyn Subscription>);
            source.subscribe(try_map);
        })
    })
}

struct TryMap<U, E, F> {
    f: F,
    sink: Sink<U, E, U, E>,
    failed: AtomicBool,
}

impl<T, U, E, F> Subscriber<T, E> for TryMap<U, E, F>
where
    U: Send,
    E: Send,
    F: Fn(T) -> Result<U, E> + Send + Sync,
{
    fn on_subscribe(&self, subscription: Arc<dyn Subscription>) {
        self.sink.on_subscribe(subscription);
    }

    fn on_value(&self, value: T) -> Demand {
        if self.failed.load(AtomicOrdering::Acquire) {
            return Demand::NONE;
        }
        match (self.f)(value) {
            Ok(value) => self.sink.on_value(value),
            Err(error) => {
                self.failed.store(true, AtomicOrdering::Release);
                self.sink.cancel_upstream();
                self.sink.buffer().complete(Completion::Failure(error));
                Demand::NONE
            },
        }
    }

    fn on_completion(&self, completion: Completion<E>) {
        if !self.failed.load(AtomicOrdering::Acquire) {
            self.sink.on_completion(completion);
        }
    }
}

impl<U, E, F> Subscription for TryMap<U, E, F>
where
    U: Send,
    E: Send,
    F: Send + Sync,
{
    fn request(&self, demand: Demand) {
        self.sink.request(demand);
    }

    fn cancel(&self) {
        self.sink.cancel();
    }
}
