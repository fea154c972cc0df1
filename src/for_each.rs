use std::sync::{
    atomic::{AtomicBool, Ordering as AtomicOrdering},
    Arc,
};

use crate::{
    utils::{talkback::Talkback, tracing::trace},
    Completion, Demand, Publisher, Subscriber, Subscription,
};

/// Sink that consumes a source one value at a time, calling `f` for every value.
///
/// It requests a single value on subscription and one more after each value. The terminal event
/// is dropped.
///
/// The returned [`Cancellable`] stops the consumption.
///
/// # Examples
///
/// ```
/// use crossbeam_queue::SegQueue;
/// use never::Never;
/// use std::sync::Arc;
///
/// use tributary::{for_each, PassthroughSubject};
///
/// let actual = Arc::new(SegQueue::new());
/// let subject = PassthroughSubject::<u8, Never>::new();
///
/// let consumption = for_each({
///     let actual = Arc::clone(&actual);
///     move |x| actual.push(x)
/// })(subject.clone());
///
/// subject.send(1);
/// consumption.cancel();
/// subject.send(2);
///
/// assert_eq!(actual.pop(), Some(1));
/// assert_eq!(actual.pop(), None);
/// ```
pub fn for_each<T: 'static, E: 'static, S, F: 'static>(f: F) -> Box<dyn Fn(S) -> Cancellable>
where
    S: Publisher<T, E> + 'static,
    F: Fn(T) + Send + Sync + Clone,
{
    Box::new(move |source| {
        let consumer = Arc::new(ForEach {
            f: f.clone(),
            upstream: Talkback::new(),
            done: AtomicBool::new(false),
        });
        source.subscribe(Arc::clone(&consumer) as Arc<dyn Subscriber<T, E>>);
        Cancellable(consumer)
    })
}

/// Handle to a running consumption.
pub struct Cancellable(Arc<dyn Subscription>);

impl Cancellable {
    /// Cancels the subscription. Idempotent.
    pub fn cancel(&self) {
        self.0.cancel();
    }
}

impl std::fmt::Debug for Cancellable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cancellable").finish_non_exhaustive()
    }
}

struct ForEach<F> {
    f: F,
    upstream: Talkback,
    done: AtomicBool,
}

impl<T, E, F> Subscriber<T, E> for ForEach<F>
where
    F: Fn(T) + Send + Sync,
{
    fn on_subscribe(&self, subscription: Arc<dyn Subscription>) {
        if self.done.load(AtomicOrdering::Acquire) {
            subscription.cancel();
            return;
        }
        self.upstream.store(subscription);
        self.upstream.request(Demand::max(1));
    }

    fn on_value(&self, value: T) -> Demand {
        if self.done.load(AtomicOrdering::Acquire) {
            return Demand::NONE;
        }
        (self.f)(value);
        Demand::max(1)
    }

    fn on_completion(&self, completion: Completion<E>) {
        self.done.store(true, AtomicOrdering::Release);
        self.upstream.clear();
        if completion.is_failure() {
            trace!("consumed source failed");
        } else {
            trace!("consumed source finished");
        }
    }
}

impl<F> Subscription for ForEach<F>
where
    F: Send + Sync,
{
    fn request(&self, demand: Demand) {
        self.upstream.request(demand);
    }

    fn cancel(&self) {
        self.done.store(true, AtomicOrdering::Release);
        self.upstream.cancel();
    }
}
