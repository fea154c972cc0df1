use never::Never;
use parking_lot::ReentrantMutex;
use std::{
    cell::Cell,
    sync::{
        atomic::{AtomicU64, Ordering as AtomicOrdering},
        Arc,
    },
};

use crate::{
    utils::{
        talkback::Talkback,
        tracing::{instrument, trace},
    },
    Completion, Demand, PassthroughSubject, Publisher, Sink, Source, Subscriber, Subscription,
};

#[cfg(feature = "tracing")]
use tracing::Span;

/// Operator that resubscribes to the source whenever a control stream emits, where the control
/// stream is built by `handler` from the failures of the source.
///
/// The source is subscribed once right away. Each time it fails, the failure is sent into the
/// stream given to `handler` instead of downstream, and the source is subscribed again on the next
/// value of the control stream. The source finishing finishes the resulting stream. The control
/// stream failing or finishing terminates the resulting stream in the same way.
///
/// Demand the downstream still has outstanding carries over to every new attempt.
///
/// # Examples
///
/// Retry up to two times, then give up with the last failure:
///
/// ```
/// use crossbeam_queue::SegQueue;
/// use std::sync::{
///     atomic::{AtomicUsize, Ordering},
///     Arc,
/// };
///
/// use tributary::{
///     for_each, materialize, retry_when, set_failure_type, try_map, Completion, Event, Source,
/// };
///
/// let attempts = Arc::new(AtomicUsize::new(0));
/// let source = Source::from_fn({
///     let attempts = Arc::clone(&attempts);
///     move |subscriber| {
///         let attempt = attempts.fetch_add(1, Ordering::SeqCst);
///         subscriber.on_subscribe(Arc::new(tributary::EmptySubscription));
///         subscriber.on_completion(Completion::Failure(format!("attempt {attempt} failed")));
///     }
/// });
///
/// let retried = retry_when(|errors| {
///     let retries = Arc::new(AtomicUsize::new(0));
///     try_map(move |error: String| {
///         if retries.fetch_add(1, Ordering::SeqCst) < 2 {
///             Ok(())
///         } else {
///             Err(error)
///         }
///     })(set_failure_type(errors))
/// })(source);
///
/// let actual = Arc::new(SegQueue::<Event<u8, String>>::new());
/// for_each({
///     let actual = Arc::clone(&actual);
///     move |event| actual.push(event)
/// })(materialize(retried));
///
/// assert_eq!(attempts.load(Ordering::SeqCst), 3);
/// assert_eq!(actual.pop(), Some(Event::Failure("attempt 2 failed".to_owned())));
/// ```
#[cfg_attr(feature = "tracing", tracing::instrument(level = "trace", skip_all))]
pub fn retry_when<T: 'static, E: 'static, C: 'static, S, H: 'static, P>(
    handler: H,
) -> Box<dyn Fn(S) -> Source<T, E>>
where
    T: Send,
    E: Clone + Send,
    C: Send,
    S: Publisher<T, E> + 'static,
    H: Fn(Source<E, Never>) -> P + Send + Sync + Clone,
    P: Publisher<C, E> + 'static,
{
    #[cfg(feature = "tracing")]
    let retry_fn_span = Span::current();
    Box::new(move |source| {
        let source = source.into_source();
        let handler = handler.clone();
        #[cfg(feature = "tracing")]
        let retry_fn_span = retry_fn_span.clone();
        Source::from_fn(move |subscriber: Arc<dyn Subscriber<T, E>>| {
            instrument!(parent: &retry_fn_span, "retry_when", retry_span);
            let relay = PassthroughSubject::<E, Never>::new();
            let retry = Arc::new(RetryWhen {
                source: source.clone(),
                sink: Sink::new(Arc::clone(&subscriber), Some, {
                    let relay = relay.clone();
                    move |error| {
                        relay.send(error);
                        None
                    }
                }),
                control: Talkback::new(),
                generation: AtomicU64::new(0),
                closed: ReentrantMutex::new(Cell::new(false)),
                #[cfg(feature = "tracing")]
                span: retry_span.clone(),
            });
            subscriber.on_subscribe(Arc::clone(&retry) as Arc<dyn Subscription>);
            handler(relay.into_source()).subscribe(Arc::new(Control {
                retry: Arc::clone(&retry),
            }));
            if !retry.closed.lock().get() {
                retry.attempt();
            }
        })
    })
}

struct RetryWhen<T, E> {
    source: Source<T, E>,
    /// Relays failures of the source to the control stream instead of downstream.
    sink: Sink<T, E, T, E>,
    control: Talkback,
    generation: AtomicU64,
    /// Held while values are delivered, so the stream cannot be terminated mid-delivery.
    closed: ReentrantMutex<Cell<bool>>,
    #[cfg(feature = "tracing")]
    span: Span,
}

impl<T, E> RetryWhen<T, E>
where
    T: Send + 'static,
    E: Send + 'static,
{
    fn attempt(self: &Arc<Self>) {
        if self.sink.buffer().is_closed() {
            return;
        }
        let generation = self.generation.fetch_add(1, AtomicOrdering::AcqRel) + 1;
        self.sink.cancel_upstream();
        trace!("subscribing to source, attempt {generation}");
        self.source.subscribe(Arc::new(Attempt {
            retry: Arc::clone(self),
            generation,
        }));
    }

    fn is_current(&self, generation: u64) -> bool {
        self.generation.load(AtomicOrdering::Acquire) == generation
    }
}

/// The subscriber for one subscription to the source.
struct Attempt<T, E> {
    retry: Arc<RetryWhen<T, E>>,
    generation: u64,
}

impl<T, E> Subscriber<T, E> for Attempt<T, E>
where
    T: Send + 'static,
    E: Send + 'static,
{
    fn on_subscribe(&self, subscription: Arc<dyn Subscription>) {
        if self.retry.closed.lock().get() || !self.retry.is_current(self.generation) {
            subscription.cancel();
            return;
        }
        self.retry.sink.on_subscribe(subscription);
    }

    fn on_value(&self, value: T) -> Demand {
        let closed = self.retry.closed.lock();
        if closed.get() || !self.retry.is_current(self.generation) {
            return Demand::NONE;
        }
        self.retry.sink.on_value(value)
    }

    fn on_completion(&self, completion: Completion<E>) {
        instrument!(parent: &self.retry.span, "attempt");
        let closed = self.retry.closed.lock();
        if closed.get() || !self.retry.is_current(self.generation) {
            return;
        }
        if let Completion::Finished = completion {
            closed.set(true);
            self.retry.control.cancel();
        } else {
            trace!("attempt {} failed", self.generation);
        }
        self.retry.sink.on_completion(completion);
    }
}

/// The subscriber for the stream built by the handler.
struct Control<T, E> {
    retry: Arc<RetryWhen<T, E>>,
}

impl<T, E, C> Subscriber<C, E> for Control<T, E>
where
    T: Send + 'static,
    E: Send + 'static,
{
    fn on_subscribe(&self, subscription: Arc<dyn Subscription>) {
        if self.retry.closed.lock().get() || self.retry.sink.buffer().is_closed() {
            subscription.cancel();
            return;
        }
        self.retry.control.store(Arc::clone(&subscription));
        subscription.request(Demand::Unlimited);
    }

    fn on_value(&self, _value: C) -> Demand {
        if self.retry.closed.lock().get() {
            return Demand::NONE;
        }
        self.retry.attempt();
        Demand::NONE
    }

    fn on_completion(&self, completion: Completion<E>) {
        instrument!(parent: &self.retry.span, "control");
        let closed = self.retry.closed.lock();
        if closed.replace(true) {
            return;
        }
        trace!("control stream terminated");
        self.retry.control.clear();
        self.retry.sink.cancel_upstream();
        self.retry.sink.buffer().complete_when_drained(completion);
    }
}

impl<T, E> Subscription for RetryWhen<T, E>
where
    T: Send,
    E: Send,
{
    fn request(&self, demand: Demand) {
        self.sink.request(demand);
    }

    fn cancel(&self) {
        self.sink.cancel();
        self.control.cancel();
    }
}
