use std::sync::Arc;

use crate::{
    utils::{talkback::Talkback, tracing::trace},
    Completion, Demand, DemandBuffer, Subscriber, Subscription,
};

type TransformValue<T, U> = Box<dyn Fn(T) -> Option<U> + Send + Sync>;
type TransformFailure<E, F> = Box<dyn Fn(E) -> Option<F> + Send + Sync>;

/// Generic "one upstream, one downstream" adapter.
///
/// A `Sink` subscribes to an upstream publisher as a [`Subscriber<T, E>`], transforms what it
/// receives, and forwards the result to the downstream subscriber through its own
/// [`DemandBuffer`]. It also serves as the [`Subscription`] handed to the downstream subscriber.
///
/// - A value transform returning `None` drops the value; the unit of upstream demand it used up is
///   given back so the downstream accounting is unaffected.
/// - A failure transform returning `None` swallows the failure: the upstream is detached but the
///   downstream stays open, so the sink may be subscribed to another upstream.
///
/// Each time the sink receives a new upstream subscription it requests the demand the downstream
/// still has outstanding, which makes resubscription (retrying, switching to a fallback) exact.
pub struct Sink<T, E, U, F> {
    buffer: DemandBuffer<U, F>,
    upstream: Talkback,
    transform_value: TransformValue<T, U>,
    transform_failure: TransformFailure<E, F>,
}

impl<T, E, U, F> Sink<T, E, U, F> {
    pub fn new<TV, TF>(
        downstream: Arc<dyn Subscriber<U, F>>,
        transform_value: TV,
        transform_failure: TF,
    ) -> Self
    where
        TV: Fn(T) -> Option<U> + Send + Sync + 'static,
        TF: Fn(E) -> Option<F> + Send + Sync + 'static,
    {
        Sink {
            buffer: DemandBuffer::new(downstream),
            upstream: Talkback::new(),
            transform_value: Box::new(transform_value),
            transform_failure: Box::new(transform_failure),
        }
    }

    pub fn buffer(&self) -> &DemandBuffer<U, F> {
        &self.buffer
    }

    /// Cancels the current upstream subscription, if any, leaving the downstream open.
    pub fn cancel_upstream(&self) {
        self.upstream.cancel();
    }

    /// Forgets the current upstream subscription without cancelling it, for upstreams that have
    /// terminated.
    pub fn detach_upstream(&self) {
        self.upstream.clear();
    }

    pub fn has_upstream(&self) -> bool {
        self.upstream.is_set()
    }
}

impl<T, E, U, F> Subscriber<T, E> for Sink<T, E, U, F>
where
    U: Send,
    F: Send,
{
    fn on_subscribe(&self, subscription: Arc<dyn Subscription>) {
        if self.buffer.is_closed() {
            subscription.cancel();
            return;
        }
        self.upstream.store(Arc::clone(&subscription));
        let outstanding = self.buffer.outstanding();
        if !outstanding.is_none() {
            subscription.request(outstanding);
        }
    }

    fn on_value(&self, value: T) -> Demand {
        match (self.transform_value)(value) {
            Some(value) => self.buffer.buffer(value),
            None => Demand::max(1),
        }
    }

    fn on_completion(&self, completion: Completion<E>) {
        self.upstream.clear();
        match completion {
            Completion::Finished => {
                self.buffer.complete(Completion::Finished);
            },
            Completion::Failure(error) => {
                if let Some(error) = (self.transform_failure)(error) {
                    self.buffer.complete(Completion::Failure(error));
                } else {
                    trace!("upstream failure swallowed by sink");
                }
            },
        }
    }
}

impl<T, E, U, F> Subscription for Sink<T, E, U, F>
where
    U: Send,
    F: Send,
{
    fn request(&self, demand: Demand) {
        let demand = self.buffer.demand(demand);
        self.upstream.request(demand);
    }

    fn cancel(&self) {
        self.buffer.cancel();
        self.upstream.cancel();
    }
}
