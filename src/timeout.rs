use parking_lot::{Mutex, ReentrantMutex};
use std::{
    cell::Cell,
    sync::{Arc, Weak},
    time::Duration,
};

use crate::{
    utils::tracing::trace, CancelHandle, Completion, Demand, Publisher, Scheduler, Sink, Source,
    Subscriber, Subscription,
};

/// Operator that fails with `make_failure()` if the source has not emitted its first value within
/// `duration` of being subscribed.
///
/// Once a value has arrived the timer is disarmed and the source is mirrored as is. A source that
/// terminates before the deadline terminates the resulting stream the same way.
pub fn timeout<T: 'static, E: 'static, S, F: 'static>(
    duration: Duration,
    scheduler: Arc<dyn Scheduler>,
    make_failure: F,
) -> Box<dyn Fn(S) -> Source<T, E>>
where
    T: Send,
    E: Send,
    S: Publisher<T, E> + 'static,
    F: Fn() -> E + Send + Sync + Clone,
{
    Box::new(move |source| {
        let source = source.into_source();
        let scheduler = Arc::clone(&scheduler);
        let make_failure = make_failure.clone();
        Source::from_fn(move |subscriber: Arc<dyn Subscriber<T, E>>| {
            let timeout = Arc::new(Timeout {
                sink: Sink::new(Arc::clone(&subscriber), Some, Some),
                phase: ReentrantMutex::new(Cell::new(Phase::Waiting)),
                timer: Mutex::new(None),
                scheduler: Arc::clone(&scheduler),
                make_failure: make_failure.clone(),
            });
            subscriber.on_subscribe(Arc::clone(&timeout) as Arc<dyn Subscription>);
            let timer = scheduler.schedule_after(duration, {
                let timeout = Arc::downgrade(&timeout);
                Box::new(move || {
                    if let Some(timeout) = Weak::upgrade(&timeout) {
                        timeout.expire();
                    }
                })
            });
            *timeout.timer.lock() = Some(timer);
            source.subscribe(timeout);
        })
    })
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Phase {
    Waiting,
    Flowing,
    Done,
}

struct Timeout<T, E, F> {
    sink: Sink<T, E, T, E>,
    /// Held while values are delivered, so the deadline cannot complete the stream mid-delivery.
    phase: ReentrantMutex<Cell<Phase>>,
    timer: Mutex<Option<CancelHandle>>,
    scheduler: Arc<dyn Scheduler>,
    make_failure: F,
}

impl<T, E, F> Timeout<T, E, F>
where
    T: Send,
    E: Send,
    F: Fn() -> E,
{
    fn disarm(&self) {
        if let Some(timer) = self.timer.lock().take() {
            self.scheduler.cancel(&timer);
        }
    }

    fn expire(&self) {
        let phase = self.phase.lock();
        if phase.get() != Phase::Waiting {
            return;
        }
        phase.set(Phase::Done);
        trace!("no value before the deadline");
        self.sink.cancel_upstream();
        self.sink
            .buffer()
            .complete(Completion::Failure((self.make_failure)()));
    }
}

impl<T, E, F> Subscriber<T, E> for Timeout<T, E, F>
where
    T: Send,
    E: Send,
    F: Fn() -> E + Send + Sync,
{
    fn on_subscribe(&self, subscription: Arc<dyn Subscription>) {
        if self.phase.lock().get() == Phase::Done {
            subscription.cancel();
            return;
        }
        self.sink.on_subscribe(subscription);
    }

    fn on_value(&self, value: T) -> Demand {
        let phase = self.phase.lock();
        match phase.get() {
            Phase::Waiting => {
                phase.set(Phase::Flowing);
                self.disarm();
            },
            Phase::Flowing => {},
            Phase::Done => return Demand::NONE,
        }
        self.sink.on_value(value)
    }

    fn on_completion(&self, completion: Completion<E>) {
        let phase = self.phase.lock();
        if phase.replace(Phase::Done) == Phase::Done {
            return;
        }
        self.disarm();
        self.sink.on_completion(completion);
    }
}

impl<T, E, F> Subscription for Timeout<T, E, F>
where
    T: Send,
    E: Send,
    F: Send + Sync,
{
    fn request(&self, demand: Demand) {
        self.sink.request(demand);
    }

    fn cancel(&self) {
        self.sink.cancel();
        if let Some(timer) = self.timer.lock().take() {
            self.scheduler.cancel(&timer);
        }
    }
}
