use parking_lot::Mutex;
use std::{sync::Arc, time::Duration};

use crate::{
    CancelHandle, Completion, Demand, Publisher, Scheduler, Sink, Source, Subscriber,
    Subscription,
};

/// Operator that subscribes to the source only after `delay` has passed.
///
/// Demand requested in the meantime is forwarded once the source is subscribed. Cancelling before
/// the delay has passed means the source is never subscribed.
pub fn delay_subscription<T: 'static, E: 'static, S>(
    delay: Duration,
    scheduler: Arc<dyn Scheduler>,
) -> Box<dyn Fn(S) -> Source<T, E>>
where
    T: Send,
    E: Send,
    S: Publisher<T, E> + 'static,
{
    Box::new(move |source| {
        let source = source.into_source();
        let scheduler = Arc::clone(&scheduler);
        Source::from_fn(move |subscriber: Arc<dyn Subscriber<T, E>>| {
            let delayed = Arc::new(DelaySubscription {
                sink: Sink::new(Arc::clone(&subscriber), Some, Some),
                timer: Mutex::new(None),
                scheduler: Arc::clone(&scheduler),
            });
            subscriber.on_subscribe(Arc::clone(&delayed) as Arc<dyn Subscription>);
            let timer = scheduler.schedule_after(delay, {
                let source = source.clone();
                let delayed = Arc::clone(&delayed);
                Box::new(move || {
                    if !delayed.sink.buffer().is_closed() {
                        source.subscribe(delayed);
                    }
                })
            });
            *delayed.timer.lock() = Some(timer);
        })
    })
}

struct DelaySubscription<T, E> {
    sink: Sink<T, E, T, E>,
    timer: Mutex<Option<CancelHandle>>,
    scheduler: Arc<dyn Scheduler>,
}

impl<T, E> Subscriber<T, E> for DelaySubscription<T, E>
where
    T: Send,
    E: Send,
{
    fn on_subscribe(&self, subscription: Arc<dyn Subscription>) {
        self.timer.lock().take();
        self.sink.on_subscribe(subscription);
    }

    fn on_value(&self, value: T) -> Demand {
        self.sink.on_value(value)
    }

    fn on_completion(&self, completion: Completion<E>) {
        self.sink.on_completion(completion);
    }
}

impl<T, E> Subscription for DelaySubscription<T, E>
where
    T: Send,
    E: Send,
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
