use parking_lot::ReentrantMutex;
use std::{cell::Cell, sync::Arc};

use crate::{
    utils::{talkback::Talkback, tracing::trace},
    Completion, Demand, DemandBuffer, Publisher, Source, Subscriber, Subscription,
};

/// Merges two sources, terminating with whichever terminal event comes first.
///
/// Every value of both sources is delivered, in the order each source emits them. The first
/// source to finish or fail terminates the merged stream, after the values already received have
/// been delivered, and the other source is cancelled. Downstream demand is requested from both
/// sources.
///
/// # Examples
///
/// ```
/// use crossbeam_queue::SegQueue;
/// use std::sync::Arc;
///
/// use tributary::{absorb, for_each, materialize, Completion, Event, PassthroughSubject};
///
/// let actual = Arc::new(SegQueue::new());
/// let main = PassthroughSubject::<u8, &str>::new();
/// let side = PassthroughSubject::<u8, &str>::new();
///
/// for_each({
///     let actual = Arc::clone(&actual);
///     move |event| actual.push(event)
/// })(materialize(absorb(main.clone(), side.clone())));
///
/// main.send(1);
/// side.send(2);
/// side.send_completion(Completion::Failure("disconnected"));
/// main.send(3);
///
/// assert_eq!(actual.pop(), Some(Event::Value(1)));
/// assert_eq!(actual.pop(), Some(Event::Value(2)));
/// assert_eq!(actual.pop(), Some(Event::Failure("disconnected")));
/// assert_eq!(actual.pop(), None);
/// assert_eq!(main.subscriber_count(), 0);
/// ```
pub fn absorb<T: 'static, E: 'static, A, B>(a: A, b: B) -> Source<T, E>
where
    T: Send,
    E: Send,
    A: Publisher<T, E> + 'static,
    B: Publisher<T, E> + 'static,
{
    let a = a.into_source();
    let b = b.into_source();
    Source::from_fn(move |subscriber: Arc<dyn Subscriber<T, E>>| {
        let merge = Arc::new(Absorb {
            buffer: DemandBuffer::new(Arc::clone(&subscriber)),
            legs: [Talkback::new(), Talkback::new()],
            ended: ReentrantMutex::new(Cell::new(false)),
        });
        subscriber.on_subscribe(Arc::clone(&merge) as Arc<dyn Subscription>);
        a.subscribe(Arc::new(AbsorbLeg {
            merge: Arc::clone(&merge),
            index: 0,
        }));
        b.subscribe(Arc::new(AbsorbLeg { merge, index: 1 }));
    })
}

struct Absorb<T, E> {
    buffer: DemandBuffer<T, E>,
    legs: [Talkback; 2],
    /// Held while a value is buffered or the merged stream terminates.
    ended: ReentrantMutex<Cell<bool>>,
}

struct AbsorbLeg<T, E> {
    merge: Arc<Absorb<T, E>>,
    index: usize,
}

impl<T, E> AbsorbLeg<T, E> {
    fn own(&self) -> &Talkback {
        &self.merge.legs[self.index]
    }

    fn other(&self) -> &Talkback {
        &self.merge.legs[1 - self.index]
    }
}

impl<T, E> Subscriber<T, E> for AbsorbLeg<T, E>
where
    T: Send,
    E: Send,
{
    fn on_subscribe(&self, subscription: Arc<dyn Subscription>) {
        let closed = |merge: &Absorb<T, E>| merge.buffer.is_closed() || merge.ended.lock().get();
        if closed(&self.merge) {
            subscription.cancel();
            return;
        }
        self.own().store(subscription);
        if closed(&self.merge) {
            self.own().cancel();
            return;
        }
        self.own().request(self.merge.buffer.outstanding());
    }

    fn on_value(&self, value: T) -> Demand {
        let ended = self.merge.ended.lock();
        if ended.get() {
            return Demand::NONE;
        }
        let demand = self.merge.buffer.buffer(value);
        drop(ended);
        self.other().request(demand);
        demand
    }

    fn on_completion(&self, completion: Completion<E>) {
        let ended = self.merge.ended.lock();
        if ended.replace(true) {
            return;
        }
        trace!("source {} terminated the merge", self.index);
        self.own().clear();
        self.other().cancel();
        self.merge.buffer.complete_when_drained(completion);
    }
}

impl<T, E> Subscription for Absorb<T, E>
where
    T: Send,
    E: Send,
{
    fn request(&self, demand: Demand) {
        let demand = self.buffer.demand(demand);
        for leg in &self.legs {
            leg.request(demand);
        }
    }

    fn cancel(&self) {
        self.buffer.cancel();
        for leg in &self.legs {
            leg.cancel();
        }
    }
}
