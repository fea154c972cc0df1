use parking_lot::{Mutex, ReentrantMutex};
use std::sync::{
    atomic::{AtomicU64, Ordering as AtomicOrdering},
    Arc,
};

use crate::{Completion, Demand, DemandBuffer, Publisher, Subscriber, Subscription};

/// A hot source that multicasts values sent to it imperatively.
///
/// Every subscriber gets its own [`DemandBuffer`], so a subscriber without demand buffers values
/// instead of losing them or holding others back. Values sent before a subscriber arrived are not
/// replayed to it. Subscribing after completion yields the completion immediately.
///
/// This is the entry point through which callback-driven event producers push into a pipeline.
///
/// # Examples
///
/// ```
/// use crossbeam_queue::SegQueue;
/// use never::Never;
/// use std::sync::Arc;
///
/// use tributary::{for_each, Completion, PassthroughSubject};
///
/// let actual = Arc::new(SegQueue::new());
///
/// let subject = PassthroughSubject::<u8, Never>::new();
///
/// for_each({
///     let actual = Arc::clone(&actual);
///     move |x| {
///         println!("{x}");
///         actual.push(x);
///     }
/// })(subject.clone());
///
/// subject.send(1);
/// subject.send(2);
/// subject.send_completion(Completion::Finished);
/// subject.send(3);
///
/// assert_eq!(
///     &{
///         let mut v = vec![];
///         while let Some(x) = actual.pop() {
///             v.push(x);
///         }
///         v
///     }[..],
///     [1, 2]
/// );
/// ```
pub struct PassthroughSubject<T, E> {
    inner: Arc<SubjectInner<T, E>>,
}

struct SubjectInner<T, E> {
    state: Mutex<SubjectState<T, E>>,
    /// Held while sending, so a completion sent from another thread cannot overtake a value.
    sending: ReentrantMutex<()>,
    next_id: AtomicU64,
}

struct SubjectState<T, E> {
    subscribers: Vec<(u64, Arc<DemandBuffer<T, E>>)>,
    completion: Option<Completion<E>>,
}

struct SubjectSubscription<T, E> {
    inner: Arc<SubjectInner<T, E>>,
    id: u64,
    buffer: Arc<DemandBuffer<T, E>>,
}

impl<T, E> PassthroughSubject<T, E> {
    pub fn new() -> Self {
        PassthroughSubject {
            inner: Arc::new(SubjectInner {
                state: Mutex::new(SubjectState {
                    subscribers: vec![],
                    completion: None,
                }),
                sending: ReentrantMutex::new(()),
                next_id: AtomicU64::new(0),
            }),
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner.state.lock().subscribers.len()
    }
}

impl<T, E> PassthroughSubject<T, E>
where
    T: Clone + Send,
    E: Clone + Send,
{
    /// Pushes a value to every current subscriber. Ignored after completion.
    pub fn send(&self, value: T) {
        let _sending = self.inner.sending.lock();
        let subscribers: Vec<_> = {
            let state = self.inner.state.lock();
            if state.completion.is_some() {
                return;
            }
            state
                .subscribers
                .iter()
                .map(|(_, buffer)| Arc::clone(buffer))
                .collect()
        };
        for buffer in subscribers {
            buffer.buffer(value.clone());
        }
    }

    /// Terminates every current and future subscriber. Only the first completion counts.
    pub fn send_completion(&self, completion: Completion<E>) {
        let _sending = self.inner.sending.lock();
        let subscribers = {
            let mut state = self.inner.state.lock();
            if state.completion.is_some() {
                return;
            }
            state.completion = Some(completion.clone());
            std::mem::take(&mut state.subscribers)
        };
        for (_, buffer) in subscribers {
            buffer.complete_when_drained(completion.clone());
        }
    }
}

impl<T, E> Default for PassthroughSubject<T, E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T, E> Clone for PassthroughSubject<T, E> {
    fn clone(&self) -> Self {
        PassthroughSubject {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T, E> Publisher<T, E> for PassthroughSubject<T, E>
where
    T: Send + 'static,
    E: Clone + Send + 'static,
{
    fn subscribe(&self, subscriber: Arc<dyn Subscriber<T, E>>) {
        let buffer = Arc::new(DemandBuffer::new(Arc::clone(&subscriber)));
        let id = self.inner.next_id.fetch_add(1, AtomicOrdering::AcqRel);
        subscriber.on_subscribe(Arc::new(SubjectSubscription {
            inner: Arc::clone(&self.inner),
            id,
            buffer: Arc::clone(&buffer),
        }));
        let completion = {
            let mut state = self.inner.state.lock();
            if buffer.is_closed() {
                return;
            }
            let completion = state.completion.clone();
            if completion.is_none() {
                state.subscribers.push((id, Arc::clone(&buffer)));
            }
            completion
        };
        if let Some(completion) = completion {
            buffer.complete(completion);
        }
    }
}

impl<T, E> Subscription for SubjectSubscription<T, E>
where
    T: Send,
    E: Send,
{
    fn request(&self, demand: Demand) {
        self.buffer.demand(demand);
    }

    fn cancel(&self) {
        if self.buffer.cancel() {
            let mut state = self.inner.state.lock();
            state.subscribers.retain(|(id, _)| *id != self.id);
        }
    }
}
