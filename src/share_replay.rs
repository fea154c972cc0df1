use parking_lot::Mutex;
use std::{
    collections::VecDeque,
    sync::{
        atomic::{AtomicBool, AtomicU64, Ordering as AtomicOrdering},
        Arc, Weak,
    },
};

use crate::{
    utils::tracing::{instrument, trace},
    Completion, Demand, DemandBuffer, Publisher, Source, Subscriber, Subscription,
};

#[cfg(feature = "tracing")]
use tracing::Span;

/// How long a shared source keeps its upstream subscription and replay buffer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ShareScope {
    /// The upstream is subscribed at most once. Its values and completion are retained and
    /// replayed to every later subscriber, even after all subscribers have left.
    Forever,
    /// The upstream subscription lives while there is at least one subscriber. When the last
    /// subscriber leaves, or the upstream terminates, the replay buffer is cleared and the next
    /// subscriber connects to the upstream from scratch.
    WhileConnected,
}

/// Operator that multicasts one upstream subscription to many subscribers, replaying the last
/// `capacity` values to each new subscriber.
///
/// Every subscriber has its own buffer and demand, so a slow subscriber never holds back the
/// others. The upstream is asked for unlimited demand.
///
/// # Examples
///
/// ```
/// use crossbeam_queue::SegQueue;
/// use never::Never;
/// use std::sync::Arc;
///
/// use tributary::{for_each, share_replay, Completion, PassthroughSubject, ShareScope};
///
/// let subject = PassthroughSubject::<u8, Never>::new();
/// let shared = share_replay(1, ShareScope::Forever)(subject.clone());
///
/// let early = Arc::new(SegQueue::new());
/// for_each({
///     let early = Arc::clone(&early);
///     move |x| early.push(x)
/// })(shared.clone());
///
/// subject.send(1);
/// subject.send(2);
///
/// let late = Arc::new(SegQueue::new());
/// for_each({
///     let late = Arc::clone(&late);
///     move |x| late.push(x)
/// })(shared);
///
/// subject.send(3);
/// subject.send_completion(Completion::Finished);
///
/// assert_eq!(
///     &{
///         let mut v = vec![];
///         while let Some(x) = early.pop() {
///             v.push(x);
///         }
///         v
///     }[..],
///     [1, 2, 3]
/// );
/// assert_eq!(
///     &{
///         let mut v = vec![];
///         while let Some(x) = late.pop() {
///             v.push(x);
///         }
///         v
///     }[..],
///     [2, 3]
/// );
/// ```
#[cfg_attr(feature = "tracing", tracing::instrument(level = "trace"))]
pub fn share_replay<T: 'static, E: 'static, S>(
    capacity: usize,
    scope: ShareScope,
) -> Box<dyn Fn(S) -> Source<T, E>>
where
    T: Clone + Send,
    E: Clone + Send,
    S: Publisher<T, E> + 'static,
{
    #[cfg(feature = "tracing")]
    let share_fn_span = Span::current();
    Box::new(move |source| {
        ShareReplay {
            inner: Arc::new(ShareInner {
                upstream: source.into_source(),
                capacity,
                scope,
                next_id: AtomicU64::new(0),
                state: Mutex::new(ShareState {
                    replay: VecDeque::new(),
                    subscribers: vec![],
                    connection: Connection::Unconnected,
                    generation: 0,
                }),
                #[cfg(feature = "tracing")]
                span: share_fn_span.clone(),
            }),
        }
        .into_source()
    })
}

/// Operator that multicasts one upstream subscription to many subscribers without replaying
/// anything. Shorthand for `share_replay(0, ShareScope::WhileConnected)`.
pub fn share<T: 'static, E: 'static, S>(source: S) -> Source<T, E>
where
    T: Clone + Send,
    E: Clone + Send,
    S: Publisher<T, E> + 'static,
{
    share_replay(0, ShareScope::WhileConnected)(source)
}

struct ShareReplay<T, E> {
    inner: Arc<ShareInner<T, E>>,
}

struct ShareInner<T, E> {
    upstream: Source<T, E>,
    capacity: usize,
    scope: ShareScope,
    next_id: AtomicU64,
    state: Mutex<ShareState<T, E>>,
    #[cfg(feature = "tracing")]
    span: Span,
}

struct ShareState<T, E> {
    replay: VecDeque<T>,
    subscribers: Vec<(u64, Arc<DemandBuffer<T, E>>)>,
    connection: Connection<E>,
    /// Incremented on every connection, so callbacks from a torn-down upstream are told apart.
    generation: u64,
}

enum Connection<E> {
    Unconnected,
    Connected {
        upstream: Option<Arc<dyn Subscription>>,
    },
    Terminated(Completion<E>),
}

impl<T, E> ShareState<T, E> {
    fn is_current(&self, generation: u64) -> bool {
        self.generation == generation && matches!(self.connection, Connection::Connected { .. })
    }
}

impl<T, E> Publisher<T, E> for ShareReplay<T, E>
where
    T: Clone + Send + 'static,
    E: Clone + Send + 'static,
{
    fn subscribe(&self, subscriber: Arc<dyn Subscriber<T, E>>) {
        let buffer = Arc::new(DemandBuffer::new(Arc::clone(&subscriber)));
        let id = self.inner.next_id.fetch_add(1, AtomicOrdering::AcqRel);
        subscriber.on_subscribe(Arc::new(ShareSubscription {
            inner: Arc::clone(&self.inner),
            id,
            buffer: Arc::clone(&buffer),
            cancelled: AtomicBool::new(false),
        }));

        let connect = {
            let mut state = self.inner.state.lock();
            if buffer.is_closed() {
                return;
            }
            let stored = match &state.connection {
                Connection::Terminated(completion) => Some(completion.clone()),
                Connection::Unconnected | Connection::Connected { .. } => None,
            };
            let terminated = stored.is_some();
            buffer.preload(state.replay.iter().cloned(), stored);
            if terminated {
                None
            } else {
                state.subscribers.push((id, Arc::clone(&buffer)));
                if let Connection::Unconnected = state.connection {
                    state.generation += 1;
                    state.connection = Connection::Connected { upstream: None };
                    Some(state.generation)
                } else {
                    None
                }
            }
        };

        // the upstream is asked for everything, so leftover demand goes nowhere
        let _demand = buffer.flush();

        if let Some(generation) = connect {
            trace!("connecting to upstream, generation {generation}");
            self.inner.upstream.subscribe(Arc::new(ShareUpstream {
                inner: Arc::downgrade(&self.inner),
                generation,
            }));
        }
    }
}

/// The subscriber attached to the upstream on behalf of all downstream subscribers.
struct ShareUpstream<T, E> {
    inner: Weak<ShareInner<T, E>>,
    generation: u64,
}

impl<T, E> Subscriber<T, E> for ShareUpstream<T, E>
where
    T: Clone + Send,
    E: Clone + Send,
{
    fn on_subscribe(&self, subscription: Arc<dyn Subscription>) {
        let Some(inner) = self.inner.upgrade() else {
            subscription.cancel();
            return;
        };
        let accepted = {
            let mut state = inner.state.lock();
            let state = &mut *state;
            match &mut state.connection {
                Connection::Connected { upstream } if state.generation == self.generation => {
                    *upstream = Some(Arc::clone(&subscription));
                    true
                },
                _ => false,
            }
        };
        if accepted {
            subscription.request(Demand::Unlimited);
        } else {
            trace!("stale upstream subscription cancelled");
            subscription.cancel();
        }
    }

    fn on_value(&self, value: T) -> Demand {
        let Some(inner) = self.inner.upgrade() else {
            return Demand::NONE;
        };
        instrument!(parent: &inner.span, "share_upstream");
        let buffers: Vec<_> = {
            let mut state = inner.state.lock();
            if !state.is_current(self.generation) {
                return Demand::NONE;
            }
            if inner.capacity > 0 {
                if state.replay.len() == inner.capacity {
                    state.replay.pop_front();
                }
                state.replay.push_back(value.clone());
            }
            state
                .subscribers
                .iter()
                .map(|(_, buffer)| Arc::clone(buffer))
                .collect()
        };
        for buffer in buffers {
            buffer.buffer(value.clone());
        }
        Demand::NONE
    }

    fn on_completion(&self, completion: Completion<E>) {
        let Some(inner) = self.inner.upgrade() else {
            return;
        };
        instrument!(parent: &inner.span, "share_upstream");
        trace!("upstream terminated");
        let subscribers = {
            let mut state = inner.state.lock();
            if !state.is_current(self.generation) {
                return;
            }
            let subscribers = std::mem::take(&mut state.subscribers);
            match inner.scope {
                ShareScope::Forever => {
                    state.connection = Connection::Terminated(completion.clone());
                },
                ShareScope::WhileConnected => {
                    state.connection = Connection::Unconnected;
                    state.replay.clear();
                },
            }
            subscribers
        };
        for (_, buffer) in subscribers {
            buffer.complete_when_drained(completion.clone());
        }
    }
}

struct ShareSubscription<T, E> {
    inner: Arc<ShareInner<T, E>>,
    id: u64,
    buffer: Arc<DemandBuffer<T, E>>,
    cancelled: AtomicBool,
}

impl<T, E> Subscription for ShareSubscription<T, E>
where
    T: Send,
    E: Send,
{
    fn request(&self, demand: Demand) {
        self.buffer.demand(demand);
    }

    fn cancel(&self) {
        if self.cancelled.swap(true, AtomicOrdering::AcqRel) {
            return;
        }
        self.buffer.cancel();
        let upstream = {
            let mut state = self.inner.state.lock();
            state.subscribers.retain(|(id, _)| *id != self.id);
            if state.subscribers.is_empty() && self.inner.scope == ShareScope::WhileConnected {
                match std::mem::replace(&mut state.connection, Connection::Unconnected) {
                    Connection::Connected { upstream } => {
                        state.replay.clear();
                        upstream
                    },
                    connection => {
                        state.connection = connection;
                        None
                    },
                }
            } else {
                None
            }
        };
        if let Some(upstream) = upstream {
            trace!("last subscriber left, disconnecting from upstream");
            upstream.cancel();
        }
    }
}
