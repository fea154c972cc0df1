use parking_lot::{Mutex, MutexGuard};
use std::{collections::VecDeque, sync::Arc};

use crate::{utils::tracing::trace, Completion, Demand, Subscriber};

/// Reconciles values pushed by a producer with the demand requested by one subscriber.
///
/// Values are delivered strictly in the order they were buffered and never beyond the requested
/// demand. Delivery happens outside the internal lock through a single drain loop: a call that
/// arrives while another call is draining (re-entrantly from inside a subscriber callback, or from
/// another thread) only records its effect and leaves the delivery to the active drain loop, so
/// deliveries to the subscriber are always serialized.
///
/// The [`Demand`] returned by [`buffer`](Self::buffer), [`demand`](Self::demand) and
/// [`flush`](Self::flush) is the net new demand that should be forwarded upstream.
pub struct DemandBuffer<T, E> {
    subscriber: Arc<dyn Subscriber<T, E>>,
    state: Mutex<State<T, E>>,
}

struct State<T, E> {
    queue: VecDeque<T>,
    requested: Demand,
    processed: usize,
    sent: Demand,
    pending: Option<Pending<E>>,
    phase: Phase,
    draining: bool,
}

struct Pending<E> {
    completion: Completion<E>,
    drain_first: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Phase {
    Open,
    Completing,
    Completed,
    Cancelled,
}

impl<T, E> DemandBuffer<T, E> {
    pub fn new(subscriber: Arc<dyn Subscriber<T, E>>) -> Self {
        DemandBuffer {
            subscriber,
            state: Mutex::new(State {
                queue: VecDeque::new(),
                requested: Demand::NONE,
                processed: 0,
                sent: Demand::NONE,
                pending: None,
                phase: Phase::Open,
                draining: false,
            }),
        }
    }

    /// Buffers a value and delivers whatever the current demand allows.
    ///
    /// Values buffered after the subscriber cancelled are dropped.
    ///
    /// # Panics
    ///
    /// Panics if called after [`complete`](Self::complete).
    pub fn buffer(&self, value: T) -> Demand {
        let mut state = self.state.lock();
        match state.phase {
            Phase::Open => {},
            Phase::Cancelled => return Demand::NONE,
            Phase::Completing | Phase::Completed => {
                panic!("value buffered after completion");
            },
        }
        state.queue.push_back(value);
        self.drain(state)
    }

    /// Terminates the subscriber, discarding buffered values that the current demand does not
    /// cover. Only the first terminal event counts.
    pub fn complete(&self, completion: Completion<E>) {
        self.finish(completion, false);
    }

    /// Terminates the subscriber once every buffered value has been delivered.
    pub fn complete_when_drained(&self, completion: Completion<E>) {
        self.finish(completion, true);
    }

    fn finish(&self, completion: Completion<E>, drain_first: bool) {
        let mut state = self.state.lock();
        if state.phase != Phase::Open {
            trace!("ignoring completion, buffer is no longer open");
            return;
        }
        state.phase = Phase::Completing;
        state.pending = Some(Pending {
            completion,
            drain_first,
        });
        // a completing buffer asks for nothing more
        let _demand = self.drain(state);
    }

    /// Seeds the buffer with values, and optionally a terminal event to deliver after them,
    /// without delivering anything.
    pub fn preload<I>(&self, values: I, completion: Option<Completion<E>>)
    where
        I: IntoIterator<Item = T>,
    {
        let mut state = self.state.lock();
        if state.phase != Phase::Open {
            return;
        }
        state.queue.extend(values);
        if let Some(completion) = completion {
            state.phase = Phase::Completing;
            state.pending = Some(Pending {
                completion,
                drain_first: true,
            });
        }
    }

    /// Adds subscriber demand and delivers whatever it allows.
    pub fn demand(&self, demand: Demand) -> Demand {
        let mut state = self.state.lock();
        if matches!(state.phase, Phase::Completed | Phase::Cancelled) {
            return Demand::NONE;
        }
        state.requested += demand;
        self.drain(state)
    }

    /// Delivers whatever the current demand allows.
    pub fn flush(&self) -> Demand {
        let state = self.state.lock();
        self.drain(state)
    }

    /// Records demand that was already forwarded upstream by other means.
    pub fn credit(&self, demand: Demand) {
        self.state.lock().sent += demand;
    }

    /// The demand requested by the subscriber that no delivered value has used up yet.
    pub fn outstanding(&self) -> Demand {
        let state = self.state.lock();
        state.requested - Demand::max(state.processed)
    }

    /// Drops buffered values and stops all further deliveries.
    ///
    /// Returns `false` if the buffer had already been cancelled or completed.
    pub fn cancel(&self) -> bool {
        let mut state = self.state.lock();
        if matches!(state.phase, Phase::Completed | Phase::Cancelled) {
            return false;
        }
        state.phase = Phase::Cancelled;
        state.queue.clear();
        state.pending = None;
        true
    }

    /// Whether the subscriber has been terminated, by cancellation or by a delivered completion.
    pub fn is_closed(&self) -> bool {
        matches!(
            self.state.lock().phase,
            Phase::Completed | Phase::Cancelled
        )
    }

    fn drain<'a>(&'a self, mut state: MutexGuard<'a, State<T, E>>) -> Demand {
        if state.draining {
            return Demand::NONE;
        }
        state.draining = true;
        loop {
            if matches!(state.phase, Phase::Completed | Phase::Cancelled) {
                state.draining = false;
                return Demand::NONE;
            }
            if state.requested.exceeds(state.processed) {
                if let Some(value) = state.queue.pop_front() {
                    state.processed += 1;
                    drop(state);
                    let more = self.subscriber.on_value(value);
                    state = self.state.lock();
                    state.requested += more;
                    continue;
                }
            }
            match state.pending.take() {
                Some(pending) if pending.drain_first && !state.queue.is_empty() => {
                    state.pending = Some(pending);
                },
                Some(pending) => {
                    state.phase = Phase::Completed;
                    state.queue.clear();
                    state.draining = false;
                    drop(state);
                    self.subscriber.on_completion(pending.completion);
                    return Demand::NONE;
                },
                None => {},
            }
            break;
        }
        state.draining = false;
        let delta = state.requested - state.sent;
        state.sent += delta;
        delta
    }
}
