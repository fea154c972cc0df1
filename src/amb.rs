use parking_lot::Mutex;
use std::sync::{
    atomic::{AtomicBool, Ordering as AtomicOrdering},
    Arc,
};

use crate::{
    empty,
    utils::{talkback::Talkback, tracing::trace},
    Completion, Demand, DemandBuffer, Publisher, Source, Subscriber, Subscription,
};

/// Races two sources: whichever emits a value or terminates first is mirrored, the other one is
/// cancelled.
///
/// Both sources are subscribed with a demand of `1` to find out which one is first. Downstream
/// demand requested before that is held back and handed to the winner afterwards.
///
/// Exactly one source wins. When both signal at the same time, the winner is whichever gets to
/// decide first, which for sources that emit synchronously on subscription is `a`.
///
/// # Examples
///
/// ```
/// use crossbeam_queue::SegQueue;
/// use never::Never;
/// use std::sync::Arc;
///
/// use tributary::{amb, for_each, from_iter, PassthroughSubject};
///
/// let actual = Arc::new(SegQueue::new());
/// let silent = PassthroughSubject::<u8, Never>::new();
///
/// for_each({
///     let actual = Arc::clone(&actual);
///     move |x| actual.push(x)
/// })(amb(silent.clone(), from_iter([1, 2])));
///
/// assert_eq!(silent.subscriber_count(), 0);
///
/// assert_eq!(actual.pop(), Some(1));
/// assert_eq!(actual.pop(), Some(2));
/// assert_eq!(actual.pop(), None);
/// ```
pub fn amb<T: 'static, E: 'static, A, B>(a: A, b: B) -> Source<T, E>
where
    T: Send,
    E: Send,
    A: Publisher<T, E> + 'static,
    B: Publisher<T, E> + 'static,
{
    let a = a.into_source();
    let b = b.into_source();
    Source::from_fn(move |subscriber: Arc<dyn Subscriber<T, E>>| {
        let race = Arc::new(Amb {
            buffer: DemandBuffer::new(Arc::clone(&subscriber)),
            state: Mutex::new(AmbState {
                decision: None,
                pre_decision_demand: Demand::NONE,
            }),
            legs: [Talkback::new(), Talkback::new()],
            cancelled: AtomicBool::new(false),
        });
        subscriber.on_subscribe(Arc::clone(&race) as Arc<dyn Subscription>);
        a.subscribe(Arc::new(AmbLeg {
            race: Arc::clone(&race),
            side: Side::First,
        }));
        b.subscribe(Arc::new(AmbLeg {
            race,
            side: Side::Second,
        }));
    })
}

/// Races any number of sources by folding them pairwise with [`amb`], left to right.
///
/// No sources at all finish immediately.
pub fn amb_all<T: 'static, E: 'static, I>(sources: I) -> Source<T, E>
where
    T: Send,
    E: Send,
    I: IntoIterator<Item = Source<T, E>>,
{
    let mut sources = sources.into_iter();
    let Some(first) = sources.next() else {
        return empty();
    };
    sources.fold(first, amb)
}

/// Races any number of sources, see [`amb`].
///
/// # Examples
///
/// ```
/// use never::Never;
/// use tributary::{amb, empty, from_iter, just, Source};
///
/// let _: Source<u8, Never> = amb!(empty(), just(1), from_iter([2, 3]));
/// ```
#[macro_export]
macro_rules! amb {
    ($a:expr $(,)?) => { $crate::Publisher::into_source($a) };
    ($a:expr, $b:expr $(, $rest:expr)* $(,)?) => {
        $crate::amb!($crate::amb($a, $b) $(, $rest)*)
    };
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Side {
    First,
    Second,
}

impl Side {
    fn index(self) -> usize {
        match self {
            Side::First => 0,
            Side::Second => 1,
        }
    }

    fn other(self) -> Side {
        match self {
            Side::First => Side::Second,
            Side::Second => Side::First,
        }
    }
}

struct Amb<T, E> {
    buffer: DemandBuffer<T, E>,
    state: Mutex<AmbState>,
    legs: [Talkback; 2],
    cancelled: AtomicBool,
}

struct AmbState {
    decision: Option<Side>,
    pre_decision_demand: Demand,
}

enum Race {
    /// This side just won; carries the demand held back until now.
    Won(Demand),
    Winning,
    Lost,
}

impl<T, E> Amb<T, E> {
    fn leg(&self, side: Side) -> &Talkback {
        &self.legs[side.index()]
    }

    fn decide(&self, side: Side) -> Race {
        let mut state = self.state.lock();
        match state.decision {
            None => {
                state.decision = Some(side);
                Race::Won(std::mem::take(&mut state.pre_decision_demand))
            },
            Some(decision) if decision == side => Race::Winning,
            Some(_) => Race::Lost,
        }
    }
}

struct AmbLeg<T, E> {
    race: Arc<Amb<T, E>>,
    side: Side,
}

impl<T, E> Subscriber<T, E> for AmbLeg<T, E>
where
    T: Send,
    E: Send,
{
    fn on_subscribe(&self, subscription: Arc<dyn Subscription>) {
        let lost = |race: &Amb<T, E>| {
            race.cancelled.load(AtomicOrdering::Acquire)
                || race.state.lock().decision == Some(self.side.other())
        };
        if lost(&self.race) {
            subscription.cancel();
            return;
        }
        let leg = self.race.leg(self.side);
        leg.store(Arc::clone(&subscription));
        // the other side may have won in between
        if lost(&self.race) {
            leg.cancel();
            return;
        }
        if self.race.state.lock().decision == Some(self.side) {
            leg.request(self.race.buffer.outstanding());
        } else {
            subscription.request(Demand::max(1));
        }
    }

    fn on_value(&self, value: T) -> Demand {
        match self.race.decide(self.side) {
            Race::Won(pre_decision_demand) => {
                trace!("{:?} source won the race with a value", self.side);
                self.race.leg(self.side.other()).cancel();
                let buffer = &self.race.buffer;
                // the probe request already sent to this side
                buffer.credit(Demand::max(1));
                buffer.buffer(value) + buffer.demand(pre_decision_demand)
            },
            Race::Winning => self.race.buffer.buffer(value),
            Race::Lost => Demand::NONE,
        }
    }

    fn on_completion(&self, completion: Completion<E>) {
        match self.race.decide(self.side) {
            Race::Won(_) => {
                trace!("{:?} source won the race by terminating", self.side);
                self.race.leg(self.side.other()).cancel();
            },
            Race::Winning => {},
            Race::Lost => return,
        }
        self.race.leg(self.side).clear();
        self.race.buffer.complete_when_drained(completion);
    }
}

impl<T, E> Subscription for Amb<T, E>
where
    T: Send,
    E: Send,
{
    fn request(&self, demand: Demand) {
        let winner = {
            let mut state = self.state.lock();
            match state.decision {
                Some(side) => side,
                None => {
                    state.pre_decision_demand += demand;
                    return;
                },
            }
        };
        let demand = self.buffer.demand(demand);
        self.leg(winner).request(demand);
    }

    fn cancel(&self) {
        self.cancelled.store(true, AtomicOrdering::Release);
        self.buffer.cancel();
        self.legs[0].cancel();
        self.legs[1].cancel();
    }
}
