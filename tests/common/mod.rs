#![allow(dead_code)]

use arc_swap::ArcSwapOption;
use parking_lot::Mutex;
use std::{
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering as AtomicOrdering},
        Arc,
    },
    time::Duration,
};
use thiserror::Error;

use tributary::{
    CancelHandle, Completion, Demand, DemandBuffer, EmptySubscription, Event, Publisher,
    Scheduler, Subscriber, Subscription, Task,
};

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum TestError {
    #[error("transient failure {0}")]
    Transient(usize),
    #[error("fatal failure")]
    Fatal,
    #[error("timed out")]
    TimedOut,
    #[error("empty")]
    Empty,
}

/// What a subscriber observed, in order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Signal<T, E> {
    Value(T),
    Completion(Completion<E>),
}

/// Subscriber that records every signal it receives.
pub struct Recorder<T, E> {
    signals: Mutex<Vec<Signal<T, E>>>,
    subscriptions: AtomicUsize,
    subscription: ArcSwapOption<Arc<dyn Subscription>>,
    initial_demand: Demand,
    demand_per_value: Demand,
}

impl<T, E> Recorder<T, E>
where
    T: Clone,
    E: Clone,
{
    pub fn new(initial_demand: Demand, demand_per_value: Demand) -> Arc<Self> {
        Arc::new(Recorder {
            signals: Mutex::new(vec![]),
            subscriptions: AtomicUsize::new(0),
            subscription: ArcSwapOption::from(None),
            initial_demand,
            demand_per_value,
        })
    }

    pub fn unlimited() -> Arc<Self> {
        Self::new(Demand::Unlimited, Demand::NONE)
    }

    /// Asks for nothing until told to.
    pub fn idle() -> Arc<Self> {
        Self::new(Demand::NONE, Demand::NONE)
    }

    pub fn signals(&self) -> Vec<Signal<T, E>> {
        self.signals.lock().clone()
    }

    pub fn values(&self) -> Vec<T> {
        self.signals
            .lock()
            .iter()
            .filter_map(|signal| match signal {
                Signal::Value(value) => Some(value.clone()),
                Signal::Completion(_) => None,
            })
            .collect()
    }

    pub fn completion(&self) -> Option<Completion<E>> {
        self.signals.lock().iter().find_map(|signal| match signal {
            Signal::Completion(completion) => Some(completion.clone()),
            Signal::Value(_) => None,
        })
    }

    pub fn subscription_count(&self) -> usize {
        self.subscriptions.load(AtomicOrdering::Acquire)
    }

    pub fn request(&self, demand: Demand) {
        if let Some(subscription) = self.subscription.load_full() {
            subscription.request(demand);
        }
    }

    pub fn cancel(&self) {
        if let Some(subscription) = self.subscription.load_full() {
            subscription.cancel();
        }
    }
}

impl<T, E> Subscriber<T, E> for Recorder<T, E>
where
    T: Clone + Send,
    E: Clone + Send,
{
    fn on_subscribe(&self, subscription: Arc<dyn Subscription>) {
        let previous = self.subscriptions.fetch_add(1, AtomicOrdering::AcqRel);
        assert_eq!(previous, 0, "subscriber already received a subscription");
        self.subscription.store(Some(Arc::new(Arc::clone(&subscription))));
        if !self.initial_demand.is_none() {
            subscription.request(self.initial_demand);
        }
    }

    fn on_value(&self, value: T) -> Demand {
        let mut signals = self.signals.lock();
        assert!(
            !matches!(signals.last(), Some(Signal::Completion(_))),
            "value received after completion"
        );
        signals.push(Signal::Value(value));
        self.demand_per_value
    }

    fn on_completion(&self, completion: Completion<E>) {
        let mut signals = self.signals.lock();
        assert!(
            !matches!(signals.last(), Some(Signal::Completion(_))),
            "completion received twice"
        );
        signals.push(Signal::Completion(completion));
    }
}

/// What a [`MockPublisher`] was told by its subscriber.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Upward {
    Subscribed,
    Requested(Demand),
    Cancelled,
}

/// Publisher driven by hand from the test, which checks it is never made to emit beyond demand.
pub struct MockPublisher<T, E> {
    inner: Arc<MockInner<T, E>>,
}

struct MockInner<T, E> {
    name: &'static str,
    subscriber: ArcSwapOption<Arc<dyn Subscriber<T, E>>>,
    log: Mutex<Vec<Upward>>,
    demand: Mutex<Demand>,
    subscriptions: AtomicUsize,
    cancelled: AtomicBool,
}

impl<T, E> MockPublisher<T, E> {
    pub fn new(name: &'static str) -> Self {
        MockPublisher {
            inner: Arc::new(MockInner {
                name,
                subscriber: ArcSwapOption::from(None),
                log: Mutex::new(vec![]),
                demand: Mutex::new(Demand::NONE),
                subscriptions: AtomicUsize::new(0),
                cancelled: AtomicBool::new(false),
            }),
        }
    }

    pub fn log(&self) -> Vec<Upward> {
        self.inner.log.lock().clone()
    }

    pub fn subscription_count(&self) -> usize {
        self.inner.subscriptions.load(AtomicOrdering::Acquire)
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(AtomicOrdering::Acquire)
    }

    pub fn is_subscribed(&self) -> bool {
        self.inner.subscriber.load().is_some() && !self.is_cancelled()
    }

    /// The demand the current subscriber has requested and not received yet.
    pub fn demand(&self) -> Demand {
        *self.inner.demand.lock()
    }

    pub fn emit(&self, value: T) -> Demand {
        let subscriber = self
            .inner
            .subscriber
            .load_full()
            .unwrap_or_else(|| panic!("{} has no subscriber", self.inner.name));
        {
            let mut demand = self.inner.demand.lock();
            assert!(
                !demand.is_none(),
                "{} made to emit without demand",
                self.inner.name
            );
            *demand -= Demand::max(1);
        }
        let more = subscriber.on_value(value);
        *self.inner.demand.lock() += more;
        more
    }

    pub fn complete(&self, completion: Completion<E>) {
        let subscriber = self
            .inner
            .subscriber
            .swap(None)
            .unwrap_or_else(|| panic!("{} has no subscriber", self.inner.name));
        subscriber.on_completion(completion);
    }
}

impl<T, E> Clone for MockPublisher<T, E> {
    fn clone(&self) -> Self {
        MockPublisher {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T, E> Publisher<T, E> for MockPublisher<T, E>
where
    T: Send + 'static,
    E: Send + 'static,
{
    fn subscribe(&self, subscriber: Arc<dyn Subscriber<T, E>>) {
        self.inner.subscriptions.fetch_add(1, AtomicOrdering::AcqRel);
        self.inner.cancelled.store(false, AtomicOrdering::Release);
        *self.inner.demand.lock() = Demand::NONE;
        self.inner.log.lock().push(Upward::Subscribed);
        self.inner
            .subscriber
            .store(Some(Arc::new(Arc::clone(&subscriber))));
        subscriber.on_subscribe(Arc::new(MockSubscription {
            inner: Arc::clone(&self.inner),
        }));
    }
}

struct MockSubscription<T, E> {
    inner: Arc<MockInner<T, E>>,
}

impl<T, E> Subscription for MockSubscription<T, E>
where
    T: Send,
    E: Send,
{
    fn request(&self, demand: Demand) {
        if self.inner.cancelled.load(AtomicOrdering::Acquire) {
            return;
        }
        self.inner.log.lock().push(Upward::Requested(demand));
        *self.inner.demand.lock() += demand;
    }

    fn cancel(&self) {
        if self.inner.cancelled.swap(true, AtomicOrdering::AcqRel) {
            return;
        }
        self.inner.log.lock().push(Upward::Cancelled);
        self.inner.subscriber.store(None);
    }
}

/// A [`Scheduler`] whose clock only moves when the test moves it.
#[derive(Default)]
pub struct VirtualScheduler {
    state: Mutex<VirtualState>,
}

#[derive(Default)]
struct VirtualState {
    now: Duration,
    next_seq: u64,
    queue: Vec<Scheduled>,
}

struct Scheduled {
    due: Duration,
    seq: u64,
    handle: CancelHandle,
    task: Task,
}

impl VirtualScheduler {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn now(&self) -> Duration {
        self.state.lock().now
    }

    pub fn pending(&self) -> usize {
        self.state
            .lock()
            .queue
            .iter()
            .filter(|scheduled| !scheduled.handle.is_cancelled())
            .count()
    }

    pub fn advance_by(&self, duration: Duration) {
        let target = self.now() + duration;
        self.advance_to(target);
    }

    /// Runs every task due up to `target`, in order of due time then scheduling order.
    pub fn advance_to(&self, target: Duration) {
        loop {
            let scheduled = {
                let mut state = self.state.lock();
                let next = state
                    .queue
                    .iter()
                    .enumerate()
                    .filter(|(_, scheduled)| scheduled.due <= target)
                    .min_by_key(|(_, scheduled)| (scheduled.due, scheduled.seq))
                    .map(|(index, _)| index);
                match next {
                    Some(index) => {
                        let scheduled = state.queue.swap_remove(index);
                        state.now = scheduled.due;
                        scheduled
                    },
                    None => {
                        state.now = target;
                        return;
                    },
                }
            };
            if !scheduled.handle.is_cancelled() {
                (scheduled.task)();
            }
        }
    }
}

impl Scheduler for VirtualScheduler {
    fn schedule_after(&self, delay: Duration, task: Task) -> CancelHandle {
        let handle = CancelHandle::new();
        let mut state = self.state.lock();
        let due = state.now + delay;
        let seq = state.next_seq;
        state.next_seq += 1;
        state.queue.push(Scheduled {
            due,
            seq,
            handle: handle.clone(),
            task,
        });
        handle
    }
}

pub fn ms(millis: u64) -> Duration {
    Duration::from_millis(millis)
}

/// Cold source that plays `events` on a [`VirtualScheduler`], relative to when it is subscribed.
pub struct Timeline<T, E> {
    inner: Arc<TimelineInner<T, E>>,
}

struct TimelineInner<T, E> {
    scheduler: Arc<VirtualScheduler>,
    events: Vec<(u64, Event<T, E>)>,
    subscriptions: AtomicUsize,
    cancelled: AtomicBool,
}

impl<T, E> Timeline<T, E> {
    pub fn new(scheduler: &Arc<VirtualScheduler>, events: Vec<(u64, Event<T, E>)>) -> Self {
        Timeline {
            inner: Arc::new(TimelineInner {
                scheduler: Arc::clone(scheduler),
                events,
                subscriptions: AtomicUsize::new(0),
                cancelled: AtomicBool::new(false),
            }),
        }
    }

    pub fn subscription_count(&self) -> usize {
        self.inner.subscriptions.load(AtomicOrdering::Acquire)
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(AtomicOrdering::Acquire)
    }
}

impl<T, E> Clone for Timeline<T, E> {
    fn clone(&self) -> Self {
        Timeline {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T, E> Publisher<T, E> for Timeline<T, E>
where
    T: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
{
    fn subscribe(&self, subscriber: Arc<dyn Subscriber<T, E>>) {
        self.inner.subscriptions.fetch_add(1, AtomicOrdering::AcqRel);
        let buffer = Arc::new(DemandBuffer::new(Arc::clone(&subscriber)));
        let subscription = Arc::new(TimelineSubscription {
            inner: Arc::clone(&self.inner),
            buffer: Arc::clone(&buffer),
            timers: Mutex::new(vec![]),
        });
        subscriber.on_subscribe(Arc::clone(&subscription) as Arc<dyn Subscription>);
        for (at, event) in self.inner.events.iter().cloned() {
            let buffer = Arc::clone(&buffer);
            let timer = self.inner.scheduler.schedule_after(
                ms(at),
                Box::new(move || match event {
                    Event::Value(value) => {
                        buffer.buffer(value);
                    },
                    Event::Failure(error) => buffer.complete_when_drained(Completion::Failure(error)),
                    Event::Finished => buffer.complete_when_drained(Completion::Finished),
                }),
            );
            subscription.timers.lock().push(timer);
        }
    }
}

struct TimelineSubscription<T, E> {
    inner: Arc<TimelineInner<T, E>>,
    buffer: Arc<DemandBuffer<T, E>>,
    timers: Mutex<Vec<CancelHandle>>,
}

impl<T, E> Subscription for TimelineSubscription<T, E>
where
    T: Send + Sync,
    E: Send + Sync,
{
    fn request(&self, demand: Demand) {
        self.buffer.demand(demand);
    }

    fn cancel(&self) {
        if self.buffer.cancel() {
            self.inner.cancelled.store(true, AtomicOrdering::Release);
        }
        for timer in self.timers.lock().drain(..) {
            timer.cancel();
        }
    }
}

/// Publisher that hands its subscriber over to the test, which then drives it directly from any
/// thread. Requests and cancellation are ignored.
pub struct Captured<T, E> {
    subscriber: Arc<Mutex<Option<Arc<dyn Subscriber<T, E>>>>>,
}

impl<T, E> Captured<T, E> {
    pub fn new() -> Self {
        Captured {
            subscriber: Arc::new(Mutex::new(None)),
        }
    }

    pub fn subscriber(&self) -> Arc<dyn Subscriber<T, E>> {
        self.subscriber
            .lock()
            .clone()
            .unwrap_or_else(|| panic!("nothing subscribed"))
    }
}

impl<T, E> Clone for Captured<T, E> {
    fn clone(&self) -> Self {
        Captured {
            subscriber: Arc::clone(&self.subscriber),
        }
    }
}

impl<T, E> Publisher<T, E> for Captured<T, E>
where
    T: Send + 'static,
    E: Send + 'static,
{
    fn subscribe(&self, subscriber: Arc<dyn Subscriber<T, E>>) {
        *self.subscriber.lock() = Some(Arc::clone(&subscriber));
        subscriber.on_subscribe(Arc::new(EmptySubscription));
    }
}
