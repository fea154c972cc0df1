use parking_lot::Mutex;
use std::{
    iter::{IntoIterator, Peekable},
    sync::Arc,
};

use crate::{
    utils::tracing::trace, Completion, Demand, Source, Subscriber, Subscription,
};

/// Converts an [iterable][`IntoIterator`] or [`Iterator`] to a source.
///
/// It only sends data when requested, and finishes as soon as the iterator is exhausted, without
/// waiting for further demand. Every subscription iterates over a fresh clone of `iter`.
///
/// # Examples
///
/// Convert an iterable:
///
/// ```
/// use crossbeam_queue::SegQueue;
/// use never::Never;
/// use std::sync::Arc;
///
/// use tributary::{for_each, from_iter};
///
/// let actual = Arc::new(SegQueue::new());
///
/// let source = from_iter::<_, Never, _>([10, 20, 30, 40]);
///
/// for_each({
///     let actual = Arc::clone(&actual);
///     move |x| {
///         println!("{x}");
///         actual.push(x);
///     }
/// })(source);
///
/// assert_eq!(
///     &{
///         let mut v = vec![];
///         while let Some(x) = actual.pop() {
///             v.push(x);
///         }
///         v
///     }[..],
///     [10, 20, 30, 40]
/// );
/// ```
///
/// Convert an Iterator:
///
/// ```
/// use crossbeam_queue::SegQueue;
/// use never::Never;
/// use std::sync::Arc;
///
/// use tributary::{for_each, from_iter};
///
/// let actual = Arc::new(SegQueue::new());
///
/// let source = from_iter::<_, Never, _>([10, 20, 30, 40].into_iter().enumerate());
///
/// for_each({
///     let actual = Arc::clone(&actual);
///     move |x| {
///         println!("{x:?}");
///         actual.push(x);
///     }
/// })(source);
///
/// assert_eq!(
///     &{
///         let mut v = vec![];
///         while let Some(x) = actual.pop() {
///             v.push(x);
///         }
///         v
///     }[..],
///     [(0, 10), (1, 20), (2, 30), (3, 40)]
/// );
/// ```
pub fn from_iter<T: 'static, E: 'static, I: 'static>(iter: I) -> Source<T, E>
where
    T: Send,
    I: IntoIterator<Item = T> + Clone + Send + Sync,
    <I as IntoIterator>::IntoIter: Send + 'static,
{
    Source::from_fn(move |subscriber: Arc<dyn Subscriber<T, E>>| {
        let subscription = Arc::new(FromIter {
            state: Mutex::new(FromIterState {
                subscriber: Some(Arc::clone(&subscriber)),
                iter: iter.clone().into_iter().peekable(),
                demand: Demand::NONE,
                in_loop: false,
            }),
        });
        subscriber.on_subscribe(Arc::clone(&subscription) as Arc<dyn Subscription>);
        // An empty iterator finishes without any demand.
        subscription.request(Demand::NONE);
    })
}

struct FromIter<T, E, It: Iterator> {
    state: Mutex<FromIterState<T, E, It>>,
}

struct FromIterState<T, E, It: Iterator> {
    subscriber: Option<Arc<dyn Subscriber<T, E>>>,
    iter: Peekable<It>,
    demand: Demand,
    in_loop: bool,
}

impl<T, E, It> Subscription for FromIter<T, E, It>
where
    T: Send,
    It: Iterator<Item = T> + Send,
{
    fn request(&self, demand: Demand) {
        let mut state = self.state.lock();
        state.demand += demand;
        if state.in_loop {
            return;
        }
        state.in_loop = true;
        loop {
            let Some(subscriber) = state.subscriber.clone() else {
                break;
            };
            if state.iter.peek().is_none() {
                state.subscriber = None;
                drop(state);
                trace!("iterator exhausted");
                subscriber.on_completion(Completion::Finished);
                return;
            }
            if state.demand.is_none() {
                break;
            }
            if let Some(value) = state.iter.next() {
                state.demand -= Demand::max(1);
                drop(state);
                let more = subscriber.on_value(value);
                state = self.state.lock();
                state.demand += more;
            }
        }
        state.in_loop = false;
    }

    fn cancel(&self) {
        self.state.lock().subscriber = None;
    }
}
