use std::sync::Arc;

use crate::{Publisher, Sink, Source, Subscriber, Subscription};

/// Operator that conditionally lets values pass through.
///
/// A value that does not pass gives its unit of demand back upstream, so a downstream that requested
/// `n` values still receives `n` values that passed (or the completion).
///
/// # Examples
///
/// ```
/// use crossbeam_queue::SegQueue;
/// use never::Never;
/// use std::sync::Arc;
///
/// use tributary::{filter, for_each, from_iter};
///
/// let actual = Arc::new(SegQueue::new());
///
/// let source = filter(|x| x % 2 == 1)(from_iter::<_, Never, _>([1, 2, 3, 4, 5]));
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
///     [1, 3, 5]
/// );
/// ```
#[cfg_attr(feature = "tracing", tracing::instrument(level = "trace", skip_all))]
pub fn filter<T: 'static, E: 'static, S, F: 'static>(
    condition: F,
) -> Box<dyn Fn(S) -> Source<T, E>>
where
    T: Send,
    E: Send,
    S: Publisher<T, E> + 'static,
    F: Fn(&T) -> bool + Send + Sync + Clone,
{
    Box::new(move |source| {
        let source = source.into_source();
        let condition = condition.clone();
        Source::from_fn(move |subscriber: Arc<dyn Subscriber<T, E>>| {
            let condition = condition.clone();
            let sink = Arc::new(Sink::new(
                Arc::clone(&subscriber),
                move |value| condition(&value).then_some(value),
                Some,
            ));
            subscriber.on_subscribe(Arc::clone(&sink) as Arc<dyn Subscription>);
            source.subscribe(sink);
        })
    })
}
