/// Plugs a source and operators together in a chain, left to right.
///
/// `pipe!(source, op1, op2)` is `op2(op1(source))`. Any expression that can be called with the
/// previous result works as a step, so operator factories (`map(f)`), plain operators
/// (`materialize`) and sinks (`for_each(f)`) mix freely.
///
/// # Examples
///
/// ```
/// use crossbeam_queue::SegQueue;
/// use never::Never;
/// use std::sync::Arc;
///
/// use tributary::{filter, for_each, from_iter, map, pipe};
///
/// let actual = Arc::new(SegQueue::new());
///
/// pipe!(
///     from_iter::<_, Never, _>([1, 2, 3, 4]),
///     filter(|x| x % 2 == 0),
///     map(|x| x * 100),
///     for_each({
///         let actual = Arc::clone(&actual);
///         move |x| actual.push(x)
///     }),
/// );
///
/// assert_eq!(actual.pop(), Some(200));
/// assert_eq!(actual.pop(), Some(400));
/// assert_eq!(actual.pop(), None);
/// ```
#[macro_export]
macro_rules! pipe {
    ($a:expr, $b:expr $(,)?) => { $b($a) };
    ($a:expr, $b:expr, $($rest:expr),* $(,)?) => {
        $crate::pipe!($b($a), $($rest),*)
    };
}
