use std::{
    fmt::{self, Debug},
    ops::{Add, AddAssign, Deref, Sub, SubAssign},
    sync::Arc,
};

/// The amount of values a [`Subscriber`] is willing to receive.
///
/// Demand only ever grows through [`Subscription::request`] and through the value returned from
/// [`Subscriber::on_value`], and is consumed one unit per delivered value. Arithmetic saturates:
/// anything added to [`Demand::Unlimited`] stays unlimited.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Demand {
    Unlimited,
    Max(usize),
}

impl Demand {
    pub const NONE: Demand = Demand::Max(0);

    pub const fn max(n: usize) -> Self {
        Demand::Max(n)
    }

    pub const fn is_none(self) -> bool {
        matches!(self, Demand::Max(0))
    }

    pub const fn is_unlimited(self) -> bool {
        matches!(self, Demand::Unlimited)
    }

    /// Whether this demand allows more than `count` values to be delivered.
    pub const fn exceeds(self, count: usize) -> bool {
        match self {
            Demand::Unlimited => true,
            Demand::Max(n) => n > count,
        }
    }
}

impl Default for Demand {
    fn default() -> Self {
        Demand::NONE
    }
}

impl From<usize> for Demand {
    fn from(n: usize) -> Self {
        Demand::Max(n)
    }
}

impl Add for Demand {
    type Output = Demand;

    fn add(self, rhs: Demand) -> Demand {
        match (self, rhs) {
            (Demand::Max(a), Demand::Max(b)) => Demand::Max(a.saturating_add(b)),
            _ => Demand::Unlimited,
        }
    }
}

impl AddAssign for Demand {
    fn add_assign(&mut self, rhs: Demand) {
        *self = *self + rhs;
    }
}

impl Sub for Demand {
    type Output = Demand;

    /// Unlimited minus a finite demand is still unlimited; unlimited minus unlimited is nothing.
    fn sub(self, rhs: Demand) -> Demand {
        match (self, rhs) {
            (Demand::Unlimited, Demand::Max(_)) => Demand::Unlimited,
            (Demand::Unlimited, Demand::Unlimited) | (Demand::Max(_), Demand::Unlimited) => {
                Demand::NONE
            },
            (Demand::Max(a), Demand::Max(b)) => Demand::Max(a.saturating_sub(b)),
        }
    }
}

impl SubAssign for Demand {
    fn sub_assign(&mut self, rhs: Demand) {
        *self = *self - rhs;
    }
}

/// The terminal event of a stream.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Completion<E> {
    Finished,
    Failure(E),
}

impl<E> Completion<E> {
    pub fn is_failure(&self) -> bool {
        matches!(self, Completion::Failure(_))
    }
}

/// An active binding between one publisher and one subscriber.
///
/// `cancel` must be idempotent, and `request` after `cancel` must be a no-op.
pub trait Subscription: Send + Sync {
    fn request(&self, demand: Demand);

    fn cancel(&self);
}

/// The consumer side of the protocol.
///
/// A subscriber receives exactly one `on_subscribe`, then zero or more `on_value` (never more than
/// it has demanded), then at most one `on_completion`.
pub trait Subscriber<T, E>: Send + Sync {
    fn on_subscribe(&self, subscription: Arc<dyn Subscription>);

    /// Returns additional demand on top of what was already requested.
    fn on_value(&self, value: T) -> Demand;

    fn on_completion(&self, completion: Completion<E>);
}

/// A description of an asynchronous sequence of `T` values terminated by at most one
/// [`Completion`].
///
/// Subscribing twice yields two independent runs unless the publisher is explicitly shared.
pub trait Publisher<T, E>: Send + Sync {
    fn subscribe(&self, subscriber: Arc<dyn Subscriber<T, E>>);

    /// Erases the concrete publisher type.
    fn into_source(self) -> Source<T, E>
    where
        Self: Sized + 'static,
    {
        Source(Arc::new(self))
    }
}

/// A type-erased, cheaply clonable [`Publisher`].
pub struct Source<T, E>(Arc<dyn Publisher<T, E>>);

impl<T, E> Source<T, E> {
    pub fn new<P>(publisher: P) -> Self
    where
        P: Publisher<T, E> + 'static,
    {
        publisher.into_source()
    }

    /// Builds a publisher out of a subscribe function.
    pub fn from_fn<F>(subscribe: F) -> Self
    where
        F: Fn(Arc<dyn Subscriber<T, E>>) + Send + Sync + 'static,
        T: 'static,
        E: 'static,
    {
        Source(Arc::new(FnPublisher(subscribe)))
    }
}

impl<T, E> Clone for Source<T, E> {
    fn clone(&self) -> Self {
        Source(Arc::clone(&self.0))
    }
}

impl<T, E> Deref for Source<T, E> {
    type Target = dyn Publisher<T, E>;

    fn deref(&self) -> &Self::Target {
        &*self.0
    }
}

impl<T, E> Debug for Source<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Source<{}, {}>",
            std::any::type_name::<T>(),
            std::any::type_name::<E>(),
        )
    }
}

impl<T, E> Publisher<T, E> for Source<T, E> {
    fn subscribe(&self, subscriber: Arc<dyn Subscriber<T, E>>) {
        self.0.subscribe(subscriber);
    }

    fn into_source(self) -> Source<T, E> {
        self
    }
}

struct FnPublisher<F>(F);

impl<T, E, F> Publisher<T, E> for FnPublisher<F>
where
    F: Fn(Arc<dyn Subscriber<T, E>>) + Send + Sync,
{
    fn subscribe(&self, subscriber: Arc<dyn Subscriber<T, E>>) {
        (self.0)(subscriber);
    }
}

/// A subscription that ignores every request, for sources that never deliver values.
#[derive(Clone, Copy, Debug, Default)]
pub struct EmptySubscription;

impl Subscription for EmptySubscription {
    fn request(&self, _demand: Demand) {}

    fn cancel(&self) {}
}

#[cfg(test)]
mod tests {
    use super::Demand;

    #[test]
    fn unlimited_absorbs_addition() {
        assert_eq!(Demand::Unlimited + Demand::max(3), Demand::Unlimited);
        assert_eq!(Demand::max(2) + Demand::max(3), Demand::max(5));
        assert_eq!(Demand::max(usize::MAX) + Demand::max(1), Demand::max(usize::MAX));
    }

    #[test]
    fn subtraction_saturates() {
        assert_eq!(Demand::max(2) - Demand::max(5), Demand::NONE);
        assert_eq!(Demand::Unlimited - Demand::max(5), Demand::Unlimited);
        assert_eq!(Demand::Unlimited - Demand::Unlimited, Demand::NONE);
        assert_eq!(Demand::max(7) - Demand::Unlimited, Demand::NONE);
    }

    #[test]
    fn exceeds_counts_delivered_values() {
        assert!(Demand::max(2).exceeds(1));
        assert!(!Demand::max(2).exceeds(2));
        assert!(Demand::Unlimited.exceeds(usize::MAX));
        assert!(Demand::NONE.is_none());
    }
}
