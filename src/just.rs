use std::sync::Arc;

use crate::{Completion, EmptySubscription, Source, Subscriber};

/// Source that emits a single value, when requested, and finishes.
pub fn just<T: 'static, E: 'static>(value: T) -> Source<T, E>
where
    T: Clone + Send + Sync,
{
    crate::from_iter([value])
}

/// Source that fails immediately upon subscription, regardless of demand.
pub fn fail<T: 'static, E: 'static>(error: E) -> Source<T, E>
where
    E: Clone + Send + Sync,
{
    Source::from_fn(move |subscriber: Arc<dyn Subscriber<T, E>>| {
        subscriber.on_subscribe(Arc::new(EmptySubscription));
        subscriber.on_completion(Completion::Failure(error.clone()));
    })
}
