use std::sync::Arc;

use crate::{Completion, EmptySubscription, Source, Subscriber};

/// Source that finishes immediately upon subscription without emitting anything.
pub fn empty<T: 'static, E: 'static>() -> Source<T, E> {
    Source::from_fn(|subscriber: Arc<dyn Subscriber<T, E>>| {
        subscriber.on_subscribe(Arc::new(EmptySubscription));
        subscriber.on_completion(Completion::Finished);
    })
}

/// Source that never emits and never terminates.
pub fn never<T: 'static, E: 'static>() -> Source<T, E> {
    Source::from_fn(|subscriber: Arc<dyn Subscriber<T, E>>| {
        subscriber.on_subscribe(Arc::new(EmptySubscription));
    })
}
