use arc_swap::ArcSwapOption;
use std::sync::Arc;

use crate::{Demand, Subscription};

/// Slot holding the subscription to an upstream publisher.
///
/// The slot is emptied when the upstream terminates or is cancelled, which also drops the
/// reference so nothing keeps receiving demand afterwards.
pub(crate) struct Talkback(ArcSwapOption<Arc<dyn Subscription>>);

impl Talkback {
    pub(crate) fn new() -> Self {
        Talkback(ArcSwapOption::from(None))
    }

    /// Holds on to the subscription handed over by `on_subscribe`.
    ///
    /// # Panics
    ///
    /// Panics if the slot already holds a subscription. Both subscriptions are cancelled first, so
    /// neither upstream is left running.
    pub(crate) fn store(&self, subscription: Arc<dyn Subscription>) {
        if let Some(previous) = self.0.swap(Some(Arc::new(subscription))) {
            previous.cancel();
            self.cancel();
            panic!("subscriber already received a subscription");
        }
    }

    pub(crate) fn clear(&self) {
        self.0.store(None);
    }

    pub(crate) fn is_set(&self) -> bool {
        self.0.load().is_some()
    }

    pub(crate) fn request(&self, demand: Demand) {
        if demand.is_none() {
            return;
        }
        if let Some(subscription) = self.0.load_full() {
            subscription.request(demand);
        }
    }

    pub(crate) fn cancel(&self) {
        if let Some(subscription) = self.0.swap(None) {
            subscription.cancel();
        }
    }
}
