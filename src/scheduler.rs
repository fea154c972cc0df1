use async_nursery::{Nurse, NurseExt};
use futures_timer::Delay;
use std::{
    sync::{
        atomic::{AtomicBool, Ordering as AtomicOrdering},
        Arc,
    },
    time::Duration,
};

use crate::utils::tracing::trace;

/// A deferred task scheduled on a [`Scheduler`].
pub type Task = Box<dyn FnOnce() + Send>;

/// Runs tasks after a delay. Used by the timing-based operators.
pub trait Scheduler: Send + Sync {
    fn schedule_after(&self, delay: Duration, task: Task) -> CancelHandle;

    fn cancel(&self, handle: &CancelHandle) {
        handle.cancel();
    }
}

/// Prevents a scheduled task from running if it has not run yet.
#[derive(Clone, Debug, Default)]
pub struct CancelHandle(Arc<AtomicBool>);

impl CancelHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, AtomicOrdering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(AtomicOrdering::Acquire)
    }
}

/// A [`Scheduler`] that spawns a timer task on an [`async_nursery`] nursery per scheduled task.
///
/// A task that cannot be spawned because the nursery is closed never runs, and its handle is
/// returned already cancelled.
///
/// # Examples
///
/// ```
/// use async_nursery::Nursery;
/// use std::{
///     sync::{
///         atomic::{AtomicBool, Ordering},
///         Arc,
///     },
///     time::Duration,
/// };
///
/// use tributary::{NurseryScheduler, Scheduler};
///
/// let (nursery, nursery_out) = Nursery::new(async_executors::AsyncStd);
/// let scheduler = NurseryScheduler::new(nursery);
///
/// let ran = Arc::new(AtomicBool::new(false));
/// scheduler.schedule_after(Duration::from_millis(10), {
///     let ran = Arc::clone(&ran);
///     Box::new(move || ran.store(true, Ordering::SeqCst))
/// });
///
/// drop(scheduler);
/// async_std::task::block_on(nursery_out);
///
/// assert!(ran.load(Ordering::SeqCst));
/// ```
pub struct NurseryScheduler<N> {
    nursery: N,
}

impl<N> NurseryScheduler<N> {
    pub fn new(nursery: N) -> Self {
        NurseryScheduler { nursery }
    }
}

impl<N> Scheduler for NurseryScheduler<N>
where
    N: Nurse<()> + Send + Sync,
{
    fn schedule_after(&self, delay: Duration, task: Task) -> CancelHandle {
        let handle = CancelHandle::new();
        let nursed = self.nursery.nurse({
            let handle = handle.clone();
            async move {
                Delay::new(delay).await;
                if !handle.is_cancelled() {
                    task();
                }
            }
        });
        if let Err(_error) = nursed {
            trace!("failed to schedule task: {_error:?}");
            handle.cancel();
        }
        handle
    }
}
