//! Demand-aware reactive stream combinators.
//!
//! A [`Publisher`] describes a sequence of values terminated by at most one [`Completion`]. A
//! [`Subscriber`] receives them at the pace it asks for through its [`Subscription`], which is
//! never more than the [`Demand`] it has expressed. Every operator in this crate honors that
//! backpressure, is safe to call into re-entrantly from subscriber callbacks, and cancels
//! everything it subscribed to when it is cancelled.

pub use crate::{
    absorb::absorb,
    amb::{amb, amb_all},
    core::{Completion, Demand, EmptySubscription, Publisher, Source, Subscriber, Subscription},
    delay_subscription::delay_subscription,
    demand_buffer::DemandBuffer,
    empty::{empty, never},
    filter::filter,
    for_each::{for_each, Cancellable},
    from_iter::from_iter,
    just::{fail, just},
    map::{map, set_failure_type, try_map},
    materialize::{dematerialize, failures, materialize, values, Event},
    replace_empty::{replace_empty, EmptyReplacement},
    retry_when::retry_when,
    scheduler::{CancelHandle, NurseryScheduler, Scheduler, Task},
    share_replay::{share, share_replay, ShareScope},
    sink::Sink,
    subject::PassthroughSubject,
    timeout::timeout,
};

mod absorb;
mod amb;
mod core;
mod delay_subscription;
mod demand_buffer;
mod empty;
mod filter;
mod for_each;
mod from_iter;
mod just;
mod map;
mod materialize;
mod pipe;
mod replace_empty;
mod retry_when;
mod scheduler;
mod share_replay;
mod sink;
mod subject;
mod timeout;

mod utils;
