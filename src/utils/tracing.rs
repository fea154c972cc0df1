/// Expands to its body only when the `tracing` feature is enabled.
macro_rules! with_tracing {
    ($($body:tt)*) => {
        ::cfg_if::cfg_if! {
            if #[cfg(feature = "tracing")] {
                $($body)*
            }
        }
    };
}
pub(crate) use with_tracing;

/// Enters a trace-level span for the rest of the enclosing block.
///
/// With a third argument the span is also bound to that name, so it can be stored as the parent of
/// spans entered later from other callbacks.
macro_rules! instrument {
    (parent: $parent:expr, $name:expr, $span:ident) => {
        $crate::utils::tracing::with_tracing! {
            ::paste::paste! {
                let $span = ::tracing::trace_span!(parent: $parent, $name);
                let [<_ $name _entered>] = $span.enter();
            }
        }
    };
    (parent: $parent:expr, $name:expr) => {
        $crate::utils::tracing::with_tracing! {
            ::paste::paste! {
                let [<_ $name _entered>] = ::tracing::trace_span!(parent: $parent, $name).entered();
            }
        }
    };
}
pub(crate) use instrument;

macro_rules! trace {
    ($($arg:tt)+) => {
        $crate::utils::tracing::with_tracing! {
            ::tracing::trace!($($arg)+);
        }
    };
}
pub(crate) use trace;
