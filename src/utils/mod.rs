pub(crate) mod talkback;
pub(crate) mod tracing;
