//! Feature-gated metrics and logging hooks.
//!
//! Both compile to nothing unless the `metrics` / `tracing` features are on.

#[cfg(feature = "metrics")]
pub(crate) fn metric_inc(name: &'static str) {
    metrics::increment_counter!(name);
}

#[cfg(not(feature = "metrics"))]
pub(crate) fn metric_inc(_name: &'static str) {}

#[cfg(feature = "metrics")]
pub(crate) fn metric_inc_labeled(name: &'static str, label: &'static str, value: &'static str) {
    metrics::increment_counter!(name, label => value);
}

#[cfg(not(feature = "metrics"))]
pub(crate) fn metric_inc_labeled(_name: &'static str, _label: &'static str, _value: &'static str) {}

macro_rules! trace_debug {
    ($($arg:tt)*) => {
        #[cfg(feature = "tracing")]
        {
            tracing::debug!(target: "webhook_registry", $($arg)*);
        }
    };
}

macro_rules! trace_info {
    ($($arg:tt)*) => {
        #[cfg(feature = "tracing")]
        {
            tracing::info!(target: "webhook_registry", $($arg)*);
        }
    };
}

macro_rules! trace_warn {
    ($($arg:tt)*) => {
        #[cfg(feature = "tracing")]
        {
            tracing::warn!(target: "webhook_registry", $($arg)*);
        }
    };
}

pub(crate) use trace_debug;
pub(crate) use trace_info;
pub(crate) use trace_warn;
