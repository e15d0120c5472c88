//! Concord-Observability: Metrics, Correlation, Deadlines
//!
//! The observability substrate injected across the plane: a metrics registry
//! (counters, gauges, histograms, timers) with Prometheus text export, and
//! the request-scoped correlation context with its deadline.
//!
//! Everything here works unconfigured: a fresh [`MetricsRegistry`] needs no
//! setup and `tracing` macros are no-ops without a subscriber, so libraries
//! and tests never require wiring.

pub mod context;
pub mod metrics;

pub use context::{CorrelationContext, RequestDeadline};
pub use metrics::{MetricsRegistry, Timer};
