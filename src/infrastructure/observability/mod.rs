//! Push-based observability for GoAhead
//!
//! This module provides observability through **outbound data only** - no HTTP server,
//! no incoming requests. Metrics are pushed as periodic JSON lines on stdout
//! (for Loki, Fluentd, CloudWatch), and the Prometheus registry can be
//! rendered in text format by whoever embeds the crate.
//!
//! **Security**: This system only SENDS data, it never accepts requests.

pub mod metrics;
pub mod reporter;

pub use metrics::Metrics;
pub use reporter::MetricsReporter;
