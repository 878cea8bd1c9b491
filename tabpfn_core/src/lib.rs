//! `tabpfn_core` is the core library behind the TabPFN client/server
//! utility helpers. If you're a TabPFN user, you probably want the
//! `tabpfn-sdk` crate instead.
//!
//! # Overview
//!
//! `tabpfn_core` is organized as a set of building blocks for product
//! telemetry. Telemetry is best-effort instrumentation: every operation in
//! this crate is designed to fail open toward "do nothing" rather than
//! block or crash the host application.
//!
//! [`StateStore`](state::StateStore) persists a single small JSON document
//! per installation (opt-in status, install id, prompt counters). Writes
//! are atomic (temp file and rename); a corrupt or missing file loads as
//! the default record.
//!
//! [`ConfigFetcher`](config::ConfigFetcher) is an HTTP client that fetches
//! a small server-side policy document ([`RemoteConfig`](config::RemoteConfig))
//! from a public URL. It's best to save and reuse the same instance: it
//! reuses the connection and caches the result for a short TTL. Fetch
//! failures produce a disabled config (fail closed).
//!
//! [`sampler`] decides, per event, whether to forward it. Liveness pings,
//! new installations, and outlier-duration events always pass; everything
//! else goes through deterministic hash-bucket sampling that is stable for
//! a given (sdk version, install id, calendar day) triple.
//!
//! [`TelemetryService`](service::TelemetryService) ties the pieces
//! together: it checks the global enable switch, runs the pass-through
//! decision, merges event properties, and forwards accepted events to an
//! [`IngestionClient`](service::IngestionClient). Construct one service at
//! application startup and share it; its outbound connection and queue are
//! expensive to create per call.
//!
//! # Logging
//!
//! The crate logs through the [`log`](https://docs.rs/log) facade under
//! the `tabpfn` target. Failures on telemetry paths are logged at debug
//! level and never surfaced to the caller.

#![warn(rustdoc::missing_crate_level_docs)]

pub mod config;
pub mod events;
pub mod runtime;
pub mod sampler;
pub mod service;
pub mod state;

mod error;

pub use error::{Error, Result};
