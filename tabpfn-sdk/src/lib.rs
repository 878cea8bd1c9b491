//! Cross-cutting client/server utility helpers for the TabPFN SDK.
//!
//! # Overview
//!
//! This crate bundles the user-facing helpers built on top of
//! [`tabpfn_core`]:
//!
//! - [`flows`] — the anonymous usage [`ping`](flows::ping) and the
//!   opt-in newsletter [`subscribe`](flows::subscribe) flow.
//! - [`prompt`] — the interactive email prompt with a bounded wait, so a
//!   TTY prompt can never hang the host indefinitely.
//! - [`analytics`] — an HTTP client decorator that stamps outgoing
//!   requests with analytics headers.
//! - [`error_relay`] — the JSON envelope that forwards a server-side
//!   error kind and message to the client over an HTTP header.
//! - [`environment`] — an explicit process-wide store for execution-mode
//!   configuration shared across modules.
//!
//! # Telemetry
//!
//! Telemetry is anonymous, sampled, and best-effort; it can always be
//! disabled with `TABPFN_DISABLE_TELEMETRY=1`. Construct one
//! [`TelemetryService`] at startup and pass it to call sites.
//!
//! # Logging
//!
//! The crate logs through the [`log`](https://docs.rs/log) facade under
//! the `tabpfn` target.

#![warn(rustdoc::missing_crate_level_docs)]

pub mod analytics;
pub mod environment;
pub mod error_relay;
pub mod flows;
pub mod prompt;

pub use tabpfn_core::config::{ConfigFetcher, RemoteConfig};
pub use tabpfn_core::events::{EventKind, TelemetryEvent};
pub use tabpfn_core::runtime::Runtime;
pub use tabpfn_core::service::{CaptureOptions, IngestionClient, TelemetryService};
pub use tabpfn_core::state::{StateStore, TelemetryState};
pub use tabpfn_core::{Error, Result};
