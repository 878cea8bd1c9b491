//! Pass-through decision for telemetry events.
//!
//! The decision layers a fixed set of always-pass overrides before the
//! generic sampling: liveness pings, first-seen installations, the
//! new-install grace period, and outlier-duration events all pass
//! unconditionally. Everything else goes through deterministic
//! hash-bucket sampling, stable for a given
//! (sdk version, install id, calendar day) triple.

use chrono::{DateTime, Duration, Utc};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::config::RemoteConfig;
use crate::events::{sdk_version, EventKind, TelemetryEvent};
use crate::state::StateStore;

/// Decide whether `event` should be forwarded to the ingestion endpoint.
///
/// Side effects: backfills `install_id` and `install_date` into the state
/// store when absent.
pub fn should_pass_through(event: &TelemetryEvent, store: &StateStore, config: &RemoteConfig) -> bool {
    should_pass_through_at(event, store, config, Utc::now())
}

pub(crate) fn should_pass_through_at(
    event: &TelemetryEvent,
    store: &StateStore,
    config: &RemoteConfig,
    now: DateTime<Utc>,
) -> bool {
    // Pings must always register, regardless of sampling.
    if event.kind() == EventKind::Ping {
        return true;
    }

    let install_id = match store.get_property::<String>("install_id") {
        Some(id) => id,
        None => {
            // Local-only identifier, never derived from user identity.
            let id = Uuid::new_v4().to_string();
            store.set_property("install_id", &id);
            id
        }
    };

    let install_date = match store.get_property::<DateTime<Utc>>("install_date") {
        Some(date) => date,
        None => {
            // First telemetry decision for this installation.
            store.set_property("install_date", now);
            return true;
        }
    };

    // New-install grace period: maximize signal during onboarding.
    if now - install_date <= Duration::days(config.max_install_days()) {
        return true;
    }

    // Outlier durations are operationally interesting, always capture.
    if event.duration_ms().unwrap_or(0) > config.max_duration_ms() {
        return true;
    }

    sample_key(sdk_version(), &install_id, now, config.sampling_rate())
}

/// Deterministic hash-bucket sampling.
///
/// The key `"ver:<sdk_version>+install:<install_id>+day:<YYYY-MM-DD>"` is
/// hashed with SHA-256; the first 8 digest bytes, read as a big-endian
/// integer and normalized by 2^64, give a value in [0, 1) that is
/// compared against `sampling_rate`. A given installation either always
/// passes or never passes on a given day.
pub fn sample_key(sdk_version: &str, install_id: &str, now: DateTime<Utc>, sampling_rate: f64) -> bool {
    let day = now.format("%Y-%m-%d");
    let key = format!("ver:{sdk_version}+install:{install_id}+day:{day}");

    let digest = Sha256::digest(key.as_bytes());
    let bucket = u64::from_be_bytes(digest[..8].try_into().unwrap());
    let interval = bucket as f64 / (1u128 << 64) as f64;

    interval < sampling_rate
}
