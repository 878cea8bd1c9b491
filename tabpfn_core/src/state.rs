//! Persistent, per-installation telemetry state.
//!
//! The state is one small JSON document per installation holding opt-in
//! metadata (install id, install date, email, prompt counters, last-ping
//! timestamp). [`StateStore`] reads and writes it with atomic-replace
//! discipline and degrades every I/O failure to "no persisted state":
//! telemetry must never block or crash the host application.
//!
//! The store is not multi-process safe. Mutations are whole-document
//! read-modify-write round trips, so concurrent writers race and the last
//! full-document write wins.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::Result;

/// File name used under a state directory.
pub const STATE_FILENAME: &str = "state.json";

/// Environment variable overriding the exact state file path.
pub const STATE_PATH_ENV: &str = "TABPFN_STATE_PATH";

/// Environment variable overriding the state directory.
pub const STATE_DIR_ENV: &str = "TABPFN_STATE_DIR";

const APP: &str = "tabpfn";
const VENDOR: &str = "priorlabs";

/// One persistent telemetry record per installation.
///
/// All fields are optional on disk; missing keys are backfilled with
/// defaults on load. Unknown keys written by a newer schema version are
/// kept in [`extra`](TelemetryState::extra) and survive a load/save round
/// trip unchanged.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TelemetryState {
    /// Set once on first state-file write, immutable afterwards.
    pub created_at: Option<DateTime<Utc>>,
    /// Tri-state opt-in: unknown (`None`), true, or false.
    pub opted_in: Option<bool>,
    /// Opaque identifier, set only after explicit opt-in.
    pub user_id: Option<String>,
    /// Set only after explicit opt-in with a syntactically valid address.
    pub email: Option<String>,
    /// Number of times the subscription prompt was shown.
    pub email_prompt_count: u32,
    /// Timestamp of the most recent subscription prompt.
    pub last_prompted_at: Option<DateTime<Utc>>,
    /// Timestamp of the most recent liveness ping.
    pub last_pinged_at: Option<DateTime<Utc>>,
    /// Opaque identifier generated lazily on the first telemetry
    /// decision. Independent of `user_id` and never tied to a person.
    pub install_id: Option<String>,
    /// Set lazily on the first telemetry decision. Distinct from
    /// `created_at`, which is stamped on the first state-file write.
    pub install_date: Option<DateTime<Utc>>,
    /// Unknown keys from newer schema versions, preserved verbatim.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl TelemetryState {
    /// The default record for an installation that has never been
    /// written: all fields empty except `created_at`.
    pub fn fresh() -> TelemetryState {
        TelemetryState {
            created_at: Some(Utc::now()),
            ..TelemetryState::default()
        }
    }
}

/// Reads and writes the telemetry state file.
///
/// The path is resolved once at construction: [`STATE_PATH_ENV`] (exact
/// file) takes priority, then [`STATE_DIR_ENV`] (directory), then the
/// OS-standard per-user config directory.
#[derive(Debug, Clone)]
pub struct StateStore {
    path: PathBuf,
}

impl Default for StateStore {
    fn default() -> Self {
        StateStore::new()
    }
}

impl StateStore {
    /// Create a store using the standard path resolution order.
    pub fn new() -> StateStore {
        StateStore {
            path: resolve_state_path(),
        }
    }

    /// Create a store backed by an explicit file path, bypassing
    /// environment overrides. Useful for tests and embedding applications.
    pub fn with_path(path: impl Into<PathBuf>) -> StateStore {
        StateStore { path: path.into() }
    }

    /// The resolved state file path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the state, normalized to the current schema.
    ///
    /// A missing, unreadable, or corrupt file yields the default record;
    /// this never fails.
    pub fn load(&self) -> TelemetryState {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(_) => return TelemetryState::fresh(),
        };
        match serde_json::from_str(&raw) {
            Ok(state) => state,
            Err(err) => {
                log::debug!(target: "tabpfn", "corrupt state file {:?}, resetting to defaults: {err}", self.path);
                TelemetryState::fresh()
            }
        }
    }

    /// Persist the state, stamping `created_at` if absent.
    ///
    /// The document is written to a temporary file in the destination
    /// directory, synced, and atomically renamed over the destination, so
    /// the state file is never observed partially written. I/O failures
    /// are logged and swallowed.
    pub fn save(&self, state: &TelemetryState) {
        let mut state = state.clone();
        if state.created_at.is_none() {
            state.created_at = Some(Utc::now());
        }
        if let Err(err) = self.write_atomic(&state) {
            log::debug!(target: "tabpfn", "failed to write state file {:?}: {err}", self.path);
        }
    }

    /// Load the full state and look a single key up in its JSON form.
    ///
    /// Returns `None` when the key is absent, null, or cannot be coerced
    /// to `T`. Timestamps coerce from their ISO-8601 string form.
    pub fn get_property<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let state = self.load();
        let doc = serde_json::to_value(&state).ok()?;
        let value = doc.get(key)?;
        if value.is_null() {
            return None;
        }
        serde_json::from_value(value.clone()).ok()
    }

    /// Set a single key via a whole-document load-modify-save round trip.
    ///
    /// Known schema fields and unknown extra keys are both accepted. Not
    /// atomic across concurrent callers: the last full-document write
    /// wins.
    pub fn set_property(&self, key: &str, value: impl Serialize) {
        let state = self.load();
        let Ok(Value::Object(mut doc)) = serde_json::to_value(&state) else {
            return;
        };
        let Ok(value) = serde_json::to_value(value) else {
            log::debug!(target: "tabpfn", "unserializable value for state key {key:?}");
            return;
        };
        doc.insert(key.to_owned(), value);
        match serde_json::from_value(Value::Object(doc)) {
            Ok(state) => self.save(&state),
            Err(err) => {
                log::debug!(target: "tabpfn", "invalid value for state key {key:?}: {err}");
            }
        }
    }

    fn write_atomic(&self, state: &TelemetryState) -> Result<()> {
        let dir = self.path.parent().unwrap_or(Path::new("."));
        fs::create_dir_all(dir)?;
        restrict_permissions(dir, 0o700);

        // The temp file lives in the destination directory so the final
        // rename never crosses filesystems. NamedTempFile removes it on
        // drop if any step before persist fails.
        let mut tmp = tempfile::Builder::new().prefix(".tmp_").tempfile_in(dir)?;
        serde_json::to_writer(&mut tmp, state)?;
        tmp.as_file().sync_all()?;
        tmp.persist(&self.path).map_err(|err| err.error)?;
        restrict_permissions(&self.path, 0o600);
        Ok(())
    }
}

/// Resolve the state file location. Overrides first, then the standard
/// per-user config directory.
fn resolve_state_path() -> PathBuf {
    if let Some(path) = non_empty_env(STATE_PATH_ENV) {
        return PathBuf::from(path);
    }
    if let Some(dir) = non_empty_env(STATE_DIR_ENV) {
        return PathBuf::from(dir).join(STATE_FILENAME);
    }
    let base = dirs::config_dir().unwrap_or_else(|| PathBuf::from("."));
    base.join(VENDOR).join(APP).join(STATE_FILENAME)
}

fn non_empty_env(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|value| !value.is_empty())
}

#[cfg(unix)]
fn restrict_permissions(path: &Path, mode: u32) {
    use std::os::unix::fs::PermissionsExt;
    // Best-effort: some filesystems reject chmod and that's fine.
    let _ = fs::set_permissions(path, fs::Permissions::from_mode(mode));
}

#[cfg(not(unix))]
fn restrict_permissions(_path: &Path, _mode: u32) {}
