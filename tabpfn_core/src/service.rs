//! Telemetry capture service: the piece that ties state, remote policy,
//! and the pass-through decision together and forwards accepted events to
//! an ingestion endpoint.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{json, Map, Value};

use crate::config::ConfigFetcher;
use crate::events::TelemetryEvent;
use crate::runtime::Runtime;
use crate::sampler;
use crate::state::StateStore;

/// Environment variable disabling telemetry (`"1"` or `"true"`).
///
/// When unset, telemetry is disabled under CI and enabled elsewhere.
pub const DISABLE_TELEMETRY_ENV: &str = "TABPFN_DISABLE_TELEMETRY";

/// Public PostHog project API key.
pub const POSTHOG_PROJECT_API_KEY: &str = "phc_wemJSoR4e8rGJomHz0clm6aHdOWp0EvpRP368uVsUvJ";

/// Public PostHog host (EU).
pub const POSTHOG_HOST: &str = "https://eu.i.posthog.com";

const DEFAULT_MAX_QUEUE_SIZE: usize = 10;
const DEFAULT_FLUSH_AT: usize = 10;
const SEND_TIMEOUT: Duration = Duration::from_secs(5);

/// A sink for accepted telemetry events.
///
/// Implementations must handle transport failures internally; neither
/// method may panic or block the caller for long.
pub trait IngestionClient: Send + Sync {
    /// Forward one event to the ingestion endpoint.
    fn capture(
        &self,
        name: &str,
        properties: Map<String, Value>,
        timestamp: DateTime<Utc>,
        distinct_id: Option<&str>,
    );

    /// Force any buffered events to be sent immediately.
    fn flush(&self);
}

#[derive(Debug, Serialize)]
struct QueuedEvent {
    event: String,
    properties: Map<String, Value>,
    timestamp: DateTime<Utc>,
    distinct_id: String,
}

/// [`IngestionClient`] backed by the public PostHog batch endpoint.
///
/// Events are buffered in a bounded in-memory queue and posted in batches
/// once `flush_at` events accumulate. When the queue is full, new events
/// are dropped. Transport errors are logged at debug level and swallowed.
pub struct PosthogClient {
    // `None` if the TLS backend failed to initialize; capture then drops
    // events on the floor, which is the fail-open behavior we want.
    client: Option<reqwest::blocking::Client>,
    host: String,
    api_key: String,
    max_queue_size: usize,
    flush_at: usize,
    queue: Mutex<VecDeque<QueuedEvent>>,
}

impl PosthogClient {
    /// Create a client for the public TabPFN PostHog project.
    pub fn new(max_queue_size: usize, flush_at: usize) -> PosthogClient {
        PosthogClient::with_host(POSTHOG_HOST, POSTHOG_PROJECT_API_KEY, max_queue_size, flush_at)
    }

    /// Create a client for an explicit host and project key.
    pub fn with_host(
        host: impl Into<String>,
        api_key: impl Into<String>,
        max_queue_size: usize,
        flush_at: usize,
    ) -> PosthogClient {
        let client = reqwest::blocking::Client::builder()
            .timeout(SEND_TIMEOUT)
            .build()
            .map_err(|err| {
                log::debug!(target: "tabpfn", "failed to build ingestion http client: {err}");
            })
            .ok();
        PosthogClient {
            client,
            host: host.into(),
            api_key: api_key.into(),
            max_queue_size: max_queue_size.max(1),
            flush_at: flush_at.max(1),
            queue: Mutex::new(VecDeque::new()),
        }
    }

    fn drain(&self) -> Vec<QueuedEvent> {
        match self.queue.lock() {
            Ok(mut queue) => queue.drain(..).collect(),
            Err(_) => Vec::new(),
        }
    }

    fn send_batch(&self, batch: Vec<QueuedEvent>) {
        if batch.is_empty() {
            return;
        }
        let Some(client) = &self.client else { return };
        let url = format!("{}/batch/", self.host);
        let payload = json!({
            "api_key": self.api_key,
            "batch": batch,
        });
        match client.post(&url).json(&payload).send() {
            Ok(response) if !response.status().is_success() => {
                log::debug!(target: "tabpfn", "ingestion endpoint returned {}", response.status());
            }
            Ok(_) => {}
            Err(err) => {
                log::debug!(target: "tabpfn", "failed to deliver telemetry batch: {err}");
            }
        }
    }
}

impl IngestionClient for PosthogClient {
    fn capture(
        &self,
        name: &str,
        mut properties: Map<String, Value>,
        timestamp: DateTime<Utc>,
        distinct_id: Option<&str>,
    ) {
        // Events are anonymous by default; geoip enrichment is opted out
        // on the PostHog side.
        properties.insert("$geoip_disable".to_owned(), json!(true));
        let event = QueuedEvent {
            event: name.to_owned(),
            properties,
            timestamp,
            distinct_id: distinct_id.unwrap_or("anonymous").to_owned(),
        };

        let batch = {
            let Ok(mut queue) = self.queue.lock() else { return };
            if queue.len() >= self.max_queue_size {
                log::debug!(target: "tabpfn", "telemetry queue full, dropping event {name:?}");
                return;
            }
            queue.push_back(event);
            if queue.len() >= self.flush_at {
                queue.drain(..).collect()
            } else {
                Vec::new()
            }
        };
        self.send_batch(batch);
    }

    fn flush(&self) {
        self.send_batch(self.drain());
    }
}

/// Options for [`TelemetryService::capture_with`].
#[derive(Debug, Default)]
pub struct CaptureOptions {
    /// Explicit distinct id to attach to the event (useful server-side).
    /// When absent, the event stays anonymous.
    pub distinct_id: Option<String>,
    /// Extra properties merged over the event's own; extra wins on
    /// collision.
    pub properties: Map<String, Value>,
    /// Timestamp override; defaults to the event's own timestamp.
    pub timestamp: Option<DateTime<Utc>>,
}

/// Service for capturing anonymous, aggregated product telemetry.
///
/// Construct one instance at application startup and share it: the
/// ingestion client's connection and queue are expensive to create per
/// call. Every operation fails open toward "do nothing".
pub struct TelemetryService {
    store: StateStore,
    fetcher: ConfigFetcher,
    runtime: Runtime,
    client: Option<Box<dyn IngestionClient>>,
}

impl Default for TelemetryService {
    fn default() -> Self {
        TelemetryService::new()
    }
}

impl TelemetryService {
    /// Create a service with the default state store, config fetcher, and
    /// PostHog ingestion client.
    pub fn new() -> TelemetryService {
        TelemetryService::with_queue_settings(DEFAULT_MAX_QUEUE_SIZE, DEFAULT_FLUSH_AT)
    }

    /// Create a service with explicit ingestion queue settings.
    pub fn with_queue_settings(max_queue_size: usize, flush_at: usize) -> TelemetryService {
        TelemetryService::with_parts(
            StateStore::new(),
            ConfigFetcher::new(),
            Runtime::detect(),
            Some(Box::new(PosthogClient::new(max_queue_size, flush_at))),
        )
    }

    /// Create a service from explicit collaborators. `client: None` makes
    /// every capture a no-op, which is useful for tests and hard opt-out.
    pub fn with_parts(
        store: StateStore,
        fetcher: ConfigFetcher,
        runtime: Runtime,
        client: Option<Box<dyn IngestionClient>>,
    ) -> TelemetryService {
        TelemetryService {
            store,
            fetcher,
            runtime,
            client,
        }
    }

    /// The state store this service reads and backfills.
    pub fn store(&self) -> &StateStore {
        &self.store
    }

    /// Whether telemetry is currently enabled.
    ///
    /// The environment override is consulted first ([`DISABLE_TELEMETRY_ENV`],
    /// defaulting to disabled under CI), then the remote policy. Both are
    /// re-evaluated on every call; the policy fetch is subject to the
    /// fetcher's own TTL cache.
    pub fn is_enabled(&self) -> bool {
        let raw = std::env::var(DISABLE_TELEMETRY_ENV).ok();
        if disabled_by_env(raw.as_deref(), &self.runtime) {
            return false;
        }
        self.fetcher.fetch().is_enabled()
    }

    /// Capture an event with default options.
    pub fn capture(&self, event: &TelemetryEvent) {
        self.capture_with(event, CaptureOptions::default());
    }

    /// Capture an event.
    ///
    /// No-op when telemetry is disabled, when the ingestion client is
    /// absent, or when the pass-through decision rejects the event.
    /// Transport errors never reach the caller.
    pub fn capture_with(&self, event: &TelemetryEvent, options: CaptureOptions) {
        if !self.is_enabled() {
            return;
        }
        let Some(client) = &self.client else { return };

        let config = self.fetcher.fetch();
        if !sampler::should_pass_through(event, &self.store, &config) {
            return;
        }

        let mut properties = event.properties().clone();
        for (key, value) in options.properties {
            properties.insert(key, value);
        }
        let timestamp = options.timestamp.unwrap_or_else(|| event.timestamp());

        client.capture(event.name(), properties, timestamp, options.distinct_id.as_deref());
    }

    /// Force buffered events out. No-op when disabled.
    pub fn flush(&self) {
        if !self.is_enabled() {
            return;
        }
        if let Some(client) = &self.client {
            client.flush();
        }
    }
}

/// The environment override: explicit `"1"`/`"true"` disables; when the
/// variable is unset, CI runs default to disabled.
fn disabled_by_env(raw: Option<&str>, runtime: &Runtime) -> bool {
    let default = if runtime.ci { "1" } else { "0" };
    let raw = raw.unwrap_or(default);
    matches!(raw.to_ascii_lowercase().as_str(), "1" | "true")
}

#[cfg(test)]
mod tests {
    use std::io::{Read, Write};
    use std::net::TcpListener;
    use std::sync::{Arc, Mutex};

    use super::*;
    use crate::state::STATE_FILENAME;

    const NOT_CI: Runtime = Runtime {
        ci: false,
        interactive: false,
    };

    #[derive(Clone, Default)]
    struct RecordingClient {
        captured: Arc<Mutex<Vec<(String, Map<String, Value>, Option<String>)>>>,
        flushed: Arc<Mutex<usize>>,
    }

    impl IngestionClient for RecordingClient {
        fn capture(
            &self,
            name: &str,
            properties: Map<String, Value>,
            _timestamp: DateTime<Utc>,
            distinct_id: Option<&str>,
        ) {
            self.captured.lock().unwrap().push((
                name.to_owned(),
                properties,
                distinct_id.map(str::to_owned),
            ));
        }

        fn flush(&self) {
            *self.flushed.lock().unwrap() += 1;
        }
    }

    /// Serve an always-enabled policy from a local socket.
    fn enabled_policy_url() -> String {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        std::thread::spawn(move || {
            for stream in listener.incoming() {
                let Ok(mut stream) = stream else { break };
                let mut buf = [0u8; 1024];
                let _ = stream.read(&mut buf);
                let body = r#"{"enabled":true,"sampling_rate":1.0}"#;
                let response = format!(
                    "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                    body.len()
                );
                let _ = stream.write_all(response.as_bytes());
            }
        });
        format!("http://{addr}/telemetry.json")
    }

    fn service_in(
        dir: &tempfile::TempDir,
        config_url: &str,
        client: RecordingClient,
    ) -> TelemetryService {
        TelemetryService::with_parts(
            StateStore::with_path(dir.path().join(STATE_FILENAME)),
            ConfigFetcher::with_url(config_url),
            NOT_CI,
            Some(Box::new(client)),
        )
    }

    #[test]
    fn env_override_semantics() {
        let ci = Runtime {
            ci: true,
            interactive: false,
        };

        assert!(disabled_by_env(Some("1"), &NOT_CI));
        assert!(disabled_by_env(Some("true"), &NOT_CI));
        assert!(disabled_by_env(Some("True"), &NOT_CI));
        assert!(!disabled_by_env(Some("0"), &NOT_CI));
        assert!(!disabled_by_env(Some(""), &NOT_CI));

        // Unset: CI defaults to disabled, everything else to enabled.
        assert!(disabled_by_env(None, &ci));
        assert!(!disabled_by_env(None, &NOT_CI));
        // Explicit opt-in wins over the CI default.
        assert!(!disabled_by_env(Some("0"), &ci));
    }

    #[test]
    fn unreachable_policy_disables_capture_entirely() {
        let _ = env_logger::builder().is_test(true).try_init();

        let dir = tempfile::tempdir().unwrap();
        let client = RecordingClient::default();
        let service = service_in(&dir, "http://127.0.0.1:9/telemetry.json", client.clone());

        assert!(!service.is_enabled());
        service.capture(&TelemetryEvent::fit("classification", 100, 5, 100));
        service.flush();

        // Zero ingestion calls and zero state mutations.
        assert!(client.captured.lock().unwrap().is_empty());
        assert_eq!(*client.flushed.lock().unwrap(), 0);
        assert!(!dir.path().join(STATE_FILENAME).exists());
    }

    #[test]
    fn accepted_event_reaches_ingestion_client() {
        let _ = env_logger::builder().is_test(true).try_init();

        let dir = tempfile::tempdir().unwrap();
        let client = RecordingClient::default();
        let service = service_in(&dir, &enabled_policy_url(), client.clone());

        assert!(service.is_enabled());
        service.capture(&TelemetryEvent::ping());

        let captured = client.captured.lock().unwrap();
        assert_eq!(captured.len(), 1);
        assert_eq!(captured[0].0, "ping");
        assert_eq!(captured[0].2, None);
    }

    #[test]
    fn extra_properties_win_on_collision() {
        let dir = tempfile::tempdir().unwrap();
        let client = RecordingClient::default();
        let service = service_in(&dir, &enabled_policy_url(), client.clone());

        let mut properties = Map::new();
        properties.insert("language".to_owned(), json!("python-bridge"));
        properties.insert("backend".to_owned(), json!("gpu"));
        service.capture_with(
            &TelemetryEvent::ping(),
            CaptureOptions {
                distinct_id: Some("user-7".to_owned()),
                properties,
                timestamp: None,
            },
        );

        let captured = client.captured.lock().unwrap();
        assert_eq!(captured[0].1["language"], json!("python-bridge"));
        assert_eq!(captured[0].1["backend"], json!("gpu"));
        assert_eq!(captured[0].2.as_deref(), Some("user-7"));
    }

    #[test]
    fn missing_client_is_a_noop() {
        let dir = tempfile::tempdir().unwrap();
        let service = TelemetryService::with_parts(
            StateStore::with_path(dir.path().join(STATE_FILENAME)),
            ConfigFetcher::with_url(&enabled_policy_url()),
            NOT_CI,
            None,
        );

        service.capture(&TelemetryEvent::ping());
        service.flush();
    }

    #[test]
    fn flush_reaches_client_when_enabled() {
        let dir = tempfile::tempdir().unwrap();
        let client = RecordingClient::default();
        let service = service_in(&dir, &enabled_policy_url(), client.clone());

        service.flush();
        assert_eq!(*client.flushed.lock().unwrap(), 1);
    }

    #[test]
    fn posthog_queue_drops_when_full() {
        // Unroutable host: nothing is ever actually sent.
        let client = PosthogClient::with_host("http://127.0.0.1:9", "key", 2, 100);
        for _ in 0..5 {
            client.capture("ping", Map::new(), Utc::now(), None);
        }
        assert_eq!(client.queue.lock().unwrap().len(), 2);
    }

    #[test]
    fn posthog_flush_drains_queue() {
        let client = PosthogClient::with_host("http://127.0.0.1:9", "key", 10, 100);
        client.capture("ping", Map::new(), Utc::now(), None);
        client.flush();
        assert!(client.queue.lock().unwrap().is_empty());
    }
}
