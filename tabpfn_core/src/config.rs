//! An HTTP client that fetches the remote telemetry policy.

use std::sync::Mutex;
use std::time::{Duration, Instant};

use reqwest::{StatusCode, Url};
use serde::{Deserialize, Serialize};

/// Default public bucket URL for the telemetry policy document. Anyone can
/// and should be able to read it.
pub const DEFAULT_CONFIG_URL: &str =
    "https://storage.googleapis.com/prior-labs-tabpfn-public/config/telemetry.json";

/// Environment variable overriding the policy URL.
pub const CONFIG_URL_ENV: &str = "TABPFN_TELEMETRY_CONFIG_URL";

/// How long a fetched config is served from cache.
pub const CACHE_TTL: Duration = Duration::from_secs(30 * 60);

// A flaky network must never stall the host's fit/predict path.
const FETCH_TIMEOUT: Duration = Duration::from_secs(5);

/// Server-side telemetry policy.
///
/// Every key is optional; absent keys fall back to their defaults at the
/// accessors. The document is never persisted locally.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteConfig {
    pub enabled: Option<bool>,
    pub max_install_days: Option<i64>,
    pub max_duration_ms: Option<u64>,
    pub sampling_rate: Option<f64>,
}

impl RemoteConfig {
    /// The fail-closed config returned when the policy cannot be fetched.
    pub fn disabled() -> RemoteConfig {
        RemoteConfig {
            enabled: Some(false),
            ..RemoteConfig::default()
        }
    }

    /// Telemetry is enabled unless the policy explicitly disables it.
    pub fn is_enabled(&self) -> bool {
        self.enabled.unwrap_or(true)
    }

    /// New-install grace period in days (default 5).
    pub fn max_install_days(&self) -> i64 {
        self.max_install_days.unwrap_or(5)
    }

    /// Outlier-duration threshold in milliseconds (default 10000).
    pub fn max_duration_ms(&self) -> u64 {
        self.max_duration_ms.unwrap_or(10_000)
    }

    /// Hash-bucket sampling rate in [0, 1] (default 0.3).
    pub fn sampling_rate(&self) -> f64 {
        self.sampling_rate.unwrap_or(0.3)
    }
}

struct CacheSlot {
    fetched_at: Instant,
    config: RemoteConfig,
}

/// Fetches [`RemoteConfig`] from a public URL, fail-closed, with a
/// process-wide single-slot cache.
///
/// Reuse one instance: it holds a connection pool and the cache slot.
pub struct ConfigFetcher {
    // Client holds a connection pool internally, so we're reusing the
    // client between requests. `None` if the TLS backend failed to
    // initialize, in which case every fetch fails closed.
    client: Option<reqwest::blocking::Client>,
    url: Option<Url>,
    ttl: Duration,
    cache: Mutex<Option<CacheSlot>>,
}

impl Default for ConfigFetcher {
    fn default() -> Self {
        ConfigFetcher::new()
    }
}

impl ConfigFetcher {
    /// Create a fetcher for [`CONFIG_URL_ENV`] or the default bucket URL.
    pub fn new() -> ConfigFetcher {
        let url = std::env::var(CONFIG_URL_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_URL.to_owned());
        ConfigFetcher::with_url(&url)
    }

    /// Create a fetcher for an explicit URL.
    pub fn with_url(url: &str) -> ConfigFetcher {
        let client = reqwest::blocking::Client::builder()
            .timeout(FETCH_TIMEOUT)
            .build()
            .map_err(|err| {
                log::warn!(target: "tabpfn", "failed to build telemetry http client: {err}");
            })
            .ok();
        let url = Url::parse(url)
            .map_err(|err| {
                log::warn!(target: "tabpfn", "invalid telemetry config url {url:?}: {err}");
            })
            .ok();
        ConfigFetcher {
            client,
            url,
            ttl: CACHE_TTL,
            cache: Mutex::new(None),
        }
    }

    /// Override the cache TTL.
    pub fn with_ttl(mut self, ttl: Duration) -> ConfigFetcher {
        self.ttl = ttl;
        self
    }

    /// Fetch the current policy, serving from cache inside the TTL.
    ///
    /// Any transport error or non-200 response yields
    /// [`RemoteConfig::disabled`]. The fail-closed result is cached too,
    /// so a dead network is not re-probed on every event.
    pub fn fetch(&self) -> RemoteConfig {
        {
            let Ok(cache) = self.cache.lock() else {
                return RemoteConfig::disabled();
            };
            if let Some(slot) = &*cache {
                if slot.fetched_at.elapsed() < self.ttl {
                    return slot.config.clone();
                }
            }
        }

        // The lock is released during the network call. Concurrent callers
        // missing the cache may each issue a request; the last writer wins.
        let config = self.fetch_remote();
        if let Ok(mut cache) = self.cache.lock() {
            *cache = Some(CacheSlot {
                fetched_at: Instant::now(),
                config: config.clone(),
            });
        }
        config
    }

    fn fetch_remote(&self) -> RemoteConfig {
        let (Some(client), Some(url)) = (&self.client, &self.url) else {
            return RemoteConfig::disabled();
        };

        log::debug!(target: "tabpfn", "fetching telemetry config");
        let response = match client.get(url.clone()).send() {
            Ok(response) => response,
            Err(err) => {
                log::debug!(target: "tabpfn", "failed to fetch telemetry config: {err}");
                return RemoteConfig::disabled();
            }
        };

        if response.status() != StatusCode::OK {
            log::debug!(target: "tabpfn", "telemetry config fetch returned {}", response.status());
            return RemoteConfig::disabled();
        }

        match response.json() {
            Ok(config) => {
                log::debug!(target: "tabpfn", "successfully fetched telemetry config");
                config
            }
            Err(err) => {
                log::debug!(target: "tabpfn", "invalid telemetry config body: {err}");
                RemoteConfig::disabled()
            }
        }
    }
}
