//! HTTP client decorator that stamps outgoing requests with analytics
//! headers.
//!
//! The caller names its own component explicitly instead of the library
//! inferring it; a request made outside any component reports the
//! [`STANDALONE_CALLER`] sentinel.

use reqwest::blocking::{Client, RequestBuilder, Response};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::Method;
use uuid::Uuid;

// Header names are part of the wire contract shared with the TabPFN
// server; HTTP header names are case-insensitive.
const HEADER_UNIQUE_CALL_ID: HeaderName = HeaderName::from_static("pl-unique-call-id");
const HEADER_RUNTIME_VERSION: HeaderName = HeaderName::from_static("pl-python-version");
const HEADER_CALLING_CLASS: HeaderName = HeaderName::from_static("pl-calling-class");
const HEADER_MODULE_NAME: HeaderName = HeaderName::from_static("pl-module-name");

/// Reported as the calling component when none is supplied.
pub const STANDALONE_CALLER: &str = "StandaloneFunction";

/// An HTTP client that adds analytics headers to every request it
/// creates: a fresh per-call id, the SDK runtime version, the calling
/// component, and the module name fixed at construction.
pub struct AnalyticsClient {
    client: Client,
    module_name: String,
}

impl AnalyticsClient {
    /// Create a client reporting `module_name` on every request.
    pub fn new(module_name: impl Into<String>) -> AnalyticsClient {
        AnalyticsClient::with_client(module_name, Client::new())
    }

    /// Wrap an existing `reqwest` client (custom timeouts, proxies).
    pub fn with_client(module_name: impl Into<String>, client: Client) -> AnalyticsClient {
        AnalyticsClient {
            client,
            module_name: module_name.into(),
        }
    }

    /// Start a request with analytics headers already stamped.
    ///
    /// `caller` names the component issuing the call; `None` reports
    /// [`STANDALONE_CALLER`].
    pub fn request(&self, method: Method, url: &str, caller: Option<&str>) -> RequestBuilder {
        self.client
            .request(method, url)
            .headers(self.analytics_headers(caller))
    }

    /// Convenience wrapper for GET requests.
    pub fn get(&self, url: &str, caller: Option<&str>) -> RequestBuilder {
        self.request(Method::GET, url, caller)
    }

    /// Convenience wrapper for POST requests.
    pub fn post(&self, url: &str, caller: Option<&str>) -> RequestBuilder {
        self.request(Method::POST, url, caller)
    }

    /// Send a prepared request. Thin passthrough kept so call sites don't
    /// need to also hold the inner client.
    pub fn execute(&self, request: reqwest::blocking::Request) -> reqwest::Result<Response> {
        self.client.execute(request)
    }

    /// The analytics headers for one call.
    pub fn analytics_headers(&self, caller: Option<&str>) -> HeaderMap {
        let mut headers = HeaderMap::new();
        insert_header(
            &mut headers,
            HEADER_UNIQUE_CALL_ID,
            &Uuid::new_v4().to_string(),
        );
        insert_header(&mut headers, HEADER_RUNTIME_VERSION, runtime_version());
        insert_header(
            &mut headers,
            HEADER_CALLING_CLASS,
            caller.unwrap_or(STANDALONE_CALLER),
        );
        insert_header(&mut headers, HEADER_MODULE_NAME, &self.module_name);
        headers
    }
}

/// The runtime version string reported to the server.
pub fn runtime_version() -> &'static str {
    concat!("rust/", env!("CARGO_PKG_VERSION"))
}

fn insert_header(headers: &mut HeaderMap, name: HeaderName, value: &str) {
    match HeaderValue::from_str(value) {
        Ok(value) => {
            headers.insert(name, value);
        }
        Err(_) => {
            log::debug!(target: "tabpfn", "skipping analytics header {name:?}: invalid value");
        }
    }
}
