//! Usage-tracking flows: the anonymous liveness ping and the opt-in
//! newsletter subscription.

use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, Utc};
use reqwest::StatusCode;
use uuid::Uuid;

use tabpfn_core::events::TelemetryEvent;
use tabpfn_core::runtime::Runtime;
use tabpfn_core::service::TelemetryService;
use tabpfn_core::state::StateStore;
use tabpfn_core::{Error, Result};

use crate::prompt::{default_prompt, EmailPrompter, PromptOutcome};

/// Environment variable overriding the newsletter subscription base URL.
pub const API_URL_ENV: &str = "TABPFN_API_URL";

/// Default newsletter subscription base URL.
pub const DEFAULT_API_URL: &str = "https://tabpfn-server-wjedmz7r5a-ez.a.run.app";

const SUBSCRIBE_TIMEOUT: StdDuration = StdDuration::from_secs(5);

/// Policy knobs for the subscription prompt.
#[derive(Debug, Clone)]
pub struct SubscribePolicy {
    /// Minimum days between prompts.
    pub delta_days: i64,
    /// Maximum number of times the user is ever prompted.
    pub max_prompts: u32,
    /// Base URL of the subscription API.
    pub api_url: String,
}

impl Default for SubscribePolicy {
    fn default() -> Self {
        SubscribePolicy {
            delta_days: 30,
            max_prompts: 2,
            api_url: std::env::var(API_URL_ENV).unwrap_or_else(|_| DEFAULT_API_URL.to_owned()),
        }
    }
}

/// Register that this installation is alive, at most once per day.
///
/// The ping event is exempt from sampling; whether it is actually
/// forwarded still depends on the service's enable switch.
pub fn ping(service: &TelemetryService) {
    let store = service.store();
    let now = Utc::now();

    if let Some(last) = store.get_property::<DateTime<Utc>>("last_pinged_at") {
        if now - last < Duration::days(1) {
            return;
        }
    }

    service.capture(&TelemetryEvent::ping());
    store.set_property("last_pinged_at", now);
}

/// Prompt the user to subscribe to the newsletter, honoring the default
/// [`SubscribePolicy`].
pub fn subscribe(store: &StateStore, runtime: &Runtime, prompter: &dyn EmailPrompter) {
    subscribe_with_policy(store, runtime, prompter, SubscribePolicy::default());
}

/// Prompt the user to subscribe to the newsletter about releases,
/// critical bug fixes, and major research insights.
///
/// The prompt is skipped when the session is non-interactive, the user
/// already subscribed, the last prompt was under `delta_days` ago, or the
/// prompt was already shown `max_prompts` times. A non-accepting outcome
/// (declined, dismissed, timeout) only records that the prompt happened;
/// it never touches `email` or `user_id`.
pub fn subscribe_with_policy(
    store: &StateStore,
    runtime: &Runtime,
    prompter: &dyn EmailPrompter,
    policy: SubscribePolicy,
) {
    if !runtime.interactive {
        return;
    }
    if store.get_property::<String>("email").is_some() {
        return;
    }

    let now = Utc::now();
    let prompt_count = store.get_property::<u32>("email_prompt_count").unwrap_or(0);
    if let Some(last) = store.get_property::<DateTime<Utc>>("last_prompted_at") {
        if now - last < Duration::days(policy.delta_days) {
            return;
        }
        if prompt_count >= policy.max_prompts {
            return;
        }
    }

    let outcome = prompter.prompt(&default_prompt());

    // Acknowledge the prompt regardless of its outcome.
    store.set_property("last_prompted_at", now);
    store.set_property("email_prompt_count", prompt_count + 1);

    let PromptOutcome::Accepted { email } = outcome else {
        return;
    };

    if let Err(err) = subscribe_user(&policy.api_url, &email) {
        log::debug!(target: "tabpfn", "failed to subscribe user: {err}");
    }

    // The on-disk identity is created only on explicit opt-in and is
    // independent of the install id.
    store.set_property("user_id", Uuid::new_v4().to_string());
    store.set_property("email", &email);
    store.set_property("opted_in", true);
}

fn subscribe_user(base: &str, email: &str) -> Result<()> {
    let endpoint = format!("{base}/newsletter/subscribe");

    let client = reqwest::blocking::Client::builder()
        .timeout(SUBSCRIBE_TIMEOUT)
        .build()?;
    let response = client
        .post(endpoint)
        .json(&serde_json::json!({ "email": email }))
        .send()?;

    if response.status() != StatusCode::OK {
        return Err(Error::SubscriptionRejected(response.status()));
    }
    Ok(())
}
