//! Visitor session tracking.
//!
//! Keeps one visitor session id in a [`KeyValueStore`] and reports page
//! views against it. A session rolls over after `session_timeout` of
//! inactivity. Tracking is fire-and-report: failures are logged and
//! reported as `false`, never as errors.

use std::sync::Arc;
use std::time::Duration;

use bizhub_core::KeyValueStore;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::probe::millis;

/// Storage key of the current session.
pub const SESSION_KEY: &str = "bizhub.visitorSession";

/// A visitor session as persisted in the store.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VisitorSession {
    /// Session id (UUIDv7).
    pub id: String,
    /// When the session was created.
    pub started_at: DateTime<Utc>,
    /// Last activity.
    pub last_seen_at: DateTime<Utc>,
}

impl VisitorSession {
    fn start(now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::now_v7().to_string(),
            started_at: now,
            last_seen_at: now,
        }
    }

    /// Whether the session has been idle longer than `timeout` at `now`.
    pub fn is_expired(&self, now: DateTime<Utc>, timeout: Duration) -> bool {
        now.signed_duration_since(self.last_seen_at)
            .to_std()
            .is_ok_and(|idle| idle > timeout)
    }
}

/// Page view payload for the visit endpoint.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VisitEvent {
    /// Session the view belongs to.
    pub session_id: String,
    /// Viewed path.
    pub page: String,
    /// Referring URL, if known.
    pub referrer: Option<String>,
    /// When the view happened.
    pub timestamp: DateTime<Utc>,
}

/// Tracker behaviour.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TrackerConfig {
    /// Whether page views are sent at all.
    pub enabled: bool,
    /// Idle time before a new session starts.
    pub session_timeout: Duration,
    /// Timeout of one tracking request.
    pub request_timeout: Duration,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            session_timeout: Duration::from_secs(30 * 60),
            request_timeout: Duration::from_secs(5),
        }
    }
}

/// Tracks the visitor session and reports page views.
pub struct VisitorTracker {
    client: reqwest::Client,
    visit_url: String,
    store: Arc<dyn KeyValueStore>,
    config: TrackerConfig,
}

impl VisitorTracker {
    /// Tracker posting to `visit_url`, persisting through `store`.
    pub fn new(
        client: reqwest::Client,
        visit_url: impl Into<String>,
        store: Arc<dyn KeyValueStore>,
        config: TrackerConfig,
    ) -> Self {
        Self {
            client,
            visit_url: visit_url.into(),
            store,
            config,
        }
    }

    /// Current session id, starting a new session if needed.
    pub fn session_id(&self) -> String {
        self.touch_session(Utc::now()).id
    }

    /// Load the stored session, rolling it over if missing, unreadable or
    /// expired at `now`, and record activity at `now`.
    pub fn touch_session(&self, now: DateTime<Utc>) -> VisitorSession {
        let stored = self.store.get(SESSION_KEY).and_then(|raw| {
            serde_json::from_str::<VisitorSession>(&raw)
                .map_err(|e| debug!(error = %e, "discarding unreadable visitor session"))
                .ok()
        });

        let mut session = match stored {
            Some(s) if !s.is_expired(now, self.config.session_timeout) => s,
            Some(s) => {
                debug!(session_id = %s.id, "visitor session expired, starting new one");
                VisitorSession::start(now)
            }
            None => VisitorSession::start(now),
        };
        session.last_seen_at = now;
        self.save(&session);
        session
    }

    /// Forget the current session.
    pub fn end_session(&self) {
        self.store.remove(SESSION_KEY);
    }

    /// Report a page view. Returns whether the backend accepted it.
    pub async fn track_page_view(&self, page: &str, referrer: Option<&str>) -> bool {
        if !self.config.enabled {
            return false;
        }

        let now = Utc::now();
        let session = self.touch_session(now);
        let event = VisitEvent {
            session_id: session.id,
            page: page.to_string(),
            referrer: referrer.map(str::to_string),
            timestamp: now,
        };

        let result = self
            .client
            .post(&self.visit_url)
            .timeout(self.config.request_timeout)
            .json(&event)
            .send()
            .await;

        match result {
            Ok(resp) if resp.status().is_success() => {
                debug!(page, session_id = %event.session_id, "page view tracked");
                true
            }
            Ok(resp) => {
                warn!(page, status = resp.status().as_u16(), "page view rejected");
                false
            }
            Err(e) => {
                warn!(
                    page,
                    timeout_ms = millis(self.config.request_timeout),
                    error = %e,
                    "failed to send page view"
                );
                false
            }
        }
    }

    fn save(&self, session: &VisitorSession) {
        match serde_json::to_string(session) {
            Ok(json) => self.store.set(SESSION_KEY, &json),
            Err(e) => warn!(error = %e, "failed to encode visitor session"),
        }
    }
}

impl std::fmt::Debug for VisitorTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VisitorTracker")
            .field("visit_url", &self.visit_url)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
