//! Monitor registry.
//!
//! A monitor is a registered, time-bounded intent to observe one matching
//! network event. The registry owns every monitor of one page, applies
//! traffic and timer messages in arrival order, and hands settled outcomes
//! to callers of [`MonitorRegistry::wait`].
//!
//! ```text
//!             register()                   traffic match (one-time)
//!   ──────────────────────► Pending ─────────────────────────────► Resolved
//!                             │  │                                    │
//!               timer fired   │  │ cancel()/cancel_all()              │ wait() consumes
//!                             ▼  ▼                                    ▼
//!                 Rejected(Timeout)   Cancelled ─► removed        removed
//! ```
//!
//! Every state change goes through [`Monitor::settle`], which refuses to
//! leave a terminal state, so a monitor is settled at most once.

use crate::matcher::MatchRule;
use crate::network::{CapturedEvent, HttpMethod};
use crate::recorder::{FeedMessage, TrafficFeed, TrafficRecorder, DEFAULT_TRAFFIC_LOG_LIMIT};
use crate::result::ProbeError;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use uuid::Uuid;

/// Default monitor timeout (30 seconds)
pub const DEFAULT_MONITOR_TIMEOUT_MS: u64 = 30_000;

/// Default number of events kept per monitor
pub const DEFAULT_MONITOR_LOG_LIMIT: usize = 100;

/// Options for a registered monitor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonitorOptions {
    /// Resolve on the first matching event
    pub one_time: bool,
    /// Upgrade the rule to substring matching
    pub partial_match: bool,
    /// Monitor deadline in milliseconds (0 = no deadline)
    pub timeout_ms: u64,
    /// Log every matching event at debug level
    pub verbose: bool,
    /// Log expiry at debug instead of warn
    pub silent_timeout: bool,
}

impl Default for MonitorOptions {
    fn default() -> Self {
        Self {
            one_time: true,
            partial_match: false,
            timeout_ms: DEFAULT_MONITOR_TIMEOUT_MS,
            verbose: false,
            silent_timeout: false,
        }
    }
}

impl MonitorOptions {
    /// Create options with defaults
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Keep collecting matches instead of resolving on the first
    #[must_use]
    pub const fn continuous(mut self) -> Self {
        self.one_time = false;
        self
    }

    /// Use substring matching
    #[must_use]
    pub const fn partial(mut self) -> Self {
        self.partial_match = true;
        self
    }

    /// Set the deadline
    #[must_use]
    pub const fn with_timeout(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }

    /// Log every match
    #[must_use]
    pub const fn verbose(mut self) -> Self {
        self.verbose = true;
        self
    }

    /// Expire quietly
    #[must_use]
    pub const fn silent_timeout(mut self) -> Self {
        self.silent_timeout = true;
        self
    }
}

/// Opaque monitor identifier, unique within a registry
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MonitorId(String);

impl MonitorId {
    /// Borrow the id text
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for MonitorId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Why a monitor was rejected
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RejectReason {
    /// Deadline elapsed without a match
    Timeout,
    /// Observation failed
    Error,
}

/// Lifecycle state of a monitor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MonitorState {
    /// Waiting for a match
    Pending,
    /// Matched an event
    Resolved,
    /// Timed out or failed
    Rejected(RejectReason),
    /// Cancelled before settling
    Cancelled,
}

impl MonitorState {
    /// Whether the state is final
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        !matches!(self, Self::Pending)
    }
}

/// Settled result of a monitor
#[derive(Debug, Clone, PartialEq)]
pub enum MonitorOutcome {
    /// A matching event was captured
    Matched(CapturedEvent),
    /// No match before the deadline
    TimedOut,
    /// The monitor was cancelled
    Cancelled,
    /// Observation failed
    Failed(String),
}

impl MonitorOutcome {
    const fn state(&self) -> MonitorState {
        match self {
            Self::Matched(_) => MonitorState::Resolved,
            Self::TimedOut => MonitorState::Rejected(RejectReason::Timeout),
            Self::Cancelled => MonitorState::Cancelled,
            Self::Failed(_) => MonitorState::Rejected(RejectReason::Error),
        }
    }

    /// Whether the monitor timed out
    #[must_use]
    pub const fn is_timeout(&self) -> bool {
        matches!(self, Self::TimedOut)
    }

    /// The captured event, if any
    #[must_use]
    pub const fn event(&self) -> Option<&CapturedEvent> {
        match self {
            Self::Matched(e) => Some(e),
            _ => None,
        }
    }
}

/// Decoded view of a monitor wait
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiResponseResult {
    /// Whether a response was captured with a 2xx status
    pub success: bool,
    /// Decoded body (JSON, unwrapped base64 JSON, or text)
    pub data: Value,
    /// Request-to-response latency in milliseconds
    pub response_time_ms: Option<u64>,
    /// Response URL
    pub url: Option<String>,
    /// HTTP status
    pub status: Option<u16>,
    /// HTTP method
    pub method: Option<HttpMethod>,
    /// Transport request id, or the RPC id when absent
    pub request_id: Option<String>,
    /// Error description when nothing was captured
    pub error: Option<String>,
    /// Whether the wait ended by timeout
    pub timed_out: bool,
}

impl ApiResponseResult {
    /// Build the decoded view of a captured event
    #[must_use]
    pub fn from_event(event: &CapturedEvent) -> Self {
        let request_id = event.request_id.clone().or_else(|| {
            event
                .rpc
                .as_ref()
                .and_then(|rpc| rpc.id.as_ref())
                .map(|id| match id {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                })
        });
        Self {
            success: event.status.map_or(true, |s| (200..300).contains(&s)),
            data: event.decoded_body().into_value(),
            response_time_ms: event.response_time_ms(),
            url: Some(event.url.clone()),
            status: event.status,
            method: Some(event.method),
            request_id,
            error: None,
            timed_out: false,
        }
    }

    /// Build a failed view
    #[must_use]
    pub fn failure(error: impl Into<String>, timed_out: bool) -> Self {
        Self {
            success: false,
            data: Value::Null,
            response_time_ms: None,
            url: None,
            status: None,
            method: None,
            request_id: None,
            error: Some(error.into()),
            timed_out,
        }
    }

    /// Whether anything was captured
    #[must_use]
    pub const fn captured(&self) -> bool {
        self.status.is_some() || self.url.is_some()
    }
}

impl From<&MonitorOutcome> for ApiResponseResult {
    fn from(outcome: &MonitorOutcome) -> Self {
        match outcome {
            MonitorOutcome::Matched(event) => Self::from_event(event),
            MonitorOutcome::TimedOut => Self::failure("Timed out waiting for response", true),
            MonitorOutcome::Cancelled => Self::failure("Monitor cancelled", false),
            MonitorOutcome::Failed(reason) => Self::failure(reason.clone(), false),
        }
    }
}

/// A registered monitor
#[derive(Debug)]
pub struct Monitor {
    id: MonitorId,
    rule: MatchRule,
    options: MonitorOptions,
    state: MonitorState,
    created_at: Instant,
    deadline: Option<Instant>,
    log: VecDeque<CapturedEvent>,
    log_limit: usize,
    outcome: Option<MonitorOutcome>,
    timer: Option<JoinHandle<()>>,
}

impl Monitor {
    /// Monitor id
    #[must_use]
    pub const fn id(&self) -> &MonitorId {
        &self.id
    }

    /// Match rule
    #[must_use]
    pub const fn rule(&self) -> &MatchRule {
        &self.rule
    }

    /// Options
    #[must_use]
    pub const fn options(&self) -> &MonitorOptions {
        &self.options
    }

    /// Current state
    #[must_use]
    pub const fn state(&self) -> MonitorState {
        self.state
    }

    /// Time since registration
    #[must_use]
    pub fn age(&self) -> Duration {
        self.created_at.elapsed()
    }

    /// Events matched so far, oldest first
    #[must_use]
    pub fn log(&self) -> Vec<CapturedEvent> {
        self.log.iter().cloned().collect()
    }

    /// Move to a terminal state. Returns `false` if already settled.
    fn settle(&mut self, outcome: MonitorOutcome) -> bool {
        if self.state.is_terminal() {
            return false;
        }
        self.state = outcome.state();
        self.outcome = Some(outcome);
        self.release_timer();
        true
    }

    fn release_timer(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
    }

    fn append(&mut self, event: &CapturedEvent) {
        if self.log.len() >= self.log_limit {
            let _ = self.log.pop_front();
        }
        self.log.push_back(event.clone());
    }

    fn is_due(&self, now: Instant) -> bool {
        self.deadline.is_some_and(|d| now >= d)
    }
}

/// Sizing for a registry and its recorder
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegistryConfig {
    /// Events kept in the global traffic log
    pub traffic_log_limit: usize,
    /// Events kept per monitor
    pub monitor_log_limit: usize,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            traffic_log_limit: DEFAULT_TRAFFIC_LOG_LIMIT,
            monitor_log_limit: DEFAULT_MONITOR_LOG_LIMIT,
        }
    }
}

/// Owns the monitors of one page.
#[derive(Debug)]
pub struct MonitorRegistry {
    monitors: HashMap<MonitorId, Monitor>,
    recorder: TrafficRecorder,
    feed: TrafficFeed,
    config: RegistryConfig,
    next_seq: u64,
}

impl Default for MonitorRegistry {
    fn default() -> Self {
        Self::new(RegistryConfig::default())
    }
}

impl MonitorRegistry {
    /// Create an empty registry with its own recorder
    #[must_use]
    pub fn new(config: RegistryConfig) -> Self {
        let (recorder, feed) = TrafficRecorder::channel(config.traffic_log_limit);
        Self {
            monitors: HashMap::new(),
            recorder,
            feed,
            config,
            next_seq: 0,
        }
    }

    /// A handle for feeding traffic into this registry
    #[must_use]
    pub fn recorder(&self) -> TrafficRecorder {
        self.recorder.clone()
    }

    /// Register a monitor and start its timer.
    ///
    /// Traffic already queued is applied first, so only events recorded
    /// after this call can match the new monitor.
    pub fn register(&mut self, rule: MatchRule, options: MonitorOptions) -> MonitorId {
        self.pump();

        self.next_seq += 1;
        let simple = Uuid::new_v4().simple().to_string();
        let id = MonitorId(format!("monitor-{}-{}", self.next_seq, &simple[..8]));

        let rule = if options.partial_match {
            rule.partial()
        } else {
            rule
        };

        let now = Instant::now();
        let deadline = (options.timeout_ms > 0)
            .then(|| now + Duration::from_millis(options.timeout_ms));
        let timer = deadline.and_then(|_| self.arm_timer(&id, options.timeout_ms));

        tracing::debug!(
            monitor_id = %id,
            rule = %rule.describe(),
            timeout_ms = options.timeout_ms,
            one_time = options.one_time,
            "monitor registered"
        );

        let _ = self.monitors.insert(
            id.clone(),
            Monitor {
                id: id.clone(),
                rule,
                options,
                state: MonitorState::Pending,
                created_at: now,
                deadline,
                log: VecDeque::new(),
                log_limit: self.config.monitor_log_limit.max(1),
                outcome: None,
                timer,
            },
        );
        id
    }

    fn arm_timer(&self, id: &MonitorId, timeout_ms: u64) -> Option<JoinHandle<()>> {
        let handle = tokio::runtime::Handle::try_current().ok()?;
        let sender = self.feed.sender.clone();
        let id = id.as_str().to_string();
        Some(handle.spawn(async move {
            tokio::time::sleep(Duration::from_millis(timeout_ms)).await;
            let _ = sender.send(FeedMessage::Expired(id));
        }))
    }

    /// Apply one observed event to every live monitor.
    ///
    /// Pending and resolved monitors log the event; a pending one-time
    /// monitor resolves with it.
    pub fn on_traffic_event(&mut self, event: &CapturedEvent) {
        for monitor in self.monitors.values_mut() {
            if !matches!(
                monitor.state,
                MonitorState::Pending | MonitorState::Resolved
            ) || !monitor.rule.matches(event)
            {
                continue;
            }

            monitor.append(event);
            if monitor.options.verbose {
                tracing::debug!(monitor_id = %monitor.id, url = %event.url, status = ?event.status, "monitor matched");
            } else {
                tracing::trace!(monitor_id = %monitor.id, url = %event.url, "monitor matched");
            }

            if monitor.options.one_time && monitor.settle(MonitorOutcome::Matched(event.clone())) {
                tracing::info!(monitor_id = %monitor.id, url = %event.url, status = ?event.status, "monitor resolved");
            }
        }
    }

    fn on_expired(&mut self, id: String) {
        if let Some(monitor) = self.monitors.get_mut(&MonitorId(id)) {
            Self::expire(monitor);
        }
    }

    fn expire(monitor: &mut Monitor) {
        if !monitor.options.one_time {
            if let Some(latest) = monitor.log.back().cloned() {
                if monitor.settle(MonitorOutcome::Matched(latest)) {
                    tracing::debug!(monitor_id = %monitor.id, matches = monitor.log.len(), "monitor window closed");
                }
                return;
            }
        }
        if !monitor.settle(MonitorOutcome::TimedOut) {
            return;
        }
        if monitor.options.silent_timeout {
            tracing::debug!(monitor_id = %monitor.id, rule = %monitor.rule.describe(), "monitor timed out");
        } else {
            tracing::warn!(monitor_id = %monitor.id, rule = %monitor.rule.describe(), "monitor timed out");
        }
    }

    fn handle(&mut self, message: FeedMessage) {
        match message {
            FeedMessage::Traffic(event) => self.on_traffic_event(&event),
            FeedMessage::Expired(id) => self.on_expired(id),
        }
    }

    /// Apply all queued messages, then expire overdue monitors
    pub fn pump(&mut self) {
        while let Ok(message) = self.feed.receiver.try_recv() {
            self.handle(message);
        }
        let now = Instant::now();
        for monitor in self.monitors.values_mut() {
            if monitor.is_due(now) {
                Self::expire(monitor);
            }
        }
    }

    /// Wait for a monitor to settle, up to `timeout`, and remove it.
    ///
    /// One-time monitors settle on their first match. Continuous monitors
    /// keep collecting until their own timeout or `timeout` runs out, then
    /// settle with the most recent match. The monitor is removed on every
    /// exit path.
    pub async fn wait_outcome(&mut self, id: &MonitorId, timeout: Duration) -> MonitorOutcome {
        let wait_deadline = Instant::now() + timeout;
        let outcome = self.drive(id, wait_deadline).await;
        self.remove(id);
        match &outcome {
            MonitorOutcome::Matched(event) => {
                tracing::debug!(monitor_id = %id, url = %event.url, "monitor consumed");
            }
            other => tracing::debug!(monitor_id = %id, outcome = ?other, "monitor wait ended"),
        }
        outcome
    }

    /// Wait for a monitor and decode the result.
    ///
    /// Timeouts and cancellations come back as `success: false` rather
    /// than as errors.
    pub async fn wait(&mut self, id: &MonitorId, timeout: Duration) -> ApiResponseResult {
        let outcome = self.wait_outcome(id, timeout).await;
        ApiResponseResult::from(&outcome)
    }

    async fn drive(&mut self, id: &MonitorId, wait_deadline: Instant) -> MonitorOutcome {
        loop {
            self.pump();

            let Some(monitor) = self.monitors.get_mut(id) else {
                return MonitorOutcome::Failed(
                    ProbeError::MonitorNotFound { id: id.to_string() }.to_string(),
                );
            };

            if let Some(outcome) = monitor.outcome.clone() {
                return outcome;
            }

            let now = Instant::now();
            if now >= wait_deadline {
                if !monitor.options.one_time {
                    if let Some(latest) = monitor.log.back().cloned() {
                        let _ = monitor.settle(MonitorOutcome::Matched(latest.clone()));
                        return MonitorOutcome::Matched(latest);
                    }
                }
                return MonitorOutcome::TimedOut;
            }
            let wake_at = monitor
                .deadline
                .map_or(wait_deadline, |d| d.min(wait_deadline));

            tokio::select! {
                message = self.feed.receiver.recv() => match message {
                    Some(message) => self.handle(message),
                    None => return MonitorOutcome::Failed("traffic feed closed".to_string()),
                },
                () = tokio::time::sleep_until(wake_at) => {}
            }
        }
    }

    fn remove(&mut self, id: &MonitorId) {
        if let Some(mut monitor) = self.monitors.remove(id) {
            monitor.release_timer();
        }
    }

    /// Cancel a monitor. Unknown or already-removed ids are ignored.
    pub fn cancel(&mut self, id: &MonitorId) {
        if let Some(mut monitor) = self.monitors.remove(id) {
            if monitor.settle(MonitorOutcome::Cancelled) {
                tracing::debug!(monitor_id = %id, "monitor cancelled");
            }
            monitor.release_timer();
        }
    }

    /// Cancel every monitor and release all timers
    pub fn cancel_all(&mut self) {
        let ids: Vec<MonitorId> = self.monitors.keys().cloned().collect();
        if !ids.is_empty() {
            tracing::debug!(count = ids.len(), "cancelling all monitors");
        }
        for id in ids {
            self.cancel(&id);
        }
    }

    /// State of a monitor, after applying queued messages
    pub fn state(&mut self, id: &MonitorId) -> Option<MonitorState> {
        self.pump();
        self.monitors.get(id).map(Monitor::state)
    }

    /// Events matched by a monitor so far
    #[must_use]
    pub fn monitor_log(&self, id: &MonitorId) -> Option<Vec<CapturedEvent>> {
        self.monitors.get(id).map(Monitor::log)
    }

    /// Borrow a monitor
    #[must_use]
    pub fn get(&self, id: &MonitorId) -> Option<&Monitor> {
        self.monitors.get(id)
    }

    /// Whether a monitor is registered
    #[must_use]
    pub fn contains(&self, id: &MonitorId) -> bool {
        self.monitors.contains_key(id)
    }

    /// Ids of monitors still pending
    #[must_use]
    pub fn pending_ids(&self) -> Vec<MonitorId> {
        let mut ids: Vec<MonitorId> = self
            .monitors
            .values()
            .filter(|m| m.state == MonitorState::Pending)
            .map(|m| m.id.clone())
            .collect();
        ids.sort();
        ids
    }

    /// Number of registered monitors
    #[must_use]
    pub fn len(&self) -> usize {
        self.monitors.len()
    }

    /// Whether no monitors are registered
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.monitors.is_empty()
    }
}

impl Drop for MonitorRegistry {
    fn drop(&mut self) {
        for monitor in self.monitors.values_mut() {
            monitor.release_timer();
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serde_json::json;

    const ROUTE: &str = "https://api.skip.build/v2/fungible/route";

    fn route_rule() -> MatchRule {
        MatchRule::path("/v2/fungible/route")
    }

    fn short() -> MonitorOptions {
        MonitorOptions::new().with_timeout(2_000)
    }

    mod registration_tests {
        use super::*;

        #[tokio::test]
        async fn test_register_creates_pending_monitor() {
            let mut registry = MonitorRegistry::default();
            let id = registry.register(route_rule(), short());
            assert_eq!(registry.len(), 1);
            assert_eq!(registry.state(&id), Some(MonitorState::Pending));
            assert_eq!(registry.pending_ids(), vec![id]);
        }

        #[tokio::test]
        async fn test_ids_are_unique() {
            let mut registry = MonitorRegistry::default();
            let a = registry.register(route_rule(), short());
            let b = registry.register(route_rule(), short());
            assert_ne!(a, b);
        }

        #[tokio::test]
        async fn test_traffic_before_registration_is_not_matched() {
            let mut registry = MonitorRegistry::default();
            let recorder = registry.recorder();
            recorder.record_response(ROUTE, HttpMethod::Post, 201, Some("{}".into()), None);

            let id = registry.register(route_rule(), short());
            assert_eq!(registry.state(&id), Some(MonitorState::Pending));
            assert!(registry.monitor_log(&id).unwrap().is_empty());
        }

        #[tokio::test]
        async fn test_partial_option_upgrades_rule() {
            let mut registry = MonitorRegistry::default();
            let id = registry.register(MatchRule::path("fungible/route"), short().partial());
            registry
                .recorder()
                .record_response(ROUTE, HttpMethod::Post, 201, None, None);
            assert_eq!(registry.state(&id), Some(MonitorState::Resolved));
        }
    }

    mod resolution_tests {
        use super::*;

        #[tokio::test]
        async fn test_one_time_first_match_wins() {
            let mut registry = MonitorRegistry::default();
            let id = registry.register(route_rule(), short());
            let recorder = registry.recorder();
            recorder.record_response(ROUTE, HttpMethod::Post, 201, Some(r#"{"n":1}"#.into()), None);
            recorder.record_response(ROUTE, HttpMethod::Post, 201, Some(r#"{"n":2}"#.into()), None);

            assert_eq!(registry.state(&id), Some(MonitorState::Resolved));
            assert_eq!(registry.monitor_log(&id).unwrap().len(), 2);

            let result = registry.wait(&id, Duration::from_millis(100)).await;
            assert!(result.success);
            assert_eq!(result.data, json!({"n": 1}));
            assert_eq!(result.status, Some(201));
        }

        #[tokio::test]
        async fn test_wait_resolves_on_later_traffic() {
            let mut registry = MonitorRegistry::default();
            let id = registry.register(route_rule(), short());
            let recorder = registry.recorder();

            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(20)).await;
                recorder.record_response(ROUTE, HttpMethod::Post, 201, Some("{}".into()), None);
            });

            let result = registry.wait(&id, Duration::from_secs(1)).await;
            assert!(result.success);
            assert!(!result.timed_out);
            assert_eq!(result.url.as_deref(), Some(ROUTE));
        }

        #[tokio::test]
        async fn test_non_2xx_is_captured_but_unsuccessful() {
            let mut registry = MonitorRegistry::default();
            let id = registry.register(route_rule(), short());
            registry.recorder().record_response(
                ROUTE,
                HttpMethod::Post,
                404,
                Some(r#"{"message":"no routes found"}"#.into()),
                None,
            );
            let result = registry.wait(&id, Duration::from_millis(100)).await;
            assert!(!result.success);
            assert!(result.captured());
            assert_eq!(result.status, Some(404));
            assert!(result.error.is_none());
        }

        #[tokio::test]
        async fn test_continuous_monitor_keeps_collecting_until_deadline() {
            let mut registry = MonitorRegistry::default();
            let id = registry.register(route_rule(), MonitorOptions::new().continuous().with_timeout(500));
            let recorder = registry.recorder();
            let feeder = tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(20)).await;
                recorder.record_response(ROUTE, HttpMethod::Post, 201, Some(r#"{"n":1}"#.into()), None);
                tokio::time::sleep(Duration::from_millis(50)).await;
                recorder.record_response(ROUTE, HttpMethod::Post, 201, Some(r#"{"n":2}"#.into()), None);
            });

            let result = registry.wait(&id, Duration::from_millis(200)).await;
            feeder.await.unwrap();
            assert!(result.captured());
            assert_eq!(result.data, json!({"n": 2}));
            assert!(!registry.contains(&id));
        }

        #[tokio::test]
        async fn test_continuous_monitor_settles_latest_on_own_timeout() {
            let mut registry = MonitorRegistry::default();
            let id = registry.register(route_rule(), MonitorOptions::new().continuous().with_timeout(40));
            registry
                .recorder()
                .record_response(ROUTE, HttpMethod::Post, 201, Some(r#"{"n":1}"#.into()), None);
            tokio::time::sleep(Duration::from_millis(80)).await;
            assert_eq!(registry.state(&id), Some(MonitorState::Resolved));
            let result = registry.wait(&id, Duration::from_millis(10)).await;
            assert_eq!(result.data, json!({"n": 1}));
        }

        #[tokio::test]
        async fn test_continuous_monitor_returns_latest() {
            let mut registry = MonitorRegistry::default();
            let id = registry.register(route_rule(), short().continuous());
            let recorder = registry.recorder();
            recorder.record_response(ROUTE, HttpMethod::Post, 201, Some(r#"{"n":1}"#.into()), None);
            recorder.record_response(ROUTE, HttpMethod::Post, 201, Some(r#"{"n":2}"#.into()), None);

            assert_eq!(registry.state(&id), Some(MonitorState::Pending));
            let result = registry.wait(&id, Duration::from_millis(100)).await;
            assert_eq!(result.data, json!({"n": 2}));
        }
    }

    mod timeout_tests {
        use super::*;

        #[tokio::test]
        async fn test_monitor_expires_without_wait() {
            let mut registry = MonitorRegistry::default();
            let id = registry.register(route_rule(), MonitorOptions::new().with_timeout(20));
            tokio::time::sleep(Duration::from_millis(80)).await;
            assert_eq!(
                registry.state(&id),
                Some(MonitorState::Rejected(RejectReason::Timeout))
            );
        }

        #[tokio::test]
        async fn test_wait_reports_timeout() {
            let mut registry = MonitorRegistry::default();
            let id = registry.register(
                route_rule(),
                MonitorOptions::new().with_timeout(30).silent_timeout(),
            );
            let result = registry.wait(&id, Duration::from_secs(1)).await;
            assert!(!result.success);
            assert!(result.timed_out);
            assert!(!registry.contains(&id));
        }

        #[tokio::test]
        async fn test_external_wait_timeout_shorter_than_monitor() {
            let mut registry = MonitorRegistry::default();
            let id = registry.register(route_rule(), MonitorOptions::new().with_timeout(10_000));
            let outcome = registry.wait_outcome(&id, Duration::from_millis(30)).await;
            assert!(outcome.is_timeout());
            assert!(registry.is_empty());
        }

        #[tokio::test]
        async fn test_match_after_timeout_does_not_resolve() {
            let mut registry = MonitorRegistry::default();
            let id = registry.register(route_rule(), MonitorOptions::new().with_timeout(10));
            tokio::time::sleep(Duration::from_millis(50)).await;
            registry
                .recorder()
                .record_response(ROUTE, HttpMethod::Post, 201, None, None);
            assert_eq!(
                registry.state(&id),
                Some(MonitorState::Rejected(RejectReason::Timeout))
            );
            assert!(registry.monitor_log(&id).unwrap().is_empty());
        }

        #[tokio::test]
        async fn test_match_before_timer_wins() {
            let mut registry = MonitorRegistry::default();
            let id = registry.register(route_rule(), MonitorOptions::new().with_timeout(40));
            registry
                .recorder()
                .record_response(ROUTE, HttpMethod::Post, 201, None, None);
            tokio::time::sleep(Duration::from_millis(80)).await;
            assert_eq!(registry.state(&id), Some(MonitorState::Resolved));
        }

        #[tokio::test]
        async fn test_zero_timeout_never_expires_by_itself() {
            let mut registry = MonitorRegistry::default();
            let id = registry.register(route_rule(), MonitorOptions::new().with_timeout(0));
            tokio::time::sleep(Duration::from_millis(20)).await;
            assert_eq!(registry.state(&id), Some(MonitorState::Pending));
        }
    }

    mod cleanup_tests {
        use super::*;

        #[tokio::test]
        async fn test_wait_always_removes() {
            let mut registry = MonitorRegistry::default();
            let matched = registry.register(route_rule(), short());
            let missed = registry.register(MatchRule::path("/never"), short());
            registry
                .recorder()
                .record_response(ROUTE, HttpMethod::Post, 201, None, None);

            assert_eq!(registry.len(), 2);
            let _ = registry.wait(&matched, Duration::from_millis(50)).await;
            assert_eq!(registry.len(), 1);
            let _ = registry.wait(&missed, Duration::from_millis(20)).await;
            assert_eq!(registry.len(), 0);
        }

        #[tokio::test]
        async fn test_wait_unknown_id() {
            let mut registry = MonitorRegistry::default();
            let id = registry.register(route_rule(), short());
            registry.cancel(&id);
            let result = registry.wait(&id, Duration::from_millis(10)).await;
            assert!(!result.success);
            assert!(!result.timed_out);
            assert!(result.error.unwrap().contains("Monitor not found"));
        }

        #[tokio::test]
        async fn test_cancel_is_idempotent() {
            let mut registry = MonitorRegistry::default();
            let id = registry.register(route_rule(), short());
            registry.cancel(&id);
            registry.cancel(&id);
            assert!(registry.is_empty());
            assert_eq!(registry.state(&id), None);
        }

        #[tokio::test]
        async fn test_cancel_all() {
            let mut registry = MonitorRegistry::default();
            for _ in 0..3 {
                let _ = registry.register(route_rule(), short());
            }
            registry.cancel_all();
            registry.cancel_all();
            assert!(registry.is_empty());
        }

        #[tokio::test]
        async fn test_timer_after_cancel_is_ignored() {
            let mut registry = MonitorRegistry::default();
            let id = registry.register(route_rule(), MonitorOptions::new().with_timeout(10));
            registry.cancel(&id);
            tokio::time::sleep(Duration::from_millis(40)).await;
            registry.pump();
            assert!(registry.is_empty());
        }
    }

    #[test]
    fn test_register_outside_runtime_uses_deadline() {
        let mut registry = MonitorRegistry::default();
        let id = registry.register(route_rule(), MonitorOptions::new().with_timeout(5));
        assert!(registry.get(&id).unwrap().timer.is_none());
        std::thread::sleep(Duration::from_millis(20));
        assert_eq!(
            registry.state(&id),
            Some(MonitorState::Rejected(RejectReason::Timeout))
        );
    }

    #[test]
    fn test_outcome_conversion() {
        let timed_out = ApiResponseResult::from(&MonitorOutcome::TimedOut);
        assert!(timed_out.timed_out);
        assert!(!timed_out.success);
        let cancelled = ApiResponseResult::from(&MonitorOutcome::Cancelled);
        assert!(!cancelled.timed_out);
        assert_eq!(cancelled.error.as_deref(), Some("Monitor cancelled"));
    }
}
