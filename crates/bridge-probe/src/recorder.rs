//! Traffic recording.
//!
//! The recorder keeps a bounded log of everything a page sent and received,
//! and pushes each event onto a single-consumer queue drained by the
//! [`crate::MonitorRegistry`]. Monitor timers post onto the same queue, so
//! matches and expirations are applied in one serial order.

use crate::matcher::MatchRule;
use crate::network::{CapturedEvent, HttpMethod};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

/// Default number of events kept in the global traffic log
pub const DEFAULT_TRAFFIC_LOG_LIMIT: usize = 1_000;

/// Messages delivered to the registry, in arrival order
#[derive(Debug, Clone)]
pub(crate) enum FeedMessage {
    /// Observed traffic
    Traffic(CapturedEvent),
    /// A monitor's timer fired
    Expired(String),
}

/// Receiving half of the traffic queue, owned by the registry
#[derive(Debug)]
pub(crate) struct TrafficFeed {
    pub(crate) receiver: mpsc::UnboundedReceiver<FeedMessage>,
    pub(crate) sender: mpsc::UnboundedSender<FeedMessage>,
}

/// Records page traffic and forwards it to monitors.
///
/// Cheap to clone; clones share the same log and queue.
#[derive(Debug, Clone)]
pub struct TrafficRecorder {
    log: Arc<Mutex<VecDeque<CapturedEvent>>>,
    limit: usize,
    sender: mpsc::UnboundedSender<FeedMessage>,
}

impl TrafficRecorder {
    /// Create a recorder and the feed its registry drains
    pub(crate) fn channel(limit: usize) -> (Self, TrafficFeed) {
        let (sender, receiver) = mpsc::unbounded_channel();
        let recorder = Self {
            log: Arc::new(Mutex::new(VecDeque::new())),
            limit: limit.max(1),
            sender: sender.clone(),
        };
        (recorder, TrafficFeed { receiver, sender })
    }

    /// Record an observed event
    pub fn record(&self, event: CapturedEvent) {
        if let Ok(mut log) = self.log.lock() {
            if log.len() >= self.limit {
                let _ = log.pop_front();
            }
            log.push_back(event.clone());
        }
        if self.sender.send(FeedMessage::Traffic(event)).is_err() {
            tracing::debug!("traffic feed closed, event kept in log only");
        }
    }

    /// Record an outgoing request
    pub fn record_request(&self, url: &str, method: HttpMethod, body: Option<String>) {
        let mut event = CapturedEvent::request(url, method);
        if let Some(body) = body {
            event = event.with_body(body);
        }
        self.record(event);
    }

    /// Record an incoming response
    pub fn record_response(
        &self,
        url: &str,
        method: HttpMethod,
        status: u16,
        body: Option<String>,
        request_body: Option<String>,
    ) {
        let mut event = CapturedEvent::response(url, method, status);
        if let Some(body) = body {
            event = event.with_body(body);
        }
        if let Some(request_body) = request_body {
            event = event.with_request_body(request_body);
        }
        self.record(event);
    }

    /// All recorded events, oldest first
    #[must_use]
    pub fn events(&self) -> Vec<CapturedEvent> {
        self.log
            .lock()
            .map(|log| log.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Recorded events matching a rule
    #[must_use]
    pub fn events_matching(&self, rule: &MatchRule) -> Vec<CapturedEvent> {
        self.events()
            .into_iter()
            .filter(|e| rule.matches(e))
            .collect()
    }

    /// Recorded requests
    #[must_use]
    pub fn requests(&self) -> Vec<CapturedEvent> {
        self.events().into_iter().filter(CapturedEvent::is_request).collect()
    }

    /// Recorded responses
    #[must_use]
    pub fn responses(&self) -> Vec<CapturedEvent> {
        self.events().into_iter().filter(CapturedEvent::is_response).collect()
    }

    /// Number of events currently held
    #[must_use]
    pub fn len(&self) -> usize {
        self.log.lock().map(|log| log.len()).unwrap_or(0)
    }

    /// Whether the log is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Maximum number of events kept
    #[must_use]
    pub const fn limit(&self) -> usize {
        self.limit
    }

    /// Drop all recorded events
    pub fn clear(&self) {
        if let Ok(mut log) = self.log.lock() {
            log.clear();
        }
    }
}
