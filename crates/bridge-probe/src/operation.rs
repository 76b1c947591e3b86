//! Bridge operation records.
//!
//! [`BridgeOperationResult`] is the single aggregate a pipeline run builds up
//! and hands back to its caller, and the shape persisted as JSON.

use crate::monitor::ApiResponseResult;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// How far a bridge operation got.
///
/// Ordered: `Untested < RouteTested < SignTested`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub enum TestProgress {
    /// Nothing verified yet
    #[default]
    Untested,
    /// The route endpoint was exercised
    RouteTested,
    /// The signing step was exercised
    SignTested,
}

impl TestProgress {
    /// Label used in summaries
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Untested => "untested",
            Self::RouteTested => "route-tested",
            Self::SignTested => "sign-tested",
        }
    }
}

impl std::fmt::Display for TestProgress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Parameters of one bridge operation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BridgeRequest {
    /// Amount as typed into the form
    pub amount: String,
    /// Source chain name
    pub from_chain: String,
    /// Source token symbol
    pub from_token: String,
    /// Destination chain name
    pub to_chain: String,
    /// Destination token symbol
    pub to_token: String,
    /// Route type label (e.g. "ibc", "eureka")
    pub route_type: String,
    /// Recipient override
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_address: Option<String>,
}

impl BridgeRequest {
    /// Create a request without a recipient override
    #[must_use]
    pub fn new(
        amount: impl Into<String>,
        from_chain: impl Into<String>,
        from_token: impl Into<String>,
        to_chain: impl Into<String>,
        to_token: impl Into<String>,
        route_type: impl Into<String>,
    ) -> Self {
        Self {
            amount: amount.into(),
            from_chain: from_chain.into(),
            from_token: from_token.into(),
            to_chain: to_chain.into(),
            to_token: to_token.into(),
            route_type: route_type.into(),
            target_address: None,
        }
    }

    /// Send to a specific address
    #[must_use]
    pub fn with_target_address(mut self, address: impl Into<String>) -> Self {
        self.target_address = Some(address.into());
        self
    }
}

/// Immutable snapshot of one interpreted API response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseRecord {
    /// Endpoint URL, or the rule description when nothing was captured
    pub endpoint: String,
    /// HTTP method
    pub method: String,
    /// HTTP status (0 when nothing was captured)
    pub status: u16,
    /// Domain-level success
    pub success: bool,
    /// Decoded body
    pub data: Value,
    /// When the record was taken
    pub timestamp: DateTime<Utc>,
    /// Request-to-response latency in milliseconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_time: Option<u64>,
}

impl ResponseRecord {
    /// Snapshot a monitor result with an interpreted success flag
    #[must_use]
    pub fn from_api(endpoint: &str, response: &ApiResponseResult, success: bool) -> Self {
        Self {
            endpoint: response.url.clone().unwrap_or_else(|| endpoint.to_string()),
            method: response
                .method
                .map_or_else(|| "*".to_string(), |m| m.as_str().to_string()),
            status: response.status.unwrap_or(0),
            success,
            data: response.data.clone(),
            timestamp: Utc::now(),
            response_time: response.response_time_ms,
        }
    }
}

/// Start, end and duration of a run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationTiming {
    /// When the run started
    pub start_time: DateTime<Utc>,
    /// When the run was finalized
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<DateTime<Utc>>,
    /// `end_time - start_time` in milliseconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<u64>,
}

/// Outcome of one bridge operation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BridgeOperationResult {
    /// Task identifier of the run
    pub task_id: String,
    /// What was requested
    pub request: BridgeRequest,
    /// Overall success
    pub success: bool,
    /// Furthest stage reached
    pub test_progress: TestProgress,
    /// Whether a route was available
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub route_pass: Option<bool>,
    /// First failure
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Broadcast transaction hash
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transaction_hash: Option<String>,
    /// Interpreted responses by name
    #[serde(default)]
    pub api_responses: BTreeMap<String, ResponseRecord>,
    /// Free-form preview fields
    #[serde(default)]
    pub preview: BTreeMap<String, Value>,
    /// Timing
    pub timing: OperationTiming,
    /// Screenshot paths in capture order
    #[serde(default)]
    pub screenshots: Vec<String>,
}

impl BridgeOperationResult {
    /// Start a new result
    #[must_use]
    pub fn new(task_id: impl Into<String>, request: BridgeRequest) -> Self {
        Self {
            task_id: task_id.into(),
            request,
            success: false,
            test_progress: TestProgress::Untested,
            route_pass: None,
            error: None,
            transaction_hash: None,
            api_responses: BTreeMap::new(),
            preview: BTreeMap::new(),
            timing: OperationTiming {
                start_time: Utc::now(),
                end_time: None,
                duration: None,
            },
            screenshots: Vec::new(),
        }
    }

    /// Advance progress; never moves backward
    pub fn advance(&mut self, progress: TestProgress) {
        if progress > self.test_progress {
            self.test_progress = progress;
        }
    }

    /// Record a failure. The first error is kept.
    pub fn fail(&mut self, error: impl Into<String>) {
        if self.error.is_none() {
            self.error = Some(error.into());
        }
        self.success = false;
    }

    /// Store a response snapshot. Existing entries are never replaced.
    ///
    /// Returns `false` if `name` was already recorded.
    pub fn record_response(&mut self, name: &str, record: ResponseRecord) -> bool {
        if self.api_responses.contains_key(name) {
            return false;
        }
        let _ = self.api_responses.insert(name.to_string(), record);
        true
    }

    /// Set a preview field
    pub fn set_preview(&mut self, key: &str, value: impl Into<Value>) {
        let _ = self.preview.insert(key.to_string(), value.into());
    }

    /// Whether [`Self::finalize`] has run
    #[must_use]
    pub const fn is_finalized(&self) -> bool {
        self.timing.end_time.is_some()
    }

    /// Stamp timing and derive `success`.
    ///
    /// An explicit outcome wins; otherwise success means no error was
    /// recorded. Only the first call has any effect.
    pub fn finalize(&mut self, explicit_success: Option<bool>, end_time: DateTime<Utc>) -> bool {
        if self.is_finalized() {
            return false;
        }
        let duration = (end_time - self.timing.start_time)
            .num_milliseconds()
            .max(0) as u64;
        self.timing.end_time = Some(end_time);
        self.timing.duration = Some(duration);
        self.success = explicit_success.unwrap_or_else(|| self.error.is_none());
        true
    }

    /// One-line summary for logs and CLI tables
    #[must_use]
    pub fn summary_line(&self) -> String {
        let status = if self.success { "PASS" } else { "FAIL" };
        let mut line = format!(
            "[{status}] {} {} {} -> {} {} ({})",
            self.request.amount,
            self.request.from_token,
            self.request.from_chain,
            self.request.to_chain,
            self.request.to_token,
            self.test_progress
        );
        if let Some(hash) = &self.transaction_hash {
            line.push_str(&format!(" tx={hash}"));
        }
        if let Some(error) = &self.error {
            line.push_str(&format!(" error={error}"));
        }
        line
    }
}
