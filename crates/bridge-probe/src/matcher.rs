//! Path and JSON-RPC matching.
//!
//! Pure predicates deciding whether a [`CapturedEvent`] belongs to a rule.
//! Nothing is cached between calls; every event is evaluated on its own.

use crate::network::{CapturedEvent, EventKind, HttpMethod, RpcEnvelope};
use serde::{Deserialize, Serialize};

/// How a rule path is compared with an observed path
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum MatchMode {
    /// String equality
    #[default]
    Exact,
    /// Substring containment
    Partial,
}

impl MatchMode {
    /// Compare an observed value against a rule value.
    ///
    /// An empty rule value never matches.
    #[must_use]
    pub fn compare(self, observed: &str, expected: &str) -> bool {
        if expected.is_empty() || observed.is_empty() {
            return false;
        }
        match self {
            Self::Exact => observed == expected,
            Self::Partial => observed.contains(expected),
        }
    }
}

/// JSON-RPC part of a rule
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RpcRule {
    /// Required `method` of the request body
    pub method: String,
    /// Required `params.path`, compared with the rule's [`MatchMode`]
    pub param_path: Option<String>,
}

/// A rule describing which events a monitor wants
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchRule {
    /// URL or path to match; may be empty for RPC rules
    pub path: String,
    /// HTTP method filter
    pub method: HttpMethod,
    /// Exact or partial comparison
    pub mode: MatchMode,
    /// Whether requests or responses are wanted
    pub target: EventKind,
    /// JSON-RPC correlation requirements
    pub rpc: Option<RpcRule>,
}

impl MatchRule {
    /// Match responses whose URL or path equals `path`
    #[must_use]
    pub fn path(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            method: HttpMethod::Any,
            mode: MatchMode::Exact,
            target: EventKind::Response,
            rpc: None,
        }
    }

    /// Match JSON-RPC responses correlated with a request calling `method`
    #[must_use]
    pub fn rpc(method: impl Into<String>) -> Self {
        Self {
            path: String::new(),
            method: HttpMethod::Post,
            mode: MatchMode::Exact,
            target: EventKind::Response,
            rpc: Some(RpcRule {
                method: method.into(),
                param_path: None,
            }),
        }
    }

    /// Require an RPC `params.path`
    #[must_use]
    pub fn with_param_path(mut self, param_path: impl Into<String>) -> Self {
        if let Some(rpc) = self.rpc.as_mut() {
            rpc.param_path = Some(param_path.into());
        }
        self
    }

    /// Restrict the RPC rule to a URL or path
    #[must_use]
    pub fn at(mut self, path: impl Into<String>) -> Self {
        self.path = path.into();
        self
    }

    /// Set the HTTP method filter
    #[must_use]
    pub const fn with_method(mut self, method: HttpMethod) -> Self {
        self.method = method;
        self
    }

    /// Use substring containment
    #[must_use]
    pub const fn partial(mut self) -> Self {
        self.mode = MatchMode::Partial;
        self
    }

    /// Match outgoing requests instead of responses
    #[must_use]
    pub const fn on_request(mut self) -> Self {
        self.target = EventKind::Request;
        self
    }

    /// Whether this rule correlates JSON-RPC bodies
    #[must_use]
    pub const fn is_rpc(&self) -> bool {
        self.rpc.is_some()
    }

    /// Short human-readable description used in logs
    #[must_use]
    pub fn describe(&self) -> String {
        match &self.rpc {
            Some(rpc) => match &rpc.param_path {
                Some(p) => format!("rpc:{}({})", rpc.method, p),
                None => format!("rpc:{}", rpc.method),
            },
            None => format!("{} {}", self.method, self.path),
        }
    }

    /// Evaluate this rule against an event
    #[must_use]
    pub fn matches(&self, event: &CapturedEvent) -> bool {
        matches(event, self)
    }

    fn url_matches(&self, event: &CapturedEvent) -> bool {
        self.mode.compare(&event.url, &self.path) || self.mode.compare(event.path(), &self.path)
    }

    fn request_envelope_matches(&self, rpc: &RpcRule, envelope: &RpcEnvelope) -> bool {
        if !envelope.is_request() || rpc.method.is_empty() {
            return false;
        }
        if envelope.method.as_deref() != Some(rpc.method.as_str()) {
            return false;
        }
        match &rpc.param_path {
            Some(expected) => envelope
                .param_path()
                .is_some_and(|observed| self.mode.compare(observed, expected)),
            None => true,
        }
    }
}

/// Decide whether `observed` belongs to `rule`.
///
/// Plain rules compare the URL (or its path) under the rule's mode. RPC rules
/// additionally require a parseable request envelope with the right method
/// and `params.path`; for responses the response `id` must echo the request
/// `id`. Events whose bodies are not RPC never match an RPC rule.
#[must_use]
pub fn matches(observed: &CapturedEvent, rule: &MatchRule) -> bool {
    if observed.kind != rule.target || !rule.method.matches(&observed.method) {
        return false;
    }

    let Some(rpc) = &rule.rpc else {
        return rule.url_matches(observed);
    };

    if !rule.path.is_empty() && !rule.url_matches(observed) {
        return false;
    }

    match observed.kind {
        EventKind::Request => observed
            .rpc
            .as_ref()
            .is_some_and(|env| rule.request_envelope_matches(rpc, env)),
        EventKind::Response => {
            let Some(request) = observed.request_rpc() else {
                return false;
            };
            let Some(response) = observed.rpc.as_ref() else {
                return false;
            };
            rule.request_envelope_matches(rpc, &request) && response.id_matches(&request)
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serde_json::json;

    const SIMULATE: &str = "/cosmos.tx.v1beta1.Service/Simulate";

    fn route_response(url: &str) -> CapturedEvent {
        CapturedEvent::response(url, HttpMethod::Post, 201).with_body("{}")
    }

    fn rpc_request(id: u64, method: &str, path: &str) -> String {
        json!({"jsonrpc": "2.0", "id": id, "method": method, "params": {"path": path}})
            .to_string()
    }

    fn rpc_response(id: u64, request_body: &str) -> CapturedEvent {
        CapturedEvent::response("https://rpc.example.com", HttpMethod::Post, 200)
            .with_body(json!({"jsonrpc": "2.0", "id": id, "result": {}}).to_string())
            .with_request_body(request_body)
    }

    mod path_tests {
        use super::*;

        #[test]
        fn test_exact_matches_full_url_or_path() {
            let event = route_response("https://api.skip.build/v2/fungible/route");
            assert!(MatchRule::path("/v2/fungible/route").matches(&event));
            assert!(MatchRule::path("https://api.skip.build/v2/fungible/route").matches(&event));
            assert!(!MatchRule::path("/v2/fungible").matches(&event));
        }

        #[test]
        fn test_partial_is_substring() {
            let event = route_response("https://api.skip.build/v2/fungible/route");
            assert!(MatchRule::path("fungible/ro").partial().matches(&event));
            assert!(!MatchRule::path("fungible/msgs").partial().matches(&event));
        }

        #[test]
        fn test_empty_path_never_matches() {
            let event = route_response("https://api.skip.build/v2/fungible/route");
            assert!(!MatchRule::path("").matches(&event));
            assert!(!MatchRule::path("").partial().matches(&event));
        }

        #[test]
        fn test_target_kind() {
            let request = CapturedEvent::request(
                "https://api.skip.build/v2/fungible/route",
                HttpMethod::Post,
            );
            let rule = MatchRule::path("/v2/fungible/route");
            assert!(!rule.matches(&request));
            assert!(rule.clone().on_request().matches(&request));
        }

        #[test]
        fn test_method_filter() {
            let event = route_response("https://api.skip.build/v2/fungible/route");
            let rule = MatchRule::path("/v2/fungible/route").with_method(HttpMethod::Get);
            assert!(!rule.matches(&event));
        }
    }

    mod rpc_tests {
        use super::*;

        #[test]
        fn test_request_match() {
            let request = CapturedEvent::request("https://rpc", HttpMethod::Post)
                .with_body(rpc_request(3, "abci_query", SIMULATE));
            let rule = MatchRule::rpc("abci_query")
                .with_param_path(SIMULATE)
                .on_request();
            assert!(rule.matches(&request));
        }

        #[test]
        fn test_response_requires_echoed_id() {
            let body = rpc_request(3, "abci_query", SIMULATE);
            let rule = MatchRule::rpc("abci_query").with_param_path(SIMULATE);
            assert!(rule.matches(&rpc_response(3, &body)));
            assert!(!rule.matches(&rpc_response(4, &body)));
        }

        #[test]
        fn test_method_mismatch() {
            let body = rpc_request(1, "status", SIMULATE);
            let rule = MatchRule::rpc("abci_query").with_param_path(SIMULATE);
            assert!(!rule.matches(&rpc_response(1, &body)));
        }

        #[test]
        fn test_param_path_partial() {
            let body = rpc_request(1, "abci_query", SIMULATE);
            let exact = MatchRule::rpc("abci_query").with_param_path("Simulate");
            assert!(!exact.matches(&rpc_response(1, &body)));
            assert!(exact.partial().matches(&rpc_response(1, &body)));
        }

        #[test]
        fn test_malformed_body_ignored_by_rpc_rule() {
            let event = CapturedEvent::response("https://rpc", HttpMethod::Post, 200)
                .with_body("{broken")
                .with_request_body("{broken");
            assert!(!MatchRule::rpc("abci_query").matches(&event));
        }

        #[test]
        fn test_missing_request_body() {
            let event = CapturedEvent::response("https://rpc", HttpMethod::Post, 200)
                .with_body(r#"{"id":1,"result":{}}"#);
            assert!(!MatchRule::rpc("broadcast_tx_sync").matches(&event));
        }

        #[test]
        fn test_url_restriction() {
            let body = json!({"id": 9, "method": "broadcast_tx_sync", "params": {"tx": "AA=="}})
                .to_string();
            let rule = MatchRule::rpc("broadcast_tx_sync").at("rpc.example.com").partial();
            assert!(rule.matches(&rpc_response(9, &body)));
            let elsewhere = MatchRule::rpc("broadcast_tx_sync").at("rpc.other.net").partial();
            assert!(!elsewhere.matches(&rpc_response(9, &body)));
        }
    }

    #[test]
    fn test_describe() {
        assert_eq!(MatchRule::path("/v2/route").describe(), "* /v2/route");
        assert_eq!(
            MatchRule::rpc("abci_query").with_param_path("/x").describe(),
            "rpc:abci_query(/x)"
        );
    }
}
