//! Response interpretation.
//!
//! Turns captured responses into domain outcomes: route availability,
//! message previews, simulation failures and broadcast results. Each
//! endpoint has its own decoder; none of them fail, malformed payloads just
//! produce failure outcomes with the best message that can be recovered.

use crate::monitor::ApiResponseResult;
use crate::network::decode_base64_json;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::OnceLock;

/// Status the route and messages endpoints answer with on success
pub const CREATED: u16 = 201;

/// Normalized error for an unroutable transfer
pub const NO_ROUTES_FOUND: &str = "no routes found";

/// Which endpoint a response came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EndpointKind {
    /// Route lookup
    Route,
    /// Message construction
    Messages,
    /// Transaction simulation over JSON-RPC
    Simulation,
    /// Transaction broadcast over JSON-RPC
    Broadcast,
}

impl EndpointKind {
    /// Key used in `apiResponses`
    #[must_use]
    pub const fn record_name(&self) -> &'static str {
        match self {
            Self::Route => "route",
            Self::Messages => "messages",
            Self::Simulation => "simulation",
            Self::Broadcast => "broadcast",
        }
    }
}

/// Fields extracted from a successful messages response
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessagesPreview {
    /// Fee as reported
    pub fee: Option<Value>,
    /// Estimated duration as reported
    pub estimated_duration: Option<Value>,
    /// Chain of the first transaction
    pub chain_id: Option<String>,
    /// Hop path of the first transaction, joined with `" -> "`
    pub path: Option<String>,
    /// Signer of the first transaction
    pub signer_address: Option<String>,
    /// Number of messages in the first transaction
    pub message_count: usize,
}

impl MessagesPreview {
    /// Extract preview fields from a messages response body
    #[must_use]
    pub fn from_body(body: &Value) -> Self {
        let fee = first_present(body, &["fee", "estimated_fees", "estimatedFees"]);
        let estimated_duration = first_present(
            body,
            &[
                "estimatedDuration",
                "estimated_duration",
                "estimated_route_duration_seconds",
            ],
        );

        let first_tx = body
            .get("txs")
            .and_then(Value::as_array)
            .and_then(|txs| txs.first())
            .map(unwrap_tx);

        let Some(tx) = first_tx else {
            let message_count = body
                .get("msgs")
                .and_then(Value::as_array)
                .map_or(0, Vec::len);
            return Self {
                fee,
                estimated_duration,
                message_count,
                ..Self::default()
            };
        };

        let path = tx.get("path").and_then(Value::as_array).map(|hops| {
            hops.iter()
                .map(|hop| hop.as_str().map_or_else(|| hop.to_string(), str::to_string))
                .collect::<Vec<_>>()
                .join(" -> ")
        });

        Self {
            fee,
            estimated_duration,
            chain_id: string_field(tx, "chain_id"),
            path,
            signer_address: string_field(tx, "signer_address"),
            message_count: tx.get("msgs").and_then(Value::as_array).map_or(0, Vec::len),
        }
    }

    /// Preview entries keyed as they appear in the result record
    #[must_use]
    pub fn entries(&self) -> Vec<(&'static str, Value)> {
        let mut entries = Vec::new();
        if let Some(fee) = &self.fee {
            entries.push(("fee", fee.clone()));
        }
        if let Some(duration) = &self.estimated_duration {
            entries.push(("estimatedDuration", duration.clone()));
        }
        if let Some(chain_id) = &self.chain_id {
            entries.push(("chainId", Value::from(chain_id.as_str())));
        }
        if let Some(path) = &self.path {
            entries.push(("path", Value::from(path.as_str())));
        }
        if let Some(signer) = &self.signer_address {
            entries.push(("signerAddress", Value::from(signer.as_str())));
        }
        entries.push(("messageCount", Value::from(self.message_count)));
        entries
    }
}

fn unwrap_tx(tx: &Value) -> &Value {
    ["cosmos_tx", "evm_tx", "svm_tx"]
        .iter()
        .find_map(|key| tx.get(*key).filter(|inner| inner.is_object()))
        .unwrap_or(tx)
}

fn first_present(body: &Value, keys: &[&str]) -> Option<Value> {
    keys.iter()
        .find_map(|key| body.get(*key).filter(|v| !v.is_null()).cloned())
}

fn string_field(value: &Value, key: &str) -> Option<String> {
    value.get(key).and_then(Value::as_str).map(str::to_string)
}

/// Interpreted outcome of one response
#[derive(Debug, Clone, PartialEq)]
pub enum DomainOutcome {
    /// Route lookup
    Route {
        /// Whether a usable route exists
        pass: bool,
        /// Failure message
        error: Option<String>,
    },
    /// Message construction
    Messages(Result<MessagesPreview, String>),
    /// Simulation
    Simulation(Result<(), String>),
    /// Broadcast; `Ok` carries the transaction hash
    Broadcast(Result<String, String>),
}

impl DomainOutcome {
    /// Whether the outcome is a success
    #[must_use]
    pub const fn success(&self) -> bool {
        match self {
            Self::Route { pass, .. } => *pass,
            Self::Messages(r) => r.is_ok(),
            Self::Simulation(r) => r.is_ok(),
            Self::Broadcast(r) => r.is_ok(),
        }
    }

    /// Failure message, if any
    #[must_use]
    pub fn error(&self) -> Option<&str> {
        match self {
            Self::Route { error, .. } => error.as_deref(),
            Self::Messages(Err(e)) | Self::Simulation(Err(e)) | Self::Broadcast(Err(e)) => {
                Some(e.as_str())
            }
            _ => None,
        }
    }
}

/// Interpret a captured response for the given endpoint
#[must_use]
pub fn interpret(kind: EndpointKind, response: &ApiResponseResult) -> DomainOutcome {
    match kind {
        EndpointKind::Route => interpret_route(response),
        EndpointKind::Messages => DomainOutcome::Messages(interpret_messages(response)),
        EndpointKind::Simulation => DomainOutcome::Simulation(interpret_simulation(&response.data)),
        EndpointKind::Broadcast => DomainOutcome::Broadcast(interpret_broadcast(&response.data)),
    }
}

/// Route endpoint: 201 without embedded errors means a route exists.
#[must_use]
pub fn interpret_route(response: &ApiResponseResult) -> DomainOutcome {
    match check_created(response) {
        Ok(()) => DomainOutcome::Route {
            pass: true,
            error: None,
        },
        Err(error) => {
            let no_routes = (response.status == Some(404) || !response.success)
                && is_no_routes_found(&response.data);
            DomainOutcome::Route {
                pass: false,
                error: Some(if no_routes {
                    NO_ROUTES_FOUND.to_string()
                } else {
                    error
                }),
            }
        }
    }
}

/// Messages endpoint: same status handling as routes, then preview fields.
pub fn interpret_messages(response: &ApiResponseResult) -> Result<MessagesPreview, String> {
    check_created(response)?;
    Ok(MessagesPreview::from_body(&response.data))
}

/// Non-201 status, or a 201 whose body mentions an error, is a failure.
fn check_created(response: &ApiResponseResult) -> Result<(), String> {
    if response.status != Some(CREATED) {
        return Err(extract_error_message(
            &response.data,
            response.status,
            response.error.as_deref(),
        ));
    }
    if contains_error_marker(&response.data) {
        return Err(extract_error_message(&response.data, response.status, None));
    }
    Ok(())
}

/// Whether a stringified body mentions `error` or `Error`
#[must_use]
pub fn contains_error_marker(body: &Value) -> bool {
    let text = stringify(body);
    text.contains("error") || text.contains("Error")
}

/// Whether a body is the routing service's "no routes found" answer.
///
/// Accepts the object form and a JSON string holding the object form.
#[must_use]
pub fn is_no_routes_found(body: &Value) -> bool {
    let parsed;
    let object = match body {
        Value::Object(_) => body,
        Value::String(s) => match serde_json::from_str::<Value>(s) {
            Ok(v) => {
                parsed = v;
                &parsed
            }
            Err(_) => return false,
        },
        _ => return false,
    };
    object.get("message").and_then(Value::as_str) == Some(NO_ROUTES_FOUND)
}

/// Best human-readable message for a failed response.
///
/// String bodies are parsed and re-stringified, objects are stringified,
/// and anything else falls back to a status-code message.
#[must_use]
pub fn extract_error_message(body: &Value, status: Option<u16>, fallback: Option<&str>) -> String {
    match body {
        Value::String(s) if !s.trim().is_empty() => serde_json::from_str::<Value>(s)
            .map_or_else(|_| s.clone(), |parsed| parsed.to_string()),
        Value::Object(_) | Value::Array(_) => body.to_string(),
        _ => fallback.map_or_else(
            || match status {
                Some(code) => format!("Request failed with status code {code}"),
                None => "Request failed without a response".to_string(),
            },
            str::to_string,
        ),
    }
}

/// Decode the `result` of an RPC response.
///
/// The result may be a JSON object, a JSON string, a base64 string holding
/// JSON, or sit under `response.result`. ABCI query results are unwrapped
/// to their inner `response` object, which carries `code` and `log`.
#[must_use]
pub fn decode_rpc_result(body: &Value) -> Option<Value> {
    let raw = body
        .get("result")
        .or_else(|| body.get("response").and_then(|r| r.get("result")))?;

    let decoded = match raw {
        Value::String(s) => decode_base64_json(s)
            .or_else(|| serde_json::from_str::<Value>(s).ok())
            .unwrap_or_else(|| raw.clone()),
        other => other.clone(),
    };

    match decoded.get("response") {
        Some(inner @ Value::Object(_)) => Some(inner.clone()),
        _ => Some(decoded),
    }
}

fn rpc_error_message(error: &Value) -> String {
    match error {
        Value::String(s) => s.clone(),
        Value::Object(obj) => obj
            .get("data")
            .and_then(Value::as_str)
            .or_else(|| obj.get("message").and_then(Value::as_str))
            .map_or_else(|| error.to_string(), str::to_string),
        other => other.to_string(),
    }
}

fn error_fragment_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)error[^}]*\}").expect("static regex is valid"))
}

/// Pull a failure message out of a simulation result
fn simulation_error_message(result: &Map<String, Value>, text: &str) -> String {
    for key in ["raw_log", "log", "message"] {
        if let Some(msg) = result.get(key).and_then(Value::as_str) {
            if !msg.is_empty() {
                return msg.to_string();
            }
        }
    }
    error_fragment_regex()
        .find(text)
        .map_or_else(|| "Simulation failed".to_string(), |m| m.as_str().to_string())
}

/// Simulation RPC: top-level error, non-zero code or an error/fail mention
/// in the decoded result are failures.
pub fn interpret_simulation(body: &Value) -> Result<(), String> {
    if let Some(error) = body.get("error").filter(|e| !e.is_null()) {
        return Err(rpc_error_message(error));
    }

    let Some(result) = decode_rpc_result(body) else {
        return Err("Simulation response has no result".to_string());
    };
    let text = stringify(&result);
    let empty = Map::new();
    let fields = result.as_object().unwrap_or(&empty);

    if let Some(code) = fields.get("code").and_then(Value::as_i64) {
        if code != 0 {
            for key in ["raw_log", "message", "log"] {
                if let Some(msg) = fields.get(key).and_then(Value::as_str) {
                    if !msg.is_empty() {
                        return Err(msg.to_string());
                    }
                }
            }
            return Err(format!("Simulation failed with code {code}"));
        }
    }

    let lowered = text.to_lowercase();
    if lowered.contains("error") || lowered.contains("fail") {
        return Err(simulation_error_message(fields, &text));
    }
    Ok(())
}

/// Broadcast RPC: success iff `result.code` is exactly 0.
pub fn interpret_broadcast(body: &Value) -> Result<String, String> {
    let Some(result) = body.get("result").filter(|r| !r.is_null()) else {
        return Err(body
            .get("error")
            .filter(|e| !e.is_null())
            .map_or_else(
                || "Broadcast response has no result".to_string(),
                rpc_error_message,
            ));
    };

    if result.get("code").and_then(Value::as_u64) == Some(0) {
        return Ok(result
            .get("hash")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string());
    }

    Err(result
        .get("log")
        .and_then(Value::as_str)
        .filter(|log| !log.is_empty())
        .unwrap_or("Unknown error")
        .to_string())
}

fn stringify(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::network::{CapturedEvent, HttpMethod};
    use base64::Engine;
    use serde_json::json;

    fn captured(status: u16, body: &Value) -> ApiResponseResult {
        let event = CapturedEvent::response("https://api/v2/fungible/route", HttpMethod::Post, status)
            .with_json(body);
        ApiResponseResult::from_event(&event)
    }

    fn captured_text(status: u16, body: &str) -> ApiResponseResult {
        let event = CapturedEvent::response("https://api/v2/fungible/route", HttpMethod::Post, status)
            .with_body(body);
        ApiResponseResult::from_event(&event)
    }

    mod route_tests {
        use super::*;

        #[test]
        fn test_created_is_pass() {
            let outcome = interpret_route(&captured(201, &json!({"amount_out": "100"})));
            assert_eq!(outcome, DomainOutcome::Route { pass: true, error: None });
        }

        #[test]
        fn test_no_routes_object() {
            let outcome =
                interpret_route(&captured(404, &json!({"code": 5, "message": "no routes found"})));
            assert_eq!(outcome.error(), Some(NO_ROUTES_FOUND));
            assert!(!outcome.success());
        }

        #[test]
        fn test_no_routes_string_body() {
            let inner = json!({"code": 5, "message": "no routes found"}).to_string();
            let response = ApiResponseResult {
                data: Value::String(inner),
                ..captured(404, &json!(null))
            };
            assert_eq!(interpret_route(&response).error(), Some(NO_ROUTES_FOUND));
        }

        #[test]
        fn test_no_routes_requires_404_or_unsuccessful() {
            // 201 with the message is still a failure, but not normalized
            let outcome = interpret_route(&captured(201, &json!({"message": "no routes found", "error": true})));
            assert!(!outcome.success());
            assert_ne!(outcome.error(), Some(NO_ROUTES_FOUND));
        }

        #[test]
        fn test_other_status_stringifies_body() {
            let outcome = interpret_route(&captured(400, &json!({"message": "bad amount"})));
            assert_eq!(outcome.error(), Some(r#"{"message":"bad amount"}"#));
        }

        #[test]
        fn test_plain_text_body() {
            let outcome = interpret_route(&captured_text(502, "Bad Gateway"));
            assert_eq!(outcome.error(), Some("Bad Gateway"));
        }

        #[test]
        fn test_empty_body_uses_status_message() {
            let outcome = interpret_route(&captured_text(500, ""));
            assert_eq!(outcome.error(), Some("Request failed with status code 500"));
        }

        #[test]
        fn test_created_with_embedded_error() {
            let outcome = interpret_route(&captured(201, &json!({"Error": "route expired"})));
            assert!(!outcome.success());
            assert!(outcome.error().unwrap().contains("route expired"));
        }

        #[test]
        fn test_timeout_result() {
            let response = ApiResponseResult::failure("Timed out waiting for response", true);
            let outcome = interpret_route(&response);
            assert_eq!(outcome.error(), Some("Timed out waiting for response"));
        }
    }

    mod messages_tests {
        use super::*;

        fn msgs_body() -> Value {
            json!({
                "msgs": [{"multi_chain_msg": {}}],
                "txs": [{
                    "cosmos_tx": {
                        "chain_id": "osmosis-1",
                        "path": ["osmosis-1", "cosmoshub-4"],
                        "signer_address": "osmo1signer",
                        "msgs": [{"a": 1}, {"b": 2}]
                    }
                }],
                "estimated_fees": [{"amount": "2500", "denom": "uosmo"}],
                "estimated_route_duration_seconds": 30
            })
        }

        #[test]
        fn test_preview_fields() {
            let preview = interpret_messages(&captured(201, &msgs_body())).unwrap();
            assert_eq!(preview.chain_id.as_deref(), Some("osmosis-1"));
            assert_eq!(preview.path.as_deref(), Some("osmosis-1 -> cosmoshub-4"));
            assert_eq!(preview.signer_address.as_deref(), Some("osmo1signer"));
            assert_eq!(preview.message_count, 2);
            assert_eq!(preview.estimated_duration, Some(json!(30)));
            assert_eq!(
                preview.fee,
                Some(json!([{"amount": "2500", "denom": "uosmo"}]))
            );
        }

        #[test]
        fn test_flat_tx_entry() {
            let body = json!({
                "fee": "0.01",
                "estimatedDuration": "1m",
                "txs": [{"chain_id": "noble-1", "path": ["noble-1"], "signer_address": "noble1x", "msgs": []}]
            });
            let preview = MessagesPreview::from_body(&body);
            assert_eq!(preview.chain_id.as_deref(), Some("noble-1"));
            assert_eq!(preview.fee, Some(json!("0.01")));
            assert_eq!(preview.message_count, 0);
        }

        #[test]
        fn test_no_routes_not_normalized() {
            let err = interpret_messages(&captured(404, &json!({"message": "no routes found"})))
                .unwrap_err();
            assert_eq!(err, r#"{"message":"no routes found"}"#);
        }

        #[test]
        fn test_created_with_embedded_error() {
            let body = json!({"txs": [], "error": "Insufficient balance for gas"});
            let err = interpret_messages(&captured(201, &body)).unwrap_err();
            assert!(err.contains("Insufficient balance for gas"));
        }

        #[test]
        fn test_entries() {
            let preview = MessagesPreview::from_body(&msgs_body());
            let keys: Vec<_> = preview.entries().into_iter().map(|(k, _)| k).collect();
            assert_eq!(
                keys,
                vec!["fee", "estimatedDuration", "chainId", "path", "signerAddress", "messageCount"]
            );
        }
    }

    mod simulation_tests {
        use super::*;

        fn b64(value: &Value) -> String {
            base64::engine::general_purpose::STANDARD.encode(value.to_string())
        }

        #[test]
        fn test_clean_result() {
            let body = json!({"jsonrpc": "2.0", "id": 1, "result": {"gas_info": {"gas_used": "1000"}}});
            assert!(interpret_simulation(&body).is_ok());
        }

        #[test]
        fn test_top_level_error() {
            let body = json!({"id": 1, "error": {"code": -32603, "message": "Internal error", "data": "tx parse error"}});
            assert_eq!(interpret_simulation(&body).unwrap_err(), "tx parse error");
        }

        #[test]
        fn test_nonzero_code_uses_raw_log() {
            let body = json!({"result": {"code": 5, "raw_log": "insufficient funds"}});
            assert_eq!(interpret_simulation(&body).unwrap_err(), "insufficient funds");
        }

        #[test]
        fn test_nonzero_code_fallback() {
            let body = json!({"result": {"code": 11}});
            assert_eq!(
                interpret_simulation(&body).unwrap_err(),
                "Simulation failed with code 11"
            );
        }

        #[test]
        fn test_base64_result() {
            let body = json!({"result": b64(&json!({"code": 13, "raw_log": "out of gas"}))});
            assert_eq!(interpret_simulation(&body).unwrap_err(), "out of gas");
        }

        #[test]
        fn test_abci_response_unwrapped() {
            let body = json!({"result": {"response": {"code": 0, "log": "", "value": "AAAA"}}});
            assert!(interpret_simulation(&body).is_ok());
            let failing = json!({"result": {"response": {"code": 4, "log": "signature verification failed"}}});
            assert_eq!(
                interpret_simulation(&failing).unwrap_err(),
                "signature verification failed"
            );
        }

        #[test]
        fn test_nested_response_result() {
            let body = json!({"response": {"result": {"code": 0, "log": "execution fail: bad denom"}}});
            assert_eq!(
                interpret_simulation(&body).unwrap_err(),
                "execution fail: bad denom"
            );
        }

        #[test]
        fn test_error_fragment_regex() {
            let body = json!({"result": {"events": [{"detail": {"error": "slippage"}}]}});
            let err = interpret_simulation(&body).unwrap_err();
            assert!(err.starts_with("error"));
            assert!(err.contains("slippage"));
        }

        #[test]
        fn test_missing_result() {
            assert!(interpret_simulation(&json!({"id": 1})).is_err());
        }
    }

    mod broadcast_tests {
        use super::*;

        #[test]
        fn test_success_hash() {
            let body = json!({"result": {"code": 0, "hash": "ABC123", "log": "[]"}});
            assert_eq!(interpret_broadcast(&body).unwrap(), "ABC123");
        }

        #[test]
        fn test_nonzero_code_log() {
            let body = json!({"result": {"code": 19, "hash": "DEF", "log": "tx already in mempool"}});
            assert_eq!(interpret_broadcast(&body).unwrap_err(), "tx already in mempool");
        }

        #[test]
        fn test_nonzero_code_without_log() {
            let body = json!({"result": {"code": 2}});
            assert_eq!(interpret_broadcast(&body).unwrap_err(), "Unknown error");
        }

        #[test]
        fn test_string_code_is_not_zero() {
            let body = json!({"result": {"code": "0", "hash": "X"}});
            assert!(interpret_broadcast(&body).is_err());
        }

        #[test]
        fn test_missing_result() {
            assert_eq!(
                interpret_broadcast(&json!({"id": 3})).unwrap_err(),
                "Broadcast response has no result"
            );
        }
    }

    #[test]
    fn test_interpret_dispatch() {
        let response = captured(201, &json!({"ok": true}));
        assert!(interpret(EndpointKind::Route, &response).success());
        assert!(interpret(EndpointKind::Messages, &response).success());
        assert_eq!(EndpointKind::Broadcast.record_name(), "broadcast");
    }
}
