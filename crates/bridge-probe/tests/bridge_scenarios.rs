//! End-to-end pipeline scenarios against a scripted page.

#![allow(clippy::unwrap_used)]

use bridge_probe::har;
use bridge_probe::mock::{Exchange, ScriptedPage};
use bridge_probe::prelude::*;
use serde_json::{json, Value};
use std::path::Path;

const ROUTE_URL: &str = "https://api.skip.build/v2/fungible/route";
const MSGS_URL: &str = "https://api.skip.build/v2/fungible/msgs";
const RPC_URL: &str = "https://rpc.osmosis.zone/";
const SIMULATE: &str = "/cosmos.tx.v1beta1.Service/Simulate";

fn config(dir: &Path) -> HarnessConfig {
    HarnessConfig::default()
        .with_task_id("scenario")
        .with_output_dirs(dir.join("results"), dir.join("screenshots"))
        .with_timeouts(TimeoutConfig {
            route_ms: 80,
            messages_ms: 80,
            simulation_ms: 80,
            broadcast_ms: 80,
            ui_ms: 80,
            wallet_ms: 80,
        })
}

fn request() -> BridgeRequest {
    BridgeRequest::new("1.5", "osmosis-1", "uosmo", "cosmoshub-4", "uatom", "fastest")
        .with_target_address("cosmos1recipient")
}

fn route_ok() -> Exchange {
    Exchange::rest_json(
        ROUTE_URL,
        201,
        &json!({"amount_in": "1500000", "amount_out": "1499000", "operations": []}),
    )
}

fn msgs_ok() -> Exchange {
    Exchange::rest_json(
        MSGS_URL,
        201,
        &json!({
            "txs": [{
                "cosmos_tx": {
                    "chain_id": "osmosis-1",
                    "path": ["osmosis-1", "cosmoshub-4"],
                    "signer_address": "osmo1sender",
                    "msgs": [{"msg_type_url": "/ibc.applications.transfer.v1.MsgTransfer"}]
                }
            }],
            "estimated_fees": [],
            "estimated_route_duration_seconds": 25
        }),
    )
}

fn simulation(outcome: &Value) -> Exchange {
    Exchange::rpc(
        RPC_URL,
        11,
        "abci_query",
        &json!({"path": SIMULATE, "data": "0a02", "prove": false}),
        outcome,
    )
}

fn broadcast(outcome: &Value) -> Exchange {
    Exchange::rpc(RPC_URL, 12, "broadcast_tx_sync", &json!({"tx": "CpIBCo8B"}), outcome)
}

fn simulation_ok() -> Exchange {
    simulation(&json!({"result": {"response": {"code": 0, "log": "", "value": "CgQ="}}}))
}

/// Wallet connects, route and messages succeed.
fn through_submit(recorder: TrafficRecorder) -> ScriptedPage {
    ScriptedPage::new(recorder)
        .with_wallet()
        .exchange_on_fill(Capability::AmountInput, route_ok())
        .exchange_on_click(Capability::SubmitButton, msgs_ok())
}

/// As `through_submit`, with a clean simulation as well.
fn through_simulation(recorder: TrafficRecorder) -> ScriptedPage {
    through_submit(recorder).exchange_on_click(Capability::SubmitButton, simulation_ok())
}

async fn run(
    page_for: impl FnOnce(TrafficRecorder) -> ScriptedPage,
    dir: &Path,
) -> (BridgeOperationResult, ScriptedPage, MonitorRegistry) {
    let registry = MonitorRegistry::new(config(dir).registry_config());
    let page = page_for(registry.recorder());
    let mut pipeline = BridgePipeline::new(config(dir), registry, page);
    let result = pipeline.perform_bridge_operation(request()).await;
    let (page, registry) = pipeline.into_parts();
    (result, page, registry)
}

#[tokio::test]
async fn scenario_a_no_routes_found() {
    let dir = tempfile::tempdir().unwrap();
    let (result, page, registry) = run(
        |recorder| {
            ScriptedPage::new(recorder).with_wallet().exchange_on_fill(
                Capability::AmountInput,
                Exchange::rest_json(ROUTE_URL, 404, &json!({"code": 5, "message": "no routes found"})),
            )
        },
        dir.path(),
    )
    .await;

    assert_eq!(result.error.as_deref(), Some("no routes found"));
    assert_eq!(result.test_progress, TestProgress::RouteTested);
    assert_eq!(result.route_pass, Some(false));
    assert!(!result.success);
    assert_eq!(result.api_responses["route"].status, 404);
    assert!(!page.was_called("click:submit-button"));
    assert!(registry.is_empty());
}

#[tokio::test]
async fn scenario_b_route_created() {
    let dir = tempfile::tempdir().unwrap();
    let (result, _page, _registry) = run(
        |recorder| {
            ScriptedPage::new(recorder)
                .with_wallet()
                .exchange_on_fill(Capability::AmountInput, route_ok())
        },
        dir.path(),
    )
    .await;

    assert_eq!(result.route_pass, Some(true));
    assert_eq!(result.test_progress, TestProgress::RouteTested);
    assert!(result.api_responses["route"].success);
    // Nothing answers the submit click in this script.
    assert!(!result.success);
    assert_eq!(result.error.as_deref(), Some("Timed out waiting for response"));
}

#[tokio::test]
async fn scenario_c_silent_route_timeout_falls_back_to_ui() {
    let dir = tempfile::tempdir().unwrap();
    let (result, page, _registry) = run(
        |recorder| ScriptedPage::new(recorder).with_wallet(),
        dir.path(),
    )
    .await;

    assert_eq!(result.route_pass, Some(true));
    assert_eq!(result.test_progress, TestProgress::RouteTested);
    assert!(!result.api_responses.contains_key("route"));
    assert!(page.was_called("text_of:route-error"));
    assert!(page.was_called("is_enabled:submit-button"));
}

#[tokio::test]
async fn scenario_d_broadcast_success() {
    let dir = tempfile::tempdir().unwrap();
    let (result, page, registry) = run(
        |recorder| {
            through_simulation(recorder)
                .exchange_on_click(
                    Capability::SignApprove,
                    broadcast(&json!({"result": {"code": 0, "hash": "ABC123", "log": "[]"}})),
                )
        },
        dir.path(),
    )
    .await;

    assert_eq!(result.transaction_hash.as_deref(), Some("ABC123"));
    assert!(result.success, "unexpected error: {:?}", result.error);
    assert!(result.error.is_none());
    assert_eq!(result.test_progress, TestProgress::SignTested);
    assert_eq!(result.route_pass, Some(true));

    let names: Vec<_> = result.api_responses.keys().map(String::as_str).collect();
    assert_eq!(names, vec!["broadcast", "messages", "route", "simulation"]);
    assert_eq!(result.preview["path"], json!("osmosis-1 -> cosmoshub-4"));
    assert_eq!(result.preview["messageCount"], json!(1));
    assert_eq!(result.preview["signerAddress"], json!("osmo1sender"));

    assert!(result.timing.duration.is_some());
    assert!(result.screenshots.iter().any(|s| s.ends_with("broadcast-scenario.png")));
    assert!(page.was_called("fill:target-address=cosmos1recipient"));
    assert!(registry.is_empty());

    let writer = ResultWriter::new("scenario", dir.path().join("results"), dir.path());
    let path = writer.write_result(&result).unwrap();
    let text = std::fs::read_to_string(path).unwrap();
    let parsed: BridgeOperationResult = serde_json::from_str(&text).unwrap();
    assert_eq!(parsed, result);
    let raw: Value = serde_json::from_str(&text).unwrap();
    assert_eq!(raw["testProgress"], json!("SignTested"));
    assert_eq!(raw["transactionHash"], json!("ABC123"));

    let har = har::export(&registry.recorder().events());
    assert_eq!(har.log.entries.len(), 4);
    assert!(har.log.entries.iter().all(|e| e.response.status != 0));
}

#[tokio::test]
async fn scenario_e_simulation_failure_halts_at_sign() {
    let dir = tempfile::tempdir().unwrap();
    let (result, page, _registry) = run(
        |recorder| {
            through_submit(recorder).exchange_on_click(
                Capability::SubmitButton,
                simulation(&json!({"result": {"code": 5, "raw_log": "insufficient funds", "codespace": "sdk"}})),
            )
        },
        dir.path(),
    )
    .await;

    assert_eq!(result.test_progress, TestProgress::SignTested);
    assert!(result.error.as_deref().unwrap().contains("insufficient funds"));
    assert!(!result.success);
    assert!(!result.api_responses["simulation"].success);
    assert!(!page.was_called("click:sign-approve"));
    assert!(result.transaction_hash.is_none());
}

#[tokio::test]
async fn scenario_f_collaborator_error_is_captured() {
    let dir = tempfile::tempdir().unwrap();
    let (result, page, registry) = run(
        |recorder| {
            through_simulation(recorder)
                .failing(Capability::SignApprove, "Target page, context or browser has been closed")
        },
        dir.path(),
    )
    .await;

    assert!(result
        .error
        .as_deref()
        .unwrap()
        .contains("Target page, context or browser has been closed"));
    assert!(!result.success);
    assert!(result.is_finalized());
    assert!(page.was_called("screenshot:error"));
    assert!(result.screenshots.iter().any(|s| s.ends_with("error-scenario.png")));
    assert!(registry.is_empty());
}

#[tokio::test]
async fn broadcast_rejection_keeps_log() {
    let dir = tempfile::tempdir().unwrap();
    let (result, _page, _registry) = run(
        |recorder| {
            through_simulation(recorder).exchange_on_click(
                Capability::SignApprove,
                broadcast(&json!({"result": {"code": 19, "hash": "DUP", "log": "tx already exists in cache"}})),
            )
        },
        dir.path(),
    )
    .await;

    assert_eq!(result.error.as_deref(), Some("tx already exists in cache"));
    assert!(result.transaction_hash.is_none());
    assert_eq!(result.test_progress, TestProgress::SignTested);
    assert!(!result.success);
}

#[tokio::test]
async fn missing_simulation_halts_before_signing() {
    let dir = tempfile::tempdir().unwrap();
    let (result, page, registry) = run(
        |recorder| {
            through_submit(recorder).exchange_on_click(
                Capability::SignApprove,
                broadcast(&json!({"result": {"code": 0, "hash": "H", "log": "[]"}})),
            )
        },
        dir.path(),
    )
    .await;

    assert!(!result.success);
    assert_eq!(result.error.as_deref(), Some("Timed out waiting for response"));
    assert_eq!(result.test_progress, TestProgress::SignTested);
    assert!(!result.api_responses.contains_key("simulation"));
    assert!(result.transaction_hash.is_none());
    assert!(!page.was_called("click:sign-approve"));
    assert!(page.was_called("screenshot:simulation-failed"));
    assert!(registry.is_empty());
}

#[tokio::test]
async fn traffic_before_registration_is_not_matched() {
    let registry_dir = tempfile::tempdir().unwrap();
    // Route traffic arrives while the source chain is chosen, before the
    // route monitor exists; the pipeline must not count it.
    let (result, _page, _registry) = run(
        |recorder| {
            ScriptedPage::new(recorder)
                .with_wallet()
                .exchange_on_fill(
                    Capability::SourceChain,
                    Exchange::rest_json(ROUTE_URL, 404, &json!({"message": "no routes found"})),
                )
                .with_enabled(Capability::SubmitButton, true)
        },
        registry_dir.path(),
    )
    .await;

    assert_eq!(result.route_pass, Some(true));
    assert_eq!(result.preview.get("routeSource"), Some(&json!("ui")));
}
