//! Bridge operation pipeline.
//!
//! Drives one transfer through a fixed sequence of stages:
//!
//! ```text
//! Init → WalletConnected → BridgeConfigured → RouteValidated → RouteSubmitted
//!      → SimulationValidated → TransactionSigned → Broadcast → Terminal
//! ```
//!
//! Each stage registers the monitors it needs before performing the UI
//! action that triggers the traffic. A failed gate records its error and
//! skips straight to finalization; errors raised by the page are caught
//! here, screenshotted and recorded the same way. The caller always gets a
//! finalized [`BridgeOperationResult`].

use crate::config::HarnessConfig;
use crate::interpret::{
    interpret_broadcast, interpret_messages, interpret_route, interpret_simulation,
    DomainOutcome, EndpointKind,
};
use crate::matcher::MatchRule;
use crate::monitor::{ApiResponseResult, MonitorId, MonitorOptions, MonitorRegistry};
use crate::operation::{BridgeOperationResult, BridgeRequest, ResponseRecord, TestProgress};
use crate::page::{BridgePage, Capability};
use crate::reporter::ResultWriter;
use crate::result::ProbeResult;
use chrono::Utc;
use std::fmt;

/// Pipeline stages in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Stage {
    /// Page opened
    Init,
    /// Wallet connected
    WalletConnected,
    /// Chains, tokens and amount entered
    BridgeConfigured,
    /// Route checked
    RouteValidated,
    /// Transfer submitted and messages built
    RouteSubmitted,
    /// Simulation checked
    SimulationValidated,
    /// Signature approved in the wallet
    TransactionSigned,
    /// Broadcast result received
    Broadcast,
    /// Finalized
    Terminal,
}

impl Stage {
    /// Stage after this one
    #[must_use]
    pub const fn next(self) -> Self {
        match self {
            Self::Init => Self::WalletConnected,
            Self::WalletConnected => Self::BridgeConfigured,
            Self::BridgeConfigured => Self::RouteValidated,
            Self::RouteValidated => Self::RouteSubmitted,
            Self::RouteSubmitted => Self::SimulationValidated,
            Self::SimulationValidated => Self::TransactionSigned,
            Self::TransactionSigned => Self::Broadcast,
            Self::Broadcast | Self::Terminal => Self::Terminal,
        }
    }

    /// Name used in logs
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Init => "init",
            Self::WalletConnected => "wallet-connected",
            Self::BridgeConfigured => "bridge-configured",
            Self::RouteValidated => "route-validated",
            Self::RouteSubmitted => "route-submitted",
            Self::SimulationValidated => "simulation-validated",
            Self::TransactionSigned => "transaction-signed",
            Self::Broadcast => "broadcast",
            Self::Terminal => "terminal",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Whether a stage let the run continue
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    Continue,
    Halt,
}

/// Monitors registered ahead of the stage that waits on them
#[derive(Debug, Default)]
struct Armed {
    route: Option<MonitorId>,
    messages: Option<MonitorId>,
    simulation: Option<MonitorId>,
    broadcast: Option<MonitorId>,
}

/// State of one run
struct Run {
    result: BridgeOperationResult,
    armed: Armed,
    explicit_success: Option<bool>,
    reached: Stage,
}

impl Run {
    fn new(task_id: String, request: BridgeRequest) -> Self {
        Self {
            result: BridgeOperationResult::new(task_id, request),
            armed: Armed::default(),
            explicit_success: None,
            reached: Stage::Init,
        }
    }
}

/// Drives bridge operations on one page.
///
/// The registry must be the one whose recorder the page feeds.
pub struct BridgePipeline<P> {
    page: P,
    registry: MonitorRegistry,
    config: HarnessConfig,
    writer: ResultWriter,
}

impl<P: fmt::Debug> fmt::Debug for BridgePipeline<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BridgePipeline")
            .field("page", &self.page)
            .field("task_id", &self.config.task_id)
            .field("monitors", &self.registry.len())
            .finish_non_exhaustive()
    }
}

impl<P: BridgePage> BridgePipeline<P> {
    /// Create a pipeline
    #[must_use]
    pub fn new(config: HarnessConfig, registry: MonitorRegistry, page: P) -> Self {
        let writer = ResultWriter::from_config(&config);
        Self {
            page,
            registry,
            config,
            writer,
        }
    }

    /// The page
    #[must_use]
    pub const fn page(&self) -> &P {
        &self.page
    }

    /// The registry
    #[must_use]
    pub const fn registry(&self) -> &MonitorRegistry {
        &self.registry
    }

    /// The configuration
    #[must_use]
    pub const fn config(&self) -> &HarnessConfig {
        &self.config
    }

    /// Take the page and registry back
    #[must_use]
    pub fn into_parts(self) -> (P, MonitorRegistry) {
        (self.page, self.registry)
    }

    /// Run one bridge operation to completion.
    ///
    /// Never fails: every error ends up in the returned result.
    pub async fn perform_bridge_operation(
        &mut self,
        request: BridgeRequest,
    ) -> BridgeOperationResult {
        let mut run = Run::new(self.config.task_id.clone(), request);
        tracing::info!(
            task_id = %self.config.task_id,
            amount = %run.result.request.amount,
            from = %run.result.request.from_chain,
            to = %run.result.request.to_chain,
            "bridge operation started"
        );

        let mut stage = Stage::Init;
        while stage != Stage::Terminal {
            tracing::debug!(stage = %stage, "entering stage");
            match self.run_stage(stage, &mut run).await {
                Ok(Flow::Continue) => {
                    run.reached = stage;
                    stage = stage.next();
                }
                Ok(Flow::Halt) => {
                    tracing::warn!(
                        stage = %stage,
                        error = run.result.error.as_deref().unwrap_or_default(),
                        "stage failed"
                    );
                    break;
                }
                Err(e) => {
                    tracing::error!(stage = %stage, error = %e, "stage raised an error");
                    run.result.fail(e.to_string());
                    self.capture(&mut run, "error").await;
                    break;
                }
            }
        }

        self.registry.cancel_all();
        let _ = run
            .result
            .finalize(run.explicit_success, Utc::now());
        tracing::info!(
            reached = %run.reached,
            success = run.result.success,
            progress = %run.result.test_progress,
            duration_ms = run.result.timing.duration.unwrap_or_default(),
            "bridge operation finished"
        );
        run.result
    }

    async fn run_stage(&mut self, stage: Stage, run: &mut Run) -> ProbeResult<Flow> {
        match stage {
            Stage::Init => self.open_app().await,
            Stage::WalletConnected => self.connect_wallet(run).await,
            Stage::BridgeConfigured => self.configure_bridge(run).await,
            Stage::RouteValidated => self.validate_route(run).await,
            Stage::RouteSubmitted => self.submit_route(run).await,
            Stage::SimulationValidated => self.validate_simulation(run).await,
            Stage::TransactionSigned => self.sign_transaction(run).await,
            Stage::Broadcast => self.await_broadcast(run).await,
            Stage::Terminal => Ok(Flow::Halt),
        }
    }

    async fn open_app(&mut self) -> ProbeResult<Flow> {
        let url = self.config.base_url.clone();
        self.page.navigate(&url).await?;
        self.page.wait_for_load(self.config.timeouts.ui_ms).await?;
        Ok(Flow::Continue)
    }

    async fn connect_wallet(&mut self, run: &mut Run) -> ProbeResult<Flow> {
        let timeouts = self.config.timeouts;
        if !self
            .page
            .is_visible(Capability::WalletConnected, timeouts.ui_ms.min(1_000))
            .await?
        {
            if self.page.click(Capability::ConnectWallet).await? {
                // Not every app shows a chooser or an approval prompt.
                let _ = self.page.click(Capability::WalletOption).await?;
                let _ = self.page.click(Capability::WalletConnectApprove).await?;
            }
            if !self
                .page
                .is_visible(Capability::WalletConnected, timeouts.wallet_ms)
                .await?
            {
                run.result.fail("Wallet not connected");
                self.capture(run, "wallet-not-connected").await;
                return Ok(Flow::Halt);
            }
        }
        tracing::info!(stage = %Stage::WalletConnected, "wallet connected");
        Ok(Flow::Continue)
    }

    async fn configure_bridge(&mut self, run: &mut Run) -> ProbeResult<Flow> {
        let request = run.result.request.clone();
        let selections = [
            (Capability::SourceChain, request.from_chain.as_str(), "source chain"),
            (Capability::SourceToken, request.from_token.as_str(), "source token"),
            (Capability::DestinationChain, request.to_chain.as_str(), "destination chain"),
            (Capability::DestinationToken, request.to_token.as_str(), "destination token"),
        ];
        for (capability, value, label) in selections {
            if !self.page.fill_input(capability, value).await? {
                run.result.fail(format!("Failed to select {label}: {value}"));
                return Ok(Flow::Halt);
            }
        }
        if !request.route_type.is_empty()
            && !self
                .page
                .fill_input(Capability::RouteType, &request.route_type)
                .await?
        {
            tracing::debug!(route_type = %request.route_type, "route type not selectable, using app default");
        }

        // The amount triggers the route request.
        let route_rule = MatchRule::path(self.config.endpoints.route_path.clone());
        let options = MonitorOptions::new()
            .partial()
            .silent_timeout()
            .with_timeout(self.config.timeouts.route_ms);
        run.armed.route = Some(self.registry.register(route_rule, options));

        if !self
            .page
            .fill_input(Capability::AmountInput, &request.amount)
            .await?
        {
            run.result.fail(format!("Failed to enter amount: {}", request.amount));
            return Ok(Flow::Halt);
        }

        if let Some(address) = request.target_address.as_deref() {
            if !self.page.fill_input(Capability::TargetAddress, address).await? {
                run.result.fail(format!("Failed to enter target address: {address}"));
                return Ok(Flow::Halt);
            }
        }
        tracing::info!(stage = %Stage::BridgeConfigured, "bridge configured");
        Ok(Flow::Continue)
    }

    async fn validate_route(&mut self, run: &mut Run) -> ProbeResult<Flow> {
        let Some(id) = run.armed.route.take() else {
            run.result.fail("Route monitor was not registered");
            return Ok(Flow::Halt);
        };
        let response = self
            .registry
            .wait(&id, self.config.timeouts.route())
            .await;

        if response.timed_out {
            return self.validate_route_from_ui(run).await;
        }
        if !response.captured() {
            run.result.fail(
                response
                    .error
                    .unwrap_or_else(|| "No route response".to_string()),
            );
            return Ok(Flow::Halt);
        }

        let outcome = interpret_route(&response);
        self.record(run, EndpointKind::Route, &self.config.endpoints.route_path, &response, &outcome);
        run.result.advance(TestProgress::RouteTested);

        let DomainOutcome::Route { pass, error } = outcome else {
            run.result.fail("Route response could not be interpreted");
            return Ok(Flow::Halt);
        };
        run.result.route_pass = Some(pass);
        tracing::info!(
            stage = %Stage::RouteValidated,
            status = response.status.unwrap_or_default(),
            pass,
            "route response"
        );
        if !pass {
            run.result
                .fail(error.unwrap_or_else(|| "Route validation failed".to_string()));
            self.capture(run, "route-failed").await;
            return Ok(Flow::Halt);
        }
        self.capture(run, "route-validated").await;
        Ok(Flow::Continue)
    }

    /// No route response: the app may have served the route from cache, so
    /// judge by what the UI shows.
    async fn validate_route_from_ui(&mut self, run: &mut Run) -> ProbeResult<Flow> {
        tracing::info!(
            stage = %Stage::RouteValidated,
            "no route response captured, inspecting UI"
        );
        run.result.set_preview("routeSource", "ui");

        let banner = self
            .page
            .text_of(Capability::RouteError)
            .await?
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty());
        if let Some(text) = banner {
            run.result.advance(TestProgress::RouteTested);
            run.result.route_pass = Some(false);
            run.result.fail(text);
            self.capture(run, "route-failed").await;
            return Ok(Flow::Halt);
        }

        if self.page.is_enabled(Capability::SubmitButton).await? {
            run.result.advance(TestProgress::RouteTested);
            run.result.route_pass = Some(true);
            self.capture(run, "route-validated").await;
            return Ok(Flow::Continue);
        }

        run.result.route_pass = Some(false);
        run.result
            .fail("Route validation failed: no route response and submit button disabled");
        self.capture(run, "route-failed").await;
        Ok(Flow::Halt)
    }

    async fn submit_route(&mut self, run: &mut Run) -> ProbeResult<Flow> {
        let endpoints = self.config.endpoints.clone();
        let timeouts = self.config.timeouts;

        // Submitting builds the messages and makes the wallet simulate.
        run.armed.messages = Some(self.registry.register(
            MatchRule::path(endpoints.messages_path.clone()),
            MonitorOptions::new()
                .partial()
                .with_timeout(timeouts.messages_ms),
        ));
        run.armed.simulation = Some(self.registry.register(
            MatchRule::rpc(endpoints.simulation_method.clone())
                .with_param_path(endpoints.simulation_param_path.clone()),
            MonitorOptions::new().with_timeout(timeouts.simulation_ms),
        ));

        if !self.page.click(Capability::SubmitButton).await? {
            run.result.fail("Failed to click submit button");
            self.capture(run, "submit-failed").await;
            return Ok(Flow::Halt);
        }

        let Some(id) = run.armed.messages.take() else {
            run.result.fail("Messages monitor was not registered");
            return Ok(Flow::Halt);
        };
        let response = self.registry.wait(&id, timeouts.messages()).await;
        if !response.captured() {
            run.result.fail(
                response
                    .error
                    .unwrap_or_else(|| "No messages response".to_string()),
            );
            return Ok(Flow::Halt);
        }

        let preview = interpret_messages(&response);
        let outcome = DomainOutcome::Messages(preview.clone());
        self.record(run, EndpointKind::Messages, &endpoints.messages_path, &response, &outcome);
        match preview {
            Ok(preview) => {
                for (key, value) in preview.entries() {
                    run.result.set_preview(key, value);
                }
                tracing::info!(
                    stage = %Stage::RouteSubmitted,
                    chain_id = preview.chain_id.as_deref().unwrap_or_default(),
                    messages = preview.message_count,
                    "messages built"
                );
                Ok(Flow::Continue)
            }
            Err(error) => {
                run.result.fail(error);
                self.capture(run, "messages-failed").await;
                Ok(Flow::Halt)
            }
        }
    }

    async fn validate_simulation(&mut self, run: &mut Run) -> ProbeResult<Flow> {
        run.result.advance(TestProgress::SignTested);
        let Some(id) = run.armed.simulation.take() else {
            run.result.fail("Simulation monitor was not registered");
            return Ok(Flow::Halt);
        };
        let response = self
            .registry
            .wait(&id, self.config.timeouts.simulation())
            .await;

        if !response.captured() {
            run.result.fail(
                response
                    .error
                    .unwrap_or_else(|| "No simulation response".to_string()),
            );
            self.capture(run, "simulation-failed").await;
            return Ok(Flow::Halt);
        }

        let verdict = interpret_simulation(&response.data);
        let outcome = DomainOutcome::Simulation(verdict.clone());
        let endpoint = self.config.endpoints.simulation_param_path.clone();
        self.record(run, EndpointKind::Simulation, &endpoint, &response, &outcome);
        match verdict {
            Ok(()) => Ok(Flow::Continue),
            Err(error) => {
                run.result.fail(error);
                self.capture(run, "simulation-failed").await;
                Ok(Flow::Halt)
            }
        }
    }

    async fn sign_transaction(&mut self, run: &mut Run) -> ProbeResult<Flow> {
        // Approving in the wallet triggers the broadcast.
        run.armed.broadcast = Some(self.registry.register(
            MatchRule::rpc(self.config.endpoints.broadcast_method.clone()),
            MonitorOptions::new().with_timeout(self.config.timeouts.broadcast_ms),
        ));

        if !self.page.click(Capability::SignApprove).await? {
            run.result.fail("Failed to approve transaction in wallet");
            self.capture(run, "sign-failed").await;
            return Ok(Flow::Halt);
        }
        tracing::info!(stage = %Stage::TransactionSigned, "transaction approved");
        Ok(Flow::Continue)
    }

    async fn await_broadcast(&mut self, run: &mut Run) -> ProbeResult<Flow> {
        let Some(id) = run.armed.broadcast.take() else {
            run.result.fail("Broadcast monitor was not registered");
            return Ok(Flow::Halt);
        };
        let response = self
            .registry
            .wait(&id, self.config.timeouts.broadcast())
            .await;
        if !response.captured() {
            run.result.fail(
                response
                    .error
                    .unwrap_or_else(|| "No broadcast response".to_string()),
            );
            self.capture(run, "broadcast-timeout").await;
            return Ok(Flow::Halt);
        }

        let verdict = interpret_broadcast(&response.data);
        let outcome = DomainOutcome::Broadcast(verdict.clone());
        let endpoint = self.config.endpoints.broadcast_method.clone();
        self.record(run, EndpointKind::Broadcast, &endpoint, &response, &outcome);
        match verdict {
            Ok(hash) => {
                tracing::info!(stage = %Stage::Broadcast, hash = %hash, "transaction broadcast");
                run.result.transaction_hash = Some(hash);
                run.explicit_success = Some(true);
                self.capture(run, "broadcast").await;
                Ok(Flow::Continue)
            }
            Err(error) => {
                run.result.fail(error);
                self.capture(run, "broadcast-failed").await;
                Ok(Flow::Halt)
            }
        }
    }

    fn record(
        &self,
        run: &mut Run,
        kind: EndpointKind,
        endpoint: &str,
        response: &ApiResponseResult,
        outcome: &DomainOutcome,
    ) {
        let record = ResponseRecord::from_api(endpoint, response, outcome.success());
        if !run.result.record_response(kind.record_name(), record) {
            tracing::debug!(endpoint = kind.record_name(), "response already recorded");
        }
    }

    /// Screenshot a checkpoint. Failures are logged and otherwise ignored.
    async fn capture(&mut self, run: &mut Run, checkpoint: &str) {
        let saved = match self.page.screenshot(checkpoint).await {
            Ok(png) => self.writer.save_screenshot(checkpoint, &png),
            Err(e) => Err(e),
        };
        match saved {
            Ok(path) => run.result.screenshots.push(path.display().to_string()),
            Err(e) => tracing::warn!(checkpoint, error = %e, "screenshot failed"),
        }
    }
}
