//! Scripted in-memory page for tests.
//!
//! [`ScriptedPage`] holds a tiny model of the UI (which capabilities are
//! visible or enabled, and what text they show) and a script of reactions:
//! clicking or filling a capability can emit traffic into a
//! [`TrafficRecorder`] and change the UI model. Every call is kept in a
//! history for assertions.

use crate::network::{CapturedEvent, HttpMethod};
use crate::page::{BridgePage, Capability};
use crate::recorder::TrafficRecorder;
use crate::result::{ProbeError, ProbeResult};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::{HashMap, HashSet};

/// Something the page does in response to an interaction
#[derive(Debug, Clone)]
pub enum ScriptedAction {
    /// Record an event
    Emit(CapturedEvent),
    /// Make a capability visible and enabled
    Show(Capability),
    /// Hide a capability
    Hide(Capability),
    /// Disable a capability
    Disable(Capability),
    /// Set a capability's text
    SetText(Capability, String),
}

/// Deterministic [`BridgePage`] driven by a script
#[derive(Debug)]
pub struct ScriptedPage {
    recorder: TrafficRecorder,
    visible: HashSet<Capability>,
    disabled: HashSet<Capability>,
    texts: HashMap<Capability, String>,
    on_click: HashMap<Capability, Vec<ScriptedAction>>,
    on_fill: HashMap<Capability, Vec<ScriptedAction>>,
    refused: HashSet<Capability>,
    broken: HashMap<Capability, String>,
    screenshot_error: Option<String>,
    history: Vec<String>,
    next_request: u64,
}

impl ScriptedPage {
    /// Create a page feeding `recorder`, with every capability visible
    #[must_use]
    pub fn new(recorder: TrafficRecorder) -> Self {
        Self {
            recorder,
            visible: Capability::ALL
                .into_iter()
                .filter(|c| !matches!(c, Capability::RouteError | Capability::WalletConnected))
                .collect(),
            disabled: HashSet::new(),
            texts: HashMap::new(),
            on_click: HashMap::new(),
            on_fill: HashMap::new(),
            refused: HashSet::new(),
            broken: HashMap::new(),
            screenshot_error: None,
            history: Vec::new(),
            next_request: 0,
        }
    }

    /// Clicking connect shows the connected indicator
    #[must_use]
    pub fn with_wallet(self) -> Self {
        self.on_click(
            Capability::ConnectWallet,
            ScriptedAction::Show(Capability::WalletConnected),
        )
    }

    /// Add a reaction to clicking `capability`
    #[must_use]
    pub fn on_click(mut self, capability: Capability, action: ScriptedAction) -> Self {
        self.on_click.entry(capability).or_default().push(action);
        self
    }

    /// Add a reaction to filling `capability`
    #[must_use]
    pub fn on_fill(mut self, capability: Capability, action: ScriptedAction) -> Self {
        self.on_fill.entry(capability).or_default().push(action);
        self
    }

    /// Emit a request/response exchange when `capability` is clicked
    #[must_use]
    pub fn exchange_on_click(mut self, capability: Capability, exchange: Exchange) -> Self {
        let (request, response) = exchange.into_events(self.next_request_id());
        self.on_click(capability, ScriptedAction::Emit(request))
            .on_click(capability, ScriptedAction::Emit(response))
    }

    /// Emit a request/response exchange when `capability` is filled
    #[must_use]
    pub fn exchange_on_fill(mut self, capability: Capability, exchange: Exchange) -> Self {
        let (request, response) = exchange.into_events(self.next_request_id());
        self.on_fill(capability, ScriptedAction::Emit(request))
            .on_fill(capability, ScriptedAction::Emit(response))
    }

    /// Make `capability` refuse clicks and fills
    #[must_use]
    pub fn refusing(mut self, capability: Capability) -> Self {
        let _ = self.refused.insert(capability);
        self
    }

    /// Make `capability` fail with an error
    #[must_use]
    pub fn failing(mut self, capability: Capability, message: impl Into<String>) -> Self {
        let _ = self.broken.insert(capability, message.into());
        self
    }

    /// Make screenshots fail
    #[must_use]
    pub fn failing_screenshots(mut self, message: impl Into<String>) -> Self {
        self.screenshot_error = Some(message.into());
        self
    }

    /// Set initial visibility
    #[must_use]
    pub fn with_visible(mut self, capability: Capability, visible: bool) -> Self {
        if visible {
            let _ = self.visible.insert(capability);
        } else {
            let _ = self.visible.remove(&capability);
        }
        self
    }

    /// Set initial enabled state
    #[must_use]
    pub fn with_enabled(mut self, capability: Capability, enabled: bool) -> Self {
        if enabled {
            let _ = self.disabled.remove(&capability);
        } else {
            let _ = self.disabled.insert(capability);
        }
        self
    }

    /// Set initial text, making the capability visible
    #[must_use]
    pub fn with_text(mut self, capability: Capability, text: impl Into<String>) -> Self {
        let _ = self.texts.insert(capability, text.into());
        let _ = self.visible.insert(capability);
        self
    }

    /// Calls made so far, as `"verb:capability"` strings
    #[must_use]
    pub fn history(&self) -> &[String] {
        &self.history
    }

    /// Whether a call starting with `prefix` was made
    #[must_use]
    pub fn was_called(&self, prefix: &str) -> bool {
        self.history.iter().any(|c| c.starts_with(prefix))
    }

    fn next_request_id(&mut self) -> String {
        self.next_request += 1;
        format!("scripted-{}", self.next_request)
    }

    fn check(&self, capability: Capability) -> ProbeResult<()> {
        match self.broken.get(&capability) {
            Some(message) => Err(ProbeError::capability(capability.as_str(), message.clone())),
            None => Ok(()),
        }
    }

    fn interactive(&self, capability: Capability) -> bool {
        !self.refused.contains(&capability)
            && self.visible.contains(&capability)
            && !self.disabled.contains(&capability)
    }

    fn run(&mut self, actions: Option<Vec<ScriptedAction>>) {
        for action in actions.unwrap_or_default() {
            match action {
                ScriptedAction::Emit(event) => {
                    let event = if event.request_id.is_none() {
                        event.with_request_id(self.next_request_id())
                    } else {
                        event
                    };
                    self.recorder.record(event);
                }
                ScriptedAction::Show(c) => {
                    let _ = self.visible.insert(c);
                    let _ = self.disabled.remove(&c);
                }
                ScriptedAction::Hide(c) => {
                    let _ = self.visible.remove(&c);
                }
                ScriptedAction::Disable(c) => {
                    let _ = self.disabled.insert(c);
                }
                ScriptedAction::SetText(c, text) => {
                    let _ = self.texts.insert(c, text);
                    let _ = self.visible.insert(c);
                }
            }
        }
    }
}

#[async_trait]
impl BridgePage for ScriptedPage {
    async fn navigate(&mut self, url: &str) -> ProbeResult<()> {
        self.history.push(format!("navigate:{url}"));
        Ok(())
    }

    async fn wait_for_load(&mut self, timeout_ms: u64) -> ProbeResult<()> {
        self.history.push(format!("wait_for_load:{timeout_ms}"));
        Ok(())
    }

    async fn click(&mut self, capability: Capability) -> ProbeResult<bool> {
        self.history.push(format!("click:{capability}"));
        self.check(capability)?;
        if !self.interactive(capability) {
            return Ok(false);
        }
        let actions = self.on_click.get(&capability).cloned();
        self.run(actions);
        Ok(true)
    }

    async fn is_visible(&mut self, capability: Capability, _timeout_ms: u64) -> ProbeResult<bool> {
        self.history.push(format!("is_visible:{capability}"));
        self.check(capability)?;
        Ok(self.visible.contains(&capability))
    }

    async fn fill_input(&mut self, capability: Capability, value: &str) -> ProbeResult<bool> {
        self.history.push(format!("fill:{capability}={value}"));
        self.check(capability)?;
        if !self.interactive(capability) {
            return Ok(false);
        }
        let actions = self.on_fill.get(&capability).cloned();
        self.run(actions);
        Ok(true)
    }

    async fn text_of(&mut self, capability: Capability) -> ProbeResult<Option<String>> {
        self.history.push(format!("text_of:{capability}"));
        self.check(capability)?;
        if !self.visible.contains(&capability) {
            return Ok(None);
        }
        Ok(self.texts.get(&capability).cloned())
    }

    async fn is_enabled(&mut self, capability: Capability) -> ProbeResult<bool> {
        self.history.push(format!("is_enabled:{capability}"));
        self.check(capability)?;
        Ok(self.visible.contains(&capability) && !self.disabled.contains(&capability))
    }

    async fn screenshot(&mut self, name: &str) -> ProbeResult<Vec<u8>> {
        self.history.push(format!("screenshot:{name}"));
        match &self.screenshot_error {
            Some(message) => Err(ProbeError::page(message.clone())),
            None => Ok(b"\x89PNG\r\n\x1a\n".to_vec()),
        }
    }
}

/// A scripted request/response pair
#[derive(Debug, Clone)]
pub struct Exchange {
    url: String,
    method: HttpMethod,
    request_body: Option<String>,
    status: u16,
    response_body: String,
}

impl Exchange {
    /// REST call answered with `status` and a JSON or text body
    #[must_use]
    pub fn rest(url: impl Into<String>, status: u16, body: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            method: HttpMethod::Post,
            request_body: Some("{}".to_string()),
            status,
            response_body: body.into(),
        }
    }

    /// REST call answered with a JSON body
    #[must_use]
    pub fn rest_json(url: impl Into<String>, status: u16, body: &Value) -> Self {
        Self::rest(url, status, body.to_string())
    }

    /// JSON-RPC call; `outcome` is merged into the response envelope
    /// (typically `{"result": ...}` or `{"error": ...}`)
    #[must_use]
    pub fn rpc(
        url: impl Into<String>,
        id: u64,
        method: &str,
        params: &Value,
        outcome: &Value,
    ) -> Self {
        let request = json!({"jsonrpc": "2.0", "id": id, "method": method, "params": params});
        let mut response = json!({"jsonrpc": "2.0", "id": id});
        if let (Some(target), Some(fields)) = (response.as_object_mut(), outcome.as_object()) {
            for (key, value) in fields {
                let _ = target.insert(key.clone(), value.clone());
            }
        }
        Self {
            url: url.into(),
            method: HttpMethod::Post,
            request_body: Some(request.to_string()),
            status: 200,
            response_body: response.to_string(),
        }
    }

    fn into_events(self, request_id: String) -> (CapturedEvent, CapturedEvent) {
        let mut request =
            CapturedEvent::request(self.url.clone(), self.method).with_request_id(request_id.clone());
        if let Some(body) = &self.request_body {
            request = request.with_body(body.clone());
        }
        let sent_at = request.timestamp_ms;
        let mut response = CapturedEvent::response(self.url, self.method, self.status)
            .with_body(self.response_body)
            .with_request_id(request_id)
            .with_request_timestamp(sent_at);
        if let Some(body) = self.request_body {
            response = response.with_request_body(body);
        }
        (request, response)
    }
}
