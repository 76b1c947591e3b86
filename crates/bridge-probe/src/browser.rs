//! Chromium-backed page (feature `browser`).
//!
//! [`CdpPage`] launches Chromium through chromiumoxide, maps each
//! [`Capability`] to a CSS selector, and forwards CDP Network events for
//! fetch/XHR traffic into a [`TrafficRecorder`].

use crate::network::{CapturedEvent, HttpMethod};
use crate::page::{BridgePage, Capability};
use crate::recorder::TrafficRecorder;
use crate::result::{ProbeError, ProbeResult};
use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig as CdpConfig};
use chromiumoxide::cdp::browser_protocol::network::{
    EnableParams, EventLoadingFailed, EventLoadingFinished, EventRequestWillBeSent,
    EventResponseReceived, GetRequestPostDataParams, GetResponseBodyParams, RequestId,
    ResourceType,
};
use chromiumoxide::cdp::browser_protocol::page::{CaptureScreenshotFormat, CaptureScreenshotParams};
use chromiumoxide::page::Page;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::time::Duration;
use tokio::task::JoinHandle;

const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Browser launch options
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BrowserOptions {
    /// Run without a window
    pub headless: bool,
    /// Keep the Chromium sandbox
    pub sandbox: bool,
    /// Chromium executable
    pub chromium_path: Option<PathBuf>,
    /// Profile directory (wallet state lives here)
    pub user_data_dir: Option<PathBuf>,
    /// Unpacked extensions to load
    pub extensions: Vec<PathBuf>,
    /// Selector overrides keyed by capability
    pub selectors: BTreeMap<Capability, String>,
}

impl Default for BrowserOptions {
    fn default() -> Self {
        Self {
            headless: true,
            sandbox: true,
            chromium_path: None,
            user_data_dir: None,
            extensions: Vec::new(),
            selectors: BTreeMap::new(),
        }
    }
}

impl BrowserOptions {
    /// Selector for a capability: an override, or `[data-testid="<name>"]`
    #[must_use]
    pub fn selector(&self, capability: Capability) -> String {
        self.selectors
            .get(&capability)
            .cloned()
            .unwrap_or_else(|| format!("[data-testid=\"{}\"]", capability.as_str()))
    }
}

fn browser_error(e: impl std::fmt::Display) -> ProbeError {
    ProbeError::Browser {
        message: e.to_string(),
    }
}

/// A Chromium page driven over CDP
#[derive(Debug)]
pub struct CdpPage {
    browser: Browser,
    page: Page,
    options: BrowserOptions,
    handler: JoinHandle<()>,
    tap: JoinHandle<()>,
}

impl CdpPage {
    /// Launch Chromium, open a blank page and start recording its traffic
    pub async fn launch(options: BrowserOptions, recorder: TrafficRecorder) -> ProbeResult<Self> {
        let mut builder = CdpConfig::builder();
        if !options.headless {
            builder = builder.with_head();
        }
        if !options.sandbox {
            builder = builder.no_sandbox();
        }
        if let Some(path) = &options.chromium_path {
            builder = builder.chrome_executable(path);
        }
        if let Some(dir) = &options.user_data_dir {
            builder = builder.user_data_dir(dir);
        }
        for extension in &options.extensions {
            builder = builder.extension(extension.display().to_string());
        }
        let config = builder.build().map_err(browser_error)?;

        let (browser, mut handler) = Browser::launch(config).await.map_err(browser_error)?;
        let handler = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if event.is_err() {
                    break;
                }
            }
        });

        let page = browser.new_page("about:blank").await.map_err(browser_error)?;
        let _ = page
            .execute(EnableParams::default())
            .await
            .map_err(browser_error)?;
        let tap = spawn_tap(page.clone(), recorder).await?;
        tracing::info!(headless = options.headless, "browser launched");

        Ok(Self {
            browser,
            page,
            options,
            handler,
            tap,
        })
    }

    /// Close the browser
    pub async fn close(mut self) -> ProbeResult<()> {
        self.tap.abort();
        let _ = self.browser.close().await.map_err(browser_error)?;
        self.handler.abort();
        Ok(())
    }

    fn selector(&self, capability: Capability) -> String {
        self.options.selector(capability)
    }

    async fn eval_bool(&self, script: String) -> ProbeResult<bool> {
        self.page
            .evaluate(script)
            .await
            .map_err(|e| ProbeError::page(e.to_string()))?
            .into_value::<bool>()
            .map_err(|e| ProbeError::page(e.to_string()))
    }

    fn selector_literal(&self, capability: Capability) -> ProbeResult<String> {
        Ok(serde_json::to_string(&self.selector(capability))?)
    }
}

/// Request metadata kept until its response body arrives
struct InFlight {
    url: String,
    method: HttpMethod,
    body: Option<String>,
    sent_at: u64,
    status: Option<u16>,
}

async fn spawn_tap(page: Page, recorder: TrafficRecorder) -> ProbeResult<JoinHandle<()>> {
    let mut sent = page
        .event_listener::<EventRequestWillBeSent>()
        .await
        .map_err(browser_error)?;
    let mut received = page
        .event_listener::<EventResponseReceived>()
        .await
        .map_err(browser_error)?;
    let mut finished = page
        .event_listener::<EventLoadingFinished>()
        .await
        .map_err(browser_error)?;
    let mut failed = page
        .event_listener::<EventLoadingFailed>()
        .await
        .map_err(browser_error)?;

    Ok(tokio::spawn(async move {
        let mut in_flight: HashMap<String, InFlight> = HashMap::new();
        loop {
            tokio::select! {
                biased;
                Some(event) = sent.next() => {
                    if !matches!(event.r#type, Some(ResourceType::Fetch | ResourceType::Xhr)) {
                        continue;
                    }
                    let id = event.request_id.inner().clone();
                    let method = HttpMethod::parse(&event.request.method);
                    let body = if event.request.has_post_data == Some(true) {
                        request_body(&page, event.request_id.clone()).await
                    } else {
                        None
                    };
                    let mut request = CapturedEvent::request(event.request.url.clone(), method)
                        .with_request_id(id.clone());
                    if let Some(body) = &body {
                        request = request.with_body(body.clone());
                    }
                    let sent_at = request.timestamp_ms;
                    recorder.record(request);
                    let _ = in_flight.insert(id, InFlight {
                        url: event.request.url.clone(),
                        method,
                        body,
                        sent_at,
                        status: None,
                    });
                }
                Some(event) = received.next() => {
                    if let Some(entry) = in_flight.get_mut(event.request_id.inner()) {
                        entry.status = u16::try_from(event.response.status).ok();
                        entry.url.clone_from(&event.response.url);
                    }
                }
                Some(event) = finished.next() => {
                    let Some(entry) = in_flight.remove(event.request_id.inner()) else {
                        continue;
                    };
                    let body = response_body(&page, event.request_id.clone()).await;
                    recorder.record(build_response(event.request_id.inner(), entry, body));
                }
                Some(event) = failed.next() => {
                    if in_flight.remove(event.request_id.inner()).is_some() {
                        tracing::debug!(error = %event.error_text, "request failed before a response");
                    }
                }
                else => break,
            }
        }
    }))
}

fn build_response(id: &str, entry: InFlight, body: Option<String>) -> CapturedEvent {
    let mut event = CapturedEvent::response(entry.url, entry.method, entry.status.unwrap_or(0))
        .with_request_id(id)
        .with_request_timestamp(entry.sent_at);
    if let Some(body) = body {
        event = event.with_body(body);
    }
    if let Some(request_body) = entry.body {
        event = event.with_request_body(request_body);
    }
    event
}

async fn request_body(page: &Page, id: RequestId) -> Option<String> {
    page.execute(GetRequestPostDataParams::new(id))
        .await
        .ok()
        .map(|reply| reply.result.post_data.clone())
}

async fn response_body(page: &Page, id: RequestId) -> Option<String> {
    let reply = page.execute(GetResponseBodyParams::new(id)).await.ok()?;
    let body = &reply.result;
    if body.base64_encoded {
        use base64::Engine;
        base64::engine::general_purpose::STANDARD
            .decode(&body.body)
            .ok()
            .and_then(|bytes| String::from_utf8(bytes).ok())
    } else {
        Some(body.body.clone())
    }
}

#[async_trait]
impl BridgePage for CdpPage {
    async fn navigate(&mut self, url: &str) -> ProbeResult<()> {
        let _ = self
            .page
            .goto(url)
            .await
            .map_err(|e| ProbeError::Navigation {
                url: url.to_string(),
                message: e.to_string(),
            })?;
        Ok(())
    }

    async fn wait_for_load(&mut self, timeout_ms: u64) -> ProbeResult<()> {
        match tokio::time::timeout(
            Duration::from_millis(timeout_ms),
            self.page.wait_for_navigation(),
        )
        .await
        {
            Ok(Ok(_)) => Ok(()),
            Ok(Err(e)) => Err(ProbeError::page(e.to_string())),
            Err(_) => Err(ProbeError::Timeout { ms: timeout_ms }),
        }
    }

    async fn click(&mut self, capability: Capability) -> ProbeResult<bool> {
        let Ok(element) = self.page.find_element(self.selector(capability)).await else {
            tracing::debug!(capability = %capability, "element not found for click");
            return Ok(false);
        };
        Ok(element.click().await.is_ok())
    }

    async fn is_visible(&mut self, capability: Capability, timeout_ms: u64) -> ProbeResult<bool> {
        let script = format!(
            "(() => {{ const el = document.querySelector({}); \
             return !!el && el.getClientRects().length > 0; }})()",
            self.selector_literal(capability)?
        );
        let deadline = tokio::time::Instant::now() + Duration::from_millis(timeout_ms);
        loop {
            if self.eval_bool(script.clone()).await? {
                return Ok(true);
            }
            if tokio::time::Instant::now() >= deadline {
                return Ok(false);
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }

    async fn fill_input(&mut self, capability: Capability, value: &str) -> ProbeResult<bool> {
        let Ok(element) = self.page.find_element(self.selector(capability)).await else {
            return Ok(false);
        };
        if element.click().await.is_err() || element.type_str(value).await.is_err() {
            return Ok(false);
        }
        let picker = matches!(
            capability,
            Capability::SourceChain
                | Capability::SourceToken
                | Capability::DestinationChain
                | Capability::DestinationToken
                | Capability::RouteType
        );
        if picker && element.press_key("Enter").await.is_err() {
            return Ok(false);
        }
        Ok(true)
    }

    async fn text_of(&mut self, capability: Capability) -> ProbeResult<Option<String>> {
        let Ok(element) = self.page.find_element(self.selector(capability)).await else {
            return Ok(None);
        };
        element
            .inner_text()
            .await
            .map_err(|e| ProbeError::capability(capability.as_str(), e.to_string()))
    }

    async fn is_enabled(&mut self, capability: Capability) -> ProbeResult<bool> {
        let script = format!(
            "(() => {{ const el = document.querySelector({}); \
             return !!el && !el.disabled && el.getAttribute('aria-disabled') !== 'true'; }})()",
            self.selector_literal(capability)?
        );
        self.eval_bool(script).await
    }

    async fn screenshot(&mut self, name: &str) -> ProbeResult<Vec<u8>> {
        let params = CaptureScreenshotParams::builder()
            .format(CaptureScreenshotFormat::Png)
            .build();
        let shot = self
            .page
            .execute(params)
            .await
            .map_err(|e| ProbeError::page(format!("screenshot '{name}' failed: {e}")))?;

        use base64::Engine;
        base64::engine::general_purpose::STANDARD
            .decode(&shot.data)
            .map_err(|e| ProbeError::page(format!("screenshot '{name}' failed: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_selector() {
        let options = BrowserOptions::default();
        assert_eq!(
            options.selector(Capability::SubmitButton),
            "[data-testid=\"submit-button\"]"
        );
    }

    #[test]
    fn test_selector_override() {
        let mut options = BrowserOptions::default();
        let _ = options
            .selectors
            .insert(Capability::AmountInput, "input[name=amount]".to_string());
        assert_eq!(options.selector(Capability::AmountInput), "input[name=amount]");
    }

    #[test]
    fn test_build_response_carries_request() {
        let entry = InFlight {
            url: "https://rpc".to_string(),
            method: HttpMethod::Post,
            body: Some(r#"{"id":1,"method":"status","params":{}}"#.to_string()),
            sent_at: 10,
            status: Some(200),
        };
        let event = build_response("42", entry, Some(r#"{"id":1,"result":{}}"#.to_string()));
        assert_eq!(event.request_id.as_deref(), Some("42"));
        assert_eq!(event.status, Some(200));
        assert!(event.request_rpc().is_some());
        assert!(event.rpc.is_some());
    }
}
