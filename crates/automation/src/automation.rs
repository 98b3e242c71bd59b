//! Automation facade
//!
//! The one entry point callers use: connect to the browser, bind the chat
//! tab, ask a question, wait for the settled reply, tear everything down.
//! One question in flight at a time; ask_question takes the facade by
//! mutable borrow so concurrent asks cannot interleave keystrokes.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tracing::{debug, info, warn};

use crate::binder::{self, PageTarget};
use crate::cdp::{CdpClient, CdpSession};
use crate::detect::{CompletionDetector, DetectorConfig};
use crate::endpoint::Endpoint;
use crate::error::{AutomationError, Result};
use crate::input::InputDriver;
use crate::launch::ChromeLauncher;
use crate::prompt::{self, SystemPrompt};
use crate::snapshot::PageProbe;

pub const GEMINI_URL: &str = "https://gemini.google.com";

/// Substring matched against target URLs and titles during discovery.
const TARGET_URL_PATTERN: &str = "gemini.google.com";

const DISCOVERY_ATTEMPTS: u32 = 5;
const DISCOVERY_BACKOFF: Duration = Duration::from_secs(2);

#[derive(Debug, Clone)]
pub struct AutomationConfig {
    pub host: String,
    pub port: u16,
    /// Start a browser when nothing is listening on the endpoint.
    pub auto_launch: bool,
    pub headless: bool,
    /// Profile directory for a launched browser; None means a throwaway
    /// profile under the temp dir.
    pub user_data_dir: Option<PathBuf>,
    pub typing_delay: Duration,
    pub start_minimized: bool,
    /// Leave a launched browser running after close().
    pub keep_browser: bool,
    /// Where to drop a final screenshot during close(), if anywhere.
    pub screenshot_path: Option<PathBuf>,
    /// Skips HTTP discovery entirely when set.
    pub websocket_url: Option<String>,
    pub command_timeout: Duration,
    pub detector: DetectorConfig,
    pub target_url_pattern: String,
    pub system_prompt: SystemPrompt,
}

impl Default for AutomationConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 9222,
            auto_launch: true,
            headless: false,
            user_data_dir: None,
            typing_delay: Duration::from_millis(50),
            start_minimized: false,
            keep_browser: false,
            screenshot_path: None,
            websocket_url: None,
            command_timeout: Duration::from_secs(10),
            detector: DetectorConfig::default(),
            target_url_pattern: TARGET_URL_PATTERN.to_string(),
            system_prompt: SystemPrompt::default(),
        }
    }
}

/// One completed question/answer exchange.
#[derive(Debug, Clone)]
pub struct ConversationTurn {
    pub question: String,
    /// What was actually typed, system prompt suffix included.
    pub effective_prompt: String,
    pub submitted_at: SystemTime,
    pub response: String,
    pub finished_at: SystemTime,
}

pub struct GeminiAutomation {
    config: AutomationConfig,
    endpoint: Endpoint,
    client: Option<Arc<CdpClient>>,
    session: Option<CdpSession>,
    target: Option<PageTarget>,
    launcher: Option<ChromeLauncher>,
}

impl GeminiAutomation {
    pub fn new(config: AutomationConfig) -> Self {
        let endpoint = Endpoint::new(config.host.clone(), config.port);
        Self {
            config,
            endpoint,
            client: None,
            session: None,
            target: None,
            launcher: None,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.session.is_some()
    }

    pub fn config(&self) -> &AutomationConfig {
        &self.config
    }

    /// Establish the transport, bind the chat tab and attach a session.
    pub async fn connect(&mut self) -> Result<()> {
        let ws_url = match &self.config.websocket_url {
            Some(url) => url.clone(),
            None => self.endpoint_ws_url().await?,
        };
        debug!(ws_url, "connecting transport");
        let client = CdpClient::connect(&ws_url, self.config.command_timeout).await?;

        let target = self.discover_with_retry(&client).await?;
        info!(target_id = target.target_id, url = target.url, "bound chat tab");
        let session = binder::attach(client.clone(), &target).await?;

        if !session.url.contains(&self.config.target_url_pattern) {
            // Bound on title alone; point the tab at the chat app itself.
            debug!(url = session.url, "bound tab is off the chat app, navigating");
            session.navigate(GEMINI_URL).await?;
        }

        if self.config.start_minimized {
            // Headless builds have no window; failure here is cosmetic.
            if let Err(e) = session.minimize_window().await {
                debug!(error = %e, "could not minimize window");
            }
        }

        self.client = Some(client);
        self.session = Some(session);
        self.target = Some(target);
        Ok(())
    }

    async fn endpoint_ws_url(&mut self) -> Result<String> {
        if self.endpoint.is_reachable().await {
            return self.endpoint.browser_ws_url().await;
        }
        if !self.config.auto_launch {
            return Err(AutomationError::ConnectionLost(format!(
                "no DevTools listener at {}; start Chrome with --remote-debugging-port={} or enable auto-launch",
                self.endpoint.http_url(),
                self.endpoint.port()
            )));
        }
        let mut launcher = ChromeLauncher::new(
            self.endpoint.clone(),
            self.config.user_data_dir.clone(),
            self.config.keep_browser,
        );
        launcher
            .launch(self.config.headless, Some(GEMINI_URL))
            .await?;
        self.launcher = Some(launcher);
        self.endpoint.browser_ws_url().await
    }

    async fn discover_with_retry(&self, client: &Arc<CdpClient>) -> Result<PageTarget> {
        let pattern = &self.config.target_url_pattern;
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            match binder::discover_target(client, pattern).await {
                Ok(target) => return Ok(target),
                Err(AutomationError::TargetNotFound(_))
                    if attempt < DISCOVERY_ATTEMPTS
                        && self.config.auto_launch
                        && self.config.websocket_url.is_none() =>
                {
                    // The tab may still be loading, or no chat tab exists
                    // yet. Open one and poll.
                    if attempt == 1 {
                        if let Err(e) = self.endpoint.open_tab(GEMINI_URL).await {
                            warn!(error = %e, "could not open a chat tab");
                        }
                    }
                    debug!(attempt, "chat tab not found yet, retrying");
                    tokio::time::sleep(DISCOVERY_BACKOFF).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Type the question, submit it and wait for the reply to settle.
    /// Returns the cleaned reply text.
    pub async fn ask_question(&mut self, question: &str, timeout: Duration) -> Result<String> {
        let session = self.session.as_ref().ok_or(AutomationError::NotConnected)?;

        // The target reference goes stale when the tab navigates away or
        // closes; typing into whatever page replaced it must fail up front.
        let info = session.target_info().await?;
        if !info.url.contains(&self.config.target_url_pattern)
            && !info.title.contains(&self.config.target_url_pattern)
        {
            warn!(url = info.url, "bound tab no longer shows the chat app");
            return Err(AutomationError::TargetNotFound(
                self.config.target_url_pattern.clone(),
            ));
        }

        let suffix = self.config.system_prompt.resolve();
        let effective = prompt::effective_prompt(question, suffix.as_deref());
        let submitted_at = SystemTime::now();

        let driver = InputDriver::new(session, self.config.typing_delay);
        driver.focus_input().await?;
        driver.type_text(&effective).await?;
        driver.submit().await?;
        info!(chars = effective.len(), "question submitted");

        let detector = CompletionDetector::new(self.config.detector);
        let mut probe = PageProbe::new(session);
        let raw = detector.wait_for_completion(&mut probe, timeout).await?;

        let response = clean_response_text(&raw, question, suffix.as_deref());
        let turn = ConversationTurn {
            question: question.to_string(),
            effective_prompt: effective,
            submitted_at,
            response: response.clone(),
            finished_at: SystemTime::now(),
        };
        debug!(
            question = turn.question,
            response_chars = turn.response.len(),
            "turn complete"
        );
        Ok(response)
    }

    /// Full text of the page body, for debugging selector drift.
    pub async fn get_page_text(&self) -> Result<String> {
        let session = self.session.as_ref().ok_or(AutomationError::NotConnected)?;
        let value = session.evaluate("document.body.innerText").await?;
        Ok(value.as_str().unwrap_or_default().to_string())
    }

    pub async fn take_screenshot(&self, path: &Path) -> Result<()> {
        let session = self.session.as_ref().ok_or(AutomationError::NotConnected)?;
        let png = session.capture_screenshot().await?;
        tokio::fs::write(path, png).await?;
        info!(path = %path.display(), "screenshot written");
        Ok(())
    }

    /// Tear down the session, transport and any launched browser. Safe to
    /// call more than once.
    pub async fn close(&mut self) {
        if let Some(path) = self.config.screenshot_path.clone() {
            if self.session.is_some() {
                if let Err(e) = self.take_screenshot(&path).await {
                    warn!(error = %e, "final screenshot failed");
                }
            }
        }
        self.session = None;
        self.target = None;
        if let Some(client) = self.client.take() {
            client.close().await;
        }
        if let Some(mut launcher) = self.launcher.take() {
            launcher.shutdown().await;
        }
        debug!("automation closed");
    }
}

/// UI strings that leak into extracted reply text.
const UI_CHROME: &[&str] = &[
    "Show thinking",
    "Copy code",
    "Gemini can make mistakes, so double-check it",
];

/// Strips the echoed question, the system prompt suffix and known UI labels
/// from raw container text, then collapses whitespace.
pub(crate) fn clean_response_text(raw: &str, question: &str, suffix: Option<&str>) -> String {
    let mut text = raw.split_whitespace().collect::<Vec<_>>().join(" ");

    let combined = suffix.map(|s| prompt::effective_prompt(question, Some(s)));
    let mut needles: Vec<&str> = Vec::new();
    if let Some(combined) = combined.as_deref() {
        needles.push(combined);
    }
    needles.push(question);
    if let Some(suffix) = suffix {
        needles.push(suffix);
    }
    for needle in needles {
        let needle = needle.split_whitespace().collect::<Vec<_>>().join(" ");
        if needle.is_empty() {
            continue;
        }
        if let Some(stripped) = text.strip_prefix(&needle) {
            text = stripped.to_string();
        } else {
            text = text.replacen(&needle, "", 1);
        }
    }
    for label in UI_CHROME {
        text = text.replace(label, "");
    }
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
