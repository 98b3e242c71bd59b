//! Command dispatcher bound to one attached page target
//!
//! Lightweight wrapper around the transport with target-specific context.
//! All sessions share the same WebSocket; the session id routes commands to
//! the right page.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

use super::client::CdpClient;
use super::protocol::{AttachToTargetResult, SessionId, TargetId, TargetInfo};
use crate::error::{AutomationError, Result};

/// Protocol domains enabled on every attached page.
const SESSION_DOMAINS: &[&str] = &["Page", "DOM", "Runtime"];

/// Screenshots can be slow on large pages; give them more room than an
/// ordinary command.
const SCREENSHOT_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Clone)]
pub struct CdpSession {
    client: Arc<CdpClient>,

    pub target_id: TargetId,
    pub session_id: SessionId,

    /// Target title/url as seen at attach time
    pub title: String,
    pub url: String,
}

impl CdpSession {
    /// Attach to a target, enable the domains the engine needs, and cache
    /// the target's identity.
    pub async fn attach(client: Arc<CdpClient>, target_id: TargetId) -> Result<Self> {
        let result = client
            .send(
                "Target.attachToTarget",
                Some(json!({
                    "targetId": target_id,
                    "flatten": true,
                })),
                None,
            )
            .await?;
        let attach: AttachToTargetResult = serde_json::from_value(result)?;
        let session_id = attach.session_id;

        // Enable domains in parallel; individual failures are non-fatal.
        let enables: Vec<_> = SESSION_DOMAINS
            .iter()
            .map(|domain| {
                let client = client.clone();
                let session_id = session_id.clone();
                async move {
                    client
                        .send(format!("{domain}.enable"), None, Some(session_id))
                        .await
                }
            })
            .collect();
        let results = futures_util::future::join_all(enables).await;
        let failed = results.iter().filter(|r| r.is_err()).count();
        if failed > 0 {
            warn!(failed, total = results.len(), "some domain enables failed");
        }

        let info = client
            .send(
                "Target.getTargetInfo",
                Some(json!({ "targetId": &target_id })),
                None,
            )
            .await?;
        let info: TargetInfo = serde_json::from_value(info["targetInfo"].clone())?;

        Ok(Self {
            client,
            target_id,
            session_id,
            title: info.title,
            url: info.url,
        })
    }

    /// Send a command within this session's context.
    pub async fn send(&self, method: impl Into<String>, params: Option<Value>) -> Result<Value> {
        self.client
            .send(method, params, Some(self.session_id.clone()))
            .await
    }

    /// Same, with an explicit per-call deadline.
    pub async fn send_with_timeout(
        &self,
        method: impl Into<String>,
        params: Option<Value>,
        timeout: Duration,
    ) -> Result<Value> {
        self.client
            .send_with_timeout(method, params, Some(self.session_id.clone()), timeout)
            .await
    }

    /// Evaluate a script in the page. Remote throws surface as script
    /// errors, distinct from timeouts and connection loss, so callers can
    /// decide what is worth retrying.
    pub async fn evaluate(&self, expression: &str) -> Result<Value> {
        let result = self
            .send(
                "Runtime.evaluate",
                Some(json!({
                    "expression": expression,
                    "returnByValue": true,
                    "awaitPromise": true,
                })),
            )
            .await?;
        unwrap_evaluate(result)
    }

    pub async fn dispatch_key_event(&self, params: Value) -> Result<()> {
        self.send("Input.dispatchKeyEvent", Some(params)).await?;
        Ok(())
    }

    /// PNG bytes of the current viewport.
    pub async fn capture_screenshot(&self) -> Result<Vec<u8>> {
        let result = self
            .send_with_timeout(
                "Page.captureScreenshot",
                Some(json!({ "format": "png" })),
                SCREENSHOT_TIMEOUT,
            )
            .await?;
        let data = result["data"].as_str().ok_or_else(|| {
            AutomationError::InvalidResponse("screenshot payload missing data".to_string())
        })?;
        BASE64.decode(data).map_err(|e| {
            AutomationError::InvalidResponse(format!("screenshot payload not base64: {e}"))
        })
    }

    pub async fn navigate(&self, url: &str) -> Result<Value> {
        self.send("Page.navigate", Some(json!({ "url": url }))).await
    }

    /// Re-reads target info from the browser. Fails when the target has
    /// navigated away or closed, which is how staleness shows up instead of
    /// a silent no-op.
    pub async fn target_info(&self) -> Result<TargetInfo> {
        let result = self
            .client
            .send(
                "Target.getTargetInfo",
                Some(json!({ "targetId": &self.target_id })),
                None,
            )
            .await?;
        Ok(serde_json::from_value(result["targetInfo"].clone())?)
    }

    /// Minimize the window owning this target.
    pub async fn minimize_window(&self) -> Result<()> {
        let result = self
            .send("Browser.getWindowForTarget", Some(json!({})))
            .await?;
        let window_id = result["windowId"].as_i64().ok_or_else(|| {
            AutomationError::InvalidResponse("missing windowId".to_string())
        })?;
        self.send(
            "Browser.setWindowBounds",
            Some(json!({
                "windowId": window_id,
                "bounds": { "windowState": "minimized" },
            })),
        )
        .await?;
        Ok(())
    }
}

/// Pulls the value out of a Runtime.evaluate result, mapping
/// `exceptionDetails` to a script error.
pub(crate) fn unwrap_evaluate(result: Value) -> Result<Value> {
    if let Some(details) = result.get("exceptionDetails") {
        let text = details
            .get("exception")
            .and_then(|e| e.get("description"))
            .and_then(Value::as_str)
            .or_else(|| details.get("text").and_then(Value::as_str))
            .unwrap_or("unknown evaluation failure");
        return Err(AutomationError::ScriptError(text.to_string()));
    }
    Ok(result
        .get("result")
        .and_then(|r| r.get("value"))
        .cloned()
        .unwrap_or(Value::Null))
}
