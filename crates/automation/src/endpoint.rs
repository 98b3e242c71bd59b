//! DevTools HTTP endpoint
//!
//! The debugging server answers plain HTTP next to the WebSocket: tab
//! listing, version info (which carries the browser-level WebSocket URL),
//! and tab creation.

use serde_json::Value;
use std::time::Duration;

use crate::error::{AutomationError, Result};

const PROBE_TIMEOUT: Duration = Duration::from_secs(2);

/// Identifies the debugging server. Immutable after construction.
#[derive(Debug, Clone)]
pub struct Endpoint {
    host: String,
    port: u16,
    http: reqwest::Client,
}

impl Endpoint {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            http: reqwest::Client::new(),
        }
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn http_url(&self) -> String {
        format!("http://{}:{}", self.host, self.port)
    }

    /// True when the DevTools listener answers the tab-list probe.
    pub async fn is_reachable(&self) -> bool {
        self.http
            .get(format!("{}/json", self.http_url()))
            .timeout(PROBE_TIMEOUT)
            .send()
            .await
            .map(|r| r.status().is_success())
            .unwrap_or(false)
    }

    /// Browser-level WebSocket URL from /json/version.
    pub async fn browser_ws_url(&self) -> Result<String> {
        let body: Value = self
            .http
            .get(format!("{}/json/version", self.http_url()))
            .timeout(PROBE_TIMEOUT)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        let ws = body["webSocketDebuggerUrl"].as_str().ok_or_else(|| {
            AutomationError::InvalidResponse("missing webSocketDebuggerUrl".to_string())
        })?;
        url::Url::parse(ws).map_err(|e| {
            AutomationError::InvalidResponse(format!("bad webSocketDebuggerUrl: {e}"))
        })?;
        Ok(ws.to_string())
    }

    /// Ask the browser to open a new tab at `url`.
    pub async fn open_tab(&self, url: &str) -> Result<()> {
        self.http
            .put(format!("{}/json/new?{}", self.http_url(), url))
            .timeout(PROBE_TIMEOUT)
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }
}
