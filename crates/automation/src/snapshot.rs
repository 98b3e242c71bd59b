//! Point-in-time page reads for the completion detector

use async_trait::async_trait;
use serde::Deserialize;

use crate::cdp::CdpSession;
use crate::detect::SnapshotSource;
use crate::error::Result;

/// One polling instant's view of the page regions the detector compares.
/// Only ever held as a previous/current pair, never retained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DomSnapshot {
    pub response_length: u64,
    #[serde(default)]
    pub stop_button_visible: bool,
    #[serde(default)]
    pub input_populated: bool,
}

/// Reads reply length, the stop-generating affordance and the input box in
/// one evaluation.
const SNAPSHOT_JS: &str = r#"(() => {
    const containers = document.querySelectorAll(
        'model-response, message-content, [class*="model-response"], [class*="response-container"]');
    let length = 0;
    for (const el of containers) length += (el.textContent || '').length;
    if (containers.length === 0) length = (document.body.textContent || '').length;
    const stop = document.querySelector(
        'button[aria-label*="Stop"], button[aria-label*="stop"], [class*="stop-button"]');
    const input = document.querySelector('rich-textarea, [contenteditable="true"], textarea');
    return {
        responseLength: length,
        stopButtonVisible: !!(stop && stop.offsetParent !== null),
        inputPopulated: !!(input && (input.value || input.textContent || '').trim().length > 0)
    };
})()"#;

/// Text of the last reply container, most specific selector first.
const EXTRACT_JS: &str = r#"(() => {
    const REPLY_SELECTORS = [
        'model-response', 'message-content',
        '[class*="model-response"]', '[class*="response-container"]'];
    for (const sel of REPLY_SELECTORS) {
        const els = document.querySelectorAll(sel);
        if (els.length > 0) {
            const el = els[els.length - 1];
            return (el.textContent || el.innerText || '').trim();
        }
    }
    return '';
})()"#;

/// Live snapshot source backed by the command dispatcher.
pub struct PageProbe<'a> {
    session: &'a CdpSession,
}

impl<'a> PageProbe<'a> {
    pub fn new(session: &'a CdpSession) -> Self {
        Self { session }
    }
}

#[async_trait]
impl SnapshotSource for PageProbe<'_> {
    async fn snapshot(&mut self) -> Result<DomSnapshot> {
        let value = self.session.evaluate(SNAPSHOT_JS).await?;
        Ok(serde_json::from_value(value)?)
    }

    async fn final_text(&mut self) -> Result<String> {
        let value = self.session.evaluate(EXTRACT_JS).await?;
        Ok(value.as_str().unwrap_or_default().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_parses_probe_payload() {
        let payload = serde_json::json!({
            "responseLength": 42,
            "stopButtonVisible": true,
            "inputPopulated": false
        });
        let snapshot: DomSnapshot = serde_json::from_value(payload).unwrap();
        assert_eq!(snapshot.response_length, 42);
        assert!(snapshot.stop_button_visible);
        assert!(!snapshot.input_populated);
    }

    #[test]
    fn missing_flags_default_to_false() {
        let payload = serde_json::json!({ "responseLength": 0 });
        let snapshot: DomSnapshot = serde_json::from_value(payload).unwrap();
        assert!(!snapshot.stop_button_visible);
        assert!(!snapshot.input_populated);
    }
}
