//! Keyboard driver for the question input box
//!
//! Finds the input element, types the question key by key and submits with
//! Enter. Synthetic key events go through the protocol rather than DOM
//! mutation so the page's own listeners fire.

use serde_json::json;
use std::time::Duration;
use tracing::{debug, trace};

use crate::cdp::CdpSession;
use crate::error::{AutomationError, Result};

/// Candidate selectors for the question box, most specific first. The first
/// one present on the page wins.
const INPUT_SELECTORS: &[&str] = &[
    r#"[role="textbox"]"#,
    r#"rich-textarea [contenteditable="true"]"#,
    r#"[contenteditable="true"]"#,
    "rich-textarea",
    "textarea",
    r#"input[type="text"]"#,
];

pub struct InputDriver<'a> {
    session: &'a CdpSession,
    typing_delay: Duration,
}

impl<'a> InputDriver<'a> {
    pub fn new(session: &'a CdpSession, typing_delay: Duration) -> Self {
        Self {
            session,
            typing_delay,
        }
    }

    /// Locate, clear and focus the input box. Exhausting every selector is
    /// an element-not-found failure, the signal that page markup drifted.
    pub async fn focus_input(&self) -> Result<()> {
        for selector in INPUT_SELECTORS {
            let quoted = serde_json::to_string(selector)?;
            let script = format!(
                r#"(() => {{
                    const el = document.querySelector({quoted});
                    if (!el) return false;
                    if (el.isContentEditable) el.textContent = '';
                    else if ('value' in el) el.value = '';
                    el.focus();
                    return true;
                }})()"#
            );
            if self.session.evaluate(&script).await? == json!(true) {
                debug!(selector, "focused question input");
                return Ok(());
            }
            trace!(selector, "input selector not present");
        }
        Err(AutomationError::ElementNotFound(
            "question input box".to_string(),
        ))
    }

    /// Type `text` one character at a time.
    pub async fn type_text(&self, text: &str) -> Result<()> {
        for ch in text.chars() {
            self.session
                .dispatch_key_event(json!({
                    "type": "char",
                    "text": ch.to_string(),
                }))
                .await?;
            if !self.typing_delay.is_zero() {
                tokio::time::sleep(self.typing_delay).await;
            }
        }
        Ok(())
    }

    /// Press Enter. keyDown and keyUp are both required or the page's
    /// submit handler never fires.
    pub async fn submit(&self) -> Result<()> {
        for event_type in ["keyDown", "keyUp"] {
            self.session
                .dispatch_key_event(json!({
                    "type": event_type,
                    "key": "Enter",
                    "code": "Enter",
                    "windowsVirtualKeyCode": 13,
                    "nativeVirtualKeyCode": 13,
                }))
                .await?;
        }
        debug!("submitted question");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn selector_order_prefers_specific_over_generic() {
        assert_eq!(INPUT_SELECTORS[0], r#"[role="textbox"]"#);
        let textarea = INPUT_SELECTORS.iter().position(|s| *s == "textarea");
        let rich = INPUT_SELECTORS
            .iter()
            .position(|s| *s == "rich-textarea");
        assert!(rich < textarea);
    }

    #[test]
    fn selectors_survive_json_quoting() {
        for selector in INPUT_SELECTORS {
            let quoted = serde_json::to_string(selector).unwrap();
            let back: String = serde_json::from_str(&quoted).unwrap();
            assert_eq!(back, *selector);
        }
    }
}
