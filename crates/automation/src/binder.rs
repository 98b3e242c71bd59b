//! Target discovery and attachment
//!
//! Lists the browser's open pages through the transport and binds the one
//! matching the target application.

use std::sync::Arc;

use crate::cdp::protocol::TargetInfo;
use crate::cdp::{CdpClient, CdpSession};
use crate::error::{AutomationError, Result};

/// Reference to a remote page, as seen at discovery time. Goes stale if the
/// page navigates away or closes; stale use fails on the session, never
/// silently.
#[derive(Debug, Clone)]
pub struct PageTarget {
    pub target_id: String,
    pub title: String,
    pub url: String,
}

/// Finds the page whose URL or title contains `pattern`.
///
/// Tie-break among multiple matches: first match in protocol listing order.
/// The protocol exposes no activation timestamps, so listing order is the
/// only stable key; identical input ordering always yields the same pick.
pub async fn discover_target(client: &Arc<CdpClient>, pattern: &str) -> Result<PageTarget> {
    let result = client.send("Target.getTargets", None, None).await?;
    let infos = result.get("targetInfos").ok_or_else(|| {
        AutomationError::InvalidResponse("missing targetInfos".to_string())
    })?;
    let infos: Vec<TargetInfo> = serde_json::from_value(infos.clone())?;
    pick_target(infos, pattern)
        .ok_or_else(|| AutomationError::TargetNotFound(pattern.to_string()))
}

fn pick_target(targets: Vec<TargetInfo>, pattern: &str) -> Option<PageTarget> {
    targets
        .into_iter()
        .filter(|t| t.target_type == "page")
        .find(|t| t.url.contains(pattern) || t.title.contains(pattern))
        .map(|t| PageTarget {
            target_id: t.target_id,
            title: t.title,
            url: t.url,
        })
}

/// Attach the transport to a discovered page. A failure here is distinct
/// from not finding the target at all.
pub async fn attach(client: Arc<CdpClient>, target: &PageTarget) -> Result<CdpSession> {
    CdpSession::attach(client, target.target_id.clone()).await
}

#[cfg(test)]
mod tests {
    use super::*;

    fn target(id: &str, target_type: &str, title: &str, url: &str) -> TargetInfo {
        TargetInfo {
            target_id: id.to_string(),
            target_type: target_type.to_string(),
            title: title.to_string(),
            url: url.to_string(),
            attached: false,
        }
    }

    #[test]
    fn picks_first_match_in_listing_order() {
        let targets = vec![
            target("t1", "page", "Gemini", "https://gemini.google.com/app"),
            target("t2", "page", "Gemini", "https://gemini.google.com/app/abc"),
        ];
        let picked = pick_target(targets.clone(), "gemini.google.com").unwrap();
        assert_eq!(picked.target_id, "t1");

        // Same input, same pick - no run-to-run variance.
        let again = pick_target(targets, "gemini.google.com").unwrap();
        assert_eq!(again.target_id, "t1");
    }

    #[test]
    fn non_page_targets_are_ignored() {
        let targets = vec![
            target("sw", "service_worker", "", "https://gemini.google.com/sw.js"),
            target("t1", "page", "Gemini", "https://gemini.google.com/app"),
        ];
        let picked = pick_target(targets, "gemini.google.com").unwrap();
        assert_eq!(picked.target_id, "t1");
    }

    #[test]
    fn matches_on_title_when_url_does_not() {
        let targets = vec![target("t1", "page", "Gemini chat", "https://example.com")];
        assert!(pick_target(targets, "Gemini").is_some());
    }

    #[test]
    fn no_match_yields_none() {
        let targets = vec![target("t1", "page", "Example", "https://example.com")];
        assert!(pick_target(targets, "gemini.google.com").is_none());
    }
}
