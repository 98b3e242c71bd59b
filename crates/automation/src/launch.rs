//! Browser launcher
//!
//! Starts Chrome with remote debugging enabled when no instance is already
//! listening, and cleans up the process and throwaway profile on shutdown.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::{Child, Command};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::endpoint::Endpoint;
use crate::error::{AutomationError, Result};

const READY_TIMEOUT: Duration = Duration::from_secs(30);
const READY_POLL: Duration = Duration::from_secs(1);

#[cfg(target_os = "linux")]
const EXECUTABLE_CANDIDATES: &[&str] = &[
    "/usr/bin/google-chrome",
    "/usr/bin/google-chrome-stable",
    "/usr/bin/chromium",
    "/usr/bin/chromium-browser",
    "/snap/bin/chromium",
];

#[cfg(target_os = "macos")]
const EXECUTABLE_CANDIDATES: &[&str] = &[
    "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
    "/Applications/Chromium.app/Contents/MacOS/Chromium",
];

#[cfg(target_os = "windows")]
const EXECUTABLE_CANDIDATES: &[&str] = &[
    r"C:\Program Files\Google\Chrome\Application\chrome.exe",
    r"C:\Program Files (x86)\Google\Chrome\Application\chrome.exe",
];

#[cfg(target_os = "linux")]
const PATH_NAMES: &[&str] = &[
    "google-chrome",
    "google-chrome-stable",
    "chromium",
    "chromium-browser",
];

#[cfg(not(target_os = "linux"))]
const PATH_NAMES: &[&str] = &["chrome", "chromium"];

pub struct ChromeLauncher {
    endpoint: Endpoint,
    user_data_dir: PathBuf,
    /// The profile directory is ours to delete only when we generated it.
    owns_profile: bool,
    keep_on_close: bool,
    profile_created: bool,
    child: Option<Child>,
}

impl ChromeLauncher {
    pub fn new(endpoint: Endpoint, user_data_dir: Option<PathBuf>, keep_on_close: bool) -> Self {
        let (user_data_dir, owns_profile) = match user_data_dir {
            Some(dir) => (dir, false),
            None => (
                std::env::temp_dir().join(format!("gemini-ask-profile-{}", endpoint.port())),
                true,
            ),
        };
        Self {
            endpoint,
            user_data_dir,
            owns_profile,
            keep_on_close,
            profile_created: false,
            child: None,
        }
    }

    /// Ensure a debuggable browser is listening, launching one if needed.
    /// Idempotent; an already-reachable endpoint is left alone.
    pub async fn launch(&mut self, headless: bool, initial_url: Option<&str>) -> Result<()> {
        if self.endpoint.is_reachable().await {
            debug!(port = self.endpoint.port(), "browser already listening");
            return Ok(());
        }

        let executable = find_executable().ok_or_else(|| {
            AutomationError::Launch("no Chrome or Chromium executable found".to_string())
        })?;
        if self.owns_profile && !self.user_data_dir.exists() {
            std::fs::create_dir_all(&self.user_data_dir)?;
            self.profile_created = true;
        }

        let args = self.launch_args(headless, initial_url);
        info!(executable = %executable.display(), port = self.endpoint.port(), headless, "launching browser");
        let child = Command::new(&executable)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(!self.keep_on_close)
            .spawn()
            .map_err(|e| {
                AutomationError::Launch(format!("{}: {e}", executable.display()))
            })?;
        self.child = Some(child);

        self.wait_until_ready().await
    }

    fn launch_args(&self, headless: bool, initial_url: Option<&str>) -> Vec<String> {
        let mut args = vec![
            format!("--remote-debugging-port={}", self.endpoint.port()),
            format!("--user-data-dir={}", self.user_data_dir.display()),
            "--remote-allow-origins=*".to_string(),
            "--no-first-run".to_string(),
            "--no-default-browser-check".to_string(),
            "--disable-background-networking".to_string(),
            "--disable-sync".to_string(),
            "--disable-default-apps".to_string(),
        ];
        if headless {
            args.push("--headless=new".to_string());
            args.push("--disable-gpu".to_string());
        }
        if let Some(url) = initial_url {
            args.push(url.to_string());
        }
        args
    }

    async fn wait_until_ready(&self) -> Result<()> {
        let deadline = Instant::now() + READY_TIMEOUT;
        loop {
            if self.endpoint.is_reachable().await {
                info!(port = self.endpoint.port(), "browser is ready");
                return Ok(());
            }
            if Instant::now() + READY_POLL >= deadline {
                return Err(AutomationError::Launch(format!(
                    "browser did not open port {} within {READY_TIMEOUT:?}",
                    self.endpoint.port()
                )));
            }
            tokio::time::sleep(READY_POLL).await;
        }
    }

    /// Kill the launched process (unless asked to keep it) and remove the
    /// throwaway profile.
    pub async fn shutdown(&mut self) {
        if let Some(mut child) = self.child.take() {
            if self.keep_on_close {
                debug!("leaving launched browser running");
            } else if let Err(e) = child.kill().await {
                warn!(error = %e, "failed to kill launched browser");
            }
        }
        if !self.keep_on_close {
            self.cleanup_profile();
        }
    }

    fn cleanup_profile(&self) {
        if !(self.owns_profile && self.profile_created) {
            return;
        }
        if let Err(e) = std::fs::remove_dir_all(&self.user_data_dir) {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!(path = %self.user_data_dir.display(), error = %e, "failed to remove profile");
            }
        }
    }

    pub fn user_data_dir(&self) -> &Path {
        &self.user_data_dir
    }
}

impl Drop for ChromeLauncher {
    fn drop(&mut self) {
        // The child itself is reaped by kill_on_drop; only the profile
        // needs manual removal here.
        if !self.keep_on_close {
            self.cleanup_profile();
        }
    }
}

fn find_executable() -> Option<PathBuf> {
    for candidate in EXECUTABLE_CANDIDATES {
        let path = PathBuf::from(candidate);
        if path.is_file() {
            return Some(path);
        }
    }
    let path_var = std::env::var_os("PATH")?;
    for dir in std::env::split_paths(&path_var) {
        for name in PATH_NAMES {
            let candidate = dir.join(name);
            if candidate.is_file() {
                return Some(candidate);
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn launch_args_carry_port_and_profile() {
        let launcher = ChromeLauncher::new(Endpoint::new("localhost", 9222), None, false);
        let args = launcher.launch_args(false, Some("https://gemini.google.com"));
        assert!(args.contains(&"--remote-debugging-port=9222".to_string()));
        assert!(args.iter().any(|a| a.starts_with("--user-data-dir=")));
        assert!(args.contains(&"--remote-allow-origins=*".to_string()));
        assert!(args.contains(&"https://gemini.google.com".to_string()));
        assert!(!args.iter().any(|a| a.starts_with("--headless")));
    }

    #[test]
    fn headless_adds_the_headless_switches() {
        let launcher = ChromeLauncher::new(Endpoint::new("localhost", 9222), None, false);
        let args = launcher.launch_args(true, None);
        assert!(args.contains(&"--headless=new".to_string()));
        assert!(args.contains(&"--disable-gpu".to_string()));
    }

    #[test]
    fn explicit_profile_is_never_deleted() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().to_path_buf();
        {
            let launcher =
                ChromeLauncher::new(Endpoint::new("localhost", 60123), Some(path.clone()), false);
            assert!(!launcher.owns_profile);
            launcher.cleanup_profile();
        }
        assert!(path.exists());
    }

    #[test]
    fn generated_profile_is_removed_once_created() {
        let mut launcher = ChromeLauncher::new(Endpoint::new("localhost", 60124), None, false);
        std::fs::create_dir_all(&launcher.user_data_dir).unwrap();
        launcher.profile_created = true;
        let dir = launcher.user_data_dir.clone();
        drop(launcher);
        assert!(!dir.exists());
    }
}
