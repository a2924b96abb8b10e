// Headless Chromium with a remote-debugging endpoint that Lighthouse attaches to.

use std::process::Stdio;

use tempfile::TempDir;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};
use tracing::{debug, info};

use crate::error::{LighthouseError, Result};

const DEVTOOLS_PREFIX: &str = "DevTools listening on ";

pub struct ChromeLauncher {
    binary: String,
}

impl ChromeLauncher {
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    /// Uses `CHROME_BIN` when set, `chromium` otherwise.
    pub fn from_env() -> Self {
        Self::new(std::env::var("CHROME_BIN").unwrap_or_else(|_| "chromium".to_string()))
    }

    /// Spawn a fresh browser with its own profile directory and wait until it
    /// reports its DevTools websocket.
    pub async fn launch(&self) -> Result<ChromeInstance> {
        let profile = tempfile::tempdir()?;

        let mut child = Command::new(&self.binary)
            .args([
                "--headless",
                "--no-sandbox",
                "--disable-gpu",
                "--disable-dev-shm-usage",
                "--remote-debugging-port=0",
                &format!("--user-data-dir={}", profile.path().display()),
                "about:blank",
            ])
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| LighthouseError::Launch(format!("{}: {e}", self.binary)))?;

        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| LighthouseError::Launch("stderr was not captured".to_string()))?;
        let mut lines = BufReader::new(stderr).lines();

        let (ws_endpoint, port) = loop {
            match lines.next_line().await? {
                Some(line) => match parse_devtools_line(&line) {
                    Some(found) => break found,
                    None => debug!(line = line.as_str(), "chrome stderr"),
                },
                None => {
                    let _ = child.kill().await;
                    return Err(LighthouseError::NoDevToolsEndpoint);
                }
            }
        };

        // Chrome blocks once the stderr pipe fills up, so keep reading it.
        tokio::spawn(async move {
            while let Ok(Some(line)) = lines.next_line().await {
                debug!(line = line.as_str(), "chrome stderr");
            }
        });

        info!(port, ws_endpoint = ws_endpoint.as_str(), "Chrome ready");

        Ok(ChromeInstance {
            child,
            port,
            _profile: profile,
        })
    }
}

/// A running browser. Dropping it kills the process; `close` also reaps it.
pub struct ChromeInstance {
    child: Child,
    port: u16,
    _profile: TempDir,
}

impl ChromeInstance {
    pub fn port(&self) -> u16 {
        self.port
    }

    pub async fn close(mut self) -> Result<()> {
        self.child.kill().await?;
        Ok(())
    }
}

/// Extract the websocket URL and its port from Chrome's startup banner.
pub(crate) fn parse_devtools_line(line: &str) -> Option<(String, u16)> {
    let endpoint = line.split_once(DEVTOOLS_PREFIX)?.1.trim();
    let parsed = url::Url::parse(endpoint).ok()?;
    let port = parsed.port()?;
    Some((endpoint.to_string(), port))
}
