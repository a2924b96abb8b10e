use std::sync::Arc;

use anyhow::Result;
use tracing::{info, warn};

use lighthouse_client::{AuditOutcome, LighthouseFlags};

use crate::traits::{Auditor, BrowserLauncher};

/// Runs one audit in a fresh browser. The browser is closed on every path
/// once launched; an audit error wins over a close error.
pub struct AuditRunner {
    launcher: Arc<dyn BrowserLauncher>,
    auditor: Arc<dyn Auditor>,
}

impl AuditRunner {
    pub fn new(launcher: Arc<dyn BrowserLauncher>, auditor: Arc<dyn Auditor>) -> Self {
        Self { launcher, auditor }
    }

    pub async fn run(&self, id: &str, url: &str, flags: &LighthouseFlags) -> Result<AuditOutcome> {
        info!(subject = id, url, "Starting browser");
        let browser = self.launcher.launch().await?;
        let port = browser.debugging_port();
        info!(subject = id, port, "Browser ready, running audit");

        let audit = self.auditor.audit(url, port, flags).await;
        if audit.is_ok() {
            info!(subject = id, "Audit done");
        }

        match browser.close().await {
            Ok(()) => info!(subject = id, "Browser closed"),
            Err(e) if audit.is_err() => warn!(subject = id, error = %e, "Failed to close browser"),
            Err(e) => {
                warn!(subject = id, error = %e, "Failed to close browser");
                return Err(e);
            }
        }

        audit
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{MockAuditor, MockBrowserLauncher};

    #[tokio::test]
    async fn audits_through_the_launched_port_and_closes() {
        let launcher = Arc::new(MockBrowserLauncher::new(9333));
        let auditor = Arc::new(MockAuditor::new());
        let runner = AuditRunner::new(launcher.clone(), auditor.clone());

        let outcome = runner
            .run("ebay", "https://www.ebay.com/", &LighthouseFlags::default())
            .await
            .unwrap();

        assert!(outcome.lhr.get("fetchTime").is_some());
        assert_eq!(auditor.calls(), vec![("https://www.ebay.com/".to_string(), 9333)]);
        assert_eq!(launcher.launched(), 1);
        assert_eq!(launcher.closed(), 1);
    }

    #[tokio::test]
    async fn audit_failure_still_closes_browser() {
        let launcher = Arc::new(MockBrowserLauncher::new(9333));
        let auditor = Arc::new(MockAuditor::new().failing());
        let runner = AuditRunner::new(launcher.clone(), auditor);

        let err = runner
            .run("ebay", "https://www.ebay.com/", &LighthouseFlags::default())
            .await
            .unwrap_err();

        assert!(err.to_string().contains("audit failed"));
        assert_eq!(launcher.closed(), 1);
    }

    #[tokio::test]
    async fn launch_failure_skips_audit() {
        let launcher = Arc::new(MockBrowserLauncher::new(9333).failing());
        let auditor = Arc::new(MockAuditor::new());
        let runner = AuditRunner::new(launcher.clone(), auditor.clone());

        assert!(runner
            .run("ebay", "https://www.ebay.com/", &LighthouseFlags::default())
            .await
            .is_err());
        assert!(auditor.calls().is_empty());
        assert_eq!(launcher.closed(), 0);
    }
}
