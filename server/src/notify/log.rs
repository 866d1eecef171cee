use async_trait::async_trait;

use super::{action_link, DeliveryError, EmailNotifier, TemplateKind};

/// Stand-in used when no `[smtp]` section is configured: the action link is
/// written to the log so a developer can follow it by hand.
pub struct LogNotifier {
    frontend_url: String,
}

impl LogNotifier {
    pub fn new(frontend_url: &str) -> Self {
        Self {
            frontend_url: frontend_url.to_string(),
        }
    }
}

#[async_trait]
impl EmailNotifier for LogNotifier {
    async fn send(&self, to: &str, kind: TemplateKind, token: &str) -> Result<(), DeliveryError> {
        let link = action_link(&self.frontend_url, kind, token)?;
        tracing::info!(to, ?kind, %link, "SMTP not configured; email not delivered");
        Ok(())
    }
}
