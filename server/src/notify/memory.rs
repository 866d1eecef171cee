use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use super::{DeliveryError, EmailNotifier, TemplateKind};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentEmail {
    pub to: String,
    pub kind: TemplateKind,
    pub token: String,
}

/// Records every email instead of sending it. Can be told to fail.
#[derive(Debug, Default)]
pub struct MemoryNotifier {
    sent: Mutex<Vec<SentEmail>>,
    failing: AtomicBool,
}

impl MemoryNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn sent(&self) -> Vec<SentEmail> {
        self.sent.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Most recent token sent to `to` for `kind`.
    pub fn last_token(&self, to: &str, kind: TemplateKind) -> Option<String> {
        self.sent()
            .into_iter()
            .rev()
            .find(|m| m.to == to && m.kind == kind)
            .map(|m| m.token)
    }
}

#[async_trait]
impl EmailNotifier for MemoryNotifier {
    async fn send(&self, to: &str, kind: TemplateKind, token: &str) -> Result<(), DeliveryError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(DeliveryError("simulated delivery failure".into()));
        }
        self.sent
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(SentEmail {
                to: to.to_string(),
                kind,
                token: token.to_string(),
            });
        Ok(())
    }
}
