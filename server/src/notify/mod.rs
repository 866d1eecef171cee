//! Outbound account email.
//!
//! The vault only needs a fire-and-forget `send`; callers decide whether a
//! [`DeliveryError`] matters. Registration and forgot-password log and move
//! on, resend-verification surfaces it because delivery is the whole point.

pub mod log;
pub mod memory;
pub mod smtp;

use async_trait::async_trait;
use url::Url;

/// Which email to render for a one-time token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TemplateKind {
    VerifyEmail,
    PasswordReset,
}

#[derive(Debug, Clone, thiserror::Error)]
#[error("email delivery failed: {0}")]
pub struct DeliveryError(pub String);

#[async_trait]
pub trait EmailNotifier: Send + Sync {
    async fn send(&self, to: &str, kind: TemplateKind, token: &str) -> Result<(), DeliveryError>;
}

/// Link embedded in an email for `kind`, relative to the web client's base URL.
pub fn action_link(frontend_url: &str, kind: TemplateKind, token: &str) -> Result<String, DeliveryError> {
    let page = match kind {
        TemplateKind::VerifyEmail => "verify-email",
        TemplateKind::PasswordReset => "reset-password",
    };

    let mut link = Url::parse(frontend_url)
        .map_err(|e| DeliveryError(format!("invalid frontend url {frontend_url}: {e}")))?;
    link.path_segments_mut()
        .map_err(|_| DeliveryError(format!("frontend url cannot take a path: {frontend_url}")))?
        .pop_if_empty()
        .push(page);
    link.query_pairs_mut().append_pair("token", token);
    Ok(link.into())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_action_links() {
        assert_eq!(
            action_link("http://localhost:3000/", TemplateKind::VerifyEmail, "abc").unwrap(),
            "http://localhost:3000/verify-email?token=abc"
        );
        assert_eq!(
            action_link("https://vault.example", TemplateKind::PasswordReset, "a b+c&d").unwrap(),
            "https://vault.example/reset-password?token=a+b%2Bc%26d"
        );
        assert_eq!(
            action_link("https://example.com/vault/", TemplateKind::VerifyEmail, "abc").unwrap(),
            "https://example.com/vault/verify-email?token=abc"
        );
    }

    #[test]
    fn test_action_link_rejects_bad_base() {
        assert!(action_link("not a url", TemplateKind::VerifyEmail, "abc").is_err());
        assert!(action_link("mailto:ops@example.com", TemplateKind::VerifyEmail, "abc").is_err());
    }
}
