//! SMTP delivery via lettre.

use async_trait::async_trait;
use lettre::{
    message::{header::ContentType, Mailbox, MultiPart, SinglePart},
    transport::smtp::authentication::Credentials,
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};

use super::{action_link, DeliveryError, EmailNotifier, TemplateKind};
use crate::config::SmtpConfig;

pub struct SmtpNotifier {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from_mailbox: Mailbox,
    frontend_url: String,
}

/// Subject, HTML body and plain-text body for one email.
pub struct RenderedEmail {
    pub subject: &'static str,
    pub html: String,
    pub text: String,
}

impl SmtpNotifier {
    /// Build the transport. The connection itself is made lazily on first send.
    pub fn new(config: &SmtpConfig, frontend_url: &str) -> Result<Self, DeliveryError> {
        let from_mailbox: Mailbox = format!("{} <{}>", config.from_name, config.from_address)
            .parse()
            .map_err(|e| DeliveryError(format!("invalid from address: {e}")))?;

        let builder = if config.use_tls {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.host)
                .map_err(|e| DeliveryError(format!("smtp relay: {e}")))?
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&config.host)
        };

        let mut builder = builder.port(config.port);
        if let (Some(username), Some(password)) = (&config.username, &config.password) {
            builder = builder.credentials(Credentials::new(username.clone(), password.clone()));
        }

        tracing::debug!(host = %config.host, port = config.port, "SMTP notifier initialized");

        Ok(Self {
            transport: builder.build(),
            from_mailbox,
            frontend_url: frontend_url.to_string(),
        })
    }
}

pub fn render(frontend_url: &str, kind: TemplateKind, token: &str) -> Result<RenderedEmail, DeliveryError> {
    let link = action_link(frontend_url, kind, token)?;
    let email = match kind {
        TemplateKind::VerifyEmail => RenderedEmail {
            subject: "Verify your SecureCloud account",
            html: format!(
                "<h2>Welcome to SecureCloud!</h2>\
                 <p>Please verify your email address to activate your account.</p>\
                 <p><a href=\"{link}\">Verify Email</a></p>\
                 <p>Or paste this link into your browser:</p><p>{link}</p>\
                 <p>This link will expire in 24 hours. If you didn't create an account, please ignore this email.</p>"
            ),
            text: format!(
                "Welcome to SecureCloud!\n\nVerify your email address:\n{link}\n\n\
                 This link will expire in 24 hours. If you didn't create an account, please ignore this email.\n"
            ),
        },
        TemplateKind::PasswordReset => RenderedEmail {
            subject: "Reset your SecureCloud password",
            html: format!(
                "<h2>Password Reset Request</h2>\
                 <p>We received a request to reset your password.</p>\
                 <p><a href=\"{link}\">Reset Password</a></p>\
                 <p>Or paste this link into your browser:</p><p>{link}</p>\
                 <p>This link will expire in 1 hour. If you didn't request a password reset, please ignore this email.</p>"
            ),
            text: format!(
                "Reset your SecureCloud password:\n{link}\n\n\
                 This link will expire in 1 hour. If you didn't request a password reset, please ignore this email.\n"
            ),
        },
    };
    Ok(email)
}

#[async_trait]
impl EmailNotifier for SmtpNotifier {
    async fn send(&self, to: &str, kind: TemplateKind, token: &str) -> Result<(), DeliveryError> {
        let to_mailbox: Mailbox = to
            .parse()
            .map_err(|e| DeliveryError(format!("invalid recipient: {e}")))?;
        let email = render(&self.frontend_url, kind, token)?;

        let message = Message::builder()
            .from(self.from_mailbox.clone())
            .to(to_mailbox)
            .subject(email.subject)
            .multipart(
                MultiPart::alternative()
                    .singlepart(
                        SinglePart::builder()
                            .header(ContentType::TEXT_PLAIN)
                            .body(email.text),
                    )
                    .singlepart(
                        SinglePart::builder()
                            .header(ContentType::TEXT_HTML)
                            .body(email.html),
                    ),
            )
            .map_err(|e| DeliveryError(format!("build message: {e}")))?;

        self.transport
            .send(message)
            .await
            .map_err(|e| DeliveryError(format!("smtp send: {e}")))?;

        tracing::info!(?kind, "email sent");
        Ok(())
    }
}
