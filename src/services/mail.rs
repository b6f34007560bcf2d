//! Outbound mail
//!
//! When SMTP is configured, messages go out through a `lettre` STARTTLS
//! relay. Otherwise they are only logged. [`MemoryMailer`] captures
//! messages instead of sending them.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Address, AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use tokio::sync::RwLock;
use tracing::info;

use crate::chakra::{Chakra, Direction};
use crate::config::SmtpConfig;
use crate::error::KarmaError;

pub const REMINDER_SUBJECT: &str = "Moksha Protocol: Karma Reminder";

/// A plain-text message to one recipient
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MailMessage {
    pub to: String,
    pub subject: String,
    pub body: String,
}

impl MailMessage {
    /// Sent to an influencer when someone tags them
    pub fn tag_notification(
        to: &str,
        affected_name: &str,
        chakra: Chakra,
        direction: Direction,
        site_url: &str,
    ) -> Self {
        Self {
            to: to.to_string(),
            subject: format!(
                "{} tagged you as putting {} in their {} chakra using the Moksha Protocol and you started earning {} karma.",
                affected_name,
                chakra.label(direction),
                chakra,
                direction
            ),
            body: format!("Review your chakra karma balance by signing in at {}.", site_url),
        }
    }

    /// Periodic reminder about outstanding negative karma
    pub fn karma_reminder(to: &str, units: i32, chakra: Chakra, site_url: &str) -> Self {
        Self {
            to: to.to_string(),
            subject: REMINDER_SUBJECT.to_string(),
            body: format!(
                "Reminder: you have {} outstanding karma related to {}. Would you like to resolve it using the Moksha Protocol?\n\nJoin now at {} to resolve your negative karma.",
                units.unsigned_abs(),
                chakra,
                site_url
            ),
        }
    }
}

/// Something that can deliver a [`MailMessage`]
#[async_trait]
pub trait MailDispatcher: Send + Sync {
    fn name(&self) -> &str;

    async fn send(&self, message: &MailMessage) -> Result<(), KarmaError>;
}

/// SMTP delivery through a STARTTLS relay
pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
}

impl SmtpMailer {
    /// Build the transport once; connections are pooled by lettre
    pub fn from_config(config: &SmtpConfig) -> Result<Self, KarmaError> {
        let address: Address = config.sender_email.parse().map_err(|e| {
            KarmaError::Config(format!("invalid sender_email '{}': {}", config.sender_email, e))
        })?;
        let from = Mailbox::new(Some(config.sender_name.clone()), address);

        let creds = Credentials::new(config.username.clone(), config.password.clone());
        let transport = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.host)
            .map_err(|e| KarmaError::Mail(format!("SMTP transport error: {}", e)))?
            .port(config.port)
            .credentials(creds)
            .build();

        Ok(Self { transport, from })
    }
}

#[async_trait]
impl MailDispatcher for SmtpMailer {
    fn name(&self) -> &str {
        "smtp"
    }

    async fn send(&self, message: &MailMessage) -> Result<(), KarmaError> {
        let to: Mailbox = message
            .to
            .parse()
            .map_err(|e| KarmaError::Mail(format!("invalid recipient '{}': {}", message.to, e)))?;

        let email = Message::builder()
            .from(self.from.clone())
            .to(to)
            .subject(message.subject.as_str())
            .header(ContentType::TEXT_PLAIN)
            .body(message.body.clone())
            .map_err(|e| KarmaError::Mail(format!("failed to build email: {}", e)))?;

        self.transport
            .send(email)
            .await
            .map_err(|e| KarmaError::Mail(format!("email send failed: {}", e)))?;
        Ok(())
    }
}

/// Logs messages instead of sending them
pub struct LogMailer;

#[async_trait]
impl MailDispatcher for LogMailer {
    fn name(&self) -> &str {
        "log"
    }

    async fn send(&self, message: &MailMessage) -> Result<(), KarmaError> {
        info!(to = %message.to, subject = %message.subject, "Mail (not sent, SMTP not configured)");
        Ok(())
    }
}

/// Captures messages in memory; can be told to fail for given recipients
#[derive(Default)]
pub struct MemoryMailer {
    sent: Arc<RwLock<Vec<MailMessage>>>,
    failing: RwLock<HashSet<String>>,
}

impl MemoryMailer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every send to `address` fails from now on
    pub async fn fail_for(&self, address: &str) {
        self.failing.write().await.insert(address.to_string());
    }

    pub async fn sent(&self) -> Vec<MailMessage> {
        self.sent.read().await.clone()
    }

    pub async fn sent_to(&self, address: &str) -> Vec<MailMessage> {
        self.sent
            .read()
            .await
            .iter()
            .filter(|m| m.to == address)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl MailDispatcher for MemoryMailer {
    fn name(&self) -> &str {
        "memory"
    }

    async fn send(&self, message: &MailMessage) -> Result<(), KarmaError> {
        if self.failing.read().await.contains(&message.to) {
            return Err(KarmaError::Mail(format!("delivery to {} refused", message.to)));
        }
        self.sent.write().await.push(message.clone());
        Ok(())
    }
}

/// SMTP when configured, logging otherwise
pub fn mailer_from_config(smtp: Option<&SmtpConfig>) -> Result<Arc<dyn MailDispatcher>, KarmaError> {
    match smtp {
        Some(config) => Ok(Arc::new(SmtpMailer::from_config(config)?)),
        None => Ok(Arc::new(LogMailer)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tag_notification_text() {
        let message = MailMessage::tag_notification(
            "grace@example.com",
            "Ada Lovelace",
            Chakra::Muladhara,
            Direction::Negative,
            "https://moksha.example",
        );
        assert_eq!(
            message.subject,
            "Ada Lovelace tagged you as putting Fear in their Muladhara chakra using the Moksha Protocol and you started earning negative karma."
        );
        assert_eq!(message.body, "Review your chakra karma balance by signing in at https://moksha.example.");
    }

    #[test]
    fn test_reminder_text() {
        let message = MailMessage::karma_reminder("grace@example.com", 12, Chakra::Anahata, "https://moksha.example");
        assert_eq!(message.subject, REMINDER_SUBJECT);
        assert!(message.body.starts_with("Reminder: you have 12 outstanding karma related to Anahata."));
        assert!(message.body.ends_with("\n\nJoin now at https://moksha.example to resolve your negative karma."));
    }

    #[tokio::test]
    async fn test_memory_mailer_failures() {
        let mailer = MemoryMailer::new();
        mailer.fail_for("bad@example.com").await;

        let ok = MailMessage::karma_reminder("good@example.com", 1, Chakra::Ajna, "https://x");
        let bad = MailMessage::karma_reminder("bad@example.com", 1, Chakra::Ajna, "https://x");

        mailer.send(&ok).await.unwrap();
        assert!(matches!(mailer.send(&bad).await, Err(KarmaError::Mail(_))));
        assert_eq!(mailer.sent().await, vec![ok]);
    }

    #[test]
    fn test_smtp_mailer_rejects_bad_sender() {
        let config = SmtpConfig {
            host: "smtp.example.com".into(),
            port: 587,
            username: "u".into(),
            password: "p".into(),
            sender_email: "not-an-address".into(),
            sender_name: "Moksha Protocol".into(),
        };
        assert!(matches!(SmtpMailer::from_config(&config), Err(KarmaError::Config(_))));
    }
}
