//! Email channel — configuration and the outbound SMTP send path.
//!
//! Inbound retrieval lives in `imap` and `email_poller`. Every successful
//! send is recorded as an `OUTGOING` interaction.

use std::sync::{Arc, LazyLock};
use std::time::Duration;

use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Message, SmtpTransport, Transport};
use regex::Regex;
use secrecy::{ExposeSecret, SecretString};
use tracing::{info, warn};

use crate::config::{env_or, env_parse};
use crate::error::{ConfigError, SendError};
use crate::store::{Direction, InteractionLog};

// ── Configuration ───────────────────────────────────────────────────

/// Email configuration, built from environment variables.
#[derive(Debug, Clone)]
pub struct EmailConfig {
    pub imap_host: String,
    pub imap_port: u16,
    pub smtp_host: String,
    pub smtp_port: u16,
    pub username: String,
    pub password: SecretString,
    pub from_address: String,
    pub poll_interval: Duration,
    pub stop_grace: Duration,
}

impl EmailConfig {
    /// Build config from environment variables.
    /// Returns `Ok(None)` if `EMAIL_USERNAME` is not set (email disabled).
    pub fn from_env() -> Result<Option<Self>, ConfigError> {
        let Ok(username) = std::env::var("EMAIL_USERNAME") else {
            return Ok(None);
        };
        let password = std::env::var("EMAIL_PASSWORD")
            .map_err(|_| ConfigError::MissingEnvVar("EMAIL_PASSWORD".into()))?;

        let imap_host = env_or("EMAIL_IMAP_HOST", "imap.gmail.com");
        let smtp_host = env_or("EMAIL_SMTP_HOST", &imap_host.replace("imap", "smtp"));
        let from_address = env_or("EMAIL_FROM_ADDRESS", &username);

        Ok(Some(Self {
            imap_port: env_parse("EMAIL_IMAP_PORT", 993)?,
            smtp_port: env_parse("EMAIL_SMTP_PORT", 587)?,
            poll_interval: Duration::from_secs(env_parse("EMAIL_POLL_INTERVAL_SECS", 30)?),
            stop_grace: Duration::from_secs(env_parse("EMAIL_STOP_GRACE_SECS", 5)?),
            imap_host,
            smtp_host,
            username,
            password: SecretString::from(password),
            from_address,
        }))
    }
}

// ── Outgoing email ──────────────────────────────────────────────────

/// An email to send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingEmail {
    pub to: String,
    pub cc: Vec<String>,
    pub subject: String,
    pub body: String,
}

impl OutgoingEmail {
    pub fn new(to: impl Into<String>, subject: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            to: to.into(),
            cc: Vec::new(),
            subject: subject.into(),
            body: body.into(),
        }
    }

    pub fn with_cc(mut self, cc: Vec<String>) -> Self {
        self.cc = cc;
        self
    }
}

static ADDRESS: LazyLock<Regex> =
    LazyLock::new(|| {
        Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").expect("static address pattern")
    });

/// Loose syntactic address check (`local@domain.tld`).
pub fn is_valid_address(address: &str) -> bool {
    ADDRESS.is_match(address)
}

/// Blocking transport for a single send attempt.
pub trait MailTransport: Send + Sync {
    fn send(&self, from: &str, email: &OutgoingEmail) -> Result<(), SendError>;
}

/// SMTP transport via lettre (STARTTLS relay).
pub struct SmtpMailTransport {
    transport: SmtpTransport,
}

impl SmtpMailTransport {
    pub fn new(config: &EmailConfig) -> Result<Self, SendError> {
        let creds = Credentials::new(
            config.username.clone(),
            config.password.expose_secret().to_string(),
        );
        let transport = SmtpTransport::starttls_relay(&config.smtp_host)
            .map_err(|e| SendError::Transport(format!("SMTP relay error: {e}")))?
            .port(config.smtp_port)
            .credentials(creds)
            .build();
        Ok(Self { transport })
    }

    /// Connect and authenticate without sending anything.
    pub fn verify(&self) -> Result<(), SendError> {
        match self.transport.test_connection() {
            Ok(true) => Ok(()),
            Ok(false) => Err(SendError::Transport("SMTP server refused connection".into())),
            Err(e) => Err(SendError::Transport(e.to_string())),
        }
    }
}

impl MailTransport for SmtpMailTransport {
    fn send(&self, from: &str, email: &OutgoingEmail) -> Result<(), SendError> {
        let message = build_message(from, email)?;
        self.transport
            .send(&message)
            .map(|_| ())
            .map_err(|e| SendError::Transport(format!("SMTP send failed: {e}")))
    }
}

fn parse_mailbox(address: &str) -> Result<Mailbox, SendError> {
    address
        .parse()
        .map_err(|e| SendError::InvalidAddress(format!("{address}: {e}")))
}

fn build_message(from: &str, email: &OutgoingEmail) -> Result<Message, SendError> {
    let mut builder = Message::builder()
        .from(parse_mailbox(from)?)
        .to(parse_mailbox(&email.to)?)
        .subject(email.subject.as_str());
    for cc in &email.cc {
        builder = builder.cc(parse_mailbox(cc)?);
    }
    builder
        .body(email.body.clone())
        .map_err(|e| SendError::Build(e.to_string()))
}

// ── Sender ──────────────────────────────────────────────────────────

/// Retry schedule for outbound sends: exponential, clamped.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub min_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            min_backoff: Duration::from_secs(4),
            max_backoff: Duration::from_secs(60),
        }
    }
}

impl RetryPolicy {
    /// Wait before retry number `attempt` (1-based count of failures so far).
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.min_backoff
            .saturating_mul(factor)
            .min(self.max_backoff)
    }
}

/// Outbound send path: validate, send with retry, record the interaction.
pub struct EmailSender {
    from_address: String,
    transport: Arc<dyn MailTransport>,
    log: Arc<InteractionLog>,
    retry: RetryPolicy,
}

impl EmailSender {
    pub fn new(
        from_address: impl Into<String>,
        transport: Arc<dyn MailTransport>,
        log: Arc<InteractionLog>,
    ) -> Self {
        Self {
            from_address: from_address.into(),
            transport,
            log,
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Send an email. Returns the recipient on success.
    pub async fn send(&self, email: OutgoingEmail) -> Result<String, SendError> {
        if !is_valid_address(&email.to) {
            warn!(recipient = %email.to, "Invalid email address");
            return Err(SendError::InvalidAddress(email.to));
        }

        let email = Arc::new(email);
        let mut attempt = 0;
        loop {
            attempt += 1;
            let transport = Arc::clone(&self.transport);
            let from = self.from_address.clone();
            let outgoing = Arc::clone(&email);
            let result = tokio::task::spawn_blocking(move || transport.send(&from, &outgoing))
                .await
                .unwrap_or_else(|e| Err(SendError::Transport(format!("send task panicked: {e}"))));

            match result {
                Ok(()) => break,
                // Malformed input will not improve on retry.
                Err(e @ (SendError::InvalidAddress(_) | SendError::Build(_))) => return Err(e),
                Err(e) if attempt >= self.retry.max_attempts => {
                    return Err(SendError::Exhausted {
                        recipient: email.to.clone(),
                        attempts: attempt,
                        reason: e.to_string(),
                    });
                }
                Err(e) => {
                    let wait = self.retry.backoff(attempt);
                    warn!(
                        recipient = %email.to,
                        attempt,
                        wait_secs = wait.as_secs_f32(),
                        error = %e,
                        "Email send failed, retrying"
                    );
                    tokio::time::sleep(wait).await;
                }
            }
        }

        self.log
            .append(&email.to, Direction::Outgoing, &email.subject, &email.body)
            .await;
        info!(recipient = %email.to, "Email sent");
        Ok(email.to.clone())
    }
}

// ── Tests ───────────────────────────────────────────────────────────
