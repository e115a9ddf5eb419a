//! # Outbound Mail
//!
//! Handlers never send mail inline. They render a [`Notification`] into an
//! [`Email`] and hand it to the [`MailDispatcher`], which queues it on a
//! bounded channel. A single worker task drains the queue and runs each
//! delivery as its own task in a `JoinSet`, retrying failed sends under a
//! fixed [`RetryPolicy`].
//!
//! On shutdown the worker closes the queue, delivers whatever was already
//! queued and waits for in-flight deliveries before returning.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;
use tokio::sync::{mpsc, watch};
use tokio::task::{JoinError, JoinHandle, JoinSet};

#[derive(Error, Debug)]
pub enum MailError {
    #[error("mail transport failed: {0}")]
    Transport(String),

    #[error("mail relay rejected message with status {0}")]
    Rejected(u16),
}

/// A rendered message ready for delivery.
#[derive(Clone, PartialEq, Eq)]
pub struct Email {
    pub to: String,
    pub subject: String,
    pub body: String,
}

/// Bodies carry one-time tokens, so `Debug` omits them.
impl fmt::Debug for Email {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Email")
            .field("to", &self.to)
            .field("subject", &self.subject)
            .field("body", &"[REDACTED]")
            .finish()
    }
}

/// Account notifications the API sends.
#[derive(Debug, Clone)]
pub enum Notification<'a> {
    Welcome { username: &'a str, activation_token: &'a str },
    ActivationReminder { username: &'a str, activation_token: &'a str },
    PasswordReset { username: &'a str, reset_token: &'a str },
}

impl Notification<'_> {
    pub fn render(&self, to: &str) -> Email {
        let (subject, body) = match self {
            Self::Welcome {
                username,
                activation_token,
            } => (
                "Welcome to Moviescreen!",
                format!(
                    "Hi {username},\n\n\
                     Thanks for signing up for a Moviescreen account.\n\n\
                     To activate your account, send a PUT request to /v1/users/activate with:\n\n\
                     {{\"token\": \"{activation_token}\"}}\n\n\
                     This token is valid for 2 days and can only be used once.\n"
                ),
            ),
            Self::ActivationReminder {
                username,
                activation_token,
            } => (
                "Activate your Moviescreen account",
                format!(
                    "Hi {username},\n\n\
                     Here is a new activation token. Any earlier token no longer works.\n\n\
                     {{\"token\": \"{activation_token}\"}}\n\n\
                     This token is valid for 2 days and can only be used once.\n"
                ),
            ),
            Self::PasswordReset {
                username,
                reset_token,
            } => (
                "Reset your Moviescreen password",
                format!(
                    "Hi {username},\n\n\
                     To reset your password, send a PUT request to /v1/users/update-password with:\n\n\
                     {{\"password\": \"your new password\", \"token\": \"{reset_token}\"}}\n\n\
                     This token is valid for 15 minutes and can only be used once.\n"
                ),
            ),
        };

        Email {
            to: to.to_string(),
            subject: subject.to_string(),
            body,
        }
    }
}

/// A delivery backend.
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, email: &Email) -> Result<(), MailError>;
}

/// Development mailer: logs the envelope and discards the message.
#[derive(Debug, Default)]
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, email: &Email) -> Result<(), MailError> {
        tracing::info!(to = %email.to, subject = %email.subject, "mail delivered to log");
        Ok(())
    }
}

/// Posts messages as JSON to an HTTP mail relay.
#[derive(Debug, Clone)]
pub struct RelayMailer {
    client: reqwest::Client,
    url: String,
    sender: String,
}

#[derive(Serialize)]
struct RelayMessage<'a> {
    from: &'a str,
    to: &'a str,
    subject: &'a str,
    text: &'a str,
}

impl RelayMailer {
    pub fn new(url: impl Into<String>, sender: impl Into<String>) -> Result<Self, MailError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(5))
            .build()
            .map_err(|e| MailError::Transport(e.to_string()))?;
        Ok(Self {
            client,
            url: url.into(),
            sender: sender.into(),
        })
    }
}

#[async_trait]
impl Mailer for RelayMailer {
    async fn send(&self, email: &Email) -> Result<(), MailError> {
        let response = self
            .client
            .post(&self.url)
            .json(&RelayMessage {
                from: &self.sender,
                to: &email.to,
                subject: &email.subject,
                text: &email.body,
            })
            .send()
            .await
            .map_err(|e| MailError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(MailError::Rejected(status.as_u16()));
        }
        Ok(())
    }
}

/// Fixed-backoff retry schedule for deliveries.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            backoff: Duration::from_millis(500),
        }
    }
}

/// Handle used by request handlers to enqueue mail.
#[derive(Debug, Clone)]
pub struct MailDispatcher {
    tx: mpsc::Sender<Email>,
}

/// Receiving end of the mail queue, consumed by [`spawn_worker`].
#[derive(Debug)]
pub struct MailQueue {
    rx: mpsc::Receiver<Email>,
}

impl MailDispatcher {
    /// Create a dispatcher and its queue with room for `capacity` messages.
    pub fn channel(capacity: usize) -> (Self, MailQueue) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx }, MailQueue { rx })
    }

    /// Enqueue without waiting. A full or closed queue drops the message
    /// with a warning; the request that triggered it still succeeds.
    pub fn dispatch(&self, email: Email) {
        if let Err(err) = self.tx.try_send(email) {
            let (reason, email) = match err {
                mpsc::error::TrySendError::Full(email) => ("queue full", email),
                mpsc::error::TrySendError::Closed(email) => ("queue closed", email),
            };
            tracing::warn!(to = %email.to, subject = %email.subject, reason, "mail dropped");
        }
    }
}

async fn deliver(mailer: Arc<dyn Mailer>, email: Email, policy: RetryPolicy) -> bool {
    for attempt in 1..=policy.attempts {
        match mailer.send(&email).await {
            Ok(()) => {
                tracing::debug!(to = %email.to, attempt, "mail sent");
                return true;
            }
            Err(e) => {
                tracing::warn!(to = %email.to, attempt, error = %e, "mail delivery failed");
                if attempt < policy.attempts {
                    tokio::time::sleep(policy.backoff).await;
                }
            }
        }
    }
    tracing::error!(
        to = %email.to,
        subject = %email.subject,
        attempts = policy.attempts,
        "giving up on mail delivery"
    );
    false
}

fn log_join(result: Result<bool, JoinError>) {
    if let Err(e) = result {
        tracing::error!(error = %e, "mail delivery task failed");
    }
}

/// Start the mail worker. It runs until `shutdown` flips to true (or its
/// sender is dropped) or every dispatcher is gone, then drains.
pub fn spawn_worker(
    queue: MailQueue,
    mailer: Arc<dyn Mailer>,
    policy: RetryPolicy,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    let MailQueue { mut rx } = queue;

    tokio::spawn(async move {
        let mut inflight = JoinSet::new();

        loop {
            tokio::select! {
                next = rx.recv() => match next {
                    Some(email) => {
                        inflight.spawn(deliver(mailer.clone(), email, policy));
                    }
                    None => break,
                },
                Some(joined) = inflight.join_next(), if !inflight.is_empty() => log_join(joined),
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        rx.close();
        while let Some(email) = rx.recv().await {
            inflight.spawn(deliver(mailer.clone(), email, policy));
        }
        let pending = inflight.len();
        if pending > 0 {
            tracing::info!(pending, "waiting for mail deliveries to finish");
        }
        while let Some(joined) = inflight.join_next().await {
            log_join(joined);
        }
        tracing::info!("mail worker stopped");
    })
}
