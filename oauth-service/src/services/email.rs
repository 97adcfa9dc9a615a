use service_core::axum::async_trait;
use std::sync::Mutex;

/// Outbound notification. Delivery is someone else's job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmailMessage {
    pub to: String,
    pub subject: String,
    pub body: String,
}

impl EmailMessage {
    pub fn welcome(to: &str) -> Self {
        Self {
            to: to.to_string(),
            subject: "Welcome".to_string(),
            body: "Your account has been created.".to_string(),
        }
    }

    pub fn password_changed(to: &str) -> Self {
        Self {
            to: to.to_string(),
            subject: "Your password was changed".to_string(),
            body: "Your password was reset and every active session was signed out. \
                   If this was not you, contact support."
                .to_string(),
        }
    }

    pub fn account_deleted(to: &str) -> Self {
        Self {
            to: to.to_string(),
            subject: "Your account was deleted".to_string(),
            body: "Your account has been deleted.".to_string(),
        }
    }
}

/// Fire-and-forget publisher. Callers log failures and carry on.
#[async_trait]
pub trait EmailPublisher: Send + Sync {
    async fn publish(&self, message: EmailMessage) -> Result<(), anyhow::Error>;
}

#[derive(Clone, Default)]
pub struct NoopEmailPublisher;

#[async_trait]
impl EmailPublisher for NoopEmailPublisher {
    async fn publish(&self, message: EmailMessage) -> Result<(), anyhow::Error> {
        tracing::debug!(
            to = %message.to,
            subject = %message.subject,
            "Email dropped (noop publisher)"
        );
        Ok(())
    }
}

/// Keeps published messages in memory; optionally fails every publish.
#[derive(Default)]
pub struct MockEmailPublisher {
    pub sent: Mutex<Vec<EmailMessage>>,
    pub fail: bool,
}

impl MockEmailPublisher {
    pub fn failing() -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
            fail: true,
        }
    }

    pub fn sent(&self) -> Vec<EmailMessage> {
        self.sent.lock().map(|s| s.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl EmailPublisher for MockEmailPublisher {
    async fn publish(&self, message: EmailMessage) -> Result<(), anyhow::Error> {
        if self.fail {
            return Err(anyhow::anyhow!("Mock publisher refused message"));
        }
        self.sent
            .lock()
            .map_err(|e| anyhow::anyhow!("Mock publisher mutex poisoned: {}", e))?
            .push(message);
        Ok(())
    }
}
