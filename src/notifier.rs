/// Security notifications
///
/// The rotator alerts a user through a [`Notifier`] when a refresh arrives
/// from a different network origin than the one the session was issued to.

use std::sync::Arc;

use async_trait::async_trait;

use crate::email_client::EmailClient;
use crate::error::{AppError, EmailError};
use crate::storage::IdentityStore;

pub const SECURITY_ALERT_SUBJECT: &str = "Warning - Account Security";
pub const SECURITY_ALERT_BODY: &str =
    "WARNING: Your account has been accessed from a new IP address.";

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, guid: &str, subject: &str, body: &str) -> Result<(), AppError>;
}

/// Delivers notifications by email to the address registered for a guid
pub struct EmailNotifier {
    client: EmailClient,
    identities: Arc<dyn IdentityStore>,
}

impl EmailNotifier {
    pub fn new(client: EmailClient, identities: Arc<dyn IdentityStore>) -> Self {
        Self { client, identities }
    }
}

#[async_trait]
impl Notifier for EmailNotifier {
    async fn send(&self, guid: &str, subject: &str, body: &str) -> Result<(), AppError> {
        let recipient = match self.identities.email_of(guid).await {
            Ok(email) => email,
            Err(e) if e.is_not_found() => {
                return Err(AppError::Email(EmailError::InvalidRecipient(format!(
                    "no email registered for {}",
                    guid
                ))));
            }
            Err(e) => return Err(e),
        };

        self.client.send_email(&recipient, subject, body).await?;

        tracing::info!(guid = %guid, "Security notification sent");
        Ok(())
    }
}
