use async_trait::async_trait;
use tracing::info;
use velo_core::notify::{EmailMessage, EmailSink};

/// Hands emails to the log; rendering and delivery live in the mail service.
pub struct LogEmailSink;

#[async_trait]
impl EmailSink for LogEmailSink {
    async fn send(&self, email: &EmailMessage) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        info!(
            to = %email.to,
            template = ?email.template,
            subject = %email.subject,
            "Email queued"
        );
        Ok(())
    }
}
