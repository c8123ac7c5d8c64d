use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;
use velo_core::notify::{Notification, NotificationSink};

/// Writes in-app notifications to the `notifications` table.
pub struct PgNotificationSink {
    pool: PgPool,
}

impl PgNotificationSink {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl NotificationSink for PgNotificationSink {
    async fn notify(
        &self,
        notification: &Notification,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        sqlx::query(
            r#"
            INSERT INTO notifications (id, user_id, title, message, category, link)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(notification.user_id)
        .bind(&notification.title)
        .bind(&notification.message)
        .bind(notification.category.as_str())
        .bind(&notification.link)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
