use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use reqwest::Method;
use serde::Deserialize;
use serde_json::json;
use tokio::sync::RwLock;
use tracing::{debug, error};
use uuid::Uuid;

use shared_database::{DatabaseError, SupabaseClient};

use crate::{InboxNotification, NotificationQueueError};

/// In-app notifications a user reads from `GET /notifications`.
#[async_trait]
pub trait NotificationInbox: Send + Sync {
    /// Recording the same id twice keeps the first entry.
    async fn record(&self, notification: InboxNotification) -> Result<(), NotificationQueueError>;

    /// Newest first, at most `limit` entries.
    async fn list_for_recipient(
        &self,
        recipient_id: i64,
        limit: usize,
    ) -> Result<Vec<InboxNotification>, NotificationQueueError>;

    /// Entries owned by someone else are reported as not found.
    async fn mark_read(&self, recipient_id: i64, id: Uuid) -> Result<InboxNotification, NotificationQueueError>;
}

#[derive(Default)]
pub struct InMemoryNotificationInbox {
    entries: RwLock<HashMap<Uuid, InboxNotification>>,
}

impl InMemoryNotificationInbox {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl NotificationInbox for InMemoryNotificationInbox {
    async fn record(&self, notification: InboxNotification) -> Result<(), NotificationQueueError> {
        self.entries
            .write()
            .await
            .entry(notification.id)
            .or_insert(notification);
        Ok(())
    }

    async fn list_for_recipient(
        &self,
        recipient_id: i64,
        limit: usize,
    ) -> Result<Vec<InboxNotification>, NotificationQueueError> {
        let entries = self.entries.read().await;

        let mut owned: Vec<InboxNotification> = entries
            .values()
            .filter(|n| n.recipient_id == recipient_id)
            .cloned()
            .collect();
        owned.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        owned.truncate(limit);
        Ok(owned)
    }

    async fn mark_read(&self, recipient_id: i64, id: Uuid) -> Result<InboxNotification, NotificationQueueError> {
        let mut entries = self.entries.write().await;

        match entries.get_mut(&id) {
            Some(entry) if entry.recipient_id == recipient_id => {
                entry.read = true;
                Ok(entry.clone())
            }
            _ => Err(NotificationQueueError::NotificationNotFound(id.to_string())),
        }
    }
}

#[derive(Debug, Deserialize)]
struct NotificationRow {
    id: Uuid,
    recipient_id: i64,
    content: String,
    read: bool,
    created_at: DateTime<Utc>,
}

impl From<NotificationRow> for InboxNotification {
    fn from(row: NotificationRow) -> Self {
        InboxNotification {
            id: row.id,
            recipient_id: row.recipient_id,
            content: row.content,
            read: row.read,
            created_at: row.created_at,
        }
    }
}

fn inbox_error(e: DatabaseError) -> NotificationQueueError {
    error!("Notification inbox request failed: {}", e);
    NotificationQueueError::InboxError(e.to_string())
}

/// Backed by the `notifications` table (see `sql/001_notifications.sql`).
pub struct SupabaseNotificationInbox {
    supabase: Arc<SupabaseClient>,
}

impl SupabaseNotificationInbox {
    pub fn new(supabase: Arc<SupabaseClient>) -> Self {
        Self { supabase }
    }
}

#[async_trait]
impl NotificationInbox for SupabaseNotificationInbox {
    async fn record(&self, notification: InboxNotification) -> Result<(), NotificationQueueError> {
        let body = json!({
            "id": notification.id,
            "recipient_id": notification.recipient_id,
            "content": notification.content,
            "read": notification.read,
            "created_at": notification.created_at.to_rfc3339_opts(SecondsFormat::Millis, true),
        });

        let result: Result<Vec<NotificationRow>, DatabaseError> = self
            .supabase
            .request_returning(Method::POST, "/rest/v1/notifications", body)
            .await;

        match result {
            Ok(_) => Ok(()),
            Err(DatabaseError::Conflict(_)) => {
                debug!("Notification {} already recorded", notification.id);
                Ok(())
            }
            Err(e) => Err(inbox_error(e)),
        }
    }

    async fn list_for_recipient(
        &self,
        recipient_id: i64,
        limit: usize,
    ) -> Result<Vec<InboxNotification>, NotificationQueueError> {
        let path = format!(
            "/rest/v1/notifications?recipient_id=eq.{}&order=created_at.desc&limit={}",
            recipient_id, limit
        );
        let rows: Vec<NotificationRow> = self
            .supabase
            .request(Method::GET, &path, None)
            .await
            .map_err(inbox_error)?;

        Ok(rows.into_iter().map(InboxNotification::from).collect())
    }

    async fn mark_read(&self, recipient_id: i64, id: Uuid) -> Result<InboxNotification, NotificationQueueError> {
        let path = format!("/rest/v1/notifications?id=eq.{}&recipient_id=eq.{}", id, recipient_id);
        let rows: Vec<NotificationRow> = self
            .supabase
            .request_returning(Method::PATCH, &path, json!({ "read": true }))
            .await
            .map_err(inbox_error)?;

        rows.into_iter()
            .next()
            .map(InboxNotification::from)
            .ok_or_else(|| NotificationQueueError::NotificationNotFound(id.to_string()))
    }
}
