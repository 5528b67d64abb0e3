use axum::{extract::State, response::Json, Extension};
use serde_json::{json, Value};
use tracing::{debug, error, info};
use uuid::Uuid;

use shared_models::{auth::AuthenticatedUser, error::AppError};
use shared_utils::extractor::ApiPath;

use crate::router::{NotificationAdminState, NotificationInboxState};
use crate::{InboxNotification, NotificationQueueError};

/// Inbox entries returned per request.
pub const INBOX_PAGE_SIZE: usize = 20;

fn require_admin(user: &AuthenticatedUser) -> Result<(), AppError> {
    if user.is_admin() {
        Ok(())
    } else {
        Err(AppError::Forbidden("Admin role required".to_string()))
    }
}

/// Get queue statistics (admin only)
pub async fn get_queue_stats(
    State(state): State<NotificationAdminState>,
    Extension(user): Extension<AuthenticatedUser>,
) -> Result<Json<Value>, AppError> {
    require_admin(&user)?;
    info!("Queue stats request from user: {}", user.id);

    let stats = state.queue.stats().await;

    Ok(Json(json!({
        "queued_jobs": stats.queued_jobs,
        "in_flight_jobs": stats.in_flight_jobs,
        "delivered": stats.delivered,
        "retried": stats.retried,
        "dead_lettered": stats.dead_lettered,
    })))
}

/// List jobs that exhausted their delivery attempts (admin only)
pub async fn get_dead_letters(
    State(state): State<NotificationAdminState>,
    Extension(user): Extension<AuthenticatedUser>,
) -> Result<Json<Value>, AppError> {
    require_admin(&user)?;
    info!("Dead-letter listing request from user: {}", user.id);

    let jobs = state.queue.dead_letters().await.map_err(|e| {
        error!("Failed to read dead-letter list: {}", e);
        AppError::Internal("Operation failed".to_string())
    })?;

    Ok(Json(json!({
        "count": jobs.len(),
        "jobs": jobs,
    })))
}

fn inbox_app_error(err: NotificationQueueError) -> AppError {
    match err {
        NotificationQueueError::NotificationNotFound(_) => AppError::NotFound("Notification not found".to_string()),
        other => {
            error!("Notification inbox operation failed: {}", other);
            AppError::Internal("Operation failed".to_string())
        }
    }
}

/// The caller's latest in-app notifications, newest first
#[axum::debug_handler]
pub async fn list_notifications(
    State(state): State<NotificationInboxState>,
    Extension(user): Extension<AuthenticatedUser>,
) -> Result<Json<Vec<InboxNotification>>, AppError> {
    let notifications = state
        .inbox
        .list_for_recipient(user.id, INBOX_PAGE_SIZE)
        .await
        .map_err(inbox_app_error)?;

    debug!("User {} has {} inbox notifications", user.id, notifications.len());
    Ok(Json(notifications))
}

#[axum::debug_handler]
pub async fn mark_notification_read(
    State(state): State<NotificationInboxState>,
    Extension(user): Extension<AuthenticatedUser>,
    ApiPath(notification_id): ApiPath<Uuid>,
) -> Result<Json<InboxNotification>, AppError> {
    let notification = state
        .inbox
        .mark_read(user.id, notification_id)
        .await
        .map_err(inbox_app_error)?;

    Ok(Json(notification))
}
