use std::sync::Arc;

use axum::{
    middleware,
    routing::{get, put},
    Router,
};

use shared_config::AppConfig;
use shared_utils::extractor::auth_middleware;

use crate::handlers::{get_dead_letters, get_queue_stats, list_notifications, mark_notification_read};
use crate::services::inbox::NotificationInbox;
use crate::services::queue::NotificationQueue;

#[derive(Clone)]
pub struct NotificationAdminState {
    pub config: Arc<AppConfig>,
    pub queue: Arc<dyn NotificationQueue>,
}

pub fn notification_admin_routes(state: NotificationAdminState) -> Router {
    Router::new()
        .route("/notifications/stats", get(get_queue_stats))
        .route("/notifications/dead-letter", get(get_dead_letters))
        .layer(middleware::from_fn_with_state(state.config.clone(), auth_middleware))
        .with_state(state)
}

#[derive(Clone)]
pub struct NotificationInboxState {
    pub config: Arc<AppConfig>,
    pub inbox: Arc<dyn NotificationInbox>,
}

pub fn notification_inbox_routes(state: NotificationInboxState) -> Router {
    Router::new()
        .route("/notifications", get(list_notifications))
        .route("/notifications/{notification_id}", put(mark_notification_read))
        .layer(middleware::from_fn_with_state(state.config.clone(), auth_middleware))
        .with_state(state)
}
