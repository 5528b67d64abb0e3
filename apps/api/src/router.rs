use axum::{routing::get, Json, Router};
use serde_json::{json, Value};

use appointment_cell::{appointment_routes, AppointmentState};
use notification_queue_cell::{
    notification_admin_routes, notification_inbox_routes, NotificationAdminState, NotificationInboxState,
};

pub fn create_router(
    appointments: AppointmentState,
    notifications: NotificationAdminState,
    inbox: NotificationInboxState,
) -> Router {
    Router::new()
        .route("/", get(health))
        .merge(appointment_routes(appointments))
        .merge(notification_admin_routes(notifications))
        .merge(notification_inbox_routes(inbox))
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok", "service": "appointment-api" }))
}
