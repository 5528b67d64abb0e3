use std::sync::Arc;

use axum::{
    middleware,
    routing::{delete, get},
    Router,
};
use notification_queue_cell::NotificationSink;

use shared_config::AppConfig;
use shared_utils::extractor::auth_middleware;

use crate::handlers;
use crate::models::{Appointment, AppointmentView};
use crate::services::{
    AppointmentListingService, AppointmentStore, BookingService, CancellationService, Clock, ProviderDirectory,
};

#[derive(Clone)]
pub struct AppointmentState {
    pub config: Arc<AppConfig>,
    pub clock: Arc<dyn Clock>,
    pub booking: Arc<BookingService>,
    pub cancellation: Arc<CancellationService>,
    pub listing: Arc<AppointmentListingService>,
}

impl AppointmentState {
    pub fn new(
        config: Arc<AppConfig>,
        store: Arc<dyn AppointmentStore>,
        directory: Arc<dyn ProviderDirectory>,
        notifications: Arc<dyn NotificationSink>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let booking = BookingService::new(
            Arc::clone(&store),
            Arc::clone(&directory),
            Arc::clone(&notifications),
            Arc::clone(&clock),
        );
        let cancellation = CancellationService::new(
            Arc::clone(&store),
            Arc::clone(&directory),
            notifications,
            Arc::clone(&clock),
            config.cancellation_notice_hours,
        );
        let listing = AppointmentListingService::new(
            store,
            directory,
            Arc::clone(&clock),
            config.appointments_page_size,
            config.cancellation_notice_hours,
        );

        Self {
            config,
            clock,
            booking: Arc::new(booking),
            cancellation: Arc::new(cancellation),
            listing: Arc::new(listing),
        }
    }

    pub(crate) fn view(&self, appointment: Appointment) -> AppointmentView {
        AppointmentView::new(appointment, self.clock.now(), self.config.cancellation_notice_hours)
    }
}

pub fn appointment_routes(state: AppointmentState) -> Router {
    // Every appointment operation requires authentication
    Router::new()
        .route(
            "/appointments",
            get(handlers::list_appointments).post(handlers::create_appointment),
        )
        .route("/appointments/{appointment_id}", delete(handlers::cancel_appointment))
        .route("/schedule", get(handlers::get_schedule))
        .layer(middleware::from_fn_with_state(state.config.clone(), auth_middleware))
        .with_state(state)
}
