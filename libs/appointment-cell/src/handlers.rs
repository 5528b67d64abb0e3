use axum::{
    extract::{Extension, State},
    http::StatusCode,
    Json,
};
use chrono::NaiveDate;
use tracing::{debug, error};

use shared_models::auth::AuthenticatedUser;
use shared_models::error::AppError;
use shared_utils::extractor::{ApiJson, ApiPath, ApiQuery};

use crate::models::{
    AppointmentError, AppointmentListEntry, AppointmentView, CreateAppointmentRequest, ListAppointmentsQuery,
    ScheduleEntry, ScheduleQuery,
};
use crate::router::AppointmentState;

fn to_app_error(err: AppointmentError) -> AppError {
    match err {
        AppointmentError::ValidationError(msg) => AppError::BadRequest(msg),
        AppointmentError::DatePast | AppointmentError::SlotTaken => AppError::BadRequest(err.to_string()),
        AppointmentError::NotAProvider | AppointmentError::TooLateToCancel => AppError::Auth(err.to_string()),
        AppointmentError::Forbidden => AppError::Forbidden(err.to_string()),
        AppointmentError::NotFound => AppError::NotFound(err.to_string()),
        AppointmentError::AlreadyCancelled => AppError::Conflict(err.to_string()),
        AppointmentError::DatabaseError(_) | AppointmentError::DirectoryError(_) => {
            error!("Appointment operation failed: {}", err);
            AppError::Internal("Operation failed".to_string())
        }
    }
}

/// Book an hour with a provider
#[axum::debug_handler]
pub async fn create_appointment(
    State(state): State<AppointmentState>,
    Extension(user): Extension<AuthenticatedUser>,
    ApiJson(request): ApiJson<CreateAppointmentRequest>,
) -> Result<(StatusCode, Json<AppointmentView>), AppError> {
    debug!("User {} booking provider {} at {}", user.id, request.provider_id, request.date);

    let appointment = state
        .booking
        .create_appointment(user.id, request.provider_id, &request.date)
        .await
        .map_err(to_app_error)?;

    Ok((StatusCode::CREATED, Json(state.view(appointment))))
}

/// The caller's active appointments, one page at a time
#[axum::debug_handler]
pub async fn list_appointments(
    State(state): State<AppointmentState>,
    Extension(user): Extension<AuthenticatedUser>,
    ApiQuery(query): ApiQuery<ListAppointmentsQuery>,
) -> Result<Json<Vec<AppointmentListEntry>>, AppError> {
    let entries = state
        .listing
        .list_for_user(user.id, query.page)
        .await
        .map_err(to_app_error)?;

    Ok(Json(entries))
}

#[axum::debug_handler]
pub async fn cancel_appointment(
    State(state): State<AppointmentState>,
    Extension(user): Extension<AuthenticatedUser>,
    ApiPath(appointment_id): ApiPath<i64>,
) -> Result<Json<AppointmentView>, AppError> {
    let appointment = state
        .cancellation
        .cancel_appointment(user.id, appointment_id)
        .await
        .map_err(to_app_error)?;

    Ok(Json(state.view(appointment)))
}

/// The calling provider's appointments for one UTC day (`date=YYYY-MM-DD`)
#[axum::debug_handler]
pub async fn get_schedule(
    State(state): State<AppointmentState>,
    Extension(user): Extension<AuthenticatedUser>,
    ApiQuery(query): ApiQuery<ScheduleQuery>,
) -> Result<Json<Vec<ScheduleEntry>>, AppError> {
    let day = NaiveDate::parse_from_str(&query.date, "%Y-%m-%d")
        .map_err(|_| AppError::BadRequest(format!("Invalid date: '{}'", query.date)))?;

    let schedule = state
        .listing
        .schedule_for_provider(user.id, day)
        .await
        .map_err(to_app_error)?;

    Ok(Json(schedule))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_domain_errors_to_http_statuses() {
        let cases = [
            (AppointmentError::ValidationError("bad".to_string()), StatusCode::BAD_REQUEST),
            (AppointmentError::DatePast, StatusCode::BAD_REQUEST),
            (AppointmentError::SlotTaken, StatusCode::BAD_REQUEST),
            (AppointmentError::NotAProvider, StatusCode::UNAUTHORIZED),
            (AppointmentError::TooLateToCancel, StatusCode::UNAUTHORIZED),
            (AppointmentError::Forbidden, StatusCode::FORBIDDEN),
            (AppointmentError::NotFound, StatusCode::NOT_FOUND),
            (AppointmentError::AlreadyCancelled, StatusCode::CONFLICT),
            (AppointmentError::DatabaseError("down".to_string()), StatusCode::INTERNAL_SERVER_ERROR),
        ];

        for (err, status) in cases {
            assert_eq!(to_app_error(err).status_code(), status);
        }
    }
}
