use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use shared_database::DatabaseError;

use crate::services::time_rules;

// ==============================================================================
// CORE APPOINTMENT MODELS
// ==============================================================================

/// A booked hour with a provider. Only `cancelled_at` ever changes after creation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Appointment {
    pub id: i64,
    pub user_id: i64,
    pub provider_id: i64,
    /// Start of the booked hour.
    pub date: DateTime<Utc>,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Appointment {
    pub fn is_active(&self) -> bool {
        self.cancelled_at.is_none()
    }
}

/// Appointment before the store assigns its id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewAppointment {
    pub user_id: i64,
    pub provider_id: i64,
    pub date: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl NewAppointment {
    pub fn into_appointment(self, id: i64) -> Appointment {
        Appointment {
            id,
            user_id: self.user_id,
            provider_id: self.provider_id,
            date: self.date,
            cancelled_at: None,
            created_at: self.created_at,
        }
    }
}

/// Response shape: the stored record plus fields derived from the current time.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AppointmentView {
    #[serde(flatten)]
    pub appointment: Appointment,
    pub past: bool,
    pub cancelable: bool,
}

impl AppointmentView {
    pub fn new(appointment: Appointment, now: DateTime<Utc>, notice_hours: i64) -> Self {
        let past = time_rules::is_before(appointment.date, now);
        let cancelable = !time_rules::is_before(time_rules::sub_hours(appointment.date, notice_hours), now);
        Self {
            appointment,
            past,
            cancelable,
        }
    }
}

// ==============================================================================
// DIRECTORY MODELS
// ==============================================================================

/// Read-only identity record owned by the user directory.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DirectoryEntry {
    pub id: i64,
    pub display_name: String,
    pub email: String,
    pub is_provider: bool,
    pub avatar_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PartySummary {
    pub id: i64,
    pub name: String,
    pub avatar_url: Option<String>,
}

impl From<&DirectoryEntry> for PartySummary {
    fn from(entry: &DirectoryEntry) -> Self {
        Self {
            id: entry.id,
            name: entry.display_name.clone(),
            avatar_url: entry.avatar_url.clone(),
        }
    }
}

/// Item of a user's appointment list.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AppointmentListEntry {
    #[serde(flatten)]
    pub view: AppointmentView,
    pub provider: Option<PartySummary>,
}

/// Item of a provider's day schedule.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleEntry {
    #[serde(flatten)]
    pub view: AppointmentView,
    pub user: Option<PartySummary>,
}

// ==============================================================================
// REQUEST MODELS
// ==============================================================================

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateAppointmentRequest {
    pub provider_id: i64,
    pub date: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ListAppointmentsQuery {
    pub page: Option<u32>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ScheduleQuery {
    pub date: String,
}

// ==============================================================================
// ERROR TYPES
// ==============================================================================

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AppointmentError {
    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("User is not a provider")]
    NotAProvider,

    #[error("Past dates are not permitted")]
    DatePast,

    #[error("Appointment date is not available")]
    SlotTaken,

    #[error("Appointment not found")]
    NotFound,

    #[error("You don't have permission to cancel this appointment")]
    Forbidden,

    #[error("You can only cancel appointments in advance")]
    TooLateToCancel,

    #[error("Appointment is already cancelled")]
    AlreadyCancelled,

    #[error("Database error: {0}")]
    DatabaseError(String),

    #[error("Directory error: {0}")]
    DirectoryError(String),
}

/// Failures reported by an `AppointmentStore`.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// Another active appointment already holds the provider's hour.
    #[error("Active appointment already exists for this provider and hour")]
    Conflict,

    #[error("Store backend error: {0}")]
    Backend(String),
}

impl From<StoreError> for AppointmentError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Conflict => AppointmentError::SlotTaken,
            StoreError::Backend(msg) => AppointmentError::DatabaseError(msg),
        }
    }
}

impl From<DatabaseError> for StoreError {
    fn from(err: DatabaseError) -> Self {
        match err {
            DatabaseError::Conflict(_) => StoreError::Conflict,
            other => StoreError::Backend(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn appointment_at(date: DateTime<Utc>) -> Appointment {
        NewAppointment {
            user_id: 1,
            provider_id: 2,
            date,
            created_at: date - chrono::Duration::days(1),
        }
        .into_appointment(7)
    }

    #[test]
    fn view_derives_past_and_cancelable() {
        let date = Utc.with_ymd_and_hms(2025, 6, 1, 10, 0, 0).unwrap();

        let early = AppointmentView::new(appointment_at(date), Utc.with_ymd_and_hms(2025, 6, 1, 8, 0, 0).unwrap(), 2);
        assert!(!early.past);
        assert!(early.cancelable);

        let late = AppointmentView::new(appointment_at(date), Utc.with_ymd_and_hms(2025, 6, 1, 8, 0, 1).unwrap(), 2);
        assert!(!late.past);
        assert!(!late.cancelable);

        let after = AppointmentView::new(appointment_at(date), Utc.with_ymd_and_hms(2025, 6, 1, 11, 0, 0).unwrap(), 2);
        assert!(after.past);
    }

    #[test]
    fn view_serializes_flat_camel_case() {
        let date = Utc.with_ymd_and_hms(2025, 6, 1, 10, 0, 0).unwrap();
        let view = AppointmentView::new(appointment_at(date), date, 2);

        let json = serde_json::to_value(&view).unwrap();
        assert_eq!(json["id"], 7);
        assert_eq!(json["providerId"], 2);
        assert_eq!(json["cancelledAt"], serde_json::Value::Null);
        assert_eq!(json["past"], false);
        assert_eq!(json["cancelable"], false);
    }

    #[test]
    fn store_conflict_maps_to_slot_taken() {
        assert_eq!(AppointmentError::from(StoreError::Conflict), AppointmentError::SlotTaken);
        assert_eq!(
            StoreError::from(DatabaseError::Conflict("23505".to_string())),
            StoreError::Conflict
        );
    }
}
