use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use reqwest::Method;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, instrument};

use shared_database::SupabaseClient;

use crate::models::{Appointment, NewAppointment, StoreError};
use crate::services::store::AppointmentStore;

/// Backed by the `appointments` table (see `sql/001_appointments.sql`).
/// The partial unique index on `(provider_id, date)` turns a double booking into HTTP 409.
pub struct SupabaseAppointmentStore {
    supabase: Arc<SupabaseClient>,
}

#[derive(Debug, Deserialize)]
struct AppointmentRow {
    id: i64,
    user_id: i64,
    provider_id: i64,
    date: DateTime<Utc>,
    cancelled_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
}

impl From<AppointmentRow> for Appointment {
    fn from(row: AppointmentRow) -> Self {
        Appointment {
            id: row.id,
            user_id: row.user_id,
            provider_id: row.provider_id,
            date: row.date,
            cancelled_at: row.cancelled_at,
            created_at: row.created_at,
        }
    }
}

fn query_timestamp(instant: DateTime<Utc>) -> String {
    urlencoding::encode(&instant.to_rfc3339_opts(SecondsFormat::Secs, true)).into_owned()
}

impl SupabaseAppointmentStore {
    pub fn new(supabase: Arc<SupabaseClient>) -> Self {
        Self { supabase }
    }

    async fn select(&self, query: &str) -> Result<Vec<Appointment>, StoreError> {
        let path = format!("/rest/v1/appointments?{}", query);
        let rows: Vec<AppointmentRow> = self.supabase.request(Method::GET, &path, None).await?;
        Ok(rows.into_iter().map(Appointment::from).collect())
    }
}

#[async_trait]
impl AppointmentStore for SupabaseAppointmentStore {
    async fn find_active_by_provider_and_hour(
        &self,
        provider_id: i64,
        hour_start: DateTime<Utc>,
    ) -> Result<Option<Appointment>, StoreError> {
        let query = format!(
            "provider_id=eq.{}&date=eq.{}&cancelled_at=is.null&limit=1",
            provider_id,
            query_timestamp(hour_start)
        );
        Ok(self.select(&query).await?.into_iter().next())
    }

    async fn find_by_id(&self, id: i64) -> Result<Option<Appointment>, StoreError> {
        Ok(self.select(&format!("id=eq.{}&limit=1", id)).await?.into_iter().next())
    }

    async fn list_active_for_user(
        &self,
        user_id: i64,
        page: u32,
        page_size: u32,
    ) -> Result<Vec<Appointment>, StoreError> {
        let offset = page.saturating_sub(1) as u64 * page_size as u64;
        let query = format!(
            "user_id=eq.{}&cancelled_at=is.null&order=date.asc&limit={}&offset={}",
            user_id, page_size, offset
        );
        self.select(&query).await
    }

    async fn list_active_for_provider_between(
        &self,
        provider_id: i64,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Appointment>, StoreError> {
        let query = format!(
            "provider_id=eq.{}&cancelled_at=is.null&date=gte.{}&date=lt.{}&order=date.asc",
            provider_id,
            query_timestamp(from),
            query_timestamp(to)
        );
        self.select(&query).await
    }

    #[instrument(skip(self, appointment), fields(provider_id = appointment.provider_id))]
    async fn insert(&self, appointment: NewAppointment) -> Result<Appointment, StoreError> {
        let body = json!({
            "user_id": appointment.user_id,
            "provider_id": appointment.provider_id,
            "date": appointment.date.to_rfc3339(),
            "created_at": appointment.created_at.to_rfc3339(),
        });

        let rows: Vec<AppointmentRow> = self
            .supabase
            .request_returning(Method::POST, "/rest/v1/appointments", body)
            .await?;

        let row = rows
            .into_iter()
            .next()
            .ok_or_else(|| StoreError::Backend("Insert returned no rows".to_string()))?;

        debug!("Inserted appointment {}", row.id);
        Ok(row.into())
    }

    async fn save(&self, appointment: &Appointment) -> Result<(), StoreError> {
        let path = format!("/rest/v1/appointments?id=eq.{}", appointment.id);
        let body = json!({
            "cancelled_at": appointment.cancelled_at.map(|t| t.to_rfc3339()),
        });

        let rows: Vec<AppointmentRow> = self.supabase.request_returning(Method::PATCH, &path, body).await?;
        if rows.is_empty() {
            return Err(StoreError::Backend(format!("Appointment {} does not exist", appointment.id)));
        }
        Ok(())
    }
}
