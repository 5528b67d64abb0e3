use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use tracing::debug;

use crate::models::{Appointment, NewAppointment, StoreError};

/// Persistence contract for appointments.
///
/// Implementations must reject an `insert` that would leave two active
/// appointments with the same provider and date, returning `StoreError::Conflict`.
#[async_trait]
pub trait AppointmentStore: Send + Sync {
    async fn find_active_by_provider_and_hour(
        &self,
        provider_id: i64,
        hour_start: DateTime<Utc>,
    ) -> Result<Option<Appointment>, StoreError>;

    async fn find_by_id(&self, id: i64) -> Result<Option<Appointment>, StoreError>;

    /// Active appointments ordered by date ascending. `page` is 1-based.
    async fn list_active_for_user(
        &self,
        user_id: i64,
        page: u32,
        page_size: u32,
    ) -> Result<Vec<Appointment>, StoreError>;

    /// Active appointments with `from <= date < to`, ordered by date.
    async fn list_active_for_provider_between(
        &self,
        provider_id: i64,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Appointment>, StoreError>;

    async fn insert(&self, appointment: NewAppointment) -> Result<Appointment, StoreError>;

    async fn save(&self, appointment: &Appointment) -> Result<(), StoreError>;
}

#[derive(Default)]
struct Table {
    next_id: i64,
    rows: BTreeMap<i64, Appointment>,
}

/// Process-local store. Uniqueness is checked under the table's write lock.
#[derive(Default)]
pub struct InMemoryAppointmentStore {
    table: RwLock<Table>,
}

impl InMemoryAppointmentStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.table.read().await.rows.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl AppointmentStore for InMemoryAppointmentStore {
    async fn find_active_by_provider_and_hour(
        &self,
        provider_id: i64,
        hour_start: DateTime<Utc>,
    ) -> Result<Option<Appointment>, StoreError> {
        let table = self.table.read().await;
        Ok(table
            .rows
            .values()
            .find(|a| a.provider_id == provider_id && a.date == hour_start && a.is_active())
            .cloned())
    }

    async fn find_by_id(&self, id: i64) -> Result<Option<Appointment>, StoreError> {
        Ok(self.table.read().await.rows.get(&id).cloned())
    }

    async fn list_active_for_user(
        &self,
        user_id: i64,
        page: u32,
        page_size: u32,
    ) -> Result<Vec<Appointment>, StoreError> {
        let table = self.table.read().await;

        let mut appointments: Vec<Appointment> = table
            .rows
            .values()
            .filter(|a| a.user_id == user_id && a.is_active())
            .cloned()
            .collect();
        appointments.sort_by_key(|a| (a.date, a.id));

        let offset = page.saturating_sub(1) as usize * page_size as usize;
        Ok(appointments.into_iter().skip(offset).take(page_size as usize).collect())
    }

    async fn list_active_for_provider_between(
        &self,
        provider_id: i64,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Appointment>, StoreError> {
        let table = self.table.read().await;

        let mut appointments: Vec<Appointment> = table
            .rows
            .values()
            .filter(|a| a.provider_id == provider_id && a.is_active() && a.date >= from && a.date < to)
            .cloned()
            .collect();
        appointments.sort_by_key(|a| (a.date, a.id));
        Ok(appointments)
    }

    async fn insert(&self, appointment: NewAppointment) -> Result<Appointment, StoreError> {
        let mut table = self.table.write().await;

        let taken = table
            .rows
            .values()
            .any(|a| a.provider_id == appointment.provider_id && a.date == appointment.date && a.is_active());
        if taken {
            debug!(
                "Rejecting insert: provider {} already booked at {}",
                appointment.provider_id, appointment.date
            );
            return Err(StoreError::Conflict);
        }

        table.next_id += 1;
        let appointment = appointment.into_appointment(table.next_id);
        table.rows.insert(appointment.id, appointment.clone());
        Ok(appointment)
    }

    async fn save(&self, appointment: &Appointment) -> Result<(), StoreError> {
        let mut table = self.table.write().await;

        match table.rows.get_mut(&appointment.id) {
            Some(row) => {
                *row = appointment.clone();
                Ok(())
            }
            None => Err(StoreError::Backend(format!("Appointment {} does not exist", appointment.id))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use chrono::{Duration, TimeZone};

    fn new_appointment(user_id: i64, provider_id: i64, date: DateTime<Utc>) -> NewAppointment {
        NewAppointment {
            user_id,
            provider_id,
            date,
            created_at: Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap(),
        }
    }

    #[tokio::test]
    async fn insert_assigns_increasing_ids() {
        let store = InMemoryAppointmentStore::new();
        let date = Utc.with_ymd_and_hms(2025, 6, 1, 10, 0, 0).unwrap();

        let first = store.insert(new_appointment(1, 10, date)).await.unwrap();
        let second = store.insert(new_appointment(1, 10, date + Duration::hours(1))).await.unwrap();

        assert_eq!(first.id, 1);
        assert_eq!(second.id, 2);
        assert!(first.cancelled_at.is_none());
    }

    #[tokio::test]
    async fn insert_rejects_active_duplicate_but_allows_after_cancel() {
        let store = InMemoryAppointmentStore::new();
        let date = Utc.with_ymd_and_hms(2025, 6, 1, 10, 0, 0).unwrap();

        let mut first = store.insert(new_appointment(1, 10, date)).await.unwrap();
        assert_matches!(store.insert(new_appointment(2, 10, date)).await, Err(StoreError::Conflict));

        // Same hour with another provider is fine.
        store.insert(new_appointment(2, 11, date)).await.unwrap();

        first.cancelled_at = Some(date - Duration::hours(5));
        store.save(&first).await.unwrap();
        store.insert(new_appointment(2, 10, date)).await.unwrap();
    }

    #[tokio::test]
    async fn lists_user_appointments_by_date_with_pages() {
        let store = InMemoryAppointmentStore::new();
        let base = Utc.with_ymd_and_hms(2025, 6, 1, 8, 0, 0).unwrap();

        for hours in [3, 1, 2, 0] {
            store.insert(new_appointment(1, 10, base + Duration::hours(hours))).await.unwrap();
        }
        store.insert(new_appointment(2, 11, base)).await.unwrap();

        let page_one = store.list_active_for_user(1, 1, 3).await.unwrap();
        let dates: Vec<_> = page_one.iter().map(|a| a.date).collect();
        assert_eq!(dates, vec![base, base + Duration::hours(1), base + Duration::hours(2)]);

        let page_two = store.list_active_for_user(1, 2, 3).await.unwrap();
        assert_eq!(page_two.len(), 1);
        assert_eq!(page_two[0].date, base + Duration::hours(3));

        assert!(store.list_active_for_user(1, 3, 3).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn save_unknown_appointment_fails() {
        let store = InMemoryAppointmentStore::new();
        let ghost = new_appointment(1, 10, Utc::now()).into_appointment(99);

        assert_matches!(store.save(&ghost).await, Err(StoreError::Backend(_)));
    }
}
