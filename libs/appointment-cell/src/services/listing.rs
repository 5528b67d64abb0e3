use std::sync::Arc;

use chrono::{Duration, NaiveDate};
use tracing::debug;

use crate::models::{
    Appointment, AppointmentError, AppointmentListEntry, AppointmentView, DirectoryEntry, PartySummary,
    ScheduleEntry,
};
use crate::services::directory::ProviderDirectory;
use crate::services::store::AppointmentStore;
use crate::services::time_rules::Clock;

/// Read side: a user's appointment list and a provider's day schedule.
pub struct AppointmentListingService {
    store: Arc<dyn AppointmentStore>,
    directory: Arc<dyn ProviderDirectory>,
    clock: Arc<dyn Clock>,
    page_size: u32,
    notice_hours: i64,
}

impl AppointmentListingService {
    pub fn new(
        store: Arc<dyn AppointmentStore>,
        directory: Arc<dyn ProviderDirectory>,
        clock: Arc<dyn Clock>,
        page_size: u32,
        notice_hours: i64,
    ) -> Self {
        Self {
            store,
            directory,
            clock,
            page_size: page_size.max(1),
            notice_hours,
        }
    }

    pub async fn list_for_user(
        &self,
        user_id: i64,
        page: Option<u32>,
    ) -> Result<Vec<AppointmentListEntry>, AppointmentError> {
        let page = page.unwrap_or(1).max(1);
        let appointments = self.store.list_active_for_user(user_id, page, self.page_size).await?;
        debug!("User {} page {}: {} appointments", user_id, page, appointments.len());

        let providers = self.lookup(appointments.iter().map(|a| a.provider_id)).await?;

        Ok(appointments
            .into_iter()
            .map(|appointment| {
                let provider = summary_for(&providers, appointment.provider_id);
                AppointmentListEntry {
                    view: self.view(appointment),
                    provider,
                }
            })
            .collect())
    }

    /// Active appointments of `provider_id` on the given UTC day.
    pub async fn schedule_for_provider(
        &self,
        provider_id: i64,
        day: NaiveDate,
    ) -> Result<Vec<ScheduleEntry>, AppointmentError> {
        match self.directory.find(provider_id).await? {
            Some(entry) if entry.is_provider => {}
            _ => return Err(AppointmentError::NotAProvider),
        }

        let from = day
            .and_hms_opt(0, 0, 0)
            .ok_or_else(|| AppointmentError::ValidationError(format!("Invalid day: {}", day)))?
            .and_utc();
        let to = from + Duration::days(1);

        let appointments = self.store.list_active_for_provider_between(provider_id, from, to).await?;
        let users = self.lookup(appointments.iter().map(|a| a.user_id)).await?;

        Ok(appointments
            .into_iter()
            .map(|appointment| {
                let user = summary_for(&users, appointment.user_id);
                ScheduleEntry {
                    view: self.view(appointment),
                    user,
                }
            })
            .collect())
    }

    fn view(&self, appointment: Appointment) -> AppointmentView {
        AppointmentView::new(appointment, self.clock.now(), self.notice_hours)
    }

    async fn lookup(&self, ids: impl Iterator<Item = i64>) -> Result<Vec<DirectoryEntry>, AppointmentError> {
        let mut ids: Vec<i64> = ids.collect();
        ids.sort_unstable();
        ids.dedup();
        self.directory.find_many(&ids).await
    }
}

fn summary_for(entries: &[DirectoryEntry], id: i64) -> Option<PartySummary> {
    entries.iter().find(|e| e.id == id).map(PartySummary::from)
}
