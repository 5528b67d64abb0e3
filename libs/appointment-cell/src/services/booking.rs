use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, info, instrument, warn};

use notification_queue_cell::{NotificationJob, NotificationKind, NotificationPayload, NotificationSink};

use crate::models::{Appointment, AppointmentError, DirectoryEntry, NewAppointment};
use crate::services::directory::ProviderDirectory;
use crate::services::locks::KeyedLocks;
use crate::services::store::AppointmentStore;
use crate::services::time_rules::{self, Clock};

pub struct BookingService {
    store: Arc<dyn AppointmentStore>,
    directory: Arc<dyn ProviderDirectory>,
    notifications: Arc<dyn NotificationSink>,
    clock: Arc<dyn Clock>,
    slot_locks: KeyedLocks<(i64, DateTime<Utc>)>,
}

impl BookingService {
    pub fn new(
        store: Arc<dyn AppointmentStore>,
        directory: Arc<dyn ProviderDirectory>,
        notifications: Arc<dyn NotificationSink>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            directory,
            notifications,
            clock,
            slot_locks: KeyedLocks::new(),
        }
    }

    /// Books the hour containing `raw_date` with a provider.
    ///
    /// The provider is notified on a best-effort basis; a failed enqueue
    /// never fails the booking.
    #[instrument(skip(self))]
    pub async fn create_appointment(
        &self,
        requester_id: i64,
        provider_id: i64,
        raw_date: &str,
    ) -> Result<Appointment, AppointmentError> {
        let hour_start = time_rules::start_of_hour(time_rules::parse_instant(raw_date)?);

        if !time_rules::is_before(self.clock.now(), hour_start) {
            debug!("Rejected booking for past hour {}", hour_start);
            return Err(AppointmentError::DatePast);
        }

        let provider = self.resolve_provider(provider_id).await?;

        let appointment = {
            let _slot = self.slot_locks.acquire((provider_id, hour_start)).await;

            if self
                .store
                .find_active_by_provider_and_hour(provider_id, hour_start)
                .await?
                .is_some()
            {
                debug!("Provider {} already booked at {}", provider_id, hour_start);
                return Err(AppointmentError::SlotTaken);
            }

            self.store
                .insert(NewAppointment {
                    user_id: requester_id,
                    provider_id,
                    date: hour_start,
                    created_at: self.clock.now(),
                })
                .await?
        };

        info!(
            "Appointment {} booked: user {} with provider {} at {}",
            appointment.id, requester_id, provider_id, appointment.date
        );

        self.notify_provider(&appointment, &provider).await;

        Ok(appointment)
    }

    async fn resolve_provider(&self, provider_id: i64) -> Result<DirectoryEntry, AppointmentError> {
        match self.directory.find(provider_id).await? {
            Some(entry) if entry.is_provider => Ok(entry),
            _ => {
                debug!("User {} is not a provider", provider_id);
                Err(AppointmentError::NotAProvider)
            }
        }
    }

    async fn notify_provider(&self, appointment: &Appointment, provider: &DirectoryEntry) {
        let requester = match self.directory.find(appointment.user_id).await {
            Ok(Some(requester)) => requester,
            Ok(None) => {
                warn!(
                    "Requester {} missing from directory, skipping notification for appointment {}",
                    appointment.user_id, appointment.id
                );
                return;
            }
            Err(e) => {
                warn!("Could not resolve requester for appointment {}: {}", appointment.id, e);
                return;
            }
        };

        let job = NotificationJob::new(
            appointment.id,
            appointment.date,
            NotificationPayload {
                kind: NotificationKind::BookingCreated,
                recipient_id: provider.id,
                recipient_address: provider.email.clone(),
                recipient_name: provider.display_name.clone(),
                other_party_name: requester.display_name,
                formatted_date: time_rules::format_appointment_date(appointment.date),
            },
        );

        if let Err(e) = self.notifications.enqueue(job).await {
            warn!("Failed to enqueue booking notification for appointment {}: {}", appointment.id, e);
        }
    }
}
