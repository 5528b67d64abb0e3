use std::sync::Arc;

use tracing::{debug, info, instrument, warn};

use notification_queue_cell::{NotificationJob, NotificationKind, NotificationPayload, NotificationSink};

use crate::models::{Appointment, AppointmentError, DirectoryEntry};
use crate::services::directory::ProviderDirectory;
use crate::services::locks::KeyedLocks;
use crate::services::store::AppointmentStore;
use crate::services::time_rules::{self, Clock};

pub struct CancellationService {
    store: Arc<dyn AppointmentStore>,
    directory: Arc<dyn ProviderDirectory>,
    notifications: Arc<dyn NotificationSink>,
    clock: Arc<dyn Clock>,
    notice_hours: i64,
    appointment_locks: KeyedLocks<i64>,
}

impl CancellationService {
    pub fn new(
        store: Arc<dyn AppointmentStore>,
        directory: Arc<dyn ProviderDirectory>,
        notifications: Arc<dyn NotificationSink>,
        clock: Arc<dyn Clock>,
        notice_hours: i64,
    ) -> Self {
        Self {
            store,
            directory,
            notifications,
            clock,
            notice_hours,
            appointment_locks: KeyedLocks::new(),
        }
    }

    /// Soft-cancels the caller's own appointment, at least `notice_hours` ahead.
    #[instrument(skip(self))]
    pub async fn cancel_appointment(
        &self,
        caller_id: i64,
        appointment_id: i64,
    ) -> Result<Appointment, AppointmentError> {
        let appointment = {
            let _guard = self.appointment_locks.acquire(appointment_id).await;

            let mut appointment = self
                .store
                .find_by_id(appointment_id)
                .await?
                .ok_or(AppointmentError::NotFound)?;

            self.validate_cancellation(&appointment, caller_id)?;

            appointment.cancelled_at = Some(self.clock.now());
            self.store.save(&appointment).await?;
            appointment
        };

        info!("Appointment {} cancelled by user {}", appointment.id, caller_id);

        self.notify_parties(&appointment).await;

        Ok(appointment)
    }

    fn validate_cancellation(&self, appointment: &Appointment, caller_id: i64) -> Result<(), AppointmentError> {
        if appointment.user_id != caller_id {
            warn!(
                "User {} attempted to cancel appointment {} owned by {}",
                caller_id, appointment.id, appointment.user_id
            );
            return Err(AppointmentError::Forbidden);
        }

        if !appointment.is_active() {
            return Err(AppointmentError::AlreadyCancelled);
        }

        let deadline = time_rules::sub_hours(appointment.date, self.notice_hours);
        if time_rules::is_before(deadline, self.clock.now()) {
            debug!("Cancellation deadline {} passed for appointment {}", deadline, appointment.id);
            return Err(AppointmentError::TooLateToCancel);
        }

        Ok(())
    }

    /// Both the provider and the user get their own cancellation job.
    async fn notify_parties(&self, appointment: &Appointment) {
        let entries = match self
            .directory
            .find_many(&[appointment.provider_id, appointment.user_id])
            .await
        {
            Ok(entries) => entries,
            Err(e) => {
                warn!("Could not resolve parties of appointment {}: {}", appointment.id, e);
                return;
            }
        };

        let find = |id: i64| entries.iter().find(|e| e.id == id);
        let (Some(provider), Some(user)) = (find(appointment.provider_id), find(appointment.user_id)) else {
            warn!(
                "Parties of appointment {} missing from directory, skipping cancellation notices",
                appointment.id
            );
            return;
        };

        let formatted_date = time_rules::format_appointment_date(appointment.date);

        for (recipient, other_party) in [(provider, user), (user, provider)] {
            let job = self.cancellation_job(appointment, recipient, other_party, &formatted_date);
            if let Err(e) = self.notifications.enqueue(job).await {
                warn!(
                    "Failed to enqueue cancellation notice to {} for appointment {}: {}",
                    recipient.id, appointment.id, e
                );
            }
        }
    }

    fn cancellation_job(
        &self,
        appointment: &Appointment,
        recipient: &DirectoryEntry,
        other_party: &DirectoryEntry,
        formatted_date: &str,
    ) -> NotificationJob {
        NotificationJob::new(
            appointment.id,
            appointment.date,
            NotificationPayload {
                kind: NotificationKind::BookingCancelled,
                recipient_id: recipient.id,
                recipient_address: recipient.email.clone(),
                recipient_name: recipient.display_name.clone(),
                other_party_name: other_party.display_name.clone(),
                formatted_date: formatted_date.to_string(),
            },
        )
    }
}
