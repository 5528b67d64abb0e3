#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};

use appointment_cell::*;
use notification_queue_cell::{NotificationJob, NotificationQueueError, NotificationSink};

pub const USER_ID: i64 = 1;
pub const OTHER_USER_ID: i64 = 2;
pub const NON_PROVIDER_ID: i64 = 3;
pub const PROVIDER_ID: i64 = 10;
pub const OTHER_PROVIDER_ID: i64 = 11;

pub fn at(y: i32, mo: u32, d: u32, h: u32, mi: u32, s: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(y, mo, d, h, mi, s).unwrap()
}

fn entry(id: i64, name: &str, is_provider: bool) -> DirectoryEntry {
    DirectoryEntry {
        id,
        display_name: name.to_string(),
        email: format!("{}@example.com", name.to_lowercase().replace(' ', ".")),
        is_provider,
        avatar_url: is_provider.then(|| format!("https://cdn.example.com/avatars/{}.png", id)),
    }
}

pub fn directory() -> InMemoryProviderDirectory {
    InMemoryProviderDirectory::with_entries([
        entry(USER_ID, "Maria Silva", false),
        entry(OTHER_USER_ID, "Carlos Souza", false),
        entry(NON_PROVIDER_ID, "Ana Lima", false),
        entry(PROVIDER_ID, "Dra Paula", true),
        entry(OTHER_PROVIDER_ID, "Dr Rui", true),
    ])
}

/// Captures enqueued jobs; can be switched to reject them.
#[derive(Default)]
pub struct RecordingSink {
    jobs: Mutex<Vec<NotificationJob>>,
    failing: bool,
}

impl RecordingSink {
    pub fn failing() -> Self {
        Self {
            jobs: Mutex::new(Vec::new()),
            failing: true,
        }
    }

    pub fn jobs(&self) -> Vec<NotificationJob> {
        self.jobs.lock().unwrap().clone()
    }
}

#[async_trait]
impl NotificationSink for RecordingSink {
    async fn enqueue(&self, job: NotificationJob) -> Result<(), NotificationQueueError> {
        if self.failing {
            return Err(NotificationQueueError::QueueFull { capacity: 0 });
        }
        self.jobs.lock().unwrap().push(job);
        Ok(())
    }
}

pub struct Harness {
    pub store: Arc<InMemoryAppointmentStore>,
    pub directory: Arc<InMemoryProviderDirectory>,
    pub sink: Arc<RecordingSink>,
    pub clock: Arc<FixedClock>,
    pub booking: Arc<BookingService>,
    pub cancellation: CancellationService,
    pub listing: AppointmentListingService,
}

impl Harness {
    /// Clock starts at 2025-05-31T12:00:00Z.
    pub fn new() -> Self {
        Self::with_sink(RecordingSink::default())
    }

    pub fn with_sink(sink: RecordingSink) -> Self {
        let store = Arc::new(InMemoryAppointmentStore::new());
        let directory = Arc::new(directory());
        let sink = Arc::new(sink);
        let clock = Arc::new(FixedClock::new(at(2025, 5, 31, 12, 0, 0)));

        let booking = Arc::new(BookingService::new(store.clone(), directory.clone(), sink.clone(), clock.clone()));
        let cancellation = CancellationService::new(store.clone(), directory.clone(), sink.clone(), clock.clone(), 2);
        let listing = AppointmentListingService::new(store.clone(), directory.clone(), clock.clone(), 20, 2);

        Self {
            store,
            directory,
            sink,
            clock,
            booking,
            cancellation,
            listing,
        }
    }
}
