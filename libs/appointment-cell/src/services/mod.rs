pub mod time_rules;
pub mod store;
pub mod supabase_store;
pub mod directory;
pub mod locks;
pub mod booking;
pub mod cancellation;
pub mod listing;

pub use time_rules::{Clock, FixedClock, SystemClock};
pub use store::{AppointmentStore, InMemoryAppointmentStore};
pub use supabase_store::SupabaseAppointmentStore;
pub use directory::{InMemoryProviderDirectory, ProviderDirectory, SupabaseProviderDirectory};
pub use locks::KeyedLocks;
pub use booking::BookingService;
pub use cancellation::CancellationService;
pub use listing::AppointmentListingService;
