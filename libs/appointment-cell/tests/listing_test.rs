mod common;

use assert_matches::assert_matches;
use chrono::NaiveDate;

use appointment_cell::*;
use common::*;

#[tokio::test]
async fn test_user_list_is_ordered_and_enriched_with_provider() {
    let h = Harness::new();

    for (provider, raw) in [
        (OTHER_PROVIDER_ID, "2025-06-02T09:00:00Z"),
        (PROVIDER_ID, "2025-06-01T15:00:00Z"),
        (PROVIDER_ID, "2025-06-01T10:00:00Z"),
    ] {
        h.booking.create_appointment(USER_ID, provider, raw).await.unwrap();
    }
    h.booking
        .create_appointment(OTHER_USER_ID, PROVIDER_ID, "2025-06-01T11:00:00Z")
        .await
        .unwrap();

    let entries = h.listing.list_for_user(USER_ID, None).await.unwrap();

    let dates: Vec<_> = entries.iter().map(|e| e.view.appointment.date).collect();
    assert_eq!(
        dates,
        vec![at(2025, 6, 1, 10, 0, 0), at(2025, 6, 1, 15, 0, 0), at(2025, 6, 2, 9, 0, 0)]
    );

    let provider = entries[0].provider.as_ref().unwrap();
    assert_eq!(provider.name, "Dra Paula");
    assert_eq!(provider.avatar_url.as_deref(), Some("https://cdn.example.com/avatars/10.png"));
    assert_eq!(entries[2].provider.as_ref().unwrap().name, "Dr Rui");
}

#[tokio::test]
async fn test_user_list_excludes_cancelled_and_pages_by_twenty() {
    let h = Harness::new();

    for hour in 0..23 {
        let raw = format!("2025-06-02T{:02}:00:00Z", hour);
        h.booking.create_appointment(USER_ID, PROVIDER_ID, &raw).await.unwrap();
    }
    let first = h.listing.list_for_user(USER_ID, Some(1)).await.unwrap();
    h.cancellation
        .cancel_appointment(USER_ID, first[0].view.appointment.id)
        .await
        .unwrap();

    let page_one = h.listing.list_for_user(USER_ID, Some(1)).await.unwrap();
    let page_two = h.listing.list_for_user(USER_ID, Some(2)).await.unwrap();

    assert_eq!(page_one.len(), 20);
    assert_eq!(page_two.len(), 2);
    assert_eq!(page_one[0].view.appointment.date, at(2025, 6, 2, 1, 0, 0));
    assert!(page_one.iter().chain(&page_two).all(|e| e.view.appointment.is_active()));

    // Page zero is treated as the first page.
    let page_zero = h.listing.list_for_user(USER_ID, Some(0)).await.unwrap();
    assert_eq!(page_zero.len(), 20);
}

#[tokio::test]
async fn test_list_entries_carry_derived_flags() {
    let h = Harness::new();
    h.booking
        .create_appointment(USER_ID, PROVIDER_ID, "2025-05-31T13:00:00Z")
        .await
        .unwrap();

    let entries = h.listing.list_for_user(USER_ID, None).await.unwrap();
    assert!(!entries[0].view.past);
    assert!(!entries[0].view.cancelable);
}

#[tokio::test]
async fn test_schedule_covers_one_utc_day_for_provider() {
    let h = Harness::new();

    for (user, raw) in [
        (USER_ID, "2025-06-01T10:00:00Z"),
        (OTHER_USER_ID, "2025-06-01T08:00:00Z"),
        (USER_ID, "2025-06-02T00:00:00Z"),
    ] {
        h.booking.create_appointment(user, PROVIDER_ID, raw).await.unwrap();
    }
    h.booking
        .create_appointment(USER_ID, OTHER_PROVIDER_ID, "2025-06-01T09:00:00Z")
        .await
        .unwrap();

    let day = NaiveDate::from_ymd_opt(2025, 6, 1).unwrap();
    let schedule = h.listing.schedule_for_provider(PROVIDER_ID, day).await.unwrap();

    assert_eq!(schedule.len(), 2);
    assert_eq!(schedule[0].view.appointment.date, at(2025, 6, 1, 8, 0, 0));
    assert_eq!(schedule[0].user.as_ref().unwrap().name, "Carlos Souza");
    assert_eq!(schedule[1].user.as_ref().unwrap().name, "Maria Silva");
}

#[tokio::test]
async fn test_schedule_requires_provider() {
    let h = Harness::new();
    let day = NaiveDate::from_ymd_opt(2025, 6, 1).unwrap();

    let result = h.listing.schedule_for_provider(USER_ID, day).await;
    assert_matches!(result, Err(AppointmentError::NotAProvider));
}
