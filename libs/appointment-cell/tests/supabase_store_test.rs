use std::sync::Arc;

use assert_matches::assert_matches;
use chrono::{TimeZone, Utc};
use wiremock::matchers::{body_partial_json, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use appointment_cell::*;
use shared_database::SupabaseClient;
use shared_utils::test_utils::{MockSupabaseResponses, TestConfig};

fn client_for(server: &MockServer) -> Arc<SupabaseClient> {
    let config = TestConfig::with_supabase_url(&server.uri()).to_app_config();
    Arc::new(SupabaseClient::new(&config))
}

fn new_appointment() -> NewAppointment {
    NewAppointment {
        user_id: 1,
        provider_id: 10,
        date: Utc.with_ymd_and_hms(2025, 6, 1, 10, 0, 0).unwrap(),
        created_at: Utc.with_ymd_and_hms(2025, 5, 31, 12, 0, 0).unwrap(),
    }
}

#[tokio::test]
async fn test_insert_returns_stored_row() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/rest/v1/appointments"))
        .and(body_partial_json(serde_json::json!({ "user_id": 1, "provider_id": 10 })))
        .respond_with(
            ResponseTemplate::new(201)
                .set_body_json(vec![MockSupabaseResponses::appointment_row(42, 1, 10, "2025-06-01T10:00:00+00:00")]),
        )
        .expect(1)
        .mount(&server)
        .await;

    let store = SupabaseAppointmentStore::new(client_for(&server));
    let appointment = store.insert(new_appointment()).await.unwrap();

    assert_eq!(appointment.id, 42);
    assert_eq!(appointment.date, Utc.with_ymd_and_hms(2025, 6, 1, 10, 0, 0).unwrap());
    assert!(appointment.cancelled_at.is_none());
}

#[tokio::test]
async fn test_unique_violation_surfaces_as_slot_taken() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/rest/v1/appointments"))
        .respond_with(ResponseTemplate::new(409).set_body_json(MockSupabaseResponses::unique_violation()))
        .mount(&server)
        .await;

    let store = SupabaseAppointmentStore::new(client_for(&server));
    let result = store.insert(new_appointment()).await;

    assert_matches!(result, Err(StoreError::Conflict));
    assert_matches!(result.map_err(AppointmentError::from), Err(AppointmentError::SlotTaken));
}

#[tokio::test]
async fn test_find_active_slot_filters_by_provider_hour_and_state() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/rest/v1/appointments"))
        .and(query_param("provider_id", "eq.10"))
        .and(query_param("date", "eq.2025-06-01T10:00:00Z"))
        .and(query_param("cancelled_at", "is.null"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(vec![MockSupabaseResponses::appointment_row(7, 1, 10, "2025-06-01T10:00:00+00:00")]),
        )
        .mount(&server)
        .await;

    let store = SupabaseAppointmentStore::new(client_for(&server));
    let found = store
        .find_active_by_provider_and_hour(10, Utc.with_ymd_and_hms(2025, 6, 1, 10, 0, 0).unwrap())
        .await
        .unwrap();

    assert_eq!(found.map(|a| a.id), Some(7));
}

#[tokio::test]
async fn test_list_for_user_uses_offset_pagination() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/rest/v1/appointments"))
        .and(query_param("user_id", "eq.1"))
        .and(query_param("order", "date.asc"))
        .and(query_param("limit", "20"))
        .and(query_param("offset", "20"))
        .respond_with(ResponseTemplate::new(200).set_body_json(Vec::<serde_json::Value>::new()))
        .expect(1)
        .mount(&server)
        .await;

    let store = SupabaseAppointmentStore::new(client_for(&server));
    let page = store.list_active_for_user(1, 2, 20).await.unwrap();

    assert!(page.is_empty());
}

#[tokio::test]
async fn test_save_of_missing_row_is_backend_error() {
    let server = MockServer::start().await;
    Mock::given(method("PATCH"))
        .and(path("/rest/v1/appointments"))
        .and(query_param("id", "eq.5"))
        .respond_with(ResponseTemplate::new(200).set_body_json(Vec::<serde_json::Value>::new()))
        .mount(&server)
        .await;

    let store = SupabaseAppointmentStore::new(client_for(&server));
    let mut appointment = new_appointment().into_appointment(5);
    appointment.cancelled_at = Some(Utc::now());

    assert_matches!(store.save(&appointment).await, Err(StoreError::Backend(_)));
}

#[tokio::test]
async fn test_directory_reads_users_table() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/rest/v1/users"))
        .and(query_param("id", "eq.10"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(vec![MockSupabaseResponses::user_row(10, "Dra Paula", "paula@example.com", true)]),
        )
        .mount(&server)
        .await;

    let directory = SupabaseProviderDirectory::new(client_for(&server));
    let entry = directory.find(10).await.unwrap().unwrap();

    assert_eq!(entry.display_name, "Dra Paula");
    assert!(entry.is_provider);
}

#[tokio::test]
async fn test_directory_failure_is_reported() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/rest/v1/users"))
        .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
        .mount(&server)
        .await;

    let directory = SupabaseProviderDirectory::new(client_for(&server));
    assert_matches!(directory.find(10).await, Err(AppointmentError::DirectoryError(_)));
}
