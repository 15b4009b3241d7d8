mod common;

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{NaiveDate, NaiveDateTime, TimeDelta};
use serde_json::{Value, json};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;

use common::{Recorder, dead_backend, spawn_backend};
use dealer_portal::error::{FALLBACK_ERROR_MESSAGE, NETWORK_ERROR_MESSAGE};
use dealer_portal::models::{AppointmentStatus, UNAVAILABLE_PLACEHOLDER};
use dealer_portal::store::Clock;
use dealer_portal::store::appointments::RESCHEDULE_TOO_SOON_MESSAGE;
use dealer_portal::{ApiClient, ApiError, AppointmentStore, ErrorCode};

struct FixedClock(NaiveDateTime);

impl Clock for FixedClock {
    fn now(&self) -> NaiveDateTime {
        self.0
    }
}

fn now() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2026, 10, 19).unwrap().and_hms_opt(10, 0, 0).unwrap()
}

fn appointment(id: i64, status: &str, start_time: &str) -> Value {
    json!({
        "id": id,
        "status": status,
        "start_time": start_time,
        "notes": null,
        "dealer_id": 7,
        "dealer_name": "Northside Motors",
        "dealer_email": "sales@northside.example",
        "can_reschedule": true
    })
}

async fn list(State(recorder): State<Recorder>, Query(query): Query<HashMap<String, String>>) -> Json<Value> {
    recorder.record("list", json!(query));
    let page: u32 = query.get("page").and_then(|p| p.parse().ok()).unwrap_or(1);
    let per_page: u32 = query.get("per_page").and_then(|p| p.parse().ok()).unwrap_or(10);
    Json(json!({
        "success": true,
        "data": [
            appointment(42, "pending", "2026-10-21 09:30:00"),
            appointment(43, "confirmed", "0000-00-00 00:00:00"),
        ],
        "pagination": { "current_page": page, "per_page": per_page, "total": 2, "last_page": 1 }
    }))
}

async fn schedule(State(recorder): State<Recorder>, Json(body): Json<Value>) -> Response {
    recorder.record("schedule", body.clone());
    if body["customer_id"] == 99 {
        return (
            StatusCode::UNPROCESSABLE_ENTITY,
            Json(json!({
                "success": false,
                "message": "You already have an appointment scheduled with this dealer.",
                "code": "duplicate_active_appointment"
            })),
        )
            .into_response();
    }
    let start = body["start_time"].as_str().unwrap_or_default();
    Json(json!({ "success": true, "appointment": appointment(100, "pending", start) })).into_response()
}

async fn cancel(State(recorder): State<Recorder>, Json(body): Json<Value>) -> Json<Value> {
    recorder.record("cancel", body.clone());
    let id = body["appointment_id"].as_i64().unwrap_or_default();
    let mut cancelled = appointment(id, "cancelled", "2026-10-21 09:30:00");
    cancelled["notes"] = body["notes"].clone();
    cancelled["can_reschedule"] = json!(false);
    Json(json!({ "success": true, "appointment": cancelled }))
}

async fn reschedule(State(recorder): State<Recorder>, Json(body): Json<Value>) -> Json<Value> {
    recorder.record("reschedule", body.clone());
    let id = body["appointment_id"].as_i64().unwrap_or_default();
    let start = body["new_start_time"].as_str().unwrap_or_default();
    Json(json!({ "success": true, "appointment": appointment(id, "pending", start) }))
}

async fn update_status(State(recorder): State<Recorder>, Json(body): Json<Value>) -> Json<Value> {
    recorder.record("update-status", body.clone());
    let id = body["appointment_id"].as_i64().unwrap_or_default();
    let status = body["status"].as_str().unwrap_or_default();
    Json(json!({ "success": true, "appointment": appointment(id, status, "2026-10-21 09:30:00") }))
}

async fn backend(recorder: &Recorder) -> AppointmentStore {
    let api = Router::new()
        .route("/appointments", get(list))
        .route("/appointments/schedule", post(schedule))
        .route("/appointments/cancel", post(cancel))
        .route("/appointments/reschedule", post(reschedule))
        .route("/appointments/update-status", post(update_status))
        .with_state(recorder.clone());
    let base_url = spawn_backend(api).await;
    AppointmentStore::with_clock(ApiClient::from_base_url(base_url).unwrap(), Arc::new(FixedClock(now())))
}

// Slow responses are held this long; the racing request starts after HEAD_START.
const SLOW: Duration = Duration::from_millis(300);
const HEAD_START: Duration = Duration::from_millis(50);

fn paged(page: u32, per_page: u32) -> Json<Value> {
    let data = match page {
        1 => vec![
            appointment(1, "pending", "2026-10-21 09:30:00"),
            appointment(2, "confirmed", "2026-10-22 11:00:00"),
        ],
        _ => vec![
            appointment(11, "pending", "2026-10-23 09:30:00"),
            appointment(12, "confirmed", "2026-10-24 15:00:00"),
        ],
    };
    Json(json!({
        "success": true,
        "data": data,
        "pagination": { "current_page": page, "per_page": per_page, "total": 4, "last_page": 2 }
    }))
}

/// Two pages of two appointments. `slow_page` and every status update answer after `SLOW`.
async fn racing_backend(recorder: &Recorder, slow_page: u32) -> AppointmentStore {
    let api = Router::new()
        .route(
            "/appointments",
            get(move |Query(query): Query<HashMap<String, String>>| async move {
                let page: u32 = query.get("page").and_then(|p| p.parse().ok()).unwrap_or(1);
                let per_page: u32 = query.get("per_page").and_then(|p| p.parse().ok()).unwrap_or(2);
                if page == slow_page {
                    sleep(SLOW).await;
                }
                paged(page, per_page)
            }),
        )
        .route("/appointments/schedule", post(schedule))
        .route("/appointments/cancel", post(cancel))
        .route(
            "/appointments/update-status",
            post(|recorder: State<Recorder>, body: Json<Value>| async move {
                sleep(SLOW).await;
                update_status(recorder, body).await
            }),
        )
        .with_state(recorder.clone());
    let base_url = spawn_backend(api).await;
    AppointmentStore::with_clock(ApiClient::from_base_url(base_url).unwrap(), Arc::new(FixedClock(now())))
}

fn ids(store: &AppointmentStore) -> Vec<i64> {
    store.snapshot().appointments.iter().map(|a| a.id).collect()
}

#[tokio::test]
async fn fetch_replaces_list_and_records_pagination() {
    let recorder = Recorder::default();
    let store = backend(&recorder).await;
    let mut updates = store.subscribe();

    let pagination = store.fetch(2, 5).await.unwrap();

    assert_eq!(pagination.current_page, 2);
    assert_eq!(pagination.per_page, 5);
    let sent = &recorder.bodies("list")[0];
    assert_eq!(sent["page"], "2");
    assert_eq!(sent["per_page"], "5");

    assert!(updates.has_changed().unwrap());
    let state = updates.borrow_and_update().clone();
    assert_eq!(state.appointments.len(), 2);
    assert!(state.has_appointments);
    assert!(!state.is_loading());
    assert!(state.error.is_none());

    let unavailable = state.find(43).unwrap();
    assert!(!unavailable.start_time.is_available());
    assert_eq!(unavailable.start_time.to_string(), UNAVAILABLE_PLACEHOLDER);
}

#[tokio::test]
async fn create_appends_server_copy() {
    let recorder = Recorder::default();
    let store = backend(&recorder).await;
    store.fetch(1, 10).await.unwrap();

    let at = NaiveDate::from_ymd_opt(2026, 10, 25).unwrap().and_hms_opt(14, 15, 33).unwrap();
    let created = store.create(5, at, Some("Test drive".into())).await.unwrap();

    assert_eq!(created.id, 100);
    let sent = &recorder.bodies("schedule")[0];
    assert_eq!(sent["customer_id"], 5);
    assert_eq!(sent["start_time"], "2026-10-25 14:15:00");
    assert_eq!(sent["notes"], "Test drive");

    let state = store.snapshot();
    assert_eq!(state.appointments.len(), 3);
    assert!(state.has_appointments);
    assert_eq!(state.appointments.last().unwrap().id, 100);
}

#[tokio::test]
async fn create_on_empty_store_sets_flag() {
    let recorder = Recorder::default();
    let store = backend(&recorder).await;
    assert!(!store.snapshot().has_appointments);

    let at = now() + TimeDelta::days(3);
    store.create(5, at, None).await.unwrap();

    let state = store.snapshot();
    assert_eq!(state.appointments.len(), 1);
    assert!(state.has_appointments);
}

#[tokio::test]
async fn duplicate_appointment_surfaces_message_and_code() {
    let recorder = Recorder::default();
    let store = backend(&recorder).await;
    store.fetch(1, 10).await.unwrap();
    let before = store.snapshot().appointments;

    let err = store.create(99, now() + TimeDelta::days(1), None).await.unwrap_err();

    match &err {
        ApiError::Rejected { code, message, status } => {
            assert_eq!(*code, ErrorCode::DuplicateActiveAppointment);
            assert_eq!(message, "You already have an appointment scheduled with this dealer.");
            assert_eq!(status.as_u16(), 422);
        }
        other => panic!("expected rejection, got {other:?}"),
    }
    let state = store.snapshot();
    assert_eq!(state.appointments, before);
    assert_eq!(state.error.as_deref(), Some("You already have an appointment scheduled with this dealer."));
    assert_eq!(state.error_code, Some(ErrorCode::DuplicateActiveAppointment));
}

#[tokio::test]
async fn cancel_updates_status_in_place() {
    let recorder = Recorder::default();
    let store = backend(&recorder).await;
    store.fetch(1, 10).await.unwrap();

    let cancelled = store.cancel(42, Some("Bought elsewhere".into())).await.unwrap();

    assert_eq!(cancelled.status, AppointmentStatus::Cancelled);
    let state = store.snapshot();
    assert_eq!(state.appointments.len(), 2);
    let stored = state.find(42).unwrap();
    assert_eq!(stored.status, AppointmentStatus::Cancelled);
    assert_eq!(stored.notes.as_deref(), Some("Bought elsewhere"));
    assert!(!stored.can_reschedule);
    assert_eq!(state.appointments[0].id, 42);
}

#[tokio::test]
async fn reschedule_within_two_hours_is_blocked_locally() {
    let recorder = Recorder::default();
    let store = backend(&recorder).await;
    store.fetch(1, 10).await.unwrap();
    let requests_before = recorder.count();

    let err = store.reschedule(42, now() + TimeDelta::hours(1), None).await.unwrap_err();

    assert!(matches!(err, ApiError::Validation(_)));
    assert_eq!(recorder.count(), requests_before);
    let state = store.snapshot();
    assert_eq!(state.error.as_deref(), Some(RESCHEDULE_TOO_SOON_MESSAGE));
    assert_eq!(state.find(42).unwrap().start_time.to_string(), "Oct 21, 2026 9:30 AM");
}

#[tokio::test]
async fn reschedule_replaces_record_with_server_copy() {
    let recorder = Recorder::default();
    let store = backend(&recorder).await;
    store.fetch(1, 10).await.unwrap();

    let new_time = now() + TimeDelta::hours(3);
    store.reschedule(42, new_time, Some("Later please".into())).await.unwrap();

    let sent = &recorder.bodies("reschedule")[0];
    assert_eq!(sent["new_start_time"], "2026-10-19 13:00:00");
    let state = store.snapshot();
    assert_eq!(state.appointments.len(), 2);
    assert_eq!(state.find(42).unwrap().start_time.value(), Some(new_time));
}

#[tokio::test]
async fn confirm_sends_status_and_updates_in_place() {
    let recorder = Recorder::default();
    let store = backend(&recorder).await;
    store.fetch(1, 10).await.unwrap();

    store.confirm(42).await.unwrap();

    assert_eq!(recorder.bodies("update-status")[0]["status"], "confirmed");
    let state = store.snapshot();
    assert_eq!(state.appointments.len(), 2);
    assert_eq!(state.find(42).unwrap().status, AppointmentStatus::Confirmed);
}

#[tokio::test]
async fn network_failure_leaves_list_untouched() {
    let recorder = Recorder::default();
    let store = backend(&recorder).await;
    store.fetch(1, 10).await.unwrap();

    let offline = AppointmentStore::new(ApiClient::from_base_url(dead_backend().await).unwrap());
    let err = offline.fetch(1, 10).await.unwrap_err();
    assert!(matches!(err, ApiError::Transport(_)));
    let state = offline.snapshot();
    assert_eq!(state.error.as_deref(), Some(NETWORK_ERROR_MESSAGE));
    assert!(state.appointments.is_empty());
    assert!(!state.is_loading());

    let err = offline.cancel(42, None).await.unwrap_err();
    assert!(matches!(err, ApiError::Transport(_)));
}

#[tokio::test]
async fn unexpected_response_uses_fallback_message() {
    let api = Router::new()
        .route("/appointments", get(|| async { (StatusCode::OK, Json(json!({ "success": true }))) }))
        .route(
            "/appointments/cancel",
            post(|| async { (StatusCode::INTERNAL_SERVER_ERROR, "<html>upstream error</html>") }),
        );
    let store = AppointmentStore::new(ApiClient::from_base_url(spawn_backend(api).await).unwrap());

    let err = store.fetch(1, 10).await.unwrap_err();
    assert!(matches!(err, ApiError::UnexpectedResponse(_)));

    let err = store.cancel(42, None).await.unwrap_err();
    assert!(matches!(err, ApiError::UnexpectedResponse(_)));
    let state = store.snapshot();
    assert_eq!(state.error.as_deref(), Some(FALLBACK_ERROR_MESSAGE));
    assert!(state.error_code.is_none());
}

#[tokio::test]
async fn older_update_for_same_appointment_is_dropped() {
    let recorder = Recorder::default();
    let store = racing_backend(&recorder, 0).await;
    store.fetch(1, 2).await.unwrap();

    let (confirmed, cancelled) = tokio::join!(store.confirm(1), async {
        sleep(HEAD_START).await;
        store.cancel(1, None).await
    });

    // The caller still sees what the server answered
    assert_eq!(confirmed.unwrap().status, AppointmentStatus::Confirmed);
    assert_eq!(cancelled.unwrap().status, AppointmentStatus::Cancelled);
    let state = store.snapshot();
    assert_eq!(state.find(1).unwrap().status, AppointmentStatus::Cancelled);
    assert!(!state.is_loading());
}

#[tokio::test]
async fn slow_page_keeps_newer_copy_of_listed_record() {
    let recorder = Recorder::default();
    let store = racing_backend(&recorder, 1).await;
    store.fetch(1, 2).await.unwrap();

    let (fetched, cancelled) = tokio::join!(store.fetch(1, 2), async {
        sleep(HEAD_START).await;
        store.cancel(1, None).await
    });
    fetched.unwrap();
    cancelled.unwrap();

    assert_eq!(ids(&store), vec![1, 2]);
    assert_eq!(store.snapshot().find(1).unwrap().status, AppointmentStatus::Cancelled);
}

#[tokio::test]
async fn slow_page_replaces_records_from_other_page() {
    let recorder = Recorder::default();
    let store = racing_backend(&recorder, 2).await;
    store.fetch(1, 2).await.unwrap();

    let (fetched, cancelled, created) = tokio::join!(
        store.fetch(2, 2),
        async {
            sleep(HEAD_START).await;
            store.cancel(1, None).await
        },
        async {
            sleep(HEAD_START).await;
            store.create(5, now() + TimeDelta::days(2), None).await
        }
    );
    cancelled.unwrap();
    assert_eq!(created.unwrap().id, 100);

    // The cancelled record belongs to page 1; the new one stays visible
    assert_eq!(fetched.unwrap().current_page, 2);
    assert_eq!(ids(&store), vec![11, 12, 100]);
    assert_eq!(store.snapshot().pagination.current_page, 2);
}

#[tokio::test]
async fn older_page_fetch_is_dropped() {
    let recorder = Recorder::default();
    let store = racing_backend(&recorder, 1).await;

    let (first, second) = tokio::join!(store.fetch(1, 2), async {
        sleep(HEAD_START).await;
        store.fetch(2, 2).await
    });
    first.unwrap();
    second.unwrap();

    assert_eq!(ids(&store), vec![11, 12]);
    assert_eq!(store.snapshot().pagination.current_page, 2);
}
