// Appointment store: the current actor's appointments, kept in step with the backend.
//
// Every mutation stores the record the backend returns. Nothing about the
// post-mutation record is computed locally, and cancellation is a status
// change, never a removal.

use chrono::{Local, NaiveDateTime, TimeDelta};
use std::sync::Arc;
use tokio::sync::{Mutex, watch};

use super::fence::{RequestFence, Ticket};
use crate::api::{ApiClient, AppointmentPage};
use crate::error::{ApiError, AppResult, ErrorCode};
use crate::models::{Appointment, AppointmentStatus, Pagination};

pub const MIN_RESCHEDULE_LEAD_HOURS: i64 = 2;
pub const RESCHEDULE_TOO_SOON_MESSAGE: &str = "Please choose a time at least 2 hours from now.";

/// Source of "now" for the advisory reschedule check.
pub trait Clock: Send + Sync {
    fn now(&self) -> NaiveDateTime;
}

/// Local wall clock; appointment times are exchanged as local times.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> NaiveDateTime {
        Local::now().naive_local()
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct AppointmentState {
    pub appointments: Vec<Appointment>,
    pub pagination: Pagination,
    pub has_appointments: bool,
    pub error: Option<String>,
    pub error_code: Option<ErrorCode>,
    pub in_flight: usize,
}

impl AppointmentState {
    pub fn find(&self, appointment_id: i64) -> Option<&Appointment> {
        self.appointments.iter().find(|a| a.id == appointment_id)
    }

    pub fn by_status(&self, status: AppointmentStatus) -> Vec<&Appointment> {
        self.appointments.iter().filter(|a| a.status == status).collect()
    }

    /// Non-cancelled, non-completed appointments starting at or after `now`, soonest first.
    /// Appointments without a start time are left out.
    pub fn upcoming(&self, now: NaiveDateTime) -> Vec<&Appointment> {
        let mut upcoming: Vec<&Appointment> = self
            .appointments
            .iter()
            .filter(|a| !a.status.is_terminal())
            .filter(|a| a.start_time.value().is_some_and(|start| start >= now))
            .collect();
        upcoming.sort_by_key(|a| a.start_time);
        upcoming
    }

    /// Appointments whose reschedule action should be enabled.
    pub fn reschedulable(&self) -> Vec<&Appointment> {
        self.appointments
            .iter()
            .filter(|a| a.can_reschedule && !a.status.is_terminal())
            .collect()
    }

    pub fn is_loading(&self) -> bool {
        self.in_flight > 0
    }

    // --- Reducers ---

    fn start_request(&mut self) {
        self.in_flight += 1;
        self.error = None;
        self.error_code = None;
    }

    fn finish_request(&mut self) {
        self.in_flight = self.in_flight.saturating_sub(1);
    }

    fn record_error(&mut self, err: &ApiError) {
        self.error = Some(err.user_message());
        self.error_code = err.code();
    }

    /// Replaces the list with `page`.
    ///
    /// For ids in the page, a local copy changed by a request newer than this
    /// fetch (`updated_since`) wins over the incoming one. Records created since
    /// the fetch started (`created_since`) stay appended. Anything else in the
    /// old list, including newer edits to records on other pages, is replaced.
    fn apply_page(
        &mut self,
        page: AppointmentPage,
        updated_since: impl Fn(i64) -> bool,
        created_since: impl Fn(i64) -> bool,
    ) {
        let mut previous = std::mem::take(&mut self.appointments);
        let mut merged: Vec<Appointment> = page
            .data
            .into_iter()
            .map(|incoming| {
                if updated_since(incoming.id) {
                    if let Some(pos) = previous.iter().position(|a| a.id == incoming.id) {
                        return previous.swap_remove(pos);
                    }
                }
                incoming
            })
            .collect();
        let created: Vec<Appointment> = previous
            .into_iter()
            .filter(|a| created_since(a.id) && !merged.iter().any(|m| m.id == a.id))
            .collect();
        merged.extend(created);

        self.has_appointments = !merged.is_empty() || page.pagination.total > 0;
        self.appointments = merged;
        self.pagination = page.pagination;
    }

    fn apply_created(&mut self, appointment: Appointment) {
        self.appointments.push(appointment);
        self.has_appointments = true;
    }

    /// Replaces the record with the same id. Returns false if it is not in the list.
    fn apply_updated(&mut self, appointment: Appointment) -> bool {
        match self.appointments.iter_mut().find(|a| a.id == appointment.id) {
            Some(existing) => {
                *existing = appointment;
                true
            }
            None => false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum FenceKey {
    List,
    Appointment(i64),
    Created(i64),
}

pub struct AppointmentStore {
    client: ApiClient,
    clock: Arc<dyn Clock>,
    state: watch::Sender<AppointmentState>,
    fence: Mutex<RequestFence<FenceKey>>,
}

impl AppointmentStore {
    pub fn new(client: ApiClient) -> Self {
        Self::with_clock(client, Arc::new(SystemClock))
    }

    pub fn with_clock(client: ApiClient, clock: Arc<dyn Clock>) -> Self {
        let (state, _) = watch::channel(AppointmentState::default());
        Self {
            client,
            clock,
            state,
            fence: Mutex::new(RequestFence::new()),
        }
    }

    /// Receiver notified after every state change.
    pub fn subscribe(&self) -> watch::Receiver<AppointmentState> {
        self.state.subscribe()
    }

    pub fn snapshot(&self) -> AppointmentState {
        self.state.borrow().clone()
    }

    pub fn now(&self) -> NaiveDateTime {
        self.clock.now()
    }

    async fn begin(&self) -> Ticket {
        let ticket = self.fence.lock().await.issue();
        self.state.send_modify(AppointmentState::start_request);
        ticket
    }

    fn fail(&self, err: &ApiError) {
        self.state.send_modify(|s| {
            s.finish_request();
            s.record_error(err);
        });
    }

    /// Loads one page, replacing the whole list on success.
    pub async fn fetch(&self, page: u32, per_page: u32) -> AppResult<Pagination> {
        let ticket = self.begin().await;
        match self.client.list_appointments(page, per_page).await {
            Ok(page_data) => {
                let pagination = page_data.pagination.clone();
                let mut fence = self.fence.lock().await;
                let accepted = fence.accept(FenceKey::List, ticket);
                self.state.send_modify(|s| {
                    s.finish_request();
                    if accepted {
                        s.apply_page(
                            page_data,
                            |id| fence.is_superseded(&FenceKey::Appointment(id), ticket),
                            |id| fence.is_superseded(&FenceKey::Created(id), ticket),
                        );
                    }
                });
                if accepted {
                    tracing::info!(page, per_page, total = pagination.total, "Appointments loaded");
                } else {
                    tracing::warn!(page, "Discarding stale appointments page");
                }
                Ok(pagination)
            }
            Err(e) => {
                tracing::warn!(page, error = %e, "Failed to load appointments");
                self.fail(&e);
                Err(e)
            }
        }
    }

    /// Requests a new appointment with `customer_id` at `start_time`.
    pub async fn create(
        &self,
        customer_id: i64,
        start_time: NaiveDateTime,
        notes: Option<String>,
    ) -> AppResult<Appointment> {
        let ticket = self.begin().await;
        match self.client.schedule_appointment(customer_id, start_time, notes).await {
            Ok(appointment) => {
                let mut fence = self.fence.lock().await;
                fence.accept(FenceKey::Appointment(appointment.id), ticket);
                fence.accept(FenceKey::Created(appointment.id), ticket);
                let stored = appointment.clone();
                self.state.send_modify(|s| {
                    s.finish_request();
                    s.apply_created(stored);
                });
                tracing::info!(appointment_id = appointment.id, customer_id, "Appointment scheduled");
                Ok(appointment)
            }
            Err(e) => {
                tracing::warn!(customer_id, error = %e, "Failed to schedule appointment");
                self.fail(&e);
                Err(e)
            }
        }
    }

    pub async fn cancel(&self, appointment_id: i64, notes: Option<String>) -> AppResult<Appointment> {
        let ticket = self.begin().await;
        let result = self.client.cancel_appointment(appointment_id, notes).await;
        self.settle_update(appointment_id, ticket, result, "cancel").await
    }

    /// Moves an appointment to `new_start_time`.
    ///
    /// Times less than two hours ahead are refused locally with a validation
    /// error and no request. The backend re-checks and may still refuse.
    pub async fn reschedule(
        &self,
        appointment_id: i64,
        new_start_time: NaiveDateTime,
        notes: Option<String>,
    ) -> AppResult<Appointment> {
        let earliest = self.clock.now() + TimeDelta::hours(MIN_RESCHEDULE_LEAD_HOURS);
        if new_start_time < earliest {
            let err = ApiError::Validation(RESCHEDULE_TOO_SOON_MESSAGE.to_string());
            tracing::debug!(appointment_id, %new_start_time, "Reschedule blocked: too soon");
            self.state.send_modify(|s| s.record_error(&err));
            return Err(err);
        }

        let ticket = self.begin().await;
        let result = self
            .client
            .reschedule_appointment(appointment_id, new_start_time, notes)
            .await;
        self.settle_update(appointment_id, ticket, result, "reschedule").await
    }

    pub async fn confirm(&self, appointment_id: i64) -> AppResult<Appointment> {
        let ticket = self.begin().await;
        let result = self
            .client
            .update_appointment_status(appointment_id, AppointmentStatus::Confirmed)
            .await;
        self.settle_update(appointment_id, ticket, result, "confirm").await
    }

    // Shared tail of cancel/reschedule/confirm
    async fn settle_update(
        &self,
        appointment_id: i64,
        ticket: Ticket,
        result: AppResult<Appointment>,
        action: &'static str,
    ) -> AppResult<Appointment> {
        match result {
            Ok(appointment) => {
                let mut fence = self.fence.lock().await;
                if !fence.accept(FenceKey::Appointment(appointment.id), ticket) {
                    tracing::warn!(appointment_id, action, "Discarding stale appointment response");
                    self.state.send_modify(AppointmentState::finish_request);
                    return Ok(appointment);
                }
                let stored = appointment.clone();
                let mut replaced = false;
                self.state.send_modify(|s| {
                    s.finish_request();
                    replaced = s.apply_updated(stored);
                });
                if !replaced {
                    tracing::debug!(appointment_id, action, "Updated appointment is not in the loaded page");
                }
                tracing::info!(appointment_id, action, status = %appointment.status, "Appointment updated");
                Ok(appointment)
            }
            Err(e) => {
                tracing::warn!(appointment_id, action, error = %e, "Appointment update failed");
                self.fail(&e);
                Err(e)
            }
        }
    }
}
