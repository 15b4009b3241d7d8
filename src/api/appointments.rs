// Appointment endpoints.

use chrono::NaiveDateTime;
use serde::Deserialize;

use super::ApiClient;
use crate::error::AppResult;
use crate::models::{
    Appointment, AppointmentStatus, CancelRequest, Pagination, RescheduleRequest, ScheduleRequest,
    UpdateStatusRequest, format_start_time,
};

#[derive(Debug, Clone, Deserialize)]
pub struct AppointmentPage {
    pub data: Vec<Appointment>,
    #[serde(default)]
    pub pagination: Pagination,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppointmentEnvelope {
    pub appointment: Appointment,
}

impl ApiClient {
    pub async fn list_appointments(&self, page: u32, per_page: u32) -> AppResult<AppointmentPage> {
        tracing::debug!(page, per_page, "Fetching appointments page");
        let request = self
            .get("/appointments")
            .query(&[("page", page), ("per_page", per_page)]);
        self.execute(request, "GET /appointments").await
    }

    pub async fn schedule_appointment(
        &self,
        customer_id: i64,
        start_time: NaiveDateTime,
        notes: Option<String>,
    ) -> AppResult<Appointment> {
        let body = ScheduleRequest {
            customer_id,
            start_time: format_start_time(start_time),
            notes,
        };
        tracing::debug!(customer_id, start_time = %body.start_time, "Scheduling appointment");
        let request = self.post("/appointments/schedule").json(&body);
        let envelope: AppointmentEnvelope = self.execute(request, "POST /appointments/schedule").await?;
        Ok(envelope.appointment)
    }

    pub async fn cancel_appointment(&self, appointment_id: i64, notes: Option<String>) -> AppResult<Appointment> {
        let body = CancelRequest { appointment_id, notes };
        let request = self.post("/appointments/cancel").json(&body);
        let envelope: AppointmentEnvelope = self.execute(request, "POST /appointments/cancel").await?;
        Ok(envelope.appointment)
    }

    pub async fn reschedule_appointment(
        &self,
        appointment_id: i64,
        new_start_time: NaiveDateTime,
        notes: Option<String>,
    ) -> AppResult<Appointment> {
        let body = RescheduleRequest {
            appointment_id,
            new_start_time: format_start_time(new_start_time),
            notes,
        };
        let request = self.post("/appointments/reschedule").json(&body);
        let envelope: AppointmentEnvelope = self.execute(request, "POST /appointments/reschedule").await?;
        Ok(envelope.appointment)
    }

    pub async fn update_appointment_status(
        &self,
        appointment_id: i64,
        status: AppointmentStatus,
    ) -> AppResult<Appointment> {
        let body = UpdateStatusRequest { appointment_id, status };
        let request = self.post("/appointments/update-status").json(&body);
        let envelope: AppointmentEnvelope = self.execute(request, "POST /appointments/update-status").await?;
        Ok(envelope.appointment)
    }
}
