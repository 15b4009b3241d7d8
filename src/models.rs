// Data structures exchanged with the dealership backend.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// Value the backend sends when a timestamp is not set.
pub const UNAVAILABLE_TIMESTAMP: &str = "0000-00-00 00:00:00";
pub const UNAVAILABLE_PLACEHOLDER: &str = "Not available";

const SERVER_FORMAT: &str = "%Y-%m-%d %H:%M:%S";
// Appointment start times are always sent with zeroed seconds
const START_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:00";
const DISPLAY_FORMAT: &str = "%b %-d, %Y %-I:%M %p";

/// A server timestamp that may be absent.
///
/// The sentinel `0000-00-00 00:00:00`, empty strings, `null` and anything
/// that does not parse all become `None`; they are never turned into a date.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord)]
pub struct ServerTimestamp(Option<NaiveDateTime>);

impl ServerTimestamp {
    pub fn new(value: NaiveDateTime) -> Self {
        Self(Some(value))
    }

    pub fn unavailable() -> Self {
        Self(None)
    }

    pub fn parse(raw: &str) -> Self {
        let raw = raw.trim();
        if raw.is_empty() || raw == UNAVAILABLE_TIMESTAMP {
            return Self(None);
        }
        let parsed = NaiveDateTime::parse_from_str(raw, SERVER_FORMAT)
            .or_else(|_| NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S"))
            .or_else(|_| DateTime::parse_from_rfc3339(raw).map(|dt| dt.naive_local()))
            .ok();
        if parsed.is_none() {
            tracing::debug!(raw, "Treating unparseable timestamp as unavailable");
        }
        Self(parsed)
    }

    pub fn value(&self) -> Option<NaiveDateTime> {
        self.0
    }

    pub fn is_available(&self) -> bool {
        self.0.is_some()
    }
}

impl fmt::Display for ServerTimestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            Some(value) => f.pad(&value.format(DISPLAY_FORMAT).to_string()),
            None => f.pad(UNAVAILABLE_PLACEHOLDER),
        }
    }
}

impl Serialize for ServerTimestamp {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self.0 {
            Some(value) => serializer.serialize_str(&value.format(SERVER_FORMAT).to_string()),
            None => serializer.serialize_none(),
        }
    }
}

impl<'de> Deserialize<'de> for ServerTimestamp {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw: Option<String> = Option::deserialize(deserializer)?;
        Ok(raw.as_deref().map(ServerTimestamp::parse).unwrap_or_default())
    }
}

/// Formats a requested start time the way the schedule/reschedule endpoints expect.
pub fn format_start_time(value: NaiveDateTime) -> String {
    value.format(START_TIME_FORMAT).to_string()
}

// --- Appointments ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AppointmentStatus {
    Pending,
    Confirmed,
    Cancelled,
    Completed,
    #[serde(other)]
    Unknown,
}

impl AppointmentStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            AppointmentStatus::Pending => "pending",
            AppointmentStatus::Confirmed => "confirmed",
            AppointmentStatus::Cancelled => "cancelled",
            AppointmentStatus::Completed => "completed",
            AppointmentStatus::Unknown => "unknown",
        }
    }

    pub fn is_active(self) -> bool {
        !matches!(self, AppointmentStatus::Cancelled)
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, AppointmentStatus::Cancelled | AppointmentStatus::Completed)
    }

    /// Transitions the backend normally allows. Only used to enable or hide
    /// actions; the backend still decides.
    pub fn can_transition_to(self, next: AppointmentStatus) -> bool {
        use AppointmentStatus::*;
        matches!(
            (self, next),
            (Pending, Confirmed) | (Pending, Cancelled) | (Confirmed, Cancelled) | (Confirmed, Completed)
        )
    }
}

impl fmt::Display for AppointmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Appointment {
    pub id: i64,
    pub status: AppointmentStatus,
    #[serde(default)]
    pub start_time: ServerTimestamp,
    #[serde(default)]
    pub end_time: ServerTimestamp,
    pub notes: Option<String>,
    pub dealer_id: Option<i64>,
    pub dealer_name: Option<String>,
    pub dealer_email: Option<String>,
    pub customer_id: Option<i64>,
    pub customer_name: Option<String>,
    #[serde(default)]
    pub can_reschedule: bool,
    #[serde(default)]
    pub created_at: ServerTimestamp,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pagination {
    #[serde(default)]
    pub current_page: u32,
    #[serde(default)]
    pub per_page: u32,
    #[serde(default)]
    pub total: u64,
    #[serde(default)]
    pub last_page: u32,
}

impl Pagination {
    pub fn has_next_page(&self) -> bool {
        self.current_page < self.last_page
    }
}

#[derive(Debug, Serialize)]
pub struct ScheduleRequest {
    pub customer_id: i64,
    pub start_time: String,
    pub notes: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct CancelRequest {
    pub appointment_id: i64,
    pub notes: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct RescheduleRequest {
    pub appointment_id: i64,
    pub new_start_time: String,
    pub notes: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct UpdateStatusRequest {
    pub appointment_id: i64,
    pub status: AppointmentStatus,
}

// --- Reverse bidding ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Active,
    // Anything the client does not recognise is treated as closed
    #[serde(other)]
    Ended,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    #[serde(alias = "sessionId")]
    pub id: i64,
    pub make: Option<String>,
    pub model: Option<String>,
    pub year: Option<u32>,
    pub trim: Option<String>,
    pub status: SessionStatus,
    pub expires_at: Option<DateTime<Utc>>,
    // Seconds remaining, as computed by the backend
    pub time_left: Option<i64>,
    #[serde(default)]
    pub bid_count: u32,
}

impl Session {
    pub fn is_active(&self) -> bool {
        self.status == SessionStatus::Active
    }

    pub fn vehicle_label(&self) -> String {
        let year = self.year.map(|y| y.to_string());
        [year.as_deref(), self.make.as_deref(), self.model.as_deref(), self.trim.as_deref()]
            .into_iter()
            .flatten()
            .filter(|part| !part.is_empty())
            .collect::<Vec<_>>()
            .join(" ")
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Bid {
    pub id: i64,
    pub dealer_id: i64,
    pub dealer_name: String,
    #[serde(default)]
    pub dealer_name_anonymized: String,
    // Lower is better
    pub price: f64,
    pub perks: Option<String>,
    #[serde(default)]
    pub rank: usize,
    pub submitted_at: DateTime<Utc>,
    #[serde(default)]
    pub is_current_dealer: bool,
}

#[derive(Debug, Serialize)]
pub struct BidRequest {
    pub amount: f64,
    pub perks: Option<String>,
}

/// Renders a price as dollars with thousands separators, e.g. `$21,000` or `$20,500.50`.
pub fn format_price(value: f64) -> String {
    let cents = (value * 100.0).round() as i64;
    let sign = if cents < 0 { "-" } else { "" };
    let cents = cents.unsigned_abs();
    let whole = (cents / 100).to_string();
    let mut grouped = String::with_capacity(whole.len() + whole.len() / 3);
    for (i, ch) in whole.chars().enumerate() {
        if i > 0 && (whole.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }
    match cents % 100 {
        0 => format!("{sign}${grouped}"),
        frac => format!("{sign}${grouped}.{frac:02}"),
    }
}
