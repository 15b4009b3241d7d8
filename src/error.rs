// Error types shared by the HTTP client wrapper and the stores.

use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const NETWORK_ERROR_MESSAGE: &str = "Network error. Please check your connection and try again.";
pub const FALLBACK_ERROR_MESSAGE: &str = "Something went wrong. Please try again.";

/// Machine-readable reason sent by the backend alongside `success: false`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    /// The customer already has a non-cancelled appointment with this dealer.
    DuplicateActiveAppointment,
    SlotUnavailable,
    OutsideBusinessHours,
    TooSoon,
    InvalidTransition,
    NotFound,
    Unauthorized,
    SessionEnded,
    /// The response carried no `code` field.
    Unspecified,
    #[serde(other)]
    Unknown,
}

impl ErrorCode {
    /// A friendlier hint to show next to the server's message, when one exists.
    pub fn tip(self) -> Option<&'static str> {
        match self {
            ErrorCode::DuplicateActiveAppointment => Some(
                "You already have an appointment with this dealer. \
                 Reschedule or cancel it instead of booking a new one.",
            ),
            ErrorCode::SlotUnavailable => Some("That time is taken. Try another slot."),
            ErrorCode::OutsideBusinessHours => Some("Pick a time within the dealership's opening hours."),
            ErrorCode::TooSoon => Some("Appointments need at least 2 hours notice."),
            ErrorCode::SessionEnded => Some("This bidding session is closed."),
            _ => None,
        }
    }
}

#[derive(Debug, Error)]
pub enum ApiError {
    /// The backend answered with `success: false` and a human-readable message.
    #[error("request rejected ({status}): {message}")]
    Rejected {
        code: ErrorCode,
        message: String,
        status: StatusCode,
    },
    /// No response was received.
    #[error("transport failure: {0}")]
    Transport(#[source] reqwest::Error),
    /// A response arrived but matched neither a success nor a failure payload.
    #[error("unexpected response: {0}")]
    UnexpectedResponse(String),
    /// Advisory client-side check failed; nothing was sent.
    #[error("{0}")]
    Validation(String),
    #[error("failed to build HTTP client: {0}")]
    ClientBuild(#[source] reqwest::Error),
}

impl ApiError {
    /// Message a store records for display.
    pub fn user_message(&self) -> String {
        match self {
            ApiError::Rejected { message, .. } => message.clone(),
            ApiError::Transport(_) => NETWORK_ERROR_MESSAGE.to_string(),
            ApiError::Validation(message) => message.clone(),
            ApiError::UnexpectedResponse(_) | ApiError::ClientBuild(_) => FALLBACK_ERROR_MESSAGE.to_string(),
        }
    }

    pub fn code(&self) -> Option<ErrorCode> {
        match self {
            ApiError::Rejected { code, .. } => Some(*code),
            _ => None,
        }
    }
}

pub type AppResult<T> = Result<T, ApiError>;
