//! Client for the dealership backend: appointment scheduling and
//! reverse-bidding leaderboards, cached in observable in-memory stores.

pub mod api;
pub mod config;
pub mod error;
pub mod leaderboard;
pub mod models;
pub mod store;

pub use api::ApiClient;
pub use config::Settings;
pub use error::{ApiError, AppResult, ErrorCode};
pub use store::{AppointmentStore, BiddingStore};
