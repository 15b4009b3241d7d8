// Client-side state containers. All mutation goes through the store operations.

pub mod appointments;
pub mod bidding;
pub mod fence;

pub use appointments::{AppointmentState, AppointmentStore, Clock, SystemClock};
pub use bidding::{BiddingState, BiddingStore, Viewer};
