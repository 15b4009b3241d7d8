// Reverse-bidding store: live sessions plus the leaderboard of the session being viewed.

use chrono::Utc;
use tokio::sync::{Mutex, watch};

use super::fence::{RequestFence, Ticket};
use crate::api::{ApiClient, LeaderboardPayload};
use crate::config::Settings;
use crate::error::{ApiError, AppResult, ErrorCode};
use crate::leaderboard::Leaderboard;
use crate::models::{Bid, Session};

pub const INVALID_AMOUNT_MESSAGE: &str = "Enter a bid amount greater than zero.";
pub const SESSION_ENDED_MESSAGE: &str = "This bidding session has ended.";

/// The dealer using this client. Bids placed here are tagged with it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Viewer {
    pub dealer_id: i64,
    pub dealer_name: String,
}

impl Viewer {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            dealer_id: settings.dealer_id.unwrap_or_default(),
            dealer_name: settings.dealer_name.clone().unwrap_or_else(|| "You".to_string()),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct BiddingState {
    pub sessions: Vec<Session>,
    pub current_session: Option<Session>,
    pub leaderboard: Leaderboard,
    pub error: Option<String>,
    pub error_code: Option<ErrorCode>,
    pub in_flight: usize,
}

impl BiddingState {
    pub fn session(&self, session_id: i64) -> Option<&Session> {
        self.current_session
            .as_ref()
            .filter(|s| s.id == session_id)
            .or_else(|| self.sessions.iter().find(|s| s.id == session_id))
    }

    pub fn active_sessions(&self) -> Vec<&Session> {
        self.sessions.iter().filter(|s| s.is_active()).collect()
    }

    pub fn leading_bid(&self) -> Option<&Bid> {
        self.leaderboard.leader()
    }

    pub fn own_bid(&self) -> Option<&Bid> {
        self.leaderboard.own_bid()
    }

    pub fn own_rank(&self) -> Option<usize> {
        self.own_bid().map(|bid| bid.rank)
    }

    pub fn is_loading(&self) -> bool {
        self.in_flight > 0
    }

    fn is_current(&self, session_id: i64) -> bool {
        self.current_session.as_ref().is_some_and(|s| s.id == session_id)
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

    fn apply_leaderboard(&mut self, payload: LeaderboardPayload) {
        self.leaderboard = Leaderboard::from_bids(payload.bids);
        if let Some(listed) = self.sessions.iter_mut().find(|s| s.id == payload.session.id) {
            *listed = payload.session.clone();
        }
        self.current_session = Some(payload.session);
    }

    fn adjust_bid_count(&mut self, session_id: i64, added: bool) {
        let sessions = self.sessions.iter_mut().chain(self.current_session.as_mut());
        for session in sessions.filter(|s| s.id == session_id) {
            session.bid_count = if added {
                session.bid_count + 1
            } else {
                session.bid_count.saturating_sub(1)
            };
        }
    }

    /// Records a bid placed by the viewer. Returns the ranked copy if the
    /// session's leaderboard is the one loaded.
    fn apply_submitted(&mut self, session_id: i64, bid: Bid) -> Option<Bid> {
        self.adjust_bid_count(session_id, true);
        if !self.is_current(session_id) {
            return None;
        }
        let bid_id = bid.id;
        self.leaderboard.insert(bid);
        self.leaderboard.get(bid_id).cloned()
    }

    fn apply_withdrawn(&mut self, session_id: i64, bid_id: i64) -> Option<Bid> {
        self.adjust_bid_count(session_id, false);
        if !self.is_current(session_id) {
            return None;
        }
        self.leaderboard.remove(bid_id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum FenceKey {
    Sessions,
    // Which session's leaderboard is on display; the latest fetch started wins
    LeaderboardView,
    LeaderboardMutation(i64),
}

pub struct BiddingStore {
    client: ApiClient,
    viewer: Viewer,
    state: watch::Sender<BiddingState>,
    fence: Mutex<RequestFence<FenceKey>>,
}

impl BiddingStore {
    pub fn new(client: ApiClient, viewer: Viewer) -> Self {
        let (state, _) = watch::channel(BiddingState::default());
        Self {
            client,
            viewer,
            state,
            fence: Mutex::new(RequestFence::new()),
        }
    }

    pub fn viewer(&self) -> &Viewer {
        &self.viewer
    }

    pub fn subscribe(&self) -> watch::Receiver<BiddingState> {
        self.state.subscribe()
    }

    pub fn snapshot(&self) -> BiddingState {
        self.state.borrow().clone()
    }

    async fn begin(&self) -> Ticket {
        let ticket = self.fence.lock().await.issue();
        self.state.send_modify(BiddingState::start_request);
        ticket
    }

    fn fail(&self, err: &ApiError) {
        self.state.send_modify(|s| {
            s.finish_request();
            s.record_error(err);
        });
    }

    fn reject(&self, message: &str) -> ApiError {
        let err = ApiError::Validation(message.to_string());
        self.state.send_modify(|s| s.record_error(&err));
        err
    }

    pub async fn fetch_sessions(&self) -> AppResult<Vec<Session>> {
        let ticket = self.begin().await;
        match self.client.list_sessions().await {
            Ok(list) => {
                let accepted = self.fence.lock().await.accept(FenceKey::Sessions, ticket);
                let sessions = list.sessions.clone();
                self.state.send_modify(|s| {
                    s.finish_request();
                    if accepted {
                        s.sessions = list.sessions;
                    }
                });
                if accepted {
                    tracing::info!(count = sessions.len(), "Bidding sessions loaded");
                } else {
                    tracing::warn!("Discarding stale session list");
                }
                Ok(sessions)
            }
            Err(e) => {
                tracing::warn!(error = %e, "Failed to load bidding sessions");
                self.fail(&e);
                Err(e)
            }
        }
    }

    /// Loads `session_id` as the current session together with its ranked bids.
    ///
    /// The payload is not applied when a fetch started later has already been
    /// applied, or when a bid on this already-loaded session was placed or
    /// withdrawn after this fetch started. The caller still gets the payload.
    pub async fn fetch_leaderboard(&self, session_id: i64) -> AppResult<Leaderboard> {
        let ticket = self.begin().await;
        match self.client.fetch_leaderboard(session_id).await {
            Ok(payload) => {
                let leaderboard = Leaderboard::from_bids(payload.bids.clone());
                let mut fence = self.fence.lock().await;
                let latest_view = fence.accept(FenceKey::LeaderboardView, ticket);
                let mutated = fence.is_superseded(&FenceKey::LeaderboardMutation(session_id), ticket);
                let mut applied = false;
                self.state.send_modify(|s| {
                    s.finish_request();
                    // A bid placed on the loaded board after this fetch started is newer than the payload
                    if latest_view && !(mutated && s.is_current(session_id)) {
                        s.apply_leaderboard(payload);
                        applied = true;
                    }
                });
                if applied {
                    tracing::info!(session_id, bids = leaderboard.len(), "Leaderboard loaded");
                } else {
                    tracing::warn!(session_id, "Discarding stale leaderboard");
                }
                Ok(leaderboard)
            }
            Err(e) => {
                tracing::warn!(session_id, error = %e, "Failed to load leaderboard");
                self.fail(&e);
                Err(e)
            }
        }
    }

    /// Places a bid of `amount` for the viewer and ranks it into the loaded leaderboard.
    pub async fn submit_bid(&self, session_id: i64, amount: f64, perks: Option<String>) -> AppResult<Bid> {
        if !amount.is_finite() || amount <= 0.0 {
            return Err(self.reject(INVALID_AMOUNT_MESSAGE));
        }
        let ended = self.state.borrow().session(session_id).is_some_and(|s| !s.is_active());
        if ended {
            return Err(self.reject(SESSION_ENDED_MESSAGE));
        }

        let ticket = self.begin().await;
        match self.client.submit_bid(session_id, amount, perks.clone()).await {
            Ok(receipt) => {
                let bid = Bid {
                    id: receipt.id,
                    dealer_id: self.viewer.dealer_id,
                    dealer_name: self.viewer.dealer_name.clone(),
                    dealer_name_anonymized: String::new(),
                    price: amount,
                    perks,
                    rank: 0,
                    submitted_at: receipt.submitted_at.unwrap_or_else(Utc::now),
                    is_current_dealer: true,
                };
                let mut fence = self.fence.lock().await;
                fence.accept(FenceKey::LeaderboardMutation(session_id), ticket);
                let mut ranked = None;
                let stored = bid.clone();
                self.state.send_modify(|s| {
                    s.finish_request();
                    ranked = s.apply_submitted(session_id, stored);
                });
                let bid = ranked.unwrap_or(bid);
                tracing::info!(session_id, bid_id = bid.id, rank = bid.rank, "Bid submitted");
                Ok(bid)
            }
            Err(e) => {
                tracing::warn!(session_id, error = %e, "Bid submission failed");
                self.fail(&e);
                Err(e)
            }
        }
    }

    pub async fn withdraw_bid(&self, session_id: i64, bid_id: i64) -> AppResult<()> {
        let ticket = self.begin().await;
        match self.client.withdraw_bid(session_id, bid_id).await {
            Ok(()) => {
                let mut fence = self.fence.lock().await;
                fence.accept(FenceKey::LeaderboardMutation(session_id), ticket);
                let mut removed = None;
                self.state.send_modify(|s| {
                    s.finish_request();
                    removed = s.apply_withdrawn(session_id, bid_id);
                });
                if removed.is_none() {
                    tracing::debug!(session_id, bid_id, "Withdrawn bid was not in the loaded leaderboard");
                }
                tracing::info!(session_id, bid_id, "Bid withdrawn");
                Ok(())
            }
            Err(e) => {
                tracing::warn!(session_id, bid_id, error = %e, "Bid withdrawal failed");
                self.fail(&e);
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::leaderboard::tests::bid;
    use crate::models::SessionStatus;

    fn session(id: i64, status: SessionStatus, bid_count: u32) -> Session {
        Session {
            id,
            make: Some("Toyota".into()),
            model: Some("Camry".into()),
            year: Some(2025),
            trim: None,
            status,
            expires_at: None,
            time_left: Some(3600),
            bid_count,
        }
    }

    fn loaded_state() -> BiddingState {
        let mut state = BiddingState {
            sessions: vec![session(1, SessionStatus::Active, 2), session(2, SessionStatus::Ended, 5)],
            ..BiddingState::default()
        };
        state.apply_leaderboard(LeaderboardPayload {
            session: session(1, SessionStatus::Active, 2),
            bids: vec![bid(10, 22_000.0, 1), bid(11, 20_500.0, 2)],
        });
        state
    }

    #[test]
    fn submitted_bid_is_ranked_and_counted() {
        let mut state = loaded_state();
        let mut own = bid(12, 21_000.0, 3);
        own.is_current_dealer = true;

        let ranked = state.apply_submitted(1, own).unwrap();

        assert_eq!(ranked.rank, 2);
        assert_eq!(state.own_rank(), Some(2));
        assert_eq!(state.leading_bid().map(|b| b.id), Some(11));
        assert_eq!(state.sessions[0].bid_count, 3);
        assert_eq!(state.current_session.as_ref().unwrap().bid_count, 3);
    }

    #[test]
    fn bid_for_other_session_only_touches_counts() {
        let mut state = loaded_state();
        assert!(state.apply_submitted(2, bid(20, 18_000.0, 1)).is_none());
        assert_eq!(state.leaderboard.len(), 2);
        assert_eq!(state.sessions[1].bid_count, 6);
    }

    #[test]
    fn withdrawn_bid_is_removed_and_reranked() {
        let mut state = loaded_state();
        let removed = state.apply_withdrawn(1, 11).unwrap();
        assert_eq!(removed.id, 11);
        assert_eq!(state.leaderboard.bids()[0].rank, 1);
        assert_eq!(state.leaderboard.bids()[0].id, 10);
        assert_eq!(state.sessions[0].bid_count, 1);
    }

    #[test]
    fn session_lookup_and_active_filter() {
        let state = loaded_state();
        assert!(state.session(2).is_some_and(|s| !s.is_active()));
        assert_eq!(state.active_sessions().len(), 1);
        assert!(state.session(99).is_none());
    }
}
