// Reverse-bidding endpoints.

use chrono::{DateTime, Utc};
use serde::Deserialize;

use super::ApiClient;
use crate::error::AppResult;
use crate::models::{Bid, BidRequest, Session};

#[derive(Debug, Clone, Deserialize)]
pub struct SessionList {
    pub sessions: Vec<Session>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LeaderboardPayload {
    pub session: Session,
    #[serde(default)]
    pub bids: Vec<Bid>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BidReceipt {
    pub id: i64,
    pub submitted_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SubmitBidPayload {
    pub bid: BidReceipt,
}

// Withdraw answers with nothing but the success flag
#[derive(Debug, Deserialize)]
struct Acknowledged {}

impl ApiClient {
    pub async fn list_sessions(&self) -> AppResult<SessionList> {
        let request = self.get("/reverse-bidding/sessions");
        self.execute(request, "GET /reverse-bidding/sessions").await
    }

    pub async fn fetch_leaderboard(&self, session_id: i64) -> AppResult<LeaderboardPayload> {
        tracing::debug!(session_id, "Fetching leaderboard");
        let request = self.get(&format!("/reverse-bidding/sessions/{session_id}/leaderboard"));
        self.execute(request, "GET /reverse-bidding/sessions/:id/leaderboard").await
    }

    pub async fn submit_bid(&self, session_id: i64, amount: f64, perks: Option<String>) -> AppResult<BidReceipt> {
        let body = BidRequest { amount, perks };
        let request = self
            .post(&format!("/reverse-bidding/sessions/{session_id}/bids"))
            .json(&body);
        let payload: SubmitBidPayload = self
            .execute(request, "POST /reverse-bidding/sessions/:id/bids")
            .await?;
        Ok(payload.bid)
    }

    pub async fn withdraw_bid(&self, session_id: i64, bid_id: i64) -> AppResult<()> {
        let request = self.delete(&format!("/reverse-bidding/sessions/{session_id}/bids/{bid_id}"));
        let _: Acknowledged = self
            .execute(request, "DELETE /reverse-bidding/sessions/:id/bids/:bid")
            .await?;
        Ok(())
    }
}
