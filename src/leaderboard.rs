//! Ranked bid list for one reverse-bidding session.
//!
//! Bids are kept sorted by ascending price, lowest first. Equal prices are
//! ordered by earliest `submitted_at`, then by bid id, so ranks never depend
//! on arrival order. After every mutation `rank == position + 1` for every
//! entry and `dealer_name_anonymized` is recomputed from the entry.
//!
//! Insertion finds its slot by binary search and only the entries at or
//! after the changed position are re-ranked.

use std::cmp::Ordering;

use crate::models::Bid;

/// Display name for a bid: the real name for the viewer's own bids, a placeholder otherwise.
pub fn anonymized_name(bid: &Bid) -> String {
    if bid.is_current_dealer {
        bid.dealer_name.clone()
    } else {
        format!("Dealer #{}", bid.rank)
    }
}

fn leaderboard_order(a: &Bid, b: &Bid) -> Ordering {
    a.price
        .total_cmp(&b.price)
        .then_with(|| a.submitted_at.cmp(&b.submitted_at))
        .then_with(|| a.id.cmp(&b.id))
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Leaderboard {
    bids: Vec<Bid>,
}

impl Leaderboard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_bids(mut bids: Vec<Bid>) -> Self {
        bids.sort_by(leaderboard_order);
        let mut board = Self { bids };
        board.rerank_from(0);
        board
    }

    /// Inserts `bid` at its ranked position and returns its rank.
    /// A bid with the same id is replaced.
    pub fn insert(&mut self, bid: Bid) -> usize {
        let removed_at = self.position(bid.id).map(|pos| {
            self.bids.remove(pos);
            pos
        });
        let index = self
            .bids
            .partition_point(|existing| leaderboard_order(existing, &bid) == Ordering::Less);
        self.bids.insert(index, bid);
        self.rerank_from(removed_at.map_or(index, |pos| pos.min(index)));
        index + 1
    }

    pub fn remove(&mut self, bid_id: i64) -> Option<Bid> {
        let pos = self.position(bid_id)?;
        let removed = self.bids.remove(pos);
        self.rerank_from(pos);
        Some(removed)
    }

    pub fn bids(&self) -> &[Bid] {
        &self.bids
    }

    pub fn len(&self) -> usize {
        self.bids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bids.is_empty()
    }

    pub fn get(&self, bid_id: i64) -> Option<&Bid> {
        self.bids.iter().find(|bid| bid.id == bid_id)
    }

    /// The lowest bid.
    pub fn leader(&self) -> Option<&Bid> {
        self.bids.first()
    }

    /// The viewer's best-ranked bid.
    pub fn own_bid(&self) -> Option<&Bid> {
        self.bids.iter().find(|bid| bid.is_current_dealer)
    }

    fn position(&self, bid_id: i64) -> Option<usize> {
        self.bids.iter().position(|bid| bid.id == bid_id)
    }

    fn rerank_from(&mut self, start: usize) {
        for (index, bid) in self.bids.iter_mut().enumerate().skip(start) {
            bid.rank = index + 1;
            bid.dealer_name_anonymized = anonymized_name(bid);
        }
    }
}
