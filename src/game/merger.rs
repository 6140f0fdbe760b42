//! Merger bookkeeping: the per-player deal sub-loop that runs while one or
//! more corporations are being absorbed.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use crate::game::board::Position;
use crate::game::corporation::{Chain, Ledger};
use crate::game::player::Player;

/// State carried from the triggering tile placement until the last defunct
/// corporation has been folded into the acquirer.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MergerProcess {
    /// Connected component of the triggering placement.
    pub component: Vec<Position>,
    /// Unaffiliated positions of the component, assigned to the acquirer at
    /// the very end.
    pub incorporated: Vec<Position>,
    /// Active chains in the component, largest first at trigger time.
    pub involved: Vec<Chain>,
    /// Chosen once arbitration (if any) is done.
    pub acquirer: Option<Chain>,
    /// Defuncts not yet processed, smallest first.
    pub defuncts: Vec<Chain>,
    /// The defunct currently taking deals.
    pub current_defunct: Option<Chain>,
    /// Seats still owed a deal turn for the current defunct, in walk order.
    pub pending_shareholders: VecDeque<usize>,
    /// Whether the seat at the front already submitted its deal.
    pub dealt: bool,
    /// Seat index of the tile-placing player; the walk starts here and play
    /// resumes here afterwards.
    pub initiator: usize,
}

impl MergerProcess {
    pub fn new(
        component: Vec<Position>,
        incorporated: Vec<Position>,
        involved: Vec<Chain>,
        initiator: usize,
    ) -> Self {
        Self {
            component,
            incorporated,
            involved,
            acquirer: None,
            defuncts: Vec::new(),
            current_defunct: None,
            pending_shareholders: VecDeque::new(),
            dealt: false,
            initiator,
        }
    }

    /// Fix the acquirer and queue the rest of the involved chains as
    /// defuncts, smallest first.
    pub fn choose_acquirer(&mut self, acquirer: Chain, ledger: &Ledger) {
        self.acquirer = Some(acquirer);
        let mut defuncts: Vec<Chain> =
            self.involved.iter().copied().filter(|&c| c != acquirer).collect();
        defuncts.sort_by_key(|&c| ledger.get(c).map(|corp| corp.size).unwrap_or(0));
        self.defuncts = defuncts;
    }

    /// Chains tied with the front defunct for smallest size. More than one
    /// entry means the current player must arbitrate.
    pub fn tied_smallest(&self, ledger: &Ledger) -> Vec<Chain> {
        let Some(&front) = self.defuncts.first() else {
            return Vec::new();
        };
        let front_size = ledger.get(front).map(|c| c.size).unwrap_or(0);
        self.defuncts
            .iter()
            .copied()
            .filter(|&c| ledger.get(c).map(|corp| corp.size).unwrap_or(0) == front_size)
            .collect()
    }

    /// Move `chain` to the front of the defunct queue.
    pub fn promote_defunct(&mut self, chain: Chain) {
        self.defuncts.retain(|&c| c != chain);
        self.defuncts.insert(0, chain);
    }

    /// Begin processing the front defunct: every seat holding its shares
    /// gets one deal turn, walked from the initiator.
    pub fn open_defunct(&mut self, players: &[Player]) -> Option<Chain> {
        let defunct = if self.defuncts.is_empty() {
            return None;
        } else {
            self.defuncts.remove(0)
        };
        self.current_defunct = Some(defunct);
        self.dealt = false;
        self.pending_shareholders = shareholder_walk(players, defunct, self.initiator);
        Some(defunct)
    }

    /// The seat whose deal turn it is.
    pub fn current_shareholder(&self) -> Option<usize> {
        self.pending_shareholders.front().copied()
    }

    /// Finish the front seat's deal turn.
    pub fn advance_shareholder(&mut self) {
        self.pending_shareholders.pop_front();
        self.dealt = false;
    }

    /// True once the current defunct has no seats left to hear from.
    pub fn defunct_drained(&self) -> bool {
        self.pending_shareholders.is_empty()
    }

    /// True once no defuncts remain at all.
    pub fn complete(&self) -> bool {
        self.defunct_drained() && self.current_defunct.is_none() && self.defuncts.is_empty()
    }
}

/// Seats holding shares of `defunct`, in turn order starting from
/// `initiator` inclusive.
pub fn shareholder_walk(players: &[Player], defunct: Chain, initiator: usize) -> VecDeque<usize> {
    let n = players.len();
    (0..n)
        .map(|offset| (initiator + offset) % n)
        .filter(|&idx| players[idx].shares_of(defunct) > 0)
        .collect()
}
