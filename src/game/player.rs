//! Per-seat player state.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::game::board::Position;
use crate::game::corporation::Chain;
use crate::game::tiles::Tile;

/// Starting cash for every seat.
pub const STARTING_BALANCE: u32 = 6_000;

/// Hand capacity.
pub const HAND_SIZE: usize = 6;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Player {
    pub username: String,
    pub balance: u32,
    pub hand: Vec<Tile>,
    /// Share counts per corporation; absent key means zero.
    pub shares: BTreeMap<Chain, u8>,
    pub taking_turn: bool,
    /// Most recently drawn tile, surfaced to the owning client only.
    pub newly_refilled_tile: Option<Position>,
}

impl Player {
    pub fn new(username: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            balance: STARTING_BALANCE,
            hand: Vec::with_capacity(HAND_SIZE),
            shares: BTreeMap::new(),
            taking_turn: false,
            newly_refilled_tile: None,
        }
    }

    pub fn shares_of(&self, chain: Chain) -> u8 {
        self.shares.get(&chain).copied().unwrap_or(0)
    }

    pub fn add_shares(&mut self, chain: Chain, n: u8) {
        *self.shares.entry(chain).or_insert(0) += n;
    }

    /// Remove `n` shares; the caller has already validated the holding.
    pub fn remove_shares(&mut self, chain: Chain, n: u8) {
        let entry = self.shares.entry(chain).or_insert(0);
        *entry = entry.saturating_sub(n);
        if *entry == 0 {
            self.shares.remove(&chain);
        }
    }

    /// The playable hand tile at `pos`, if the player holds one.
    pub fn hand_tile(&self, pos: Position) -> Option<&Tile> {
        self.hand.iter().find(|t| t.position == pos)
    }

    pub fn hand_tile_mut(&mut self, pos: Position) -> Option<&mut Tile> {
        self.hand.iter_mut().find(|t| t.position == pos)
    }
}
