//! The draw pile and the shuffle abstraction.
//!
//! Shuffling is an injected dependency so tests can run identity or reversed
//! permutations and replay exact tile orders.

use serde::{Deserialize, Serialize};

use crate::game::board::{Position, COLS, ROWS};

/// A physical tile. Exactly one of {a player's hand, the board, the stack}
/// owns it at any time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Tile {
    pub position: Position,
    pub placed: bool,
    pub exchangeable: bool,
}

impl Tile {
    pub fn new(position: Position) -> Self {
        Self { position, placed: false, exchangeable: false }
    }
}

/// Permutation source for the draw pile.
pub trait Shuffler: Send + Sync {
    fn shuffle(&mut self, tiles: &mut Vec<Tile>);
}

/// Production shuffler backed by the thread RNG.
#[derive(Debug, Default)]
pub struct RandomShuffler;

impl Shuffler for RandomShuffler {
    fn shuffle(&mut self, tiles: &mut Vec<Tile>) {
        use rand::seq::SliceRandom;
        tiles.shuffle(&mut rand::rng());
    }
}

/// Leaves the pile in (row, col) order. Test determinism.
#[derive(Debug, Default)]
pub struct IdentityShuffler;

impl Shuffler for IdentityShuffler {
    fn shuffle(&mut self, _tiles: &mut Vec<Tile>) {}
}

/// Reverses the pile. Test determinism from the other end.
#[derive(Debug, Default)]
pub struct ReverseShuffler;

impl Shuffler for ReverseShuffler {
    fn shuffle(&mut self, tiles: &mut Vec<Tile>) {
        tiles.reverse();
    }
}

/// The shuffled draw pile. Draws come off the head; exchanged tiles are
/// returned to the tail so the 108-tile population is conserved.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TileStack {
    tiles: Vec<Tile>,
}

impl TileStack {
    /// Build the full 108-tile pile and shuffle it.
    pub fn shuffled(shuffler: &mut dyn Shuffler) -> Self {
        let mut tiles = Vec::with_capacity((ROWS as usize) * (COLS as usize));
        for x in 0..ROWS {
            for y in 0..COLS {
                tiles.push(Tile::new(Position { x, y }));
            }
        }
        shuffler.shuffle(&mut tiles);
        Self { tiles }
    }

    /// Remove and return the head of the pile.
    pub fn draw(&mut self) -> Option<Tile> {
        if self.tiles.is_empty() {
            None
        } else {
            Some(self.tiles.remove(0))
        }
    }

    /// Remove up to `n` tiles from the head.
    pub fn draw_many(&mut self, n: usize) -> Vec<Tile> {
        let take = n.min(self.tiles.len());
        self.tiles.drain(..take).collect()
    }

    /// Return an exchanged tile to the tail of the pile.
    pub fn push_back(&mut self, tile: Tile) {
        self.tiles.push(tile);
    }

    pub fn len(&self) -> usize {
        self.tiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tiles.is_empty()
    }
}
