//! The deterministic game engine.
//!
//! Everything in this module is pure state manipulation: no I/O, no clocks,
//! no randomness beyond the injected [`tiles::Shuffler`]. The engine
//! validates before it mutates, so a rejected action leaves the game
//! untouched.

pub mod board;
pub mod corporation;
pub mod engine;
pub mod market;
pub mod merger;
pub mod player;
pub mod state;
pub mod tiles;
pub mod turn;

use thiserror::Error;

use crate::game::corporation::Chain;
use crate::game::state::GamePhase;

/// Engine-level rule violations. These surface to callers unchanged and map
/// to the `state` error code at the HTTP boundary.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GameError {
    #[error("position ({x}, {y}) is off the board")]
    InvalidPosition { x: u8, y: u8 },
    #[error("position ({x}, {y}) already holds a tile")]
    PositionOccupied { x: u8, y: u8 },
    #[error("no tile at ({x}, {y}) in hand")]
    TileNotInHand { x: u8, y: u8 },
    #[error("tile at ({x}, {y}) is unplayable and must be exchanged")]
    TileUnplayable { x: u8, y: u8 },
    #[error("unknown corporation: {0}")]
    UnknownCorporation(String),
    #[error("corporation {} is not active", .0.as_str())]
    CorporationInactive(Chain),
    #[error("corporation {} is already active", .0.as_str())]
    CorporationActive(Chain),
    #[error("corporation {} has no shares remaining", .0.as_str())]
    NoSharesRemaining(Chain),
    #[error("insufficient funds")]
    InsufficientFunds,
    #[error("insufficient shares of {}", .0.as_str())]
    InsufficientShares(Chain),
    #[error("not this player's turn")]
    NotYourTurn,
    #[error("expected phase {expected} but game is in {actual}")]
    WrongPhase { expected: GamePhase, actual: GamePhase },
    #[error("invalid transition {from} -> {to}")]
    InvalidTransition { from: GamePhase, to: GamePhase },
    #[error("no merger in progress")]
    NoMergerInProgress,
    #[error("deal already submitted this merger turn")]
    AlreadyDealt,
    #[error("invalid merger selection: {0}")]
    InvalidSelection(String),
    #[error("a game needs at least two players")]
    NotEnoughPlayers,
}
