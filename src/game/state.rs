//! Game phase machine with a fixed valid-transition table.

use serde::{Deserialize, Serialize};

use crate::game::GameError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum GamePhase {
    Setup,
    PlaceTile,
    TilePlaced,
    EstablishCorporation,
    BuyStocks,
    Merge,
    MergeConflict,
    AcquirerSelection,
    DefunctSelection,
    GameEnd,
}

impl GamePhase {
    pub fn as_str(self) -> &'static str {
        match self {
            GamePhase::Setup => "setup",
            GamePhase::PlaceTile => "place-tile",
            GamePhase::TilePlaced => "tile-placed",
            GamePhase::EstablishCorporation => "establish-corporation",
            GamePhase::BuyStocks => "buy-stocks",
            GamePhase::Merge => "merge",
            GamePhase::MergeConflict => "merge-conflict",
            GamePhase::AcquirerSelection => "acquirer-selection",
            GamePhase::DefunctSelection => "defunct-selection",
            GamePhase::GameEnd => "game-end",
        }
    }

    /// The states reachable from `self` through a normal transition.
    pub fn valid_transitions(self) -> &'static [GamePhase] {
        use GamePhase::*;
        match self {
            Setup => &[PlaceTile],
            PlaceTile => &[
                TilePlaced,
                EstablishCorporation,
                BuyStocks,
                Merge,
                MergeConflict,
                AcquirerSelection,
            ],
            TilePlaced => &[PlaceTile, GameEnd],
            EstablishCorporation => &[BuyStocks],
            BuyStocks => &[TilePlaced],
            Merge => &[BuyStocks, Merge, AcquirerSelection, DefunctSelection],
            MergeConflict => &[Merge],
            AcquirerSelection => &[Merge, DefunctSelection],
            DefunctSelection => &[Merge],
            GameEnd => &[],
        }
    }
}

impl std::fmt::Display for GamePhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Current phase plus transition enforcement. `force` exists for loading a
/// saved game, where the ingress state is already known-safe.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateMachine {
    current: GamePhase,
}

impl Default for StateMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl StateMachine {
    pub fn new() -> Self {
        Self { current: GamePhase::Setup }
    }

    pub fn current(&self) -> GamePhase {
        self.current
    }

    /// Validated transition.
    pub fn transition(&mut self, to: GamePhase) -> Result<(), GameError> {
        if self.current.valid_transitions().contains(&to) {
            self.current = to;
            Ok(())
        } else {
            Err(GameError::InvalidTransition { from: self.current, to })
        }
    }

    /// Unvalidated transition for loads.
    pub fn force(&mut self, to: GamePhase) {
        self.current = to;
    }

    /// Error unless the machine is currently in `expected`.
    pub fn expect(&self, expected: GamePhase) -> Result<(), GameError> {
        if self.current == expected {
            Ok(())
        } else {
            Err(GameError::WrongPhase { expected, actual: self.current })
        }
    }
}
