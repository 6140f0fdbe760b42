//! Turn transcript: the ordered activities of the current and previous turn.

use serde::{Deserialize, Serialize};

use crate::game::board::Position;
use crate::game::corporation::Chain;

/// One atomic thing that happened during a turn. Clients render these
/// verbatim; only the current and previous turns are retained.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum Activity {
    /// Opened when a turn begins; `position` is filled once the tile lands.
    TilePlace {
        player: String,
        position: Option<Position>,
    },
    Establish {
        player: String,
        corporation: Chain,
    },
    BuyStocks {
        player: String,
        purchased: Vec<Chain>,
    },
    MergeConflict {
        candidates: Vec<Chain>,
    },
    AcquirerSelection {
        candidates: Vec<Chain>,
    },
    DefunctSelection {
        candidates: Vec<Chain>,
    },
    Merge {
        acquirer: Chain,
        defunct: Chain,
    },
}

/// Rolling two-turn transcript.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TurnRecorder {
    current: Vec<Activity>,
    previous: Vec<Activity>,
}

impl TurnRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, activity: Activity) {
        self.current.push(activity);
    }

    /// Fill the position of the pending tile-place activity.
    pub fn complete_tile_place(&mut self, position: Position) {
        if let Some(Activity::TilePlace { position: slot, .. }) = self
            .current
            .iter_mut()
            .rev()
            .find(|a| matches!(a, Activity::TilePlace { .. }))
        {
            *slot = Some(position);
        }
    }

    /// Close the turn: current becomes previous, current clears.
    pub fn advance(&mut self) {
        self.previous = std::mem::take(&mut self.current);
    }

    pub fn current(&self) -> &[Activity] {
        &self.current
    }

    pub fn previous(&self) -> &[Activity] {
        &self.previous
    }
}
