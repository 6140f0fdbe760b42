//! Corporation identities, price bands, and the per-game ledger.

use serde::{Deserialize, Serialize};

use crate::game::GameError;

/// Shares printed for each corporation.
pub const SHARES_PER_CORPORATION: u8 = 25;

/// Size at which a corporation becomes safe from being defuncted.
pub const SAFE_SIZE: u32 = 11;

/// Size at which the game-end condition can trigger.
pub const ENDGAME_SIZE: u32 = 41;

/// Chain membership tag for placed tiles. The seven named corporations are
/// tradeable; `Incorporated` marks placed tiles that belong to no chain yet
/// and is never active.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Chain {
    Phoenix,
    Quantum,
    Fusion,
    Hydra,
    America,
    Sackson,
    Zeta,
    Incorporated,
}

/// The seven tradeable corporations, in ledger order.
pub const CORPORATIONS: [Chain; 7] = [
    Chain::Phoenix,
    Chain::Quantum,
    Chain::Fusion,
    Chain::Hydra,
    Chain::America,
    Chain::Sackson,
    Chain::Zeta,
];

/// Price tier a corporation belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    Premium,
    Standard,
    Budget,
}

impl Tier {
    pub fn base_price(self) -> u32 {
        match self {
            Tier::Premium => 300,
            Tier::Standard => 200,
            Tier::Budget => 100,
        }
    }
}

impl Chain {
    /// Parse a wire-format corporation name. `incorporated` is not accepted
    /// here: it is a board tag, not a corporation clients may act on.
    pub fn from_wire(name: &str) -> Result<Chain, GameError> {
        match name {
            "phoenix" => Ok(Chain::Phoenix),
            "quantum" => Ok(Chain::Quantum),
            "fusion" => Ok(Chain::Fusion),
            "hydra" => Ok(Chain::Hydra),
            "america" => Ok(Chain::America),
            "sackson" => Ok(Chain::Sackson),
            "zeta" => Ok(Chain::Zeta),
            other => Err(GameError::UnknownCorporation(other.to_string())),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Chain::Phoenix => "phoenix",
            Chain::Quantum => "quantum",
            Chain::Fusion => "fusion",
            Chain::Hydra => "hydra",
            Chain::America => "america",
            Chain::Sackson => "sackson",
            Chain::Zeta => "zeta",
            Chain::Incorporated => "incorporated",
        }
    }

    pub fn tier(self) -> Option<Tier> {
        match self {
            Chain::Phoenix | Chain::Quantum => Some(Tier::Premium),
            Chain::Fusion | Chain::Hydra | Chain::America => Some(Tier::Standard),
            Chain::Sackson | Chain::Zeta => Some(Tier::Budget),
            Chain::Incorporated => None,
        }
    }
}

/// Derived pricing for a corporation at its current size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChainStats {
    pub price: u32,
    pub majority_bonus: u32,
    pub minority_bonus: u32,
}

/// Size-band premium on top of the tier base price.
fn size_premium(size: u32) -> u32 {
    match size {
        0 | 1 => 0,
        2 => 100,
        3 => 200,
        4 => 300,
        5 => 400,
        6..=10 => 500,
        11..=20 => 600,
        21..=30 => 700,
        31..=40 => 800,
        _ => 900,
    }
}

/// Ledger state for one corporation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Corporation {
    pub chain: Chain,
    pub active: bool,
    pub size: u32,
    pub remaining_shares: u8,
    pub safe: bool,
}

impl Corporation {
    pub fn new(chain: Chain) -> Self {
        Self {
            chain,
            active: false,
            size: 0,
            remaining_shares: SHARES_PER_CORPORATION,
            safe: false,
        }
    }

    /// Activate the corporation with its founding tile count.
    pub fn establish(&mut self, founding_size: u32) {
        self.active = true;
        self.size = founding_size;
        self.update_safe();
    }

    /// Grow by `n` tiles and refresh the safe flag.
    pub fn grow(&mut self, n: u32) {
        self.size += n;
        self.update_safe();
    }

    /// Return to the unfounded state after a merger dissolves the chain.
    pub fn dissolve(&mut self) {
        self.active = false;
        self.size = 0;
        self.remaining_shares = SHARES_PER_CORPORATION;
        self.safe = false;
    }

    fn update_safe(&mut self) {
        if self.active && self.size >= SAFE_SIZE {
            self.safe = true;
        }
    }

    /// Current share price and merger bonuses.
    pub fn stats(&self) -> ChainStats {
        let base = self.chain.tier().map(Tier::base_price).unwrap_or(0);
        let price = base + size_premium(self.size);
        ChainStats {
            price,
            majority_bonus: price * 10,
            minority_bonus: price * 5,
        }
    }
}

impl Chain {
    /// Ledger slot for a tradeable corporation.
    fn slot(self) -> Result<usize, GameError> {
        CORPORATIONS
            .iter()
            .position(|&c| c == self)
            .ok_or_else(|| GameError::UnknownCorporation(self.as_str().to_string()))
    }
}

/// Per-game ledger over the seven corporations, in fixed ledger order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Ledger {
    corporations: Vec<Corporation>,
}

impl Default for Ledger {
    fn default() -> Self {
        Self::new()
    }
}

impl Ledger {
    pub fn new() -> Self {
        Self {
            corporations: CORPORATIONS.iter().map(|&chain| Corporation::new(chain)).collect(),
        }
    }

    pub fn get(&self, chain: Chain) -> Result<&Corporation, GameError> {
        Ok(&self.corporations[chain.slot()?])
    }

    pub fn get_mut(&mut self, chain: Chain) -> Result<&mut Corporation, GameError> {
        let slot = chain.slot()?;
        Ok(&mut self.corporations[slot])
    }

    /// Mutable access to two distinct corporations at once, for trades that
    /// move shares between a defunct chain and its acquirer.
    pub fn pair_mut(
        &mut self,
        first: Chain,
        second: Chain,
    ) -> Result<(&mut Corporation, &mut Corporation), GameError> {
        let a = first.slot()?;
        let b = second.slot()?;
        if a == b {
            return Err(GameError::UnknownCorporation(second.as_str().to_string()));
        }
        if a < b {
            let (left, right) = self.corporations.split_at_mut(b);
            Ok((&mut left[a], &mut right[0]))
        } else {
            let (left, right) = self.corporations.split_at_mut(a);
            Ok((&mut right[0], &mut left[b]))
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &Corporation> {
        self.corporations.iter()
    }

    pub fn active_chains(&self) -> Vec<Chain> {
        self.corporations.iter().filter(|c| c.active).map(|c| c.chain).collect()
    }

    pub fn has_inactive(&self) -> bool {
        self.corporations.iter().any(|c| !c.active)
    }

    /// Chains that are currently safe.
    pub fn safe_chains(&self) -> Vec<Chain> {
        self.corporations.iter().filter(|c| c.safe).map(|c| c.chain).collect()
    }
}
