//! The stock market: sole authority for every share movement.
//!
//! All functions validate first and mutate only on success, so a failed
//! operation leaves players and the ledger untouched.

use serde::{Deserialize, Serialize};

use crate::game::corporation::{Chain, Corporation, Ledger};
use crate::game::player::Player;
use crate::game::GameError;

/// One entry of a buy batch. The submitted price is the amount debited;
/// availability and affordability are still enforced here.
#[derive(Debug, Clone, Copy)]
pub struct BuyOrder {
    pub chain: Chain,
    pub price: u32,
}

/// Holders partitioned for bonus distribution. Indices into the game's
/// player list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShareholderGroups {
    pub majority: Vec<usize>,
    pub minority: Vec<usize>,
}

/// A single bonus payment, recorded for the end-of-game report.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BonusAward {
    pub username: String,
    pub corporation: Chain,
    pub amount: u32,
}

pub struct StockMarket;

impl StockMarket {
    /// Buy one share of `corp` at `price`. No-op on failure.
    pub fn buy(player: &mut Player, corp: &mut Corporation, price: u32) -> Result<(), GameError> {
        if !corp.active {
            return Err(GameError::CorporationInactive(corp.chain));
        }
        if corp.remaining_shares == 0 {
            return Err(GameError::NoSharesRemaining(corp.chain));
        }
        if player.balance < price {
            return Err(GameError::InsufficientFunds);
        }
        player.balance -= price;
        player.add_shares(corp.chain, 1);
        corp.remaining_shares -= 1;
        Ok(())
    }

    /// Apply a batch of buys in order. Failed entries are skipped silently;
    /// the returned list names the purchases that went through. Shares
    /// bought earlier in the batch count against availability for later
    /// entries because the ledger is debited as we go.
    pub fn buy_batch(player: &mut Player, ledger: &mut Ledger, orders: &[BuyOrder]) -> Vec<Chain> {
        let mut purchased = Vec::new();
        for order in orders {
            let Ok(corp) = ledger.get_mut(order.chain) else {
                continue;
            };
            if Self::buy(player, corp, order.price).is_ok() {
                purchased.push(order.chain);
            }
        }
        purchased
    }

    /// Sell `n` shares back to the corporation at its current price.
    /// Returns the amount credited.
    pub fn sell(player: &mut Player, corp: &mut Corporation, n: u8) -> Result<u32, GameError> {
        if player.shares_of(corp.chain) < n {
            return Err(GameError::InsufficientShares(corp.chain));
        }
        let credit = corp.stats().price * n as u32;
        player.remove_shares(corp.chain, n);
        player.balance += credit;
        corp.remaining_shares += n;
        Ok(credit)
    }

    /// Trade `n` defunct shares for `n / 2` acquirer shares. The odd
    /// residual share is discarded with no compensation.
    pub fn trade(
        player: &mut Player,
        defunct: &mut Corporation,
        acquirer: &mut Corporation,
        n: u8,
    ) -> Result<u8, GameError> {
        if player.shares_of(defunct.chain) < n {
            return Err(GameError::InsufficientShares(defunct.chain));
        }
        let received = n / 2;
        if acquirer.remaining_shares < received {
            return Err(GameError::NoSharesRemaining(acquirer.chain));
        }
        player.remove_shares(defunct.chain, n);
        defunct.remaining_shares += n;
        if received > 0 {
            player.add_shares(acquirer.chain, received);
            acquirer.remaining_shares -= received;
        }
        Ok(received)
    }

    /// Partition holders of `chain` into majority and minority groups.
    ///
    /// The majority group is everyone tied at the top share count. The
    /// minority group holds the next distinct count; when no second count
    /// exists the minority group equals the majority group.
    pub fn shareholder_groups(players: &[Player], chain: Chain) -> ShareholderGroups {
        let mut holders: Vec<(usize, u8)> = players
            .iter()
            .enumerate()
            .filter_map(|(idx, p)| {
                let count = p.shares_of(chain);
                (count > 0).then_some((idx, count))
            })
            .collect();
        holders.sort_by(|a, b| b.1.cmp(&a.1));

        let Some(&(_, top)) = holders.first() else {
            return ShareholderGroups { majority: Vec::new(), minority: Vec::new() };
        };
        let majority: Vec<usize> =
            holders.iter().filter(|&&(_, c)| c == top).map(|&(i, _)| i).collect();
        let second = holders.iter().map(|&(_, c)| c).find(|&c| c < top);
        let minority = match second {
            Some(count) => holders
                .iter()
                .filter(|&&(_, c)| c == count)
                .map(|&(i, _)| i)
                .collect(),
            None => majority.clone(),
        };
        ShareholderGroups { majority, minority }
    }

    /// Pay majority/minority bonuses for `corp`. Integer arithmetic
    /// throughout; division residuals vanish.
    pub fn distribute_bonuses(players: &mut [Player], corp: &Corporation) -> Vec<BonusAward> {
        let groups = Self::shareholder_groups(players, corp.chain);
        if groups.majority.is_empty() {
            return Vec::new();
        }
        let stats = corp.stats();
        let mut awards = Vec::new();
        let mut pay = |players: &mut [Player], idx: usize, amount: u32| {
            if amount == 0 {
                return;
            }
            players[idx].balance += amount;
            awards.push(BonusAward {
                username: players[idx].username.clone(),
                corporation: corp.chain,
                amount,
            });
        };

        if groups.majority.len() > 1 || groups.minority.is_empty() {
            let pool = stats.majority_bonus + stats.minority_bonus;
            let each = pool / groups.majority.len() as u32;
            for &idx in &groups.majority {
                pay(players, idx, each);
            }
        } else {
            pay(players, groups.majority[0], stats.majority_bonus);
            let each = stats.minority_bonus / groups.minority.len() as u32;
            for &idx in &groups.minority {
                pay(players, idx, each);
            }
        }
        awards
    }

    /// Force-sell every holding of `corp` at the current price, then
    /// deactivate it.
    pub fn liquidate(players: &mut [Player], corp: &mut Corporation) {
        for player in players.iter_mut() {
            let held = player.shares_of(corp.chain);
            if held > 0 {
                // Holding was just read back from the player, so the sell
                // cannot fail.
                let _ = Self::sell(player, corp, held);
            }
        }
        corp.active = false;
    }
}
