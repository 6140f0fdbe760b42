//! The game orchestrator. Owns the board, pile, ledger, market, transcript
//! and seats; validates every player action against identity, phase, and
//! the rules before mutating anything.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::game::board::{Board, PlacedTile, Position};
use crate::game::corporation::{Chain, Ledger, ENDGAME_SIZE};
use crate::game::market::{BonusAward, BuyOrder, StockMarket};
use crate::game::merger::MergerProcess;
use crate::game::player::{Player, HAND_SIZE};
use crate::game::state::{GamePhase, StateMachine};
use crate::game::tiles::{Shuffler, Tile, TileStack};
use crate::game::turn::{Activity, TurnRecorder};
use crate::game::GameError;

/// Purchases allowed per buy-stocks action.
pub const MAX_PURCHASES_PER_TURN: usize = 3;

/// Final standing of one seat.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RankedPlayer {
    pub username: String,
    pub balance: u32,
}

/// Payload of the game-end broadcast and the end-result endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameResult {
    /// Players sorted by balance, highest first.
    pub players: Vec<RankedPlayer>,
    /// Bonuses paid out during the final liquidation.
    pub bonuses: Vec<BonusAward>,
}

/// Ledger row plus derived pricing, for snapshots.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CorporationView {
    pub name: Chain,
    pub active: bool,
    pub size: u32,
    pub remaining_shares: u8,
    pub safe: bool,
    pub price: u32,
    pub majority_bonus: u32,
    pub minority_bonus: u32,
}

/// What every participant may see about a seat. Hands and balances stay
/// private to their owner.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicPlayerView {
    pub username: String,
    pub taking_turn: bool,
    pub shares: BTreeMap<Chain, u8>,
}

/// The requesting player's own seat, hidden information included.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SelfView {
    pub username: String,
    pub balance: u32,
    pub hand: Vec<Tile>,
    pub shares: BTreeMap<Chain, u8>,
    pub newly_refilled_tile: Option<Position>,
}

/// Merger progress surfaced to clients while a merge runs.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MergerView {
    pub acquirer: Option<Chain>,
    pub defunct: Option<Chain>,
    pub pending_player: Option<String>,
}

/// Per-user game snapshot served by the status endpoint.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GameSnapshot {
    pub state: GamePhase,
    pub board: Vec<PlacedTile>,
    pub corporations: Vec<CorporationView>,
    pub players: Vec<PublicPlayerView>,
    #[serde(rename = "self")]
    pub self_view: Option<SelfView>,
    pub current_turn: Vec<Activity>,
    pub previous_turn: Vec<Activity>,
    pub merger: Option<MergerView>,
}

/// A running game. Serializable wholesale so a game can be saved and loaded
/// with its visible state intact.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Game {
    board: Board,
    stack: TileStack,
    ledger: Ledger,
    recorder: TurnRecorder,
    machine: StateMachine,
    players: Vec<Player>,
    current_player: usize,
    merger: Option<MergerProcess>,
    /// Component positions held between place-tile and establish.
    pending_foundation: Option<Vec<Position>>,
    final_result: Option<GameResult>,
}

impl Game {
    /// Set up a new game: full shuffled pile, $6,000 and six tiles per seat,
    /// order tiles drawn, players reseated by order tile, order tiles placed
    /// unaffiliated. Seat 0 opens the first turn.
    pub fn new(usernames: &[String], shuffler: &mut dyn Shuffler) -> Result<Self, GameError> {
        if usernames.len() < 2 {
            return Err(GameError::NotEnoughPlayers);
        }
        let mut stack = TileStack::shuffled(shuffler);
        let mut players: Vec<Player> =
            usernames.iter().map(|u| Player::new(u.as_str())).collect();
        for player in &mut players {
            player.hand = stack.draw_many(HAND_SIZE);
        }

        let mut order: Vec<(usize, Tile)> = Vec::with_capacity(players.len());
        for idx in 0..players.len() {
            if let Some(tile) = stack.draw() {
                order.push((idx, tile));
            }
        }
        order.sort_by_key(|&(_, tile)| tile.position);

        let mut board = Board::new();
        for &(_, tile) in &order {
            board.place(tile.position, Chain::Incorporated)?;
        }

        let mut seats: Vec<Option<Player>> = players.into_iter().map(Some).collect();
        let mut reordered = Vec::with_capacity(seats.len());
        for &(idx, _) in &order {
            if let Some(player) = seats[idx].take() {
                reordered.push(player);
            }
        }
        for seat in seats {
            if let Some(player) = seat {
                reordered.push(player);
            }
        }
        let mut players = reordered;
        players[0].taking_turn = true;

        let mut machine = StateMachine::new();
        machine.transition(GamePhase::PlaceTile)?;
        let mut recorder = TurnRecorder::new();
        recorder.record(Activity::TilePlace {
            player: players[0].username.clone(),
            position: None,
        });

        Ok(Self {
            board,
            stack,
            ledger: Ledger::new(),
            recorder,
            machine,
            players,
            current_player: 0,
            merger: None,
            pending_foundation: None,
            final_result: None,
        })
    }

    // ------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------

    pub fn phase(&self) -> GamePhase {
        self.machine.current()
    }

    pub fn players(&self) -> &[Player] {
        &self.players
    }

    pub fn board(&self) -> &Board {
        &self.board
    }

    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    pub fn stack_len(&self) -> usize {
        self.stack.len()
    }

    pub fn current_username(&self) -> &str {
        &self.players[self.current_player].username
    }

    pub fn player(&self, username: &str) -> Option<&Player> {
        self.players.iter().find(|p| p.username == username)
    }

    pub fn is_participant(&self, username: &str) -> bool {
        self.player(username).is_some()
    }

    pub fn end_result(&self) -> Option<&GameResult> {
        self.final_result.as_ref()
    }

    fn ensure_current(&self, username: &str) -> Result<(), GameError> {
        if self.current_username() == username {
            Ok(())
        } else {
            Err(GameError::NotYourTurn)
        }
    }

    // ------------------------------------------------------------------
    // Tile placement
    // ------------------------------------------------------------------

    /// Play a hand tile onto the board and route to the follow-up state
    /// demanded by the neighborhood of the placement.
    pub fn place_tile(&mut self, username: &str, pos: Position) -> Result<(), GameError> {
        self.machine.expect(GamePhase::PlaceTile)?;
        self.ensure_current(username)?;
        let idx = self.current_player;

        let Some(tile) = self.players[idx].hand_tile(pos).copied() else {
            return Err(GameError::TileNotInHand { x: pos.x, y: pos.y });
        };
        if tile.placed {
            return Err(GameError::TileNotInHand { x: pos.x, y: pos.y });
        }
        if tile.exchangeable {
            return Err(GameError::TileUnplayable { x: pos.x, y: pos.y });
        }

        self.board.place(pos, Chain::Incorporated)?;
        if let Some(held) = self.players[idx].hand_tile_mut(pos) {
            held.placed = true;
        }
        self.recorder.complete_tile_place(pos);

        let component = self.board.connected_component(pos);
        let groups = Board::group_by_chain(&component);
        let incorporated = groups.get(&Chain::Incorporated).cloned().unwrap_or_default();
        let mut involved: Vec<Chain> = groups
            .keys()
            .copied()
            .filter(|&chain| chain != Chain::Incorporated)
            .collect();
        involved.sort_by_key(|&chain| {
            let size = self.ledger.get(chain).map(|c| c.size).unwrap_or(0);
            (std::cmp::Reverse(size), chain)
        });

        if component.len() == 1 {
            // Isolated tile: straight to shopping.
            self.machine.transition(GamePhase::BuyStocks)?;
        } else if involved.is_empty() {
            if self.ledger.has_inactive() {
                self.pending_foundation = Some(incorporated);
                self.machine.transition(GamePhase::EstablishCorporation)?;
            } else {
                self.machine.transition(GamePhase::BuyStocks)?;
            }
        } else if involved.len() == 1 {
            let chain = involved[0];
            self.board.assign(&incorporated, chain);
            let safe = {
                let corp = self.ledger.get_mut(chain)?;
                corp.grow(incorporated.len() as u32);
                corp.safe
            };
            if safe {
                self.recompute_exchangeable();
            }
            self.machine.transition(GamePhase::BuyStocks)?;
        } else {
            let positions: Vec<Position> = component.iter().map(|t| t.position).collect();
            self.start_merger(positions, incorporated, involved)?;
        }
        Ok(())
    }

    /// Found `chain` on the pending component. The founder receives one free
    /// share when any remain.
    pub fn establish(&mut self, username: &str, chain: Chain) -> Result<(), GameError> {
        self.machine.expect(GamePhase::EstablishCorporation)?;
        self.ensure_current(username)?;
        if self.ledger.get(chain)?.active {
            return Err(GameError::CorporationActive(chain));
        }
        let positions = self
            .pending_foundation
            .take()
            .ok_or_else(|| GameError::InvalidSelection("no founding component pending".into()))?;

        self.board.assign(&positions, chain);
        let idx = self.current_player;
        let (free_share, safe) = {
            let corp = self.ledger.get_mut(chain)?;
            corp.establish(positions.len() as u32);
            let free = corp.remaining_shares > 0;
            if free {
                corp.remaining_shares -= 1;
            }
            (free, corp.safe)
        };
        if free_share {
            self.players[idx].add_shares(chain, 1);
        }
        if safe {
            self.recompute_exchangeable();
        }
        self.recorder.record(Activity::Establish {
            player: username.to_string(),
            corporation: chain,
        });
        self.machine.transition(GamePhase::BuyStocks)?;
        Ok(())
    }

    /// Apply up to three purchases in order. Entries that cannot be honored
    /// are skipped without error; the returned list is what actually sold.
    pub fn buy_stocks(
        &mut self,
        username: &str,
        orders: &[BuyOrder],
    ) -> Result<Vec<Chain>, GameError> {
        self.machine.expect(GamePhase::BuyStocks)?;
        self.ensure_current(username)?;
        let capped = &orders[..orders.len().min(MAX_PURCHASES_PER_TURN)];
        let idx = self.current_player;
        let purchased = StockMarket::buy_batch(&mut self.players[idx], &mut self.ledger, capped);
        self.recorder.record(Activity::BuyStocks {
            player: username.to_string(),
            purchased: purchased.clone(),
        });
        self.machine.transition(GamePhase::TilePlaced)?;
        Ok(purchased)
    }

    /// Close the turn: either the game ends, or the hand refills and play
    /// rotates to the next seat.
    pub fn end_turn(&mut self, username: &str) -> Result<Option<GameResult>, GameError> {
        self.machine.expect(GamePhase::TilePlaced)?;
        self.ensure_current(username)?;

        if self.game_end_condition() {
            let result = self.finish_game()?;
            return Ok(Some(result));
        }

        self.refill_current_hand();
        let idx = self.current_player;
        self.players[idx].taking_turn = false;
        self.current_player = (idx + 1) % self.players.len();
        self.players[self.current_player].taking_turn = true;
        self.machine.transition(GamePhase::PlaceTile)?;
        self.recorder.advance();
        self.recorder.record(Activity::TilePlace {
            player: self.players[self.current_player].username.clone(),
            position: None,
        });
        Ok(None)
    }

    // ------------------------------------------------------------------
    // Merger flow
    // ------------------------------------------------------------------

    fn start_merger(
        &mut self,
        component: Vec<Position>,
        incorporated: Vec<Position>,
        involved: Vec<Chain>,
    ) -> Result<(), GameError> {
        let max_size = self.ledger.get(involved[0])?.size;
        let tied_max: Vec<Chain> = involved
            .iter()
            .copied()
            .filter(|&c| self.ledger.get(c).map(|corp| corp.size).unwrap_or(0) == max_size)
            .collect();
        let mut process =
            MergerProcess::new(component, incorporated, involved.clone(), self.current_player);

        if involved.len() == 3 && tied_max.len() >= 2 {
            // Three-way collision with the two largest tied: the client
            // names both sides of the merge.
            self.machine.transition(GamePhase::MergeConflict)?;
            self.recorder.record(Activity::MergeConflict { candidates: involved });
            self.merger = Some(process);
        } else if tied_max.len() >= 2 {
            self.machine.transition(GamePhase::AcquirerSelection)?;
            self.recorder.record(Activity::AcquirerSelection { candidates: tied_max });
            self.merger = Some(process);
        } else {
            self.machine.transition(GamePhase::Merge)?;
            process.choose_acquirer(involved[0], &self.ledger);
            self.merger = Some(process);
            self.proceed_merger(false)?;
        }
        Ok(())
    }

    /// Drive the merger forward: open the next defunct (pausing for
    /// arbitration on size ties), fold defuncts nobody holds, and finalize
    /// when the queue runs dry.
    fn proceed_merger(&mut self, mut skip_tie_check: bool) -> Result<(), GameError> {
        loop {
            let mut process = self.merger.take().ok_or(GameError::NoMergerInProgress)?;
            let Some(acquirer) = process.acquirer else {
                self.merger = Some(process);
                return Err(GameError::NoMergerInProgress);
            };

            if !skip_tie_check {
                let tied = process.tied_smallest(&self.ledger);
                if tied.len() >= 2 {
                    self.machine.transition(GamePhase::DefunctSelection)?;
                    self.recorder.record(Activity::DefunctSelection { candidates: tied });
                    self.merger = Some(process);
                    return Ok(());
                }
            }
            skip_tie_check = false;

            match process.open_defunct(&self.players) {
                Some(defunct) => {
                    if self.machine.current() != GamePhase::Merge {
                        self.machine.transition(GamePhase::Merge)?;
                    }
                    self.recorder.record(Activity::Merge { acquirer, defunct });
                    let corp = self.ledger.get(defunct)?.clone();
                    StockMarket::distribute_bonuses(&mut self.players, &corp);
                    if process.defunct_drained() {
                        self.finish_defunct(&mut process, acquirer)?;
                        self.merger = Some(process);
                        continue;
                    }
                    self.merger = Some(process);
                    return Ok(());
                }
                None => {
                    self.finalize_merger(process, acquirer)?;
                    return Ok(());
                }
            }
        }
    }

    /// Fold the current defunct into the acquirer: forfeit kept shares,
    /// reassign its tiles, dissolve it.
    fn finish_defunct(
        &mut self,
        process: &mut MergerProcess,
        acquirer: Chain,
    ) -> Result<(), GameError> {
        let Some(defunct) = process.current_defunct.take() else {
            return Ok(());
        };
        for player in &mut self.players {
            let kept = player.shares_of(defunct);
            if kept > 0 {
                player.remove_shares(defunct, kept);
            }
        }
        let positions: Vec<Position> = process
            .component
            .iter()
            .copied()
            .filter(|&p| self.board.placed_at(p) == Some(defunct))
            .collect();
        self.board.assign(&positions, acquirer);
        self.ledger.get_mut(defunct)?.dissolve();
        let safe = {
            let corp = self.ledger.get_mut(acquirer)?;
            corp.grow(positions.len() as u32);
            corp.safe
        };
        if safe {
            self.recompute_exchangeable();
        }
        Ok(())
    }

    /// Last defunct folded: hand the unaffiliated component tiles to the
    /// acquirer and resume the placing player's turn at buy-stocks.
    fn finalize_merger(
        &mut self,
        process: MergerProcess,
        acquirer: Chain,
    ) -> Result<(), GameError> {
        let unaffiliated: Vec<Position> = process
            .incorporated
            .iter()
            .copied()
            .filter(|&p| self.board.placed_at(p) == Some(Chain::Incorporated))
            .collect();
        self.board.assign(&unaffiliated, acquirer);
        let safe = {
            let corp = self.ledger.get_mut(acquirer)?;
            corp.grow(unaffiliated.len() as u32);
            corp.safe
        };
        if safe {
            self.recompute_exchangeable();
        }
        self.machine.transition(GamePhase::BuyStocks)?;
        self.merger = None;
        Ok(())
    }

    /// The seat whose merger deal turn it is, if a merger is taking deals.
    pub fn merger_pending_player(&self) -> Option<&str> {
        let process = self.merger.as_ref()?;
        let seat = process.current_shareholder()?;
        Some(self.players[seat].username.as_str())
    }

    /// Submit the one deal of the caller's merger turn: sell `sell` shares
    /// at the defunct price, trade `trade` shares two-for-one.
    pub fn merger_deal(&mut self, username: &str, sell: u8, trade: u8) -> Result<(), GameError> {
        self.machine.expect(GamePhase::Merge)?;
        let (seat, dealt, defunct, acquirer) = {
            let process = self.merger.as_ref().ok_or(GameError::NoMergerInProgress)?;
            let seat = process.current_shareholder().ok_or(GameError::NotYourTurn)?;
            let defunct = process.current_defunct.ok_or(GameError::NoMergerInProgress)?;
            let acquirer = process.acquirer.ok_or(GameError::NoMergerInProgress)?;
            (seat, process.dealt, defunct, acquirer)
        };
        if self.players[seat].username != username {
            return Err(GameError::NotYourTurn);
        }
        if dealt {
            return Err(GameError::AlreadyDealt);
        }

        // Validate the whole deal before touching anything.
        let held = self.players[seat].shares_of(defunct);
        let total = sell
            .checked_add(trade)
            .ok_or(GameError::InsufficientShares(defunct))?;
        if total > held {
            return Err(GameError::InsufficientShares(defunct));
        }
        {
            let (defunct_corp, acquirer_corp) = self.ledger.pair_mut(defunct, acquirer)?;
            if acquirer_corp.remaining_shares < trade / 2 {
                return Err(GameError::NoSharesRemaining(acquirer));
            }
            let player = &mut self.players[seat];
            if sell > 0 {
                StockMarket::sell(player, defunct_corp, sell)?;
            }
            if trade > 0 {
                StockMarket::trade(player, defunct_corp, acquirer_corp, trade)?;
            }
        }
        if let Some(process) = self.merger.as_mut() {
            process.dealt = true;
        }
        Ok(())
    }

    /// Close the caller's merger turn and move to the next shareholder, the
    /// next defunct, or back to the placing player's buy-stocks.
    pub fn merger_end_turn(&mut self, username: &str) -> Result<(), GameError> {
        self.machine.expect(GamePhase::Merge)?;
        let mut process = self.merger.take().ok_or(GameError::NoMergerInProgress)?;
        let Some(seat) = process.current_shareholder() else {
            self.merger = Some(process);
            return Err(GameError::NotYourTurn);
        };
        if self.players[seat].username != username {
            self.merger = Some(process);
            return Err(GameError::NotYourTurn);
        }
        process.advance_shareholder();
        if process.defunct_drained() {
            let Some(acquirer) = process.acquirer else {
                self.merger = Some(process);
                return Err(GameError::NoMergerInProgress);
            };
            self.finish_defunct(&mut process, acquirer)?;
            self.merger = Some(process);
            self.proceed_merger(false)?;
        } else {
            self.merger = Some(process);
        }
        Ok(())
    }

    /// Resolve a three-way tie: the placing player names both sides.
    pub fn resolve_conflict(
        &mut self,
        username: &str,
        acquirer: Chain,
        defunct: Chain,
    ) -> Result<(), GameError> {
        self.machine.expect(GamePhase::MergeConflict)?;
        self.ensure_current(username)?;
        let involved = self
            .merger
            .as_ref()
            .ok_or(GameError::NoMergerInProgress)?
            .involved
            .clone();
        if acquirer == defunct
            || !involved.contains(&acquirer)
            || !involved.contains(&defunct)
        {
            return Err(GameError::InvalidSelection(
                "acquirer and defunct must be distinct merging corporations".into(),
            ));
        }
        let acquirer_size = self.ledger.get(acquirer)?.size;
        let defunct_size = self.ledger.get(defunct)?.size;
        let max_size = involved
            .iter()
            .filter_map(|&c| self.ledger.get(c).ok())
            .map(|c| c.size)
            .max()
            .unwrap_or(0);
        if acquirer_size < defunct_size || acquirer_size < max_size {
            return Err(GameError::InvalidSelection(
                "acquirer must be a largest merging corporation".into(),
            ));
        }
        if let Some(process) = self.merger.as_mut() {
            process.choose_acquirer(acquirer, &self.ledger);
        }
        self.machine.transition(GamePhase::Merge)?;
        self.proceed_merger(false)
    }

    /// Resolve an acquirer tie: the placing player names the survivor.
    pub fn resolve_acquirer(&mut self, username: &str, acquirer: Chain) -> Result<(), GameError> {
        self.machine.expect(GamePhase::AcquirerSelection)?;
        self.ensure_current(username)?;
        let involved = self
            .merger
            .as_ref()
            .ok_or(GameError::NoMergerInProgress)?
            .involved
            .clone();
        let max_size = involved
            .iter()
            .filter_map(|&c| self.ledger.get(c).ok())
            .map(|c| c.size)
            .max()
            .unwrap_or(0);
        let valid = involved.contains(&acquirer)
            && self.ledger.get(acquirer)?.size == max_size;
        if !valid {
            return Err(GameError::InvalidSelection(
                "acquirer must be a largest merging corporation".into(),
            ));
        }
        if let Some(process) = self.merger.as_mut() {
            process.choose_acquirer(acquirer, &self.ledger);
        }
        self.proceed_merger(false)
    }

    /// Resolve a defunct tie: the placing player names which tied chain
    /// dissolves next.
    pub fn confirm_defunct(&mut self, username: &str, defunct: Chain) -> Result<(), GameError> {
        self.machine.expect(GamePhase::DefunctSelection)?;
        self.ensure_current(username)?;
        let tied = self
            .merger
            .as_ref()
            .ok_or(GameError::NoMergerInProgress)?
            .tied_smallest(&self.ledger);
        if !tied.contains(&defunct) {
            return Err(GameError::InvalidSelection(
                "defunct must be one of the tied corporations".into(),
            ));
        }
        if let Some(process) = self.merger.as_mut() {
            process.promote_defunct(defunct);
        }
        self.machine.transition(GamePhase::Merge)?;
        self.proceed_merger(true)
    }

    /// Acknowledge the end of a merge. The sub-loop advances itself on
    /// merger end-turns, so this is a no-op unless a fully drained merger
    /// is somehow still parked.
    pub fn end_merge(&mut self) -> Result<(), GameError> {
        if self.machine.current() != GamePhase::Merge {
            return Ok(());
        }
        if let Some(process) = self.merger.take() {
            if process.complete() {
                if let Some(acquirer) = process.acquirer {
                    return self.finalize_merger(process, acquirer);
                }
            } else {
                self.merger = Some(process);
            }
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // End of game
    // ------------------------------------------------------------------

    fn game_end_condition(&self) -> bool {
        let active: Vec<_> = self.ledger.iter().filter(|c| c.active).collect();
        !active.is_empty()
            && (active.iter().any(|c| c.size >= ENDGAME_SIZE) || active.iter().all(|c| c.safe))
    }

    fn finish_game(&mut self) -> Result<GameResult, GameError> {
        let mut bonuses = Vec::new();
        for chain in self.ledger.active_chains() {
            let corp = self.ledger.get(chain)?.clone();
            bonuses.extend(StockMarket::distribute_bonuses(&mut self.players, &corp));
            let corp = self.ledger.get_mut(chain)?;
            StockMarket::liquidate(&mut self.players, corp);
        }
        let mut ranked: Vec<RankedPlayer> = self
            .players
            .iter()
            .map(|p| RankedPlayer { username: p.username.clone(), balance: p.balance })
            .collect();
        ranked.sort_by(|a, b| b.balance.cmp(&a.balance));
        for player in &mut self.players {
            player.taking_turn = false;
        }
        self.machine.transition(GamePhase::GameEnd)?;
        let result = GameResult { players: ranked, bonuses };
        self.final_result = Some(result.clone());
        Ok(result)
    }

    // ------------------------------------------------------------------
    // Hand maintenance
    // ------------------------------------------------------------------

    fn refill_current_hand(&mut self) {
        let idx = self.current_player;
        let player = &mut self.players[idx];
        player.newly_refilled_tile = None;

        // Placed slots free up first.
        player.hand.retain(|t| !t.placed);
        while player.hand.len() < HAND_SIZE {
            match self.stack.draw() {
                Some(tile) => {
                    player.newly_refilled_tile = Some(tile.position);
                    player.hand.push(tile);
                }
                None => break,
            }
        }

        // Then swap out tiles that became unplayable.
        let mut kept = Vec::with_capacity(player.hand.len());
        for tile in player.hand.drain(..) {
            if tile.exchangeable {
                self.stack.push_back(tile);
                if let Some(fresh) = self.stack.draw() {
                    player.newly_refilled_tile = Some(fresh.position);
                    kept.push(fresh);
                }
            } else {
                kept.push(tile);
            }
        }
        player.hand = kept;

        self.recompute_exchangeable();
    }

    /// Flag hand tiles whose placement would bridge two safe chains.
    /// Flags are one-way; the swap happens at refill.
    fn recompute_exchangeable(&mut self) {
        let safe = self.ledger.safe_chains();
        if safe.len() < 2 {
            return;
        }
        for player in &mut self.players {
            for tile in &mut player.hand {
                if tile.placed || tile.exchangeable {
                    continue;
                }
                let mut adjacent_safe: Vec<Chain> = tile
                    .position
                    .neighbors()
                    .into_iter()
                    .filter_map(|n| self.board.placed_at(n))
                    .filter(|c| safe.contains(c))
                    .collect();
                adjacent_safe.sort();
                adjacent_safe.dedup();
                if adjacent_safe.len() >= 2 {
                    tile.exchangeable = true;
                }
            }
        }
    }

    // ------------------------------------------------------------------
    // Snapshots
    // ------------------------------------------------------------------

    /// Per-user status view. Other seats' hands and balances stay hidden.
    pub fn snapshot_for(&self, username: Option<&str>) -> GameSnapshot {
        let corporations = self
            .ledger
            .iter()
            .map(|corp| {
                let stats = corp.stats();
                CorporationView {
                    name: corp.chain,
                    active: corp.active,
                    size: corp.size,
                    remaining_shares: corp.remaining_shares,
                    safe: corp.safe,
                    price: stats.price,
                    majority_bonus: stats.majority_bonus,
                    minority_bonus: stats.minority_bonus,
                }
            })
            .collect();
        let players = self
            .players
            .iter()
            .map(|p| PublicPlayerView {
                username: p.username.clone(),
                taking_turn: p.taking_turn,
                shares: p.shares.clone(),
            })
            .collect();
        let self_view = username
            .and_then(|name| self.player(name))
            .map(|p| SelfView {
                username: p.username.clone(),
                balance: p.balance,
                hand: p.hand.clone(),
                shares: p.shares.clone(),
                newly_refilled_tile: p.newly_refilled_tile,
            });
        let merger = self.merger.as_ref().map(|process| MergerView {
            acquirer: process.acquirer,
            defunct: process.current_defunct,
            pending_player: self.merger_pending_player().map(str::to_string),
        });
        GameSnapshot {
            state: self.phase(),
            board: self.board.tiles(),
            corporations,
            players,
            self_view,
            current_turn: self.recorder.current().to_vec(),
            previous_turn: self.recorder.previous().to_vec(),
            merger,
        }
    }
}
