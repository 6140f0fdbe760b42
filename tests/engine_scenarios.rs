//! End-to-end engine scenarios driven through the public action API, plus
//! registry capacity behavior. Tile order is scripted through the injected
//! shuffler so every game unfolds deterministically.

use std::sync::Arc;

use boardroom::config::LimitSettings;
use boardroom::error::ApiError;
use boardroom::game::board::Position;
use boardroom::game::corporation::Chain;
use boardroom::game::engine::Game;
use boardroom::game::market::{BuyOrder, StockMarket};
use boardroom::game::player::Player;
use boardroom::game::state::GamePhase;
use boardroom::game::tiles::{Shuffler, Tile};
use boardroom::lobby::LobbySize;
use boardroom::manager::{LobbyManager, SystemClock};

fn pos(x: u8, y: u8) -> Position {
    Position::new(x, y).unwrap()
}

/// Arranges the pile so it starts with the given positions; the rest keep
/// their natural (row, col) order.
struct ScriptedShuffler {
    prefix: Vec<Position>,
}

impl ScriptedShuffler {
    fn new(prefix: Vec<Position>) -> Self {
        Self { prefix }
    }
}

impl Shuffler for ScriptedShuffler {
    fn shuffle(&mut self, tiles: &mut Vec<Tile>) {
        let mut rest: Vec<Tile> = tiles.drain(..).collect();
        let mut arranged = Vec::with_capacity(rest.len());
        for wanted in &self.prefix {
            if let Some(i) = rest.iter().position(|t| t.position == *wanted) {
                arranged.push(rest.remove(i));
            }
        }
        arranged.extend(rest);
        *tiles = arranged;
    }
}

/// Universal invariants that must hold at every observation point.
fn assert_invariants(game: &Game) {
    for corp in game.ledger().iter() {
        let held: u32 = game
            .players()
            .iter()
            .map(|p| p.shares_of(corp.chain) as u32)
            .sum();
        if corp.active {
            assert_eq!(
                held + corp.remaining_shares as u32,
                25,
                "share conservation broken for {:?}",
                corp.chain
            );
        } else {
            assert_eq!(held, 0, "inactive {:?} still held", corp.chain);
        }
        if corp.safe {
            assert!(corp.size >= 11);
        }
    }
    let tiles_in_hands: usize = game.players().iter().map(|p| p.hand.len()).sum();
    assert_eq!(tiles_in_hands + game.board().placed_count() + game.stack_len(), 108);
    assert!(game.players().iter().filter(|p| p.taking_turn).count() <= 1);
}

/// Play out a full no-op turn: place an isolated tile, buy nothing, pass.
fn junk_turn(game: &mut Game, player: &str, at: Position) {
    game.place_tile(player, at).unwrap();
    assert_eq!(game.phase(), GamePhase::BuyStocks);
    game.buy_stocks(player, &[]).unwrap();
    game.end_turn(player).unwrap();
}

/// Scenario A layout: p1 holds (0,0) and (0,1); order tiles far away.
fn establish_flow_game() -> Game {
    let prefix = vec![
        // p1 hand
        pos(0, 0),
        pos(0, 1),
        pos(5, 0),
        pos(5, 2),
        pos(5, 4),
        pos(5, 6),
        // p2 hand
        pos(7, 0),
        pos(7, 2),
        pos(7, 4),
        pos(7, 6),
        pos(7, 8),
        pos(7, 10),
        // order tiles
        pos(3, 0),
        pos(3, 5),
    ];
    let names = vec!["p1".to_string(), "p2".to_string()];
    Game::new(&names, &mut ScriptedShuffler::new(prefix)).unwrap()
}

#[test]
fn scenario_a_establish_flow() {
    let mut game = establish_flow_game();
    assert_invariants(&game);

    // First placement is isolated; no founding yet.
    game.place_tile("p1", pos(0, 0)).unwrap();
    assert_eq!(game.phase(), GamePhase::BuyStocks);
    game.buy_stocks("p1", &[]).unwrap();
    game.end_turn("p1").unwrap();

    junk_turn(&mut game, "p2", pos(7, 0));

    // Second placement touches the first: a two-tile unaffiliated component.
    game.place_tile("p1", pos(0, 1)).unwrap();
    assert_eq!(game.phase(), GamePhase::EstablishCorporation);
    game.establish("p1", Chain::Phoenix).unwrap();

    let phoenix = game.ledger().get(Chain::Phoenix).unwrap();
    assert!(phoenix.active);
    assert_eq!(phoenix.size, 2);
    assert_eq!(phoenix.remaining_shares, 24);
    let p1 = game.player("p1").unwrap();
    assert_eq!(p1.shares_of(Chain::Phoenix), 1);
    assert_eq!(p1.balance, 6_000, "founding share is free");
    assert_eq!(game.phase(), GamePhase::BuyStocks);
    assert_invariants(&game);
}

#[test]
fn scenario_b_buy_debits_submitted_price() {
    let mut game = establish_flow_game();
    game.place_tile("p1", pos(0, 0)).unwrap();
    game.buy_stocks("p1", &[]).unwrap();
    game.end_turn("p1").unwrap();
    junk_turn(&mut game, "p2", pos(7, 0));
    game.place_tile("p1", pos(0, 1)).unwrap();
    game.establish("p1", Chain::Phoenix).unwrap();

    let purchased = game
        .buy_stocks("p1", &[BuyOrder { chain: Chain::Phoenix, price: 100 }])
        .unwrap();
    assert_eq!(purchased, vec![Chain::Phoenix]);
    let p1 = game.player("p1").unwrap();
    assert_eq!(p1.balance, 5_900);
    assert_eq!(p1.shares_of(Chain::Phoenix), 2);
    assert_eq!(game.ledger().get(Chain::Phoenix).unwrap().remaining_shares, 23);
    assert_eq!(game.phase(), GamePhase::TilePlaced);
    assert_invariants(&game);
}

#[test]
fn scenario_c_tied_majority_splits_bonus_pool() {
    // Three holders 5/5/2 of a standard-tier chain priced at 200.
    let mut players =
        vec![Player::new("p1"), Player::new("p2"), Player::new("p3")];
    let mut ledger = boardroom::game::corporation::Ledger::new();
    let corp = ledger.get_mut(Chain::Hydra).unwrap();
    corp.establish(0);
    assert_eq!(corp.stats().price, 200);
    players[0].add_shares(Chain::Hydra, 5);
    players[1].add_shares(Chain::Hydra, 5);
    players[2].add_shares(Chain::Hydra, 2);

    StockMarket::distribute_bonuses(&mut players, ledger.get(Chain::Hydra).unwrap());
    assert_eq!(players[0].balance, 7_500);
    assert_eq!(players[1].balance, 7_500);
    assert_eq!(players[2].balance, 6_000);
}

/// Scenario D: grow phoenix to 5, quantum to 3, then bridge them.
#[test]
fn scenario_d_two_corporation_merge_with_deal() {
    let prefix = vec![
        // p1 hand: phoenix seeds, quantum seeds, and the bridge tile
        pos(0, 0),
        pos(0, 1),
        pos(0, 2),
        pos(2, 0),
        pos(2, 1),
        pos(1, 0),
        // p2 hand: isolated junk
        pos(5, 0),
        pos(5, 2),
        pos(5, 4),
        pos(5, 6),
        pos(5, 8),
        pos(5, 10),
        // order tiles
        pos(8, 0),
        pos(8, 11),
        // scripted refills: p1 then p2, alternating
        pos(0, 3),
        pos(7, 2),
        pos(0, 4),
        pos(7, 4),
        pos(2, 2),
    ];
    let names = vec!["p1".to_string(), "p2".to_string()];
    let mut game = Game::new(&names, &mut ScriptedShuffler::new(prefix)).unwrap();

    // Turns 1-2: isolated openers.
    junk_turn(&mut game, "p1", pos(0, 0));
    junk_turn(&mut game, "p2", pos(5, 0));

    // Turn 3: found phoenix on (0,0)-(0,1).
    game.place_tile("p1", pos(0, 1)).unwrap();
    game.establish("p1", Chain::Phoenix).unwrap();
    game.buy_stocks("p1", &[]).unwrap();
    game.end_turn("p1").unwrap();
    junk_turn(&mut game, "p2", pos(5, 2));

    // Turns 5-9: grow phoenix to size 5.
    for (p1_tile, p2_tile) in [
        (pos(0, 2), pos(5, 4)),
        (pos(0, 3), pos(5, 6)),
        (pos(0, 4), pos(5, 8)),
    ] {
        junk_turn(&mut game, "p1", p1_tile);
        junk_turn(&mut game, "p2", p2_tile);
    }
    assert_eq!(game.ledger().get(Chain::Phoenix).unwrap().size, 5);

    // Turn 11: isolated quantum seed.
    junk_turn(&mut game, "p1", pos(2, 0));
    junk_turn(&mut game, "p2", pos(5, 10));

    // Turn 13: found quantum and load up on its stock at the real price.
    game.place_tile("p1", pos(2, 1)).unwrap();
    game.establish("p1", Chain::Quantum).unwrap();
    let quantum_price = game.ledger().get(Chain::Quantum).unwrap().stats().price;
    assert_eq!(quantum_price, 400); // premium base 300 + size-2 band
    let order = BuyOrder { chain: Chain::Quantum, price: quantum_price };
    game.buy_stocks("p1", &[order, order, order]).unwrap();
    game.end_turn("p1").unwrap();
    junk_turn(&mut game, "p2", pos(7, 2));

    // Turn 15: quantum grows to 3.
    junk_turn(&mut game, "p1", pos(2, 2));
    junk_turn(&mut game, "p2", pos(7, 4));

    let p1 = game.player("p1").unwrap();
    assert_eq!(p1.shares_of(Chain::Quantum), 4);
    let balance_before_merge = p1.balance;
    assert_eq!(balance_before_merge, 6_000 - 3 * 400);
    assert_invariants(&game);

    // Turn 17: the bridge. Phoenix (5) acquires quantum (3).
    game.place_tile("p1", pos(1, 0)).unwrap();
    assert_eq!(game.phase(), GamePhase::Merge);
    assert_eq!(game.merger_pending_player(), Some("p1"));

    // Bonuses landed before any deal: p1 is sole holder, so it collects
    // majority and minority at the size-3 price of 500.
    let quantum_stats = game.ledger().get(Chain::Quantum).unwrap().stats();
    assert_eq!(quantum_stats.price, 500);
    let after_bonus = game.player("p1").unwrap().balance;
    assert_eq!(after_bonus, balance_before_merge + 5_000 + 2_500);

    // Deal: sell 2 at 500, trade 2 for 1 phoenix share.
    game.merger_deal("p1", 2, 2).unwrap();
    let p1 = game.player("p1").unwrap();
    assert_eq!(p1.shares_of(Chain::Quantum), 0);
    assert_eq!(p1.shares_of(Chain::Phoenix), 2); // founding share + traded share
    assert_eq!(p1.balance, after_bonus + 2 * 500);

    game.merger_end_turn("p1").unwrap();

    // Quantum folded into phoenix: 5 + 3 + the bridge tile.
    let phoenix = game.ledger().get(Chain::Phoenix).unwrap();
    assert_eq!(phoenix.size, 9);
    let quantum = game.ledger().get(Chain::Quantum).unwrap();
    assert!(!quantum.active);
    assert_eq!(quantum.size, 0);
    assert_eq!(quantum.remaining_shares, 25);
    assert_eq!(game.board().placed_at(pos(2, 0)), Some(Chain::Phoenix));
    assert_eq!(game.board().placed_at(pos(1, 0)), Some(Chain::Phoenix));
    assert_eq!(game.phase(), GamePhase::BuyStocks);
    assert_eq!(game.current_username(), "p1");
    assert_invariants(&game);
}

/// Scenario E: a forged save with a size-41 chain ends at the next
/// end-turn, paying bonuses once and liquidating.
#[test]
fn scenario_e_game_end_on_size_41() {
    let mut game = establish_flow_game();
    game.place_tile("p1", pos(0, 0)).unwrap();
    game.buy_stocks("p1", &[]).unwrap();
    game.end_turn("p1").unwrap();
    junk_turn(&mut game, "p2", pos(7, 0));
    game.place_tile("p1", pos(0, 1)).unwrap();
    game.establish("p1", Chain::Phoenix).unwrap();
    game.buy_stocks("p1", &[]).unwrap();
    assert_eq!(game.phase(), GamePhase::TilePlaced);

    // Save, size the chain up to the end-game threshold, and load.
    let mut saved = serde_json::to_value(&game).unwrap();
    let corporations = saved["ledger"]["corporations"].as_array_mut().unwrap();
    let phoenix = corporations
        .iter_mut()
        .find(|c| c["chain"] == "phoenix")
        .unwrap();
    phoenix["size"] = serde_json::json!(41);
    let mut game: Game = serde_json::from_value(saved).unwrap();

    let result = game.end_turn("p1").unwrap().expect("game should end");
    assert_eq!(game.phase(), GamePhase::GameEnd);

    // Size 41 premium chain: price 1200, majority 12000, minority 6000.
    // p1 holds the lone founding share, so both bonuses plus the
    // liquidation sale land on p1.
    assert_eq!(result.players[0].username, "p1");
    assert_eq!(result.players[0].balance, 6_000 + 12_000 + 6_000 + 1_200);
    assert_eq!(result.players[1].balance, 6_000);
    let paid: u32 = result.bonuses.iter().map(|b| b.amount).sum();
    assert_eq!(paid, 18_000);
    assert!(result.bonuses.iter().all(|b| b.username == "p1"));

    let phoenix = game.ledger().get(Chain::Phoenix).unwrap();
    assert!(!phoenix.active);
    assert_eq!(phoenix.remaining_shares, 25);
    assert!(game.end_result().is_some());

    // Terminal: nothing else is accepted.
    assert!(game.end_turn("p1").is_err());
    assert!(game.place_tile("p2", pos(7, 2)).is_err());
}

/// Scenario F: lobby capacity errors leave existing lobbies untouched.
#[tokio::test]
async fn scenario_f_lobby_capacity() {
    let limits = LimitSettings { max_lobbies: 2, ..LimitSettings::default() };
    let manager = LobbyManager::new(limits, Arc::new(SystemClock));
    let size = LobbySize { min: 2, max: 4 };

    let a = manager.create_lobby(size, "alice".into()).await.unwrap();
    let b = manager.create_lobby(size, "bob".into()).await.unwrap();
    let err = manager.create_lobby(size, "carol".into()).await.unwrap_err();
    assert!(matches!(err, ApiError::Capacity(_)));
    assert_eq!(err.code(), "capacity");

    let summaries = manager.lobby_summaries().await;
    assert_eq!(summaries.len(), 2);
    assert!(summaries.iter().any(|s| s.id == a));
    assert!(summaries.iter().any(|s| s.id == b));
}

/// Two equal-size chains collide: the placing player arbitrates the
/// acquirer, and shares kept through the dissolution are forfeited.
#[test]
fn equal_chains_require_acquirer_selection() {
    let prefix = vec![
        // p1 hand
        pos(0, 0),
        pos(0, 1),
        pos(2, 0),
        pos(2, 1),
        pos(1, 0),
        pos(6, 6),
        // p2 hand
        pos(5, 0),
        pos(5, 2),
        pos(5, 4),
        pos(5, 6),
        pos(5, 8),
        pos(5, 10),
        // order tiles
        pos(8, 0),
        pos(8, 11),
    ];
    let names = vec!["p1".to_string(), "p2".to_string()];
    let mut game = Game::new(&names, &mut ScriptedShuffler::new(prefix)).unwrap();

    junk_turn(&mut game, "p1", pos(0, 0));
    junk_turn(&mut game, "p2", pos(5, 0));
    game.place_tile("p1", pos(0, 1)).unwrap();
    game.establish("p1", Chain::Phoenix).unwrap();
    game.buy_stocks("p1", &[]).unwrap();
    game.end_turn("p1").unwrap();
    junk_turn(&mut game, "p2", pos(5, 2));
    junk_turn(&mut game, "p1", pos(2, 0));
    junk_turn(&mut game, "p2", pos(5, 4));
    game.place_tile("p1", pos(2, 1)).unwrap();
    game.establish("p1", Chain::Quantum).unwrap();
    game.buy_stocks("p1", &[]).unwrap();
    game.end_turn("p1").unwrap();
    junk_turn(&mut game, "p2", pos(5, 6));

    // Bridge between two size-2 chains.
    game.place_tile("p1", pos(1, 0)).unwrap();
    assert_eq!(game.phase(), GamePhase::AcquirerSelection);

    // Arbitration is the placing player's alone.
    assert!(game.resolve_acquirer("p2", Chain::Phoenix).is_err());
    game.resolve_acquirer("p1", Chain::Phoenix).unwrap();
    assert_eq!(game.phase(), GamePhase::Merge);

    // p1 keeps its founding quantum share; it is forfeited when the chain
    // dissolves, so quantum returns to a full 25 shares.
    game.merger_end_turn("p1").unwrap();
    let quantum = game.ledger().get(Chain::Quantum).unwrap();
    assert!(!quantum.active);
    assert_eq!(quantum.remaining_shares, 25);
    assert_eq!(game.player("p1").unwrap().shares_of(Chain::Quantum), 0);
    assert_eq!(game.ledger().get(Chain::Phoenix).unwrap().size, 5);
    assert_eq!(game.phase(), GamePhase::BuyStocks);
    assert_invariants(&game);
}

/// Three equal chains collide: merge-conflict names the survivor, then the
/// tied defuncts go through defunct-selection one at a time.
#[test]
fn three_way_collision_walks_conflict_and_defunct_selection() {
    let prefix = vec![
        // p1 hand
        pos(0, 0),
        pos(0, 1),
        pos(2, 0),
        pos(2, 1),
        pos(1, 3),
        pos(1, 2),
        // p2 hand
        pos(5, 0),
        pos(5, 2),
        pos(5, 4),
        pos(5, 6),
        pos(5, 8),
        pos(5, 10),
        // order tiles
        pos(8, 0),
        pos(8, 11),
        // p1's first refill is the eventual bridge
        pos(1, 1),
    ];
    let names = vec!["p1".to_string(), "p2".to_string()];
    let mut game = Game::new(&names, &mut ScriptedShuffler::new(prefix)).unwrap();

    junk_turn(&mut game, "p1", pos(0, 0));
    junk_turn(&mut game, "p2", pos(5, 0));
    game.place_tile("p1", pos(0, 1)).unwrap();
    game.establish("p1", Chain::Phoenix).unwrap();
    game.buy_stocks("p1", &[]).unwrap();
    game.end_turn("p1").unwrap();
    junk_turn(&mut game, "p2", pos(5, 2));
    junk_turn(&mut game, "p1", pos(2, 0));
    junk_turn(&mut game, "p2", pos(5, 4));
    game.place_tile("p1", pos(2, 1)).unwrap();
    game.establish("p1", Chain::Quantum).unwrap();
    game.buy_stocks("p1", &[]).unwrap();
    game.end_turn("p1").unwrap();
    junk_turn(&mut game, "p2", pos(5, 6));
    junk_turn(&mut game, "p1", pos(1, 3));
    junk_turn(&mut game, "p2", pos(5, 8));
    game.place_tile("p1", pos(1, 2)).unwrap();
    game.establish("p1", Chain::Zeta).unwrap();
    game.buy_stocks("p1", &[]).unwrap();
    game.end_turn("p1").unwrap();
    junk_turn(&mut game, "p2", pos(5, 10));

    // The bridge touches all three size-2 chains.
    game.place_tile("p1", pos(1, 1)).unwrap();
    assert_eq!(game.phase(), GamePhase::MergeConflict);

    game.resolve_conflict("p1", Chain::Phoenix, Chain::Quantum).unwrap();
    // Quantum and zeta are tied for smallest: arbitration again.
    assert_eq!(game.phase(), GamePhase::DefunctSelection);
    game.confirm_defunct("p1", Chain::Zeta).unwrap();
    assert_eq!(game.phase(), GamePhase::Merge);

    // Zeta first: p1 holds its founding share and lets it lapse.
    game.merger_end_turn("p1").unwrap();
    assert!(!game.ledger().get(Chain::Zeta).unwrap().active);
    assert_eq!(game.ledger().get(Chain::Phoenix).unwrap().size, 4);
    assert_eq!(game.phase(), GamePhase::Merge);

    // Quantum second: sell the founding share before it evaporates.
    let quantum_price = game.ledger().get(Chain::Quantum).unwrap().stats().price;
    let before = game.player("p1").unwrap().balance;
    game.merger_deal("p1", 1, 0).unwrap();
    assert_eq!(game.player("p1").unwrap().balance, before + quantum_price);
    game.merger_end_turn("p1").unwrap();

    assert!(!game.ledger().get(Chain::Quantum).unwrap().active);
    // 2 phoenix + 2 zeta + 2 quantum + the bridge.
    assert_eq!(game.ledger().get(Chain::Phoenix).unwrap().size, 7);
    assert_eq!(game.phase(), GamePhase::BuyStocks);
    assert_invariants(&game);
}

#[test]
fn sell_then_buy_round_trip_restores_position() {
    let mut player = Player::new("ada");
    let mut ledger = boardroom::game::corporation::Ledger::new();
    let corp = ledger.get_mut(Chain::Zeta).unwrap();
    corp.establish(4); // price 400
    player.add_shares(Chain::Zeta, 3);
    corp.remaining_shares -= 3;

    let price = corp.stats().price;
    StockMarket::sell(&mut player, corp, 2).unwrap();
    for _ in 0..2 {
        StockMarket::buy(&mut player, corp, price).unwrap();
    }
    assert_eq!(player.balance, 6_000);
    assert_eq!(player.shares_of(Chain::Zeta), 3);
}

#[test]
fn status_snapshots_are_idempotent() {
    let game = establish_flow_game();
    let first = serde_json::to_value(game.snapshot_for(Some("p1"))).unwrap();
    let second = serde_json::to_value(game.snapshot_for(Some("p1"))).unwrap();
    assert_eq!(first, second);
}

#[test]
fn oversized_buy_batch_is_truncated_to_three() {
    let mut game = establish_flow_game();
    game.place_tile("p1", pos(0, 0)).unwrap();
    game.buy_stocks("p1", &[]).unwrap();
    game.end_turn("p1").unwrap();
    junk_turn(&mut game, "p2", pos(7, 0));
    game.place_tile("p1", pos(0, 1)).unwrap();
    game.establish("p1", Chain::Phoenix).unwrap();

    let order = BuyOrder { chain: Chain::Phoenix, price: 100 };
    let purchased = game.buy_stocks("p1", &[order; 4]).unwrap();
    assert_eq!(purchased.len(), 3);
    let p1 = game.player("p1").unwrap();
    // Founding share plus exactly three purchases.
    assert_eq!(p1.shares_of(Chain::Phoenix), 4);
    assert_eq!(p1.balance, 6_000 - 300);
}
