//! Tile board: a fixed 9x12 grid of placement cells.
//!
//! The board only ever accumulates tiles; a placed tile is never removed.
//! Chain membership of a placed tile starts as [`Chain::Incorporated`] and is
//! rewritten when a corporation is founded or absorbs the tile in a merger.

use std::collections::{HashMap, VecDeque};

use serde::{Deserialize, Serialize};

use crate::game::corporation::Chain;
use crate::game::GameError;

/// Number of rows on the board.
pub const ROWS: u8 = 9;
/// Number of columns on the board.
pub const COLS: u8 = 12;
/// Total number of cells (and therefore tiles in the game).
pub const CELLS: usize = (ROWS as usize) * (COLS as usize);

/// A cell coordinate. `x` is the row index, `y` the column index, matching
/// the wire format used by clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Position {
    pub x: u8,
    pub y: u8,
}

impl Position {
    /// Build a position, rejecting out-of-range coordinates.
    pub fn new(x: u8, y: u8) -> Result<Self, GameError> {
        if x >= ROWS || y >= COLS {
            return Err(GameError::InvalidPosition { x, y });
        }
        Ok(Self { x, y })
    }

    /// The up-to-four orthogonal neighbors that exist on the board.
    pub fn neighbors(self) -> Vec<Position> {
        let mut out = Vec::with_capacity(4);
        if self.x > 0 {
            out.push(Position { x: self.x - 1, y: self.y });
        }
        if self.x + 1 < ROWS {
            out.push(Position { x: self.x + 1, y: self.y });
        }
        if self.y > 0 {
            out.push(Position { x: self.x, y: self.y - 1 });
        }
        if self.y + 1 < COLS {
            out.push(Position { x: self.x, y: self.y + 1 });
        }
        out
    }
}

/// A tile that has been committed to the board.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlacedTile {
    pub position: Position,
    pub belongs_to: Chain,
}

/// The shared board. At most one placed tile per position. Serialized as
/// the flat tile list clients see.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(into = "Vec<PlacedTile>", from = "Vec<PlacedTile>")]
pub struct Board {
    placed: HashMap<Position, Chain>,
}

impl From<Board> for Vec<PlacedTile> {
    fn from(board: Board) -> Self {
        board.tiles()
    }
}

impl From<Vec<PlacedTile>> for Board {
    fn from(tiles: Vec<PlacedTile>) -> Self {
        Self {
            placed: tiles
                .into_iter()
                .map(|t| (t.position, t.belongs_to))
                .collect(),
        }
    }
}

impl Board {
    pub fn new() -> Self {
        Self::default()
    }

    /// Chain owning the tile at `pos`, if one is placed there.
    pub fn placed_at(&self, pos: Position) -> Option<Chain> {
        self.placed.get(&pos).copied()
    }

    pub fn is_occupied(&self, pos: Position) -> bool {
        self.placed.contains_key(&pos)
    }

    pub fn placed_count(&self) -> usize {
        self.placed.len()
    }

    /// Commit a tile to the board. Placing onto an occupied cell is an
    /// engine invariant violation.
    pub fn place(&mut self, pos: Position, chain: Chain) -> Result<(), GameError> {
        if self.placed.contains_key(&pos) {
            return Err(GameError::PositionOccupied { x: pos.x, y: pos.y });
        }
        self.placed.insert(pos, chain);
        Ok(())
    }

    /// All placed tiles transitively 4-connected to `pos`, including `pos`
    /// itself when occupied. Iterative with an explicit frontier; bounded by
    /// the board size.
    pub fn connected_component(&self, pos: Position) -> Vec<PlacedTile> {
        let Some(origin) = self.placed_at(pos) else {
            return Vec::new();
        };
        let mut seen: HashMap<Position, Chain> = HashMap::new();
        seen.insert(pos, origin);
        let mut frontier = VecDeque::new();
        frontier.push_back(pos);
        while let Some(current) = frontier.pop_front() {
            for neighbor in current.neighbors() {
                if seen.contains_key(&neighbor) {
                    continue;
                }
                if let Some(chain) = self.placed_at(neighbor) {
                    seen.insert(neighbor, chain);
                    frontier.push_back(neighbor);
                }
            }
        }
        let mut tiles: Vec<PlacedTile> = seen
            .into_iter()
            .map(|(position, belongs_to)| PlacedTile { position, belongs_to })
            .collect();
        tiles.sort_by_key(|t| t.position);
        tiles
    }

    /// Bin a set of tiles by the chain they belong to.
    pub fn group_by_chain(tiles: &[PlacedTile]) -> HashMap<Chain, Vec<Position>> {
        let mut groups: HashMap<Chain, Vec<Position>> = HashMap::new();
        for tile in tiles {
            groups.entry(tile.belongs_to).or_default().push(tile.position);
        }
        groups
    }

    /// Rewrite chain membership for the given positions in place.
    pub fn assign(&mut self, positions: &[Position], chain: Chain) {
        for pos in positions {
            if let Some(owner) = self.placed.get_mut(pos) {
                *owner = chain;
            }
        }
    }

    /// Snapshot of every placed tile, ordered for stable wire output.
    pub fn tiles(&self) -> Vec<PlacedTile> {
        let mut tiles: Vec<PlacedTile> = self
            .placed
            .iter()
            .map(|(&position, &belongs_to)| PlacedTile { position, belongs_to })
            .collect();
        tiles.sort_by_key(|t| t.position);
        tiles
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pos(x: u8, y: u8) -> Position {
        Position::new(x, y).unwrap()
    }

    #[test]
    fn rejects_out_of_range_positions() {
        assert!(Position::new(9, 0).is_err());
        assert!(Position::new(0, 12).is_err());
        assert!(Position::new(8, 11).is_ok());
    }

    #[test]
    fn placing_twice_is_rejected() {
        let mut board = Board::new();
        board.place(pos(0, 0), Chain::Incorporated).unwrap();
        assert!(board.place(pos(0, 0), Chain::Incorporated).is_err());
        assert_eq!(board.placed_count(), 1);
    }

    #[test]
    fn component_spans_orthogonal_neighbors_only() {
        let mut board = Board::new();
        board.place(pos(1, 1), Chain::Incorporated).unwrap();
        board.place(pos(1, 2), Chain::Incorporated).unwrap();
        board.place(pos(2, 2), Chain::Phoenix).unwrap();
        // Diagonal tile must not join the component.
        board.place(pos(0, 0), Chain::Incorporated).unwrap();

        let component = board.connected_component(pos(1, 1));
        let positions: Vec<Position> = component.iter().map(|t| t.position).collect();
        assert_eq!(positions, vec![pos(1, 1), pos(1, 2), pos(2, 2)]);
    }

    #[test]
    fn component_of_empty_cell_is_empty() {
        let board = Board::new();
        assert!(board.connected_component(pos(4, 4)).is_empty());
    }

    #[test]
    fn assign_rewrites_membership() {
        let mut board = Board::new();
        board.place(pos(3, 3), Chain::Incorporated).unwrap();
        board.place(pos(3, 4), Chain::Incorporated).unwrap();
        board.assign(&[pos(3, 3), pos(3, 4)], Chain::Zeta);
        assert_eq!(board.placed_at(pos(3, 3)), Some(Chain::Zeta));
        assert_eq!(board.placed_at(pos(3, 4)), Some(Chain::Zeta));
    }

    #[test]
    fn serde_round_trips_the_tile_list() {
        let mut board = Board::new();
        board.place(pos(0, 0), Chain::Phoenix).unwrap();
        board.place(pos(4, 7), Chain::Incorporated).unwrap();
        let json = serde_json::to_string(&board).unwrap();
        let restored: Board = serde_json::from_str(&json).unwrap();
        assert_eq!(restored.tiles(), board.tiles());
    }

    #[test]
    fn group_by_chain_bins_tiles() {
        let mut board = Board::new();
        board.place(pos(5, 5), Chain::Hydra).unwrap();
        board.place(pos(5, 6), Chain::Hydra).unwrap();
        board.place(pos(5, 7), Chain::Incorporated).unwrap();
        let component = board.connected_component(pos(5, 5));
        let groups = Board::group_by_chain(&component);
        assert_eq!(groups[&Chain::Hydra].len(), 2);
        assert_eq!(groups[&Chain::Incorporated].len(), 1);
    }
}
