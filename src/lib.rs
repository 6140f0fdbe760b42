//! Boardroom: a real-time multiplayer server for a stock-acquisition board
//! game. The library exposes the engine and service layers so integration
//! tests and tooling can drive them directly; the binary in `main.rs` wires
//! everything to the network.

pub mod config;
pub mod error;
pub mod game;
pub mod http;
pub mod lobby;
pub mod manager;
pub mod realtime;
