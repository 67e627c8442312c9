//! # World Server Library
//!
//! Authoritative server for the homestead sandbox. It owns the one
//! consistent world (trees, stones, saplings, items, fences and players),
//! validates every request against it and broadcasts the resulting deltas
//! to all connected clients.
//!
//! ## Architecture
//!
//! ### One Lock, Many Sessions
//! Every connection runs its own reader task, but all of them share a single
//! `GameServer` behind a `tokio::sync::Mutex`. A request is handled to
//! completion under the lock, so lazy generation, mutation and the queueing
//! of broadcast messages form one atomic step. Two sessions can never both
//! decide that the same tile is still untouched.
//!
//! ### Ordered Delivery
//! Each connection has a single unbounded outbound queue drained by a
//! dedicated writer task over TCP. Messages reach every client in the order
//! the server queued them, which is what keeps the creation of a lazily
//! generated entity ahead of any update that refers to it.
//!
//! ### Broadcast Policy
//! World mutations go to every connected client, including the one that
//! caused them; clients do not predict world entities. Rejections and
//! snapshots go to the requester only.
//!
//! ## Module Organization
//!
//! - `config`: command-line configuration
//! - `world`: canonical world state and deterministic generation on demand
//! - `game`: request handlers, the outbox and broadcast dispatch
//! - `client_manager`: connection ids and per-connection queues
//! - `network`: TCP accept loop, reader/writer tasks, tick and autosave timers
//! - `persistence`: save file format and atomic writes
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use server::config::ServerConfig;
//! use server::network::Server;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let server = Server::new(ServerConfig::default()).await?;
//!     // Accepts clients, ticks saplings and autosaves until Ctrl+C
//!     server.run().await;
//!     Ok(())
//! }
//! ```

pub mod client_manager;
pub mod config;
pub mod game;
pub mod network;
pub mod persistence;
pub mod world;
