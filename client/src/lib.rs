//! # Game Client Library
//!
//! Client side of the homestead sandbox: the input state machine that
//! decides what a key press means, the mirror of the server's world, and
//! the background connection that feeds it.
//!
//! ## Architecture Overview
//!
//! ### Server Authority
//! The client never creates, damages or removes world entities on its own.
//! Requests go to the server, and the local mirror changes only when the
//! resulting broadcast comes back. Fence placement is checked locally with
//! the same validator the server runs, so obviously bad requests never hit
//! the wire, but a locally valid request can still be rejected.
//!
//! ### One Meaning per Key
//! Directional input is interpreted by exactly one consumer at a time:
//! walking, the inventory cursor, fence piece cycling, or the targeting
//! cursor. The navigation arbiter owns that choice. Targeting pre-empts the
//! other modes and hands control back to the mode that started it.
//!
//! ### Self-Healing Mirror
//! An update for an entity the mirror has never seen means a message was
//! missed. The client then requests a full snapshot, with at most one
//! request outstanding.
//!
//! ## Module Organization
//!
//! ### Navigation Module (`navigation`)
//! - `NavigationMode` and the `NavigationModeArbiter` transition rules
//! - Stability window after entering fence building
//! - Directional routing per mode
//!
//! ### Targeting Module (`targeting`)
//! - Tile cursor with adjacent and range clamping
//! - Pluggable `TargetValidator` and `CameraProjection`
//! - Exactly-once completion callback
//!
//! ### Input Module (`input`)
//! - Logical keys and the `InputSource` trait
//! - `InputController`, which routes keys through the arbiter
//! - A stdin-backed source for the terminal client
//!
//! ### World Module (`world`)
//! - `ClientWorld`, the mirror of server state
//! - `GameMessageHandler`, which applies deltas, queues resyncs and
//!   collects notifications
//!
//! ### Network Module (`network`)
//! - Worker thread with its own tokio runtime
//! - Length-prefixed frames over TCP and periodic heartbeats
//!
//! ### Game Module (`game`)
//! - `GameClient`, the per-tick update and the blocking run loop
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use client::game::GameClient;
//! use client::input::StdinInput;
//! use client::network::NetworkClient;
//! use std::time::Duration;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let mut network = NetworkClient::connect("127.0.0.1:8080", "ada")?;
//! let mut input = StdinInput::spawn()?;
//! let mut game = GameClient::new(1);
//!
//! // Runs until the player quits or the server goes away
//! game.run(&mut network, &mut input, Duration::from_millis(50));
//! # Ok(())
//! # }
//! ```

pub mod game;
pub mod input;
pub mod navigation;
pub mod network;
pub mod targeting;
pub mod world;
