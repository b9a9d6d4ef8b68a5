//! # Presence Relay Library
//!
//! Server side of the avatar presence layer. The relay is deliberately thin: it does not
//! simulate, validate or correct movement. Each client is the only writer of its own
//! avatar state, and the relay's job is to get that state to everybody else.
//!
//! ## Core Responsibilities
//!
//! ### Identity
//! Every successful join is assigned a fresh peer id. Ids start at 1 and are never
//! reused during a server run.
//!
//! ### Roster Hand-off
//! A joining client receives the list of peers already present together with their
//! last known pose, so it can render them before their next update arrives. Everyone
//! else receives a single `PeerJoined` announcement.
//!
//! ### Forwarding
//! `Move` packets are re-broadcast as `PeerMoved` to every client except the sender.
//! A packet whose claimed peer id does not belong to the address it came from is
//! dropped.
//!
//! ### Departures
//! Explicit `Leave` packets and silent connections (no traffic for the configured
//! timeout) both end in a `PeerLeft` broadcast.
//!
//! ## Module Organization
//!
//! ### Client Manager Module (`client_manager`)
//! Connection bookkeeping: id assignment, capacity, address ownership, timeouts.
//!
//! ### Room Module (`room`)
//! Who is present and where each member was last seen.
//!
//! ### Network Module (`network`)
//! UDP socket handling and the relay loop.
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use server::client_manager::DEFAULT_TIMEOUT;
//! use server::network::Server;
//! use server::room::DEFAULT_ROOM;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
//!     let mut server = Server::new("127.0.0.1:8080", 32, DEFAULT_TIMEOUT, DEFAULT_ROOM).await?;
//!     server.run().await?;
//!     Ok(())
//! }
//! ```
//!
//! The server uses an event-driven architecture with internal async tasks that handle:
//! - **Network Receiver**: decodes incoming datagrams and drops malformed ones
//! - **Network Sender**: processes the outgoing queue, including broadcasts with sender exclusion
//! - **Timeout Checker**: removes connections that went silent
//! - **Relay Loop**: applies joins, moves and leaves to the room and queues the resulting packets

pub mod client_manager;
pub mod network;
pub mod room;
