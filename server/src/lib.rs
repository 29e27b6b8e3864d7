//! # Chatter Membership Server
//!
//! The server keeps the authoritative list of chat members. Clients register over a
//! control stream; every other announcement goes out as datagrams to the members
//! themselves. Chat lines never pass through the server.
//!
//! ## Registration
//!
//! A client opens a control stream and sends `HELO name address port`, where the
//! address and port are its own broadcast endpoint. If the screen name is free the
//! server answers `ACPT` with the full member list (the newcomer included) and sends
//! `JOIN` to every member that was already present. A taken name is answered with
//! `RJCT name` and the stream is closed.
//!
//! ## Departure
//!
//! A registered client sends a bare `EXIT` on its control stream. The server removes it
//! and sends `EXIT name` to every remaining member and to the departing client, whose
//! copy serves as the acknowledgement. A client whose stream drops without `EXIT` is
//! removed silently.
//!
//! ## Module Organization
//!
//! ### Registry Module (`registry`)
//! The member list and per-session state. Pure state transitions that return the
//! replies, closes and broadcasts the loop must carry out.
//!
//! ### Session Module (`session`)
//! One task per control stream: frame reassembly, decoding and ordered writes.
//!
//! ### Network Module (`network`)
//! The accept loop, routing between sessions and the registry, the broadcast endpoint
//! and orderly shutdown.
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use server::network::Server;
//! use std::net::{IpAddr, Ipv4Addr};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let server = Server::bind("127.0.0.1:8080", IpAddr::V4(Ipv4Addr::UNSPECIFIED)).await?;
//!     server.run_until_ctrl_c().await?;
//!     Ok(())
//! }
//! ```

pub mod network;
pub mod registry;
pub mod session;
