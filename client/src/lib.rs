//! # Chatter Client Library
//!
//! The client half of the chat protocol. A client registers with the membership server
//! over a control stream, mirrors the member list the server distributes, and sends chat
//! lines straight to every other member as datagrams.
//!
//! ## Module Organization
//!
//! - `control`: the control stream, with a background reader that decodes frames
//! - `mirror`: the local copy of the member list, driven by ACPT, JOIN and EXIT
//! - `network`: the [`network::Client`] coordinator that sequences the control stream
//!   against the broadcast reactor and talks to the front end through channels
//! - `error`: client error type
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use client::network::{Client, ClientCommand, ClientEvent, ConnectParams};
//! use tokio::sync::mpsc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let (commands, commands_rx) = mpsc::unbounded_channel();
//!     let (events_tx, mut events) = mpsc::unbounded_channel();
//!     let client = Client::new(commands_rx, events_tx)?;
//!     let task = tokio::spawn(client.run());
//!
//!     commands.send(ClientCommand::Connect(ConnectParams::new("alice", "127.0.0.1", "8080")?))?;
//!     commands.send(ClientCommand::SendMessage("hello".into()))?;
//!     while let Some(event) = events.recv().await {
//!         if let ClientEvent::MessageReceived { screen_name, text } = event {
//!             println!("{}: {}", screen_name, text);
//!         }
//!     }
//!     task.await?;
//!     Ok(())
//! }
//! ```

pub mod control;
pub mod error;
pub mod mirror;
pub mod network;

pub use error::ClientError;
