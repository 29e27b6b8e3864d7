//! # Chatter Protocol Library
//!
//! Types and transports shared by the membership server and chat clients.
//!
//! ## Wire protocol
//!
//! Messages are ASCII lines terminated by `\n`. The control stream between a client and
//! the server carries `HELO`, `ACPT`, `RJCT` and bare `EXIT`. The connectionless broadcast
//! channel carries `JOIN` and named `EXIT` announcements from the server, and `MESG` chat
//! lines sent directly from peer to peer.
//!
//! ## Module Organization
//!
//! - `member`: member identity, roster, screen name and port validation
//! - `message`: encoding and decoding of the six verbs
//! - `framing`: reassembly of newline-delimited frames from stream chunks
//! - `broadcast`: the UDP endpoint, run on its own single-threaded reactor
//! - `error`: error types used across the workspace

pub mod broadcast;
pub mod error;
pub mod framing;
pub mod member;
pub mod message;

pub use broadcast::{BroadcastHandle, BroadcastReactor, BroadcastRequest};
pub use error::{BroadcastError, DecodeError, ValidationError};
pub use framing::FrameReassembler;
pub use member::{validate_port, validate_screen_name, Member, Roster};
pub use message::Message;
