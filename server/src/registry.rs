//! Authoritative membership state for the chat server
//!
//! This module decides, for every control session:
//! - whether a HELO is accepted, rejected as a duplicate name, or ignored
//! - which member an EXIT removes and who hears about it
//! - what is forgotten when a stream closes without an EXIT
//!
//! The registry performs no I/O. Each handler returns the [`RegistryEffect`]s the network
//! layer must carry out, in order, which keeps roster mutation and the replies it causes
//! inside one handler call.

use log::{info, warn};
use shared::{Member, Message, Roster};
use std::collections::HashMap;

/// Identifies one accepted control stream
pub type SessionId = u64;

/// Membership progress of a single control session
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    /// Connected, no HELO accepted yet
    Unregistered,
    /// Bound to a member of the roster
    Registered(Member),
    /// Refused with RJCT; waiting for the stream to close
    Rejected,
    /// Sent EXIT; waiting for the stream to finish closing
    Closed,
}

/// Output of a registry handler, carried out by the caller in order
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistryEffect {
    /// Write a message on one session's control stream
    Reply {
        session_id: SessionId,
        message: Message,
    },
    /// Close one session's control stream
    Close { session_id: SessionId },
    /// Send a datagram to each listed member's broadcast endpoint
    Broadcast { message: Message, peers: Vec<Member> },
}

/// Tracks open sessions and the roster they build
///
/// A session enters the registry when its stream is accepted and leaves it when the
/// stream closes. The roster only ever holds members bound to a live session.
#[derive(Debug)]
pub struct MemberRegistry {
    /// Open sessions indexed by id
    sessions: HashMap<SessionId, SessionState>,
    /// Registered members in join order
    roster: Roster,
    /// Next id handed to an accepted stream
    next_session_id: SessionId,
}

impl MemberRegistry {
    pub fn new() -> Self {
        Self {
            sessions: HashMap::new(),
            roster: Roster::new(),
            next_session_id: 1,
        }
    }

    /// Records a newly accepted stream and returns its id
    pub fn open_session(&mut self) -> SessionId {
        let session_id = self.next_session_id;
        self.next_session_id += 1;
        self.sessions.insert(session_id, SessionState::Unregistered);
        session_id
    }

    /// Handles a join request
    ///
    /// A HELO on a session that is not unregistered is a protocol violation and is ignored.
    /// A screen name already on the roster gets RJCT, the session is marked rejected and
    /// then closed.
    /// Otherwise the member is appended, the session receives ACPT with the full roster,
    /// and every other member is sent a JOIN.
    pub fn handle_helo(&mut self, session_id: SessionId, member: Member) -> Vec<RegistryEffect> {
        match self.sessions.get(&session_id) {
            Some(SessionState::Unregistered) => {}
            Some(state) => {
                warn!(
                    "Session {} sent HELO as {} while {:?}. Ignoring HELO.",
                    session_id,
                    member.screen_name(),
                    state
                );
                return Vec::new();
            }
            None => {
                warn!("HELO from unknown session {}", session_id);
                return Vec::new();
            }
        }

        if self.roster.contains(member.screen_name()) {
            info!(
                "Session {} rejected: screen name {} in use",
                session_id,
                member.screen_name()
            );
            self.sessions.insert(session_id, SessionState::Rejected);
            return vec![
                RegistryEffect::Reply {
                    session_id,
                    message: Message::Rjct {
                        screen_name: member.screen_name().to_string(),
                    },
                },
                RegistryEffect::Close { session_id },
            ];
        }

        let existing = self.roster.to_vec();
        self.roster.insert(member.clone());
        self.sessions
            .insert(session_id, SessionState::Registered(member.clone()));
        info!(
            "{} joined from {}:{} (session {})",
            member.screen_name(),
            member.address(),
            member.port(),
            session_id
        );

        let mut effects = vec![RegistryEffect::Reply {
            session_id,
            message: Message::Acpt(self.roster.to_vec()),
        }];
        if !existing.is_empty() {
            effects.push(RegistryEffect::Broadcast {
                message: Message::Join(member),
                peers: existing,
            });
        }
        effects
    }

    /// Handles a graceful departure
    ///
    /// Removes the session's member and announces the EXIT to the remaining members.
    /// The departing member gets the same datagram as its acknowledgement.
    pub fn handle_exit(&mut self, session_id: SessionId) -> Vec<RegistryEffect> {
        let departing = match self.sessions.get(&session_id) {
            Some(SessionState::Registered(member)) => member.clone(),
            Some(state) => {
                warn!(
                    "Session {} sent EXIT while {:?}. Ignoring EXIT.",
                    session_id, state
                );
                return Vec::new();
            }
            None => {
                warn!("EXIT from unknown session {}", session_id);
                return Vec::new();
            }
        };

        self.roster.remove(departing.screen_name());
        self.sessions.insert(session_id, SessionState::Closed);
        info!("{} left (session {})", departing.screen_name(), session_id);

        let mut peers = self.roster.to_vec();
        peers.push(departing.clone());
        vec![RegistryEffect::Broadcast {
            message: Message::Exit {
                screen_name: Some(departing.screen_name().to_string()),
            },
            peers,
        }]
    }

    /// Forgets a session whose stream has closed
    ///
    /// A member still bound to the session is dropped from the roster without any EXIT
    /// announcement; only an explicit EXIT is broadcast. Returns that member.
    pub fn close_session(&mut self, session_id: SessionId) -> Option<Member> {
        match self.sessions.remove(&session_id)? {
            SessionState::Registered(member) => {
                self.roster.remove(member.screen_name());
                info!(
                    "{} disconnected without EXIT (session {})",
                    member.screen_name(),
                    session_id
                );
                Some(member)
            }
            SessionState::Unregistered | SessionState::Rejected | SessionState::Closed => None,
        }
    }

    pub fn session_state(&self, session_id: SessionId) -> Option<&SessionState> {
        self.sessions.get(&session_id)
    }

    pub fn roster(&self) -> &Roster {
        &self.roster
    }

    /// Number of open sessions, registered or not
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

impl Default for MemberRegistry {
    fn default() -> Self {
        Self::new()
    }
}
