//! Client-side copy of the server's member list
//!
//! The mirror only tracks state. The coordinator in [`crate::network`] turns the
//! [`MirrorEvent`]s it returns into broadcast peer-list updates and front-end events.

use shared::{Member, Message, Roster};

/// What applying one message did to the mirror
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MirrorEvent {
    /// ACPT replaced the whole roster
    RosterReplaced(Vec<Member>),
    MemberJoined(Member),
    MemberLeft(String),
    /// The server echoed our own EXIT back
    ExitAcknowledged,
    /// Registration was refused for this screen name
    Rejected(String),
    MessageReceived {
        screen_name: String,
        text: String,
    },
    /// The message changed nothing
    Ignored,
}

#[derive(Debug, Clone)]
pub struct ClientMirror {
    screen_name: String,
    roster: Roster,
}

impl ClientMirror {
    pub fn new(screen_name: impl Into<String>) -> Self {
        ClientMirror {
            screen_name: screen_name.into(),
            roster: Roster::new(),
        }
    }

    pub fn screen_name(&self) -> &str {
        &self.screen_name
    }

    pub fn members(&self) -> Vec<Member> {
        self.roster.to_vec()
    }

    pub fn apply(&mut self, message: Message) -> MirrorEvent {
        match message {
            Message::Acpt(members) => {
                self.roster.replace(members);
                MirrorEvent::RosterReplaced(self.roster.to_vec())
            }
            Message::Join(member) => {
                if member.screen_name() == self.screen_name {
                    return MirrorEvent::Ignored;
                }
                if self.roster.insert(member.clone()) {
                    MirrorEvent::MemberJoined(member)
                } else {
                    MirrorEvent::Ignored
                }
            }
            Message::Exit {
                screen_name: Some(name),
            } => {
                if name == self.screen_name {
                    MirrorEvent::ExitAcknowledged
                } else if self.roster.remove(&name).is_some() {
                    MirrorEvent::MemberLeft(name)
                } else {
                    MirrorEvent::Ignored
                }
            }
            Message::Rjct { screen_name } => MirrorEvent::Rejected(screen_name),
            Message::Mesg { screen_name, text } => {
                MirrorEvent::MessageReceived { screen_name, text }
            }
            // HELO and bare EXIT only ever travel client to server
            Message::Helo(_) | Message::Exit { screen_name: None } => MirrorEvent::Ignored,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn member(name: &str, port: u16) -> Member {
        Member::new(name, "127.0.0.1", port).unwrap()
    }

    fn joined_mirror() -> ClientMirror {
        let mut mirror = ClientMirror::new("bob");
        mirror.apply(Message::Acpt(vec![member("alice", 9001), member("bob", 9002)]));
        mirror
    }

    #[test]
    fn test_acpt_replaces_roster() {
        let mut mirror = ClientMirror::new("bob");
        mirror.apply(Message::Join(member("stale", 1)));

        let event = mirror.apply(Message::Acpt(vec![member("alice", 9001), member("bob", 9002)]));

        assert_eq!(
            event,
            MirrorEvent::RosterReplaced(vec![member("alice", 9001), member("bob", 9002)])
        );
        let names: Vec<_> = mirror.members().iter().map(|m| m.screen_name().to_string()).collect();
        assert_eq!(names, vec!["alice", "bob"]);
    }

    #[test]
    fn test_join_appends_once() {
        let mut mirror = joined_mirror();

        assert_eq!(
            mirror.apply(Message::Join(member("carol", 9003))),
            MirrorEvent::MemberJoined(member("carol", 9003))
        );
        assert_eq!(mirror.apply(Message::Join(member("carol", 9003))), MirrorEvent::Ignored);
        assert_eq!(mirror.members().len(), 3);
    }

    #[test]
    fn test_join_for_self_is_ignored() {
        let mut mirror = ClientMirror::new("bob");

        assert_eq!(mirror.apply(Message::Join(member("bob", 9002))), MirrorEvent::Ignored);
        assert!(mirror.members().is_empty());
    }

    #[test]
    fn test_exit_removes_other_member() {
        let mut mirror = joined_mirror();

        let event = mirror.apply(Message::Exit {
            screen_name: Some("alice".into()),
        });

        assert_eq!(event, MirrorEvent::MemberLeft("alice".into()));
        assert_eq!(mirror.members(), vec![member("bob", 9002)]);
    }

    #[test]
    fn test_exit_for_unknown_member_is_ignored() {
        let mut mirror = joined_mirror();

        let event = mirror.apply(Message::Exit {
            screen_name: Some("zed".into()),
        });

        assert_eq!(event, MirrorEvent::Ignored);
        assert_eq!(mirror.members().len(), 2);
    }

    #[test]
    fn test_own_exit_is_acknowledgement() {
        let mut mirror = joined_mirror();

        let event = mirror.apply(Message::Exit {
            screen_name: Some("bob".into()),
        });

        assert_eq!(event, MirrorEvent::ExitAcknowledged);
    }

    #[test]
    fn test_rjct_and_mesg_leave_roster_alone() {
        let mut mirror = joined_mirror();

        assert_eq!(
            mirror.apply(Message::Rjct {
                screen_name: "bob".into()
            }),
            MirrorEvent::Rejected("bob".into())
        );
        assert_eq!(
            mirror.apply(Message::Mesg {
                screen_name: "alice".into(),
                text: "hi: all".into()
            }),
            MirrorEvent::MessageReceived {
                screen_name: "alice".into(),
                text: "hi: all".into()
            }
        );
        assert_eq!(mirror.members().len(), 2);
    }

    #[test]
    fn test_client_only_verbs_are_ignored() {
        let mut mirror = joined_mirror();

        assert_eq!(mirror.apply(Message::Helo(member("eve", 1))), MirrorEvent::Ignored);
        assert_eq!(mirror.apply(Message::Exit { screen_name: None }), MirrorEvent::Ignored);
    }
}
