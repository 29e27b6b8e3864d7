//! Line-oriented wire messages exchanged by clients and the membership server
//!
//! Every message is one frame: a verb, a single space, a verb-specific payload and a
//! terminating `\n`. The frame layer strips the newline before [`Message::decode`] sees it.

use crate::error::DecodeError;
use crate::member::{validate_port, validate_screen_name, Member};

const MEMBER_SEPARATOR: char = ':';
const MESSAGE_SEPARATOR: &str = ": ";

/// The six protocol verbs
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    /// Client asks to join, advertising its broadcast endpoint
    Helo(Member),
    /// Server accepts a join and sends the full roster
    Acpt(Vec<Member>),
    /// Server refuses a join because the screen name is taken
    Rjct { screen_name: String },
    /// Server announces a new member over the broadcast channel
    Join(Member),
    /// Departure notice. Clients send it bare; the server names the departing member.
    Exit { screen_name: Option<String> },
    /// Chat payload fanned out between peers
    Mesg { screen_name: String, text: String },
}

impl Message {
    pub fn verb(&self) -> &'static str {
        match self {
            Message::Helo(_) => "HELO",
            Message::Acpt(_) => "ACPT",
            Message::Rjct { .. } => "RJCT",
            Message::Join(_) => "JOIN",
            Message::Exit { .. } => "EXIT",
            Message::Mesg { .. } => "MESG",
        }
    }

    /// Serializes to a single newline-terminated frame
    pub fn encode(&self) -> String {
        match self {
            Message::Helo(member) => format!("HELO {}\n", encode_member(member)),
            Message::Acpt(members) => {
                let records: Vec<String> = members.iter().map(encode_member).collect();
                format!("ACPT {}\n", records.join(":"))
            }
            Message::Rjct { screen_name } => format!("RJCT {}\n", screen_name),
            Message::Join(member) => format!("JOIN {}\n", encode_member(member)),
            Message::Exit {
                screen_name: Some(screen_name),
            } => format!("EXIT {}\n", screen_name),
            Message::Exit { screen_name: None } => "EXIT\n".to_string(),
            Message::Mesg { screen_name, text } => format!("MESG {}: {}\n", screen_name, text),
        }
    }

    /// Parses one frame without its trailing newline
    ///
    /// An empty frame is not a message and yields `Ok(None)`. A trailing `\r` is
    /// tolerated so that line-oriented tools can talk to the server.
    pub fn decode(frame: &str) -> Result<Option<Message>, DecodeError> {
        let frame = frame.strip_suffix('\r').unwrap_or(frame);
        if frame.is_empty() {
            return Ok(None);
        }

        let (verb, rest) = frame.split_once(' ').unwrap_or((frame, ""));
        let message = match verb {
            "HELO" => Message::Helo(decode_member("HELO", rest)?),
            "ACPT" => Message::Acpt(
                rest.split(MEMBER_SEPARATOR)
                    .map(|record| decode_member("ACPT", record))
                    .collect::<Result<Vec<_>, _>>()?,
            ),
            "RJCT" => Message::Rjct {
                screen_name: decode_screen_name("RJCT", rest)?,
            },
            "JOIN" => Message::Join(decode_member("JOIN", rest)?),
            "EXIT" if rest.is_empty() => Message::Exit { screen_name: None },
            "EXIT" => Message::Exit {
                screen_name: Some(decode_screen_name("EXIT", rest)?),
            },
            "MESG" => {
                let (screen_name, text) = rest
                    .split_once(MESSAGE_SEPARATOR)
                    .ok_or_else(|| DecodeError::malformed("MESG", "missing \": \" separator"))?;
                Message::Mesg {
                    screen_name: decode_screen_name("MESG", screen_name)?,
                    text: text.to_string(),
                }
            }
            other => return Err(DecodeError::UnknownVerb(other.to_string())),
        };

        Ok(Some(message))
    }
}

fn encode_member(member: &Member) -> String {
    format!(
        "{} {} {}",
        member.screen_name(),
        member.address(),
        member.port()
    )
}

fn decode_member(verb: &'static str, record: &str) -> Result<Member, DecodeError> {
    let fields: Vec<&str> = record.split(' ').collect();
    let [screen_name, address, port] = fields.as_slice() else {
        return Err(DecodeError::malformed(
            verb,
            format!("expected 3 member fields, got {}", fields.len()),
        ));
    };

    if address.is_empty() {
        return Err(DecodeError::malformed(verb, "empty address"));
    }
    let port = validate_port(port).map_err(|e| DecodeError::malformed(verb, e.to_string()))?;

    Member::new(*screen_name, *address, port)
        .map_err(|e| DecodeError::malformed(verb, e.to_string()))
}

fn decode_screen_name(verb: &'static str, field: &str) -> Result<String, DecodeError> {
    validate_screen_name(field).map_err(|e| DecodeError::malformed(verb, e.to_string()))?;
    Ok(field.to_string())
}
