//! Protocol message types and the text wire codec
//!
//! Every frame is whitespace separated text, `KIND SENDER [PAYLOAD]`, where
//! the payload is present only for ADVISE and is a single ASCII digit.

use crate::error::{ProtocolError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use treelock_core::NodeId;

/// Answer to a RESTART, describing the shared edge as seen by the responder.
///
/// The responder evaluates its own state against the restarted neighbour n:
/// codes 1/2 say "my token direction points at you", codes 3/4 say "it
/// points away from you, the token is on my side". The even/odd split inside
/// each pair carries the pending-request bit the restarted node needs to
/// rebuild `asked` and its queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AdviseCode {
    /// `holder == n` and my own REQUEST to n is still open.
    TowardYouAsked = 1,
    /// `holder == n` and nothing outstanding from my side.
    TowardYouIdle = 2,
    /// `holder != n` and n is not in my request queue.
    AwayFromYou = 3,
    /// `holder != n` and n is waiting in my request queue.
    AwayFromYouQueued = 4,
}

impl AdviseCode {
    /// Wire digit for this code.
    pub fn as_digit(self) -> u8 {
        match self {
            AdviseCode::TowardYouAsked => 1,
            AdviseCode::TowardYouIdle => 2,
            AdviseCode::AwayFromYou => 3,
            AdviseCode::AwayFromYouQueued => 4,
        }
    }

    /// Parse the single-digit wire payload.
    pub fn from_wire(token: &str) -> Result<Self> {
        match token {
            "1" => Ok(AdviseCode::TowardYouAsked),
            "2" => Ok(AdviseCode::TowardYouIdle),
            "3" => Ok(AdviseCode::AwayFromYou),
            "4" => Ok(AdviseCode::AwayFromYouQueued),
            other => Err(ProtocolError::InvalidAdviseCode(other.to_string())),
        }
    }

    /// True when the responder's token direction points away from the
    /// restarted node, i.e. the token lies on the responder's side.
    pub fn points_away(self) -> bool {
        matches!(self, AdviseCode::AwayFromYou | AdviseCode::AwayFromYouQueued)
    }
}

impl fmt::Display for AdviseCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_digit())
    }
}

/// The five message kinds exchanged between tree neighbours.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Payload {
    /// Bootstrap orientation of the tree toward node 0.
    Initialize,
    /// "Please forward the token toward me."
    Request,
    /// "The token is now yours."
    Privilege,
    /// "I crashed; tell me what you know about our shared edge."
    Restart,
    /// Answer to RESTART.
    Advise(AdviseCode),
}

impl Payload {
    /// Wire keyword for this kind.
    pub fn kind(&self) -> &'static str {
        match self {
            Payload::Initialize => "INITIALIZE",
            Payload::Request => "REQUEST",
            Payload::Privilege => "PRIVILEGE",
            Payload::Restart => "RESTART",
            Payload::Advise(_) => "ADVISE",
        }
    }
}

/// One wire message: the kind plus the immediate neighbour that emitted it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub sender: NodeId,
    pub payload: Payload,
}

impl Message {
    pub fn new(sender: NodeId, payload: Payload) -> Self {
        Self { sender, payload }
    }

    /// Encode as a text frame, `KIND SENDER [PAYLOAD]`.
    pub fn encode(&self) -> String {
        match self.payload {
            Payload::Advise(code) => {
                format!("{} {} {}", self.payload.kind(), self.sender, code)
            }
            _ => format!("{} {}", self.payload.kind(), self.sender),
        }
    }

    /// Parse a text frame. Trailing whitespace is tolerated; anything else
    /// unexpected is a typed error for the caller to log and discard.
    pub fn parse(frame: &str) -> Result<Self> {
        let mut tokens = frame.split_whitespace();

        let kind = tokens.next().ok_or(ProtocolError::EmptyFrame)?;
        let sender_token = tokens.next().ok_or(ProtocolError::MissingSender)?;
        let sender: NodeId = sender_token
            .parse()
            .map_err(|_| ProtocolError::MalformedSender(sender_token.to_string()))?;

        let payload = match kind {
            "INITIALIZE" => Payload::Initialize,
            "REQUEST" => Payload::Request,
            "PRIVILEGE" => Payload::Privilege,
            "RESTART" => Payload::Restart,
            "ADVISE" => {
                let digit = tokens
                    .next()
                    .ok_or(ProtocolError::MissingPayload { kind: "ADVISE" })?;
                Payload::Advise(AdviseCode::from_wire(digit)?)
            }
            other => return Err(ProtocolError::UnknownKind(other.to_string())),
        };

        if tokens.next().is_some() {
            return Err(ProtocolError::UnexpectedPayload {
                kind: payload.kind(),
            });
        }

        Ok(Self { sender, payload })
    }
}

/// Outbound message routed to a specific neighbour.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Envelope {
    pub to: NodeId,
    pub message: Message,
}
