//! Wire protocol. One JSON object per text frame.
//!
//! Inbound: `{"message-type": "options" | "terminal-input", "data": ..., "options": {"cols", "rows"}}`.
//! Outbound: `{"message-type": "data", "data": <batched output>}`.

use cmdrun_common::TerminalOptions;
use serde::{Deserialize, Serialize};

pub const OPTIONS: &str = "options";
pub const TERMINAL_INPUT: &str = "terminal-input";
pub const DATA: &str = "data";

/// A client message. Missing fields decode to their defaults.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct InboundMessage {
    #[serde(rename = "message-type")]
    pub message_type: String,
    pub data: String,
    pub options: TerminalOptions,
}

/// What an inbound message asks for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    Options(TerminalOptions),
    TerminalInput(String),
    /// Any other `message-type`; ignored after the handshake.
    Other(String),
}

impl InboundMessage {
    pub fn parse(text: &str) -> Result<Self, ProtocolError> {
        serde_json::from_str(text).map_err(|e| ProtocolError::Malformed(e.to_string()))
    }

    pub fn classify(self) -> Inbound {
        match self.message_type.as_str() {
            OPTIONS => Inbound::Options(self.options),
            TERMINAL_INPUT => Inbound::TerminalInput(self.data),
            _ => Inbound::Other(self.message_type),
        }
    }
}

/// A batch of output for the client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutboundMessage {
    #[serde(rename = "message-type")]
    pub message_type: String,
    pub data: String,
}

impl OutboundMessage {
    pub fn data(data: impl Into<String>) -> Self {
        Self {
            message_type: DATA.to_string(),
            data: data.into(),
        }
    }

    pub fn to_json(&self) -> Result<String, ProtocolError> {
        serde_json::to_string(self).map_err(|e| ProtocolError::Encode(e.to_string()))
    }
}

/// Application-level close codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseKind {
    /// 1000: the command finished and all output was delivered.
    Finished,
    /// 1002: the command has no text to run.
    EmptyCommand,
    /// 1003: bad id, bad first message, wrong frame kind, malformed payload.
    Violation,
    /// 1011: anything unexpected.
    Internal,
}

impl CloseKind {
    pub fn code(self) -> u16 {
        match self {
            CloseKind::Finished => 1000,
            CloseKind::EmptyCommand => 1002,
            CloseKind::Violation => 1003,
            CloseKind::Internal => 1011,
        }
    }
}

/// Ways a client can break the protocol, each with its close code.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("bad command id")]
    BadCommandId,

    #[error("first message must be options")]
    NotOptions,

    #[error("bad input json: {0}")]
    Malformed(String),

    #[error("expected text message")]
    WrongFrameKind,

    #[error("timed out waiting for options")]
    HandshakeTimeout,

    #[error("connection closed before options")]
    ClosedEarly,

    #[error("error reading message: {0}")]
    Transport(String),

    #[error("failed to encode message: {0}")]
    Encode(String),
}

impl ProtocolError {
    pub fn close_kind(&self) -> CloseKind {
        match self {
            ProtocolError::Transport(_) | ProtocolError::Encode(_) => CloseKind::Internal,
            _ => CloseKind::Violation,
        }
    }

    /// Short reason sent in the close frame.
    pub fn reason(&self) -> &'static str {
        match self {
            ProtocolError::BadCommandId => "bad command id",
            ProtocolError::NotOptions => "first message must be options",
            ProtocolError::Malformed(_) => "bad input json",
            ProtocolError::WrongFrameKind => "expected text message",
            ProtocolError::HandshakeTimeout => "options timeout",
            ProtocolError::ClosedEarly => "closed before options",
            ProtocolError::Transport(_) => "error reading message",
            ProtocolError::Encode(_) => "error encoding message",
        }
    }
}
