//! Wire frame codec
//!
//! Every datagram is UTF-8 text:
//!
//! ```text
//! <handshake>,<senderRole>,<recipientRole>,<source>;<instr1>;<instr2>;...;
//! ```
//!
//! The header ends at the first lone `;`. Its fields are comma-separated
//! and trimmed; anything past the fourth field is ignored. The body is the
//! rest of the datagram, trimmed.

use locorig_core::{find_separator, Role, WireRole};

/// Body of the "I am a player" heartbeat
pub const HEARTBEAT_BODY: &str = "monitor,1;";

/// Instruction broadcast by players so monitors can discover them
pub const HEARTBEAT_INSTRUCTION: &str = "monitor,1";

/// A decoded frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Shared secret presented by the sender
    pub handshake: String,
    /// Role the sender claims
    pub sender_role: String,
    /// Role the frame is meant for
    pub recipient_role: String,
    /// Peer id, `default`, or an application tag
    pub source: String,
    /// Instruction text
    pub body: String,
}

impl Frame {
    /// Decode a datagram; `None` when the header is incomplete
    pub fn parse(text: &str) -> Option<Self> {
        let p = find_separator(text)?;
        let (header, rest) = (&text[..p], &text[p + 1..]);

        let mut fields = header.split(',').map(str::trim);
        let handshake = fields.next().filter(|h| !h.is_empty())?;
        let sender_role = fields.next()?;
        let recipient_role = fields.next()?;
        let source = fields.next()?;

        Some(Self {
            handshake: handshake.to_string(),
            sender_role: sender_role.to_string(),
            recipient_role: recipient_role.to_string(),
            source: source.to_string(),
            body: rest.trim().to_string(),
        })
    }

    /// Parsed sender role, if it is one of the known names
    pub fn sender(&self) -> Option<WireRole> {
        WireRole::parse(&self.sender_role)
    }

    /// Parsed recipient role, if it is one of the known names
    pub fn recipient(&self) -> Option<WireRole> {
        WireRole::parse(&self.recipient_role)
    }

    /// Whether the body is the player heartbeat
    pub fn is_heartbeat(&self) -> bool {
        self.body == HEARTBEAT_BODY
    }
}

/// Build the text of an outgoing frame.
///
/// Trailing spaces and `;` are stripped from `message` before the single
/// closing `;` is appended.
pub fn encode_frame(
    handshake: &str,
    sender: Role,
    recipient: WireRole,
    source: &str,
    message: &str,
) -> String {
    let message = message.trim_end_matches([' ', ';']);
    format!(
        "{},{},{},{};{};",
        handshake,
        sender.as_str(),
        recipient.as_str(),
        source,
        message
    )
}
