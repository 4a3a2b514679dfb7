//! Relay messages and the instruction text they carry
//!
//! A relay body is a sequence of `key,value1,value2,...;` instructions.
//! A single `;` terminates an instruction; a doubled `;;` is literal text
//! and never splits. Text after the last terminator is incomplete and is
//! ignored.

use std::str::FromStr;

use crate::error::{CoreError, Result};

/// Source tag of an unaddressed broadcast
pub const DEFAULT_SOURCE: &str = "default";

/// One message received from a peer, as queued by the network hub
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayMessage {
    /// Resolved source: a peer id, `default`, or an application tag
    pub source: String,
    /// Instruction text, each instruction terminated by `;`
    pub body: String,
}

impl RelayMessage {
    /// Create a message
    pub fn new(source: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            body: body.into(),
        }
    }

    /// Whether the message is an unaddressed broadcast
    pub fn is_default_source(&self) -> bool {
        self.source == DEFAULT_SOURCE
    }

    /// Parse the flat `source,body` form returned by polling
    pub fn parse(polled: &str) -> Option<Self> {
        let (source, body) = polled.split_once(',')?;
        Some(Self::new(source.trim(), body))
    }

    /// Flat `source,body` form
    pub fn to_polled(&self) -> String {
        format!("{},{}", self.source, self.body)
    }

    /// Parsed instructions of the body
    pub fn instructions(&self) -> Vec<Instruction> {
        split_instructions(&self.body)
            .into_iter()
            .map(Instruction::parse)
            .collect()
    }
}

/// A single `key,values...` instruction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Instruction {
    /// Instruction name
    pub key: String,
    /// Comma-separated values, trimmed
    pub values: Vec<String>,
}

impl Instruction {
    /// Parse `key,v1,v2`; a bare `key` has no values
    pub fn parse(text: &str) -> Self {
        let mut parts = text.split(',');
        let key = parts.next().unwrap_or_default().trim().to_string();
        let values = parts.map(|v| v.trim().to_string()).collect();
        Self { key, values }
    }

    /// Values, failing unless there are exactly `expected` of them
    pub fn expect_arity(&self, expected: usize) -> Result<&[String]> {
        if self.values.len() == expected {
            Ok(&self.values)
        } else {
            Err(CoreError::InstructionArity {
                key: self.key.clone(),
                expected,
                got: self.values.len(),
            })
        }
    }

    /// Parse every value as `T`
    pub fn parse_values<T: FromStr>(&self) -> Result<Vec<T>> {
        self.values
            .iter()
            .map(|v| {
                v.parse::<T>()
                    .map_err(|_| CoreError::MalformedInstruction(self.to_string()))
            })
            .collect()
    }
}

impl std::fmt::Display for Instruction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.key)?;
        for value in &self.values {
            write!(f, ",{}", value)?;
        }
        Ok(())
    }
}

/// Byte offset of the first lone `;` in `text`
pub fn find_separator(text: &str) -> Option<usize> {
    let bytes = text.as_bytes();
    (0..bytes.len()).find(|&i| {
        bytes[i] == b';'
            && !(i > 0 && bytes[i - 1] == b';')
            && !(i + 1 < bytes.len() && bytes[i + 1] == b';')
    })
}

/// Split a body into its terminated, non-empty instructions
pub fn split_instructions(body: &str) -> Vec<&str> {
    let mut out = Vec::new();
    let mut rest = body;
    while let Some(p) = find_separator(rest) {
        let instruction = &rest[..p];
        if !instruction.trim().is_empty() {
            out.push(instruction);
        }
        rest = &rest[p + 1..];
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_basic() {
        assert_eq!(
            split_instructions("position,1.0,2.0,3.0;rotation,90;"),
            vec!["position,1.0,2.0,3.0", "rotation,90"]
        );
    }

    #[test]
    fn test_split_ignores_unterminated_tail() {
        assert_eq!(split_instructions("a,1;b,2"), vec!["a,1"]);
        assert!(split_instructions("no terminator").is_empty());
    }

    #[test]
    fn test_split_keeps_doubled_separator() {
        assert_eq!(split_instructions("text,a;;b;next,1;"), vec!["text,a;;b", "next,1"]);
    }

    #[test]
    fn test_find_separator() {
        assert_eq!(find_separator("a,b;c"), Some(3));
        assert_eq!(find_separator("a;;b;c"), Some(4));
        assert_eq!(find_separator("a;;b"), None);
    }

    #[test]
    fn test_instruction_parse() {
        let ins = Instruction::parse(" position , 1.0,2.5 ,3");
        assert_eq!(ins.key, "position");
        assert_eq!(ins.values, vec!["1.0", "2.5", "3"]);
        assert_eq!(ins.parse_values::<f32>().unwrap(), vec![1.0, 2.5, 3.0]);
        assert_eq!(ins.to_string(), "position,1.0,2.5,3");
    }

    #[test]
    fn test_instruction_arity() {
        let ins = Instruction::parse("position,1,2");
        assert!(ins.expect_arity(2).is_ok());
        let err = ins.expect_arity(3).unwrap_err();
        assert_eq!(err.error_code(), "INSTRUCTION_ARITY");
    }

    #[test]
    fn test_instruction_bad_value() {
        let ins = Instruction::parse("speed,fast");
        assert!(ins.parse_values::<f32>().is_err());
    }

    #[test]
    fn test_relay_message_polled_form() {
        let msg = RelayMessage::parse("3232235786,position,1,2,3;").unwrap();
        assert_eq!(msg.source, "3232235786");
        assert_eq!(msg.body, "position,1,2,3;");
        assert_eq!(msg.to_polled(), "3232235786,position,1,2,3;");
        assert!(!msg.is_default_source());

        let ins = msg.instructions();
        assert_eq!(ins.len(), 1);
        assert_eq!(ins[0].key, "position");
        assert!(RelayMessage::parse("nocomma").is_none());
    }
}
