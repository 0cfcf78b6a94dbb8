/// Ledger message types shared by node implementations and the client
use crate::error::{DidError, DidResult};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

/// Content-addressed identifier the node assigns to a message
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MessageId([u8; 32]);

impl MessageId {
    pub fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MessageId({})", self.to_hex())
    }
}

impl FromStr for MessageId {
    type Err = DidError;

    fn from_str(s: &str) -> DidResult<Self> {
        let bytes = hex::decode(s)
            .map_err(|e| DidError::Validation(format!("Invalid message id {}: {}", s, e)))?;
        let bytes: [u8; 32] = bytes
            .try_into()
            .map_err(|_| DidError::Validation(format!("Message id {} must be 32 bytes", s)))?;
        Ok(Self(bytes))
    }
}

impl Serialize for MessageId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for MessageId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// Payload handed to the node for submission
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmitRequest {
    /// Ledger index the message is filed under (the DID tag)
    pub index: String,
    pub data: Vec<u8>,
    /// Locally computed proof-of-work nonce; `None` asks the node to do it
    pub nonce: Option<u64>,
}

/// Inclusion state of a submitted message
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct MessageStatus {
    /// Referenced by a milestone
    pub included: bool,
    pub milestone_index: Option<u32>,
    /// Set when the node has decided never to include the message
    pub conflict: Option<String>,
}

/// Node-reported parameters
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeInfo {
    pub network_id: String,
    /// Leading zero bits required by the node's proof-of-work
    pub min_pow_difficulty: u32,
}

/// Message as stored on the ledger
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerMessage {
    pub id: MessageId,
    pub index: String,
    pub data: Vec<u8>,
    /// Confirming milestone; `None` while unconfirmed
    pub milestone_index: Option<u32>,
    /// Node timestamp (unix seconds) of the confirming milestone
    pub timestamp: Option<i64>,
}

impl LedgerMessage {
    pub fn is_confirmed(&self) -> bool {
        self.milestone_index.is_some()
    }

    /// Ledger order: milestone index, then timestamp, then message id.
    /// Unconfirmed messages sort last.
    pub fn ledger_cmp(&self, other: &Self) -> Ordering {
        let key = |m: &Self| {
            (
                m.milestone_index.unwrap_or(u32::MAX),
                m.timestamp.unwrap_or(i64::MAX),
                m.id,
            )
        };
        key(self).cmp(&key(other))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message(id: u8, milestone: Option<u32>, timestamp: Option<i64>) -> LedgerMessage {
        LedgerMessage {
            id: MessageId::new([id; 32]),
            index: "tag".to_string(),
            data: vec![],
            milestone_index: milestone,
            timestamp,
        }
    }

    #[test]
    fn test_message_id_hex_round_trip() {
        let id = MessageId::new([0xab; 32]);
        let parsed: MessageId = id.to_hex().parse().unwrap();
        assert_eq!(parsed, id);
        assert!("abcd".parse::<MessageId>().is_err());
        assert!("zz".parse::<MessageId>().is_err());
    }

    #[test]
    fn test_ledger_order() {
        let early = message(9, Some(1), Some(100));
        let later = message(1, Some(2), Some(50));
        let unconfirmed = message(0, None, None);
        assert_eq!(early.ledger_cmp(&later), Ordering::Less);
        assert_eq!(later.ledger_cmp(&unconfirmed), Ordering::Less);

        let same_milestone_a = message(1, Some(3), Some(10));
        let same_milestone_b = message(2, Some(3), Some(10));
        assert_eq!(same_milestone_a.ledger_cmp(&same_milestone_b), Ordering::Less);
    }
}
