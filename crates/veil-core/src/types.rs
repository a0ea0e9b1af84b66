//! Core types for Veil.
//!
//! These mirror what flows between the swarm, the session protocol engine
//! and the message processor.

use std::fmt;

use bytes::Bytes;
use serde::{Deserialize, Serialize};

pub use veil_crypto::session_protocol::DecryptedMessage;

/// Wire kind of an encrypted envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EnvelopeKind {
    /// One-to-one message sealed to the local identity
    Direct,
    /// Message sealed to a closed group's shared keypair
    ClosedGroup,
}

impl EnvelopeKind {
    pub const fn wire_value(self) -> i32 {
        match self {
            Self::Direct => 6,
            Self::ClosedGroup => 7,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("unknown envelope type: {0}")]
pub struct UnknownEnvelopeKind(pub i32);

impl TryFrom<i32> for EnvelopeKind {
    type Error = UnknownEnvelopeKind;

    fn try_from(value: i32) -> Result<Self, Self::Error> {
        match value {
            6 => Ok(Self::Direct),
            7 => Ok(Self::ClosedGroup),
            other => Err(UnknownEnvelopeKind(other)),
        }
    }
}

/// An inbound envelope as parsed from a snode response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncryptedEnvelope {
    pub kind: EnvelopeKind,
    /// Group public key (hex) for closed-group envelopes
    pub source: Option<String>,
    pub content: Option<Bytes>,
    /// Storage timestamp in milliseconds
    pub timestamp: u64,
}

impl EncryptedEnvelope {
    pub fn direct(content: impl Into<Bytes>) -> Self {
        Self {
            kind: EnvelopeKind::Direct,
            source: None,
            content: Some(content.into()),
            timestamp: 0,
        }
    }

    pub fn closed_group(group_public_key: impl Into<String>, content: impl Into<Bytes>) -> Self {
        Self {
            kind: EnvelopeKind::ClosedGroup,
            source: Some(group_public_key.into()),
            content: Some(content.into()),
            timestamp: 0,
        }
    }

    pub fn with_timestamp(mut self, timestamp: u64) -> Self {
        self.timestamp = timestamp;
        self
    }
}

/// A storage node in a swarm.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Snode {
    pub address: String,
    pub port: u16,
}

impl Snode {
    pub fn new(address: impl Into<String>, port: u16) -> Self {
        Self {
            address: address.into(),
            port,
        }
    }
}

impl fmt::Display for Snode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.address, self.port)
    }
}

/// Key material kept for a closed group the local user belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClosedGroupKeyRecord {
    /// Hex X25519 public key, with or without the `05` prefix
    pub group_public_key: String,
    /// Hex X25519 secret key, absent until the key arrives
    pub group_private_key: Option<String>,
    pub members: Vec<String>,
    pub admins: Vec<String>,
}

impl ClosedGroupKeyRecord {
    pub fn new(group_public_key: impl Into<String>, group_private_key: Option<String>) -> Self {
        Self {
            group_public_key: group_public_key.into(),
            group_private_key,
            members: Vec::new(),
            admins: Vec::new(),
        }
    }
}
