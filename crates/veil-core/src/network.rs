//! Network collaborator traits: swarm access, the anonymizing request path
//! and the downstream message processor.

use std::collections::HashSet;

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use crate::errors::NetworkError;
use crate::types::{DecryptedMessage, EncryptedEnvelope, Snode};

/// A JSON POST to be carried over an anonymizing path.
#[derive(Clone, Debug, PartialEq)]
pub struct RelayRequest {
    pub url: String,
    pub body: Value,
}

impl RelayRequest {
    pub fn post_json(url: impl Into<String>, body: Value) -> Self {
        Self {
            url: url.into(),
            body,
        }
    }
}

/// Access to the storage-node swarms that hold group messages.
#[async_trait]
pub trait SwarmApi: Send + Sync {
    /// Resolve the swarm responsible for a public key.
    async fn get_swarm(&self, public_key: &str) -> Result<HashSet<Snode>, NetworkError>;

    /// Fetch the raw retrieval response for a public key from one snode.
    async fn get_raw_messages(&self, snode: &Snode, public_key: &str) -> Result<Value, NetworkError>;

    /// Turn a raw retrieval response into envelopes.
    fn parse_raw_messages_response(
        &self,
        raw: Value,
        _snode: &Snode,
        public_key: &str,
    ) -> Vec<EncryptedEnvelope> {
        parse_retrieve_response(&raw, public_key)
    }
}

/// Sends a request to a destination through an anonymizing path.
#[async_trait]
pub trait OnionRequestSender: Send + Sync {
    async fn send_onion_request(
        &self,
        request: RelayRequest,
        destination_host: &str,
        destination_public_key: &str,
    ) -> Result<Value, NetworkError>;
}

/// Downstream consumer of decrypted messages.
pub trait MessageSink: Send + Sync {
    fn process(&self, envelope: &EncryptedEnvelope, message: DecryptedMessage);
}

#[derive(Deserialize)]
struct RetrieveResponse {
    #[serde(default)]
    messages: Vec<RetrievedMessage>,
}

#[derive(Deserialize)]
struct RetrievedMessage {
    data: String,
    #[serde(default)]
    timestamp: u64,
}

/// Parse a `{"messages": [{"data": <base64>, "timestamp": <ms>}]}` retrieval
/// response into closed-group envelopes addressed by `public_key`.
///
/// Entries that are not valid base64 are dropped.
pub fn parse_retrieve_response(raw: &Value, public_key: &str) -> Vec<EncryptedEnvelope> {
    let response = match RetrieveResponse::deserialize(raw) {
        Ok(response) => response,
        Err(e) => {
            debug!(error = %e, "Couldn't parse retrieve response");
            return Vec::new();
        }
    };

    response
        .messages
        .into_iter()
        .filter_map(|message| match STANDARD.decode(message.data.as_bytes()) {
            Ok(data) => Some(
                EncryptedEnvelope::closed_group(public_key, data).with_timestamp(message.timestamp),
            ),
            Err(e) => {
                debug!(error = %e, "Dropping message with invalid data");
                None
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::EnvelopeKind;
    use serde_json::json;

    #[test]
    fn test_parse_retrieve_response() {
        let raw = json!({
            "messages": [
                { "data": STANDARD.encode(b"first"), "timestamp": 10 },
                { "data": "%%%", "timestamp": 11 },
                { "data": STANDARD.encode(b"second") },
            ]
        });
        let envelopes = parse_retrieve_response(&raw, "group");

        assert_eq!(envelopes.len(), 2);
        assert_eq!(envelopes[0].kind, EnvelopeKind::ClosedGroup);
        assert_eq!(envelopes[0].source.as_deref(), Some("group"));
        assert_eq!(envelopes[0].content.as_deref(), Some(&b"first"[..]));
        assert_eq!(envelopes[0].timestamp, 10);
        assert_eq!(envelopes[1].timestamp, 0);
    }

    #[test]
    fn test_parse_malformed_response() {
        assert!(parse_retrieve_response(&json!({ "messages": 5 }), "group").is_empty());
        assert!(parse_retrieve_response(&json!({}), "group").is_empty());
    }
}
