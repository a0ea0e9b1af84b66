//! Test harness for Veil core.
//!
//! In-memory stand-ins for the swarm, the anonymizing request path and the
//! message processor, plus helpers for building closed groups and sealed
//! group messages.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use parking_lot::Mutex;
use serde_json::{json, Value};
use tokio::time::sleep;

use crate::errors::NetworkError;
use crate::network::{MessageSink, OnionRequestSender, RelayRequest, SwarmApi};
use crate::store::InMemoryStore;
use crate::types::{ClosedGroupKeyRecord, DecryptedMessage, EncryptedEnvelope, Snode};
use veil_crypto::identity::{IdentityKeyMaterial, X25519KeyPair};
use veil_crypto::session_protocol;
use veil_crypto::utils::remove_prefix_if_needed;

// ============================================================================
// Swarm
// ============================================================================

/// Mock swarm API with per-group swarms and message queues.
///
/// Messages are drained on fetch, the way a snode only returns messages
/// newer than the last one seen.
pub struct MockSwarm {
    swarms: Mutex<HashMap<String, HashSet<Snode>>>,
    messages: Mutex<HashMap<String, Vec<Vec<u8>>>>,
    failing: Mutex<HashSet<String>>,
    swarm_delay: Duration,
    swarm_calls: AtomicUsize,
    message_calls: AtomicUsize,
}

impl MockSwarm {
    pub fn new() -> Self {
        Self {
            swarms: Mutex::new(HashMap::new()),
            messages: Mutex::new(HashMap::new()),
            failing: Mutex::new(HashSet::new()),
            swarm_delay: Duration::ZERO,
            swarm_calls: AtomicUsize::new(0),
            message_calls: AtomicUsize::new(0),
        }
    }

    /// Delay every swarm lookup
    pub fn with_swarm_delay(mut self, delay: Duration) -> Self {
        self.swarm_delay = delay;
        self
    }

    pub fn single_snode() -> Vec<Snode> {
        vec![Snode::new("127.0.0.1", 22021)]
    }

    pub fn set_swarm(&self, public_key: &str, snodes: Vec<Snode>) {
        self.swarms
            .lock()
            .insert(normalize(public_key), snodes.into_iter().collect());
    }

    /// Make swarm lookups for this key fail
    pub fn fail_swarm(&self, public_key: &str) {
        self.failing.lock().insert(normalize(public_key));
    }

    pub fn push_message(&self, public_key: &str, data: Vec<u8>) {
        self.messages
            .lock()
            .entry(normalize(public_key))
            .or_default()
            .push(data);
    }

    pub fn swarm_calls(&self) -> usize {
        self.swarm_calls.load(Ordering::SeqCst)
    }

    pub fn message_calls(&self) -> usize {
        self.message_calls.load(Ordering::SeqCst)
    }
}

impl Default for MockSwarm {
    fn default() -> Self {
        Self::new()
    }
}

fn normalize(public_key: &str) -> String {
    remove_prefix_if_needed(public_key).to_string()
}

#[async_trait]
impl SwarmApi for MockSwarm {
    async fn get_swarm(&self, public_key: &str) -> Result<HashSet<Snode>, NetworkError> {
        self.swarm_calls.fetch_add(1, Ordering::SeqCst);
        if !self.swarm_delay.is_zero() {
            sleep(self.swarm_delay).await;
        }

        let key = normalize(public_key);
        if self.failing.lock().contains(&key) {
            return Err(NetworkError::Transport("swarm lookup failed".into()));
        }
        Ok(self.swarms.lock().get(&key).cloned().unwrap_or_default())
    }

    async fn get_raw_messages(&self, _snode: &Snode, public_key: &str) -> Result<Value, NetworkError> {
        self.message_calls.fetch_add(1, Ordering::SeqCst);
        let pending = self
            .messages
            .lock()
            .remove(&normalize(public_key))
            .unwrap_or_default();

        let messages: Vec<Value> = pending
            .iter()
            .enumerate()
            .map(|(i, data)| json!({ "data": STANDARD.encode(data), "timestamp": i as u64 }))
            .collect();
        Ok(json!({ "messages": messages }))
    }
}

// ============================================================================
// Message Sink
// ============================================================================

/// Sink that records every message handed to it.
#[derive(Default)]
pub struct RecordingSink {
    received: Mutex<Vec<(EncryptedEnvelope, DecryptedMessage)>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn count(&self) -> usize {
        self.received.lock().len()
    }

    pub fn messages(&self) -> Vec<(EncryptedEnvelope, DecryptedMessage)> {
        self.received.lock().clone()
    }
}

impl MessageSink for RecordingSink {
    fn process(&self, envelope: &EncryptedEnvelope, message: DecryptedMessage) {
        self.received.lock().push((envelope.clone(), message));
    }
}

// ============================================================================
// Relay
// ============================================================================

/// Mock anonymizing sender with scripted responses.
///
/// Scripted responses are consumed in order; once exhausted the fallback is
/// used. The default fallback is `{"code": 0}`.
pub struct MockRelaySender {
    scripted: Mutex<VecDeque<Result<Value, NetworkError>>>,
    fallback: Result<Value, NetworkError>,
    requests: Mutex<Vec<(RelayRequest, String, String)>>,
}

impl MockRelaySender {
    pub fn new() -> Self {
        Self::responding(json!({ "code": 0 }))
    }

    /// Always answer with `response`
    pub fn responding(response: Value) -> Self {
        Self {
            scripted: Mutex::new(VecDeque::new()),
            fallback: Ok(response),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Fail every attempt at the transport level
    pub fn always_failing() -> Self {
        Self {
            scripted: Mutex::new(VecDeque::new()),
            fallback: Err(NetworkError::Transport("unreachable".into())),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Queue a one-off response ahead of the fallback
    pub fn script(&self, response: Result<Value, NetworkError>) {
        self.scripted.lock().push_back(response);
    }

    pub fn attempts(&self) -> usize {
        self.requests.lock().len()
    }

    /// Requests seen so far with their destination host and public key
    pub fn requests(&self) -> Vec<(RelayRequest, String, String)> {
        self.requests.lock().clone()
    }

    /// URL paths of the requests seen so far, in order
    pub fn paths(&self) -> Vec<String> {
        self.requests
            .lock()
            .iter()
            .map(|(request, _, _)| {
                request
                    .url
                    .rsplit('/')
                    .next()
                    .unwrap_or_default()
                    .to_string()
            })
            .collect()
    }
}

impl Default for MockRelaySender {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl OnionRequestSender for MockRelaySender {
    async fn send_onion_request(
        &self,
        request: RelayRequest,
        destination_host: &str,
        destination_public_key: &str,
    ) -> Result<Value, NetworkError> {
        self.requests.lock().push((
            request,
            destination_host.to_string(),
            destination_public_key.to_string(),
        ));
        let scripted = self.scripted.lock().pop_front();
        scripted.unwrap_or_else(|| self.fallback.clone())
    }
}

// ============================================================================
// Closed Groups
// ============================================================================

/// A closed group the local store is a member of.
pub struct TestGroup {
    /// Prefixed hex public key
    pub public_key: String,
    pub keypair: X25519KeyPair,
}

impl TestGroup {
    /// Create a group with a fresh keypair and register it in `store`.
    pub fn join(store: &InMemoryStore) -> Self {
        let keypair = X25519KeyPair::generate();
        let public_key = keypair.session_id();
        store.add_closed_group(ClosedGroupKeyRecord::new(
            public_key.clone(),
            Some(hex::encode(keypair.secret_key())),
        ));
        Self { public_key, keypair }
    }

    /// Sign and seal `plaintext` from `sender` to this group.
    pub fn seal(&self, sender: &IdentityKeyMaterial, plaintext: &[u8]) -> Vec<u8> {
        session_protocol::encrypt(plaintext, sender.signing_key(), self.keypair.public_key())
            .expect("seal group message")
    }
}
