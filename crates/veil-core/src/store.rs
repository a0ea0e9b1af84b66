//! Storage abstractions for identity keys, closed-group keys and push
//! registration state.
//!
//! The traits are synchronous: every implementation in use is a local
//! key-value store. `InMemoryStore` implements all three for tests and
//! the CLI.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::errors::StoreError;
use crate::types::ClosedGroupKeyRecord;
use veil_crypto::utils::remove_prefix_if_needed;

// ============================================================================
// Identity Slots
// ============================================================================

/// Named slots under which identity material is persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IdentitySlot {
    /// 16-byte seed, hex
    Seed,
    /// X25519 public key, base64
    IdentityPublicKey,
    /// X25519 secret key, base64
    IdentityPrivateKey,
    /// Ed25519 public key, base64
    Ed25519PublicKey,
    /// Ed25519 secret key (seed followed by public key), base64
    Ed25519SecretKey,
}

impl IdentitySlot {
    pub const ALL: [IdentitySlot; 5] = [
        Self::Seed,
        Self::IdentityPublicKey,
        Self::IdentityPrivateKey,
        Self::Ed25519PublicKey,
        Self::Ed25519SecretKey,
    ];

    /// Stable storage key for this slot.
    pub const fn key(self) -> &'static str {
        match self {
            Self::Seed => "loki_seed",
            Self::IdentityPublicKey => "pref_identity_public_v3",
            Self::IdentityPrivateKey => "pref_identity_private_v3",
            Self::Ed25519PublicKey => "pref_ed25519_public_key",
            Self::Ed25519SecretKey => "pref_ed25519_secret_key",
        }
    }
}

// ============================================================================
// Store Traits
// ============================================================================

/// Persistent storage for the local identity.
pub trait IdentityKeyStore: Send + Sync {
    fn save(&self, slot: IdentitySlot, value: &str) -> Result<(), StoreError>;

    fn retrieve(&self, slot: IdentitySlot) -> Option<String>;
}

/// Read access to the closed groups the local user belongs to.
pub trait ClosedGroupKeyStore: Send + Sync {
    /// Public keys (hex) of every closed group to poll.
    fn all_closed_group_public_keys(&self) -> Vec<String>;

    /// Hex secret key of a group, if it has been received.
    fn closed_group_private_key(&self, group_public_key: &str) -> Option<String>;

    fn is_closed_group(&self, group_public_key: &str) -> bool;
}

/// Locally cached push registration state.
pub trait PushPreferences: Send + Sync {
    fn push_token(&self) -> Option<String>;
    fn set_push_token(&self, token: &str);

    /// Milliseconds since the Unix epoch of the last successful register.
    fn last_push_upload_ms(&self) -> i64;
    fn set_last_push_upload_ms(&self, millis: i64);

    /// Whether push notifications are enabled for this device.
    fn is_using_push(&self) -> bool;
    fn set_is_using_push(&self, enabled: bool);

    /// Session id of the local user, once an identity exists.
    fn local_session_id(&self) -> Option<String>;
    fn set_local_session_id(&self, session_id: &str);
}

// ============================================================================
// In-Memory Implementation
// ============================================================================

#[derive(Debug, Default)]
struct PushState {
    token: Option<String>,
    last_upload_ms: i64,
    using_push: bool,
    local_session_id: Option<String>,
}

/// In-memory store implementing every storage trait.
///
/// Clones share the same underlying maps.
#[derive(Clone, Default)]
pub struct InMemoryStore {
    identity: Arc<RwLock<HashMap<IdentitySlot, String>>>,
    groups: Arc<RwLock<HashMap<String, ClosedGroupKeyRecord>>>,
    push: Arc<RwLock<PushState>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a closed group. Keys are normalized to their unprefixed form.
    pub fn add_closed_group(&self, record: ClosedGroupKeyRecord) {
        let key = remove_prefix_if_needed(&record.group_public_key).to_string();
        self.groups.write().insert(key, record);
    }

    pub fn remove_closed_group(&self, group_public_key: &str) -> Option<ClosedGroupKeyRecord> {
        self.groups.write().remove(remove_prefix_if_needed(group_public_key))
    }

    pub fn closed_group_count(&self) -> usize {
        self.groups.read().len()
    }
}

impl IdentityKeyStore for InMemoryStore {
    fn save(&self, slot: IdentitySlot, value: &str) -> Result<(), StoreError> {
        self.identity.write().insert(slot, value.to_string());
        Ok(())
    }

    fn retrieve(&self, slot: IdentitySlot) -> Option<String> {
        self.identity.read().get(&slot).cloned()
    }
}

impl ClosedGroupKeyStore for InMemoryStore {
    fn all_closed_group_public_keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self
            .groups
            .read()
            .values()
            .map(|record| record.group_public_key.clone())
            .collect();
        keys.sort();
        keys
    }

    fn closed_group_private_key(&self, group_public_key: &str) -> Option<String> {
        self.groups
            .read()
            .get(remove_prefix_if_needed(group_public_key))
            .and_then(|record| record.group_private_key.clone())
    }

    fn is_closed_group(&self, group_public_key: &str) -> bool {
        self.groups
            .read()
            .contains_key(remove_prefix_if_needed(group_public_key))
    }
}

impl PushPreferences for InMemoryStore {
    fn push_token(&self) -> Option<String> {
        self.push.read().token.clone()
    }

    fn set_push_token(&self, token: &str) {
        self.push.write().token = Some(token.to_string());
    }

    fn last_push_upload_ms(&self) -> i64 {
        self.push.read().last_upload_ms
    }

    fn set_last_push_upload_ms(&self, millis: i64) {
        self.push.write().last_upload_ms = millis;
    }

    fn is_using_push(&self) -> bool {
        self.push.read().using_push
    }

    fn set_is_using_push(&self, enabled: bool) {
        self.push.write().using_push = enabled;
    }

    fn local_session_id(&self) -> Option<String> {
        self.push.read().local_session_id.clone()
    }

    fn set_local_session_id(&self, session_id: &str) {
        self.push.write().local_session_id = Some(session_id.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_slots_have_distinct_keys() {
        let mut keys: Vec<&str> = IdentitySlot::ALL.iter().map(|slot| slot.key()).collect();
        keys.sort();
        keys.dedup();
        assert_eq!(keys.len(), IdentitySlot::ALL.len());
    }

    #[test]
    fn test_identity_save_and_retrieve() {
        let store = InMemoryStore::new();
        assert!(store.retrieve(IdentitySlot::Seed).is_none());
        store.save(IdentitySlot::Seed, "00ff").unwrap();
        assert_eq!(store.retrieve(IdentitySlot::Seed).as_deref(), Some("00ff"));
    }

    #[test]
    fn test_group_lookup_ignores_session_prefix() {
        let store = InMemoryStore::new();
        let bare = "ab".repeat(32);
        store.add_closed_group(ClosedGroupKeyRecord::new(
            format!("05{}", bare),
            Some("cd".repeat(32)),
        ));

        assert!(store.is_closed_group(&bare));
        assert!(store.is_closed_group(&format!("05{}", bare)));
        assert_eq!(store.closed_group_private_key(&bare), Some("cd".repeat(32)));
        assert_eq!(store.all_closed_group_public_keys().len(), 1);

        assert!(store.remove_closed_group(&bare).is_some());
        assert!(!store.is_closed_group(&bare));
    }

    #[test]
    fn test_clones_share_state() {
        let store = InMemoryStore::new();
        let other = store.clone();
        store.set_is_using_push(true);
        store.set_push_token("token");
        assert!(other.is_using_push());
        assert_eq!(other.push_token().as_deref(), Some("token"));
    }
}
