//! Persistence of the local identity.
//!
//! Keys are written as base64 under [`IdentitySlot`] names and the seed as hex
//! in its own slot, so an identity can be shown to the user as a recovery
//! phrase and restored later.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use ed25519_dalek::SigningKey;
use thiserror::Error;
use tracing::{info, warn};

use crate::errors::StoreError;
use crate::store::{IdentityKeyStore, IdentitySlot, PushPreferences};
use veil_crypto::identity::{IdentityError, IdentityKeyMaterial, Seed, X25519KeyPair};

#[derive(Debug, Error)]
pub enum KeysError {
    #[error("identity error: {0}")]
    Identity(#[from] IdentityError),

    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

/// Persist the four key fields of an identity.
pub fn store_identity(
    store: &dyn IdentityKeyStore,
    identity: &IdentityKeyMaterial,
) -> Result<(), StoreError> {
    store.save(
        IdentitySlot::IdentityPublicKey,
        &STANDARD.encode(identity.x25519_public_key()),
    )?;
    store.save(
        IdentitySlot::IdentityPrivateKey,
        &STANDARD.encode(identity.x25519_secret_key()),
    )?;
    store.save(
        IdentitySlot::Ed25519PublicKey,
        &STANDARD.encode(identity.ed25519_public_key()),
    )?;
    store.save(
        IdentitySlot::Ed25519SecretKey,
        &STANDARD.encode(identity.ed25519_secret_key()),
    )?;
    Ok(())
}

/// Persist the seed as hex.
pub fn store_seed(store: &dyn IdentityKeyStore, seed: &Seed) -> Result<(), StoreError> {
    store.save(IdentitySlot::Seed, &seed.to_hex())
}

/// Whether an Ed25519 identity has been stored.
pub fn has_modern_identity(store: &dyn IdentityKeyStore) -> bool {
    store.retrieve(IdentitySlot::Ed25519SecretKey).is_some()
}

fn decode_slot<const N: usize>(store: &dyn IdentityKeyStore, slot: IdentitySlot) -> Option<[u8; N]> {
    let encoded = store.retrieve(slot)?;
    match STANDARD.decode(encoded.trim()) {
        Ok(bytes) => match <[u8; N]>::try_from(bytes.as_slice()) {
            Ok(array) => Some(array),
            Err(_) => {
                warn!(slot = slot.key(), len = bytes.len(), "Stored key has unexpected length");
                None
            }
        },
        Err(e) => {
            warn!(slot = slot.key(), error = %e, "Stored key is not valid base64");
            None
        }
    }
}

/// Load the Ed25519 signing key, or `None` if absent or unreadable.
pub fn load_ed25519_keypair(store: &dyn IdentityKeyStore) -> Option<SigningKey> {
    let keypair_bytes: [u8; 64] = decode_slot(store, IdentitySlot::Ed25519SecretKey)?;
    match SigningKey::from_keypair_bytes(&keypair_bytes) {
        Ok(signing_key) => Some(signing_key),
        Err(e) => {
            warn!(error = %e, "Stored ed25519 key pair is inconsistent");
            None
        }
    }
}

/// Load the X25519 identity keypair, or `None` if absent or unreadable.
pub fn load_x25519_keypair(store: &dyn IdentityKeyStore) -> Option<X25519KeyPair> {
    let public: [u8; 32] = decode_slot(store, IdentitySlot::IdentityPublicKey)?;
    let secret: [u8; 32] = decode_slot(store, IdentitySlot::IdentityPrivateKey)?;
    match X25519KeyPair::from_parts(secret, public) {
        Ok(pair) => Some(pair),
        Err(e) => {
            warn!(error = %e, "Stored x25519 key pair is inconsistent");
            None
        }
    }
}

/// Load the stored seed.
pub fn load_seed(store: &dyn IdentityKeyStore) -> Result<Option<Seed>, KeysError> {
    match store.retrieve(IdentitySlot::Seed) {
        Some(hex_seed) => Ok(Some(Seed::from_hex(hex_seed.trim())?)),
        None => Ok(None),
    }
}

/// Derive an identity from a known seed and persist it.
pub fn restore_identity(
    store: &dyn IdentityKeyStore,
    seed: &Seed,
) -> Result<IdentityKeyMaterial, KeysError> {
    let identity = IdentityKeyMaterial::from_seed(seed)?;
    store_seed(store, seed)?;
    store_identity(store, &identity)?;
    Ok(identity)
}

/// Replace a legacy identity with a freshly generated Ed25519-based one.
///
/// Returns the new session id, which is also recorded as the local number.
pub fn migrate_to_modern_identity(
    store: &dyn IdentityKeyStore,
    preferences: &dyn PushPreferences,
) -> Result<String, KeysError> {
    let identity = IdentityKeyMaterial::generate()?;
    store_seed(store, identity.seed())?;
    store_identity(store, &identity)?;

    let session_id = identity.session_id();
    preferences.set_local_session_id(&session_id);
    info!(session_id = %session_id, "Migrated to ed25519 identity");
    Ok(session_id)
}
