//! Session protocol engine bound to the local key stores.

use std::sync::Arc;

use tracing::debug;

use crate::keys;
use crate::store::{ClosedGroupKeyStore, IdentityKeyStore};
use crate::types::{DecryptedMessage, EncryptedEnvelope, EnvelopeKind};
use veil_crypto::identity::X25519KeyPair;
use veil_crypto::session_protocol::{self, SessionProtocolError};
use veil_crypto::utils::decode_x25519_public_hex;

/// Encrypts outbound messages with the local identity and decrypts inbound
/// envelopes with the identity or closed-group keypair they were sealed to.
pub struct SessionProtocol {
    identity: Arc<dyn IdentityKeyStore>,
    groups: Arc<dyn ClosedGroupKeyStore>,
}

impl SessionProtocol {
    pub fn new(identity: Arc<dyn IdentityKeyStore>, groups: Arc<dyn ClosedGroupKeyStore>) -> Self {
        Self { identity, groups }
    }

    /// Sign `plaintext` with the local Ed25519 key and seal it to the
    /// recipient's session id (or bare X25519 public key hex).
    pub fn encrypt(
        &self,
        plaintext: &[u8],
        recipient_session_id: &str,
    ) -> Result<Vec<u8>, SessionProtocolError> {
        let signing_key =
            keys::load_ed25519_keypair(self.identity.as_ref()).ok_or(SessionProtocolError::NoIdentity)?;
        let recipient = decode_x25519_public_hex(recipient_session_id)
            .map_err(|_| SessionProtocolError::InvalidPublicKey)?;

        session_protocol::encrypt(plaintext, &signing_key, &recipient).map_err(|e| {
            debug!(error = %e, "Couldn't encrypt message");
            e
        })
    }

    /// Open an inbound envelope and verify its signature.
    pub fn decrypt(&self, envelope: &EncryptedEnvelope) -> Result<DecryptedMessage, SessionProtocolError> {
        let ciphertext = envelope
            .content
            .as_deref()
            .filter(|content| !content.is_empty())
            .ok_or(SessionProtocolError::NoData)?;

        let recipient = match envelope.kind {
            EnvelopeKind::Direct => keys::load_x25519_keypair(self.identity.as_ref())
                .ok_or(SessionProtocolError::NoIdentity)?,
            EnvelopeKind::ClosedGroup => self.closed_group_keypair(envelope.source.as_deref())?,
        };

        session_protocol::decrypt(ciphertext, &recipient).map_err(|e| {
            debug!(error = %e, kind = ?envelope.kind, "Couldn't decrypt message");
            e
        })
    }

    fn closed_group_keypair(&self, source: Option<&str>) -> Result<X25519KeyPair, SessionProtocolError> {
        let group_public_key = source
            .filter(|key| self.groups.is_closed_group(key))
            .ok_or(SessionProtocolError::InvalidGroupPublicKey)?;
        let private_hex = self
            .groups
            .closed_group_private_key(group_public_key)
            .ok_or(SessionProtocolError::NoGroupPrivateKey)?;

        let public = decode_x25519_public_hex(group_public_key)
            .map_err(|_| SessionProtocolError::InvalidGroupPublicKey)?;
        let secret: [u8; 32] = hex::decode(private_hex.trim())
            .ok()
            .and_then(|bytes| bytes.try_into().ok())
            .ok_or(SessionProtocolError::NoGroupPrivateKey)?;

        X25519KeyPair::from_parts(secret, public).map_err(|_| SessionProtocolError::NoGroupPrivateKey)
    }
}
