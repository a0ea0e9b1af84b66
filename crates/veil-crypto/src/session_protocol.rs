//! Sender-anonymous session encryption.
//!
//! Wire format: `seal(recipient_x25519, plaintext ‖ sender_ed25519_pub ‖ signature)`
//! where `seal` is the libsodium anonymous sealed box (`crypto_box_seal`) and
//! `signature` is a detached Ed25519 signature over
//! `plaintext ‖ sender_ed25519_pub ‖ recipient_x25519_pub`. Binding the
//! recipient key into the signed data stops a signed payload from being
//! re-sealed to somebody else.

use ed25519_dalek::{Signature, Signer, SigningKey, VerifyingKey};
use rand_core::OsRng;
use zeroize::Zeroize;

use crate::identity::{ed25519_public_to_x25519, X25519KeyPair};
use crate::utils::encode_session_id;

/// Detached Ed25519 signature size.
pub const SIGNATURE_SIZE: usize = 64;
/// Ed25519 public key size.
pub const ED25519_PUBLIC_KEY_SIZE: usize = 32;
/// Sealed box overhead: ephemeral public key plus Poly1305 tag.
pub const SEAL_OVERHEAD: usize = 32 + 16;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionProtocolError {
    #[error("no local ed25519 key pair")]
    NoIdentity,
    #[error("couldn't sign message")]
    SigningFailed,
    #[error("couldn't encrypt message")]
    EncryptionFailed,
    #[error("envelope carries no data")]
    NoData,
    #[error("invalid group public key")]
    InvalidGroupPublicKey,
    #[error("no private key for group")]
    NoGroupPrivateKey,
    #[error("couldn't decrypt message")]
    DecryptionFailed,
    #[error("invalid message signature")]
    InvalidSignature,
    #[error("invalid public key encoding")]
    InvalidPublicKey,
}

/// A verified plaintext and the session id of whoever signed it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DecryptedMessage {
    pub plaintext: Vec<u8>,
    pub sender_session_id: String,
}

fn verification_data(plaintext: &[u8], sender_ed25519_public: &[u8], recipient_x25519_public: &[u8]) -> Vec<u8> {
    let mut data = Vec::with_capacity(plaintext.len() + sender_ed25519_public.len() + recipient_x25519_public.len());
    data.extend_from_slice(plaintext);
    data.extend_from_slice(sender_ed25519_public);
    data.extend_from_slice(recipient_x25519_public);
    data
}

/// Sign `plaintext` for `recipient_x25519_public` and seal it anonymously.
pub fn encrypt(
    plaintext: &[u8],
    sender: &SigningKey,
    recipient_x25519_public: &[u8; 32],
) -> Result<Vec<u8>, SessionProtocolError> {
    let sender_public = sender.verifying_key().to_bytes();

    let mut signed = verification_data(plaintext, &sender_public, recipient_x25519_public);
    let signature = sender
        .try_sign(&signed)
        .map_err(|_| SessionProtocolError::SigningFailed)?;
    signed.zeroize();

    let mut payload = Vec::with_capacity(plaintext.len() + ED25519_PUBLIC_KEY_SIZE + SIGNATURE_SIZE);
    payload.extend_from_slice(plaintext);
    payload.extend_from_slice(&sender_public);
    payload.extend_from_slice(&signature.to_bytes());

    let recipient = crypto_box::PublicKey::from(*recipient_x25519_public);
    let sealed = recipient.seal(&mut OsRng, &payload);
    payload.zeroize();

    sealed.map_err(|_| SessionProtocolError::EncryptionFailed)
}

/// Open a sealed box with `recipient`, returning the signed payload unverified.
pub fn open(ciphertext: &[u8], recipient: &X25519KeyPair) -> Result<Vec<u8>, SessionProtocolError> {
    if ciphertext.is_empty() {
        return Err(SessionProtocolError::NoData);
    }
    let secret = crypto_box::SecretKey::from(*recipient.secret_key());
    secret
        .unseal(ciphertext)
        .map_err(|_| SessionProtocolError::DecryptionFailed)
}

/// Split an opened payload and verify its signature against `opening_public`.
///
/// The payload is read from the tail: the last [`SIGNATURE_SIZE`] bytes are
/// the signature, the [`ED25519_PUBLIC_KEY_SIZE`] bytes before that are the
/// claimed sender key, the rest is plaintext. A payload with no plaintext
/// byte is rejected.
pub fn verify_payload(
    payload: &[u8],
    opening_public: &[u8; 32],
) -> Result<DecryptedMessage, SessionProtocolError> {
    if payload.len() <= SIGNATURE_SIZE + ED25519_PUBLIC_KEY_SIZE {
        return Err(SessionProtocolError::DecryptionFailed);
    }
    let (rest, signature) = payload.split_at(payload.len() - SIGNATURE_SIZE);
    let (plaintext, sender_public) = rest.split_at(rest.len() - ED25519_PUBLIC_KEY_SIZE);

    let signature: [u8; SIGNATURE_SIZE] = signature
        .try_into()
        .map_err(|_| SessionProtocolError::DecryptionFailed)?;
    let sender_public: [u8; ED25519_PUBLIC_KEY_SIZE] = sender_public
        .try_into()
        .map_err(|_| SessionProtocolError::DecryptionFailed)?;

    let signed = verification_data(plaintext, &sender_public, opening_public);
    let verifying_key =
        VerifyingKey::from_bytes(&sender_public).map_err(|_| SessionProtocolError::InvalidSignature)?;
    verifying_key
        .verify_strict(&signed, &Signature::from_bytes(&signature))
        .map_err(|_| SessionProtocolError::InvalidSignature)?;

    let sender_x25519 =
        ed25519_public_to_x25519(&sender_public).map_err(|_| SessionProtocolError::InvalidSignature)?;

    Ok(DecryptedMessage {
        plaintext: plaintext.to_vec(),
        sender_session_id: encode_session_id(&sender_x25519),
    })
}

/// Open and verify a ciphertext addressed to `recipient`.
pub fn decrypt(ciphertext: &[u8], recipient: &X25519KeyPair) -> Result<DecryptedMessage, SessionProtocolError> {
    let mut payload = open(ciphertext, recipient)?;
    let result = verify_payload(&payload, recipient.public_key());
    payload.zeroize();
    result
}
