//! Identity key derivation.
//!
//! A 16-byte seed is the only recoverable secret. It is zero-padded to a
//! 32-byte Ed25519 seed; the X25519 encryption keypair is obtained from the
//! Ed25519 keypair with the same birational map libsodium uses
//! (`crypto_sign_ed25519_{pk,sk}_to_curve25519`), so the Ed25519 keypair is
//! the single source of truth.

use std::fmt;

use ed25519_dalek::{SigningKey, VerifyingKey};
use rand_core::OsRng;
use sha2::{Digest, Sha512};
use x25519_dalek::{PublicKey as X25519PublicKey, StaticSecret};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::utils::{constant_time_compare_array, encode_session_id};

/// Length of the raw identity seed.
pub const SEED_LEN: usize = 16;

/// Upper bound on fresh-seed retries in [`IdentityKeyMaterial::generate`].
pub const MAX_GENERATION_ATTEMPTS: u32 = 8;

/// Error type for identity operations.
#[derive(Debug, thiserror::Error)]
pub enum IdentityError {
    #[error("invalid seed length: expected {expected}, got {got}")]
    InvalidSeedLength { expected: usize, got: usize },
    #[error("invalid seed encoding")]
    InvalidSeedEncoding,
    #[error("invalid key length: expected {expected}, got {got}")]
    InvalidKeyLength { expected: usize, got: usize },
    #[error("invalid public key")]
    InvalidPublicKey,
    #[error("public key does not match secret key")]
    KeyPairMismatch,
    #[error("key derivation failed after {attempts} attempts")]
    DerivationFailed { attempts: u32 },
}

/// The raw 16-byte identity seed.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct Seed([u8; SEED_LEN]);

impl Seed {
    /// Draw a fresh seed from the OS random source.
    pub fn random() -> Result<Self, getrandom::Error> {
        let mut bytes = [0u8; SEED_LEN];
        getrandom::getrandom(&mut bytes)?;
        Ok(Self(bytes))
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, IdentityError> {
        let arr: [u8; SEED_LEN] = bytes
            .try_into()
            .map_err(|_| IdentityError::InvalidSeedLength {
                expected: SEED_LEN,
                got: bytes.len(),
            })?;
        Ok(Self(arr))
    }

    pub fn from_hex(hex_seed: &str) -> Result<Self, IdentityError> {
        let mut bytes = hex::decode(hex_seed.trim()).map_err(|_| IdentityError::InvalidSeedEncoding)?;
        let seed = Self::from_bytes(&bytes);
        bytes.zeroize();
        seed
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    pub fn as_bytes(&self) -> &[u8; SEED_LEN] {
        &self.0
    }

    /// `seed ‖ 0x00 * 16`
    fn ed25519_seed(&self) -> [u8; 32] {
        let mut padded = [0u8; 32];
        padded[..SEED_LEN].copy_from_slice(&self.0);
        padded
    }
}

impl fmt::Debug for Seed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Seed(..)")
    }
}

/// An X25519 keypair used to open sealed boxes.
///
/// The public half is always consistent with the secret half.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct X25519KeyPair {
    secret: [u8; 32],
    public: [u8; 32],
}

impl X25519KeyPair {
    /// Generate a random keypair (closed groups use one per group).
    pub fn generate() -> Self {
        let secret = StaticSecret::random_from_rng(OsRng);
        Self::from_secret(secret.to_bytes())
    }

    pub fn from_secret(secret: [u8; 32]) -> Self {
        let public = X25519PublicKey::from(&StaticSecret::from(secret)).to_bytes();
        Self { secret, public }
    }

    /// Rebuild a stored keypair, checking that the halves belong together.
    pub fn from_parts(secret: [u8; 32], public: [u8; 32]) -> Result<Self, IdentityError> {
        let pair = Self::from_secret(secret);
        if !constant_time_compare_array(&pair.public, &public) {
            return Err(IdentityError::KeyPairMismatch);
        }
        Ok(pair)
    }

    pub fn secret_key(&self) -> &[u8; 32] {
        &self.secret
    }

    pub fn public_key(&self) -> &[u8; 32] {
        &self.public
    }

    /// Prefixed hex rendering of the public key.
    pub fn session_id(&self) -> String {
        encode_session_id(&self.public)
    }
}

impl fmt::Debug for X25519KeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("X25519KeyPair")
            .field("public", &hex::encode(self.public))
            .finish_non_exhaustive()
    }
}

/// Every key derived from one seed.
pub struct IdentityKeyMaterial {
    seed: Seed,
    ed25519: SigningKey,
    x25519: X25519KeyPair,
}

impl IdentityKeyMaterial {
    /// Derive an identity from a fresh random seed.
    ///
    /// A failed draw or derivation is retried with a new seed, at most
    /// [`MAX_GENERATION_ATTEMPTS`] times.
    pub fn generate() -> Result<Self, IdentityError> {
        let mut attempts = 0;
        while attempts < MAX_GENERATION_ATTEMPTS {
            attempts += 1;
            let Ok(seed) = Seed::random() else {
                continue;
            };
            if let Ok(material) = Self::from_seed(&seed) {
                return Ok(material);
            }
        }
        Err(IdentityError::DerivationFailed { attempts })
    }

    /// Deterministically derive the identity for `seed`.
    pub fn from_seed(seed: &Seed) -> Result<Self, IdentityError> {
        let mut ed25519_seed = seed.ed25519_seed();
        let ed25519 = SigningKey::from_bytes(&ed25519_seed);
        ed25519_seed.zeroize();

        let x25519_public = ed25519_public_to_x25519(&ed25519.verifying_key().to_bytes())?;
        let x25519 = X25519KeyPair::from_parts(ed25519_secret_to_x25519(&ed25519), x25519_public)?;

        Ok(Self {
            seed: seed.clone(),
            ed25519,
            x25519,
        })
    }

    pub fn seed(&self) -> &Seed {
        &self.seed
    }

    pub fn signing_key(&self) -> &SigningKey {
        &self.ed25519
    }

    pub fn ed25519_public_key(&self) -> [u8; 32] {
        self.ed25519.verifying_key().to_bytes()
    }

    /// Secret key in libsodium layout: `seed32 ‖ public32`.
    pub fn ed25519_secret_key(&self) -> [u8; 64] {
        self.ed25519.to_keypair_bytes()
    }

    pub fn x25519(&self) -> &X25519KeyPair {
        &self.x25519
    }

    pub fn x25519_public_key(&self) -> [u8; 32] {
        *self.x25519.public_key()
    }

    pub fn x25519_secret_key(&self) -> [u8; 32] {
        *self.x25519.secret_key()
    }

    /// The user-facing identity: `05 ‖ hex(x25519 public)`.
    pub fn session_id(&self) -> String {
        self.x25519.session_id()
    }
}

impl fmt::Debug for IdentityKeyMaterial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IdentityKeyMaterial")
            .field("session_id", &self.session_id())
            .finish_non_exhaustive()
    }
}

/// Map an Ed25519 public key to its X25519 (Montgomery) counterpart.
///
/// Keys that do not decompress or that have small order are rejected.
pub fn ed25519_public_to_x25519(ed25519_public: &[u8; 32]) -> Result<[u8; 32], IdentityError> {
    let key = VerifyingKey::from_bytes(ed25519_public).map_err(|_| IdentityError::InvalidPublicKey)?;
    if key.is_weak() {
        return Err(IdentityError::InvalidPublicKey);
    }
    Ok(key.to_montgomery().to_bytes())
}

/// Map an Ed25519 signing key to its X25519 secret: clamp(SHA-512(seed)[..32]).
pub fn ed25519_secret_to_x25519(signing_key: &SigningKey) -> [u8; 32] {
    let mut hasher = Sha512::new();
    hasher.update(signing_key.as_bytes());
    let mut digest = hasher.finalize();

    let mut secret = [0u8; 32];
    secret.copy_from_slice(&digest[..32]);
    digest.as_mut_slice().zeroize();

    secret[0] &= 248;
    secret[31] &= 127;
    secret[31] |= 64;
    secret
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_seed_is_deterministic() {
        let seed = Seed::from_bytes(&[42u8; SEED_LEN]).unwrap();
        let a = IdentityKeyMaterial::from_seed(&seed).unwrap();
        let b = IdentityKeyMaterial::from_seed(&seed).unwrap();

        assert_eq!(a.ed25519_public_key(), b.ed25519_public_key());
        assert_eq!(a.ed25519_secret_key(), b.ed25519_secret_key());
        assert_eq!(a.x25519_public_key(), b.x25519_public_key());
        assert_eq!(a.x25519_secret_key(), b.x25519_secret_key());
    }

    #[test]
    fn test_zero_seed_matches_known_ed25519_key() {
        // 16 zero bytes pad to the all-zero Ed25519 seed
        let seed = Seed::from_bytes(&[0u8; SEED_LEN]).unwrap();
        let material = IdentityKeyMaterial::from_seed(&seed).unwrap();
        assert_eq!(
            hex::encode(material.ed25519_public_key()),
            "3b6a27bcceb6a42d62a3a8d02a6f0d73653215771de243a63ac048a18b59da29"
        );
    }

    #[test]
    fn test_secret_key_layout() {
        let material = IdentityKeyMaterial::generate().unwrap();
        let secret = material.ed25519_secret_key();

        let mut padded = [0u8; 32];
        padded[..SEED_LEN].copy_from_slice(material.seed().as_bytes());
        assert_eq!(&secret[..32], &padded);
        assert_eq!(&secret[32..], &material.ed25519_public_key());
    }

    #[test]
    fn test_x25519_pair_is_consistent_with_ed25519_pair() {
        let material = IdentityKeyMaterial::generate().unwrap();

        let from_public = ed25519_public_to_x25519(&material.ed25519_public_key()).unwrap();
        let from_secret = X25519KeyPair::from_secret(ed25519_secret_to_x25519(material.signing_key()));

        assert_eq!(from_public, material.x25519_public_key());
        assert_eq!(from_secret.public_key(), &from_public);
    }

    #[test]
    fn test_secret_is_clamped() {
        let material = IdentityKeyMaterial::generate().unwrap();
        let secret = material.x25519_secret_key();
        assert_eq!(secret[0] & 7, 0);
        assert_eq!(secret[31] & 128, 0);
        assert_eq!(secret[31] & 64, 64);
    }

    #[test]
    fn test_different_seeds_give_different_identities() {
        let a = IdentityKeyMaterial::generate().unwrap();
        let b = IdentityKeyMaterial::generate().unwrap();
        assert_ne!(a.seed(), b.seed());
        assert_ne!(a.session_id(), b.session_id());
    }

    #[test]
    fn test_session_id_format() {
        let material = IdentityKeyMaterial::generate().unwrap();
        let session_id = material.session_id();
        assert_eq!(session_id.len(), 66);
        assert!(session_id.starts_with("05"));
        assert_eq!(&session_id[2..], hex::encode(material.x25519_public_key()));
    }

    #[test]
    fn test_seed_hex_round_trip() {
        let seed = Seed::random().unwrap();
        let restored = Seed::from_hex(&seed.to_hex()).unwrap();
        assert_eq!(seed, restored);
    }

    #[test]
    fn test_seed_rejects_bad_input() {
        assert!(matches!(
            Seed::from_bytes(&[1u8; 32]),
            Err(IdentityError::InvalidSeedLength { expected: 16, got: 32 })
        ));
        assert!(matches!(
            Seed::from_hex("not hex"),
            Err(IdentityError::InvalidSeedEncoding)
        ));
    }

    #[test]
    fn test_seed_debug_is_redacted() {
        let seed = Seed::from_bytes(&[0xabu8; SEED_LEN]).unwrap();
        assert!(!format!("{:?}", seed).contains("ab"));
    }

    #[test]
    fn test_from_parts_rejects_mismatched_halves() {
        let a = X25519KeyPair::generate();
        let b = X25519KeyPair::generate();
        assert!(X25519KeyPair::from_parts(*a.secret_key(), *a.public_key()).is_ok());
        assert!(matches!(
            X25519KeyPair::from_parts(*a.secret_key(), *b.public_key()),
            Err(IdentityError::KeyPairMismatch)
        ));
    }

    #[test]
    fn test_weak_public_key_rejected() {
        // The Edwards identity point has small order
        let mut identity_point = [0u8; 32];
        identity_point[0] = 1;
        assert!(matches!(
            ed25519_public_to_x25519(&identity_point),
            Err(IdentityError::InvalidPublicKey)
        ));
    }
}
