#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use crate::identity::{ed25519_public_to_x25519, IdentityKeyMaterial, Seed, SEED_LEN};
    use crate::session_protocol::{decrypt, encrypt, open, verify_payload, SessionProtocolError};

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]

        // Same seed, same four keys
        #[test]
        fn test_derivation_determinism(bytes in any::<[u8; SEED_LEN]>()) {
            let seed = Seed::from_bytes(&bytes).unwrap();
            let a = IdentityKeyMaterial::from_seed(&seed).unwrap();
            let b = IdentityKeyMaterial::from_seed(&seed).unwrap();

            prop_assert_eq!(a.ed25519_public_key(), b.ed25519_public_key());
            prop_assert_eq!(a.ed25519_secret_key().to_vec(), b.ed25519_secret_key().to_vec());
            prop_assert_eq!(a.x25519_public_key(), b.x25519_public_key());
            prop_assert_eq!(a.x25519_secret_key(), b.x25519_secret_key());
            prop_assert_eq!(
                ed25519_public_to_x25519(&a.ed25519_public_key()).unwrap(),
                a.x25519_public_key()
            );
        }

        #[test]
        fn test_round_trip_returns_sender(
            sender_seed in any::<[u8; SEED_LEN]>(),
            recipient_seed in any::<[u8; SEED_LEN]>(),
            plaintext in proptest::collection::vec(any::<u8>(), 1..512)
        ) {
            let sender = IdentityKeyMaterial::from_seed(&Seed::from_bytes(&sender_seed).unwrap()).unwrap();
            let recipient = IdentityKeyMaterial::from_seed(&Seed::from_bytes(&recipient_seed).unwrap()).unwrap();

            let ciphertext = encrypt(&plaintext, sender.signing_key(), &recipient.x25519_public_key()).unwrap();
            let message = decrypt(&ciphertext, recipient.x25519()).unwrap();

            prop_assert_eq!(message.plaintext, plaintext);
            prop_assert_eq!(message.sender_session_id, sender.session_id());
        }

        #[test]
        fn test_recipient_binding(
            plaintext in proptest::collection::vec(any::<u8>(), 1..128),
            other_seed in any::<[u8; SEED_LEN]>()
        ) {
            let sender = IdentityKeyMaterial::generate().unwrap();
            let recipient = IdentityKeyMaterial::generate().unwrap();
            let other = IdentityKeyMaterial::from_seed(&Seed::from_bytes(&other_seed).unwrap()).unwrap();
            prop_assume!(other.x25519_public_key() != recipient.x25519_public_key());

            let ciphertext = encrypt(&plaintext, sender.signing_key(), &recipient.x25519_public_key()).unwrap();
            let payload = open(&ciphertext, recipient.x25519()).unwrap();

            prop_assert_eq!(
                verify_payload(&payload, &other.x25519_public_key()),
                Err(SessionProtocolError::InvalidSignature)
            );
        }

        // Garbage never panics
        #[test]
        fn test_arbitrary_ciphertext_is_rejected(ciphertext in proptest::collection::vec(any::<u8>(), 0..256)) {
            let recipient = IdentityKeyMaterial::generate().unwrap();
            prop_assert!(decrypt(&ciphertext, recipient.x25519()).is_err());
        }
    }
}
