#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use proptest::prelude::*;
    use serde_json::json;

    use crate::push::RelayResponse;
    use crate::retry::retry_if_needed;
    use crate::types::EnvelopeKind;

    fn block_on<F: std::future::Future>(future: F) -> F::Output {
        tokio::runtime::Builder::new_current_thread()
            .build()
            .unwrap()
            .block_on(future)
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]

        // Attempts stop at the first success or at the attempt limit, whichever comes first
        #[test]
        fn test_retry_attempt_count(max_attempts in 0u32..10, failures in 0u32..12) {
            let calls = AtomicU32::new(0);
            let result: Result<u32, String> = block_on(retry_if_needed(max_attempts, || {
                let call = calls.fetch_add(1, Ordering::SeqCst) + 1;
                async move {
                    if call <= failures { Err(format!("failure {}", call)) } else { Ok(call) }
                }
            }));

            let max_attempts = max_attempts.max(1);
            if failures < max_attempts {
                prop_assert_eq!(result, Ok(failures + 1));
                prop_assert_eq!(calls.load(Ordering::SeqCst), failures + 1);
            } else {
                prop_assert_eq!(result, Err(format!("failure {}", max_attempts)));
                prop_assert_eq!(calls.load(Ordering::SeqCst), max_attempts);
            }
        }

        #[test]
        fn test_only_zero_code_succeeds(code in any::<i64>(), message in proptest::option::of(".{0,16}")) {
            let response = RelayResponse::from_json(&json!({ "code": code, "message": message.clone() }));
            prop_assert_eq!(response.is_success(), code == 0);
            prop_assert_eq!(response.message, message);
        }

        #[test]
        fn test_envelope_kind_wire_mapping(value in any::<i32>()) {
            match EnvelopeKind::try_from(value) {
                Ok(kind) => prop_assert_eq!(kind.wire_value(), value),
                Err(e) => {
                    prop_assert!(value != 6 && value != 7);
                    prop_assert_eq!(e.0, value);
                }
            }
        }
    }
}
