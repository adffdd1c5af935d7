use std::sync::LazyLock;

use proptest::prelude::*;
use serde_json::Value;

use super::TEST_KEYS;
use crate::{
    model::{Params, PrivateKeyMaterial},
    signing::{RequestSigner, SignatureVerifier, canonicalize},
};

static SIGNER: LazyLock<RequestSigner> = LazyLock::new(|| {
    RequestSigner::from_key_material(&PrivateKeyMaterial::new(TEST_KEYS.private_key_pem.clone()))
        .expect("test key parses")
});

static VERIFIER: LazyLock<SignatureVerifier> = LazyLock::new(|| {
    SignatureVerifier::from_public_key(&TEST_KEYS.public_key_pem).expect("test public key parses")
});

fn leaf() -> impl Strategy<Value = Value> {
    prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::from),
        any::<i64>().prop_map(Value::from),
        "[a-zA-Z0-9 _\\-\u{4e00}-\u{4e10}]{0,24}".prop_map(Value::from),
    ]
}

fn value() -> impl Strategy<Value = Value> {
    leaf().prop_recursive(3, 24, 4, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..4).prop_map(Value::Array),
            prop::collection::btree_map("[a-z_]{1,8}", inner, 0..4)
                .prop_map(|m| Value::Object(m.into_iter().collect())),
        ]
    })
}

fn params() -> impl Strategy<Value = Vec<(String, Value)>> {
    prop::collection::vec(("[a-z_]{1,12}", value()), 0..8)
}

fn to_params(entries: &[(String, Value)]) -> Params {
    entries.iter().cloned().collect()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn test_canonical_form_ignores_insertion_order(entries in params()) {
        let forward = to_params(&entries);
        let reversed: Params = entries.iter().rev().cloned().collect();

        // duplicate keys resolve differently in reverse; only compare when distinct
        let mut keys: Vec<&String> = entries.iter().map(|(k, _)| k).collect();
        keys.sort();
        keys.dedup();
        prop_assume!(keys.len() == entries.len());

        prop_assert_eq!(canonicalize(&forward).unwrap(), canonicalize(&reversed).unwrap());
    }

    #[test]
    fn test_canonical_form_is_valid_json(entries in params()) {
        let mut p = to_params(&entries);
        p.remove("sign");
        let bytes = canonicalize(&p).unwrap();
        let parsed: Value = serde_json::from_slice(&bytes).expect("canonical output parses");
        prop_assert_eq!(parsed, Value::Object(p));
    }

    #[test]
    fn test_sign_verify_roundtrip(entries in params()) {
        let p = to_params(&entries);
        let sign = SIGNER.sign(&p).expect("signing succeeds");

        let result = VERIFIER.verify(&p, &sign);
        prop_assert!(result.is_ok(), "verification failed: {:?}", result.err());
    }

    #[test]
    fn test_signature_deterministic(entries in params()) {
        let p = to_params(&entries);
        prop_assert_eq!(SIGNER.sign(&p).unwrap(), SIGNER.sign(&p).unwrap());
    }

    #[test]
    fn test_signature_changes_with_params(entries in params(), a in "[0-9]{16}", b in "[0-9]{16}") {
        prop_assume!(a != b);
        let mut p = to_params(&entries);
        p.insert("huifu_id".to_owned(), Value::from(a));
        let first = SIGNER.sign(&p).unwrap();

        p.insert("huifu_id".to_owned(), Value::from(b));
        prop_assert_ne!(first, SIGNER.sign(&p).unwrap());
    }

    #[test]
    fn test_sign_field_does_not_affect_signature(
        entries in params(),
        stale in "[A-Za-z0-9+/=]{0,40}",
    ) {
        let mut p = to_params(&entries);
        p.remove("sign");
        let clean = SIGNER.sign(&p).unwrap();

        p.insert("sign".to_owned(), Value::from(stale));
        prop_assert_eq!(clean, SIGNER.sign(&p).unwrap());
    }
}
