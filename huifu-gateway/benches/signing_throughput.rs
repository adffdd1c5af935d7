//! Benchmark suite for request signing.
//!
//! Measures:
//! - Canonical encoding across parameter set sizes
//! - RSA-SHA256 signing of a typical merchant configuration call
//! - Signature verification
//!
//! Run with: `cargo bench --bench signing_throughput`

#![allow(clippy::let_underscore_must_use, reason = "Criterion benchmarks ignore results")]
#![allow(missing_docs, reason = "Benchmark functions are self-documenting")]
#![allow(clippy::expect_used, reason = "Benchmark setup aborts on failure")]

use std::hint::black_box;

use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use huifu_gateway::{
    model::{Params, PrivateKeyMaterial},
    signing::{RequestSigner, SignatureVerifier, canonicalize, generate_test_key_pair},
};
use serde_json::{Value, json};

fn configure_params() -> Params {
    json!({
        "sys_id": "6666000000000001",
        "product_id": "PAYUN",
        "huifu_id": "6666000000000002",
        "req_seq_id": "1729238400123456a1b2c3d4",
        "req_date": "20241018",
        "wx_woa_app_id": "wx1234567890abcdef",
        "wx_woa_path": "pages/index/index",
        "fee_type": "02",
        "timestamp": "20241018120000",
    })
    .as_object()
    .cloned()
    .expect("object literal")
}

fn wide_params(width: usize) -> Params {
    (0..width)
        .map(|i| (format!("field_{i:04}"), Value::from(format!("value-{i}"))))
        .collect()
}

fn bench_canonicalize(c: &mut Criterion) {
    let mut group = c.benchmark_group("canonicalize");

    for width in [8, 64, 512] {
        let params = wide_params(width);
        group.bench_with_input(BenchmarkId::new("fields", width), &params, |b, params| {
            b.iter(|| black_box(canonicalize(black_box(params))));
        });
    }

    group.finish();
}

fn bench_sign(c: &mut Criterion) {
    let _ = tracing_subscriber::fmt().with_max_level(tracing::Level::ERROR).try_init();

    let pair = generate_test_key_pair(2048).expect("key generation");
    let signer = RequestSigner::from_key_material(&PrivateKeyMaterial::new(pair.private_key_pem))
        .expect("signer");
    let params = configure_params();

    c.bench_function("sign_configure_merchant", |b| {
        b.iter(|| black_box(signer.sign(black_box(&params))));
    });
}

fn bench_verify(c: &mut Criterion) {
    let pair = generate_test_key_pair(2048).expect("key generation");
    let signer = RequestSigner::from_key_material(&PrivateKeyMaterial::new(pair.private_key_pem))
        .expect("signer");
    let verifier = SignatureVerifier::from_public_key(&pair.public_key_pem).expect("verifier");
    let params = configure_params();
    let signature = signer.sign(&params).expect("signature");

    c.bench_function("verify_configure_merchant", |b| {
        b.iter(|| black_box(verifier.verify(black_box(&params), black_box(&signature))));
    });
}

criterion_group!(benches, bench_canonicalize, bench_sign, bench_verify);
criterion_main!(benches);
