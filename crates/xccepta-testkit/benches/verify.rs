use criterion::{black_box, criterion_group, criterion_main, Criterion};

use xccepta_core::{encode_for_signing_claim, ChannelExposureState, ClaimPayload, Drops, VerifierChain};
use xccepta_testkit::BuyerFixture;

fn encode_bench(c: &mut Criterion) {
    let channel = "A".repeat(64);
    c.bench_function("encode_claim", |b| {
        b.iter(|| encode_for_signing_claim(black_box(&channel), black_box("0001000000")))
    });
}

fn verify_tagged_bench(c: &mut Criterion) {
    let claim = BuyerFixture::standard().claim(1_000_000);
    let message = encode_for_signing_claim(&"A".repeat(64), 1_000_000u64).unwrap();
    let chain = VerifierChain::default();
    let sig = claim.signature.unwrap();
    let key = claim.pubkey.unwrap();

    c.bench_function("verify_tagged_ed25519", |b| {
        b.iter(|| chain.verify_hex(black_box(&message), &sig, &key))
    });
}

fn parse_claim_bench(c: &mut Criterion) {
    let json = BuyerFixture::standard()
        .claim(1_000_000)
        .to_json_pretty()
        .unwrap();

    c.bench_function("parse_claim_json", |b| {
        b.iter(|| ClaimPayload::from_json(black_box(&json)).and_then(|p| p.into_claim()))
    });
}

fn evaluate_bench(c: &mut Criterion) {
    let mut state = ChannelExposureState::new(BuyerFixture::standard().channel);
    state.last_seen_amount = Drops(2_000_000);
    state.settled_amount = Drops(1_000_000);

    c.bench_function("exposure_evaluate", |b| {
        b.iter(|| state.evaluate(black_box(Drops(3_500_000)), Drops(3_000_000)))
    });
}

criterion_group!(
    benches,
    encode_bench,
    verify_tagged_bench,
    parse_claim_bench,
    evaluate_bench
);
criterion_main!(benches);
