use criterion::{criterion_group, criterion_main, Criterion};
use psaval_core::gateway::{Algorithm, Gateway};
use psaval_core::sequencer::{derive_key, verify_digest, DerivationRequest};
use psaval_core::{run_all, SimulatedDomain, ValidationConfig};

fn bench_battery(c: &mut Criterion) {
    let config = ValidationConfig::default();

    c.bench_function("battery_full_run", |b| {
        b.iter(|| run_all(SimulatedDomain::with_huk([0x5a; 32], [0; 32]), &config))
    });

    let mut gateway = Gateway::new(SimulatedDomain::with_huk([0x5a; 32], [0; 32]));
    if gateway.initialize().is_err() {
        return;
    }
    let data = vec![0xa5u8; 4096];
    let expected = {
        use sha2::{Digest, Sha256};
        Sha256::digest(&data).to_vec()
    };

    c.bench_function("hash_verify_4k", |b| {
        b.iter(|| {
            let mut session = gateway.session().unwrap();
            verify_digest(&mut session, Algorithm::SHA_256, [data.as_slice()], &expected).unwrap()
        })
    });

    let request = DerivationRequest::default();
    c.bench_function("derive_hkdf_sha256_256", |b| {
        b.iter(|| {
            let mut session = gateway.session().unwrap();
            derive_key(&mut session, &request).unwrap()
        })
    });
}

criterion_group!(benches, bench_battery);
criterion_main!(benches);
