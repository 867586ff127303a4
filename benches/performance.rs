// Copyright 2025 Google LLC
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//    https://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use rand_chacha::ChaCha20Rng;
use rand_core::SeedableRng;
use seeded_pseudonyms::storage::MemoryStorage;
use seeded_pseudonyms::{
    derive, LinkedRegistry, Mode, Registry, Seed, SessionStore, UnlinkedRegistry,
};

fn chacha_rng() -> ChaCha20Rng {
    ChaCha20Rng::from_seed([42; 32])
}

fn criterion_benchmark(c: &mut Criterion) {
    derive_benchmark(c);
    registry_benchmark(c);
    store_benchmark(c);
}

fn derive_benchmark(c: &mut Criterion) {
    let seed = Seed::random(chacha_rng());
    c.bench_function("derive", |b| {
        let mut index = 0;
        b.iter(|| {
            index += 1;
            derive(black_box(&seed), black_box(index))
        })
    });
}

fn registry_benchmark(c: &mut Criterion) {
    let domains: Vec<String> = (0..100).map(|i| format!("site{i}.example")).collect();
    c.bench_function("linked::register_100", |b| {
        b.iter_batched(
            LinkedRegistry::default,
            |mut registry| {
                for (i, domain) in domains.iter().enumerate() {
                    registry.register_alias(domain, &format!("alias{}", i % 10)).unwrap();
                }
                registry
            },
            criterion::BatchSize::SmallInput,
        )
    });
    c.bench_function("unlinked::register_100", |b| {
        b.iter_batched(
            UnlinkedRegistry::default,
            |mut registry| {
                for domain in &domains {
                    registry.register_alias(domain, "alias").unwrap();
                }
                registry
            },
            criterion::BatchSize::SmallInput,
        )
    });

    let mut unlinked = UnlinkedRegistry::default();
    for domain in &domains {
        unlinked.register_alias(domain, "alias").unwrap();
    }
    c.bench_function("unlinked::resolve", |b| {
        b.iter(|| unlinked.resolve_index(black_box("site77.example"), black_box("alias")))
    });
}

fn store_benchmark(c: &mut Criterion) {
    let mut store = SessionStore::open(MemoryStorage::new()).unwrap();
    store.generate_seed(chacha_rng()).unwrap();
    store.register_alias(Mode::Unlinked, "example.com", "shop").unwrap();
    c.bench_function("store::pseudonym", |b| {
        b.iter(|| store.pseudonym(Mode::Unlinked, black_box("example.com"), black_box("shop")))
    });
}

criterion_group!(benches, criterion_benchmark);
criterion_main!(benches);
