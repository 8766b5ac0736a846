// Copyright 2024-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use criterion::{criterion_group, criterion_main, Criterion};
use std::hint::black_box;
use symdex::SymbolTable;

fn decimal_keys(count: usize) -> Vec<String> {
    (0..count).map(|i| i.to_string()).collect()
}

fn bench_intern(c: &mut Criterion) {
    let keys = decimal_keys(10_000);

    c.bench_function("intern_10k_fresh", |b| {
        b.iter(|| {
            let mut symbols = SymbolTable::new();
            for key in &keys {
                black_box(symbols.intern(key.as_bytes(), true));
            }
            symbols
        })
    });

    c.bench_function("intern_existing", |b| {
        let mut symbols = SymbolTable::new();
        for key in &keys {
            symbols.intern(key.as_bytes(), true);
        }
        b.iter(|| {
            for key in &keys {
                black_box(symbols.intern(key.as_bytes(), false));
            }
        })
    });

    c.bench_function("intern_miss", |b| {
        let mut symbols = SymbolTable::new();
        for key in &keys {
            symbols.intern(key.as_bytes(), true);
        }
        let misses = decimal_keys(20_000);
        b.iter(|| {
            for key in &misses[10_000..] {
                black_box(symbols.intern(key.as_bytes(), false));
            }
        })
    });
}

fn bench_lookup_sequence(c: &mut Criterion) {
    let keys = decimal_keys(100_000);
    let mut symbols = SymbolTable::new();
    for key in &keys {
        symbols.intern(key.as_bytes(), true);
    }

    c.bench_function("lookup_sequence_100k", |b| {
        b.iter(|| {
            for seq in 1..=100_000u32 {
                black_box(symbols.lookup_sequence(seq));
            }
        })
    });
}

criterion_group!(benches, bench_intern, bench_lookup_sequence);
criterion_main!(benches);
