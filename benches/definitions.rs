//! Definition pipeline benchmarks
//!
//! Three groups:
//!
//! - **Implicit Multiplication**: the text pass alone, on inputs of growing length
//! - **Definition Commit**: submitting a batch of definitions to a fresh workspace,
//!   including binding, cycle checks and statistics sampling
//! - **Evaluation Order**: topological ordering of a long chain of derived parameters
//!
//! Run with: `cargo bench --bench definitions`

use std::hint::black_box;

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use paramflow::implicit_mul::insert_implicit_multiplication;
use paramflow::symbols::SymbolRegistry;
use paramflow::Workspace;

fn benchmark_implicit_multiplication(c: &mut Criterion) {
    let symbols = SymbolRegistry::builtin();
    let inputs = [
        ("short", "2kx".to_string()),
        ("calls", "2sin(kx)cos(x) + k_{1}x^2".to_string()),
        ("long", "ab(c+d)2x + ".repeat(40)),
    ];

    let mut group = c.benchmark_group("Implicit Multiplication");
    for (name, input) in inputs.iter() {
        group.bench_with_input(BenchmarkId::from_parameter(name), input, |b, input| {
            b.iter(|| insert_implicit_multiplication(black_box(input), &symbols))
        });
    }
    group.finish();
}

fn benchmark_definition_commit(c: &mut Criterion) {
    let definitions = [
        "k = 5",
        "a = 2k",
        "b = a + k",
        "f(x) = sin(kx) + a",
        "g(t) = f(t)^2",
        "y = x^2 - b",
    ];

    c.bench_function("Definition Commit", |b| {
        b.iter(|| {
            let mut ws = Workspace::default();
            for definition in definitions.iter() {
                ws.submit(black_box(definition)).unwrap();
            }
            ws
        })
    });
}

fn benchmark_evaluation_order(c: &mut Criterion) {
    let mut group = c.benchmark_group("Evaluation Order");
    for length in [10usize, 100, 500] {
        let mut ws = Workspace::default();
        ws.submit("a = 1").unwrap();
        for i in 1..length {
            let previous = if i == 1 { "a".to_string() } else { format!("a_{{{}}}", i - 1) };
            ws.submit(&format!("a_{{{}}} = {} + 1", i, previous)).unwrap();
        }
        group.bench_with_input(BenchmarkId::from_parameter(length), &ws, |b, ws| {
            b.iter(|| ws.evaluation_order().unwrap())
        });
    }
    group.finish();
}

criterion_group!(
    benches,
    benchmark_implicit_multiplication,
    benchmark_definition_commit,
    benchmark_evaluation_order
);
criterion_main!(benches);
