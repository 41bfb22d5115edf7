//! Performance benchmarks for the protocol handler

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use deathmatch_core::{Agent, Match, RefereeEvent};
use std::hint::black_box;

fn running_match(population: u32) -> Match<()> {
    let mut state = Match::new();
    for id in 1..=population {
        state
            .register(Agent::new(id, format!("agent-{id}"), "", ()))
            .unwrap();
    }
    state.apply(RefereeEvent::LaunchComplete);
    for id in 1..=population {
        state.receive(id, b"Ready!\n");
    }
    state
}

fn benchmark_sighting_routing(c: &mut Criterion) {
    let mut group = c.benchmark_group("deathmatch_sighting_routing");

    for population in [2u32, 10, 100, 1000].iter() {
        let chunk: Vec<u8> = (1..=*population)
            .flat_map(|id| format!("PID:{id}\nscanning...\n").into_bytes())
            .collect();
        group.bench_with_input(
            BenchmarkId::new("chunk_per_agent", population),
            population,
            |b, &population| {
                let mut state = running_match(population);
                b.iter(|| black_box(state.receive(1, black_box(&chunk))));
            },
        );
    }

    group.finish();
}

criterion_group!(benches, benchmark_sighting_routing);
criterion_main!(benches);
