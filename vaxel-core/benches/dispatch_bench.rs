#[macro_use]
extern crate criterion;

use std::sync::Arc;

use criterion::Criterion;

use vaxel_core::prelude::*;

#[derive(Debug)]
struct Tick(u64);

impl Event for Tick {
    fn kind(&self) -> EventKind {
        EventKind::from_static("tick")
    }
}

struct Counter {
    seen: u64,
    verdict: Propagation,
}

impl Handler<Tick> for Counter {
    fn name(&self) -> &str {
        "counter"
    }

    fn handle(&mut self, event: &Tick, _ctx: &mut Context<'_, Tick>) -> Result<Propagation, HandlerFault> {
        self.seen = self.seen.wrapping_add(event.0);
        Ok(self.verdict)
    }
}

fn bench_dispatch(c: &mut Criterion) {
    let mut group = c.benchmark_group("dispatch_throughput");

    for handlers in [1usize, 4, 16] {
        group.throughput(criterion::Throughput::Elements(1024));
        group.bench_function(format!("handlers_{}", handlers), |b| {
            let mut bus = Bus::new(
                BusConfig::default(),
                Arc::new(VirtualClock::new(0)),
                CleanupRegistry::new(),
            );
            for _ in 0..handlers {
                let id = bus.add_handler(Counter {
                    seen: 0,
                    verdict: Propagation::Continue,
                });
                bus.register("tick", id);
            }
            let poster = bus.poster();
            b.iter(|| {
                for n in 0..1024 {
                    poster.post(Tick(n));
                }
                bus.run_once().unwrap();
            });
        });
    }
    group.finish();
}

criterion_group!(benches, bench_dispatch);
criterion_main!(benches);
