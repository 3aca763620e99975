//! Histogram refill and likelihood pipeline benchmark.
//!
//! Measures one full fit iteration (bin indexes, bin event lists, refill,
//! reduce) over a synthetic sample set, across pool sizes and event
//! counts, plus the weight-only path a minimizer takes when parameters
//! cannot move events between bins.

use std::hint::black_box;
use std::sync::Arc;

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use xf_core::{DialResponse, ParameterView, Result};
use xf_propagator::{
    bins_from_axis, BinErrorPolicy, Dial, EventRecord, FitParameter, PoissonLlh, Sample,
    SampleSet, VariableSet,
};

struct LinearResponse;

impl DialResponse for LinearResponse {
    fn response(&self, parameter_value: f64) -> Result<f64> {
        Ok(1.0 + 0.1 * parameter_value)
    }

    fn kind(&self) -> &str {
        "Linear"
    }
}

fn make_set(n_events: usize, thread_count: usize) -> (SampleSet, Arc<FitParameter>) {
    let mut rng = StdRng::seed_from_u64(42);
    let vars = Arc::new(VariableSet::new(vec!["enu_reco".into()]).unwrap());
    let param = Arc::new(FitParameter::new("xsec_norm", 0.0));
    let dial = Arc::new(
        Dial::new("xsec_norm", Arc::new(LinearResponse) as Arc<dyn DialResponse>)
            .with_parameter(Arc::clone(&param) as Arc<dyn ParameterView>),
    );

    let edges: Vec<f64> = (0..=20).map(|i| i as f64 * 0.5).collect();
    let mut samples = Vec::new();
    for name in ["numu_cc0pi", "numu_cc1pi"] {
        let bins = bins_from_axis("enu_reco", &edges).unwrap();
        let mut sample = Sample::new(name, bins).unwrap();
        for i in 0..n_events {
            let mut ev =
                EventRecord::new(Arc::clone(&vars), vec![rng.random_range(0.0..10.0)]).unwrap();
            ev.set_provenance(0, i as u64);
            ev.set_base_weight(rng.random_range(0.5..1.5));
            ev.attach_dial("xsec", Arc::clone(&dial)).unwrap();
            sample.mc_mut().push_event(ev);
        }
        sample.snapshot_reference_dataset().unwrap();
        samples.push(sample);
    }

    let set = SampleSet::new(samples, Arc::new(PoissonLlh), BinErrorPolicy::default(), thread_count)
        .unwrap();
    (set, param)
}

fn bench_full_pipeline(c: &mut Criterion) {
    let mut group = c.benchmark_group("full_pipeline");
    for n_events in [1_000usize, 10_000] {
        for threads in [1usize, 4] {
            let (set, param) = make_set(n_events, threads);
            let mut step = 0u64;
            group.bench_with_input(
                BenchmarkId::new(format!("{}ev", n_events), threads),
                &threads,
                |b, _| {
                    b.iter(|| {
                        // Nudge the parameter so the dial cache misses once
                        // per iteration, as in a real minimizer.
                        step += 1;
                        param.set_value(step as f64 * 1e-6);
                        black_box(set.evaluate().unwrap())
                    })
                },
            );
        }
    }
    group.finish();
}

fn bench_weight_only_path(c: &mut Criterion) {
    let mut group = c.benchmark_group("weight_only");
    let (set, param) = make_set(10_000, 4);
    set.update_event_bin_indexes().unwrap();
    set.update_bin_event_lists().unwrap();

    let mut step = 0u64;
    group.bench_function("refill_and_reduce_10000ev_4t", |b| {
        b.iter(|| {
            step += 1;
            param.set_value(step as f64 * 1e-6);
            set.update_histograms().unwrap();
            black_box(set.reduce_likelihood().unwrap())
        })
    });
    group.finish();
}

criterion_group!(benches, bench_full_pipeline, bench_weight_only_path);
criterion_main!(benches);
