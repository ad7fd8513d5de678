use criterion::{BatchSize, Criterion, black_box, criterion_group, criterion_main};
use spectro_core::calibration::{GainFactor, GainPoint, project};
use spectro_traits::RawSample;

// Synthetic sweep: slowly rotating vector with shrinking magnitude
fn synth_sweep(n: usize) -> Vec<RawSample> {
    (0..n)
        .map(|i| {
            let t = i as f64 / n as f64;
            let mag = 20_000.0 * (1.0 - 0.8 * t);
            let ph = 0.35 + 1.5 * t;
            RawSample {
                frequency_hz: 1_000 + (i as u32) * 194,
                real: (mag * ph.cos()) as i16,
                imag: (mag * ph.sin()) as i16,
            }
        })
        .collect()
}

fn two_point() -> GainFactor {
    GainFactor::TwoPoint(
        GainPoint {
            frequency_hz: 25_750,
            gain: 5.0e-8,
            system_phase_rad: 0.40,
        },
        GainPoint {
            frequency_hz: 75_250,
            gain: 5.2e-8,
            system_phase_rad: 0.50,
        },
    )
}

fn bench_projection(c: &mut Criterion) {
    let samples = synth_sweep(512);
    let gain = two_point();

    c.bench_function("project_512_two_point", |b| {
        b.iter(|| {
            let out: Vec<_> = samples.iter().map(|s| project(s, black_box(&gain))).collect();
            black_box(out)
        })
    });

    c.bench_function("project_512_uncalibrated", |b| {
        b.iter_batched(
            || samples.clone(),
            |s| {
                let out: Vec<_> = s
                    .iter()
                    .map(|x| project(x, &GainFactor::Uncalibrated))
                    .collect();
                black_box(out)
            },
            BatchSize::SmallInput,
        )
    });
}

criterion_group!(benches, bench_projection);
criterion_main!(benches);
