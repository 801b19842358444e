use std::{
    f64::consts::{FRAC_PI_2, PI},
    hint::black_box,
    thread,
    time::Duration,
};

use rand::Rng;
use tokio_util::sync::CancellationToken;

use crate::settings::HeavyLoadSettings;

use super::IterationCounter;

/// Trig busy-work for one core. Yields once per pass and nothing more.
pub fn cpu_loop(iterations_per_pass: u32, cancel_token: CancellationToken, counter: IterationCounter) {
    let mut rng = rand::thread_rng();

    while !cancel_token.is_cancelled() {
        let mut acc = 0.0_f64;
        for _ in 0..iterations_per_pass {
            let a: f64 = rng.gen_range(0.0..PI);
            let b: f64 = rng.gen_range(0.0..PI);
            let c: f64 = rng.gen_range(-FRAC_PI_2..FRAC_PI_2);
            acc += (a.sin().powi(2) + b.cos().powi(2)).sqrt() * c.tan();
        }
        black_box(acc);

        counter.bump();
        thread::yield_now();
    }
}

/// Allocates and touches `chunk_count * chunk_bytes`, releases it, pauses.
pub fn memory_loop(settings: HeavyLoadSettings, cancel_token: CancellationToken, counter: IterationCounter) {
    let pause = Duration::from_millis(settings.pause_ms);

    while !cancel_token.is_cancelled() {
        // Non-zero fill so the pages are really committed.
        let chunks: Vec<Vec<u8>> = (0..settings.chunk_count)
            .map(|i| vec![(i as u8) | 1; settings.chunk_bytes])
            .collect();
        black_box(&chunks);
        drop(chunks);

        counter.bump();
        thread::sleep(pause);
    }
}
