//! Numeric helpers behind the `rt_*` math externs.
//!
//! The random source is a process-global PRNG: `randomize_i64` reseeds it
//! deterministically, `rnd` draws uniformly from [0, 1).

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::Mutex;
use std::sync::OnceLock;

pub fn sqrt(v: f64) -> f64 {
    v.sqrt()
}

pub fn floor(v: f64) -> f64 {
    v.floor()
}

pub fn ceil(v: f64) -> f64 {
    v.ceil()
}

pub fn sin(v: f64) -> f64 {
    v.sin()
}

pub fn cos(v: f64) -> f64 {
    v.cos()
}

pub fn pow(base: f64, exp: f64) -> f64 {
    base.powf(exp)
}

/// Two's-complement wrap at `i64::MIN` like the unchecked IL ops.
pub fn abs_i64(v: i64) -> i64 {
    v.wrapping_abs()
}

pub fn abs_f64(v: f64) -> f64 {
    v.abs()
}

fn rng() -> &'static Mutex<StdRng> {
    static RNG: OnceLock<Mutex<StdRng>> = OnceLock::new();
    RNG.get_or_init(|| Mutex::new(StdRng::seed_from_u64(0x5eed)))
}

/// Reseed the global PRNG; the same seed yields the same `rnd` sequence.
pub fn randomize_i64(seed: i64) {
    *rng().lock().expect("rng mutex poisoned") = StdRng::seed_from_u64(seed as u64);
}

/// Uniform draw from [0, 1).
pub fn rnd() -> f64 {
    rng().lock().expect("rng mutex poisoned").gen_range(0.0..1.0)
}
