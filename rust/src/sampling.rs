//! Random draws shared by the mobility and epidemic phases.

use rand::Rng;
use rand_distr::{Binomial, Distribution};

/// Convert a continuous-time rate into the probability of at least one event
/// during a step of length `dt` (exponential waiting time).
///
/// Stays in [0, 1) for any finite, non-negative rate.
#[inline]
pub fn rate_to_probability(rate: f64, dt: f64) -> f64 {
    1.0 - (-dt * rate).exp()
}

/// Draw Binomial(n, p) for a compartment count.
///
/// Counts are signed so they can share arrays with the rejection sentinel;
/// a non-positive `n` yields no events.
#[inline]
pub fn binomial<R: Rng + ?Sized>(rng: &mut R, n: i64, p: f64) -> i64 {
    if n <= 0 || !(p > 0.0) {
        return 0;
    }
    if p >= 1.0 {
        return n;
    }
    Binomial::new(n as u64, p)
        .map(|dist| dist.sample(rng) as i64)
        .unwrap_or(0)
}
