#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Deterministic random sampling for ETAS catalog simulation.
//!
//! [`RandomGenerator`] wraps a ChaCha8 stream seeded from a 64-bit value and
//! exposes the samplers the catalog generator consumes: Poisson child
//! counts, truncated Gutenberg-Richter magnitudes, shifted-Omori times, and
//! cumulative-weight parent selection. The closed-form rate functions that
//! pair with the samplers live here as free functions so the stats kernel
//! can share them.
//!
//! Every sampler is a pure function of the generator state. Two generators
//! built from the same seed and driven through the same call sequence
//! produce identical draws.

use etas_core::{C_LOG_10, SMALL_EXPECTED_COUNT};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rand_distr::Poisson;

/// Below this value of `b * (m2 - m1)` the truncated Gutenberg-Richter
/// density is indistinguishable from uniform and the inverse CDF would
/// cancel catastrophically.
const TINY_GR_SPAN: f64 = 1.0e-12;

/// Value of the Gutenberg-Richter rate function over `[m1, m2]`.
///
/// Returns the integral of `b * ln(10) * 10^(-b*(m - mref))` over the
/// interval, which is the expected event count in `[m1, m2]` per unit of
/// Omori rate referenced to magnitude `mref`.
#[must_use]
pub fn gr_rate(b: f64, mref: f64, m1: f64, m2: f64) -> f64 {
    10.0_f64.powf(-b * (m1 - mref)) - 10.0_f64.powf(-b * (m2 - mref))
}

/// Magnitude `m1` such that `gr_rate(b, mref, m1, m2)` equals `r`.
///
/// The return value is logarithmic in `r`, so arbitrarily large rates map
/// to finite magnitudes without overflow.
#[must_use]
pub fn gr_inv_rate(b: f64, mref: f64, m2: f64, r: f64) -> f64 {
    mref - (r + 10.0_f64.powf(-b * (m2 - mref))).log10() / b
}

/// Integral of the Omori kernel `(t + c)^(-p)` over `[t1, t2]`.
///
/// Evaluated as `(t1 + c)^(1-p) * expm1((1-p) * ln((t2+c)/(t1+c))) / (1-p)`
/// so the result stays accurate as `p` approaches 1, where the naive
/// power-difference form loses all significance.
#[must_use]
pub fn omori_rate(p: f64, c: f64, t1: f64, t2: f64) -> f64 {
    let s = 1.0 - p;
    let q = ((t2 + c) / (t1 + c)).ln();
    if s == 0.0 {
        q
    } else {
        (s * (t1 + c).ln()).exp() * (s * q).exp_m1() / s
    }
}

/// Omori integral for a parent at time `t0`, restricted to the forecast
/// interval `[t1, t2]` and excluding the dead-zone `[t0, t0 + teps]`.
///
/// Returns zero when the interval ends inside the dead-zone.
#[must_use]
pub fn omori_rate_shifted(p: f64, c: f64, t0: f64, teps: f64, t1: f64, t2: f64) -> f64 {
    if t2 <= t0 + teps {
        return 0.0;
    }
    omori_rate(p, c, t1.max(t0 + teps) - t0, t2 - t0)
}

/// Deterministic random source for one simulation.
///
/// The generator owns a ChaCha8 stream; ChaCha8 is fully specified, so the
/// raw stream is identical on every platform, and all samplers are fixed
/// floating-point transforms of it.
#[derive(Clone, Debug)]
pub struct RandomGenerator {
    rng: ChaCha8Rng,
}

impl RandomGenerator {
    /// Creates a generator from a 64-bit seed.
    #[must_use]
    pub fn from_seed(seed: u64) -> Self {
        Self {
            rng: ChaCha8Rng::seed_from_u64(seed),
        }
    }

    /// Draws a uniform variate in `[0, 1)`.
    #[must_use]
    pub fn uniform(&mut self) -> f64 {
        self.rng.gen::<f64>()
    }

    /// Draws a Poisson variate with the given mean.
    ///
    /// Means below [`SMALL_EXPECTED_COUNT`] return zero without consuming
    /// any randomness. Larger means use a direct transform, switching to a
    /// rejection method internally once the mean is large enough that the
    /// direct transform would lose accuracy; means up to 1e18 are safe.
    #[must_use]
    pub fn poisson_sample(&mut self, mean: f64) -> u64 {
        if mean < SMALL_EXPECTED_COUNT {
            return 0;
        }
        let dist = Poisson::new(mean).expect("poisson mean is positive and finite");
        let draw: f64 = self.rng.sample(dist);
        draw as u64
    }

    /// Draws a magnitude from the Gutenberg-Richter distribution truncated
    /// to `[m1, m2]`.
    ///
    /// Uses the inverse CDF in `log1p`/`expm1` form; when `b * (m2 - m1)`
    /// is tiny the density is flat and the draw falls back to uniform on
    /// the interval.
    #[must_use]
    pub fn gr_sample(&mut self, b: f64, m1: f64, m2: f64) -> f64 {
        let span = m2 - m1;
        let x = b * span * C_LOG_10;
        let u = self.uniform();
        if x.abs() <= TINY_GR_SPAN {
            return m1 + u * span;
        }
        m1 - (u * (-x).exp_m1()).ln_1p() / (b * C_LOG_10)
    }

    /// Draws a time from the shifted-Omori density
    /// `(tau - t0 + c)^(-p)` restricted to `[max(t1, t0), t2]`.
    #[must_use]
    pub fn omori_sample_shifted(&mut self, p: f64, c: f64, t0: f64, t1: f64, t2: f64) -> f64 {
        let lo = t1.max(t0);
        let u1 = lo - t0;
        let u2 = t2 - t0;
        let s = 1.0 - p;
        let l1 = (u1 + c).ln();
        let q = ((u2 + c) / (u1 + c)).ln();
        let u = self.uniform();
        let log_w = if s == 0.0 {
            l1 + u * q
        } else {
            l1 + (u * (s * q).exp_m1()).ln_1p() / s
        };
        (t0 + (log_w.exp() - c)).clamp(lo, t2)
    }

    /// Selects an index with probability proportional to the weight
    /// differences encoded in a non-decreasing cumulative-weight array.
    ///
    /// Index `i` is drawn with probability
    /// `(cum_weights[i] - cum_weights[i-1]) / cum_weights[n-1]`.
    /// The array must be non-empty with a positive final total.
    #[must_use]
    pub fn cumulative_sample(&mut self, cum_weights: &[f64]) -> usize {
        debug_assert!(!cum_weights.is_empty(), "cumulative weights are empty");
        let total = cum_weights[cum_weights.len() - 1];
        debug_assert!(total > 0.0, "cumulative weight total must be positive");
        let target = self.uniform() * total;
        cum_weights
            .partition_point(|&w| w <= target)
            .min(cum_weights.len() - 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEST_SEED: u64 = 0x6f88_32aa_01c4_55d9;

    #[test]
    fn identical_seeds_replay_identical_draws() {
        let mut first = RandomGenerator::from_seed(TEST_SEED);
        let mut second = RandomGenerator::from_seed(TEST_SEED);
        for _ in 0..64 {
            assert_eq!(first.uniform().to_bits(), second.uniform().to_bits());
        }
        assert_eq!(
            first.gr_sample(1.0, 3.0, 8.0).to_bits(),
            second.gr_sample(1.0, 3.0, 8.0).to_bits()
        );
        assert_eq!(first.poisson_sample(12.5), second.poisson_sample(12.5));
    }

    #[test]
    fn uniform_stays_in_unit_interval() {
        let mut rangen = RandomGenerator::from_seed(TEST_SEED);
        for _ in 0..10_000 {
            let u = rangen.uniform();
            assert!((0.0..1.0).contains(&u));
        }
    }

    #[test]
    fn poisson_tiny_mean_is_zero() {
        let mut rangen = RandomGenerator::from_seed(TEST_SEED);
        assert_eq!(rangen.poisson_sample(0.0), 0);
        assert_eq!(rangen.poisson_sample(1.0e-13), 0);
    }

    #[test]
    fn poisson_empirical_mean_matches() {
        let mut rangen = RandomGenerator::from_seed(TEST_SEED);
        let mean = 5.0;
        let draws = 1_000_000_u64;
        let mut total = 0u64;
        for _ in 0..draws {
            total += rangen.poisson_sample(mean);
        }
        let empirical = total as f64 / draws as f64;
        let tolerance = 4.0 * (mean / draws as f64).sqrt();
        assert!(
            (empirical - mean).abs() < tolerance,
            "empirical mean {empirical} outside {mean} +- {tolerance}"
        );
    }

    #[test]
    fn poisson_large_mean_is_bounded_and_sane() {
        let mut rangen = RandomGenerator::from_seed(TEST_SEED);
        let mean = 1.0e6;
        let draw = rangen.poisson_sample(mean) as f64;
        assert!((draw - mean).abs() < 10.0 * mean.sqrt());
        let huge = rangen.poisson_sample(1.0e18) as f64;
        assert!(huge > 0.5e18 && huge < 1.5e18);
    }

    #[test]
    fn gr_sample_stays_in_range() {
        let mut rangen = RandomGenerator::from_seed(TEST_SEED);
        for _ in 0..10_000 {
            let m = rangen.gr_sample(1.0, 3.0, 8.0);
            assert!((3.0..=8.0).contains(&m));
        }
    }

    #[test]
    fn gr_sample_empirical_mean_matches_closed_form() {
        let mut rangen = RandomGenerator::from_seed(TEST_SEED);
        let (b, m1, m2) = (1.0, 3.0, 8.0);
        let draws = 1_000_000_u32;
        let mut total = 0.0;
        let mut total_sq = 0.0;
        for _ in 0..draws {
            let m = rangen.gr_sample(b, m1, m2);
            total += m;
            total_sq += m * m;
        }
        let empirical = total / f64::from(draws);
        let variance = (total_sq / f64::from(draws) - empirical * empirical).max(0.0);

        let beta = b * C_LOG_10;
        let span = m2 - m1;
        let exp_term = (-beta * span).exp();
        let expected = m1 + 1.0 / beta - span * exp_term / (1.0 - exp_term);

        let tolerance = 4.0 * (variance / f64::from(draws)).sqrt();
        assert!(
            (empirical - expected).abs() < tolerance,
            "empirical mean {empirical} outside {expected} +- {tolerance}"
        );
    }

    #[test]
    fn gr_sample_tiny_span_falls_back_to_uniform() {
        let mut rangen = RandomGenerator::from_seed(TEST_SEED);
        let (m1, m2) = (5.0, 5.0 + 1.0e-14);
        for _ in 0..1_000 {
            let m = rangen.gr_sample(1.0, m1, m2);
            assert!((m1..=m2).contains(&m));
        }
    }

    #[test]
    fn gr_inv_rate_inverts_gr_rate() {
        let (b, mref, m2) = (0.9, 3.0, 8.0);
        for r in [1.0e-6, 0.01, 1.0, 42.0, 1.0e8] {
            let m1 = gr_inv_rate(b, mref, m2, r);
            let back = gr_rate(b, mref, m1, m2);
            assert!(
                ((back - r) / r).abs() < 1.0e-10,
                "round trip failed for r={r}: got {back}"
            );
        }
    }

    #[test]
    fn gr_inv_rate_is_logarithmic_in_extremes() {
        let m1 = gr_inv_rate(1.0, 3.0, 8.0, 1.0e300);
        assert!(m1.is_finite());
        assert!(m1 < 3.0 - 299.0);
    }

    #[test]
    fn omori_rate_handles_p_near_one() {
        let (c, t1, t2): (f64, f64, f64) = (0.01, 0.0, 30.0);
        let exact = ((t2 + c) / (t1 + c)).ln();
        let at_one = omori_rate(1.0, c, t1, t2);
        let near_one = omori_rate(1.0 + 1.0e-12, c, t1, t2);
        assert!((at_one - exact).abs() < 1.0e-12 * exact);
        assert!(((near_one - at_one) / at_one).abs() < 1.0e-9);
    }

    #[test]
    fn omori_rate_matches_power_form_away_from_one() {
        let (p, c, t1, t2): (f64, f64, f64, f64) = (1.5, 0.05, 1.0, 20.0);
        let naive = ((t2 + c).powf(1.0 - p) - (t1 + c).powf(1.0 - p)) / (1.0 - p);
        let stable = omori_rate(p, c, t1, t2);
        assert!(((stable - naive) / naive).abs() < 1.0e-12);
    }

    #[test]
    fn omori_rate_shifted_respects_dead_zone() {
        let (p, c) = (1.1, 0.01);
        assert_eq!(omori_rate_shifted(p, c, 29.5, 1.0, 0.0, 30.0), 0.0);
        let shifted = omori_rate_shifted(p, c, 10.0, 0.5, 0.0, 30.0);
        let direct = omori_rate(p, c, 0.5, 20.0);
        assert!(((shifted - direct) / direct).abs() < 1.0e-14);
    }

    #[test]
    fn omori_sample_stays_in_interval() {
        let mut rangen = RandomGenerator::from_seed(TEST_SEED);
        let (p, c, t0, t1, t2) = (1.1, 0.01, 5.0, 0.0, 30.0);
        for _ in 0..10_000 {
            let tau = rangen.omori_sample_shifted(p, c, t0, t1, t2);
            assert!((5.0..=30.0).contains(&tau));
        }
    }

    #[test]
    fn omori_sample_empirical_cdf_matches_rate_ratio() {
        let mut rangen = RandomGenerator::from_seed(TEST_SEED);
        let (p, c, t0, t1, t2) = (1.2, 0.02, 0.0, 0.0, 30.0);
        let tmid = 3.0;
        let draws = 200_000_u32;
        let mut below = 0u32;
        for _ in 0..draws {
            if rangen.omori_sample_shifted(p, c, t0, t1, t2) <= tmid {
                below += 1;
            }
        }
        let empirical = f64::from(below) / f64::from(draws);
        let expected = omori_rate(p, c, 0.0, tmid) / omori_rate(p, c, 0.0, t2);
        let tolerance = 4.0 * (expected * (1.0 - expected) / f64::from(draws)).sqrt();
        assert!(
            (empirical - expected).abs() < tolerance,
            "empirical cdf {empirical} outside {expected} +- {tolerance}"
        );
    }

    #[test]
    fn cumulative_sample_respects_weights() {
        let mut rangen = RandomGenerator::from_seed(TEST_SEED);
        let cum = [1.0, 3.0, 6.0];
        let draws = 300_000_u32;
        let mut counts = [0u32; 3];
        for _ in 0..draws {
            counts[rangen.cumulative_sample(&cum)] += 1;
        }
        let expected = [1.0 / 6.0, 2.0 / 6.0, 3.0 / 6.0];
        for (count, target) in counts.iter().zip(expected) {
            let fraction = f64::from(*count) / f64::from(draws);
            let tolerance = 4.0 * (target * (1.0 - target) / f64::from(draws)).sqrt();
            assert!(
                (fraction - target).abs() < tolerance,
                "fraction {fraction} outside {target} +- {tolerance}"
            );
        }
    }

    #[test]
    fn cumulative_sample_skips_zero_weight_parents() {
        let mut rangen = RandomGenerator::from_seed(TEST_SEED);
        // Parents 0 and 2 carry zero weight.
        let cum = [0.0, 4.0, 4.0, 5.0];
        for _ in 0..10_000 {
            let index = rangen.cumulative_sample(&cum);
            assert!(index == 1 || index == 3, "drew zero-weight index {index}");
        }
    }
}
