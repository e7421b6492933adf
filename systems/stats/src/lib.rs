#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Statistical calculations for ETAS catalog simulation.
//!
//! The root module holds the closed-form productivity calculus: uncorrected
//! and corrected productivity, the branch ratio, and its inverse. The
//! corrected productivity rescales `k` so the branch ratio is invariant
//! under truncation of the magnitude range from which descendants are
//! drawn. [`arrays`] holds the column-wise kernels used by forecast
//! aggregation.

pub mod arrays;

use etas_core::{CatalogParams, GenerationInfo, Rupture, C_LOG_10};
use etas_system_random::omori_rate;

/// Arguments to `W(x) = (exp(x) - 1) / x` at or below this magnitude are
/// treated as zero, where `W` is exactly 1.
const SMALL_EXPM1_ARG: f64 = 1.0e-16;

/// Uncorrected productivity `k = 10^(a + alpha*(m0 - m_ref))`.
///
/// Assumes the `a` value is calibrated for mainshock magnitudes drawn from
/// `[m_ref, m_sup]`; no truncation correction is applied.
#[must_use]
pub fn calc_k_uncorr(m0: f64, a: f64, alpha: f64, m_ref: f64) -> f64 {
    10.0_f64.powf(a + alpha * (m0 - m_ref))
}

/// Corrected productivity for a mainshock drawn from `[mag_min, mag_max]`.
///
/// The correction factor is
///
/// ```text
/// Q = exp(v*(m_ref - mag_min))
///       * (W(v*(m_sup - m_ref)) * (m_sup - m_ref))
///       / (W(v*(mag_max - mag_min)) * (mag_max - mag_min))
/// ```
///
/// with `v = ln(10)*(alpha - b)` and `W(x) = (exp(x) - 1)/x`, chosen so
/// that corrected and uncorrected productivity yield the same expected
/// intensity when the mainshock magnitude is drawn from the respective
/// Gutenberg-Richter truncations. `expm1` keeps the ratio stable, and the
/// `W = 1` degenerate form handles `alpha == b` exactly.
#[must_use]
#[allow(clippy::too_many_arguments)]
pub fn calc_k_corr(
    m0: f64,
    a: f64,
    b: f64,
    alpha: f64,
    m_ref: f64,
    m_sup: f64,
    mag_min: f64,
    mag_max: f64,
) -> f64 {
    let v = C_LOG_10 * (alpha - b);
    let k = calc_k_uncorr(m0, a, alpha, m_ref) * (v * (m_ref - mag_min)).exp();

    let delta_sup_ref = m_sup - m_ref;
    let delta_max_min = mag_max - mag_min;

    if (v * delta_sup_ref).abs().max((v * delta_max_min).abs()) <= SMALL_EXPM1_ARG {
        k * (delta_sup_ref / delta_max_min)
    } else {
        k * ((v * delta_sup_ref).exp_m1() / (v * delta_max_min).exp_m1())
    }
}

/// Corrected productivity for a parent magnitude, taking the truncation
/// range from a generation header.
#[must_use]
pub fn calc_k_corr_for_gen(m0: f64, params: &CatalogParams, gen_info: &GenerationInfo) -> f64 {
    calc_k_corr(
        m0,
        params.a,
        params.b,
        params.alpha,
        params.m_ref,
        params.m_sup,
        gen_info.gen_mag_min,
        gen_info.gen_mag_max,
    )
}

/// Builds a seed rupture with productivity pre-corrected against the seed
/// generation's magnitude range `[m_ref, m_sup]`.
#[must_use]
pub fn seed_rupture(params: &CatalogParams, t_day: f64, rup_mag: f64, x_km: f64, y_km: f64) -> Rupture {
    let info = params.seed_gen_info();
    let k_prod = calc_k_corr_for_gen(rup_mag, params, &info);
    Rupture::seed(t_day, rup_mag, k_prod, x_km, y_km)
}

/// Expected direct-child count per parent over `[0, tint]`, for parent
/// magnitudes drawn from the Gutenberg-Richter law on `[m_ref, m_sup]`.
///
/// ```text
/// R = b * ln(10) * 10^a * W(v*(m_sup - m_ref)) * (m_sup - m_ref)
///       * Integral(0, tint, (t + c)^(-p) dt)
/// ```
///
/// A branch ratio of 1 is the criticality threshold.
#[must_use]
#[allow(clippy::too_many_arguments)]
pub fn calc_branch_ratio(
    a: f64,
    p: f64,
    c: f64,
    b: f64,
    alpha: f64,
    m_ref: f64,
    m_sup: f64,
    tint: f64,
) -> f64 {
    let r = b * C_LOG_10 * omori_rate(p, c, 0.0, tint) * 10.0_f64.powf(a);
    r * gr_weight(b, alpha, m_sup - m_ref)
}

/// Branch ratio of a parameter set over its forecast interval.
#[must_use]
pub fn calc_branch_ratio_for(params: &CatalogParams) -> f64 {
    calc_branch_ratio(
        params.a,
        params.p,
        params.c,
        params.b,
        params.alpha,
        params.m_ref,
        params.m_sup,
        params.time_interval(),
    )
}

/// Productivity `a` such that the branch ratio equals `n`.
#[must_use]
#[allow(clippy::too_many_arguments)]
pub fn calc_inv_branch_ratio(
    n: f64,
    p: f64,
    c: f64,
    b: f64,
    alpha: f64,
    m_ref: f64,
    m_sup: f64,
    tint: f64,
) -> f64 {
    let r = b * C_LOG_10 * omori_rate(p, c, 0.0, tint) * gr_weight(b, alpha, m_sup - m_ref);
    (n / r).log10()
}

/// Productivity `a` such that a parameter set's branch ratio equals `n`.
#[must_use]
pub fn calc_inv_branch_ratio_for(n: f64, params: &CatalogParams) -> f64 {
    calc_inv_branch_ratio(
        n,
        params.p,
        params.c,
        params.b,
        params.alpha,
        params.m_ref,
        params.m_sup,
        params.time_interval(),
    )
}

/// The factor `W(v * delta) * delta` shared by the branch ratio and its
/// inverse, with `v = ln(10)*(alpha - b)`.
fn gr_weight(b: f64, alpha: f64, delta_sup_ref: f64) -> f64 {
    let v = C_LOG_10 * (alpha - b);
    if (v * delta_sup_ref).abs() <= SMALL_EXPM1_ARG {
        delta_sup_ref
    } else {
        (v * delta_sup_ref).exp_m1() / v
    }
}
