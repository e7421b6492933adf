#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Per-generation stochastic expansion of ETAS catalogs.
//!
//! After a catalog is seeded — generation 0 populated through the
//! [`CatalogBuilder`] protocol — a [`CatalogGenerator`] expands it one
//! generation at a time. Each step integrates every parent's shifted-Omori
//! rate over the forecast interval, adapts the next generation's minimum
//! magnitude so its expected size matches the configured target, draws a
//! Poisson generation size, assigns children to parents in proportion to
//! their rates, and draws each child's time and magnitude.
//!
//! A generator is single-owner: one thread drives it, and it keeps its
//! scratch buffers across generations, growing them by doubling. Given the
//! same seed, parameters, and seed generation, the produced catalog is
//! bit-identical run to run; the order of random draws is fixed by the
//! algorithm and is part of that contract.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use etas_catalog::CatalogBuilder;
use etas_core::{GenerationInfo, Rupture, TINY_EXPECTED_COUNT, TINY_OMORI_RATE};
use etas_system_random::{gr_inv_rate, gr_rate, omori_rate_shifted, RandomGenerator};
use etas_system_stats::calc_k_corr_for_gen;

/// Initial size of the per-parent scratch arrays.
const DEF_WORKSPACE_CAPACITY: usize = 1000;

/// Cooperative cancellation flag shared between a generator and its
/// controller.
///
/// Cancellation is polled at generation boundaries only; the generation in
/// progress always completes, and the catalog is still ended cleanly.
#[derive(Clone, Debug, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    /// Creates a token in the not-cancelled state.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests cancellation.
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Relaxed);
    }

    /// Reports whether cancellation has been requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Relaxed)
    }
}

/// Why a catalog stopped producing generations.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TerminationReason {
    /// The configured generation limit was reached.
    MaxGenerations,
    /// The current generation holds no ruptures.
    EmptyGeneration,
    /// The summed Omori rate underflowed to effectively zero.
    RateUnderflow,
    /// The expected next-generation size fell below the small-count cutoff.
    TinyExpectedCount,
    /// The Poisson draw for the next generation size came up zero.
    PoissonZero,
    /// The controller requested cancellation.
    Cancelled,
}

/// Summary of one produced generation.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct GenerationRecord {
    /// Index of the produced generation within the catalog.
    pub gen_index: usize,
    /// Number of ruptures produced.
    pub size: usize,
    /// Minimum magnitude of the generation after adaptive clamping.
    pub mag_min: f64,
    /// Maximum magnitude of the generation.
    pub mag_max: f64,
    /// Expected size used for the Poisson draw.
    pub expected_count: f64,
    /// Summed shifted-Omori rate of the parent generation.
    pub total_omori_rate: f64,
}

/// Telemetry accumulated while expanding one catalog.
#[derive(Clone, Debug, Default)]
pub struct GeneratorTelemetry {
    generations: Vec<GenerationRecord>,
    termination: Option<TerminationReason>,
}

impl GeneratorTelemetry {
    /// Clears accumulated records for the next catalog.
    pub fn reset(&mut self) {
        self.generations.clear();
        self.termination = None;
    }

    /// Per-generation records for the produced generations.
    #[must_use]
    pub fn generations(&self) -> &[GenerationRecord] {
        &self.generations
    }

    /// Why the catalog stopped, once it has.
    #[must_use]
    pub fn termination(&self) -> Option<TerminationReason> {
        self.termination
    }

    /// Total number of children produced across all recorded generations.
    #[must_use]
    pub fn total_children(&self) -> usize {
        self.generations.iter().map(|record| record.size).sum()
    }

    fn record(&mut self, record: GenerationRecord) {
        self.generations.push(record);
    }

    fn terminate(&mut self, reason: TerminationReason) {
        self.termination = Some(reason);
    }
}

/// Drives a seeded [`CatalogBuilder`] through successive generations.
#[derive(Debug)]
pub struct CatalogGenerator {
    cum_omori_rate: Vec<f64>,
    child_count: Vec<u32>,
    telemetry: GeneratorTelemetry,
    cancel: CancelToken,
}

impl Default for CatalogGenerator {
    fn default() -> Self {
        Self::new()
    }
}

impl CatalogGenerator {
    /// Creates a generator with its own cancellation token.
    #[must_use]
    pub fn new() -> Self {
        Self {
            cum_omori_rate: vec![0.0; DEF_WORKSPACE_CAPACITY],
            child_count: vec![0; DEF_WORKSPACE_CAPACITY],
            telemetry: GeneratorTelemetry::default(),
            cancel: CancelToken::new(),
        }
    }

    /// A clone of the cancellation token, for handing to a controller
    /// thread.
    #[must_use]
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Telemetry for the catalog currently or most recently expanded.
    #[must_use]
    pub fn telemetry(&self) -> &GeneratorTelemetry {
        &self.telemetry
    }

    /// Calculates the next generation, returning the number of children
    /// produced. Zero signals that the catalog has reached its end; the
    /// reason is recorded in telemetry.
    ///
    /// The builder must hold an open catalog whose last generation is
    /// closed.
    pub fn next_generation(
        &mut self,
        rangen: &mut RandomGenerator,
        builder: &mut CatalogBuilder,
    ) -> usize {
        if self.cancel.is_cancelled() {
            self.telemetry.terminate(TerminationReason::Cancelled);
            return 0;
        }

        let params = builder.params();
        let next_gen_index = builder.gen_count();
        if next_gen_index >= params.gen_count_max as usize {
            self.telemetry.terminate(TerminationReason::MaxGenerations);
            return 0;
        }

        let cur_gen_index = next_gen_index - 1;
        let cur_gen_size = builder.gen_size(cur_gen_index);
        if cur_gen_size == 0 {
            self.telemetry.terminate(TerminationReason::EmptyGeneration);
            return 0;
        }

        self.ensure_workspace(cur_gen_size);

        // Accumulate each parent's expected rate over the forecast
        // interval into the cumulative array used for parent selection.
        let mut total_omori_rate = 0.0;
        for j in 0..cur_gen_size {
            let rup = builder.rupture(cur_gen_index, j);
            total_omori_rate += rup.k_prod
                * omori_rate_shifted(
                    params.p,
                    params.c,
                    rup.t_day,
                    params.teps,
                    params.t_begin,
                    params.t_end,
                );
            self.cum_omori_rate[j] = total_omori_rate;
            self.child_count[j] = 0;
        }

        if total_omori_rate < TINY_OMORI_RATE {
            self.telemetry.terminate(TerminationReason::RateUnderflow);
            return 0;
        }

        // Choose the next minimum magnitude so the expected generation
        // size hits the target, then clamp it into the allowed band and
        // recompute the expectation if the clamp moved it.
        let mut expected_count = f64::from(params.gen_size_target);
        let mut next_mag_min = gr_inv_rate(
            params.b,
            params.m_ref,
            params.m_max_sim,
            expected_count / total_omori_rate,
        );
        if next_mag_min < params.m_min_lo {
            next_mag_min = params.m_min_lo;
            expected_count =
                total_omori_rate * gr_rate(params.b, params.m_ref, next_mag_min, params.m_max_sim);
        } else if next_mag_min > params.m_min_hi {
            next_mag_min = params.m_min_hi;
            expected_count =
                total_omori_rate * gr_rate(params.b, params.m_ref, next_mag_min, params.m_max_sim);
        }

        if expected_count < TINY_EXPECTED_COUNT {
            self.telemetry.terminate(TerminationReason::TinyExpectedCount);
            return 0;
        }

        let next_gen_size = rangen.poisson_sample(expected_count) as usize;
        if next_gen_size == 0 {
            self.telemetry.terminate(TerminationReason::PoissonZero);
            return 0;
        }

        // Distribute the children over the parents with probability
        // proportional to each parent's expected rate.
        for _ in 0..next_gen_size {
            let parent = rangen.cumulative_sample(&self.cum_omori_rate[..cur_gen_size]);
            self.child_count[parent] += 1;
        }

        let next_gen_info = GenerationInfo::new(next_mag_min, params.m_max_sim);
        builder.begin_generation(next_gen_info);

        for j in 0..cur_gen_size {
            let child_count = self.child_count[j];
            if child_count == 0 {
                continue;
            }
            let parent = builder.rupture(cur_gen_index, j);
            for _ in 0..child_count {
                let t_day = rangen.omori_sample_shifted(
                    params.p,
                    params.c,
                    parent.t_day,
                    params.t_begin,
                    params.t_end,
                );
                let rup_mag = rangen.gr_sample(
                    params.b,
                    next_gen_info.gen_mag_min,
                    next_gen_info.gen_mag_max,
                );
                let k_prod = calc_k_corr_for_gen(parent.rup_mag, &params, &next_gen_info);
                builder.add_rup(Rupture::new(
                    t_day,
                    rup_mag,
                    k_prod,
                    j as i32,
                    parent.x_km,
                    parent.y_km,
                ));
            }
        }

        builder.end_generation();

        self.telemetry.record(GenerationRecord {
            gen_index: next_gen_index,
            size: next_gen_size,
            mag_min: next_gen_info.gen_mag_min,
            mag_max: next_gen_info.gen_mag_max,
            expected_count,
            total_omori_rate,
        });

        next_gen_size
    }

    /// Expands the catalog until it dies out or hits a limit, then ends
    /// it. Returns the total number of generations in the catalog,
    /// including the seeds.
    ///
    /// The builder must hold an open catalog with a populated seed
    /// generation.
    pub fn run_to_completion(
        &mut self,
        rangen: &mut RandomGenerator,
        builder: &mut CatalogBuilder,
    ) -> usize {
        self.telemetry.reset();

        let mut gen_size = builder.gen_size(builder.gen_count() - 1);
        while gen_size > 0 {
            gen_size = self.next_generation(rangen, builder);
        }

        builder.end_catalog();
        builder.gen_count()
    }

    fn ensure_workspace(&mut self, required: usize) {
        if required > self.cum_omori_rate.len() {
            let mut capacity = self.cum_omori_rate.len().max(1);
            while capacity < required {
                capacity *= 2;
            }
            self.cum_omori_rate.resize(capacity, 0.0);
            self.child_count.resize(capacity, 0);
        }
    }
}
