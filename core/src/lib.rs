#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Core contracts shared across the ETAS simulation engine.
//!
//! This crate defines the value types that flow between the catalog store,
//! the pure simulation systems, and downstream forecast aggregation: the
//! [`Rupture`] record, the per-generation magnitude range
//! [`GenerationInfo`], and the immutable parameter bundle
//! [`CatalogParams`]. It also carries the numerical constants used by the
//! productivity and rate calculus, and the [`InvariantError`] type raised
//! when a parameter set fails validation before any simulation work begins.

use std::{error::Error, fmt};

use serde::{Deserialize, Serialize};

/// Natural logarithm of 10, used throughout the Gutenberg-Richter and
/// productivity calculus.
pub const C_LOG_10: f64 = std::f64::consts::LN_10;

/// Expected counts below this threshold are treated as exactly zero when
/// drawing Poisson variates.
pub const SMALL_EXPECTED_COUNT: f64 = 1.0e-12;

/// A total Omori rate below this threshold terminates the catalog; it is
/// small enough that dividing by it would be meaningless.
pub const TINY_OMORI_RATE: f64 = 1.0e-150;

/// An expected next-generation size below this threshold terminates the
/// catalog without drawing a Poisson variate.
pub const TINY_EXPECTED_COUNT: f64 = 0.001;

/// Parent index recorded on seed ruptures, which have no parent.
pub const SEED_PARENT: i32 = -1;

/// A single earthquake rupture within a simulated catalog.
///
/// Times are measured in days since an epoch shared by the whole catalog.
/// Coordinates are inherited from the parent rupture; the simulation is
/// temporal only.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Rupture {
    /// Event time in days since the catalog epoch.
    pub t_day: f64,
    /// Event magnitude.
    pub rup_mag: f64,
    /// Corrected productivity of this rupture.
    pub k_prod: f64,
    /// Index of the parent rupture within the previous generation, or
    /// [`SEED_PARENT`] for seed ruptures.
    pub rup_parent: i32,
    /// East-west coordinate in kilometers.
    pub x_km: f64,
    /// North-south coordinate in kilometers.
    pub y_km: f64,
}

impl Rupture {
    /// Creates a rupture with every field supplied explicitly.
    #[must_use]
    pub const fn new(
        t_day: f64,
        rup_mag: f64,
        k_prod: f64,
        rup_parent: i32,
        x_km: f64,
        y_km: f64,
    ) -> Self {
        Self {
            t_day,
            rup_mag,
            k_prod,
            rup_parent,
            x_km,
            y_km,
        }
    }

    /// Creates a seed rupture, which has no parent.
    #[must_use]
    pub const fn seed(t_day: f64, rup_mag: f64, k_prod: f64, x_km: f64, y_km: f64) -> Self {
        Self::new(t_day, rup_mag, k_prod, SEED_PARENT, x_km, y_km)
    }

    /// Reports whether this rupture is a seed.
    #[must_use]
    pub const fn is_seed(&self) -> bool {
        self.rup_parent < 0
    }
}

impl fmt::Display for Rupture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "t={:.4} mag={:.2} k={:.4e} parent={}",
            self.t_day, self.rup_mag, self.k_prod, self.rup_parent
        )
    }
}

/// The truncated Gutenberg-Richter magnitude interval from which the
/// ruptures of one generation were drawn.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct GenerationInfo {
    /// Minimum magnitude of the generation.
    pub gen_mag_min: f64,
    /// Maximum magnitude of the generation.
    pub gen_mag_max: f64,
}

impl GenerationInfo {
    /// Creates a generation magnitude range.
    ///
    /// The range must satisfy `gen_mag_min <= gen_mag_max`.
    #[must_use]
    pub fn new(gen_mag_min: f64, gen_mag_max: f64) -> Self {
        debug_assert!(
            gen_mag_min <= gen_mag_max,
            "generation magnitude range is inverted"
        );
        Self {
            gen_mag_min,
            gen_mag_max,
        }
    }

    /// Width of the magnitude range.
    #[must_use]
    pub fn mag_span(&self) -> f64 {
        self.gen_mag_max - self.gen_mag_min
    }

    /// Reports whether a magnitude lies within the range, inclusive.
    #[must_use]
    pub fn contains(&self, mag: f64) -> bool {
        self.gen_mag_min <= mag && mag <= self.gen_mag_max
    }
}

/// Immutable parameter bundle describing one ETAS simulation.
///
/// The productivity parameter `a` is defined for mainshock magnitudes drawn
/// from `[m_ref, m_sup]`; the corrected-productivity calculus keeps branch
/// ratios consistent when generations are drawn from narrower ranges.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct CatalogParams {
    /// Productivity parameter.
    pub a: f64,
    /// Omori exponent.
    pub p: f64,
    /// Omori offset in days.
    pub c: f64,
    /// Gutenberg-Richter slope.
    pub b: f64,
    /// ETAS intensity parameter.
    pub alpha: f64,
    /// Reference magnitude; the minimum considered magnitude.
    pub m_ref: f64,
    /// Maximum considered magnitude.
    pub m_sup: f64,
    /// Lower bound for the adaptive per-generation minimum magnitude.
    pub m_min_lo: f64,
    /// Upper bound for the adaptive per-generation minimum magnitude.
    pub m_min_hi: f64,
    /// Maximum magnitude simulated for every generation after the seeds.
    pub m_max_sim: f64,
    /// Start of the forecast interval in days since the catalog epoch.
    pub t_begin: f64,
    /// End of the forecast interval in days since the catalog epoch.
    pub t_end: f64,
    /// Dead-zone excluded immediately after each parent rupture, in days.
    pub teps: f64,
    /// Target expected size for each generation after the seeds.
    pub gen_size_target: u32,
    /// Maximum number of generations, counting the seed generation.
    pub gen_count_max: u32,
}

impl Default for CatalogParams {
    fn default() -> Self {
        Self {
            a: -2.5,
            p: 1.1,
            c: 0.01,
            b: 1.0,
            alpha: 1.0,
            m_ref: 3.0,
            m_sup: 8.5,
            m_min_lo: 3.0,
            m_min_hi: 6.0,
            m_max_sim: 8.5,
            t_begin: 0.0,
            t_end: 365.0,
            teps: 1.0e-6,
            gen_size_target: 100,
            gen_count_max: 100,
        }
    }
}

impl CatalogParams {
    /// Length of the forecast interval in days.
    #[must_use]
    pub fn time_interval(&self) -> f64 {
        self.t_end - self.t_begin
    }

    /// Magnitude range implied for seed ruptures, `[m_ref, m_sup]`.
    #[must_use]
    pub fn seed_gen_info(&self) -> GenerationInfo {
        GenerationInfo::new(self.m_ref, self.m_sup)
    }

    /// Checks every parameter invariant, reporting the first violation.
    ///
    /// Validation must succeed before the parameter set is handed to the
    /// catalog builder; a failure here is fatal for the simulation.
    pub fn validate(&self) -> Result<(), InvariantError> {
        if !(self.m_ref <= self.m_min_lo
            && self.m_min_lo <= self.m_min_hi
            && self.m_min_hi <= self.m_max_sim
            && self.m_max_sim <= self.m_sup)
        {
            return Err(InvariantError::MagnitudeOrdering {
                m_ref: self.m_ref,
                m_min_lo: self.m_min_lo,
                m_min_hi: self.m_min_hi,
                m_max_sim: self.m_max_sim,
                m_sup: self.m_sup,
            });
        }
        if !(self.p > 0.0) {
            return Err(InvariantError::OmoriExponent { p: self.p });
        }
        if !(self.c > 0.0) {
            return Err(InvariantError::OmoriOffset { c: self.c });
        }
        if !(self.b > 0.0) {
            return Err(InvariantError::GutenbergRichterSlope { b: self.b });
        }
        if !(self.t_begin < self.t_end) {
            return Err(InvariantError::TimeInterval {
                t_begin: self.t_begin,
                t_end: self.t_end,
            });
        }
        if !(self.teps >= 0.0) {
            return Err(InvariantError::TimeEpsilon { teps: self.teps });
        }
        if self.gen_size_target < 1 {
            return Err(InvariantError::GenerationSizeTarget);
        }
        if self.gen_count_max < 1 {
            return Err(InvariantError::GenerationCountMax);
        }
        Ok(())
    }
}

/// A parameter invariant violation detected before simulation.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum InvariantError {
    /// The magnitudes do not satisfy
    /// `m_ref <= m_min_lo <= m_min_hi <= m_max_sim <= m_sup`.
    MagnitudeOrdering {
        /// Reference magnitude supplied.
        m_ref: f64,
        /// Lower adaptive bound supplied.
        m_min_lo: f64,
        /// Upper adaptive bound supplied.
        m_min_hi: f64,
        /// Simulated maximum magnitude supplied.
        m_max_sim: f64,
        /// Maximum considered magnitude supplied.
        m_sup: f64,
    },
    /// The Omori exponent was not strictly positive.
    OmoriExponent {
        /// Exponent supplied.
        p: f64,
    },
    /// The Omori offset was not strictly positive.
    OmoriOffset {
        /// Offset supplied.
        c: f64,
    },
    /// The Gutenberg-Richter slope was not strictly positive.
    GutenbergRichterSlope {
        /// Slope supplied.
        b: f64,
    },
    /// The forecast interval was empty or inverted.
    TimeInterval {
        /// Interval start supplied.
        t_begin: f64,
        /// Interval end supplied.
        t_end: f64,
    },
    /// The dead-zone width was negative.
    TimeEpsilon {
        /// Dead-zone width supplied.
        teps: f64,
    },
    /// The generation size target was zero.
    GenerationSizeTarget,
    /// The generation count limit was zero.
    GenerationCountMax,
}

impl fmt::Display for InvariantError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MagnitudeOrdering {
                m_ref,
                m_min_lo,
                m_min_hi,
                m_max_sim,
                m_sup,
            } => write!(
                f,
                "magnitude ordering violated: m_ref={m_ref}, m_min_lo={m_min_lo}, \
                 m_min_hi={m_min_hi}, m_max_sim={m_max_sim}, m_sup={m_sup}"
            ),
            Self::OmoriExponent { p } => {
                write!(f, "Omori exponent must be positive, got p={p}")
            }
            Self::OmoriOffset { c } => {
                write!(f, "Omori offset must be positive, got c={c}")
            }
            Self::GutenbergRichterSlope { b } => {
                write!(f, "Gutenberg-Richter slope must be positive, got b={b}")
            }
            Self::TimeInterval { t_begin, t_end } => write!(
                f,
                "forecast interval must satisfy t_begin < t_end, got [{t_begin}, {t_end}]"
            ),
            Self::TimeEpsilon { teps } => {
                write!(f, "dead-zone width must be non-negative, got teps={teps}")
            }
            Self::GenerationSizeTarget => {
                write!(f, "generation size target must be at least 1")
            }
            Self::GenerationCountMax => {
                write!(f, "generation count limit must be at least 1")
            }
        }
    }
}

impl Error for InvariantError {}
