#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Forecast aggregation over simulated ETAS catalogs.
//!
//! For one mainshock, [`EqkForecastSet::run_simulations`] runs `num_sim`
//! independent catalogs per forecast lag and model, tallies each catalog's
//! descendants into advisory-window and magnitude-bin cells, and keeps the
//! full per-cell count distribution. After [`EqkForecastSet::finish`]
//! sorts the distributions, the [`scoring`] queries derive observed
//! counts, medians, fractiles, and the rank-based gamma score.
//!
//! Every simulation draws from its own ChaCha8 stream whose seed is
//! derived from the global seed plus structured labels, so independent
//! simulations never share randomness and whole runs replay bit-for-bit.

mod scoring;

pub use scoring::{CellStats, GammaScore};

use std::{error::Error, fmt};

use etas_catalog::CatalogBuilder;
use etas_core::{CatalogParams, InvariantError, Rupture};
use etas_system_generator::CatalogGenerator;
use etas_system_random::RandomGenerator;
use etas_system_stats::arrays;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

const RNG_STREAM_SIMULATION: &str = "etas-forecast-sim";

/// A named prospective interval over which forecast counts are tallied,
/// as offsets in days from the forecast time.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AdvisoryWindow {
    /// Display name of the window.
    pub name: String,
    /// Start offset of the window, inclusive.
    pub start_day: f64,
    /// End offset of the window, exclusive.
    pub end_day: f64,
}

impl AdvisoryWindow {
    /// Creates a named window spanning `[start_day, end_day)`.
    #[must_use]
    pub fn new(name: &str, start_day: f64, end_day: f64) -> Self {
        Self {
            name: name.to_owned(),
            start_day,
            end_day,
        }
    }
}

/// Magnitude-dependent minimum-magnitude function for a forecast bin.
///
/// Variants are distinguished by the `kind` discriminant in serialized
/// form.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum MinMagFn {
    /// A fixed magnitude floor.
    Constant {
        /// The constant magnitude.
        mag: f64,
    },
    /// A fixed floor, limited to a maximum number of magnitude units
    /// below the mainshock; `delta_max` of zero disables the floor.
    FloorBelowMainshock {
        /// The constant magnitude.
        mag: f64,
        /// Maximum number of magnitude units below the mainshock.
        delta_max: f64,
    },
}

impl MinMagFn {
    /// Resolves the bin floor for a mainshock magnitude.
    #[must_use]
    pub fn mag_for(&self, mainshock_mag: f64) -> f64 {
        match *self {
            Self::Constant { mag } => mag,
            Self::FloorBelowMainshock { mag, delta_max } => {
                if delta_max > 0.001 {
                    mag.max(mainshock_mag - delta_max)
                } else {
                    mag
                }
            }
        }
    }
}

/// One forecast model: a named ETAS parameter set.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ForecastModel {
    /// Display name of the model.
    pub name: String,
    /// Parameter set the model simulates with. The forecast interval
    /// fields are overridden per forecast lag.
    pub params: CatalogParams,
}

/// Configuration of the forecast evaluation grid.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ForecastConfig {
    /// Forecast lags in days after the mainshock.
    pub forecast_lags: Vec<f64>,
    /// Advisory windows tallied for each forecast.
    pub advisory_windows: Vec<AdvisoryWindow>,
    /// Minimum-magnitude bin functions, resolved per mainshock.
    pub min_mag_bins: Vec<MinMagFn>,
    /// Number of independent simulations per forecast lag and model.
    pub num_sim: u32,
}

impl Default for ForecastConfig {
    fn default() -> Self {
        Self {
            forecast_lags: vec![1.0, 7.0, 30.0],
            advisory_windows: vec![
                AdvisoryWindow::new("1 Day", 0.0, 1.0),
                AdvisoryWindow::new("1 Week", 0.0, 7.0),
                AdvisoryWindow::new("1 Month", 0.0, 30.0),
            ],
            min_mag_bins: vec![
                MinMagFn::Constant { mag: 5.0 },
                MinMagFn::Constant { mag: 6.0 },
                MinMagFn::Constant { mag: 7.0 },
            ],
            num_sim: 500,
        }
    }
}

/// Failure to assemble a forecast set.
#[derive(Clone, Debug, PartialEq)]
pub enum ForecastError {
    /// The configuration has no lags, windows, bins, or simulations, or
    /// no models or seeds were supplied.
    EmptyGrid,
    /// An advisory window does not satisfy `start_day < end_day`.
    InvalidWindow {
        /// Name of the offending window.
        name: String,
    },
    /// A model's parameter set failed invariant validation.
    InvalidModel {
        /// Name of the offending model.
        model: String,
        /// The violated invariant.
        source: InvariantError,
    },
}

impl fmt::Display for ForecastError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EmptyGrid => write!(f, "forecast grid has no cells to simulate"),
            Self::InvalidWindow { name } => {
                write!(f, "advisory window {name:?} is empty or inverted")
            }
            Self::InvalidModel { model, source } => {
                write!(f, "model {model:?} has invalid parameters: {source}")
            }
        }
    }
}

impl Error for ForecastError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::InvalidModel { source, .. } => Some(source),
            _ => None,
        }
    }
}

/// The evaluation grid resolved against one mainshock.
#[derive(Clone, Debug)]
pub(crate) struct ForecastGrid {
    pub(crate) lags: Vec<f64>,
    pub(crate) windows: Vec<AdvisoryWindow>,
    pub(crate) bin_mags: Vec<f64>,
}

impl ForecastGrid {
    fn resolve(config: &ForecastConfig, mainshock_mag: f64) -> Result<Self, ForecastError> {
        if config.forecast_lags.is_empty()
            || config.advisory_windows.is_empty()
            || config.min_mag_bins.is_empty()
            || config.num_sim == 0
        {
            return Err(ForecastError::EmptyGrid);
        }
        for window in &config.advisory_windows {
            if !(window.start_day < window.end_day) {
                return Err(ForecastError::InvalidWindow {
                    name: window.name.clone(),
                });
            }
        }
        Ok(Self {
            lags: config.forecast_lags.clone(),
            windows: config.advisory_windows.clone(),
            bin_mags: config
                .min_mag_bins
                .iter()
                .map(|bin| bin.mag_for(mainshock_mag))
                .collect(),
        })
    }

    fn max_window_end(&self) -> f64 {
        self.windows
            .iter()
            .map(|window| window.end_day)
            .fold(f64::NEG_INFINITY, f64::max)
    }
}

/// Per-cell simulated count distributions for one mainshock.
///
/// Cells are addressed by `(lag_slot, model, window, bin)`. There is one
/// extra lag slot past the configured lags which accumulates the per-sim
/// sum over all forecast lags, so lag-aggregated statistics come from the
/// same queries as the per-lag ones.
#[derive(Clone, Debug)]
pub struct EqkForecastSet {
    grid: ForecastGrid,
    model_names: Vec<String>,
    num_sim: usize,
    counts: Vec<u32>,
    sorted: bool,
}

impl EqkForecastSet {
    /// Allocates a zeroed forecast set for the given configuration and
    /// mainshock magnitude.
    ///
    /// Used directly for rate-only models populated via
    /// [`EqkForecastSet::add_poisson`]; simulation runs go through
    /// [`EqkForecastSet::run_simulations`].
    pub fn zero_init(
        config: &ForecastConfig,
        model_names: &[String],
        mainshock_mag: f64,
    ) -> Result<Self, ForecastError> {
        if model_names.is_empty() {
            return Err(ForecastError::EmptyGrid);
        }
        let grid = ForecastGrid::resolve(config, mainshock_mag)?;
        let num_sim = config.num_sim as usize;
        let cells =
            (grid.lags.len() + 1) * model_names.len() * grid.windows.len() * grid.bin_mags.len();
        Ok(Self {
            grid,
            model_names: model_names.to_vec(),
            num_sim,
            counts: vec![0; cells * num_sim],
            sorted: false,
        })
    }

    /// Runs the full simulation grid for one mainshock.
    ///
    /// For every forecast lag and model, `num_sim` catalogs are expanded
    /// from the seed ruptures with the model's parameters, the forecast
    /// interval overridden to span the lag's advisory windows. Each
    /// catalog's descendants are tallied into every matching cell. Seed
    /// productivity must already be corrected by the caller.
    pub fn run_simulations(
        config: &ForecastConfig,
        models: &[ForecastModel],
        seeds: &[Rupture],
        global_seed: u64,
    ) -> Result<Self, ForecastError> {
        if models.is_empty() || seeds.is_empty() {
            return Err(ForecastError::EmptyGrid);
        }
        let mainshock_mag = seeds
            .iter()
            .map(|seed| seed.rup_mag)
            .fold(f64::NEG_INFINITY, f64::max);
        let names: Vec<String> = models.iter().map(|model| model.name.clone()).collect();
        let mut set = Self::zero_init(config, &names, mainshock_mag)?;

        let mut builder = CatalogBuilder::new();
        let mut generator = CatalogGenerator::new();

        for (model_index, model) in models.iter().enumerate() {
            for lag_index in 0..set.grid.lags.len() {
                let lag = set.grid.lags[lag_index];
                let mut params = model.params;
                params.t_begin = lag;
                params.t_end = lag + set.grid.max_window_end();
                params.validate().map_err(|source| ForecastError::InvalidModel {
                    model: model.name.clone(),
                    source,
                })?;

                for sim_index in 0..set.num_sim {
                    let sim_seed =
                        derive_sim_seed(global_seed, model_index, lag_index, sim_index);
                    let mut rangen = RandomGenerator::from_seed(sim_seed);
                    builder.clear();
                    builder
                        .begin_seeded(params, params.seed_gen_info(), seeds)
                        .expect("parameters were validated above");
                    let _ = generator.run_to_completion(&mut rangen, &mut builder);
                    set.tally_catalog(&builder, lag, model_index, lag_index, sim_index);
                }
            }
        }

        Ok(set)
    }

    /// Adds a Poisson variate to every count, cell by cell.
    ///
    /// `means` holds one expected count per cell in `(lag_slot, model,
    /// window, bin)` order. Used to fold rate-only forecast models into
    /// the same count-distribution machinery.
    ///
    /// # Panics
    ///
    /// Panics if the set is already sorted or `means` has the wrong
    /// length.
    pub fn add_poisson(&mut self, means: &[f64], rangen: &mut RandomGenerator) {
        assert!(!self.sorted, "forecast set misuse: add_poisson after finish");
        assert_eq!(means.len(), self.cell_count(), "one mean per cell required");
        let mut cell_means = vec![0.0; self.num_sim];
        for (cell, &mean) in means.iter().enumerate() {
            let start = cell * self.num_sim;
            let column = &mut self.counts[start..start + self.num_sim];
            cell_means.fill(mean);
            arrays::add_poisson_array(rangen, &cell_means, column);
        }
    }

    /// Adds another set's counts into this one, cell by cell.
    ///
    /// With `randomize` false, simulation `i` of each cell receives the
    /// other set's simulation `i`. With `randomize` true, each receiving
    /// simulation draws a random simulation from the other set, which
    /// decorrelates sets built from different mainshocks.
    ///
    /// # Panics
    ///
    /// Panics if either set is already sorted or the shapes differ.
    pub fn add_from(&mut self, other: &Self, randomize: bool, rangen: &mut RandomGenerator) {
        assert!(
            !self.sorted && !other.sorted,
            "forecast set misuse: add_from after finish"
        );
        assert_eq!(self.counts.len(), other.counts.len(), "shape mismatch");
        assert_eq!(self.num_sim, other.num_sim, "simulation count mismatch");
        if randomize {
            for cell in 0..self.cell_count() {
                let start = cell * self.num_sim;
                for sim in 0..self.num_sim {
                    let pick = (rangen.uniform() * self.num_sim as f64) as usize;
                    let donor = other.counts[start + pick.min(self.num_sim - 1)];
                    let slot = &mut self.counts[start + sim];
                    *slot = slot.saturating_add(donor);
                }
            }
        } else {
            for (slot, &donor) in self.counts.iter_mut().zip(&other.counts) {
                *slot = slot.saturating_add(donor);
            }
        }
    }

    /// Sorts every cell's count distribution so rank queries become
    /// available. Further accumulation is rejected afterwards.
    pub fn finish(&mut self) {
        arrays::sort_each_column(&mut self.counts, self.num_sim, 0, self.num_sim);
        self.sorted = true;
    }

    /// Number of simulations per cell.
    #[must_use]
    pub fn num_sim(&self) -> usize {
        self.num_sim
    }

    /// Number of configured forecast lags, excluding the sum slot.
    #[must_use]
    pub fn lag_count(&self) -> usize {
        self.grid.lags.len()
    }

    /// Model names, in cell order.
    #[must_use]
    pub fn model_names(&self) -> &[String] {
        &self.model_names
    }

    /// Advisory windows, in cell order.
    #[must_use]
    pub fn windows(&self) -> &[AdvisoryWindow] {
        &self.grid.windows
    }

    /// Resolved magnitude-bin floors, in cell order.
    #[must_use]
    pub fn bin_mags(&self) -> &[f64] {
        &self.grid.bin_mags
    }

    /// One cell's count distribution, sorted once the set is finished.
    #[must_use]
    pub fn column(&self, lag_slot: usize, model: usize, window: usize, bin: usize) -> &[u32] {
        let start = self.column_start(lag_slot, model, window, bin);
        &self.counts[start..start + self.num_sim]
    }

    pub(crate) fn is_sorted(&self) -> bool {
        self.sorted
    }

    pub(crate) fn grid(&self) -> &ForecastGrid {
        &self.grid
    }

    pub(crate) fn cell_count(&self) -> usize {
        (self.grid.lags.len() + 1)
            * self.model_names.len()
            * self.grid.windows.len()
            * self.grid.bin_mags.len()
    }

    pub(crate) fn column_start(
        &self,
        lag_slot: usize,
        model: usize,
        window: usize,
        bin: usize,
    ) -> usize {
        let lags = self.grid.lags.len() + 1;
        let models = self.model_names.len();
        let windows = self.grid.windows.len();
        let bins = self.grid.bin_mags.len();
        assert!(
            lag_slot < lags && model < models && window < windows && bin < bins,
            "forecast cell out of range"
        );
        (((lag_slot * models + model) * windows + window) * bins + bin) * self.num_sim
    }

    /// Tallies one catalog's descendants into the cells of `(lag_index,
    /// model_index, sim_index)` and the lag-sum slot.
    fn tally_catalog(
        &mut self,
        builder: &CatalogBuilder,
        lag: f64,
        model_index: usize,
        lag_index: usize,
        sim_index: usize,
    ) {
        let sum_slot = self.grid.lags.len();
        for gen_index in 1..builder.gen_count() {
            for rup_index in 0..builder.gen_size(gen_index) {
                let rup = builder.rupture(gen_index, rup_index);
                for window_index in 0..self.grid.windows.len() {
                    let window = &self.grid.windows[window_index];
                    if rup.t_day < lag + window.start_day || rup.t_day >= lag + window.end_day {
                        continue;
                    }
                    for bin_index in 0..self.grid.bin_mags.len() {
                        if rup.rup_mag < self.grid.bin_mags[bin_index] {
                            continue;
                        }
                        for slot in [lag_index, sum_slot] {
                            let start =
                                self.column_start(slot, model_index, window_index, bin_index);
                            let cell = &mut self.counts[start + sim_index];
                            *cell = cell.saturating_add(1);
                        }
                    }
                }
            }
        }
    }
}

/// Derives the ChaCha8 seed for one simulation from the global seed and
/// the simulation's position in the grid.
fn derive_sim_seed(
    global_seed: u64,
    model_index: usize,
    lag_index: usize,
    sim_index: usize,
) -> u64 {
    let mut hasher = Sha256::new();
    hasher.update(global_seed.to_le_bytes());
    hasher.update(RNG_STREAM_SIMULATION.as_bytes());
    hasher.update((model_index as u64).to_le_bytes());
    hasher.update((lag_index as u64).to_le_bytes());
    hasher.update((sim_index as u64).to_le_bytes());
    let digest = hasher.finalize();
    let bytes: [u8; 8] = digest[0..8].try_into().expect("sha256 digest slice length");
    u64::from_le_bytes(bytes)
}
