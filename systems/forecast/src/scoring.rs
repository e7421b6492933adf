//! Rank-based statistics over finished count distributions.
//!
//! All queries require the owning set to be finished (columns sorted);
//! querying an unfinished set is a programming error.

use etas_core::Rupture;
use etas_system_stats::arrays;

use crate::EqkForecastSet;

/// Count statistics for one forecast cell.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CellStats {
    /// Observed aftershock count.
    pub obs_count: u32,
    /// Median simulated count.
    pub sim_median_count: u32,
    /// 5 percent fractile of the simulated counts.
    pub sim_fractile_5_count: u32,
    /// 95 percent fractile of the simulated counts.
    pub sim_fractile_95_count: u32,
}

/// Gamma score bounds for one forecast cell.
///
/// `gamma_lo` is the fraction of simulations strictly above the observed
/// count; `gamma_hi` additionally includes ties, so it bounds the
/// probability that a simulated count equals or exceeds the observation.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct GammaScore {
    /// Probability of strict exceedance.
    pub gamma_lo: f64,
    /// Probability of exceedance including ties.
    pub gamma_hi: f64,
}

impl EqkForecastSet {
    /// Index of a cell within the vectors returned by the scoring
    /// queries, in `(lag_slot, model, window, bin)` order.
    #[must_use]
    pub fn cell_index(&self, lag_slot: usize, model: usize, window: usize, bin: usize) -> usize {
        self.column_start(lag_slot, model, window, bin) / self.num_sim()
    }

    /// Tallies observed aftershocks into `(lag_slot, window, bin)` cells.
    ///
    /// Aftershock times are days since the mainshock, in the same frame
    /// as the simulations. The final lag slot holds the sum over all
    /// configured lags.
    #[must_use]
    pub fn observed_counts(&self, aftershocks: &[Rupture]) -> Vec<u32> {
        let grid = self.grid();
        let lag_slots = grid.lags.len() + 1;
        let windows = grid.windows.len();
        let bins = grid.bin_mags.len();
        let sum_slot = grid.lags.len();
        let mut observed = vec![0_u32; lag_slots * windows * bins];

        for rup in aftershocks {
            for (lag_index, &lag) in grid.lags.iter().enumerate() {
                for (window_index, window) in grid.windows.iter().enumerate() {
                    if rup.t_day < lag + window.start_day || rup.t_day >= lag + window.end_day {
                        continue;
                    }
                    for (bin_index, &bin_mag) in grid.bin_mags.iter().enumerate() {
                        if rup.rup_mag < bin_mag {
                            continue;
                        }
                        for slot in [lag_index, sum_slot] {
                            let index = (slot * windows + window_index) * bins + bin_index;
                            observed[index] = observed[index].saturating_add(1);
                        }
                    }
                }
            }
        }

        observed
    }

    /// Observed count, simulated median, and 5/95 fractiles for every
    /// cell, in [`EqkForecastSet::cell_index`] order.
    ///
    /// # Panics
    ///
    /// Panics if the set has not been finished.
    #[must_use]
    pub fn count_stats(&self, aftershocks: &[Rupture]) -> Vec<CellStats> {
        assert!(
            self.is_sorted(),
            "forecast set misuse: count_stats before finish"
        );
        let observed = self.observed_counts(aftershocks);
        let mut stats = Vec::with_capacity(self.cell_count());

        self.for_each_cell(|set, lag_slot, model, window, bin| {
            let column = set.column(lag_slot, model, window, bin);
            let obs = observed_for(&observed, set, lag_slot, window, bin);
            stats.push(CellStats {
                obs_count: obs,
                sim_median_count: arrays::fractile(column, 0, column.len(), 0.5),
                sim_fractile_5_count: arrays::fractile(column, 0, column.len(), 0.05),
                sim_fractile_95_count: arrays::fractile(column, 0, column.len(), 0.95),
            });
        });

        stats
    }

    /// Gamma score bounds for every cell, in
    /// [`EqkForecastSet::cell_index`] order.
    ///
    /// # Panics
    ///
    /// Panics if the set has not been finished.
    #[must_use]
    pub fn single_event_gamma(&self, aftershocks: &[Rupture]) -> Vec<GammaScore> {
        assert!(
            self.is_sorted(),
            "forecast set misuse: single_event_gamma before finish"
        );
        let observed = self.observed_counts(aftershocks);
        let mut scores = Vec::with_capacity(self.cell_count());

        self.for_each_cell(|set, lag_slot, model, window, bin| {
            let column = set.column(lag_slot, model, window, bin);
            let obs = observed_for(&observed, set, lag_slot, window, bin);
            let gamma_lo = arrays::probex(column, obs, 0, column.len());
            let gamma_hi = if obs == 0 {
                1.0
            } else {
                arrays::probex(column, obs - 1, 0, column.len())
            };
            scores.push(GammaScore { gamma_lo, gamma_hi });
        });

        scores
    }

    fn for_each_cell(&self, mut visit: impl FnMut(&Self, usize, usize, usize, usize)) {
        let grid = self.grid();
        for lag_slot in 0..grid.lags.len() + 1 {
            for model in 0..self.model_names().len() {
                for window in 0..grid.windows.len() {
                    for bin in 0..grid.bin_mags.len() {
                        visit(self, lag_slot, model, window, bin);
                    }
                }
            }
        }
    }
}

fn observed_for(
    observed: &[u32],
    set: &EqkForecastSet,
    lag_slot: usize,
    window: usize,
    bin: usize,
) -> u32 {
    let windows = set.windows().len();
    let bins = set.bin_mags().len();
    observed[(lag_slot * windows + window) * bins + bin]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{AdvisoryWindow, ForecastConfig, MinMagFn};

    fn small_config() -> ForecastConfig {
        ForecastConfig {
            forecast_lags: vec![0.0, 10.0],
            advisory_windows: vec![
                AdvisoryWindow::new("1 Day", 0.0, 1.0),
                AdvisoryWindow::new("1 Week", 0.0, 7.0),
            ],
            min_mag_bins: vec![
                MinMagFn::Constant { mag: 4.0 },
                MinMagFn::Constant { mag: 6.0 },
            ],
            num_sim: 5,
        }
    }

    fn aftershock(t_day: f64, rup_mag: f64) -> Rupture {
        Rupture::new(t_day, rup_mag, 0.0, 0, 0.0, 0.0)
    }

    #[test]
    fn observed_counts_tally_windows_bins_and_the_lag_sum() {
        let config = small_config();
        let names = vec!["generic".to_owned()];
        let set = EqkForecastSet::zero_init(&config, &names, 7.0).expect("valid grid");

        let aftershocks = [
            aftershock(0.5, 5.0),
            aftershock(3.0, 6.5),
            aftershock(10.5, 4.5),
            aftershock(30.0, 7.0),
        ];
        let observed = set.observed_counts(&aftershocks);

        let windows = 2;
        let bins = 2;
        let index = |slot: usize, w: usize, b: usize| (slot * windows + w) * bins + b;

        // Lag 0, 1-day window: only the t=0.5 event.
        assert_eq!(observed[index(0, 0, 0)], 1);
        assert_eq!(observed[index(0, 0, 1)], 0);
        // Lag 0, 1-week window: t=0.5 and t=3.0.
        assert_eq!(observed[index(0, 1, 0)], 2);
        assert_eq!(observed[index(0, 1, 1)], 1);
        // Lag 10, 1-day window: only the t=10.5 event.
        assert_eq!(observed[index(1, 0, 0)], 1);
        // Sum slot adds both lags.
        assert_eq!(observed[index(2, 1, 0)], 3);
    }

    #[test]
    fn count_stats_reports_fractiles_of_sorted_columns() {
        let config = small_config();
        let names = vec!["generic".to_owned()];
        let mut set = EqkForecastSet::zero_init(&config, &names, 7.0).expect("valid grid");

        let start = set.column_start(0, 0, 0, 0);
        set.counts[start..start + 5].copy_from_slice(&[4, 0, 2, 1, 3]);
        set.finish();

        let stats = set.count_stats(&[aftershock(0.5, 5.0)]);
        let cell = stats[set.cell_index(0, 0, 0, 0)];
        assert_eq!(cell.obs_count, 1);
        assert_eq!(cell.sim_median_count, 2);
        assert_eq!(cell.sim_fractile_5_count, 0);
        assert_eq!(cell.sim_fractile_95_count, 4);
    }

    #[test]
    fn gamma_bounds_bracket_the_observed_rank() {
        let config = small_config();
        let names = vec!["generic".to_owned()];
        let mut set = EqkForecastSet::zero_init(&config, &names, 7.0).expect("valid grid");

        let start = set.column_start(0, 0, 0, 0);
        set.counts[start..start + 5].copy_from_slice(&[0, 1, 1, 2, 3]);
        set.finish();

        // One observed event in the lag-0 one-day window above magnitude 4.
        let scores = set.single_event_gamma(&[aftershock(0.5, 5.0)]);
        let score = scores[set.cell_index(0, 0, 0, 0)];
        // Two simulations exceed 1; two tie it.
        assert_eq!(score.gamma_lo, 0.4);
        assert_eq!(score.gamma_hi, 0.8);
        assert!(score.gamma_lo <= score.gamma_hi);

        // A cell with no observation has gamma_hi of exactly 1.
        let empty = scores[set.cell_index(1, 0, 0, 1)];
        assert_eq!(empty.gamma_hi, 1.0);
    }

    #[test]
    #[should_panic(expected = "before finish")]
    fn gamma_before_finish_panics() {
        let config = small_config();
        let names = vec!["generic".to_owned()];
        let set = EqkForecastSet::zero_init(&config, &names, 7.0).expect("valid grid");
        let _ = set.single_event_gamma(&[]);
    }
}
