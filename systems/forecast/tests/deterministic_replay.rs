use etas_core::{CatalogParams, Rupture};
use etas_system_forecast::{
    AdvisoryWindow, EqkForecastSet, ForecastConfig, ForecastModel, MinMagFn,
};
use etas_system_stats::seed_rupture;

fn replay_config() -> ForecastConfig {
    ForecastConfig {
        forecast_lags: vec![0.0, 5.0],
        advisory_windows: vec![
            AdvisoryWindow::new("1 Day", 0.0, 1.0),
            AdvisoryWindow::new("1 Week", 0.0, 7.0),
        ],
        min_mag_bins: vec![
            MinMagFn::Constant { mag: 3.5 },
            MinMagFn::FloorBelowMainshock {
                mag: 5.0,
                delta_max: 3.0,
            },
        ],
        num_sim: 10,
    }
}

fn replay_models() -> Vec<ForecastModel> {
    let params = CatalogParams {
        a: -2.2,
        p: 1.2,
        c: 0.05,
        b: 1.0,
        alpha: 1.0,
        m_ref: 3.0,
        m_sup: 8.0,
        m_min_lo: 3.0,
        m_min_hi: 6.0,
        m_max_sim: 8.0,
        t_begin: 0.0,
        t_end: 7.0,
        teps: 1.0e-6,
        gen_size_target: 60,
        gen_count_max: 8,
    };
    let mut hotter = params;
    hotter.a = -1.9;
    vec![
        ForecastModel {
            name: "generic".to_owned(),
            params,
        },
        ForecastModel {
            name: "sequence specific".to_owned(),
            params: hotter,
        },
    ]
}

fn replay_seeds(models: &[ForecastModel]) -> Vec<Rupture> {
    vec![seed_rupture(&models[0].params, 0.0, 6.6, 42.0, 17.0)]
}

fn all_columns(set: &EqkForecastSet) -> Vec<Vec<u32>> {
    let mut columns = Vec::new();
    for lag_slot in 0..set.lag_count() + 1 {
        for model in 0..set.model_names().len() {
            for window in 0..set.windows().len() {
                for bin in 0..set.bin_mags().len() {
                    columns.push(set.column(lag_slot, model, window, bin).to_vec());
                }
            }
        }
    }
    columns
}

#[test]
fn identical_global_seeds_replay_identical_count_matrices() {
    let config = replay_config();
    let models = replay_models();
    let seeds = replay_seeds(&models);

    let first = EqkForecastSet::run_simulations(&config, &models, &seeds, 0xDEAD_BEEF)
        .expect("simulation grid runs");
    let second = EqkForecastSet::run_simulations(&config, &models, &seeds, 0xDEAD_BEEF)
        .expect("simulation grid runs");

    assert_eq!(all_columns(&first), all_columns(&second));

    let mut first = first;
    let mut second = second;
    first.finish();
    second.finish();
    let observed = [Rupture::new(0.4, 5.6, 0.0, 0, 42.0, 17.0)];
    assert_eq!(first.count_stats(&observed), second.count_stats(&observed));
    assert_eq!(
        first.single_event_gamma(&observed),
        second.single_event_gamma(&observed)
    );
}

#[test]
fn different_global_seeds_diverge() {
    let config = replay_config();
    let models = replay_models();
    let seeds = replay_seeds(&models);

    let first = EqkForecastSet::run_simulations(&config, &models, &seeds, 1)
        .expect("simulation grid runs");
    let second = EqkForecastSet::run_simulations(&config, &models, &seeds, 2)
        .expect("simulation grid runs");

    assert_ne!(all_columns(&first), all_columns(&second));
}

#[test]
fn lag_sum_slot_is_the_columnwise_sum_of_lag_slots() {
    let config = replay_config();
    let models = replay_models();
    let seeds = replay_seeds(&models);

    let set = EqkForecastSet::run_simulations(&config, &models, &seeds, 7)
        .expect("simulation grid runs");

    for model in 0..set.model_names().len() {
        for window in 0..set.windows().len() {
            for bin in 0..set.bin_mags().len() {
                let summed: Vec<u32> = (0..set.num_sim())
                    .map(|sim| {
                        (0..set.lag_count())
                            .map(|lag| set.column(lag, model, window, bin)[sim])
                            .sum()
                    })
                    .collect();
                assert_eq!(
                    set.column(set.lag_count(), model, window, bin),
                    summed.as_slice()
                );
            }
        }
    }
}

#[test]
fn bin_floor_follows_the_mainshock_magnitude() {
    let config = replay_config();
    let models = replay_models();
    let seeds = replay_seeds(&models);

    let set = EqkForecastSet::run_simulations(&config, &models, &seeds, 7)
        .expect("simulation grid runs");

    // Mainshock magnitude 6.6 with delta_max 3.0 keeps the 5.0 floor;
    // the constant bin resolves unchanged.
    assert_eq!(set.bin_mags(), &[3.5, 5.0]);
}
