use anyhow::Result;
use rand::{rngs::StdRng, Rng, SeedableRng};
use rlfolio_core::{
    env::{MarketEnv, MarketEnvConfig, ResultTable, State},
    qtable::{QTable, QTableConfig},
    record::BufferedRecorder,
    series::MarketSeries,
    spaces::DiscreteSpace,
    BenchmarkConfig, BenchmarkRunner,
};
use std::{fs::File, io::Write, path::Path};
use tempdir::TempDir;

const N_TRAIN: usize = 200;

/// Writes a mean-reverting factor and the returns it predicts.
fn write_series(path: &Path, n: usize) -> Result<()> {
    let mut rng = StdRng::seed_from_u64(42);
    let mut file = File::create(path)?;
    writeln!(file, "date,returns,factor_5")?;
    let mut f = 0.0f64;
    for t in 0..n {
        f = (1.0 - 2f64.ln() / 5.0) * f + 0.1 * rng.gen_range(-1.0..1.0);
        let r = 0.5 * 0.01 * f + 0.01 * rng.gen_range(-1.0..1.0);
        writeln!(file, "{},{},{}", t, r, f)?;
    }
    Ok(())
}

fn env(dir: &Path) -> Result<MarketEnv> {
    let path = dir.join("series.csv");
    write_series(&path, N_TRAIN + 2)?;
    let series = MarketSeries::from_csv(&path)?;
    let config = MarketEnvConfig::default()
        .sigma(0.01)
        .kappa(0.001)
        .cost_multiplier(0.5)
        .discount_rate(0.1)
        .f_param(vec![0.005])
        .klm([20.0, 10.0, 100.0])
        .ret_grid(3, 0.01)
        .n_train(N_TRAIN);
    MarketEnv::build(config, series)
}

#[test]
fn test_benchmark_run() -> Result<()> {
    let dir = TempDir::new("benchmark_run")?;
    let out_dir = dir.path().join("outputs");
    let config = BenchmarkConfig::default()
        .min_eps_pct(0.5)
        .save_ckpt_model(2)
        .out_dir(out_dir.to_str().unwrap());
    let mut env = env(dir.path())?;
    let mut recorder = BufferedRecorder::new();

    let qtable = BenchmarkRunner::build(config)
        .run(&mut env, None, &mut recorder, None)?
        .unwrap();

    // Every track obeys reward = gross P&L - risk - cost at every row
    let table = ResultTable::load(&out_dir.join("Results_200.zip"))?;
    assert_eq!(table.n_rows(), N_TRAIN + 2);
    for (gross, risk, cost, reward) in [
        ("GPGrossPNL", "GPRisk", "GPCost", "GPReward"),
        ("MVGrossPNL", "MVRisk", "MVCost", "MVReward"),
        ("GrossPNL_Q", "Risk_Q", "Cost_Q", "Reward_Q"),
    ] {
        let columns = [gross, risk, cost, reward].map(|k| table.column(k).unwrap());
        for t in 0..table.n_rows() {
            let expected = columns[0][t] - columns[1][t] - columns[2][t];
            assert!((columns[3][t] - expected).abs() < 1e-12, "{} at {}", reward, t);
        }
    }

    // The benchmark trades smoothly, the Markowitz portfolio does not pay attention to costs
    let gp_cost: f64 = table.column("GPCost").unwrap().iter().sum();
    let mv_cost: f64 = table.column("MVCost").unwrap().iter().sum();
    assert!(gp_cost < mv_cost);

    // The final Q-table and the checkpoints are readable
    let loaded = QTable::load(out_dir.join("QTable200.zip"), &QTableConfig::default())?;
    let state = State::flat(0.0, 0.0);
    assert_eq!(
        loaded.choose_greedy_action(&state)?,
        qtable.choose_greedy_action(&state)?
    );
    assert!(out_dir.join("ckpt").join("QTable100.zip").exists());
    assert!(out_dir.join("ckpt").join("QTable200.zip").exists());
    assert!(env
        .action_space()
        .contains(loaded.choose_greedy_action(&state)?));

    assert!(!recorder.flushed().is_empty());
    Ok(())
}
