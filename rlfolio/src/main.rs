use anyhow::Result;
use clap::{Parser, Subcommand};
use log::info;
use rlfolio::{install_ctrl_c, Command, RunConfig, Runner};
use rlfolio_core::series::MarketSeries;
use std::{
    path::PathBuf,
    sync::{atomic::AtomicBool, Arc},
};

/// Train trading agents on a series of returns and factors
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Train PPO agents
    Ppo(RunArgs),

    /// Run the tabular, DQN, GP and MV tracks
    Benchmark(RunArgs),
}

#[derive(clap::Args, Debug)]
struct RunArgs {
    /// YAML configuration, defaults are used if not given
    #[arg(long)]
    config: Option<PathBuf>,

    /// CSV with a `returns` column and `factor_<half_life>` columns
    #[arg(long)]
    series: PathBuf,

    /// Held-out series for out-of-sample evaluation
    #[arg(long)]
    test_series: Option<PathBuf>,

    /// Root of the output directories
    #[arg(long, default_value = "outputs")]
    out_dir: PathBuf,

    /// Comma-separated seeds, one realization per seed
    #[arg(long, value_delimiter = ',', default_value = "42")]
    seeds: Vec<u64>,
}

fn run(command: Command, args: &RunArgs) -> Result<()> {
    let config = match &args.config {
        Some(path) => RunConfig::load(path)?,
        None => RunConfig::default(),
    };
    let series = MarketSeries::from_csv(&args.series)?;
    info!("Loaded {} time steps from {:?}", series.len(), args.series);

    let shutdown = Arc::new(AtomicBool::new(false));
    install_ctrl_c(shutdown.clone())?;

    let mut runner = Runner::new(config, series, &args.out_dir).shutdown_flag(shutdown);
    if let Some(path) = &args.test_series {
        runner = runner.test_series(MarketSeries::from_csv(path)?);
    }

    let summaries = runner.run_ensemble(command, &args.seeds)?;
    info!(
        "Finished {} realizations in {:?}",
        summaries.len(),
        runner.run_dir()
    );
    Ok(())
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();

    match &args.command {
        Commands::Ppo(args) => run(Command::Ppo, args),
        Commands::Benchmark(args) => run(Command::Benchmark, args),
    }
}
